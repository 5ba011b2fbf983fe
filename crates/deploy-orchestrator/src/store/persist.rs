//! State file codec and atomic replacement.

use crate::error::StoreError;
use crate::model::DeploymentRecord;
use crate::store::state::DeploymentState;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Reads the state file. A missing file is an empty state.
pub fn load_state(path: &Path) -> Result<DeploymentState, StoreError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(DeploymentState::new());
        }
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if raw.trim().is_empty() {
        return Ok(DeploymentState::new());
    }
    let records: Vec<DeploymentRecord> =
        serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
    DeploymentState::from_records(records.into_iter().map(DeploymentRecord::normalized).collect())
}

/// Writes the whole snapshot as pretty JSON.
pub fn save_state(path: &Path, state: &DeploymentState) -> Result<(), StoreError> {
    let mut json = serde_json::to_string_pretty(state).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    json.push('\n');
    atomic_write(path, json.as_bytes()).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes to a temp file in the same directory, then renames over `path`.
pub fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

pub fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Takes the exclusive advisory lock guarding `path`. Released when the file drops.
pub fn acquire_lock(path: &Path) -> Result<File, StoreError> {
    let lock = lock_path(path);
    if let Some(parent) = lock.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: lock.clone(),
            source,
        })?;
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock)
        .map_err(|source| StoreError::Io {
            path: lock.clone(),
            source,
        })?;
    file.try_lock_exclusive()
        .map_err(|_| StoreError::Locked {
            path: path.to_path_buf(),
        })?;
    Ok(file)
}
