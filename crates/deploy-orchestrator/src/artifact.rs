//! # Artifact Loader
//!
//! Locates compiled contracts by a `<dir>/<package>_<Name>` convention. Each
//! component needs two files:
//!
//! - `<package>_<Name>.contract_class.json` (the Sierra class)
//! - `<package>_<Name>.compiled_contract_class.json` (the CASM)
//!
//! Loaded artifacts are cached for the life of the loader.

use crate::error::ArtifactError;
use crate::model::ArtifactRef;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

const CLASS_SUFFIX: &str = "contract_class.json";
const COMPILED_CLASS_SUFFIX: &str = "compiled_contract_class.json";

/// Both halves of a compiled contract.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub reference: ArtifactRef,
    pub class: Value,
    pub compiled_class: Value,
}

#[derive(Debug)]
pub struct ArtifactLoader {
    dir: PathBuf,
    package: String,
    cache: Mutex<HashMap<ArtifactRef, Arc<Artifact>>>,
}

impl ArtifactLoader {
    pub fn new(dir: impl Into<PathBuf>, package: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            package: package.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn class_path(&self, artifact: &ArtifactRef) -> PathBuf {
        self.file_path(artifact, CLASS_SUFFIX)
    }

    pub fn compiled_class_path(&self, artifact: &ArtifactRef) -> PathBuf {
        self.file_path(artifact, COMPILED_CLASS_SUFFIX)
    }

    fn file_path(&self, artifact: &ArtifactRef, suffix: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{}.{suffix}", self.package, artifact.as_str()))
    }

    pub fn load(&self, artifact: &ArtifactRef) -> Result<Arc<Artifact>, ArtifactError> {
        if let Some(hit) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(artifact)
        {
            return Ok(hit.clone());
        }

        let class = read_json(&self.class_path(artifact))?;
        let compiled_class = read_json(&self.compiled_class_path(artifact))?;
        debug!(artifact = %artifact, "Loaded artifact");

        let loaded = Arc::new(Artifact {
            reference: artifact.clone(),
            class,
            compiled_class,
        });
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(artifact.clone(), loaded.clone());
        Ok(loaded)
    }
}

fn read_json(path: &Path) -> Result<Value, ArtifactError> {
    let raw = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ArtifactError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ArtifactError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    serde_json::from_str(&raw).map_err(|source| ArtifactError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
