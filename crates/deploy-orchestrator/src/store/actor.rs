//! # State Store Actor
//!
//! The store actor is the only owner of [`DeploymentState`]. It processes
//! requests one at a time, so two upserts can never interleave and the file on
//! disk always matches one of the snapshots the actor has held.
//!
//! Each mutation runs in three steps:
//!
//! 1. Apply the change to a copy of the in-memory state.
//! 2. Persist the copy with [`save_state`] (temp file, then rename).
//! 3. Swap the copy in and reply.
//!
//! If step 2 fails, the in-memory state is untouched and the caller sees the
//! I/O error. A mutation that changes nothing skips the write entirely.
//!
//! The actor also holds the `<state>.lock` advisory lock for its whole
//! lifetime, and keeps the set of component names currently in flight.

use crate::error::StoreError;
use crate::model::DeploymentRecord;
use crate::store::client::StoreClient;
use crate::store::message::StoreRequest;
use crate::store::persist::{acquire_lock, load_state, save_state};
use crate::store::state::DeploymentState;
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub struct StoreActor {
    receiver: mpsc::Receiver<StoreRequest>,
    path: PathBuf,
    state: DeploymentState,
    in_flight: HashSet<String>,
    _lock: File,
}

impl StoreActor {
    /// Locks and loads the state file, returning the actor and its client.
    ///
    /// Fails with [`StoreError::Locked`] if another process holds the file.
    pub fn open(
        path: impl AsRef<Path>,
        buffer_size: usize,
    ) -> Result<(Self, StoreClient), StoreError> {
        let path = path.as_ref().to_path_buf();
        let lock = acquire_lock(&path)?;
        let state = load_state(&path)?;
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = Self {
            receiver,
            path,
            state,
            in_flight: HashSet::new(),
            _lock: lock,
        };
        Ok((actor, StoreClient::new(sender)))
    }

    /// Runs the event loop until every client has been dropped.
    pub async fn run(mut self) {
        info!(path = %self.path.display(), records = self.state.len(), "Store started");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                StoreRequest::Load { respond_to } => {
                    debug!(records = self.state.len(), "Load");
                    let _ = respond_to.send(Ok(self.state.clone()));
                }
                StoreRequest::Find { name, respond_to } => {
                    let record = self.state.find(&name).cloned();
                    debug!(component = %name, found = record.is_some(), "Find");
                    let _ = respond_to.send(Ok(record));
                }
                StoreRequest::Upsert { record, respond_to } => {
                    let _ = respond_to.send(self.upsert(record));
                }
                StoreRequest::Forget { name, respond_to } => {
                    let _ = respond_to.send(self.forget(&name));
                }
                StoreRequest::Claim { name, respond_to } => {
                    if self.in_flight.insert(name.clone()) {
                        debug!(component = %name, in_flight = self.in_flight.len(), "Claimed");
                        let _ = respond_to.send(Ok(()));
                    } else {
                        warn!(component = %name, "Already in flight");
                        let _ = respond_to.send(Err(StoreError::AlreadyInFlight(name)));
                    }
                }
                StoreRequest::Release { name, respond_to } => {
                    self.in_flight.remove(&name);
                    debug!(component = %name, in_flight = self.in_flight.len(), "Released");
                    let _ = respond_to.send(Ok(()));
                }
            }
        }

        info!(records = self.state.len(), "Shutdown");
    }

    fn upsert(&mut self, record: DeploymentRecord) -> Result<bool, StoreError> {
        let name = record.name.clone();
        let status = record.status;
        let mut next = self.state.clone();
        let changed = next.upsert(record).inspect_err(|e| {
            warn!(component = %name, error = %e, "Upsert rejected");
        })?;
        if !changed {
            debug!(component = %name, %status, "Upsert unchanged");
            return Ok(false);
        }
        save_state(&self.path, &next).inspect_err(|e| {
            warn!(component = %name, error = %e, "Persist failed");
        })?;
        self.state = next;
        info!(component = %name, %status, records = self.state.len(), "Upserted");
        Ok(true)
    }

    fn forget(&mut self, name: &str) -> Result<Option<DeploymentRecord>, StoreError> {
        if self.in_flight.contains(name) {
            return Err(StoreError::AlreadyInFlight(name.to_string()));
        }
        let mut next = self.state.clone();
        let Some(removed) = next.remove(name) else {
            debug!(component = %name, "Forget: no record");
            return Ok(None);
        };
        save_state(&self.path, &next)?;
        self.state = next;
        info!(component = %name, records = self.state.len(), "Forgotten");
        Ok(Some(removed))
    }
}
