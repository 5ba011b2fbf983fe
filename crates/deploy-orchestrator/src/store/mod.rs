//! # State Store
//!
//! Durable `name -> record` tracking behind an actor. See [`StoreActor`] for the
//! persistence guarantees and [`StoreClient`] for the request API.

pub mod actor;
pub mod client;
pub mod message;
pub mod persist;
pub mod state;

pub use actor::StoreActor;
pub use client::StoreClient;
pub use message::{Response, StoreRequest};
pub use state::DeploymentState;

use crate::error::StoreError;
use std::path::Path;
use tokio::task::JoinHandle;

/// Opens the store at `path` and spawns its actor.
pub fn spawn(path: impl AsRef<Path>) -> Result<(StoreClient, JoinHandle<()>), StoreError> {
    let (actor, client) = StoreActor::open(path, 32)?;
    let handle = tokio::spawn(actor.run());
    Ok((client, handle))
}
