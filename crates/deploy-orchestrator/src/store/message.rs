use crate::error::StoreError;
use crate::model::DeploymentRecord;
use crate::store::state::DeploymentState;
use tokio::sync::oneshot;

/// Type alias for the one-shot response channel used by the store actor.
pub type Response<T> = oneshot::Sender<Result<T, StoreError>>;

/// Requests understood by [`StoreActor`](super::StoreActor).
///
/// Every mutation (`Upsert`, `Forget`) persists the whole snapshot before it
/// answers, so a reply of `Ok` means the change is on disk.
#[derive(Debug)]
pub enum StoreRequest {
    Load {
        respond_to: Response<DeploymentState>,
    },
    Find {
        name: String,
        respond_to: Response<Option<DeploymentRecord>>,
    },
    Upsert {
        record: DeploymentRecord,
        respond_to: Response<bool>,
    },
    Forget {
        name: String,
        respond_to: Response<Option<DeploymentRecord>>,
    },
    /// Marks `name` as in flight. Fails if it already is.
    Claim {
        name: String,
        respond_to: Response<()>,
    },
    Release {
        name: String,
        respond_to: Response<()>,
    },
}
