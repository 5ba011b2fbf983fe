use crate::error::StoreError;
use crate::model::DeploymentRecord;
use crate::store::message::StoreRequest;
use crate::store::state::DeploymentState;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument};

/// Cloneable handle to the store actor.
#[derive(Clone)]
pub struct StoreClient {
    sender: mpsc::Sender<StoreRequest>,
}

impl StoreClient {
    pub fn new(sender: mpsc::Sender<StoreRequest>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, StoreError>>) -> StoreRequest,
    ) -> Result<T, StoreError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(build(respond_to))
            .await
            .map_err(|_| StoreError::ActorClosed)?;
        response.await.map_err(|_| StoreError::ActorDropped)?
    }

    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<DeploymentState, StoreError> {
        debug!("Sending request");
        self.request(|respond_to| StoreRequest::Load { respond_to })
            .await
    }

    #[instrument(skip(self))]
    pub async fn find(&self, name: &str) -> Result<Option<DeploymentRecord>, StoreError> {
        debug!("Sending request");
        let name = name.to_string();
        self.request(|respond_to| StoreRequest::Find { name, respond_to })
            .await
    }

    /// Persists `record`. Returns whether the state file was rewritten.
    #[instrument(skip(self, record), fields(component = %record.name, status = %record.status))]
    pub async fn upsert(&self, record: DeploymentRecord) -> Result<bool, StoreError> {
        debug!("Sending request");
        self.request(|respond_to| StoreRequest::Upsert { record, respond_to })
            .await
    }

    /// Removes a record so the next run deploys the component afresh.
    #[instrument(skip(self))]
    pub async fn forget(&self, name: &str) -> Result<Option<DeploymentRecord>, StoreError> {
        debug!("Sending request");
        let name = name.to_string();
        self.request(|respond_to| StoreRequest::Forget { name, respond_to })
            .await
    }

    #[instrument(skip(self))]
    pub async fn claim(&self, name: &str) -> Result<(), StoreError> {
        debug!("Sending request");
        let name = name.to_string();
        self.request(|respond_to| StoreRequest::Claim { name, respond_to })
            .await
    }

    #[instrument(skip(self))]
    pub async fn release(&self, name: &str) -> Result<(), StoreError> {
        debug!("Sending request");
        let name = name.to_string();
        self.request(|respond_to| StoreRequest::Release { name, respond_to })
            .await
    }
}
