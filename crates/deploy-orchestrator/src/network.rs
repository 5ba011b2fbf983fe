//! # Network Client Seam
//!
//! The orchestrator never talks RPC itself. Everything on-chain goes through
//! [`NetworkClient`], so the transport, signing, and fee logic live in whatever
//! implementation the binary links in (the test suite uses
//! [`SimulatedNetwork`](crate::mock::SimulatedNetwork)).
//!
//! Implementations classify their failures into [`NetworkError`]; the executor
//! decides what to retry purely from that classification.

use crate::artifact::Artifact;
use crate::model::{Address, ClassHash, Felt, TxHash};
use async_trait::async_trait;

/// Failure reported by a [`NetworkClient`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    /// The class is already on chain. Declaring is content addressed, so this is success.
    #[error("class already declared")]
    AlreadyDeclared { class_hash: Option<ClassHash> },

    /// Timeout, node busy, rate limited.
    #[error("transient network failure: {0}")]
    Transient(String),

    /// The transaction was accepted but finality was not observed in time.
    #[error("transaction {0} not yet final")]
    NotYetFinal(TxHash),

    /// The node refused the submission (nonce clash, fee estimate drift); safe to resubmit.
    #[error("submission rejected: {0}")]
    Rejected(String),

    #[error("transaction {tx} reverted: {reason}")]
    Reverted { tx: TxHash, reason: String },

    #[error("network failure: {0}")]
    Fatal(String),
}

impl NetworkError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transient(_) | Self::NotYetFinal(_) | Self::Rejected(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclareResult {
    pub class_hash: ClassHash,
    pub tx: TxHash,
}

/// A submitted deployment. The address is final once `tx` is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployResult {
    pub address: Address,
    pub tx: TxHash,
}

/// One entry of a multicall.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Call {
    pub to: Address,
    pub entrypoint: String,
    pub calldata: Vec<Felt>,
}

impl Call {
    pub fn new(to: Address, entrypoint: impl Into<String>, calldata: Vec<Felt>) -> Self {
        Self {
            to,
            entrypoint: entrypoint.into(),
            calldata,
        }
    }
}

#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// Address of the signing account.
    fn deployer(&self) -> Address;

    /// Computes the class hash of an artifact locally, without a round trip.
    fn class_hash(&self, artifact: &Artifact) -> Result<ClassHash, NetworkError>;

    async fn declare(&self, artifact: &Artifact) -> Result<DeclareResult, NetworkError>;

    async fn deploy(
        &self,
        class_hash: &ClassHash,
        calldata: &[Felt],
    ) -> Result<DeployResult, NetworkError>;

    async fn wait_for_finality(&self, tx: &TxHash) -> Result<(), NetworkError>;

    /// Submits all calls as one atomic transaction.
    async fn execute(&self, calls: &[Call]) -> Result<TxHash, NetworkError>;
}
