//! # Deploy Orchestrator
//!
//! Resumable bring-up of a multi-contract on-chain application. A static set of
//! components is declared and deployed in dependency order, every step is
//! recorded in a durable state file, and once everything exists a single
//! atomic batch of role grants configures access control.
//!
//! Running it twice is always safe. Whatever the previous run finished is
//! skipped, whatever it started is resumed from its last checkpoint, and
//! nothing is deployed twice.
//!
//! ## Architecture Overview
//!
//! | Layer | Module | Role |
//! |-------|--------|------|
//! | Model | [`model`] | felts, hashes, [`ComponentSpec`], [`DeploymentRecord`] |
//! | Resolver | [`resolver`] | validation and Kahn ordering, before any network call |
//! | State Store | [`store`] | actor owning the state file; atomic upserts; per-name claims |
//! | Executor | [`executor`] | idempotent declare/deploy with retry, bounded parallel scheduling |
//! | Roles | [`roles`] | role catalog and the single multicall that applies it |
//! | Orchestrator | [`orchestrator`] | composition root and lifecycle |
//!
//! The chain itself sits behind the [`NetworkClient`] trait. Tests (and dry
//! runs) use [`mock::SimulatedNetwork`].
//!
//! ## Quick Start
//!
//! ```rust
//! use deploy_orchestrator::mock::{write_artifacts, SimulatedNetwork};
//! use deploy_orchestrator::model::{ComponentSet, ComponentSpec};
//! use deploy_orchestrator::roles::{Grantee, Role, RoleCatalog};
//! use deploy_orchestrator::{ArtifactLoader, Orchestrator, OrchestratorConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let dir = tempfile::tempdir().unwrap();
//!     write_artifacts(dir.path(), "app", &["RoleStore", "DataStore"]).unwrap();
//!
//!     let set = ComponentSet::new()
//!         .with(ComponentSpec::deploy("RoleStore").deployer_arg("admin"))
//!         .with(ComponentSpec::deploy("DataStore").address_arg("role_store_address", "RoleStore"));
//!     let catalog = RoleCatalog::new("RoleStore")
//!         .grant(Role::Controller, [Grantee::component("DataStore")]);
//!
//!     let orchestrator = Orchestrator::open(
//!         dir.path().join("state.json"),
//!         Arc::new(SimulatedNetwork::new()),
//!         Arc::new(ArtifactLoader::new(dir.path(), "app")),
//!         OrchestratorConfig::default(),
//!     )
//!     .unwrap();
//!
//!     let report = orchestrator.run(&set, Some(&catalog)).await.unwrap();
//!     assert_eq!(report.order, vec!["RoleStore", "DataStore"]);
//!     assert_eq!(report.deployed(), 2);
//!
//!     orchestrator.shutdown().await.unwrap();
//! }
//! ```

pub mod artifact;
pub mod error;
pub mod executor;
pub mod mock;
pub mod model;
pub mod network;
pub mod orchestrator;
pub mod resolver;
pub mod roles;
pub mod store;
pub mod tracing;

pub use artifact::{Artifact, ArtifactLoader};
pub use error::{ArtifactError, DeployError, ResolveError, StoreError};
pub use executor::{ComponentOutcome, Executor, OutcomeKind, Resolved, RetryPolicy, Scheduler};
pub use model::{
    Address, ArtifactRef, ClassHash, ComponentKind, ComponentSet, ComponentSpec, ConstructorArg,
    DeploymentRecord, DeploymentStatus, Felt, PendingDeploy, TxHash,
};
pub use network::{Call, NetworkClient, NetworkError};
pub use orchestrator::{ExecutionPlan, Orchestrator, OrchestratorConfig, RunReport};
pub use resolver::{resolve, Resolver};
pub use roles::{Grantee, Role, RoleBootstrapper, RoleCatalog, RoleGrant};
pub use store::{DeploymentState, StoreActor, StoreClient};
