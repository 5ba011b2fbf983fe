//! # Orchestrator
//!
//! The composition root. It owns the store actor and wires the resolver,
//! executor, scheduler, and role bootstrapper together for one run:
//!
//! ```text
//! resolve + validate ──► load state ──► pre-flight artifacts
//!        (no network)                          │
//!                                              ▼
//!          bootstrap roles ◄── reload state ◄── schedule components
//! ```
//!
//! Everything before scheduling is local. A cycle, a missing dependency, an
//! unknown grantee, or a missing artifact aborts before the first network call.
//! Role grants are submitted only after every component is satisfied.
//!
//! ## Lifecycle
//!
//! [`Orchestrator::open`] spawns the store actor and keeps its handle;
//! [`Orchestrator::shutdown`] drops the client and waits for the actor to flush
//! and release the state file lock.

use crate::artifact::ArtifactLoader;
use crate::error::{DeployError, ResolveError, StoreError};
use crate::executor::{ComponentOutcome, Executor, OutcomeKind, Resolved, RetryPolicy, Scheduler};
use crate::model::{ComponentSet, DeploymentRecord};
use crate::network::NetworkClient;
use crate::resolver::Resolver;
use crate::roles::{GrantReport, RoleBootstrapper, RoleCatalog};
use crate::store::{self, DeploymentState, StoreClient};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub retry: RetryPolicy,
    /// Most components deployed at once. `1` deploys strictly in order.
    pub concurrency: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            concurrency: 4,
        }
    }
}

/// Execution order plus the parallel waves it decomposes into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub order: Vec<String>,
    pub waves: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub order: Vec<String>,
    pub outcomes: Vec<ComponentOutcome>,
    pub grants: Option<GrantReport>,
}

impl RunReport {
    /// Components that needed no work this run.
    pub fn satisfied(&self) -> usize {
        self.count(OutcomeKind::AlreadySatisfied)
    }

    pub fn deployed(&self) -> usize {
        self.count(OutcomeKind::Deployed)
    }

    pub fn declared(&self) -> usize {
        self.count(OutcomeKind::Declared)
    }

    fn count(&self, kind: OutcomeKind) -> usize {
        self.outcomes.iter().filter(|o| o.kind == kind).count()
    }
}

pub struct Orchestrator {
    store: StoreClient,
    network: Arc<dyn NetworkClient>,
    artifacts: Arc<ArtifactLoader>,
    config: OrchestratorConfig,
    handles: Vec<JoinHandle<()>>,
}

impl Orchestrator {
    /// Opens (and locks) the state file and starts the store actor.
    pub fn open(
        state_path: impl AsRef<Path>,
        network: Arc<dyn NetworkClient>,
        artifacts: Arc<ArtifactLoader>,
        config: OrchestratorConfig,
    ) -> Result<Self, StoreError> {
        let (store, handle) = store::spawn(state_path)?;
        Ok(Self {
            store,
            network,
            artifacts,
            config,
            handles: vec![handle],
        })
    }

    /// Validates `set` and computes its order. Touches neither store nor network.
    pub fn plan(set: &ComponentSet) -> Result<ExecutionPlan, ResolveError> {
        let resolver = Resolver::new(set)?;
        Ok(ExecutionPlan {
            order: resolver.resolve()?,
            waves: resolver.waves()?,
        })
    }

    /// Deploys every component, then bootstraps roles from `catalog` if given.
    #[instrument(skip_all, fields(components = set.len()))]
    pub async fn run(
        &self,
        set: &ComponentSet,
        catalog: Option<&RoleCatalog>,
    ) -> Result<RunReport, DeployError> {
        if let Some(catalog) = catalog {
            catalog.validate(set)?;
        }
        let (order, outcomes) = self.deploy_components(set).await?;

        let grants = match catalog {
            Some(catalog) => Some(self.bootstrap_only(set, catalog).await?),
            None => None,
        };

        let report = RunReport {
            order,
            outcomes,
            grants,
        };
        info!(
            deployed = report.deployed(),
            declared = report.declared(),
            satisfied = report.satisfied(),
            "Run complete"
        );
        Ok(report)
    }

    /// Brings every component of `set` to its target state. Returns the order and outcomes.
    pub async fn deploy_components(
        &self,
        set: &ComponentSet,
    ) -> Result<(Vec<String>, Vec<ComponentOutcome>), DeployError> {
        let plan = Self::plan(set)?;
        let state = self.store.load().await?;
        self.preflight_artifacts(set, &state)?;

        let executor = Executor::new(
            self.network.clone(),
            self.artifacts.clone(),
            self.store.clone(),
            self.config.retry.clone(),
        );
        executor.seed_declared(set, &state);

        info!(order = ?plan.order, waves = plan.waves.len(), "Executing plan");
        let scheduler = Scheduler::new(executor, self.config.concurrency);
        let outcomes = scheduler
            .run(set, &plan.order, Resolved::from_state(&state))
            .await?;
        Ok((plan.order, outcomes))
    }

    /// Submits the role grant batch using the addresses currently in the store.
    ///
    /// Refuses while any component of `set` is not yet satisfied.
    pub async fn bootstrap_only(
        &self,
        set: &ComponentSet,
        catalog: &RoleCatalog,
    ) -> Result<GrantReport, DeployError> {
        catalog.validate(set)?;
        let state = self.store.load().await?;
        let pending: Vec<String> = set
            .iter()
            .filter(|spec| {
                !state
                    .find(&spec.name)
                    .is_some_and(|r| r.satisfies(spec.kind))
            })
            .map(|spec| spec.name.clone())
            .collect();
        if !pending.is_empty() {
            return Err(DeployError::ComponentsPending(pending));
        }
        RoleBootstrapper::new(self.network.clone(), self.config.retry.clone())
            .bootstrap(catalog, &state)
            .await
    }

    /// Removes a component's record so the next run deploys it afresh.
    pub async fn forget(&self, name: &str) -> Result<Option<DeploymentRecord>, DeployError> {
        Ok(self.store.forget(name).await?)
    }

    pub async fn state(&self) -> Result<DeploymentState, DeployError> {
        Ok(self.store.load().await?)
    }

    /// Loads the artifact of every component that still needs work.
    fn preflight_artifacts(
        &self,
        set: &ComponentSet,
        state: &DeploymentState,
    ) -> Result<(), DeployError> {
        let mut checked = 0;
        for spec in set.iter() {
            let satisfied = state
                .find(&spec.name)
                .is_some_and(|r| r.satisfies(spec.kind));
            if !satisfied {
                self.artifacts.load(&spec.artifact)?;
                checked += 1;
            }
        }
        info!(checked, "Artifacts present");
        Ok(())
    }

    /// Drops the store client and waits for the actor to finish.
    pub async fn shutdown(self) -> Result<(), DeployError> {
        drop(self.store);
        for handle in self.handles {
            handle
                .await
                .map_err(|e| DeployError::TaskAborted(e.to_string()))?;
        }
        Ok(())
    }
}
