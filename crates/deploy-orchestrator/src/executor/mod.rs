//! # Deployment Executor
//!
//! [`Executor::ensure_deployed`] brings one component to its target state and
//! is safe to call any number of times:
//!
//! 1. **Claim** the name in the store (at most one in-flight deployment per name).
//! 2. **Check** the stored record. A satisfied component returns unchanged.
//! 3. **Resolve** constructor calldata from already satisfied dependencies.
//! 4. **Declare**, through the per-artifact cache. "Already declared" is success.
//!    A `Declared` checkpoint is persisted with the class hash.
//! 5. **Deploy** (unless declare-only), wait for finality, persist `Deployed`.
//! 6. **Release** the claim, on success and on failure alike.
//!
//! Transient failures are retried per step under the [`RetryPolicy`]. A deploy
//! whose transaction was accepted but not yet final is waited on again rather
//! than resubmitted. Each submission is checkpointed on the record as a
//! [`PendingDeploy`] before the wait, so this holds across runs too: only a
//! rejected or reverted transaction is ever replaced. When retries run out, a
//! `Failed` record (no address) is written so the next run starts from the last
//! good checkpoint.
//!
//! Independent components are driven concurrently by the [`Scheduler`].

pub mod retry;
pub mod scheduler;

pub use retry::{retry, RetryError, RetryPolicy};
pub use scheduler::Scheduler;

use crate::artifact::{Artifact, ArtifactLoader};
use crate::error::DeployError;
use crate::model::{
    Address, ArtifactRef, ClassHash, ComponentKind, ComponentSet, ComponentSpec, ConstructorArg,
    ConstructorInput, DeploymentRecord, DeploymentStatus, Felt, PendingDeploy,
};
use crate::network::{DeployResult, NetworkClient, NetworkError};
use crate::store::{DeploymentState, StoreClient};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Class hashes already known for this run, keyed by artifact.
///
/// Concurrent requests for the same artifact share a single declare.
#[derive(Debug, Clone, Default)]
pub struct DeclareCache {
    cells: Arc<Mutex<HashMap<ArtifactRef, Arc<OnceCell<ClassHash>>>>>,
}

impl DeclareCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, artifact: &ArtifactRef) -> Arc<OnceCell<ClassHash>> {
        lock(&self.cells)
            .entry(artifact.clone())
            .or_default()
            .clone()
    }

    /// Records a known class hash. A hash already cached for the artifact wins.
    pub fn seed(&self, artifact: &ArtifactRef, class_hash: ClassHash) {
        let _ = self.cell(artifact).set(class_hash);
    }

    pub fn get(&self, artifact: &ArtifactRef) -> Option<ClassHash> {
        lock(&self.cells)
            .get(artifact)
            .and_then(|cell| cell.get().cloned())
    }

    pub fn len(&self) -> usize {
        lock(&self.cells)
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Addresses and class hashes available for constructor substitution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolved {
    pub addresses: HashMap<String, Address>,
    pub class_hashes: HashMap<String, ClassHash>,
}

impl Resolved {
    pub fn from_state(state: &DeploymentState) -> Self {
        let mut resolved = Self::default();
        for record in state.records() {
            if let Some(address) = state.address_of(&record.name) {
                resolved
                    .addresses
                    .insert(record.name.clone(), address.clone());
            }
            let declared = matches!(
                record.status,
                DeploymentStatus::Declared | DeploymentStatus::Deployed
            );
            if let (true, Some(hash)) = (declared, &record.class_hash) {
                resolved
                    .class_hashes
                    .insert(record.name.clone(), hash.clone());
            }
        }
        resolved
    }

    pub fn record(&mut self, outcome: &ComponentOutcome) {
        if let Some(address) = &outcome.address {
            self.addresses.insert(outcome.name.clone(), address.clone());
        }
        if let Some(hash) = &outcome.class_hash {
            self.class_hashes.insert(outcome.name.clone(), hash.clone());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// Nothing to do; the stored record already satisfied the component.
    AlreadySatisfied,
    /// A declare-only component was declared (or found declared) this run.
    Declared,
    Deployed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentOutcome {
    pub name: String,
    pub kind: OutcomeKind,
    pub address: Option<Address>,
    pub class_hash: Option<ClassHash>,
}

impl ComponentOutcome {
    fn satisfied(record: &DeploymentRecord) -> Self {
        Self {
            name: record.name.clone(),
            kind: OutcomeKind::AlreadySatisfied,
            address: record.address.clone(),
            class_hash: record.class_hash.clone(),
        }
    }
}

/// Drives declare/deploy for single components. Cheap to clone.
#[derive(Clone)]
pub struct Executor {
    network: Arc<dyn NetworkClient>,
    artifacts: Arc<ArtifactLoader>,
    store: StoreClient,
    policy: RetryPolicy,
    declared: DeclareCache,
}

impl Executor {
    pub fn new(
        network: Arc<dyn NetworkClient>,
        artifacts: Arc<ArtifactLoader>,
        store: StoreClient,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            network,
            artifacts,
            store,
            policy,
            declared: DeclareCache::new(),
        }
    }

    pub fn declared(&self) -> &DeclareCache {
        &self.declared
    }

    /// Seeds the declare cache with class hashes recorded by earlier runs.
    pub fn seed_declared(&self, set: &ComponentSet, state: &DeploymentState) {
        for spec in set.iter() {
            let hash = state
                .find(&spec.name)
                .filter(|r| r.status != DeploymentStatus::Failed)
                .and_then(|r| r.class_hash.clone());
            if let Some(hash) = hash {
                self.declared.seed(&spec.artifact, hash);
            }
        }
        debug!(artifacts = self.declared.len(), "Seeded declare cache");
    }

    /// Ensures `spec` is declared (and deployed, unless declare-only).
    ///
    /// `resolved` must hold the address or class hash of every component `spec`
    /// references; a missing entry is reported as [`DeployError::Inconsistent`].
    #[instrument(skip(self, spec, resolved), fields(component = %spec.name))]
    pub async fn ensure_deployed(
        &self,
        spec: &ComponentSpec,
        resolved: &Resolved,
    ) -> Result<ComponentOutcome, DeployError> {
        self.store.claim(&spec.name).await?;
        let result = self.ensure_claimed(spec, resolved).await;
        if let Err(e) = self.store.release(&spec.name).await {
            warn!(error = %e, "Release failed");
        }
        result
    }

    async fn ensure_claimed(
        &self,
        spec: &ComponentSpec,
        resolved: &Resolved,
    ) -> Result<ComponentOutcome, DeployError> {
        let existing = self.store.find(&spec.name).await?;
        if let Some(record) = existing.as_ref().filter(|r| r.satisfies(spec.kind)) {
            if let Some(hash) = &record.class_hash {
                self.declared.seed(&spec.artifact, hash.clone());
            }
            info!(status = %record.status, "Already satisfied");
            return Ok(ComponentOutcome::satisfied(record));
        }

        // Calldata first: a missing dependency must fail before any network call.
        let inputs = match spec.kind {
            ComponentKind::Deploy => self.constructor_inputs(spec, resolved)?,
            ComponentKind::DeclareOnly => Vec::new(),
        };

        let resumed = existing.as_ref().and_then(|r| r.pending_deploy.clone());
        let class_hash = match self.class_hash_for(spec, existing.as_ref()).await {
            Ok(hash) => hash,
            Err(e) => return Err(self.record_failure(spec, None, resumed, e).await),
        };
        self.store
            .upsert(
                DeploymentRecord::declared(&spec.name, class_hash.clone())
                    .with_pending(resumed.clone()),
            )
            .await?;

        if spec.kind == ComponentKind::DeclareOnly {
            info!(class_hash = %class_hash, "Declared");
            return Ok(ComponentOutcome {
                name: spec.name.clone(),
                kind: OutcomeKind::Declared,
                address: None,
                class_hash: Some(class_hash),
            });
        }

        let calldata: Vec<Felt> = inputs.iter().map(|i| i.value.clone()).collect();
        if let Some(pending) = &resumed {
            info!(tx = %pending.tx, "Resuming pending deploy");
        }
        let pending = Mutex::new(resumed);
        let deployed = match self.deploy(&spec.name, &class_hash, &calldata, &pending).await {
            Ok(deployed) => deployed,
            Err(e) => {
                let submitted = lock(&pending).take();
                return Err(self.record_failure(spec, Some(class_hash), submitted, e).await);
            }
        };

        self.store
            .upsert(DeploymentRecord::deployed(
                &spec.name,
                deployed.address.clone(),
                class_hash.clone(),
                inputs,
            ))
            .await?;
        info!(address = %deployed.address, class_hash = %class_hash, tx = %deployed.tx, "Deployed");

        Ok(ComponentOutcome {
            name: spec.name.clone(),
            kind: OutcomeKind::Deployed,
            address: Some(deployed.address),
            class_hash: Some(class_hash),
        })
    }

    /// Substitutes every constructor argument with a concrete felt.
    pub fn constructor_inputs(
        &self,
        spec: &ComponentSpec,
        resolved: &Resolved,
    ) -> Result<Vec<ConstructorInput>, DeployError> {
        let missing = |target: &str, what: &str| DeployError::Inconsistent {
            component: spec.name.clone(),
            detail: format!("no {what} resolved for dependency {target}"),
        };

        spec.constructor
            .iter()
            .map(|param| {
                let value = match &param.value {
                    ConstructorArg::Literal(felt) => felt.clone(),
                    ConstructorArg::ShortString(text) => Felt::from_short_string(text)
                        .map_err(|e| DeployError::InvalidArgument {
                            component: spec.name.clone(),
                            param: param.name.clone(),
                            reason: e.to_string(),
                        })?,
                    ConstructorArg::AddressOf(target) => resolved
                        .addresses
                        .get(target)
                        .map(|a| a.felt().clone())
                        .ok_or_else(|| missing(target, "address"))?,
                    ConstructorArg::ClassHashOf(target) => resolved
                        .class_hashes
                        .get(target)
                        .map(|h| h.felt().clone())
                        .ok_or_else(|| missing(target, "class hash"))?,
                    ConstructorArg::Deployer => self.network.deployer().felt().clone(),
                };
                Ok(ConstructorInput {
                    name: param.name.clone(),
                    value,
                })
            })
            .collect()
    }

    async fn class_hash_for(
        &self,
        spec: &ComponentSpec,
        existing: Option<&DeploymentRecord>,
    ) -> Result<ClassHash, DeployError> {
        if let Some(hash) = existing.and_then(|r| r.class_hash.clone()) {
            debug!(class_hash = %hash, "Declare checkpoint found");
            self.declared.seed(&spec.artifact, hash.clone());
            return Ok(hash);
        }
        if let Some(hash) = self.declared.get(&spec.artifact) {
            debug!(class_hash = %hash, "Declare cache hit");
            return Ok(hash);
        }

        let artifact = self.artifacts.load(&spec.artifact)?;
        let cell = self.declared.cell(&spec.artifact);
        cell.get_or_try_init(|| self.declare(&spec.name, &artifact))
            .await
            .cloned()
    }

    async fn declare(&self, component: &str, artifact: &Artifact) -> Result<ClassHash, DeployError> {
        let network = self.network.as_ref();
        retry(&self.policy, "declare", component, |attempt| async move {
            match network.declare(artifact).await {
                Ok(declared) => {
                    debug!(component, attempt, tx = %declared.tx, "Declare submitted");
                    network.wait_for_finality(&declared.tx).await?;
                    info!(component, class_hash = %declared.class_hash, "Class declared");
                    Ok(declared.class_hash)
                }
                Err(NetworkError::AlreadyDeclared { class_hash }) => {
                    let hash = match class_hash {
                        Some(hash) => hash,
                        None => network.class_hash(artifact)?,
                    };
                    info!(component, class_hash = %hash, "Already declared");
                    Ok(hash)
                }
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(|e| DeployError::DeploymentFailed {
            component: component.to_string(),
            attempts: e.attempts,
            source: e.last,
        })
    }

    /// Deploys, or waits on the transaction already in `pending`, until final.
    ///
    /// `pending` holds the latest submission when this returns an error.
    async fn deploy(
        &self,
        component: &str,
        class_hash: &ClassHash,
        calldata: &[Felt],
        pending: &Mutex<Option<PendingDeploy>>,
    ) -> Result<DeployResult, DeployError> {
        let network = self.network.as_ref();
        let store = &self.store;

        retry(&self.policy, "deploy", component, |attempt| async move {
            let current = lock(pending).clone();
            let submitted = match current {
                Some(submitted) => {
                    debug!(component, attempt, tx = %submitted.tx, "Waiting on pending deploy");
                    submitted
                }
                None => {
                    let DeployResult { address, tx } = network.deploy(class_hash, calldata).await?;
                    debug!(component, attempt, tx = %tx, "Deploy submitted");
                    let submitted = PendingDeploy { tx, address };
                    *lock(pending) = Some(submitted.clone());
                    let checkpoint = DeploymentRecord::declared(component, class_hash.clone())
                        .with_pending(Some(submitted.clone()));
                    if let Err(e) = store.upsert(checkpoint).await {
                        warn!(component, error = %e, "Could not checkpoint pending deploy");
                    }
                    submitted
                }
            };
            match network.wait_for_finality(&submitted.tx).await {
                Ok(()) => Ok(DeployResult {
                    address: submitted.address,
                    tx: submitted.tx,
                }),
                Err(e) => {
                    if matches!(e, NetworkError::Rejected(_) | NetworkError::Reverted { .. }) {
                        *lock(pending) = None;
                    }
                    Err(e)
                }
            }
        })
        .await
        .map_err(|e| DeployError::DeploymentFailed {
            component: component.to_string(),
            attempts: e.attempts,
            source: e.last,
        })
    }

    /// Persists a `Failed` record for network failures and hands the error back.
    ///
    /// A deploy still awaiting finality stays on the record for the next run.
    async fn record_failure(
        &self,
        spec: &ComponentSpec,
        class_hash: Option<ClassHash>,
        pending: Option<PendingDeploy>,
        error: DeployError,
    ) -> DeployError {
        if let DeployError::DeploymentFailed { .. } = &error {
            let record = DeploymentRecord::failed(&spec.name, class_hash).with_pending(pending);
            if let Err(e) = self.store.upsert(record).await {
                warn!(error = %e, "Could not record failure");
            }
        }
        warn!(error = %error, "Component failed");
        error
    }
}
