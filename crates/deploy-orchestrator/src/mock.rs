//! # Test Doubles
//!
//! Two kinds of doubles, matching the two seams of the orchestrator:
//!
//! | Double | Replaces | Use it for |
//! |--------|----------|------------|
//! | [`SimulatedNetwork`] | a live [`NetworkClient`] | full runs, fault injection, call counting |
//! | [`create_mock_store`] | the store actor | asserting the exact requests an executor sends |
//!
//! ## SimulatedNetwork
//!
//! An in-memory chain. Class hashes are content derived (sha256 of the class
//! JSON), so declaring the same artifact twice answers "already declared",
//! exactly like a real node. Deployments get fresh addresses; role grants go
//! into a set, so granting a held role changes nothing.
//!
//! Failures are injected per operation and target:
//!
//! ```
//! use deploy_orchestrator::mock::SimulatedNetwork;
//! use deploy_orchestrator::network::NetworkError;
//!
//! let network = SimulatedNetwork::new();
//! network
//!     .fail_deploy("Router")
//!     .times(2)
//!     .with(NetworkError::Transient("node busy".into()));
//! network.fail_execute().with(NetworkError::Fatal("out of gas".into()));
//! ```
//!
//! Injected faults are consumed in order; [`SimulatedNetwork::verify`] panics if
//! any were never hit.
//!
//! ## Mock store
//!
//! [`create_mock_store`] hands back a [`StoreClient`] and the raw request
//! receiver. Pair it with the `expect_*` helpers to answer requests by hand.

use crate::artifact::Artifact;
use crate::model::{Address, ArtifactRef, ClassHash, DeploymentRecord, Felt, TxHash};
use crate::network::{Call, DeclareResult, DeployResult, NetworkClient, NetworkError};
use crate::store::{DeploymentState, Response, StoreClient, StoreRequest};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

// =============================================================================
// SIMULATED NETWORK
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Declare,
    Deploy,
    Finality,
    Execute,
}

#[derive(Debug)]
struct Fault {
    operation: Operation,
    /// Artifact name the fault applies to; `None` matches any.
    target: Option<String>,
    remaining: u32,
    error: NetworkError,
}

/// A deployment as the simulated chain saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployCall {
    pub artifact: Option<ArtifactRef>,
    pub class_hash: ClassHash,
    pub calldata: Vec<Felt>,
    pub address: Address,
}

#[derive(Debug, Default)]
struct Ledger {
    nonce: u64,
    declared: HashSet<ClassHash>,
    class_names: HashMap<ClassHash, ArtifactRef>,
    contracts: HashMap<Address, ClassHash>,
    /// `(role_store, grantee, role)`
    grants: BTreeSet<(Address, Felt, Felt)>,
    /// Which artifact a transaction belongs to, for targeted finality faults.
    tx_targets: HashMap<TxHash, Option<ArtifactRef>>,
    declare_calls: Vec<ArtifactRef>,
    deploys: Vec<DeployCall>,
    execute_calls: usize,
    finality_calls: usize,
    in_flight: HashSet<TxHash>,
    max_in_flight: usize,
    faults: VecDeque<Fault>,
}

impl Ledger {
    fn next_nonce(&mut self) -> u64 {
        self.nonce += 1;
        self.nonce
    }

    fn take_fault(&mut self, operation: Operation, target: Option<&ArtifactRef>) -> Option<NetworkError> {
        let index = self.faults.iter().position(|f| {
            f.operation == operation
                && match (&f.target, target) {
                    (None, _) => true,
                    (Some(wanted), Some(actual)) => wanted == actual.as_str(),
                    (Some(_), None) => false,
                }
        })?;
        let fault = &mut self.faults[index];
        fault.remaining -= 1;
        let error = fault.error.clone();
        if fault.remaining == 0 {
            self.faults.remove(index);
        }
        Some(error)
    }

    fn tx_hash(&mut self, tag: &str, target: Option<ArtifactRef>) -> TxHash {
        let nonce = self.next_nonce();
        let tx = TxHash(digest_felt(&[tag.as_bytes(), &nonce.to_be_bytes()]));
        self.tx_targets.insert(tx.clone(), target);
        tx
    }
}

/// Hashes `parts` and keeps 31 bytes so the result is a valid felt.
fn digest_felt(parts: &[&[u8]]) -> Felt {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let hex: String = digest[..31].iter().map(|b| format!("{b:02x}")).collect();
    Felt::from_hex(&hex).unwrap_or_else(|_| Felt::zero())
}

/// In-memory [`NetworkClient`] with fault injection and call counters.
pub struct SimulatedNetwork {
    deployer: Address,
    latency: Duration,
    ledger: Mutex<Ledger>,
}

impl Default for SimulatedNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedNetwork {
    pub fn new() -> Self {
        Self {
            deployer: Address(digest_felt(&[b"deployer"])),
            latency: Duration::ZERO,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    pub fn with_deployer(mut self, deployer: Address) -> Self {
        self.deployer = deployer;
        self
    }

    /// Delays every finality wait, so concurrent deployments overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Content hash of an artifact's class.
    pub fn compute_class_hash(artifact: &Artifact) -> ClassHash {
        let class = serde_json::to_vec(&artifact.class).unwrap_or_default();
        ClassHash(digest_felt(&[b"class", class.as_slice()]))
    }

    /// Marks an artifact as declared by an earlier, unrelated run.
    pub fn pre_declare(&self, artifact: &Artifact) -> ClassHash {
        let hash = Self::compute_class_hash(artifact);
        let mut ledger = self.ledger();
        ledger.declared.insert(hash.clone());
        ledger
            .class_names
            .insert(hash.clone(), artifact.reference.clone());
        hash
    }

    /// Treats everything recorded in `state` as already on chain.
    pub fn adopt(&self, state: &DeploymentState) {
        let mut ledger = self.ledger();
        for record in state.records() {
            // Legacy entries carry no class hash.
            let hash = record
                .class_hash
                .clone()
                .unwrap_or_else(|| ClassHash(Felt::zero()));
            if record.class_hash.is_some() {
                ledger.declared.insert(hash.clone());
                ledger
                    .class_names
                    .entry(hash.clone())
                    .or_insert_with(|| ArtifactRef::new(record.name.clone()));
            }
            if let Some(address) = record.address.as_ref().filter(|_| record.is_deployed()) {
                ledger.contracts.insert(address.clone(), hash.clone());
            }
            // A recorded pending deploy is taken to have landed.
            if let Some(pending) = &record.pending_deploy {
                let target = ledger.class_names.get(&hash).cloned();
                ledger.tx_targets.insert(pending.tx.clone(), target);
                ledger.contracts.insert(pending.address.clone(), hash.clone());
            }
        }
    }

    pub fn fail_declare(&self, artifact: impl Into<String>) -> FaultBuilder<'_> {
        FaultBuilder::new(self, Operation::Declare, Some(artifact.into()))
    }

    pub fn fail_deploy(&self, artifact: impl Into<String>) -> FaultBuilder<'_> {
        FaultBuilder::new(self, Operation::Deploy, Some(artifact.into()))
    }

    /// Fails finality waits on transactions for `artifact` (declare or deploy).
    pub fn fail_finality(&self, artifact: impl Into<String>) -> FaultBuilder<'_> {
        FaultBuilder::new(self, Operation::Finality, Some(artifact.into()))
    }

    /// Fails finality waits on any transaction, grant batches included.
    pub fn fail_any_finality(&self) -> FaultBuilder<'_> {
        FaultBuilder::new(self, Operation::Finality, None)
    }

    pub fn fail_execute(&self) -> FaultBuilder<'_> {
        FaultBuilder::new(self, Operation::Execute, None)
    }

    pub fn declare_count(&self) -> usize {
        self.ledger().declare_calls.len()
    }

    pub fn declare_count_for(&self, artifact: &str) -> usize {
        self.ledger()
            .declare_calls
            .iter()
            .filter(|a| a.as_str() == artifact)
            .count()
    }

    pub fn deploys(&self) -> Vec<DeployCall> {
        self.ledger().deploys.clone()
    }

    pub fn deploys_of(&self, artifact: &str) -> Vec<DeployCall> {
        self.ledger()
            .deploys
            .iter()
            .filter(|d| d.artifact.as_ref().is_some_and(|a| a.as_str() == artifact))
            .cloned()
            .collect()
    }

    pub fn execute_count(&self) -> usize {
        self.ledger().execute_calls
    }

    pub fn finality_count(&self) -> usize {
        self.ledger().finality_calls
    }

    /// Highest number of deployments submitted but not yet final at once.
    pub fn max_in_flight(&self) -> usize {
        self.ledger().max_in_flight
    }

    pub fn is_declared(&self, class_hash: &ClassHash) -> bool {
        self.ledger().declared.contains(class_hash)
    }

    /// Effective grants as `(role_store, grantee, role)`.
    pub fn grants(&self) -> BTreeSet<(Address, Felt, Felt)> {
        self.ledger().grants.clone()
    }

    pub fn has_grant(&self, grantee: &Address, role: &Felt) -> bool {
        self.ledger()
            .grants
            .iter()
            .any(|(_, g, r)| g == grantee.felt() && r == role)
    }

    /// Panics if any injected fault was never triggered.
    pub fn verify(&self) {
        let ledger = self.ledger();
        if !ledger.faults.is_empty() {
            panic!(
                "Not all injected faults were hit. {} remaining: {:?}",
                ledger.faults.len(),
                ledger.faults
            );
        }
    }
}

#[async_trait]
impl NetworkClient for SimulatedNetwork {
    fn deployer(&self) -> Address {
        self.deployer.clone()
    }

    fn class_hash(&self, artifact: &Artifact) -> Result<ClassHash, NetworkError> {
        Ok(Self::compute_class_hash(artifact))
    }

    async fn declare(&self, artifact: &Artifact) -> Result<DeclareResult, NetworkError> {
        let hash = Self::compute_class_hash(artifact);
        let mut ledger = self.ledger();
        ledger.declare_calls.push(artifact.reference.clone());
        if let Some(error) = ledger.take_fault(Operation::Declare, Some(&artifact.reference)) {
            return Err(error);
        }
        if ledger.declared.contains(&hash) {
            return Err(NetworkError::AlreadyDeclared { class_hash: None });
        }
        ledger.declared.insert(hash.clone());
        ledger
            .class_names
            .insert(hash.clone(), artifact.reference.clone());
        let tx = ledger.tx_hash("declare", Some(artifact.reference.clone()));
        Ok(DeclareResult {
            class_hash: hash,
            tx,
        })
    }

    async fn deploy(
        &self,
        class_hash: &ClassHash,
        calldata: &[Felt],
    ) -> Result<DeployResult, NetworkError> {
        let mut ledger = self.ledger();
        let artifact = ledger.class_names.get(class_hash).cloned();
        if let Some(error) = ledger.take_fault(Operation::Deploy, artifact.as_ref()) {
            return Err(error);
        }
        if !ledger.declared.contains(class_hash) {
            return Err(NetworkError::Fatal(format!("class {class_hash} is not declared")));
        }

        let nonce = ledger.next_nonce();
        let mut parts: Vec<Vec<u8>> = vec![
            b"deploy".to_vec(),
            class_hash.to_string().into_bytes(),
            nonce.to_be_bytes().to_vec(),
        ];
        parts.extend(calldata.iter().map(|f| f.to_string().into_bytes()));
        let slices: Vec<&[u8]> = parts.iter().map(Vec::as_slice).collect();
        let address = Address(digest_felt(&slices));

        ledger.contracts.insert(address.clone(), class_hash.clone());
        ledger.deploys.push(DeployCall {
            artifact: artifact.clone(),
            class_hash: class_hash.clone(),
            calldata: calldata.to_vec(),
            address: address.clone(),
        });
        let tx = ledger.tx_hash("deploy", artifact);
        ledger.in_flight.insert(tx.clone());
        ledger.max_in_flight = ledger.max_in_flight.max(ledger.in_flight.len());
        Ok(DeployResult { address, tx })
    }

    async fn wait_for_finality(&self, tx: &TxHash) -> Result<(), NetworkError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut ledger = self.ledger();
        ledger.finality_calls += 1;
        let Some(target) = ledger.tx_targets.get(tx).cloned() else {
            return Err(NetworkError::Fatal(format!("unknown transaction {tx}")));
        };
        if let Some(error) = ledger.take_fault(Operation::Finality, target.as_ref()) {
            return Err(error);
        }
        ledger.in_flight.remove(tx);
        Ok(())
    }

    async fn execute(&self, calls: &[Call]) -> Result<TxHash, NetworkError> {
        let mut ledger = self.ledger();
        ledger.execute_calls += 1;
        if let Some(error) = ledger.take_fault(Operation::Execute, None) {
            return Err(error);
        }

        // Validate the whole batch before applying any of it.
        let mut effects = Vec::with_capacity(calls.len());
        for call in calls {
            if !ledger.contracts.contains_key(&call.to) {
                return Err(NetworkError::Fatal(format!("no contract at {}", call.to)));
            }
            match (call.entrypoint.as_str(), call.calldata.as_slice()) {
                ("grant_role", [grantee, role]) => {
                    effects.push((call.to.clone(), grantee.clone(), role.clone()));
                }
                (entrypoint, _) => {
                    return Err(NetworkError::Fatal(format!(
                        "unsupported call {entrypoint} with {} argument(s)",
                        call.calldata.len()
                    )));
                }
            }
        }
        ledger.grants.extend(effects);
        Ok(ledger.tx_hash("execute", None))
    }
}

/// Fluent builder returned by the `fail_*` methods.
pub struct FaultBuilder<'a> {
    network: &'a SimulatedNetwork,
    operation: Operation,
    target: Option<String>,
    times: u32,
}

impl<'a> FaultBuilder<'a> {
    fn new(network: &'a SimulatedNetwork, operation: Operation, target: Option<String>) -> Self {
        Self {
            network,
            operation,
            target,
            times: 1,
        }
    }

    /// How many consecutive matching calls fail. Defaults to one.
    pub fn times(mut self, times: u32) -> Self {
        self.times = times;
        self
    }

    /// Registers the fault.
    pub fn with(self, error: NetworkError) {
        if self.times == 0 {
            return;
        }
        self.network.ledger().faults.push_back(Fault {
            operation: self.operation,
            target: self.target,
            remaining: self.times,
            error,
        });
    }
}

/// Writes a minimal class / compiled class pair per name under `dir`.
pub fn write_artifacts(dir: &Path, package: &str, names: &[&str]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    for name in names {
        let class = serde_json::json!({ "contract": name, "abi": [], "sierra_program": [] });
        let compiled = serde_json::json!({ "contract": name, "bytecode": [] });
        std::fs::write(
            dir.join(format!("{package}_{name}.contract_class.json")),
            class.to_string(),
        )?;
        std::fs::write(
            dir.join(format!("{package}_{name}.compiled_contract_class.json")),
            compiled.to_string(),
        )?;
    }
    Ok(())
}

// =============================================================================
// MOCK STORE
// =============================================================================

/// Creates a store client wired to a receiver the test controls.
pub fn create_mock_store(buffer_size: usize) -> (StoreClient, mpsc::Receiver<StoreRequest>) {
    let (sender, receiver) = mpsc::channel(buffer_size);
    (StoreClient::new(sender), receiver)
}

/// Helper to verify that the next message is a Claim request
pub async fn expect_claim(
    receiver: &mut mpsc::Receiver<StoreRequest>,
) -> Option<(String, Response<()>)> {
    match receiver.recv().await {
        Some(StoreRequest::Claim { name, respond_to }) => Some((name, respond_to)),
        _ => None,
    }
}

/// Helper to verify that the next message is a Find request
pub async fn expect_find(
    receiver: &mut mpsc::Receiver<StoreRequest>,
) -> Option<(String, Response<Option<DeploymentRecord>>)> {
    match receiver.recv().await {
        Some(StoreRequest::Find { name, respond_to }) => Some((name, respond_to)),
        _ => None,
    }
}

/// Helper to verify that the next message is an Upsert request
pub async fn expect_upsert(
    receiver: &mut mpsc::Receiver<StoreRequest>,
) -> Option<(DeploymentRecord, Response<bool>)> {
    match receiver.recv().await {
        Some(StoreRequest::Upsert { record, respond_to }) => Some((record, respond_to)),
        _ => None,
    }
}

/// Helper to verify that the next message is a Release request
pub async fn expect_release(
    receiver: &mut mpsc::Receiver<StoreRequest>,
) -> Option<(String, Response<()>)> {
    match receiver.recv().await {
        Some(StoreRequest::Release { name, respond_to }) => Some((name, respond_to)),
        _ => None,
    }
}
