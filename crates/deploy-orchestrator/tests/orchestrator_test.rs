use deploy_orchestrator::mock::{write_artifacts, SimulatedNetwork};
use deploy_orchestrator::model::{
    ArtifactRef, ComponentSet, ComponentSpec, DeploymentRecord, DeploymentStatus, TxHash,
};
use deploy_orchestrator::network::NetworkError;
use deploy_orchestrator::roles::{Grantee, Role, RoleCatalog};
use deploy_orchestrator::{
    ArtifactError, ArtifactLoader, DeployError, NetworkClient, Orchestrator, OrchestratorConfig,
    OutcomeKind, ResolveError, RetryPolicy,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const PACKAGE: &str = "app";

struct Fixture {
    dir: TempDir,
    network: Arc<SimulatedNetwork>,
}

impl Fixture {
    fn new(set: &ComponentSet) -> Self {
        Self::with_network(set, SimulatedNetwork::new())
    }

    fn with_network(set: &ComponentSet, network: SimulatedNetwork) -> Self {
        let dir = TempDir::new().unwrap();
        let names: Vec<&str> = set.iter().map(|s| s.artifact.as_str()).collect();
        write_artifacts(&dir.path().join("artifacts"), PACKAGE, &names).unwrap();
        Self {
            dir,
            network: Arc::new(network),
        }
    }

    fn state_path(&self) -> PathBuf {
        self.dir.path().join("deployed_contracts.json")
    }

    fn loader(&self) -> Arc<ArtifactLoader> {
        Arc::new(ArtifactLoader::new(self.dir.path().join("artifacts"), PACKAGE))
    }

    fn open(&self, config: OrchestratorConfig) -> Orchestrator {
        Orchestrator::open(
            self.state_path(),
            self.network.clone(),
            self.loader(),
            config,
        )
        .expect("Failed to open orchestrator")
    }

    fn records(&self) -> Vec<DeploymentRecord> {
        let raw = std::fs::read_to_string(self.state_path()).expect("state file missing");
        serde_json::from_str(&raw).expect("state file is not valid JSON")
    }

    fn record(&self, name: &str) -> DeploymentRecord {
        self.records()
            .into_iter()
            .find(|r| r.name == name)
            .unwrap_or_else(|| panic!("no record for {name}"))
    }
}

fn fast(concurrency: usize) -> OrchestratorConfig {
    OrchestratorConfig {
        retry: RetryPolicy::no_delay(5),
        concurrency,
    }
}

fn market_set() -> ComponentSet {
    ComponentSet::new()
        .with(ComponentSpec::deploy("RoleStore").deployer_arg("admin"))
        .with(ComponentSpec::deploy("DataStore").address_arg("role_store_address", "RoleStore"))
        .with(ComponentSpec::deploy("EventEmitter"))
        .with(
            ComponentSpec::deploy("OracleStore")
                .address_arg("role_store_address", "RoleStore")
                .address_arg("event_emitter_address", "EventEmitter"),
        )
        .with(ComponentSpec::declare_only("MarketToken"))
        .with(
            ComponentSpec::deploy("MarketFactory")
                .address_arg("data_store_address", "DataStore")
                .address_arg("role_store_address", "RoleStore")
                .address_arg("event_emitter_address", "EventEmitter")
                .class_hash_arg("market_token_class_hash", "MarketToken"),
        )
}

fn market_roles() -> RoleCatalog {
    RoleCatalog::new("RoleStore")
        .grant(Role::Admin, [Grantee::Deployer])
        .grant(Role::Controller, [Grantee::component("MarketFactory")])
        .grant(
            Role::MarketKeeper,
            [Grantee::Deployer, Grantee::component("MarketFactory")],
        )
}

/// A fresh run deploys everything in dependency order, then grants roles.
#[tokio::test]
async fn test_full_run_deploys_in_dependency_order() {
    let set = market_set();
    let fx = Fixture::new(&set);
    let orchestrator = fx.open(fast(4));

    let report = orchestrator.run(&set, Some(&market_roles())).await.unwrap();

    for spec in set.iter() {
        let at = |name: &str| report.order.iter().position(|n| n == name).unwrap();
        for dep in &spec.depends_on {
            assert!(at(dep) < at(&spec.name), "{dep} must precede {}", spec.name);
        }
    }
    assert_eq!(report.deployed(), 5);
    assert_eq!(report.declared(), 1);

    // Submission order on the network also respects dependencies.
    let deploys = fx.network.deploys();
    let submitted = |name: &str| {
        deploys
            .iter()
            .position(|d| d.artifact.as_ref().map(ArtifactRef::as_str) == Some(name))
            .unwrap()
    };
    assert!(submitted("RoleStore") < submitted("DataStore"));
    assert!(submitted("DataStore") < submitted("MarketFactory"));
    assert!(submitted("EventEmitter") < submitted("OracleStore"));

    let records = fx.records();
    assert_eq!(records.len(), 6);
    assert_eq!(fx.record("MarketToken").status, DeploymentStatus::Declared);
    assert!(fx.record("MarketToken").address.is_none());
    assert!(records
        .iter()
        .filter(|r| r.name != "MarketToken")
        .all(|r| r.status == DeploymentStatus::Deployed && r.address.is_some()));

    let grants = report.grants.expect("roles were bootstrapped");
    assert_eq!(grants.calls.len(), 4);
    assert!(grants.tx.is_some());
    orchestrator.shutdown().await.unwrap();
}

/// A dependency cycle is reported before anything touches the network or the state file.
#[tokio::test]
async fn test_cycle_aborts_before_any_network_call() {
    let set = ComponentSet::new()
        .with(ComponentSpec::deploy("A").address_arg("b_address", "B"))
        .with(ComponentSpec::deploy("B").address_arg("a_address", "A"));
    let fx = Fixture::new(&set);
    let orchestrator = fx.open(fast(4));

    let err = orchestrator.run(&set, None).await.unwrap_err();

    match err {
        DeployError::Resolve(ResolveError::CyclicDependency { members }) => {
            assert!(members.contains(&"A".to_string()));
            assert!(members.contains(&"B".to_string()));
        }
        other => panic!("expected a cycle, got {other}"),
    }
    assert_eq!(fx.network.declare_count(), 0);
    assert!(fx.network.deploys().is_empty());
    assert_eq!(fx.network.execute_count(), 0);
    assert!(!fx.state_path().exists());
    orchestrator.shutdown().await.unwrap();
}

/// Running again against a complete state changes nothing on chain or on disk.
#[tokio::test]
async fn test_rerun_against_deployed_store_is_a_no_op() {
    let set = market_set();
    let fx = Fixture::new(&set);
    let catalog = market_roles();

    let first = fx.open(fast(4));
    first.run(&set, Some(&catalog)).await.unwrap();
    first.shutdown().await.unwrap();

    let before = std::fs::read(fx.state_path()).unwrap();
    let declares = fx.network.declare_count();
    let deploys = fx.network.deploys().len();
    let grants = fx.network.grants();

    let second = fx.open(fast(4));
    let report = second.run(&set, Some(&catalog)).await.unwrap();
    second.shutdown().await.unwrap();

    assert_eq!(report.satisfied(), set.len());
    assert_eq!(fx.network.declare_count(), declares);
    assert_eq!(fx.network.deploys().len(), deploys);
    assert_eq!(std::fs::read(fx.state_path()).unwrap(), before);
    // Re-granting held roles changes nothing.
    assert_eq!(fx.network.grants(), grants);
}

/// Constructor references are filled in with the recorded dependency address.
#[tokio::test]
async fn test_constructor_input_records_dependency_address() {
    let set = ComponentSet::new()
        .with(ComponentSpec::deploy("RoleStore"))
        .with(ComponentSpec::deploy("DataStore").address_arg("role_store_address", "RoleStore"));
    let fx = Fixture::new(&set);
    let orchestrator = fx.open(fast(1));

    orchestrator.run(&set, None).await.unwrap();
    orchestrator.shutdown().await.unwrap();

    let role_store = fx.record("RoleStore").address.unwrap();
    let data_store = fx.record("DataStore");
    assert_eq!(data_store.input("role_store_address"), Some(role_store.felt()));
    assert_eq!(
        fx.network.deploys_of("DataStore")[0].calldata,
        vec![role_store.felt().clone()]
    );
}

/// A class declared by someone else is reused, not an error.
#[tokio::test]
async fn test_already_declared_class_is_reused() {
    let set = market_set();
    let fx = Fixture::new(&set);
    let token = fx.loader().load(&ArtifactRef::new("MarketToken")).unwrap();
    let token_hash = fx.network.pre_declare(&token);

    let orchestrator = fx.open(fast(4));
    orchestrator.run(&set, None).await.unwrap();
    orchestrator.shutdown().await.unwrap();

    // One fresh declare was attempted and answered "already declared".
    assert_eq!(fx.network.declare_count_for("MarketToken"), 1);
    assert_eq!(fx.network.class_hash(&token).unwrap(), token_hash);
    assert_eq!(fx.record("MarketToken").class_hash, Some(token_hash.clone()));

    let factory = fx.network.deploys_of("MarketFactory");
    assert_eq!(factory.len(), 1);
    assert_eq!(factory[0].calldata.last(), Some(token_hash.felt()));
}

/// Transient deploy failures are retried and the component ends up with one record.
#[tokio::test]
async fn test_transient_failures_then_success() {
    let set = ComponentSet::new()
        .with(ComponentSpec::deploy("RoleStore"))
        .with(ComponentSpec::deploy("DataStore").address_arg("role_store_address", "RoleStore"));
    let fx = Fixture::new(&set);
    fx.network
        .fail_deploy("DataStore")
        .times(2)
        .with(NetworkError::Transient("node busy".into()));

    let orchestrator = fx.open(fast(1));
    orchestrator.run(&set, None).await.unwrap();
    orchestrator.shutdown().await.unwrap();

    let records: Vec<_> = fx
        .records()
        .into_iter()
        .filter(|r| r.name == "DataStore")
        .collect();
    assert_eq!(records.len(), 1);
    assert!(records[0].is_deployed());
    assert_eq!(fx.network.deploys_of("DataStore").len(), 1);
    fx.network.verify();
}

/// Running out of retries leaves a failed record with the class hash but no address.
#[tokio::test]
async fn test_exhausted_retries_leave_no_address() {
    let set = ComponentSet::new()
        .with(ComponentSpec::deploy("RoleStore"))
        .with(ComponentSpec::deploy("DataStore").address_arg("role_store_address", "RoleStore"));
    let fx = Fixture::new(&set);
    fx.network
        .fail_deploy("DataStore")
        .times(3)
        .with(NetworkError::Transient("timeout".into()));

    let orchestrator = fx.open(OrchestratorConfig {
        retry: RetryPolicy::no_delay(3),
        concurrency: 1,
    });
    let err = orchestrator.run(&set, None).await.unwrap_err();
    orchestrator.shutdown().await.unwrap();

    match &err {
        DeployError::DeploymentFailed {
            component,
            attempts,
            source,
        } => {
            assert_eq!(component, "DataStore");
            assert_eq!(*attempts, 3);
            assert_eq!(*source, NetworkError::Transient("timeout".into()));
        }
        other => panic!("expected DeploymentFailed, got {other}"),
    }
    assert_eq!(err.component(), Some("DataStore"));

    let failed = fx.record("DataStore");
    assert_eq!(failed.status, DeploymentStatus::Failed);
    assert!(failed.address.is_none());
    assert!(failed.class_hash.is_some());
    assert!(fx.record("RoleStore").is_deployed());
}

/// A flaky declare is retried like any other step.
#[tokio::test]
async fn test_transient_declare_failures_are_retried() {
    let set = ComponentSet::new().with(ComponentSpec::deploy("Router"));
    let fx = Fixture::new(&set);
    fx.network
        .fail_declare("Router")
        .times(2)
        .with(NetworkError::Transient("node busy".into()));

    let orchestrator = fx.open(fast(1));
    orchestrator.run(&set, None).await.unwrap();
    orchestrator.shutdown().await.unwrap();

    assert_eq!(fx.network.declare_count_for("Router"), 3);
    assert_eq!(fx.network.deploys_of("Router").len(), 1);
    assert!(fx.record("Router").is_deployed());
    fx.network.verify();
}

/// A declare that never succeeds leaves a failed record with neither class hash nor address.
#[tokio::test]
async fn test_exhausted_declare_leaves_no_class_hash() {
    let set = ComponentSet::new().with(ComponentSpec::deploy("Router"));
    let fx = Fixture::new(&set);
    fx.network
        .fail_declare("Router")
        .times(3)
        .with(NetworkError::Transient("timeout".into()));

    let orchestrator = fx.open(OrchestratorConfig {
        retry: RetryPolicy::no_delay(3),
        concurrency: 1,
    });
    let err = orchestrator.run(&set, None).await.unwrap_err();
    orchestrator.shutdown().await.unwrap();

    assert!(matches!(
        err,
        DeployError::DeploymentFailed { ref component, attempts: 3, .. } if component == "Router"
    ));
    let failed = fx.record("Router");
    assert_eq!(failed.status, DeploymentStatus::Failed);
    assert!(failed.class_hash.is_none());
    assert!(failed.address.is_none());
    assert!(fx.network.deploys().is_empty());
}

/// A run interrupted after declaring resumes at the deploy step.
#[tokio::test]
async fn test_resume_after_declare_does_not_redeclare() {
    let set = ComponentSet::new()
        .with(ComponentSpec::deploy("RoleStore"))
        .with(ComponentSpec::deploy("DataStore").address_arg("role_store_address", "RoleStore"));
    let fx = Fixture::new(&set);
    fx.network
        .fail_deploy("DataStore")
        .with(NetworkError::Fatal("process killed".into()));

    let first = fx.open(fast(1));
    assert!(first.run(&set, None).await.is_err());
    first.shutdown().await.unwrap();

    // Rewrite the record the way an interrupted run leaves it: declared, nothing deployed.
    let mut records = fx.records();
    let class_hash = fx.record("DataStore").class_hash.unwrap();
    records.retain(|r| r.name != "DataStore");
    records.push(DeploymentRecord::declared("DataStore", class_hash.clone()));
    std::fs::write(fx.state_path(), serde_json::to_string_pretty(&records).unwrap()).unwrap();

    let second = fx.open(fast(1));
    let report = second.run(&set, None).await.unwrap();
    second.shutdown().await.unwrap();

    assert_eq!(fx.network.declare_count_for("DataStore"), 1);
    assert_eq!(fx.network.deploys_of("DataStore").len(), 1);
    let outcome = report.outcomes.iter().find(|o| o.name == "DataStore").unwrap();
    assert_eq!(outcome.kind, OutcomeKind::Deployed);
    let data_store = fx.record("DataStore");
    assert!(data_store.is_deployed());
    assert_eq!(data_store.class_hash, Some(class_hash));
}

/// Granting held roles again is a no-op; new grants are added.
#[tokio::test]
async fn test_role_grants_are_idempotent() {
    let set = market_set();
    let fx = Fixture::new(&set);
    let catalog = market_roles();

    let orchestrator = fx.open(fast(4));
    orchestrator.run(&set, Some(&catalog)).await.unwrap();
    let once = fx.network.grants();

    orchestrator.bootstrap_only(&set, &catalog).await.unwrap();
    assert_eq!(fx.network.grants(), once);

    let extended = catalog.grant(Role::OrderKeeper, [Grantee::Deployer]);
    orchestrator.bootstrap_only(&set, &extended).await.unwrap();
    let after = fx.network.grants();
    assert_eq!(after.len(), once.len() + 1);
    assert!(once.is_subset(&after));
    assert!(fx
        .network
        .has_grant(&fx.network.deployer(), &Role::OrderKeeper.felt()));
    orchestrator.shutdown().await.unwrap();
}

/// A failed grant batch applies none of its grants.
#[tokio::test]
async fn test_role_grant_failure_applies_nothing() {
    let set = market_set();
    let fx = Fixture::new(&set);
    fx.network
        .fail_execute()
        .with(NetworkError::Fatal("multicall reverted".into()));

    let orchestrator = fx.open(fast(4));
    let err = orchestrator
        .run(&set, Some(&market_roles()))
        .await
        .unwrap_err();
    orchestrator.shutdown().await.unwrap();

    assert!(matches!(err, DeployError::RoleGrantFailed { grants: 4, .. }));
    assert!(fx.network.grants().is_empty());
    // Components stay deployed; only the grant batch is outstanding.
    assert_eq!(fx.records().len(), set.len());
}

/// A deploy that is slow to become final is waited on, not submitted twice.
#[tokio::test]
async fn test_pending_deploy_is_awaited_not_resubmitted() {
    let set = ComponentSet::new().with(ComponentSpec::deploy("DataStore"));
    let fx = Fixture::new(&set);
    let artifact = fx.loader().load(&ArtifactRef::new("DataStore")).unwrap();
    fx.network.pre_declare(&artifact);
    fx.network
        .fail_finality("DataStore")
        .times(2)
        .with(NetworkError::NotYetFinal(TxHash::from_hex("0x1").unwrap()));

    let orchestrator = fx.open(fast(1));
    orchestrator.run(&set, None).await.unwrap();
    orchestrator.shutdown().await.unwrap();

    assert_eq!(fx.network.deploys_of("DataStore").len(), 1);
    assert_eq!(fx.network.finality_count(), 3);
    assert!(fx.record("DataStore").is_deployed());
}

/// A deploy still unconfirmed when retries run out is picked up by the next run, not resubmitted.
#[tokio::test]
async fn test_unconfirmed_deploy_is_resumed_by_next_run() {
    let set = ComponentSet::new().with(ComponentSpec::deploy("Router"));
    let fx = Fixture::new(&set);
    let artifact = fx.loader().load(&ArtifactRef::new("Router")).unwrap();
    fx.network.pre_declare(&artifact);
    fx.network
        .fail_finality("Router")
        .times(4)
        .with(NetworkError::NotYetFinal(TxHash::from_hex("0x1").unwrap()));
    let config = OrchestratorConfig {
        retry: RetryPolicy::no_delay(3),
        concurrency: 1,
    };

    let first = fx.open(config.clone());
    let err = first.run(&set, None).await.unwrap_err();
    first.shutdown().await.unwrap();

    assert!(matches!(err, DeployError::DeploymentFailed { attempts: 3, .. }));
    let submitted = fx.network.deploys_of("Router");
    assert_eq!(submitted.len(), 1);
    let failed = fx.record("Router");
    assert_eq!(failed.status, DeploymentStatus::Failed);
    assert!(failed.address.is_none());
    let pending = failed.pending_deploy.expect("pending deploy was not recorded");
    assert_eq!(pending.address, submitted[0].address);

    let second = fx.open(config);
    let report = second.run(&set, None).await.unwrap();
    second.shutdown().await.unwrap();

    assert_eq!(report.deployed(), 1);
    assert_eq!(fx.network.deploys_of("Router").len(), 1);
    let router = fx.record("Router");
    assert!(router.is_deployed());
    assert_eq!(router.address, Some(submitted[0].address.clone()));
    assert!(router.pending_deploy.is_none());
    fx.network.verify();
}

/// A transaction that reverted is not waited on again; the next run deploys afresh.
#[tokio::test]
async fn test_reverted_pending_deploy_is_replaced_by_next_run() {
    let set = ComponentSet::new().with(ComponentSpec::deploy("Router"));
    let fx = Fixture::new(&set);
    let artifact = fx.loader().load(&ArtifactRef::new("Router")).unwrap();
    fx.network.pre_declare(&artifact);
    fx.network
        .fail_finality("Router")
        .with(NetworkError::Reverted {
            tx: TxHash::from_hex("0x1").unwrap(),
            reason: "out of gas".into(),
        });

    let first = fx.open(fast(1));
    assert!(first.run(&set, None).await.is_err());
    first.shutdown().await.unwrap();
    assert!(fx.record("Router").pending_deploy.is_none());

    let second = fx.open(fast(1));
    second.run(&set, None).await.unwrap();
    second.shutdown().await.unwrap();

    let deploys = fx.network.deploys_of("Router");
    assert_eq!(deploys.len(), 2);
    assert_eq!(fx.record("Router").address, Some(deploys[1].address.clone()));
}

/// A rejected submission is safe to send again.
#[tokio::test]
async fn test_rejected_deploy_is_resubmitted() {
    let set = ComponentSet::new().with(ComponentSpec::deploy("DataStore"));
    let fx = Fixture::new(&set);
    let artifact = fx.loader().load(&ArtifactRef::new("DataStore")).unwrap();
    fx.network.pre_declare(&artifact);
    fx.network
        .fail_finality("DataStore")
        .with(NetworkError::Rejected("nonce too low".into()));

    let orchestrator = fx.open(fast(1));
    orchestrator.run(&set, None).await.unwrap();
    orchestrator.shutdown().await.unwrap();

    let deploys = fx.network.deploys_of("DataStore");
    assert_eq!(deploys.len(), 2);
    assert_eq!(fx.record("DataStore").address, Some(deploys[1].address.clone()));
}

/// Independent components deploy in parallel, never beyond the concurrency limit.
#[tokio::test]
async fn test_independent_components_respect_concurrency_limit() {
    let set: ComponentSet = (0..8)
        .map(|i| ComponentSpec::deploy(format!("Vault{i}")))
        .collect();

    let fx = Fixture::with_network(
        &set,
        SimulatedNetwork::new().with_latency(Duration::from_millis(20)),
    );
    let orchestrator = fx.open(fast(3));
    let report = orchestrator.run(&set, None).await.unwrap();
    orchestrator.shutdown().await.unwrap();

    assert_eq!(report.deployed(), 8);
    let peak = fx.network.max_in_flight();
    assert!(peak > 1, "independent components should overlap, peak was {peak}");
    assert!(peak <= 3, "concurrency limit exceeded, peak was {peak}");

    // Outcomes come back in execution order regardless of completion order.
    let names: Vec<_> = report.outcomes.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, report.order.iter().map(String::as_str).collect::<Vec<_>>());
}

/// With a concurrency of one, components deploy strictly one after another.
#[tokio::test]
async fn test_concurrency_of_one_is_sequential() {
    let set: ComponentSet = (0..4)
        .map(|i| ComponentSpec::deploy(format!("Vault{i}")))
        .collect();
    let fx = Fixture::with_network(
        &set,
        SimulatedNetwork::new().with_latency(Duration::from_millis(5)),
    );
    let orchestrator = fx.open(fast(1));
    orchestrator.run(&set, None).await.unwrap();
    orchestrator.shutdown().await.unwrap();

    assert_eq!(fx.network.max_in_flight(), 1);
    let order: Vec<_> = fx
        .network
        .deploys()
        .into_iter()
        .filter_map(|d| d.artifact.map(|a| a.0))
        .collect();
    assert_eq!(order, vec!["Vault0", "Vault1", "Vault2", "Vault3"]);
}

/// Two components sharing an artifact cause a single declare.
#[tokio::test]
async fn test_shared_artifact_is_declared_once() {
    let set = ComponentSet::new()
        .with(ComponentSpec::deploy("DepositVault").with_artifact("StrictBank"))
        .with(ComponentSpec::deploy("WithdrawalVault").with_artifact("StrictBank"));
    let fx = Fixture::new(&set);

    let orchestrator = fx.open(fast(2));
    orchestrator.run(&set, None).await.unwrap();
    orchestrator.shutdown().await.unwrap();

    assert_eq!(fx.network.declare_count_for("StrictBank"), 1);
    assert_eq!(fx.network.deploys_of("StrictBank").len(), 2);
    assert_eq!(
        fx.record("DepositVault").class_hash,
        fx.record("WithdrawalVault").class_hash
    );
}

/// A missing artifact is reported before any network call.
#[tokio::test]
async fn test_missing_artifact_aborts_before_network() {
    let set = ComponentSet::new()
        .with(ComponentSpec::deploy("RoleStore"))
        .with(ComponentSpec::deploy("Router").after("RoleStore"));
    let fx = Fixture::new(&ComponentSet::new().with(ComponentSpec::deploy("RoleStore")));

    let orchestrator = fx.open(fast(4));
    let err = orchestrator.run(&set, None).await.unwrap_err();
    orchestrator.shutdown().await.unwrap();

    match err {
        DeployError::Artifact(ArtifactError::NotFound { path }) => {
            assert!(path.ends_with("app_Router.contract_class.json"));
        }
        other => panic!("expected ArtifactNotFound, got {other}"),
    }
    assert_eq!(fx.network.declare_count(), 0);
    assert!(!fx.state_path().exists());
}

/// A grant to a component outside the set is rejected before any network call.
#[tokio::test]
async fn test_unknown_grantee_aborts_before_network() {
    let set = market_set();
    let fx = Fixture::new(&set);
    let catalog = market_roles().grant(Role::RouterPlugin, [Grantee::component("ExchangeRouter")]);

    let orchestrator = fx.open(fast(4));
    let err = orchestrator.run(&set, Some(&catalog)).await.unwrap_err();
    orchestrator.shutdown().await.unwrap();

    assert!(matches!(
        err,
        DeployError::Resolve(ResolveError::UnknownGrantee(name)) if name == "ExchangeRouter"
    ));
    assert_eq!(fx.network.declare_count(), 0);
}

/// A grant to a declare-only component is rejected before anything is deployed.
#[tokio::test]
async fn test_declare_only_grantee_aborts_before_network() {
    let set = market_set();
    let fx = Fixture::new(&set);
    let catalog = market_roles().grant(Role::Controller, [Grantee::component("MarketToken")]);

    let orchestrator = fx.open(fast(4));
    let err = orchestrator.run(&set, Some(&catalog)).await.unwrap_err();
    orchestrator.shutdown().await.unwrap();

    assert!(matches!(
        err,
        DeployError::Resolve(ResolveError::DeclareOnlyGrantee(name)) if name == "MarketToken"
    ));
    assert_eq!(fx.network.declare_count(), 0);
    assert!(fx.network.deploys().is_empty());
    assert!(!fx.state_path().exists());
}

/// Roles are only granted once every component is deployed.
#[tokio::test]
async fn test_bootstrap_only_requires_every_component() {
    let set = market_set();
    let fx = Fixture::new(&set);
    let partial: ComponentSet = set
        .iter()
        .filter(|s| ["RoleStore", "DataStore", "EventEmitter"].contains(&s.name.as_str()))
        .cloned()
        .collect();

    let orchestrator = fx.open(fast(4));
    orchestrator.run(&partial, None).await.unwrap();
    let err = orchestrator
        .bootstrap_only(&set, &market_roles())
        .await
        .unwrap_err();
    orchestrator.shutdown().await.unwrap();

    match err {
        DeployError::ComponentsPending(pending) => {
            assert_eq!(pending, vec!["OracleStore", "MarketToken", "MarketFactory"]);
        }
        other => panic!("expected ComponentsPending, got {other}"),
    }
    assert_eq!(fx.network.execute_count(), 0);
}

/// A failure stops its dependents but keeps what already finished.
#[tokio::test]
async fn test_failure_stops_dependents_but_keeps_finished_work() {
    let set = market_set();
    let fx = Fixture::new(&set);
    fx.network
        .fail_deploy("DataStore")
        .with(NetworkError::Reverted {
            tx: TxHash::from_hex("0xbad").unwrap(),
            reason: "constructor assert".into(),
        });

    let orchestrator = fx.open(fast(1));
    let err = orchestrator.run(&set, None).await.unwrap_err();
    orchestrator.shutdown().await.unwrap();

    assert_eq!(err.component(), Some("DataStore"));
    assert!(fx.record("RoleStore").is_deployed());
    assert!(fx.network.deploys_of("MarketFactory").is_empty());
    assert!(fx.records().iter().all(|r| r.name != "MarketFactory"));
}

/// Forgetting a component makes the next run deploy a new instance.
#[tokio::test]
async fn test_forget_causes_redeploy() {
    let set = ComponentSet::new().with(ComponentSpec::deploy("Router"));
    let fx = Fixture::new(&set);

    let orchestrator = fx.open(fast(1));
    orchestrator.run(&set, None).await.unwrap();
    let first = fx.record("Router").address.unwrap();

    let removed = orchestrator.forget("Router").await.unwrap();
    assert_eq!(removed.and_then(|r| r.address), Some(first.clone()));
    assert!(fx.records().is_empty());

    orchestrator.run(&set, None).await.unwrap();
    orchestrator.shutdown().await.unwrap();

    let second = fx.record("Router").address.unwrap();
    assert_ne!(first, second);
    // The class was already declared; only the instance is new.
    assert_eq!(fx.network.declare_count_for("Router"), 1);
}

/// Only one orchestrator at a time may open a state file.
#[tokio::test]
async fn test_second_orchestrator_on_same_state_is_locked() {
    let set = ComponentSet::new().with(ComponentSpec::deploy("Router"));
    let fx = Fixture::new(&set);
    let first = fx.open(fast(1));

    let second = Orchestrator::open(
        fx.state_path(),
        fx.network.clone(),
        fx.loader(),
        fast(1),
    );
    assert!(matches!(
        second,
        Err(deploy_orchestrator::StoreError::Locked { .. })
    ));

    first.shutdown().await.unwrap();
    assert!(Orchestrator::open(fx.state_path(), fx.network.clone(), fx.loader(), fast(1)).is_ok());
}

/// Planning groups the order into waves of independent components.
#[test]
fn test_plan_reports_waves() {
    let plan = Orchestrator::plan(&market_set()).unwrap();
    assert_eq!(plan.order.len(), 6);
    assert_eq!(plan.waves.len(), 3);
    assert_eq!(plan.waves[0], vec!["RoleStore", "EventEmitter", "MarketToken"]);
}
