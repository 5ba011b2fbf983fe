//! Command execution, shared by the binary and its tests.
//!
//! `--dry-run` works on a scratch copy of the state file against
//! [`SimulatedNetwork`], which first adopts everything the copy records. The
//! real state file is never touched by a dry run.

use crate::catalog;
use crate::config::{Cli, Command};
use anyhow::{bail, Context};
use deploy_orchestrator::mock::SimulatedNetwork;
use deploy_orchestrator::model::{ComponentSet, DeploymentRecord};
use deploy_orchestrator::orchestrator::{ExecutionPlan, RunReport};
use deploy_orchestrator::roles::{GrantReport, RoleCatalog};
use deploy_orchestrator::store::persist::load_state;
use deploy_orchestrator::{
    ArtifactLoader, DeployError, DeploymentState, NetworkClient, Orchestrator,
};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{info, info_span, warn, Instrument};

/// What a command produced.
#[derive(Debug)]
pub enum Outcome {
    Plan(ExecutionPlan),
    Status(DeploymentState),
    Deployed(RunReport),
    Granted(GrantReport),
    Forgotten(Option<DeploymentRecord>),
}

pub async fn execute(cli: &Cli) -> anyhow::Result<Outcome> {
    match &cli.command {
        Command::Plan => {
            let span = info_span!("plan");
            let _guard = span.enter();
            let plan = Orchestrator::plan(&catalog::components())?;
            info!(components = plan.order.len(), waves = plan.waves.len(), "Plan ready");
            Ok(Outcome::Plan(plan))
        }
        Command::Status => Ok(Outcome::Status(load_state(&cli.state_file)?)),
        Command::Deploy => {
            let session = Session::open(cli)?;
            let result = session
                .orchestrator
                .run(&session.components, Some(&session.roles))
                .instrument(info_span!("deploy"))
                .await
                .map(Outcome::Deployed);
            session.close(result).await
        }
        Command::GrantRoles => {
            let session = Session::open(cli)?;
            let result = session
                .orchestrator
                .bootstrap_only(&session.components, &session.roles)
                .instrument(info_span!("bootstrap"))
                .await
                .map(Outcome::Granted);
            session.close(result).await
        }
        Command::Forget { name } => {
            let session = Session::open(cli)?;
            if session.components.get(name).is_none() {
                warn!(component = %name, "Not part of the catalog");
            }
            let result = session.orchestrator.forget(name).await.map(Outcome::Forgotten);
            session.close(result).await
        }
    }
}

/// An open orchestrator plus the files it works on.
struct Session {
    orchestrator: Orchestrator,
    components: ComponentSet,
    roles: RoleCatalog,
    _scratch: Option<TempDir>,
}

impl Session {
    fn open(cli: &Cli) -> anyhow::Result<Self> {
        let (state_file, scratch) = state_file(cli)?;
        let existing = load_state(&state_file)?;
        let network = network(cli, &existing)?;
        let artifacts = Arc::new(ArtifactLoader::new(
            cli.artifact_dir.clone(),
            cli.artifact_package.clone(),
        ));
        let orchestrator = Orchestrator::open(&state_file, network, artifacts, cli.to_config())
            .with_context(|| format!("opening {}", state_file.display()))?;

        Ok(Self {
            orchestrator,
            components: catalog::components(),
            roles: catalog::roles(cli.operator.clone()),
            _scratch: scratch,
        })
    }

    /// Shuts the store down, then hands back the command result.
    async fn close(self, result: Result<Outcome, DeployError>) -> anyhow::Result<Outcome> {
        self.orchestrator.shutdown().await?;
        Ok(result?)
    }
}

/// The state file to use; a dry run gets a scratch copy.
fn state_file(cli: &Cli) -> anyhow::Result<(PathBuf, Option<TempDir>)> {
    if !cli.dry_run {
        return Ok((cli.state_file.clone(), None));
    }
    let scratch = TempDir::new().context("creating dry-run directory")?;
    let copy = scratch.path().join("deployed_contracts.json");
    if cli.state_file.exists() {
        std::fs::copy(&cli.state_file, &copy)
            .with_context(|| format!("copying {} for the dry run", cli.state_file.display()))?;
    }
    info!(copy = %copy.display(), "Dry run on a copy of the state file");
    Ok((copy, Some(scratch)))
}

fn network(cli: &Cli, state: &DeploymentState) -> anyhow::Result<Arc<dyn NetworkClient>> {
    if !cli.dry_run {
        if cli.provider_url.is_none() || cli.account_private.is_none() {
            warn!("PROVIDER_URL or ACCOUNT_PRIVATE is not set");
        }
        bail!("no live network client is linked into this build; rerun with --dry-run");
    }
    let mut simulated = SimulatedNetwork::new();
    if let Some(account) = &cli.account_public {
        simulated = simulated.with_deployer(account.clone());
    }
    simulated.adopt(state);
    Ok(Arc::new(simulated))
}

/// Human readable summary of an [`Outcome`].
pub fn render(outcome: &Outcome) -> String {
    let mut out = String::new();
    match outcome {
        Outcome::Plan(plan) => {
            for (index, wave) in plan.waves.iter().enumerate() {
                let _ = writeln!(out, "wave {}: {}", index + 1, wave.join(", "));
            }
        }
        Outcome::Status(state) => {
            for record in state.records() {
                let location = record
                    .address
                    .as_ref()
                    .map(ToString::to_string)
                    .or_else(|| record.class_hash.as_ref().map(|h| format!("class {h}")))
                    .unwrap_or_else(|| "-".to_string());
                let _ = match &record.pending_deploy {
                    Some(pending) => writeln!(
                        out,
                        "{:<20} {:<9} {} (awaiting tx {})",
                        record.name, record.status, location, pending.tx
                    ),
                    None => writeln!(out, "{:<20} {:<9} {}", record.name, record.status, location),
                };
            }
        }
        Outcome::Deployed(report) => {
            for outcome in &report.outcomes {
                let kind = format!("{:?}", outcome.kind);
                let location = outcome
                    .address
                    .as_ref()
                    .map(ToString::to_string)
                    .or_else(|| outcome.class_hash.as_ref().map(|h| format!("class {h}")))
                    .unwrap_or_default();
                let _ = writeln!(out, "{:<20} {:<16} {}", outcome.name, kind, location);
            }
            if let Some(grants) = &report.grants {
                render_grants(&mut out, grants);
            }
        }
        Outcome::Granted(grants) => render_grants(&mut out, grants),
        Outcome::Forgotten(Some(record)) => {
            let _ = writeln!(out, "forgot {}; the next deploy replaces it", record.name);
        }
        Outcome::Forgotten(None) => {
            let _ = writeln!(out, "nothing recorded under that name");
        }
    }
    out
}

fn render_grants(out: &mut String, grants: &GrantReport) {
    match &grants.tx {
        Some(tx) => {
            let _ = writeln!(out, "granted {} role(s) in {tx}", grants.calls.len());
        }
        None => {
            let _ = writeln!(out, "no role grants to submit");
        }
    }
}
