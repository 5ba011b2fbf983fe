//! # Orchestrator Errors
//!
//! Each layer owns a `thiserror` enum; [`DeployError`] is the umbrella the
//! orchestrator returns. The split follows when an error can happen:
//!
//! | Error | When | Side effects |
//! |-------|------|--------------|
//! | [`ResolveError`] | pre-flight | none, no network call was made |
//! | [`ArtifactError`] | pre-flight / local | none |
//! | [`StoreError`] | any time | state file is the pre-write or post-write snapshot |
//! | [`DeployError::DeploymentFailed`] | after retries | component left unchanged or `Failed` |
//! | [`DeployError::RoleGrantFailed`] | bootstrap | whole batch rejected |

use crate::network::NetworkError;
use std::path::PathBuf;

/// Errors raised while validating and ordering the component set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("component declared twice: {0}")]
    DuplicateComponent(String),

    #[error("{component} depends on unknown component {dependency}")]
    MissingDependency {
        component: String,
        dependency: String,
    },

    #[error("dependency cycle: {}", format_cycle(.members))]
    CyclicDependency { members: Vec<String> },

    #[error("{component}.{param} references {target}, which is not in depends_on")]
    UndeclaredReference {
        component: String,
        param: String,
        target: String,
    },

    #[error("{component}.{param} needs the address of {target}, which is declare-only")]
    AddressOfDeclareOnly {
        component: String,
        param: String,
        target: String,
    },

    #[error("role grant references unknown component {0}")]
    UnknownGrantee(String),

    #[error("role grant references {0}, which is declare-only and has no address")]
    DeclareOnlyGrantee(String),
}

fn format_cycle(members: &[String]) -> String {
    match members.first() {
        Some(first) => format!("{} -> {first}", members.join(" -> ")),
        None => String::new(),
    }
}

/// Errors raised while locating compiled artifacts.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read artifact {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact {} is not valid JSON: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised by the state store actor and its persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("state store closed")]
    ActorClosed,

    #[error("state store dropped response channel")]
    ActorDropped,

    #[error("state file {} is locked by another process", .path.display())]
    Locked { path: PathBuf },

    #[error("state file {} I/O error: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state file {} is corrupt: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("state file lists {0} more than once")]
    DuplicateRecord(String),

    #[error("address of {name} is already {existing}; refusing to overwrite with {attempted}")]
    AddressImmutable {
        name: String,
        existing: String,
        attempted: String,
    },

    #[error("a deployment of {0} is already in flight")]
    AlreadyInFlight(String),
}

/// Umbrella error returned by the executor, bootstrapper, and orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{component} failed after {attempts} attempt(s): {source}")]
    DeploymentFailed {
        component: String,
        attempts: u32,
        #[source]
        source: NetworkError,
    },

    #[error("role grant batch of {grants} call(s) failed after {attempts} attempt(s): {source}")]
    RoleGrantFailed {
        grants: usize,
        attempts: u32,
        #[source]
        source: NetworkError,
    },

    #[error("invalid constructor argument {component}.{param}: {reason}")]
    InvalidArgument {
        component: String,
        param: String,
        reason: String,
    },

    #[error("{0} is not deployed")]
    NotDeployed(String),

    #[error("{} component(s) not yet deployed: {}", .0.len(), .0.join(", "))]
    ComponentsPending(Vec<String>),

    #[error("internal consistency fault for {component}: {detail}")]
    Inconsistent { component: String, detail: String },

    #[error("deployment task aborted: {0}")]
    TaskAborted(String),
}

impl DeployError {
    /// The component the error is attributed to, when there is one.
    pub fn component(&self) -> Option<&str> {
        match self {
            Self::DeploymentFailed { component, .. }
            | Self::InvalidArgument { component, .. }
            | Self::Inconsistent { component, .. } => Some(component),
            Self::NotDeployed(component) => Some(component),
            Self::Resolve(ResolveError::MissingDependency { component, .. })
            | Self::Resolve(ResolveError::UndeclaredReference { component, .. })
            | Self::Resolve(ResolveError::AddressOfDeclareOnly { component, .. }) => {
                Some(component)
            }
            _ => None,
        }
    }
}
