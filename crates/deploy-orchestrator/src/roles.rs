//! # Role Bootstrapper
//!
//! After every component exists, access control is configured in one step:
//! the whole [`RoleCatalog`] is turned into `grant_role(account, role)` calls
//! against the RoleStore and submitted as a single multicall. Either every
//! grant lands or none does.
//!
//! Re-running is safe. The RoleStore treats granting a held role as a no-op,
//! and the catalog is deduplicated before submission, so a batch never
//! contains the same `(grantee, role)` pair twice.

use crate::error::{DeployError, ResolveError};
use crate::executor::{lock, retry, RetryPolicy};
use crate::model::{Address, ComponentKind, ComponentSet, Felt, TxHash};
use crate::network::{Call, NetworkClient, NetworkError};
use crate::store::DeploymentState;
use std::fmt::{self, Display};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument};

const GRANT_ENTRYPOINT: &str = "grant_role";

/// Roles defined by the RoleStore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Admin,
    RoleAdmin,
    Controller,
    MarketKeeper,
    OrderKeeper,
    FrozenOrderKeeper,
    RouterPlugin,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Admin,
        Role::RoleAdmin,
        Role::Controller,
        Role::MarketKeeper,
        Role::OrderKeeper,
        Role::FrozenOrderKeeper,
        Role::RouterPlugin,
    ];

    /// The role identifier as stored on chain.
    pub fn key(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::RoleAdmin => "ROLE_ADMIN",
            Role::Controller => "CONTROLLER",
            Role::MarketKeeper => "MARKET_KEEPER",
            Role::OrderKeeper => "ORDER_KEEPER",
            Role::FrozenOrderKeeper => "FROZEN_ORDER_KEEPER",
            Role::RouterPlugin => "ROUTER_PLUGIN",
        }
    }

    /// Short-string encoding of [`key`](Self::key).
    pub fn felt(&self) -> Felt {
        // Every key is short ASCII.
        Felt::from_short_string(self.key()).unwrap_or_else(|_| Felt::zero())
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Who receives a role.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Grantee {
    /// A deployed component, by name.
    Component(String),
    /// The signing account.
    Deployer,
    /// A fixed operator account.
    Account(Address),
}

impl Grantee {
    pub fn component(name: impl Into<String>) -> Self {
        Self::Component(name.into())
    }
}

impl Display for Grantee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grantee::Component(name) => f.write_str(name),
            Grantee::Deployer => f.write_str("deployer"),
            Grantee::Account(address) => write!(f, "{address}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoleGrant {
    pub grantee: Grantee,
    pub role: Role,
}

/// Fixed list of grants, applied against the component named `role_store`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleCatalog {
    role_store: String,
    grants: Vec<RoleGrant>,
}

impl RoleCatalog {
    pub fn new(role_store: impl Into<String>) -> Self {
        Self {
            role_store: role_store.into(),
            grants: Vec::new(),
        }
    }

    /// Grants `role` to each of `grantees`. Repeated pairs are kept once.
    pub fn grant(mut self, role: Role, grantees: impl IntoIterator<Item = Grantee>) -> Self {
        for grantee in grantees {
            let grant = RoleGrant { grantee, role };
            if !self.grants.contains(&grant) {
                self.grants.push(grant);
            }
        }
        self
    }

    pub fn role_store(&self) -> &str {
        &self.role_store
    }

    pub fn grants(&self) -> &[RoleGrant] {
        &self.grants
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    /// Checks that every referenced component is part of `set` and gets an address.
    pub fn validate(&self, set: &ComponentSet) -> Result<(), ResolveError> {
        let referenced = std::iter::once(self.role_store.as_str()).chain(
            self.grants.iter().filter_map(|g| match &g.grantee {
                Grantee::Component(name) => Some(name.as_str()),
                _ => None,
            }),
        );
        for name in referenced {
            match set.get(name) {
                None => return Err(ResolveError::UnknownGrantee(name.to_string())),
                Some(spec) if spec.kind == ComponentKind::DeclareOnly => {
                    return Err(ResolveError::DeclareOnlyGrantee(name.to_string()));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// Result of a submitted grant batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantReport {
    pub tx: Option<TxHash>,
    pub calls: Vec<Call>,
}

pub struct RoleBootstrapper {
    network: Arc<dyn NetworkClient>,
    policy: RetryPolicy,
}

impl RoleBootstrapper {
    pub fn new(network: Arc<dyn NetworkClient>, policy: RetryPolicy) -> Self {
        Self { network, policy }
    }

    /// Builds the multicall for `catalog` from the addresses in `state`.
    pub fn calls(
        &self,
        catalog: &RoleCatalog,
        state: &DeploymentState,
    ) -> Result<Vec<Call>, DeployError> {
        let address_of = |name: &str| {
            state
                .address_of(name)
                .cloned()
                .ok_or_else(|| DeployError::NotDeployed(name.to_string()))
        };
        let role_store = address_of(catalog.role_store())?;

        let mut calls: Vec<Call> = Vec::with_capacity(catalog.grants().len());
        for grant in catalog.grants() {
            let grantee = match &grant.grantee {
                Grantee::Component(name) => address_of(name)?,
                Grantee::Deployer => self.network.deployer(),
                Grantee::Account(address) => address.clone(),
            };
            let call = Call::new(
                role_store.clone(),
                GRANT_ENTRYPOINT,
                vec![grantee.felt().clone(), grant.role.felt()],
            );
            // Distinct grantees can resolve to one address (e.g. an operator that is also the deployer).
            if !calls.contains(&call) {
                calls.push(call);
            }
        }
        Ok(calls)
    }

    /// Submits every grant as one atomic multicall and waits for finality.
    ///
    /// A batch that is accepted but not yet final is waited on again; only a
    /// rejected or reverted batch is resubmitted.
    #[instrument(skip(self, catalog, state), fields(grants = catalog.grants().len()))]
    pub async fn bootstrap(
        &self,
        catalog: &RoleCatalog,
        state: &DeploymentState,
    ) -> Result<GrantReport, DeployError> {
        let calls = self.calls(catalog, state)?;
        if calls.is_empty() {
            info!("No role grants to submit");
            return Ok(GrantReport { tx: None, calls });
        }

        let network = self.network.as_ref();
        let batch = calls.as_slice();
        let pending: Mutex<Option<TxHash>> = Mutex::new(None);
        let pending = &pending;
        let tx = retry(&self.policy, "grant_roles", catalog.role_store(), |attempt| async move {
            let current = lock(pending).clone();
            let tx = match current {
                Some(tx) => {
                    debug!(attempt, tx = %tx, "Waiting on pending grant batch");
                    tx
                }
                None => {
                    let tx = network.execute(batch).await?;
                    debug!(attempt, tx = %tx, "Grant batch submitted");
                    *lock(pending) = Some(tx.clone());
                    tx
                }
            };
            match network.wait_for_finality(&tx).await {
                Ok(()) => Ok(tx),
                Err(e) => {
                    if matches!(e, NetworkError::Rejected(_) | NetworkError::Reverted { .. }) {
                        *lock(pending) = None;
                    }
                    Err(e)
                }
            }
        })
        .await
        .map_err(|e| DeployError::RoleGrantFailed {
            grants: calls.len(),
            attempts: e.attempts,
            source: e.last,
        })?;

        info!(tx = %tx, calls = calls.len(), "Roles granted");
        Ok(GrantReport { tx: Some(tx), calls })
    }
}
