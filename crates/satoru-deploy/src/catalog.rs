//! # Satoru Catalog
//!
//! The fixed component graph and role catalog of the Satoru protocol.
//!
//! | Component | Constructor inputs |
//! |-----------|--------------------|
//! | RoleStore | `admin` (deployer) |
//! | DataStore | role store |
//! | EventEmitter | none |
//! | OracleStore | role store, event emitter |
//! | Oracle | role store, oracle store, `pragma_address` (deployer) |
//! | OrderVault / DepositVault / WithdrawalVault | data store, role store |
//! | SwapHandler | role store |
//! | ReferralStorage | event emitter |
//! | OrderHandler | data/role store, emitter, order vault, oracle, swap handler, referral storage |
//! | DepositHandler | data/role store, emitter, deposit vault, oracle |
//! | WithdrawalHandler | data/role store, emitter, withdrawal vault, oracle |
//! | MarketToken | declare only |
//! | MarketFactory | data/role store, emitter, MarketToken class hash |
//! | Router | role store |
//! | ExchangeRouter | router, data/role store, emitter, deposit/withdrawal/order handlers |
//! | LiquidationHandler | declare only |
//!
//! Components are listed in the order the protocol scripts historically
//! deployed them; ties in the dependency order keep this order.

use deploy_orchestrator::model::{Address, ComponentSet, ComponentSpec};
use deploy_orchestrator::roles::{Grantee, Role, RoleCatalog};

/// Operator account that receives `ADMIN` alongside the deployer.
pub const OPERATOR_ADMIN: &str =
    "0x6b86e40118f29ebe393a75469b4d926c7a44c2e2681b6d319520b7c1156d114";

pub const ROLE_STORE: &str = "RoleStore";

/// `data_store_address`, `role_store_address`, `event_emitter_address`
fn core_stores(spec: ComponentSpec) -> ComponentSpec {
    spec.address_arg("data_store_address", "DataStore")
        .address_arg("role_store_address", ROLE_STORE)
        .address_arg("event_emitter_address", "EventEmitter")
}

fn vault(name: &str) -> ComponentSpec {
    ComponentSpec::deploy(name)
        .address_arg("data_store_address", "DataStore")
        .address_arg("role_store_address", ROLE_STORE)
}

pub fn components() -> ComponentSet {
    ComponentSet::new()
        .with(ComponentSpec::deploy(ROLE_STORE).deployer_arg("admin"))
        .with(ComponentSpec::deploy("DataStore").address_arg("role_store_address", ROLE_STORE))
        .with(ComponentSpec::deploy("EventEmitter"))
        .with(
            ComponentSpec::deploy("OracleStore")
                .address_arg("role_store_address", ROLE_STORE)
                .address_arg("event_emitter_address", "EventEmitter"),
        )
        .with(
            ComponentSpec::deploy("Oracle")
                .address_arg("role_store_address", ROLE_STORE)
                .address_arg("oracle_store_address", "OracleStore")
                .deployer_arg("pragma_address"),
        )
        .with(vault("OrderVault"))
        .with(vault("DepositVault"))
        .with(vault("WithdrawalVault"))
        .with(ComponentSpec::deploy("SwapHandler").address_arg("role_store_address", ROLE_STORE))
        .with(
            ComponentSpec::deploy("ReferralStorage")
                .address_arg("event_emitter_address", "EventEmitter"),
        )
        .with(
            core_stores(ComponentSpec::deploy("OrderHandler"))
                .address_arg("order_vault_address", "OrderVault")
                .address_arg("oracle_address", "Oracle")
                .address_arg("swap_handler_address", "SwapHandler")
                .address_arg("referral_storage_address", "ReferralStorage"),
        )
        .with(
            core_stores(ComponentSpec::deploy("DepositHandler"))
                .address_arg("deposit_vault_address", "DepositVault")
                .address_arg("oracle_address", "Oracle"),
        )
        .with(
            core_stores(ComponentSpec::deploy("WithdrawalHandler"))
                .address_arg("withdrawal_vault_address", "WithdrawalVault")
                .address_arg("oracle_address", "Oracle"),
        )
        .with(ComponentSpec::declare_only("MarketToken"))
        .with(
            core_stores(ComponentSpec::deploy("MarketFactory"))
                .class_hash_arg("market_token_class_hash", "MarketToken"),
        )
        .with(ComponentSpec::deploy("Router").address_arg("role_store_address", ROLE_STORE))
        .with(
            ComponentSpec::deploy("ExchangeRouter")
                .address_arg("router_address", "Router")
                .address_arg("data_store_address", "DataStore")
                .address_arg("role_store_address", ROLE_STORE)
                .address_arg("event_emitter_address", "EventEmitter")
                .address_arg("deposit_handler_address", "DepositHandler")
                .address_arg("withdrawal_handler_address", "WithdrawalHandler")
                .address_arg("order_handler_address", "OrderHandler"),
        )
        .with(ComponentSpec::declare_only("LiquidationHandler"))
}

/// Role grants applied once every component exists.
pub fn roles(operator: Address) -> RoleCatalog {
    RoleCatalog::new(ROLE_STORE)
        .grant(Role::Admin, [Grantee::Account(operator), Grantee::Deployer])
        .grant(Role::RoleAdmin, [Grantee::Deployer])
        .grant(
            Role::Controller,
            [
                Grantee::component("OrderHandler"),
                Grantee::component("ExchangeRouter"),
                Grantee::component("MarketFactory"),
                Grantee::component("DepositHandler"),
                Grantee::component("WithdrawalHandler"),
            ],
        )
        .grant(
            Role::MarketKeeper,
            [Grantee::Deployer, Grantee::component("MarketFactory")],
        )
        .grant(Role::OrderKeeper, [Grantee::Deployer])
        .grant(Role::FrozenOrderKeeper, [Grantee::Deployer])
        .grant(Role::RouterPlugin, [Grantee::component("ExchangeRouter")])
}
