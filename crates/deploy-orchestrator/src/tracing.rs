//! # Tracing Setup
//!
//! Every layer logs with structured fields. The ones worth filtering on:
//!
//! | Field | Emitted by | Meaning |
//! |-------|------------|---------|
//! | `component` | executor, store, retry | component name |
//! | `attempt` / `delay_ms` | retry | attempt number and backoff before the next one |
//! | `class_hash` / `address` / `tx` | executor | on-chain identifiers |
//! | `records` | store | number of records after a change |
//!
//! A typical resumed run at `RUST_LOG=info` reads:
//!
//! ```text
//! INFO Store started path=deployed_contracts.json records=3
//! INFO ensure_deployed{component=RoleStore}: Already satisfied status=Deployed
//! INFO ensure_deployed{component=Oracle}: Class declared component="Oracle" class_hash=0x4f...
//! INFO ensure_deployed{component=Oracle}: Upserted component=Oracle status=Declared records=4
//! WARN ensure_deployed{component=Oracle}: Transient failure, retrying component="Oracle" operation="deploy" attempt=1 delay_ms=412
//! INFO ensure_deployed{component=Oracle}: Deployed address=0x21... class_hash=0x4f... tx=0x9c...
//! INFO bootstrap{grants=12}: Roles granted tx=0x7a... calls=12
//! ```
//!
//! `debug` adds store requests and declare cache hits.

/// Initializes a compact `fmt` subscriber filtered by `RUST_LOG`.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}
