//! Command line and environment configuration.
//!
//! Every connection setting can come from a flag or from the environment (a
//! `.env`-style shell export works as before):
//!
//! | Variable | Default |
//! |----------|---------|
//! | `PROVIDER_URL` | none |
//! | `ACCOUNT_PUBLIC` | none |
//! | `ACCOUNT_PRIVATE` | none |
//! | `OPERATOR_ADMIN` | the protocol operator account |
//! | `ARTIFACT_DIR` | `target/dev` |
//! | `ARTIFACT_PACKAGE` | `satoru` |
//! | `STATE_FILE` | `deployed_contracts.json` |

use crate::catalog::OPERATOR_ADMIN;
use clap::{Parser, Subcommand};
use deploy_orchestrator::model::Address;
use deploy_orchestrator::{OrchestratorConfig, RetryPolicy};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "satoru-deploy")]
#[command(about = "Declare, deploy, and configure the Satoru contracts")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// RPC endpoint of the target network
    #[arg(long, env = "PROVIDER_URL")]
    pub provider_url: Option<String>,

    /// Address of the signing account
    #[arg(long, env = "ACCOUNT_PUBLIC", value_parser = parse_address)]
    pub account_public: Option<Address>,

    /// Private key of the signing account
    #[arg(long, env = "ACCOUNT_PRIVATE", hide_env_values = true)]
    pub account_private: Option<String>,

    /// Operator account granted ADMIN next to the deployer
    #[arg(long, env = "OPERATOR_ADMIN", default_value = OPERATOR_ADMIN, value_parser = parse_address)]
    pub operator: Address,

    /// Directory holding the compiled contract classes
    #[arg(long, env = "ARTIFACT_DIR", default_value = "target/dev")]
    pub artifact_dir: PathBuf,

    /// Package prefix of the artifact file names
    #[arg(long, env = "ARTIFACT_PACKAGE", default_value = "satoru")]
    pub artifact_package: String,

    /// Deployment state file
    #[arg(long, env = "STATE_FILE", default_value = "deployed_contracts.json")]
    pub state_file: PathBuf,

    /// Attempts per network step before giving up
    #[arg(long, default_value_t = 5)]
    pub max_attempts: u32,

    #[arg(long, default_value_t = 500)]
    pub base_delay_ms: u64,

    #[arg(long, default_value_t = 30_000)]
    pub max_delay_ms: u64,

    /// Most components deployed at once
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    /// Run against an in-memory chain, on a copy of the state file
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Print the execution order and parallel waves
    Plan,

    /// Print the recorded deployment state
    Status,

    /// Deploy every missing component, then grant roles
    Deploy,

    /// Submit the role grant batch only
    GrantRoles,

    /// Drop a component's record so the next deploy replaces it
    Forget {
        /// Component name
        name: String,
    },
}

impl Cli {
    pub fn to_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            retry: RetryPolicy {
                max_attempts: self.max_attempts.max(1),
                base_delay: Duration::from_millis(self.base_delay_ms),
                max_delay: Duration::from_millis(self.max_delay_ms),
                jitter: true,
            },
            concurrency: self.concurrency.max(1),
        }
    }
}

fn parse_address(raw: &str) -> Result<Address, String> {
    Address::from_hex(raw).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["satoru-deploy", "deploy"]).unwrap();
        assert_eq!(cli.command, Command::Deploy);
        assert_eq!(cli.artifact_package, "satoru");
        assert_eq!(cli.state_file, PathBuf::from("deployed_contracts.json"));
        assert_eq!(cli.operator, Address::from_hex(OPERATOR_ADMIN).unwrap());
        assert!(!cli.dry_run);

        let config = cli.to_config();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(500));
        assert_eq!(config.concurrency, 4);
    }

    #[test]
    fn test_forget_takes_a_name() {
        let cli = Cli::try_parse_from([
            "satoru-deploy",
            "--dry-run",
            "--concurrency",
            "0",
            "forget",
            "Oracle",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Command::Forget {
                name: "Oracle".into()
            }
        );
        assert!(cli.dry_run);
        assert_eq!(cli.to_config().concurrency, 1);
    }

    #[test]
    fn test_rejects_malformed_account() {
        let result = Cli::try_parse_from([
            "satoru-deploy",
            "--account-public",
            "not-hex",
            "status",
        ]);
        assert!(result.is_err());
    }
}
