use clap::Parser;
use deploy_orchestrator::tracing::setup_tracing;
use satoru_deploy::app;
use satoru_deploy::config::Cli;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    setup_tracing();

    let cli = Cli::parse();
    info!(command = ?cli.command, dry_run = cli.dry_run, "Starting");

    match app::execute(&cli).await {
        Ok(outcome) => print!("{}", app::render(&outcome)),
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}
