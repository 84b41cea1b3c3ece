use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use agent_state_coordinator::cli::{execute, Cli};
use agent_state_coordinator::config::CoordinatorConfig;
use agent_state_coordinator::coordination::SharedStateManager;
use agent_state_coordinator::errors::CoordinatorResult;
use agent_state_coordinator::logging::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CoordinatorResult<()> {
    let mut config = CoordinatorConfig::from_env()?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    init_logging(&config.logging);

    let manager = Arc::new(SharedStateManager::open(&config).await?);
    tracing::debug!(store = manager.store_name(), "Coordinator ready");

    let output = execute(cli.command, manager, &config.poll).await?;
    if !output.is_null() {
        println!("{}", serde_json::to_string_pretty(&output)?);
    }
    Ok(())
}
