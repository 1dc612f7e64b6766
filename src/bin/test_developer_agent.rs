//! Developer Agent Smoke Check
//!
//! Sends a fixed ticket to the configured developer model once and logs the
//! status and result. Errors are logged; the process still exits cleanly.

use anyhow::Result;
use tracing::error;

use dev_agency::agent::{build_provider, AgentConfig, AgentType, DeveloperAgent};
use dev_agency::config::ConfigManager;
use dev_agency::smoke::{run_developer_smoke, smoke_ticket};
use dev_agency::utils::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let _log_guard = init_logging(None);

    let config = match ConfigManager::from_env().load_with_env().await {
        Ok(config) => config,
        Err(e) => {
            error!("Could not load configuration: {:#}", e);
            return Ok(());
        }
    };

    let provider = build_provider(&config.provider);
    let developer = DeveloperAgent::new(provider, AgentConfig::from_orchestrator(AgentType::Developer, &config))
        .with_workspace_root(config.workspace_root.clone());

    run_developer_smoke(&developer, &smoke_ticket()).await;
    Ok(())
}
