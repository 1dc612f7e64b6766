//! Dev Agency launcher
//!
//! Runs the orchestrator until it stops or the user presses Ctrl-C.

use anyhow::Result;

use dev_agency::config::ConfigManager;
use dev_agency::launcher::{run_until_interrupted, start_orchestrator, LaunchOutcome};
use dev_agency::utils::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let config = ConfigManager::from_env().load_with_env().await?;
    let _log_guard = init_logging(config.log_dir.as_deref());
    let grace = config.shutdown_grace();

    let interrupt = async {
        // Without a signal handler there is nothing to wait for
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    let outcome = run_until_interrupted(|shutdown| start_orchestrator(config, shutdown), interrupt, grace).await?;
    if outcome == LaunchOutcome::Interrupted {
        println!("Orchestrator stopped by user");
    }
    Ok(())
}
