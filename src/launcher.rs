//! Orchestrator Launcher
//!
//! Wires config, queue, provider and agents together and runs the service
//! loop until shutdown. `run_until_interrupted` turns an interrupt signal
//! into a graceful drain instead of an abrupt exit.

use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::{build_provider, LLMProvider, ProviderAgentFactory};
use crate::config::OrchestratorConfig;
use crate::orchestrator::{log_events, Orchestrator, SqliteTaskQueue, TicketQueue, EVENT_BUS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The run future completed on its own
    Finished,
    /// The interrupt fired first and the run was asked to stop
    Interrupted,
}

/// Start the orchestrator against the provider named in `config`
pub async fn start_orchestrator(config: OrchestratorConfig, shutdown: CancellationToken) -> Result<()> {
    let provider = build_provider(&config.provider);
    start_orchestrator_with(config, provider, shutdown).await
}

/// Same as [`start_orchestrator`] with an explicit provider
pub async fn start_orchestrator_with(
    config: OrchestratorConfig,
    provider: Arc<dyn LLMProvider>,
    shutdown: CancellationToken,
) -> Result<()> {
    if let Some(parent) = config.queue_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let queue = SqliteTaskQueue::new(&config.queue_path)
        .await
        .with_context(|| format!("Failed to open ticket queue at {}", config.queue_path.display()))?;
    let recovered = queue.recover_stale().await?;
    if recovered > 0 {
        warn!("Re-queued {} ticket(s) left running by a previous process", recovered);
    }

    let factory = ProviderAgentFactory::new(provider, &config);
    let orchestrator = Arc::new(Orchestrator::new(Arc::new(queue), Arc::new(factory), &config));

    orchestrator.inbox().ensure_dirs().await
        .with_context(|| format!("Failed to prepare inbox {}", config.inbox_dir.display()))?;
    tokio::fs::create_dir_all(&config.reports_dir).await
        .with_context(|| format!("Failed to prepare reports dir {}", config.reports_dir.display()))?;

    let logger = tokio::spawn(log_events(EVENT_BUS.subscribe()));
    let result = orchestrator.run(shutdown).await;
    logger.abort();

    result.context("Orchestrator stopped with an error")
}

/// Drive `run` until it finishes or `interrupt` resolves.
///
/// On interrupt the token handed to `run` is cancelled and the run gets
/// `grace` to drain. Errors raised while draining are logged, not returned.
pub async fn run_until_interrupted<F, Fut, I>(run: F, interrupt: I, grace: Duration) -> Result<LaunchOutcome>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<()>>,
    I: Future<Output = ()>,
{
    let shutdown = CancellationToken::new();
    let run = run(shutdown.clone());
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => {
            result?;
            Ok(LaunchOutcome::Finished)
        }
        _ = interrupt => {
            info!("Interrupt received, draining in-flight tickets");
            shutdown.cancel();
            match tokio::time::timeout(grace, &mut run).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Orchestrator error during shutdown: {:#}", e),
                Err(_) => warn!("Shutdown grace of {:?} elapsed, abandoning in-flight tickets", grace),
            }
            Ok(LaunchOutcome::Interrupted)
        }
    }
}
