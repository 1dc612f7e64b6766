//! Orchestrator Engine
//!
//! Pulls tickets off the queue and runs them through the developer/reviewer
//! loop. Finished tickets get a report; failures are retried or parked
//! according to the error kind and the attempt budget.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{OrchestratorEvent, QueuedTicket, ReportStore, TicketInbox, TicketQueue};
use crate::agent::{Agent, AgentFactory, AgentOutput, Assignment, DeveloperReport, ReviewVerdict};
use crate::config::OrchestratorConfig;
use crate::emit_event;
use crate::error::{AgentError, AgentResult};
use crate::ticket::Ticket;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// The reviewer accepted the final draft
    Approved,
    /// Review is disabled; the first draft is the result
    Unreviewed,
    /// Revisions ran out without approval; a human has to look
    Escalated,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::Approved => write!(f, "approved"),
            Resolution::Unreviewed => write!(f, "unreviewed"),
            Resolution::Escalated => write!(f, "escalated"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketOutcome {
    pub ticket_id: String,
    pub resolution: Resolution,
    /// The last draft the developer produced
    pub report: DeveloperReport,
    pub review: Option<ReviewVerdict>,
    /// Developer rounds used, including the first draft
    pub rounds: u32,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_concurrency: usize,
    pub max_attempts: u32,
    pub max_revisions: u32,
    pub poll_interval: Duration,
}

impl From<&OrchestratorConfig> for OrchestratorSettings {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency.max(1),
            max_attempts: config.max_attempts.max(1),
            max_revisions: config.max_revisions,
            poll_interval: config.poll_interval(),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&OrchestratorConfig::default())
    }
}

pub struct Orchestrator {
    queue: Arc<dyn TicketQueue>,
    factory: Arc<dyn AgentFactory>,
    inbox: TicketInbox,
    reports: ReportStore,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        queue: Arc<dyn TicketQueue>,
        factory: Arc<dyn AgentFactory>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            queue,
            factory,
            inbox: TicketInbox::new(&config.inbox_dir),
            reports: ReportStore::new(&config.reports_dir),
            settings: OrchestratorSettings::from(config),
        }
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn queue(&self) -> &Arc<dyn TicketQueue> {
        &self.queue
    }

    pub fn inbox(&self) -> &TicketInbox {
        &self.inbox
    }

    pub fn reports(&self) -> &ReportStore {
        &self.reports
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Run one ticket through draft/review rounds
    pub async fn process_ticket(&self, ticket: &Ticket) -> AgentResult<TicketOutcome> {
        ticket.validate()?;

        let developer = self.factory.developer();
        let reviewer = self.factory.reviewer();
        let mut assignment = Assignment::new(ticket.clone());

        loop {
            let report = draft(developer.as_ref(), &assignment).await?;
            emit_event!(OrchestratorEvent::DraftProduced {
                ticket_id: ticket.ticket_id.clone(),
                round: assignment.round,
                changes: report.changes.len(),
            });

            let Some(reviewer) = reviewer.as_deref() else {
                return Ok(finish(ticket, Resolution::Unreviewed, report, None, assignment.round));
            };

            let verdict = review(reviewer, &assignment.for_review(report.clone())).await?;
            emit_event!(OrchestratorEvent::ReviewCompleted {
                ticket_id: ticket.ticket_id.clone(),
                round: assignment.round,
                approved: verdict.is_approved(),
            });

            if verdict.is_approved() {
                return Ok(finish(ticket, Resolution::Approved, report, Some(verdict), assignment.round));
            }
            if assignment.round >= self.settings.max_revisions {
                warn!("Ticket {} escalated after {} revision(s)", ticket.ticket_id, assignment.round);
                return Ok(finish(ticket, Resolution::Escalated, report, Some(verdict), assignment.round));
            }

            info!("Ticket {} round {}: changes requested, revising", ticket.ticket_id, assignment.round);
            assignment = assignment.revise(report, &verdict);
        }
    }

    /// Process a claimed queue row and settle it.
    ///
    /// Agent failures are recorded on the row; only queue failures surface
    /// as errors.
    pub async fn handle_task(&self, task: QueuedTicket) -> AgentResult<Option<TicketOutcome>> {
        let ticket = match task.ticket() {
            Ok(ticket) => ticket,
            Err(e) => {
                error!("Queue row {} holds an unreadable ticket: {}", task.id, e);
                let reason = e.to_string();
                self.settle(&task.id, || self.queue.fail(&task.id, &reason, false)).await?;
                emit_event!(OrchestratorEvent::TicketFailed {
                    ticket_id: task.ticket_id.clone(),
                    error: e.to_string(),
                    will_retry: false,
                });
                return Ok(None);
            }
        };

        let attempt = task.attempts + 1;
        info!("Starting ticket {} (attempt {})", ticket.ticket_id, attempt);
        emit_event!(OrchestratorEvent::TicketStarted {
            ticket_id: ticket.ticket_id.clone(),
            attempt,
        });

        match self.resolve(&ticket).await {
            Ok(outcome) => {
                self.settle(&task.id, || self.queue.complete(&task.id)).await?;
                emit_event!(OrchestratorEvent::TicketCompleted {
                    ticket_id: ticket.ticket_id.clone(),
                    resolution: outcome.resolution,
                });
                Ok(Some(outcome))
            }
            Err(e) => {
                let will_retry = e.is_retryable() && (attempt as u32) < self.settings.max_attempts;
                warn!("Ticket {} failed on attempt {}: {}", ticket.ticket_id, attempt, e);
                let reason = e.to_string();
                self.settle(&task.id, || self.queue.fail(&task.id, &reason, will_retry)).await?;
                emit_event!(OrchestratorEvent::TicketFailed {
                    ticket_id: ticket.ticket_id.clone(),
                    error: e.to_string(),
                    will_retry,
                });
                Ok(None)
            }
        }
    }

    /// Queue updates get a second try so a transient error does not leave
    /// the row stuck in `running`
    async fn settle<F, Fut>(&self, queue_id: &str, op: F) -> AgentResult<()>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = AgentResult<()>>,
    {
        match op().await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Updating queue row {} failed, retrying: {}", queue_id, e);
                op().await
            }
        }
    }

    async fn resolve(&self, ticket: &Ticket) -> AgentResult<TicketOutcome> {
        let outcome = self.process_ticket(ticket).await?;
        let path = self.reports.save(&outcome).await?;
        info!("Ticket {} {}: report at {}", outcome.ticket_id, outcome.resolution, path.display());
        Ok(outcome)
    }

    /// Drain the queue one ticket at a time; returns how many rows were handled
    pub async fn run_pending(&self) -> AgentResult<usize> {
        let mut handled = 0;
        while let Some(task) = self.queue.dequeue().await? {
            self.handle_task(task).await?;
            handled += 1;
        }
        Ok(handled)
    }

    /// Service loop. Returns once `shutdown` fires and in-flight tickets finish.
    ///
    /// A queue error stops intake, but tickets already running are still
    /// drained before the error is returned.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> AgentResult<()> {
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut workers: JoinSet<AgentResult<Option<TicketOutcome>>> = JoinSet::new();

        info!(
            "Orchestrator running (inbox: {}, concurrency: {})",
            self.inbox.dir().display(),
            self.settings.max_concurrency
        );
        emit_event!(OrchestratorEvent::StatusUpdate("orchestrator started".to_string()));

        let failure = loop {
            let filled = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break None,
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    log_worker_exit(joined);
                    self.fill_workers(&mut workers).await
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.inbox.collect(self.queue.as_ref()).await {
                        warn!("Inbox scan failed: {}", e);
                    }
                    self.fill_workers(&mut workers).await
                }
            };
            if let Err(e) = filled {
                error!("Queue unavailable, stopping intake: {}", e);
                break Some(e);
            }
        };

        if !workers.is_empty() {
            info!("Waiting for {} in-flight ticket(s)", workers.len());
        }
        while let Some(joined) = workers.join_next().await {
            log_worker_exit(joined);
        }
        emit_event!(OrchestratorEvent::StatusUpdate("orchestrator stopped".to_string()));
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn fill_workers(
        self: &Arc<Self>,
        workers: &mut JoinSet<AgentResult<Option<TicketOutcome>>>,
    ) -> AgentResult<()> {
        while workers.len() < self.settings.max_concurrency {
            let Some(task) = self.queue.dequeue().await? else {
                break;
            };
            let this = Arc::clone(self);
            workers.spawn(async move { this.handle_task(task).await });
        }
        Ok(())
    }
}

fn finish(
    ticket: &Ticket,
    resolution: Resolution,
    report: DeveloperReport,
    review: Option<ReviewVerdict>,
    round: u32,
) -> TicketOutcome {
    TicketOutcome {
        ticket_id: ticket.ticket_id.clone(),
        resolution,
        report,
        review,
        rounds: round + 1,
        finished_at: Utc::now(),
    }
}

async fn draft(agent: &dyn Agent, assignment: &Assignment) -> AgentResult<DeveloperReport> {
    match agent.process(assignment).await? {
        AgentOutput::Patch(report) => Ok(report),
        AgentOutput::Review(_) => Err(AgentError::UnexpectedOutput {
            agent: agent.name().to_string(),
            expected: "patch",
        }),
    }
}

async fn review(agent: &dyn Agent, assignment: &Assignment) -> AgentResult<ReviewVerdict> {
    match agent.process(assignment).await? {
        AgentOutput::Review(verdict) => Ok(verdict),
        AgentOutput::Patch(_) => Err(AgentError::UnexpectedOutput {
            agent: agent.name().to_string(),
            expected: "review",
        }),
    }
}

fn log_worker_exit(joined: Result<AgentResult<Option<TicketOutcome>>, JoinError>) {
    match joined {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => error!("Ticket worker hit a queue error: {}", e),
        Err(e) => error!("Ticket worker panicked: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentStatus, AgentType};
    use crate::orchestrator::{SqliteTaskQueue, TaskStatus};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    type Script = Arc<Mutex<VecDeque<AgentResult<AgentOutput>>>>;

    struct ScriptedAgent {
        kind: AgentType,
        script: Script,
        delay: Duration,
    }

    #[async_trait]
    impl Agent for ScriptedAgent {
        fn agent_type(&self) -> AgentType {
            self.kind
        }

        fn name(&self) -> &str {
            "scripted"
        }

        fn status(&self) -> AgentStatus {
            AgentStatus::Idle
        }

        async fn process(&self, _assignment: &Assignment) -> AgentResult<AgentOutput> {
            tokio::time::sleep(self.delay).await;
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AgentError::Provider("script exhausted".into())))
        }
    }

    #[derive(Default)]
    struct ScriptedFactory {
        developer: Script,
        reviewer: Option<Script>,
        delay: Duration,
    }

    impl AgentFactory for ScriptedFactory {
        fn developer(&self) -> Box<dyn Agent> {
            Box::new(ScriptedAgent {
                kind: AgentType::Developer,
                script: self.developer.clone(),
                delay: self.delay,
            })
        }

        fn reviewer(&self) -> Option<Box<dyn Agent>> {
            let delay = self.delay;
            self.reviewer.clone().map(|script| {
                Box::new(ScriptedAgent { kind: AgentType::Reviewer, script, delay }) as Box<dyn Agent>
            })
        }
    }

    /// Sqlite queue that injects a lock error into selected calls
    struct FlakyQueue {
        inner: SqliteTaskQueue,
        /// Dequeue calls that succeed before every later one fails
        dequeue_budget: Option<usize>,
        dequeues: AtomicUsize,
        /// Complete calls that fail before the real one runs
        complete_failures: AtomicUsize,
    }

    impl FlakyQueue {
        async fn new(dir: &std::path::Path) -> Self {
            Self {
                inner: SqliteTaskQueue::new(dir.join("q.db")).await.unwrap(),
                dequeue_budget: None,
                dequeues: AtomicUsize::new(0),
                complete_failures: AtomicUsize::new(0),
            }
        }

        fn locked() -> AgentError {
            AgentError::Queue("database is locked".into())
        }
    }

    #[async_trait]
    impl TicketQueue for FlakyQueue {
        async fn enqueue(&self, ticket: &Ticket) -> AgentResult<String> {
            self.inner.enqueue(ticket).await
        }

        async fn dequeue(&self) -> AgentResult<Option<QueuedTicket>> {
            let n = self.dequeues.fetch_add(1, Ordering::SeqCst);
            if self.dequeue_budget.is_some_and(|budget| n >= budget) {
                return Err(Self::locked());
            }
            self.inner.dequeue().await
        }

        async fn complete(&self, id: &str) -> AgentResult<()> {
            let pending = self.complete_failures.load(Ordering::SeqCst);
            if pending > 0 {
                self.complete_failures.store(pending - 1, Ordering::SeqCst);
                return Err(Self::locked());
            }
            self.inner.complete(id).await
        }

        async fn fail(&self, id: &str, error: &str, should_retry: bool) -> AgentResult<()> {
            self.inner.fail(id, error, should_retry).await
        }

        async fn status(&self, id: &str) -> AgentResult<Option<TaskStatus>> {
            self.inner.status(id).await
        }

        async fn count(&self, status: TaskStatus) -> AgentResult<i64> {
            self.inner.count(status).await
        }

        async fn find_active(&self, ticket_id: &str) -> AgentResult<Option<String>> {
            self.inner.find_active(ticket_id).await
        }

        async fn recover_stale(&self) -> AgentResult<usize> {
            self.inner.recover_stale().await
        }
    }

    fn ticket() -> Ticket {
        Ticket {
            ticket_id: "ENG-1".into(),
            summary: "Cache never expires".into(),
            affected_files: vec!["src/cache.rs".into()],
            affected_modules: vec!["cache".into()],
            affected_functions: vec!["get".into()],
            errors_identified: vec!["stale values returned".into()],
        }
    }

    fn patch(round: u32) -> AgentResult<AgentOutput> {
        Ok(AgentOutput::Patch(DeveloperReport {
            ticket_id: "ENG-1".into(),
            round,
            model: "m".into(),
            analysis: format!("draft {}", round),
            root_cause: None,
            changes: vec![],
            tests: vec![],
            confidence: 0.7,
        }))
    }

    fn verdict(approved: bool) -> AgentResult<AgentOutput> {
        Ok(AgentOutput::Review(if approved {
            ReviewVerdict::approve("good")
        } else {
            ReviewVerdict::changes_requested("not yet", vec!["missing test".into()])
        }))
    }

    fn script(items: Vec<AgentResult<AgentOutput>>) -> Script {
        Arc::new(Mutex::new(items.into_iter().collect()))
    }

    fn orchestrator_on(queue: Arc<dyn TicketQueue>, factory: ScriptedFactory, dir: &std::path::Path) -> Orchestrator {
        let config = OrchestratorConfig {
            inbox_dir: dir.join("inbox"),
            reports_dir: dir.join("reports"),
            max_revisions: 1,
            max_attempts: 2,
            ..OrchestratorConfig::default()
        };
        Orchestrator::new(queue, Arc::new(factory), &config)
    }

    async fn orchestrator(factory: ScriptedFactory, dir: &std::path::Path) -> Orchestrator {
        let queue = SqliteTaskQueue::new(dir.join("q.db")).await.unwrap();
        orchestrator_on(Arc::new(queue), factory, dir)
    }

    #[tokio::test]
    async fn test_approved_after_revision() {
        let dir = tempdir().unwrap();
        let factory = ScriptedFactory {
            developer: script(vec![patch(0), patch(1)]),
            reviewer: Some(script(vec![verdict(false), verdict(true)])),
            ..Default::default()
        };
        let orch = orchestrator(factory, dir.path()).await;

        let outcome = orch.process_ticket(&ticket()).await.unwrap();
        assert_eq!(outcome.resolution, Resolution::Approved);
        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.report.analysis, "draft 1");
    }

    #[tokio::test]
    async fn test_escalated_when_revisions_run_out() {
        let dir = tempdir().unwrap();
        let factory = ScriptedFactory {
            developer: script(vec![patch(0), patch(1)]),
            reviewer: Some(script(vec![verdict(false), verdict(false)])),
            ..Default::default()
        };
        let orch = orchestrator(factory, dir.path()).await;

        let outcome = orch.process_ticket(&ticket()).await.unwrap();
        assert_eq!(outcome.resolution, Resolution::Escalated);
        assert_eq!(outcome.rounds, 2);
        assert!(outcome.review.is_some_and(|r| !r.is_approved()));
    }

    #[tokio::test]
    async fn test_unreviewed_without_reviewer() {
        let dir = tempdir().unwrap();
        let factory = ScriptedFactory { developer: script(vec![patch(0)]), ..Default::default() };
        let orch = orchestrator(factory, dir.path()).await;

        let outcome = orch.process_ticket(&ticket()).await.unwrap();
        assert_eq!(outcome.resolution, Resolution::Unreviewed);
        assert_eq!(outcome.rounds, 1);
    }

    #[tokio::test]
    async fn test_wrong_output_kind_is_rejected() {
        let dir = tempdir().unwrap();
        let factory = ScriptedFactory { developer: script(vec![verdict(true)]), ..Default::default() };
        let orch = orchestrator(factory, dir.path()).await;

        let err = orch.process_ticket(&ticket()).await.unwrap_err();
        assert!(matches!(err, AgentError::UnexpectedOutput { expected: "patch", .. }));
    }

    #[tokio::test]
    async fn test_handle_task_retries_then_fails() {
        let dir = tempdir().unwrap();
        let factory = ScriptedFactory { developer: script(vec![]), ..Default::default() };
        let orch = orchestrator(factory, dir.path()).await;
        let id = orch.queue().enqueue(&ticket()).await.unwrap();

        assert_eq!(orch.run_pending().await.unwrap(), 2);
        assert_eq!(orch.queue().status(&id).await.unwrap(), Some(TaskStatus::Failed));
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let dir = tempdir().unwrap();
        let factory = ScriptedFactory {
            developer: script(vec![Err(AgentError::InvalidInput("nope".into()))]),
            ..Default::default()
        };
        let orch = orchestrator(factory, dir.path()).await;
        let id = orch.queue().enqueue(&ticket()).await.unwrap();

        assert_eq!(orch.run_pending().await.unwrap(), 1);
        assert_eq!(orch.queue().status(&id).await.unwrap(), Some(TaskStatus::Failed));
    }

    #[tokio::test]
    async fn test_success_writes_report() {
        let dir = tempdir().unwrap();
        let factory = ScriptedFactory {
            developer: script(vec![patch(0)]),
            reviewer: Some(script(vec![verdict(true)])),
            ..Default::default()
        };
        let orch = orchestrator(factory, dir.path()).await;
        let id = orch.queue().enqueue(&ticket()).await.unwrap();

        assert_eq!(orch.run_pending().await.unwrap(), 1);
        assert_eq!(orch.queue().status(&id).await.unwrap(), Some(TaskStatus::Completed));
        let saved = orch.reports().load("ENG-1").await.unwrap().unwrap();
        assert_eq!(saved.resolution, Resolution::Approved);
    }

    #[tokio::test]
    async fn test_complete_is_retried_after_transient_error() {
        let dir = tempdir().unwrap();
        let mut flaky = FlakyQueue::new(dir.path()).await;
        flaky.complete_failures = AtomicUsize::new(1);
        let queue = Arc::new(flaky);
        let factory = ScriptedFactory { developer: script(vec![patch(0)]), ..Default::default() };
        let orch = orchestrator_on(queue.clone(), factory, dir.path());
        let id = queue.enqueue(&ticket()).await.unwrap();

        assert_eq!(orch.run_pending().await.unwrap(), 1);
        assert_eq!(queue.status(&id).await.unwrap(), Some(TaskStatus::Completed));
        assert_eq!(queue.complete_failures.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dequeue_error_drains_running_tickets() {
        let dir = tempdir().unwrap();
        let mut flaky = FlakyQueue::new(dir.path()).await;
        flaky.dequeue_budget = Some(1);
        let queue = Arc::new(flaky);
        let factory = ScriptedFactory {
            developer: script(vec![patch(0)]),
            delay: Duration::from_millis(100),
            ..Default::default()
        };
        let orch = orchestrator_on(queue.clone(), factory, dir.path());
        let settings = OrchestratorSettings { max_concurrency: 2, ..orch.settings().clone() };
        let orch = Arc::new(orch.with_settings(settings));
        let id = queue.enqueue(&ticket()).await.unwrap();

        let err = orch.clone().run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::Queue(_)));
        assert_eq!(queue.status(&id).await.unwrap(), Some(TaskStatus::Completed));
        assert!(orch.reports().load("ENG-1").await.unwrap().is_some());
    }
}
