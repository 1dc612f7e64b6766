//! Agent Status Tracking
//!
//! Each agent owns a `watch` cell with its lifecycle state so callers can read
//! the current value or wait for changes.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::emit_event;
use crate::orchestrator::OrchestratorEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Working,
    Completed,
    Failed,
}

impl AgentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentStatus::Completed | AgentStatus::Failed)
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Idle => write!(f, "idle"),
            AgentStatus::Working => write!(f, "working"),
            AgentStatus::Completed => write!(f, "completed"),
            AgentStatus::Failed => write!(f, "failed"),
        }
    }
}

pub struct StatusTracker {
    agent: String,
    tx: watch::Sender<AgentStatus>,
}

impl StatusTracker {
    pub fn new(agent: impl Into<String>) -> Self {
        let (tx, _) = watch::channel(AgentStatus::Idle);
        Self { agent: agent.into(), tx }
    }

    pub fn get(&self) -> AgentStatus {
        *self.tx.borrow()
    }

    pub fn set(&self, status: AgentStatus) {
        let previous = self.tx.send_replace(status);
        if previous != status {
            tracing::debug!("{} status: {} -> {}", self.agent, previous, status);
            emit_event!(OrchestratorEvent::AgentStatusChanged {
                agent: self.agent.clone(),
                status,
            });
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AgentStatus> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_starts_idle() {
        let tracker = StatusTracker::new("developer");
        assert_eq!(tracker.get(), AgentStatus::Idle);
        assert!(!tracker.get().is_terminal());
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let tracker = StatusTracker::new("developer");
        let mut rx = tracker.subscribe();

        tracker.set(AgentStatus::Working);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), AgentStatus::Working);

        tracker.set(AgentStatus::Completed);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), AgentStatus::Completed);
        assert!(tracker.get().is_terminal());
    }

    #[test]
    fn test_display_is_lowercase() {
        assert_eq!(AgentStatus::Completed.to_string(), "completed");
        assert_eq!(AgentStatus::Failed.to_string(), "failed");
    }
}
