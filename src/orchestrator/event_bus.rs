//! Orchestrator Event Bus
//!
//! Process-wide broadcast channel for ticket lifecycle events. Publishing
//! never blocks; slow subscribers see `Lagged` and skip ahead.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use std::sync::Arc;

use crate::agent::AgentStatus;
use crate::orchestrator::Resolution;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum OrchestratorEvent {
    /// A ticket file was accepted into the queue
    TicketQueued { ticket_id: String, queue_id: String },
    TicketStarted { ticket_id: String, attempt: i32 },
    AgentStatusChanged { agent: String, status: AgentStatus },
    /// The developer produced a draft for a round
    DraftProduced { ticket_id: String, round: u32, changes: usize },
    ReviewCompleted { ticket_id: String, round: u32, approved: bool },
    TicketCompleted { ticket_id: String, resolution: Resolution },
    TicketFailed { ticket_id: String, error: String, will_retry: bool },
    /// Generic status update
    StatusUpdate(String),
}

pub struct EventBus {
    tx: broadcast::Sender<OrchestratorEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: OrchestratorEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static::lazy_static! {
    /// Global singleton instance of the EventBus
    pub static ref EVENT_BUS: Arc<EventBus> = Arc::new(EventBus::new());
}

/// Helper macro to publish events globally
#[macro_export]
macro_rules! emit_event {
    ($event:expr) => {
        $crate::orchestrator::event_bus::EVENT_BUS.publish($event);
    };
}

/// Forward every event to tracing until the bus closes
pub async fn log_events(mut rx: broadcast::Receiver<OrchestratorEvent>) {
    loop {
        match rx.recv().await {
            Ok(OrchestratorEvent::TicketFailed { ticket_id, error, will_retry }) => {
                tracing::warn!(ticket = %ticket_id, will_retry, "ticket failed: {}", error);
            }
            Ok(OrchestratorEvent::AgentStatusChanged { .. }) => {}
            Ok(event) => tracing::info!(?event, "orchestrator event"),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::debug!("event logger lagged by {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(OrchestratorEvent::StatusUpdate("hello".into()));
        assert_eq!(rx.recv().await.unwrap(), OrchestratorEvent::StatusUpdate("hello".into()));
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.publish(OrchestratorEvent::StatusUpdate("nobody listening".into()));
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = OrchestratorEvent::ReviewCompleted { ticket_id: "T-1".into(), round: 1, approved: true };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ReviewCompleted");
        assert_eq!(json["payload"]["approved"], true);
    }
}
