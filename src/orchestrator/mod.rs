//! Orchestrator Module
//!
//! Moves tickets from the inbox through the durable queue to the agents,
//! and records what came out.

pub mod queue;
pub mod intake;
pub mod engine;
pub mod reports;
#[macro_use]
pub mod event_bus;

pub use queue::{QueuedTicket, SqliteTaskQueue, TaskStatus, TicketQueue};
pub use intake::TicketInbox;
pub use engine::{Orchestrator, OrchestratorSettings, Resolution, TicketOutcome};
pub use reports::ReportStore;
pub use event_bus::{log_events, EventBus, OrchestratorEvent, EVENT_BUS};
