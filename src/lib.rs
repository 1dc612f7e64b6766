//! Dev Agency
//!
//! A ticket-driven development agency:
//! - Tickets dropped into an inbox are queued durably in SQLite
//! - A developer agent drafts fixes, a reviewer agent approves or sends them back
//! - Results are written as JSON reports

pub mod agent;
pub mod config;
pub mod error;
pub mod launcher;
pub mod orchestrator;
pub mod smoke;
pub mod ticket;
pub mod utils;

// Re-exports for convenience
pub use agent::{Agent, AgentStatus, AgentType, DeveloperAgent};
pub use config::{ConfigManager, OrchestratorConfig};
pub use error::{AgentError, AgentResult};
pub use launcher::{run_until_interrupted, start_orchestrator, LaunchOutcome};
pub use orchestrator::Orchestrator;
pub use ticket::Ticket;
