//! Agency Error Types
//!
//! A single error enum shared by agents, the queue and the orchestrator.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// The LLM backend could not be reached or returned an error
    #[error("provider error: {0}")]
    Provider(String),

    /// The assignment or ticket handed to an agent is unusable
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The model answered, but not in the expected format
    #[error("malformed agent response: {0}")]
    MalformedResponse(String),

    /// An agent produced the wrong kind of output for its pipeline slot
    #[error("unexpected output from {agent}: expected {expected}")]
    UnexpectedOutput { agent: String, expected: &'static str },

    #[error("queue error: {0}")]
    Queue(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AgentError {
    /// Transient failures that are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, AgentError::Provider(_) | AgentError::MalformedResponse(_))
    }
}

impl From<rusqlite::Error> for AgentError {
    fn from(e: rusqlite::Error) -> Self {
        AgentError::Queue(e.to_string())
    }
}

impl From<tokio::task::JoinError> for AgentError {
    fn from(e: tokio::task::JoinError) -> Self {
        AgentError::Queue(format!("blocking task failed: {}", e))
    }
}

pub type AgentResult<T> = std::result::Result<T, AgentError>;
