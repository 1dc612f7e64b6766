//! Agent Module
//!
//! Ticket-solving agents: a developer that drafts fixes and a reviewer that
//! accepts or sends them back.

mod cache;
mod developer;
mod factory;
pub mod parsing;
mod provider;
mod reviewer;
mod status;
mod types;

pub use cache::{CachedProvider, LLMCache};
pub use developer::{DeveloperAgent, DeveloperReport, FileChange};
pub use factory::{AgentFactory, ProviderAgentFactory};
pub use provider::{build_provider, LLMProvider, OllamaProvider, OpenAICompatibleProvider};
pub use reviewer::{ReviewDecision, ReviewVerdict, ReviewerAgent};
pub use status::{AgentStatus, StatusTracker};
pub use types::{AgentConfig, AgentType};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AgentResult;
use crate::ticket::Ticket;

/// One unit of work handed to an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub ticket: Ticket,
    /// 0 for the first draft, incremented on every revision
    pub round: u32,
    /// The developer's latest draft, present for reviews and revisions
    pub draft: Option<DeveloperReport>,
    /// Reviewer feedback the next draft must address
    pub feedback: Option<String>,
}

impl Assignment {
    pub fn new(ticket: Ticket) -> Self {
        Self { ticket, round: 0, draft: None, feedback: None }
    }

    pub fn for_review(&self, draft: DeveloperReport) -> Self {
        Self { draft: Some(draft), ..self.clone() }
    }

    /// Next developer round, carrying the rejected draft and its review
    pub fn revise(&self, draft: DeveloperReport, review: &ReviewVerdict) -> Self {
        Self {
            ticket: self.ticket.clone(),
            round: self.round + 1,
            draft: Some(draft),
            feedback: Some(review.as_feedback()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum AgentOutput {
    Patch(DeveloperReport),
    Review(ReviewVerdict),
}

impl std::fmt::Display for AgentOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentOutput::Patch(report) => write!(f, "{}", report),
            AgentOutput::Review(verdict) => write!(f, "{}", verdict),
        }
    }
}

/// Trait for ticket-processing agents
#[async_trait]
pub trait Agent: Send + Sync {
    fn agent_type(&self) -> AgentType;

    fn name(&self) -> &str;

    /// Current lifecycle state
    fn status(&self) -> AgentStatus;

    async fn process(&self, assignment: &Assignment) -> AgentResult<AgentOutput>;
}
