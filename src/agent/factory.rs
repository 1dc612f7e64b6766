use std::path::PathBuf;
use std::sync::Arc;

use super::{Agent, AgentConfig, AgentType, DeveloperAgent, LLMProvider, ReviewerAgent};
use crate::config::OrchestratorConfig;

/// Builds fresh agents for each ticket so status never leaks between runs
pub trait AgentFactory: Send + Sync {
    fn developer(&self) -> Box<dyn Agent>;

    /// `None` when review is disabled
    fn reviewer(&self) -> Option<Box<dyn Agent>>;
}

pub struct ProviderAgentFactory {
    provider: Arc<dyn LLMProvider>,
    developer_config: AgentConfig,
    reviewer_config: Option<AgentConfig>,
    workspace_root: PathBuf,
}

impl ProviderAgentFactory {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &OrchestratorConfig) -> Self {
        Self {
            provider,
            developer_config: AgentConfig::from_orchestrator(AgentType::Developer, config),
            reviewer_config: config
                .review_enabled
                .then(|| AgentConfig::from_orchestrator(AgentType::Reviewer, config)),
            workspace_root: config.workspace_root.clone(),
        }
    }
}

impl AgentFactory for ProviderAgentFactory {
    fn developer(&self) -> Box<dyn Agent> {
        Box::new(
            DeveloperAgent::new(self.provider.clone(), self.developer_config.clone())
                .with_workspace_root(self.workspace_root.clone()),
        )
    }

    fn reviewer(&self) -> Option<Box<dyn Agent>> {
        self.reviewer_config
            .clone()
            .map(|config| Box::new(ReviewerAgent::new(self.provider.clone(), config)) as Box<dyn Agent>)
    }
}
