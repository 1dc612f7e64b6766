use serde::{Deserialize, Serialize};

use crate::config::{OrchestratorConfig, TeamProfile};

/// Roles an agent can fill in the ticket pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Developer,
    Reviewer,
}

impl AgentType {
    /// Get the default model for this agent type
    pub fn default_model(&self) -> &'static str {
        match self {
            AgentType::Developer => "qwen2.5-coder:7b",
            AgentType::Reviewer => "deepseek-r1:8b",
        }
    }

    /// Generate a system prompt based on agent type and team profile
    pub fn generate_system_prompt(&self, profile: &TeamProfile) -> String {
        let base = match self {
            AgentType::Developer =>
                "You are an expert software developer fixing bug tickets. \
                 CRITICAL RULES: \
                 1. Base every conclusion on the source excerpts you are given; never invent file contents. \
                 2. Only change files listed in the ticket unless a change elsewhere is unavoidable, and say why. \
                 3. Patches must be unified diffs against the excerpt shown. \
                 4. Address every reported error, or explain why it is not reproducible.".to_string(),

            AgentType::Reviewer =>
                "You are a strict code reviewer. Your job is to decide whether a proposed fix resolves the ticket. \
                 CRITICAL RULES: \
                 1. Check every reported error against the proposed changes. \
                 2. Reject changes to files the ticket does not mention unless they are clearly justified. \
                 3. Reject fixes without a regression test. \
                 4. Be concrete: every issue must name a file or function.".to_string(),
        };

        let conventions = if profile.conventions.is_empty() {
            "none".to_string()
        } else {
            profile.conventions.join(", ")
        };

        format!("{}\n\nTEAM CONTEXT:\n- Name: {}\n- Mission: {}\n- Conventions: {}",
            base, profile.name, profile.mission, conventions)
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentType::Developer => write!(f, "Developer"),
            AgentType::Reviewer => write!(f, "Reviewer"),
        }
    }
}

/// Configuration for an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent_type: AgentType,
    pub model: String,
    pub system_prompt: String,
    /// Per-file byte budget for source excerpts
    pub file_context_bytes: usize,
}

impl AgentConfig {
    pub fn new(agent_type: AgentType, profile: &TeamProfile) -> Self {
        Self {
            agent_type,
            model: agent_type.default_model().to_string(),
            system_prompt: agent_type.generate_system_prompt(profile),
            file_context_bytes: 16 * 1024,
        }
    }

    /// Build the config for `agent_type`, honoring model overrides
    pub fn from_orchestrator(agent_type: AgentType, config: &OrchestratorConfig) -> Self {
        let mut agent = Self::new(agent_type, &config.profile);
        let model_override = match agent_type {
            AgentType::Developer => config.developer_model.as_ref(),
            AgentType::Reviewer => config.reviewer_model.as_ref(),
        };
        if let Some(model) = model_override {
            agent.model = model.clone();
        }
        agent.file_context_bytes = config.file_context_bytes;
        agent
    }
}
