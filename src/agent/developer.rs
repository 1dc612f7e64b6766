//! Developer Agent
//!
//! Reads the files a ticket names, asks the model for a diagnosis and a set
//! of per-file patches, and parses the tagged reply into a `DeveloperReport`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::parsing::{extract_all_tags, extract_json_object, extract_tag, list_items};
use super::{Agent, AgentConfig, AgentOutput, AgentStatus, AgentType, Assignment, LLMProvider, StatusTracker};
use crate::error::{AgentError, AgentResult};
use crate::ticket::Ticket;
use crate::utils::truncate::{approx_token_count, truncate_text, TruncationPolicy};

const RESPONSE_TAGS: &[&str] = &["ANALYSIS", "ROOT_CAUSE", "CHANGE", "TESTS", "CONFIDENCE"];
const DEFAULT_CONFIDENCE: f32 = 0.5;

/// A proposed edit to one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChange {
    pub file: String,
    #[serde(default)]
    pub summary: String,
    /// Unified diff against the excerpt the model was shown
    #[serde(default)]
    pub patch: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeveloperReport {
    pub ticket_id: String,
    pub round: u32,
    pub model: String,
    pub analysis: String,
    pub root_cause: Option<String>,
    pub changes: Vec<FileChange>,
    pub tests: Vec<String>,
    pub confidence: f32,
}

impl DeveloperReport {
    /// Changed files the ticket does not list
    pub fn out_of_scope_files(&self, ticket: &Ticket) -> Vec<String> {
        self.changes
            .iter()
            .filter(|c| !ticket.mentions_file(&c.file))
            .map(|c| c.file.clone())
            .collect()
    }

    pub fn changed_files(&self) -> Vec<&str> {
        self.changes.iter().map(|c| c.file.as_str()).collect()
    }
}

impl std::fmt::Display for DeveloperReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ticket {} (round {}): {} change(s) [{}], confidence {:.2}. {}",
            self.ticket_id,
            self.round,
            self.changes.len(),
            self.changed_files().join(", "),
            self.confidence,
            truncate_text(&self.analysis.replace('\n', " "), TruncationPolicy::Bytes(160)),
        )
    }
}

pub struct DeveloperAgent {
    name: String,
    provider: Arc<dyn LLMProvider>,
    config: AgentConfig,
    workspace_root: PathBuf,
    status: StatusTracker,
}

impl DeveloperAgent {
    pub fn new(provider: Arc<dyn LLMProvider>, config: AgentConfig) -> Self {
        let name = "developer".to_string();
        Self {
            status: StatusTracker::new(name.clone()),
            name,
            provider,
            config,
            workspace_root: PathBuf::from("."),
        }
    }

    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self.status = StatusTracker::new(self.name.clone());
        self
    }

    pub fn status_tracker(&self) -> &StatusTracker {
        &self.status
    }

    /// Excerpts of every affected file; missing files become a note
    async fn load_file_context(&self, ticket: &Ticket) -> String {
        let policy = TruncationPolicy::Bytes(self.config.file_context_bytes);
        let mut context = String::new();

        for file in &ticket.affected_files {
            let path = self.workspace_root.join(file);
            let body = match tokio::fs::read_to_string(&path).await {
                Ok(content) => format!("```\n{}\n```", truncate_text(&content, policy)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!("Affected file {} not found under {}", file, self.workspace_root.display());
                    "(file not found in workspace)".to_string()
                }
                Err(e) => format!("(file unreadable: {})", e),
            };
            context.push_str(&format!("### {}\n{}\n\n", file, body));
        }

        context
    }

    fn build_prompt(&self, assignment: &Assignment, file_context: &str) -> String {
        let ticket = &assignment.ticket;
        let mut prompt = String::new();

        prompt.push_str(&format!("## Ticket {}\n{}\n\n", ticket.ticket_id, ticket.summary));
        prompt.push_str(&format!("Affected modules: {}\n", join_or_none(&ticket.affected_modules)));
        prompt.push_str(&format!("Affected functions: {}\n\n", join_or_none(&ticket.affected_functions)));

        prompt.push_str("## Reported Errors\n");
        if ticket.errors_identified.is_empty() {
            prompt.push_str("- none reported\n");
        }
        for err in &ticket.errors_identified {
            prompt.push_str(&format!("- {}\n", err));
        }
        prompt.push('\n');

        if !file_context.is_empty() {
            prompt.push_str("## Source Excerpts\n");
            prompt.push_str(file_context);
        }

        if let Some(ref draft) = assignment.draft {
            prompt.push_str(&format!("## Previous Draft (round {})\n{}\n", draft.round, draft.analysis));
            for change in &draft.changes {
                prompt.push_str(&format!("- {}: {}\n", change.file, change.summary));
            }
            prompt.push('\n');
        }

        if let Some(ref feedback) = assignment.feedback {
            prompt.push_str(&format!("## Reviewer Feedback\nThe previous draft was rejected. Address every point:\n{}\n\n", feedback));
        }

        prompt.push_str(r###"## Response Format
Respond using the EXACT tags below.

[ANALYSIS]
What is wrong and why, referring to the excerpts.

[ROOT_CAUSE]
One sentence naming the defect.

[CHANGE]
{"file": "path/from/ticket.rs", "summary": "what changes", "patch": "unified diff"}

[TESTS]
- regression test to add

[CONFIDENCE]
A number between 0 and 1.

RULES:
1. Emit one [CHANGE] block per file, each holding a single JSON object.
2. Escape newlines inside the patch string.
3. NEVER invent file contents you were not shown.
"###);
        prompt
    }

    fn parse_response(&self, response: &str, assignment: &Assignment) -> AgentResult<DeveloperReport> {
        debug!("Raw developer response:\n{}", response);

        let analysis = extract_tag(response, "ANALYSIS", RESPONSE_TAGS);
        let root_cause = extract_tag(response, "ROOT_CAUSE", RESPONSE_TAGS);

        let mut changes = Vec::new();
        for block in extract_all_tags(response, "CHANGE", RESPONSE_TAGS) {
            let parsed = extract_json_object(&block)
                .and_then(|json| serde_json::from_str::<FileChange>(json).ok())
                .filter(|c| !c.file.trim().is_empty());
            match parsed {
                Some(change) => changes.push(change),
                None => warn!("Skipping unparsable [CHANGE] block for ticket {}", assignment.ticket.ticket_id),
            }
        }

        if analysis.is_none() && changes.is_empty() {
            return Err(AgentError::MalformedResponse(
                "reply has neither an [ANALYSIS] nor a [CHANGE] section".to_string(),
            ));
        }

        let tests = extract_tag(response, "TESTS", RESPONSE_TAGS)
            .map(|s| list_items(&s))
            .unwrap_or_default();

        let confidence = extract_tag(response, "CONFIDENCE", RESPONSE_TAGS)
            .and_then(|s| parse_confidence(&s))
            .unwrap_or(DEFAULT_CONFIDENCE);

        Ok(DeveloperReport {
            ticket_id: assignment.ticket.ticket_id.clone(),
            round: assignment.round,
            model: self.config.model.clone(),
            analysis: analysis.unwrap_or_else(|| "(no analysis provided)".to_string()),
            root_cause,
            changes,
            tests,
            confidence,
        })
    }

    async fn draft(&self, assignment: &Assignment) -> AgentResult<DeveloperReport> {
        assignment.ticket.validate()?;

        let file_context = self.load_file_context(&assignment.ticket).await;
        let prompt = self.build_prompt(assignment, &file_context);
        info!(
            "Developer drafting ticket {} round {} (~{} prompt tokens)",
            assignment.ticket.ticket_id,
            assignment.round,
            approx_token_count(&prompt)
        );

        let system = &self.config.system_prompt;
        let response = self.provider
            .generate(&self.config.model, prompt.clone(), Some(system.clone()))
            .await
            .map_err(|e| AgentError::Provider(format!("{:#}", e)))?;

        let parsed = self.parse_response(&response, assignment);
        if let Err(AgentError::MalformedResponse(_)) = parsed {
            // A retry must reach the model, not replay the same reply
            self.provider.forget(&self.config.model, &prompt, Some(system)).await;
        }
        parsed
    }
}

#[async_trait]
impl Agent for DeveloperAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Developer
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> AgentStatus {
        self.status.get()
    }

    async fn process(&self, assignment: &Assignment) -> AgentResult<AgentOutput> {
        self.status.set(AgentStatus::Working);
        let result = self.draft(assignment).await;
        self.status.set(if result.is_ok() { AgentStatus::Completed } else { AgentStatus::Failed });
        result.map(AgentOutput::Patch)
    }
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() { "none".to_string() } else { items.join(", ") }
}

fn parse_confidence(raw: &str) -> Option<f32> {
    let token = raw.split_whitespace().next()?;
    let (number, percent) = match token.strip_suffix('%') {
        Some(n) => (n, true),
        None => (token, false),
    };
    let mut value: f32 = number.trim_end_matches(['.', ',']).parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    if percent || value > 1.0 {
        value /= 100.0;
    }
    Some(value.clamp(0.0, 1.0))
}
