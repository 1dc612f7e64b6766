//! Reviewer Agent
//!
//! Checks a developer draft against its ticket and either approves it or
//! sends it back with concrete issues.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::parsing::{extract_tag, list_items};
use super::{Agent, AgentConfig, AgentOutput, AgentStatus, AgentType, Assignment, DeveloperReport, LLMProvider, StatusTracker};
use crate::error::{AgentError, AgentResult};
use crate::ticket::Ticket;

const RESPONSE_TAGS: &[&str] = &["VERDICT", "SUMMARY", "ISSUES"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    RequestChanges,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    pub decision: ReviewDecision,
    pub summary: String,
    pub issues: Vec<String>,
}

impl ReviewVerdict {
    pub fn approve(summary: impl Into<String>) -> Self {
        Self { decision: ReviewDecision::Approve, summary: summary.into(), issues: Vec::new() }
    }

    pub fn changes_requested(summary: impl Into<String>, issues: Vec<String>) -> Self {
        Self { decision: ReviewDecision::RequestChanges, summary: summary.into(), issues }
    }

    pub fn is_approved(&self) -> bool {
        self.decision == ReviewDecision::Approve
    }

    /// Text handed to the developer for the next round
    pub fn as_feedback(&self) -> String {
        let mut feedback = self.summary.clone();
        for issue in &self.issues {
            feedback.push_str(&format!("\n- {}", issue));
        }
        feedback
    }
}

impl std::fmt::Display for ReviewVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let decision = match self.decision {
            ReviewDecision::Approve => "approved",
            ReviewDecision::RequestChanges => "changes requested",
        };
        write!(f, "{}: {}", decision, self.summary)?;
        if !self.issues.is_empty() {
            write!(f, " ({} issue(s))", self.issues.len())?;
        }
        Ok(())
    }
}

pub struct ReviewerAgent {
    name: String,
    provider: Arc<dyn LLMProvider>,
    config: AgentConfig,
    status: StatusTracker,
}

impl ReviewerAgent {
    pub fn new(provider: Arc<dyn LLMProvider>, config: AgentConfig) -> Self {
        let name = "reviewer".to_string();
        Self {
            status: StatusTracker::new(name.clone()),
            name,
            provider,
            config,
        }
    }

    fn build_prompt(&self, ticket: &Ticket, draft: &DeveloperReport, out_of_scope: &[String]) -> String {
        let mut prompt = format!(
            "## Ticket {}\n{}\n\n## Reported Errors\n",
            ticket.ticket_id, ticket.summary
        );
        for err in &ticket.errors_identified {
            prompt.push_str(&format!("- {}\n", err));
        }
        prompt.push_str(&format!("\nFiles in scope: {}\n\n", ticket.affected_files.join(", ")));

        prompt.push_str(&format!("## Proposed Fix (round {}, confidence {:.2})\n", draft.round, draft.confidence));
        prompt.push_str(&format!("Analysis: {}\n", draft.analysis));
        if let Some(ref cause) = draft.root_cause {
            prompt.push_str(&format!("Root cause: {}\n", cause));
        }
        for change in &draft.changes {
            prompt.push_str(&format!("\n### {} - {}\n```diff\n{}\n```\n", change.file, change.summary, change.patch));
        }
        prompt.push_str("\nTests proposed:\n");
        if draft.tests.is_empty() {
            prompt.push_str("- none\n");
        }
        for test in &draft.tests {
            prompt.push_str(&format!("- {}\n", test));
        }

        if !out_of_scope.is_empty() {
            prompt.push_str(&format!("\nWARNING: the draft changes files outside the ticket: {}\n", out_of_scope.join(", ")));
        }

        prompt.push_str(r#"
## Review Task
Decide whether this fix resolves every reported error without collateral changes.

Format your response as:
VERDICT: [approve/request_changes]
SUMMARY: [one paragraph]
ISSUES:
- [issue 1]
- [issue 2]
"#);
        prompt
    }

    fn parse_verdict(&self, response: &str, out_of_scope: &[String]) -> ReviewVerdict {
        debug!("Raw reviewer response:\n{}", response);

        let decision = extract_tag(response, "VERDICT", RESPONSE_TAGS)
            .map(|v| parse_decision(&v))
            .unwrap_or(ReviewDecision::RequestChanges);

        let summary = extract_tag(response, "SUMMARY", RESPONSE_TAGS)
            .unwrap_or_else(|| "Reviewer gave no summary".to_string());

        let mut issues: Vec<String> = extract_tag(response, "ISSUES", RESPONSE_TAGS)
            .map(|s| list_items(&s))
            .unwrap_or_default()
            .into_iter()
            .filter(|i| !i.eq_ignore_ascii_case("none"))
            .collect();

        let mut verdict = ReviewVerdict { decision, summary, issues: Vec::new() };

        if !out_of_scope.is_empty() {
            issues.push(format!("changes files outside the ticket: {}", out_of_scope.join(", ")));
            verdict.decision = ReviewDecision::RequestChanges;
        }
        verdict.issues = issues;
        verdict
    }

    async fn review(&self, assignment: &Assignment) -> AgentResult<ReviewVerdict> {
        let draft = assignment.draft.as_ref().ok_or_else(|| {
            AgentError::InvalidInput(format!("ticket {} has no draft to review", assignment.ticket.ticket_id))
        })?;

        let out_of_scope = draft.out_of_scope_files(&assignment.ticket);
        let prompt = self.build_prompt(&assignment.ticket, draft, &out_of_scope);

        let response = self.provider
            .generate(&self.config.model, prompt, Some(self.config.system_prompt.clone()))
            .await
            .map_err(|e| AgentError::Provider(format!("{:#}", e)))?;

        let verdict = self.parse_verdict(&response, &out_of_scope);
        info!("Review of ticket {} round {}: {}", assignment.ticket.ticket_id, assignment.round, verdict);
        Ok(verdict)
    }
}

/// Only a verdict that is exactly one approving word approves
fn parse_decision(raw: &str) -> ReviewDecision {
    let line = raw.lines().next().unwrap_or("").trim().to_lowercase();
    if line.contains("request") || line.contains("reject") || line.contains("change") {
        return ReviewDecision::RequestChanges;
    }
    let word = line.trim_matches(|c: char| !c.is_alphanumeric() && c != '_');
    match word {
        "approve" | "approved" | "lgtm" | "accept" | "accepted" => ReviewDecision::Approve,
        _ => ReviewDecision::RequestChanges,
    }
}

#[async_trait]
impl Agent for ReviewerAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Reviewer
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> AgentStatus {
        self.status.get()
    }

    async fn process(&self, assignment: &Assignment) -> AgentResult<AgentOutput> {
        self.status.set(AgentStatus::Working);
        let result = self.review(assignment).await;
        self.status.set(if result.is_ok() { AgentStatus::Completed } else { AgentStatus::Failed });
        result.map(AgentOutput::Review)
    }
}
