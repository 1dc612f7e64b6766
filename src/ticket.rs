//! Ticket Model
//!
//! A bug-report-like record naming the files, modules and functions a
//! problem touches, along with the errors observed.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path};
use thiserror::Error;

use crate::error::AgentError;

#[derive(Debug, Error, PartialEq)]
pub enum TicketError {
    #[error("ticket_id must not be empty")]
    MissingId,
    #[error("ticket {0} has an empty summary")]
    MissingSummary(String),
    #[error("affected file '{0}' escapes the workspace")]
    PathEscapesWorkspace(String),
}

impl From<TicketError> for AgentError {
    fn from(e: TicketError) -> Self {
        AgentError::InvalidInput(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: String,
    pub summary: String,
    pub affected_files: Vec<String>,
    pub affected_modules: Vec<String>,
    pub affected_functions: Vec<String>,
    pub errors_identified: Vec<String>,
}

impl Ticket {
    pub fn validate(&self) -> Result<(), TicketError> {
        if self.ticket_id.trim().is_empty() {
            return Err(TicketError::MissingId);
        }
        if self.summary.trim().is_empty() {
            return Err(TicketError::MissingSummary(self.ticket_id.clone()));
        }
        for file in &self.affected_files {
            let path = Path::new(file);
            let escapes = path.is_absolute()
                || path.components().any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
            if escapes {
                return Err(TicketError::PathEscapesWorkspace(file.clone()));
            }
        }
        Ok(())
    }

    /// Read and validate a ticket from a JSON file
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        let ticket: Ticket = serde_json::from_str(&content)?;
        ticket.validate()?;
        Ok(ticket)
    }

    /// Filesystem-safe form of the ticket id
    pub fn file_stem(&self) -> String {
        sanitize_id(&self.ticket_id)
    }

    pub fn mentions_file(&self, file: &str) -> bool {
        let wanted = normalize(file);
        self.affected_files.iter().any(|f| normalize(f) == wanted)
    }
}

pub(crate) fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn normalize(path: &str) -> String {
    path.trim().trim_start_matches("./").replace('\\', "/")
}
