//! Report Store
//!
//! Finished tickets are written as pretty JSON, one file per ticket.

use std::path::{Path, PathBuf};
use tokio::fs;

use super::TicketOutcome;
use crate::error::AgentResult;
use crate::ticket::sanitize_id;

pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, ticket_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_id(ticket_id)))
    }

    /// Write the outcome, replacing any earlier report for the same ticket
    pub async fn save(&self, outcome: &TicketOutcome) -> AgentResult<PathBuf> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&outcome.ticket_id);
        let content = serde_json::to_string_pretty(outcome)?;
        fs::write(&path, content).await?;
        Ok(path)
    }

    pub async fn load(&self, ticket_id: &str) -> AgentResult<Option<TicketOutcome>> {
        let path = self.path_for(ticket_id);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All stored reports, sorted by ticket id
    pub async fn list(&self) -> AgentResult<Vec<TicketOutcome>> {
        let mut outcomes = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(outcomes),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|ext| ext == "json").unwrap_or(false) {
                let content = fs::read_to_string(&path).await?;
                match serde_json::from_str::<TicketOutcome>(&content) {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(e) => tracing::warn!("Skipping unreadable report {}: {}", path.display(), e),
                }
            }
        }
        outcomes.sort_by(|a, b| a.ticket_id.cmp(&b.ticket_id));
        Ok(outcomes)
    }
}
