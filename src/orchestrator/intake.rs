//! Ticket Inbox
//!
//! Watches a directory for ticket JSON files and moves each one into the
//! queue. Processed files are filed under `accepted/` or `rejected/` so a
//! file is never picked up twice.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use super::{OrchestratorEvent, TicketQueue};
use crate::error::AgentResult;
use crate::ticket::Ticket;

pub const ACCEPTED_DIR: &str = "accepted";
pub const REJECTED_DIR: &str = "rejected";

pub struct TicketInbox {
    dir: PathBuf,
}

impl TicketInbox {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dirs(&self) -> AgentResult<()> {
        fs::create_dir_all(self.dir.join(ACCEPTED_DIR)).await?;
        fs::create_dir_all(self.dir.join(REJECTED_DIR)).await?;
        Ok(())
    }

    async fn pending_files(&self) -> AgentResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_json = path.extension().map(|ext| ext == "json").unwrap_or(false);
            if is_json && entry.file_type().await?.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    async fn file_away(&self, path: &Path, bucket: &str) -> AgentResult<()> {
        let Some(name) = path.file_name() else {
            return Ok(());
        };
        let target_dir = self.dir.join(bucket);
        fs::create_dir_all(&target_dir).await?;
        let target = free_target(&target_dir, Path::new(name)).await?;
        fs::rename(path, &target).await?;
        Ok(())
    }

    /// Enqueue every valid ticket in the inbox; returns the new queue ids
    pub async fn collect(&self, queue: &dyn TicketQueue) -> AgentResult<Vec<String>> {
        let mut queued = Vec::new();

        for path in self.pending_files().await? {
            let ticket = match Ticket::from_json_file(&path).await {
                Ok(ticket) => ticket,
                Err(e) => {
                    warn!("Rejecting ticket file {}: {}", path.display(), e);
                    self.file_away(&path, REJECTED_DIR).await?;
                    continue;
                }
            };

            if let Some(existing) = queue.find_active(&ticket.ticket_id).await? {
                debug!("Ticket {} already queued as {}, skipping", ticket.ticket_id, existing);
                self.file_away(&path, ACCEPTED_DIR).await?;
                continue;
            }

            let queue_id = queue.enqueue(&ticket).await?;
            self.file_away(&path, ACCEPTED_DIR).await?;
            info!("Queued ticket {} ({})", ticket.ticket_id, queue_id);
            crate::emit_event!(OrchestratorEvent::TicketQueued {
                ticket_id: ticket.ticket_id.clone(),
                queue_id: queue_id.clone(),
            });
            queued.push(queue_id);
        }

        Ok(queued)
    }
}

/// `dir/name`, or `dir/<stem>-<n>.<ext>` when an earlier file already took it
async fn free_target(dir: &Path, name: &Path) -> AgentResult<PathBuf> {
    let target = dir.join(name);
    if !fs::try_exists(&target).await? {
        return Ok(target);
    }
    let stem = name.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let ext = name.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();
    let mut n = 1u32;
    loop {
        let candidate = dir.join(format!("{}-{}{}", stem, n, ext));
        if !fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
        n += 1;
    }
}
