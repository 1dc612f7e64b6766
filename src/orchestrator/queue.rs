//! Durable Ticket Queue
//!
//! Tickets survive restarts in SQLite. Rows move pending -> running ->
//! completed/failed; a retried failure goes back to pending.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Serialize, Deserialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task;
use async_trait::async_trait;

use crate::error::{AgentError, AgentResult};
use crate::ticket::Ticket;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> AgentResult<Self> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(AgentError::Queue(format!("unknown task status '{}'", other))),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queue row as handed to a worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedTicket {
    pub id: String,
    pub ticket_id: String,
    pub payload: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Failed attempts so far
    pub attempts: i32,
    pub last_error: Option<String>,
}

impl QueuedTicket {
    pub fn ticket(&self) -> AgentResult<Ticket> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

#[async_trait]
pub trait TicketQueue: Send + Sync {
    async fn enqueue(&self, ticket: &Ticket) -> AgentResult<String>;
    /// Claim the oldest pending ticket and mark it running
    async fn dequeue(&self) -> AgentResult<Option<QueuedTicket>>;
    async fn complete(&self, id: &str) -> AgentResult<()>;
    async fn fail(&self, id: &str, error: &str, should_retry: bool) -> AgentResult<()>;
    async fn status(&self, id: &str) -> AgentResult<Option<TaskStatus>>;
    async fn count(&self, status: TaskStatus) -> AgentResult<i64>;
    /// Queue id of a pending or running row for this ticket, if any
    async fn find_active(&self, ticket_id: &str) -> AgentResult<Option<String>>;
    /// Return rows left running by a crashed process to pending
    async fn recover_stale(&self) -> AgentResult<usize>;
}

#[derive(Clone)]
pub struct SqliteTaskQueue {
    db_path: PathBuf,
}

fn open(path: &Path) -> AgentResult<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

fn parse_time(raw: &str) -> AgentResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AgentError::Queue(format!("bad timestamp '{}': {}", raw, e)))
}

type RawRow = (String, String, String, String, String, String, i32, Option<String>);

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?,
        row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?,
    ))
}

impl SqliteTaskQueue {
    pub async fn new(db_path: impl AsRef<Path>) -> AgentResult<Self> {
        let path = db_path.as_ref().to_path_buf();
        let path_clone = path.clone();

        task::spawn_blocking(move || -> AgentResult<_> {
            let conn = open(&path_clone)?;

            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS tickets (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,
                    ticket_id TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    status TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    attempts INTEGER DEFAULT 0,
                    last_error TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status);
                CREATE INDEX IF NOT EXISTS idx_tickets_ticket_id ON tickets(ticket_id);
                "#,
            )?;

            Ok(())
        }).await??;

        Ok(Self { db_path: path })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Full row lookup, mostly for inspection and tests
    pub async fn get(&self, id: &str) -> AgentResult<Option<QueuedTicket>> {
        let path = self.db_path.clone();
        let id = id.to_string();

        task::spawn_blocking(move || -> AgentResult<_> {
            let conn = open(&path)?;
            let row = conn.query_row(
                "SELECT id, ticket_id, payload, status, created_at, updated_at, attempts, last_error
                 FROM tickets WHERE id = ?1",
                params![&id],
                read_row,
            ).optional()?;
            row.map(into_queued).transpose()
        }).await?
    }
}

fn into_queued(raw: RawRow) -> AgentResult<QueuedTicket> {
    let (id, ticket_id, payload, status, created_at, updated_at, attempts, last_error) = raw;
    Ok(QueuedTicket {
        id,
        ticket_id,
        payload,
        status: TaskStatus::parse(&status)?,
        created_at: parse_time(&created_at)?,
        updated_at: parse_time(&updated_at)?,
        attempts,
        last_error,
    })
}

#[async_trait]
impl TicketQueue for SqliteTaskQueue {
    async fn enqueue(&self, ticket: &Ticket) -> AgentResult<String> {
        let id = Uuid::new_v4().to_string();
        let payload = serde_json::to_string(ticket)?;
        let ticket_id = ticket.ticket_id.clone();
        let path = self.db_path.clone();

        task::spawn_blocking(move || -> AgentResult<_> {
            let conn = open(&path)?;
            let now = Utc::now().to_rfc3339();

            conn.execute(
                "INSERT INTO tickets (id, ticket_id, payload, status, created_at, updated_at, attempts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
                params![&id, &ticket_id, &payload, TaskStatus::Pending.as_str(), &now, &now],
            )?;
            Ok(id)
        }).await?
    }

    async fn dequeue(&self) -> AgentResult<Option<QueuedTicket>> {
        let path = self.db_path.clone();

        task::spawn_blocking(move || -> AgentResult<_> {
            let mut conn = open(&path)?;
            let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

            let row = tx.query_row(
                "SELECT id, ticket_id, payload, status, created_at, updated_at, attempts, last_error
                 FROM tickets
                 WHERE status = 'pending'
                 ORDER BY seq ASC
                 LIMIT 1",
                [],
                read_row,
            ).optional()?;

            let Some(raw) = row else {
                return Ok(None);
            };

            let now = Utc::now();
            tx.execute(
                "UPDATE tickets SET status = 'running', updated_at = ?1 WHERE id = ?2",
                params![now.to_rfc3339(), &raw.0],
            )?;
            tx.commit()?;

            let mut queued = into_queued(raw)?;
            queued.status = TaskStatus::Running;
            queued.updated_at = now;
            Ok(Some(queued))
        }).await?
    }

    async fn complete(&self, id: &str) -> AgentResult<()> {
        let path = self.db_path.clone();
        let id = id.to_string();

        task::spawn_blocking(move || -> AgentResult<_> {
            let conn = open(&path)?;
            let updated = conn.execute(
                "UPDATE tickets SET status = 'completed', updated_at = ?1 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), &id],
            )?;
            if updated == 0 {
                return Err(AgentError::Queue(format!("no queued ticket with id {}", id)));
            }
            Ok(())
        }).await?
    }

    async fn fail(&self, id: &str, error: &str, should_retry: bool) -> AgentResult<()> {
        let path = self.db_path.clone();
        let id = id.to_string();
        let err_msg = error.to_string();

        task::spawn_blocking(move || -> AgentResult<_> {
            let conn = open(&path)?;
            let new_status = if should_retry { TaskStatus::Pending } else { TaskStatus::Failed };

            let updated = conn.execute(
                "UPDATE tickets SET status = ?1, updated_at = ?2, attempts = attempts + 1, last_error = ?3 WHERE id = ?4",
                params![new_status.as_str(), Utc::now().to_rfc3339(), &err_msg, &id],
            )?;
            if updated == 0 {
                return Err(AgentError::Queue(format!("no queued ticket with id {}", id)));
            }
            Ok(())
        }).await?
    }

    async fn status(&self, id: &str) -> AgentResult<Option<TaskStatus>> {
        let path = self.db_path.clone();
        let id = id.to_string();

        task::spawn_blocking(move || -> AgentResult<_> {
            let conn = open(&path)?;
            let status: Option<String> = conn.query_row(
                "SELECT status FROM tickets WHERE id = ?1",
                params![&id],
                |row| row.get(0),
            ).optional()?;
            status.as_deref().map(TaskStatus::parse).transpose()
        }).await?
    }

    async fn count(&self, status: TaskStatus) -> AgentResult<i64> {
        let path = self.db_path.clone();

        task::spawn_blocking(move || -> AgentResult<_> {
            let conn = open(&path)?;
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM tickets WHERE status = ?1",
                params![status.as_str()],
                |row| row.get(0),
            )?;
            Ok(count)
        }).await?
    }

    async fn find_active(&self, ticket_id: &str) -> AgentResult<Option<String>> {
        let path = self.db_path.clone();
        let ticket_id = ticket_id.to_string();

        task::spawn_blocking(move || -> AgentResult<_> {
            let conn = open(&path)?;
            let id: Option<String> = conn.query_row(
                "SELECT id FROM tickets
                 WHERE ticket_id = ?1 AND status IN ('pending', 'running')
                 ORDER BY seq ASC LIMIT 1",
                params![&ticket_id],
                |row| row.get(0),
            ).optional()?;
            Ok(id)
        }).await?
    }

    async fn recover_stale(&self) -> AgentResult<usize> {
        let path = self.db_path.clone();

        task::spawn_blocking(move || -> AgentResult<_> {
            let conn = open(&path)?;
            let recovered = conn.execute(
                "UPDATE tickets SET status = 'pending', updated_at = ?1 WHERE status = 'running'",
                params![Utc::now().to_rfc3339()],
            )?;
            Ok(recovered)
        }).await?
    }
}
