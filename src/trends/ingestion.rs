//! Ingestion log: one record per fetch of raw posts from a subreddit.
//!
//! Lifecycle is `pending | running -> completed | failed`; both outcomes are
//! terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::StoreError;

/// Status of an ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl IngestionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, IngestionStatus::Completed | IngestionStatus::Failed)
    }
}

impl fmt::Display for IngestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IngestionStatus::Pending => "pending",
            IngestionStatus::Running => "running",
            IngestionStatus::Completed => "completed",
            IngestionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Record of one raw-post fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestionLog {
    pub id: Uuid,
    /// Platform the posts came from.
    pub source: String,
    pub subreddit: String,
    pub posts_fetched: u32,
    /// Batch reference of the stored posts, set on completion.
    pub storage_path: Option<String>,
    pub status: IngestionStatus,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl IngestionLog {
    /// Creates a pending ingestion for `subreddit`.
    pub fn new(subreddit: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: "reddit".to_string(),
            subreddit: subreddit.into(),
            posts_fetched: 0,
            storage_path: None,
            status: IngestionStatus::Pending,
            error_message: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Overrides the start time.
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    /// Moves a pending ingestion to running.
    pub fn start(&mut self) -> Result<(), StoreError> {
        if self.status != IngestionStatus::Pending {
            return Err(self.invalid(IngestionStatus::Running));
        }
        self.status = IngestionStatus::Running;
        Ok(())
    }

    /// Marks the ingestion completed with the stored batch reference.
    pub fn mark_completed(
        &mut self,
        posts_fetched: u32,
        storage_path: impl Into<String>,
    ) -> Result<(), StoreError> {
        if self.status.is_terminal() {
            return Err(self.invalid(IngestionStatus::Completed));
        }
        self.posts_fetched = posts_fetched;
        self.storage_path = Some(storage_path.into());
        self.status = IngestionStatus::Completed;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Marks the ingestion failed.
    pub fn mark_failed(&mut self, error_message: impl Into<String>) -> Result<(), StoreError> {
        if self.status.is_terminal() {
            return Err(self.invalid(IngestionStatus::Failed));
        }
        self.status = IngestionStatus::Failed;
        self.error_message = Some(error_message.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    fn invalid(&self, to: IngestionStatus) -> StoreError {
        StoreError::InvalidTransition {
            record: "ingestion_log",
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut log = IngestionLog::new("r/tech");
        assert_eq!(log.status, IngestionStatus::Pending);

        log.start().unwrap();
        log.mark_completed(25, "reddit/tech/batch.json").unwrap();

        assert_eq!(log.status, IngestionStatus::Completed);
        assert_eq!(log.posts_fetched, 25);
        assert_eq!(log.storage_path.as_deref(), Some("reddit/tech/batch.json"));
        assert!(log.completed_at.is_some());
    }

    #[test]
    fn test_pending_can_complete_directly() {
        let mut log = IngestionLog::new("r/tech");
        log.mark_completed(3, "batch.json").unwrap();
        assert_eq!(log.status, IngestionStatus::Completed);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut log = IngestionLog::new("r/tech");
        log.mark_failed("rate limited").unwrap();

        assert!(log.mark_completed(1, "batch.json").is_err());
        assert!(log.mark_failed("again").is_err());
        assert!(log.start().is_err());
        assert_eq!(log.error_message.as_deref(), Some("rate limited"));
    }

    #[test]
    fn test_start_twice_rejected() {
        let mut log = IngestionLog::new("r/tech");
        log.start().unwrap();

        let err = log.start().unwrap_err();
        assert!(err.to_string().contains("running"));
    }
}
