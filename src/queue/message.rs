//! Queue envelope and queue registry.
//!
//! - `QueueMessage`: the wire envelope carried by every queue
//! - `QueueKind`: the registered queues and their derived key names

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::payload::JobPayload;
use crate::error::QueueError;

/// Suffix of the per-queue dead letter list.
pub const DLQ_SUFFIX: &str = ":dlq";

/// Suffix of the per-queue delayed set.
pub const DELAYED_SUFFIX: &str = ":delayed";

/// Priorities above this value are pushed to the head of the queue.
pub const PRIORITY_JUMP_THRESHOLD: i32 = 5;

/// The queues known to the pipeline. Each queue carries exactly one payload type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    /// Trends waiting for AI analysis.
    AiAnalysis,
    /// Analyses waiting for post generation.
    PostGeneration,
    /// Drafts waiting for publication.
    PostPublish,
}

impl QueueKind {
    /// All registered queues.
    pub const ALL: [QueueKind; 3] = [
        QueueKind::AiAnalysis,
        QueueKind::PostGeneration,
        QueueKind::PostPublish,
    ];

    /// Name of the live list.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueKind::AiAnalysis => "ai:analysis:queue",
            QueueKind::PostGeneration => "post:generate:queue",
            QueueKind::PostPublish => "post:publish:queue",
        }
    }

    /// Name of the dead letter list.
    pub fn dead_letter_key(&self) -> String {
        format!("{}{}", self.as_str(), DLQ_SUFFIX)
    }

    /// Name of the delayed set.
    pub fn delayed_key(&self) -> String {
        format!("{}{}", self.as_str(), DELAYED_SUFFIX)
    }
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueKind {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QueueKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| QueueError::UnknownQueue(s.to_string()))
    }
}

/// Envelope wrapping a job payload on its way through a queue.
///
/// The `id` is assigned once and survives retries; only the consumer touches
/// `retry_count`, and only to increment it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueMessage<T = JobPayload> {
    /// Unique identifier, stable across retries.
    pub id: Uuid,
    /// Logical channel the message was published to.
    pub queue_name: String,
    /// The job payload, opaque to the queue layer.
    pub payload: T,
    /// When the message was created.
    pub created_at: DateTime<Utc>,
    /// Number of failed handler attempts so far.
    #[serde(default)]
    pub retry_count: u32,
    /// Optional priority; absent means normal.
    #[serde(default)]
    pub priority: Option<i32>,
}

impl<T> QueueMessage<T> {
    /// Creates a new envelope with normal priority.
    pub fn new(queue_name: impl Into<String>, payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            queue_name: queue_name.into(),
            payload,
            created_at: Utc::now(),
            retry_count: 0,
            priority: None,
        }
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Whether this message jumps to the head of its queue.
    pub fn jumps_queue(&self) -> bool {
        self.priority
            .is_some_and(|priority| priority > PRIORITY_JUMP_THRESHOLD)
    }

    /// Records one more failed attempt.
    pub fn increment_retry(&mut self) {
        self.retry_count = self.retry_count.saturating_add(1);
    }

    /// Whether another attempt is allowed under `max_retries`.
    pub fn should_retry(&self, max_retries: u32) -> bool {
        self.retry_count < max_retries
    }

    /// Returns how long ago the message was created.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_names() {
        assert_eq!(QueueKind::AiAnalysis.as_str(), "ai:analysis:queue");
        assert_eq!(QueueKind::PostGeneration.as_str(), "post:generate:queue");
        assert_eq!(QueueKind::PostPublish.as_str(), "post:publish:queue");
        assert_eq!(
            QueueKind::AiAnalysis.dead_letter_key(),
            "ai:analysis:queue:dlq"
        );
        assert_eq!(
            QueueKind::PostGeneration.delayed_key(),
            "post:generate:queue:delayed"
        );
    }

    #[test]
    fn test_queue_kind_from_str() {
        for kind in QueueKind::ALL {
            assert_eq!(kind.as_str().parse::<QueueKind>().unwrap(), kind);
        }
        let err = "jobs".parse::<QueueKind>().unwrap_err();
        assert!(matches!(err, QueueError::UnknownQueue(name) if name == "jobs"));
    }

    #[test]
    fn test_message_new() {
        let message = QueueMessage::new("ai:analysis:queue", "payload".to_string());

        assert!(!message.id.is_nil());
        assert_eq!(message.queue_name, "ai:analysis:queue");
        assert_eq!(message.retry_count, 0);
        assert!(message.priority.is_none());
        assert!(!message.jumps_queue());
    }

    #[test]
    fn test_priority_jump_threshold() {
        let normal = QueueMessage::new("q", ()).with_priority(5);
        let high = QueueMessage::new("q", ()).with_priority(6);

        assert!(!normal.jumps_queue());
        assert!(high.jumps_queue());
    }

    #[test]
    fn test_retry_counting() {
        let mut message = QueueMessage::new("q", ());
        let id = message.id;

        for expected in 1..=3 {
            assert!(message.should_retry(3));
            message.increment_retry();
            assert_eq!(message.retry_count, expected);
        }

        assert!(!message.should_retry(3));
        assert_eq!(message.id, id);
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let json = format!(
            r#"{{"id":"{}","queue_name":"q","payload":1,"created_at":"2024-05-01T10:00:00Z"}}"#,
            Uuid::new_v4()
        );
        let message: QueueMessage<u32> = serde_json::from_str(&json).unwrap();

        assert_eq!(message.retry_count, 0);
        assert!(message.priority.is_none());
        assert_eq!(message.payload, 1);
    }
}
