//! Queue consumer: pops one message, runs a handler and applies the
//! retry / dead-letter policy on failure.
//!
//! The pop removes the message before the handler runs. A crash while the
//! handler is running loses the message; there is no lease or ack step.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::message::{QueueKind, QueueMessage};
use super::store::QueueStore;
use crate::error::{QueueError, StageError};
use crate::metrics::MetricsCollector;

/// Default number of handler failures tolerated before dead-lettering.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default bounded wait of the blocking pop.
pub const DEFAULT_POP_TIMEOUT: Duration = Duration::from_secs(5);

/// Handler invoked for every message popped from a queue.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Processes one message. An error makes the consumer retry or
    /// dead-letter the message.
    async fn handle(&self, message: &QueueMessage) -> Result<(), StageError>;
}

/// What a single `consume` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// No message arrived within the pop timeout.
    Idle,
    /// The handler succeeded; the message is gone.
    Processed { id: Uuid },
    /// The handler failed and the message went back to the tail.
    Retried { id: Uuid, retry_count: u32 },
    /// The handler failed with retries exhausted; the message is in the DLQ.
    DeadLettered { id: Uuid },
    /// The entry could not be decoded or does not belong to this queue.
    /// It was moved to the DLQ without running the handler.
    Rejected,
}

impl ConsumeOutcome {
    /// Label used for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            ConsumeOutcome::Idle => "idle",
            ConsumeOutcome::Processed { .. } => "processed",
            ConsumeOutcome::Retried { .. } => "retried",
            ConsumeOutcome::DeadLettered { .. } => "dead_lettered",
            ConsumeOutcome::Rejected => "rejected",
        }
    }
}

/// Consumes messages from the pipeline queues.
#[derive(Clone)]
pub struct QueueConsumer {
    store: Arc<dyn QueueStore>,
    max_retries: u32,
    pop_timeout: Duration,
    metrics: MetricsCollector,
}

impl QueueConsumer {
    /// Creates a consumer with the default retry limit and pop timeout.
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self {
            store,
            max_retries: DEFAULT_MAX_RETRIES,
            pop_timeout: DEFAULT_POP_TIMEOUT,
            metrics: MetricsCollector::new(),
        }
    }

    /// Sets the number of handler failures tolerated before dead-lettering.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the bounded wait of the blocking pop.
    pub fn with_pop_timeout(mut self, timeout: Duration) -> Self {
        self.pop_timeout = timeout;
        self
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    /// Pops at most one message from `queue` and runs `handler` on it.
    ///
    /// An empty queue is not an error: the call waits up to the pop timeout
    /// and reports `ConsumeOutcome::Idle`.
    pub async fn consume(
        &self,
        queue: QueueKind,
        handler: &dyn MessageHandler,
    ) -> Result<ConsumeOutcome, QueueError> {
        let Some(entry) = self.store.pop_front(queue.as_str(), self.pop_timeout).await? else {
            return Ok(ConsumeOutcome::Idle);
        };

        let outcome = match decode_for(queue, &entry) {
            Ok(message) => self.dispatch(queue, message, handler).await?,
            Err(reason) => {
                error!(queue = %queue, reason = %reason, "Rejecting poison message");
                self.store
                    .push_back(&queue.dead_letter_key(), entry)
                    .await?;
                ConsumeOutcome::Rejected
            }
        };

        self.metrics.record_consume(queue.as_str(), outcome.label());
        Ok(outcome)
    }

    async fn dispatch(
        &self,
        queue: QueueKind,
        mut message: QueueMessage,
        handler: &dyn MessageHandler,
    ) -> Result<ConsumeOutcome, QueueError> {
        let id = message.id;

        let err = match handler.handle(&message).await {
            Ok(()) => {
                debug!(queue = %queue, message_id = %id, "Processed message");
                return Ok(ConsumeOutcome::Processed { id });
            }
            Err(e) => e,
        };

        if message.should_retry(self.max_retries) {
            message.increment_retry();
            let retry_count = message.retry_count;
            warn!(
                queue = %queue,
                message_id = %id,
                retry_count = retry_count,
                error = %err,
                "Handler failed, re-queueing message"
            );
            self.store
                .push_back(queue.as_str(), serde_json::to_string(&message)?)
                .await?;
            Ok(ConsumeOutcome::Retried { id, retry_count })
        } else {
            error!(
                queue = %queue,
                message_id = %id,
                retry_count = message.retry_count,
                error = %err,
                "Handler failed permanently, moving message to dead letter queue"
            );
            self.store
                .push_back(&queue.dead_letter_key(), serde_json::to_string(&message)?)
                .await?;
            Ok(ConsumeOutcome::DeadLettered { id })
        }
    }

    /// Current length of the live queue.
    pub async fn queue_depth(&self, queue: QueueKind) -> Result<usize, QueueError> {
        let depth = self.store.len(queue.as_str()).await?;
        self.metrics.set_queue_depth(queue.as_str(), depth);
        Ok(depth)
    }

    /// Current length of the queue's dead letter list.
    pub async fn dead_letter_depth(&self, queue: QueueKind) -> Result<usize, QueueError> {
        self.store.len(&queue.dead_letter_key()).await
    }

    /// Number of messages waiting in the queue's delayed set.
    pub async fn scheduled_depth(&self, queue: QueueKind) -> Result<usize, QueueError> {
        self.store.scheduled_len(&queue.delayed_key()).await
    }

    /// Returns up to `limit` dead letters, oldest first, without removing them.
    ///
    /// Entries that no longer decode are skipped.
    pub async fn peek_dead_letters(
        &self,
        queue: QueueKind,
        limit: usize,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let entries = self.store.peek(&queue.dead_letter_key(), limit).await?;
        Ok(entries
            .iter()
            .filter_map(|entry| serde_json::from_str(entry).ok())
            .collect())
    }

    /// Moves up to `limit` dead letters back to the tail of the live queue,
    /// resetting their retry count. Message ids are preserved.
    ///
    /// Entries that do not decode as messages of this queue are put back at
    /// the tail of the dead letter list and not counted.
    pub async fn redrive_dead_letters(
        &self,
        queue: QueueKind,
        limit: usize,
    ) -> Result<usize, QueueError> {
        let dlq = queue.dead_letter_key();
        let pending = self.store.len(&dlq).await?.min(limit);
        let mut redriven = 0;

        for _ in 0..pending {
            let Some(entry) = self.store.try_pop_front(&dlq).await? else {
                break;
            };

            match decode_for(queue, &entry) {
                Ok(mut message) => {
                    message.retry_count = 0;
                    self.store
                        .push_back(queue.as_str(), serde_json::to_string(&message)?)
                        .await?;
                    redriven += 1;
                }
                Err(reason) => {
                    warn!(queue = %queue, reason = %reason, "Skipping undecodable dead letter");
                    self.store.push_back(&dlq, entry).await?;
                }
            }
        }

        if redriven > 0 {
            info!(queue = %queue, count = redriven, "Redrove dead letters");
        }
        Ok(redriven)
    }
}

/// Decodes an entry and checks that its payload belongs to `queue`.
fn decode_for(queue: QueueKind, entry: &str) -> Result<QueueMessage, String> {
    let message: QueueMessage = serde_json::from_str(entry).map_err(|e| e.to_string())?;
    if message.payload.queue() != queue {
        return Err(format!(
            "payload '{}' does not belong to this queue",
            message.payload.kind()
        ));
    }
    Ok(message)
}
