//! Queue producer.
//!
//! Wraps payloads in a `QueueMessage` and appends them to a queue:
//!
//! - `publish`: FIFO append to the tail
//! - `publish_with_priority`: priorities above 5 jump to the head, others go to the tail
//! - `publish_with_delay`: parked in the queue's delayed set until the reaper promotes it
//!
//! Every store call is retried with exponential backoff. A publish that keeps
//! failing is reported to the caller, never dropped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use super::message::{QueueKind, QueueMessage};
use super::payload::JobPayload;
use super::store::QueueStore;
use crate::error::QueueError;
use crate::metrics::MetricsCollector;

/// Retry policy for transient store failures on the producer side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Backoff before the second attempt.
    pub initial_backoff: Duration,
    /// Growth factor applied to the backoff after each failed attempt.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Creates a retry policy.
    pub fn new(max_attempts: u32, initial_backoff: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            multiplier,
        }
    }

    /// Backoff to sleep after the given failed attempt (1-based).
    pub fn backoff_for(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1) as i32;
        self.initial_backoff
            .mul_f64(self.multiplier.max(1.0).powi(exponent))
    }
}

/// Publishes job payloads to the pipeline queues.
pub struct QueueProducer {
    store: Arc<dyn QueueStore>,
    retry: RetryPolicy,
    metrics: MetricsCollector,
}

impl QueueProducer {
    /// Creates a producer with the default retry policy.
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
            metrics: MetricsCollector::new(),
        }
    }

    /// Sets the retry policy for store failures.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Publishes a payload to the tail of `queue`.
    ///
    /// Returns the envelope that was stored.
    pub async fn publish(
        &self,
        queue: QueueKind,
        payload: impl Into<JobPayload>,
    ) -> Result<QueueMessage, QueueError> {
        let message = Self::envelope(queue, payload.into())?;
        let entry = serde_json::to_string(&message)?;

        self.with_retry(queue, || self.store.push_back(queue.as_str(), entry.clone()))
            .await?;

        debug!(queue = %queue, message_id = %message.id, "Published message");
        Ok(message)
    }

    /// Publishes a payload with a priority.
    ///
    /// Priorities above 5 are pushed to the head of the queue, so among
    /// themselves they are dequeued last-in first-out. Everything else is
    /// appended like `publish`.
    pub async fn publish_with_priority(
        &self,
        queue: QueueKind,
        payload: impl Into<JobPayload>,
        priority: i32,
    ) -> Result<QueueMessage, QueueError> {
        let message = Self::envelope(queue, payload.into())?.with_priority(priority);
        let entry = serde_json::to_string(&message)?;

        if message.jumps_queue() {
            self.with_retry(queue, || self.store.push_front(queue.as_str(), entry.clone()))
                .await?;
        } else {
            self.with_retry(queue, || self.store.push_back(queue.as_str(), entry.clone()))
                .await?;
        }

        debug!(
            queue = %queue,
            message_id = %message.id,
            priority = priority,
            "Published priority message"
        );
        Ok(message)
    }

    /// Publishes a payload that becomes visible once `delay` has elapsed.
    ///
    /// The message is parked in the queue's delayed set and appended to the
    /// tail of the live queue by `DelayedReaper::promote_due`.
    pub async fn publish_with_delay(
        &self,
        queue: QueueKind,
        payload: impl Into<JobPayload>,
        delay: Duration,
    ) -> Result<QueueMessage, QueueError> {
        let message = Self::envelope(queue, payload.into())?;
        let entry = serde_json::to_string(&message)?;
        let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        let due_at_ms = Utc::now().timestamp_millis().saturating_add(delay_ms);
        let delayed_key = queue.delayed_key();

        self.with_retry(queue, || {
            self.store.schedule(&delayed_key, entry.clone(), due_at_ms)
        })
        .await?;

        debug!(
            queue = %queue,
            message_id = %message.id,
            delay_ms = delay_ms,
            "Published delayed message"
        );
        Ok(message)
    }

    fn envelope(queue: QueueKind, payload: JobPayload) -> Result<QueueMessage, QueueError> {
        if payload.queue() != queue {
            return Err(QueueError::PayloadMismatch {
                queue: queue.to_string(),
                payload: payload.kind().to_string(),
            });
        }
        Ok(QueueMessage::new(queue.as_str(), payload))
    }

    async fn with_retry<F, Fut>(&self, queue: QueueKind, mut op: F) -> Result<(), QueueError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), QueueError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.retry.max_attempts => {
                    let backoff = self.retry.backoff_for(attempt);
                    warn!(
                        queue = %queue,
                        attempt = attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Publish failed, retrying"
                    );
                    self.metrics.record_publish_retry(queue.as_str());
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(QueueError::PublishExhausted {
                        queue: queue.to_string(),
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::payload::{AiAnalysisJob, PostGenerationJob};
    use crate::queue::store::MemoryQueueStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    /// Store whose pushes fail a fixed number of times before delegating.
    struct FlakyStore {
        inner: MemoryQueueStore,
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    impl FlakyStore {
        fn failing(times: u32) -> Self {
            Self {
                inner: MemoryQueueStore::new(),
                failures_left: AtomicU32::new(times),
                calls: AtomicU32::new(0),
            }
        }

        fn fail(&self) -> Result<(), QueueError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(QueueError::ConnectionFailed("connection reset".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl QueueStore for FlakyStore {
        async fn push_back(&self, key: &str, entry: String) -> Result<(), QueueError> {
            self.fail()?;
            self.inner.push_back(key, entry).await
        }
        async fn push_front(&self, key: &str, entry: String) -> Result<(), QueueError> {
            self.fail()?;
            self.inner.push_front(key, entry).await
        }
        async fn pop_front(&self, key: &str, wait: Duration) -> Result<Option<String>, QueueError> {
            self.inner.pop_front(key, wait).await
        }
        async fn try_pop_front(&self, key: &str) -> Result<Option<String>, QueueError> {
            self.inner.try_pop_front(key).await
        }
        async fn len(&self, key: &str) -> Result<usize, QueueError> {
            self.inner.len(key).await
        }
        async fn peek(&self, key: &str, limit: usize) -> Result<Vec<String>, QueueError> {
            self.inner.peek(key, limit).await
        }
        async fn schedule(&self, key: &str, entry: String, due: i64) -> Result<(), QueueError> {
            self.fail()?;
            self.inner.schedule(key, entry, due).await
        }
        async fn promote_due(
            &self,
            delayed_key: &str,
            target: &str,
            now_ms: i64,
            limit: usize,
        ) -> Result<usize, QueueError> {
            self.inner.promote_due(delayed_key, target, now_ms, limit).await
        }
        async fn scheduled_len(&self, key: &str) -> Result<usize, QueueError> {
            self.inner.scheduled_len(key).await
        }
    }

    fn analysis_job(topic: &str) -> AiAnalysisJob {
        AiAnalysisJob {
            trend_id: Uuid::new_v4(),
            topic: topic.to_string(),
            subreddit: "r/tech".to_string(),
            raw_data_path: "reddit/tech/batch.json".to_string(),
            trend_score: 10.0,
            priority: 2,
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1), 2.0)
    }

    async fn topics_in_order(store: &dyn QueueStore, queue: QueueKind) -> Vec<String> {
        store
            .peek(queue.as_str(), 100)
            .await
            .unwrap()
            .iter()
            .map(|entry| {
                let message: QueueMessage = serde_json::from_str(entry).unwrap();
                message.payload.topic().unwrap().to_string()
            })
            .collect()
    }

    #[test]
    fn test_retry_policy_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff_for(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(4));
    }

    #[test]
    fn test_retry_policy_minimum_one_attempt() {
        let policy = RetryPolicy::new(0, Duration::from_millis(5), 2.0);
        assert_eq!(policy.max_attempts, 1);
    }

    #[tokio::test]
    async fn test_publish_is_fifo() {
        let store = Arc::new(MemoryQueueStore::new());
        let producer = QueueProducer::new(store.clone());

        producer.publish(QueueKind::AiAnalysis, analysis_job("alpha")).await.unwrap();
        producer.publish(QueueKind::AiAnalysis, analysis_job("beta")).await.unwrap();

        assert_eq!(
            topics_in_order(store.as_ref(), QueueKind::AiAnalysis).await,
            vec!["alpha", "beta"]
        );
    }

    #[tokio::test]
    async fn test_high_priority_jumps_ahead_of_normal() {
        let store = Arc::new(MemoryQueueStore::new());
        let producer = QueueProducer::new(store.clone());

        producer.publish(QueueKind::AiAnalysis, analysis_job("waiting")).await.unwrap();
        let message = producer
            .publish_with_priority(QueueKind::AiAnalysis, analysis_job("urgent"), 9)
            .await
            .unwrap();
        producer.publish(QueueKind::AiAnalysis, analysis_job("fresh")).await.unwrap();

        assert_eq!(message.priority, Some(9));
        assert_eq!(
            topics_in_order(store.as_ref(), QueueKind::AiAnalysis).await,
            vec!["urgent", "waiting", "fresh"]
        );
    }

    #[tokio::test]
    async fn test_high_priorities_are_lifo_among_themselves() {
        let store = Arc::new(MemoryQueueStore::new());
        let producer = QueueProducer::new(store.clone());

        producer
            .publish_with_priority(QueueKind::AiAnalysis, analysis_job("first"), 8)
            .await
            .unwrap();
        producer
            .publish_with_priority(QueueKind::AiAnalysis, analysis_job("second"), 10)
            .await
            .unwrap();

        assert_eq!(
            topics_in_order(store.as_ref(), QueueKind::AiAnalysis).await,
            vec!["second", "first"]
        );
    }

    #[tokio::test]
    async fn test_low_priority_goes_to_tail() {
        let store = Arc::new(MemoryQueueStore::new());
        let producer = QueueProducer::new(store.clone());

        producer.publish(QueueKind::AiAnalysis, analysis_job("existing")).await.unwrap();
        producer
            .publish_with_priority(QueueKind::AiAnalysis, analysis_job("low"), 5)
            .await
            .unwrap();

        assert_eq!(
            topics_in_order(store.as_ref(), QueueKind::AiAnalysis).await,
            vec!["existing", "low"]
        );
    }

    #[tokio::test]
    async fn test_payload_mismatch_is_rejected_before_store() {
        let store = Arc::new(FlakyStore::failing(0));
        let producer = QueueProducer::new(store.clone());

        let job = PostGenerationJob {
            trend_id: Uuid::new_v4(),
            topic: "rust".to_string(),
            subreddit: "r/programming".to_string(),
            analysis_id: Uuid::new_v4(),
            summary: String::new(),
            key_insights: String::new(),
            content_suggestions: String::new(),
        };
        let err = producer.publish(QueueKind::AiAnalysis, job).await.unwrap_err();

        assert!(matches!(err, QueueError::PayloadMismatch { .. }));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_publish_retries_transient_failures() {
        let store = Arc::new(FlakyStore::failing(2));
        let producer = QueueProducer::new(store.clone()).with_retry_policy(fast_retry());

        producer.publish(QueueKind::AiAnalysis, analysis_job("retry")).await.unwrap();

        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.len(QueueKind::AiAnalysis.as_str()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_publish_surfaces_exhausted_retries() {
        let store = Arc::new(FlakyStore::failing(10));
        let producer = QueueProducer::new(store.clone()).with_retry_policy(fast_retry());

        let err = producer
            .publish_with_priority(QueueKind::AiAnalysis, analysis_job("lost"), 9)
            .await
            .unwrap_err();

        match err {
            QueueError::PublishExhausted { attempts, last_error, .. } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("connection reset"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.len(QueueKind::AiAnalysis.as_str()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_publish_with_delay_parks_message() {
        let store = Arc::new(MemoryQueueStore::new());
        let producer = QueueProducer::new(store.clone());

        producer
            .publish_with_delay(QueueKind::AiAnalysis, analysis_job("later"), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.len(QueueKind::AiAnalysis.as_str()).await.unwrap(), 0);
        assert_eq!(
            store
                .scheduled_len(&QueueKind::AiAnalysis.delayed_key())
                .await
                .unwrap(),
            1
        );
    }
}
