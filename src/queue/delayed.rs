//! Reaper for the delayed sets.
//!
//! `QueueProducer::publish_with_delay` parks messages in `<queue>:delayed`,
//! ordered by due time. The reaper moves due entries to the tail of the live
//! queue; the worker loop runs it before every consume tick.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::message::QueueKind;
use super::store::QueueStore;
use crate::error::QueueError;
use crate::metrics::MetricsCollector;

/// Default number of entries promoted per call.
pub const DEFAULT_PROMOTE_LIMIT: usize = 100;

/// Moves due delayed messages into their live queue.
#[derive(Clone)]
pub struct DelayedReaper {
    store: Arc<dyn QueueStore>,
    limit: usize,
    metrics: MetricsCollector,
}

impl DelayedReaper {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self {
            store,
            limit: DEFAULT_PROMOTE_LIMIT,
            metrics: MetricsCollector::new(),
        }
    }

    /// Sets the maximum number of entries promoted per call.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Promotes every entry of `queue` due at or before `now`, oldest due
    /// first, up to the configured limit. Returns the number promoted.
    pub async fn promote_due(
        &self,
        queue: QueueKind,
        now: DateTime<Utc>,
    ) -> Result<usize, QueueError> {
        let promoted = self
            .store
            .promote_due(
                &queue.delayed_key(),
                queue.as_str(),
                now.timestamp_millis(),
                self.limit,
            )
            .await?;

        if promoted > 0 {
            debug!(queue = %queue, promoted = promoted, "Promoted delayed messages");
            self.metrics.record_promotions(queue.as_str(), promoted);
        }
        Ok(promoted)
    }

    /// Number of entries still waiting in the delayed set of `queue`.
    pub async fn scheduled_len(&self, queue: QueueKind) -> Result<usize, QueueError> {
        self.store.scheduled_len(&queue.delayed_key()).await
    }
}
