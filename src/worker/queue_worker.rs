//! Periodic driver bound to one queue.
//!
//! Each consume tick promotes due delayed messages and then consumes at most
//! one message, so throughput is capped at one job per tick per worker.
//! A slower health tick reports queue depth and takes no corrective action.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::QueueError;
use crate::queue::{ConsumeOutcome, DelayedReaper, MessageHandler, QueueConsumer, QueueKind};

/// Cadence of a queue worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Delay between consume ticks.
    pub tick_interval: Duration,
    /// Interval of the queue depth report.
    pub health_interval: Duration,
    /// Bounded wait of the blocking pop.
    pub pop_timeout: Duration,
    /// Timeout for graceful shutdown of a pool.
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(30),
            health_interval: Duration::from_secs(300),
            pop_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(60),
        }
    }
}

impl WorkerConfig {
    /// Sets the consume tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Sets the health report interval.
    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    /// Sets the blocking pop timeout.
    pub fn with_pop_timeout(mut self, timeout: Duration) -> Self {
        self.pop_timeout = timeout;
        self
    }

    /// Sets the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Statistics about consumed messages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolStats {
    /// Total number of workers in the pool.
    pub num_workers: usize,
    /// Number of workers currently inside a consume tick.
    pub active_workers: usize,
    /// Messages whose handler succeeded.
    pub processed: u64,
    /// Messages re-queued after a handler failure.
    pub retried: u64,
    /// Messages moved to the dead letter queue after exhausting retries.
    pub dead_lettered: u64,
    /// Poison messages moved to the dead letter queue without handling.
    pub rejected: u64,
}

impl PoolStats {
    /// Returns the number of messages taken off the queue.
    pub fn total_handled(&self) -> u64 {
        self.processed + self.retried + self.dead_lettered + self.rejected
    }

    /// Returns the share of handled messages that succeeded, as a percentage.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_handled();
        if total == 0 {
            return 0.0;
        }
        (self.processed as f64 / total as f64) * 100.0
    }
}

/// Shared counters behind `PoolStats`.
#[derive(Debug, Default)]
pub(crate) struct SharedPoolStats {
    processed: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    rejected: AtomicU64,
    active_workers: AtomicU64,
}

impl SharedPoolStats {
    pub(crate) fn record(&self, outcome: &ConsumeOutcome) {
        let counter = match outcome {
            ConsumeOutcome::Idle => return,
            ConsumeOutcome::Processed { .. } => &self.processed,
            ConsumeOutcome::Retried { .. } => &self.retried,
            ConsumeOutcome::DeadLettered { .. } => &self.dead_lettered,
            ConsumeOutcome::Rejected => &self.rejected,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_active(&self) {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement_active(&self) {
        self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn to_pool_stats(&self, num_workers: usize) -> PoolStats {
        PoolStats {
            num_workers,
            active_workers: self.active_workers.load(Ordering::SeqCst) as usize,
            processed: self.processed.load(Ordering::SeqCst),
            retried: self.retried.load(Ordering::SeqCst),
            dead_lettered: self.dead_lettered.load(Ordering::SeqCst),
            rejected: self.rejected.load(Ordering::SeqCst),
        }
    }
}

/// A worker that drives one queue.
pub struct QueueWorker {
    id: String,
    queue: QueueKind,
    consumer: QueueConsumer,
    reaper: DelayedReaper,
    handler: Arc<dyn MessageHandler>,
    config: WorkerConfig,
    stats: Arc<SharedPoolStats>,
}

impl QueueWorker {
    /// Creates a worker for `queue`. The consumer's pop timeout is taken
    /// from `config`.
    pub fn new(
        id: impl Into<String>,
        queue: QueueKind,
        consumer: QueueConsumer,
        handler: Arc<dyn MessageHandler>,
        config: WorkerConfig,
    ) -> Self {
        let reaper = DelayedReaper::new(Arc::clone(consumer.store()));
        Self {
            id: id.into(),
            queue,
            consumer: consumer.with_pop_timeout(config.pop_timeout),
            reaper,
            handler,
            config,
            stats: Arc::new(SharedPoolStats::default()),
        }
    }

    pub(crate) fn with_shared_stats(mut self, stats: Arc<SharedPoolStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Returns the worker's ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns statistics of this worker alone, unless it belongs to a pool.
    pub fn stats(&self) -> PoolStats {
        self.stats.to_pool_stats(1)
    }

    /// Runs one tick: promotes due delayed messages, then consumes at most
    /// one message.
    ///
    /// A failing promotion is logged and does not prevent the consume.
    pub async fn consume_once(&self) -> Result<ConsumeOutcome, QueueError> {
        if let Err(e) = self.reaper.promote_due(self.queue, Utc::now()).await {
            warn!(
                worker_id = %self.id,
                queue = %self.queue,
                error = %e,
                "Failed to promote delayed messages"
            );
        }

        self.stats.increment_active();
        let result = self.consumer.consume(self.queue, self.handler.as_ref()).await;
        self.stats.decrement_active();

        let outcome = result?;
        self.stats.record(&outcome);
        Ok(outcome)
    }

    /// Logs the live, delayed and dead letter depth of the queue.
    pub async fn report_health(&self) -> Result<(), QueueError> {
        let depth = self.consumer.queue_depth(self.queue).await?;
        let scheduled = self.consumer.scheduled_depth(self.queue).await?;
        let dead = self.consumer.dead_letter_depth(self.queue).await?;

        info!(
            worker_id = %self.id,
            queue = %self.queue,
            depth = depth,
            scheduled = scheduled,
            dead_letters = dead,
            "Queue health"
        );
        Ok(())
    }

    /// Main worker loop.
    ///
    /// Runs consume and health ticks until a shutdown signal is received.
    /// A tick in progress always finishes before the loop exits.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(worker_id = %self.id, queue = %self.queue, "Worker started");

        let mut consume_tick = tokio::time::interval(self.config.tick_interval);
        consume_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut health_tick = tokio::time::interval(self.config.health_interval);
        health_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    info!(worker_id = %self.id, "Worker received shutdown signal");
                    break;
                }
                _ = consume_tick.tick() => {
                    match self.consume_once().await {
                        Ok(ConsumeOutcome::Idle) => {
                            debug!(worker_id = %self.id, "No messages available");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!(worker_id = %self.id, error = %e, "Consume tick failed");
                        }
                    }
                }
                _ = health_tick.tick() => {
                    if let Err(e) = self.report_health().await {
                        warn!(worker_id = %self.id, error = %e, "Health report failed");
                    }
                }
            }
        }

        info!(worker_id = %self.id, "Worker stopped");
    }
}
