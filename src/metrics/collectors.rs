//! High-level recording interface over the raw Prometheus metrics.
//!
//! Every method is a no-op (apart from a trace event) when `init_metrics()`
//! has not been called, so library code and tests can record freely.

use super::prometheus::{
    ACTIVE_WORKERS, ANALYSIS_PASS_DURATION, DELAYED_PROMOTED, MESSAGES_CONSUMED, PUBLISH_RETRIES,
    QUEUE_DEPTH, TRENDS_DETECTED, TREND_SCORE, UPSTREAM_FALLBACKS,
};

/// Metrics collector for recording trendpulse operational metrics.
///
/// # Example
///
/// ```ignore
/// use trendpulse::metrics::{init_metrics, MetricsCollector};
///
/// init_metrics().expect("Failed to init metrics");
/// let collector = MetricsCollector::new();
///
/// collector.record_consume("ai:analysis:queue", "processed");
/// collector.set_queue_depth("ai:analysis:queue", 12);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    /// Create a new MetricsCollector instance.
    pub fn new() -> Self {
        Self
    }

    /// Record one `consume` call that took a message off a queue.
    ///
    /// `Idle` polls are not counted.
    pub fn record_consume(&self, queue_name: &str, outcome: &str) {
        if outcome == "idle" {
            return;
        }

        if let Some(consumed) = MESSAGES_CONSUMED.get() {
            consumed.with_label_values(&[queue_name, outcome]).inc();
        }

        tracing::trace!(
            queue_name = queue_name,
            outcome = outcome,
            "Recorded consume metric"
        );
    }

    /// Update the depth of a live queue.
    pub fn set_queue_depth(&self, queue_name: &str, depth: usize) {
        if let Some(queue_depth) = QUEUE_DEPTH.get() {
            queue_depth
                .with_label_values(&[queue_name])
                .set(depth as f64);
        }

        tracing::trace!(
            queue_name = queue_name,
            depth = depth,
            "Updated queue depth metric"
        );
    }

    /// Record a producer-side retry after a failed store call.
    pub fn record_publish_retry(&self, queue_name: &str) {
        if let Some(retries) = PUBLISH_RETRIES.get() {
            retries.with_label_values(&[queue_name]).inc();
        }
    }

    /// Record delayed messages promoted into a live queue.
    pub fn record_promotions(&self, queue_name: &str, count: usize) {
        if count == 0 {
            return;
        }

        if let Some(promoted) = DELAYED_PROMOTED.get() {
            promoted
                .with_label_values(&[queue_name])
                .inc_by(count as f64);
        }
    }

    /// Record a persisted trend.
    pub fn record_trend(&self, subreddit: &str, score: f64) {
        if let Some(detected) = TRENDS_DETECTED.get() {
            detected.with_label_values(&[subreddit]).inc();
        }

        if let Some(trend_score) = TREND_SCORE.get() {
            trend_score.observe(score);
        }

        tracing::trace!(subreddit = subreddit, score = score, "Recorded trend metric");
    }

    /// Record the duration of one analysis pass.
    pub fn record_analysis_pass(&self, subreddit: &str, duration_secs: f64) {
        if let Some(duration) = ANALYSIS_PASS_DURATION.get() {
            duration
                .with_label_values(&[subreddit])
                .observe(duration_secs);
        }
    }

    /// Record a fallback value substituted for a failed upstream call.
    ///
    /// `client` is one of `post_source`, `analysis`, `content`, `publish`.
    pub fn record_fallback(&self, client: &str) {
        if let Some(fallbacks) = UPSTREAM_FALLBACKS.get() {
            fallbacks.with_label_values(&[client]).inc();
        }

        tracing::trace!(client = client, "Recorded upstream fallback metric");
    }

    /// Update the count of running workers.
    pub fn update_workers(&self, count: usize) {
        if let Some(active_workers) = ACTIVE_WORKERS.get() {
            active_workers.set(count as f64);
        }

        tracing::trace!(count = count, "Updated active workers metric");
    }
}
