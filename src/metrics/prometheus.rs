//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by trendpulse and provides
//! functions for initializing, registering, and exporting metrics.

use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all trendpulse metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Number of messages in a live queue, labeled by queue name.
pub static QUEUE_DEPTH: OnceLock<GaugeVec> = OnceLock::new();

/// Messages taken off a queue, labeled by queue name and outcome.
pub static MESSAGES_CONSUMED: OnceLock<CounterVec> = OnceLock::new();

/// Producer-side store retries, labeled by queue name.
pub static PUBLISH_RETRIES: OnceLock<CounterVec> = OnceLock::new();

/// Delayed messages moved into a live queue, labeled by queue name.
pub static DELAYED_PROMOTED: OnceLock<CounterVec> = OnceLock::new();

/// Trends persisted by analysis passes, labeled by subreddit.
pub static TRENDS_DETECTED: OnceLock<CounterVec> = OnceLock::new();

/// Distribution of trend scores of persisted trends.
pub static TREND_SCORE: OnceLock<Histogram> = OnceLock::new();

/// Fallback values substituted for failed upstream calls, labeled by client.
pub static UPSTREAM_FALLBACKS: OnceLock<CounterVec> = OnceLock::new();

/// Analysis pass duration in seconds, labeled by subreddit.
pub static ANALYSIS_PASS_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Number of running queue workers.
pub static ACTIVE_WORKERS: OnceLock<Gauge> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// This function should be called once at application startup. Calling it
/// again is harmless: the first set of metrics stays in place.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails, typically due to
/// duplicate metric names or invalid metric configurations.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    // Queue metrics
    let queue_depth = GaugeVec::new(
        Opts::new("trendpulse_queue_depth", "Number of messages in a live queue"),
        &["queue_name"],
    )?;

    let messages_consumed = CounterVec::new(
        Opts::new(
            "trendpulse_messages_consumed_total",
            "Messages taken off a queue by outcome",
        ),
        &["queue_name", "outcome"],
    )?;

    let publish_retries = CounterVec::new(
        Opts::new(
            "trendpulse_publish_retries_total",
            "Producer store calls retried after a transient failure",
        ),
        &["queue_name"],
    )?;

    let delayed_promoted = CounterVec::new(
        Opts::new(
            "trendpulse_delayed_promoted_total",
            "Delayed messages moved into a live queue",
        ),
        &["queue_name"],
    )?;

    // Trend metrics
    let trends_detected = CounterVec::new(
        Opts::new("trendpulse_trends_detected_total", "Trends persisted by analysis passes"),
        &["subreddit"],
    )?;

    let trend_score = Histogram::with_opts(
        HistogramOpts::new("trendpulse_trend_score", "Distribution of persisted trend scores")
            .buckets(vec![10.0, 25.0, 50.0, 100.0, 200.0, 500.0, 1000.0, 5000.0]),
    )?;

    let analysis_pass_duration = HistogramVec::new(
        HistogramOpts::new(
            "trendpulse_analysis_pass_duration_seconds",
            "Analysis pass duration in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        &["subreddit"],
    )?;

    // Upstream metrics
    let upstream_fallbacks = CounterVec::new(
        Opts::new(
            "trendpulse_upstream_fallbacks_total",
            "Fallback values substituted for failed upstream calls",
        ),
        &["client"],
    )?;

    // Worker metrics
    let active_workers = Gauge::new("trendpulse_active_workers", "Number of running queue workers")?;

    registry.register(Box::new(queue_depth.clone()))?;
    registry.register(Box::new(messages_consumed.clone()))?;
    registry.register(Box::new(publish_retries.clone()))?;
    registry.register(Box::new(delayed_promoted.clone()))?;
    registry.register(Box::new(trends_detected.clone()))?;
    registry.register(Box::new(trend_score.clone()))?;
    registry.register(Box::new(analysis_pass_duration.clone()))?;
    registry.register(Box::new(upstream_fallbacks.clone()))?;
    registry.register(Box::new(active_workers.clone()))?;

    // If any of these fail, metrics were already initialized
    let _ = REGISTRY.set(registry);
    let _ = QUEUE_DEPTH.set(queue_depth);
    let _ = MESSAGES_CONSUMED.set(messages_consumed);
    let _ = PUBLISH_RETRIES.set(publish_retries);
    let _ = DELAYED_PROMOTED.set(delayed_promoted);
    let _ = TRENDS_DETECTED.set(trends_detected);
    let _ = TREND_SCORE.set(trend_score);
    let _ = ANALYSIS_PASS_DURATION.set(analysis_pass_duration);
    let _ = UPSTREAM_FALLBACKS.set(upstream_fallbacks);
    let _ = ACTIVE_WORKERS.set(active_workers);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// If the registry has not been initialized or encoding fails, the returned
/// text is a single comment line describing the problem.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
