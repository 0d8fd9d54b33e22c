//! Metrics module for Prometheus-based monitoring.
//!
//! Covers queue depth and consume outcomes, producer retries, delayed
//! promotions, detected trends and upstream fallbacks.
//!
//! # Example
//!
//! ```ignore
//! use trendpulse::metrics::{init_metrics, export_metrics, MetricsCollector};
//!
//! init_metrics().expect("Failed to initialize metrics");
//!
//! let collector = MetricsCollector::new();
//! collector.record_trend("r/tech", 56.0);
//!
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    ACTIVE_WORKERS, ANALYSIS_PASS_DURATION, DELAYED_PROMOTED, MESSAGES_CONSUMED, PUBLISH_RETRIES,
    QUEUE_DEPTH, REGISTRY, TRENDS_DETECTED, TREND_SCORE, UPSTREAM_FALLBACKS,
};
