//! Trend detection.
//!
//! - [`model`]: the `Trend` record keyed by `(topic, subreddit)`
//! - [`store`]: `TrendStore` with in-memory and Redis backends
//! - [`ingestion`]: ingestion log lifecycle
//! - [`pipeline`]: the orchestrator that turns post batches into trends and
//!   analysis jobs

pub mod ingestion;
pub mod model;
pub mod pipeline;
pub mod store;

pub use ingestion::{IngestionLog, IngestionStatus};
pub use model::{Trend, TrendStatus, TrendUpdate};
pub use pipeline::{TrendPipeline, DEFAULT_MIN_TOPIC_POSTS, DEFAULT_MIN_TREND_SCORE};
pub use store::{MemoryTrendStore, RedisTrendStore, TrendStore};
