//! trendpulse: trend detection and job queues for a social-media content pipeline.
//!
//! Raw post batches are scored for trending topics, stored, and handed through
//! Redis-backed queues to AI analysis, content generation and publication.

// Core modules
pub mod cli;
pub mod clients;
pub mod config;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod scoring;
pub mod stages;
pub mod trends;
pub mod worker;

// Re-export commonly used error types
pub use config::{ConfigError, PipelineConfig};
pub use error::{ClientError, PipelineError, QueueError, StageError, StoreError};
