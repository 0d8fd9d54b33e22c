//! Runtime configuration for the trend pipeline and its workers.
//!
//! Every setting has a default and can be overridden through a `TRENDPULSE_*`
//! environment variable. Scoring weights are carried as a plain value so that
//! several pipelines with different policies can live in one process.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::queue::RetryPolicy;
use crate::scoring::ScoringWeights;
use crate::worker::WorkerConfig;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for the trend pipeline, queue substrate and workers.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // Queue store
    /// Redis connection URL.
    pub redis_url: String,

    // Scoring
    /// Weights applied to velocity and engagement rate.
    pub weights: ScoringWeights,
    /// Minimum trend score for a topic to be persisted and enqueued.
    pub min_trend_score: f64,
    /// Minimum number of posts sharing a keyword to form a topic.
    pub min_topic_posts: usize,

    // Worker cadence
    /// Delay between consume ticks of one worker.
    pub worker_tick: Duration,
    /// Interval of the queue depth health report.
    pub health_tick: Duration,
    /// Bounded wait of the blocking pop.
    pub pop_timeout: Duration,
    /// Handler failures tolerated before a message is dead-lettered.
    pub max_retries: u32,

    // Producer retry
    /// Total store attempts per publish call.
    pub publish_attempts: u32,
    /// Backoff before the second attempt.
    pub publish_backoff: Duration,
    /// Backoff growth factor between attempts.
    pub publish_backoff_multiplier: f64,

    // Stages
    /// Root directory that raw batch references are resolved against.
    pub raw_data_dir: PathBuf,
    /// Whether generated drafts are queued for publication automatically.
    pub auto_publish: bool,
    /// Credentials reference attached to automatically queued publish jobs.
    pub publish_credentials_ref: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),

            weights: ScoringWeights::default(),
            min_trend_score: 50.0,
            min_topic_posts: 3,

            worker_tick: Duration::from_secs(30),
            health_tick: Duration::from_secs(300),
            pop_timeout: Duration::from_secs(5),
            max_retries: 3,

            publish_attempts: 3,
            publish_backoff: Duration::from_millis(1000),
            publish_backoff_multiplier: 2.0,

            raw_data_dir: PathBuf::from("./raw-data"),
            auto_publish: false,
            publish_credentials_ref: "default".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TRENDPULSE_REDIS_URL`: Redis URL (default: redis://localhost:6379)
    /// - `TRENDPULSE_VELOCITY_WEIGHT`: Velocity weight (default: 1.0)
    /// - `TRENDPULSE_ENGAGEMENT_WEIGHT`: Engagement weight (default: 1.0)
    /// - `TRENDPULSE_MIN_TREND_SCORE`: Trend threshold (default: 50.0)
    /// - `TRENDPULSE_MIN_TOPIC_POSTS`: Posts per topic (default: 3)
    /// - `TRENDPULSE_WORKER_TICK_SECS`: Consume tick (default: 30)
    /// - `TRENDPULSE_HEALTH_TICK_SECS`: Health tick (default: 300)
    /// - `TRENDPULSE_POP_TIMEOUT_SECS`: Blocking pop wait (default: 5)
    /// - `TRENDPULSE_MAX_RETRIES`: Handler retries before DLQ (default: 3)
    /// - `TRENDPULSE_PUBLISH_ATTEMPTS`: Store attempts per publish (default: 3)
    /// - `TRENDPULSE_PUBLISH_BACKOFF_MS`: Initial publish backoff (default: 1000)
    /// - `TRENDPULSE_PUBLISH_BACKOFF_MULTIPLIER`: Backoff factor (default: 2.0)
    /// - `TRENDPULSE_RAW_DATA_DIR`: Raw batch root (default: ./raw-data)
    /// - `TRENDPULSE_AUTO_PUBLISH`: Queue drafts for publication (default: false)
    /// - `TRENDPULSE_PUBLISH_CREDENTIALS`: Credentials reference for queued drafts (default: default)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("TRENDPULSE_REDIS_URL") {
            config.redis_url = val;
        }

        if let Ok(val) = std::env::var("TRENDPULSE_VELOCITY_WEIGHT") {
            config.weights.velocity = parse_env_value(&val, "TRENDPULSE_VELOCITY_WEIGHT")?;
        }

        if let Ok(val) = std::env::var("TRENDPULSE_ENGAGEMENT_WEIGHT") {
            config.weights.engagement = parse_env_value(&val, "TRENDPULSE_ENGAGEMENT_WEIGHT")?;
        }

        if let Ok(val) = std::env::var("TRENDPULSE_MIN_TREND_SCORE") {
            config.min_trend_score = parse_env_value(&val, "TRENDPULSE_MIN_TREND_SCORE")?;
        }

        if let Ok(val) = std::env::var("TRENDPULSE_MIN_TOPIC_POSTS") {
            config.min_topic_posts = parse_env_value(&val, "TRENDPULSE_MIN_TOPIC_POSTS")?;
        }

        if let Ok(val) = std::env::var("TRENDPULSE_WORKER_TICK_SECS") {
            let secs: u64 = parse_env_value(&val, "TRENDPULSE_WORKER_TICK_SECS")?;
            config.worker_tick = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("TRENDPULSE_HEALTH_TICK_SECS") {
            let secs: u64 = parse_env_value(&val, "TRENDPULSE_HEALTH_TICK_SECS")?;
            config.health_tick = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("TRENDPULSE_POP_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "TRENDPULSE_POP_TIMEOUT_SECS")?;
            config.pop_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("TRENDPULSE_MAX_RETRIES") {
            config.max_retries = parse_env_value(&val, "TRENDPULSE_MAX_RETRIES")?;
        }

        if let Ok(val) = std::env::var("TRENDPULSE_PUBLISH_ATTEMPTS") {
            config.publish_attempts = parse_env_value(&val, "TRENDPULSE_PUBLISH_ATTEMPTS")?;
        }

        if let Ok(val) = std::env::var("TRENDPULSE_PUBLISH_BACKOFF_MS") {
            let ms: u64 = parse_env_value(&val, "TRENDPULSE_PUBLISH_BACKOFF_MS")?;
            config.publish_backoff = Duration::from_millis(ms);
        }

        if let Ok(val) = std::env::var("TRENDPULSE_PUBLISH_BACKOFF_MULTIPLIER") {
            config.publish_backoff_multiplier =
                parse_env_value(&val, "TRENDPULSE_PUBLISH_BACKOFF_MULTIPLIER")?;
        }

        if let Ok(val) = std::env::var("TRENDPULSE_RAW_DATA_DIR") {
            config.raw_data_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("TRENDPULSE_AUTO_PUBLISH") {
            config.auto_publish = parse_env_bool(&val, "TRENDPULSE_AUTO_PUBLISH")?;
        }

        if let Ok(val) = std::env::var("TRENDPULSE_PUBLISH_CREDENTIALS") {
            config.publish_credentials_ref = val;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.redis_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "redis_url cannot be empty".to_string(),
            ));
        }

        if !self.weights.velocity.is_finite() || !self.weights.engagement.is_finite() {
            return Err(ConfigError::ValidationFailed(
                "scoring weights must be finite numbers".to_string(),
            ));
        }

        if !self.min_trend_score.is_finite() {
            return Err(ConfigError::ValidationFailed(
                "min_trend_score must be a finite number".to_string(),
            ));
        }

        if self.min_topic_posts == 0 {
            return Err(ConfigError::ValidationFailed(
                "min_topic_posts must be greater than 0".to_string(),
            ));
        }

        if self.worker_tick.is_zero() || self.health_tick.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "worker_tick and health_tick must be greater than 0".to_string(),
            ));
        }

        if self.pop_timeout.as_secs() == 0 {
            return Err(ConfigError::ValidationFailed(
                "pop_timeout must be at least one second".to_string(),
            ));
        }

        if self.publish_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "publish_attempts must be greater than 0".to_string(),
            ));
        }

        if self.publish_backoff_multiplier < 1.0 {
            return Err(ConfigError::ValidationFailed(
                "publish_backoff_multiplier must be at least 1.0".to_string(),
            ));
        }

        Ok(())
    }

    /// Producer retry policy derived from the publish settings.
    pub fn publish_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.publish_attempts,
            self.publish_backoff,
            self.publish_backoff_multiplier,
        )
    }

    /// Worker cadence derived from the tick settings.
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig::default()
            .with_tick_interval(self.worker_tick)
            .with_health_interval(self.health_tick)
            .with_pop_timeout(self.pop_timeout)
    }

    /// Builder method to set the Redis URL.
    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = url.into();
        self
    }

    /// Builder method to set the scoring weights.
    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Builder method to set the trend threshold.
    pub fn with_min_trend_score(mut self, score: f64) -> Self {
        self.min_trend_score = score;
        self
    }

    /// Builder method to set the minimum posts per topic.
    pub fn with_min_topic_posts(mut self, posts: usize) -> Self {
        self.min_topic_posts = posts;
        self
    }

    /// Builder method to set the handler retry limit.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Builder method to set the raw batch root.
    pub fn with_raw_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.raw_data_dir = dir.into();
        self
    }

    /// Builder method to enable automatic publication of drafts.
    pub fn with_auto_publish(mut self, enabled: bool) -> Self {
        self.auto_publish = enabled;
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}
