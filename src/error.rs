//! Error types for trendpulse operations.
//!
//! Defines the error taxonomy shared by the queue substrate and the pipeline
//! stages built on top of it:
//! - Queue store and producer failures (transient, retried with backoff)
//! - Record persistence failures
//! - Upstream service failures (AI and publish clients)
//! - Handler failures (retried by the consumer, then dead-lettered)
//! - Analysis pass failures

use thiserror::Error;

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Failed to connect to the queue store.
    #[error("Queue store connection failed: {0}")]
    ConnectionFailed(String),

    /// Redis operation failed.
    #[error("Redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),

    /// Failed to serialize or deserialize a message envelope.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The payload variant does not belong to the target queue.
    #[error("Payload '{payload}' cannot be published to queue '{queue}'")]
    PayloadMismatch { queue: String, payload: String },

    /// The queue name is not registered.
    #[error("Unknown queue '{0}'")]
    UnknownQueue(String),

    /// A store call kept failing after every publish attempt.
    #[error("Publish to '{queue}' failed after {attempts} attempts: {last_error}")]
    PublishExhausted {
        queue: String,
        attempts: u32,
        last_error: String,
    },

    /// The in-memory store was poisoned by a panicking writer.
    #[error("Queue store unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur while persisting pipeline records.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record not found.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A status change that the record's lifecycle does not allow.
    #[error("Invalid status transition for {record} from '{from}' to '{to}'")]
    InvalidTransition {
        record: &'static str,
        from: String,
        to: String,
    },

    /// Redis operation failed.
    #[error("Redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored record is missing a field or holds an unparseable value.
    #[error("Corrupt record '{key}': {message}")]
    CorruptRecord { key: String, message: String },

    /// The backing store is unavailable.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned by external collaborators (post source, AI, publish).
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// The upstream throttled the request.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The upstream answered with a non-success status.
    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    /// The upstream response could not be interpreted.
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// A required setting is missing.
    #[error("Missing configuration: {0}")]
    MissingConfig(String),

    /// The requested batch does not exist.
    #[error("Batch '{0}' not found")]
    BatchNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by queue handlers. Any of these makes the consumer retry the
/// message or dead-letter it once retries are exhausted.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// The message reached a handler bound to a different queue.
    #[error("Unexpected payload '{payload}' for handler '{handler}'")]
    UnexpectedPayload {
        handler: &'static str,
        payload: String,
    },
}

/// Errors that abort an analysis pass. The pass itself never propagates them:
/// they are logged and the pass returns an empty result.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to fetch batch: {0}")]
    Fetch(#[from] ClientError),

    #[error("Failed to persist trend: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to enqueue analysis job: {0}")]
    Queue(#[from] QueueError),
}
