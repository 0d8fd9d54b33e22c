//! Durable job queues connecting the pipeline stages.
//!
//! - **QueueProducer**: publishes typed payloads (FIFO, priority jump, delayed)
//! - **QueueConsumer**: pops one message, runs a handler, retries or dead-letters
//! - **DelayedReaper**: moves due delayed messages into their live queue
//! - **QueueStore**: list + sorted-set backend (Redis, or in-memory for tests)
//!
//! # Architecture
//!
//! ```text
//!      ┌──────────────┐   publish_with_delay   ┌──────────────────┐
//!      │   Producer   │───────────────────────►│ <queue>:delayed  │
//!      └──────┬───────┘                        └────────┬─────────┘
//!             │ publish / publish_with_priority         │ DelayedReaper
//!             ▼                                         ▼
//!      ┌──────────────────────────────────────────────────────────┐
//!      │                    <queue> (Redis list)                  │
//!      └──────┬───────────────────────────────────────────────────┘
//!             │ BLPOP (bounded wait)
//!             ▼
//!      ┌──────────────┐  failure, retry_count < max  ┌───────────┐
//!      │   Consumer   │─────────────────────────────►│ tail push │
//!      └──────┬───────┘                              └───────────┘
//!             │ failure, retries exhausted
//!             ▼
//!      ┌──────────────┐
//!      │ <queue>:dlq  │
//!      └──────────────┘
//! ```
//!
//! # Delivery
//!
//! Delivery is at-most-once while a handler runs: the pop removes the message
//! before the handler starts, and there is no ack step. Ordering within one
//! queue is FIFO for normal messages; priorities above 5 jump to the head and
//! retries re-enter at the tail.

pub mod consumer;
pub mod delayed;
pub mod message;
pub mod payload;
pub mod producer;
pub mod store;

pub use consumer::{ConsumeOutcome, MessageHandler, QueueConsumer};
pub use delayed::DelayedReaper;
pub use message::{QueueKind, QueueMessage, DLQ_SUFFIX, DELAYED_SUFFIX};
pub use payload::{AiAnalysisJob, JobPayload, PostGenerationJob, PostPublishJob};
pub use producer::{QueueProducer, RetryPolicy};
pub use store::{MemoryQueueStore, QueueStore, RedisQueueStore};
