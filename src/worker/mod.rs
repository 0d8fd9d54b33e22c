//! Workers driving the pipeline queues.
//!
//! - **QueueWorker**: one consume tick per interval against a single queue,
//!   plus a slower health tick that logs queue depth
//! - **WorkerPool**: N workers on the same queue with a shared shutdown signal
//!
//! ```text
//!              ┌──────────────────────┐
//!              │   <queue> (Redis)    │
//!              └──────────┬───────────┘
//!         ┌───────────────┼───────────────┐
//!         ▼               ▼               ▼
//!    ┌─────────┐     ┌─────────┐     ┌─────────┐
//!    │ Worker 1│     │ Worker 2│     │ Worker N│
//!    └─────────┘     └─────────┘     └─────────┘
//! ```

pub mod pool;
pub mod queue_worker;

pub use pool::{PoolError, WorkerPool};
pub use queue_worker::{PoolStats, QueueWorker, WorkerConfig};
