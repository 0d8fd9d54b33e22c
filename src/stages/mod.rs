//! Downstream pipeline stages.
//!
//! Each stage is a [`MessageHandler`](crate::queue::MessageHandler) bound to
//! one queue:
//!
//! | Queue                 | Stage             | Writes           | Publishes to          |
//! |-----------------------|-------------------|------------------|-----------------------|
//! | `ai:analysis:queue`   | [`AnalysisStage`] | `AiAnalysis`     | `post:generate:queue` |
//! | `post:generate:queue` | [`GenerationStage`] | `GeneratedPost` | `post:publish:queue` (auto-publish only) |
//! | `post:publish:queue`  | [`PublishStage`]  | `PostSubmission` | -                     |
//!
//! Upstream client failures are replaced by fixed fallback values so the
//! pipeline keeps moving. Storage and queue failures fail the message and go
//! through the consumer's retry and dead-letter policy.

mod analysis;
mod generation;
mod publish;
mod records;
mod store;

pub use analysis::{posts_digest, AnalysisStage};
pub use generation::{extract_title, GenerationStage, GENERATION_FALLBACK, MAX_BODY_CHARS};
pub use publish::PublishStage;
pub use records::{AiAnalysis, DraftStatus, GeneratedPost, PostSubmission, SubmissionStatus};
pub use store::{MemoryStageStore, RedisStageStore, StageStore};
