//! Job payloads carried by the pipeline queues.
//!
//! Every queue accepts exactly one payload shape. `JobPayload` is the tagged
//! union stored on the wire, and `JobPayload::queue` names the only queue a
//! variant may travel on.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::QueueKind;

/// Request to analyze a freshly detected trend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiAnalysisJob {
    /// Trend record the analysis belongs to.
    pub trend_id: Uuid,
    pub topic: String,
    pub subreddit: String,
    /// Batch reference of the raw posts the trend was detected in.
    pub raw_data_path: String,
    pub trend_score: f64,
    /// Priority bucket the job was published with.
    pub priority: i32,
}

/// Request to draft a post from a completed analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostGenerationJob {
    pub trend_id: Uuid,
    pub topic: String,
    pub subreddit: String,
    pub analysis_id: Uuid,
    pub summary: String,
    pub key_insights: String,
    pub content_suggestions: String,
}

/// Request to submit a generated draft to the platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostPublishJob {
    pub draft_id: Uuid,
    pub subreddit: String,
    pub title: String,
    pub body: String,
    /// Reference to the credentials used for submission; resolved by the publish client.
    pub credentials_ref: String,
}

/// Tagged union of every payload the pipeline queues carry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "job", rename_all = "snake_case")]
pub enum JobPayload {
    AiAnalysis(AiAnalysisJob),
    PostGeneration(PostGenerationJob),
    PostPublish(PostPublishJob),
}

impl JobPayload {
    /// The only queue this payload may be published to.
    pub fn queue(&self) -> QueueKind {
        match self {
            JobPayload::AiAnalysis(_) => QueueKind::AiAnalysis,
            JobPayload::PostGeneration(_) => QueueKind::PostGeneration,
            JobPayload::PostPublish(_) => QueueKind::PostPublish,
        }
    }

    /// Short name of the variant, used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            JobPayload::AiAnalysis(_) => "ai_analysis",
            JobPayload::PostGeneration(_) => "post_generation",
            JobPayload::PostPublish(_) => "post_publish",
        }
    }

    /// Topic the job concerns, when it has one.
    pub fn topic(&self) -> Option<&str> {
        match self {
            JobPayload::AiAnalysis(job) => Some(&job.topic),
            JobPayload::PostGeneration(job) => Some(&job.topic),
            JobPayload::PostPublish(_) => None,
        }
    }
}

impl From<AiAnalysisJob> for JobPayload {
    fn from(job: AiAnalysisJob) -> Self {
        JobPayload::AiAnalysis(job)
    }
}

impl From<PostGenerationJob> for JobPayload {
    fn from(job: PostGenerationJob) -> Self {
        JobPayload::PostGeneration(job)
    }
}

impl From<PostPublishJob> for JobPayload {
    fn from(job: PostPublishJob) -> Self {
        JobPayload::PostPublish(job)
    }
}
