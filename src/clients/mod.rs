//! External collaborators of the pipeline.
//!
//! The core never talks to the network directly. It goes through four
//! narrow traits:
//!
//! - [`PostSource`]: loads a raw post batch by reference
//! - [`AnalysisClient`]: turns a topic and a posts digest into an analysis
//! - [`ContentClient`]: drafts free text containing a `Title:` line
//! - [`PublishClient`]: submits a draft to the platform
//!
//! [`FilePostSource`] and [`LlmAnalysisClient`] are the bundled
//! implementations; tests substitute hand-written mocks.

mod analysis;
mod file_source;
pub mod json;
pub mod llm;

pub use analysis::LlmAnalysisClient;
pub use file_source::FilePostSource;
pub use llm::{
    GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider, Message, Usage,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::scoring::Post;

/// Loads raw post batches.
#[async_trait]
pub trait PostSource: Send + Sync {
    /// Fetches every post stored under `batch_ref`.
    async fn fetch(&self, batch_ref: &str) -> Result<Vec<Post>, ClientError>;
}

/// Structured result of an AI trend analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub summary: String,
    /// One of positive, negative, neutral or mixed.
    pub sentiment: String,
    pub key_insights: String,
    pub content_suggestions: String,
    /// Confidence in `[0.0, 1.0]`; 0.0 marks the fallback record.
    pub confidence_score: f64,
}

impl AnalysisReport {
    /// Fixed low-confidence record used when the analysis client fails.
    pub fn fallback() -> Self {
        Self {
            summary: "AI analysis temporarily unavailable".to_string(),
            sentiment: "neutral".to_string(),
            key_insights: "Manual review recommended".to_string(),
            content_suggestions: "Check trend data manually".to_string(),
            confidence_score: 0.0,
        }
    }
}

/// AI analysis of a trending topic.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    async fn analyze(
        &self,
        topic: &str,
        subreddit: &str,
        posts_digest: &str,
    ) -> Result<AnalysisReport, ClientError>;

    /// Model name recorded alongside the analysis.
    fn model_name(&self) -> &str {
        "unknown"
    }
}

/// AI drafting of post content.
#[async_trait]
pub trait ContentClient: Send + Sync {
    /// Returns free text; the first `Title:` line names the post.
    async fn generate(
        &self,
        topic: &str,
        summary: &str,
        insights: &str,
    ) -> Result<String, ClientError>;
}

/// A draft ready for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    pub subreddit: String,
    pub title: String,
    pub body: String,
    pub credentials_ref: String,
}

/// Answer of the platform to a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    /// The post is live.
    Posted { external_id: String, url: String },
    /// The platform refused the post.
    Rejected { message: String },
}

/// Submission of drafts to the platform.
#[async_trait]
pub trait PublishClient: Send + Sync {
    async fn submit(&self, request: &PublishRequest) -> Result<PublishOutcome, ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_report() {
        let report = AnalysisReport::fallback();
        assert_eq!(report.sentiment, "neutral");
        assert_eq!(report.key_insights, "Manual review recommended");
        assert_eq!(report.confidence_score, 0.0);
    }
}
