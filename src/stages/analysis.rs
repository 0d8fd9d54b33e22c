//! Handler of `ai:analysis:queue`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use super::records::AiAnalysis;
use super::store::StageStore;
use crate::clients::{AnalysisClient, AnalysisReport, PostSource};
use crate::error::StageError;
use crate::metrics::MetricsCollector;
use crate::queue::{
    AiAnalysisJob, JobPayload, MessageHandler, PostGenerationJob, QueueKind, QueueMessage,
    QueueProducer,
};
use crate::scoring::Post;

/// Posts included in an analysis digest.
const DIGEST_POSTS: usize = 10;

/// Characters of selftext included per post.
const DIGEST_SELFTEXT_CHARS: usize = 200;

/// Builds the text summary of a batch sent to the analysis client.
pub fn posts_digest(posts: &[Post]) -> String {
    let mut digest = String::new();
    for post in posts.iter().take(DIGEST_POSTS) {
        digest.push_str("Title: ");
        digest.push_str(&post.title);
        digest.push('\n');
        if !post.selftext.is_empty() {
            digest.push_str("Content: ");
            digest.extend(post.selftext.chars().take(DIGEST_SELFTEXT_CHARS));
            digest.push('\n');
        }
        digest.push_str(&format!(
            "Score: {}, Comments: {}\n\n",
            post.score, post.num_comments
        ));
    }
    digest
}

/// Analyzes a trend, stores the analysis and queues post generation.
///
/// A failing analysis client is replaced by [`AnalysisReport::fallback`].
/// Failures to load the batch, store the record or publish the next job fail
/// the message so the consumer retries it.
pub struct AnalysisStage {
    source: Arc<dyn PostSource>,
    client: Arc<dyn AnalysisClient>,
    store: Arc<dyn StageStore>,
    producer: Arc<QueueProducer>,
    metrics: MetricsCollector,
}

impl AnalysisStage {
    pub fn new(
        source: Arc<dyn PostSource>,
        client: Arc<dyn AnalysisClient>,
        store: Arc<dyn StageStore>,
        producer: Arc<QueueProducer>,
    ) -> Self {
        Self {
            source,
            client,
            store,
            producer,
            metrics: MetricsCollector::new(),
        }
    }

    /// Runs the stage for one job and returns the stored analysis.
    pub async fn process(&self, job: &AiAnalysisJob) -> Result<AiAnalysis, StageError> {
        self.process_as(Uuid::new_v4(), job).await
    }

    /// Runs the stage, storing the analysis under `analysis_id`.
    ///
    /// Runs with the same id overwrite one record, so a redelivered message
    /// does not add a second analysis for its trend.
    pub async fn process_as(
        &self,
        analysis_id: Uuid,
        job: &AiAnalysisJob,
    ) -> Result<AiAnalysis, StageError> {
        info!(topic = %job.topic, trend_id = %job.trend_id, "Starting AI analysis");

        let posts = self.source.fetch(&job.raw_data_path).await?;
        let digest = posts_digest(&posts);

        let report = match self
            .client
            .analyze(&job.topic, &job.subreddit, &digest)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                warn!(topic = %job.topic, error = %e, "Analysis client failed, using fallback");
                self.metrics.record_fallback("analysis");
                AnalysisReport::fallback()
            }
        };

        let analysis = AiAnalysis {
            id: analysis_id,
            ..AiAnalysis::from_report(job.trend_id, report, self.client.model_name())
        };
        self.store.save_analysis(&analysis).await?;
        info!(topic = %job.topic, analysis_id = %analysis.id, "AI analysis completed");

        let next = PostGenerationJob {
            trend_id: job.trend_id,
            topic: job.topic.clone(),
            subreddit: job.subreddit.clone(),
            analysis_id: analysis.id,
            summary: analysis.summary.clone(),
            key_insights: analysis.key_insights.clone(),
            content_suggestions: analysis.content_suggestions.clone(),
        };
        self.producer
            .publish(QueueKind::PostGeneration, next)
            .await?;

        Ok(analysis)
    }
}

#[async_trait]
impl MessageHandler for AnalysisStage {
    async fn handle(&self, message: &QueueMessage) -> Result<(), StageError> {
        match &message.payload {
            JobPayload::AiAnalysis(job) => self.process_as(message.id, job).await.map(|_| ()),
            other => Err(StageError::UnexpectedPayload {
                handler: "analysis",
                payload: other.kind().to_string(),
            }),
        }
    }
}
