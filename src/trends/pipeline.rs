//! Trend pipeline orchestrator.
//!
//! One analysis pass reduces a raw post batch to scored trends:
//!
//! ```text
//! fetch(batch) -> extract_topics -> compute_metrics -> score >= min?
//!                                                       |yes
//!                                         upsert Trend, enqueue AiAnalysisJob
//! ```
//!
//! A pass is best effort: the first failure aborts it, is logged, and the pass
//! returns an empty list. Trends already upserted and jobs already enqueued by
//! that pass stay in place.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};

use super::ingestion::{IngestionLog, IngestionStatus};
use super::model::{Trend, TrendUpdate};
use super::store::TrendStore;
use crate::clients::PostSource;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, QueueError};
use crate::metrics::MetricsCollector;
use crate::queue::{AiAnalysisJob, QueueKind, QueueMessage, QueueProducer};
use crate::scoring::{compute_metrics, extract_topics, priority_bucket, ScoringWeights};

/// Default minimum trend score.
pub const DEFAULT_MIN_TREND_SCORE: f64 = 50.0;

/// Default minimum number of posts sharing a keyword.
pub const DEFAULT_MIN_TOPIC_POSTS: usize = 3;

/// How far back the ingestion sweep looks.
pub const INGESTION_LOOKBACK_HOURS: i64 = 1;

/// Turns raw post batches into persisted trends and analysis jobs.
pub struct TrendPipeline {
    source: Arc<dyn PostSource>,
    store: Arc<dyn TrendStore>,
    producer: Arc<QueueProducer>,
    weights: ScoringWeights,
    min_trend_score: f64,
    min_topic_posts: usize,
    metrics: MetricsCollector,
}

impl TrendPipeline {
    pub fn new(
        source: Arc<dyn PostSource>,
        store: Arc<dyn TrendStore>,
        producer: Arc<QueueProducer>,
    ) -> Self {
        Self {
            source,
            store,
            producer,
            weights: ScoringWeights::default(),
            min_trend_score: DEFAULT_MIN_TREND_SCORE,
            min_topic_posts: DEFAULT_MIN_TOPIC_POSTS,
            metrics: MetricsCollector::new(),
        }
    }

    /// Creates a pipeline with the scoring settings of `config`.
    pub fn from_config(
        config: &PipelineConfig,
        source: Arc<dyn PostSource>,
        store: Arc<dyn TrendStore>,
        producer: Arc<QueueProducer>,
    ) -> Self {
        Self::new(source, store, producer)
            .with_weights(config.weights)
            .with_min_trend_score(config.min_trend_score)
            .with_min_topic_posts(config.min_topic_posts)
    }

    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_min_trend_score(mut self, score: f64) -> Self {
        self.min_trend_score = score;
        self
    }

    pub fn with_min_topic_posts(mut self, posts: usize) -> Self {
        self.min_topic_posts = posts;
        self
    }

    pub fn store(&self) -> &Arc<dyn TrendStore> {
        &self.store
    }

    /// Runs one analysis pass over `batch_ref` and returns the trends that
    /// cleared the threshold. Never fails; see the module docs.
    pub async fn run_analysis_pass(&self, batch_ref: &str, subreddit: &str) -> Vec<Trend> {
        self.run_analysis_pass_at(batch_ref, subreddit, Utc::now())
            .await
    }

    /// Same as [`run_analysis_pass`](Self::run_analysis_pass) with an explicit
    /// clock, used for velocity and record timestamps.
    pub async fn run_analysis_pass_at(
        &self,
        batch_ref: &str,
        subreddit: &str,
        now: DateTime<Utc>,
    ) -> Vec<Trend> {
        let started = Instant::now();
        info!(batch = %batch_ref, subreddit = %subreddit, "Analyzing trends");

        let trends = match self.analyze(batch_ref, subreddit, now).await {
            Ok(trends) => trends,
            Err(e) => {
                error!(batch = %batch_ref, subreddit = %subreddit, error = %e, "Analysis pass failed");
                Vec::new()
            }
        };

        self.metrics
            .record_analysis_pass(subreddit, started.elapsed().as_secs_f64());
        trends
    }

    async fn analyze(
        &self,
        batch_ref: &str,
        subreddit: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Trend>, PipelineError> {
        let posts = self.source.fetch(batch_ref).await?;
        if posts.is_empty() {
            warn!(batch = %batch_ref, "No posts found in batch");
            return Ok(Vec::new());
        }

        let mut topics: Vec<_> = extract_topics(&posts, self.min_topic_posts)
            .into_iter()
            .collect();
        topics.sort_by(|a, b| a.0.cmp(&b.0));

        let mut detected = Vec::new();
        for (topic, group) in topics {
            let metrics = compute_metrics(&group, &self.weights, now);
            if metrics.trend_score < self.min_trend_score {
                debug!(
                    topic = %topic,
                    score = metrics.trend_score,
                    threshold = self.min_trend_score,
                    "Topic below threshold"
                );
                continue;
            }

            let update = TrendUpdate {
                topic,
                subreddit: subreddit.to_string(),
                raw_data_path: batch_ref.to_string(),
                metrics,
            };
            let trend = self.store.upsert(update, now).await?;
            info!(
                topic = %trend.topic,
                subreddit = %trend.subreddit,
                score = trend.trend_score,
                "Created/updated trend"
            );
            self.metrics.record_trend(&trend.subreddit, trend.trend_score);

            self.enqueue_for_analysis(&trend).await?;
            detected.push(trend);
        }

        info!(subreddit = %subreddit, trends = detected.len(), "Detected trends");
        Ok(detected)
    }

    /// Publishes the analysis job for `trend` with its priority bucket.
    pub async fn enqueue_for_analysis(&self, trend: &Trend) -> Result<QueueMessage, QueueError> {
        let priority = priority_bucket(trend.trend_score);
        let job = AiAnalysisJob {
            trend_id: trend.id,
            topic: trend.topic.clone(),
            subreddit: trend.subreddit.clone(),
            raw_data_path: trend.raw_data_path.clone(),
            trend_score: trend.trend_score,
            priority,
        };

        self.producer
            .publish_with_priority(QueueKind::AiAnalysis, job, priority)
            .await
    }

    /// Runs a pass for every completed ingestion started within the last hour.
    ///
    /// Returns `(ingestions analyzed, trends detected)`.
    pub async fn analyze_recent_ingestions(
        &self,
        logs: &[IngestionLog],
        now: DateTime<Utc>,
    ) -> (usize, usize) {
        let cutoff = now - Duration::hours(INGESTION_LOOKBACK_HOURS);
        let mut analyzed = 0;
        let mut detected = 0;

        for log in logs.iter().filter(|log| log.started_at > cutoff) {
            if log.status != IngestionStatus::Completed {
                continue;
            }
            let Some(batch_ref) = log.storage_path.as_deref() else {
                warn!(ingestion_id = %log.id, "Completed ingestion has no storage path");
                continue;
            };

            let trends = self.run_analysis_pass_at(batch_ref, &log.subreddit, now).await;
            analyzed += 1;
            detected += trends.len();
        }

        info!(
            analyzed = analyzed,
            trends = detected,
            "Trend analysis sweep completed"
        );
        (analyzed, detected)
    }
}
