//! Integration tests against a live Redis server.
//!
//! The tests flush the keys they use, so point them at a scratch database.
//! Run with:
//! TRENDPULSE_TEST_REDIS_URL=redis://127.0.0.1:6379/15 cargo test --test redis_integration -- --ignored --test-threads=1

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use uuid::Uuid;

use trendpulse::queue::{
    AiAnalysisJob, ConsumeOutcome, DelayedReaper, MessageHandler, QueueConsumer, QueueKind,
    QueueMessage, QueueProducer, QueueStore, RedisQueueStore,
};
use trendpulse::scoring::TrendMetrics;
use trendpulse::stages::{GeneratedPost, PostSubmission, RedisStageStore, StageStore};
use trendpulse::trends::{RedisTrendStore, TrendStore, TrendUpdate};
use trendpulse::StageError;

fn redis_url() -> String {
    std::env::var("TRENDPULSE_TEST_REDIS_URL")
        .expect("TRENDPULSE_TEST_REDIS_URL environment variable must be set for integration tests")
}

async fn connect() -> RedisQueueStore {
    let store = RedisQueueStore::connect(&redis_url())
        .await
        .expect("Should connect to Redis");
    let mut conn = store.connection();
    redis::cmd("FLUSHDB")
        .query_async::<_, ()>(&mut conn)
        .await
        .expect("Should flush test database");
    store
}

fn analysis_job(topic: &str) -> AiAnalysisJob {
    AiAnalysisJob {
        trend_id: Uuid::new_v4(),
        topic: topic.to_string(),
        subreddit: "r/tech".to_string(),
        raw_data_path: "reddit/tech/batch.json".to_string(),
        trend_score: 60.0,
        priority: 2,
    }
}

struct FailingHandler;

#[async_trait]
impl MessageHandler for FailingHandler {
    async fn handle(&self, message: &QueueMessage) -> Result<(), StageError> {
        Err(StageError::UnexpectedPayload {
            handler: "failing",
            payload: message.payload.kind().to_string(),
        })
    }
}

#[tokio::test]
#[ignore] // Run with: cargo test --test redis_integration -- --ignored
async fn test_priority_and_fifo_order() {
    let store: Arc<dyn QueueStore> = Arc::new(connect().await);
    let producer = QueueProducer::new(Arc::clone(&store));

    producer
        .publish(QueueKind::AiAnalysis, analysis_job("first"))
        .await
        .expect("publish");
    producer
        .publish(QueueKind::AiAnalysis, analysis_job("second"))
        .await
        .expect("publish");
    producer
        .publish_with_priority(QueueKind::AiAnalysis, analysis_job("urgent"), 10)
        .await
        .expect("publish");

    let mut topics = Vec::new();
    while let Some(entry) = store
        .try_pop_front(QueueKind::AiAnalysis.as_str())
        .await
        .expect("pop")
    {
        let message: QueueMessage = serde_json::from_str(&entry).expect("decode");
        topics.push(message.payload.topic().unwrap_or_default().to_string());
    }
    assert_eq!(topics, vec!["urgent", "first", "second"]);
}

#[tokio::test]
#[ignore]
async fn test_failed_message_ends_in_dead_letter_queue() {
    let store: Arc<dyn QueueStore> = Arc::new(connect().await);
    let producer = QueueProducer::new(Arc::clone(&store));
    let consumer = QueueConsumer::new(Arc::clone(&store))
        .with_max_retries(1)
        .with_pop_timeout(Duration::from_secs(1));

    producer
        .publish(QueueKind::AiAnalysis, analysis_job("doomed"))
        .await
        .expect("publish");

    let first = consumer
        .consume(QueueKind::AiAnalysis, &FailingHandler)
        .await
        .expect("consume");
    assert!(matches!(first, ConsumeOutcome::Retried { retry_count: 1, .. }));

    let second = consumer
        .consume(QueueKind::AiAnalysis, &FailingHandler)
        .await
        .expect("consume");
    assert!(matches!(second, ConsumeOutcome::DeadLettered { .. }));

    assert_eq!(consumer.queue_depth(QueueKind::AiAnalysis).await.unwrap(), 0);
    assert_eq!(consumer.dead_letter_depth(QueueKind::AiAnalysis).await.unwrap(), 1);

    let redriven = consumer
        .redrive_dead_letters(QueueKind::AiAnalysis, 10)
        .await
        .expect("redrive");
    assert_eq!(redriven, 1);
    assert_eq!(consumer.queue_depth(QueueKind::AiAnalysis).await.unwrap(), 1);
}

#[tokio::test]
#[ignore]
async fn test_empty_queue_consume_is_idle() {
    let store: Arc<dyn QueueStore> = Arc::new(connect().await);
    let consumer =
        QueueConsumer::new(Arc::clone(&store)).with_pop_timeout(Duration::from_secs(1));

    let outcome = consumer
        .consume(QueueKind::PostGeneration, &FailingHandler)
        .await
        .expect("consume");
    assert!(matches!(outcome, ConsumeOutcome::Idle));
}

#[tokio::test]
#[ignore]
async fn test_delayed_message_promoted_when_due() {
    let store: Arc<dyn QueueStore> = Arc::new(connect().await);
    let producer = QueueProducer::new(Arc::clone(&store));
    let reaper = DelayedReaper::new(Arc::clone(&store));

    producer
        .publish_with_delay(QueueKind::AiAnalysis, analysis_job("later"), Duration::from_secs(60))
        .await
        .expect("publish");

    assert_eq!(reaper.promote_due(QueueKind::AiAnalysis, Utc::now()).await.unwrap(), 0);
    assert_eq!(reaper.scheduled_len(QueueKind::AiAnalysis).await.unwrap(), 1);

    let later = Utc::now() + chrono::Duration::minutes(2);
    assert_eq!(reaper.promote_due(QueueKind::AiAnalysis, later).await.unwrap(), 1);
    assert_eq!(store.len(QueueKind::AiAnalysis.as_str()).await.unwrap(), 1);
}

fn update(topic: &str, score: f64) -> TrendUpdate {
    TrendUpdate {
        topic: topic.to_string(),
        subreddit: "r/tech".to_string(),
        raw_data_path: "reddit/tech/batch.json".to_string(),
        metrics: TrendMetrics {
            velocity: 3.0,
            engagement_rate: 25.0,
            trend_score: score,
            post_count: 3,
            comment_count: 20,
            upvote_count: 200,
        },
    }
}

#[tokio::test]
#[ignore]
async fn test_trend_upsert_keeps_identity() {
    let connection: ConnectionManager = connect().await.connection();
    let trends = RedisTrendStore::new(connection);

    let t0 = Utc::now();
    let first = trends.upsert(update("rust", 55.0), t0).await.expect("upsert");
    let second = trends
        .upsert(update("rust", 80.0), t0 + chrono::Duration::minutes(5))
        .await
        .expect("upsert");

    assert_eq!(first.id, second.id);
    assert_eq!(second.first_seen_at, first.first_seen_at);
    assert_eq!(second.trend_score, 80.0);

    trends.upsert(update("golang", 60.0), t0).await.expect("upsert");
    let top = trends.top_active(10).await.expect("top");
    let topics: Vec<&str> = top.iter().map(|t| t.topic.as_str()).collect();
    assert_eq!(topics, vec!["rust", "golang"]);
}

#[tokio::test]
#[ignore]
async fn test_stage_store_submissions() {
    let connection: ConnectionManager = connect().await.connection();
    let stages = RedisStageStore::new(connection);

    let draft = GeneratedPost::draft(
        Uuid::new_v4(),
        Uuid::new_v4(),
        "Title".to_string(),
        "Body".to_string(),
        "r/tech".to_string(),
    );
    stages.save_draft(&draft).await.expect("save draft");
    assert_eq!(stages.get_draft(draft.id).await.unwrap(), Some(draft.clone()));

    let mut submission = PostSubmission::pending(draft.id, "r/tech");
    stages.save_submission(&submission).await.expect("save");
    submission.mark_failed("rate limited").expect("transition");
    stages.save_submission(&submission).await.expect("save");

    let listed = stages.submissions_for_draft(draft.id).await.expect("list");
    assert_eq!(listed, vec![submission]);
}
