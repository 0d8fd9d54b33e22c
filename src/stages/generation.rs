//! Handler of `post:generate:queue`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::records::GeneratedPost;
use super::store::StageStore;
use crate::clients::ContentClient;
use crate::error::StageError;
use crate::metrics::MetricsCollector;
use crate::queue::{
    JobPayload, MessageHandler, PostGenerationJob, PostPublishJob, QueueKind, QueueMessage,
    QueueProducer,
};

/// Text stored when the content client fails.
pub const GENERATION_FALLBACK: &str = "Failed to generate content suggestions";

/// Longest draft body, in characters.
pub const MAX_BODY_CHARS: usize = 2000;

const TITLE_MARKER: &str = "Title:";

/// Title of a generated text: the rest of the first `Title:` line, trimmed.
/// Falls back to `Trending: <topic>` when there is no such line or it is blank.
pub fn extract_title(content: &str, topic: &str) -> String {
    content
        .find(TITLE_MARKER)
        .map(|start| {
            let rest = &content[start + TITLE_MARKER.len()..];
            rest.split('\n').next().unwrap_or_default().trim()
        })
        .filter(|title| !title.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Trending: {}", topic))
}

/// Drafts a post from an analysis and stores it.
///
/// With auto-publish enabled, every stored draft is also queued on
/// `post:publish:queue`.
pub struct GenerationStage {
    client: Arc<dyn ContentClient>,
    store: Arc<dyn StageStore>,
    producer: Arc<QueueProducer>,
    auto_publish: Option<String>,
    metrics: MetricsCollector,
}

impl GenerationStage {
    pub fn new(
        client: Arc<dyn ContentClient>,
        store: Arc<dyn StageStore>,
        producer: Arc<QueueProducer>,
    ) -> Self {
        Self {
            client,
            store,
            producer,
            auto_publish: None,
            metrics: MetricsCollector::new(),
        }
    }

    /// Queues every draft for publication with `credentials_ref`.
    pub fn with_auto_publish(mut self, credentials_ref: impl Into<String>) -> Self {
        self.auto_publish = Some(credentials_ref.into());
        self
    }

    pub async fn process(&self, job: &PostGenerationJob) -> Result<GeneratedPost, StageError> {
        info!(topic = %job.topic, trend_id = %job.trend_id, "Generating post");

        let content = match self
            .client
            .generate(&job.topic, &job.summary, &job.key_insights)
            .await
        {
            Ok(content) => content,
            Err(e) => {
                warn!(topic = %job.topic, error = %e, "Content client failed, using fallback");
                self.metrics.record_fallback("content");
                GENERATION_FALLBACK.to_string()
            }
        };

        let draft = GeneratedPost::draft(
            job.trend_id,
            job.analysis_id,
            extract_title(&content, &job.topic),
            content.chars().take(MAX_BODY_CHARS).collect(),
            job.subreddit.clone(),
        );
        self.store.save_draft(&draft).await?;
        info!(draft_id = %draft.id, topic = %job.topic, "Generated draft");

        if let Some(credentials_ref) = &self.auto_publish {
            let publish = PostPublishJob {
                draft_id: draft.id,
                subreddit: draft.target_subreddit.clone(),
                title: draft.title.clone(),
                body: draft.content.clone(),
                credentials_ref: credentials_ref.clone(),
            };
            self.producer.publish(QueueKind::PostPublish, publish).await?;
        }

        Ok(draft)
    }
}

#[async_trait]
impl MessageHandler for GenerationStage {
    async fn handle(&self, message: &QueueMessage) -> Result<(), StageError> {
        match &message.payload {
            JobPayload::PostGeneration(job) => self.process(job).await.map(|_| ()),
            other => Err(StageError::UnexpectedPayload {
                handler: "generation",
                payload: other.kind().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::queue::{MemoryQueueStore, QueueStore};
    use crate::stages::{DraftStatus, MemoryStageStore};
    use uuid::Uuid;

    struct MockContentClient {
        reply: Option<String>,
    }

    #[async_trait]
    impl ContentClient for MockContentClient {
        async fn generate(
            &self,
            _topic: &str,
            _summary: &str,
            _insights: &str,
        ) -> Result<String, ClientError> {
            self.reply
                .clone()
                .ok_or_else(|| ClientError::RateLimited("quota".to_string()))
        }
    }

    fn job() -> PostGenerationJob {
        PostGenerationJob {
            trend_id: Uuid::new_v4(),
            topic: "kubernetes".to_string(),
            subreddit: "r/tech".to_string(),
            analysis_id: Uuid::new_v4(),
            summary: "summary".to_string(),
            key_insights: "insights".to_string(),
            content_suggestions: "ideas".to_string(),
        }
    }

    fn stage(reply: Option<&str>) -> (GenerationStage, Arc<MemoryStageStore>, Arc<MemoryQueueStore>) {
        let store = Arc::new(MemoryStageStore::new());
        let queues = Arc::new(MemoryQueueStore::new());
        let stage = GenerationStage::new(
            Arc::new(MockContentClient {
                reply: reply.map(str::to_string),
            }),
            store.clone(),
            Arc::new(QueueProducer::new(queues.clone())),
        );
        (stage, store, queues)
    }

    #[test]
    fn test_extract_title() {
        assert_eq!(
            extract_title("Idea 1\nTitle:  Kubernetes 1.30 is here \nBody", "k8s"),
            "Kubernetes 1.30 is here"
        );
        assert_eq!(extract_title("Title: Last line", "k8s"), "Last line");
        assert_eq!(extract_title("No marker here", "k8s"), "Trending: k8s");
        assert_eq!(extract_title("Title:   \nBody", "k8s"), "Trending: k8s");
    }

    #[test]
    fn test_extract_title_uses_first_marker() {
        let content = "Title: First\nText\nTitle: Second\n";
        assert_eq!(extract_title(content, "t"), "First");
    }

    #[tokio::test]
    async fn test_draft_stored() {
        let body = format!("Title: Why kubernetes won\n{}", "y".repeat(3000));
        let (stage, store, queues) = stage(Some(&body));
        let job = job();

        let draft = stage.process(&job).await.unwrap();

        assert_eq!(draft.title, "Why kubernetes won");
        assert_eq!(draft.content.chars().count(), MAX_BODY_CHARS);
        assert_eq!(draft.status, DraftStatus::Draft);
        assert_eq!(draft.analysis_id, job.analysis_id);
        assert_eq!(draft.target_subreddit, "r/tech");
        assert_eq!(store.get_draft(draft.id).await.unwrap(), Some(draft));
        assert_eq!(queues.len(QueueKind::PostPublish.as_str()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_client_failure_stores_fallback_draft() {
        let (stage, _store, _queues) = stage(None);

        let draft = stage.process(&job()).await.unwrap();

        assert_eq!(draft.content, GENERATION_FALLBACK);
        assert_eq!(draft.title, "Trending: kubernetes");
    }

    #[tokio::test]
    async fn test_auto_publish_queues_draft() {
        let (stage, _store, queues) = stage(Some("Title: Hello\nWorld"));
        let stage = stage.with_auto_publish("user-7");

        let draft = stage.process(&job()).await.unwrap();

        let entry = queues
            .try_pop_front(QueueKind::PostPublish.as_str())
            .await
            .unwrap()
            .unwrap();
        let message: QueueMessage = serde_json::from_str(&entry).unwrap();
        match message.payload {
            JobPayload::PostPublish(publish) => {
                assert_eq!(publish.draft_id, draft.id);
                assert_eq!(publish.title, "Hello");
                assert_eq!(publish.credentials_ref, "user-7");
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wrong_payload_rejected() {
        let (stage, _store, _queues) = stage(Some("x"));
        let message: QueueMessage = QueueMessage::new(
            QueueKind::PostPublish.as_str(),
            JobPayload::PostPublish(PostPublishJob {
                draft_id: Uuid::new_v4(),
                subreddit: "r/tech".to_string(),
                title: "t".to_string(),
                body: "b".to_string(),
                credentials_ref: "c".to_string(),
            }),
        );

        let err = stage.handle(&message).await.unwrap_err();
        assert!(matches!(
            err,
            StageError::UnexpectedPayload { handler: "generation", .. }
        ));
    }
}
