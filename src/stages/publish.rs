//! Handler of `post:publish:queue`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info};

use super::records::{DraftStatus, PostSubmission};
use super::store::StageStore;
use crate::clients::{PublishClient, PublishOutcome, PublishRequest};
use crate::error::{StageError, StoreError};
use crate::metrics::MetricsCollector;
use crate::queue::{JobPayload, MessageHandler, PostPublishJob, QueueMessage};

/// Submits drafts and records the outcome.
///
/// Every job for an unposted draft produces exactly one `PostSubmission`,
/// which ends `posted` or `failed`. Jobs for a posted draft are skipped. A
/// refused or failed submission is a recorded outcome, not a handler
/// failure, so the message is not retried.
pub struct PublishStage {
    client: Arc<dyn PublishClient>,
    store: Arc<dyn StageStore>,
    metrics: MetricsCollector,
}

impl PublishStage {
    pub fn new(client: Arc<dyn PublishClient>, store: Arc<dyn StageStore>) -> Self {
        Self {
            client,
            store,
            metrics: MetricsCollector::new(),
        }
    }

    /// Submits the draft named by `job`.
    ///
    /// Returns `None` without contacting the platform when the draft is
    /// already posted.
    pub async fn process(
        &self,
        job: &PostPublishJob,
    ) -> Result<Option<PostSubmission>, StageError> {
        let mut draft = self
            .store
            .get_draft(job.draft_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("generated post {}", job.draft_id)))?;

        if draft.status == DraftStatus::Posted {
            info!(draft_id = %draft.id, "Draft already posted, skipping submission");
            return Ok(None);
        }

        info!(draft_id = %draft.id, subreddit = %job.subreddit, title = %job.title, "Submitting post");
        let mut submission = PostSubmission::pending(draft.id, job.subreddit.clone());
        self.store.save_submission(&submission).await?;

        let request = PublishRequest {
            subreddit: job.subreddit.clone(),
            title: job.title.clone(),
            body: job.body.clone(),
            credentials_ref: job.credentials_ref.clone(),
        };

        // The submission is fresh and the draft was checked above, so these
        // transitions start from `pending` and `draft`.
        let posted = match self.client.submit(&request).await {
            Ok(PublishOutcome::Posted { external_id, url }) => {
                info!(draft_id = %draft.id, url = %url, "Post submitted successfully");
                submission.mark_posted(external_id, url, Utc::now())?;
                true
            }
            Ok(PublishOutcome::Rejected { message }) => {
                error!(draft_id = %draft.id, error = %message, "Post submission rejected");
                submission.mark_failed(message)?;
                false
            }
            Err(e) => {
                error!(draft_id = %draft.id, error = %e, "Post submission failed");
                self.metrics.record_fallback("publish");
                submission.mark_failed(e.to_string())?;
                false
            }
        };
        self.store.save_submission(&submission).await?;

        if posted {
            draft.mark_posted()?;
            self.store.save_draft(&draft).await?;
        }
        Ok(Some(submission))
    }
}

#[async_trait]
impl MessageHandler for PublishStage {
    async fn handle(&self, message: &QueueMessage) -> Result<(), StageError> {
        match &message.payload {
            JobPayload::PostPublish(job) => self.process(job).await.map(|_| ()),
            other => Err(StageError::UnexpectedPayload {
                handler: "publish",
                payload: other.kind().to_string(),
            }),
        }
    }
}
