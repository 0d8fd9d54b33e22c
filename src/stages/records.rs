//! Records written by the downstream stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::clients::AnalysisReport;
use crate::error::StoreError;

/// Persisted result of analyzing one trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiAnalysis {
    pub id: Uuid,
    pub trend_id: Uuid,
    pub summary: String,
    pub sentiment: String,
    pub key_insights: String,
    pub content_suggestions: String,
    pub confidence_score: f64,
    pub model_used: String,
    pub created_at: DateTime<Utc>,
}

impl AiAnalysis {
    pub fn from_report(trend_id: Uuid, report: AnalysisReport, model_used: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            trend_id,
            summary: report.summary,
            sentiment: report.sentiment,
            key_insights: report.key_insights,
            content_suggestions: report.content_suggestions,
            confidence_score: report.confidence_score,
            model_used: model_used.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    Draft,
    Posted,
}

impl fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DraftStatus::Draft => f.write_str("draft"),
            DraftStatus::Posted => f.write_str("posted"),
        }
    }
}

/// A generated post waiting for, or past, submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedPost {
    pub id: Uuid,
    pub trend_id: Uuid,
    pub analysis_id: Uuid,
    pub title: String,
    pub content: String,
    pub target_subreddit: String,
    pub status: DraftStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GeneratedPost {
    pub fn draft(
        trend_id: Uuid,
        analysis_id: Uuid,
        title: String,
        content: String,
        target_subreddit: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            trend_id,
            analysis_id,
            title,
            content,
            target_subreddit,
            status: DraftStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks the draft as live on the platform.
    pub fn mark_posted(&mut self) -> Result<(), StoreError> {
        if self.status != DraftStatus::Draft {
            return Err(StoreError::InvalidTransition {
                record: "generated_post",
                from: self.status.to_string(),
                to: DraftStatus::Posted.to_string(),
            });
        }
        self.status = DraftStatus::Posted;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Lifecycle of a submission: `pending -> posted | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Posted,
    Failed,
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Posted => "posted",
            SubmissionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One attempt to publish a draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostSubmission {
    pub id: Uuid,
    pub draft_id: Uuid,
    pub subreddit: String,
    pub status: SubmissionStatus,
    pub external_id: Option<String>,
    pub url: Option<String>,
    pub error_message: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PostSubmission {
    pub fn pending(draft_id: Uuid, subreddit: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            draft_id,
            subreddit: subreddit.into(),
            status: SubmissionStatus::Pending,
            external_id: None,
            url: None,
            error_message: None,
            submitted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_posted(
        &mut self,
        external_id: impl Into<String>,
        url: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.ensure_pending(SubmissionStatus::Posted)?;
        self.status = SubmissionStatus::Posted;
        self.external_id = Some(external_id.into());
        self.url = Some(url.into());
        self.submitted_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) -> Result<(), StoreError> {
        self.ensure_pending(SubmissionStatus::Failed)?;
        self.status = SubmissionStatus::Failed;
        self.error_message = Some(message.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    fn ensure_pending(&self, to: SubmissionStatus) -> Result<(), StoreError> {
        if self.status == SubmissionStatus::Pending {
            return Ok(());
        }
        Err(StoreError::InvalidTransition {
            record: "post_submission",
            from: self.status.to_string(),
            to: to.to_string(),
        })
    }
}
