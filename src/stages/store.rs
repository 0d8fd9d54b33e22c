//! Keyed persistence for stage records.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::records::{AiAnalysis, GeneratedPost, PostSubmission};
use crate::error::StoreError;

/// Storage of the records written by the downstream stages.
///
/// Saving a record with an existing id replaces it.
#[async_trait]
pub trait StageStore: Send + Sync {
    async fn save_analysis(&self, analysis: &AiAnalysis) -> Result<(), StoreError>;

    async fn get_analysis(&self, id: Uuid) -> Result<Option<AiAnalysis>, StoreError>;

    async fn save_draft(&self, draft: &GeneratedPost) -> Result<(), StoreError>;

    async fn get_draft(&self, id: Uuid) -> Result<Option<GeneratedPost>, StoreError>;

    async fn save_submission(&self, submission: &PostSubmission) -> Result<(), StoreError>;

    async fn get_submission(&self, id: Uuid) -> Result<Option<PostSubmission>, StoreError>;

    /// Submissions of one draft, oldest first.
    async fn submissions_for_draft(&self, draft_id: Uuid)
        -> Result<Vec<PostSubmission>, StoreError>;
}

#[derive(Debug, Default)]
struct Tables {
    analyses: HashMap<Uuid, AiAnalysis>,
    drafts: HashMap<Uuid, GeneratedPost>,
    submissions: HashMap<Uuid, PostSubmission>,
}

/// In-process stage store.
#[derive(Debug, Default)]
pub struct MemoryStageStore {
    tables: Mutex<Tables>,
}

impl MemoryStageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    /// Every stored draft, in no particular order.
    pub fn drafts(&self) -> Vec<GeneratedPost> {
        self.tables()
            .map(|t| t.drafts.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every stored analysis, in no particular order.
    pub fn analyses(&self) -> Vec<AiAnalysis> {
        self.tables()
            .map(|t| t.analyses.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StageStore for MemoryStageStore {
    async fn save_analysis(&self, analysis: &AiAnalysis) -> Result<(), StoreError> {
        self.tables()?
            .analyses
            .insert(analysis.id, analysis.clone());
        Ok(())
    }

    async fn get_analysis(&self, id: Uuid) -> Result<Option<AiAnalysis>, StoreError> {
        Ok(self.tables()?.analyses.get(&id).cloned())
    }

    async fn save_draft(&self, draft: &GeneratedPost) -> Result<(), StoreError> {
        self.tables()?.drafts.insert(draft.id, draft.clone());
        Ok(())
    }

    async fn get_draft(&self, id: Uuid) -> Result<Option<GeneratedPost>, StoreError> {
        Ok(self.tables()?.drafts.get(&id).cloned())
    }

    async fn save_submission(&self, submission: &PostSubmission) -> Result<(), StoreError> {
        self.tables()?
            .submissions
            .insert(submission.id, submission.clone());
        Ok(())
    }

    async fn get_submission(&self, id: Uuid) -> Result<Option<PostSubmission>, StoreError> {
        Ok(self.tables()?.submissions.get(&id).cloned())
    }

    async fn submissions_for_draft(
        &self,
        draft_id: Uuid,
    ) -> Result<Vec<PostSubmission>, StoreError> {
        let mut matching: Vec<PostSubmission> = self
            .tables()?
            .submissions
            .values()
            .filter(|s| s.draft_id == draft_id)
            .cloned()
            .collect();
        matching.sort_by_key(|s| s.created_at);
        Ok(matching)
    }
}

/// Redis-backed stage store.
///
/// Records are JSON strings under `trendpulse:{analysis,draft,submission}:<id>`.
/// Each draft keeps the set of its submission ids at
/// `trendpulse:draft:<id>:submissions`.
pub struct RedisStageStore {
    redis: ConnectionManager,
}

impl RedisStageStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    fn analysis_key(id: Uuid) -> String {
        format!("trendpulse:analysis:{}", id)
    }

    fn draft_key(id: Uuid) -> String {
        format!("trendpulse:draft:{}", id)
    }

    fn submission_key(id: Uuid) -> String {
        format!("trendpulse:submission:{}", id)
    }

    fn draft_submissions_key(draft_id: Uuid) -> String {
        format!("trendpulse:draft:{}:submissions", draft_id)
    }

    async fn put<T>(&self, key: String, record: &T) -> Result<(), StoreError>
    where
        T: serde::Serialize + Sync,
    {
        let mut conn = self.redis.clone();
        let json = serde_json::to_string(record)?;
        conn.set::<_, _, ()>(key, json).await?;
        Ok(())
    }

    async fn load<T: DeserializeOwned>(&self, key: String) -> Result<Option<T>, StoreError> {
        let mut conn = self.redis.clone();
        let json: Option<String> = conn.get(&key).await?;
        json.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(StoreError::from)
    }
}

#[async_trait]
impl StageStore for RedisStageStore {
    async fn save_analysis(&self, analysis: &AiAnalysis) -> Result<(), StoreError> {
        self.put(Self::analysis_key(analysis.id), analysis).await
    }

    async fn get_analysis(&self, id: Uuid) -> Result<Option<AiAnalysis>, StoreError> {
        self.load(Self::analysis_key(id)).await
    }

    async fn save_draft(&self, draft: &GeneratedPost) -> Result<(), StoreError> {
        self.put(Self::draft_key(draft.id), draft).await
    }

    async fn get_draft(&self, id: Uuid) -> Result<Option<GeneratedPost>, StoreError> {
        self.load(Self::draft_key(id)).await
    }

    async fn save_submission(&self, submission: &PostSubmission) -> Result<(), StoreError> {
        let mut conn = self.redis.clone();
        let json = serde_json::to_string(submission)?;

        redis::pipe()
            .atomic()
            .set(Self::submission_key(submission.id), json)
            .ignore()
            .sadd(
                Self::draft_submissions_key(submission.draft_id),
                submission.id.to_string(),
            )
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_submission(&self, id: Uuid) -> Result<Option<PostSubmission>, StoreError> {
        self.load(Self::submission_key(id)).await
    }

    async fn submissions_for_draft(
        &self,
        draft_id: Uuid,
    ) -> Result<Vec<PostSubmission>, StoreError> {
        let mut conn = self.redis.clone();
        let ids: Vec<String> = conn.smembers(Self::draft_submissions_key(draft_id)).await?;

        let mut submissions = Vec::with_capacity(ids.len());
        for id in ids {
            let id = Uuid::parse_str(&id).map_err(|e| StoreError::CorruptRecord {
                key: Self::draft_submissions_key(draft_id),
                message: e.to_string(),
            })?;
            if let Some(submission) = self.get_submission(id).await? {
                submissions.push(submission);
            }
        }
        submissions.sort_by_key(|s: &PostSubmission| s.created_at);
        Ok(submissions)
    }
}
