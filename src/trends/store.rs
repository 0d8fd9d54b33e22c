//! Trend persistence keyed by `(topic, subreddit)`.
//!
//! `upsert` is a single atomic read-modify-write per key in both backends,
//! so two analysis passes racing on the same key cannot lose an update or
//! overwrite the identity fields of the first detection.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use super::model::{Trend, TrendStatus, TrendUpdate};
use crate::error::StoreError;

/// Sorted set of every trend key scored by trend score.
const SCORE_INDEX: &str = "trends:by_score";

/// Keyed store of trends.
#[async_trait]
pub trait TrendStore: Send + Sync {
    /// Inserts the trend if its key is new, else overwrites its metrics.
    /// Returns the stored record.
    async fn upsert(&self, update: TrendUpdate, now: DateTime<Utc>) -> Result<Trend, StoreError>;

    /// Looks up one trend.
    async fn get(&self, topic: &str, subreddit: &str) -> Result<Option<Trend>, StoreError>;

    /// Active trends by descending score.
    async fn top_active(&self, limit: usize) -> Result<Vec<Trend>, StoreError>;

    /// Trends of one subreddit by descending score.
    async fn by_subreddit(&self, subreddit: &str) -> Result<Vec<Trend>, StoreError>;
}

fn by_score_desc(a: &Trend, b: &Trend) -> std::cmp::Ordering {
    b.trend_score.total_cmp(&a.trend_score)
}

/// In-process trend store.
#[derive(Debug, Default)]
pub struct MemoryTrendStore {
    trends: Mutex<HashMap<(String, String), Trend>>,
}

impl MemoryTrendStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn trends(&self) -> Result<MutexGuard<'_, HashMap<(String, String), Trend>>, StoreError> {
        self.trends
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    /// Number of stored trends.
    pub fn len(&self) -> usize {
        self.trends().map(|trends| trends.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TrendStore for MemoryTrendStore {
    async fn upsert(&self, update: TrendUpdate, now: DateTime<Utc>) -> Result<Trend, StoreError> {
        let mut trends = self.trends()?;
        let key = (update.topic.clone(), update.subreddit.clone());

        let trend = match trends.entry(key) {
            Entry::Occupied(mut existing) => {
                existing.get_mut().apply(update, now);
                existing.get().clone()
            }
            Entry::Vacant(slot) => slot.insert(Trend::detected(update, now)).clone(),
        };
        Ok(trend)
    }

    async fn get(&self, topic: &str, subreddit: &str) -> Result<Option<Trend>, StoreError> {
        let trends = self.trends()?;
        Ok(trends
            .get(&(topic.to_string(), subreddit.to_string()))
            .cloned())
    }

    async fn top_active(&self, limit: usize) -> Result<Vec<Trend>, StoreError> {
        let mut active: Vec<Trend> = self
            .trends()?
            .values()
            .filter(|trend| trend.status == TrendStatus::Active)
            .cloned()
            .collect();
        active.sort_by(by_score_desc);
        active.truncate(limit);
        Ok(active)
    }

    async fn by_subreddit(&self, subreddit: &str) -> Result<Vec<Trend>, StoreError> {
        let mut matching: Vec<Trend> = self
            .trends()?
            .values()
            .filter(|trend| trend.subreddit == subreddit)
            .cloned()
            .collect();
        matching.sort_by(by_score_desc);
        Ok(matching)
    }
}

/// Redis-backed trend store.
///
/// Each trend is a hash at `trend:<subreddit>:<topic>`. Identity fields are
/// written with HSETNX and metrics with HSET inside one MULTI/EXEC, which
/// makes the upsert atomic without a read round trip. Two sorted sets index
/// the keys by score: one global and one per subreddit.
pub struct RedisTrendStore {
    redis: ConnectionManager,
}

impl RedisTrendStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    fn record_key(topic: &str, subreddit: &str) -> String {
        format!("trend:{}:{}", subreddit, topic)
    }

    fn subreddit_index(subreddit: &str) -> String {
        format!("trends:subreddit:{}", subreddit)
    }

    async fn load_many(&self, keys: &[String]) -> Result<Vec<Trend>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for key in keys {
            pipe.hgetall(key);
        }

        let mut conn = self.redis.clone();
        let records: Vec<HashMap<String, String>> = pipe.query_async(&mut conn).await?;

        keys.iter()
            .zip(records)
            .filter(|(_, fields)| !fields.is_empty())
            .map(|(key, fields)| trend_from_fields(key, &fields))
            .collect()
    }
}

#[async_trait]
impl TrendStore for RedisTrendStore {
    async fn upsert(&self, update: TrendUpdate, now: DateTime<Utc>) -> Result<Trend, StoreError> {
        let key = Self::record_key(&update.topic, &update.subreddit);
        let subreddit_index = Self::subreddit_index(&update.subreddit);
        let score = update.metrics.trend_score;
        let written_at = now.to_rfc3339();

        let fields: [(&str, String); 10] = [
            ("topic", update.topic),
            ("subreddit", update.subreddit),
            ("trend_score", score.to_string()),
            ("velocity", update.metrics.velocity.to_string()),
            ("engagement_rate", update.metrics.engagement_rate.to_string()),
            ("post_count", update.metrics.post_count.to_string()),
            ("comment_count", update.metrics.comment_count.to_string()),
            ("upvote_count", update.metrics.upvote_count.to_string()),
            ("raw_data_path", update.raw_data_path),
            ("last_updated_at", written_at.clone()),
        ];

        let mut conn = self.redis.clone();
        let (stored,): (HashMap<String, String>,) = redis::pipe()
            .atomic()
            .hset_nx(&key, "id", Uuid::new_v4().to_string())
            .ignore()
            .hset_nx(&key, "first_seen_at", &written_at)
            .ignore()
            .hset_nx(&key, "detected_at", &written_at)
            .ignore()
            .hset_multiple(&key, &fields)
            .ignore()
            .hset(&key, "status", TrendStatus::Active.as_str())
            .ignore()
            .zadd(SCORE_INDEX, &key, score)
            .ignore()
            .zadd(&subreddit_index, &key, score)
            .ignore()
            .hgetall(&key)
            .query_async(&mut conn)
            .await?;

        trend_from_fields(&key, &stored)
    }

    async fn get(&self, topic: &str, subreddit: &str) -> Result<Option<Trend>, StoreError> {
        let key = Self::record_key(topic, subreddit);
        let mut conn = self.redis.clone();
        let fields: HashMap<String, String> = conn.hgetall(&key).await?;

        if fields.is_empty() {
            return Ok(None);
        }
        trend_from_fields(&key, &fields).map(Some)
    }

    async fn top_active(&self, limit: usize) -> Result<Vec<Trend>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.redis.clone();
        let keys: Vec<String> = conn.zrevrange(SCORE_INDEX, 0, limit as isize - 1).await?;

        Ok(self
            .load_many(&keys)
            .await?
            .into_iter()
            .filter(|trend| trend.status == TrendStatus::Active)
            .collect())
    }

    async fn by_subreddit(&self, subreddit: &str) -> Result<Vec<Trend>, StoreError> {
        let mut conn = self.redis.clone();
        let keys: Vec<String> = conn
            .zrevrange(Self::subreddit_index(subreddit), 0, -1)
            .await?;
        self.load_many(&keys).await
    }
}

fn trend_from_fields(key: &str, fields: &HashMap<String, String>) -> Result<Trend, StoreError> {
    fn field<T: FromStr>(key: &str, fields: &HashMap<String, String>, name: &str) -> Result<T, StoreError> {
        let raw = fields.get(name).ok_or_else(|| StoreError::CorruptRecord {
            key: key.to_string(),
            message: format!("missing field '{}'", name),
        })?;
        raw.parse().map_err(|_| StoreError::CorruptRecord {
            key: key.to_string(),
            message: format!("invalid value '{}' for field '{}'", raw, name),
        })
    }

    let timestamp = |name: &str| -> Result<DateTime<Utc>, StoreError> {
        let raw: String = field(key, fields, name)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| StoreError::CorruptRecord {
                key: key.to_string(),
                message: format!("invalid timestamp for field '{}': {}", name, e),
            })
    };

    let status = match fields.get("status").map(String::as_str) {
        None | Some("active") => TrendStatus::Active,
        Some(other) => {
            return Err(StoreError::CorruptRecord {
                key: key.to_string(),
                message: format!("unknown status '{}'", other),
            })
        }
    };

    Ok(Trend {
        id: field(key, fields, "id")?,
        topic: field(key, fields, "topic")?,
        subreddit: field(key, fields, "subreddit")?,
        trend_score: field(key, fields, "trend_score")?,
        velocity: field(key, fields, "velocity")?,
        engagement_rate: field(key, fields, "engagement_rate")?,
        post_count: field(key, fields, "post_count")?,
        comment_count: field(key, fields, "comment_count")?,
        upvote_count: field(key, fields, "upvote_count")?,
        raw_data_path: field(key, fields, "raw_data_path")?,
        status,
        first_seen_at: timestamp("first_seen_at")?,
        last_updated_at: timestamp("last_updated_at")?,
        detected_at: timestamp("detected_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::TrendMetrics;
    use chrono::Duration;

    fn update(topic: &str, subreddit: &str, score: f64) -> TrendUpdate {
        TrendUpdate {
            topic: topic.to_string(),
            subreddit: subreddit.to_string(),
            raw_data_path: format!("{}/batch.json", subreddit),
            metrics: TrendMetrics {
                velocity: 1.0,
                engagement_rate: score - 1.0,
                trend_score: score,
                post_count: 3,
                comment_count: 6,
                upvote_count: 30,
            },
        }
    }

    #[tokio::test]
    async fn test_upsert_twice_keeps_first_seen() {
        let store = MemoryTrendStore::new();
        let first = Utc::now();
        let second = first + Duration::minutes(10);

        let created = store.upsert(update("rust", "r/programming", 80.0), first).await.unwrap();
        let updated = store
            .upsert(update("rust", "r/programming", 200.0), second)
            .await
            .unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.first_seen_at, first);
        assert_eq!(updated.last_updated_at, second);
        assert!((updated.trend_score - 200.0).abs() < f64::EPSILON);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_same_topic_in_other_subreddit_is_separate() {
        let store = MemoryTrendStore::new();
        let now = Utc::now();

        store.upsert(update("rust", "r/programming", 80.0), now).await.unwrap();
        store.upsert(update("rust", "r/rust", 90.0), now).await.unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.get("rust", "r/rust").await.unwrap().is_some());
        assert!(store.get("golang", "r/rust").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_top_active_and_by_subreddit_order() {
        let store = MemoryTrendStore::new();
        let now = Utc::now();

        store.upsert(update("alpha", "r/tech", 60.0), now).await.unwrap();
        store.upsert(update("beta", "r/tech", 300.0), now).await.unwrap();
        store.upsert(update("gamma", "r/science", 120.0), now).await.unwrap();

        let top: Vec<String> = store
            .top_active(2)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.topic)
            .collect();
        assert_eq!(top, vec!["beta", "gamma"]);

        let tech: Vec<String> = store
            .by_subreddit("r/tech")
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.topic)
            .collect();
        assert_eq!(tech, vec!["beta", "alpha"]);
    }

    #[tokio::test]
    async fn test_concurrent_upserts_keep_one_record() {
        let store = std::sync::Arc::new(MemoryTrendStore::new());
        let now = Utc::now();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .upsert(update("rust", "r/programming", 50.0 + i as f64), now)
                        .await
                        .unwrap()
                        .id
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }

        assert_eq!(store.len(), 1);
        assert!(ids.iter().all(|id| *id == ids[0]));
    }

    #[test]
    fn test_trend_from_fields_round_trip() {
        let now = Utc::now();
        let trend = Trend::detected(update("rust", "r/programming", 56.5), now);
        let fields: HashMap<String, String> = [
            ("id", trend.id.to_string()),
            ("topic", trend.topic.clone()),
            ("subreddit", trend.subreddit.clone()),
            ("trend_score", trend.trend_score.to_string()),
            ("velocity", trend.velocity.to_string()),
            ("engagement_rate", trend.engagement_rate.to_string()),
            ("post_count", trend.post_count.to_string()),
            ("comment_count", trend.comment_count.to_string()),
            ("upvote_count", trend.upvote_count.to_string()),
            ("raw_data_path", trend.raw_data_path.clone()),
            ("status", "active".to_string()),
            ("first_seen_at", now.to_rfc3339()),
            ("last_updated_at", now.to_rfc3339()),
            ("detected_at", now.to_rfc3339()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        assert_eq!(trend_from_fields("trend:x", &fields).unwrap(), trend);
    }

    #[test]
    fn test_trend_from_fields_missing_field() {
        let fields = HashMap::from([("topic".to_string(), "rust".to_string())]);
        let err = trend_from_fields("trend:r/programming:rust", &fields).unwrap_err();
        assert!(matches!(err, StoreError::CorruptRecord { .. }));
    }
}
