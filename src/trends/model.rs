//! Trend records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scoring::TrendMetrics;

/// Status of a trend. Trends never leave `Active` today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrendStatus {
    #[default]
    Active,
}

impl TrendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendStatus::Active => "active",
        }
    }
}

/// A detected topic in one subreddit, keyed by `(topic, subreddit)`.
///
/// Metrics are overwritten wholesale on every detection. `id`,
/// `first_seen_at` and `detected_at` are set once, on first detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trend {
    pub id: Uuid,
    pub topic: String,
    pub subreddit: String,
    pub trend_score: f64,
    pub velocity: f64,
    pub engagement_rate: f64,
    pub post_count: usize,
    pub comment_count: i64,
    pub upvote_count: i64,
    /// Batch reference of the posts this trend was last computed from.
    pub raw_data_path: String,
    #[serde(default)]
    pub status: TrendStatus,
    pub first_seen_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub detected_at: DateTime<Utc>,
}

impl Trend {
    /// Key of this trend: `(topic, subreddit)`.
    pub fn key(&self) -> (&str, &str) {
        (&self.topic, &self.subreddit)
    }

    /// Creates the record for a first detection.
    pub fn detected(update: TrendUpdate, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: update.topic,
            subreddit: update.subreddit,
            trend_score: update.metrics.trend_score,
            velocity: update.metrics.velocity,
            engagement_rate: update.metrics.engagement_rate,
            post_count: update.metrics.post_count,
            comment_count: update.metrics.comment_count,
            upvote_count: update.metrics.upvote_count,
            raw_data_path: update.raw_data_path,
            status: TrendStatus::Active,
            first_seen_at: now,
            last_updated_at: now,
            detected_at: now,
        }
    }

    /// Overwrites the metrics with a newer detection of the same key.
    pub fn apply(&mut self, update: TrendUpdate, now: DateTime<Utc>) {
        self.trend_score = update.metrics.trend_score;
        self.velocity = update.metrics.velocity;
        self.engagement_rate = update.metrics.engagement_rate;
        self.post_count = update.metrics.post_count;
        self.comment_count = update.metrics.comment_count;
        self.upvote_count = update.metrics.upvote_count;
        self.raw_data_path = update.raw_data_path;
        self.status = TrendStatus::Active;
        self.last_updated_at = now;
    }
}

/// Input of a trend upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendUpdate {
    pub topic: String,
    pub subreddit: String,
    pub raw_data_path: String,
    pub metrics: TrendMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn update(score: f64) -> TrendUpdate {
        TrendUpdate {
            topic: "kubernetes".to_string(),
            subreddit: "r/tech".to_string(),
            raw_data_path: "batch-1".to_string(),
            metrics: TrendMetrics {
                velocity: 2.0,
                engagement_rate: score - 2.0,
                trend_score: score,
                post_count: 4,
                comment_count: 18,
                upvote_count: 180,
            },
        }
    }

    #[test]
    fn test_apply_preserves_identity() {
        let first = Utc::now();
        let mut trend = Trend::detected(update(56.0), first);
        let id = trend.id;

        let later = first + Duration::minutes(30);
        let mut second = update(120.0);
        second.raw_data_path = "batch-2".to_string();
        trend.apply(second, later);

        assert_eq!(trend.id, id);
        assert_eq!(trend.first_seen_at, first);
        assert_eq!(trend.detected_at, first);
        assert_eq!(trend.last_updated_at, later);
        assert!((trend.trend_score - 120.0).abs() < f64::EPSILON);
        assert_eq!(trend.raw_data_path, "batch-2");
    }

    #[test]
    fn test_status_serialization() {
        let trend = Trend::detected(update(56.0), Utc::now());
        let value = serde_json::to_value(&trend).unwrap();
        assert_eq!(value["status"], "active");
        assert_eq!(TrendStatus::Active.as_str(), "active");
    }
}
