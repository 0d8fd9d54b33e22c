//! Scoring engine: pure functions turning a batch of posts into trend metrics.
//!
//! - `velocity`: posts per hour since the oldest post, floored at one hour
//! - `engagement_rate`: mean of `score + 2 * comments`
//! - `trend_score`: weighted sum of the two, unbounded
//! - `extract_topics`: keyword groups of posts sharing a title token
//!
//! Weights are passed in explicitly as `ScoringWeights`, so one process can
//! score with several policies at once.

pub mod metrics;
pub mod topics;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use metrics::{
    compute_metrics, engagement_rate, priority_bucket, trend_score, velocity, TrendMetrics,
};
pub use topics::{extract_topics, tokenize, STOP_WORDS};

/// A raw social-media post as delivered by the post source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub author: String,
    /// Net upvotes.
    pub score: i64,
    #[serde(alias = "numComments")]
    pub num_comments: i64,
    #[serde(alias = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Weights of the composite trend score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Weight applied to velocity.
    pub velocity: f64,
    /// Weight applied to engagement rate.
    pub engagement: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            velocity: 1.0,
            engagement: 1.0,
        }
    }
}

impl ScoringWeights {
    pub fn new(velocity: f64, engagement: f64) -> Self {
        Self {
            velocity,
            engagement,
        }
    }
}
