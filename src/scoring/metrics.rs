//! Velocity, engagement and composite score of a group of posts.

use chrono::{DateTime, Utc};

use super::{Post, ScoringWeights};

/// Metrics of one topic group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendMetrics {
    pub velocity: f64,
    pub engagement_rate: f64,
    pub trend_score: f64,
    pub post_count: usize,
    pub comment_count: i64,
    pub upvote_count: i64,
}

/// Posts per hour since the oldest post.
///
/// Elapsed time is counted in whole hours and floored at 1, so posts from the
/// last hour, or with timestamps in the future, never divide by zero.
pub fn velocity(posts: &[Post], now: DateTime<Utc>) -> f64 {
    let Some(oldest) = posts.iter().map(|post| post.created_at).min() else {
        return 0.0;
    };

    let hours = (now - oldest).num_hours().max(1);
    posts.len() as f64 / hours as f64
}

/// Mean of `score + 2 * comments` over the posts; 0 for an empty batch.
pub fn engagement_rate(posts: &[Post]) -> f64 {
    if posts.is_empty() {
        return 0.0;
    }

    let total: f64 = posts
        .iter()
        .map(|post| post.score as f64 + post.num_comments as f64 * 2.0)
        .sum();
    total / posts.len() as f64
}

/// Weighted sum of velocity and engagement rate. Not normalized.
pub fn trend_score(velocity: f64, engagement_rate: f64, weights: &ScoringWeights) -> f64 {
    velocity * weights.velocity + engagement_rate * weights.engagement
}

/// Computes every metric of a topic group in one pass.
pub fn compute_metrics(posts: &[Post], weights: &ScoringWeights, now: DateTime<Utc>) -> TrendMetrics {
    let velocity = velocity(posts, now);
    let engagement_rate = engagement_rate(posts);

    TrendMetrics {
        velocity,
        engagement_rate,
        trend_score: trend_score(velocity, engagement_rate, weights),
        post_count: posts.len(),
        comment_count: posts.iter().map(|post| post.num_comments).sum(),
        upvote_count: posts.iter().map(|post| post.score).sum(),
    }
}

/// Queue priority of the analysis job for a trend with this score.
pub fn priority_bucket(trend_score: f64) -> i32 {
    match trend_score {
        s if s >= 1000.0 => 10,
        s if s >= 500.0 => 8,
        s if s >= 200.0 => 6,
        s if s >= 100.0 => 4,
        _ => 2,
    }
}
