//! AI analysis and content clients backed by an [`LlmProvider`].

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use super::json::extract_json_object;
use super::llm::{GenerationRequest, LlmProvider, Message};
use super::{AnalysisClient, AnalysisReport, ContentClient};
use crate::error::ClientError;

/// Longest posts digest sent in an analysis prompt, in characters.
const MAX_DIGEST_CHARS: usize = 1000;

/// Longest prose response kept as a summary, in characters.
const MAX_PROSE_SUMMARY_CHARS: usize = 500;

const DEFAULT_CONFIDENCE: f64 = 0.7;
const PROSE_CONFIDENCE: f64 = 0.6;

/// Analysis and content client that prompts a chat-completion model.
pub struct LlmAnalysisClient {
    provider: Arc<dyn LlmProvider>,
    model: String,
    temperature: f64,
}

impl LlmAnalysisClient {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        let model = provider.default_model().to_string();
        Self {
            provider,
            model,
            temperature: 0.7,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    async fn complete(&self, prompt: String) -> Result<String, ClientError> {
        let request = GenerationRequest::new(self.model.clone(), vec![Message::user(prompt)])
            .with_temperature(self.temperature);
        let response = self.provider.generate(request).await?;
        debug!(
            model = %response.model,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            "LLM completion received"
        );
        response
            .content
            .ok_or_else(|| ClientError::ParseError("Response contained no content".to_string()))
    }
}

fn analysis_prompt(topic: &str, subreddit: &str, posts_digest: &str) -> String {
    let digest: String = posts_digest.chars().take(MAX_DIGEST_CHARS).collect();
    format!(
        "Analyze this trending topic from Reddit:\n\n\
         Topic: {topic}\n\
         Subreddit: r/{subreddit}\n\n\
         Sample Posts Data:\n{digest}\n\n\
         Provide a JSON response with:\n\
         1. summary: Brief overview of the trend (2-3 sentences)\n\
         2. sentiment: Overall sentiment (positive/negative/neutral/mixed)\n\
         3. keyInsights: 3-5 key insights about why this is trending\n\
         4. contentSuggestions: Ideas for engaging Reddit posts about this topic\n\
         5. confidenceScore: Your confidence in this analysis (0.0-1.0)\n\n\
         Format as JSON only, no markdown.",
        subreddit = subreddit.trim_start_matches("r/"),
    )
}

fn content_prompt(topic: &str, summary: &str, insights: &str) -> String {
    format!(
        "Generate 3 engaging Reddit post ideas about this trending topic:\n\n\
         Topic: {topic}\n\
         Summary: {summary}\n\
         Key Insights: {insights}\n\n\
         For each post idea, provide:\n\
         - Title (catchy and Reddit-appropriate), on its own line starting with \"Title:\"\n\
         - Content (2-3 paragraphs, informative and engaging)\n\
         - Suggested subreddit\n\n\
         Make it conversational and authentic for Reddit's audience."
    )
}

/// Reads a text field that the model may have answered as a string or a list.
fn text_field(json: &Value, key: &str) -> Option<String> {
    match json.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(";"),
        ),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn confidence_field(json: &Value) -> Option<f64> {
    match json.get("confidenceScore")? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Turns a raw model answer into a report.
///
/// A JSON object anywhere in the answer is read field by field with defaults
/// for missing keys. An answer without any object becomes a prose summary.
/// An object that fails to parse is an error.
pub(crate) fn parse_analysis(response: &str) -> Result<AnalysisReport, ClientError> {
    let Some(raw_json) = extract_json_object(response) else {
        return Ok(AnalysisReport {
            summary: response.trim().chars().take(MAX_PROSE_SUMMARY_CHARS).collect(),
            sentiment: "neutral".to_string(),
            key_insights: "Analysis completed".to_string(),
            content_suggestions: "See summary for details".to_string(),
            confidence_score: PROSE_CONFIDENCE,
        });
    };

    let json: Value = serde_json::from_str(&raw_json)
        .map_err(|e| ClientError::ParseError(format!("Invalid analysis JSON: {}", e)))?;

    Ok(AnalysisReport {
        summary: text_field(&json, "summary").unwrap_or_default(),
        sentiment: text_field(&json, "sentiment").unwrap_or_else(|| "neutral".to_string()),
        key_insights: text_field(&json, "keyInsights").unwrap_or_default(),
        content_suggestions: text_field(&json, "contentSuggestions").unwrap_or_default(),
        confidence_score: confidence_field(&json)
            .unwrap_or(DEFAULT_CONFIDENCE)
            .clamp(0.0, 1.0),
    })
}

#[async_trait]
impl AnalysisClient for LlmAnalysisClient {
    async fn analyze(
        &self,
        topic: &str,
        subreddit: &str,
        posts_digest: &str,
    ) -> Result<AnalysisReport, ClientError> {
        info!(topic = %topic, subreddit = %subreddit, model = %self.model, "Analyzing trend");
        let response = self
            .complete(analysis_prompt(topic, subreddit, posts_digest))
            .await?;
        let report = parse_analysis(&response)?;
        debug!(
            topic = %topic,
            sentiment = %report.sentiment,
            confidence = report.confidence_score,
            "Analysis parsed"
        );
        Ok(report)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ContentClient for LlmAnalysisClient {
    async fn generate(
        &self,
        topic: &str,
        summary: &str,
        insights: &str,
    ) -> Result<String, ClientError> {
        info!(topic = %topic, "Generating content suggestions");
        self.complete(content_prompt(topic, summary, insights)).await
    }
}
