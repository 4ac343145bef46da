use crate::models::SourceType;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Sentiment classification of one mention
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl std::fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SentimentLabel::Positive => write!(f, "positive"),
            SentimentLabel::Negative => write!(f, "negative"),
            SentimentLabel::Neutral => write!(f, "neutral"),
        }
    }
}

/// Output of a single ensemble member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelScore {
    pub model: String,
    pub score: f64,      // -1.0 to +1.0
    pub confidence: f64, // 0.0 to 1.0
    pub weight: f64,
    pub breakdown: serde_json::Value,
}

/// Category of a rule-extracted signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Analyst,
    Risk,
    Momentum,
}

/// A keyword-triggered event independent of the numeric score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalHint {
    pub kind: SignalKind,
    pub description: String,
    pub strength: f64,
}

/// A scored, persisted mention. Immutable after creation; duplicates are
/// rejected by the dedup key, not overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMention {
    pub id: Uuid,
    pub symbol: String,
    pub source: String,
    pub source_type: SourceType,
    pub provider: String,
    pub external_id: Option<String>,
    pub headline: String,
    pub content: String,
    pub url: Option<String>,
    pub sentiment_score: f64,
    pub sentiment_label: SentimentLabel,
    pub confidence: f64,
    pub model_breakdown: Vec<ModelScore>,
    pub signals: Vec<SignalHint>,
    pub quality_score: f64,
    pub freshness_minutes: Option<i64>,
    pub sample_size: usize,
    pub metadata: serde_json::Value,
    pub published_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
}

/// Rolling-window trend classification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SentimentTrend {
    #[serde(rename = "very bullish")]
    VeryBullish,
    #[serde(rename = "bullish")]
    Bullish,
    #[serde(rename = "neutral")]
    Neutral,
    #[serde(rename = "bearish")]
    Bearish,
    #[serde(rename = "very bearish")]
    VeryBearish,
}

impl std::fmt::Display for SentimentTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SentimentTrend::VeryBullish => write!(f, "very bullish"),
            SentimentTrend::Bullish => write!(f, "bullish"),
            SentimentTrend::Neutral => write!(f, "neutral"),
            SentimentTrend::Bearish => write!(f, "bearish"),
            SentimentTrend::VeryBearish => write!(f, "very bearish"),
        }
    }
}

/// Trailing-window summary of scored mentions for one symbol.
/// Recomputed from scratch on each request; counts always sum to
/// `total_mentions` and percentages are rounded integers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentAggregate {
    pub symbol: String,
    pub window_start: DateTime<Utc>,
    pub window_hours: i64,
    pub avg_sentiment: f64,
    pub avg_confidence: f64,
    pub total_mentions: usize,
    pub positive_count: usize,
    pub negative_count: usize,
    pub neutral_count: usize,
    pub positive_percentage: i64,
    pub negative_percentage: i64,
    pub neutral_percentage: i64,
    pub source_breakdown: HashMap<SourceType, usize>,
    pub trend: SentimentTrend,
    pub freshness_minutes: i64,
    pub latest_signals: Vec<SignalHint>,
    pub data_available: bool,
}

impl SentimentAggregate {
    /// Zeroed aggregate for a window with no records. Not an error.
    pub fn empty(symbol: &str, window_hours: i64, window_start: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            window_start,
            window_hours,
            avg_sentiment: 0.0,
            avg_confidence: 0.0,
            total_mentions: 0,
            positive_count: 0,
            negative_count: 0,
            neutral_count: 0,
            positive_percentage: 0,
            negative_percentage: 0,
            neutral_percentage: 0,
            source_breakdown: HashMap::new(),
            trend: SentimentTrend::Neutral,
            freshness_minutes: 0,
            latest_signals: Vec::new(),
            data_available: false,
        }
    }
}

/// Hour-bucketed aggregate snapshot kept for historical trend queries.
/// Upserted on `(symbol, date, hour)` so repeated aggregation within one
/// hour overwrites rather than duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    pub symbol: String,
    pub date: NaiveDate,
    pub hour: u32,
    pub avg_sentiment: f64,
    pub avg_confidence: f64,
    pub total_mentions: usize,
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
    pub source_breakdown: HashMap<SourceType, usize>,
    pub trend: SentimentTrend,
    pub timestamp: DateTime<Utc>,
}
