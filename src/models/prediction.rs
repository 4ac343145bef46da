use crate::models::{MacdValue, SentimentTrend, TrendDirection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discrete trading signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradingSignal {
    #[serde(rename = "STRONG BUY")]
    StrongBuy,
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "HOLD")]
    Hold,
    #[serde(rename = "SELL")]
    Sell,
    #[serde(rename = "STRONG SELL")]
    StrongSell,
}

impl TradingSignal {
    pub fn is_buy(&self) -> bool {
        matches!(self, TradingSignal::Buy | TradingSignal::StrongBuy)
    }

    pub fn is_sell(&self) -> bool {
        matches!(self, TradingSignal::Sell | TradingSignal::StrongSell)
    }
}

impl std::fmt::Display for TradingSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingSignal::StrongBuy => write!(f, "STRONG BUY"),
            TradingSignal::Buy => write!(f, "BUY"),
            TradingSignal::Hold => write!(f, "HOLD"),
            TradingSignal::Sell => write!(f, "SELL"),
            TradingSignal::StrongSell => write!(f, "STRONG SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Targets and stop derived from the lookback range; floored at zero.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriceTargets {
    pub target1: f64,
    pub target2: Option<f64>,
    pub stop_loss: f64,
}

/// Whether the indicator input was real history or a fabricated series
/// kept only for pipeline availability during data outages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HistoryProvenance {
    Real,
    Synthetic,
}

/// Rounded indicator view embedded in a prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicalSnapshot {
    pub rsi: f64,
    pub macd: MacdValue,
    pub ma20: f64,
    pub ma50: f64,
    pub ma200: f64,
    pub support: f64,
    pub resistance: f64,
    pub trend: TrendDirection,
    pub reasons: Vec<String>,
}

/// Rounded sentiment view embedded in a prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentSnapshot {
    pub score: f64,
    pub total_mentions: usize,
    pub positive_percent: i64,
    pub negative_percent: i64,
    pub trend: SentimentTrend,
}

/// A synthesized trading recommendation. Created per request, never
/// mutated; forwarded to the prediction auditor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub symbol: String,
    pub signal: TradingSignal,
    pub confidence: u32, // 55..=95
    pub risk_level: RiskLevel,
    pub price_targets: PriceTargets,
    pub recommendation: String,
    pub rationale: Vec<String>,
    pub technical: TechnicalSnapshot,
    pub sentiment: SentimentSnapshot,
    pub history_provenance: HistoryProvenance,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Bullish => write!(f, "bullish"),
            Direction::Bearish => write!(f, "bearish"),
            Direction::Neutral => write!(f, "neutral"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Pending,
    Matched,
    Missed,
}

/// Record of a prediction awaiting (or past) reconciliation against the
/// observed price move. Created pending; resolved exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionAudit {
    pub id: Uuid,
    pub symbol: String,
    pub prediction_timestamp: DateTime<Utc>,
    pub horizon_hours: i64,
    pub predicted_direction: Direction,
    pub predicted_change_percent: Option<f64>,
    pub confidence: Option<f64>,
    pub price_at_prediction: Option<f64>,
    pub status: AuditStatus,
    pub actual_direction: Option<Direction>,
    pub actual_change_percent: Option<f64>,
    pub evaluated_at: Option<DateTime<Utc>>,
}
