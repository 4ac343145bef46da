use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// Alert Rule Models
// ==============================================================================

/// Metric a rule watches
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertMetric {
    Sentiment,
    PriceChange,
    VolumeSpike,
    Composite,
}

impl AlertMetric {
    /// Lookup key in a generic metric context
    pub fn key(&self) -> &'static str {
        match self {
            AlertMetric::Sentiment => "sentiment",
            AlertMetric::PriceChange => "price_change",
            AlertMetric::VolumeSpike => "volume_spike",
            AlertMetric::Composite => "composite",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AlertMetric::Sentiment => "Sentiment",
            AlertMetric::PriceChange => "Price change",
            AlertMetric::VolumeSpike => "Volume spike",
            AlertMetric::Composite => "Composite",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertOperator {
    Lt,
    Lte,
    Gt,
    Gte,
    CrossesAbove,
    CrossesBelow,
}

impl AlertOperator {
    /// The crossing operators are level checks: the evaluator keeps no
    /// memory of the prior value, so they behave as gte/lte.
    pub fn evaluate(&self, value: f64, threshold: f64) -> bool {
        match self {
            AlertOperator::Lt => value < threshold,
            AlertOperator::Lte => value <= threshold,
            AlertOperator::Gt => value > threshold,
            AlertOperator::Gte => value >= threshold,
            AlertOperator::CrossesAbove => value >= threshold,
            AlertOperator::CrossesBelow => value <= threshold,
        }
    }
}

impl std::fmt::Display for AlertOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertOperator::Lt => write!(f, "lt"),
            AlertOperator::Lte => write!(f, "lte"),
            AlertOperator::Gt => write!(f, "gt"),
            AlertOperator::Gte => write!(f, "gte"),
            AlertOperator::CrossesAbove => write!(f, "crosses_above"),
            AlertOperator::CrossesBelow => write!(f, "crosses_below"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertCondition {
    pub metric: AlertMetric,
    pub operator: AlertOperator,
    pub threshold: f64,
    /// Evidence gate; only meaningful for sentiment-backed rules.
    #[serde(default)]
    pub min_mentions: usize,
    pub lookback_hours: i64,
}

/// Delivery strategy selector for a rule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertChannel {
    Email { destination: Option<String> },
    Webhook { url: String },
    InApp,
}

impl AlertChannel {
    pub fn kind(&self) -> &'static str {
        match self {
            AlertChannel::Email { .. } => "email",
            AlertChannel::Webhook { .. } => "webhook",
            AlertChannel::InApp => "in_app",
        }
    }
}

/// A user-defined threshold rule. Created and edited by the rule
/// management surface; the core only reads it and bumps
/// `last_triggered_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: Uuid,
    pub owner: String,
    pub name: String,
    pub symbol: String,
    pub condition: AlertCondition,
    pub channel: AlertChannel,
    pub cooldown_minutes: i64,
    pub is_active: bool,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ==============================================================================
// Alert Event Models
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertEventStatus {
    Queued,
    Sent,
    Failed,
}

/// Delivery record for one rule firing. Created queued and transitioned
/// exactly once to sent or failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub owner: String,
    pub symbol: String,
    pub channel: String,
    pub status: AlertEventStatus,
    pub summary: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}
