use serde::{Deserialize, Serialize};

/// Moving-average based trend state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrendDirection {
    Uptrend,
    Downtrend,
    Neutral,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendDirection::Uptrend => write!(f, "UPTREND"),
            TrendDirection::Downtrend => write!(f, "DOWNTREND"),
            TrendDirection::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MacdValue {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Indicators derived purely from an ordered price-history series.
/// Stateless; recomputed per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicalIndicatorSet {
    pub rsi: f64, // 0..=100
    pub macd: MacdValue,
    pub ma20: f64,
    pub ma50: f64,
    pub ma200: f64,
    pub support: f64,
    pub resistance: f64,
    pub trend: TrendDirection,
    pub volatility: f64,
    pub momentum: f64,
}
