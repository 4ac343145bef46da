use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One bar of a price-history series, oldest→newest ordering expected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A live quote snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub current_price: f64,
    pub previous_close: f64,
    pub change: f64,
    pub change_percent: f64,
    pub volume: f64,
    pub day_high: f64,
    pub day_low: f64,
    pub last_updated: DateTime<Utc>,
}
