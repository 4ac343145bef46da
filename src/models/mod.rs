mod alert;
mod indicator;
mod mention;
mod prediction;
mod price;
mod sentiment;

pub use alert::{
    AlertChannel, AlertCondition, AlertEvent, AlertEventStatus, AlertMetric, AlertOperator,
    AlertRule,
};
pub use indicator::{MacdValue, TechnicalIndicatorSet, TrendDirection};
pub use mention::{RawMention, SourceType};
pub use prediction::{
    AuditStatus, Direction, HistoryProvenance, PredictionAudit, PredictionResult, PriceTargets,
    RiskLevel, SentimentSnapshot, TechnicalSnapshot, TradingSignal,
};
pub use price::{Candle, Quote};
pub use sentiment::{
    AggregateSnapshot, ModelScore, ScoredMention, SentimentAggregate, SentimentLabel,
    SentimentTrend, SignalHint, SignalKind,
};
