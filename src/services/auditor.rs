use crate::errors::AppError;
use crate::external::price_provider::PriceProvider;
use crate::models::{AuditStatus, Direction, PredictionAudit, PredictionResult, TradingSignal};
use crate::store::Store;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// At most this many audits are evaluated per reconciliation pass; the
/// sweep is at-least-once, anything left over is picked up next hour.
pub const RECONCILE_BATCH: usize = 50;

const DIRECTION_THRESHOLD_PERCENT: f64 = 0.2;

#[derive(Debug, Default)]
pub struct ReconcileSummary {
    pub evaluated: usize,
    pub matched: usize,
    pub missed: usize,
}

/// Records every synthesized signal with a price snapshot and later
/// reconciles it against the observed price movement.
pub struct PredictionAuditor {
    store: Arc<dyn Store>,
    price_provider: Arc<dyn PriceProvider>,
}

impl PredictionAuditor {
    pub fn new(store: Arc<dyn Store>, price_provider: Arc<dyn PriceProvider>) -> Self {
        Self {
            store,
            price_provider,
        }
    }

    pub async fn record(
        &self,
        symbol: &str,
        prediction: &PredictionResult,
        price_at_prediction: Option<f64>,
        horizon_hours: i64,
    ) -> Result<(), AppError> {
        let audit = PredictionAudit {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            prediction_timestamp: prediction.timestamp,
            horizon_hours,
            predicted_direction: normalize_signal_direction(prediction.signal),
            predicted_change_percent: None,
            confidence: Some(prediction.confidence as f64),
            price_at_prediction,
            status: AuditStatus::Pending,
            actual_direction: None,
            actual_change_percent: None,
            evaluated_at: None,
        };
        self.store.insert_audit(audit).await
    }

    /// Evaluate pending audits whose horizon has elapsed. Audits without
    /// a baseline price are marked missed immediately; audits whose live
    /// price fetch fails stay pending and are retried next pass.
    pub async fn reconcile(&self) -> Result<ReconcileSummary, AppError> {
        let pending = self.store.pending_audits(RECONCILE_BATCH).await?;
        let mut summary = ReconcileSummary::default();

        for mut audit in pending {
            let age_hours = (Utc::now() - audit.prediction_timestamp).num_minutes() as f64 / 60.0;
            if age_hours < audit.horizon_hours as f64 {
                continue;
            }

            let Some(baseline) = audit.price_at_prediction else {
                audit.status = AuditStatus::Missed;
                audit.evaluated_at = Some(Utc::now());
                summary.evaluated += 1;
                summary.missed += 1;
                self.store.update_audit(audit).await?;
                continue;
            };

            let quote = match self.price_provider.fetch_quote(&audit.symbol).await {
                Ok(Some(quote)) if quote.current_price > 0.0 => quote,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Price fetch failed for {} during audit: {}", audit.symbol, e);
                    continue;
                }
            };

            let change_percent = ((quote.current_price - baseline) / baseline) * 100.0;
            let actual_direction = resolve_direction(change_percent);
            let status = if actual_direction == audit.predicted_direction {
                AuditStatus::Matched
            } else {
                AuditStatus::Missed
            };

            audit.status = status;
            audit.actual_direction = Some(actual_direction);
            audit.actual_change_percent = Some(change_percent);
            audit.evaluated_at = Some(Utc::now());

            summary.evaluated += 1;
            match status {
                AuditStatus::Matched => summary.matched += 1,
                _ => summary.missed += 1,
            }
            self.store.update_audit(audit).await?;
        }

        if summary.evaluated > 0 {
            info!(
                "✅ Reconciled {} predictions ({} matched, {} missed)",
                summary.evaluated, summary.matched, summary.missed
            );
        }
        Ok(summary)
    }
}

pub fn resolve_direction(change_percent: f64) -> Direction {
    if change_percent > DIRECTION_THRESHOLD_PERCENT {
        Direction::Bullish
    } else if change_percent < -DIRECTION_THRESHOLD_PERCENT {
        Direction::Bearish
    } else {
        Direction::Neutral
    }
}

pub fn normalize_signal_direction(signal: TradingSignal) -> Direction {
    match signal {
        TradingSignal::Buy | TradingSignal::StrongBuy => Direction::Bullish,
        TradingSignal::Sell | TradingSignal::StrongSell => Direction::Bearish,
        TradingSignal::Hold => Direction::Neutral,
    }
}
