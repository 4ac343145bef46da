use crate::errors::AppError;
use crate::models::{
    AggregateSnapshot, AlertEvent, AlertEventStatus, AlertRule, PredictionAudit, ScoredMention,
};
use crate::store::Store;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use uuid::Uuid;

/// Thread-safe in-memory store. Mention and snapshot state is partitioned
/// per symbol so concurrent pipelines for different symbols never contend;
/// the snapshot upsert takes the symbol's shard write-lock, which gives
/// the single-writer-per-symbol discipline the aggregator relies on.
#[derive(Default)]
pub struct MemoryStore {
    mentions: DashMap<String, Vec<ScoredMention>>,
    snapshots: DashMap<String, Vec<AggregateSnapshot>>,
    rules: RwLock<Vec<AlertRule>>,
    events: RwLock<Vec<AlertEvent>>,
    audits: RwLock<Vec<PredictionAudit>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_mention_by_external_id(
        &self,
        symbol: &str,
        external_id: &str,
    ) -> Result<Option<ScoredMention>, AppError> {
        Ok(self.mentions.get(symbol).and_then(|shard| {
            shard
                .iter()
                .find(|m| m.external_id.as_deref() == Some(external_id))
                .cloned()
        }))
    }

    async fn find_mention_by_headline_since(
        &self,
        symbol: &str,
        headline: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<ScoredMention>, AppError> {
        Ok(self.mentions.get(symbol).and_then(|shard| {
            shard
                .iter()
                .find(|m| m.headline == headline && m.ingested_at >= since)
                .cloned()
        }))
    }

    async fn insert_mention(&self, mention: ScoredMention) -> Result<(), AppError> {
        self.mentions
            .entry(mention.symbol.clone())
            .or_default()
            .push(mention);
        Ok(())
    }

    async fn mentions_since(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ScoredMention>, AppError> {
        let mut result: Vec<ScoredMention> = self
            .mentions
            .get(symbol)
            .map(|shard| {
                shard
                    .iter()
                    .filter(|m| m.published_at >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        result.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        Ok(result)
    }

    async fn purge_mentions_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let mut removed = 0u64;
        for mut shard in self.mentions.iter_mut() {
            let before = shard.len();
            shard.retain(|m| m.published_at >= cutoff);
            removed += (before - shard.len()) as u64;
        }
        Ok(removed)
    }

    async fn upsert_snapshot(&self, snapshot: AggregateSnapshot) -> Result<(), AppError> {
        let mut shard = self.snapshots.entry(snapshot.symbol.clone()).or_default();
        match shard
            .iter_mut()
            .find(|s| s.date == snapshot.date && s.hour == snapshot.hour)
        {
            Some(existing) => *existing = snapshot,
            None => shard.push(snapshot),
        }
        Ok(())
    }

    async fn snapshots_since(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<AggregateSnapshot>, AppError> {
        let mut result: Vec<AggregateSnapshot> = self
            .snapshots
            .get(symbol)
            .map(|shard| {
                shard
                    .iter()
                    .filter(|s| s.timestamp >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        result.sort_by(|a, b| (a.date, a.hour).cmp(&(b.date, b.hour)));
        Ok(result)
    }

    async fn insert_rule(&self, rule: AlertRule) -> Result<(), AppError> {
        self.rules.write().push(rule);
        Ok(())
    }

    async fn rule(&self, rule_id: Uuid) -> Result<Option<AlertRule>, AppError> {
        Ok(self.rules.read().iter().find(|r| r.id == rule_id).cloned())
    }

    async fn active_rules(&self, symbol: &str) -> Result<Vec<AlertRule>, AppError> {
        Ok(self
            .rules
            .read()
            .iter()
            .filter(|r| r.is_active && r.symbol == symbol)
            .cloned()
            .collect())
    }

    async fn set_rule_triggered(&self, rule_id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        let mut rules = self.rules.write();
        let rule = rules
            .iter_mut()
            .find(|r| r.id == rule_id)
            .ok_or(AppError::NotFound)?;
        rule.last_triggered_at = Some(at);
        Ok(())
    }

    async fn insert_alert_event(&self, event: AlertEvent) -> Result<(), AppError> {
        self.events.write().push(event);
        Ok(())
    }

    async fn resolve_alert_event(
        &self,
        event_id: Uuid,
        status: AlertEventStatus,
        sent_at: Option<DateTime<Utc>>,
        error: Option<String>,
    ) -> Result<(), AppError> {
        let mut events = self.events.write();
        let event = events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or(AppError::NotFound)?;
        event.status = status;
        event.sent_at = sent_at;
        event.error = error;
        Ok(())
    }

    async fn alert_events(&self, symbol: &str) -> Result<Vec<AlertEvent>, AppError> {
        Ok(self
            .events
            .read()
            .iter()
            .filter(|e| e.symbol == symbol)
            .cloned()
            .collect())
    }

    async fn insert_audit(&self, audit: PredictionAudit) -> Result<(), AppError> {
        self.audits.write().push(audit);
        Ok(())
    }

    async fn pending_audits(&self, limit: usize) -> Result<Vec<PredictionAudit>, AppError> {
        let mut pending: Vec<PredictionAudit> = self
            .audits
            .read()
            .iter()
            .filter(|a| a.status == crate::models::AuditStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.prediction_timestamp.cmp(&b.prediction_timestamp));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn update_audit(&self, audit: PredictionAudit) -> Result<(), AppError> {
        let mut audits = self.audits.write();
        let existing = audits
            .iter_mut()
            .find(|a| a.id == audit.id)
            .ok_or(AppError::NotFound)?;
        *existing = audit;
        Ok(())
    }

    async fn audits_for_symbol(&self, symbol: &str) -> Result<Vec<PredictionAudit>, AppError> {
        Ok(self
            .audits
            .read()
            .iter()
            .filter(|a| a.symbol == symbol)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SentimentLabel, SentimentTrend, SourceType};
    use chrono::Duration;

    fn mention(symbol: &str, external_id: Option<&str>, headline: &str) -> ScoredMention {
        ScoredMention {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            source: "news".to_string(),
            source_type: SourceType::News,
            provider: "news".to_string(),
            external_id: external_id.map(str::to_string),
            headline: headline.to_string(),
            content: headline.to_string(),
            url: None,
            sentiment_score: 0.2,
            sentiment_label: SentimentLabel::Positive,
            confidence: 0.6,
            model_breakdown: Vec::new(),
            signals: Vec::new(),
            quality_score: 0.5,
            freshness_minutes: Some(10),
            sample_size: 4,
            metadata: serde_json::Value::Null,
            published_at: Utc::now(),
            ingested_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_mentions_returned_newest_first() {
        let store = MemoryStore::new();
        let mut old = mention("TEST.NS", Some("a"), "old");
        old.published_at = Utc::now() - Duration::hours(3);
        let new = mention("TEST.NS", Some("b"), "new");

        store.insert_mention(old).await.unwrap();
        store.insert_mention(new).await.unwrap();

        let result = store
            .mentions_since("TEST.NS", Utc::now() - Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].headline, "new");
    }

    #[tokio::test]
    async fn test_snapshot_upsert_overwrites_same_hour() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let snapshot = AggregateSnapshot {
            symbol: "TEST.NS".to_string(),
            date: now.date_naive(),
            hour: 10,
            avg_sentiment: 0.1,
            avg_confidence: 0.5,
            total_mentions: 3,
            positive: 2,
            negative: 0,
            neutral: 1,
            source_breakdown: Default::default(),
            trend: SentimentTrend::Neutral,
            timestamp: now,
        };
        store.upsert_snapshot(snapshot.clone()).await.unwrap();

        let mut updated = snapshot;
        updated.avg_sentiment = 0.4;
        store.upsert_snapshot(updated).await.unwrap();

        let snapshots = store
            .snapshots_since("TEST.NS", now - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(snapshots.len(), 1);
        assert!((snapshots[0].avg_sentiment - 0.4).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_pending_audits_oldest_first_with_limit() {
        let store = MemoryStore::new();
        for age_hours in [1, 30, 10] {
            let audit = PredictionAudit {
                id: Uuid::new_v4(),
                symbol: "TEST.NS".to_string(),
                prediction_timestamp: Utc::now() - Duration::hours(age_hours),
                horizon_hours: 24,
                predicted_direction: crate::models::Direction::Bullish,
                predicted_change_percent: None,
                confidence: None,
                price_at_prediction: Some(100.0),
                status: crate::models::AuditStatus::Pending,
                actual_direction: None,
                actual_change_percent: None,
                evaluated_at: None,
            };
            store.insert_audit(audit).await.unwrap();
        }

        let pending = store.pending_audits(2).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending[0].prediction_timestamp <= pending[1].prediction_timestamp);
    }
}
