mod memory;

pub use memory::MemoryStore;

use crate::errors::AppError;
use crate::models::{
    AggregateSnapshot, AlertEvent, AlertEventStatus, AlertRule, PredictionAudit, ScoredMention,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Durable-store collaborator for everything the pipeline persists.
/// The schema and wire-level persistence live outside this crate; tests
/// and embedders without a database use [`MemoryStore`].
#[async_trait]
pub trait Store: Send + Sync {
    // --- scored mentions -------------------------------------------------

    async fn find_mention_by_external_id(
        &self,
        symbol: &str,
        external_id: &str,
    ) -> Result<Option<ScoredMention>, AppError>;

    /// Headline-based dedup lookup, bounded to mentions published after
    /// `since`.
    async fn find_mention_by_headline_since(
        &self,
        symbol: &str,
        headline: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<ScoredMention>, AppError>;

    async fn insert_mention(&self, mention: ScoredMention) -> Result<(), AppError>;

    /// Mentions for a symbol published after `since`, newest first.
    async fn mentions_since(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ScoredMention>, AppError>;

    /// Retention sweep; returns the number of deleted records.
    async fn purge_mentions_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;

    // --- aggregate snapshots ---------------------------------------------

    /// Upsert keyed on `(symbol, date, hour)`.
    async fn upsert_snapshot(&self, snapshot: AggregateSnapshot) -> Result<(), AppError>;

    /// Snapshots for a symbol after `since`, in chronological order.
    async fn snapshots_since(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<AggregateSnapshot>, AppError>;

    // --- alert rules and events ------------------------------------------

    async fn insert_rule(&self, rule: AlertRule) -> Result<(), AppError>;

    async fn rule(&self, rule_id: Uuid) -> Result<Option<AlertRule>, AppError>;

    async fn active_rules(&self, symbol: &str) -> Result<Vec<AlertRule>, AppError>;

    async fn set_rule_triggered(&self, rule_id: Uuid, at: DateTime<Utc>) -> Result<(), AppError>;

    async fn insert_alert_event(&self, event: AlertEvent) -> Result<(), AppError>;

    /// Transition a queued event to sent or failed; exactly once.
    async fn resolve_alert_event(
        &self,
        event_id: Uuid,
        status: AlertEventStatus,
        sent_at: Option<DateTime<Utc>>,
        error: Option<String>,
    ) -> Result<(), AppError>;

    async fn alert_events(&self, symbol: &str) -> Result<Vec<AlertEvent>, AppError>;

    // --- prediction audits ------------------------------------------------

    async fn insert_audit(&self, audit: PredictionAudit) -> Result<(), AppError>;

    /// Pending audits, oldest first, at most `limit`.
    async fn pending_audits(&self, limit: usize) -> Result<Vec<PredictionAudit>, AppError>;

    async fn update_audit(&self, audit: PredictionAudit) -> Result<(), AppError>;

    async fn audits_for_symbol(&self, symbol: &str) -> Result<Vec<PredictionAudit>, AppError>;
}
