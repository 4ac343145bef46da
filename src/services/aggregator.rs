use crate::errors::AppError;
use crate::models::{
    AggregateSnapshot, RawMention, ScoredMention, SentimentAggregate, SentimentTrend, SignalHint,
    SourceType,
};
use crate::services::ensemble::{EnsembleAnalysis, EnsembleScorer};
use crate::services::round_to;
use crate::store::Store;
use chrono::{Duration, Timelike, Utc};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Mentions for one symbol are scored with this fan-out; persistence
/// stays sequential so the dedup check reads its own writes.
const SCORE_CONCURRENCY: usize = 4;
const MAX_CONTENT_CHARS: usize = 4000;
const MAX_LATEST_SIGNALS: usize = 8;
const HEADLINE_DEDUP_HOURS: i64 = 24;

/// Deduplicates, scores and persists raw mentions, and computes
/// rolling-window aggregates with trend and freshness metadata.
pub struct SentimentAggregator {
    store: Arc<dyn Store>,
    scorer: Arc<EnsembleScorer>,
}

impl SentimentAggregator {
    pub fn new(store: Arc<dyn Store>, scorer: Arc<EnsembleScorer>) -> Self {
        Self { store, scorer }
    }

    /// Ingest a batch of raw mentions for `symbol`. Duplicate entries
    /// (by external id, or by headline within a 24h window) are skipped
    /// silently; ingestion is idempotent.
    pub async fn process_mentions(
        &self,
        symbol: &str,
        entries: Vec<RawMention>,
    ) -> Result<Vec<ScoredMention>, AppError> {
        // In-batch dedup by external id before scoring anything
        let mut seen = HashSet::new();
        let unique: Vec<RawMention> = entries
            .into_iter()
            .filter(|entry| match &entry.external_id {
                Some(id) => seen.insert(id.clone()),
                None => true,
            })
            .collect();

        let scorer = self.scorer.clone();
        let scored: Vec<(RawMention, Option<EnsembleAnalysis>)> = stream::iter(unique)
            .map(|entry| {
                let scorer = scorer.clone();
                async move {
                    let text = if entry.text.trim().is_empty() {
                        entry.title.clone()
                    } else {
                        entry.text.clone()
                    };
                    let analysis = scorer.analyze(&text).await;
                    (entry, analysis)
                }
            })
            .buffer_unordered(SCORE_CONCURRENCY)
            .collect()
            .await;

        let mut saved = Vec::new();
        for (entry, analysis) in scored {
            let Some(analysis) = analysis else { continue };
            if let Some(record) = self.persist(symbol, entry, analysis).await? {
                saved.push(record);
            }
        }

        info!(
            "✅ Processed {} sentiment datapoints for {}",
            saved.len(),
            symbol
        );
        Ok(saved)
    }

    async fn persist(
        &self,
        symbol: &str,
        entry: RawMention,
        analysis: EnsembleAnalysis,
    ) -> Result<Option<ScoredMention>, AppError> {
        let existing = match &entry.external_id {
            Some(id) => self.store.find_mention_by_external_id(symbol, id).await?,
            None => {
                let since = Utc::now() - Duration::hours(HEADLINE_DEDUP_HOURS);
                self.store
                    .find_mention_by_headline_since(symbol, &entry.title, since)
                    .await?
            }
        };
        if existing.is_some() {
            return Ok(None);
        }

        let now = Utc::now();
        let published_at = entry.published_at.unwrap_or(now);
        let freshness_minutes = entry
            .published_at
            .map(|at| (now - at).num_minutes().max(0));
        let quality_score = compute_quality_score(&entry, &analysis);
        let content: String = entry.text.chars().take(MAX_CONTENT_CHARS).collect();
        let sample_size = content.split_whitespace().count().max(1);

        let record = ScoredMention {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            source: entry.source,
            source_type: entry.source_type,
            provider: entry.provider,
            external_id: entry.external_id,
            headline: entry.title,
            content,
            url: entry.url,
            sentiment_score: analysis.sentiment_score,
            sentiment_label: analysis.sentiment_label,
            confidence: analysis.confidence,
            model_breakdown: analysis.model_breakdown,
            signals: analysis.signals,
            quality_score,
            freshness_minutes,
            sample_size,
            metadata: entry.metadata,
            published_at,
            ingested_at: now,
        };
        self.store.insert_mention(record.clone()).await?;
        Ok(Some(record))
    }

    /// Summarize the trailing `window_hours` of scored mentions. A window
    /// with no records yields a zeroed aggregate with
    /// `data_available = false`, never an error. Each successful call
    /// also upserts the hour-bucketed history snapshot.
    pub async fn aggregate(
        &self,
        symbol: &str,
        window_hours: i64,
    ) -> Result<SentimentAggregate, AppError> {
        let window_start = Utc::now() - Duration::hours(window_hours);
        let mentions = self.store.mentions_since(symbol, window_start).await?;

        if mentions.is_empty() {
            return Ok(SentimentAggregate::empty(symbol, window_hours, window_start));
        }

        let n = mentions.len() as f64;
        let avg_sentiment = mentions.iter().map(|m| m.sentiment_score).sum::<f64>() / n;
        let avg_confidence = mentions.iter().map(|m| m.confidence).sum::<f64>() / n;

        let positive_count = mentions
            .iter()
            .filter(|m| m.sentiment_label == crate::models::SentimentLabel::Positive)
            .count();
        let negative_count = mentions
            .iter()
            .filter(|m| m.sentiment_label == crate::models::SentimentLabel::Negative)
            .count();
        let neutral_count = mentions.len() - positive_count - negative_count;

        let mut source_breakdown: HashMap<SourceType, usize> = HashMap::new();
        for mention in &mentions {
            *source_breakdown.entry(mention.source_type).or_default() += 1;
        }

        let avg_freshness = mentions
            .iter()
            .map(|m| m.freshness_minutes.unwrap_or(60) as f64)
            .sum::<f64>()
            / n;

        // Mentions arrive newest first, so this is the freshest evidence
        let latest_signals: Vec<SignalHint> = mentions
            .iter()
            .flat_map(|m| m.signals.iter().cloned())
            .take(MAX_LATEST_SIGNALS)
            .collect();

        let aggregate = SentimentAggregate {
            symbol: symbol.to_string(),
            window_start,
            window_hours,
            avg_sentiment: round_to(avg_sentiment, 4),
            avg_confidence: round_to(avg_confidence, 3),
            total_mentions: mentions.len(),
            positive_count,
            negative_count,
            neutral_count,
            positive_percentage: percentage(positive_count, mentions.len()),
            negative_percentage: percentage(negative_count, mentions.len()),
            neutral_percentage: percentage(neutral_count, mentions.len()),
            source_breakdown,
            trend: determine_trend(avg_sentiment),
            freshness_minutes: avg_freshness.round() as i64,
            latest_signals,
            data_available: true,
        };

        self.record_snapshot(&aggregate).await?;
        Ok(aggregate)
    }

    async fn record_snapshot(&self, aggregate: &SentimentAggregate) -> Result<(), AppError> {
        let now = Utc::now();
        self.store
            .upsert_snapshot(AggregateSnapshot {
                symbol: aggregate.symbol.clone(),
                date: now.date_naive(),
                hour: now.hour(),
                avg_sentiment: aggregate.avg_sentiment,
                avg_confidence: aggregate.avg_confidence,
                total_mentions: aggregate.total_mentions,
                positive: aggregate.positive_count,
                negative: aggregate.negative_count,
                neutral: aggregate.neutral_count,
                source_breakdown: aggregate.source_breakdown.clone(),
                trend: aggregate.trend,
                timestamp: now,
            })
            .await
    }

    /// Hour-bucketed aggregate history over the trailing `days`.
    pub async fn history(
        &self,
        symbol: &str,
        days: i64,
    ) -> Result<Vec<AggregateSnapshot>, AppError> {
        let since = Utc::now() - Duration::days(days);
        self.store.snapshots_since(symbol, since).await
    }

    /// Drop scored mentions older than `days`.
    pub async fn purge_older_than(&self, days: i64) -> Result<u64, AppError> {
        let cutoff = Utc::now() - Duration::days(days);
        let removed = self.store.purge_mentions_before(cutoff).await?;
        if removed > 0 {
            info!("🗑️ Cleaned {} old sentiment records", removed);
        }
        Ok(removed)
    }
}

fn percentage(count: usize, total: usize) -> i64 {
    ((count as f64 / total as f64) * 100.0).round() as i64
}

/// Ties resolve to the weaker bucket: exactly 0.3/0.1 do not promote.
pub fn determine_trend(avg_sentiment: f64) -> SentimentTrend {
    if avg_sentiment > 0.3 {
        SentimentTrend::VeryBullish
    } else if avg_sentiment > 0.1 {
        SentimentTrend::Bullish
    } else if avg_sentiment < -0.3 {
        SentimentTrend::VeryBearish
    } else if avg_sentiment < -0.1 {
        SentimentTrend::Bearish
    } else {
        SentimentTrend::Neutral
    }
}

fn compute_quality_score(entry: &RawMention, analysis: &EnsembleAnalysis) -> f64 {
    let mut score: f64 = 0.5;
    match entry.source_type {
        SourceType::News => score += 0.1,
        SourceType::Transcript => score += 0.15,
        _ => {}
    }
    if let Some(likes) = entry
        .metadata
        .pointer("/metrics/like_count")
        .and_then(|v| v.as_f64())
    {
        score += (likes / 1000.0).min(0.1);
    }
    if let Some(engagement) = entry.metadata.get("score").and_then(|v| v.as_f64()) {
        score += (engagement / 100.0).min(0.1);
    }
    score += analysis.confidence * 0.2;
    score.clamp(0.0, 1.0)
}
