use crate::config::PipelineConfig;
use crate::errors::AppError;
use crate::external::mailer::{Mailer, RecipientDirectory};
use crate::external::mention_source::MentionSource;
use crate::external::price_provider::PriceProvider;
use crate::models::Quote;
use crate::services::aggregator::SentimentAggregator;
use crate::services::alerts::{AlertEngine, MetricContext};
use crate::services::auditor::PredictionAuditor;
use crate::services::ensemble::EnsembleScorer;
use crate::services::predictor::SignalSynthesizer;
use crate::store::Store;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

// ==============================================================================
// Price cache
// ==============================================================================

struct CachedQuote {
    quote: Quote,
    stored_at: Instant,
}

/// TTL-stamped quote cache owned by the scheduler and read by the
/// signal synthesizer.
pub struct PriceCache {
    entries: DashMap<String, CachedQuote>,
    ttl: Duration,
}

impl PriceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn put(&self, quote: Quote) {
        self.entries.insert(
            quote.symbol.clone(),
            CachedQuote {
                quote,
                stored_at: Instant::now(),
            },
        );
    }

    /// Fresh entries only; stale quotes fall through to a live fetch.
    pub fn get(&self, symbol: &str) -> Option<Quote> {
        self.entries.get(symbol).and_then(|cached| {
            if cached.stored_at.elapsed() < self.ttl {
                Some(cached.quote.clone())
            } else {
                None
            }
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==============================================================================
// Scheduler
// ==============================================================================

/// Everything a periodic job needs, cloned into each job closure.
#[derive(Clone)]
pub struct PipelineContext {
    pub config: Arc<PipelineConfig>,
    pub mention_source: Arc<dyn MentionSource>,
    pub price_provider: Arc<dyn PriceProvider>,
    pub aggregator: Arc<SentimentAggregator>,
    pub alert_engine: Arc<AlertEngine>,
    pub auditor: Arc<PredictionAuditor>,
    pub price_cache: Arc<PriceCache>,
    pub refresh_in_progress: Arc<AtomicBool>,
}

impl PipelineContext {
    /// Wire the full pipeline from the config and the external
    /// collaborators. This is the composition root: the aggregator and
    /// the alert engine are connected here, not to each other.
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn Store>,
        mention_source: Arc<dyn MentionSource>,
        price_provider: Arc<dyn PriceProvider>,
        mailer: Arc<dyn Mailer>,
        directory: Arc<dyn RecipientDirectory>,
    ) -> Self {
        let scorer = Arc::new(EnsembleScorer::new(config.finbert_api_key.clone()));
        let aggregator = Arc::new(SentimentAggregator::new(store.clone(), scorer));
        let alert_engine = Arc::new(AlertEngine::new(store.clone(), mailer, directory));
        let auditor = Arc::new(PredictionAuditor::new(store, price_provider.clone()));
        let price_cache = Arc::new(PriceCache::new(config.price_cache_ttl));

        Self {
            config: Arc::new(config),
            mention_source,
            price_provider,
            aggregator,
            alert_engine,
            auditor,
            price_cache,
            refresh_in_progress: Arc::new(AtomicBool::new(false)),
        }
    }

    /// On-demand signal synthesizer reading this pipeline's price cache.
    pub fn synthesizer(&self) -> SignalSynthesizer {
        SignalSynthesizer::new(
            self.aggregator.clone(),
            self.auditor.clone(),
            self.price_provider.clone(),
            self.price_cache.clone(),
            self.config.aggregate_window_hours,
            self.config.prediction_horizon_hours,
        )
    }
}

/// Owns the periodic schedules driving the pipeline and the price cache
/// they feed. No module-global state: every instance is isolated, and
/// start/stop are idempotent.
pub struct PipelineScheduler {
    scheduler: JobScheduler,
    context: PipelineContext,
    started: bool,
}

impl PipelineScheduler {
    pub async fn new(context: PipelineContext) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::External(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self {
            scheduler,
            context,
            started: false,
        })
    }

    pub fn price_cache(&self) -> Arc<PriceCache> {
        self.context.price_cache.clone()
    }

    /// Start the three pipeline schedules. Calling start on a running
    /// scheduler is a no-op.
    pub async fn start(&mut self) -> Result<(), AppError> {
        if self.started {
            warn!("⚠️ Pipeline scheduler already running");
            return Ok(());
        }

        let sentiment_schedule = self.context.config.sentiment_scan_schedule.clone();
        let price_schedule = self.context.config.price_refresh_schedule.clone();
        let audit_schedule = self.context.config.audit_sweep_schedule.clone();

        self.schedule_job(&sentiment_schedule, "sentiment_scan", scan_sentiment)
            .await?;
        self.schedule_job(&price_schedule, "price_refresh", refresh_prices)
            .await?;
        self.schedule_job(&audit_schedule, "audit_sweep", sweep_audits)
            .await?;

        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::External(format!("Failed to start scheduler: {}", e)))?;

        self.started = true;
        info!("🚀 Pipeline scheduler started with 3 jobs");
        Ok(())
    }

    /// Stop the schedules. Safe to call when never started.
    pub async fn stop(&mut self) -> Result<(), AppError> {
        if !self.started {
            return Ok(());
        }

        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::External(format!("Failed to stop scheduler: {}", e)))?;
        self.started = false;
        info!("🛑 Pipeline scheduler stopped");
        Ok(())
    }

    async fn schedule_job<F, Fut>(
        &mut self,
        schedule: &str,
        job_name: &'static str,
        job_fn: F,
    ) -> Result<(), AppError>
    where
        F: Fn(PipelineContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), AppError>> + Send + 'static,
    {
        let context = self.context.clone();
        let job_fn = Arc::new(job_fn);

        let job = Job::new_async(schedule, move |_uuid, _l| {
            let context = context.clone();
            let job_fn = job_fn.clone();
            Box::pin(async move {
                if let Err(e) = job_fn(context).await {
                    error!("❌ Job failed: {} - {}", job_name, e);
                }
            })
        })
        .map_err(|e| AppError::External(format!("Failed to create job {}: {}", job_name, e)))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::External(format!("Failed to add job {}: {}", job_name, e)))?;

        info!("📅 Scheduled: {} [cron: {}]", job_name, schedule);
        Ok(())
    }
}

// ==============================================================================
// Job bodies
// ==============================================================================

/// One sentiment scan cycle: per instrument, fetch mentions, score and
/// persist them, aggregate, and run sentiment alerts. Instruments are
/// processed sequentially with a delay between them as a throttle
/// against upstream rate limits; one instrument's failure never stops
/// the cycle.
pub async fn scan_sentiment(ctx: PipelineContext) -> Result<(), AppError> {
    info!(
        "🔍 Scanning sentiment for {} instruments...",
        ctx.config.watched.len()
    );

    for instrument in &ctx.config.watched {
        let mentions = ctx
            .mention_source
            .fetch_mentions(&instrument.symbol, &instrument.name)
            .await;

        if let Err(e) = ctx
            .aggregator
            .process_mentions(&instrument.symbol, mentions)
            .await
        {
            warn!("Mention processing failed for {}: {}", instrument.symbol, e);
        }

        match ctx
            .aggregator
            .aggregate(&instrument.symbol, ctx.config.aggregate_window_hours)
            .await
        {
            Ok(aggregate) => {
                if let Err(e) = ctx
                    .alert_engine
                    .evaluate(&instrument.symbol, Some(&aggregate), &MetricContext::new())
                    .await
                {
                    warn!("Alert evaluation failed for {}: {}", instrument.symbol, e);
                }
            }
            Err(e) => warn!("Aggregation failed for {}: {}", instrument.symbol, e),
        }

        tokio::time::sleep(ctx.config.inter_symbol_delay).await;
    }

    ctx.aggregator
        .purge_older_than(ctx.config.mention_retention_days)
        .await?;
    Ok(())
}

/// One price refresh tick: pull quotes into the cache and evaluate
/// price-based alert rules with a generic metric context. Skips the
/// tick entirely if the previous one is still running.
pub async fn refresh_prices(ctx: PipelineContext) -> Result<(), AppError> {
    if ctx.refresh_in_progress.swap(true, Ordering::SeqCst) {
        return Ok(());
    }
    let result = refresh_prices_inner(&ctx).await;
    ctx.refresh_in_progress.store(false, Ordering::SeqCst);
    result
}

async fn refresh_prices_inner(ctx: &PipelineContext) -> Result<(), AppError> {
    for instrument in &ctx.config.watched {
        match ctx.price_provider.fetch_quote(&instrument.symbol).await {
            Ok(Some(quote)) if quote.current_price > 0.0 => {
                let mut context = MetricContext::new();
                context.insert("price_change".to_string(), quote.change);
                context.insert("change_percent".to_string(), quote.change_percent);
                context.insert("current_price".to_string(), quote.current_price);
                ctx.price_cache.put(quote);

                if let Err(e) = ctx
                    .alert_engine
                    .evaluate(&instrument.symbol, None, &context)
                    .await
                {
                    warn!("Price alert evaluation failed for {}: {}", instrument.symbol, e);
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Quote refresh failed for {}: {}", instrument.symbol, e),
        }
    }
    Ok(())
}

/// Hourly reconciliation sweep for pending prediction audits.
pub async fn sweep_audits(ctx: PipelineContext) -> Result<(), AppError> {
    ctx.auditor.reconcile().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WatchedSymbol;
    use crate::external::mailer::{Mailer, OutboundEmail, RecipientDirectory};
    use crate::external::price_provider::PriceProviderError;
    use crate::models::{
        AlertChannel, AlertCondition, AlertMetric, AlertOperator, AlertRule, RawMention,
        SourceType,
    };
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use uuid::Uuid;

    struct EmptySource;

    #[async_trait]
    impl MentionSource for EmptySource {
        async fn fetch_mentions(&self, _symbol: &str, _company_name: &str) -> Vec<RawMention> {
            Vec::new()
        }
    }

    struct OneStorySource;

    #[async_trait]
    impl MentionSource for OneStorySource {
        async fn fetch_mentions(&self, _symbol: &str, _company_name: &str) -> Vec<RawMention> {
            let mut mention = RawMention::new(
                "Fraud probe triggers selloff",
                "Fraud probe triggers selloff after downgrade and missed estimates",
                SourceType::News,
            );
            mention.external_id = Some("story-1".to_string());
            mention.published_at = Some(Utc::now());
            vec![mention]
        }
    }

    struct QuietProvider;

    #[async_trait]
    impl PriceProvider for QuietProvider {
        async fn fetch_history(
            &self,
            _symbol: &str,
            _days: u32,
        ) -> Result<Vec<crate::models::Candle>, PriceProviderError> {
            Ok(Vec::new())
        }

        async fn fetch_quote(&self, symbol: &str) -> Result<Option<Quote>, PriceProviderError> {
            Ok(Some(Quote {
                symbol: symbol.to_string(),
                current_price: 100.0,
                previous_close: 96.0,
                change: 4.0,
                change_percent: 4.17,
                volume: 1000.0,
                day_high: 101.0,
                day_low: 95.0,
                last_updated: Utc::now(),
            }))
        }
    }

    struct NullMailer;

    #[async_trait]
    impl Mailer for NullMailer {
        async fn send(&self, _email: OutboundEmail) -> Result<(), AppError> {
            Ok(())
        }
    }

    struct EmptyDirectory;

    #[async_trait]
    impl RecipientDirectory for EmptyDirectory {
        async fn email_for(&self, _owner: &str) -> Option<String> {
            None
        }
    }

    fn context(
        store: Arc<MemoryStore>,
        source: Arc<dyn MentionSource>,
    ) -> PipelineContext {
        let mut config = PipelineConfig::from_env();
        config.watched = vec![WatchedSymbol::new("TEST.NS", "Test Industries")];
        config.inter_symbol_delay = Duration::from_millis(0);

        PipelineContext::new(
            config,
            store,
            source,
            Arc::new(QuietProvider),
            Arc::new(NullMailer),
            Arc::new(EmptyDirectory),
        )
    }

    #[test]
    fn test_price_cache_fresh_and_stale() {
        let cache = PriceCache::new(Duration::from_secs(60));
        assert!(cache.is_empty());

        let quote = Quote {
            symbol: "TEST.NS".to_string(),
            current_price: 10.0,
            previous_close: 9.0,
            change: 1.0,
            change_percent: 11.1,
            volume: 1.0,
            day_high: 10.0,
            day_low: 9.0,
            last_updated: Utc::now(),
        };
        cache.put(quote.clone());
        assert_eq!(cache.len(), 1);
        assert!(cache.get("TEST.NS").is_some());
        assert!(cache.get("OTHER.NS").is_none());

        let expiring = PriceCache::new(Duration::from_millis(0));
        expiring.put(quote);
        assert!(expiring.get("TEST.NS").is_none());
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let mut scheduler = PipelineScheduler::new(context(store, Arc::new(EmptySource)))
            .await
            .unwrap();

        // stop before start is a no-op
        scheduler.stop().await.unwrap();

        scheduler.start().await.unwrap();
        scheduler.start().await.unwrap();

        scheduler.stop().await.unwrap();
        scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_scan_cycle_persists_and_alerts() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_rule(AlertRule {
                id: Uuid::new_v4(),
                owner: "owner-1".to_string(),
                name: "bearish swing".to_string(),
                symbol: "TEST.NS".to_string(),
                condition: AlertCondition {
                    metric: AlertMetric::Sentiment,
                    operator: AlertOperator::Lt,
                    threshold: -0.1,
                    min_mentions: 1,
                    lookback_hours: 72,
                },
                channel: AlertChannel::InApp,
                cooldown_minutes: 60,
                is_active: true,
                last_triggered_at: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        scan_sentiment(context(store.clone(), Arc::new(OneStorySource)))
            .await
            .unwrap();

        let mentions = store
            .mentions_since("TEST.NS", Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(mentions.len(), 1);

        let events = store.alert_events("TEST.NS").await.unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_price_refresh_fills_cache_and_evaluates_rules() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_rule(AlertRule {
                id: Uuid::new_v4(),
                owner: "owner-1".to_string(),
                name: "big move".to_string(),
                symbol: "TEST.NS".to_string(),
                condition: AlertCondition {
                    metric: AlertMetric::PriceChange,
                    operator: AlertOperator::Gt,
                    threshold: 2.0,
                    min_mentions: 0,
                    lookback_hours: 24,
                },
                channel: AlertChannel::InApp,
                cooldown_minutes: 60,
                is_active: true,
                last_triggered_at: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let ctx = context(store.clone(), Arc::new(EmptySource));
        refresh_prices(ctx.clone()).await.unwrap();

        assert!(ctx.price_cache.get("TEST.NS").is_some());
        let events = store.alert_events("TEST.NS").await.unwrap();
        assert_eq!(events.len(), 1);
    }
}
