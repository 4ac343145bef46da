//! End-to-end pipeline scenarios: mentions in, scored aggregates out,
//! alert delivery against a real local HTTP endpoint, and prediction
//! audit reconciliation across the horizon.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

use stockpulse_core::config::{PipelineConfig, WatchedSymbol};
use stockpulse_core::errors::AppError;
use stockpulse_core::external::mailer::{Mailer, OutboundEmail, RecipientDirectory};
use stockpulse_core::external::mention_source::MentionSource;
use stockpulse_core::external::price_provider::{PriceProvider, PriceProviderError};
use stockpulse_core::models::{
    AlertChannel, AlertCondition, AlertEventStatus, AlertMetric, AlertOperator, AlertRule,
    AuditStatus, Candle, HistoryProvenance, MacdValue, PredictionResult, PriceTargets, Quote,
    RawMention, RiskLevel, SentimentAggregate, SentimentSnapshot, SentimentTrend, SourceType,
    TechnicalSnapshot, TradingSignal, TrendDirection,
};
use stockpulse_core::services::alerts::{AlertEngine, MetricContext};
use stockpulse_core::services::auditor::PredictionAuditor;
use stockpulse_core::services::scheduler::{scan_sentiment, PipelineContext};
use stockpulse_core::store::{MemoryStore, Store};

// ------------------------------------------------------------------------------
// Test collaborators
// ------------------------------------------------------------------------------

struct StaticProvider {
    history: Vec<Candle>,
    quote: Option<Quote>,
    fail_quotes: bool,
}

#[async_trait]
impl PriceProvider for StaticProvider {
    async fn fetch_history(
        &self,
        _symbol: &str,
        _days: u32,
    ) -> Result<Vec<Candle>, PriceProviderError> {
        Ok(self.history.clone())
    }

    async fn fetch_quote(&self, _symbol: &str) -> Result<Option<Quote>, PriceProviderError> {
        if self.fail_quotes {
            return Err(PriceProviderError::Network("connection refused".to_string()));
        }
        Ok(self.quote.clone())
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

/// Minimal HTTP responder: reads one request fully, answers 200.
async fn spawn_ok_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                loop {
                    match socket.read(&mut chunk).await {
                        Ok(0) => break,
                        Ok(n) => {
                            buf.extend_from_slice(&chunk[..n]);
                            if request_complete(&buf) {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                    )
                    .await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{}", addr)
}

fn request_complete(buf: &[u8]) -> bool {
    let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
        return false;
    };
    let headers = String::from_utf8_lossy(&buf[..header_end]);
    let content_length = headers
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())?
        })
        .unwrap_or(0);
    buf.len() >= header_end + 4 + content_length
}

// ------------------------------------------------------------------------------
// Fixtures
// ------------------------------------------------------------------------------

fn sentiment_rule(channel: AlertChannel) -> AlertRule {
    AlertRule {
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
        channel,
        cooldown_minutes: 60,
        is_active: true,
        last_triggered_at: None,
        created_at: Utc::now(),
    }
}

fn bearish_aggregate() -> SentimentAggregate {
    let mut aggregate = SentimentAggregate::empty("TEST.NS", 72, Utc::now());
    aggregate.avg_sentiment = -0.3;
    aggregate.total_mentions = 5;
    aggregate.negative_count = 5;
    aggregate.negative_percentage = 100;
    aggregate.trend = SentimentTrend::Bearish;
    aggregate.data_available = true;
    aggregate
}

fn strong_buy_prediction(timestamp: chrono::DateTime<Utc>) -> PredictionResult {
    PredictionResult {
        symbol: "TEST.NS".to_string(),
        signal: TradingSignal::StrongBuy,
        confidence: 80,
        risk_level: RiskLevel::Medium,
        price_targets: PriceTargets {
            target1: 110.0,
            target2: Some(120.0),
            stop_loss: 95.0,
        },
        recommendation: "Consider buying TEST.NS.".to_string(),
        rationale: vec!["RSI oversold".to_string()],
        technical: TechnicalSnapshot {
            rsi: 28.0,
            macd: MacdValue {
                line: 1.0,
                signal: 0.5,
                histogram: 0.5,
            },
            ma20: 100.0,
            ma50: 99.0,
            ma200: 95.0,
            support: 90.0,
            resistance: 110.0,
            trend: TrendDirection::Uptrend,
            reasons: vec![],
        },
        sentiment: SentimentSnapshot {
            score: 0.4,
            total_mentions: 12,
            positive_percent: 70,
            negative_percent: 10,
            trend: SentimentTrend::VeryBullish,
        },
        history_provenance: HistoryProvenance::Real,
        timestamp,
    }
}

fn quote(price: f64) -> Quote {
    Quote {
        symbol: "TEST.NS".to_string(),
        current_price: price,
        previous_close: price,
        change: 0.0,
        change_percent: 0.0,
        volume: 1000.0,
        day_high: price,
        day_low: price,
        last_updated: Utc::now(),
    }
}

// ------------------------------------------------------------------------------
// Alert delivery scenarios
// ------------------------------------------------------------------------------

#[tokio::test]
async fn webhook_alert_delivers_and_starts_cooldown() {
    let endpoint = spawn_ok_endpoint().await;
    let store = Arc::new(MemoryStore::new());

    let rule = sentiment_rule(AlertChannel::Webhook { url: endpoint });
    let rule_id = rule.id;
    store.insert_rule(rule).await.unwrap();

    let engine = AlertEngine::new(
        store.clone(),
        Arc::new(NullMailer),
        Arc::new(EmptyDirectory),
    );
    let fired = engine
        .evaluate("TEST.NS", Some(&bearish_aggregate()), &MetricContext::new())
        .await
        .unwrap();

    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].status, AlertEventStatus::Sent);
    assert!(fired[0].sent_at.is_some());

    let events = store.alert_events("TEST.NS").await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, AlertEventStatus::Sent);

    let stored_rule = store.rule(rule_id).await.unwrap().unwrap();
    assert!(stored_rule.last_triggered_at.is_some());
}

#[tokio::test]
async fn webhook_alert_against_dead_endpoint_fails_without_blocking() {
    let store = Arc::new(MemoryStore::new());
    // Nothing listens on this port
    let rule = sentiment_rule(AlertChannel::Webhook {
        url: "http://127.0.0.1:9".to_string(),
    });
    let rule_id = rule.id;
    store.insert_rule(rule).await.unwrap();

    let engine = AlertEngine::new(
        store.clone(),
        Arc::new(NullMailer),
        Arc::new(EmptyDirectory),
    );
    let fired = engine
        .evaluate("TEST.NS", Some(&bearish_aggregate()), &MetricContext::new())
        .await
        .unwrap();

    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].status, AlertEventStatus::Failed);
    assert!(fired[0].error.is_some());

    // Failed dispatch does not start the cooldown
    let stored_rule = store.rule(rule_id).await.unwrap().unwrap();
    assert!(stored_rule.last_triggered_at.is_none());
}

#[tokio::test]
async fn email_alert_without_recipient_records_failure() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_rule(sentiment_rule(AlertChannel::Email { destination: None }))
        .await
        .unwrap();

    let engine = AlertEngine::new(
        store.clone(),
        Arc::new(NullMailer),
        Arc::new(EmptyDirectory),
    );
    let fired = engine
        .evaluate("TEST.NS", Some(&bearish_aggregate()), &MetricContext::new())
        .await
        .unwrap();

    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].status, AlertEventStatus::Failed);
    assert_eq!(fired[0].error.as_deref(), Some("No recipient for email"));
}

// ------------------------------------------------------------------------------
// Audit reconciliation scenarios
// ------------------------------------------------------------------------------

#[tokio::test]
async fn strong_buy_matches_after_bullish_move() {
    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(StaticProvider {
        history: Vec::new(),
        quote: Some(quote(101.5)),
        fail_quotes: false,
    });
    let auditor = PredictionAuditor::new(store.clone(), provider);

    // Prediction made 25 hours ago at 100.0; price is now +1.5%
    auditor
        .record(
            "TEST.NS",
            &strong_buy_prediction(Utc::now() - Duration::hours(25)),
            Some(100.0),
            24,
        )
        .await
        .unwrap();

    let summary = auditor.reconcile().await.unwrap();
    assert_eq!(summary.evaluated, 1);
    assert_eq!(summary.matched, 1);

    let audits = store.audits_for_symbol("TEST.NS").await.unwrap();
    assert_eq!(audits[0].status, AuditStatus::Matched);
    assert_eq!(
        audits[0].actual_direction,
        Some(stockpulse_core::models::Direction::Bullish)
    );
    assert!(audits[0].evaluated_at.is_some());
}

#[tokio::test]
async fn audit_inside_horizon_stays_pending() {
    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(StaticProvider {
        history: Vec::new(),
        quote: Some(quote(150.0)),
        fail_quotes: false,
    });
    let auditor = PredictionAuditor::new(store.clone(), provider);

    auditor
        .record(
            "TEST.NS",
            &strong_buy_prediction(Utc::now() - Duration::hours(2)),
            Some(100.0),
            24,
        )
        .await
        .unwrap();

    let summary = auditor.reconcile().await.unwrap();
    assert_eq!(summary.evaluated, 0);
    let audits = store.audits_for_symbol("TEST.NS").await.unwrap();
    assert_eq!(audits[0].status, AuditStatus::Pending);
}

#[tokio::test]
async fn audit_without_baseline_is_missed_immediately() {
    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(StaticProvider {
        history: Vec::new(),
        quote: Some(quote(150.0)),
        fail_quotes: false,
    });
    let auditor = PredictionAuditor::new(store.clone(), provider);

    auditor
        .record(
            "TEST.NS",
            &strong_buy_prediction(Utc::now() - Duration::hours(25)),
            None,
            24,
        )
        .await
        .unwrap();

    auditor.reconcile().await.unwrap();
    let audits = store.audits_for_symbol("TEST.NS").await.unwrap();
    assert_eq!(audits[0].status, AuditStatus::Missed);
}

#[tokio::test]
async fn audit_with_failing_price_fetch_is_retried_later() {
    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(StaticProvider {
        history: Vec::new(),
        quote: None,
        fail_quotes: true,
    });
    let auditor = PredictionAuditor::new(store.clone(), provider);

    auditor
        .record(
            "TEST.NS",
            &strong_buy_prediction(Utc::now() - Duration::hours(25)),
            Some(100.0),
            24,
        )
        .await
        .unwrap();

    let summary = auditor.reconcile().await.unwrap();
    assert_eq!(summary.evaluated, 0);

    // Left pending for the next pass
    let audits = store.audits_for_symbol("TEST.NS").await.unwrap();
    assert_eq!(audits[0].status, AuditStatus::Pending);
}

// ------------------------------------------------------------------------------
// Full pipeline: mentions → aggregate → prediction → audit trail
// ------------------------------------------------------------------------------

struct TwoStorySource;

#[async_trait]
impl MentionSource for TwoStorySource {
    async fn fetch_mentions(&self, _symbol: &str, _company_name: &str) -> Vec<RawMention> {
        let mut upgrade = RawMention::new(
            "Broker upgrade on record profits",
            "Broker upgrade on record profits and strong demand, stock near record high",
            SourceType::News,
        );
        upgrade.external_id = Some("n1".to_string());
        upgrade.published_at = Some(Utc::now() - Duration::minutes(20));

        let mut chatter = RawMention::new(
            "Strong demand holds",
            "Sustained rally with robust gains and growth momentum",
            SourceType::Social,
        );
        chatter.external_id = Some("s1".to_string());
        chatter.published_at = Some(Utc::now() - Duration::minutes(10));

        vec![upgrade, chatter]
    }
}

#[tokio::test]
async fn mentions_flow_through_to_prediction_and_audit() {
    let store = Arc::new(MemoryStore::new());
    let history: Vec<Candle> = (0..40)
        .map(|i| Candle {
            timestamp: Utc::now() - Duration::days(40 - i as i64),
            open: 100.0 + i as f64,
            high: 101.0 + i as f64,
            low: 99.0 + i as f64,
            close: 100.0 + i as f64,
            volume: 5000.0,
        })
        .collect();
    let provider = Arc::new(StaticProvider {
        history,
        quote: Some(quote(140.0)),
        fail_quotes: false,
    });

    let mut config = PipelineConfig::from_env();
    config.watched = vec![WatchedSymbol::new("TEST.NS", "Test Industries")];
    config.inter_symbol_delay = std::time::Duration::from_millis(0);

    let ctx = PipelineContext::new(
        config,
        store.clone(),
        Arc::new(TwoStorySource),
        provider,
        Arc::new(NullMailer),
        Arc::new(EmptyDirectory),
    );

    // One full scan cycle: fetch, score, persist, aggregate, alerts
    scan_sentiment(ctx.clone()).await.unwrap();

    let aggregate = ctx.aggregator.aggregate("TEST.NS", 72).await.unwrap();
    assert!(aggregate.data_available);
    assert_eq!(aggregate.total_mentions, 2);
    assert!(aggregate.avg_sentiment > 0.0);
    assert!(!aggregate.latest_signals.is_empty());

    let prediction = ctx.synthesizer().predict("TEST.NS").await.unwrap();
    assert_eq!(prediction.history_provenance, HistoryProvenance::Real);
    assert!((55..=95).contains(&prediction.confidence));
    assert_eq!(prediction.sentiment.total_mentions, 2);

    let audits = store.audits_for_symbol("TEST.NS").await.unwrap();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].status, AuditStatus::Pending);
    assert_eq!(audits[0].price_at_prediction, Some(140.0));
}
