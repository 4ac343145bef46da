use crate::errors::AppError;
use crate::external::mailer::{Mailer, OutboundEmail, RecipientDirectory};
use crate::models::{
    AlertChannel, AlertEvent, AlertEventStatus, AlertMetric, AlertRule, SentimentAggregate,
};
use crate::store::Store;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Bounded timeout for the outbound webhook POST.
const WEBHOOK_TIMEOUT_SECS: u64 = 5;

/// Named metric values for non-sentiment rules (price_change, ...).
pub type MetricContext = HashMap<String, f64>;

/// Terminal result of one delivery attempt. Strategies never propagate
/// transport errors past this boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    Failed(String),
}

/// One delivery strategy per channel kind
#[async_trait]
trait DeliveryStrategy: Send + Sync {
    async fn deliver(
        &self,
        rule: &AlertRule,
        payload: &serde_json::Value,
        summary: &str,
    ) -> DeliveryOutcome;
}

struct WebhookDelivery<'a> {
    client: &'a reqwest::Client,
    url: &'a str,
}

#[async_trait]
impl DeliveryStrategy for WebhookDelivery<'_> {
    async fn deliver(
        &self,
        _rule: &AlertRule,
        payload: &serde_json::Value,
        _summary: &str,
    ) -> DeliveryOutcome {
        match self.client.post(self.url).json(payload).send().await {
            Ok(response) if response.status().is_success() => DeliveryOutcome::Sent,
            Ok(response) => {
                DeliveryOutcome::Failed(format!("webhook returned status {}", response.status()))
            }
            Err(e) => DeliveryOutcome::Failed(e.to_string()),
        }
    }
}

struct EmailDelivery<'a> {
    mailer: &'a dyn Mailer,
    directory: &'a dyn RecipientDirectory,
    destination: Option<&'a str>,
}

#[async_trait]
impl DeliveryStrategy for EmailDelivery<'_> {
    async fn deliver(
        &self,
        rule: &AlertRule,
        payload: &serde_json::Value,
        summary: &str,
    ) -> DeliveryOutcome {
        let recipient = match self.destination {
            Some(destination) => Some(destination.to_string()),
            None => self.directory.email_for(&rule.owner).await,
        };
        let Some(recipient) = recipient else {
            return DeliveryOutcome::Failed("No recipient for email".to_string());
        };

        let details =
            serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
        let email = OutboundEmail {
            to: recipient,
            subject: format!("Alert: {} - {}", rule.name, rule.symbol),
            text_body: format!("{}\n\nDetails:\n{}", summary, details),
            html_body: Some(format!(
                "<p>{}</p><pre style=\"font-size:12px\">{}</pre>",
                summary, details
            )),
        };

        match self.mailer.send(email).await {
            Ok(()) => DeliveryOutcome::Sent,
            Err(e) => DeliveryOutcome::Failed(e.to_string()),
        }
    }
}

/// In-app delivery is implicit: the persisted event record is the
/// notification.
struct InAppDelivery;

#[async_trait]
impl DeliveryStrategy for InAppDelivery {
    async fn deliver(
        &self,
        _rule: &AlertRule,
        _payload: &serde_json::Value,
        _summary: &str,
    ) -> DeliveryOutcome {
        DeliveryOutcome::Sent
    }
}

/// Matches live metrics against persisted rules, enforces cooldown and
/// minimum-evidence gates, and dispatches matched rules to their
/// notification channel, recording the delivery outcome.
pub struct AlertEngine {
    store: Arc<dyn Store>,
    mailer: Arc<dyn Mailer>,
    directory: Arc<dyn RecipientDirectory>,
    http: reqwest::Client,
}

impl AlertEngine {
    pub fn new(
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
        directory: Arc<dyn RecipientDirectory>,
    ) -> Self {
        Self {
            store,
            mailer,
            directory,
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Evaluate every active rule for `symbol`. A rule whose metric
    /// cannot be resolved to a number is skipped, not failed; one rule's
    /// dispatch failure never blocks the rest.
    pub async fn evaluate(
        &self,
        symbol: &str,
        aggregate: Option<&SentimentAggregate>,
        context: &MetricContext,
    ) -> Result<Vec<AlertEvent>, AppError> {
        let rules = self.store.active_rules(symbol).await?;
        let mut fired = Vec::new();

        for rule in rules {
            let value = match rule.condition.metric {
                AlertMetric::Sentiment => aggregate.map(|a| a.avg_sentiment),
                other => context.get(other.key()).copied(),
            };
            let Some(value) = value else { continue };

            if in_cooldown(rule.last_triggered_at, rule.cooldown_minutes) {
                continue;
            }

            let mentions = aggregate.map(|a| a.total_mentions).unwrap_or(0);
            if mentions < rule.condition.min_mentions {
                continue;
            }

            if !rule.condition.operator.evaluate(value, rule.condition.threshold) {
                continue;
            }

            let event = self.dispatch(&rule, value, aggregate).await?;
            fired.push(event);
        }

        Ok(fired)
    }

    async fn dispatch(
        &self,
        rule: &AlertRule,
        value: f64,
        aggregate: Option<&SentimentAggregate>,
    ) -> Result<AlertEvent, AppError> {
        let summary = format!(
            "{} {:.2} crossed {} {}",
            rule.condition.metric.label(),
            value,
            rule.condition.operator,
            rule.condition.threshold
        );
        let payload = json!({
            "symbol": rule.symbol,
            "summary": summary,
            "value": value,
            "aggregate": aggregate,
            "triggered_at": Utc::now(),
        });

        let mut event = AlertEvent {
            id: Uuid::new_v4(),
            rule_id: rule.id,
            owner: rule.owner.clone(),
            symbol: rule.symbol.clone(),
            channel: rule.channel.kind().to_string(),
            status: AlertEventStatus::Queued,
            summary: summary.clone(),
            payload: payload.clone(),
            created_at: Utc::now(),
            sent_at: None,
            error: None,
        };
        self.store.insert_alert_event(event.clone()).await?;

        let outcome = match &rule.channel {
            AlertChannel::Webhook { url } => {
                WebhookDelivery {
                    client: &self.http,
                    url,
                }
                .deliver(rule, &payload, &summary)
                .await
            }
            AlertChannel::Email { destination } => {
                EmailDelivery {
                    mailer: self.mailer.as_ref(),
                    directory: self.directory.as_ref(),
                    destination: destination.as_deref(),
                }
                .deliver(rule, &payload, &summary)
                .await
            }
            AlertChannel::InApp => InAppDelivery.deliver(rule, &payload, &summary).await,
        };

        match outcome {
            DeliveryOutcome::Sent => {
                let now = Utc::now();
                event.status = AlertEventStatus::Sent;
                event.sent_at = Some(now);
                self.store
                    .resolve_alert_event(event.id, AlertEventStatus::Sent, Some(now), None)
                    .await?;
                self.store.set_rule_triggered(rule.id, now).await?;
                info!("🔔 Alert dispatched for {} via {}", rule.symbol, event.channel);
            }
            DeliveryOutcome::Failed(error) => {
                warn!(
                    "{} alert failed for {}: {}",
                    event.channel, rule.symbol, error
                );
                event.status = AlertEventStatus::Failed;
                event.error = Some(error.clone());
                self.store
                    .resolve_alert_event(event.id, AlertEventStatus::Failed, None, Some(error))
                    .await?;
            }
        }

        Ok(event)
    }
}

pub fn in_cooldown(last_triggered_at: Option<DateTime<Utc>>, cooldown_minutes: i64) -> bool {
    match last_triggered_at {
        Some(last) => Utc::now() < last + Duration::minutes(cooldown_minutes),
        None => false,
    }
}
