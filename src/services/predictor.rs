use crate::errors::AppError;
use crate::external::price_provider::PriceProvider;
use crate::models::{
    Candle, HistoryProvenance, MacdValue, PredictionResult, PriceTargets, Quote, RiskLevel,
    SentimentAggregate, SentimentSnapshot, TechnicalIndicatorSet, TechnicalSnapshot,
    TradingSignal, TrendDirection,
};
use crate::services::aggregator::SentimentAggregator;
use crate::services::auditor::PredictionAuditor;
use crate::services::scheduler::PriceCache;
use crate::services::{indicators, round_to};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

const HISTORY_DAYS: u32 = 30;

/// Fuses the indicator set and the sentiment aggregate into a discrete
/// trading signal with confidence, risk tier, price targets and a
/// rationale trail. Degrades through synthetic inputs during data
/// outages and only fails when neither price nor history is obtainable.
pub struct SignalSynthesizer {
    aggregator: Arc<SentimentAggregator>,
    auditor: Arc<PredictionAuditor>,
    price_provider: Arc<dyn PriceProvider>,
    price_cache: Arc<PriceCache>,
    window_hours: i64,
    horizon_hours: i64,
}

impl SignalSynthesizer {
    pub fn new(
        aggregator: Arc<SentimentAggregator>,
        auditor: Arc<PredictionAuditor>,
        price_provider: Arc<dyn PriceProvider>,
        price_cache: Arc<PriceCache>,
        window_hours: i64,
        horizon_hours: i64,
    ) -> Self {
        Self {
            aggregator,
            auditor,
            price_provider,
            price_cache,
            window_hours,
            horizon_hours,
        }
    }

    pub async fn predict(&self, symbol: &str) -> Result<PredictionResult, AppError> {
        let mut quote = self.price_cache.get(symbol);
        if quote.is_none() {
            quote = match self.price_provider.fetch_quote(symbol).await {
                Ok(q) => q,
                Err(e) => {
                    warn!("Live quote fetch failed for {}: {}", symbol, e);
                    None
                }
            };
        }

        let sentiment = self.aggregator.aggregate(symbol, self.window_hours).await?;

        let mut history = match self.price_provider.fetch_history(symbol, HISTORY_DAYS).await {
            Ok(h) => h,
            Err(e) => {
                warn!("History fetch failed for {}: {}", symbol, e);
                Vec::new()
            }
        };

        let quote = match quote {
            Some(q) if q.current_price > 0.0 => Some(q),
            _ => quote_from_history(symbol, &history),
        };

        let mut provenance = HistoryProvenance::Real;
        if history.is_empty() {
            if let Some(q) = &quote {
                history = synthetic_history(q, HISTORY_DAYS as usize);
                if !history.is_empty() {
                    provenance = HistoryProvenance::Synthetic;
                }
            }
        }

        let quote = quote.ok_or_else(|| {
            AppError::InsufficientData(format!("no price data for {}", symbol))
        })?;
        if history.is_empty() {
            return Err(AppError::InsufficientData(format!(
                "no price history for {}",
                symbol
            )));
        }

        let technical = indicators::compute(&history);
        let (signal, score, _) = generate_signal(&technical, &sentiment);
        let (confidence, risk_level) = confidence_and_risk(&technical, &sentiment, score);
        let price_targets = compute_price_targets(quote.current_price, &technical, signal);
        let reasons = technical_reasons(&technical, quote.current_price);
        let mut rationale: Vec<String> = reasons.iter().take(3).cloned().collect();
        rationale.push(sentiment_reason(&sentiment));

        let result = PredictionResult {
            symbol: symbol.to_string(),
            signal,
            confidence,
            risk_level,
            price_targets,
            recommendation: recommendation_text(signal, &sentiment, &technical, &quote),
            rationale,
            technical: TechnicalSnapshot {
                rsi: round_to(technical.rsi, 2),
                macd: MacdValue {
                    line: round_to(technical.macd.line, 2),
                    signal: round_to(technical.macd.signal, 2),
                    histogram: round_to(technical.macd.histogram, 2),
                },
                ma20: round_to(technical.ma20, 2),
                ma50: round_to(technical.ma50, 2),
                ma200: round_to(technical.ma200, 2),
                support: round_to(technical.support, 2),
                resistance: round_to(technical.resistance, 2),
                trend: technical.trend,
                reasons: reasons.into_iter().take(3).collect(),
            },
            sentiment: SentimentSnapshot {
                score: round_to(sentiment.avg_sentiment, 3),
                total_mentions: sentiment.total_mentions,
                positive_percent: sentiment.positive_percentage,
                negative_percent: sentiment.negative_percentage,
                trend: sentiment.trend,
            },
            history_provenance: provenance,
            timestamp: Utc::now(),
        };

        self.auditor
            .record(symbol, &result, Some(quote.current_price), self.horizon_hours)
            .await?;

        info!(
            "🔮 {} signal for {} (confidence {}%)",
            result.signal, symbol, confidence
        );
        Ok(result)
    }
}

/// Synthesize a quote from the tail of a history series.
fn quote_from_history(symbol: &str, history: &[Candle]) -> Option<Quote> {
    let cleaned: Vec<&Candle> = history.iter().filter(|c| c.close > 0.0).collect();
    let latest = *cleaned.last()?;
    let previous = if cleaned.len() >= 2 {
        cleaned[cleaned.len() - 2]
    } else {
        latest
    };

    let change = latest.close - previous.close;
    let change_percent = if previous.close != 0.0 {
        (change / previous.close) * 100.0
    } else {
        0.0
    };

    Some(Quote {
        symbol: symbol.to_string(),
        current_price: latest.close,
        previous_close: previous.close,
        change: round_to(change, 2),
        change_percent: round_to(change_percent, 2),
        volume: latest.volume,
        day_high: if latest.high > 0.0 { latest.high } else { latest.close },
        day_low: if latest.low > 0.0 { latest.low } else { latest.close },
        last_updated: latest.timestamp,
    })
}

/// Deterministic stand-in series for a total history outage: linear
/// drift from the known change percent plus a bounded sinusoid. Exists
/// only to keep the indicator engine fed; callers see it flagged as
/// synthetic on the prediction.
fn synthetic_history(quote: &Quote, days: usize) -> Vec<Candle> {
    let base_price = if quote.current_price > 0.0 {
        quote.current_price
    } else {
        quote.previous_close
    };
    if base_price <= 0.0 {
        return Vec::new();
    }

    let drift = quote.change_percent / 100.0;
    let per_day_drift = drift / days.saturating_sub(1).max(1) as f64;
    let volatility = (quote.change_percent.abs() / 200.0).max(0.005);

    let denominator = 1.0 + drift;
    let start = base_price
        / if denominator == 0.0 {
            1.0
        } else {
            denominator
        };

    let now = Utc::now();
    let mut generated = Vec::with_capacity(days);
    for i in (0..days).rev() {
        let steps = (days - 1 - i) as f64;
        let trend_component = start * (1.0 + per_day_drift * steps);
        let noise = (steps / 3.0).sin() * volatility * base_price;
        let close = (trend_component + noise).max(1.0);
        let high = close * (1.0 + volatility);
        let low = close * (1.0 - volatility);
        let open = (high + low) / 2.0;

        generated.push(Candle {
            timestamp: now - Duration::days(i as i64),
            open: round_to(open, 2),
            high: round_to(high, 2),
            low: round_to(low, 2),
            close: round_to(close, 2),
            volume: quote.volume,
        });
    }

    generated
}

/// Signed contribution scoring: RSI extremes, MACD crossover, trend,
/// sentiment bands, and a volatility penalty.
pub fn generate_signal(
    technical: &TechnicalIndicatorSet,
    sentiment: &SentimentAggregate,
) -> (TradingSignal, f64, Vec<String>) {
    let mut score = 0.0;
    let mut reasons = Vec::new();

    if technical.rsi < 30.0 {
        score += 2.0;
        reasons.push("RSI oversold".to_string());
    } else if technical.rsi > 70.0 {
        score -= 2.0;
        reasons.push("RSI overbought".to_string());
    } else if technical.rsi < 40.0 {
        score += 1.0;
    } else if technical.rsi > 60.0 {
        score -= 1.0;
    }

    if technical.macd.histogram > 0.0 && technical.macd.line > technical.macd.signal {
        score += 1.5;
        reasons.push("MACD bullish crossover".to_string());
    } else if technical.macd.histogram < 0.0 && technical.macd.line < technical.macd.signal {
        score -= 1.5;
        reasons.push("MACD bearish crossover".to_string());
    }

    match technical.trend {
        TrendDirection::Uptrend => score += 1.0,
        TrendDirection::Downtrend => score -= 1.0,
        TrendDirection::Neutral => {}
    }

    if sentiment.avg_sentiment > 0.3 {
        score += 1.5;
        reasons.push("Very bullish sentiment".to_string());
    } else if sentiment.avg_sentiment > 0.1 {
        score += 0.5;
        reasons.push("Bullish sentiment".to_string());
    } else if sentiment.avg_sentiment < -0.3 {
        score -= 1.5;
        reasons.push("Very bearish sentiment".to_string());
    } else if sentiment.avg_sentiment < -0.1 {
        score -= 0.5;
        reasons.push("Bearish sentiment".to_string());
    }

    if technical.volatility > 5.0 {
        score -= 0.5;
        reasons.push("High volatility - risky".to_string());
    }

    let signal = if score >= 3.0 {
        TradingSignal::StrongBuy
    } else if score >= 0.5 {
        TradingSignal::Buy
    } else if score <= -3.0 {
        TradingSignal::StrongSell
    } else if score <= -0.5 {
        TradingSignal::Sell
    } else {
        TradingSignal::Hold
    };

    (signal, score, reasons)
}

pub fn confidence_and_risk(
    technical: &TechnicalIndicatorSet,
    sentiment: &SentimentAggregate,
    score: f64,
) -> (u32, RiskLevel) {
    let mut confidence = 50.0 + score.abs() * 10.0;
    confidence = confidence.clamp(55.0, 95.0);

    let sentiment_strength = sentiment.avg_sentiment.abs() * 20.0;
    confidence = (confidence + sentiment_strength * 0.15).min(95.0);

    let risk_level = if technical.volatility > 8.0 || technical.rsi > 75.0 || technical.rsi < 25.0
    {
        RiskLevel::High
    } else if technical.volatility < 2.0 && (40.0..=60.0).contains(&technical.rsi) {
        RiskLevel::Low
    } else {
        RiskLevel::Medium
    };

    (confidence.round() as u32, risk_level)
}

/// Targets use the lookback high-low range as a volatility proxy; every
/// value is floored at zero.
pub fn compute_price_targets(
    current_price: f64,
    technical: &TechnicalIndicatorSet,
    signal: TradingSignal,
) -> PriceTargets {
    let range = technical.resistance - technical.support;

    let (target1, target2, stop_loss) = if signal.is_buy() {
        (
            current_price + range * 0.6,
            Some(current_price + range * 1.2),
            current_price - range * 0.3,
        )
    } else if signal.is_sell() {
        (
            current_price - range * 0.6,
            Some(current_price - range * 1.2),
            current_price + range * 0.3,
        )
    } else {
        (current_price + range * 0.3, None, current_price - range * 0.2)
    };

    PriceTargets {
        target1: round_to(target1.max(0.0), 2),
        target2: target2.map(|t| round_to(t.max(0.0), 2)),
        stop_loss: round_to(stop_loss.max(0.0), 2),
    }
}

fn technical_reasons(technical: &TechnicalIndicatorSet, current_price: f64) -> Vec<String> {
    let mut reasons = Vec::new();

    if technical.rsi < 30.0 {
        reasons.push("Stock is oversold (RSI < 30) - potential bounce".to_string());
    } else if technical.rsi > 70.0 {
        reasons.push("Stock is overbought (RSI > 70) - potential pullback".to_string());
    } else if technical.rsi < 50.0 {
        reasons.push("RSI below 50 - slight downward momentum".to_string());
    } else {
        reasons.push("RSI above 50 - slight upward momentum".to_string());
    }

    match technical.trend {
        TrendDirection::Uptrend => {
            reasons.push("Price in established uptrend - bullish".to_string())
        }
        TrendDirection::Downtrend => {
            reasons.push("Price in established downtrend - bearish".to_string())
        }
        TrendDirection::Neutral => {
            reasons.push("No clear trend - consolidation phase".to_string())
        }
    }

    if technical.macd.histogram > 0.0 {
        reasons.push("MACD histogram positive - bullish momentum".to_string());
    } else if technical.macd.histogram < 0.0 {
        reasons.push("MACD histogram negative - bearish momentum".to_string());
    }

    if technical.volatility > 8.0 {
        reasons.push("High volatility detected - increased risk".to_string());
    } else if technical.volatility < 2.0 {
        reasons.push("Low volatility - stable conditions".to_string());
    }

    if technical.ma20 > 0.0 {
        let dist_from_ma20 = ((current_price - technical.ma20) / technical.ma20) * 100.0;
        if dist_from_ma20 > 5.0 {
            reasons.push(format!(
                "Price {:.1}% above 20-day MA - potentially overextended",
                dist_from_ma20
            ));
        } else if dist_from_ma20 < -5.0 {
            reasons.push(format!(
                "Price {:.1}% below 20-day MA - potentially undervalued",
                dist_from_ma20.abs()
            ));
        }
    }

    reasons
}

fn sentiment_reason(sentiment: &SentimentAggregate) -> String {
    if sentiment.avg_sentiment > 0.2 {
        "Positive news sentiment supports bullish bias".to_string()
    } else if sentiment.avg_sentiment < -0.2 {
        "Negative news sentiment supports bearish bias".to_string()
    } else {
        "News sentiment is neutral".to_string()
    }
}

fn recommendation_text(
    signal: TradingSignal,
    sentiment: &SentimentAggregate,
    technical: &TechnicalIndicatorSet,
    quote: &Quote,
) -> String {
    let mut text = String::new();

    if signal.is_buy() {
        text.push_str(&format!("Consider buying {}. ", quote.symbol));
        if sentiment.avg_sentiment > 0.2 {
            text.push_str("Market sentiment is positive with increasing mentions. ");
        }
        if technical.trend == TrendDirection::Uptrend {
            text.push_str(&format!(
                "Price is in an uptrend with support at {:.2}. ",
                technical.support
            ));
        }
        text.push_str(&format!(
            "Target price: {:.2}. ",
            quote.current_price * 1.1
        ));
        text.push_str("Monitor for breaks above resistance levels.");
    } else if signal.is_sell() {
        text.push_str(&format!("Consider selling or avoiding {}. ", quote.symbol));
        if sentiment.avg_sentiment < -0.2 {
            text.push_str("Negative sentiment detected in news. ");
        }
        if technical.trend == TrendDirection::Downtrend {
            text.push_str("Price is in a downtrend. ");
        }
        text.push_str("Reduce exposure and set stop-loss. ");
        text.push_str(&format!("Watch for support at {:.2}.", technical.support));
    } else {
        text.push_str(&format!("Hold position in {}. ", quote.symbol));
        text.push_str("Sentiment is mixed. ");
        if technical.volatility > 5.0 {
            text.push_str("Wait for volatility to decrease before making moves.");
        } else {
            text.push_str("Monitor for clear break above or below key levels.");
        }
    }

    text
}
