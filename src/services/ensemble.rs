use crate::models::{ModelScore, SentimentLabel, SignalHint, SignalKind};
use crate::services::round_to;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::warn;

const FINBERT_ENDPOINT: &str =
    "https://api-inference.huggingface.co/models/ProsusAI/finbert";
const DEFAULT_MODEL_WEIGHT: f64 = 0.25;

/// Score cutoffs for mapping a consensus score to a label.
#[derive(Debug, Clone, Copy)]
pub struct LabelThresholds {
    pub positive: f64,
    pub negative: f64,
}

impl Default for LabelThresholds {
    fn default() -> Self {
        Self {
            positive: 0.15,
            negative: -0.15,
        }
    }
}

/// Consensus output of the ensemble for one text blob
#[derive(Debug, Clone)]
pub struct EnsembleAnalysis {
    pub sentiment_score: f64,
    pub sentiment_label: SentimentLabel,
    pub confidence: f64,
    pub model_breakdown: Vec<ModelScore>,
    pub signals: Vec<SignalHint>,
}

pub fn determine_label(score: f64, thresholds: &LabelThresholds) -> SentimentLabel {
    if score >= thresholds.positive {
        SentimentLabel::Positive
    } else if score <= thresholds.negative {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    }
}

/// Scores a text blob with several independently weighted models and
/// merges them into one consensus score, label and confidence. The
/// remote financial-domain classifier is best-effort: a missing key or a
/// failed call silently shrinks the ensemble, never blocks it.
pub struct EnsembleScorer {
    thresholds: LabelThresholds,
    remote: FinBertClassifier,
}

impl EnsembleScorer {
    pub fn new(finbert_api_key: Option<String>) -> Self {
        Self {
            thresholds: LabelThresholds::default(),
            remote: FinBertClassifier::new(finbert_api_key),
        }
    }

    pub fn with_thresholds(mut self, thresholds: LabelThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// `None` for empty/whitespace input: the caller skips the entry, it
    /// is not an error.
    pub async fn analyze(&self, text: &str) -> Option<EnsembleAnalysis> {
        if text.trim().is_empty() {
            return None;
        }

        let mut models = vec![
            run_lexicon_model(text),
            run_polarity_model(text),
            run_keyword_model(text),
        ];
        if let Some(finbert) = self.remote.run(text).await {
            models.push(finbert);
        }

        let total_weight: f64 = models.iter().map(|m| effective_weight(m)).sum();
        let total_weight = if total_weight == 0.0 { 1.0 } else { total_weight };
        let weighted_score: f64 = models
            .iter()
            .map(|m| m.score * effective_weight(m))
            .sum::<f64>()
            / total_weight;

        let confidence = consensus_confidence(&models);
        let label = determine_label(weighted_score, &self.thresholds);

        Some(EnsembleAnalysis {
            sentiment_score: round_to(weighted_score.clamp(-1.0, 1.0), 4),
            sentiment_label: label,
            confidence: round_to(confidence, 3),
            model_breakdown: models,
            signals: derive_signals(text),
        })
    }
}

fn effective_weight(model: &ModelScore) -> f64 {
    if model.weight > 0.0 {
        model.weight
    } else {
        DEFAULT_MODEL_WEIGHT
    }
}

/// Higher score variance across models means lower consensus confidence.
fn consensus_confidence(models: &[ModelScore]) -> f64 {
    if models.is_empty() {
        return 0.0;
    }
    let n = models.len() as f64;
    let avg: f64 = models.iter().map(|m| m.score).sum::<f64>() / n;
    let variance: f64 = models.iter().map(|m| (m.score - avg).powi(2)).sum::<f64>() / n;
    let normalized_variance = 1.0 - (variance * 2.0).min(1.0);
    let avg_model_confidence: f64 = models.iter().map(|m| m.confidence).sum::<f64>() / n;
    ((normalized_variance + avg_model_confidence) / 2.0).clamp(0.0, 1.0)
}

// ==============================================================================
// Local models
// ==============================================================================

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[a-z][a-z'\-]*").expect("valid token pattern"))
}

fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    token_pattern()
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// AFINN-style valences for finance-heavy vocabulary
const LEXICON: &[(&str, f64)] = &[
    ("beat", 3.0),
    ("beats", 3.0),
    ("booming", 3.0),
    ("bullish", 3.0),
    ("buy", 2.0),
    ("buyback", 2.0),
    ("demand", 2.0),
    ("dividend", 1.0),
    ("exceeded", 3.0),
    ("expansion", 2.0),
    ("gain", 2.0),
    ("gains", 2.0),
    ("growth", 2.0),
    ("momentum", 1.0),
    ("optimistic", 2.0),
    ("outperform", 3.0),
    ("positive", 2.0),
    ("profit", 2.0),
    ("profits", 2.0),
    ("rally", 2.0),
    ("record", 2.0),
    ("recovery", 2.0),
    ("robust", 2.0),
    ("soar", 3.0),
    ("soared", 3.0),
    ("strong", 2.0),
    ("surge", 3.0),
    ("upgrade", 3.0),
    ("upgraded", 3.0),
    ("upside", 2.0),
    ("win", 2.0),
    ("bankruptcy", -4.0),
    ("bearish", -3.0),
    ("crash", -4.0),
    ("cut", -2.0),
    ("debt", -1.0),
    ("decline", -2.0),
    ("default", -3.0),
    ("downgrade", -3.0),
    ("downgraded", -3.0),
    ("drop", -2.0),
    ("dropped", -2.0),
    ("fall", -2.0),
    ("fell", -2.0),
    ("fraud", -4.0),
    ("investigation", -2.0),
    ("lawsuit", -2.0),
    ("layoffs", -3.0),
    ("loss", -2.0),
    ("losses", -2.0),
    ("miss", -2.0),
    ("missed", -3.0),
    ("negative", -2.0),
    ("pessimistic", -2.0),
    ("plunge", -3.0),
    ("plunged", -3.0),
    ("probe", -2.0),
    ("risky", -2.0),
    ("scandal", -3.0),
    ("selloff", -3.0),
    ("slump", -3.0),
    ("tumble", -3.0),
    ("underperform", -3.0),
    ("volatile", -1.0),
    ("warning", -2.0),
    ("weak", -2.0),
];

fn valence(token: &str) -> f64 {
    LEXICON
        .iter()
        .find(|(word, _)| *word == token)
        .map(|(_, v)| *v)
        .unwrap_or(0.0)
}

const NEGATORS: &[&str] = &[
    "not", "no", "never", "without", "don't", "doesn't", "isn't", "wasn't", "won't", "can't",
];

/// Plain lexicon sum, normalized the same way the AFINN family does.
fn run_lexicon_model(text: &str) -> ModelScore {
    let tokens = tokenize(text);
    let mut raw = 0.0;
    let mut positive = 0usize;
    let mut negative = 0usize;

    for token in &tokens {
        let v = valence(token);
        raw += v;
        if v > 0.0 {
            positive += 1;
        } else if v < 0.0 {
            negative += 1;
        }
    }

    let normalized = (raw / 10.0).clamp(-1.0, 1.0);
    ModelScore {
        model: "lexicon".to_string(),
        score: normalized,
        confidence: normalized.abs().clamp(0.0, 1.0),
        weight: 0.25,
        breakdown: json!({
            "positive": positive,
            "negative": negative,
            "neutral": tokens.len().saturating_sub(positive + negative),
            "tokens": tokens.len(),
        }),
    }
}

/// General polarity scorer: valence sum with a one-token negation window,
/// squashed into [-1, 1] with the usual alpha normalization.
fn run_polarity_model(text: &str) -> ModelScore {
    let tokens = tokenize(text);
    let mut sum = 0.0;
    let mut positive = 0usize;
    let mut negative = 0usize;

    for (i, token) in tokens.iter().enumerate() {
        let mut v = valence(token);
        if v != 0.0 && i > 0 && NEGATORS.contains(&tokens[i - 1].as_str()) {
            v = -v;
        }
        sum += v;
        if v > 0.0 {
            positive += 1;
        } else if v < 0.0 {
            negative += 1;
        }
    }

    let compound = if tokens.is_empty() {
        0.0
    } else {
        sum / (sum * sum + 15.0).sqrt()
    };
    let total = tokens.len().max(1) as f64;
    let neutral_ratio = (total - (positive + negative) as f64) / total;

    ModelScore {
        model: "polarity".to_string(),
        score: compound.clamp(-1.0, 1.0),
        confidence: (1.0 - (neutral_ratio - 0.5).abs()).clamp(0.0, 1.0),
        weight: 0.35,
        breakdown: json!({
            "positive": positive as f64 / total,
            "negative": negative as f64 / total,
            "neutral": neutral_ratio,
        }),
    }
}

const BULLISH_PHRASES: &[&str] = &[
    "beat estimates",
    "upgrade",
    "strong demand",
    "record high",
    "buyback",
];

const BEARISH_PHRASES: &[&str] = &[
    "missed estimates",
    "downgrade",
    "investigation",
    "default",
    "selloff",
];

/// Keyword/rule scorer: fixed ±0.1 per matched phrase.
fn run_keyword_model(text: &str) -> ModelScore {
    let lower = text.to_lowercase();
    let bullish: Vec<&str> = BULLISH_PHRASES
        .iter()
        .copied()
        .filter(|p| lower.contains(p))
        .collect();
    let bearish: Vec<&str> = BEARISH_PHRASES
        .iter()
        .copied()
        .filter(|p| lower.contains(p))
        .collect();

    let score =
        (bullish.len() as f64 * 0.1 - bearish.len() as f64 * 0.1).clamp(-1.0, 1.0);

    ModelScore {
        model: "keyword_rules".to_string(),
        score,
        confidence: score.abs().min(0.6),
        weight: 0.15,
        breakdown: json!({
            "bullish_mentions": bullish,
            "bearish_mentions": bearish,
        }),
    }
}

// ==============================================================================
// Remote financial-domain classifier
// ==============================================================================

#[derive(Debug, Deserialize)]
struct LabelScore {
    label: String,
    score: f64,
}

pub struct FinBertClassifier {
    api_key: Option<String>,
    endpoint: String,
    client: reqwest::Client,
}

impl FinBertClassifier {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            endpoint: FINBERT_ENDPOINT.to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(7))
                .build()
                .unwrap_or_default(),
        }
    }

    /// `None` when the key is absent or the call fails; the rest of the
    /// ensemble carries on without it.
    async fn run(&self, text: &str) -> Option<ModelScore> {
        let api_key = self.api_key.as_ref()?;
        let inputs: String = text.chars().take(512).collect();

        let response = match self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&json!({ "inputs": inputs }))
            .send()
            .await
        {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!("FinBERT inference failed: status {}", r.status());
                return None;
            }
            Err(e) => {
                warn!("FinBERT inference failed: {}", e);
                return None;
            }
        };

        let parsed: Vec<Vec<LabelScore>> = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!("FinBERT response parse failed: {}", e);
                return None;
            }
        };
        let scores = parsed.into_iter().next()?;

        let mut positive = 0.0;
        let mut negative = 0.0;
        let mut breakdown = serde_json::Map::new();
        for entry in &scores {
            let label = entry.label.to_lowercase();
            if label == "positive" {
                positive = entry.score;
            } else if label == "negative" {
                negative = entry.score;
            }
            breakdown.insert(label, json!(entry.score));
        }

        Some(ModelScore {
            model: "finbert".to_string(),
            score: (positive - negative).clamp(-1.0, 1.0),
            confidence: positive.max(negative),
            weight: 0.4,
            breakdown: serde_json::Value::Object(breakdown),
        })
    }
}

// ==============================================================================
// Rule-based signal extraction
// ==============================================================================

/// Keyword triggers for analyst actions, regulatory risk and momentum
/// events, independent of the numeric score.
pub fn derive_signals(text: &str) -> Vec<SignalHint> {
    let lower = text.to_lowercase();
    let mut signals = Vec::new();

    if lower.contains("downgrade") || lower.contains("cut to") {
        signals.push(SignalHint {
            kind: SignalKind::Analyst,
            description: "Analyst downgrade".to_string(),
            strength: 0.7,
        });
    }
    if lower.contains("upgrade") {
        signals.push(SignalHint {
            kind: SignalKind::Analyst,
            description: "Analyst upgrade".to_string(),
            strength: 0.7,
        });
    }
    if lower.contains("investigation") || lower.contains("probe") {
        signals.push(SignalHint {
            kind: SignalKind::Risk,
            description: "Regulatory investigation mentioned".to_string(),
            strength: 0.6,
        });
    }
    if lower.contains("record high") || lower.contains("all-time high") {
        signals.push(SignalHint {
            kind: SignalKind::Momentum,
            description: "Record high mention".to_string(),
            strength: 0.5,
        });
    }

    signals
}
