use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Origin class of a mention
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    News,
    Social,
    Transcript,
    Analyst,
    Other,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::News => write!(f, "news"),
            SourceType::Social => write!(f, "social"),
            SourceType::Transcript => write!(f, "transcript"),
            SourceType::Analyst => write!(f, "analyst"),
            SourceType::Other => write!(f, "other"),
        }
    }
}

/// A raw textual mention of an instrument, produced by the collection
/// layer and consumed exactly once by the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMention {
    pub external_id: Option<String>,
    pub title: String,
    pub text: String,
    pub url: Option<String>,
    pub source: String,
    pub source_type: SourceType,
    pub provider: String,
    pub published_at: Option<DateTime<Utc>>,
    /// Open provider-specific map (engagement metrics, language, ...)
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl RawMention {
    pub fn new(title: impl Into<String>, text: impl Into<String>, source_type: SourceType) -> Self {
        let source = source_type.to_string();
        Self {
            external_id: None,
            title: title.into(),
            text: text.into(),
            url: None,
            source: source.clone(),
            source_type,
            provider: source,
            published_at: None,
            metadata: serde_json::Value::Null,
        }
    }
}
