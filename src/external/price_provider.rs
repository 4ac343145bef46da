use crate::models::{Candle, Quote};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PriceProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited")]
    RateLimited,
}

/// Price-data collaborator. Acquisition details (provider APIs, retries,
/// fallbacks) live behind this seam.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Ordered oldest→newest daily history for the trailing `days`.
    async fn fetch_history(
        &self,
        symbol: &str,
        days: u32,
    ) -> Result<Vec<Candle>, PriceProviderError>;

    /// Latest quote, or `None` when the provider has no data for the
    /// symbol right now.
    async fn fetch_quote(&self, symbol: &str) -> Result<Option<Quote>, PriceProviderError>;
}
