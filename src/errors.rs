use crate::external::price_provider::PriceProviderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Store error: {0}")]
    Store(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Insufficient data: {0}")]
    InsufficientData(String),
    #[error("Not found")]
    NotFound,
    #[error("Rate limited by external provider")]
    RateLimited,
    #[error("External error: {0}")]
    External(String),
}

impl From<String> for AppError {
    fn from(value: String) -> Self {
        AppError::Validation(value)
    }
}

impl From<PriceProviderError> for AppError {
    fn from(value: PriceProviderError) -> Self {
        match value {
            PriceProviderError::RateLimited => AppError::RateLimited,
            other => AppError::External(other.to_string()),
        }
    }
}
