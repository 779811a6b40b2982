//! Errors raised while gathering data for, running, or recording an analysis

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StockError {
    /// Empty symbol, non-positive price or a non-finite change
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Data not available for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("{provider} rate limit reached")]
    RateLimitExceeded { provider: String },

    #[error("HTTP transport: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Malformed JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Yahoo Finance: {0}")]
    YahooFinanceError(String),

    #[error("MarketAux: {0}")]
    NewsError(String),

    /// Too little history or a failed `ta` computation
    #[error("Indicator calculation: {0}")]
    IndicatorError(String),

    #[error("Prompt template: {0}")]
    PromptError(#[from] minijinja::Error),

    /// A specialist call that escaped its stub, e.g. through the client directly
    #[error("Model call: {0}")]
    Model(#[from] ensemble_llm::LLMError),

    #[error("Prediction store: {0}")]
    StoreError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Analysis timed out after {0:?}")]
    Timeout(Duration),
}

impl From<sqlx::Error> for StockError {
    fn from(err: sqlx::Error) -> Self {
        StockError::StoreError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StockError>;
