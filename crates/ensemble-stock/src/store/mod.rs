//! Prediction persistence
//!
//! Every recorded analysis becomes a [`PredictionRecord`] in `PENDING`
//! state. The validator later compares it with the market and flips it to
//! `CORRECT` or `INCORRECT`.

mod memory;
mod sqlite;

pub use memory::MemoryPredictionStore;
pub use sqlite::SqlitePredictionStore;

use crate::ensemble::{Action, ConfidenceTier, ModelVotes};
use crate::error::Result;
use crate::indicators::OverallSignal;
use crate::news::SentimentLabel;
use crate::result::AnalysisResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle of a stored prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PredictionStatus {
    Pending,
    Correct,
    Incorrect,
}

impl PredictionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Correct => "CORRECT",
            Self::Incorrect => "INCORRECT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "CORRECT" => Some(Self::Correct),
            "INCORRECT" => Some(Self::Incorrect),
            _ => None,
        }
    }
}

impl fmt::Display for PredictionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: Uuid,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub status: PredictionStatus,
    pub action: Action,
    pub confidence: ConfidenceTier,
    pub confidence_score: f64,
    pub ensemble_score: f64,
    pub current_price: f64,
    pub target_price: f64,
    pub stop_loss: f64,
    pub reasoning: String,
    pub model_votes: ModelVotes,
    pub technical_signal: OverallSignal,
    pub news_sentiment: SentimentLabel,
    /// Price seen at validation time
    pub actual_price: Option<f64>,
    pub validated_at: Option<DateTime<Utc>>,
}

impl PredictionRecord {
    /// New pending record for a finished analysis
    pub fn from_result(result: &AnalysisResult) -> Self {
        let decision = &result.final_decision;
        Self {
            id: Uuid::new_v4(),
            symbol: result.symbol.clone(),
            timestamp: result.timestamp,
            status: PredictionStatus::Pending,
            action: decision.action,
            confidence: decision.confidence,
            confidence_score: result.confidence_score,
            ensemble_score: decision.ensemble_score,
            current_price: result.current_price,
            target_price: decision.target_price,
            stop_loss: decision.stop_loss,
            reasoning: decision.reasoning.clone(),
            model_votes: decision.model_votes,
            technical_signal: result.metadata.technical_indicators.overall_signal,
            news_sentiment: result.metadata.news_sentiment.overall,
            actual_price: None,
            validated_at: None,
        }
    }
}

/// Query filter; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionFilter {
    pub symbol: Option<String>,
    pub status: Option<PredictionStatus>,
    /// Only records strictly older than this instant
    pub before: Option<DateTime<Utc>>,
}

impl PredictionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn status(mut self, status: PredictionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn before(mut self, instant: DateTime<Utc>) -> Self {
        self.before = Some(instant);
        self
    }

    pub(crate) fn matches(&self, record: &PredictionRecord) -> bool {
        self.symbol.as_deref().is_none_or(|s| s == record.symbol)
            && self.status.is_none_or(|s| s == record.status)
            && self.before.is_none_or(|b| record.timestamp < b)
    }
}

/// Storage backend for predictions
#[async_trait]
pub trait PredictionStore: Send + Sync {
    /// Insert a new record
    async fn save(&self, record: &PredictionRecord) -> Result<()>;

    /// Look up one record
    async fn get(&self, id: Uuid) -> Result<Option<PredictionRecord>>;

    /// Matching records, newest first, at most `limit`
    async fn query(&self, filter: &PredictionFilter, limit: usize) -> Result<Vec<PredictionRecord>>;

    /// Set the outcome of a record; stamps `validated_at`
    async fn update_status(
        &self,
        id: Uuid,
        status: PredictionStatus,
        actual_price: Option<f64>,
    ) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::Duration;

    pub fn record(symbol: &str, action: Action, price: f64, age_days: i64) -> PredictionRecord {
        PredictionRecord {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            timestamp: Utc::now() - Duration::days(age_days),
            status: PredictionStatus::Pending,
            action,
            confidence: ConfidenceTier::Medium,
            confidence_score: 72.5,
            ensemble_score: 61.2,
            current_price: price,
            target_price: price * 1.04,
            stop_loss: price * 0.97,
            reasoning: "Technical indicators show buying opportunity".to_string(),
            model_votes: ModelVotes {
                sentiment: crate::parsers::SentimentCategory::Bullish,
                technical: crate::parsers::TechnicalSignal::Buy,
                risk: crate::parsers::RiskLevel::Medium,
            },
            technical_signal: OverallSignal::Buy,
            news_sentiment: SentimentLabel::Positive,
            actual_price: None,
            validated_at: None,
        }
    }
}
