//! Analysis request and result types

use crate::ensemble::EnsembleDecision;
use crate::error::{Result, StockError};
use crate::indicators::IndicatorSnapshot;
use crate::market::{Bar, MarketSnapshot};
use crate::news::SentimentSummary;
use crate::parsers::{AnomalyOpinion, RiskOpinion, SentimentOpinion, TechnicalOpinion};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Input to one ensemble run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub symbol: String,
    pub current_price: f64,
    /// Chronological, oldest first
    pub historical_bars: Vec<Bar>,
    pub price_change_percent: Option<f64>,
}

impl AnalysisRequest {
    pub fn new(symbol: impl Into<String>, current_price: f64, historical_bars: Vec<Bar>) -> Self {
        Self {
            symbol: symbol.into(),
            current_price,
            historical_bars,
            price_change_percent: None,
        }
    }

    pub fn with_price_change(mut self, percent: f64) -> Self {
        self.price_change_percent = Some(percent);
        self
    }

    /// Request from a market snapshot, carrying its price change
    pub fn from_snapshot(snapshot: MarketSnapshot) -> Self {
        Self {
            symbol: snapshot.symbol,
            current_price: snapshot.current_price,
            historical_bars: snapshot.bars,
            price_change_percent: snapshot.price_change_percent,
        }
    }

    /// Reject requests the pipeline cannot price
    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(StockError::InvalidRequest("symbol must not be empty".to_string()));
        }
        if !self.current_price.is_finite() || self.current_price <= 0.0 {
            return Err(StockError::InvalidRequest(format!(
                "current_price must be positive, got {}",
                self.current_price
            )));
        }
        if let Some(change) = self.price_change_percent {
            if !change.is_finite() {
                return Err(StockError::InvalidRequest(
                    "price_change_percent must be finite".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Model id used for each seat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelsUsed {
    pub sentiment: String,
    pub technical: String,
    pub risk: String,
    pub anomaly: String,
}

/// Context gathered before the model calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub technical_indicators: IndicatorSnapshot,
    pub news_count: usize,
    pub news_sentiment: SentimentSummary,
}

/// Output of one ensemble run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub symbol: String,
    pub current_price: f64,
    pub price_change_percent: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub analysis_time_seconds: f64,
    pub models_used: ModelsUsed,
    pub sentiment_analysis: SentimentOpinion,
    pub technical_analysis: TechnicalOpinion,
    pub risk_assessment: RiskOpinion,
    pub anomaly_detection: AnomalyOpinion,
    pub final_decision: EnsembleDecision,
    /// Specialist agreement, 0..=100
    pub confidence_score: f64,
    pub metadata: AnalysisMetadata,
}

impl AnalysisResult {
    /// Number of specialist opinions that came back as error stubs
    pub fn failed_specialists(&self) -> usize {
        [
            self.sentiment_analysis.error.is_some(),
            self.technical_analysis.error.is_some(),
            self.risk_assessment.error.is_some(),
        ]
        .into_iter()
        .filter(|failed| *failed)
        .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_request() {
        assert!(AnalysisRequest::new("AAPL", 10.0, Vec::new()).validate().is_ok());
        assert!(
            AnalysisRequest::new("AAPL", 10.0, Vec::new())
                .with_price_change(-3.1)
                .validate()
                .is_ok()
        );

        for price in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = AnalysisRequest::new("AAPL", price, Vec::new()).validate().unwrap_err();
            assert!(matches!(err, StockError::InvalidRequest(_)));
        }

        let err = AnalysisRequest::new("  ", 10.0, Vec::new()).validate().unwrap_err();
        assert!(matches!(err, StockError::InvalidRequest(_)));

        let err = AnalysisRequest::new("AAPL", 10.0, Vec::new())
            .with_price_change(f64::NAN)
            .validate()
            .unwrap_err();
        assert!(matches!(err, StockError::InvalidRequest(_)));
    }

    #[test]
    fn test_from_snapshot_keeps_change() {
        let snapshot = MarketSnapshot {
            symbol: "INFY".to_string(),
            current_price: 101.0,
            previous_close: Some(100.0),
            price_change_percent: Some(1.0),
            bars: Vec::new(),
        };
        let request = AnalysisRequest::from_snapshot(snapshot);
        assert_eq!(request.symbol, "INFY");
        assert_eq!(request.price_change_percent, Some(1.0));
    }
}
