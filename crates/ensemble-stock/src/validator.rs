//! Prediction validation
//!
//! Compares pending predictions made before today with the latest market
//! price and marks each one correct or incorrect:
//!
//! | Verdict | Correct when                 |
//! |---------|------------------------------|
//! | BUY     | price rose more than 1%      |
//! | SELL    | price fell more than 1%      |
//! | HOLD    | price moved less than 2%     |

use crate::ensemble::Action;
use crate::error::Result;
use crate::market::{MarketDataSource, percent_change};
use crate::store::{PredictionFilter, PredictionStatus, PredictionStore};
use chrono::{DateTime, NaiveTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

const BUY_THRESHOLD: f64 = 1.0;
const SELL_THRESHOLD: f64 = -1.0;
const HOLD_BAND: f64 = 2.0;
const DEFAULT_BATCH: usize = 500;

/// Outcome of one validation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub validated: usize,
    pub correct: usize,
    pub incorrect: usize,
    /// Predictions left pending because no price was available
    pub skipped: usize,
    /// Percent of validated predictions that were correct
    pub accuracy: f64,
}

impl ValidationSummary {
    fn finish(mut self) -> Self {
        self.accuracy = if self.validated == 0 {
            0.0
        } else {
            (self.correct as f64 / self.validated as f64 * 10_000.0).round() / 100.0
        };
        self
    }
}

/// Whether `action` at `predicted_price` held up at `actual_price`
pub fn evaluate(action: Action, predicted_price: f64, actual_price: f64) -> PredictionStatus {
    let Some(change) = percent_change(predicted_price, actual_price) else {
        return PredictionStatus::Incorrect;
    };
    let correct = match action {
        Action::Buy => change > BUY_THRESHOLD,
        Action::Sell => change < SELL_THRESHOLD,
        Action::Hold => change.abs() < HOLD_BAND,
    };
    if correct {
        PredictionStatus::Correct
    } else {
        PredictionStatus::Incorrect
    }
}

/// Marks stored predictions correct or incorrect against the market
pub struct PredictionValidator {
    store: Arc<dyn PredictionStore>,
    market: Arc<dyn MarketDataSource>,
    batch: usize,
}

impl PredictionValidator {
    pub fn new(store: Arc<dyn PredictionStore>, market: Arc<dyn MarketDataSource>) -> Self {
        Self {
            store,
            market,
            batch: DEFAULT_BATCH,
        }
    }

    /// Maximum predictions checked per run
    pub fn with_batch(mut self, batch: usize) -> Self {
        self.batch = batch;
        self
    }

    /// Validate pending predictions made before today (UTC)
    pub async fn validate_pending(&self) -> Result<ValidationSummary> {
        let today = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();
        self.validate_before(today).await
    }

    /// Validate pending predictions made before `cutoff`
    #[instrument(skip(self))]
    pub async fn validate_before(&self, cutoff: DateTime<Utc>) -> Result<ValidationSummary> {
        let filter = PredictionFilter::new()
            .status(PredictionStatus::Pending)
            .before(cutoff);
        let pending = self.store.query(&filter, self.batch).await?;
        info!(count = pending.len(), "validating pending predictions");

        let mut symbols: Vec<&str> = pending.iter().map(|p| p.symbol.as_str()).collect();
        symbols.sort_unstable();
        symbols.dedup();
        let prices: HashMap<String, f64> = join_all(symbols.into_iter().map(|symbol| async move {
            match self.market.latest_price(symbol).await {
                Ok(price) => Some((symbol.to_string(), price)),
                Err(err) => {
                    warn!(symbol, error = %err, "no price, skipping");
                    None
                }
            }
        }))
        .await
        .into_iter()
        .flatten()
        .collect();

        let mut summary = ValidationSummary::default();
        for prediction in &pending {
            let Some(&actual) = prices.get(&prediction.symbol) else {
                summary.skipped += 1;
                continue;
            };

            let status = evaluate(prediction.action, prediction.current_price, actual);
            self.store
                .update_status(prediction.id, status, Some(actual))
                .await?;

            summary.validated += 1;
            match status {
                PredictionStatus::Correct => summary.correct += 1,
                _ => summary.incorrect += 1,
            }
        }

        let summary = summary.finish();
        info!(
            validated = summary.validated,
            correct = summary.correct,
            skipped = summary.skipped,
            accuracy = summary.accuracy,
            "validation complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StockError;
    use crate::market::MockMarketDataSource;
    use crate::store::MemoryPredictionStore;
    use crate::store::test_support::record;

    #[test]
    fn test_evaluate_rules() {
        assert_eq!(evaluate(Action::Buy, 100.0, 101.5), PredictionStatus::Correct);
        assert_eq!(evaluate(Action::Buy, 100.0, 101.0), PredictionStatus::Incorrect);
        assert_eq!(evaluate(Action::Sell, 100.0, 98.5), PredictionStatus::Correct);
        assert_eq!(evaluate(Action::Sell, 100.0, 99.5), PredictionStatus::Incorrect);
        assert_eq!(evaluate(Action::Hold, 100.0, 101.9), PredictionStatus::Correct);
        assert_eq!(evaluate(Action::Hold, 100.0, 97.0), PredictionStatus::Incorrect);
        assert_eq!(evaluate(Action::Hold, 0.0, 97.0), PredictionStatus::Incorrect);
    }

    #[tokio::test]
    async fn test_validate_before_updates_store() {
        let store = Arc::new(MemoryPredictionStore::new());
        let buy = record("TCS", Action::Buy, 100.0, 2);
        let sell = record("TCS", Action::Sell, 100.0, 3);
        let fresh = record("TCS", Action::Buy, 100.0, 0);
        let missing = record("GONE", Action::Hold, 10.0, 2);
        for r in [&buy, &sell, &fresh, &missing] {
            store.save(r).await.unwrap();
        }

        let mut market = MockMarketDataSource::new();
        market.expect_latest_price().times(2).returning(|symbol| match symbol {
            "TCS" => Ok(103.0),
            other => Err(StockError::DataUnavailable {
                symbol: other.to_string(),
                reason: "delisted".to_string(),
            }),
        });

        let validator = PredictionValidator::new(store.clone(), Arc::new(market));
        let cutoff = Utc::now() - chrono::Duration::hours(12);
        let summary = validator.validate_before(cutoff).await.unwrap();

        assert_eq!(summary.validated, 2);
        assert_eq!(summary.correct, 1);
        assert_eq!(summary.incorrect, 1);
        assert_eq!(summary.skipped, 1);
        assert!((summary.accuracy - 50.0).abs() < f64::EPSILON);

        let buy = store.get(buy.id).await.unwrap().unwrap();
        assert_eq!(buy.status, PredictionStatus::Correct);
        assert_eq!(buy.actual_price, Some(103.0));
        let sell = store.get(sell.id).await.unwrap().unwrap();
        assert_eq!(sell.status, PredictionStatus::Incorrect);
        let fresh = store.get(fresh.id).await.unwrap().unwrap();
        assert_eq!(fresh.status, PredictionStatus::Pending);
        let missing = store.get(missing.id).await.unwrap().unwrap();
        assert_eq!(missing.status, PredictionStatus::Pending);
    }

    #[tokio::test]
    async fn test_nothing_pending() {
        let store = Arc::new(MemoryPredictionStore::new());
        let market = MockMarketDataSource::new();
        let validator = PredictionValidator::new(store, Arc::new(market));
        let summary = validator.validate_pending().await.unwrap();
        assert_eq!(summary, ValidationSummary::default());
    }
}
