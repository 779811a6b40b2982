//! Daily quotes from Yahoo Finance

use crate::error::{Result, StockError};
use crate::market::{Bar, MarketDataSource, MarketSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use std::fmt::Display;
use time::OffsetDateTime;
use tracing::{debug, instrument};
use yahoo_finance_api::{Quote, YahooConnector};

fn upstream(err: impl Display) -> StockError {
    StockError::YahooFinanceError(err.to_string())
}

fn to_offset(instant: DateTime<Utc>) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(instant.timestamp()).map_err(upstream)
}

/// Yahoo fills gaps in a series with zero or NaN closes
fn usable_close(close: f64) -> bool {
    close.is_finite() && close > 0.0
}

fn to_bar(quote: &Quote) -> Option<Bar> {
    if !usable_close(quote.close) {
        return None;
    }
    Some(Bar {
        timestamp: DateTime::from_timestamp(i64::try_from(quote.timestamp).ok()?, 0)?,
        open: quote.open,
        high: quote.high,
        low: quote.low,
        close: quote.close,
        volume: quote.volume,
    })
}

/// Stateless client; a connector is opened per call
#[derive(Debug, Default, Clone)]
pub struct YahooFinanceClient;

impl YahooFinanceClient {
    pub fn new() -> Self {
        Self
    }

    /// Daily bars in `[start, end]`, oldest first
    #[instrument(skip(self))]
    pub async fn history(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>> {
        let response = YahooConnector::new()
            .map_err(upstream)?
            .get_quote_history(symbol, to_offset(start)?, to_offset(end)?)
            .await
            .map_err(upstream)?;

        let mut bars: Vec<Bar> = response
            .quotes()
            .map_err(upstream)?
            .iter()
            .filter_map(to_bar)
            .collect();
        bars.sort_by_key(|bar| bar.timestamp);

        debug!(bars = bars.len(), "history loaded");
        Ok(bars)
    }
}

/// First instant covered by a Yahoo range code such as `3mo` or `ytd`
pub fn range_start(range: &str, end: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let days = match range {
        "5d" => 5,
        "1mo" => 30,
        "3mo" => 90,
        "6mo" => 180,
        "1y" => 365,
        "2y" => 730,
        "5y" => 1825,
        "ytd" => {
            return NaiveDate::from_ymd_opt(end.year(), 1, 1)
                .and_then(|jan1| jan1.and_hms_opt(0, 0, 0))
                .map(|midnight| midnight.and_utc())
                .ok_or_else(|| {
                    StockError::InvalidRequest(format!("no January 1st in {}", end.year()))
                });
        }
        other => {
            return Err(StockError::InvalidRequest(format!(
                "unknown history range {other:?}"
            )));
        }
    };
    Ok(end - Duration::days(days))
}

#[async_trait]
impl MarketDataSource for YahooFinanceClient {
    async fn snapshot(&self, symbol: &str, range: &str) -> Result<MarketSnapshot> {
        let end = Utc::now();
        let bars = self.history(symbol, range_start(range, end)?, end).await?;

        MarketSnapshot::from_bars(symbol, bars).ok_or_else(|| StockError::DataUnavailable {
            symbol: symbol.to_string(),
            reason: format!("no quotes in range {range}"),
        })
    }

    async fn latest_price(&self, symbol: &str) -> Result<f64> {
        let response = YahooConnector::new()
            .map_err(upstream)?
            .get_latest_quotes(symbol, "1d")
            .await
            .map_err(upstream)?;

        let quote = response.last_quote().map_err(upstream)?;
        if usable_close(quote.close) {
            Ok(quote.close)
        } else {
            Err(StockError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "latest quote has no usable close".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_start() {
        let end = Utc::now();
        assert_eq!(range_start("3mo", end).unwrap(), end - Duration::days(90));
        assert_eq!(range_start("5d", end).unwrap(), end - Duration::days(5));

        let ytd = range_start("ytd", end).unwrap();
        assert!(ytd <= end);
        assert_eq!((ytd.month(), ytd.day()), (1, 1));

        assert!(matches!(
            range_start("7w", end),
            Err(StockError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_gap_closes_are_unusable() {
        assert!(!usable_close(f64::NAN));
        assert!(!usable_close(f64::INFINITY));
        assert!(!usable_close(0.0));
        assert!(usable_close(103.5));
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_snapshot() {
        let client = YahooFinanceClient::new();
        let snapshot = client.snapshot("AAPL", "3mo").await.unwrap();
        assert!(snapshot.current_price > 0.0);
        assert!(snapshot.bars.len() > 20);
    }
}
