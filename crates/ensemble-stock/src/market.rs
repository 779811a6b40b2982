//! Market data types and the source trait

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV candle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Latest price plus the history needed for indicators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub current_price: f64,
    pub previous_close: Option<f64>,
    /// Change against the previous close, in percent
    pub price_change_percent: Option<f64>,
    /// Chronological, oldest first
    pub bars: Vec<Bar>,
}

impl MarketSnapshot {
    /// Build a snapshot from chronological bars
    ///
    /// The last close is the current price and the one before it is the
    /// previous close. Returns `None` for an empty history.
    pub fn from_bars(symbol: impl Into<String>, bars: Vec<Bar>) -> Option<Self> {
        let current_price = bars.last()?.close;
        let previous_close = bars.len().checked_sub(2).map(|i| bars[i].close);
        Some(Self {
            symbol: symbol.into(),
            current_price,
            previous_close,
            price_change_percent: previous_close.and_then(|prev| percent_change(prev, current_price)),
            bars,
        })
    }
}

/// Percentage move from `from` to `to`; `None` when `from` is not positive
pub fn percent_change(from: f64, to: f64) -> Option<f64> {
    (from > 0.0).then(|| (to - from) / from * 100.0)
}

/// Source of quotes and history
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Latest price and daily history over `range` (e.g. "3mo", "1y")
    async fn snapshot(&self, symbol: &str, range: &str) -> Result<MarketSnapshot>;

    /// Latest traded price
    async fn latest_price(&self, symbol: &str) -> Result<f64>;
}
