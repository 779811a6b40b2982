//! Watchlist price monitor
//!
//! Keeps a baseline price per symbol. A move from the baseline past the drop
//! or spike threshold runs a full ensemble analysis with that move as the
//! price change, records the result and resets the baseline.

use crate::config::EnsembleConfig;
use crate::market::{MarketDataSource, percent_change};
use crate::orchestrator::EnsembleOrchestrator;
use crate::result::AnalysisRequest;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Direction of a threshold crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    PriceDrop,
    PriceSpike,
}

impl TriggerKind {
    /// Kind of crossing for a move of `change` percent, if any
    pub fn classify(change: f64, drop_threshold: f64, spike_threshold: f64) -> Option<Self> {
        if change <= -drop_threshold {
            Some(Self::PriceDrop)
        } else if change >= spike_threshold {
            Some(Self::PriceSpike)
        } else {
            None
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PriceDrop => "price_drop",
            Self::PriceSpike => "price_spike",
        })
    }
}

/// One threshold crossing and what came of it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTrigger {
    pub symbol: String,
    pub kind: TriggerKind,
    pub baseline: f64,
    pub price: f64,
    pub change_percent: f64,
    /// Stored prediction id when the analysis ran and was recorded
    pub prediction_id: Option<uuid::Uuid>,
}

/// Polls a watchlist and analyses symbols that move sharply
pub struct PriceWatcher {
    orchestrator: Arc<EnsembleOrchestrator>,
    market: Arc<dyn MarketDataSource>,
    symbols: Vec<String>,
    drop_threshold: f64,
    spike_threshold: f64,
    poll_interval: Duration,
    history_range: String,
    baselines: HashMap<String, f64>,
}

impl PriceWatcher {
    pub fn new(
        orchestrator: Arc<EnsembleOrchestrator>,
        market: Arc<dyn MarketDataSource>,
        symbols: Vec<String>,
    ) -> Self {
        let defaults = EnsembleConfig::default();
        Self {
            orchestrator,
            market,
            symbols,
            drop_threshold: defaults.price_drop_threshold,
            spike_threshold: defaults.price_spike_threshold,
            poll_interval: defaults.poll_interval,
            history_range: "3mo".to_string(),
            baselines: HashMap::new(),
        }
    }

    /// Watcher using the watchlist, thresholds and interval from `config`
    pub fn from_config(
        config: &EnsembleConfig,
        orchestrator: Arc<EnsembleOrchestrator>,
        market: Arc<dyn MarketDataSource>,
    ) -> Self {
        Self::new(orchestrator, market, config.watchlist.clone())
            .with_thresholds(config.price_drop_threshold, config.price_spike_threshold)
            .with_poll_interval(config.poll_interval)
    }

    /// Percent moves that trigger an analysis; both are positive
    pub fn with_thresholds(mut self, drop: f64, spike: f64) -> Self {
        self.drop_threshold = drop;
        self.spike_threshold = spike;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// History range fetched for indicators when a trigger fires
    pub fn with_history_range(mut self, range: impl Into<String>) -> Self {
        self.history_range = range.into();
        self
    }

    pub fn baseline(&self, symbol: &str) -> Option<f64> {
        self.baselines.get(symbol).copied()
    }

    /// Check every symbol once; returns the crossings found
    ///
    /// The first price seen for a symbol only sets its baseline. Errors are
    /// logged per symbol and never stop the sweep.
    pub async fn poll_once(&mut self) -> Vec<PriceTrigger> {
        let mut triggers = Vec::new();
        let symbols = self.symbols.clone();

        for symbol in symbols {
            let price = match self.market.latest_price(&symbol).await {
                Ok(price) if price > 0.0 => price,
                Ok(price) => {
                    warn!(symbol = %symbol, price, "ignoring non-positive price");
                    continue;
                }
                Err(err) => {
                    warn!(symbol = %symbol, error = %err, "price lookup failed");
                    continue;
                }
            };

            let Some(baseline) = self.baselines.get(&symbol).copied() else {
                debug!(symbol = %symbol, price, "baseline set");
                self.baselines.insert(symbol, price);
                continue;
            };

            let Some(change) = percent_change(baseline, price) else {
                self.baselines.insert(symbol, price);
                continue;
            };
            let Some(kind) = TriggerKind::classify(change, self.drop_threshold, self.spike_threshold)
            else {
                continue;
            };

            info!(symbol = %symbol, %kind, baseline, price, change, "price trigger");
            let prediction_id = self.analyze(&symbol, price, change).await;
            self.baselines.insert(symbol.clone(), price);

            triggers.push(PriceTrigger {
                symbol,
                kind,
                baseline,
                price,
                change_percent: change,
                prediction_id,
            });
        }

        triggers
    }

    /// Poll forever at the configured interval; stop by dropping the future
    pub async fn run(mut self) {
        info!(
            symbols = ?self.symbols,
            drop = self.drop_threshold,
            spike = self.spike_threshold,
            "price watcher started"
        );
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let triggers = self.poll_once().await;
            if !triggers.is_empty() {
                debug!(count = triggers.len(), "poll finished with triggers");
            }
        }
    }

    async fn analyze(&self, symbol: &str, price: f64, change: f64) -> Option<uuid::Uuid> {
        let bars = match self.market.snapshot(symbol, &self.history_range).await {
            Ok(snapshot) => snapshot.bars,
            Err(err) => {
                warn!(symbol, error = %err, "history unavailable, analysing without it");
                Vec::new()
            }
        };

        let request = AnalysisRequest::new(symbol, price, bars).with_price_change(change);
        let budget = self.orchestrator.analysis_timeout();
        match self.orchestrator.analyze_with_timeout(request, budget).await {
            Ok(result) => {
                info!(
                    symbol,
                    action = %result.final_decision.action,
                    confidence = %result.final_decision.confidence,
                    "triggered analysis complete"
                );
                self.orchestrator.record(&result).await
            }
            Err(err) => {
                error!(symbol, error = %err, "triggered analysis failed");
                None
            }
        }
    }
}
