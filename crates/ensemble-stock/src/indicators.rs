//! Technical indicators over OHLCV history
//!
//! Indicators are computed with the `ta` crate and each one is only reported
//! once enough bars exist for its window. With fewer than
//! [`MIN_BARS`] bars the whole snapshot is flagged as insufficient and every
//! signal is `unknown`.

use crate::error::{Result, StockError};
use crate::market::Bar;
use serde::{Deserialize, Serialize};
use std::fmt;
use ta::Next;
use ta::indicators::{
    BollingerBands, MovingAverageConvergenceDivergence, RelativeStrengthIndex,
    SimpleMovingAverage,
};

/// Minimum history for any indicator evidence
pub const MIN_BARS: usize = 20;

const RSI_PERIOD: usize = 14;
const SMA_SHORT: usize = 20;
const SMA_LONG: usize = 50;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;
const BB_PERIOD: usize = 20;
const BB_STD_DEV: f64 = 2.0;
const VOLUME_WINDOW: usize = 20;
const VOLUME_SURGE: f64 = 1.5;

/// Interpretation of a single indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorSignal {
    Bullish,
    Bearish,
    Neutral,
    Overbought,
    Oversold,
    Unknown,
}

impl fmt::Display for IndicatorSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bullish => "bullish",
            Self::Bearish => "bearish",
            Self::Neutral => "neutral",
            Self::Overbought => "overbought",
            Self::Oversold => "oversold",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Consolidated BUY/SELL/HOLD from the indicator vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OverallSignal {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for OverallSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RsiReading {
    pub value: Option<f64>,
    pub signal: IndicatorSignal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmaReading {
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub signal: IndicatorSignal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacdReading {
    pub macd: Option<f64>,
    pub signal_line: Option<f64>,
    pub signal: IndicatorSignal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BollingerReading {
    pub upper: Option<f64>,
    pub lower: Option<f64>,
    pub signal: IndicatorSignal,
}

/// Volume against its 20-bar average
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeReading {
    pub current: Option<u64>,
    pub average_20d: Option<u64>,
    /// "high" when the last bar exceeds 1.5x the average, else "normal"
    pub signal: String,
}

/// Every indicator for one symbol at the last bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub rsi: RsiReading,
    pub sma: SmaReading,
    pub macd: MacdReading,
    pub bollinger_bands: BollingerReading,
    pub volume: VolumeReading,
    pub overall_signal: OverallSignal,
    /// Set when the history was too short to say anything
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub insufficient_data: bool,
}

impl IndicatorSnapshot {
    /// Snapshot carrying no evidence at all
    pub fn unknown() -> Self {
        Self {
            rsi: RsiReading {
                value: None,
                signal: IndicatorSignal::Unknown,
            },
            sma: SmaReading {
                sma_20: None,
                sma_50: None,
                signal: IndicatorSignal::Unknown,
            },
            macd: MacdReading {
                macd: None,
                signal_line: None,
                signal: IndicatorSignal::Unknown,
            },
            bollinger_bands: BollingerReading {
                upper: None,
                lower: None,
                signal: IndicatorSignal::Unknown,
            },
            volume: VolumeReading {
                current: None,
                average_20d: None,
                signal: "unknown".to_string(),
            },
            overall_signal: OverallSignal::Hold,
            insufficient_data: true,
        }
    }

    /// Whether the orchestrator should treat this as indicator evidence
    pub fn has_evidence(&self) -> bool {
        !self.insufficient_data
    }

    /// `KEY: value` lines for model prompts
    pub fn prompt_lines(&self) -> Vec<String> {
        if !self.has_evidence() {
            return Vec::new();
        }
        vec![
            format!(
                "RSI: {} ({})",
                fmt_opt(self.rsi.value),
                self.rsi.signal
            ),
            format!(
                "SMA: sma_20={}, sma_50={} ({})",
                fmt_opt(self.sma.sma_20),
                fmt_opt(self.sma.sma_50),
                self.sma.signal
            ),
            format!(
                "MACD: macd={}, signal_line={} ({})",
                fmt_opt(self.macd.macd),
                fmt_opt(self.macd.signal_line),
                self.macd.signal
            ),
            format!(
                "BOLLINGER_BANDS: upper={}, lower={} ({})",
                fmt_opt(self.bollinger_bands.upper),
                fmt_opt(self.bollinger_bands.lower),
                self.bollinger_bands.signal
            ),
            format!(
                "VOLUME: current={}, average_20d={} ({})",
                self.volume.current.map_or("N/A".to_string(), |v| v.to_string()),
                self.volume
                    .average_20d
                    .map_or("N/A".to_string(), |v| v.to_string()),
                self.volume.signal
            ),
            format!("OVERALL_SIGNAL: {}", self.overall_signal),
        ]
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{v:.2}"))
}

/// Turns bar history into an [`IndicatorSnapshot`]
pub trait IndicatorProvider: Send + Sync {
    /// Compute indicators at the last bar; bars are oldest first
    fn calculate(&self, bars: &[Bar]) -> Result<IndicatorSnapshot>;
}

/// [`IndicatorProvider`] backed by the `ta` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct TaIndicatorProvider;

impl IndicatorProvider for TaIndicatorProvider {
    fn calculate(&self, bars: &[Bar]) -> Result<IndicatorSnapshot> {
        calculate_indicators(bars)
    }
}

/// Compute every indicator at the last bar
pub fn calculate_indicators(bars: &[Bar]) -> Result<IndicatorSnapshot> {
    if bars.len() < MIN_BARS {
        return Ok(IndicatorSnapshot::unknown());
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    if closes.iter().any(|c| !c.is_finite()) {
        return Err(StockError::IndicatorError(
            "non-finite close in history".to_string(),
        ));
    }
    let n = closes.len();
    let price = closes[n - 1];

    let rsi_value = if n > RSI_PERIOD {
        let mut rsi = RelativeStrengthIndex::new(RSI_PERIOD)
            .map_err(|e| StockError::IndicatorError(e.to_string()))?;
        last_of(closes.iter().map(|&c| rsi.next(c)))
    } else {
        None
    };

    let sma_20 = sma_at_end(&closes, SMA_SHORT)?;
    let sma_50 = sma_at_end(&closes, SMA_LONG)?;

    let (macd, signal_line) = {
        let mut indicator =
            MovingAverageConvergenceDivergence::new(MACD_FAST, MACD_SLOW, MACD_SIGNAL)
                .map_err(|e| StockError::IndicatorError(e.to_string()))?;
        let last = last_of(closes.iter().map(|&c| indicator.next(c)));
        let macd = last.as_ref().filter(|_| n >= MACD_SLOW).map(|o| o.macd);
        let signal = last
            .as_ref()
            .filter(|_| n >= MACD_SLOW + MACD_SIGNAL - 1)
            .map(|o| o.signal);
        (macd, signal)
    };

    let (bb_upper, bb_lower) = {
        let mut bb = BollingerBands::new(BB_PERIOD, BB_STD_DEV)
            .map_err(|e| StockError::IndicatorError(e.to_string()))?;
        match last_of(closes.iter().map(|&c| bb.next(c))) {
            Some(out) if n >= BB_PERIOD => (Some(out.upper), Some(out.lower)),
            _ => (None, None),
        }
    };

    let window = &bars[n.saturating_sub(VOLUME_WINDOW)..];
    let avg_volume = window.iter().map(|b| b.volume as f64).sum::<f64>() / window.len() as f64;
    let current_volume = bars[n - 1].volume;

    let rsi = RsiReading {
        value: rsi_value.map(round2),
        signal: interpret_rsi(rsi_value),
    };
    let sma = SmaReading {
        sma_20: sma_20.map(round2),
        sma_50: sma_50.map(round2),
        signal: interpret_sma(price, sma_20, sma_50),
    };
    let macd = MacdReading {
        macd: macd.map(round2),
        signal_line: signal_line.map(round2),
        signal: interpret_macd(macd, signal_line),
    };
    let bollinger_bands = BollingerReading {
        upper: bb_upper.map(round2),
        lower: bb_lower.map(round2),
        signal: interpret_bollinger(price, bb_upper, bb_lower),
    };
    let volume = VolumeReading {
        current: Some(current_volume),
        average_20d: Some(avg_volume as u64),
        signal: if current_volume as f64 > avg_volume * VOLUME_SURGE {
            "high".to_string()
        } else {
            "normal".to_string()
        },
    };

    let overall_signal = overall_signal(
        rsi.signal,
        sma.signal,
        macd.signal,
        bollinger_bands.signal,
    );

    Ok(IndicatorSnapshot {
        rsi,
        sma,
        macd,
        bollinger_bands,
        volume,
        overall_signal,
        insufficient_data: false,
    })
}

fn last_of<T>(iter: impl Iterator<Item = T>) -> Option<T> {
    iter.last()
}

fn sma_at_end(closes: &[f64], period: usize) -> Result<Option<f64>> {
    if closes.len() < period {
        return Ok(None);
    }
    let mut sma =
        SimpleMovingAverage::new(period).map_err(|e| StockError::IndicatorError(e.to_string()))?;
    Ok(last_of(closes.iter().map(|&c| sma.next(c))))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn interpret_rsi(rsi: Option<f64>) -> IndicatorSignal {
    match rsi {
        None => IndicatorSignal::Unknown,
        Some(v) if v > 70.0 => IndicatorSignal::Overbought,
        Some(v) if v < 30.0 => IndicatorSignal::Oversold,
        Some(_) => IndicatorSignal::Neutral,
    }
}

fn interpret_sma(price: f64, sma20: Option<f64>, sma50: Option<f64>) -> IndicatorSignal {
    let (Some(s20), Some(s50)) = (sma20, sma50) else {
        return IndicatorSignal::Unknown;
    };
    if price > s20 && s20 > s50 {
        IndicatorSignal::Bullish
    } else if price < s20 && s20 < s50 {
        IndicatorSignal::Bearish
    } else {
        IndicatorSignal::Neutral
    }
}

fn interpret_macd(macd: Option<f64>, signal: Option<f64>) -> IndicatorSignal {
    match (macd, signal) {
        (Some(m), Some(s)) if m > s => IndicatorSignal::Bullish,
        (Some(_), Some(_)) => IndicatorSignal::Bearish,
        _ => IndicatorSignal::Unknown,
    }
}

fn interpret_bollinger(price: f64, upper: Option<f64>, lower: Option<f64>) -> IndicatorSignal {
    let (Some(upper), Some(lower)) = (upper, lower) else {
        return IndicatorSignal::Unknown;
    };
    if price >= upper {
        IndicatorSignal::Overbought
    } else if price <= lower {
        IndicatorSignal::Oversold
    } else {
        IndicatorSignal::Neutral
    }
}

/// Majority vote: three of four leaning the same way decides
fn overall_signal(
    rsi: IndicatorSignal,
    sma: IndicatorSignal,
    macd: IndicatorSignal,
    bollinger: IndicatorSignal,
) -> OverallSignal {
    let bullish = [
        rsi == IndicatorSignal::Oversold,
        sma == IndicatorSignal::Bullish,
        macd == IndicatorSignal::Bullish,
        bollinger == IndicatorSignal::Oversold,
    ]
    .iter()
    .filter(|&&b| b)
    .count();
    let bearish = [
        rsi == IndicatorSignal::Overbought,
        sma == IndicatorSignal::Bearish,
        macd == IndicatorSignal::Bearish,
        bollinger == IndicatorSignal::Overbought,
    ]
    .iter()
    .filter(|&&b| b)
    .count();

    if bullish >= 3 {
        OverallSignal::Buy
    } else if bearish >= 3 {
        OverallSignal::Sell
    } else {
        OverallSignal::Hold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bars_from(closes: &[f64]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: start + Duration::days(i as i64),
                open: close,
                high: close * 1.01,
                low: close * 0.99,
                close,
                volume: 1_000_000,
            })
            .collect()
    }

    #[test]
    fn test_insufficient_history() {
        let snapshot = calculate_indicators(&bars_from(&[100.0; 19])).unwrap();
        assert!(snapshot.insufficient_data);
        assert!(!snapshot.has_evidence());
        assert_eq!(snapshot.rsi.signal, IndicatorSignal::Unknown);
        assert_eq!(snapshot.overall_signal, OverallSignal::Hold);
        assert!(snapshot.prompt_lines().is_empty());
    }

    #[test]
    fn test_short_history_leaves_long_windows_unknown() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + f64::from(i)).collect();
        let snapshot = calculate_indicators(&bars_from(&closes)).unwrap();

        assert!(snapshot.has_evidence());
        assert!(snapshot.sma.sma_20.is_some());
        assert!(snapshot.sma.sma_50.is_none());
        assert_eq!(snapshot.sma.signal, IndicatorSignal::Unknown);
        assert!(snapshot.macd.macd.is_some());
        assert!(snapshot.macd.signal_line.is_none());
        assert_eq!(snapshot.macd.signal, IndicatorSignal::Unknown);
    }

    #[test]
    fn test_steady_uptrend_is_bullish() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + f64::from(i)).collect();
        let snapshot = calculate_indicators(&bars_from(&closes)).unwrap();

        assert_eq!(snapshot.rsi.signal, IndicatorSignal::Overbought);
        assert_eq!(snapshot.sma.signal, IndicatorSignal::Bullish);
        assert_eq!(snapshot.sma.sma_20, Some(149.5));
        assert_eq!(snapshot.sma.sma_50, Some(134.5));
        assert_eq!(snapshot.volume.signal, "normal");
        // Overbought RSI cancels out the trend followers
        assert_eq!(snapshot.overall_signal, OverallSignal::Hold);
    }

    #[test]
    fn test_steady_downtrend() {
        let closes: Vec<f64> = (0..60).map(|i| 200.0 - f64::from(i)).collect();
        let snapshot = calculate_indicators(&bars_from(&closes)).unwrap();

        assert_eq!(snapshot.rsi.signal, IndicatorSignal::Oversold);
        assert_eq!(snapshot.sma.signal, IndicatorSignal::Bearish);
    }

    #[test]
    fn test_volume_surge() {
        let mut bars = bars_from(&[100.0; 25]);
        if let Some(last) = bars.last_mut() {
            last.volume = 5_000_000;
        }
        let snapshot = calculate_indicators(&bars).unwrap();
        assert_eq!(snapshot.volume.signal, "high");
        assert_eq!(snapshot.volume.current, Some(5_000_000));
    }

    #[test]
    fn test_non_finite_close_rejected() {
        let mut bars = bars_from(&[100.0; 25]);
        bars[3].close = f64::NAN;
        assert!(matches!(
            calculate_indicators(&bars),
            Err(StockError::IndicatorError(_))
        ));
    }

    #[test]
    fn test_overall_vote() {
        use IndicatorSignal::*;
        assert_eq!(overall_signal(Oversold, Bullish, Bullish, Neutral), OverallSignal::Buy);
        assert_eq!(
            overall_signal(Overbought, Bearish, Bearish, Overbought),
            OverallSignal::Sell
        );
        assert_eq!(overall_signal(Oversold, Bullish, Bearish, Overbought), OverallSignal::Hold);
        assert_eq!(overall_signal(Unknown, Unknown, Unknown, Unknown), OverallSignal::Hold);
    }

    #[test]
    fn test_interpretation_boundaries() {
        assert_eq!(interpret_rsi(Some(70.0)), IndicatorSignal::Neutral);
        assert_eq!(interpret_rsi(Some(70.01)), IndicatorSignal::Overbought);
        assert_eq!(interpret_rsi(Some(30.0)), IndicatorSignal::Neutral);
        assert_eq!(interpret_macd(Some(1.0), Some(1.0)), IndicatorSignal::Bearish);
        assert_eq!(
            interpret_bollinger(110.0, Some(110.0), Some(90.0)),
            IndicatorSignal::Overbought
        );
        assert_eq!(
            interpret_bollinger(90.0, Some(110.0), Some(90.0)),
            IndicatorSignal::Oversold
        );
    }

    #[test]
    fn test_snapshot_serializes_lowercase_signals() {
        let json = serde_json::to_value(IndicatorSnapshot::unknown()).unwrap();
        assert_eq!(json["rsi"]["signal"], "unknown");
        assert_eq!(json["overall_signal"], "HOLD");
        assert_eq!(json["insufficient_data"], true);
    }
}
