//! Tolerant parsers for `LABEL: value` model answers
//!
//! Every analyst is asked to answer in a fixed line format such as
//!
//! ```text
//! SENTIMENT: bullish
//! SCORE: 72
//! DRIVERS: strong quarterly results
//! MOOD: optimistic
//! ```
//!
//! Models rarely comply exactly, so parsing never fails. For each line the
//! first label (in the parser's fixed order) contained in the line wins and
//! the value is the text after it. Unmatched lines are ignored, a later line
//! for the same label overwrites an earlier one, and a number that cannot be
//! read leaves its field empty. When no label matches at all the raw text is
//! kept on the opinion.
//!
//! Opinions keep every field optional. Defaults (neutral, hold, medium, 50)
//! are applied by the `*_or_default` accessors where the values are used.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Score used wherever a numeric opinion is missing
pub const DEFAULT_SCORE: f64 = 50.0;

/// Shared behaviour of the four opinion records
pub trait Opinion: Sized + Send + 'static {
    /// Stub recorded when the analyst task failed
    fn failed(error: String, message: &str) -> Self;

    /// Whether this opinion is an error stub
    fn is_error(&self) -> bool;
}

macro_rules! category {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $word:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Lowercase wire name
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $word),+
                }
            }

            /// First word of `value` naming a variant, ignoring case and punctuation
            pub fn find_in(value: &str) -> Option<Self> {
                value
                    .split(|c: char| !c.is_ascii_alphabetic())
                    .find_map(|word| match word.to_ascii_lowercase().as_str() {
                        $($word => Some(Self::$variant),)+
                        _ => None,
                    })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

category!(
    /// Sentiment analyst verdict
    SentimentCategory {
        Bullish => "bullish",
        Bearish => "bearish",
        Neutral => "neutral",
    }
);

category!(
    /// Technical analyst verdict
    TechnicalSignal {
        Buy => "buy",
        Sell => "sell",
        Hold => "hold",
    }
);

category!(
    /// Risk analyst verdict
    RiskLevel {
        Low => "low",
        Medium => "medium",
        High => "high",
        Extreme => "extreme",
    }
);

/// Sentiment analyst answer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentOpinion {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<SentimentCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drivers: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SentimentOpinion {
    pub fn sentiment_or_default(&self) -> SentimentCategory {
        self.sentiment.unwrap_or(SentimentCategory::Neutral)
    }

    pub fn score_or_default(&self) -> f64 {
        self.score.unwrap_or(DEFAULT_SCORE)
    }
}

/// Technical analyst answer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalOpinion {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<TechnicalSignal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_indicators: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patterns: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TechnicalOpinion {
    pub fn signal_or_default(&self) -> TechnicalSignal {
        self.signal.unwrap_or(TechnicalSignal::Hold)
    }

    pub fn strength_or_default(&self) -> f64 {
        self.strength.unwrap_or(DEFAULT_SCORE)
    }
}

/// Risk analyst answer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskOpinion {
    /// 0..=100, higher is riskier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_factors: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downside: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_reward: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RiskOpinion {
    pub fn risk_score_or_default(&self) -> f64 {
        self.risk_score.unwrap_or(DEFAULT_SCORE)
    }

    pub fn risk_level_or_default(&self) -> RiskLevel {
        self.risk_level.unwrap_or(RiskLevel::Medium)
    }
}

/// Anomaly detector answer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalyOpinion {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly_detected: Option<bool>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub anomaly_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AnomalyOpinion {
    /// Result used when no price change is known
    pub fn no_price_change() -> Self {
        Self {
            anomaly_detected: Some(false),
            reason: Some("No price change data".to_string()),
            ..Self::default()
        }
    }

    pub fn detected(&self) -> bool {
        self.anomaly_detected.unwrap_or(false)
    }
}

macro_rules! impl_opinion {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Opinion for $ty {
                fn failed(error: String, message: &str) -> Self {
                    Self {
                        error: Some(error),
                        message: Some(message.to_string()),
                        ..Self::default()
                    }
                }

                fn is_error(&self) -> bool {
                    self.error.is_some()
                }
            }
        )+
    };
}

impl_opinion!(SentimentOpinion, TechnicalOpinion, RiskOpinion);

impl Opinion for AnomalyOpinion {
    fn failed(error: String, message: &str) -> Self {
        Self {
            anomaly_detected: Some(false),
            error: Some(error),
            message: Some(message.to_string()),
            ..Self::default()
        }
    }

    fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// `(label index, value)` for every line that carries one of `labels`
///
/// A line holding several labels is read under the first of them in
/// `labels` order, not the first in the line.
fn scan<'a>(text: &'a str, labels: &[&str]) -> Vec<(usize, &'a str)> {
    text.lines()
        .filter_map(|line| {
            labels.iter().enumerate().find_map(|(i, label)| {
                line.find(label)
                    .map(|pos| (i, clean_value(&line[pos + label.len()..])))
            })
        })
        .collect()
}

fn clean_value(value: &str) -> &str {
    value.trim().trim_start_matches('*').trim()
}

/// `Yes`, `YES - volume spike`; not `No, yesterday ...`
fn affirmative(value: &str) -> bool {
    let word = value
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or_default();
    word.eq_ignore_ascii_case("yes")
}

fn text_value(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Leading number of `value` clamped to 0..=100
///
/// Prose after the number is fine (`75 out of 100`, `61/100`); a range or
/// placeholder such as `60-70` or `[0-100]` is not a number.
fn score_value(value: &str) -> Option<f64> {
    let end = value
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && (c == '-' || c == '+'))))
        .map_or(value.len(), |(i, _)| i);
    let mut rest = value[end..].chars();
    match (rest.next(), rest.next()) {
        (Some('-' | '\u{2013}'), _) => return None,
        (Some(','), Some(next)) if next.is_ascii_digit() => return None,
        _ => {}
    }
    let number: f64 = value[..end].trim_end_matches('.').parse().ok()?;
    number.is_finite().then(|| number.clamp(0.0, 100.0))
}

/// Parse a sentiment answer (`SENTIMENT`, `SCORE`, `DRIVERS`, `MOOD`)
pub fn parse_sentiment(text: &str) -> SentimentOpinion {
    let fields = scan(text, &["SENTIMENT:", "SCORE:", "DRIVERS:", "MOOD:"]);
    let mut opinion = SentimentOpinion::default();
    if fields.is_empty() {
        opinion.raw = Some(text.to_string());
        return opinion;
    }
    for (label, value) in fields {
        match label {
            0 => opinion.sentiment = SentimentCategory::find_in(value),
            1 => {
                if let Some(score) = score_value(value) {
                    opinion.score = Some(score);
                }
            }
            2 => opinion.drivers = text_value(value),
            _ => opinion.mood = text_value(value),
        }
    }
    opinion
}

/// Parse a technical answer (`SIGNAL`, `STRENGTH`, `KEY_INDICATORS`, `PATTERNS`)
pub fn parse_technical(text: &str) -> TechnicalOpinion {
    let fields = scan(text, &["SIGNAL:", "STRENGTH:", "KEY_INDICATORS:", "PATTERNS:"]);
    let mut opinion = TechnicalOpinion::default();
    if fields.is_empty() {
        opinion.raw = Some(text.to_string());
        return opinion;
    }
    for (label, value) in fields {
        match label {
            0 => opinion.signal = TechnicalSignal::find_in(value),
            1 => {
                if let Some(strength) = score_value(value) {
                    opinion.strength = Some(strength);
                }
            }
            2 => opinion.key_indicators = text_value(value),
            _ => opinion.patterns = text_value(value),
        }
    }
    opinion
}

/// Parse a risk answer (`RISK_SCORE`, `RISK_LEVEL`, `RISK_FACTORS`, `DOWNSIDE`, `RISK_REWARD`)
pub fn parse_risk(text: &str) -> RiskOpinion {
    let fields = scan(
        text,
        &[
            "RISK_SCORE:",
            "RISK_LEVEL:",
            "RISK_FACTORS:",
            "DOWNSIDE:",
            "RISK_REWARD:",
        ],
    );
    let mut opinion = RiskOpinion::default();
    if fields.is_empty() {
        opinion.raw = Some(text.to_string());
        return opinion;
    }
    for (label, value) in fields {
        match label {
            0 => {
                if let Some(score) = score_value(value) {
                    opinion.risk_score = Some(score);
                }
            }
            1 => opinion.risk_level = RiskLevel::find_in(value),
            2 => opinion.risk_factors = text_value(value),
            3 => opinion.downside = text_value(value),
            _ => opinion.risk_reward = text_value(value),
        }
    }
    opinion
}

/// Parse an anomaly answer (`ANOMALY`, `TYPE`, `SEVERITY`, `REASON`)
pub fn parse_anomaly(text: &str) -> AnomalyOpinion {
    let fields = scan(text, &["ANOMALY:", "TYPE:", "SEVERITY:", "REASON:"]);
    let mut opinion = AnomalyOpinion::default();
    if fields.is_empty() {
        opinion.raw = Some(text.to_string());
        return opinion;
    }
    for (label, value) in fields {
        match label {
            0 => opinion.anomaly_detected = Some(affirmative(value)),
            1 => opinion.anomaly_type = text_value(value),
            2 => opinion.severity = text_value(value),
            _ => opinion.reason = text_value(value),
        }
    }
    opinion
}
