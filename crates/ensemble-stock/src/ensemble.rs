//! Weighted ensemble scoring
//!
//! `score = sentiment*0.3 + technical_strength*0.4 + (100 - risk)*0.3`, then
//! a fixed ladder maps the score to an action and confidence tier. Price
//! targets scale with the score (BUY) or sit at fixed offsets.

use crate::parsers::{
    RiskLevel, RiskOpinion, SentimentCategory, SentimentOpinion, TechnicalOpinion,
    TechnicalSignal,
};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const SENTIMENT_WEIGHT: f64 = 0.3;
pub const TECHNICAL_WEIGHT: f64 = 0.4;
pub const RISK_WEIGHT: f64 = 0.3;

/// Recommended action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
        }
    }

    /// Parse a stored verdict, ignoring case
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "BUY" => Some(Self::Buy),
            "SELL" => Some(Self::Sell),
            "HOLD" => Some(Self::Hold),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confidence tier attached to the action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "LOW" => Some(Self::Low),
            "MEDIUM" => Some(Self::Medium),
            "HIGH" => Some(Self::High),
            _ => None,
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Each specialist's categorical verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVotes {
    pub sentiment: SentimentCategory,
    pub technical: TechnicalSignal,
    pub risk: RiskLevel,
}

/// Combined recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleDecision {
    pub action: Action,
    pub confidence: ConfidenceTier,
    /// 0..=100, rounded to 2 decimals
    pub ensemble_score: f64,
    pub reasoning: String,
    pub model_votes: ModelVotes,
    pub target_price: f64,
    pub stop_loss: f64,
}

/// Weighted score from the three specialists, unrounded
pub fn ensemble_score(
    sentiment: &SentimentOpinion,
    technical: &TechnicalOpinion,
    risk: &RiskOpinion,
) -> f64 {
    sentiment.score_or_default() * SENTIMENT_WEIGHT
        + technical.strength_or_default() * TECHNICAL_WEIGHT
        + (100.0 - risk.risk_score_or_default()) * RISK_WEIGHT
}

/// Action ladder; lower bounds are inclusive
pub fn classify_score(score: f64) -> (Action, ConfidenceTier) {
    if score >= 70.0 {
        (Action::Buy, ConfidenceTier::High)
    } else if score >= 55.0 {
        (Action::Buy, ConfidenceTier::Medium)
    } else if score >= 45.0 {
        (Action::Hold, ConfidenceTier::Medium)
    } else if score >= 30.0 {
        (Action::Sell, ConfidenceTier::Medium)
    } else {
        (Action::Sell, ConfidenceTier::High)
    }
}

/// Human-readable reasons joined with `" | "`
pub fn reasoning(
    sentiment: &SentimentOpinion,
    technical: &TechnicalOpinion,
    risk: &RiskOpinion,
    action: Action,
) -> String {
    let mut reasons = Vec::new();

    match sentiment.sentiment_or_default() {
        SentimentCategory::Bullish => reasons.push("Positive market sentiment from news".to_string()),
        SentimentCategory::Bearish => reasons.push("Negative market sentiment from news".to_string()),
        SentimentCategory::Neutral => {}
    }

    match technical.signal_or_default() {
        TechnicalSignal::Buy => {
            reasons.push("Technical indicators show buying opportunity".to_string());
        }
        TechnicalSignal::Sell => reasons.push("Technical indicators suggest selling".to_string()),
        TechnicalSignal::Hold => {}
    }

    match risk.risk_level_or_default() {
        RiskLevel::High | RiskLevel::Extreme => reasons.push(format!(
            "High risk detected: {}",
            risk.risk_factors.as_deref().unwrap_or("multiple factors")
        )),
        RiskLevel::Low => reasons.push("Low risk environment supports position".to_string()),
        RiskLevel::Medium => {}
    }

    if reasons.is_empty() {
        format!("Consolidated analysis suggests {action}")
    } else {
        reasons.join(" | ")
    }
}

/// Exit target for the action
pub fn target_price(current_price: f64, action: Action, score: f64) -> f64 {
    match action {
        Action::Buy => {
            let gain_percent = 3.0 + (score - 50.0) * 0.1;
            round2(current_price * (1.0 + gain_percent / 100.0))
        }
        Action::Sell => round2(current_price * 0.98),
        Action::Hold => round2(current_price),
    }
}

/// Protective stop for the action
pub fn stop_loss(current_price: f64, action: Action, risk_score: f64) -> f64 {
    match action {
        Action::Buy => {
            let loss_percent = 2.0 + (risk_score / 100.0) * 3.0;
            round2(current_price * (1.0 - loss_percent / 100.0))
        }
        Action::Sell => round2(current_price * 1.02),
        Action::Hold => round2(current_price * 0.97),
    }
}

/// Full decision from the three specialist opinions
pub fn decide(
    current_price: f64,
    sentiment: &SentimentOpinion,
    technical: &TechnicalOpinion,
    risk: &RiskOpinion,
) -> EnsembleDecision {
    let score = ensemble_score(sentiment, technical, risk);
    let (action, confidence) = classify_score(score);

    EnsembleDecision {
        action,
        confidence,
        ensemble_score: round2(score),
        reasoning: reasoning(sentiment, technical, risk, action),
        model_votes: ModelVotes {
            sentiment: sentiment.sentiment_or_default(),
            technical: technical.signal_or_default(),
            risk: risk.risk_level_or_default(),
        },
        target_price: target_price(current_price, action, score),
        stop_loss: stop_loss(current_price, action, risk.risk_score_or_default()),
    }
}

/// Agreement between the specialists that actually reported a number
///
/// `max(0, 100 - population variance)` over the present values among
/// sentiment score, technical strength and inverted risk score; 50 when
/// none is present.
pub fn agreement_confidence(
    sentiment: &SentimentOpinion,
    technical: &TechnicalOpinion,
    risk: &RiskOpinion,
) -> f64 {
    let scores: Vec<f64> = [
        sentiment.score,
        technical.strength,
        risk.risk_score.map(|r| 100.0 - r),
    ]
    .into_iter()
    .flatten()
    .collect();

    if scores.is_empty() {
        return 50.0;
    }

    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let variance = scores.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    round2((100.0 - variance).clamp(0.0, 100.0))
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opinions(
        score: Option<f64>,
        strength: Option<f64>,
        risk_score: Option<f64>,
    ) -> (SentimentOpinion, TechnicalOpinion, RiskOpinion) {
        (
            SentimentOpinion {
                score,
                ..Default::default()
            },
            TechnicalOpinion {
                strength,
                ..Default::default()
            },
            RiskOpinion {
                risk_score,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_strong_buy_scenario() {
        let (mut s, mut t, mut r) = opinions(Some(80.0), Some(90.0), Some(10.0));
        s.sentiment = Some(SentimentCategory::Bullish);
        t.signal = Some(TechnicalSignal::Buy);
        r.risk_level = Some(RiskLevel::Low);

        let decision = decide(100.0, &s, &t, &r);
        assert!((decision.ensemble_score - 87.0).abs() < 1e-9);
        assert_eq!(decision.action, Action::Buy);
        assert_eq!(decision.confidence, ConfidenceTier::High);
        assert!((decision.target_price - 106.7).abs() < 1e-9);
        assert!((decision.stop_loss - 97.7).abs() < 1e-9);
        assert_eq!(
            decision.reasoning,
            "Positive market sentiment from news | Technical indicators show buying opportunity | Low risk environment supports position"
        );
        assert_eq!(decision.model_votes.risk, RiskLevel::Low);
    }

    #[test]
    fn test_neutral_scenario() {
        let (s, t, r) = opinions(Some(50.0), Some(50.0), Some(50.0));
        let decision = decide(250.0, &s, &t, &r);
        assert_eq!(decision.action, Action::Hold);
        assert_eq!(decision.confidence, ConfidenceTier::Medium);
        assert!((decision.target_price - 250.0).abs() < f64::EPSILON);
        assert!((decision.stop_loss - 242.5).abs() < 1e-9);
        assert_eq!(decision.reasoning, "Consolidated analysis suggests HOLD");
    }

    #[test]
    fn test_all_defaults_score_fifty() {
        let (s, t, r) = opinions(None, None, None);
        let decision = decide(10.0, &s, &t, &r);
        assert!((decision.ensemble_score - 50.0).abs() < 1e-9);
        assert_eq!(decision.action, Action::Hold);
        assert_eq!(
            decision.model_votes,
            ModelVotes {
                sentiment: SentimentCategory::Neutral,
                technical: TechnicalSignal::Hold,
                risk: RiskLevel::Medium,
            }
        );
        assert!((agreement_confidence(&s, &t, &r) - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ladder_boundaries_are_inclusive() {
        assert_eq!(classify_score(70.0), (Action::Buy, ConfidenceTier::High));
        assert_eq!(classify_score(69.99), (Action::Buy, ConfidenceTier::Medium));
        assert_eq!(classify_score(55.0), (Action::Buy, ConfidenceTier::Medium));
        assert_eq!(classify_score(45.0), (Action::Hold, ConfidenceTier::Medium));
        assert_eq!(classify_score(44.99), (Action::Sell, ConfidenceTier::Medium));
        assert_eq!(classify_score(30.0), (Action::Sell, ConfidenceTier::Medium));
        assert_eq!(classify_score(29.99), (Action::Sell, ConfidenceTier::High));
        assert_eq!(classify_score(0.0), (Action::Sell, ConfidenceTier::High));
        assert_eq!(classify_score(100.0), (Action::Buy, ConfidenceTier::High));
    }

    #[test]
    fn test_score_stays_in_range() {
        for &(a, b, c) in &[(0.0, 0.0, 100.0), (100.0, 100.0, 0.0), (33.0, 71.0, 12.0)] {
            let (s, t, r) = opinions(Some(a), Some(b), Some(c));
            let score = ensemble_score(&s, &t, &r);
            assert!((0.0..=100.0).contains(&score));
        }
    }

    #[test]
    fn test_sell_targets() {
        assert!((target_price(100.0, Action::Sell, 20.0) - 98.0).abs() < 1e-9);
        assert!((stop_loss(100.0, Action::Sell, 80.0) - 102.0).abs() < 1e-9);
    }

    #[test]
    fn test_high_risk_reasoning_uses_factors() {
        let (s, t, mut r) = opinions(None, None, Some(85.0));
        r.risk_level = Some(RiskLevel::Extreme);
        assert_eq!(
            reasoning(&s, &t, &r, Action::Sell),
            "High risk detected: multiple factors"
        );
        r.risk_factors = Some("regulatory probe".to_string());
        assert_eq!(
            reasoning(&s, &t, &r, Action::Sell),
            "High risk detected: regulatory probe"
        );
    }

    #[test]
    fn test_agreement_confidence() {
        // 80, 90, 90 -> mean 86.67, variance 22.22
        let (s, t, r) = opinions(Some(80.0), Some(90.0), Some(10.0));
        assert!((agreement_confidence(&s, &t, &r) - 77.78).abs() < 1e-9);

        // Only technical reported: variance 0
        let (s, t, r) = opinions(None, Some(10.0), None);
        assert!((agreement_confidence(&s, &t, &r) - 100.0).abs() < f64::EPSILON);

        // Wild disagreement floors at zero
        let (s, t, r) = opinions(Some(0.0), Some(100.0), None);
        assert!(agreement_confidence(&s, &t, &r).abs() < f64::EPSILON);
    }

    #[test]
    fn test_action_parse() {
        assert_eq!(Action::parse("buy"), Some(Action::Buy));
        assert_eq!(Action::parse("HOLD "), Some(Action::Hold));
        assert_eq!(Action::parse("maybe"), None);
        assert_eq!(ConfidenceTier::parse("medium"), Some(ConfidenceTier::Medium));
    }
}
