//! Prompt templates for the four analysts
//!
//! System prompts are fixed strings. User prompts are MiniJinja templates
//! rendered with the request data; each one ends with the exact
//! `LABEL: value` block the matching parser in [`crate::parsers`] reads.

use crate::error::Result;
use minijinja::{Environment, context};

/// Analyst seat in the ensemble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    Sentiment,
    Technical,
    Risk,
    Anomaly,
}

impl Task {
    /// Template and log name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sentiment => "sentiment",
            Self::Technical => "technical",
            Self::Risk => "risk",
            Self::Anomaly => "anomaly",
        }
    }

    /// Message stored on the stub when the task fails
    pub fn unavailable_message(&self) -> &'static str {
        match self {
            Self::Sentiment => "Sentiment analysis unavailable",
            Self::Technical => "Technical analysis unavailable",
            Self::Risk => "Risk assessment unavailable",
            Self::Anomaly => "Anomaly detection unavailable",
        }
    }

    /// System prompt for this seat
    pub fn system_prompt(&self) -> &'static str {
        match self {
            Self::Sentiment => SENTIMENT_SYSTEM,
            Self::Technical => TECHNICAL_SYSTEM,
            Self::Risk => RISK_SYSTEM,
            Self::Anomaly => ANOMALY_SYSTEM,
        }
    }
}

const SENTIMENT_SYSTEM: &str = "You are a financial news sentiment analyzer.
Analyze the news and provide:
1. Overall sentiment (bullish/bearish/neutral)
2. Sentiment score (0-100)
3. Key sentiment drivers
4. Market mood

Be concise and factual.";

const TECHNICAL_SYSTEM: &str = "You are a technical analysis expert.
Interpret technical indicators and identify patterns.
Provide:
1. Signal (buy/sell/hold)
2. Strength (0-100)
3. Key indicators
4. Pattern recognition

Focus on RSI, SMA, volume, and momentum.";

const RISK_SYSTEM: &str = "You are a risk assessment expert for stock trading.
Perform deep risk analysis considering:
1. Market volatility
2. News impact
3. Technical risks
4. Downside scenarios
5. Risk-reward ratio

Provide comprehensive risk evaluation.";

const ANOMALY_SYSTEM: &str = "You are an anomaly detection system for stock markets.
Detect unusual patterns:
1. Unusual price movements
2. Volume spikes
3. Technical divergences
4. Flash crashes/spikes

Be precise and alert-focused.";

const SENTIMENT_USER: &str = r"Stock: {{ symbol }}

Recent News:
{% if headlines %}{{ headlines | join('\n') }}{% else %}No recent news available.{% endif %}

Provide sentiment analysis in this format:
SENTIMENT: [bullish/bearish/neutral]
SCORE: [0-100]
DRIVERS: [key points]
MOOD: [market sentiment]";

const TECHNICAL_USER: &str = r"Stock: {{ symbol }}
Current Price: {{ price }}

Technical Indicators:
{% if indicators %}{{ indicators | join('\n') }}{% else %}No technical indicators available.{% endif %}

Provide technical analysis in this format:
SIGNAL: [buy/sell/hold]
STRENGTH: [0-100]
KEY_INDICATORS: [important signals]
PATTERNS: [identified patterns]";

const RISK_USER: &str = r"Stock: {{ symbol }}
Current Price: {{ price }}
Price Change: {{ change }}
{% if news_overall %}News Sentiment: {{ news_overall }} ({{ news_count }} articles)
{% endif %}
Risk Analysis Request:
- Evaluate downside risk
- Identify risk factors
- Calculate risk-reward ratio
- Provide risk score (0-100, where 100 is highest risk)

Provide risk assessment in this format:
RISK_SCORE: [0-100]
RISK_LEVEL: [low/medium/high/extreme]
RISK_FACTORS: [key risks]
DOWNSIDE: [potential loss scenarios]
RISK_REWARD: [ratio]";

const ANOMALY_USER: &str = r"Stock: {{ symbol }}
Current Price: {{ price }}
Price Change: {{ change }}
RSI: {{ rsi }}
Volume: {{ volume }}

Detect anomalies in this format:
ANOMALY: [yes/no]
TYPE: [spike/crash/divergence/volume_surge/none]
SEVERITY: [low/medium/high]
REASON: [explanation]";

/// Compiled user-prompt templates
pub struct PromptSet {
    env: Environment<'static>,
}

impl PromptSet {
    /// Compile the four user templates
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template(Task::Sentiment.name(), SENTIMENT_USER)?;
        env.add_template(Task::Technical.name(), TECHNICAL_USER)?;
        env.add_template(Task::Risk.name(), RISK_USER)?;
        env.add_template(Task::Anomaly.name(), ANOMALY_USER)?;
        Ok(Self { env })
    }

    fn render(&self, task: Task, ctx: minijinja::Value) -> Result<String> {
        Ok(self.env.get_template(task.name())?.render(ctx)?)
    }

    /// Sentiment prompt from numbered headlines
    pub fn sentiment(&self, symbol: &str, headlines: &[String]) -> Result<String> {
        self.render(Task::Sentiment, context! { symbol, headlines })
    }

    /// Technical prompt from `KEY: value` indicator lines
    pub fn technical(&self, symbol: &str, price: f64, indicators: &[String]) -> Result<String> {
        self.render(
            Task::Technical,
            context! { symbol, price => format_price(price), indicators },
        )
    }

    /// Risk prompt; `news` is the overall label and article count when known
    pub fn risk(
        &self,
        symbol: &str,
        price: f64,
        change: Option<f64>,
        news: Option<(&str, usize)>,
    ) -> Result<String> {
        let (news_overall, news_count) = news.unzip();
        self.render(
            Task::Risk,
            context! {
                symbol,
                price => format_price(price),
                change => format_change(change),
                news_overall,
                news_count,
            },
        )
    }

    /// Anomaly prompt
    pub fn anomaly(
        &self,
        symbol: &str,
        price: f64,
        change: f64,
        rsi: &str,
        volume: &str,
    ) -> Result<String> {
        self.render(
            Task::Anomaly,
            context! {
                symbol,
                price => format_price(price),
                change => format_change(Some(change)),
                rsi,
                volume,
            },
        )
    }
}

fn format_price(price: f64) -> String {
    format!("{price:.2}")
}

fn format_change(change: Option<f64>) -> String {
    change.map_or_else(|| "N/A".to_string(), |c| format!("{c:+.2}%"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompts() -> PromptSet {
        PromptSet::new().unwrap()
    }

    #[test]
    fn test_sentiment_prompt_lists_headlines() {
        let rendered = prompts()
            .sentiment("TCS", &["1. Wins deal".to_string(), "2. Beats estimates".to_string()])
            .unwrap();
        assert!(rendered.starts_with("Stock: TCS"));
        assert!(rendered.contains("1. Wins deal\n2. Beats estimates"));
        assert!(rendered.contains("SENTIMENT: [bullish/bearish/neutral]"));
    }

    #[test]
    fn test_sentiment_prompt_without_news() {
        let rendered = prompts().sentiment("TCS", &[]).unwrap();
        assert!(rendered.contains("No recent news available."));
    }

    #[test]
    fn test_technical_prompt() {
        let rendered = prompts()
            .technical("INFY", 1523.456, &["RSI: 61.20 (neutral)".to_string()])
            .unwrap();
        assert!(rendered.contains("Current Price: 1523.46"));
        assert!(rendered.contains("RSI: 61.20 (neutral)"));

        let rendered = prompts().technical("INFY", 10.0, &[]).unwrap();
        assert!(rendered.contains("No technical indicators available."));
    }

    #[test]
    fn test_risk_prompt() {
        let p = prompts();
        let rendered = p.risk("HDFC", 100.0, Some(-2.5), Some(("negative", 4))).unwrap();
        assert!(rendered.contains("Price Change: -2.50%"));
        assert!(rendered.contains("News Sentiment: negative (4 articles)"));

        let rendered = p.risk("HDFC", 100.0, None, None).unwrap();
        assert!(rendered.contains("Price Change: N/A"));
        assert!(!rendered.contains("News Sentiment"));
        assert!(rendered.contains("RISK_REWARD: [ratio]"));
    }

    #[test]
    fn test_anomaly_prompt() {
        let rendered = prompts()
            .anomaly("SBIN", 600.0, 4.0, "78.10 (overbought)", "current=9000, average_20d=3000 (high)")
            .unwrap();
        assert!(rendered.contains("Price Change: +4.00%"));
        assert!(rendered.contains("RSI: 78.10 (overbought)"));
        assert!(rendered.contains("ANOMALY: [yes/no]"));
    }

    #[test]
    fn test_task_metadata() {
        assert_eq!(Task::Risk.name(), "risk");
        assert!(Task::Technical.system_prompt().contains("technical analysis expert"));
        assert_eq!(Task::Sentiment.unavailable_message(), "Sentiment analysis unavailable");
    }
}
