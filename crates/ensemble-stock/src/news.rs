//! News articles, sentiment aggregation and the provider trait

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Polarity above which an article or aggregate counts as positive
pub const POLARITY_THRESHOLD: f64 = 0.2;

/// Categorical news sentiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    #[default]
    Neutral,
}

impl SentimentLabel {
    /// Label from a polarity in -1..=1
    pub fn from_polarity(polarity: f64) -> Self {
        if polarity > POLARITY_THRESHOLD {
            Self::Positive
        } else if polarity < -POLARITY_THRESHOLD {
            Self::Negative
        } else {
            Self::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }

    /// Parse an upstream label, ignoring case
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "positive" => Some(Self::Positive),
            "negative" => Some(Self::Negative),
            "neutral" => Some(Self::Neutral),
            _ => None,
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One news article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    pub source: String,
    pub url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub sentiment: SentimentLabel,
    /// -1 (very negative) to 1 (very positive)
    pub polarity: f64,
}

/// Aggregate sentiment over a set of articles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentSummary {
    pub overall: SentimentLabel,
    pub average_polarity: f64,
    pub positive_count: usize,
    pub negative_count: usize,
    pub neutral_count: usize,
    /// 0..=1, grows with the magnitude of the average polarity
    pub confidence: f64,
}

impl Default for SentimentSummary {
    fn default() -> Self {
        Self {
            overall: SentimentLabel::Neutral,
            average_polarity: 0.0,
            positive_count: 0,
            negative_count: 0,
            neutral_count: 0,
            confidence: 0.0,
        }
    }
}

impl SentimentSummary {
    /// Aggregate article labels and polarities
    pub fn from_articles(articles: &[NewsArticle]) -> Self {
        if articles.is_empty() {
            return Self::default();
        }

        let mut summary = Self::default();
        let mut total_polarity = 0.0;
        for article in articles {
            match article.sentiment {
                SentimentLabel::Positive => summary.positive_count += 1,
                SentimentLabel::Negative => summary.negative_count += 1,
                SentimentLabel::Neutral => summary.neutral_count += 1,
            }
            total_polarity += article.polarity;
        }

        let average = total_polarity / articles.len() as f64;
        summary.overall = SentimentLabel::from_polarity(average);
        summary.average_polarity = (average * 1000.0).round() / 1000.0;
        summary.confidence = (average.abs() * 2.0).min(1.0);
        summary
    }
}

/// Articles plus their aggregate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsSnapshot {
    pub articles: Vec<NewsArticle>,
    pub summary: SentimentSummary,
}

impl NewsSnapshot {
    /// Build a snapshot and its aggregate
    pub fn new(articles: Vec<NewsArticle>) -> Self {
        let summary = SentimentSummary::from_articles(&articles);
        Self { articles, summary }
    }

    /// No articles, neutral aggregate
    pub fn empty() -> Self {
        Self::default()
    }

    /// Numbered headline list for prompts
    pub fn headlines(&self, max: usize) -> Vec<String> {
        self.articles
            .iter()
            .take(max)
            .enumerate()
            .map(|(i, a)| {
                let title = if a.title.trim().is_empty() {
                    "No title"
                } else {
                    a.title.as_str()
                };
                format!("{}. {}", i + 1, title)
            })
            .collect()
    }
}

/// Source of recent news for a symbol
#[async_trait]
pub trait NewsProvider: Send + Sync {
    /// Up to `limit` recent articles, newest first
    async fn fetch_news(&self, symbol: &str, limit: usize) -> Result<NewsSnapshot>;
}

/// Provider used when no news API is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoNewsProvider;

#[async_trait]
impl NewsProvider for NoNewsProvider {
    async fn fetch_news(&self, _symbol: &str, _limit: usize) -> Result<NewsSnapshot> {
        Ok(NewsSnapshot::empty())
    }
}
