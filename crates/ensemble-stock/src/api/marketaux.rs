//! MarketAux news client
//!
//! Wraps `GET /v1/news/all`. Responses are cached per symbol and limit, and
//! requests go through a per-minute rate limiter.

use crate::cache::TtlCache;
use crate::error::{Result, StockError};
use crate::news::{NewsArticle, NewsProvider, NewsSnapshot, SentimentLabel};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

const MARKETAUX_BASE_URL: &str = "https://api.marketaux.com/v1";
const MAX_LIMIT: usize = 100;

/// MarketAux client for news and entity sentiment
pub struct MarketAuxClient {
    client: Client,
    api_key: String,
    base_url: String,
    countries: Option<String>,
    language: String,
    cache: TtlCache<(String, usize), serde_json::Value>,
    rate_limiter: SharedRateLimiter,
}

impl MarketAuxClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `api_key` - MarketAux API token
    /// * `rate_limit` - Requests per minute
    /// * `cache_ttl` - How long responses are reused
    pub fn new(api_key: impl Into<String>, rate_limit: u32, cache_ttl: Duration) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(rate_limit).unwrap_or(NonZeroU32::MIN));

        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: MARKETAUX_BASE_URL.to_string(),
            countries: None,
            language: "en".to_string(),
            cache: TtlCache::new(cache_ttl),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Create from environment variable MARKETAUX_API_KEY
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("MARKETAUX_API_KEY").map_err(|_| {
            StockError::ConfigError("MARKETAUX_API_KEY environment variable not set".to_string())
        })?;

        Ok(Self::new(api_key, 60, Duration::from_secs(300)))
    }

    /// Restrict results to comma-separated country codes
    pub fn with_countries(mut self, countries: impl Into<String>) -> Self {
        self.countries = Some(countries.into());
        self
    }

    /// Override the API base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch_raw(&self, symbol: &str, limit: usize) -> Result<serde_json::Value> {
        self.rate_limiter.until_ready().await;

        let limit = limit.to_string();
        let mut params = vec![
            ("api_token", self.api_key.as_str()),
            ("symbols", symbol),
            ("language", self.language.as_str()),
            ("limit", limit.as_str()),
            ("sort", "published_on"),
            ("filter_entities", "true"),
        ];
        if let Some(countries) = &self.countries {
            params.push(("countries", countries.as_str()));
        }

        let response = self
            .client
            .get(format!("{}/news/all", self.base_url))
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(StockError::RateLimitExceeded {
                provider: "marketaux".to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StockError::NewsError(format!(
                "MarketAux API error: {status} - {body}"
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl NewsProvider for MarketAuxClient {
    async fn fetch_news(&self, symbol: &str, limit: usize) -> Result<NewsSnapshot> {
        let limit = limit.clamp(1, MAX_LIMIT);
        let raw = self
            .cache
            .get_or_load((symbol.to_string(), limit), || self.fetch_raw(symbol, limit))
            .await?;

        let response: NewsResponse = serde_json::from_value(raw)?;
        let articles: Vec<NewsArticle> = response.data.into_iter().map(into_article).collect();
        if articles.is_empty() {
            warn!(symbol, "MarketAux returned no articles");
        } else {
            debug!(symbol, count = articles.len(), "fetched news");
        }

        Ok(NewsSnapshot::new(articles))
    }
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(default)]
    data: Vec<RawArticle>,
}

#[derive(Debug, Deserialize)]
struct RawArticle {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    sentiment: Option<String>,
    #[serde(default)]
    sentiment_scores: Option<SentimentScores>,
    #[serde(default)]
    entities: Vec<RawEntity>,
}

#[derive(Debug, Deserialize)]
struct SentimentScores {
    polarity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    sentiment_score: Option<f64>,
}

fn into_article(raw: RawArticle) -> NewsArticle {
    // Article-level polarity wins; otherwise average the entity scores
    let polarity = raw
        .sentiment_scores
        .and_then(|s| s.polarity)
        .or_else(|| {
            let scores: Vec<f64> = raw.entities.iter().filter_map(|e| e.sentiment_score).collect();
            (!scores.is_empty()).then(|| scores.iter().sum::<f64>() / scores.len() as f64)
        })
        .unwrap_or(0.0)
        .clamp(-1.0, 1.0);

    let sentiment = raw
        .sentiment
        .as_deref()
        .and_then(SentimentLabel::parse)
        .unwrap_or_else(|| SentimentLabel::from_polarity(polarity));

    NewsArticle {
        title: raw.title,
        source: raw.source.unwrap_or_default(),
        url: raw.url,
        published_at: raw
            .published_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc)),
        sentiment,
        polarity,
    }
}
