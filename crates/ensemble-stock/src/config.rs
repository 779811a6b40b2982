//! Configuration for ensemble analysis

use crate::error::{Result, StockError};
use ensemble_llm::ModelSpec;
use ensemble_llm::providers::openai_compatible::DEFAULT_API_BASE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default model per analyst seat
pub const DEFAULT_SENTIMENT_MODEL: &str = "meta/llama-3.1-70b-instruct";
pub const DEFAULT_TECHNICAL_MODEL: &str = "mistralai/mixtral-8x7b-instruct-v0.1";
pub const DEFAULT_RISK_MODEL: &str = "meta/llama-3.1-405b-instruct";
pub const DEFAULT_ANOMALY_MODEL: &str = "meta/llama-3.1-70b-instruct";

/// Configuration for ensemble analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleConfig {
    /// Sentiment analyst model
    pub sentiment_model: ModelSpec,

    /// Technical analyst model
    pub technical_model: ModelSpec,

    /// Risk analyst model
    pub risk_model: ModelSpec,

    /// Anomaly detector model
    pub anomaly_model: ModelSpec,

    /// OpenAI-compatible gateway base URL
    pub api_base: String,

    /// Gateway API key
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Per-request HTTP timeout for model calls
    pub request_timeout: Duration,

    /// Caller budget for one full analysis
    pub analysis_timeout: Duration,

    /// Articles fetched per symbol
    pub news_limit: usize,

    /// Articles quoted in the sentiment prompt
    pub prompt_articles: usize,

    /// Cache TTL for news data
    pub cache_ttl_news: Duration,

    /// MarketAux API token; no token means no news
    #[serde(skip_serializing)]
    pub marketaux_api_key: Option<String>,

    /// News requests per minute
    pub news_rate_limit: u32,

    /// Optional MarketAux country filter (e.g. "in", "us")
    pub news_countries: Option<String>,

    /// SQLite URL for the prediction store; `None` keeps predictions in memory
    pub database_url: Option<String>,

    /// Symbols polled by the price watcher
    pub watchlist: Vec<String>,

    /// Drop (in percent, positive number) that triggers an analysis
    pub price_drop_threshold: f64,

    /// Spike (in percent) that triggers an analysis
    pub price_spike_threshold: f64,

    /// Watcher polling interval
    pub poll_interval: Duration,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            sentiment_model: ModelSpec::new(DEFAULT_SENTIMENT_MODEL, 0.3),
            technical_model: ModelSpec::new(DEFAULT_TECHNICAL_MODEL, 0.5),
            risk_model: ModelSpec::new(DEFAULT_RISK_MODEL, 0.7),
            anomaly_model: ModelSpec::new(DEFAULT_ANOMALY_MODEL, 0.2),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(60),
            analysis_timeout: Duration::from_secs(120),
            news_limit: 10,
            prompt_articles: 5,
            cache_ttl_news: Duration::from_secs(300), // 5 minutes
            marketaux_api_key: None,
            news_rate_limit: 60,
            news_countries: None,
            database_url: None,
            watchlist: Vec::new(),
            price_drop_threshold: 2.0,
            price_spike_threshold: 2.0,
            poll_interval: Duration::from_secs(5),
        }
    }
}

impl EnsembleConfig {
    /// Create a new configuration builder
    pub fn builder() -> EnsembleConfigBuilder {
        EnsembleConfigBuilder::default()
    }

    /// Build a configuration from environment variables
    ///
    /// Reads `NVIDIA_API_KEY`, `NVIDIA_BASE_URL`, `MARKETAUX_API_KEY`,
    /// `MARKETAUX_COUNTRIES`, `DATABASE_URL`, `WATCHLIST_SYMBOLS`,
    /// `PRICE_DROP_THRESHOLD`, `PRICE_SPIKE_THRESHOLD` and the per-seat
    /// `*_MODEL` overrides. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::builder().with_env();
        if let Some(raw) = env_opt("PRICE_DROP_THRESHOLD") {
            builder = builder.price_drop_threshold(parse_env_f64("PRICE_DROP_THRESHOLD", &raw)?);
        }
        if let Some(raw) = env_opt("PRICE_SPIKE_THRESHOLD") {
            builder = builder.price_spike_threshold(parse_env_f64("PRICE_SPIKE_THRESHOLD", &raw)?);
        }
        builder.build()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for (seat, spec) in [
            ("sentiment", &self.sentiment_model),
            ("technical", &self.technical_model),
            ("risk", &self.risk_model),
            ("anomaly", &self.anomaly_model),
        ] {
            if spec.model.trim().is_empty() {
                return Err(StockError::ConfigError(format!(
                    "{seat} model id must not be empty"
                )));
            }
            if !(0.0..=2.0).contains(&spec.temperature) {
                return Err(StockError::ConfigError(format!(
                    "{seat} temperature {} outside 0.0..=2.0",
                    spec.temperature
                )));
            }
            if spec.max_tokens == 0 {
                return Err(StockError::ConfigError(format!(
                    "{seat} max_tokens must be greater than 0"
                )));
            }
        }

        if self.news_limit == 0 || self.news_limit > 100 {
            return Err(StockError::ConfigError(
                "news_limit must be within 1..=100".to_string(),
            ));
        }

        if self.news_rate_limit == 0 {
            return Err(StockError::ConfigError(
                "news_rate_limit must be greater than 0".to_string(),
            ));
        }

        if self.price_drop_threshold <= 0.0 || self.price_spike_threshold <= 0.0 {
            return Err(StockError::ConfigError(
                "price thresholds must be positive percentages".to_string(),
            ));
        }

        if self.analysis_timeout.is_zero() || self.poll_interval.is_zero() {
            return Err(StockError::ConfigError(
                "analysis_timeout and poll_interval must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Model spec for every seat, in sentiment/technical/risk/anomaly order
    pub fn model_specs(&self) -> [&ModelSpec; 4] {
        [
            &self.sentiment_model,
            &self.technical_model,
            &self.risk_model,
            &self.anomaly_model,
        ]
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env_f64(key: &str, raw: &str) -> Result<f64> {
    raw.trim()
        .parse()
        .map_err(|_| StockError::ConfigError(format!("{key} must be a number, got {raw:?}")))
}

/// Builder for EnsembleConfig
#[derive(Debug, Default)]
pub struct EnsembleConfigBuilder {
    sentiment_model: Option<ModelSpec>,
    technical_model: Option<ModelSpec>,
    risk_model: Option<ModelSpec>,
    anomaly_model: Option<ModelSpec>,
    api_base: Option<String>,
    api_key: Option<String>,
    request_timeout: Option<Duration>,
    analysis_timeout: Option<Duration>,
    news_limit: Option<usize>,
    prompt_articles: Option<usize>,
    cache_ttl_news: Option<Duration>,
    marketaux_api_key: Option<String>,
    news_rate_limit: Option<u32>,
    news_countries: Option<String>,
    database_url: Option<String>,
    watchlist: Option<Vec<String>>,
    price_drop_threshold: Option<f64>,
    price_spike_threshold: Option<f64>,
    poll_interval: Option<Duration>,
}

impl EnsembleConfigBuilder {
    /// Set the sentiment analyst model
    pub fn sentiment_model(mut self, spec: ModelSpec) -> Self {
        self.sentiment_model = Some(spec);
        self
    }

    /// Set the technical analyst model
    pub fn technical_model(mut self, spec: ModelSpec) -> Self {
        self.technical_model = Some(spec);
        self
    }

    /// Set the risk analyst model
    pub fn risk_model(mut self, spec: ModelSpec) -> Self {
        self.risk_model = Some(spec);
        self
    }

    /// Set the anomaly detector model
    pub fn anomaly_model(mut self, spec: ModelSpec) -> Self {
        self.anomaly_model = Some(spec);
        self
    }

    /// Set the gateway base URL
    pub fn api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = Some(api_base.into());
        self
    }

    /// Set the gateway API key
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the per-request model timeout
    pub fn request_timeout(mut self, duration: Duration) -> Self {
        self.request_timeout = Some(duration);
        self
    }

    /// Set the whole-analysis budget
    pub fn analysis_timeout(mut self, duration: Duration) -> Self {
        self.analysis_timeout = Some(duration);
        self
    }

    /// Set articles fetched per symbol
    pub fn news_limit(mut self, limit: usize) -> Self {
        self.news_limit = Some(limit);
        self
    }

    /// Set articles quoted in the sentiment prompt
    pub fn prompt_articles(mut self, count: usize) -> Self {
        self.prompt_articles = Some(count);
        self
    }

    /// Set cache TTL for news data
    pub fn cache_ttl_news(mut self, duration: Duration) -> Self {
        self.cache_ttl_news = Some(duration);
        self
    }

    /// Set the MarketAux API token
    pub fn marketaux_api_key(mut self, key: impl Into<String>) -> Self {
        self.marketaux_api_key = Some(key.into());
        self
    }

    /// Set news requests per minute
    pub fn news_rate_limit(mut self, per_minute: u32) -> Self {
        self.news_rate_limit = Some(per_minute);
        self
    }

    /// Set the MarketAux country filter
    pub fn news_countries(mut self, countries: impl Into<String>) -> Self {
        self.news_countries = Some(countries.into());
        self
    }

    /// Set the prediction store URL
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Set the watcher symbols
    pub fn watchlist(mut self, symbols: Vec<String>) -> Self {
        self.watchlist = Some(symbols);
        self
    }

    /// Set the drop trigger in percent
    pub fn price_drop_threshold(mut self, percent: f64) -> Self {
        self.price_drop_threshold = Some(percent);
        self
    }

    /// Set the spike trigger in percent
    pub fn price_spike_threshold(mut self, percent: f64) -> Self {
        self.price_spike_threshold = Some(percent);
        self
    }

    /// Set the watcher polling interval
    pub fn poll_interval(mut self, duration: Duration) -> Self {
        self.poll_interval = Some(duration);
        self
    }

    /// Fill unset fields from environment variables
    pub fn with_env(mut self) -> Self {
        if self.api_key.is_none() {
            self.api_key = env_opt("NVIDIA_API_KEY");
        }
        if self.api_base.is_none() {
            self.api_base = env_opt("NVIDIA_BASE_URL");
        }
        if self.marketaux_api_key.is_none() {
            self.marketaux_api_key = env_opt("MARKETAUX_API_KEY");
        }
        if self.news_countries.is_none() {
            self.news_countries = env_opt("MARKETAUX_COUNTRIES");
        }
        if self.database_url.is_none() {
            self.database_url = env_opt("DATABASE_URL");
        }
        if self.watchlist.is_none() {
            self.watchlist = env_opt("WATCHLIST_SYMBOLS").map(|raw| parse_watchlist(&raw));
        }

        let defaults = EnsembleConfig::default();
        for (key, slot, fallback) in [
            ("SENTIMENT_MODEL", &mut self.sentiment_model, defaults.sentiment_model),
            ("TECHNICAL_MODEL", &mut self.technical_model, defaults.technical_model),
            ("RISK_MODEL", &mut self.risk_model, defaults.risk_model),
            ("ANOMALY_MODEL", &mut self.anomaly_model, defaults.anomaly_model),
        ] {
            if slot.is_none() {
                *slot = env_opt(key).map(|model| ModelSpec { model, ..fallback });
            }
        }
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<EnsembleConfig> {
        let defaults = EnsembleConfig::default();

        let config = EnsembleConfig {
            sentiment_model: self.sentiment_model.unwrap_or(defaults.sentiment_model),
            technical_model: self.technical_model.unwrap_or(defaults.technical_model),
            risk_model: self.risk_model.unwrap_or(defaults.risk_model),
            anomaly_model: self.anomaly_model.unwrap_or(defaults.anomaly_model),
            api_base: self.api_base.unwrap_or(defaults.api_base),
            api_key: self.api_key,
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            analysis_timeout: self.analysis_timeout.unwrap_or(defaults.analysis_timeout),
            news_limit: self.news_limit.unwrap_or(defaults.news_limit),
            prompt_articles: self.prompt_articles.unwrap_or(defaults.prompt_articles),
            cache_ttl_news: self.cache_ttl_news.unwrap_or(defaults.cache_ttl_news),
            marketaux_api_key: self.marketaux_api_key,
            news_rate_limit: self.news_rate_limit.unwrap_or(defaults.news_rate_limit),
            news_countries: self.news_countries,
            database_url: self.database_url,
            watchlist: self.watchlist.unwrap_or(defaults.watchlist),
            price_drop_threshold: self
                .price_drop_threshold
                .unwrap_or(defaults.price_drop_threshold),
            price_spike_threshold: self
                .price_spike_threshold
                .unwrap_or(defaults.price_spike_threshold),
            poll_interval: self.poll_interval.unwrap_or(defaults.poll_interval),
        };

        config.validate()?;
        Ok(config)
    }
}

/// Split a comma-separated symbol list, upper-casing and dropping blanks
pub fn parse_watchlist(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}
