//! Ensemble orchestrator
//!
//! One `analyze` call runs:
//!
//! 1. news and indicators, concurrently; either failing degrades to an
//!    empty/unknown snapshot
//! 2. sentiment, technical and risk analysts, each on its own task; a failed
//!    or panicked task becomes an error stub and never cancels its siblings
//! 3. weighted scoring into an [`EnsembleDecision`]
//! 4. the anomaly analyst, only when a price change is known
//!
//! Only a malformed request aborts the call.

use crate::api::MarketAuxClient;
use crate::config::EnsembleConfig;
use crate::ensemble::{self, EnsembleDecision};
use crate::error::{Result, StockError};
use crate::indicators::{IndicatorProvider, IndicatorSnapshot, TaIndicatorProvider};
use crate::news::{NewsProvider, NewsSnapshot, NoNewsProvider};
use crate::parsers::{self, AnomalyOpinion, Opinion};
use crate::prompts::{PromptSet, Task};
use crate::result::{AnalysisMetadata, AnalysisRequest, AnalysisResult, ModelsUsed};
use crate::store::{
    MemoryPredictionStore, PredictionRecord, PredictionStore, SqlitePredictionStore,
};
use chrono::Utc;
use ensemble_llm::providers::{OpenAiCompatibleConfig, OpenAiCompatibleProvider};
use ensemble_llm::{LLMProvider, LlmModelClient, ModelClient};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};
use uuid::Uuid;

/// Aborts the spawned task if the analysis is dropped before it finishes
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs the four analysts over one symbol and folds their answers
pub struct EnsembleOrchestrator {
    sentiment: Arc<dyn ModelClient>,
    technical: Arc<dyn ModelClient>,
    risk: Arc<dyn ModelClient>,
    anomaly: Arc<dyn ModelClient>,
    news: Arc<dyn NewsProvider>,
    indicators: Arc<dyn IndicatorProvider>,
    prompts: Arc<PromptSet>,
    store: Option<Arc<dyn PredictionStore>>,
    news_limit: usize,
    prompt_articles: usize,
    analysis_timeout: Duration,
}

impl EnsembleOrchestrator {
    /// Create a new orchestrator builder
    pub fn builder() -> EnsembleOrchestratorBuilder {
        EnsembleOrchestratorBuilder::default()
    }

    /// Wire model clients, news and an in-memory store from configuration
    pub fn from_config(config: EnsembleConfig) -> Result<Self> {
        Self::from_config_with_store(config, Arc::new(MemoryPredictionStore::new()))
    }

    /// Like [`Self::from_config`], persisting to SQLite when
    /// `database_url` is set
    pub async fn connect(config: EnsembleConfig) -> Result<Self> {
        let store: Arc<dyn PredictionStore> = match config.database_url.as_deref() {
            Some(url) => Arc::new(SqlitePredictionStore::connect(url).await?),
            None => Arc::new(MemoryPredictionStore::new()),
        };
        Self::from_config_with_store(config, store)
    }

    /// Wire model clients and news from configuration around `store`
    pub fn from_config_with_store(
        config: EnsembleConfig,
        store: Arc<dyn PredictionStore>,
    ) -> Result<Self> {
        config.validate()?;

        let api_key = config.api_key.clone().ok_or_else(|| {
            StockError::ConfigError("NVIDIA_API_KEY environment variable not set".to_string())
        })?;
        let provider_config = OpenAiCompatibleConfig::new(api_key)
            .with_api_base(config.api_base.clone())
            .with_timeout(config.request_timeout.as_secs().max(1));
        let provider: Arc<dyn LLMProvider> =
            Arc::new(OpenAiCompatibleProvider::with_config(provider_config)?);

        let client = |spec: &ensemble_llm::ModelSpec| -> Arc<dyn ModelClient> {
            Arc::new(LlmModelClient::new(Arc::clone(&provider), spec.clone()))
        };

        let news: Arc<dyn NewsProvider> = match config.marketaux_api_key.as_deref() {
            Some(key) => {
                let mut marketaux =
                    MarketAuxClient::new(key, config.news_rate_limit, config.cache_ttl_news);
                if let Some(countries) = config.news_countries.as_deref() {
                    marketaux = marketaux.with_countries(countries);
                }
                Arc::new(marketaux)
            }
            None => {
                warn!("MARKETAUX_API_KEY not set, analysing without news");
                Arc::new(NoNewsProvider)
            }
        };

        Self::builder()
            .sentiment_client(client(&config.sentiment_model))
            .technical_client(client(&config.technical_model))
            .risk_client(client(&config.risk_model))
            .anomaly_client(client(&config.anomaly_model))
            .news_provider(news)
            .store(store)
            .news_limit(config.news_limit)
            .prompt_articles(config.prompt_articles)
            .analysis_timeout(config.analysis_timeout)
            .build()
    }

    /// Default caller budget from configuration
    pub fn analysis_timeout(&self) -> Duration {
        self.analysis_timeout
    }

    /// Attached prediction store, if any
    pub fn store(&self) -> Option<Arc<dyn PredictionStore>> {
        self.store.clone()
    }

    /// Model id for each seat
    pub fn models_used(&self) -> ModelsUsed {
        ModelsUsed {
            sentiment: self.sentiment.model_id().to_string(),
            technical: self.technical.model_id().to_string(),
            risk: self.risk.model_id().to_string(),
            anomaly: self.anomaly.model_id().to_string(),
        }
    }

    /// Run the full ensemble over one request
    ///
    /// Analyst failures are folded into the result as error stubs; only a
    /// request with an empty symbol or a non-positive price is rejected.
    #[instrument(skip(self, request), fields(symbol = %request.symbol))]
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult> {
        request.validate()?;

        let started = Instant::now();
        let timestamp = Utc::now();
        info!(
            price = request.current_price,
            bars = request.historical_bars.len(),
            "starting ensemble analysis"
        );

        let (news, indicators) = tokio::join!(
            self.gather_news(&request.symbol),
            self.gather_indicators(&request)
        );

        let sentiment = spawn_analyst(
            Task::Sentiment,
            &self.sentiment,
            self.prompts
                .sentiment(&request.symbol, &news.headlines(self.prompt_articles)),
            parsers::parse_sentiment,
        );
        let technical = spawn_analyst(
            Task::Technical,
            &self.technical,
            self.prompts.technical(
                &request.symbol,
                request.current_price,
                &indicators.prompt_lines(),
            ),
            parsers::parse_technical,
        );
        let news_context = (!news.articles.is_empty())
            .then(|| (news.summary.overall.as_str(), news.articles.len()));
        let risk = spawn_analyst(
            Task::Risk,
            &self.risk,
            self.prompts.risk(
                &request.symbol,
                request.current_price,
                request.price_change_percent,
                news_context,
            ),
            parsers::parse_risk,
        );

        let (sentiment, technical, risk) = tokio::join!(
            settle(Task::Sentiment, sentiment),
            settle(Task::Technical, technical),
            settle(Task::Risk, risk)
        );

        let decision = ensemble::decide(request.current_price, &sentiment, &technical, &risk);
        let confidence_score = ensemble::agreement_confidence(&sentiment, &technical, &risk);
        debug!(
            score = decision.ensemble_score,
            action = %decision.action,
            "ensemble decision"
        );

        let anomaly = self.detect_anomaly(&request, &indicators).await;
        let elapsed = started.elapsed().as_secs_f64();

        log_outcome(&decision, confidence_score, &anomaly, elapsed);

        Ok(AnalysisResult {
            symbol: request.symbol,
            current_price: request.current_price,
            price_change_percent: request.price_change_percent,
            timestamp,
            analysis_time_seconds: (elapsed * 100.0).round() / 100.0,
            models_used: self.models_used(),
            sentiment_analysis: sentiment,
            technical_analysis: technical,
            risk_assessment: risk,
            anomaly_detection: anomaly,
            final_decision: decision,
            confidence_score,
            metadata: AnalysisMetadata {
                technical_indicators: indicators,
                news_count: news.articles.len(),
                news_sentiment: news.summary,
            },
        })
    }

    /// [`Self::analyze`] bounded by `budget`; no partial result on expiry
    pub async fn analyze_with_timeout(
        &self,
        request: AnalysisRequest,
        budget: Duration,
    ) -> Result<AnalysisResult> {
        let symbol = request.symbol.clone();
        match tokio::time::timeout(budget, self.analyze(request)).await {
            Ok(result) => result,
            Err(_) => {
                error!(symbol = %symbol, ?budget, "analysis timed out");
                Err(StockError::Timeout(budget))
            }
        }
    }

    /// Persist a finished analysis as a pending prediction
    ///
    /// Store failures are logged, not returned; the analysis itself already
    /// succeeded.
    pub async fn record(&self, result: &AnalysisResult) -> Option<Uuid> {
        let store = self.store.as_ref()?;
        let record = PredictionRecord::from_result(result);
        match store.save(&record).await {
            Ok(()) => {
                info!(symbol = %record.symbol, id = %record.id, "prediction recorded");
                Some(record.id)
            }
            Err(err) => {
                error!(symbol = %record.symbol, error = %err, "failed to record prediction");
                None
            }
        }
    }

    async fn gather_news(&self, symbol: &str) -> NewsSnapshot {
        match self.news.fetch_news(symbol, self.news_limit).await {
            Ok(news) => news,
            Err(err) => {
                warn!(error = %err, "news unavailable, continuing without it");
                NewsSnapshot::empty()
            }
        }
    }

    async fn gather_indicators(&self, request: &AnalysisRequest) -> IndicatorSnapshot {
        let provider = Arc::clone(&self.indicators);
        let bars = request.historical_bars.clone();
        match tokio::task::spawn_blocking(move || provider.calculate(&bars)).await {
            Ok(Ok(snapshot)) => {
                if !snapshot.has_evidence() {
                    debug!(
                        bars = request.historical_bars.len(),
                        "not enough history for indicators"
                    );
                }
                snapshot
            }
            Ok(Err(err)) => {
                warn!(error = %err, "indicator calculation failed");
                IndicatorSnapshot::unknown()
            }
            Err(err) => {
                error!(error = %err, "indicator task panicked");
                IndicatorSnapshot::unknown()
            }
        }
    }

    async fn detect_anomaly(
        &self,
        request: &AnalysisRequest,
        indicators: &IndicatorSnapshot,
    ) -> AnomalyOpinion {
        let Some(change) = request.price_change_percent else {
            debug!("no price change, skipping anomaly model");
            return AnomalyOpinion::no_price_change();
        };

        let rsi = format!(
            "{} ({})",
            indicators
                .rsi
                .value
                .map_or_else(|| "N/A".to_string(), |v| format!("{v:.2}")),
            indicators.rsi.signal
        );
        let volume = format!(
            "current={}, average_20d={} ({})",
            indicators
                .volume
                .current
                .map_or_else(|| "N/A".to_string(), |v| v.to_string()),
            indicators
                .volume
                .average_20d
                .map_or_else(|| "N/A".to_string(), |v| v.to_string()),
            indicators.volume.signal
        );

        let handle = spawn_analyst(
            Task::Anomaly,
            &self.anomaly,
            self.prompts.anomaly(
                &request.symbol,
                request.current_price,
                change,
                &rsi,
                &volume,
            ),
            parsers::parse_anomaly,
        );
        settle(Task::Anomaly, handle).await
    }
}

/// Run one analyst on its own task
fn spawn_analyst<T: Opinion>(
    task: Task,
    client: &Arc<dyn ModelClient>,
    prompt: Result<String>,
    parse: fn(&str) -> T,
) -> AbortOnDrop<Result<T>> {
    let client = Arc::clone(client);
    let span = info_span!("analyst", task = task.name(), model = client.model_id());
    AbortOnDrop(tokio::spawn(
        async move {
            let prompt = prompt?;
            let answer = client.complete(task.system_prompt(), &prompt).await?;
            Ok::<T, StockError>(parse(&answer))
        }
        .instrument(span),
    ))
}

/// Wait for an analyst task, turning any failure into its stub
async fn settle<T: Opinion>(task: Task, mut handle: AbortOnDrop<Result<T>>) -> T {
    match (&mut handle.0).await {
        Ok(Ok(opinion)) => opinion,
        Ok(Err(err)) => {
            let transport = matches!(&err, StockError::Model(e) if e.is_transport());
            error!(task = task.name(), error = %err, transport, "analyst failed");
            T::failed(err.to_string(), task.unavailable_message())
        }
        Err(err) => {
            error!(task = task.name(), error = %err, "analyst task aborted");
            T::failed(err.to_string(), task.unavailable_message())
        }
    }
}

fn log_outcome(
    decision: &EnsembleDecision,
    confidence_score: f64,
    anomaly: &AnomalyOpinion,
    elapsed: f64,
) {
    if anomaly.detected() {
        warn!(
            kind = anomaly.anomaly_type.as_deref().unwrap_or("unknown"),
            severity = anomaly.severity.as_deref().unwrap_or("unknown"),
            "anomaly detected"
        );
    }
    info!(
        action = %decision.action,
        confidence = %decision.confidence,
        score = decision.ensemble_score,
        agreement = confidence_score,
        elapsed_secs = elapsed,
        "ensemble analysis complete"
    );
}

/// Builder for [`EnsembleOrchestrator`]
pub struct EnsembleOrchestratorBuilder {
    sentiment: Option<Arc<dyn ModelClient>>,
    technical: Option<Arc<dyn ModelClient>>,
    risk: Option<Arc<dyn ModelClient>>,
    anomaly: Option<Arc<dyn ModelClient>>,
    news: Arc<dyn NewsProvider>,
    indicators: Arc<dyn IndicatorProvider>,
    store: Option<Arc<dyn PredictionStore>>,
    news_limit: usize,
    prompt_articles: usize,
    analysis_timeout: Duration,
}

impl Default for EnsembleOrchestratorBuilder {
    fn default() -> Self {
        let defaults = EnsembleConfig::default();
        Self {
            sentiment: None,
            technical: None,
            risk: None,
            anomaly: None,
            news: Arc::new(NoNewsProvider),
            indicators: Arc::new(TaIndicatorProvider),
            store: None,
            news_limit: defaults.news_limit,
            prompt_articles: defaults.prompt_articles,
            analysis_timeout: defaults.analysis_timeout,
        }
    }
}

impl EnsembleOrchestratorBuilder {
    pub fn sentiment_client(mut self, client: Arc<dyn ModelClient>) -> Self {
        self.sentiment = Some(client);
        self
    }

    pub fn technical_client(mut self, client: Arc<dyn ModelClient>) -> Self {
        self.technical = Some(client);
        self
    }

    pub fn risk_client(mut self, client: Arc<dyn ModelClient>) -> Self {
        self.risk = Some(client);
        self
    }

    pub fn anomaly_client(mut self, client: Arc<dyn ModelClient>) -> Self {
        self.anomaly = Some(client);
        self
    }

    /// Defaults to no news
    pub fn news_provider(mut self, provider: Arc<dyn NewsProvider>) -> Self {
        self.news = provider;
        self
    }

    /// Defaults to [`TaIndicatorProvider`]
    pub fn indicator_provider(mut self, provider: Arc<dyn IndicatorProvider>) -> Self {
        self.indicators = provider;
        self
    }

    pub fn store(mut self, store: Arc<dyn PredictionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn news_limit(mut self, limit: usize) -> Self {
        self.news_limit = limit;
        self
    }

    pub fn prompt_articles(mut self, count: usize) -> Self {
        self.prompt_articles = count;
        self
    }

    pub fn analysis_timeout(mut self, budget: Duration) -> Self {
        self.analysis_timeout = budget;
        self
    }

    /// Build the orchestrator; all four model clients are required
    pub fn build(self) -> Result<EnsembleOrchestrator> {
        let missing = |seat: &str| StockError::ConfigError(format!("{seat} model client not set"));
        Ok(EnsembleOrchestrator {
            sentiment: self.sentiment.ok_or_else(|| missing("sentiment"))?,
            technical: self.technical.ok_or_else(|| missing("technical"))?,
            risk: self.risk.ok_or_else(|| missing("risk"))?,
            anomaly: self.anomaly.ok_or_else(|| missing("anomaly"))?,
            news: self.news,
            indicators: self.indicators,
            prompts: Arc::new(PromptSet::new()?),
            store: self.store,
            news_limit: self.news_limit,
            prompt_articles: self.prompt_articles,
            analysis_timeout: self.analysis_timeout,
        })
    }
}
