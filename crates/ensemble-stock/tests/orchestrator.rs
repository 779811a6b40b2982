//! End-to-end `analyze` runs over scripted models, news and stores

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use ensemble_llm::{LLMError, ModelClient};
use ensemble_stock::store::MemoryPredictionStore;
use ensemble_stock::{
    Action, AnalysisRequest, Bar, ConfidenceTier, EnsembleOrchestrator, NewsArticle,
    NewsProvider, NewsSnapshot, PredictionFilter, PredictionRecord, PredictionStatus,
    PredictionStore, Result, SentimentLabel, StockError,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

const SENTIMENT: &str = "SENTIMENT: bullish\nSCORE: 80\nDRIVERS: strong earnings\nMOOD: optimistic";
const TECHNICAL: &str =
    "SIGNAL: buy\nSTRENGTH: 90\nKEY_INDICATORS: RSI, MACD crossover\nPATTERNS: breakout";
const RISK: &str = "RISK_SCORE: 10\nRISK_LEVEL: low\nRISK_FACTORS: none material\nDOWNSIDE: limited\nRISK_REWARD: 1:3";
const ANOMALY: &str = "ANOMALY: yes\nTYPE: volume_surge\nSEVERITY: medium\nREASON: volume 3x average";

enum Behaviour {
    Answer(&'static str),
    Fail,
    Panic,
    Slow(Duration, &'static str),
}

struct ScriptedClient {
    model: &'static str,
    behaviour: Behaviour,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedClient {
    fn new(model: &'static str, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            model,
            behaviour,
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn complete(&self, _system: &str, user: &str) -> ensemble_llm::Result<String> {
        self.prompts.lock().unwrap().push(user.to_string());
        match &self.behaviour {
            Behaviour::Answer(text) => Ok((*text).to_string()),
            Behaviour::Fail => Err(LLMError::Status {
                status: 503,
                body: "upstream".to_string(),
            }),
            Behaviour::Panic => panic!("model client blew up"),
            Behaviour::Slow(delay, text) => {
                tokio::time::sleep(*delay).await;
                Ok((*text).to_string())
            }
        }
    }

    fn model_id(&self) -> &str {
        self.model
    }
}

struct StaticNews(NewsSnapshot);

#[async_trait]
impl NewsProvider for StaticNews {
    async fn fetch_news(&self, _symbol: &str, limit: usize) -> Result<NewsSnapshot> {
        let articles = self.0.articles.iter().take(limit).cloned().collect();
        Ok(NewsSnapshot::new(articles))
    }
}

struct FailingNews;

#[async_trait]
impl NewsProvider for FailingNews {
    async fn fetch_news(&self, _symbol: &str, _limit: usize) -> Result<NewsSnapshot> {
        Err(StockError::NewsError("MarketAux API error: 500".to_string()))
    }
}

struct FailingStore;

#[async_trait]
impl PredictionStore for FailingStore {
    async fn save(&self, _record: &PredictionRecord) -> Result<()> {
        Err(StockError::StoreError("disk full".to_string()))
    }

    async fn get(&self, _id: Uuid) -> Result<Option<PredictionRecord>> {
        Ok(None)
    }

    async fn query(&self, _filter: &PredictionFilter, _limit: usize) -> Result<Vec<PredictionRecord>> {
        Ok(Vec::new())
    }

    async fn update_status(
        &self,
        _id: Uuid,
        _status: PredictionStatus,
        _actual_price: Option<f64>,
    ) -> Result<()> {
        Ok(())
    }
}

fn article(title: &str, polarity: f64) -> NewsArticle {
    NewsArticle {
        title: title.to_string(),
        source: "newswire".to_string(),
        url: None,
        published_at: None,
        sentiment: SentimentLabel::from_polarity(polarity),
        polarity,
    }
}

/// Gently rising daily closes with alternating volume
fn rising_bars(count: usize) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..count)
        .map(|i| {
            let close = 100.0 + i as f64 * 0.5 + if i % 2 == 0 { 0.8 } else { -0.8 };
            Bar {
                timestamp: start + ChronoDuration::days(i as i64),
                open: close - 0.3,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1_000_000 + (i as u64 % 3) * 100_000,
            }
        })
        .collect()
}

struct Seats {
    sentiment: Arc<ScriptedClient>,
    technical: Arc<ScriptedClient>,
    risk: Arc<ScriptedClient>,
    anomaly: Arc<ScriptedClient>,
}

impl Seats {
    fn answering() -> Self {
        Self {
            sentiment: ScriptedClient::new("sentiment-model", Behaviour::Answer(SENTIMENT)),
            technical: ScriptedClient::new("technical-model", Behaviour::Answer(TECHNICAL)),
            risk: ScriptedClient::new("risk-model", Behaviour::Answer(RISK)),
            anomaly: ScriptedClient::new("anomaly-model", Behaviour::Answer(ANOMALY)),
        }
    }

    fn orchestrator(&self) -> ensemble_stock::EnsembleOrchestratorBuilder {
        EnsembleOrchestrator::builder()
            .sentiment_client(self.sentiment.clone())
            .technical_client(self.technical.clone())
            .risk_client(self.risk.clone())
            .anomaly_client(self.anomaly.clone())
    }
}

#[tokio::test]
async fn test_full_ensemble_run() {
    let seats = Seats::answering();
    let news = NewsSnapshot::new(vec![
        article("Record quarterly deliveries", 0.6),
        article("New plant approved", 0.4),
        article("Analyst upgrade", 0.3),
    ]);
    let orchestrator = seats
        .orchestrator()
        .news_provider(Arc::new(StaticNews(news)))
        .build()
        .unwrap();

    let request = AnalysisRequest::new("TSLA", 100.0, rising_bars(60)).with_price_change(1.2);
    let result = orchestrator.analyze(request).await.unwrap();

    let decision = &result.final_decision;
    assert_eq!(decision.action, Action::Buy);
    assert_eq!(decision.confidence, ConfidenceTier::High);
    assert!((decision.ensemble_score - 87.0).abs() < 1e-9);
    assert!((decision.target_price - 106.7).abs() < 1e-9);
    assert!((decision.stop_loss - 97.7).abs() < 1e-9);
    assert_eq!(
        decision.reasoning,
        "Positive market sentiment from news | Technical indicators show buying opportunity | Low risk environment supports position"
    );
    assert!((result.confidence_score - 77.78).abs() < 1e-9);

    assert_eq!(result.anomaly_detection.anomaly_detected, Some(true));
    assert_eq!(result.anomaly_detection.anomaly_type.as_deref(), Some("volume_surge"));
    assert_eq!(result.failed_specialists(), 0);

    assert_eq!(result.models_used.sentiment, "sentiment-model");
    assert_eq!(result.models_used.anomaly, "anomaly-model");
    assert_eq!(result.metadata.news_count, 3);
    assert_eq!(result.metadata.news_sentiment.overall, SentimentLabel::Positive);
    assert!(result.metadata.technical_indicators.has_evidence());
    assert!(result.analysis_time_seconds >= 0.0);

    // Context reached the prompts
    assert!(seats.sentiment.last_prompt().contains("1. Record quarterly deliveries"));
    assert!(seats.technical.last_prompt().contains("RSI: "));
    assert!(
        seats
            .risk
            .last_prompt()
            .contains("News Sentiment: positive (3 articles)")
    );
    assert!(seats.anomaly.last_prompt().contains("Price Change: +1.20%"));
}

#[tokio::test]
async fn test_one_failed_specialist_is_isolated() {
    let mut seats = Seats::answering();
    seats.technical = ScriptedClient::new("technical-model", Behaviour::Fail);
    let orchestrator = seats.orchestrator().build().unwrap();

    let result = orchestrator
        .analyze(AnalysisRequest::new("TSLA", 100.0, rising_bars(30)))
        .await
        .unwrap();

    let technical = &result.technical_analysis;
    assert!(technical.error.as_deref().unwrap().contains("HTTP 503"));
    assert_eq!(technical.message.as_deref(), Some("Technical analysis unavailable"));
    assert_eq!(result.failed_specialists(), 1);

    // 80*0.3 + 50*0.4 + 90*0.3 = 71
    assert!((result.final_decision.ensemble_score - 71.0).abs() < 1e-9);
    assert_eq!(result.final_decision.action, Action::Buy);
    assert_eq!(result.sentiment_analysis.score, Some(80.0));
    assert_eq!(result.risk_assessment.risk_score, Some(10.0));
    // Sentiment 80 and inverted risk 90 only
    assert!((result.confidence_score - 75.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_panicking_specialist_becomes_stub() {
    let mut seats = Seats::answering();
    seats.sentiment = ScriptedClient::new("sentiment-model", Behaviour::Panic);
    let orchestrator = seats.orchestrator().build().unwrap();

    let result = orchestrator
        .analyze(AnalysisRequest::new("TSLA", 100.0, Vec::new()))
        .await
        .unwrap();

    assert!(result.sentiment_analysis.error.is_some());
    assert_eq!(
        result.sentiment_analysis.message.as_deref(),
        Some("Sentiment analysis unavailable")
    );
    assert!(result.technical_analysis.error.is_none());
    assert_eq!(seats.risk.calls(), 1);
}

#[tokio::test]
async fn test_total_failure_still_returns_result() {
    let seats = Seats {
        sentiment: ScriptedClient::new("s", Behaviour::Fail),
        technical: ScriptedClient::new("t", Behaviour::Fail),
        risk: ScriptedClient::new("r", Behaviour::Fail),
        anomaly: ScriptedClient::new("a", Behaviour::Fail),
    };
    let orchestrator = seats
        .orchestrator()
        .news_provider(Arc::new(FailingNews))
        .build()
        .unwrap();

    let result = orchestrator
        .analyze(AnalysisRequest::new("TSLA", 250.0, Vec::new()).with_price_change(-4.0))
        .await
        .unwrap();

    assert_eq!(result.failed_specialists(), 3);
    let decision = &result.final_decision;
    assert_eq!(decision.action, Action::Hold);
    assert_eq!(decision.confidence, ConfidenceTier::Medium);
    assert!((decision.ensemble_score - 50.0).abs() < f64::EPSILON);
    assert!((decision.target_price - 250.0).abs() < f64::EPSILON);
    assert!((decision.stop_loss - 242.5).abs() < 1e-9);
    assert_eq!(decision.reasoning, "Consolidated analysis suggests HOLD");
    assert!((result.confidence_score - 50.0).abs() < f64::EPSILON);

    assert_eq!(result.anomaly_detection.anomaly_detected, Some(false));
    assert!(result.anomaly_detection.error.is_some());
    assert_eq!(result.metadata.news_count, 0);
}

#[tokio::test]
async fn test_missing_price_change_skips_anomaly_model() {
    let seats = Seats::answering();
    let orchestrator = seats.orchestrator().build().unwrap();

    let result = orchestrator
        .analyze(AnalysisRequest::new("TSLA", 100.0, rising_bars(10)))
        .await
        .unwrap();

    assert_eq!(seats.anomaly.calls(), 0);
    assert_eq!(result.anomaly_detection.anomaly_detected, Some(false));
    assert_eq!(
        result.anomaly_detection.reason.as_deref(),
        Some("No price change data")
    );
    assert!(result.metadata.technical_indicators.insufficient_data);
    assert!(
        seats
            .technical
            .last_prompt()
            .contains("No technical indicators available.")
    );
    assert!(seats.risk.last_prompt().contains("Price Change: N/A"));
}

#[tokio::test]
async fn test_specialists_run_concurrently() {
    let delay = Duration::from_millis(300);
    let seats = Seats {
        sentiment: ScriptedClient::new("s", Behaviour::Slow(delay, SENTIMENT)),
        technical: ScriptedClient::new("t", Behaviour::Slow(delay, TECHNICAL)),
        risk: ScriptedClient::new("r", Behaviour::Slow(delay, RISK)),
        anomaly: ScriptedClient::new("a", Behaviour::Answer(ANOMALY)),
    };
    let orchestrator = seats.orchestrator().build().unwrap();

    let started = Instant::now();
    let result = orchestrator
        .analyze(AnalysisRequest::new("TSLA", 100.0, Vec::new()))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_millis(850));
    assert_eq!(result.final_decision.action, Action::Buy);
}

#[tokio::test]
async fn test_timeout_returns_no_partial_result() {
    let mut seats = Seats::answering();
    seats.risk = ScriptedClient::new("r", Behaviour::Slow(Duration::from_secs(30), RISK));
    let orchestrator = seats.orchestrator().build().unwrap();

    let budget = Duration::from_millis(100);
    let err = orchestrator
        .analyze_with_timeout(AnalysisRequest::new("TSLA", 100.0, Vec::new()), budget)
        .await
        .unwrap_err();

    assert!(matches!(err, StockError::Timeout(d) if d == budget));
}

#[tokio::test]
async fn test_invalid_request_is_rejected_before_any_call() {
    let seats = Seats::answering();
    let orchestrator = seats.orchestrator().build().unwrap();

    for request in [
        AnalysisRequest::new("TSLA", -5.0, Vec::new()),
        AnalysisRequest::new("", 10.0, Vec::new()),
    ] {
        let err = orchestrator.analyze(request).await.unwrap_err();
        assert!(matches!(err, StockError::InvalidRequest(_)));
    }
    assert_eq!(seats.sentiment.calls(), 0);
}

#[tokio::test]
async fn test_record_saves_pending_prediction() {
    let seats = Seats::answering();
    let store = Arc::new(MemoryPredictionStore::new());
    let orchestrator = seats.orchestrator().store(store.clone()).build().unwrap();

    let result = orchestrator
        .analyze(AnalysisRequest::new("TSLA", 100.0, Vec::new()))
        .await
        .unwrap();
    let id = orchestrator.record(&result).await.unwrap();

    let saved = store.get(id).await.unwrap().unwrap();
    assert_eq!(saved.status, PredictionStatus::Pending);
    assert_eq!(saved.action, Action::Buy);
    assert!((saved.target_price - result.final_decision.target_price).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_store_failure_does_not_fail_analysis() {
    let seats = Seats::answering();
    let orchestrator = seats
        .orchestrator()
        .store(Arc::new(FailingStore))
        .build()
        .unwrap();

    let result = orchestrator
        .analyze(AnalysisRequest::new("TSLA", 100.0, Vec::new()))
        .await
        .unwrap();
    assert!(orchestrator.record(&result).await.is_none());
    assert_eq!(result.final_decision.action, Action::Buy);
}
