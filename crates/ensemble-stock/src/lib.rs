//! Multi-model LLM ensemble for stock analysis
//!
//! The crate gathers market context for one symbol (price history,
//! technical indicators, news), asks four independently configured models
//! for sentiment, technical, risk and anomaly opinions, and folds the
//! answers into a single BUY/SELL/HOLD decision with price targets and an
//! agreement score.
//!
//! # Layout
//!
//! - [`orchestrator`]: the fan-out/fan-in analysis pipeline
//! - [`ensemble`]: weighted scoring, action ladder, price targets, confidence
//! - [`parsers`]: tolerant `LABEL: value` response parsers
//! - [`indicators`], [`news`], [`market`]: data collaborators
//! - [`store`], [`validator`], [`watcher`]: persistence and follow-up jobs
//!
//! ```no_run
//! use ensemble_stock::{AnalysisRequest, EnsembleConfig, EnsembleOrchestrator};
//!
//! # async fn run() -> ensemble_stock::Result<()> {
//! let config = EnsembleConfig::from_env()?;
//! let orchestrator = EnsembleOrchestrator::from_config(config)?;
//! let request = AnalysisRequest::new("AAPL", 189.5, Vec::new());
//! let result = orchestrator.analyze(request).await?;
//! println!("{} {:?}", result.symbol, result.final_decision.action);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod ensemble;
pub mod error;
pub mod indicators;
pub mod market;
pub mod news;
pub mod orchestrator;
pub mod parsers;
pub mod prompts;
pub mod result;
pub mod store;
pub mod validator;
pub mod watcher;

pub use cache::TtlCache;
pub use config::{EnsembleConfig, EnsembleConfigBuilder};
pub use ensemble::{Action, ConfidenceTier, EnsembleDecision, ModelVotes};
pub use error::{Result, StockError};
pub use indicators::{IndicatorProvider, IndicatorSignal, IndicatorSnapshot, TaIndicatorProvider};
pub use market::{Bar, MarketDataSource, MarketSnapshot};
pub use news::{NewsArticle, NewsProvider, NewsSnapshot, SentimentLabel, SentimentSummary};
pub use orchestrator::{EnsembleOrchestrator, EnsembleOrchestratorBuilder};
pub use parsers::{AnomalyOpinion, RiskOpinion, SentimentOpinion, TechnicalOpinion};
pub use result::{AnalysisMetadata, AnalysisRequest, AnalysisResult, ModelsUsed};
pub use store::{PredictionFilter, PredictionRecord, PredictionStatus, PredictionStore};
pub use validator::{PredictionValidator, ValidationSummary};
pub use watcher::{PriceTrigger, PriceWatcher, TriggerKind};
