//! Command-line interface for the stock analysis ensemble
//!
//! ```bash
//! export NVIDIA_API_KEY="nvapi-..."
//! export MARKETAUX_API_KEY="..."        # optional, enables news
//! export DATABASE_URL="sqlite://predictions.db"  # optional, persists history
//!
//! ensemble analyze RELIANCE.NS --save
//! ensemble demo --days 30
//! ensemble watch
//! ensemble history --symbol RELIANCE.NS
//! ensemble validate
//! ```

mod demo;
mod output;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use ensemble_stock::api::YahooFinanceClient;
use ensemble_stock::market::percent_change;
use ensemble_stock::store::{MemoryPredictionStore, SqlitePredictionStore};
use ensemble_stock::{
    AnalysisRequest, AnalysisResult, EnsembleConfig, EnsembleOrchestrator, MarketDataSource,
    PredictionFilter, PredictionStatus, PredictionStore, PredictionValidator, PriceWatcher,
};
use ensemble_utils::{AppConfig, init_tracing};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "ensemble")]
#[command(about = "Multi-model LLM ensemble for stock analysis", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyse one symbol with live market data
    Analyze {
        /// Ticker, e.g. AAPL or RELIANCE.NS
        symbol: String,

        /// History range for indicators (5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, ytd)
        #[arg(short, long, default_value = "3mo")]
        range: String,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,

        /// Record the decision as a pending prediction
        #[arg(long)]
        save: bool,
    },

    /// Analyse synthetic random-walk history
    Demo {
        #[arg(default_value = "RELIANCE")]
        symbol: String,

        /// Days of history to generate
        #[arg(short, long, default_value_t = 30)]
        days: usize,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Poll the watchlist and analyse sharp moves
    Watch,

    /// List recorded predictions
    History {
        #[arg(short, long)]
        symbol: Option<String>,

        /// PENDING, CORRECT or INCORRECT
        #[arg(long)]
        status: Option<String>,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Validate pending predictions made before today
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let app = AppConfig::load();
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "info,ensemble_stock=debug,ensemble_llm=debug"
    } else if app.is_production() {
        "warn"
    } else {
        "warn,ensemble_stock=info"
    };
    init_tracing(app.log_format, filter);
    info!(environment = %app.environment, "starting {}", app.app_name);

    let config = EnsembleConfig::from_env().context("invalid configuration")?;

    match cli.command {
        Command::Analyze {
            symbol,
            range,
            json,
            save,
        } => analyze(config, &symbol.to_uppercase(), &range, json, save).await,
        Command::Demo { symbol, days, json } => {
            run_demo(config, &symbol.to_uppercase(), days, json).await
        }
        Command::Watch => watch(config).await,
        Command::History {
            symbol,
            status,
            limit,
        } => history(&config, symbol, status.as_deref(), limit).await,
        Command::Validate => validate(&config).await,
    }
}

async fn open_store(config: &EnsembleConfig) -> Result<Arc<dyn PredictionStore>> {
    match config.database_url.as_deref() {
        Some(url) => Ok(Arc::new(
            SqlitePredictionStore::connect(url)
                .await
                .with_context(|| format!("failed to open {url}"))?,
        )),
        None => {
            warn!("DATABASE_URL not set, predictions are kept in memory only");
            Ok(Arc::new(MemoryPredictionStore::new()))
        }
    }
}

async fn orchestrator(config: EnsembleConfig) -> Result<EnsembleOrchestrator> {
    let store = open_store(&config).await?;
    Ok(EnsembleOrchestrator::from_config_with_store(config, store)?)
}

fn print_result(result: &AnalysisResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        println!("{}", output::analysis(result));
    }
    Ok(())
}

async fn analyze(
    config: EnsembleConfig,
    symbol: &str,
    range: &str,
    json: bool,
    save: bool,
) -> Result<()> {
    let orchestrator = orchestrator(config).await?;
    let market = YahooFinanceClient::new();

    let snapshot = market
        .snapshot(symbol, range)
        .await
        .with_context(|| format!("no market data for {symbol}"))?;
    let request = AnalysisRequest::from_snapshot(snapshot);

    let result = orchestrator
        .analyze_with_timeout(request, orchestrator.analysis_timeout())
        .await?;
    print_result(&result, json)?;

    if save {
        match orchestrator.record(&result).await {
            Some(id) => eprintln!("Saved prediction {id}"),
            None => eprintln!("Prediction was not saved, see logs"),
        }
    }
    Ok(())
}

async fn run_demo(config: EnsembleConfig, symbol: &str, days: usize, json: bool) -> Result<()> {
    if days < 2 {
        bail!("demo needs at least 2 days of history");
    }
    let orchestrator = orchestrator(config).await?;

    let bars = demo::random_walk(&mut rand::rng(), days, demo::DEFAULT_BASE_PRICE);
    let (previous, current) = match bars.as_slice() {
        [.., previous, current] => (previous.close, current.close),
        _ => bail!("demo history is empty"),
    };

    let mut request = AnalysisRequest::new(symbol, current, bars);
    if let Some(change) = percent_change(previous, current) {
        request = request.with_price_change(change);
    }

    let result = orchestrator
        .analyze_with_timeout(request, orchestrator.analysis_timeout())
        .await?;
    print_result(&result, json)
}

async fn watch(config: EnsembleConfig) -> Result<()> {
    if config.watchlist.is_empty() {
        bail!("WATCHLIST_SYMBOLS is empty, nothing to watch");
    }
    let watcher_config = config.clone();
    let orchestrator = Arc::new(orchestrator(config).await?);
    let market: Arc<dyn MarketDataSource> = Arc::new(YahooFinanceClient::new());
    let watcher = PriceWatcher::from_config(&watcher_config, orchestrator, market);

    tokio::select! {
        () = watcher.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("shutting down watcher");
        }
    }
    Ok(())
}

async fn history(
    config: &EnsembleConfig,
    symbol: Option<String>,
    status: Option<&str>,
    limit: usize,
) -> Result<()> {
    let store = open_store(config).await?;

    let mut filter = PredictionFilter::new();
    if let Some(symbol) = symbol {
        filter = filter.symbol(symbol.to_uppercase());
    }
    if let Some(raw) = status {
        let status = PredictionStatus::parse(raw)
            .with_context(|| format!("unknown status {raw:?}"))?;
        filter = filter.status(status);
    }

    let records = store.query(&filter, limit).await?;
    if records.is_empty() {
        println!("No predictions recorded");
    } else {
        println!("{}", output::history(&records));
    }
    Ok(())
}

async fn validate(config: &EnsembleConfig) -> Result<()> {
    let store = open_store(config).await?;
    let validator = PredictionValidator::new(store, Arc::new(YahooFinanceClient::new()));
    let summary = validator.validate_pending().await?;
    println!("{}", output::validation(&summary));
    Ok(())
}
