//! Terminal rendering

use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, ContentArrangement, Table};
use ensemble_stock::{AnalysisResult, PredictionRecord, ValidationSummary};

fn table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn or_na<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
}

fn score(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{v:.1}"))
}

/// Decision summary plus one row per analyst
pub fn analysis(result: &AnalysisResult) -> String {
    let decision = &result.final_decision;

    let mut summary = table();
    summary.set_header(vec!["Field", "Value"]);
    summary.add_row(vec!["Symbol".to_string(), result.symbol.clone()]);
    summary.add_row(vec![
        "Price".to_string(),
        format!(
            "{:.2} ({})",
            result.current_price,
            result
                .price_change_percent
                .map_or_else(|| "N/A".to_string(), |c| format!("{c:+.2}%"))
        ),
    ]);
    summary.add_row(vec![
        "Action".to_string(),
        format!("{} ({})", decision.action, decision.confidence),
    ]);
    summary.add_row(vec![
        "Ensemble score".to_string(),
        format!("{:.2}", decision.ensemble_score),
    ]);
    summary.add_row(vec![
        "Agreement".to_string(),
        format!("{:.2}", result.confidence_score),
    ]);
    summary.add_row(vec!["Target".to_string(), format!("{:.2}", decision.target_price)]);
    summary.add_row(vec!["Stop loss".to_string(), format!("{:.2}", decision.stop_loss)]);
    summary.add_row(vec!["Reasoning".to_string(), decision.reasoning.clone()]);
    summary.add_row(vec![
        "News".to_string(),
        format!(
            "{} articles, {}",
            result.metadata.news_count, result.metadata.news_sentiment.overall
        ),
    ]);
    summary.add_row(vec![
        "Indicators".to_string(),
        result.metadata.technical_indicators.overall_signal.to_string(),
    ]);
    summary.add_row(vec![
        "Elapsed".to_string(),
        format!("{:.2}s", result.analysis_time_seconds),
    ]);

    let mut seats = table();
    seats.set_header(vec!["Analyst", "Model", "Verdict", "Score", "Notes"]);

    let s = &result.sentiment_analysis;
    seats.add_row(vec![
        Cell::new("Sentiment"),
        Cell::new(&result.models_used.sentiment),
        Cell::new(or_na(s.sentiment)),
        Cell::new(score(s.score)),
        Cell::new(s.error.as_deref().or(s.drivers.as_deref()).unwrap_or("")),
    ]);

    let t = &result.technical_analysis;
    seats.add_row(vec![
        Cell::new("Technical"),
        Cell::new(&result.models_used.technical),
        Cell::new(or_na(t.signal)),
        Cell::new(score(t.strength)),
        Cell::new(t.error.as_deref().or(t.key_indicators.as_deref()).unwrap_or("")),
    ]);

    let r = &result.risk_assessment;
    seats.add_row(vec![
        Cell::new("Risk"),
        Cell::new(&result.models_used.risk),
        Cell::new(or_na(r.risk_level)),
        Cell::new(score(r.risk_score)),
        Cell::new(r.error.as_deref().or(r.risk_factors.as_deref()).unwrap_or("")),
    ]);

    let a = &result.anomaly_detection;
    let verdict = match a.anomaly_detected {
        Some(true) => format!("yes ({})", a.anomaly_type.as_deref().unwrap_or("unknown")),
        Some(false) => "no".to_string(),
        None => "N/A".to_string(),
    };
    seats.add_row(vec![
        Cell::new("Anomaly"),
        Cell::new(&result.models_used.anomaly),
        Cell::new(verdict),
        Cell::new(a.severity.as_deref().unwrap_or("")),
        Cell::new(a.error.as_deref().or(a.reason.as_deref()).unwrap_or("")),
    ]);

    format!("{summary}\n{seats}")
}

/// Stored predictions, newest first
pub fn history(records: &[PredictionRecord]) -> String {
    let mut history = table();
    history.set_header(vec![
        "When", "Symbol", "Action", "Score", "Price", "Target", "Stop", "Status", "Actual",
    ]);
    for record in records {
        history.add_row(vec![
            record.timestamp.format("%Y-%m-%d %H:%M").to_string(),
            record.symbol.clone(),
            format!("{} ({})", record.action, record.confidence),
            format!("{:.2}", record.ensemble_score),
            format!("{:.2}", record.current_price),
            format!("{:.2}", record.target_price),
            format!("{:.2}", record.stop_loss),
            record.status.to_string(),
            record
                .actual_price
                .map_or_else(|| "-".to_string(), |p| format!("{p:.2}")),
        ]);
    }
    history.to_string()
}

pub fn validation(summary: &ValidationSummary) -> String {
    let mut out = table();
    out.set_header(vec!["Validated", "Correct", "Incorrect", "Skipped", "Accuracy"]);
    out.add_row(vec![
        summary.validated.to_string(),
        summary.correct.to_string(),
        summary.incorrect.to_string(),
        summary.skipped.to_string(),
        format!("{:.2}%", summary.accuracy),
    ]);
    out.to_string()
}
