//! SQLite prediction store

use super::{PredictionFilter, PredictionRecord, PredictionStatus, PredictionStore};
use crate::error::{Result, StockError};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

const COLUMNS: &str = "id, symbol, timestamp, status, action, confidence, confidence_score, \
    ensemble_score, current_price, target_price, stop_loss, reasoning, model_votes, \
    technical_signal, news_sentiment, actual_price, validated_at";

/// Prediction store backed by a SQLite database
#[derive(Debug, Clone)]
pub struct SqlitePredictionStore {
    pool: SqlitePool,
}

impl SqlitePredictionStore {
    /// Open (creating if missing) the database at `database_url` and
    /// ensure the schema exists
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // Each connection to :memory: opens a separate database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self::from_pool(pool).await?;
        info!(database_url, "prediction store ready");
        Ok(store)
    }

    /// Wrap an existing pool and ensure the schema exists
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS predictions (
                id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                status TEXT NOT NULL,
                action TEXT NOT NULL,
                confidence TEXT NOT NULL,
                confidence_score REAL NOT NULL,
                ensemble_score REAL NOT NULL,
                current_price REAL NOT NULL,
                target_price REAL NOT NULL,
                stop_loss REAL NOT NULL,
                reasoning TEXT NOT NULL,
                model_votes TEXT NOT NULL,
                technical_signal TEXT NOT NULL,
                news_sentiment TEXT NOT NULL,
                actual_price REAL,
                validated_at TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_predictions_symbol ON predictions(symbol)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_predictions_status ON predictions(status)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl PredictionStore for SqlitePredictionStore {
    async fn save(&self, record: &PredictionRecord) -> Result<()> {
        let sql = format!(
            "INSERT INTO predictions ({COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        sqlx::query(&sql)
            .bind(record.id.to_string())
            .bind(record.symbol.as_str())
            .bind(encode_time(record.timestamp))
            .bind(record.status.as_str())
            .bind(record.action.as_str())
            .bind(record.confidence.as_str())
            .bind(record.confidence_score)
            .bind(record.ensemble_score)
            .bind(record.current_price)
            .bind(record.target_price)
            .bind(record.stop_loss)
            .bind(record.reasoning.as_str())
            .bind(serde_json::to_string(&record.model_votes)?)
            .bind(encode_label(&record.technical_signal)?)
            .bind(encode_label(&record.news_sentiment)?)
            .bind(record.actual_price)
            .bind(record.validated_at.map(encode_time))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<PredictionRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM predictions WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode_row).transpose()
    }

    async fn query(&self, filter: &PredictionFilter, limit: usize) -> Result<Vec<PredictionRecord>> {
        let mut sql = format!("SELECT {COLUMNS} FROM predictions WHERE 1 = 1");
        if filter.symbol.is_some() {
            sql.push_str(" AND symbol = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.before.is_some() {
            sql.push_str(" AND timestamp < ?");
        }
        sql.push_str(" ORDER BY timestamp DESC LIMIT ?");

        let mut query = sqlx::query(&sql);
        if let Some(symbol) = &filter.symbol {
            query = query.bind(symbol.as_str());
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(before) = filter.before {
            query = query.bind(encode_time(before));
        }
        query = query.bind(i64::try_from(limit).unwrap_or(i64::MAX));

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: PredictionStatus,
        actual_price: Option<f64>,
    ) -> Result<()> {
        let outcome = sqlx::query(
            "UPDATE predictions SET status = ?, actual_price = ?, validated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(actual_price)
        .bind(encode_time(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if outcome.rows_affected() == 0 {
            return Err(StockError::StoreError(format!("prediction {id} not found")));
        }
        Ok(())
    }
}

// Fixed-width UTC timestamps so text ordering matches time ordering
fn encode_time(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| StockError::StoreError(format!("bad timestamp {value:?}: {e}")))
}

fn encode_label<T: Serialize>(value: &T) -> Result<String> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(label) => Ok(label),
        other => Ok(other.to_string()),
    }
}

fn decode_label<T: DeserializeOwned>(value: String) -> Result<T> {
    Ok(serde_json::from_value(serde_json::Value::String(value))?)
}

fn decode_row(row: &SqliteRow) -> Result<PredictionRecord> {
    let id: String = row.try_get("id")?;
    let timestamp: String = row.try_get("timestamp")?;
    let model_votes: String = row.try_get("model_votes")?;
    let validated_at: Option<String> = row.try_get("validated_at")?;

    Ok(PredictionRecord {
        id: Uuid::parse_str(&id)
            .map_err(|e| StockError::StoreError(format!("bad prediction id {id:?}: {e}")))?,
        symbol: row.try_get("symbol")?,
        timestamp: decode_time(&timestamp)?,
        status: decode_label(row.try_get("status")?)?,
        action: decode_label(row.try_get("action")?)?,
        confidence: decode_label(row.try_get("confidence")?)?,
        confidence_score: row.try_get("confidence_score")?,
        ensemble_score: row.try_get("ensemble_score")?,
        current_price: row.try_get("current_price")?,
        target_price: row.try_get("target_price")?,
        stop_loss: row.try_get("stop_loss")?,
        reasoning: row.try_get("reasoning")?,
        model_votes: serde_json::from_str(&model_votes)?,
        technical_signal: decode_label(row.try_get("technical_signal")?)?,
        news_sentiment: decode_label(row.try_get("news_sentiment")?)?,
        actual_price: row.try_get("actual_price")?,
        validated_at: validated_at.as_deref().map(decode_time).transpose()?,
    })
}
