//! In-process prediction store

use super::{PredictionFilter, PredictionRecord, PredictionStatus, PredictionStore};
use crate::error::{Result, StockError};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Prediction store backed by a map; contents are lost on exit
#[derive(Debug, Default)]
pub struct MemoryPredictionStore {
    records: RwLock<HashMap<Uuid, PredictionRecord>>,
}

impl MemoryPredictionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl PredictionStore for MemoryPredictionStore {
    async fn save(&self, record: &PredictionRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(StockError::StoreError(format!(
                "prediction {} already exists",
                record.id
            )));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<PredictionRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn query(&self, filter: &PredictionFilter, limit: usize) -> Result<Vec<PredictionRecord>> {
        let records = self.records.read().await;
        let mut matching: Vec<PredictionRecord> =
            records.values().filter(|r| filter.matches(r)).cloned().collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: PredictionStatus,
        actual_price: Option<f64>,
    ) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&id)
            .ok_or_else(|| StockError::StoreError(format!("prediction {id} not found")))?;
        record.status = status;
        record.actual_price = actual_price;
        record.validated_at = Some(Utc::now());
        Ok(())
    }
}
