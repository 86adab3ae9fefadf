//! In-memory metrics store (no persistence)
//!
//! Useful for tests and for running the hub with `backend: none`. All data is
//! lost on restart.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{HealthStatus, MetricsStore, QueryRange, StoreResult, TransmitterMetric};

/// Metrics grouped by transmitter, each list in append order
#[derive(Debug, Default)]
pub struct MemoryStore {
    metrics: RwLock<HashMap<String, Vec<TransmitterMetric>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total rows across all transmitters
    pub async fn len(&self) -> usize {
        self.metrics.read().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Latest row by timestamp; ties go to the later append
fn newest(rows: &[TransmitterMetric]) -> Option<&TransmitterMetric> {
    rows.iter()
        .enumerate()
        .max_by_key(|(idx, m)| (m.timestamp, *idx))
        .map(|(_, m)| m)
}

#[async_trait]
impl MetricsStore for MemoryStore {
    async fn append(&self, metric: TransmitterMetric) -> StoreResult<()> {
        self.metrics
            .write()
            .await
            .entry(metric.transmitter_id.clone())
            .or_default()
            .push(metric);
        Ok(())
    }

    async fn latest_all(&self) -> StoreResult<Vec<TransmitterMetric>> {
        let metrics = self.metrics.read().await;
        let mut rows: Vec<TransmitterMetric> = metrics
            .values()
            .filter_map(|rows| newest(rows).cloned())
            .collect();
        rows.sort_by(|a, b| a.transmitter_id.cmp(&b.transmitter_id));
        Ok(rows)
    }

    async fn latest(&self, transmitter_id: &str) -> StoreResult<Option<TransmitterMetric>> {
        Ok(self
            .metrics
            .read()
            .await
            .get(transmitter_id)
            .and_then(|rows| newest(rows).cloned()))
    }

    async fn range(&self, query: QueryRange) -> StoreResult<Vec<TransmitterMetric>> {
        debug!("querying in-memory store for {}", query.transmitter_id);

        let metrics = self.metrics.read().await;
        let mut rows: Vec<TransmitterMetric> = metrics
            .get(&query.transmitter_id)
            .map(|rows| {
                rows.iter()
                    .filter(|m| m.timestamp >= query.start && m.timestamp <= query.end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        rows.truncate(query.limit.unwrap_or(usize::MAX));
        Ok(rows)
    }

    async fn health_check(&self) -> StoreResult<HealthStatus> {
        Ok(HealthStatus {
            healthy: true,
            message: "In-memory store operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("total_metrics".to_string(), self.len().await.to_string()),
            ]),
        })
    }

    async fn close(&self) -> StoreResult<()> {
        debug!("closing in-memory store (no-op)");
        Ok(())
    }
}
