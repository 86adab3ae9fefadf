//! Durable time-series storage for transmitter metrics
//!
//! The poller hands every recorded result to a [`MetricsStore`] after
//! normalizing it into a [`TransmitterMetric`]. Rows are append-only; the
//! store answers the dashboard's latest/range queries.
//!
//! ## Backends
//!
//! - **SQLite** (default, feature `storage-sqlite`): WAL-mode database with embedded migrations
//! - **In-Memory**: no persistence, for tests or `backend: none`

pub mod error;
pub mod memory;
pub mod metric;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use metric::{MetricStatus, TransmitterMetric};

/// Inclusive time-range query for one transmitter
#[derive(Debug, Clone)]
pub struct QueryRange {
    pub transmitter_id: String,

    /// Start of time range (inclusive)
    pub start: DateTime<Utc>,

    /// End of time range (inclusive)
    pub end: DateTime<Utc>,

    /// Maximum number of rows to return
    pub limit: Option<usize>,
}

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub message: String,
    pub metadata: HashMap<String, String>,
}

/// Persistent metric storage
///
/// Implementations must be `Send + Sync`; the recorder appends from spawned
/// tasks while API handlers query concurrently.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Append one sample
    async fn append(&self, metric: TransmitterMetric) -> StoreResult<()>;

    /// Most recent sample of every transmitter, one row each
    async fn latest_all(&self) -> StoreResult<Vec<TransmitterMetric>>;

    /// Most recent sample of one transmitter
    async fn latest(&self, transmitter_id: &str) -> StoreResult<Option<TransmitterMetric>>;

    /// Samples within `[start, end]`, newest first
    async fn range(&self, query: QueryRange) -> StoreResult<Vec<TransmitterMetric>>;

    /// Lightweight liveness check
    async fn health_check(&self) -> StoreResult<HealthStatus>;

    /// Release connections
    async fn close(&self) -> StoreResult<()>;
}
