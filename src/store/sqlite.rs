//! SQLite metrics store
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Dashboard reads proceed while the recorder appends
//! - **Connection pooling**: Efficient resource usage
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! Rows are never updated or deleted here; retention is handled outside the
//! poller.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::{
    HealthStatus, MetricStatus, MetricsStore, QueryRange, StoreError, StoreResult,
    TransmitterMetric,
};

const COLUMNS: &str = "transmitter_id, timestamp, forward_power, reflected_power, frequency, \
                       temperature, power_output, vswr, status, raw_data, error_message";

/// SQLite-backed [`MetricsStore`]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteStore {
    /// Open (or create) the database and run migrations
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite store at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn row_to_metric(row: SqliteRow) -> StoreResult<TransmitterMetric> {
        let raw_data = row
            .get::<Option<String>, _>("raw_data")
            .map(|json| serde_json::from_str(&json))
            .transpose()?;

        Ok(TransmitterMetric {
            transmitter_id: row.get("transmitter_id"),
            timestamp: Self::millis_to_timestamp(row.get("timestamp")),
            forward_power: row.get("forward_power"),
            reflected_power: row.get("reflected_power"),
            frequency: row.get("frequency"),
            temperature: row.get("temperature"),
            power_output: row.get("power_output"),
            vswr: row.get("vswr"),
            status: MetricStatus::parse(row.get::<String, _>("status").as_str()),
            raw_data,
            error_message: row.get("error_message"),
        })
    }
}

#[async_trait]
impl MetricsStore for SqliteStore {
    #[instrument(skip(self, metric), fields(transmitter = %metric.transmitter_id))]
    async fn append(&self, metric: TransmitterMetric) -> StoreResult<()> {
        let raw_json = metric
            .raw_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(&format!(
            "INSERT INTO transmitter_metrics ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&metric.transmitter_id)
        .bind(metric.timestamp.timestamp_millis())
        .bind(metric.forward_power)
        .bind(metric.reflected_power)
        .bind(metric.frequency)
        .bind(metric.temperature)
        .bind(metric.power_output)
        .bind(metric.vswr)
        .bind(metric.status.as_str())
        .bind(raw_json)
        .bind(&metric.error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn latest_all(&self) -> StoreResult<Vec<TransmitterMetric>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {COLUMNS} FROM (
                SELECT *, ROW_NUMBER() OVER (
                    PARTITION BY transmitter_id ORDER BY timestamp DESC, id DESC
                ) AS rn
                FROM transmitter_metrics
            )
            WHERE rn = 1
            ORDER BY transmitter_id
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_metric).collect()
    }

    #[instrument(skip(self))]
    async fn latest(&self, transmitter_id: &str) -> StoreResult<Option<TransmitterMetric>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM transmitter_metrics WHERE transmitter_id = ? \
             ORDER BY timestamp DESC, id DESC LIMIT 1"
        ))
        .bind(transmitter_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_metric).transpose()
    }

    #[instrument(skip(self), fields(transmitter = %query.transmitter_id))]
    async fn range(&self, query: QueryRange) -> StoreResult<Vec<TransmitterMetric>> {
        debug!(
            "querying metrics for {} from {} to {}",
            query.transmitter_id, query.start, query.end
        );

        let limit = query.limit.map(|l| l as i64).unwrap_or(-1);

        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM transmitter_metrics \
             WHERE transmitter_id = ? AND timestamp >= ? AND timestamp <= ? \
             ORDER BY timestamp DESC, id DESC LIMIT ?"
        ))
        .bind(&query.transmitter_id)
        .bind(query.start.timestamp_millis())
        .bind(query.end.timestamp_millis())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let results = rows
            .into_iter()
            .map(Self::row_to_metric)
            .collect::<StoreResult<Vec<_>>>()?;
        debug!("query returned {} metrics", results.len());
        Ok(results)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StoreResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => Ok(HealthStatus {
                healthy: true,
                message: "SQLite store operational".to_string(),
                metadata: HashMap::from([
                    ("backend".to_string(), "sqlite".to_string()),
                    ("db_path".to_string(), self.db_path.clone()),
                ]),
            }),
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StoreResult<()> {
        info!("closing SQLite store");
        self.pool.close().await;
        Ok(())
    }
}
