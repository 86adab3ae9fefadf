//! Result recorder
//!
//! Keeps the most recent results in a bounded buffer for live views, fans
//! every result out to registered observers, and forwards a normalized row to
//! the metrics store in the background.
//!
//! Store failures are logged and dropped: the buffer already holds the result
//! and the polling loop must never wait on durability.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{error, trace};

use super::PollResult;
use crate::store::{MetricsStore, TransmitterMetric};

pub const DEFAULT_CAPACITY: usize = 1000;

/// Results considered by the online heuristic
const HEALTH_WINDOW: usize = 10;

/// A device with this many failures in the window is offline
const OFFLINE_FAILURES: usize = 5;

/// Observer invoked synchronously for every recorded result
pub type ResultListener = Arc<dyn Fn(&PollResult) + Send + Sync>;

/// Summary of a device's recent results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceHealth {
    pub online: bool,
    pub recent_results: usize,
    pub recent_failures: usize,
}

impl DeviceHealth {
    /// Online when fewer than half of the window failed and something succeeded
    fn from_recent(results: &[PollResult]) -> Self {
        let recent_failures = results.iter().filter(|r| !r.success).count();
        let successes = results.len() - recent_failures;
        Self {
            online: recent_failures < OFFLINE_FAILURES && successes > 0,
            recent_results: results.len(),
            recent_failures,
        }
    }
}

pub struct ResultRecorder {
    capacity: usize,
    buffer: RwLock<VecDeque<PollResult>>,
    listeners: RwLock<Vec<ResultListener>>,
    store: Option<Arc<dyn MetricsStore>>,
}

impl ResultRecorder {
    /// A zero capacity is treated as one
    pub fn new(capacity: usize, store: Option<Arc<dyn MetricsStore>>) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            buffer: RwLock::new(VecDeque::with_capacity(capacity)),
            listeners: RwLock::new(Vec::new()),
            store,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn on_result(&self, listener: ResultListener) {
        self.listeners.write().await.push(listener);
    }

    /// Append, evict the oldest beyond capacity, notify, then persist
    pub async fn record(&self, result: PollResult) {
        {
            let mut buffer = self.buffer.write().await;
            buffer.push_back(result.clone());
            while buffer.len() > self.capacity {
                buffer.pop_front();
            }
        }

        let listeners = self.listeners.read().await.clone();
        for listener in &listeners {
            listener(&result);
        }

        if let Some(store) = &self.store {
            let store = store.clone();
            let metric = TransmitterMetric::from_poll_result(&result);
            tokio::spawn(async move {
                let transmitter_id = metric.transmitter_id.clone();
                match store.append(metric).await {
                    Ok(()) => trace!(transmitter = %transmitter_id, "metric persisted"),
                    Err(e) => error!(transmitter = %transmitter_id, "failed to persist metric: {e}"),
                }
            });
        }
    }

    /// Up to `limit` most recent results, newest first
    pub async fn query(&self, device_id: Option<&str>, limit: usize) -> Vec<PollResult> {
        self.buffer
            .read()
            .await
            .iter()
            .rev()
            .filter(|r| device_id.is_none_or(|id| r.device_id == id))
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn device_health(&self, device_id: &str) -> DeviceHealth {
        let recent = self.query(Some(device_id), HEALTH_WINDOW).await;
        DeviceHealth::from_recent(&recent)
    }

    /// Empty the buffer; persisted rows are untouched
    pub async fn clear(&self) {
        self.buffer.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.buffer.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for ResultRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, None)
    }
}
