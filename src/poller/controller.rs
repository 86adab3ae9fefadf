//! Poller controller
//!
//! [`Poller`] is the single entry point for device CRUD, the global start/stop
//! switch, and result/metric queries. It is cheap to clone; every clone drives
//! the same engine, which is how the HTTP layer shares it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::executor::{PollExecutor, TestResult};
use super::gate::GateEvaluator;
use super::recorder::{ResultListener, ResultRecorder};
use super::registry::DeviceRegistry;
use super::scheduler::{PollContext, PollLocks, SchedulerHandle};
use super::session::{FaultHandler, SessionManager};
use super::{PollResult, PollerError, PollerResult};
use crate::device::{Device, DeviceUpdate, NewDevice};
use crate::directory::Directory;
use crate::snmp::SnmpTransport;
use crate::store::{MetricsStore, QueryRange, StoreResult, TransmitterMetric};

/// Global poller state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollerStatus {
    pub running: bool,
    pub device_count: usize,
    pub result_count: usize,
}

/// Per-device health derived from the result buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    pub device_id: String,
    pub online: bool,
    pub last_poll_time: Option<DateTime<Utc>>,
    pub recent_results: usize,
    pub recent_failures: usize,
}

struct Inner {
    context: PollContext,
    sessions: Arc<SessionManager>,
    store: Option<Arc<dyn MetricsStore>>,
    schedulers: Mutex<HashMap<String, SchedulerHandle>>,
    running: AtomicBool,
}

#[derive(Clone)]
pub struct Poller {
    inner: Arc<Inner>,
}

impl Poller {
    /// Build a stopped poller
    ///
    /// `store` receives a normalized row for every recorded result; without
    /// one, results live only in the in-memory buffer.
    pub fn new(
        transport: Arc<dyn SnmpTransport>,
        directory: Arc<dyn Directory>,
        store: Option<Arc<dyn MetricsStore>>,
        result_capacity: usize,
    ) -> Self {
        let registry = Arc::new(DeviceRegistry::new());
        let recorder = Arc::new(ResultRecorder::new(result_capacity, store.clone()));
        let sessions = Arc::new(SessionManager::new(
            transport,
            session_fault_handler(registry.clone(), recorder.clone()),
        ));
        let gate = GateEvaluator::new(directory);

        let context = PollContext {
            registry,
            gate: gate.clone(),
            executor: PollExecutor::new(gate, sessions.clone()),
            recorder,
            locks: Arc::new(PollLocks::default()),
        };

        Self {
            inner: Arc::new(Inner {
                context,
                sessions,
                store,
                schedulers: Mutex::new(HashMap::new()),
                running: AtomicBool::new(false),
            }),
        }
    }

    fn registry(&self) -> &DeviceRegistry {
        &self.inner.context.registry
    }

    fn recorder(&self) -> &ResultRecorder {
        &self.inner.context.recorder
    }

    // ---- device CRUD ----

    /// Validate, register, open a session, and arm the scheduler
    ///
    /// An enabled device arms itself whether or not the poller is running;
    /// only `stop()` cancels it again.
    #[instrument(skip_all, fields(host = %config.host))]
    pub async fn add_device(&self, config: NewDevice) -> PollerResult<Device> {
        let device = config.into_device()?;
        self.registry().insert(device.clone()).await?;
        self.inner.sessions.open(&device).await;

        if device.enabled {
            self.arm(&device.id).await;
        }

        info!(device = %device.id, "added device {}", device.display_name());
        Ok(device)
    }

    /// Merge a partial update into a registered device
    ///
    /// The session is recreated when any connection parameter changed. An
    /// enabled→disabled transition leaves the scheduler running since it
    /// gates itself; disabled→enabled arms it when missing, like an add.
    #[instrument(skip(self, update))]
    pub async fn update_device(&self, id: &str, update: DeviceUpdate) -> PollerResult<Device> {
        let current = self
            .registry()
            .get(id)
            .await
            .ok_or_else(|| PollerError::NotFound(id.to_string()))?;

        let merged = update.merge(&current)?;
        let previous = self.registry().replace(merged.clone()).await?;

        if previous.session_params() != merged.session_params() {
            debug!("connection parameters changed, recreating session");
            self.inner.sessions.recreate(&merged).await;
        }

        if !previous.enabled && merged.enabled {
            self.arm(id).await;
        }

        Ok(merged)
    }

    /// Cancel scheduling, close the session, and forget the device
    ///
    /// An in-flight poll still completes and its result is recorded.
    #[instrument(skip(self))]
    pub async fn remove_device(&self, id: &str) -> PollerResult<Device> {
        let removed = self
            .registry()
            .remove(id)
            .await
            .ok_or_else(|| PollerError::NotFound(id.to_string()))?;

        let handle = self.inner.schedulers.lock().await.remove(id);
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
        self.inner.sessions.close(id).await;
        self.inner.context.locks.release(id).await;

        info!("removed device {}", removed.display_name());
        Ok(removed)
    }

    pub async fn get_device(&self, id: &str) -> PollerResult<Device> {
        self.registry()
            .get(id)
            .await
            .ok_or_else(|| PollerError::NotFound(id.to_string()))
    }

    pub async fn list_devices(&self) -> Vec<Device> {
        self.registry().list().await
    }

    // ---- global switch ----

    /// Arm every enabled device without a live scheduler
    pub async fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            debug!("poller already running");
            return;
        }

        let mut armed = 0;
        for device in self.registry().list().await {
            if device.enabled && self.arm(&device.id).await {
                armed += 1;
            }
        }
        info!("poller started, {armed} device(s) scheduled");
    }

    /// Cancel all future polls; in-flight polls are left to finish
    ///
    /// Also cancels devices that armed themselves while the poller was
    /// stopped.
    pub async fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            debug!("poller was not started");
        }

        let handles: Vec<SchedulerHandle> = self
            .inner
            .schedulers
            .lock()
            .await
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        for handle in &handles {
            handle.shutdown().await;
        }
        info!("poller stopped, {} scheduler(s) cancelled", handles.len());
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub async fn status(&self) -> PollerStatus {
        PollerStatus {
            running: self.is_running(),
            device_count: self.registry().len().await,
            result_count: self.recorder().len().await,
        }
    }

    /// Spawn a scheduler unless a live one exists; true when one was spawned
    async fn arm(&self, id: &str) -> bool {
        let mut schedulers = self.inner.schedulers.lock().await;
        if schedulers.get(id).is_some_and(SchedulerHandle::is_alive) {
            return false;
        }
        schedulers.insert(
            id.to_string(),
            SchedulerHandle::spawn(id, self.inner.context.clone()),
        );
        true
    }

    // ---- polling ----

    /// One-shot connectivity check that bypasses registry and recorder
    pub async fn test_device(&self, config: NewDevice) -> PollerResult<TestResult> {
        self.inner.context.executor.test_device(config).await
    }

    /// Gated poll of a registered device, right now
    ///
    /// Goes through the device's scheduler when one runs, so it queues behind
    /// any in-flight poll. Returns `None` when the gate kept the device idle.
    #[instrument(skip(self))]
    pub async fn poll_now(&self, id: &str) -> PollerResult<Option<PollResult>> {
        let handle = self.inner.schedulers.lock().await.get(id).cloned();
        match handle {
            Some(handle) if handle.is_alive() => handle.poll_now().await,
            _ => self.inner.context.poll_once(id).await,
        }
    }

    pub async fn device_status(&self, id: &str) -> PollerResult<DeviceStatus> {
        let device = self.get_device(id).await?;
        let health = self.recorder().device_health(id).await;
        Ok(DeviceStatus {
            device_id: device.id,
            online: health.online,
            last_poll_time: device.last_poll_time,
            recent_results: health.recent_results,
            recent_failures: health.recent_failures,
        })
    }

    // ---- results ----

    pub async fn on_result(&self, listener: ResultListener) {
        self.recorder().on_result(listener).await;
    }

    pub async fn query_results(&self, device_id: Option<&str>, limit: usize) -> Vec<PollResult> {
        self.recorder().query(device_id, limit).await
    }

    pub async fn clear_results(&self) {
        self.recorder().clear().await;
    }

    // ---- stored metrics ----

    pub fn store(&self) -> Option<&Arc<dyn MetricsStore>> {
        self.inner.store.as_ref()
    }

    pub async fn latest_metrics(&self) -> StoreResult<Vec<TransmitterMetric>> {
        match &self.inner.store {
            Some(store) => store.latest_all().await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn latest_metric(&self, transmitter_id: &str) -> StoreResult<Option<TransmitterMetric>> {
        match &self.inner.store {
            Some(store) => store.latest(transmitter_id).await,
            None => Ok(None),
        }
    }

    pub async fn metrics_range(&self, query: QueryRange) -> StoreResult<Vec<TransmitterMetric>> {
        match &self.inner.store {
            Some(store) => store.range(query).await,
            None => Ok(Vec::new()),
        }
    }

    /// Stop polling and release every session and store connection
    pub async fn shutdown(&self) {
        self.stop().await;
        self.inner.sessions.close_all().await;
        if let Some(store) = &self.inner.store
            && let Err(e) = store.close().await
        {
            warn!("failed to close metrics store: {e}");
        }
    }
}

/// Record session faults as failed results while the device is pollable
fn session_fault_handler(
    registry: Arc<DeviceRegistry>,
    recorder: Arc<ResultRecorder>,
) -> FaultHandler {
    Arc::new(move |device_id: String, message: String| {
        let registry = registry.clone();
        let recorder = recorder.clone();
        tokio::spawn(async move {
            match registry.get(&device_id).await {
                Some(device) if device.enabled => {
                    warn!(device = %device_id, "session fault: {message}");
                    recorder
                        .record(PollResult::failure(device_id, format!("session error: {message}")))
                        .await;
                }
                _ => debug!(device = %device_id, "ignoring session fault: {message}"),
            }
        });
    })
}
