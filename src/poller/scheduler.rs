//! Per-device scheduler
//!
//! One actor task per device. The actor sleeps for the device's poll
//! interval, checks the gate, polls, records, and only then arms the next
//! sleep, so polls of one device never overlap and missed ticks never pile up.
//!
//! ## Message Flow
//!
//! ```text
//! sleep(interval) ─> registry lookup ─> gate ─> executor ─> recorder ─┐
//!      ↑                                                             │
//!      └──────────────────────── re-arm ─────────────────────────────┘
//!      ↑
//!      └─── Commands (PollNow, Shutdown)
//! ```
//!
//! The interval is read from the registry on every iteration, so updates take
//! effect at the next re-arm. A device that disappears from the registry ends
//! its actor at the next wake-up even if no Shutdown arrives.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::sleep;
use tracing::{debug, instrument, trace, warn};

use super::executor::{PollExecutor, PollOutcome};
use super::gate::GateEvaluator;
use super::recorder::ResultRecorder;
use super::registry::DeviceRegistry;
use super::{PollResult, PollerError, PollerResult};

/// Reply to a manual poll: `None` when the gate kept the device idle
pub type PollReply = PollerResult<Option<PollResult>>;

#[derive(Debug)]
pub enum SchedulerCommand {
    /// Poll immediately, outside the timer
    PollNow { respond_to: oneshot::Sender<PollReply> },

    /// Stop after any in-flight poll completes
    Shutdown,
}

/// Per-device poll exclusion
///
/// A retired scheduler may still be finishing its GET when a new one is
/// spawned for the same id (stop/start, remove/re-add). Every poll takes the
/// device's lock first, so at most one GET per device is ever in flight.
#[derive(Default)]
pub struct PollLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PollLocks {
    async fn lock_for(&self, device_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(device_id.to_string())
            .or_default()
            .clone()
    }

    /// Drop the lock of a removed device unless a poll still holds or awaits it
    pub async fn release(&self, device_id: &str) {
        let mut locks = self.locks.lock().await;
        if locks
            .get(device_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(device_id);
        }
    }

    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

/// Everything one poll iteration needs, shared by all schedulers
#[derive(Clone)]
pub struct PollContext {
    pub registry: Arc<DeviceRegistry>,
    pub gate: GateEvaluator,
    pub executor: PollExecutor,
    pub recorder: Arc<ResultRecorder>,
    pub locks: Arc<PollLocks>,
}

impl PollContext {
    /// Run one gated poll for `device_id` and record its result
    ///
    /// Waits for any other poll of the same device to finish first. A result
    /// whose device was removed mid-flight is still recorded; only the
    /// `lastPollTime` stamp is skipped.
    pub async fn poll_once(&self, device_id: &str) -> PollReply {
        let lock = self.locks.lock_for(device_id).await;
        let _guard = lock.lock().await;

        let device = self
            .registry
            .get(device_id)
            .await
            .ok_or_else(|| PollerError::NotFound(device_id.to_string()))?;

        if !self.gate.should_poll(&device).await {
            trace!(device = %device_id, "gated, re-arming without polling");
            return Ok(None);
        }

        let PollOutcome::Completed(result) = self.executor.poll(&device).await else {
            return Ok(None);
        };

        self.recorder.record(result.clone()).await;
        self.registry.touch(device_id, result.timestamp).await;

        Ok(Some(result))
    }
}

struct DeviceScheduler {
    device_id: String,
    context: PollContext,
    command_rx: mpsc::Receiver<SchedulerCommand>,
}

impl DeviceScheduler {
    #[instrument(skip(self), fields(device = %self.device_id))]
    async fn run(mut self) {
        debug!("scheduler started");

        loop {
            let Some(device) = self.context.registry.get(&self.device_id).await else {
                debug!("device no longer registered");
                break;
            };

            tokio::select! {
                biased;

                cmd = self.command_rx.recv() => match cmd {
                    Some(SchedulerCommand::PollNow { respond_to }) => {
                        trace!("received PollNow command");
                        let reply = self.context.poll_once(&self.device_id).await;
                        let _ = respond_to.send(reply);
                    }
                    Some(SchedulerCommand::Shutdown) => {
                        debug!("received shutdown command");
                        break;
                    }
                    None => {
                        warn!("command channel closed, shutting down");
                        break;
                    }
                },

                _ = sleep(device.poll_interval()) => {
                    if let Err(e) = self.context.poll_once(&self.device_id).await {
                        debug!("scheduled poll abandoned: {e}");
                    }
                }
            }
        }

        debug!("scheduler stopped");
    }
}

/// Handle for controlling one device's scheduler
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
    pub device_id: String,
}

impl SchedulerHandle {
    /// Spawn a scheduler; its first poll fires one interval from now
    pub fn spawn(device_id: impl Into<String>, context: PollContext) -> Self {
        let device_id = device_id.into();
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let actor = DeviceScheduler {
            device_id: device_id.clone(),
            context,
            command_rx: cmd_rx,
        };
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            device_id,
        }
    }

    /// Whether the actor task is still running
    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Poll now, queued behind any in-flight poll of the same device
    pub async fn poll_now(&self) -> PollReply {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::PollNow { respond_to: tx })
            .await
            .map_err(|_| PollerError::NotFound(self.device_id.clone()))?;

        rx.await
            .map_err(|_| PollerError::NotFound(self.device_id.clone()))?
    }

    /// Ask the actor to stop; an in-flight poll still completes
    pub async fn shutdown(&self) {
        if self.sender.send(SchedulerCommand::Shutdown).await.is_err() {
            trace!(device = %self.device_id, "scheduler already stopped");
        }
    }
}
