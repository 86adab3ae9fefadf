//! Session manager
//!
//! Owns exactly one transport session per registered device. A session is
//! always closed before it is replaced or forgotten, so sockets never outlive
//! the device they serve.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::device::Device;
use crate::snmp::{SessionErrorHook, SessionParams, SnmpError, SnmpSession, SnmpTransport};

/// Receives `(device_id, message)` for session-level faults
pub type FaultHandler = Arc<dyn Fn(String, String) + Send + Sync>;

struct ManagedSession {
    params: SessionParams,
    session: Arc<dyn SnmpSession>,
}

pub struct SessionManager {
    transport: Arc<dyn SnmpTransport>,
    sessions: Mutex<HashMap<String, ManagedSession>>,
    on_fault: FaultHandler,
}

impl SessionManager {
    pub fn new(transport: Arc<dyn SnmpTransport>, on_fault: FaultHandler) -> Self {
        Self {
            transport,
            sessions: Mutex::new(HashMap::new()),
            on_fault,
        }
    }

    fn hook_for(&self, device_id: &str) -> SessionErrorHook {
        let on_fault = self.on_fault.clone();
        let device_id = device_id.to_string();
        Arc::new(move |message: String| on_fault(device_id.clone(), message))
    }

    /// Open the device's session, closing any previous one first
    ///
    /// A transport that refuses to open is reported as a session fault; the
    /// executor retries the open on the next poll.
    #[instrument(skip_all, fields(device = %device.id))]
    pub async fn open(&self, device: &Device) {
        self.close(&device.id).await;

        let params = device.session_params();
        match self.transport.open(&params, self.hook_for(&device.id)).await {
            Ok(session) => {
                debug!("session opened to {}", params.target());
                self.install(&device.id, ManagedSession { params, session }).await;
            }
            Err(e) => {
                warn!("failed to open session: {e}");
                (self.on_fault)(device.id.clone(), e.to_string());
            }
        }
    }

    /// Store a session, closing whatever it displaces
    async fn install(&self, device_id: &str, managed: ManagedSession) {
        let displaced = self
            .sessions
            .lock()
            .await
            .insert(device_id.to_string(), managed);
        if let Some(displaced) = displaced {
            displaced.session.close().await;
        }
    }

    /// Close and forget the session; no-op when none exists
    pub async fn close(&self, device_id: &str) {
        let removed = self.sessions.lock().await.remove(device_id);
        if let Some(managed) = removed {
            managed.session.close().await;
            debug!(device = %device_id, "session closed");
        }
    }

    /// Close-then-open, used when connection parameters change
    pub async fn recreate(&self, device: &Device) {
        self.close(&device.id).await;
        self.open(device).await;
    }

    /// Session for a poll, opening one if the device has none
    ///
    /// The map lock is never held across a close, since closing waits for an
    /// in-flight GET on that session.
    pub async fn session_for(&self, device: &Device) -> Result<Arc<dyn SnmpSession>, SnmpError> {
        let params = device.session_params();

        let stale = {
            let mut sessions = self.sessions.lock().await;
            if let Some(managed) = sessions.get(&device.id)
                && managed.params == params
            {
                return Ok(managed.session.clone());
            }
            // absent, or the registry moved ahead of an in-flight recreate
            sessions.remove(&device.id)
        };
        if let Some(stale) = stale {
            stale.session.close().await;
        }

        let session = self.transport.open(&params, self.hook_for(&device.id)).await?;
        self.install(
            &device.id,
            ManagedSession {
                params,
                session: session.clone(),
            },
        )
        .await;
        Ok(session)
    }

    /// One-shot session outside the managed set; caller must close it
    pub async fn open_transient(
        &self,
        params: &SessionParams,
    ) -> Result<Arc<dyn SnmpSession>, SnmpError> {
        let target = params.target();
        let hook: SessionErrorHook = Arc::new(move |message: String| {
            warn!(target = %target, "transient session fault: {message}");
        });
        self.transport.open(params, hook).await
    }

    pub async fn contains(&self, device_id: &str) -> bool {
        self.sessions.lock().await.contains_key(device_id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Close every session (process shutdown)
    pub async fn close_all(&self) {
        let drained: Vec<ManagedSession> = self
            .sessions
            .lock()
            .await
            .drain()
            .map(|(_, managed)| managed)
            .collect();
        for managed in drained {
            managed.session.close().await;
        }
    }
}
