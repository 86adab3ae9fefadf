//! Helper functions for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use transmitter_poller::{
    NewDevice, Poller,
    directory::{MemoryDirectory, SiteRecord, TransmitterRecord},
    snmp::{SessionErrorHook, SessionParams, SnmpError, SnmpSession, SnmpTransport, SnmpValue, Varbind},
    store::MetricsStore,
};

pub const SYS_UPTIME: &str = "1.3.6.1.2.1.1.3.0";
pub const SYS_NAME: &str = "1.3.6.1.2.1.1.5.0";
pub const FORWARD_POWER: &str = "1.3.6.1.4.1.41424.1.2.1.0";
pub const REFLECTED_POWER: &str = "1.3.6.1.4.1.41424.1.2.2.0";

/// Scripted behaviour shared by every session a [`MockTransport`] opens
#[derive(Default)]
struct Script {
    delay: Duration,
    failure: Option<SnmpError>,
    values: HashMap<String, SnmpValue>,
}

/// In-process stand-in for the UDP transport
///
/// Answers every requested OID (42 unless scripted), counts opens, closes and
/// GETs, and tracks how many GETs overlap.
#[derive(Default)]
pub struct MockTransport {
    script: Arc<Mutex<Script>>,
    pub opens: AtomicUsize,
    pub closes: Arc<AtomicUsize>,
    pub gets: Arc<AtomicUsize>,
    pub in_flight: Arc<AtomicUsize>,
    pub max_in_flight: Arc<AtomicUsize>,
    hooks: Mutex<Vec<(SessionParams, SessionErrorHook)>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_delay(&self, delay: Duration) {
        self.script.lock().unwrap().delay = delay;
    }

    pub fn fail_with(&self, error: Option<SnmpError>) {
        self.script.lock().unwrap().failure = error;
    }

    pub fn set_value(&self, oid: &str, value: SnmpValue) {
        self.script.lock().unwrap().values.insert(oid.to_string(), value);
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Parameters of the most recently opened session
    pub fn last_params(&self) -> Option<SessionParams> {
        self.hooks.lock().unwrap().last().map(|(params, _)| params.clone())
    }

    /// Fire the error hook of the most recently opened session
    pub fn raise_session_error(&self, message: &str) {
        let hook = self.hooks.lock().unwrap().last().map(|(_, hook)| hook.clone());
        if let Some(hook) = hook {
            hook(message.to_string());
        }
    }
}

struct MockSession {
    script: Arc<Mutex<Script>>,
    closes: Arc<AtomicUsize>,
    gets: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

#[async_trait]
impl SnmpSession for MockSession {
    async fn get(&self, oids: &[String]) -> Result<Vec<Varbind>, SnmpError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let (delay, failure, values) = {
            let script = self.script.lock().unwrap();
            (script.delay, script.failure.clone(), script.values.clone())
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(error) = failure {
            return Err(error);
        }

        Ok(oids
            .iter()
            .map(|oid| {
                let value = values.get(oid).cloned().unwrap_or(SnmpValue::Integer(42));
                Varbind::new(oid.clone(), value)
            })
            .collect())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SnmpTransport for MockTransport {
    async fn open(
        &self,
        params: &SessionParams,
        on_error: SessionErrorHook,
    ) -> Result<Arc<dyn SnmpSession>, SnmpError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.hooks.lock().unwrap().push((params.clone(), on_error));
        Ok(Arc::new(MockSession {
            script: self.script.clone(),
            closes: self.closes.clone(),
            gets: self.gets.clone(),
            in_flight: self.in_flight.clone(),
            max_in_flight: self.max_in_flight.clone(),
        }))
    }
}

pub fn create_test_device(id: &str, interval_ms: u64) -> NewDevice {
    NewDevice {
        id: Some(id.to_string()),
        host: "10.20.0.5".to_string(),
        oids: vec![SYS_UPTIME.to_string(), SYS_NAME.to_string()],
        poll_interval_ms: Some(interval_ms),
        timeout_ms: Some(50),
        retries: Some(0),
        ..Default::default()
    }
}

pub fn create_test_poller(transport: Arc<MockTransport>, directory: Arc<MemoryDirectory>) -> Poller {
    Poller::new(transport, directory, None, 1000)
}

pub fn create_test_poller_with_store(
    transport: Arc<MockTransport>,
    directory: Arc<MemoryDirectory>,
    store: Arc<dyn MetricsStore>,
) -> Poller {
    Poller::new(transport, directory, Some(store), 1000)
}

pub fn transmitter(id: &str, is_active: bool, site_id: Option<&str>) -> TransmitterRecord {
    TransmitterRecord {
        id: id.to_string(),
        is_active,
        site_id: site_id.map(String::from),
    }
}

pub fn site(id: &str, is_active: bool) -> SiteRecord {
    SiteRecord {
        id: id.to_string(),
        is_active,
    }
}

/// Wait (in real time) until `check` holds or the budget runs out
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
