//! UDP transport backed by `snmp2`
//!
//! Each session wraps one `snmp2::AsyncSession`. The socket is created when
//! the session opens; if that fails the fault is reported through the error
//! hook and the session keeps trying to reconnect on every later GET.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use snmp2::{AsyncSession, Oid, Value};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use super::{SessionErrorHook, SessionParams, SnmpError, SnmpSession, SnmpTransport, SnmpValue, Varbind};
use crate::device::SnmpVersion;
use crate::oid::parse_oid;

/// Request ids start here for every new socket
const STARTING_REQUEST_ID: i32 = 1;

/// Production transport speaking SNMP v1/v2c over UDP
#[derive(Debug, Clone, Default)]
pub struct UdpTransport;

impl UdpTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SnmpTransport for UdpTransport {
    async fn open(
        &self,
        params: &SessionParams,
        on_error: SessionErrorHook,
    ) -> Result<Arc<dyn SnmpSession>, SnmpError> {
        let session = UdpSession {
            params: params.clone(),
            inner: Mutex::new(None),
            closed: AtomicBool::new(false),
            on_error,
        };

        {
            let mut inner = session.inner.lock().await;
            match connect(&session.params).await {
                Ok(socket) => *inner = Some(socket),
                Err(e) => {
                    warn!(target = %session.params.target(), "session connect failed: {e}");
                    (session.on_error)(e.to_string());
                }
            }
        }

        Ok(Arc::new(session))
    }
}

struct UdpSession {
    params: SessionParams,
    inner: Mutex<Option<AsyncSession>>,
    closed: AtomicBool,
    on_error: SessionErrorHook,
}

async fn connect(params: &SessionParams) -> Result<AsyncSession, SnmpError> {
    let target = params.target();
    let community = params.community.as_bytes();

    let result = match params.version {
        SnmpVersion::V1 => AsyncSession::new_v1(&target, community, STARTING_REQUEST_ID).await,
        SnmpVersion::V2c => AsyncSession::new_v2c(&target, community, STARTING_REQUEST_ID).await,
    };

    result.map_err(|e| SnmpError::Transport(format!("cannot open session to {target}: {e}")))
}

fn to_oid(s: &str) -> Result<Oid<'static>, SnmpError> {
    let arcs = parse_oid(s)?;
    Oid::from(arcs.as_slice()).map_err(|e| SnmpError::InvalidOid(format!("invalid OID '{s}': {e:?}")))
}

fn convert(value: &Value<'_>) -> SnmpValue {
    match value {
        Value::Integer(v) => SnmpValue::Integer(*v),
        Value::Counter32(v) => SnmpValue::Counter32(*v),
        Value::Unsigned32(v) => SnmpValue::Gauge32(*v),
        Value::Counter64(v) => SnmpValue::Counter64(*v),
        Value::Timeticks(v) => SnmpValue::Timeticks(*v),
        Value::OctetString(bytes) => SnmpValue::OctetString(String::from_utf8_lossy(bytes).into_owned()),
        Value::ObjectIdentifier(oid) => SnmpValue::ObjectIdentifier(oid.to_string()),
        Value::IpAddress([a, b, c, d]) => SnmpValue::IpAddress(format!("{a}.{b}.{c}.{d}")),
        Value::Boolean(b) => SnmpValue::Boolean(*b),
        Value::Null => SnmpValue::Null,
        Value::NoSuchObject => SnmpValue::NoSuchObject,
        Value::NoSuchInstance => SnmpValue::NoSuchInstance,
        Value::EndOfMibView => SnmpValue::EndOfMibView,
        other => SnmpValue::Opaque(format!("{other:?}")),
    }
}

#[async_trait]
impl SnmpSession for UdpSession {
    async fn get(&self, oids: &[String]) -> Result<Vec<Varbind>, SnmpError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SnmpError::Transport("session closed".to_string()));
        }

        let parsed = oids
            .iter()
            .map(|s| to_oid(s))
            .collect::<Result<Vec<_>, _>>()?;
        let refs: Vec<&Oid<'_>> = parsed.iter().collect();

        let mut inner = self.inner.lock().await;

        if inner.is_none() {
            debug!(target = %self.params.target(), "reconnecting session");
            *inner = Some(connect(&self.params).await?);
        }

        let Some(session) = inner.as_mut() else {
            return Err(SnmpError::Transport("session is not connected".to_string()));
        };

        let result = match timeout(self.params.deadline(), exchange(session, &refs, &self.params)).await {
            Ok(result) => result,
            Err(_) => Err(SnmpError::Timeout {
                attempts: self.params.attempts(),
            }),
        };

        // close() ran while this GET held the socket
        if self.closed.load(Ordering::SeqCst) {
            inner.take();
        }

        result
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);

        // dropping the AsyncSession releases the socket; an in-flight GET
        // keeps it until its deadline and drops it on the way out
        match self.inner.try_lock() {
            Ok(mut inner) => {
                inner.take();
            }
            Err(_) => trace!(target = %self.params.target(), "GET in flight, deferring socket release"),
        }
    }
}

/// Send the GET until an answer arrives or the attempts run out
async fn exchange(
    session: &mut AsyncSession,
    refs: &[&Oid<'_>],
    params: &SessionParams,
) -> Result<Vec<Varbind>, SnmpError> {
    let attempts = params.attempts();

    for attempt in 1..=attempts {
        trace!(target = %params.target(), attempt, "sending GET for {} OIDs", refs.len());

        let response = match timeout(params.timeout, session.get_many(refs)).await {
            Ok(Ok(pdu)) => pdu,
            Ok(Err(e)) => return Err(SnmpError::Transport(format!("{e:?}"))),
            Err(_) => continue,
        };

        if response.error_status != 0 {
            return Err(SnmpError::Agent(format!(
                "error status {} at index {}",
                response.error_status, response.error_index
            )));
        }

        return Ok(response
            .varbinds
            .map(|(oid, value)| Varbind::new(oid.to_string(), convert(&value)))
            .collect());
    }

    Err(SnmpError::Timeout { attempts })
}
