//! SNMP transport seam
//!
//! The poller never speaks the wire protocol itself. It talks to an
//! [`SnmpTransport`] which opens one [`SnmpSession`] per device; the session
//! performs a GET of N OIDs with its own timeout and retry budget.
//!
//! [`udp::UdpTransport`] is the production implementation backed by `snmp2`.
//! Tests plug in scripted transports through the same traits.

pub mod udp;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::device::SnmpVersion;

pub use udp::UdpTransport;

/// Connection parameters a session is bound to
///
/// Any change here requires the session to be recreated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    pub host: String,
    pub port: u16,
    pub community: String,
    pub version: SnmpVersion,
    pub timeout: Duration,
    pub retries: u32,
}

impl SessionParams {
    /// `host:port` suitable for socket address resolution
    pub fn target(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Upper bound on how long one GET may take
    pub fn deadline(&self) -> Duration {
        self.timeout.saturating_mul(self.attempts())
    }

    /// First try plus retries
    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// Decoded varbind value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SnmpValue {
    Integer(i64),
    Counter32(u32),
    Gauge32(u32),
    Counter64(u64),
    Timeticks(u32),
    OctetString(String),
    ObjectIdentifier(String),
    IpAddress(String),
    Boolean(bool),
    Opaque(String),
    Null,
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl SnmpValue {
    /// Numeric view of the value, only for numeric SNMP types
    ///
    /// Octet strings are never coerced even when they look like numbers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SnmpValue::Integer(v) => Some(*v as f64),
            SnmpValue::Counter32(v) | SnmpValue::Gauge32(v) | SnmpValue::Timeticks(v) => {
                Some(*v as f64)
            }
            SnmpValue::Counter64(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Agent-side exception markers returned in place of a value
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            SnmpValue::NoSuchObject | SnmpValue::NoSuchInstance | SnmpValue::EndOfMibView
        )
    }
}

impl fmt::Display for SnmpValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnmpValue::Integer(v) => write!(f, "{v}"),
            SnmpValue::Counter32(v) | SnmpValue::Gauge32(v) | SnmpValue::Timeticks(v) => {
                write!(f, "{v}")
            }
            SnmpValue::Counter64(v) => write!(f, "{v}"),
            SnmpValue::OctetString(s)
            | SnmpValue::ObjectIdentifier(s)
            | SnmpValue::IpAddress(s)
            | SnmpValue::Opaque(s) => f.write_str(s),
            SnmpValue::Boolean(b) => write!(f, "{b}"),
            SnmpValue::Null => f.write_str("null"),
            SnmpValue::NoSuchObject => f.write_str("noSuchObject"),
            SnmpValue::NoSuchInstance => f.write_str("noSuchInstance"),
            SnmpValue::EndOfMibView => f.write_str("endOfMibView"),
        }
    }
}

/// One (OID, value) pair from a response
#[derive(Debug, Clone, PartialEq)]
pub struct Varbind {
    pub oid: String,
    pub value: SnmpValue,
}

impl Varbind {
    pub fn new(oid: impl Into<String>, value: SnmpValue) -> Self {
        Self {
            oid: oid.into(),
            value,
        }
    }
}

/// Errors surfaced by a transport or session
#[derive(Debug, Clone, PartialEq)]
pub enum SnmpError {
    /// No response after all attempts
    Timeout { attempts: u32 },

    /// Socket or encoding failure
    Transport(String),

    /// The agent answered with an error status or exception varbind
    Agent(String),

    /// OID string could not be parsed
    InvalidOid(String),
}

impl fmt::Display for SnmpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnmpError::Timeout { attempts } => {
                write!(f, "request timed out after {attempts} attempt(s)")
            }
            SnmpError::Transport(msg) => write!(f, "transport error: {msg}"),
            SnmpError::Agent(msg) => write!(f, "agent error: {msg}"),
            SnmpError::InvalidOid(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for SnmpError {}

/// Callback for faults a session detects outside of a GET
pub type SessionErrorHook = Arc<dyn Fn(String) + Send + Sync>;

/// A live binding to one agent
#[async_trait]
pub trait SnmpSession: Send + Sync {
    /// GET all `oids` in a single request
    ///
    /// Retries and timeouts are governed by the parameters the session was
    /// opened with.
    async fn get(&self, oids: &[String]) -> Result<Vec<Varbind>, SnmpError>;

    /// Release the underlying socket
    async fn close(&self);
}

/// Factory for sessions
#[async_trait]
pub trait SnmpTransport: Send + Sync {
    async fn open(
        &self,
        params: &SessionParams,
        on_error: SessionErrorHook,
    ) -> Result<Arc<dyn SnmpSession>, SnmpError>;
}
