//! SNMP polling engine
//!
//! ## Architecture Overview
//!
//! ```text
//!   Poller (controller) ── CRUD ──> DeviceRegistry
//!        │                             │ read
//!        ├── SessionManager (one session per device)
//!        │
//!        └── spawns one SchedulerActor per device
//!                 │ timer fires
//!                 ▼
//!            GateEvaluator ── no ──> re-arm
//!                 │ yes
//!                 ▼
//!            PollExecutor ──> ResultRecorder ──> observers
//!                                   │
//!                                   └─ spawn ──> MetricsStore (normalized row)
//! ```
//!
//! Each device runs on its own task: polls of different devices overlap
//! freely, polls of one device are strictly sequential. The registry and the
//! result buffer are the only shared mutable state.

pub mod controller;
pub mod executor;
pub mod gate;
pub mod normalizer;
pub mod recorder;
pub mod registry;
pub mod scheduler;
pub mod session;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::snmp::SnmpValue;

pub use controller::{DeviceStatus, Poller, PollerStatus};
pub use executor::{PollExecutor, PollOutcome, TestResult};
pub use gate::GateEvaluator;
pub use recorder::{DeviceHealth, ResultListener, ResultRecorder};
pub use registry::DeviceRegistry;
pub use session::SessionManager;

/// Result type alias for controller operations
pub type PollerResult<T> = Result<T, PollerError>;

/// Errors reported synchronously to callers of the controller
#[derive(Debug, Clone, PartialEq)]
pub enum PollerError {
    /// No device with this id is registered
    NotFound(String),

    /// Device configuration failed validation
    InvalidConfig(String),

    /// A session could not be established
    Session(String),
}

impl fmt::Display for PollerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollerError::NotFound(id) => write!(f, "device '{}' not found", id),
            PollerError::InvalidConfig(msg) => write!(f, "invalid device configuration: {}", msg),
            PollerError::Session(msg) => write!(f, "session error: {}", msg),
        }
    }
}

impl std::error::Error for PollerError {}

/// Outcome of one poll attempt
///
/// `data` is present iff `success`; `error` is present iff not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResult {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<String, SnmpValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PollResult {
    pub fn success(device_id: impl Into<String>, data: BTreeMap<String, SnmpValue>) -> Self {
        Self {
            device_id: device_id.into(),
            timestamp: Utc::now(),
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(device_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            timestamp: Utc::now(),
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}
