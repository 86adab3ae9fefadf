//! Device configuration
//!
//! A [`Device`] is one SNMP agent to poll. Devices enter the registry through a
//! [`NewDevice`] body (which fills in defaults) and change through a
//! [`DeviceUpdate`] partial merge. Both paths run [`validate`] before anything
//! is stored.

use std::net::IpAddr;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::oid::parse_oid;
use crate::poller::{PollerError, PollerResult};
use crate::snmp::SessionParams;

pub const DEFAULT_PORT: u16 = 161;
pub const DEFAULT_COMMUNITY: &str = "public";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_RETRIES: u32 = 1;
pub const MAX_RETRIES: u32 = 10;

static HOSTNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$")
        .expect("hostname pattern is valid")
});

/// SNMP protocol version spoken by the agent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnmpVersion {
    #[serde(alias = "1")]
    V1,
    #[default]
    #[serde(alias = "2c")]
    V2c,
}

impl std::fmt::Display for SnmpVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnmpVersion::V1 => write!(f, "v1"),
            SnmpVersion::V2c => write!(f, "v2c"),
        }
    }
}

/// A registered polling target
///
/// The id doubles as the transmitter id used for directory lookups and for
/// persisted metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,

    /// Optional label used in logs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub host: String,
    pub port: u16,
    pub community: String,
    pub version: SnmpVersion,

    /// OIDs queried in a single GET, in request order
    pub oids: Vec<String>,

    #[serde(rename = "pollInterval")]
    pub poll_interval_ms: u64,

    #[serde(rename = "timeout")]
    pub timeout_ms: u64,

    pub retries: u32,

    /// Operator intent to poll
    pub enabled: bool,

    pub last_poll_time: Option<DateTime<Utc>>,
}

impl Device {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Everything a transport session is bound to
    pub fn session_params(&self) -> SessionParams {
        SessionParams {
            host: self.host.clone(),
            port: self.port,
            community: self.community.clone(),
            version: self.version,
            timeout: self.timeout(),
            retries: self.retries,
        }
    }
}

/// Body accepted when adding (or testing) a device
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDevice {
    pub id: Option<String>,
    pub name: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub community: Option<String>,
    pub version: Option<SnmpVersion>,
    #[serde(default)]
    pub oids: Vec<String>,
    #[serde(rename = "pollInterval")]
    pub poll_interval_ms: Option<u64>,
    #[serde(rename = "timeout")]
    pub timeout_ms: Option<u64>,
    pub retries: Option<u32>,
    pub enabled: Option<bool>,
}

impl NewDevice {
    /// Apply defaults, assign an id when none was given, and validate
    pub fn into_device(self) -> PollerResult<Device> {
        let id = match self.id {
            Some(id) if !id.trim().is_empty() => id,
            _ => uuid::Uuid::new_v4().to_string(),
        };

        let device = Device {
            id,
            name: self.name,
            host: self.host.trim().to_string(),
            port: self.port.unwrap_or(DEFAULT_PORT),
            community: self
                .community
                .unwrap_or_else(|| DEFAULT_COMMUNITY.to_string()),
            version: self.version.unwrap_or_default(),
            oids: self.oids.iter().map(|o| o.trim().to_string()).collect(),
            poll_interval_ms: self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            timeout_ms: self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
            retries: self.retries.unwrap_or(DEFAULT_RETRIES),
            enabled: self.enabled.unwrap_or(true),
            last_poll_time: None,
        };

        validate(&device)?;
        Ok(device)
    }
}

/// Partial update merged into an existing device
///
/// Absent fields leave the current value untouched. The id is immutable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceUpdate {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub community: Option<String>,
    pub version: Option<SnmpVersion>,
    pub oids: Option<Vec<String>>,
    #[serde(rename = "pollInterval")]
    pub poll_interval_ms: Option<u64>,
    #[serde(rename = "timeout")]
    pub timeout_ms: Option<u64>,
    pub retries: Option<u32>,
    pub enabled: Option<bool>,
}

impl DeviceUpdate {
    /// Produce the merged device without touching the original
    pub fn merge(&self, current: &Device) -> PollerResult<Device> {
        let mut merged = current.clone();

        if let Some(name) = &self.name {
            merged.name = Some(name.clone());
        }
        if let Some(host) = &self.host {
            merged.host = host.trim().to_string();
        }
        if let Some(port) = self.port {
            merged.port = port;
        }
        if let Some(community) = &self.community {
            merged.community = community.clone();
        }
        if let Some(version) = self.version {
            merged.version = version;
        }
        if let Some(oids) = &self.oids {
            merged.oids = oids.iter().map(|o| o.trim().to_string()).collect();
        }
        if let Some(interval) = self.poll_interval_ms {
            merged.poll_interval_ms = interval;
        }
        if let Some(timeout) = self.timeout_ms {
            merged.timeout_ms = timeout;
        }
        if let Some(retries) = self.retries {
            merged.retries = retries;
        }
        if let Some(enabled) = self.enabled {
            merged.enabled = enabled;
        }

        validate(&merged)?;
        Ok(merged)
    }
}

/// Check a device configuration before it reaches the registry
pub fn validate(device: &Device) -> PollerResult<()> {
    if device.poll_interval_ms == 0 {
        return Err(PollerError::InvalidConfig(
            "pollInterval must be greater than zero".to_string(),
        ));
    }

    if device.timeout_ms == 0 {
        return Err(PollerError::InvalidConfig(
            "timeout must be greater than zero".to_string(),
        ));
    }

    if device.retries > MAX_RETRIES {
        return Err(PollerError::InvalidConfig(format!(
            "retries must be at most {MAX_RETRIES}"
        )));
    }

    if !is_valid_host(&device.host) {
        return Err(PollerError::InvalidConfig(format!(
            "malformed host '{}'",
            device.host
        )));
    }

    if device.oids.is_empty() {
        return Err(PollerError::InvalidConfig(
            "at least one OID is required".to_string(),
        ));
    }

    for oid in &device.oids {
        parse_oid(oid).map_err(|e| PollerError::InvalidConfig(e.to_string()))?;
    }

    Ok(())
}

fn is_valid_host(host: &str) -> bool {
    if host.is_empty() || host.len() > 253 {
        return false;
    }

    host.parse::<IpAddr>().is_ok() || HOSTNAME.is_match(host)
}
