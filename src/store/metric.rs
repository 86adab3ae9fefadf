//! Persisted metric row
//!
//! One [`TransmitterMetric`] is written per recorded poll, successful or not.
//! Typed columns hold the normalized telemetry; the raw varbind map is kept
//! alongside so nothing the agent returned is lost.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::poller::PollResult;
use crate::poller::normalizer::normalize;
use crate::snmp::SnmpValue;

/// Transmitter state derived from the poll outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricStatus {
    Active,
    Fault,
}

impl MetricStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricStatus::Active => "active",
            MetricStatus::Fault => "fault",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "active" => MetricStatus::Active,
            _ => MetricStatus::Fault,
        }
    }
}

impl std::fmt::Display for MetricStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized telemetry sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransmitterMetric {
    pub transmitter_id: String,
    pub timestamp: DateTime<Utc>,

    /// Forward power (W)
    pub forward_power: Option<f64>,

    /// Reflected power (W)
    pub reflected_power: Option<f64>,

    /// Carrier frequency as reported by the exciter
    pub frequency: Option<f64>,

    /// Temperature (°C)
    pub temperature: Option<f64>,

    /// Power output setting/readback
    pub power_output: Option<f64>,

    /// Reported or derived VSWR
    pub vswr: Option<f64>,

    pub status: MetricStatus,

    /// Raw OID→value map of a successful poll
    pub raw_data: Option<BTreeMap<String, SnmpValue>>,

    pub error_message: Option<String>,
}

impl TransmitterMetric {
    /// Build the persisted row for a poll result
    ///
    /// The device id is the transmitter id.
    pub fn from_poll_result(result: &PollResult) -> Self {
        match (&result.data, result.success) {
            (Some(data), true) => {
                let partial = normalize(data);
                Self {
                    transmitter_id: result.device_id.clone(),
                    timestamp: result.timestamp,
                    forward_power: partial.forward_power,
                    reflected_power: partial.reflected_power,
                    frequency: partial.frequency,
                    temperature: partial.temperature,
                    power_output: partial.power_output,
                    vswr: partial.vswr,
                    status: MetricStatus::Active,
                    raw_data: Some(data.clone()),
                    error_message: None,
                }
            }
            _ => Self {
                transmitter_id: result.device_id.clone(),
                timestamp: result.timestamp,
                forward_power: None,
                reflected_power: None,
                frequency: None,
                temperature: None,
                power_output: None,
                vswr: None,
                status: MetricStatus::Fault,
                raw_data: None,
                error_message: result.error.clone(),
            },
        }
    }
}
