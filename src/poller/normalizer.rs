//! Raw varbinds → canonical transmitter telemetry
//!
//! The mapping is a closed table of [`MetricKind`]s rather than string
//! comparisons, so adding a kind forces every match to be updated. OIDs the
//! table does not know are ignored; non-numeric values for a known kind are
//! skipped without coercion.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::oid::canonical;
use crate::snmp::SnmpValue;

/// Transmitter telemetry MIB root
const TX_MIB: &str = "1.3.6.1.4.1.41424.1.2";

/// Canonical metric fields understood by the normalizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricKind {
    ForwardPower,
    ReflectedPower,
    Frequency,
    Temperature,
    PowerOutput,
    Vswr,
}

impl MetricKind {
    pub const ALL: [MetricKind; 6] = [
        MetricKind::ForwardPower,
        MetricKind::ReflectedPower,
        MetricKind::Frequency,
        MetricKind::Temperature,
        MetricKind::PowerOutput,
        MetricKind::Vswr,
    ];

    /// Scalar instance OID carrying this metric
    pub const fn oid(self) -> &'static str {
        match self {
            MetricKind::ForwardPower => "1.3.6.1.4.1.41424.1.2.1.0",
            MetricKind::ReflectedPower => "1.3.6.1.4.1.41424.1.2.2.0",
            MetricKind::Frequency => "1.3.6.1.4.1.41424.1.2.3.0",
            MetricKind::Temperature => "1.3.6.1.4.1.41424.1.2.4.0",
            MetricKind::PowerOutput => "1.3.6.1.4.1.41424.1.2.5.0",
            MetricKind::Vswr => "1.3.6.1.4.1.41424.1.2.6.0",
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            MetricKind::ForwardPower => "forwardPower",
            MetricKind::ReflectedPower => "reflectedPower",
            MetricKind::Frequency => "frequency",
            MetricKind::Temperature => "temperature",
            MetricKind::PowerOutput => "powerOutput",
            MetricKind::Vswr => "vswr",
        }
    }

    pub fn from_oid(oid: &str) -> Option<Self> {
        let oid = canonical(oid);
        if !oid.starts_with(TX_MIB) {
            return None;
        }
        Self::ALL.into_iter().find(|kind| kind.oid() == oid)
    }
}

/// Normalized fields of one poll; absent fields were not reported
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialMetric {
    pub forward_power: Option<f64>,
    pub reflected_power: Option<f64>,
    pub frequency: Option<f64>,
    pub temperature: Option<f64>,
    pub power_output: Option<f64>,
    pub vswr: Option<f64>,
}

impl PartialMetric {
    fn set(&mut self, kind: MetricKind, value: f64) {
        let slot = match kind {
            MetricKind::ForwardPower => &mut self.forward_power,
            MetricKind::ReflectedPower => &mut self.reflected_power,
            MetricKind::Frequency => &mut self.frequency,
            MetricKind::Temperature => &mut self.temperature,
            MetricKind::PowerOutput => &mut self.power_output,
            MetricKind::Vswr => &mut self.vswr,
        };
        *slot = Some(value);
    }

    pub fn get(&self, kind: MetricKind) -> Option<f64> {
        match kind {
            MetricKind::ForwardPower => self.forward_power,
            MetricKind::ReflectedPower => self.reflected_power,
            MetricKind::Frequency => self.frequency,
            MetricKind::Temperature => self.temperature,
            MetricKind::PowerOutput => self.power_output,
            MetricKind::Vswr => self.vswr,
        }
    }
}

/// Map a raw OID→value map onto canonical metric fields
pub fn normalize(raw: &BTreeMap<String, SnmpValue>) -> PartialMetric {
    let mut metric = PartialMetric::default();

    for (oid, value) in raw {
        let Some(kind) = MetricKind::from_oid(oid) else {
            trace!(oid = %oid, "ignoring unmapped OID");
            continue;
        };

        match value.as_f64() {
            Some(v) if v.is_finite() => metric.set(kind, v),
            _ => trace!(oid = %oid, kind = kind.name(), "skipping non-numeric value {value}"),
        }
    }

    if metric.vswr.is_none()
        && let (Some(forward), Some(reflected)) = (metric.forward_power, metric.reflected_power)
    {
        metric.vswr = derive_vswr(forward, reflected);
    }

    metric
}

/// VSWR from forward and reflected power
///
/// `Γ = sqrt(reflected / forward)`, `VSWR = (1 + Γ) / (1 - Γ)`. Returns `None`
/// whenever the ratio is undefined or the result would not be finite
/// (forward power ≤ 0, negative reflected power, total reflection).
pub fn derive_vswr(forward: f64, reflected: f64) -> Option<f64> {
    if !(forward > 0.0) || !(reflected >= 0.0) {
        return None;
    }

    let gamma = (reflected / forward).sqrt();
    if gamma >= 1.0 {
        return None;
    }

    let vswr = (1.0 + gamma) / (1.0 - gamma);
    vswr.is_finite().then_some(vswr)
}
