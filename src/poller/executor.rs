//! Poll executor
//!
//! Performs exactly one GET per poll for the device's whole OID list. Retries
//! are the session's business; there is no outer retry loop here.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use super::gate::GateEvaluator;
use super::session::SessionManager;
use super::{PollResult, PollerResult};
use crate::device::{Device, NewDevice};
use crate::oid::{canonical, resolve_name};
use crate::snmp::{SnmpError, SnmpValue, Varbind};

/// What happened when the executor was asked to poll
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The gate closed between scheduling and execution
    Skipped,

    /// A GET was issued; the result may still be a failure
    Completed(PollResult),
}

impl PollOutcome {
    pub fn into_result(self) -> Option<PollResult> {
        match self {
            PollOutcome::Skipped => None,
            PollOutcome::Completed(result) => Some(result),
        }
    }
}

/// Response of a one-shot connectivity test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<String, SnmpValue>>,

    /// Symbolic names for the returned OIDs the resolver knows
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub names: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct PollExecutor {
    gate: GateEvaluator,
    sessions: Arc<SessionManager>,
}

impl PollExecutor {
    pub fn new(gate: GateEvaluator, sessions: Arc<SessionManager>) -> Self {
        Self { gate, sessions }
    }

    /// Poll a registered device through its managed session
    ///
    /// The gate is checked again right before the network call.
    #[instrument(skip_all, fields(device = %device.id))]
    pub async fn poll(&self, device: &Device) -> PollOutcome {
        if !self.gate.should_poll(device).await {
            debug!("gate closed before GET, skipping");
            return PollOutcome::Skipped;
        }

        let session = match self.sessions.session_for(device).await {
            Ok(session) => session,
            Err(e) => return PollOutcome::Completed(PollResult::failure(&device.id, e.to_string())),
        };

        let result = match session.get(&device.oids).await {
            Ok(varbinds) => match collect_values(&device.oids, varbinds) {
                Ok(data) => {
                    trace!("received {} values", data.len());
                    PollResult::success(&device.id, data)
                }
                Err(e) => PollResult::failure(&device.id, e.to_string()),
            },
            Err(e) => PollResult::failure(&device.id, e.to_string()),
        };

        if let Some(error) = &result.error {
            debug!("poll failed: {error}");
        }

        PollOutcome::Completed(result)
    }

    /// One GET against an unregistered configuration
    ///
    /// Uses a transient session that is closed before returning. Invalid
    /// configurations are rejected before any network traffic.
    #[instrument(skip_all, fields(host = %config.host))]
    pub async fn test_device(&self, config: NewDevice) -> PollerResult<TestResult> {
        let device = config.into_device()?;

        let session = match self.sessions.open_transient(&device.session_params()).await {
            Ok(session) => session,
            Err(e) => return Ok(TestResult::failed(e)),
        };

        let response = session.get(&device.oids).await;
        session.close().await;

        let outcome = match response.and_then(|varbinds| collect_values(&device.oids, varbinds)) {
            Ok(data) => {
                let names = data
                    .keys()
                    .filter_map(|oid| resolve_name(oid).map(|name| (oid.clone(), name)))
                    .collect();
                TestResult {
                    success: true,
                    data: Some(data),
                    names,
                    error: None,
                }
            }
            Err(e) => TestResult::failed(e),
        };

        debug!(success = outcome.success, "device test finished");
        Ok(outcome)
    }
}

impl TestResult {
    fn failed(error: SnmpError) -> Self {
        Self {
            success: false,
            data: None,
            names: BTreeMap::new(),
            error: Some(error.to_string()),
        }
    }
}

/// Map returned varbinds back onto the requested OIDs
///
/// Matching is by canonical OID first; a varbind whose OID matches nothing is
/// assigned to the requested OID at the same position, if that slot is still
/// free. Keys always use the requested spelling, so the result contains
/// exactly the requested OIDs the agent answered. Exception varbinds fail the
/// whole poll.
pub fn collect_values(
    requested: &[String],
    varbinds: Vec<Varbind>,
) -> Result<BTreeMap<String, SnmpValue>, SnmpError> {
    let index: HashMap<String, &String> = requested
        .iter()
        .map(|oid| (canonical(oid), oid))
        .collect();

    let mut data = BTreeMap::new();

    for (position, varbind) in varbinds.into_iter().enumerate() {
        let key = match index.get(&canonical(&varbind.oid)) {
            Some(oid) => (*oid).clone(),
            None => match requested.get(position) {
                Some(oid) if !data.contains_key(oid) => oid.clone(),
                _ => {
                    trace!(oid = %varbind.oid, "dropping unrequested varbind");
                    continue;
                }
            },
        };

        if varbind.value.is_exception() {
            return Err(SnmpError::Agent(format!("{} for OID {key}", varbind.value)));
        }

        data.insert(key, varbind.value);
    }

    Ok(data)
}
