//! Shared API response types
//!
//! Field names are camelCase to match the dashboard.

use serde::{Deserialize, Serialize};

use crate::device::Device;
use crate::poller::PollResult;
use crate::store::TransmitterMetric;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the metrics store is failing
    pub status: String,
    pub timestamp: String,
    pub running: bool,
    pub device_count: usize,
    /// Absent when the poller has no store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_healthy: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicesResponse {
    pub devices: Vec<Device>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsResponse {
    pub results: Vec<PollResult>,
    pub count: usize,
}

/// Reply to a manual poll; `result` is absent when the device was gated
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollNowResponse {
    pub polled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<PollResult>,
}

/// Frame pushed over the live stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSnapshot {
    pub results: Vec<PollResult>,
    pub latest_metrics: Vec<TransmitterMetric>,
}
