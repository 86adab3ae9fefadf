//! Gate evaluator
//!
//! Decides on every scheduled tick whether a device may be polled. Results
//! are never cached: transmitter and site activity can change between ticks.
//!
//! Missing directory records and lookup failures let the poll proceed, so a
//! metadata outage never starves telemetry.

use std::sync::Arc;

use tracing::{trace, warn};

use crate::device::Device;
use crate::directory::Directory;

#[derive(Clone)]
pub struct GateEvaluator {
    directory: Arc<dyn Directory>,
}

impl GateEvaluator {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    /// `device.enabled AND transmitter.isActive AND site.isActive`, failing open
    pub async fn should_poll(&self, device: &Device) -> bool {
        if !device.enabled {
            trace!(device = %device.id, "gated: device disabled");
            return false;
        }

        let transmitter = match self.directory.get_transmitter_by_id(&device.id).await {
            Ok(Some(transmitter)) => transmitter,
            Ok(None) => return true,
            Err(e) => {
                warn!(device = %device.id, "transmitter lookup failed, polling anyway: {e}");
                return true;
            }
        };

        if !transmitter.is_active {
            trace!(device = %device.id, "gated: transmitter inactive");
            return false;
        }

        let Some(site_id) = transmitter.site_id.as_deref() else {
            return true;
        };

        match self.directory.get_site_by_id(site_id).await {
            Ok(Some(site)) if !site.is_active => {
                trace!(device = %device.id, site = site_id, "gated: site inactive");
                false
            }
            Ok(_) => true,
            Err(e) => {
                warn!(device = %device.id, site = site_id, "site lookup failed, polling anyway: {e}");
                true
            }
        }
    }
}
