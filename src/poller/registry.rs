//! Device registry
//!
//! In-memory source of truth for what to poll. Read-mostly: every scheduler
//! tick reads its device afresh, while CRUD operations take the write lock
//! briefly.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{PollerError, PollerResult};
use crate::device::Device;

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, Device>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new device; ids must be unique
    pub async fn insert(&self, device: Device) -> PollerResult<()> {
        let mut devices = self.devices.write().await;
        if devices.contains_key(&device.id) {
            return Err(PollerError::InvalidConfig(format!(
                "device '{}' already exists",
                device.id
            )));
        }
        devices.insert(device.id.clone(), device);
        Ok(())
    }

    /// Replace an existing device, returning the previous config
    pub async fn replace(&self, device: Device) -> PollerResult<Device> {
        let mut devices = self.devices.write().await;
        match devices.get_mut(&device.id) {
            Some(slot) => Ok(std::mem::replace(slot, device)),
            None => Err(PollerError::NotFound(device.id)),
        }
    }

    pub async fn remove(&self, id: &str) -> Option<Device> {
        self.devices.write().await.remove(id)
    }

    pub async fn get(&self, id: &str) -> Option<Device> {
        self.devices.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.devices.read().await.contains_key(id)
    }

    /// All devices, ordered by id
    pub async fn list(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self.devices.read().await.values().cloned().collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        devices
    }

    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stamp the time of the last completed poll; no-op for removed devices
    pub async fn touch(&self, id: &str, at: DateTime<Utc>) {
        if let Some(device) = self.devices.write().await.get_mut(id) {
            device.last_poll_time = Some(at);
        }
    }
}
