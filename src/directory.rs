//! Transmitter and site metadata
//!
//! The directory is owned by the surrounding dashboard. The poller only reads
//! two booleans from it when gating a poll, so the seam is a small trait.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Transmitter record as seen by the poller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransmitterRecord {
    pub id: String,
    pub is_active: bool,
    #[serde(default)]
    pub site_id: Option<String>,
}

/// Site record as seen by the poller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteRecord {
    pub id: String,
    pub is_active: bool,
}

/// Lookup failure in the metadata store
#[derive(Debug, Clone)]
pub struct DirectoryError(pub String);

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "directory lookup failed: {}", self.0)
    }
}

impl std::error::Error for DirectoryError {}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn get_transmitter_by_id(
        &self,
        id: &str,
    ) -> Result<Option<TransmitterRecord>, DirectoryError>;

    async fn get_site_by_id(&self, id: &str) -> Result<Option<SiteRecord>, DirectoryError>;
}

/// In-memory directory, seeded from the hub configuration
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    transmitters: RwLock<HashMap<String, TransmitterRecord>>,
    sites: RwLock<HashMap<String, SiteRecord>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(transmitters: Vec<TransmitterRecord>, sites: Vec<SiteRecord>) -> Self {
        Self {
            transmitters: RwLock::new(transmitters.into_iter().map(|t| (t.id.clone(), t)).collect()),
            sites: RwLock::new(sites.into_iter().map(|s| (s.id.clone(), s)).collect()),
        }
    }

    pub async fn upsert_transmitter(&self, record: TransmitterRecord) {
        self.transmitters
            .write()
            .await
            .insert(record.id.clone(), record);
    }

    pub async fn upsert_site(&self, record: SiteRecord) {
        self.sites.write().await.insert(record.id.clone(), record);
    }

    pub async fn remove_transmitter(&self, id: &str) {
        self.transmitters.write().await.remove(id);
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn get_transmitter_by_id(
        &self,
        id: &str,
    ) -> Result<Option<TransmitterRecord>, DirectoryError> {
        Ok(self.transmitters.read().await.get(id).cloned())
    }

    async fn get_site_by_id(&self, id: &str) -> Result<Option<SiteRecord>, DirectoryError> {
        Ok(self.sites.read().await.get(id).cloned())
    }
}
