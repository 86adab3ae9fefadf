use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use tracing::trace;

use crate::device::NewDevice;
use crate::directory::{SiteRecord, TransmitterRecord};
use crate::poller::recorder::DEFAULT_CAPACITY;

/// Storage backend configuration
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./metrics.db")
}

/// HTTP surface settings
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct ApiSection {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Bearer token required on every route except health
    pub auth_token: Option<String>,

    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            auth_token: None,
            enable_cors: true,
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct PollerSection {
    /// Size of the in-memory result buffer
    #[serde(default = "default_result_capacity")]
    pub result_capacity: usize,

    /// Push interval of the live stream
    #[serde(default = "default_stream_interval")]
    pub stream_interval_secs: u64,

    /// Start polling as soon as the hub is up
    #[serde(default = "default_true")]
    pub autostart: bool,
}

impl Default for PollerSection {
    fn default() -> Self {
        Self {
            result_capacity: default_result_capacity(),
            stream_interval_secs: default_stream_interval(),
            autostart: true,
        }
    }
}

fn default_result_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_stream_interval() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiSection,

    /// Storage configuration (defaults to SQLite)
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub poller: PollerSection,

    /// Devices registered at startup
    #[serde(default)]
    pub devices: Vec<NewDevice>,

    /// Directory seed: transmitter records
    #[serde(default)]
    pub transmitters: Vec<TransmitterRecord>,

    /// Directory seed: site records
    #[serde(default)]
    pub sites: Vec<SiteRecord>,
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("cannot read config file '{path}'"))?;
    parse_config(&file_content)
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    serde_json::from_str(content)
        .context("Invalid configuration file provided!")
        .inspect(|config: &Config| trace!("loaded config: {config:?}"))
}
