pub mod api;
pub mod config;
pub mod device;
pub mod directory;
pub mod oid;
pub mod poller;
pub mod snmp;
pub mod store;

pub use device::{Device, DeviceUpdate, NewDevice, SnmpVersion};
pub use poller::{PollResult, Poller, PollerError, PollerResult};
pub use store::{MetricStatus, MetricsStore, TransmitterMetric};
