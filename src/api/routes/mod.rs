//! Route handlers, one module per resource

pub mod devices;
pub mod health;
pub mod metrics;
pub mod poller;
pub mod results;
