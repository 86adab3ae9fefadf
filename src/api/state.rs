//! API shared state

use std::time::Duration;

use crate::poller::Poller;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// The polling engine; clones share one engine
    pub poller: Poller,

    /// How often the live stream pushes a snapshot
    pub stream_interval: Duration,
}

impl ApiState {
    pub fn new(poller: Poller, stream_interval: Duration) -> Self {
        Self {
            poller,
            stream_interval,
        }
    }
}
