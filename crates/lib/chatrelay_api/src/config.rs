//! API server configuration.

use std::time::Duration;

/// Default upper bound for one chat exchange, end to end.
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "0.0.0.0:3000").
    pub bind_addr: String,
    /// Time allowed for FAQ lookup, storage and the completion call together.
    pub exchange_timeout: Duration,
}

impl ApiConfig {
    pub fn new(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            exchange_timeout: DEFAULT_EXCHANGE_TIMEOUT,
        }
    }

    pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = timeout;
        self
    }
}
