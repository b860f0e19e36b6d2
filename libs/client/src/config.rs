use std::time::Duration;

use pbxlink_fabric::ConnectOptions;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const DEFAULT_URL: &str = "nats://127.0.0.1:4222";

/// Settings for [`Client::connect`](crate::Client::connect)
///
/// `servers` is a comma-separated list, for example
/// `"nats://localhost:1222,nats://localhost:1223"`. Set `root_cas` when the
/// servers use TLS, for example `servers = "tls://nats.demo.io:4443"` with
/// `root_cas = "./conf/certs/ca.pem"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub servers: String,
    pub root_cas: String,
    pub connect_timeout_ms: u64,
    pub name: Option<String>,
    /// Hand back a disconnected client instead of failing `connect`
    pub degraded: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            servers: DEFAULT_URL.to_string(),
            root_cas: String::new(),
            connect_timeout_ms: 2000,
            name: None,
            degraded: false,
        }
    }
}

impl ClientConfig {
    pub fn new(servers: impl Into<String>) -> Self {
        Self {
            servers: servers.into(),
            ..Self::default()
        }
    }

    pub fn root_cas(mut self, root_cas: impl Into<String>) -> Self {
        self.root_cas = root_cas.into();
        self
    }

    pub fn degraded(mut self, degraded: bool) -> Self {
        self.degraded = degraded;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn connect_options(&self) -> Result<ConnectOptions> {
        let mut options = ConnectOptions::parse(&self.servers, &self.root_cas)?
            .connect_timeout(self.connect_timeout());
        if let Some(name) = &self.name {
            options = options.name(name.clone());
        }
        Ok(options)
    }
}
