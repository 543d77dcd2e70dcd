// ── Runtime controller configuration ──
//
// Everything a controller needs to reach one server and pace its
// reconnects. Never touches disk: the CLI (or any other host) resolves
// profiles and credentials, builds a `ControllerConfig`, and hands it in.

use std::time::Duration;

use habflow_api::{ConnectionConfig, StreamTuning, TransportConfig};

/// Name used when a host does not give its controller one.
pub const DEFAULT_CONTROLLER_NAME: &str = "default";

/// Configuration for a single controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Registry key nodes use to find this controller.
    pub name: String,
    /// Server address, credentials and version.
    pub connection: ConnectionConfig,
    /// TLS and request timeout.
    pub transport: TransportConfig,
    /// Startup jitter and reconnect pacing of the event stream.
    pub stream: StreamTuning,
    /// Delay between initial-state sync attempts.
    pub sync_retry: Duration,
}

impl ControllerConfig {
    /// Config for `connection` with default timing.
    pub fn new(connection: ConnectionConfig) -> Self {
        Self {
            name: DEFAULT_CONTROLLER_NAME.to_owned(),
            connection,
            transport: TransportConfig::default(),
            stream: StreamTuning::default(),
            sync_retry: Duration::from_secs(10),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::new(ConnectionConfig::new("localhost"))
    }
}
