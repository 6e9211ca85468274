use std::time::Duration;

use serde::{Deserialize, Serialize};
use shmrpc_codec::{Protocol, Strategy};
use shmrpc_transport::TransportConfig;

use crate::error::{PeerError, Result};

/// Configuration of a typed [`Transport`](crate::Transport).
///
/// Fixed for the lifetime of the transport built from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Wire protocol of outgoing payloads.
    pub protocol: Protocol,
    /// Prefix payloads with a protocol header so readers can auto-detect it.
    pub marshal: bool,
    /// Pooled byte ranges at least this long are referenced instead of copied.
    pub min_blob_size: usize,
    /// Timeout of calls that do not pass one. `None` waits indefinitely.
    #[serde(
        rename = "default_request_timeout_ms",
        with = "shmrpc_transport::config::millis::option"
    )]
    pub default_request_timeout: Option<Duration>,
    #[serde(flatten)]
    pub transport: TransportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            protocol: Protocol::default(),
            marshal: true,
            min_blob_size: 0,
            default_request_timeout: None,
            transport: TransportConfig::default(),
        }
    }
}

impl Config {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| PeerError::Configuration(e.to_string()))
    }

    /// Check the limits a transport relies on.
    pub fn validate(&self) -> Result<()> {
        if self.transport.memory_size == 0 {
            return Err(PeerError::Configuration(
                "memory_size must be greater than zero".to_string(),
            ));
        }
        if self.min_blob_size > self.transport.memory_size {
            return Err(PeerError::Configuration(format!(
                "min_blob_size {} exceeds memory_size {}",
                self.min_blob_size, self.transport.memory_size
            )));
        }
        Ok(())
    }

    /// The strategy selected by `protocol` and `marshal`.
    pub fn strategy(&self) -> Strategy {
        Strategy::create(self.protocol, self.marshal)
    }
}
