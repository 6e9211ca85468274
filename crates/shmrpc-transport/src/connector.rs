use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use shmrpc_memory::SharedMemory;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::client::Client;
use crate::component::ComponentCore;
use crate::config::TransportConfig;
use crate::endpoint::{self, Handshake};
use crate::error::{Result, TransportError};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opens client connections to named endpoints.
///
/// Each successful [`connect`](Self::connect) creates a fresh pair of
/// segments (`<name>/<id>/request`, `<name>/<id>/response`) and returns an
/// independent [`Client`].
#[derive(Debug, Clone)]
pub struct ClientConnector {
    config: Arc<TransportConfig>,
}

impl ClientConnector {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Connect to the acceptor bound to `name`.
    ///
    /// `timeout` falls back to the configured connect timeout; when both are
    /// `None` the call waits until the acceptor answers.
    pub async fn connect(&self, name: &str, timeout: Option<Duration>) -> Result<Client> {
        let timeout = timeout.or(self.config.connect_timeout);
        let handshake = self.handshake(name);
        match timeout {
            Some(limit) => tokio::time::timeout(limit, handshake)
                .await
                .map_err(|_| TransportError::Timeout(limit))?,
            None => handshake.await,
        }
    }

    async fn handshake(&self, name: &str) -> Result<Client> {
        let endpoint = endpoint::lookup(name)?;

        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let request_memory =
            SharedMemory::create(format!("{name}/{id}/request"), self.config.memory_size)?;
        let response_memory =
            SharedMemory::create(format!("{name}/{id}/response"), self.config.memory_size)?;

        let (calls_tx, calls_rx) = mpsc::unbounded_channel();
        let (accepted_tx, accepted_rx) = oneshot::channel();
        endpoint
            .send(Handshake {
                id,
                request_memory: request_memory.clone(),
                response_memory: response_memory.clone(),
                calls: calls_rx,
                accepted: accepted_tx,
            })
            .map_err(|_| TransportError::NotFound(name.to_string()))?;
        debug!(endpoint = name, connection = id, "sent handshake");

        let token = accepted_rx.await.map_err(|_| TransportError::Connect {
            name: name.to_string(),
            reason: "acceptor closed before accepting".to_string(),
        })?;

        info!(endpoint = name, connection = id, "connected");
        let core = ComponentCore::new(id, response_memory, request_memory, token);
        Ok(Client::new(core, calls_tx))
    }
}

impl Default for ClientConnector {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}
