use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use shmrpc_memory::{ConstBuffer, SharedMemory};
use tokio::sync::{mpsc, oneshot};

use crate::component::{Component, ComponentCore};
use crate::error::{Result, TransportError};
use crate::event::SubscriptionId;
use crate::server::Call;

/// The calling end of a connection.
///
/// Cloning yields another handle to the same connection. The connection
/// closes when [`close`](Component::close) is called, when the server end
/// closes it, or when the last handle is dropped.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    core: ComponentCore,
    calls: mpsc::UnboundedSender<Call>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.core.close();
    }
}

impl Client {
    pub(crate) fn new(core: ComponentCore, calls: mpsc::UnboundedSender<Call>) -> Self {
        Self {
            inner: Arc::new(ClientInner { core, calls }),
        }
    }

    /// Connection identifier, shared with the server end.
    pub fn id(&self) -> u64 {
        self.inner.core.id()
    }

    /// Returns true if both handles refer to the same connection handle.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Send `request` and wait for the response.
    ///
    /// `None` waits indefinitely. The request buffer is handed to the server
    /// and released once the server is done with it.
    pub async fn invoke(&self, request: ConstBuffer, timeout: Option<Duration>) -> Result<ConstBuffer> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let (reply, response) = oneshot::channel();
        self.inner
            .calls
            .send(Call { request, reply })
            .map_err(|_| TransportError::Closed)?;

        let token = self.inner.core.token().clone();
        let exchange = async move {
            tokio::select! {
                reply = response => match reply {
                    Ok(Ok(buffer)) => Ok(buffer),
                    Ok(Err(err)) => Err(err),
                    Err(_) => Err(TransportError::Closed),
                },
                _ = token.cancelled() => Err(TransportError::Closed),
            }
        };

        match timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| TransportError::Timeout(limit))?,
            None => exchange.await,
        }
    }

    /// Wait until the connection is closed.
    pub async fn closed(&self) {
        self.inner.core.token().cancelled().await;
    }
}

impl Component for Client {
    fn input_memory(&self) -> &Arc<SharedMemory> {
        self.inner.core.input_memory()
    }

    fn output_memory(&self) -> &Arc<SharedMemory> {
        self.inner.core.output_memory()
    }

    fn is_closed(&self) -> bool {
        self.inner.core.is_closed()
    }

    fn close(&self) {
        self.inner.core.close();
    }

    fn on_closed<F>(&self, listener: F) -> SubscriptionId
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.core.on_closed(listener)
    }

    fn unsubscribe_closed(&self, id: SubscriptionId) -> bool {
        self.inner.core.unsubscribe_closed(id)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id())
            .field("closed", &self.is_closed())
            .finish()
    }
}
