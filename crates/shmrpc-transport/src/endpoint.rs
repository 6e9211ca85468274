use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use shmrpc_memory::SharedMemory;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::server::Call;

/// A connection request delivered from a connector to an acceptor.
pub(crate) struct Handshake {
    pub(crate) id: u64,
    /// Client output, server input.
    pub(crate) request_memory: Arc<SharedMemory>,
    /// Server output, client input.
    pub(crate) response_memory: Arc<SharedMemory>,
    pub(crate) calls: mpsc::UnboundedReceiver<Call>,
    /// Answered with the connection token once the server end exists.
    pub(crate) accepted: oneshot::Sender<CancellationToken>,
}

pub(crate) type HandshakeSender = mpsc::UnboundedSender<Handshake>;

fn endpoints() -> &'static Mutex<HashMap<String, HandshakeSender>> {
    static ENDPOINTS: OnceLock<Mutex<HashMap<String, HandshakeSender>>> = OnceLock::new();
    ENDPOINTS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Register `name`, replacing a stale entry whose acceptor is gone.
pub(crate) fn bind(name: &str) -> Result<(HandshakeSender, mpsc::UnboundedReceiver<Handshake>)> {
    let mut endpoints = endpoints().lock();
    if endpoints
        .get(name)
        .is_some_and(|sender| !sender.is_closed())
    {
        return Err(TransportError::AddressInUse {
            name: name.to_string(),
        });
    }

    let (sender, receiver) = mpsc::unbounded_channel();
    endpoints.insert(name.to_string(), sender.clone());
    debug!(endpoint = name, "bound endpoint");
    Ok((sender, receiver))
}

/// Remove `name` if it is still registered to `sender`.
pub(crate) fn unbind(name: &str, sender: &HandshakeSender) {
    let mut endpoints = endpoints().lock();
    if endpoints
        .get(name)
        .is_some_and(|existing| existing.same_channel(sender))
    {
        endpoints.remove(name);
        debug!(endpoint = name, "unbound endpoint");
    }
}

pub(crate) fn lookup(name: &str) -> Result<HandshakeSender> {
    endpoints()
        .lock()
        .get(name)
        .filter(|sender| !sender.is_closed())
        .cloned()
        .ok_or_else(|| TransportError::NotFound(name.to_string()))
}
