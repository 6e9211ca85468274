use std::fmt;
use std::sync::Arc;

use shmrpc_memory::SharedMemory;
use shmrpc_transport::{self as raw, Component, ErrorEvent, SubscriptionId};

/// Typed view of the serving end of a connection.
///
/// Requests are decoded by the serializer the handler adapter attached to
/// the connection, so the wrapper itself holds only the raw handle.
/// Wrappers are cheap; two wrappers of the same connection compare equal
/// with [`same_connection`](Self::same_connection) but are distinct values.
#[derive(Clone)]
pub struct Server {
    raw: raw::Server,
}

impl Server {
    pub(crate) fn new(raw: raw::Server) -> Self {
        Self { raw }
    }

    pub fn id(&self) -> u64 {
        self.raw.id()
    }

    pub fn raw(&self) -> &raw::Server {
        &self.raw
    }

    /// Returns true if both wrappers serve the same connection.
    pub fn same_connection(&self, other: &Self) -> bool {
        self.raw.ptr_eq(&other.raw)
    }

    /// Called with every failed call on this connection, including requests
    /// that could not be decoded.
    pub fn on_error<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ErrorEvent) + Send + Sync + 'static,
    {
        self.raw.on_error(listener)
    }

    pub fn unsubscribe_error(&self, id: SubscriptionId) -> bool {
        self.raw.unsubscribe_error(id)
    }
}

impl Component for Server {
    fn input_memory(&self) -> &Arc<SharedMemory> {
        self.raw.input_memory()
    }

    fn output_memory(&self) -> &Arc<SharedMemory> {
        self.raw.output_memory()
    }

    fn is_closed(&self) -> bool {
        self.raw.is_closed()
    }

    fn close(&self) {
        self.raw.close();
    }

    fn on_closed<F>(&self, listener: F) -> SubscriptionId
    where
        F: FnOnce() + Send + 'static,
    {
        self.raw.on_closed(listener)
    }

    fn unsubscribe_closed(&self, id: SubscriptionId) -> bool {
        self.raw.unsubscribe_closed(id)
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Server").field(&self.raw).finish()
    }
}
