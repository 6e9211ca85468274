use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use shmrpc_codec::{Protocol, Serializer, Strategy};
use shmrpc_memory::{BufferPool, SharedMemory};
use shmrpc_transport::{self as raw, Component, SubscriptionId};

use crate::config::Config;
use crate::error::{PeerError, Result};
use crate::Message;

/// Per-transport settings every typed component is built with.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Binding {
    pub(crate) strategy: Strategy,
    pub(crate) min_blob_size: usize,
    pub(crate) default_timeout: Option<Duration>,
}

impl Binding {
    pub(crate) fn new(config: &Config) -> Self {
        Self {
            strategy: config.strategy(),
            min_blob_size: config.min_blob_size,
            default_timeout: config.default_request_timeout,
        }
    }

    /// Serializer writing into `output` and reading from `input`.
    pub(crate) fn serializer(&self, input: &Arc<SharedMemory>, output: &Arc<SharedMemory>) -> Serializer {
        Serializer::with_strategy(
            self.strategy,
            BufferPool::new(output.clone()),
            input.clone(),
            self.min_blob_size,
        )
    }
}

/// Typed calling end of a connection.
///
/// Owns the serializer of its connection. Buffers never escape
/// [`invoke`](Self::invoke): the request buffer is handed to the transport
/// and the response buffer is released once decoded.
pub struct Client<Req, Resp> {
    raw: raw::Client,
    serializer: Serializer,
    default_timeout: Option<Duration>,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req: Message, Resp: Message> Client<Req, Resp> {
    pub(crate) fn new(raw: raw::Client, binding: &Binding) -> Self {
        let serializer = binding.serializer(raw.input_memory(), raw.output_memory());
        Self {
            raw,
            serializer,
            default_timeout: binding.default_timeout,
            _marker: PhantomData,
        }
    }

    /// Call the server with the configured default timeout.
    pub async fn invoke(&self, request: &Req) -> Result<Resp> {
        self.call(request, self.default_timeout).await
    }

    /// Call the server, failing with [`PeerError::Timeout`] after `timeout`.
    ///
    /// `Duration::ZERO` selects the configured default timeout, which itself
    /// defaults to waiting indefinitely.
    pub async fn invoke_with_timeout(&self, request: &Req, timeout: Duration) -> Result<Resp> {
        let timeout = if timeout.is_zero() {
            self.default_timeout
        } else {
            Some(timeout)
        };
        self.call(request, timeout).await
    }

    async fn call(&self, request: &Req, timeout: Option<Duration>) -> Result<Resp> {
        if self.raw.is_closed() {
            return Err(PeerError::Closed);
        }
        let buffer = self.serializer.serialize(request)?;
        let response = self.raw.invoke(buffer, timeout).await?;
        Ok(self.serializer.deserialize(&response)?)
    }
}

impl<Req, Resp> Client<Req, Resp> {
    pub fn id(&self) -> u64 {
        self.raw.id()
    }

    pub fn raw(&self) -> &raw::Client {
        &self.raw
    }

    pub fn protocol(&self) -> Protocol {
        self.serializer.protocol()
    }

    pub fn is_marshaled(&self) -> bool {
        self.serializer.is_marshaled()
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    /// Wait until the connection is closed.
    pub async fn closed(&self) {
        self.raw.closed().await;
    }
}

impl<Req, Resp> Component for Client<Req, Resp> {
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

impl<Req, Resp> fmt::Debug for Client<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.raw.id())
            .field("strategy", &self.serializer.strategy())
            .field("closed", &self.raw.is_closed())
            .finish()
    }
}
