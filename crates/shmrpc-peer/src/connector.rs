use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

use shmrpc_transport as raw;

use crate::client::{Binding, Client};
use crate::error::Result;
use crate::Message;

/// Opens typed client connections.
///
/// Every successful [`connect`](Self::connect) returns an independent
/// [`Client`] with its own serializer.
pub struct ClientConnector<Req, Resp> {
    raw: raw::ClientConnector,
    binding: Binding,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req: Message, Resp: Message> ClientConnector<Req, Resp> {
    pub(crate) fn new(raw: raw::ClientConnector, binding: Binding) -> Self {
        Self {
            raw,
            binding,
            _marker: PhantomData,
        }
    }

    /// Connect to the acceptor bound to `name`.
    ///
    /// `timeout` falls back to the transport's connect timeout.
    pub async fn connect(&self, name: &str, timeout: Option<Duration>) -> Result<Client<Req, Resp>> {
        let raw = self.raw.connect(name, timeout).await?;
        Ok(Client::new(raw, &self.binding))
    }
}

impl<Req, Resp> ClientConnector<Req, Resp> {
    pub fn raw(&self) -> &raw::ClientConnector {
        &self.raw
    }
}

impl<Req, Resp> Clone for ClientConnector<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            binding: self.binding,
            _marker: PhantomData,
        }
    }
}

impl<Req, Resp> fmt::Debug for ClientConnector<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnector")
            .field("raw", &self.raw)
            .field("binding", &self.binding)
            .finish()
    }
}
