use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

use shmrpc_transport as raw;

use crate::accessor::{ClientAccessor, ServersAccessor};
use crate::acceptor::ServerAcceptor;
use crate::client::Binding;
use crate::config::Config;
use crate::connector::ClientConnector;
use crate::error::Result;
use crate::handler::{adapt, HandlerFactory};
use crate::Message;

/// Typed factory for connectors, acceptors and accessors.
///
/// The configuration is validated once at construction and the serializer
/// strategy selected from it is shared by every component the transport
/// creates. Every returned object is already started.
pub struct Transport<Req, Resp> {
    config: Config,
    binding: Binding,
    raw: raw::Transport,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req: Message, Resp: Message> Transport<Req, Resp> {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            binding: Binding::new(&config),
            raw: raw::Transport::new(config.transport.clone()),
            config,
            _marker: PhantomData,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn raw(&self) -> &raw::Transport {
        &self.raw
    }

    pub fn make_client_connector(&self) -> ClientConnector<Req, Resp> {
        ClientConnector::new(self.raw.make_client_connector(), self.binding)
    }

    /// Bind `name` and serve each accepted connection with a handler from `factory`.
    pub fn make_server_acceptor(
        &self,
        name: impl Into<String>,
        factory: HandlerFactory<Req, Resp>,
    ) -> Result<ServerAcceptor> {
        let raw = raw::ServerAcceptor::bind(name, self.adapt(factory))?;
        Ok(ServerAcceptor::new(raw))
    }

    /// Keep a client connected to `name`.
    ///
    /// Unless `async_connect` is set, waits for the first connection and
    /// fails with its error. Without a `connector` the transport's default
    /// connector is used.
    pub async fn connect_client(
        &self,
        name: impl Into<String>,
        async_connect: bool,
        timeout: Option<Duration>,
        connector: Option<&ClientConnector<Req, Resp>>,
    ) -> Result<ClientAccessor<Req, Resp>> {
        let connector = match connector {
            Some(connector) => connector.raw().clone(),
            None => self.raw.default_connector().clone(),
        };
        let accessor = ClientAccessor::new(
            raw::ClientAccessor::new(name, connector, timeout),
            self.binding,
        );
        accessor.start(!async_connect).await?;
        Ok(accessor)
    }

    /// Bind `name` and track every connection accepted on it.
    pub fn accept_servers(
        &self,
        name: impl Into<String>,
        factory: HandlerFactory<Req, Resp>,
    ) -> Result<ServersAccessor> {
        let acceptor = raw::ServerAcceptor::bind(name, self.adapt(factory))?;
        Ok(ServersAccessor::new(raw::ServersAccessor::new(acceptor)))
    }

    fn adapt(&self, factory: HandlerFactory<Req, Resp>) -> raw::HandlerFactory {
        adapt(self.binding.strategy, self.binding.min_blob_size, factory)
    }
}

impl<Req, Resp> fmt::Debug for Transport<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("config", &self.config)
            .finish()
    }
}
