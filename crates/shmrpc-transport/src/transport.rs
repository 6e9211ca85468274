use std::sync::OnceLock;
use std::time::Duration;

use crate::acceptor::ServerAcceptor;
use crate::accessor::{ClientAccessor, ServersAccessor};
use crate::config::TransportConfig;
use crate::connector::ClientConnector;
use crate::error::Result;
use crate::server::HandlerFactory;

/// Factory for raw connectors, acceptors and accessors sharing one configuration.
///
/// Every factory method returns a started object. Use the constructors of
/// [`ServerAcceptor`], [`ClientAccessor`] and [`ServersAccessor`] directly to
/// attach listeners before starting.
#[derive(Debug, Default)]
pub struct Transport {
    config: TransportConfig,
    default_connector: OnceLock<ClientConnector>,
}

impl Transport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            default_connector: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn make_client_connector(&self) -> ClientConnector {
        ClientConnector::new(self.config.clone())
    }

    /// Connector used by [`connect_client`](Self::connect_client) when none is given.
    /// Created on first use.
    pub fn default_connector(&self) -> &ClientConnector {
        self.default_connector
            .get_or_init(|| self.make_client_connector())
    }

    /// Bind `name` and start accepting.
    pub fn make_server_acceptor(
        &self,
        name: impl Into<String>,
        factory: HandlerFactory,
    ) -> Result<ServerAcceptor> {
        let acceptor = ServerAcceptor::bind(name, factory)?;
        acceptor.start();
        Ok(acceptor)
    }

    /// Keep a client connected to `name`.
    ///
    /// Unless `async_connect` is set, waits for the first connection and
    /// fails with its error.
    pub async fn connect_client(
        &self,
        name: impl Into<String>,
        async_connect: bool,
        timeout: Option<Duration>,
        connector: Option<&ClientConnector>,
    ) -> Result<ClientAccessor> {
        let connector = connector
            .cloned()
            .unwrap_or_else(|| self.default_connector().clone());
        let accessor = ClientAccessor::new(name, connector, timeout);
        accessor.start(!async_connect).await?;
        Ok(accessor)
    }

    /// Bind `name` and track every connection accepted on it.
    pub fn accept_servers(
        &self,
        name: impl Into<String>,
        factory: HandlerFactory,
    ) -> Result<ServersAccessor> {
        let accessor = ServersAccessor::new(ServerAcceptor::bind(name, factory)?);
        accessor.start();
        Ok(accessor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Component;
    use crate::error::TransportError;
    use crate::test_support::{echo_factory, test_config, unique_name};

    #[test]
    fn default_connector_is_created_once() {
        let transport = Transport::new(test_config());
        let first = transport.default_connector() as *const ClientConnector;
        let second = transport.default_connector() as *const ClientConnector;

        assert_eq!(first, second);
        assert_eq!(transport.default_connector().config(), transport.config());
    }

    #[tokio::test]
    async fn sync_connect_waits_for_first_client() {
        let transport = Transport::new(test_config());
        let name = unique_name("sync-connect");
        let _servers = transport
            .accept_servers(&name, echo_factory(Duration::ZERO))
            .unwrap();

        let accessor = transport
            .connect_client(&name, false, None, None)
            .await
            .expect("client should connect");
        let client = accessor.client().expect("client should be available");
        assert!(!client.is_closed());
    }

    #[tokio::test]
    async fn async_connect_returns_before_connecting() {
        let transport = Transport::new(test_config());
        let accessor = transport
            .connect_client(unique_name("async-connect"), true, None, None)
            .await
            .expect("async connect should not fail");

        assert!(accessor.client().is_none());
    }

    #[tokio::test]
    async fn sync_connect_fails_without_acceptor() {
        let transport = Transport::new(test_config());
        let connector = transport.make_client_connector();
        let err = transport
            .connect_client(unique_name("nobody"), false, None, Some(&connector))
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::NotFound(_)));
    }

    #[tokio::test]
    async fn acceptor_is_started() {
        let transport = Transport::new(test_config());
        let acceptor = transport
            .make_server_acceptor(unique_name("started"), echo_factory(Duration::ZERO))
            .unwrap();
        assert!(acceptor.is_started());
    }
}
