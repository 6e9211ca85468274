use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::acceptor::ServerAcceptor;
use crate::client::Client;
use crate::component::Component;
use crate::connector::ClientConnector;
use crate::error::{Result, TransportError};
use crate::event::{Event, SubscriptionId};
use crate::server::{ErrorEvent, Server};

/// Keeps one client connected to a named endpoint.
///
/// After every disconnect the accessor waits `reconnect_delay` and connects
/// again, until it is dropped. Failed attempts are reported on the error
/// event. The accessor is created unstarted so listeners can be attached
/// before the first connection.
pub struct ClientAccessor {
    shared: Arc<ClientAccessorShared>,
    started: AtomicBool,
}

struct ClientAccessorShared {
    name: String,
    connector: ClientConnector,
    timeout: Option<Duration>,
    token: CancellationToken,
    current: Mutex<Option<Client>>,
    connected: Event<Client>,
    disconnected: Event<Client>,
    errors: Event<ErrorEvent>,
}

impl ClientAccessor {
    pub fn new(name: impl Into<String>, connector: ClientConnector, timeout: Option<Duration>) -> Self {
        Self {
            shared: Arc::new(ClientAccessorShared {
                name: name.into(),
                connector,
                timeout,
                token: CancellationToken::new(),
                current: Mutex::new(None),
                connected: Event::new(),
                disconnected: Event::new(),
                errors: Event::new(),
            }),
            started: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Start the connect loop.
    ///
    /// With `wait` set, resolves once the first connection attempt finishes
    /// and returns its error if it failed; otherwise returns immediately.
    /// Must be called from within a tokio runtime.
    pub async fn start(&self, wait: bool) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let (first_tx, first_rx) = oneshot::channel();
        let first = wait.then_some(first_tx);
        tokio::spawn(connect_loop(self.shared.clone(), first));

        if wait {
            first_rx.await.map_err(|_| TransportError::Shutdown)?
        } else {
            Ok(())
        }
    }

    /// The currently connected client, if any.
    pub fn client(&self) -> Option<Client> {
        self.shared.current.lock().clone()
    }

    pub fn on_connected<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Client) + Send + Sync + 'static,
    {
        self.shared.connected.subscribe(listener)
    }

    pub fn unsubscribe_connected(&self, id: SubscriptionId) -> bool {
        self.shared.connected.unsubscribe(id)
    }

    pub fn on_disconnected<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Client) + Send + Sync + 'static,
    {
        self.shared.disconnected.subscribe(listener)
    }

    pub fn unsubscribe_disconnected(&self, id: SubscriptionId) -> bool {
        self.shared.disconnected.unsubscribe(id)
    }

    pub fn on_error<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ErrorEvent) + Send + Sync + 'static,
    {
        self.shared.errors.subscribe(listener)
    }

    pub fn unsubscribe_error(&self, id: SubscriptionId) -> bool {
        self.shared.errors.unsubscribe(id)
    }
}

impl Drop for ClientAccessor {
    fn drop(&mut self) {
        self.shared.token.cancel();
        let current = self.shared.current.lock().take();
        if let Some(client) = current {
            client.close();
        }
    }
}

impl std::fmt::Debug for ClientAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientAccessor")
            .field("name", &self.shared.name)
            .field("client", &self.client())
            .finish()
    }
}

async fn connect_loop(
    shared: Arc<ClientAccessorShared>,
    mut first: Option<oneshot::Sender<Result<()>>>,
) {
    let delay = shared.connector.config().reconnect_delay;
    loop {
        let attempt = tokio::select! {
            _ = shared.token.cancelled() => break,
            attempt = shared.connector.connect(&shared.name, shared.timeout) => attempt,
        };

        match attempt {
            Ok(client) => {
                *shared.current.lock() = Some(client.clone());
                shared.connected.emit(&client);
                if let Some(first) = first.take() {
                    let _ = first.send(Ok(()));
                }

                tokio::select! {
                    _ = shared.token.cancelled() => break,
                    _ = client.closed() => {}
                }

                let previous = shared.current.lock().take();
                if let Some(previous) = previous {
                    info!(endpoint = %shared.name, connection = previous.id(), "client disconnected");
                    shared.disconnected.emit(&previous);
                }
            }
            Err(err) => {
                warn!(endpoint = %shared.name, error = %err, "connect attempt failed");
                match first.take() {
                    Some(first) => {
                        let _ = first.send(Err(err));
                    }
                    None => shared.errors.emit(&Arc::new(err)),
                }
            }
        }

        tokio::select! {
            _ = shared.token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
        debug!(endpoint = %shared.name, "reconnecting");
    }
    debug!(endpoint = %shared.name, "connect loop finished");
}

/// Tracks the servers currently connected through one acceptor.
///
/// [`servers`](Self::servers) returns a snapshot. Connected and
/// disconnected events carry the server of each transition.
pub struct ServersAccessor {
    acceptor: ServerAcceptor,
    shared: Arc<ServersAccessorShared>,
}

#[derive(Default)]
struct ServersAccessorShared {
    servers: Mutex<Vec<Server>>,
    connected: Event<Server>,
    disconnected: Event<Server>,
    errors: Event<ErrorEvent>,
}

impl ServersAccessor {
    /// Track the connections of `acceptor`. Call [`start`](Self::start) to begin accepting.
    pub fn new(acceptor: ServerAcceptor) -> Self {
        let shared = Arc::new(ServersAccessorShared::default());

        let weak = Arc::downgrade(&shared);
        acceptor.on_accepted(move |server| {
            if let Some(shared) = weak.upgrade() {
                track(&shared, Arc::downgrade(&shared), server);
            }
        });

        let weak = Arc::downgrade(&shared);
        acceptor.on_error(move |err| {
            if let Some(shared) = weak.upgrade() {
                shared.errors.emit(err);
            }
        });

        Self { acceptor, shared }
    }

    pub fn start(&self) {
        self.acceptor.start();
    }

    pub fn name(&self) -> &str {
        self.acceptor.name()
    }

    /// The servers connected right now.
    pub fn servers(&self) -> Vec<Server> {
        self.shared.servers.lock().clone()
    }

    pub fn on_connected<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Server) + Send + Sync + 'static,
    {
        self.shared.connected.subscribe(listener)
    }

    pub fn unsubscribe_connected(&self, id: SubscriptionId) -> bool {
        self.shared.connected.unsubscribe(id)
    }

    pub fn on_disconnected<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Server) + Send + Sync + 'static,
    {
        self.shared.disconnected.subscribe(listener)
    }

    pub fn unsubscribe_disconnected(&self, id: SubscriptionId) -> bool {
        self.shared.disconnected.unsubscribe(id)
    }

    pub fn on_error<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ErrorEvent) + Send + Sync + 'static,
    {
        self.shared.errors.subscribe(listener)
    }

    pub fn unsubscribe_error(&self, id: SubscriptionId) -> bool {
        self.shared.errors.unsubscribe(id)
    }
}

impl std::fmt::Debug for ServersAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServersAccessor")
            .field("acceptor", &self.acceptor)
            .field("servers", &self.shared.servers.lock().len())
            .finish()
    }
}

fn track(shared: &ServersAccessorShared, weak: Weak<ServersAccessorShared>, server: &Server) {
    shared.servers.lock().push(server.clone());
    shared.connected.emit(server);

    let id = server.id();
    server.on_closed(move || {
        let Some(shared) = weak.upgrade() else {
            return;
        };
        let removed = {
            let mut servers = shared.servers.lock();
            servers
                .iter()
                .position(|server| server.id() == id)
                .map(|index| servers.remove(index))
        };
        if let Some(server) = removed {
            shared.disconnected.emit(&server);
        }
    });
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::test_support::{echo_factory, failing_factory, next, test_config, unique_name};

    fn accessor(name: &str) -> ClientAccessor {
        ClientAccessor::new(name, ClientConnector::new(test_config()), None)
    }

    #[tokio::test]
    async fn waiting_start_reports_first_failure() {
        let client = accessor(&unique_name("absent"));
        let err = client.start(true).await.unwrap_err();

        assert!(matches!(err, TransportError::NotFound(_)));
        assert!(client.client().is_none());
    }

    #[tokio::test]
    async fn async_start_reports_failures_as_events() {
        let name = unique_name("absent-async");
        let client = accessor(&name);
        let (err_tx, mut err_rx) = mpsc::unbounded_channel();
        client.on_error(move |err| {
            let _ = err_tx.send(err.to_string());
        });

        client.start(false).await.expect("async start should not fail");
        let message = next(&mut err_rx).await;
        assert!(message.contains(&name), "unexpected error: {message}");
    }

    #[tokio::test]
    async fn disconnect_reports_the_connected_client() {
        let name = unique_name("identity");
        let acceptor = ServerAcceptor::bind(&name, echo_factory(Duration::ZERO)).unwrap();
        acceptor.start();

        let client = accessor(&name);
        let (connected_tx, mut connected_rx) = mpsc::unbounded_channel();
        client.on_connected(move |client| {
            let _ = connected_tx.send(client.clone());
        });
        let (disconnected_tx, mut disconnected_rx) = mpsc::unbounded_channel();
        client.on_disconnected(move |client| {
            let _ = disconnected_tx.send(client.clone());
        });
        client.start(true).await.expect("first connection should succeed");

        let connected = next(&mut connected_rx).await;
        let current = client.client().expect("client should be connected");
        assert!(current.ptr_eq(&connected));

        current.close();
        let disconnected = next(&mut disconnected_rx).await;
        assert!(disconnected.ptr_eq(&connected));
    }

    #[tokio::test]
    async fn reconnects_after_disconnect() {
        let name = unique_name("reconnect");
        let acceptor = ServerAcceptor::bind(&name, echo_factory(Duration::ZERO)).unwrap();
        acceptor.start();

        let client = accessor(&name);
        let (connected_tx, mut connected_rx) = mpsc::unbounded_channel();
        client.on_connected(move |client| {
            let _ = connected_tx.send(client.id());
        });
        client.start(true).await.unwrap();

        let first = next(&mut connected_rx).await;
        client.client().expect("connected").close();
        let second = next(&mut connected_rx).await;

        assert_ne!(first, second);
        assert_eq!(client.client().map(|client| client.id()), Some(second));
    }

    #[tokio::test]
    async fn dropping_accessor_closes_client() {
        let name = unique_name("accessor-drop");
        let acceptor = ServerAcceptor::bind(&name, echo_factory(Duration::ZERO)).unwrap();
        acceptor.start();

        let client = accessor(&name);
        client.start(true).await.unwrap();
        let current = client.client().expect("connected");
        drop(client);

        assert!(current.is_closed());
    }

    #[tokio::test]
    async fn servers_accessor_tracks_connections() {
        let name = unique_name("servers");
        let servers = ServersAccessor::new(
            ServerAcceptor::bind(&name, echo_factory(Duration::ZERO)).unwrap(),
        );
        let (connected_tx, mut connected_rx) = mpsc::unbounded_channel();
        servers.on_connected(move |server| {
            let _ = connected_tx.send(server.id());
        });
        let (disconnected_tx, mut disconnected_rx) = mpsc::unbounded_channel();
        servers.on_disconnected(move |server| {
            let _ = disconnected_tx.send(server.id());
        });
        servers.start();

        let connector = ClientConnector::new(test_config());
        let first = connector.connect(&name, None).await.unwrap();
        let second = connector.connect(&name, None).await.unwrap();
        assert_eq!(next(&mut connected_rx).await, first.id());
        assert_eq!(next(&mut connected_rx).await, second.id());
        assert_eq!(servers.servers().len(), 2);

        first.close();
        assert_eq!(next(&mut disconnected_rx).await, first.id());
        let remaining: Vec<u64> = servers.servers().iter().map(Server::id).collect();
        assert_eq!(remaining, vec![second.id()]);
    }

    #[tokio::test]
    async fn servers_accessor_forwards_handler_errors() {
        let name = unique_name("servers-errors");
        let servers = ServersAccessor::new(ServerAcceptor::bind(&name, failing_factory("nope")).unwrap());
        let (err_tx, mut err_rx) = mpsc::unbounded_channel();
        servers.on_error(move |err| {
            let _ = err_tx.send(err.to_string());
        });
        servers.start();

        let client = ClientConnector::new(test_config())
            .connect(&name, None)
            .await
            .unwrap();
        let request = shmrpc_memory::BufferPool::new(client.output_memory().clone())
            .make_buffer(b"x")
            .unwrap();
        assert!(client.invoke(request, None).await.is_err());

        assert_eq!(next(&mut err_rx).await, "handler failed: nope");
    }
}
