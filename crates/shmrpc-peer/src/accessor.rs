use std::fmt;
use std::sync::{Arc, Weak};

use arc_swap::ArcSwapOption;
use shmrpc_transport::{self as raw, Component, ErrorEvent, Event, SubscriptionId};

use crate::client::{Binding, Client};
use crate::error::Result;
use crate::server::Server;
use crate::Message;

/// Keeps one typed client connected to a named endpoint.
///
/// The current client lives in a lock-free slot. Each raw connection is
/// wrapped once: the [`Client`] delivered on the connected event is the one
/// [`client`](Self::client) returns, and the same `Arc` is delivered again on
/// the disconnected event.
pub struct ClientAccessor<Req, Resp> {
    raw: raw::ClientAccessor,
    shared: Arc<ClientSlot<Req, Resp>>,
}

struct ClientSlot<Req, Resp> {
    binding: Binding,
    current: ArcSwapOption<Client<Req, Resp>>,
    /// Wrapper delivered by the last connected event.
    announced: ArcSwapOption<Client<Req, Resp>>,
    connected: Event<Arc<Client<Req, Resp>>>,
    disconnected: Event<Arc<Client<Req, Resp>>>,
}

impl<Req: Message, Resp: Message> ClientSlot<Req, Resp> {
    fn new(binding: Binding) -> Self {
        Self {
            binding,
            current: ArcSwapOption::empty(),
            announced: ArcSwapOption::empty(),
            connected: Event::new(),
            disconnected: Event::new(),
        }
    }

    /// Install the wrapper of `raw`, keeping an existing wrapper of the same connection.
    ///
    /// Returns the installed wrapper and whether it was created by this call.
    fn install(&self, raw: &raw::Client) -> (Arc<Client<Req, Resp>>, bool) {
        let fresh = Arc::new(Client::new(raw.clone(), &self.binding));
        let previous = self.current.rcu(|current| match current {
            Some(existing) if existing.raw().ptr_eq(raw) => Some(existing.clone()),
            _ => Some(fresh.clone()),
        });
        match previous {
            Some(existing) if existing.raw().ptr_eq(raw) => (existing, false),
            _ => (fresh, true),
        }
    }

    /// Install the wrapper of a newly connected `raw` and record it as announced.
    fn connect(&self, raw: &raw::Client) -> Arc<Client<Req, Resp>> {
        let (client, _) = self.install(raw);
        self.announced.store(Some(client.clone()));
        client
    }

    /// Clear every slot holding a wrapper of `raw`.
    ///
    /// Returns the wrapper announced for `raw`, or the installed one if none
    /// was announced. Returns `None` if `raw` was never wrapped.
    fn remove(&self, raw: &raw::Client) -> Option<Arc<Client<Req, Resp>>> {
        let holds = |slot: &Option<Arc<Client<Req, Resp>>>| {
            matches!(slot, Some(existing) if existing.raw().ptr_eq(raw))
        };
        let current = self
            .current
            .rcu(|current| if holds(current) { None } else { current.clone() });
        let announced = self
            .announced
            .rcu(|announced| if holds(announced) { None } else { announced.clone() });

        if holds(&announced) {
            announced
        } else if holds(&current) {
            current
        } else {
            None
        }
    }
}

impl<Req: Message, Resp: Message> ClientAccessor<Req, Resp> {
    /// Wrap an unstarted raw accessor.
    pub(crate) fn new(raw: raw::ClientAccessor, binding: Binding) -> Self {
        let shared = Arc::new(ClientSlot::new(binding));

        let weak: Weak<ClientSlot<Req, Resp>> = Arc::downgrade(&shared);
        raw.on_connected(move |client| {
            if let Some(shared) = weak.upgrade() {
                let client = shared.connect(client);
                shared.connected.emit(&client);
            }
        });

        let weak: Weak<ClientSlot<Req, Resp>> = Arc::downgrade(&shared);
        raw.on_disconnected(move |client| {
            if let Some(shared) = weak.upgrade() {
                if let Some(client) = shared.remove(client) {
                    shared.disconnected.emit(&client);
                }
            }
        });

        Self { raw, shared }
    }

    /// Start connecting; see [`raw::ClientAccessor::start`].
    pub(crate) async fn start(&self, wait: bool) -> Result<()> {
        self.raw.start(wait).await?;
        Ok(())
    }

    /// The current client, if connected.
    pub fn client(&self) -> Option<Arc<Client<Req, Resp>>> {
        if let Some(client) = self.shared.current.load_full() {
            return Some(client);
        }
        // Connected but the event has not been delivered yet.
        let raw = self.raw.client()?;
        let (client, created) = self.shared.install(&raw);
        if created && raw.is_closed() {
            // The disconnect may already have cleared the slot; do not leave a stale wrapper.
            self.shared.current.rcu(|current| match current {
                Some(existing) if Arc::ptr_eq(existing, &client) => None,
                other => other.clone(),
            });
            return None;
        }
        Some(client)
    }

    pub fn on_connected<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Arc<Client<Req, Resp>>) + Send + Sync + 'static,
    {
        self.shared.connected.subscribe(listener)
    }

    pub fn unsubscribe_connected(&self, id: SubscriptionId) -> bool {
        self.shared.connected.unsubscribe(id)
    }

    pub fn on_disconnected<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Arc<Client<Req, Resp>>) + Send + Sync + 'static,
    {
        self.shared.disconnected.subscribe(listener)
    }

    pub fn unsubscribe_disconnected(&self, id: SubscriptionId) -> bool {
        self.shared.disconnected.unsubscribe(id)
    }
}

impl<Req, Resp> ClientAccessor<Req, Resp> {
    pub fn name(&self) -> &str {
        self.raw.name()
    }

    pub fn raw(&self) -> &raw::ClientAccessor {
        &self.raw
    }

    /// Called with every failed reconnect attempt.
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

impl<Req, Resp> fmt::Debug for ClientAccessor<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientAccessor")
            .field("name", &self.raw.name())
            .field("client", &self.shared.current.load_full())
            .finish()
    }
}

/// Tracks the typed servers connected through one acceptor.
///
/// [`servers`](Self::servers) builds fresh wrappers on every call; compare
/// them with [`Server::same_connection`], not by identity. The wrapper
/// passed to a connected or disconnected listener is shared by every
/// listener of that event.
pub struct ServersAccessor {
    raw: raw::ServersAccessor,
    events: Arc<ServerEvents>,
}

#[derive(Default)]
struct ServerEvents {
    connected: Event<Server>,
    disconnected: Event<Server>,
}

impl ServersAccessor {
    /// Wrap an unstarted raw accessor and start it once subscribed.
    pub(crate) fn new(raw: raw::ServersAccessor) -> Self {
        let events = Arc::new(ServerEvents::default());

        let weak = Arc::downgrade(&events);
        raw.on_connected(move |server| {
            if let Some(events) = weak.upgrade() {
                events.connected.emit(&Server::new(server.clone()));
            }
        });

        let weak = Arc::downgrade(&events);
        raw.on_disconnected(move |server| {
            if let Some(events) = weak.upgrade() {
                events.disconnected.emit(&Server::new(server.clone()));
            }
        });

        raw.start();
        Self { raw, events }
    }

    pub fn name(&self) -> &str {
        self.raw.name()
    }

    pub fn raw(&self) -> &raw::ServersAccessor {
        &self.raw
    }

    /// The servers connected right now, freshly wrapped.
    pub fn servers(&self) -> Vec<Server> {
        self.raw.servers().into_iter().map(Server::new).collect()
    }

    pub fn on_connected<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Server) + Send + Sync + 'static,
    {
        self.events.connected.subscribe(listener)
    }

    pub fn unsubscribe_connected(&self, id: SubscriptionId) -> bool {
        self.events.connected.unsubscribe(id)
    }

    pub fn on_disconnected<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Server) + Send + Sync + 'static,
    {
        self.events.disconnected.subscribe(listener)
    }

    pub fn unsubscribe_disconnected(&self, id: SubscriptionId) -> bool {
        self.events.disconnected.unsubscribe(id)
    }

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

impl fmt::Debug for ServersAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServersAccessor")
            .field("raw", &self.raw)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use shmrpc_transport::TransportError;
    use tokio::sync::mpsc;

    use super::*;
    use crate::test_support::{next, ping, pong_factory, test_config, unique_name, Ping, Pong};
    use crate::Transport;

    fn transport() -> Transport<Ping, Pong> {
        Transport::new(test_config()).expect("config should be valid")
    }

    #[tokio::test]
    async fn disconnect_delivers_the_connected_wrapper() {
        let transport = transport();
        let name = unique_name("identity");
        let _acceptor = transport.make_server_acceptor(&name, pong_factory()).unwrap();

        let accessor = transport.connect_client(&name, false, None, None).await.unwrap();
        let (connected_tx, mut connected_rx) = mpsc::unbounded_channel();
        accessor.on_connected(move |client| {
            let _ = connected_tx.send(client.clone());
        });
        let (disconnected_tx, mut disconnected_rx) = mpsc::unbounded_channel();
        accessor.on_disconnected(move |client| {
            let _ = disconnected_tx.send(client.clone());
        });

        let first = accessor.client().expect("first connection should be installed");
        let current = accessor.client().expect("client should be connected");
        assert!(Arc::ptr_eq(&first, &current));
        assert_eq!(current.invoke(&ping(4)).await.unwrap(), Pong { seq: 4 });

        current.close();
        let disconnected = next(&mut disconnected_rx).await;
        assert!(Arc::ptr_eq(&disconnected, &first));

        let second = next(&mut connected_rx).await;
        assert!(!Arc::ptr_eq(&second, &first));
        assert_ne!(second.id(), first.id());
        assert!(Arc::ptr_eq(&accessor.client().expect("reconnected"), &second));
    }

    #[tokio::test]
    async fn disconnect_prefers_the_announced_wrapper() {
        let transport = transport();
        let name = unique_name("announced");
        let _acceptor = transport.make_server_acceptor(&name, pong_factory()).unwrap();
        let connected = transport
            .make_client_connector()
            .connect(&name, None)
            .await
            .unwrap();
        let raw = connected.raw().clone();

        let slot: ClientSlot<Ping, Pong> = ClientSlot::new(Binding::new(transport.config()));
        let announced = slot.connect(&raw);
        // A lazy read that saw the connection closing withdraws the wrapper.
        slot.current.store(None);

        let removed = slot.remove(&raw).expect("announced wrapper should be returned");
        assert!(Arc::ptr_eq(&removed, &announced));
        assert!(slot.remove(&raw).is_none());
        assert!(slot.current.load_full().is_none());
        assert!(slot.announced.load_full().is_none());
    }

    #[tokio::test]
    async fn unknown_connection_is_not_wrapped_on_disconnect() {
        let transport = transport();
        let name = unique_name("unknown");
        let _acceptor = transport.make_server_acceptor(&name, pong_factory()).unwrap();
        let connector = transport.make_client_connector();
        let first = connector.connect(&name, None).await.unwrap();
        let second = connector.connect(&name, None).await.unwrap();

        let slot: ClientSlot<Ping, Pong> = ClientSlot::new(Binding::new(transport.config()));
        let installed = slot.connect(first.raw());

        assert!(slot.remove(second.raw()).is_none());
        let current = slot.current.load_full().expect("first wrapper should stay installed");
        assert!(Arc::ptr_eq(&current, &installed));
    }

    #[tokio::test]
    async fn repeated_reads_share_one_wrapper() {
        let transport = transport();
        let name = unique_name("reads");
        let _acceptor = transport.make_server_acceptor(&name, pong_factory()).unwrap();

        let accessor = transport.connect_client(&name, false, None, None).await.unwrap();
        let a = accessor.client().expect("connected");
        let b = accessor.client().expect("connected");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(accessor.name(), name);
    }

    #[tokio::test]
    async fn failed_reconnects_raise_errors() {
        let transport = transport();
        let name = unique_name("lost");
        let acceptor = transport.make_server_acceptor(&name, pong_factory()).unwrap();
        let accessor = transport.connect_client(&name, false, None, None).await.unwrap();

        let (err_tx, mut err_rx) = mpsc::unbounded_channel();
        accessor.on_error(move |err| {
            let _ = err_tx.send(matches!(**err, TransportError::NotFound(_)));
        });
        drop(acceptor);

        assert!(next(&mut err_rx).await);
    }

    #[tokio::test]
    async fn servers_are_wrapped_fresh_on_every_read() {
        let transport = transport();
        let name = unique_name("servers");
        let servers = transport.accept_servers(&name, pong_factory()).unwrap();
        let (connected_tx, mut connected_rx) = mpsc::unbounded_channel();
        servers.on_connected(move |server| {
            let _ = connected_tx.send(server.clone());
        });
        let (disconnected_tx, mut disconnected_rx) = mpsc::unbounded_channel();
        servers.on_disconnected(move |server| {
            let _ = disconnected_tx.send(server.id());
        });

        let client = transport
            .make_client_connector()
            .connect(&name, None)
            .await
            .unwrap();
        let connected = next(&mut connected_rx).await;
        assert_eq!(connected.id(), client.id());

        let first_read = servers.servers();
        let second_read = servers.servers();
        assert_eq!(first_read.len(), 1);
        assert!(first_read[0].same_connection(&second_read[0]));
        assert!(first_read[0].same_connection(&connected));

        connected.close();
        assert_eq!(next(&mut disconnected_rx).await, client.id());
        assert!(servers.servers().is_empty());
        assert!(client.is_closed());
    }
}
