use std::fmt;
use std::sync::Arc;

use shmrpc_transport::{self as raw, ErrorEvent, Event, SubscriptionId};

use crate::server::Server;

/// Accepts typed connections on a named endpoint.
///
/// Each raw accepted connection is wrapped once and republished on
/// [`on_accepted`](Self::on_accepted). Errors pass through unchanged.
/// Dropping the acceptor unbinds the name and closes its connections.
pub struct ServerAcceptor {
    raw: raw::ServerAcceptor,
    accepted: Arc<Event<Server>>,
}

impl ServerAcceptor {
    /// Wrap an unstarted raw acceptor and start it once subscribed.
    pub(crate) fn new(raw: raw::ServerAcceptor) -> Self {
        let accepted = Arc::new(Event::new());
        let weak = Arc::downgrade(&accepted);
        raw.on_accepted(move |server| {
            if let Some(accepted) = weak.upgrade() {
                accepted.emit(&Server::new(server.clone()));
            }
        });
        raw.start();
        Self { raw, accepted }
    }

    pub fn name(&self) -> &str {
        self.raw.name()
    }

    pub fn raw(&self) -> &raw::ServerAcceptor {
        &self.raw
    }

    /// Called with each accepted server, before the client's connect returns.
    pub fn on_accepted<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Server) + Send + Sync + 'static,
    {
        self.accepted.subscribe(listener)
    }

    pub fn unsubscribe_accepted(&self, id: SubscriptionId) -> bool {
        self.accepted.unsubscribe(id)
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

    /// Stop accepting and close every accepted connection.
    pub fn close(&self) {
        self.raw.close();
    }

    pub fn is_closed(&self) -> bool {
        self.raw.is_closed()
    }
}

impl fmt::Debug for ServerAcceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerAcceptor")
            .field("raw", &self.raw)
            .field("listeners", &self.accepted.listener_count())
            .finish()
    }
}
