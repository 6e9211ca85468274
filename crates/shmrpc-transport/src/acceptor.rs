use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::component::{Component, ComponentCore};
use crate::endpoint::{self, Handshake, HandshakeSender};
use crate::error::Result;
use crate::event::{Event, SubscriptionId};
use crate::server::{ErrorEvent, HandlerFactory, Server};

/// Accepts connections on a named endpoint.
///
/// The acceptor is created unstarted: connection requests queue up until
/// [`start`](Self::start) is called, so listeners can be attached first.
/// Dropping the acceptor unbinds the name and closes every connection it
/// accepted.
pub struct ServerAcceptor {
    name: String,
    sender: HandshakeSender,
    incoming: Mutex<Option<mpsc::UnboundedReceiver<Handshake>>>,
    shared: Arc<AcceptorShared>,
    started: AtomicBool,
}

struct AcceptorShared {
    factory: HandlerFactory,
    token: CancellationToken,
    accepted: Event<Server>,
    errors: Arc<Event<ErrorEvent>>,
}

impl ServerAcceptor {
    /// Bind `name` without accepting yet.
    pub fn bind(name: impl Into<String>, factory: HandlerFactory) -> Result<Self> {
        let name = name.into();
        let (sender, receiver) = endpoint::bind(&name)?;
        Ok(Self {
            name,
            sender,
            incoming: Mutex::new(Some(receiver)),
            shared: Arc::new(AcceptorShared {
                factory,
                token: CancellationToken::new(),
                accepted: Event::new(),
                errors: Arc::new(Event::new()),
            }),
            started: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start accepting. Later calls do nothing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(incoming) = self.incoming.lock().take() else {
            return;
        };
        info!(endpoint = %self.name, "accepting connections");
        tokio::spawn(accept_loop(self.name.clone(), incoming, self.shared.clone()));
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Called with each accepted server, before the client's connect returns.
    pub fn on_accepted<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Server) + Send + Sync + 'static,
    {
        self.shared.accepted.subscribe(listener)
    }

    pub fn unsubscribe_accepted(&self, id: SubscriptionId) -> bool {
        self.shared.accepted.unsubscribe(id)
    }

    /// Called with every handler failure on any accepted connection.
    pub fn on_error<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ErrorEvent) + Send + Sync + 'static,
    {
        self.shared.errors.subscribe(listener)
    }

    pub fn unsubscribe_error(&self, id: SubscriptionId) -> bool {
        self.shared.errors.unsubscribe(id)
    }

    /// Stop accepting and close every accepted connection.
    pub fn close(&self) {
        self.shared.token.cancel();
        endpoint::unbind(&self.name, &self.sender);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.token.is_cancelled()
    }
}

impl Drop for ServerAcceptor {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ServerAcceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerAcceptor")
            .field("name", &self.name)
            .field("started", &self.is_started())
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn accept_loop(
    name: String,
    mut incoming: mpsc::UnboundedReceiver<Handshake>,
    shared: Arc<AcceptorShared>,
) {
    loop {
        let handshake = tokio::select! {
            _ = shared.token.cancelled() => break,
            handshake = incoming.recv() => match handshake {
                Some(handshake) => handshake,
                None => break,
            },
        };
        accept(&name, handshake, &shared);
    }
    debug!(endpoint = %name, "accept loop finished");
}

fn accept(name: &str, handshake: Handshake, shared: &AcceptorShared) {
    let Handshake {
        id,
        request_memory,
        response_memory,
        calls,
        accepted,
    } = handshake;

    let token = shared.token.child_token();
    let core = ComponentCore::new(id, request_memory, response_memory, token.clone());
    let server = Server::new(core);

    let handler = (shared.factory)(server.input_memory(), server.output_memory());
    server.serve(calls, handler, shared.errors.clone());
    info!(endpoint = name, connection = id, "accepted connection");

    shared.accepted.emit(&server);
    if accepted.send(token).is_err() {
        debug!(endpoint = name, connection = id, "client gave up before accept");
        server.close();
    }
}
