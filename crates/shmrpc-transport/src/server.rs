use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_core::future::BoxFuture;
use shmrpc_memory::{ConstBuffer, SharedMemory};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::component::{Component, ComponentCore};
use crate::error::{HandlerError, RemoteErrorKind, TransportError};
use crate::event::{Event, SubscriptionId};

/// Error payload of error events. Shared so one error can reach several events.
pub type ErrorEvent = Arc<TransportError>;

/// Serves the calls of one connection.
pub type Handler =
    Arc<dyn Fn(ConstBuffer) -> BoxFuture<'static, Result<ConstBuffer, HandlerError>> + Send + Sync>;

/// Builds the handler of each accepted connection from its
/// `(input_memory, output_memory)` pair.
pub type HandlerFactory =
    Arc<dyn Fn(&Arc<SharedMemory>, &Arc<SharedMemory>) -> Handler + Send + Sync>;

/// Box an async function as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(ConstBuffer) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ConstBuffer, HandlerError>> + Send + 'static,
{
    Arc::new(move |request| -> BoxFuture<'static, Result<ConstBuffer, HandlerError>> {
        Box::pin(f(request))
    })
}

/// Wrap a closure as a [`HandlerFactory`].
pub fn handler_factory<F>(f: F) -> HandlerFactory
where
    F: Fn(&Arc<SharedMemory>, &Arc<SharedMemory>) -> Handler + Send + Sync + 'static,
{
    Arc::new(f)
}

/// One request in flight from a client to a server.
pub(crate) struct Call {
    pub(crate) request: ConstBuffer,
    pub(crate) reply: oneshot::Sender<Result<ConstBuffer, TransportError>>,
}

/// The serving end of a connection.
///
/// Dropping every `Server` handle does not close the connection; it stays
/// open until either end closes it or the owning acceptor is dropped.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    core: ComponentCore,
    errors: Arc<Event<ErrorEvent>>,
}

impl Server {
    pub(crate) fn new(core: ComponentCore) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                core,
                errors: Arc::new(Event::new()),
            }),
        }
    }

    /// Connection identifier, shared with the client end.
    pub fn id(&self) -> u64 {
        self.inner.core.id()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Called with every handler failure on this connection.
    pub fn on_error<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ErrorEvent) + Send + Sync + 'static,
    {
        self.inner.errors.subscribe(listener)
    }

    pub fn unsubscribe_error(&self, id: SubscriptionId) -> bool {
        self.inner.errors.unsubscribe(id)
    }

    /// Start serving `calls` with `handler` until the connection closes.
    pub(crate) fn serve(
        &self,
        calls: mpsc::UnboundedReceiver<Call>,
        handler: Handler,
        acceptor_errors: Arc<Event<ErrorEvent>>,
    ) {
        let token = self.inner.core.token().clone();
        let errors = self.inner.errors.clone();
        tokio::spawn(serve_loop(
            self.id(),
            calls,
            handler,
            token,
            errors,
            acceptor_errors,
        ));
    }
}

async fn serve_loop(
    id: u64,
    mut calls: mpsc::UnboundedReceiver<Call>,
    handler: Handler,
    token: CancellationToken,
    errors: Arc<Event<ErrorEvent>>,
    acceptor_errors: Arc<Event<ErrorEvent>>,
) {
    loop {
        let call = tokio::select! {
            _ = token.cancelled() => break,
            call = calls.recv() => match call {
                Some(call) => call,
                None => {
                    // Every client handle is gone.
                    token.cancel();
                    break;
                }
            },
        };

        let future = handler(call.request);
        let errors = errors.clone();
        let acceptor_errors = acceptor_errors.clone();
        tokio::spawn(async move {
            let reply = match future.await {
                Ok(response) => Ok(response),
                Err(err) => {
                    warn!(connection = id, error = %err, "request handler failed");
                    let remote = TransportError::Remote {
                        kind: RemoteErrorKind::of(&err),
                        message: err.to_string(),
                    };
                    let event: ErrorEvent = Arc::new(TransportError::Handler(err));
                    errors.emit(&event);
                    acceptor_errors.emit(&event);
                    Err(remote)
                }
            };
            if call.reply.send(reply).is_err() {
                debug!(connection = id, "caller went away before the reply");
            }
        });
    }
    debug!(connection = id, "serve loop finished");
}

impl Component for Server {
    fn input_memory(&self) -> &Arc<SharedMemory> {
        self.inner.core.input_memory()
    }

    fn output_memory(&self) -> &Arc<SharedMemory> {
        self.inner.core.output_memory()
    }

    fn is_closed(&self) -> bool {
        self.inner.core.is_closed()
    }

    fn close(&self) {
        self.inner.core.close();
    }

    fn on_closed<F>(&self, listener: F) -> SubscriptionId
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.core.on_closed(listener)
    }

    fn unsubscribe_closed(&self, id: SubscriptionId) -> bool {
        self.inner.core.unsubscribe_closed(id)
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("id", &self.id())
            .field("closed", &self.is_closed())
            .finish()
    }
}
