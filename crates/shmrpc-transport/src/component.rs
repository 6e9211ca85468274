use std::sync::Arc;

use shmrpc_memory::SharedMemory;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::event::{OnceEvent, SubscriptionId};

/// Capabilities shared by both ends of a connection.
pub trait Component {
    /// Segment this end reads requests or responses from.
    fn input_memory(&self) -> &Arc<SharedMemory>;

    /// Segment this end allocates outgoing buffers from.
    fn output_memory(&self) -> &Arc<SharedMemory>;

    fn is_closed(&self) -> bool;

    /// Close the connection. Idempotent.
    fn close(&self);

    /// Run `listener` once when the connection closes.
    ///
    /// Listeners registered after the close run immediately.
    fn on_closed<F>(&self, listener: F) -> SubscriptionId
    where
        F: FnOnce() + Send + 'static;

    fn unsubscribe_closed(&self, id: SubscriptionId) -> bool;
}

/// State common to the client and server ends of one connection.
///
/// Both ends share the connection token; cancelling it from either side
/// closes the connection for both.
pub(crate) struct ComponentCore {
    id: u64,
    input_memory: Arc<SharedMemory>,
    output_memory: Arc<SharedMemory>,
    token: CancellationToken,
    closed: Arc<OnceEvent>,
}

impl ComponentCore {
    /// Must be called from within a tokio runtime.
    pub(crate) fn new(
        id: u64,
        input_memory: Arc<SharedMemory>,
        output_memory: Arc<SharedMemory>,
        token: CancellationToken,
    ) -> Self {
        let closed = Arc::new(OnceEvent::new());

        let watch_token = token.clone();
        let watch_closed = closed.clone();
        tokio::spawn(async move {
            watch_token.cancelled().await;
            debug!(connection = id, "connection closed");
            watch_closed.fire();
        });

        Self {
            id,
            input_memory,
            output_memory,
            token,
            closed,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn input_memory(&self) -> &Arc<SharedMemory> {
        &self.input_memory
    }

    pub(crate) fn output_memory(&self) -> &Arc<SharedMemory> {
        &self.output_memory
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn close(&self) {
        self.token.cancel();
    }

    pub(crate) fn on_closed<F>(&self, listener: F) -> SubscriptionId
    where
        F: FnOnce() + Send + 'static,
    {
        self.closed.subscribe(listener)
    }

    pub(crate) fn unsubscribe_closed(&self, id: SubscriptionId) -> bool {
        self.closed.unsubscribe(id)
    }
}
