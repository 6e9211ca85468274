use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use shmrpc_memory::{BufferPool, ConstBuffer};
use tokio::sync::mpsc;

use crate::config::TransportConfig;
use crate::error::HandlerError;
use crate::server::{handler_factory, handler_fn, HandlerFactory};

pub(crate) const WAIT: Duration = Duration::from_secs(5);

pub(crate) fn unique_name(tag: &str) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    format!(
        "shmrpc-transport-{tag}-{}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

pub(crate) fn test_config() -> TransportConfig {
    TransportConfig {
        memory_size: 64 * 1024,
        reconnect_delay: Duration::from_millis(10),
        connect_timeout: Some(WAIT),
    }
}

/// Echoes every request after `delay`.
pub(crate) fn echo_factory(delay: Duration) -> HandlerFactory {
    handler_factory(move |_input, output| {
        let pool = BufferPool::new(output.clone());
        handler_fn(move |request: ConstBuffer| {
            let pool = pool.clone();
            async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                pool.make_buffer(&request.to_bytes())
                    .map_err(HandlerError::from)
            }
        })
    })
}

/// Fails every request with `message`.
pub(crate) fn failing_factory(message: &'static str) -> HandlerFactory {
    handler_factory(move |_input, _output| {
        handler_fn(move |_request: ConstBuffer| async move {
            Err::<ConstBuffer, _>(HandlerError::from(message))
        })
    })
}

/// Receive the next value or panic after [`WAIT`].
pub(crate) async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("event should arrive in time")
        .expect("event channel should stay open")
}
