use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shmrpc_transport::{HandlerError, TransportConfig};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::handler::{service_fn, HandlerFactory};

pub(crate) const WAIT: Duration = Duration::from_secs(5);

pub(crate) fn unique_name(tag: &str) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    format!(
        "shmrpc-peer-{tag}-{}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

pub(crate) fn test_config() -> Config {
    Config {
        transport: TransportConfig {
            memory_size: 64 * 1024,
            reconnect_delay: Duration::from_millis(10),
            connect_timeout: Some(WAIT),
        },
        ..Config::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Ping {
    pub(crate) seq: u32,
    pub(crate) delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Pong {
    pub(crate) seq: u32,
}

/// Answers each ping after its requested delay.
pub(crate) fn pong_factory() -> HandlerFactory<Ping, Pong> {
    service_fn(|ping: Ping| async move {
        if ping.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(ping.delay_ms)).await;
        }
        Ok::<_, HandlerError>(Pong { seq: ping.seq })
    })
}

pub(crate) fn ping(seq: u32) -> Ping {
    Ping { seq, delay_ms: 0 }
}

/// Receive the next value or panic after [`WAIT`].
pub(crate) async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("event should arrive in time")
        .expect("event channel should stay open")
}
