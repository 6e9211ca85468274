use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use shmrpc::memory::BufferPool;
use shmrpc::peer::{Component, HandlerError};
use shmrpc::transport::{ClientConnector, RemoteErrorKind, TransportError};
use shmrpc::{service_fn, Config, PeerError, Transport};
use tokio::sync::mpsc;

fn unique_name(tag: &str) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    format!(
        "shmrpc-failures-{tag}-{}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

fn slow_echo(delay: Duration) -> shmrpc::peer::HandlerFactory<u64, u64> {
    service_fn(move |x: u64| async move {
        tokio::time::sleep(delay).await;
        Ok::<_, HandlerError>(x)
    })
}

#[tokio::test]
async fn no_timeout_waits_for_a_slow_response() {
    let transport: Transport<u64, u64> = Transport::new(Config::default()).unwrap();
    let name = unique_name("patient");
    let _acceptor = transport
        .make_server_acceptor(&name, slow_echo(Duration::from_millis(300)))
        .unwrap();

    let client = transport
        .make_client_connector()
        .connect(&name, None)
        .await
        .unwrap();
    assert_eq!(client.invoke(&5).await.expect("no timeout configured"), 5);
    assert_eq!(
        client
            .invoke_with_timeout(&6, Duration::ZERO)
            .await
            .expect("zero timeout means the default"),
        6
    );
}

#[tokio::test]
async fn short_timeout_yields_no_response() {
    let transport: Transport<u64, u64> = Transport::new(Config::default()).unwrap();
    let name = unique_name("impatient");
    let _acceptor = transport
        .make_server_acceptor(&name, slow_echo(Duration::from_millis(300)))
        .unwrap();

    let client = transport
        .make_client_connector()
        .connect(&name, None)
        .await
        .unwrap();
    let result = client
        .invoke_with_timeout(&5, Duration::from_millis(30))
        .await;
    assert!(matches!(result, Err(PeerError::Timeout(limit)) if limit == Duration::from_millis(30)));

    // The connection is still usable once the slow call is abandoned.
    assert_eq!(
        client
            .invoke_with_timeout(&7, Duration::from_secs(5))
            .await
            .unwrap(),
        7
    );
}

#[tokio::test]
async fn malformed_request_is_released_once() {
    let transport: Transport<u64, u64> = Transport::new(Config::default()).unwrap();
    let name = unique_name("malformed");
    let acceptor = transport
        .make_server_acceptor(&name, slow_echo(Duration::ZERO))
        .unwrap();
    let (err_tx, mut err_rx) = mpsc::unbounded_channel();
    acceptor.on_error(move |err| {
        let _ = err_tx.send(err.to_string());
    });

    // Talk to the typed server through the raw layer to send garbage.
    let raw = ClientConnector::new(transport.config().transport.clone())
        .connect(&name, None)
        .await
        .unwrap();
    let pool = BufferPool::new(raw.output_memory().clone());
    let garbage = pool.make_buffer(&[0xFF, 0xEE, 0xDD]).unwrap();
    assert_eq!(pool.stats().outstanding_blobs, 1);

    let err = raw.invoke(garbage, None).await.unwrap_err();
    assert!(matches!(
        err,
        TransportError::Remote {
            kind: RemoteErrorKind::MalformedRequest,
            ..
        }
    ));

    let reported = tokio::time::timeout(Duration::from_secs(5), err_rx.recv())
        .await
        .expect("error should be reported")
        .expect("channel open");
    assert!(reported.contains("handler failed"), "unexpected error: {reported}");

    let stats = pool.stats();
    assert_eq!(stats.outstanding_blobs, 0);
    assert_eq!(stats.outstanding_bytes, 0);
    assert_eq!(raw.output_memory().used(), 0);
    assert!(!raw.is_closed());
}
