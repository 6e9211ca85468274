use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shmrpc::codec::{Blob, Protocol};
use shmrpc::memory::BufferPool;
use shmrpc::peer::{handler_factory, handler_fn, Component, HandlerError};
use shmrpc::{service_fn, Config, Transport};
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);

fn unique_name(tag: &str) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    format!(
        "shmrpc-e2e-{tag}-{}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("event should arrive in time")
        .expect("event channel should stay open")
}

fn identity() -> shmrpc::peer::HandlerFactory<u64, u64> {
    service_fn(|x: u64| async move { Ok::<_, HandlerError>(x) })
}

#[tokio::test]
async fn svc_identity_round_trip_and_close_events() {
    let transport: Transport<u64, u64> = Transport::new(Config::default()).expect("defaults are valid");
    let acceptor = transport
        .make_server_acceptor("svc", identity())
        .expect("svc should be free");
    let (server_tx, mut server_rx) = mpsc::unbounded_channel();
    acceptor.on_accepted(move |server| {
        let _ = server_tx.send(server.clone());
    });

    // Client closes the server.
    let accessor = transport
        .connect_client("svc", false, None, None)
        .await
        .expect("client should connect");
    let client = accessor.client().expect("client should be current");
    assert_eq!(client.invoke(&100).await.expect("call should succeed"), 100);

    let server = next(&mut server_rx).await;
    assert_eq!(server.id(), client.id());
    let (server_closed_tx, mut server_closed_rx) = mpsc::unbounded_channel();
    server.on_closed(move || {
        let _ = server_closed_tx.send(());
    });
    client.close();
    next(&mut server_closed_rx).await;
    assert!(server.is_closed());
    drop(accessor);

    // Server closes the client.
    let client = transport
        .make_client_connector()
        .connect("svc", None)
        .await
        .expect("second client should connect");
    let server = loop {
        // Skip a reconnect the accessor may have made before it was dropped.
        let server = next(&mut server_rx).await;
        if server.id() == client.id() {
            break server;
        }
    };
    let (client_closed_tx, mut client_closed_rx) = mpsc::unbounded_channel();
    client.on_closed(move || {
        let _ = client_closed_tx.send(());
    });
    assert_eq!(client.invoke(&100).await.unwrap(), 100);
    server.close();
    next(&mut client_closed_rx).await;
    assert!(client.is_closed());
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Request {
    Store { key: String, payload: Blob },
    Fetch { key: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Response {
    Stored { len: usize },
    Found(Option<Blob>),
}

#[tokio::test]
async fn blobs_cross_the_connection_in_both_directions() {
    for protocol in Protocol::ALL {
        let config = Config {
            protocol,
            min_blob_size: 64,
            ..Config::default()
        };
        let transport: Transport<Request, Response> = Transport::new(config).unwrap();
        let name = unique_name("blobs");

        let factory = handler_factory(|_input, output| {
            let pool = BufferPool::new(output.clone());
            let store = Arc::new(Store::default());
            handler_fn(move |request: Request| serve(pool.clone(), store.clone(), request))
        });
        let _acceptor = transport.make_server_acceptor(&name, factory).unwrap();

        let client = transport
            .make_client_connector()
            .connect(&name, None)
            .await
            .unwrap();
        let pool = BufferPool::new(client.output_memory().clone());
        let big = vec![0xAB; 1000];
        let payload: Blob = pool.make_blob(&big).unwrap().into();

        let stored = client
            .invoke(&Request::Store {
                key: "big".into(),
                payload,
            })
            .await
            .unwrap();
        assert_eq!(stored, Response::Stored { len: 1000 });

        let found = client
            .invoke(&Request::Fetch { key: "big".into() })
            .await
            .unwrap();
        let blob = match found {
            Response::Found(Some(blob)) => blob,
            other => panic!("blob should be stored, got {other:?}"),
        };
        assert_eq!(&blob[..], &big[..]);
        assert!(blob.as_const_blob().is_in(client.input_memory()));
        assert_eq!(pool.stats().outstanding_blobs, 0);

        let missing = client
            .invoke(&Request::Fetch { key: "none".into() })
            .await
            .unwrap();
        assert_eq!(missing, Response::Found(None));
    }
}

#[derive(Default)]
struct Store(Mutex<HashMap<String, Blob>>);

async fn serve(pool: BufferPool, store: Arc<Store>, request: Request) -> Result<Response, HandlerError> {
    match request {
        Request::Store { key, payload } => {
            let len = payload.len();
            // Copy into the response segment so the blob can be referenced by later responses.
            let copy = pool.make_blob(&payload)?;
            store.0.lock().expect("store lock").insert(key, copy.into());
            Ok(Response::Stored { len })
        }
        Request::Fetch { key } => Ok(Response::Found(
            store.0.lock().expect("store lock").get(&key).cloned(),
        )),
    }
}
