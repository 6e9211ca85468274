//! Typed request/response over the shmrpc transport.
//!
//! A [`Transport<Req, Resp>`](Transport) is built from a [`Config`] that
//! selects one wire strategy for its whole lifetime. Its factory methods
//! return typed wrappers around the raw transport objects: every wrapper
//! owns or attaches a [`Serializer`](shmrpc_codec::Serializer) bound to its
//! connection's memory and converts values at the buffer boundary.
//!
//! ```no_run
//! use shmrpc_peer::{service_fn, Config, HandlerError, Transport};
//!
//! # async fn run() -> shmrpc_peer::Result<()> {
//! let transport = Transport::<u64, u64>::new(Config::default())?;
//! let _acceptor = transport.make_server_acceptor("svc", service_fn(|x: u64| async move {
//!     Ok::<_, HandlerError>(x)
//! }))?;
//!
//! let accessor = transport.connect_client("svc", false, None, None).await?;
//! if let Some(client) = accessor.client() {
//!     assert_eq!(client.invoke(&100).await?, 100);
//! }
//! # Ok(())
//! # }
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;

pub mod acceptor;
pub mod accessor;
pub mod client;
pub mod config;
pub mod connector;
pub mod error;
pub mod handler;
pub mod server;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use acceptor::ServerAcceptor;
pub use accessor::{ClientAccessor, ServersAccessor};
pub use client::Client;
pub use config::Config;
pub use connector::ClientConnector;
pub use error::{PeerError, Result};
pub use handler::{handler_factory, handler_fn, service_fn, Handler, HandlerFactory};
pub use server::Server;
pub use shmrpc_transport::{Component, ErrorEvent, HandlerError, SubscriptionId};
pub use transport::Transport;

/// A request or response type the typed layer can carry.
pub trait Message: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Message for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}
