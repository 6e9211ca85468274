//! In-process buffer transport.
//!
//! Moves [`ConstBuffer`](shmrpc_memory::ConstBuffer)s between a [`Client`]
//! and a [`Server`] over per-connection shared-memory segments. Endpoints
//! are process-wide names: a [`ServerAcceptor`] binds a name, a
//! [`ClientConnector`] connects to it. [`ClientAccessor`] keeps one client
//! connected and [`ServersAccessor`] tracks the servers of an acceptor.
//!
//! Every object that spawns work must be started from within a tokio runtime.

pub mod acceptor;
pub mod accessor;
pub mod client;
pub mod component;
pub mod config;
pub mod connector;
mod endpoint;
pub mod error;
pub mod event;
pub mod server;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use acceptor::ServerAcceptor;
pub use accessor::{ClientAccessor, ServersAccessor};
pub use client::Client;
pub use component::Component;
pub use config::{TransportConfig, DEFAULT_MEMORY_SIZE, DEFAULT_RECONNECT_DELAY};
pub use connector::ClientConnector;
pub use error::{HandlerError, MalformedRequest, RemoteErrorKind, Result, TransportError};
pub use event::{Event, OnceEvent, SubscriptionId};
pub use server::{handler_factory, handler_fn, ErrorEvent, Handler, HandlerFactory, Server};
pub use transport::Transport;
