//! Typed request/response RPC over pooled shared-memory buffers.
//!
//! # Crate Structure
//!
//! - [`memory`]: Named segments, buffer pool and reference-counted buffers
//! - [`codec`]: Protocol dispatch, marshal header and the pooled serializer
//! - [`transport`]: Untyped buffer transport with connectors, acceptors and accessors
//! - [`peer`]: Typed clients and servers (behind `peer` feature)

/// Re-export memory types.
pub mod memory {
    pub use shmrpc_memory::*;
}

/// Re-export codec types.
pub mod codec {
    pub use shmrpc_codec::*;
}

/// Re-export raw transport types.
pub mod transport {
    pub use shmrpc_transport::*;
}

/// Re-export typed peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use shmrpc_peer::*;
}

#[cfg(feature = "peer")]
pub use shmrpc_peer::{
    handler_factory, handler_fn, service_fn, Client, ClientAccessor, ClientConnector, Config,
    PeerError, Server, ServerAcceptor, ServersAccessor, Transport,
};

/// Shared command-line setup of the demo programs (requires `demo` feature).
#[cfg(feature = "demo")]
pub mod demo;

/// Log output setup of the demo programs (requires `demo` feature).
#[cfg(feature = "demo")]
pub mod logging;
