//! The request-batching and sharded dispatch engine: groups a [`Batch`]'s
//! operations by destination shard, builds per-shard request messages,
//! sends them (or bypasses the transport for a co-hosted shard), and
//! scatters replies back into the client objects that enqueued them.
//!
//! A batch comes in, gets grouped and framed, goes out to a shard (or
//! straight into a co-hosted backend), and the reply gets routed back to
//! whatever client object is waiting on it.

#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

mod connection;
mod context;
mod execute;
pub mod wire;

pub use connection::{Connection, ConnectionPool, MockConnection};
pub use context::DispatchContext;
pub use execute::BatchExt;

use thiserror::Error;

/// A failure executing a batch.
///
/// Protocol and backend failures are reported as the *first* failure
/// encountered; earlier operations in the same batch are not rolled back,
/// and their effects (and any write-backs already performed) stand.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DispatchError {
    /// A backend operation failed.
    #[error(transparent)]
    Backend(#[from] smd_backend::BackendError),
    /// Encoding or decoding a wire fragment failed.
    #[error(transparent)]
    Wire(#[from] wire::WireError),
    /// Sending or receiving on a connection failed.
    #[error("transport error: {0}")]
    Transport(String),
    /// No connection pool was configured, and the destination shard is not
    /// hosted locally.
    #[error("no route to shard {0}: not co-hosted and no connection pool configured")]
    NoRoute(usize),
}
