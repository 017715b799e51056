//! The construction-time state a batch is executed against: the shard
//! topology, an optional remote connection pool, and any backends this
//! process hosts directly.

use std::collections::HashMap;
use std::sync::Arc;

use smd_backend::Backend;
use smd_sharder::Topology;

use crate::connection::ConnectionPool;

/// Everything `Batch::execute` needs to dispatch a batch: which shard a
/// namespace belongs to, how to reach a shard this process does not host,
/// and which shards it hosts directly (the local-backend fast path). Built
/// once and shared across concurrently-executing batches — multiple
/// threads may execute independent batches against the same context at
/// once.
pub struct DispatchContext {
    pub(crate) topology: Topology,
    pub(crate) pool: Option<Arc<dyn ConnectionPool>>,
    pub(crate) local_backends: HashMap<usize, Arc<dyn Backend>>,
    pub(crate) runtime: tokio::runtime::Runtime,
}

impl DispatchContext {
    /// A context with the given shard count, no remote pool, and no
    /// co-hosted backends (callers add both with the builder methods below).
    pub fn new(shard_count: usize) -> Self {
        Self {
            topology: Topology::new(shard_count),
            pool: None,
            local_backends: HashMap::new(),
            runtime: tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("building a current-thread tokio runtime cannot fail in practice"),
        }
    }

    /// Route requests to shards this process does not host through `pool`.
    pub fn with_connection_pool(mut self, pool: Arc<dyn ConnectionPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Register `backend` as the co-hosted backend for `shard_idx`,
    /// enabling the local fast path for namespaces that hash there.
    pub fn with_local_backend(mut self, shard_idx: usize, backend: Arc<dyn Backend>) -> Self {
        self.local_backends.insert(shard_idx, backend);
        self
    }

    /// The shard topology this context was built with.
    pub fn topology(&self) -> Topology {
        self.topology
    }
}
