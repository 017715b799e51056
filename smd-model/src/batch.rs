//! An ordered list of operations dispatched together.

use crate::record::Record;
use crate::scheme::Scheme;
use crate::search::Search;

/// One unit of work enqueued into a [`Batch`].
///
/// Each variant carries the client handle it was enqueued from, so a
/// successful reply can be written back into that same handle (see
/// [`Scheme`] and [`Record`]'s module docs).
#[derive(Debug, Clone)]
pub enum Operation {
    /// Declare a namespace's scheme.
    ApplyScheme(Scheme),
    /// Retrieve a namespace's scheme.
    GetScheme(Scheme),
    /// Insert a new record.
    Insert(Record),
    /// Overwrite fields on an existing record.
    Update(Record),
    /// Remove a record.
    Delete(Record),
    /// Retrieve a record's fields.
    Get(Record),
    /// Run a search (see [`Search`]'s module docs for its inert surface).
    Search(Search),
}

/// The three independent knobs governing how a batch is executed: none of
/// these change *what* is dispatched, only the durability and ordering
/// contract the caller is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Semantics {
    /// Whether operations must be applied in enqueued order.
    pub consistency: Consistency,
    /// Whether a crash mid-batch may leave a partial effect.
    pub safety: Safety,
    /// Whether a successful reply implies the effect survives a restart.
    pub persistency: Persistency,
}

/// Ordering requirement for a batch's operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Consistency {
    /// Operations may be reordered or parallelized by the backend.
    #[default]
    Relaxed,
    /// Operations are applied strictly in enqueued order.
    Ordered,
}

/// Failure-atomicity requirement for a batch's operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Safety {
    /// A crash mid-batch may leave a prefix of operations applied.
    #[default]
    BestEffort,
    /// The whole batch is applied, or none of it is.
    Atomic,
}

/// Durability requirement for a batch's operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Persistency {
    /// A successful reply means the effect is visible, but may not yet be
    /// durable across a restart.
    #[default]
    Lazy,
    /// A successful reply means the effect is durable.
    Sync,
}

/// An ordered list of operations, plus the semantics template they are
/// dispatched under.
///
/// `Batch` itself carries no execution logic — the object model stays
/// transport- and backend-agnostic. Dispatching a batch
/// (deciding which shard each operation lands on, talking to a backend or a
/// remote connection, and writing results back into the enqueued handles)
/// is the dispatch engine's job; see `BatchExt::execute` in `smd-dispatch`.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    operations: Vec<Operation>,
    semantics: Semantics,
}

impl Batch {
    /// An empty batch under relaxed/best-effort/lazy semantics.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty batch under the given semantics template.
    pub fn with_semantics(semantics: Semantics) -> Self {
        Self {
            operations: Vec::new(),
            semantics,
        }
    }

    /// The semantics this batch was created with.
    pub fn semantics(&self) -> Semantics {
        self.semantics
    }

    /// Append an operation. Not part of the public client surface — callers
    /// go through `Scheme`/`Record`/`Search`'s methods, which push the
    /// correctly-tagged variant.
    pub(crate) fn push(&mut self, op: Operation) {
        self.operations.push(op);
    }

    /// Number of enqueued operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether no operations have been enqueued.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Iterate the enqueued operations in order.
    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }

    /// Drain the enqueued operations in order, leaving the batch empty.
    ///
    /// Dispatch engines consume a batch exactly once; this lets `execute`
    /// take ownership of the operation list while the `Batch` handle itself
    /// (and its semantics) stays usable for diagnostics after the call.
    pub fn drain(&mut self) -> Vec<Operation> {
        std::mem::take(&mut self.operations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::Scheme;

    #[test]
    fn push_and_drain_preserve_order() {
        let mut batch = Batch::new();
        let s1 = Scheme::new("a").unwrap();
        let s2 = Scheme::new("b").unwrap();
        s1.apply(&mut batch);
        s2.apply(&mut batch);
        assert_eq!(batch.len(), 2);
        let drained = batch.drain();
        assert!(batch.is_empty());
        assert_eq!(drained.len(), 2);
        assert!(matches!(drained[0], Operation::ApplyScheme(_)));
        assert!(matches!(drained[1], Operation::ApplyScheme(_)));
    }

    #[test]
    fn default_semantics_are_relaxed_best_effort_lazy() {
        let batch = Batch::new();
        assert_eq!(batch.semantics().consistency, Consistency::Relaxed);
        assert_eq!(batch.semantics().safety, Safety::BestEffort);
        assert_eq!(batch.semantics().persistency, Persistency::Lazy);
    }
}
