//! The capability interface every storage backend implements.
//!
//! Modeled as an object-safe async trait: a constructor (backend-specific,
//! since there is no one shape of "open" that fits every backend), an
//! explicit async teardown method (`Drop` cannot run async code), and the
//! scheme/record operations. Search results stream through a single
//! [`Cursor`] trait whose `next` returns `Result<Option<Document>,
//! BackendError>`, folding iteration and error-reporting into one call.

#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

use async_trait::async_trait;
use smd_doc::Document;
use smd_types::Tag;
use thiserror::Error;

/// What a backend should do when asked to delete a key that does not
/// exist. The original source checks its arguments but never consults the
/// backend on this question; this registry makes the choice an explicit,
/// per-backend policy instead of leaving it implementation-defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletePolicy {
    /// Deleting an absent key succeeds with no effect.
    #[default]
    Idempotent,
    /// Deleting an absent key fails with [`BackendError::KeyNotFound`].
    Strict,
}

/// A failure reported by a backend operation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BackendError {
    /// `apply_scheme` was never called (successfully) for this namespace.
    #[error("namespace `{0}` has no applied scheme")]
    UnknownNamespace(String),
    /// `apply_scheme` was called twice for the same namespace.
    #[error("namespace `{0}` already has an applied scheme")]
    SchemeAlreadyApplied(String),
    /// `insert` was called with a key that already exists in the namespace.
    #[error("key `{key}` already exists in namespace `{namespace}`")]
    DuplicateKey {
        /// The namespace the insert targeted.
        namespace: String,
        /// The key that already existed.
        key: String,
    },
    /// `get`/`update`/`delete` (under [`DeletePolicy::Strict`]) targeted a
    /// key that does not exist.
    #[error("key `{key}` not found in namespace `{namespace}`")]
    KeyNotFound {
        /// The namespace the lookup targeted.
        namespace: String,
        /// The key that was not found.
        key: String,
    },
    /// A value's declared type did not match the scheme's declared type
    /// for that field.
    #[error("field `{field}` expects type {expected:?}, got value of a different type")]
    TypeMismatch {
        /// The field whose value disagreed with the scheme.
        field: String,
        /// The type the scheme declares for `field`.
        expected: Tag,
    },
    /// `insert`/`update` supplied a value for a field the namespace's
    /// scheme does not declare.
    #[error("field `{field}` is not declared in namespace `{namespace}`'s scheme")]
    UnknownColumn {
        /// The namespace whose scheme was consulted.
        namespace: String,
        /// The undeclared field name.
        field: String,
    },
    /// The underlying storage engine reported a failure (I/O, constraint
    /// violation not covered by a more specific variant, etc).
    #[error("storage engine error: {0}")]
    Storage(String),
}

/// A lazy, finite, single-pass, non-restartable sequence of documents,
/// folding iteration and error-reporting into a single fallible call.
#[async_trait]
pub trait Cursor: Send {
    /// Advance and return the next matching document, or `None` once the
    /// cursor is exhausted. A deferred failure surfaces here as `Err`
    /// rather than through a separate `error()` call.
    async fn next(&mut self) -> Result<Option<Document>, BackendError>;
}

/// An exhausted cursor that never yields a document — the one `Cursor`
/// implementation `smd-backend` itself provides, used by any backend whose
/// `search` has nothing to stream.
#[derive(Debug, Default)]
pub struct EmptyCursor;

#[async_trait]
impl Cursor for EmptyCursor {
    async fn next(&mut self) -> Result<Option<Document>, BackendError> {
        Ok(None)
    }
}

/// The capability contract a storage backend provides to the dispatch
/// engine. Implementors own exactly one shard's worth of state.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Declare `namespace`'s columns.
    ///
    /// # Errors
    ///
    /// [`BackendError::SchemeAlreadyApplied`] if `namespace` already has a
    /// scheme (a namespace may be applied at most once).
    async fn apply_scheme(&self, namespace: &str, fields: &[(String, Tag)]) -> Result<(), BackendError>;

    /// Retrieve `namespace`'s previously-applied column declaration, in
    /// declaration order.
    ///
    /// # Errors
    ///
    /// [`BackendError::UnknownNamespace`] if `apply_scheme` was never
    /// called for `namespace`.
    async fn get_scheme(&self, namespace: &str) -> Result<Vec<(String, Tag)>, BackendError>;

    /// Insert a new record.
    ///
    /// # Errors
    ///
    /// [`BackendError::UnknownNamespace`], [`BackendError::DuplicateKey`],
    /// or [`BackendError::TypeMismatch`].
    async fn insert(&self, namespace: &str, key: &str, values: &Document) -> Result<(), BackendError>;

    /// Overwrite fields on an existing record. Fields not present in
    /// `values` are left untouched.
    ///
    /// # Errors
    ///
    /// [`BackendError::UnknownNamespace`], [`BackendError::KeyNotFound`],
    /// or [`BackendError::TypeMismatch`].
    async fn update(&self, namespace: &str, key: &str, values: &Document) -> Result<(), BackendError>;

    /// Remove a record.
    ///
    /// # Errors
    ///
    /// [`BackendError::UnknownNamespace`], or [`BackendError::KeyNotFound`]
    /// if the backend's [`DeletePolicy`] is [`DeletePolicy::Strict`] and
    /// `key` does not exist.
    async fn delete(&self, namespace: &str, key: &str) -> Result<(), BackendError>;

    /// Retrieve a record's current values.
    ///
    /// # Errors
    ///
    /// [`BackendError::UnknownNamespace`] or [`BackendError::KeyNotFound`].
    async fn get(&self, namespace: &str, key: &str) -> Result<Document, BackendError>;

    /// Run a predicate-based search. No query language or secondary index
    /// is implemented; every backend may return an [`EmptyCursor`].
    async fn search(&self, namespace: &str, predicates: &Document) -> Result<Box<dyn Cursor>, BackendError>;

    /// Close the backend. Idempotent; safe to call on an already-closed
    /// backend.
    async fn fini(&self) -> Result<(), BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_cursor_is_immediately_exhausted() {
        let mut cursor = EmptyCursor;
        assert_eq!(cursor.next().await.unwrap(), None);
    }

    #[test]
    fn delete_policy_defaults_to_idempotent() {
        assert_eq!(DeletePolicy::default(), DeletePolicy::Idempotent);
    }
}
