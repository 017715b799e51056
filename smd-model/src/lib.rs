//! Client object model: [`Scheme`], [`Record`], [`Search`], and the
//! [`Batch`] they are dispatched through.
//!
//! This crate is deliberately backend- and transport-agnostic: it knows how
//! to build up and validate scheme/record/search state and how to enqueue
//! operations, but actually running a batch against a backend or a remote
//! connection is the dispatch engine's job (see the `smd-dispatch` crate).

#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

mod batch;
mod record;
mod scheme;
mod search;

pub use batch::{Batch, Consistency, Operation, Persistency, Safety, Semantics};
pub use record::{Record, RecordError};
pub use scheme::{Scheme, SchemeError, RESERVED_KEY_FIELD};
pub use search::Search;
