//! Predicate-based lookup against a namespace.
//!
//! Search is out of scope for this subsystem's dispatch contract: a
//! `Search` records its predicates and can be enqueued into a [`Batch`]
//! like any other operation, but execution always returns zero results.
//! The surface exists so callers compile against the full client API; the
//! cursor methods below are its inert tail.

use std::sync::Arc;

use parking_lot::Mutex;

use smd_doc::{Document, Value};
use smd_types::Tag;

use crate::batch::{Batch, Operation};
use crate::record::Record;
use crate::scheme::Scheme;

#[derive(Debug)]
struct SearchData {
    scheme: Scheme,
    predicates: Document,
    results: Vec<Record>,
    cursor: usize,
    executed: bool,
}

/// A predicate-based query against a namespace's records.
#[derive(Debug, Clone)]
pub struct Search(Arc<Mutex<SearchData>>);

macro_rules! predicate_setter {
    ($name:ident, $ty:ty, $tag:expr, $to_value:expr) => {
        #[doc = concat!("Constrain `", stringify!($ty), "`-typed field `name` to `value`.")]
        pub fn $name(&self, name: &str, value: $ty) -> bool {
            self.set_predicate(name, $tag, $to_value(value))
        }
    };
}

impl Search {
    /// Start a new, predicate-free search over `scheme`'s namespace.
    pub fn new(scheme: &Scheme) -> Self {
        Self(Arc::new(Mutex::new(SearchData {
            scheme: scheme.clone(),
            predicates: Document::new(),
            results: Vec::new(),
            cursor: 0,
            executed: false,
        })))
    }

    fn set_predicate(&self, name: &str, expected: Tag, value: Value) -> bool {
        let declared = self.0.lock().scheme.field_get(name);
        if declared != expected {
            return false;
        }
        self.0.lock().predicates.set(name, value);
        true
    }

    predicate_setter!(field_set_int, i64, Tag::Int, |v: i64| Value::I64(v));
    predicate_setter!(field_set_int8, i8, Tag::Int8, |v: i8| Value::I64(v as i64));
    predicate_setter!(field_set_int16, i16, Tag::Int16, |v: i16| Value::I64(v as i64));
    predicate_setter!(field_set_int32, i32, Tag::Int32, |v: i32| Value::I64(v as i64));
    predicate_setter!(field_set_int64, i64, Tag::Int64, |v: i64| Value::I64(v));
    predicate_setter!(field_set_uint8, u8, Tag::UInt8, |v: u8| Value::I64(v as i64));
    predicate_setter!(field_set_uint16, u16, Tag::UInt16, |v: u16| Value::I64(v as i64));
    predicate_setter!(field_set_uint32, u32, Tag::UInt32, |v: u32| Value::I64(v as i64));
    predicate_setter!(field_set_float, f64, Tag::Float, |v: f64| Value::F64(v));
    predicate_setter!(field_set_float16, f32, Tag::Float16, |v: f32| Value::F64(v as f64));
    predicate_setter!(field_set_float32, f32, Tag::Float32, |v: f32| Value::F64(v as f64));
    predicate_setter!(field_set_float64, f64, Tag::Float64, |v: f64| Value::F64(v));
    predicate_setter!(field_set_text, &str, Tag::Text, |v: &str| Value::Utf8(v.to_string()));

    /// Constrain the 128-bit float field `name` to `value`'s raw
    /// little-endian bytes.
    pub fn field_set_float128(&self, name: &str, value: [u8; 16]) -> bool {
        self.set_predicate(name, Tag::Float128, Value::Binary(value.to_vec()))
    }

    /// Constrain the 256-bit float field `name` to `value`'s raw
    /// little-endian bytes.
    pub fn field_set_float256(&self, name: &str, value: [u8; 32]) -> bool {
        self.set_predicate(name, Tag::Float256, Value::Binary(value.to_vec()))
    }

    /// Constrain the 128-bit integer field `name` to `value`'s raw
    /// little-endian bytes.
    pub fn field_set_int128(&self, name: &str, value: i128) -> bool {
        self.set_predicate(name, Tag::Int128, Value::Binary(value.to_le_bytes().to_vec()))
    }

    /// Constrain the unsigned, default-width field `name` to `value`.
    pub fn field_set_uint(&self, name: &str, value: u64) -> bool {
        self.set_predicate(name, Tag::UInt, Value::Binary(value.to_le_bytes().to_vec()))
    }

    /// Constrain the 64-bit unsigned field `name` to `value`.
    pub fn field_set_uint64(&self, name: &str, value: u64) -> bool {
        self.set_predicate(name, Tag::UInt64, Value::Binary(value.to_le_bytes().to_vec()))
    }

    /// Constrain the 128-bit unsigned field `name` to `value`.
    pub fn field_set_uint128(&self, name: &str, value: u128) -> bool {
        self.set_predicate(name, Tag::UInt128, Value::Binary(value.to_le_bytes().to_vec()))
    }

    /// Constrain the date-time field `name` to `value` (ISO-8601 with
    /// offset, as [`crate::record::Record::set_date_time`] accepts).
    pub fn field_set_date_time(&self, name: &str, value: &str) -> bool {
        self.set_predicate(name, Tag::DateTime, Value::Utf8(value.to_string()))
    }

    /// The scheme this search is bound to.
    pub fn scheme(&self) -> Scheme {
        self.0.lock().scheme.clone()
    }

    /// Enqueue this search to run as part of `batch`.
    pub fn execute(&self, batch: &mut Batch) {
        batch.push(Operation::Search(self.clone()));
    }

    /// Mark this search as having run, with no matches.
    ///
    /// Called by the dispatch engine once a `Search` operation's (always
    /// empty) reply has been processed; never produces results, per this
    /// module's inert-plumbing contract.
    pub fn install_results(&self) {
        let mut data = self.0.lock();
        data.results = Vec::new();
        data.cursor = 0;
        data.executed = true;
    }

    /// Number of matching records. Always `0`.
    pub fn num_results(&self) -> u64 {
        self.0.lock().results.len() as u64
    }

    /// The record at the current cursor position, if any. Always `None`.
    pub fn cur_item(&self) -> Option<Record> {
        let data = self.0.lock();
        data.results.get(data.cursor).cloned()
    }

    /// Advance the cursor to the next result. Always `false`: the cursor
    /// starts, and remains, exhausted.
    pub fn iterate(&self) -> bool {
        let mut data = self.0.lock();
        if data.cursor + 1 < data.results.len() {
            data.cursor += 1;
            true
        } else {
            false
        }
    }

    /// Whether `execute` has run for this handle.
    pub fn has_executed(&self) -> bool {
        self.0.lock().executed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicate_setter_rejects_undeclared_or_mistyped_field() {
        let scheme = Scheme::new("ns").unwrap();
        scheme.field_add("name", Tag::Text);
        let search = Search::new(&scheme);
        assert!(!search.field_set_int("name", 1));
        assert!(!search.field_set_text("missing", "x"));
        assert!(search.field_set_text("name", "Romeo"));
    }

    #[test]
    fn execution_is_always_empty() {
        let scheme = Scheme::new("ns").unwrap();
        scheme.field_add("name", Tag::Text);
        let search = Search::new(&scheme);
        search.field_set_text("name", "Romeo");
        let mut batch = Batch::new();
        search.execute(&mut batch);
        assert_eq!(batch.len(), 1);

        search.install_results();
        assert!(search.has_executed());
        assert_eq!(search.num_results(), 0);
        assert!(search.cur_item().is_none());
        assert!(!search.iterate());
    }
}
