//! One row: a namespace, a string key, and per-field values bound to a
//! [`Scheme`].

use std::sync::Arc;

use parking_lot::Mutex;

use chrono::{DateTime, FixedOffset};
use smd_doc::{Document, Value};
use smd_types::Tag;
use thiserror::Error;

use crate::batch::{Batch, Operation};
use crate::scheme::Scheme;

/// A failure constructing a [`Record`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecordError {
    /// The key string was empty.
    #[error("record key must not be empty")]
    EmptyKey,
}

#[derive(Debug)]
struct RecordData {
    namespace: String,
    key: String,
    scheme: Scheme,
    values: Document,
}

/// One record: a namespace, a key, a bound [`Scheme`], and the fields the
/// caller has set.
///
/// Like [`Scheme`], `Record` is a cheap `Clone`-able handle over shared
/// state, so that a `get(batch)` reply can be written back into the same
/// handle the caller enqueued.
#[derive(Debug, Clone)]
pub struct Record(Arc<Mutex<RecordData>>);

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// The ISO-8601 extended format (with UTC offset) date-time values are
/// exchanged in: `YYYY-MM-DD HH:MM:SS±HH:MM`.
const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";

macro_rules! int_setter {
    ($name:ident, $ty:ty, $tag:expr) => {
        #[doc = concat!("Set a `", stringify!($ty), "`-typed field.")]
        ///
        /// Fails (leaving the record unchanged) if `name` is not declared
        /// with this setter's type.
        pub fn $name(&self, name: &str, value: $ty) -> bool {
            self.set_checked(name, $tag, || Value::I64(value as i64))
        }
    };
}

macro_rules! int_getter {
    ($name:ident, $ty:ty) => {
        #[doc = concat!("Read a `", stringify!($ty), "`-typed field, or `None` if absent or the wrong type.")]
        pub fn $name(&self, name: &str) -> Option<$ty> {
            match self.0.lock().values.get(name) {
                Some(Value::I64(v)) => (*v).try_into().ok(),
                _ => None,
            }
        }
    };
}

macro_rules! blob_setter {
    ($name:ident, $ty:ty, $tag:expr, $to_bytes:expr) => {
        #[doc = concat!("Set a `", stringify!($ty), "`-typed (fixed-width binary) field.")]
        pub fn $name(&self, name: &str, value: $ty) -> bool {
            let bytes: Vec<u8> = $to_bytes(value);
            self.set_checked(name, $tag, || Value::Binary(bytes))
        }
    };
}

macro_rules! blob_getter {
    ($name:ident, $ty:ty, $width:expr, $from_bytes:expr) => {
        #[doc = concat!("Read a `", stringify!($ty), "`-typed field, or `None` if absent, the wrong type, or the wrong width.")]
        pub fn $name(&self, name: &str) -> Option<$ty> {
            match self.0.lock().values.get(name) {
                Some(Value::Binary(b)) if b.len() == $width => Some($from_bytes(b)),
                _ => None,
            }
        }
    };
}

impl Record {
    /// Pin a reference to `scheme` and create a new, empty-valued record.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::EmptyKey`] if `key` is empty.
    pub fn new(scheme: &Scheme, key: impl Into<String>) -> Result<Self, RecordError> {
        let key = key.into();
        if key.is_empty() {
            return Err(RecordError::EmptyKey);
        }
        Ok(Self(Arc::new(Mutex::new(RecordData {
            namespace: scheme.namespace(),
            key,
            scheme: scheme.clone(),
            values: Document::new(),
        }))))
    }

    /// The namespace this record belongs to.
    pub fn namespace(&self) -> String {
        self.0.lock().namespace.clone()
    }

    /// The record's key.
    pub fn key(&self) -> String {
        self.0.lock().key.clone()
    }

    /// The scheme this record is bound to.
    pub fn scheme(&self) -> Scheme {
        self.0.lock().scheme.clone()
    }

    /// The currently-set values, as a document (used by the dispatch engine
    /// to build insert/update operation payloads).
    pub fn values(&self) -> Document {
        self.0.lock().values.clone()
    }

    /// Replace this handle's values with those decoded from a `get` reply.
    ///
    /// Called by dispatch engines; not part of the ordinary client surface.
    pub fn install_values(&self, doc: Document) {
        self.0.lock().values = doc;
    }

    /// Checks `name` is declared with type `expected` before overwriting its
    /// value with whatever `make_value` produces. Returns `false`, leaving
    /// the record unchanged, on any check failure.
    fn set_checked(&self, name: &str, expected: Tag, make_value: impl FnOnce() -> Value) -> bool {
        let declared = self.0.lock().scheme.field_get(name);
        if declared != expected {
            return false;
        }
        self.0.lock().values.set(name, make_value());
        true
    }

    int_setter!(set_int, i64, Tag::Int);
    int_setter!(set_int8, i8, Tag::Int8);
    int_setter!(set_int16, i16, Tag::Int16);
    int_setter!(set_int32, i32, Tag::Int32);
    int_setter!(set_int64, i64, Tag::Int64);
    int_setter!(set_uint8, u8, Tag::UInt8);
    int_setter!(set_uint16, u16, Tag::UInt16);
    int_setter!(set_uint32, u32, Tag::UInt32);

    int_getter!(get_int, i64);
    int_getter!(get_int8, i8);
    int_getter!(get_int16, i16);
    int_getter!(get_int32, i32);
    int_getter!(get_int64, i64);
    int_getter!(get_uint8, u8);
    int_getter!(get_uint16, u16);
    int_getter!(get_uint32, u32);

    /// Set a default-width floating point field.
    pub fn set_float(&self, name: &str, value: f64) -> bool {
        self.set_checked(name, Tag::Float, || Value::F64(value))
    }
    /// Set a 16-bit floating point field (widened to `f64` for storage; see
    /// the storage-class table — float16 rides the double column).
    pub fn set_float16(&self, name: &str, value: f32) -> bool {
        self.set_checked(name, Tag::Float16, || Value::F64(value as f64))
    }
    /// Set a 32-bit floating point field.
    pub fn set_float32(&self, name: &str, value: f32) -> bool {
        self.set_checked(name, Tag::Float32, || Value::F64(value as f64))
    }
    /// Set a 64-bit floating point field.
    pub fn set_float64(&self, name: &str, value: f64) -> bool {
        self.set_checked(name, Tag::Float64, || Value::F64(value))
    }

    /// Read a default-width floating point field.
    pub fn get_float(&self, name: &str) -> Option<f64> {
        self.get_f64_raw(name)
    }
    /// Read a 16-bit floating point field.
    pub fn get_float16(&self, name: &str) -> Option<f32> {
        self.get_f64_raw(name).map(|v| v as f32)
    }
    /// Read a 32-bit floating point field.
    pub fn get_float32(&self, name: &str) -> Option<f32> {
        self.get_f64_raw(name).map(|v| v as f32)
    }
    /// Read a 64-bit floating point field.
    pub fn get_float64(&self, name: &str) -> Option<f64> {
        self.get_f64_raw(name)
    }

    fn get_f64_raw(&self, name: &str) -> Option<f64> {
        match self.0.lock().values.get(name) {
            Some(Value::F64(v)) => Some(*v),
            _ => None,
        }
    }

    /// Set a UTF-8 text field.
    pub fn set_text(&self, name: &str, value: impl Into<String>) -> bool {
        let value = value.into();
        self.set_checked(name, Tag::Text, || Value::Utf8(value))
    }

    /// Read a UTF-8 text field.
    pub fn get_text(&self, name: &str) -> Option<String> {
        match self.0.lock().values.get(name) {
            Some(Value::Utf8(s)) => Some(s.clone()),
            _ => None,
        }
    }

    /// Set a date-time field. `value` must parse as ISO-8601 extended with
    /// an explicit UTC offset (`YYYY-MM-DD HH:MM:SS±HH:MM`); it is
    /// normalized before storage so later reads are directly comparable.
    ///
    /// Returns `false` (leaving the record unchanged) if `name` is not
    /// declared as `DateTime`, or `value` does not parse.
    pub fn set_date_time(&self, name: &str, value: &str) -> bool {
        let parsed = match DateTime::parse_from_str(value, DATE_TIME_FORMAT) {
            Ok(dt) => dt,
            Err(_) => return false,
        };
        self.set_checked(name, Tag::DateTime, || Value::Utf8(format_date_time(&parsed)))
    }

    /// Read a date-time field as its normalized ISO-8601 string.
    pub fn get_date_time(&self, name: &str) -> Option<String> {
        self.get_text(name)
    }

    blob_setter!(set_int128, i128, Tag::Int128, |v: i128| v.to_le_bytes().to_vec());
    blob_getter!(get_int128, i128, 16, |b: &Vec<u8>| i128::from_le_bytes(b.as_slice().try_into().unwrap()));

    blob_setter!(set_uint, u64, Tag::UInt, |v: u64| v.to_le_bytes().to_vec());
    blob_getter!(get_uint, u64, 8, |b: &Vec<u8>| u64::from_le_bytes(b.as_slice().try_into().unwrap()));

    blob_setter!(set_uint64, u64, Tag::UInt64, |v: u64| v.to_le_bytes().to_vec());
    blob_getter!(get_uint64, u64, 8, |b: &Vec<u8>| u64::from_le_bytes(b.as_slice().try_into().unwrap()));

    blob_setter!(set_uint128, u128, Tag::UInt128, |v: u128| v.to_le_bytes().to_vec());
    blob_getter!(get_uint128, u128, 16, |b: &Vec<u8>| u128::from_le_bytes(b.as_slice().try_into().unwrap()));

    /// Set a 128-bit floating point field from its raw little-endian bytes
    /// (no native `f128` exists in `std`; callers carry the bit pattern).
    pub fn set_float128(&self, name: &str, value: [u8; 16]) -> bool {
        self.set_checked(name, Tag::Float128, || Value::Binary(value.to_vec()))
    }
    /// Read a 128-bit floating point field's raw little-endian bytes.
    pub fn get_float128(&self, name: &str) -> Option<[u8; 16]> {
        match self.0.lock().values.get(name) {
            Some(Value::Binary(b)) if b.len() == 16 => Some(b.as_slice().try_into().unwrap()),
            _ => None,
        }
    }

    /// Set a 256-bit floating point field from its raw little-endian bytes.
    pub fn set_float256(&self, name: &str, value: [u8; 32]) -> bool {
        self.set_checked(name, Tag::Float256, || Value::Binary(value.to_vec()))
    }
    /// Read a 256-bit floating point field's raw little-endian bytes.
    pub fn get_float256(&self, name: &str) -> Option<[u8; 32]> {
        match self.0.lock().values.get(name) {
            Some(Value::Binary(b)) if b.len() == 32 => Some(b.as_slice().try_into().unwrap()),
            _ => None,
        }
    }

    /// Enqueue an insert operation.
    pub fn insert(&self, batch: &mut Batch) {
        batch.push(Operation::Insert(self.clone()));
    }
    /// Enqueue a get operation; on a successful reply this handle's values
    /// are replaced with the ones retrieved from the backend.
    pub fn get(&self, batch: &mut Batch) {
        batch.push(Operation::Get(self.clone()));
    }
    /// Enqueue an update operation.
    pub fn update(&self, batch: &mut Batch) {
        batch.push(Operation::Update(self.clone()));
    }
    /// Enqueue a delete operation.
    pub fn delete(&self, batch: &mut Batch) {
        batch.push(Operation::Delete(self.clone()));
    }
}

fn format_date_time(dt: &DateTime<FixedOffset>) -> String {
    dt.format(DATE_TIME_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme_with(fields: &[(&str, Tag)]) -> Scheme {
        let scheme = Scheme::new("ns").unwrap();
        for (name, tag) in fields {
            assert!(scheme.field_add(*name, *tag));
        }
        scheme
    }

    #[test]
    fn rejects_empty_key() {
        let scheme = scheme_with(&[]);
        assert_eq!(Record::new(&scheme, ""), Err(RecordError::EmptyKey));
    }

    #[test]
    fn setter_rejects_undeclared_field() {
        let scheme = scheme_with(&[("name", Tag::Text)]);
        let record = Record::new(&scheme, "k").unwrap();
        assert!(!record.set_int("missing", 1));
    }

    #[test]
    fn mismatched_type_setter_does_not_modify_record() {
        let scheme = scheme_with(&[("name", Tag::Text)]);
        let record = Record::new(&scheme, "k").unwrap();
        assert!(record.set_text("name", "Romeo"));
        assert!(!record.set_int("name", 5));
        assert_eq!(record.get_text("name"), Some("Romeo".to_string()));
    }

    #[test]
    fn typed_round_trip_for_each_family() {
        let scheme = scheme_with(&[
            ("a", Tag::Int),
            ("b", Tag::UInt64),
            ("c", Tag::Float),
            ("d", Tag::Text),
            ("e", Tag::DateTime),
            ("f", Tag::Int128),
            ("g", Tag::Float256),
        ]);
        let record = Record::new(&scheme, "k").unwrap();
        assert!(record.set_int("a", 42));
        assert!(record.set_uint64("b", 9_000_000_000));
        assert!(record.set_float("c", 3.14159));
        assert!(record.set_text("d", "Romeo"));
        assert!(record.set_date_time("e", "2000-01-01 21:42:42+02:00"));
        assert!(record.set_int128("f", -12345));
        assert!(record.set_float256("g", [7u8; 32]));

        assert_eq!(record.get_int("a"), Some(42));
        assert_eq!(record.get_uint64("b"), Some(9_000_000_000));
        assert!((record.get_float("c").unwrap() - 3.14159).abs() < 1e-9);
        assert_eq!(record.get_text("d"), Some("Romeo".to_string()));
        assert_eq!(record.get_date_time("e"), Some("2000-01-01 21:42:42+02:00".to_string()));
        assert_eq!(record.get_int128("f"), Some(-12345));
        assert_eq!(record.get_float256("g"), Some([7u8; 32]));
    }

    #[test]
    fn date_time_rejects_malformed_input() {
        let scheme = scheme_with(&[("t", Tag::DateTime)]);
        let record = Record::new(&scheme, "k").unwrap();
        assert!(!record.set_date_time("t", "not a date"));
        assert!(!record.set_date_time("t", "2000-01-01 21:42:42")); // missing offset
    }

    #[test]
    fn update_leaves_unmentioned_fields_untouched() {
        let scheme = scheme_with(&[("a", Tag::Int), ("b", Tag::Text)]);
        let record = Record::new(&scheme, "k").unwrap();
        record.set_int("a", 1);
        record.set_text("b", "x");
        // Simulate reloading from storage after a partial update: the
        // values document already present is just extended, not replaced,
        // by the setters — this is the client-side half of the contract;
        // the backend half is exercised in smd-sql-backend.
        record.set_text("b", "y");
        assert_eq!(record.get_int("a"), Some(1));
        assert_eq!(record.get_text("b"), Some("y".to_string()));
    }
}
