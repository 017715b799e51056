//! The typed column declaration bound to a namespace.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use smd_doc::{Document, Value};
use smd_types::Tag;
use thiserror::Error;

use crate::batch::{Batch, Operation};

/// The field name `Record` values are keyed by; it is reserved and may not
/// be declared as a scheme field.
pub const RESERVED_KEY_FIELD: &str = "key";

/// A failure constructing or decoding a [`Scheme`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchemeError {
    /// The namespace string was empty.
    #[error("scheme namespace must not be empty")]
    EmptyNamespace,
    /// The scheme document named a type code this registry does not
    /// recognize. Unrecognized tags are a fatal error for the receiver.
    #[error("scheme document references unrecognized type code {0}")]
    UnrecognizedTypeCode(i64),
    /// A scheme document member was not an integer type code.
    #[error("scheme document field `{0}` did not carry an integer type code")]
    MalformedTypeCode(String),
}

#[derive(Debug)]
struct SchemeData {
    namespace: String,
    fields: IndexMap<String, Tag>,
    applied: bool,
}

/// A namespace's column declaration.
///
/// `Scheme` is a cheap, `Clone`-able handle over shared state: the
/// client-held handle and the operation enqueued into a [`Batch`] are the
/// same underlying scheme, so that a `get(batch)` reply can be written back
/// into the handle the caller still holds.
#[derive(Debug, Clone)]
pub struct Scheme(Arc<Mutex<SchemeData>>);

impl PartialEq for Scheme {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Scheme {
    /// Create a fresh scheme with zero fields.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::EmptyNamespace`] if `namespace` is empty.
    pub fn new(namespace: impl Into<String>) -> Result<Self, SchemeError> {
        let namespace = namespace.into();
        if namespace.is_empty() {
            return Err(SchemeError::EmptyNamespace);
        }
        Ok(Self(Arc::new(Mutex::new(SchemeData {
            namespace,
            fields: IndexMap::new(),
            applied: false,
        }))))
    }

    /// The namespace this scheme is bound to.
    pub fn namespace(&self) -> String {
        self.0.lock().namespace.clone()
    }

    /// Append a column.
    ///
    /// Fails (returning `false`, leaving the scheme unchanged) if `name` is
    /// the reserved name `"key"`, `name` is already declared, or `ty` is not
    /// a storable type.
    pub fn field_add(&self, name: impl Into<String>, ty: Tag) -> bool {
        let name = name.into();
        if name == RESERVED_KEY_FIELD || !smd_types::is_valid(ty) {
            return false;
        }
        let mut data = self.0.lock();
        if data.fields.contains_key(&name) {
            return false;
        }
        data.fields.insert(name, ty);
        true
    }

    /// The declared type of `name`, or [`Tag::Unknown`] if absent.
    pub fn field_get(&self, name: &str) -> Tag {
        self.0
            .lock()
            .fields
            .get(name)
            .copied()
            .unwrap_or(Tag::Unknown)
    }

    /// Declared fields, in declaration order.
    pub fn fields(&self) -> Vec<(String, Tag)> {
        self.0
            .lock()
            .fields
            .iter()
            .map(|(n, t)| (n.clone(), *t))
            .collect()
    }

    /// Whether `apply` has already succeeded for this handle.
    ///
    /// A namespace may be applied at most once successfully; this
    /// flag is set only by a successful write-back from a dispatched
    /// apply-scheme reply, not merely by calling [`Scheme::apply`].
    pub fn is_applied(&self) -> bool {
        self.0.lock().applied
    }

    /// Mark this handle as successfully applied.
    ///
    /// Called by dispatch engines once an `ApplyScheme` operation's reply
    /// confirms success; not part of the ordinary client surface.
    pub fn mark_applied(&self) {
        self.0.lock().applied = true;
    }

    /// Encode this scheme's fields as the ordered `(name, type_tag)`
    /// document exchanged with a backend.
    pub fn to_document(&self) -> Document {
        let data = self.0.lock();
        let mut doc = Document::new();
        for (name, tag) in &data.fields {
            let code = smd_types::tag_to_code(*tag).expect("declared fields are always valid types");
            doc.insert(name.clone(), Value::I64(code))
                .expect("scheme field names are unique by construction");
        }
        doc
    }

    /// Replace this handle's fields with those decoded from `doc` (the
    /// write-back a `get(batch)` reply performs).
    ///
    /// Called by dispatch engines; not part of the ordinary client surface.
    pub fn install_from_document(&self, doc: &Document) -> Result<(), SchemeError> {
        let mut fields = IndexMap::new();
        for (name, value) in doc.iter() {
            let code = match value {
                Value::I64(code) => *code,
                _ => return Err(SchemeError::MalformedTypeCode(name.to_string())),
            };
            let tag = smd_types::code_to_tag(code).ok_or(SchemeError::UnrecognizedTypeCode(code))?;
            fields.insert(name.to_string(), tag);
        }
        let mut data = self.0.lock();
        data.fields = fields;
        data.applied = true;
        Ok(())
    }

    /// Enqueue an apply-scheme operation.
    pub fn apply(&self, batch: &mut Batch) {
        batch.push(Operation::ApplyScheme(self.clone()));
    }

    /// Enqueue a get-scheme operation; on a successful reply this handle's
    /// fields are replaced with the ones retrieved from the backend.
    pub fn get(&self, batch: &mut Batch) {
        batch.push(Operation::GetScheme(self.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_namespace() {
        assert_eq!(Scheme::new(""), Err(SchemeError::EmptyNamespace));
    }

    #[test]
    fn field_add_rejects_reserved_name_and_duplicates() {
        let scheme = Scheme::new("ns").unwrap();
        assert!(!scheme.field_add("key", Tag::Text));
        assert!(scheme.field_add("name", Tag::Text));
        assert!(!scheme.field_add("name", Tag::Int));
        assert_eq!(scheme.field_get("name"), Tag::Text);
    }

    #[test]
    fn field_add_rejects_invalid_type() {
        let scheme = Scheme::new("ns").unwrap();
        assert!(!scheme.field_add("x", Tag::Unknown));
        assert!(!scheme.field_add("x", Tag::Invalid));
    }

    #[test]
    fn field_get_on_absent_field_is_unknown() {
        let scheme = Scheme::new("ns").unwrap();
        assert_eq!(scheme.field_get("nope"), Tag::Unknown);
    }

    #[test]
    fn to_document_preserves_declaration_order() {
        let scheme = Scheme::new("ns").unwrap();
        scheme.field_add("b", Tag::Int);
        scheme.field_add("a", Tag::Text);
        let doc = scheme.to_document();
        let names: Vec<_> = doc.iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn document_round_trip_is_byte_identical() {
        let scheme = Scheme::new("ns").unwrap();
        scheme.field_add("name", Tag::Text);
        scheme.field_add("loc", Tag::Int);
        scheme.field_add("coverage", Tag::Float);
        scheme.field_add("lastrun", Tag::DateTime);

        let doc = scheme.to_document();
        let encoded = doc.encode();
        let decoded = Document::decode(&encoded).unwrap();
        assert_eq!(encoded, decoded.encode());

        let fresh = Scheme::new("ns").unwrap();
        fresh.install_from_document(&decoded).unwrap();
        assert_eq!(fresh.fields(), scheme.fields());
    }

    #[test]
    fn install_from_document_rejects_unrecognized_code() {
        let scheme = Scheme::new("ns").unwrap();
        let mut doc = Document::new();
        doc.insert("x", Value::I64(9999)).unwrap();
        assert_eq!(
            scheme.install_from_document(&doc),
            Err(SchemeError::UnrecognizedTypeCode(9999))
        );
    }
}
