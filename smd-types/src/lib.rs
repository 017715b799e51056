//! The SMD column type registry.
//!
//! Every recognized column type is registered exactly once in [`TYPE_TABLE`].
//! [`Tag`], the name lookups, and the storage-class mapping are all derived
//! from that single table, rather than declared independently of one
//! another — the usual way this goes wrong is a type added to the enum but
//! never taught to the name lookup or the DDL mapping.

#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

/// A closed enumeration of the column types a [`Scheme`](#scheme) field may
/// declare.
///
/// `Invalid` and `Unknown` are non-storable sentinels, kept distinct per the
/// original source's two sentinel tags: `Unknown` means "the type name
/// string was not recognized" (client-side, [`type_from_name`]), `Invalid`
/// means "a value arrived with the wrong document source kind for its
/// declared type" (detected during decode, not during name lookup).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Tag {
    /// Sentinel: the decoded value had the wrong document source kind.
    Invalid,
    /// Sentinel: the type name string was not recognized.
    Unknown,
    /// Platform-default signed integer width (stored as a 64-bit column).
    Int,
    /// 8-bit signed integer.
    Int8,
    /// 16-bit signed integer.
    Int16,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 128-bit signed integer.
    Int128,
    /// Platform-default unsigned integer width.
    UInt,
    /// 8-bit unsigned integer.
    UInt8,
    /// 16-bit unsigned integer.
    UInt16,
    /// 32-bit unsigned integer.
    UInt32,
    /// 64-bit unsigned integer.
    UInt64,
    /// 128-bit unsigned integer.
    UInt128,
    /// Platform-default floating point width (stored as a double column).
    Float,
    /// 16-bit floating point.
    Float16,
    /// 32-bit floating point.
    Float32,
    /// 64-bit floating point.
    Float64,
    /// 128-bit floating point.
    Float128,
    /// 256-bit floating point.
    Float256,
    /// UTF-8 text.
    Text,
    /// ISO-8601 date-time with offset, stored as text (see `smd-model`'s
    /// date-time contract).
    DateTime,
}

/// The normalized representation a [`Tag`] lives in on the wire and in a
/// relational column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageClass {
    /// A 64-bit signed integer column.
    I64,
    /// A double-precision floating point column.
    F64,
    /// A UTF-8 text column.
    Text,
    /// A fixed-length binary blob column, `usize` bytes wide.
    Blob(usize),
}

/// The document member kind a [`Tag`]'s storage class accepts on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocKind {
    /// A 64-bit integer scalar.
    I64,
    /// A double-precision float scalar.
    F64,
    /// A UTF-8 string scalar.
    Utf8,
    /// A raw byte-string scalar.
    Binary,
}

struct TypeEntry {
    tag: Tag,
    name: &'static str,
    /// Stable on-wire integer code for the scheme document encoding
    /// (`(field_name: string) -> (type_tag: int64)`). Assigned once, in
    /// table order; never reused or reassigned even if the table is later
    /// reordered.
    code: i64,
    storage_class: StorageClass,
    doc_kind: DocKind,
}

/// The single source of truth for every storable type: its canonical name,
/// its on-wire integer code, its storage class, and the document member
/// kind it accepts on insert.
///
/// `Invalid`/`Unknown` are deliberately absent — they have no name, no wire
/// code, no storage class, and are never a target of [`storage_class`] or
/// [`doc_kind`].
const TYPE_TABLE: &[TypeEntry] = &[
    TypeEntry { tag: Tag::Int, name: "integer", code: 0, storage_class: StorageClass::I64, doc_kind: DocKind::I64 },
    TypeEntry { tag: Tag::Int8, name: "integer8", code: 1, storage_class: StorageClass::I64, doc_kind: DocKind::I64 },
    TypeEntry { tag: Tag::Int16, name: "integer16", code: 2, storage_class: StorageClass::I64, doc_kind: DocKind::I64 },
    TypeEntry { tag: Tag::Int32, name: "integer32", code: 3, storage_class: StorageClass::I64, doc_kind: DocKind::I64 },
    TypeEntry { tag: Tag::Int64, name: "integer64", code: 4, storage_class: StorageClass::I64, doc_kind: DocKind::I64 },
    TypeEntry { tag: Tag::Int128, name: "integer128", code: 5, storage_class: StorageClass::Blob(16), doc_kind: DocKind::Binary },
    TypeEntry { tag: Tag::UInt, name: "unsigned integer", code: 6, storage_class: StorageClass::Blob(8), doc_kind: DocKind::Binary },
    TypeEntry { tag: Tag::UInt8, name: "unsigned integer8", code: 7, storage_class: StorageClass::I64, doc_kind: DocKind::I64 },
    TypeEntry { tag: Tag::UInt16, name: "unsigned integer16", code: 8, storage_class: StorageClass::I64, doc_kind: DocKind::I64 },
    TypeEntry { tag: Tag::UInt32, name: "unsigned integer32", code: 9, storage_class: StorageClass::I64, doc_kind: DocKind::I64 },
    TypeEntry { tag: Tag::UInt64, name: "unsigned integer64", code: 10, storage_class: StorageClass::Blob(8), doc_kind: DocKind::Binary },
    TypeEntry { tag: Tag::UInt128, name: "unsigned integer128", code: 11, storage_class: StorageClass::Blob(16), doc_kind: DocKind::Binary },
    TypeEntry { tag: Tag::Float, name: "float", code: 12, storage_class: StorageClass::F64, doc_kind: DocKind::F64 },
    TypeEntry { tag: Tag::Float16, name: "float16", code: 13, storage_class: StorageClass::F64, doc_kind: DocKind::F64 },
    TypeEntry { tag: Tag::Float32, name: "float32", code: 14, storage_class: StorageClass::F64, doc_kind: DocKind::F64 },
    TypeEntry { tag: Tag::Float64, name: "float64", code: 15, storage_class: StorageClass::F64, doc_kind: DocKind::F64 },
    TypeEntry { tag: Tag::Float128, name: "float128", code: 16, storage_class: StorageClass::Blob(16), doc_kind: DocKind::Binary },
    TypeEntry { tag: Tag::Float256, name: "float256", code: 17, storage_class: StorageClass::Blob(32), doc_kind: DocKind::Binary },
    TypeEntry { tag: Tag::Text, name: "text", code: 18, storage_class: StorageClass::Text, doc_kind: DocKind::Utf8 },
    TypeEntry { tag: Tag::DateTime, name: "date time", code: 19, storage_class: StorageClass::Text, doc_kind: DocKind::Utf8 },
];

fn lookup(tag: Tag) -> Option<&'static TypeEntry> {
    TYPE_TABLE.iter().find(|e| e.tag == tag)
}

/// Convert a [`Tag`] into its stable on-wire integer code.
///
/// Returns `None` for `Invalid`/`Unknown`.
pub fn tag_to_code(tag: Tag) -> Option<i64> {
    lookup(tag).map(|e| e.code)
}

/// Convert an on-wire integer code back into a [`Tag`].
///
/// An unrecognized code is a fatal error for the receiver — callers should
/// treat `None` as such, rather than silently substituting `Tag::Unknown`.
pub fn code_to_tag(code: i64) -> Option<Tag> {
    TYPE_TABLE.iter().find(|e| e.code == code).map(|e| e.tag)
}

/// Convert a canonical lowercase type name into its [`Tag`].
///
/// Unrecognized strings yield [`Tag::Unknown`], never an error — validation
/// callers check `tag != Tag::Unknown` themselves (this mirrors the
/// original `j_smd_type_string2type`, which never fails, only returns the
/// unknown sentinel).
pub fn type_from_name(name: &str) -> Tag {
    TYPE_TABLE
        .iter()
        .find(|e| e.name == name)
        .map(|e| e.tag)
        .unwrap_or(Tag::Unknown)
}

/// Convert a [`Tag`] into its canonical lowercase name.
///
/// Returns `None` for `Invalid`/`Unknown` or any future non-storable
/// sentinel — there is no name to give a tag outside the table.
pub fn name_from_type(tag: Tag) -> Option<&'static str> {
    lookup(tag).map(|e| e.name)
}

/// The storage class a [`Tag`] is represented as on the wire and in a
/// relational column.
///
/// Returns `None` for `Invalid`/`Unknown`.
pub fn storage_class(tag: Tag) -> Option<StorageClass> {
    lookup(tag).map(|e| e.storage_class)
}

/// The document member kind required on insert for a [`Tag`].
///
/// Returns `None` for `Invalid`/`Unknown`.
pub fn doc_kind(tag: Tag) -> Option<DocKind> {
    lookup(tag).map(|e| e.doc_kind)
}

/// Whether `tag` is a storable, non-sentinel type.
pub fn is_valid(tag: Tag) -> bool {
    lookup(tag).is_some()
}
