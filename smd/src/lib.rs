//! Structured Metadata (SMD): a typed, schema-aware key/value metadata
//! service. Clients declare a per-namespace column [`Scheme`], then
//! [`insert`](Record::insert), [`update`](Record::update),
//! [`get`](Record::get), and [`delete`](Record::delete) typed
//! [`Record`]s identified by a string key. Records are distributed across
//! a fixed set of backend shards by a stable hash of the namespace
//! (`smd-sharder`); requests batch for throughput (`smd-dispatch`).
//!
//! This crate is a thin facade: it re-exports the client object model, the
//! dispatch engine, the backend contract, and the reference SQL backend,
//! and adds the single convenience constructor most callers need —
//! [`open_single_shard_sql`] — for standing up a one-process, one-shard
//! deployment backed by a SQLite file.

#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

use std::path::Path;
use std::sync::Arc;

pub use smd_backend::{Backend, BackendError, Cursor, DeletePolicy, EmptyCursor};
pub use smd_dispatch::{BatchExt, Connection, ConnectionPool, DispatchContext, DispatchError, MockConnection};
pub use smd_doc::{DocError, Document, Value};
pub use smd_model::{
    Batch, Consistency, Operation, Persistency, Record, RecordError, Safety, Scheme, SchemeError, Search,
    Semantics, RESERVED_KEY_FIELD,
};
pub use smd_sharder::{shard_for, stable_hash, Topology};
pub use smd_sql_backend::SqlBackend;
pub use smd_types::{storage_class, Tag};

/// Open (or create) a single-shard, SQLite-backed deployment: a
/// [`DispatchContext`] with one shard, co-hosted in this process, backed by
/// the database file at `path`.
///
/// This is the shape every scenario in this crate's test suite runs
/// against; a multi-shard or remote-transport deployment constructs a
/// [`DispatchContext`] directly instead.
///
/// # Errors
///
/// Returns [`BackendError::Storage`] if the database file cannot be opened.
pub fn open_single_shard_sql(path: &Path, delete_policy: DeletePolicy) -> Result<DispatchContext, BackendError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("building a current-thread tokio runtime cannot fail in practice");
    let backend = runtime.block_on(SqlBackend::open(path, delete_policy))?;
    let topology = Topology::new(1);
    Ok(DispatchContext::new(1).with_local_backend(topology.shard_for(""), Arc::new(backend)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const NAMESPACE: &str = "__t_smd__";

    fn fresh_context() -> (DispatchContext, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = open_single_shard_sql(&dir.path().join("smd.sqlite"), DeletePolicy::Idempotent).unwrap();
        (ctx, dir)
    }

    #[test]
    fn scenario_1_apply_then_get_scheme() {
        let (ctx, _dir) = fresh_context();

        let scheme = Scheme::new(NAMESPACE).unwrap();
        scheme.field_add("name", Tag::Text);
        scheme.field_add("loc", Tag::Int);
        scheme.field_add("coverage", Tag::Float);
        scheme.field_add("lastrun", Tag::DateTime);
        let mut batch = Batch::new();
        scheme.apply(&mut batch);
        batch.execute(&ctx).unwrap();

        let fresh = Scheme::new(NAMESPACE).unwrap();
        let mut batch = Batch::new();
        fresh.get(&mut batch);
        batch.execute(&ctx).unwrap();

        assert_eq!(fresh.fields(), scheme.fields());
    }

    fn apply_four_field_scheme(ctx: &DispatchContext) -> Scheme {
        let scheme = Scheme::new(NAMESPACE).unwrap();
        scheme.field_add("name", Tag::Text);
        scheme.field_add("loc", Tag::Int);
        scheme.field_add("coverage", Tag::Float);
        scheme.field_add("lastrun", Tag::DateTime);
        let mut batch = Batch::new();
        scheme.apply(&mut batch);
        batch.execute(ctx).unwrap();
        scheme
    }

    #[test]
    fn scenario_2_insert_then_get() {
        let (ctx, _dir) = fresh_context();
        let scheme = apply_four_field_scheme(&ctx);

        let record = Record::new(&scheme, "__romio__").unwrap();
        assert!(record.set_text("name", "Romeo"));
        assert!(record.set_int("loc", 4242));
        assert!(record.set_float("coverage", 3.14159));
        assert!(record.set_date_time("lastrun", "2000-01-01 21:42:42+02:00"));
        let mut batch = Batch::new();
        record.insert(&mut batch);
        batch.execute(&ctx).unwrap();

        let fresh = Record::new(&scheme, "__romio__").unwrap();
        let mut batch = Batch::new();
        fresh.get(&mut batch);
        batch.execute(&ctx).unwrap();

        assert_eq!(fresh.get_text("name"), Some("Romeo".to_string()));
        assert_eq!(fresh.get_int("loc"), Some(4242));
        assert!((fresh.get_float("coverage").unwrap() - 3.14159).abs() < 1e-3);
        assert_eq!(fresh.get_date_time("lastrun"), Some("2000-01-01 21:42:42+02:00".to_string()));
    }

    fn insert_romeo(ctx: &DispatchContext, scheme: &Scheme) {
        let record = Record::new(scheme, "__romio__").unwrap();
        record.set_text("name", "Romeo");
        record.set_int("loc", 4242);
        record.set_float("coverage", 3.14159);
        record.set_date_time("lastrun", "2000-01-01 21:42:42+02:00");
        let mut batch = Batch::new();
        record.insert(&mut batch);
        batch.execute(ctx).unwrap();
    }

    #[test]
    fn scenario_3_update_leaves_other_fields_unchanged() {
        let (ctx, _dir) = fresh_context();
        let scheme = apply_four_field_scheme(&ctx);
        insert_romeo(&ctx, &scheme);

        let record = Record::new(&scheme, "__romio__").unwrap();
        assert!(record.set_text("name", "Julea"));
        let mut batch = Batch::new();
        record.update(&mut batch);
        batch.execute(&ctx).unwrap();

        let fresh = Record::new(&scheme, "__romio__").unwrap();
        let mut batch = Batch::new();
        fresh.get(&mut batch);
        batch.execute(&ctx).unwrap();

        assert_eq!(fresh.get_text("name"), Some("Julea".to_string()));
        assert_eq!(fresh.get_int("loc"), Some(4242));
        assert!((fresh.get_float("coverage").unwrap() - 3.14159).abs() < 1e-3);
        assert_eq!(fresh.get_date_time("lastrun"), Some("2000-01-01 21:42:42+02:00".to_string()));
    }

    #[test]
    fn scenario_4_duplicate_insert_fails_without_modifying_state() {
        let (ctx, _dir) = fresh_context();
        let scheme = apply_four_field_scheme(&ctx);
        insert_romeo(&ctx, &scheme);

        let again = Record::new(&scheme, "__romio__").unwrap();
        again.set_text("name", "Someone Else");
        again.set_int("loc", 0);
        again.set_float("coverage", 0.0);
        again.set_date_time("lastrun", "2000-01-01 21:42:42+02:00");
        let mut batch = Batch::new();
        again.insert(&mut batch);
        assert_matches::assert_matches!(batch.execute(&ctx), Err(DispatchError::Backend(_)));

        let fresh = Record::new(&scheme, "__romio__").unwrap();
        let mut batch = Batch::new();
        fresh.get(&mut batch);
        batch.execute(&ctx).unwrap();
        assert_eq!(fresh.get_text("name"), Some("Romeo".to_string()));
    }

    #[test]
    fn scenario_5_delete_then_get_is_not_found() {
        let (ctx, _dir) = fresh_context();
        let scheme = apply_four_field_scheme(&ctx);
        insert_romeo(&ctx, &scheme);

        let record = Record::new(&scheme, "__romio__").unwrap();
        let mut batch = Batch::new();
        record.delete(&mut batch);
        batch.execute(&ctx).unwrap();

        let fresh = Record::new(&scheme, "__romio__").unwrap();
        let mut batch = Batch::new();
        fresh.get(&mut batch);
        assert!(batch.execute(&ctx).is_err());
    }

    #[test]
    fn scenario_6_wrong_type_setter_does_not_modify_record() {
        let (ctx, _dir) = fresh_context();
        let scheme = apply_four_field_scheme(&ctx);
        insert_romeo(&ctx, &scheme);

        let record = Record::new(&scheme, "__romio__").unwrap();
        let mut batch = Batch::new();
        record.get(&mut batch);
        batch.execute(&ctx).unwrap();

        assert!(!record.set_int("name", 5));
        assert_eq!(record.get_text("name"), Some("Romeo".to_string()));
    }
}
