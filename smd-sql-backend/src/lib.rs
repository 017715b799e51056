//! A `Backend` implementation that maps each applied namespace to a SQLite
//! table, with a housekeeping table caching each namespace's scheme
//! document for later retrieval.

#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

use std::path::Path;

use async_trait::async_trait;
use smd_backend::{Backend, BackendError, Cursor, DeletePolicy, EmptyCursor};
use smd_doc::{Document, Value};
use smd_types::{StorageClass, Tag};
use sqlx::sqlite::{SqlitePoolOptions, SqliteConnectOptions};
use sqlx::{Row, SqlitePool};

/// The housekeeping table every database created by this backend carries,
/// caching each namespace's applied scheme document.
const SCHEME_CACHE_DDL: &str = "CREATE TABLE IF NOT EXISTS _sys_schemes_ (
    namespace TEXT NOT NULL,
    cached_scheme BLOB NOT NULL
);";
const SCHEME_CACHE_INDEX_DDL: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS _sys_schemes_idx_ ON _sys_schemes_ (namespace);";

/// A SQLite-backed [`Backend`].
///
/// Holds a single process-wide connection pool; all operations are
/// serialized by the underlying store rather than by anything this struct
/// does itself.
pub struct SqlBackend {
    pool: SqlitePool,
    delete_policy: DeletePolicy,
}

impl SqlBackend {
    /// Open or create the database file at `path`, creating the
    /// housekeeping table if this is a fresh database.
    ///
    /// # Errors
    ///
    /// [`BackendError::Storage`] if the parent directory cannot be created
    /// or the database cannot be opened.
    pub async fn open(path: &Path, delete_policy: DeletePolicy) -> Result<Self, BackendError> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| BackendError::Storage(e.to_string()))?;
            }
        }
        let options = SqliteConnectOptions::new().filename(path).create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| BackendError::Storage(e.to_string()))?;

        sqlx::query(SCHEME_CACHE_DDL)
            .execute(&pool)
            .await
            .map_err(|e| BackendError::Storage(e.to_string()))?;
        sqlx::query(SCHEME_CACHE_INDEX_DDL)
            .execute(&pool)
            .await
            .map_err(|e| BackendError::Storage(e.to_string()))?;

        Ok(Self { pool, delete_policy })
    }

    async fn load_scheme(&self, namespace: &str) -> Result<Vec<(String, Tag)>, BackendError> {
        let row = sqlx::query("SELECT cached_scheme FROM _sys_schemes_ WHERE namespace = ?1")
            .bind(namespace)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BackendError::Storage(e.to_string()))?
            .ok_or_else(|| BackendError::UnknownNamespace(namespace.to_string()))?;
        let blob: Vec<u8> = row.try_get(0).map_err(|e| BackendError::Storage(e.to_string()))?;
        let doc = Document::decode(&blob).map_err(|e| BackendError::Storage(e.to_string()))?;
        doc.iter()
            .map(|(name, value)| match value {
                Value::I64(code) => smd_types::code_to_tag(*code)
                    .map(|tag| (name.to_string(), tag))
                    .ok_or_else(|| BackendError::Storage(format!("cached scheme names unknown type code {code}"))),
                _ => Err(BackendError::Storage("cached scheme member was not an integer code".into())),
            })
            .collect()
    }
}

fn quote_ident(name: &str) -> Result<String, BackendError> {
    let safe = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.chars().next().unwrap().is_ascii_digit();
    if !safe {
        return Err(BackendError::Storage(format!("`{name}` is not a valid identifier")));
    }
    Ok(format!("\"{name}\""))
}

fn column_sql_type(class: StorageClass) -> &'static str {
    match class {
        StorageClass::I64 => "INTEGER",
        StorageClass::F64 => "REAL",
        StorageClass::Text => "TEXT",
        StorageClass::Blob(_) => "BLOB",
    }
}

fn bind_value<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    field: &str,
    tag: Tag,
    value: &'q Value,
) -> Result<sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>, BackendError> {
    let class = smd_types::storage_class(tag).expect("declared scheme field always has a storage class");
    query = match (class, value) {
        (StorageClass::I64, Value::I64(v)) => query.bind(*v),
        (StorageClass::F64, Value::F64(v)) => query.bind(*v),
        (StorageClass::Text, Value::Utf8(s)) => query.bind(s.clone()),
        (StorageClass::Blob(width), Value::Binary(b)) if b.len() == width => query.bind(b.clone()),
        _ => {
            return Err(BackendError::TypeMismatch {
                field: field.to_string(),
                expected: tag,
            })
        }
    };
    Ok(query)
}

fn value_from_row(row: &sqlx::sqlite::SqliteRow, idx: usize, tag: Tag) -> Result<Value, BackendError> {
    let class = smd_types::storage_class(tag).expect("declared scheme field always has a storage class");
    let value = match class {
        StorageClass::I64 => Value::I64(row.try_get::<i64, _>(idx).map_err(|e| BackendError::Storage(e.to_string()))?),
        StorageClass::F64 => Value::F64(row.try_get::<f64, _>(idx).map_err(|e| BackendError::Storage(e.to_string()))?),
        StorageClass::Text => Value::Utf8(row.try_get::<String, _>(idx).map_err(|e| BackendError::Storage(e.to_string()))?),
        StorageClass::Blob(_) => Value::Binary(row.try_get::<Vec<u8>, _>(idx).map_err(|e| BackendError::Storage(e.to_string()))?),
    };
    Ok(value)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.message().contains("UNIQUE constraint failed"))
}

fn reject_undeclared_columns(namespace: &str, scheme: &[(String, Tag)], values: &Document) -> Result<(), BackendError> {
    for (name, _) in values.iter() {
        if !scheme.iter().any(|(field, _)| field.as_str() == name) {
            return Err(BackendError::UnknownColumn {
                namespace: namespace.to_string(),
                field: name.to_string(),
            });
        }
    }
    Ok(())
}

#[async_trait]
impl Backend for SqlBackend {
    async fn apply_scheme(&self, namespace: &str, fields: &[(String, Tag)]) -> Result<(), BackendError> {
        tracing::debug!(namespace, field_count = fields.len(), "applying scheme");
        let table = quote_ident(namespace)?;
        let mut create = format!("CREATE TABLE {table} (\"key\" TEXT NOT NULL PRIMARY KEY");
        for (name, tag) in fields {
            let column = quote_ident(name)?;
            let class = smd_types::storage_class(*tag)
                .ok_or_else(|| BackendError::Storage(format!("`{name}` has no storable type")))?;
            create.push_str(&format!(", {column} {} NOT NULL", column_sql_type(class)));
        }
        create.push(')');

        let mut tx = self.pool.begin().await.map_err(|e| BackendError::Storage(e.to_string()))?;

        if sqlx::query("SELECT 1 FROM _sys_schemes_ WHERE namespace = ?1")
            .bind(namespace)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| BackendError::Storage(e.to_string()))?
            .is_some()
        {
            return Err(BackendError::SchemeAlreadyApplied(namespace.to_string()));
        }

        sqlx::query(&create)
            .execute(&mut *tx)
            .await
            .map_err(|e| BackendError::Storage(e.to_string()))?;

        let mut doc = Document::new();
        for (name, tag) in fields {
            let code = smd_types::tag_to_code(*tag).expect("validated above");
            doc.insert(name.clone(), Value::I64(code))
                .map_err(|e| BackendError::Storage(e.to_string()))?;
        }
        sqlx::query("INSERT INTO _sys_schemes_ (namespace, cached_scheme) VALUES (?1, ?2)")
            .bind(namespace)
            .bind(doc.encode())
            .execute(&mut *tx)
            .await
            .map_err(|e| BackendError::Storage(e.to_string()))?;

        tx.commit().await.map_err(|e| BackendError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn get_scheme(&self, namespace: &str) -> Result<Vec<(String, Tag)>, BackendError> {
        self.load_scheme(namespace).await
    }

    async fn insert(&self, namespace: &str, key: &str, values: &Document) -> Result<(), BackendError> {
        tracing::debug!(namespace, key, "inserting record");
        let scheme = self.load_scheme(namespace).await?;
        reject_undeclared_columns(namespace, &scheme, values)?;
        let table = quote_ident(namespace)?;

        let mut columns = vec!["\"key\"".to_string()];
        let mut placeholders = vec!["?1".to_string()];
        let mut bind_plan: Vec<(&str, Tag, &Value)> = Vec::new();
        for (idx, (name, tag)) in scheme.iter().enumerate() {
            let value = values
                .get(name)
                .ok_or_else(|| BackendError::TypeMismatch { field: name.clone(), expected: *tag })?;
            columns.push(quote_ident(name)?);
            placeholders.push(format!("?{}", idx + 2));
            bind_plan.push((name.as_str(), *tag, value));
        }
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );

        let mut query = sqlx::query(&sql).bind(key);
        for (field, tag, value) in &bind_plan {
            query = bind_value(query, field, *tag, value)?;
        }
        query.execute(&self.pool).await.map_err(|e| {
            if is_unique_violation(&e) {
                BackendError::DuplicateKey { namespace: namespace.to_string(), key: key.to_string() }
            } else {
                BackendError::Storage(e.to_string())
            }
        })?;
        Ok(())
    }

    async fn update(&self, namespace: &str, key: &str, values: &Document) -> Result<(), BackendError> {
        tracing::debug!(namespace, key, "updating record");
        let scheme = self.load_scheme(namespace).await?;
        reject_undeclared_columns(namespace, &scheme, values)?;
        let table = quote_ident(namespace)?;

        let exists = sqlx::query(&format!("SELECT 1 FROM {table} WHERE \"key\" = ?1"))
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BackendError::Storage(e.to_string()))?
            .is_some();

        if !exists {
            return self.insert(namespace, key, values).await;
        }

        let mut assignments = Vec::new();
        let mut bind_plan: Vec<(&str, Tag, &Value)> = Vec::new();
        for (name, tag) in &scheme {
            if let Some(value) = values.get(name) {
                assignments.push(format!("{} = ?{}", quote_ident(name)?, bind_plan.len() + 1));
                bind_plan.push((name.as_str(), *tag, value));
            }
        }
        if assignments.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "UPDATE {table} SET {} WHERE \"key\" = ?{}",
            assignments.join(", "),
            bind_plan.len() + 1
        );
        let mut query = sqlx::query(&sql);
        for (field, tag, value) in &bind_plan {
            query = bind_value(query, field, *tag, value)?;
        }
        query = query.bind(key);
        query.execute(&self.pool).await.map_err(|e| BackendError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<(), BackendError> {
        tracing::debug!(namespace, key, "deleting record");
        // Touching the scheme cache validates the namespace exists before
        // the DELETE runs.
        self.load_scheme(namespace).await?;
        let table = quote_ident(namespace)?;

        if self.delete_policy == DeletePolicy::Strict {
            let exists = sqlx::query(&format!("SELECT 1 FROM {table} WHERE \"key\" = ?1"))
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| BackendError::Storage(e.to_string()))?
                .is_some();
            if !exists {
                return Err(BackendError::KeyNotFound { namespace: namespace.to_string(), key: key.to_string() });
            }
        }

        sqlx::query(&format!("DELETE FROM {table} WHERE \"key\" = ?1"))
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| BackendError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Document, BackendError> {
        tracing::debug!(namespace, key, "reading record");
        let scheme = self.load_scheme(namespace).await?;
        let table = quote_ident(namespace)?;

        let mut columns = Vec::new();
        for (name, _) in &scheme {
            columns.push(quote_ident(name)?);
        }
        let sql = format!("SELECT {} FROM {table} WHERE \"key\" = ?1", columns.join(", "));
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BackendError::Storage(e.to_string()))?
            .ok_or_else(|| BackendError::KeyNotFound { namespace: namespace.to_string(), key: key.to_string() })?;

        let mut doc = Document::new();
        for (idx, (name, tag)) in scheme.iter().enumerate() {
            let value = value_from_row(&row, idx, *tag)?;
            doc.insert(name.clone(), value).map_err(|e| BackendError::Storage(e.to_string()))?;
        }
        Ok(doc)
    }

    async fn search(&self, namespace: &str, _predicates: &Document) -> Result<Box<dyn Cursor>, BackendError> {
        self.load_scheme(namespace).await?;
        Ok(Box::new(EmptyCursor))
    }

    async fn fini(&self) -> Result<(), BackendError> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fresh_backend() -> (SqlBackend, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("smd.sqlite");
        let backend = SqlBackend::open(&path, DeletePolicy::Idempotent).await.unwrap();
        (backend, dir)
    }

    #[tokio::test]
    async fn apply_scheme_then_get_scheme_round_trips() {
        let (backend, _dir) = fresh_backend().await;
        let fields = vec![("name".to_string(), Tag::Text), ("loc".to_string(), Tag::Int)];
        backend.apply_scheme("ns", &fields).await.unwrap();
        assert_eq!(backend.get_scheme("ns").await.unwrap(), fields);
    }

    #[tokio::test]
    async fn apply_scheme_twice_fails() {
        let (backend, _dir) = fresh_backend().await;
        let fields = vec![("name".to_string(), Tag::Text)];
        backend.apply_scheme("ns", &fields).await.unwrap();
        assert_eq!(
            backend.apply_scheme("ns", &fields).await.unwrap_err(),
            BackendError::SchemeAlreadyApplied("ns".into())
        );
    }

    #[tokio::test]
    async fn get_scheme_on_unknown_namespace_fails() {
        let (backend, _dir) = fresh_backend().await;
        assert_eq!(
            backend.get_scheme("nope").await.unwrap_err(),
            BackendError::UnknownNamespace("nope".into())
        );
    }

    #[tokio::test]
    async fn insert_then_get_round_trips_and_rejects_duplicate() {
        let (backend, _dir) = fresh_backend().await;
        backend.apply_scheme("ns", &[("name".to_string(), Tag::Text), ("loc".to_string(), Tag::Int)]).await.unwrap();

        let mut values = Document::new();
        values.insert("name", Value::Utf8("Romeo".into())).unwrap();
        values.insert("loc", Value::I64(42)).unwrap();
        backend.insert("ns", "k1", &values).await.unwrap();

        let got = backend.get("ns", "k1").await.unwrap();
        assert_eq!(got.get("name"), Some(&Value::Utf8("Romeo".into())));
        assert_eq!(got.get("loc"), Some(&Value::I64(42)));

        assert_eq!(
            backend.insert("ns", "k1", &values).await.unwrap_err(),
            BackendError::DuplicateKey { namespace: "ns".into(), key: "k1".into() }
        );
    }

    #[tokio::test]
    async fn insert_rejects_undeclared_column() {
        let (backend, _dir) = fresh_backend().await;
        backend.apply_scheme("ns", &[("name".to_string(), Tag::Text)]).await.unwrap();

        let mut values = Document::new();
        values.insert("name", Value::Utf8("Romeo".into())).unwrap();
        values.insert("nickname", Value::Utf8("Romio".into())).unwrap();

        assert_eq!(
            backend.insert("ns", "k1", &values).await.unwrap_err(),
            BackendError::UnknownColumn { namespace: "ns".into(), field: "nickname".into() }
        );
    }

    #[tokio::test]
    async fn update_is_partial_and_creates_if_absent() {
        let (backend, _dir) = fresh_backend().await;
        backend.apply_scheme("ns", &[("name".to_string(), Tag::Text), ("loc".to_string(), Tag::Int)]).await.unwrap();

        let mut full = Document::new();
        full.insert("name", Value::Utf8("Romeo".into())).unwrap();
        full.insert("loc", Value::I64(1)).unwrap();
        backend.update("ns", "k1", &full).await.unwrap(); // absent -> created

        let mut partial = Document::new();
        partial.insert("loc", Value::I64(99)).unwrap();
        backend.update("ns", "k1", &partial).await.unwrap();

        let got = backend.get("ns", "k1").await.unwrap();
        assert_eq!(got.get("name"), Some(&Value::Utf8("Romeo".into())));
        assert_eq!(got.get("loc"), Some(&Value::I64(99)));
    }

    #[tokio::test]
    async fn delete_is_idempotent_by_default() {
        let (backend, _dir) = fresh_backend().await;
        backend.apply_scheme("ns", &[("name".to_string(), Tag::Text)]).await.unwrap();
        backend.delete("ns", "missing").await.unwrap();
    }

    #[tokio::test]
    async fn delete_under_strict_policy_reports_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SqlBackend::open(&dir.path().join("smd.sqlite"), DeletePolicy::Strict).await.unwrap();
        backend.apply_scheme("ns", &[("name".to_string(), Tag::Text)]).await.unwrap();
        assert_eq!(
            backend.delete("ns", "missing").await.unwrap_err(),
            BackendError::KeyNotFound { namespace: "ns".into(), key: "missing".into() }
        );
    }

    #[tokio::test]
    async fn get_on_absent_key_fails() {
        let (backend, _dir) = fresh_backend().await;
        backend.apply_scheme("ns", &[("name".to_string(), Tag::Text)]).await.unwrap();
        assert_eq!(
            backend.get("ns", "missing").await.unwrap_err(),
            BackendError::KeyNotFound { namespace: "ns".into(), key: "missing".into() }
        );
    }
}
