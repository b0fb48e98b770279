//! Relational repository layer.
//!
//! One generic contract carries the CRUD/pagination plumbing every entity
//! repository needs; concrete repositories add entity-specific queries on
//! top. All SQL is assembled from Dialect policy outputs plus bound
//! parameters; no request-controlled value is ever concatenated into text.

pub mod mapping;

mod audit_repository;
mod upload_repository;

pub use audit_repository::AuditRepository;
pub use upload_repository::UploadRepository;

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::db::{Dialect, QueryBuilder, QueryExecutor, Row, Scalar};
use crate::error::{Result, StoreError};

/// Contract a relational entity implements to participate in the generic
/// repository. `COLUMNS` lists every persisted column, id first;
/// `to_params` yields values in the same order; `from_row` is pure and total
/// per the mapping helpers.
pub trait SqlEntity: Sized + Send + Sync {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];
    const ID_COLUMN: &'static str = "id";

    fn id(&self) -> &str;
    fn to_params(&self) -> Vec<Scalar>;
    fn from_row(row: &Row) -> Result<Self>;
}

/// Generic repository: filter/pagination/mapping logic written once,
/// instantiated per entity. Holds a shared executor reference; creates no
/// connections of its own.
pub struct SqlRepository<E: SqlEntity> {
    executor: Arc<dyn QueryExecutor>,
    _entity: PhantomData<E>,
}

impl<E: SqlEntity> SqlRepository<E> {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> SqlRepository<E> {
        SqlRepository {
            executor,
            _entity: PhantomData,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.executor.dialect()
    }

    pub fn executor(&self) -> &Arc<dyn QueryExecutor> {
        &self.executor
    }

    fn select_prefix(&self) -> String {
        format!("SELECT {} FROM {}", E::COLUMNS.join(", "), E::TABLE)
    }

    /// Insert one entity. Returns whether a row was actually written.
    ///
    /// The two dialects differ here: under PostgreSQL the statement carries
    /// `ON CONFLICT DO NOTHING`, so a duplicate key completes with
    /// `applied = false` and no error. Oracle has no conflict clause; a
    /// duplicate surfaces as a query failure, and callers for whom
    /// duplicates are an expected case pre-check with `exists`.
    pub async fn insert(&self, entity: &E) -> Result<bool> {
        let mut q = QueryBuilder::new(self.dialect());
        q.push("INSERT INTO ")
            .push(E::TABLE)
            .push(" (")
            .push(&E::COLUMNS.join(", "))
            .push(") VALUES (")
            .bind_all(entity.to_params())
            .push(")");
        if self.dialect() == Dialect::Postgres {
            q.push(" ON CONFLICT DO NOTHING");
        }
        let affected = self.executor.execute(q.sql(), q.params()).await?;
        debug!(table = E::TABLE, id = entity.id(), affected, "insert");
        Ok(affected > 0)
    }

    pub async fn find(&self, id: &str) -> Result<Option<E>> {
        let mut q = QueryBuilder::new(self.dialect());
        q.push(&self.select_prefix())
            .push(" WHERE ")
            .push(E::ID_COLUMN)
            .push(" = ")
            .bind(Scalar::text(id));
        let rows = self.executor.fetch(q.sql(), q.params()).await?;
        rows.first().map(E::from_row).transpose()
    }

    pub async fn get(&self, id: &str) -> Result<E> {
        self.find(id).await?.ok_or_else(|| {
            StoreError::not_found(format!("{} {} does not exist", E::TABLE, id))
        })
    }

    /// Presence check via a plain fetch and emptiness test; zero rows is a
    /// valid outcome here, so this never goes through `fetch_scalar`.
    pub async fn exists(&self, id: &str) -> Result<bool> {
        let mut q = QueryBuilder::new(self.dialect());
        q.push("SELECT ")
            .push(E::ID_COLUMN)
            .push(" FROM ")
            .push(E::TABLE)
            .push(" WHERE ")
            .push(E::ID_COLUMN)
            .push(" = ")
            .bind(Scalar::text(id));
        let rows = self.executor.fetch(q.sql(), q.params()).await?;
        Ok(!rows.is_empty())
    }

    /// Delete by id. Absence is not an error; the caller reads the flag.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut q = QueryBuilder::new(self.dialect());
        q.push("DELETE FROM ")
            .push(E::TABLE)
            .push(" WHERE ")
            .push(E::ID_COLUMN)
            .push(" = ")
            .bind(Scalar::text(id));
        let affected = self.executor.execute(q.sql(), q.params()).await?;
        Ok(affected > 0)
    }

    pub async fn count(&self) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) AS n FROM {}", E::TABLE);
        match self.executor.fetch_scalar(&sql, &[]).await? {
            Scalar::Int(n) => Ok(n),
            Scalar::Text(s) => s
                .parse()
                .map_err(|_| StoreError::malformed("COUNT(*) did not return an integer")),
            other => Err(StoreError::malformed(format!(
                "COUNT(*) returned {other:?}"
            ))),
        }
    }

    /// One ordered page. `order_by` is a dialect-fixed column list supplied
    /// by the concrete repository, never request data.
    pub async fn page(&self, order_by: &str, limit: u64, offset: u64) -> Result<Vec<E>> {
        let sql = format!(
            "{} ORDER BY {} {}",
            self.select_prefix(),
            order_by,
            self.dialect().pagination_clause(limit, offset)
        );
        let rows = self.executor.fetch(&sql, &[]).await?;
        rows.iter().map(E::from_row).collect()
    }
}
