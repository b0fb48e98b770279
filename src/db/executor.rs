//! Query executors: one connected backend per executor, normalized rows out.
//!
//! Both implementations own their pool; a connection is acquired per call and
//! released on every exit path by pool guard semantics. Neither retries
//! anything; retry policy, if any, belongs to callers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tracing::debug;

use crate::db::dialect::{coerce_scalar, Dialect, TypeHint};
use crate::db::value::{Row, Scalar};
use crate::error::{Result, StoreError};

/// Execution contract every repository is built on. Parameter values always
/// travel out-of-band from the query text; only Dialect policy literals may
/// be concatenated into SQL.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Run a read, returning zero or more rows in backend order.
    async fn fetch(&self, sql: &str, params: &[Scalar]) -> Result<Vec<Row>>;

    /// Run a write, returning the number of rows touched.
    async fn execute(&self, sql: &str, params: &[Scalar]) -> Result<u64>;

    /// Run a single-column, single-row read. Zero rows is a failure; callers
    /// for whom zero rows is a valid outcome use `fetch` and check emptiness.
    async fn fetch_scalar(&self, sql: &str, params: &[Scalar]) -> Result<Scalar> {
        let rows = self.fetch(sql, params).await?;
        let row = rows
            .first()
            .ok_or_else(|| StoreError::query("scalar query returned no rows"))?;
        row.get_index(0)
            .cloned()
            .ok_or_else(|| StoreError::query("scalar query returned no columns"))
    }
}

// ====== PostgreSQL ======

pub struct PgExecutor {
    pool: PgPool,
}

impl PgExecutor {
    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<PgExecutor> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| StoreError::connection(e.to_string()))?;
        Ok(PgExecutor { pool })
    }

    pub fn from_pool(pool: PgPool) -> PgExecutor {
        PgExecutor { pool }
    }
}

#[async_trait]
impl QueryExecutor for PgExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn fetch(&self, sql: &str, params: &[Scalar]) -> Result<Vec<Row>> {
        debug!(sql, n_params = params.len(), "pg fetch");
        let mut query = sqlx::query(sql);
        for p in params {
            query = bind_pg(query, p);
        }
        let pg_rows = query.fetch_all(&self.pool).await?;

        let mut columns: Option<Arc<[String]>> = None;
        let mut rows = Vec::with_capacity(pg_rows.len());
        for pg_row in &pg_rows {
            let cols = columns
                .get_or_insert_with(|| {
                    pg_row
                        .columns()
                        .iter()
                        .map(|c| c.name().to_string())
                        .collect::<Vec<_>>()
                        .into()
                })
                .clone();
            let mut values = Vec::with_capacity(cols.len());
            for idx in 0..cols.len() {
                values.push(pg_cell(pg_row, idx)?);
            }
            rows.push(Row::new(cols, values));
        }
        Ok(rows)
    }

    async fn execute(&self, sql: &str, params: &[Scalar]) -> Result<u64> {
        debug!(sql, n_params = params.len(), "pg execute");
        let mut query = sqlx::query(sql);
        for p in params {
            query = bind_pg(query, p);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;

fn bind_pg<'q>(query: PgQuery<'q>, param: &Scalar) -> PgQuery<'q> {
    match param {
        Scalar::Null => query.bind(None::<String>),
        Scalar::Bool(b) => query.bind(*b),
        Scalar::Int(i) => query.bind(*i),
        Scalar::Real(r) => query.bind(*r),
        Scalar::Text(s) => query.bind(s.clone()),
    }
}

/// Decode one Postgres cell into the normalized sum. Unhandled column types
/// are a malformed-data error naming the type, not a silent stringification.
fn pg_cell(row: &PgRow, idx: usize) -> Result<Scalar> {
    let column = &row.columns()[idx];
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Scalar::Null);
    }
    let value = match column.type_info().name() {
        "BOOL" => Scalar::Bool(row.try_get::<bool, _>(idx)?),
        "INT2" => Scalar::Int(row.try_get::<i16, _>(idx)? as i64),
        "INT4" => Scalar::Int(row.try_get::<i32, _>(idx)? as i64),
        "INT8" => Scalar::Int(row.try_get::<i64, _>(idx)?),
        "FLOAT4" => Scalar::Real(row.try_get::<f32, _>(idx)? as f64),
        "FLOAT8" => Scalar::Real(row.try_get::<f64, _>(idx)?),
        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => {
            Scalar::Text(row.try_get::<String, _>(idx)?)
        }
        "TIMESTAMPTZ" => {
            Scalar::Text(row.try_get::<chrono::DateTime<chrono::Utc>, _>(idx)?.to_rfc3339())
        }
        "TIMESTAMP" => {
            Scalar::Text(row.try_get::<chrono::NaiveDateTime, _>(idx)?.and_utc().to_rfc3339())
        }
        "DATE" => Scalar::Text(row.try_get::<chrono::NaiveDate, _>(idx)?.to_string()),
        "UUID" => Scalar::Text(row.try_get::<uuid::Uuid, _>(idx)?.to_string()),
        "BYTEA" => Scalar::Text(hex::encode(row.try_get::<Vec<u8>, _>(idx)?)),
        other => {
            return Err(StoreError::malformed(format!(
                "unsupported column type {other} for column {}",
                column.name()
            )))
        }
    };
    Ok(value)
}

// ====== Oracle ======

/// Oracle executor. The driver is blocking, so every call runs on the
/// blocking pool; cells arrive as text and are normalized through the dialect
/// coercion with a type hint from column metadata.
pub struct OracleExecutor {
    pool: Arc<oracle::pool::Pool>,
}

impl OracleExecutor {
    pub async fn connect(
        username: &str,
        password: &str,
        connect_string: &str,
        max_connections: u32,
    ) -> Result<OracleExecutor> {
        let username = username.to_string();
        let password = password.to_string();
        let connect_string = connect_string.to_string();
        let pool = tokio::task::spawn_blocking(move || {
            oracle::pool::PoolBuilder::new(username, password, connect_string)
                .max_connections(max_connections)
                .build()
        })
        .await
        .map_err(|e| StoreError::connection(format!("blocking task failed: {e}")))?
        .map_err(|e| StoreError::connection(e.to_string()))?;
        Ok(OracleExecutor {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl QueryExecutor for OracleExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Oracle
    }

    async fn fetch(&self, sql: &str, params: &[Scalar]) -> Result<Vec<Row>> {
        debug!(sql, n_params = params.len(), "oracle fetch");
        let pool = self.pool.clone();
        let sql = sql.to_string();
        let params = params.to_vec();
        run_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| StoreError::connection(e.to_string()))?;
            let boxed = oracle_params(&params);
            let refs: Vec<&dyn oracle::sql_type::ToSql> =
                boxed.iter().map(|b| b.as_ref()).collect();
            let result_set = conn.query(&sql, &refs)?;

            let (columns, hints): (Arc<[String]>, Vec<TypeHint>) = {
                let info = result_set.column_info();
                (
                    info.iter()
                        .map(|c| c.name().to_lowercase())
                        .collect::<Vec<_>>()
                        .into(),
                    info.iter().map(|c| hint_for(c.oracle_type())).collect(),
                )
            };

            let mut rows = Vec::new();
            for row_result in result_set {
                let oracle_row = row_result?;
                let mut values = Vec::with_capacity(columns.len());
                for (idx, hint) in hints.iter().enumerate() {
                    let cell: Option<String> = oracle_row.get(idx)?;
                    values.push(match cell {
                        None => Scalar::Null,
                        Some(text) => coerce_scalar(&text, *hint),
                    });
                }
                rows.push(Row::new(columns.clone(), values));
            }
            Ok(rows)
        })
        .await
    }

    async fn execute(&self, sql: &str, params: &[Scalar]) -> Result<u64> {
        debug!(sql, n_params = params.len(), "oracle execute");
        let pool = self.pool.clone();
        let sql = sql.to_string();
        let params = params.to_vec();
        run_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| StoreError::connection(e.to_string()))?;
            conn.set_autocommit(true);
            let boxed = oracle_params(&params);
            let refs: Vec<&dyn oracle::sql_type::ToSql> =
                boxed.iter().map(|b| b.as_ref()).collect();
            let statement = conn.execute(&sql, &refs)?;
            Ok(statement.row_count()?)
        })
        .await
    }
}

async fn run_blocking<T: Send + 'static>(
    f: impl FnOnce() -> Result<T> + Send + 'static,
) -> Result<T> {
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::query(format!("blocking task failed: {e}")))?
}

/// Booleans have already been lowered to 1/0 by the dialect policy before
/// they reach an Oracle bind; the remaining variants map directly.
fn oracle_params(params: &[Scalar]) -> Vec<Box<dyn oracle::sql_type::ToSql>> {
    params
        .iter()
        .map(|p| -> Box<dyn oracle::sql_type::ToSql> {
            match p {
                Scalar::Null => Box::new(None::<String>),
                Scalar::Bool(b) => Box::new(if *b { 1i64 } else { 0i64 }),
                Scalar::Int(i) => Box::new(*i),
                Scalar::Real(r) => Box::new(*r),
                Scalar::Text(s) => Box::new(s.clone()),
            }
        })
        .collect()
}

fn hint_for(oracle_type: &oracle::sql_type::OracleType) -> TypeHint {
    use oracle::sql_type::OracleType as T;
    match oracle_type {
        T::Number(_, _)
        | T::Float(_)
        | T::BinaryFloat
        | T::BinaryDouble
        | T::Int64
        | T::UInt64 => TypeHint::Numeric,
        T::Boolean => TypeHint::Boolean,
        _ => TypeHint::Text,
    }
}
