//! Dual-dialect data access: dialect policy, logical queries, executors.

pub mod dialect;
pub mod executor;
pub mod query;
pub mod value;

pub use dialect::{coerce_scalar, Dialect, TypeHint};
pub use executor::{OracleExecutor, PgExecutor, QueryExecutor};
pub use query::QueryBuilder;
pub use value::{Row, Scalar};

use std::sync::Arc;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::error::{Result, StoreError};

/// Build the executor selected by configuration. The dialect tag is resolved
/// here, once; a repository keeps whatever executor it was constructed with
/// for its whole lifetime.
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn QueryExecutor>> {
    let dialect: Dialect = config.dialect.parse()?;
    match dialect {
        Dialect::Postgres => {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| StoreError::malformed("postgres dialect requires database.url"))?;
            let executor = PgExecutor::connect(
                url,
                config.max_connections,
                Duration::from_secs(config.acquire_timeout_secs),
            )
            .await?;
            Ok(Arc::new(executor))
        }
        Dialect::Oracle => {
            let username = config.username.as_deref().ok_or_else(|| {
                StoreError::malformed("oracle dialect requires database.username")
            })?;
            let password = config.password.as_deref().ok_or_else(|| {
                StoreError::malformed("oracle dialect requires database.password")
            })?;
            let connect_string = config.connect_string.as_deref().ok_or_else(|| {
                StoreError::malformed("oracle dialect requires database.connect_string")
            })?;
            let executor = OracleExecutor::connect(
                username,
                password,
                connect_string,
                config.max_connections,
            )
            .await?;
            Ok(Arc::new(executor))
        }
    }
}
