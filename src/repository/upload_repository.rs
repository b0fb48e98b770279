//! Upload ledger repository.
//!
//! Tracks certificate files handed to the import pipeline. The `uploads`
//! table carries one row per file: identity, origin (country/class), the
//! SHA-256 of the payload, and processing state.

use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::db::{QueryBuilder, QueryExecutor, Scalar};
use crate::domain::{CertClass, UploadRecord};
use crate::error::{Result, StoreError};
use crate::id::IdSource;
use crate::repository::mapping::{
    opt_instant, req_bool, req_i64, req_instant, req_text,
};
use crate::repository::{SqlEntity, SqlRepository};

impl SqlEntity for UploadRecord {
    const TABLE: &'static str = "uploads";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "file_name",
        "country",
        "cert_class",
        "sha256",
        "size_bytes",
        "processed",
        "uploaded_at",
        "processed_at",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn to_params(&self) -> Vec<Scalar> {
        vec![
            Scalar::text(&self.id),
            Scalar::text(&self.file_name),
            Scalar::text(&self.country),
            Scalar::text(self.class.as_str()),
            Scalar::text(&self.sha256),
            Scalar::Int(self.size_bytes),
            Scalar::Bool(self.processed),
            Scalar::text(self.uploaded_at.to_rfc3339()),
            match &self.processed_at {
                Some(at) => Scalar::text(at.to_rfc3339()),
                None => Scalar::Null,
            },
        ]
    }

    fn from_row(row: &crate::db::Row) -> Result<UploadRecord> {
        let class_text = req_text(row, "cert_class")?;
        let class = CertClass::parse(&class_text).ok_or_else(|| {
            StoreError::malformed(format!("unknown cert_class value: {class_text}"))
        })?;
        Ok(UploadRecord {
            id: req_text(row, "id")?,
            file_name: req_text(row, "file_name")?,
            country: req_text(row, "country")?,
            class,
            sha256: req_text(row, "sha256")?,
            size_bytes: req_i64(row, "size_bytes")?,
            processed: req_bool(row, "processed")?,
            uploaded_at: req_instant(row, "uploaded_at")?,
            processed_at: opt_instant(row, "processed_at")?,
        })
    }
}

pub struct UploadRepository {
    inner: SqlRepository<UploadRecord>,
    ids: Arc<dyn IdSource>,
}

impl UploadRepository {
    pub fn new(executor: Arc<dyn QueryExecutor>, ids: Arc<dyn IdSource>) -> UploadRepository {
        UploadRepository {
            inner: SqlRepository::new(executor),
            ids,
        }
    }

    /// Register an uploaded file. The payload digest is computed here so the
    /// ledger never trusts caller-supplied hashes. Returns the record and
    /// whether it was actually written (`false` on a PostgreSQL duplicate;
    /// Oracle raises instead, see `SqlRepository::insert`).
    pub async fn create(
        &self,
        file_name: &str,
        country: &str,
        class: CertClass,
        payload: &[u8],
    ) -> Result<(UploadRecord, bool)> {
        let record = UploadRecord {
            id: self.ids.next_id(),
            file_name: file_name.to_string(),
            country: country.to_string(),
            class,
            sha256: hex::encode(Sha256::digest(payload)),
            size_bytes: payload.len() as i64,
            processed: false,
            uploaded_at: Utc::now(),
            processed_at: None,
        };
        let applied = self.inner.insert(&record).await?;
        info!(id = %record.id, file_name, country, applied, "registered upload");
        Ok((record, applied))
    }

    pub async fn get(&self, id: &str) -> Result<UploadRecord> {
        self.inner.get(id).await
    }

    pub async fn exists(&self, id: &str) -> Result<bool> {
        self.inner.exists(id).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        self.inner.delete(id).await
    }

    /// Mark an upload processed, stamping the server-side clock so the
    /// ledger timestamp cannot drift from the database's own time.
    pub async fn mark_processed(&self, id: &str) -> Result<bool> {
        let dialect = self.inner.dialect();
        let mut q = QueryBuilder::new(dialect);
        q.push("UPDATE uploads SET processed = ")
            .push(dialect.boolean_literal(true))
            .push(", processed_at = ")
            .push(dialect.timestamp_now())
            .push(" WHERE id = ")
            .bind(Scalar::text(id));
        let affected = self.inner.executor().execute(q.sql(), q.params()).await?;
        Ok(affected > 0)
    }

    pub async fn find_by_sha256(&self, sha256: &str) -> Result<Option<UploadRecord>> {
        let mut q = QueryBuilder::new(self.inner.dialect());
        q.push("SELECT ")
            .push(&UploadRecord::COLUMNS.join(", "))
            .push(" FROM uploads WHERE sha256 = ")
            .bind(Scalar::text(sha256));
        let rows = self.inner.executor().fetch(q.sql(), q.params()).await?;
        rows.first().map(UploadRecord::from_row).transpose()
    }

    /// One page of a country's uploads, newest first.
    pub async fn page_by_country(
        &self,
        country: &str,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<UploadRecord>> {
        let dialect = self.inner.dialect();
        let mut q = QueryBuilder::new(dialect);
        q.push("SELECT ")
            .push(&UploadRecord::COLUMNS.join(", "))
            .push(" FROM uploads WHERE country = ")
            .bind(Scalar::text(country));
        q.push(" ORDER BY uploaded_at DESC, id ")
            .push(&dialect.pagination_clause(limit, offset));
        let rows = self.inner.executor().fetch(q.sql(), q.params()).await?;
        rows.iter().map(UploadRecord::from_row).collect()
    }

    pub async fn count_unprocessed(&self) -> Result<i64> {
        let dialect = self.inner.dialect();
        let sql = format!(
            "SELECT COUNT(*) AS n FROM uploads WHERE processed = {}",
            dialect.boolean_literal(false)
        );
        match self.inner.executor().fetch_scalar(&sql, &[]).await? {
            Scalar::Int(n) => Ok(n),
            Scalar::Text(s) => s
                .parse()
                .map_err(|_| StoreError::malformed("COUNT(*) did not return an integer")),
            other => Err(StoreError::malformed(format!("COUNT(*) returned {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Dialect;
    use crate::test_utils::fixtures::{upload_row, FakeExecutor, SequentialIds};

    fn repo(executor: Arc<FakeExecutor>) -> UploadRepository {
        UploadRepository::new(executor, Arc::new(SequentialIds::new()))
    }

    #[tokio::test]
    async fn create_digests_payload_and_binds_all_columns() {
        let executor = Arc::new(FakeExecutor::new(Dialect::Postgres));
        executor.push_affected(1);
        let repo = repo(executor.clone());

        let (record, applied) = repo
            .create("kr_dsc_batch.ldif", "KR", CertClass::Dsc, b"payload")
            .await
            .unwrap();
        assert!(applied);
        assert_eq!(record.id, "id-1");
        assert_eq!(record.size_bytes, 7);
        assert_eq!(
            record.sha256,
            hex::encode(Sha256::digest(b"payload"))
        );

        let (sql, params) = executor.last_call();
        assert!(sql.starts_with("INSERT INTO uploads (id, file_name, country"));
        assert_eq!(params[0], Scalar::text("id-1"));
        assert_eq!(params[2], Scalar::text("KR"));
        assert_eq!(params[6], Scalar::Bool(false));
        assert_eq!(params[8], Scalar::Null);
    }

    #[tokio::test]
    async fn mark_processed_uses_server_clock_and_boolean_literal() {
        let executor = Arc::new(FakeExecutor::new(Dialect::Oracle));
        executor.push_affected(1);
        let oracle_repo = repo(executor.clone());
        assert!(oracle_repo.mark_processed("u-1").await.unwrap());
        let (sql, params) = executor.last_call();
        assert_eq!(
            sql,
            "UPDATE uploads SET processed = 1, processed_at = SYSTIMESTAMP WHERE id = :1"
        );
        assert_eq!(params, vec![Scalar::text("u-1")]);

        let executor = Arc::new(FakeExecutor::new(Dialect::Postgres));
        executor.push_affected(1);
        let repo = repo(executor.clone());
        repo.mark_processed("u-1").await.unwrap();
        let (sql, _) = executor.last_call();
        assert_eq!(
            sql,
            "UPDATE uploads SET processed = TRUE, processed_at = now() WHERE id = $1"
        );
    }

    #[tokio::test]
    async fn page_by_country_binds_country_and_paginates() {
        let executor = Arc::new(FakeExecutor::new(Dialect::Postgres));
        executor.push_rows(vec![]);
        let repo = repo(executor.clone());
        repo.page_by_country("KR", 10, 20).await.unwrap();
        let (sql, params) = executor.last_call();
        assert!(sql.contains("WHERE country = $1"));
        assert!(sql.ends_with("ORDER BY uploaded_at DESC, id LIMIT 10 OFFSET 20"));
        assert_eq!(params, vec![Scalar::text("KR")]);
    }

    #[tokio::test]
    async fn count_unprocessed_uses_dialect_boolean_literal() {
        let executor = Arc::new(FakeExecutor::new(Dialect::Oracle));
        executor.push_scalar(Scalar::text("3"));
        let repo = repo(executor.clone());
        assert_eq!(repo.count_unprocessed().await.unwrap(), 3);
        let (sql, _) = executor.last_call();
        assert!(sql.ends_with("WHERE processed = 0"), "{sql}");
    }

    #[tokio::test]
    async fn find_by_sha256_maps_returned_row() {
        let executor = Arc::new(FakeExecutor::new(Dialect::Postgres));
        let record = UploadRecord {
            id: "u-9".into(),
            file_name: "de_csca.ldif".into(),
            country: "DE".into(),
            class: CertClass::Csca,
            sha256: "cd".repeat(32),
            size_bytes: 512,
            processed: true,
            uploaded_at: Utc::now(),
            processed_at: Some(Utc::now()),
        };
        executor.push_rows(vec![upload_row(&record)]);
        let repo = repo(executor);
        let found = repo.find_by_sha256(&"cd".repeat(32)).await.unwrap().unwrap();
        assert_eq!(found.id, "u-9");
        assert_eq!(found.class, CertClass::Csca);
        assert!(found.processed);
    }
}
