//! Audit trail repository. Append-only; rows are never updated.

use std::sync::Arc;

use chrono::Utc;

use crate::db::{QueryBuilder, QueryExecutor, Scalar};
use crate::domain::AuditEvent;
use crate::error::Result;
use crate::id::IdSource;
use crate::repository::mapping::{opt_text, req_instant, req_text};
use crate::repository::{SqlEntity, SqlRepository};

impl SqlEntity for AuditEvent {
    const TABLE: &'static str = "audit_events";
    const COLUMNS: &'static [&'static str] =
        &["id", "actor", "action", "detail", "occurred_at"];

    fn id(&self) -> &str {
        &self.id
    }

    fn to_params(&self) -> Vec<Scalar> {
        vec![
            Scalar::text(&self.id),
            Scalar::text(&self.actor),
            Scalar::text(&self.action),
            match &self.detail {
                Some(d) => Scalar::text(d),
                None => Scalar::Null,
            },
            Scalar::text(self.at.to_rfc3339()),
        ]
    }

    fn from_row(row: &crate::db::Row) -> Result<AuditEvent> {
        Ok(AuditEvent {
            id: req_text(row, "id")?,
            actor: req_text(row, "actor")?,
            action: req_text(row, "action")?,
            detail: opt_text(row, "detail"),
            at: req_instant(row, "occurred_at")?,
        })
    }
}

pub struct AuditRepository {
    inner: SqlRepository<AuditEvent>,
    ids: Arc<dyn IdSource>,
}

impl AuditRepository {
    pub fn new(executor: Arc<dyn QueryExecutor>, ids: Arc<dyn IdSource>) -> AuditRepository {
        AuditRepository {
            inner: SqlRepository::new(executor),
            ids,
        }
    }

    pub async fn record(
        &self,
        actor: &str,
        action: &str,
        detail: Option<&str>,
    ) -> Result<AuditEvent> {
        let event = AuditEvent {
            id: self.ids.next_id(),
            actor: actor.to_string(),
            action: action.to_string(),
            detail: detail.map(str::to_string),
            at: Utc::now(),
        };
        self.inner.insert(&event).await?;
        Ok(event)
    }

    /// Record an event with structured detail, stored as JSON text.
    pub async fn record_data(
        &self,
        actor: &str,
        action: &str,
        data: &serde_json::Value,
    ) -> Result<AuditEvent> {
        self.record(actor, action, Some(&data.to_string())).await
    }

    pub async fn recent(&self, limit: u64) -> Result<Vec<AuditEvent>> {
        self.inner.page("occurred_at DESC, id", limit, 0).await
    }

    pub async fn by_actor(
        &self,
        actor: &str,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<AuditEvent>> {
        let dialect = self.inner.dialect();
        let mut q = QueryBuilder::new(dialect);
        q.push("SELECT ")
            .push(&AuditEvent::COLUMNS.join(", "))
            .push(" FROM audit_events WHERE actor = ")
            .bind(Scalar::text(actor));
        q.push(" ORDER BY occurred_at DESC, id ")
            .push(&dialect.pagination_clause(limit, offset));
        let rows = self.inner.executor().fetch(q.sql(), q.params()).await?;
        rows.iter().map(AuditEvent::from_row).collect()
    }
}
