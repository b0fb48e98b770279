//! Relational domain entities.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::certificate::CertClass;

/// One uploaded certificate file in the upload ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadRecord {
    pub id: String,
    pub file_name: String,
    pub country: String,
    pub class: CertClass,
    pub sha256: String,
    pub size_bytes: i64,
    pub processed: bool,
    pub uploaded_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Append-only audit trail entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    pub id: String,
    pub actor: String,
    pub action: String,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}
