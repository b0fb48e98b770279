pub mod certificate;
pub mod models;

pub use certificate::{
    CertClass, CertificateRecord, DnComponents, SearchCriteria, SearchResult,
};
pub use models::{AuditEvent, UploadRecord};
