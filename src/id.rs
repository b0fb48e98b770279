//! Identifier generation.
//!
//! Repositories never call a global generator directly; they hold an
//! `IdSource` so tests can supply deterministic identifiers.

use std::sync::Arc;

pub trait IdSource: Send + Sync {
    fn next_id(&self) -> String;
}

/// Production source: random version-4 UUIDs.
pub struct UuidSource;

impl IdSource for UuidSource {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

pub fn default_id_source() -> Arc<dyn IdSource> {
    Arc::new(UuidSource)
}
