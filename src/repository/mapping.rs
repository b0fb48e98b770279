//! Row-to-field mapping helpers.
//!
//! Every extractor is total over the normalized row: a missing or NULL
//! optional column becomes `None`, never a fault; text-encoded booleans and
//! integers (how Oracle transports them) are accepted everywhere a typed
//! value is. Only a required column that is absent or of an incompatible
//! shape fails, as malformed data naming the column.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::db::dialect::{coerce_scalar, TypeHint};
use crate::db::value::{Row, Scalar};
use crate::error::{Result, StoreError};

pub fn opt_text(row: &Row, column: &str) -> Option<String> {
    match row.get(column) {
        Some(Scalar::Text(s)) => Some(s.clone()),
        Some(Scalar::Int(i)) => Some(i.to_string()),
        Some(Scalar::Real(r)) => Some(r.to_string()),
        Some(Scalar::Bool(b)) => Some(b.to_string()),
        Some(Scalar::Null) | None => None,
    }
}

pub fn req_text(row: &Row, column: &str) -> Result<String> {
    opt_text(row, column).ok_or_else(|| missing(column))
}

pub fn opt_i64(row: &Row, column: &str) -> Result<Option<i64>> {
    match row.get(column) {
        Some(Scalar::Int(i)) => Ok(Some(*i)),
        Some(Scalar::Real(r)) if r.fract() == 0.0 => Ok(Some(*r as i64)),
        Some(Scalar::Text(s)) => match coerce_scalar(s, TypeHint::Numeric) {
            Scalar::Int(i) => Ok(Some(i)),
            _ => Err(incompatible(column, "integer")),
        },
        Some(Scalar::Null) | None => Ok(None),
        Some(_) => Err(incompatible(column, "integer")),
    }
}

pub fn req_i64(row: &Row, column: &str) -> Result<i64> {
    opt_i64(row, column)?.ok_or_else(|| missing(column))
}

pub fn opt_bool(row: &Row, column: &str) -> Result<Option<bool>> {
    match row.get(column) {
        Some(Scalar::Bool(b)) => Ok(Some(*b)),
        Some(Scalar::Int(0)) => Ok(Some(false)),
        Some(Scalar::Int(1)) => Ok(Some(true)),
        Some(Scalar::Text(s)) => match coerce_scalar(s, TypeHint::Boolean) {
            Scalar::Bool(b) => Ok(Some(b)),
            _ => Err(incompatible(column, "boolean")),
        },
        Some(Scalar::Null) | None => Ok(None),
        Some(_) => Err(incompatible(column, "boolean")),
    }
}

pub fn req_bool(row: &Row, column: &str) -> Result<bool> {
    opt_bool(row, column)?.ok_or_else(|| missing(column))
}

pub fn opt_real(row: &Row, column: &str) -> Result<Option<f64>> {
    match row.get(column) {
        Some(Scalar::Real(r)) => Ok(Some(*r)),
        Some(Scalar::Int(i)) => Ok(Some(*i as f64)),
        Some(Scalar::Text(s)) => match coerce_scalar(s, TypeHint::Numeric) {
            Scalar::Int(i) => Ok(Some(i as f64)),
            Scalar::Real(r) => Ok(Some(r)),
            _ => Err(incompatible(column, "real")),
        },
        Some(Scalar::Null) | None => Ok(None),
        Some(_) => Err(incompatible(column, "real")),
    }
}

/// Timestamps arrive as RFC 3339 text (both executors normalize to it), as
/// the backend's `YYYY-MM-DD HH:MM:SS[.fff]` text form, or as epoch seconds.
pub fn opt_instant(row: &Row, column: &str) -> Result<Option<DateTime<Utc>>> {
    match row.get(column) {
        Some(Scalar::Text(s)) => parse_instant(s)
            .map(Some)
            .ok_or_else(|| incompatible(column, "timestamp")),
        Some(Scalar::Int(secs)) => Ok(DateTime::<Utc>::from_timestamp(*secs, 0)),
        Some(Scalar::Null) | None => Ok(None),
        Some(_) => Err(incompatible(column, "timestamp")),
    }
}

pub fn req_instant(row: &Row, column: &str) -> Result<DateTime<Utc>> {
    opt_instant(row, column)?.ok_or_else(|| missing(column))
}

fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    None
}

fn missing(column: &str) -> StoreError {
    StoreError::malformed(format!("required column {column} is absent or null"))
}

fn incompatible(column: &str, expected: &str) -> StoreError {
    StoreError::malformed(format!("column {column} is not a valid {expected}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures::row_of;

    #[test]
    fn missing_optional_columns_become_absent_values() {
        let row = row_of(&[("id", Scalar::text("u-1"))]);
        assert_eq!(opt_text(&row, "note"), None);
        assert_eq!(opt_i64(&row, "size").unwrap(), None);
        assert_eq!(opt_bool(&row, "processed").unwrap(), None);
        assert_eq!(opt_instant(&row, "processed_at").unwrap(), None);
    }

    #[test]
    fn null_optional_columns_become_absent_values() {
        let row = row_of(&[("note", Scalar::Null)]);
        assert_eq!(opt_text(&row, "note"), None);
        assert_eq!(opt_bool(&row, "note").unwrap(), None);
    }

    #[test]
    fn text_encoded_booleans_and_integers_are_accepted() {
        let row = row_of(&[
            ("processed", Scalar::text("1")),
            ("flag", Scalar::text("f")),
            ("size", Scalar::text("2048")),
            ("ratio", Scalar::text("0.5")),
        ]);
        assert_eq!(req_bool(&row, "processed").unwrap(), true);
        assert_eq!(req_bool(&row, "flag").unwrap(), false);
        assert_eq!(req_i64(&row, "size").unwrap(), 2048);
        assert_eq!(opt_real(&row, "ratio").unwrap(), Some(0.5));
    }

    #[test]
    fn required_missing_column_is_malformed() {
        let row = row_of(&[("id", Scalar::text("u-1"))]);
        assert!(matches!(
            req_text(&row, "country"),
            Err(StoreError::Malformed(_))
        ));
        assert!(matches!(
            req_instant(&row, "uploaded_at"),
            Err(StoreError::Malformed(_))
        ));
    }

    #[test]
    fn incompatible_shape_is_malformed_not_defaulted() {
        let row = row_of(&[("size", Scalar::text("many"))]);
        assert!(matches!(
            req_i64(&row, "size"),
            Err(StoreError::Malformed(_))
        ));
    }

    #[test]
    fn instants_parse_rfc3339_backend_text_and_epoch() {
        let row = row_of(&[
            ("a", Scalar::text("2026-03-01T09:30:00+00:00")),
            ("b", Scalar::text("2026-03-01 09:30:00.250")),
            ("c", Scalar::Int(1_767_260_000)),
        ]);
        let a = req_instant(&row, "a").unwrap();
        let b = req_instant(&row, "b").unwrap();
        assert_eq!(a.timestamp(), b.timestamp());
        assert_eq!(req_instant(&row, "c").unwrap().timestamp(), 1_767_260_000);
    }
}
