//! Dialect policy: the only place dialect-specific SQL text is produced.
//!
//! Everything here is pure. Repositories concatenate these outputs into query
//! text; any value that originates outside the process travels as a bound
//! parameter instead, never as a literal.

use std::str::FromStr;

use crate::db::value::Scalar;
use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Oracle,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::Oracle => "oracle",
        }
    }

    /// Boolean literal for WHERE clauses. Oracle has no boolean column type;
    /// flags are stored as NUMBER(1) with 1/0.
    pub fn boolean_literal(&self, value: bool) -> &'static str {
        match (self, value) {
            (Dialect::Postgres, true) => "TRUE",
            (Dialect::Postgres, false) => "FALSE",
            (Dialect::Oracle, true) => "1",
            (Dialect::Oracle, false) => "0",
        }
    }

    /// Row-restriction clause, appended after ORDER BY. Neither form affects
    /// ordering; results stay in ORDER BY order.
    pub fn pagination_clause(&self, limit: u64, offset: u64) -> String {
        match self {
            Dialect::Postgres => format!("LIMIT {limit} OFFSET {offset}"),
            Dialect::Oracle => format!("OFFSET {offset} ROWS FETCH FIRST {limit} ROWS ONLY"),
        }
    }

    /// Server-side current-instant expression. Write paths use this instead
    /// of binding the application clock so app/database clock skew never
    /// produces inconsistent timestamps.
    pub fn timestamp_now(&self) -> &'static str {
        match self {
            Dialect::Postgres => "now()",
            Dialect::Oracle => "SYSTIMESTAMP",
        }
    }

    /// Positional bind placeholder, 1-based.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Oracle => format!(":{index}"),
        }
    }

    /// Hex literal for binary payloads. Certificate binaries are stored as
    /// hex-encoded byte strings with the dialect's escape form.
    pub fn hex_literal(&self, bytes: &[u8]) -> String {
        match self {
            Dialect::Postgres => format!("'\\x{}'", hex::encode(bytes)),
            Dialect::Oracle => format!("HEXTORAW('{}')", hex::encode_upper(bytes)),
        }
    }
}

impl FromStr for Dialect {
    type Err = StoreError;

    // An unrecognized dialect tag is a programming/configuration error and
    // fails construction; it is never retried.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "oracle" => Ok(Dialect::Oracle),
            other => Err(StoreError::malformed(format!(
                "unsupported dialect tag: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hint for normalizing a text-transported scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeHint {
    Boolean,
    Numeric,
    Text,
}

/// Total normalization of a raw text scalar into the typed sum. Oracle's
/// driver surfaces booleans and numbers as text; this function (plus the
/// mapping helpers built on it) keeps downstream code dialect-independent.
/// Unrecognized input stays `Text`; required-field shape checks happen in the
/// mapping layer, not here.
pub fn coerce_scalar(raw: &str, hint: TypeHint) -> Scalar {
    match hint {
        TypeHint::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
            "t" | "true" | "1" => Scalar::Bool(true),
            "f" | "false" | "0" => Scalar::Bool(false),
            _ => Scalar::Text(raw.to_string()),
        },
        TypeHint::Numeric => {
            let trimmed = raw.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                Scalar::Int(i)
            } else if let Ok(r) = trimmed.parse::<f64>() {
                Scalar::Real(r)
            } else {
                Scalar::Text(raw.to_string())
            }
        }
        TypeHint::Text => Scalar::Text(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_literals_round_trip_through_coercion() {
        for dialect in [Dialect::Postgres, Dialect::Oracle] {
            for value in [true, false] {
                let literal = dialect.boolean_literal(value);
                assert_eq!(
                    coerce_scalar(literal, TypeHint::Boolean),
                    Scalar::Bool(value),
                    "{dialect} {value}"
                );
            }
        }
    }

    #[test]
    fn pagination_clause_per_dialect() {
        assert_eq!(
            Dialect::Postgres.pagination_clause(20, 40),
            "LIMIT 20 OFFSET 40"
        );
        assert_eq!(
            Dialect::Oracle.pagination_clause(20, 40),
            "OFFSET 40 ROWS FETCH FIRST 20 ROWS ONLY"
        );
    }

    #[test]
    fn placeholders_per_dialect() {
        assert_eq!(Dialect::Postgres.placeholder(1), "$1");
        assert_eq!(Dialect::Oracle.placeholder(3), ":3");
    }

    #[test]
    fn timestamp_now_differs_per_dialect() {
        assert_eq!(Dialect::Postgres.timestamp_now(), "now()");
        assert_eq!(Dialect::Oracle.timestamp_now(), "SYSTIMESTAMP");
    }

    #[test]
    fn hex_literal_forms() {
        assert_eq!(
            Dialect::Postgres.hex_literal(&[0xde, 0xad]),
            "'\\xdead'"
        );
        assert_eq!(
            Dialect::Oracle.hex_literal(&[0xde, 0xad]),
            "HEXTORAW('DEAD')"
        );
    }

    #[test]
    fn unknown_dialect_tag_fails_construction() {
        assert!(matches!(
            "sybase".parse::<Dialect>(),
            Err(StoreError::Malformed(_))
        ));
        assert_eq!("postgresql".parse::<Dialect>().unwrap(), Dialect::Postgres);
    }

    #[test]
    fn numeric_coercion_parses_int_then_real() {
        assert_eq!(coerce_scalar("42", TypeHint::Numeric), Scalar::Int(42));
        assert_eq!(coerce_scalar("4.5", TypeHint::Numeric), Scalar::Real(4.5));
        assert_eq!(
            coerce_scalar("n/a", TypeHint::Numeric),
            Scalar::Text("n/a".to_string())
        );
    }

    #[test]
    fn boolean_coercion_accepts_text_encodings() {
        assert_eq!(coerce_scalar("t", TypeHint::Boolean), Scalar::Bool(true));
        assert_eq!(coerce_scalar("TRUE", TypeHint::Boolean), Scalar::Bool(true));
        assert_eq!(coerce_scalar("0", TypeHint::Boolean), Scalar::Bool(false));
        assert_eq!(
            coerce_scalar("yes", TypeHint::Boolean),
            Scalar::Text("yes".to_string())
        );
    }
}
