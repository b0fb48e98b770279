//! Logical query construction.
//!
//! A `QueryBuilder` pairs the SQL text with its ordered bound parameters.
//! `bind` appends the dialect placeholder and the value in one step, so the
//! placeholder count always equals the parameter count by construction.

use crate::db::dialect::Dialect;
use crate::db::value::Scalar;

pub struct QueryBuilder {
    dialect: Dialect,
    sql: String,
    params: Vec<Scalar>,
}

impl QueryBuilder {
    pub fn new(dialect: Dialect) -> QueryBuilder {
        QueryBuilder {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Append raw SQL text. Only dialect-fixed fragments belong here:
    /// keywords, column lists, and Dialect policy outputs. Values that
    /// originate outside the process go through `bind`.
    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Append a bind placeholder and register its value.
    pub fn bind(&mut self, value: Scalar) -> &mut Self {
        self.params.push(value);
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
        self
    }

    /// Append a comma-separated placeholder list for the given values, e.g.
    /// for an INSERT VALUES tuple.
    pub fn bind_all(&mut self, values: impl IntoIterator<Item = Scalar>) -> &mut Self {
        for (i, value) in values.into_iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.bind(value);
        }
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Scalar] {
        &self.params
    }
}
