//! Typed bind values for the generated SQL.

use serde_json::Value;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;

/// A value bound to a PostgreSQL placeholder. Each variant binds with its native type so
/// the placeholder casts in the generated SQL line up.
#[derive(Clone, Debug, PartialEq)]
pub enum PgBindValue {
    Json(Value),
    Text(String),
    TextArray(Vec<String>),
    Uuid(uuid::Uuid),
    F64(f64),
    I64(i64),
}

impl PgBindValue {
    /// Dotted field path as a `text[]` for the `#>` operator.
    pub fn path(field: &str) -> Self {
        PgBindValue::TextArray(field.split('.').map(str::to_string).collect())
    }
}

impl From<Value> for PgBindValue {
    fn from(v: Value) -> Self {
        PgBindValue::Json(v)
    }
}

/// Bind every value in order.
pub fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: Vec<PgBindValue>,
) -> Query<'q, Postgres, PgArguments> {
    for p in params {
        query = match p {
            PgBindValue::Json(v) => query.bind(sqlx::types::Json(v)),
            PgBindValue::Text(s) => query.bind(s),
            PgBindValue::TextArray(v) => query.bind(v),
            PgBindValue::Uuid(u) => query.bind(u),
            PgBindValue::F64(n) => query.bind(n),
            PgBindValue::I64(n) => query.bind(n),
        };
    }
    query
}
