//! # Bind Parameter Values
//!
//! Dynamic bind-parameter values for runtime-assembled SQL.
//!
//! The repository builds statements as strings with `$n` placeholders, so
//! the values travelling with them cannot be typed at compile time. This
//! enum covers the types the backend actually binds; each variant maps to
//! the matching sqlx encoder.

use std::fmt;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::Postgres;
use uuid::Uuid;

/// A single positional bind value.
///
/// ## Usage
/// ```rust
/// use atlas_db::SqlValue;
///
/// let params: Vec<SqlValue> = vec!["alice".into(), 42_i64.into(), true.into()];
/// ```
///
/// `Option<T>` converts too: `None` becomes SQL `NULL`.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
}

impl SqlValue {
    /// Binds this value as the next positional parameter.
    pub(crate) fn bind(
        self,
        query: Query<'_, Postgres, PgArguments>,
    ) -> Query<'_, Postgres, PgArguments> {
        match self {
            SqlValue::Null => query.bind(Option::<String>::None),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Int(v) => query.bind(v),
            SqlValue::Float(v) => query.bind(v),
            SqlValue::Text(v) => query.bind(v),
            SqlValue::Uuid(v) => query.bind(v),
            SqlValue::Timestamp(v) => query.bind(v),
            SqlValue::Json(v) => query.bind(v),
        }
    }
}

/// Log rendering. Values appear in query logs verbatim; callers must not
/// bind unredacted secrets.
impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(v) => write!(f, "{}", v),
            SqlValue::Int(v) => write!(f, "{}", v),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Text(v) => write!(f, "'{}'", v),
            SqlValue::Uuid(v) => write!(f, "'{}'", v),
            SqlValue::Timestamp(v) => write!(f, "'{}'", v.to_rfc3339()),
            SqlValue::Json(v) => write!(f, "{}", v),
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v as i64)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl From<serde_json::Value> for SqlValue {
    fn from(v: serde_json::Value) -> Self {
        SqlValue::Json(v)
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => SqlValue::Null,
        }
    }
}

/// Renders a parameter list for query logs: `[$1, $2, ...]` order.
pub(crate) fn render_params(params: &[SqlValue]) -> String {
    let rendered: Vec<String> = params.iter().map(|p| p.to_string()).collect();
    format!("[{}]", rendered.join(", "))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(SqlValue::from("a"), SqlValue::Text("a".to_string()));
        assert_eq!(SqlValue::from(7_i32), SqlValue::Int(7));
        assert_eq!(SqlValue::from(Option::<i64>::None), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(true)), SqlValue::Bool(true));
    }

    #[test]
    fn test_display_rendering() {
        assert_eq!(SqlValue::Null.to_string(), "NULL");
        assert_eq!(SqlValue::Text("x".into()).to_string(), "'x'");
        assert_eq!(SqlValue::Int(-3).to_string(), "-3");
    }

    #[test]
    fn test_render_params() {
        let params = vec![SqlValue::from("a"), SqlValue::from(1_i64), SqlValue::Null];
        assert_eq!(render_params(&params), "['a', 1, NULL]");
    }
}
