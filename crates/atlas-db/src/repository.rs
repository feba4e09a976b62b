//! # Generic Repository
//!
//! Structured query building over one table, without string-concatenation
//! injection risk.
//!
//! ## Query Assembly
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    How a find_all Call Becomes SQL                      │
//! │                                                                         │
//! │  FindOptions {                                                         │
//! │      columns:  ["users.id", "users.name"],                             │
//! │      filters:  ["users.email = $1", "users.deleted_at IS NULL"],       │
//! │      binding:  ["a@b.c"],                                              │
//! │      order_by: ["users.name ASC"],                                     │
//! │      limit:    Some(20),                                               │
//! │  }                                                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SELECT users.id, users.name FROM users                                │
//! │  WHERE users.email = $1 AND users.deleted_at IS NULL                   │
//! │  ORDER BY users.name ASC LIMIT 20            + binding ["a@b.c"]       │
//! │                                                                         │
//! │  Caller data only ever lands in bind values; filter fragments are      │
//! │  written by the repository's OWNER, not derived from request input.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guard Rails
//! - update/delete refuse an empty filter list (no implied full-table ops)
//! - `find_by_id` refuses to run without a configured primary key
//! - a repository can enforce explicit column lists, rejecting `*`
//! - soft deletion is an explicit per-repository flag, never inferred

use sqlx::postgres::PgRow;
use sqlx::FromRow;

use crate::error::{DbError, DbResult};
use crate::pool::Pool;
use crate::value::SqlValue;

/// Limit value meaning "no LIMIT clause".
pub const UNLIMITED: i64 = -1;

/// Column/value pairs for insert and update.
///
/// `None` marks an absent value: the column is stripped before SQL is
/// built (distinct from `Some(SqlValue::Null)`, which binds SQL `NULL`).
pub type ColumnValues = Vec<(String, Option<SqlValue>)>;

/// What `find_one` does when no row matches.
#[derive(Debug)]
pub enum RejectOnEmpty {
    /// Return this exact error.
    Error(DbError),
    /// Return a NotFound-class error carrying this message.
    Message(String),
}

impl From<&str> for RejectOnEmpty {
    fn from(message: &str) -> Self {
        RejectOnEmpty::Message(message.to_string())
    }
}

impl From<String> for RejectOnEmpty {
    fn from(message: String) -> Self {
        RejectOnEmpty::Message(message)
    }
}

impl From<DbError> for RejectOnEmpty {
    fn from(err: DbError) -> Self {
        RejectOnEmpty::Error(err)
    }
}

/// Structured parameters for the find family.
///
/// Filter fragments are ANDed together; their `$n` placeholders index into
/// `binding` and are renumbered automatically when the statement consumes
/// earlier positional parameters (update's SET clause).
#[derive(Debug, Default)]
pub struct FindOptions {
    /// Columns to select. Empty means `table.*`.
    pub columns: Vec<String>,
    /// WHERE fragments, ANDed.
    pub filters: Vec<String>,
    /// Positional bind values for the filters.
    pub binding: Vec<SqlValue>,
    /// JOIN clauses, verbatim.
    pub joins: Vec<String>,
    /// GROUP BY expressions.
    pub group_by: Vec<String>,
    /// ORDER BY expressions.
    pub order_by: Vec<String>,
    /// Row limit. `None` uses the repository default; [`UNLIMITED`] drops
    /// the clause.
    pub limit: Option<i64>,
    /// Row offset.
    pub offset: Option<i64>,
    /// Only consulted by `find_one`.
    pub reject_on_empty: Option<RejectOnEmpty>,
}

/// Parameters for `update`.
#[derive(Debug)]
pub struct UpdateOptions {
    /// Columns to assign; absent values are stripped.
    pub data: ColumnValues,
    /// WHERE fragments, ANDed. Must not be empty.
    pub filters: Vec<String>,
    /// Bind values for the filters, `$1`-based; shifted past the SET
    /// clause automatically.
    pub binding: Vec<SqlValue>,
}

/// Parameters for `delete`.
#[derive(Debug, Default)]
pub struct DeleteOptions {
    /// WHERE fragments, ANDed. Must not be empty.
    pub filters: Vec<String>,
    /// Bind values for the filters.
    pub binding: Vec<SqlValue>,
}

/// Stateless data-access façade over one table.
///
/// ## Usage
/// ```rust,ignore
/// let users = Repository::new(pool.clone(), "users").soft_delete(true);
///
/// let user: Option<UserRow> = users.find_by_id(id.into(), vec![]).await?;
/// let created: UserRow = users
///     .create(vec![
///         ("name".into(), Some("Alice".into())),
///         ("email".into(), Some("alice@example.com".into())),
///     ])
///     .await?;
/// ```
///
/// Holds nothing but its configuration and a pool handle; when the handle
/// has an active transaction the repository's statements run inside it.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: Pool,
    table: String,
    /// Primary key column; empty disables `find_by_id`.
    primary_key: String,
    /// Delete via `deleted_at` timestamp instead of removing rows.
    soft_delete: bool,
    /// Default row limit when a find call does not set one.
    default_limit: i64,
    /// Reject caller-supplied `*` columns.
    explicit_columns: bool,
}

impl Repository {
    /// Creates a repository for `table` with an `id` primary key, hard
    /// deletes, a 100-row default limit and permissive columns.
    pub fn new(pool: Pool, table: impl Into<String>) -> Self {
        Repository {
            pool,
            table: table.into(),
            primary_key: "id".to_string(),
            soft_delete: false,
            default_limit: 100,
            explicit_columns: false,
        }
    }

    /// Sets the primary key column. An empty name disables `find_by_id`.
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    /// Switches `delete` to setting `deleted_at` instead of removing rows.
    pub fn soft_delete(mut self, soft: bool) -> Self {
        self.soft_delete = soft;
        self
    }

    /// Sets the default row limit ([`UNLIMITED`] for none).
    pub fn default_limit(mut self, limit: i64) -> Self {
        self.default_limit = limit;
        self
    }

    /// Requires callers to name their columns, rejecting `*`.
    /// Defense against full-row leaks through joins.
    pub fn explicit_columns(mut self, explicit: bool) -> Self {
        self.explicit_columns = explicit;
        self
    }

    /// The table this repository serves.
    pub fn table(&self) -> &str {
        &self.table
    }

    // =========================================================================
    // Find
    // =========================================================================

    /// Runs a SELECT built from `options` and decodes every row.
    pub async fn find_all<T>(&self, options: FindOptions) -> DbResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, PgRow>,
    {
        let (sql, binding) = self.build_select(&options, 0)?;
        self.pool.query(&sql, binding).await?.decode()
    }

    /// Count plus data for the same filter set.
    ///
    /// Two round trips, deliberately not wrapped in a transaction; read
    /// skew between the count and the rows is accepted.
    pub async fn find_and_count_all<T>(&self, options: FindOptions) -> DbResult<(Vec<T>, i64)>
    where
        T: for<'r> FromRow<'r, PgRow>,
    {
        let (count_sql, count_binding) = self.build_count(&options)?;
        let count_result = self.pool.query(&count_sql, count_binding).await?;
        let total: i64 = count_result
            .rows
            .first()
            .map(|row| sqlx::Row::try_get(row, 0))
            .transpose()
            .map_err(|e| DbError::Decode(e.to_string()))?
            .unwrap_or(0);

        let rows = self.find_all(options).await?;
        Ok((rows, total))
    }

    /// First matching row, or `None`.
    ///
    /// With `reject_on_empty` set, absence becomes the supplied error (or
    /// a NotFound error built from the supplied message). Ordinary absence
    /// never fails unless explicitly asked to.
    pub async fn find_one<T>(&self, mut options: FindOptions) -> DbResult<Option<T>>
    where
        T: for<'r> FromRow<'r, PgRow>,
    {
        options.limit = Some(1);
        let reject = options.reject_on_empty.take();

        let mut rows = self.find_all::<T>(options).await?;
        match rows.pop() {
            Some(row) => Ok(Some(row)),
            None => match reject {
                None => Ok(None),
                Some(RejectOnEmpty::Error(err)) => Err(err),
                Some(RejectOnEmpty::Message(message)) => Err(DbError::not_found(message)),
            },
        }
    }

    /// Looks a row up by primary key.
    ///
    /// Fails fast when this repository has no primary key configured.
    pub async fn find_by_id<T>(&self, id: SqlValue, columns: Vec<String>) -> DbResult<Option<T>>
    where
        T: for<'r> FromRow<'r, PgRow>,
    {
        if self.primary_key.is_empty() {
            return Err(DbError::RepositoryUsage(format!(
                "repository for {} has no primary key column",
                self.table
            )));
        }

        let options = FindOptions {
            columns,
            filters: vec![format!("{}.{} = $1", self.table, self.primary_key)],
            binding: vec![id],
            ..FindOptions::default()
        };
        self.find_one(options).await
    }

    // =========================================================================
    // Write
    // =========================================================================

    /// Inserts one row and returns it (`RETURNING *`).
    pub async fn create<T>(&self, data: ColumnValues) -> DbResult<T>
    where
        T: for<'r> FromRow<'r, PgRow>,
    {
        let (sql, binding) = self.build_insert(&data)?;
        let result = self.pool.query(&sql, binding).await?;
        result
            .decode()?
            .pop()
            .ok_or_else(|| DbError::Internal(format!("insert into {} returned no row", self.table)))
    }

    /// Updates matching rows and returns the first `RETURNING` row.
    ///
    /// An empty filter list fails before any SQL is issued: repository-wide
    /// updates must be spelled out, never implied by omission.
    pub async fn update<T>(&self, options: UpdateOptions) -> DbResult<Option<T>>
    where
        T: for<'r> FromRow<'r, PgRow>,
    {
        let (sql, binding) = self.build_update(&options)?;
        let result = self.pool.query(&sql, binding).await?;
        Ok(result.decode()?.into_iter().next())
    }

    /// Deletes matching rows, returning how many were affected.
    ///
    /// Same empty-filter guard as `update`. With soft deletion configured
    /// this is an UPDATE stamping `deleted_at`; rows stay in the table.
    pub async fn delete(&self, options: DeleteOptions) -> DbResult<u64> {
        let (sql, binding) = self.build_delete(&options)?;
        let result = self.pool.query(&sql, binding).await?;
        Ok(result.row_count)
    }

    // =========================================================================
    // SQL Assembly
    // =========================================================================

    /// Builds the SELECT for `options`, shifting filter placeholders by
    /// `placeholder_offset` positions.
    fn build_select(
        &self,
        options: &FindOptions,
        placeholder_offset: usize,
    ) -> DbResult<(String, Vec<SqlValue>)> {
        let columns = if options.columns.is_empty() {
            format!("{}.*", self.table)
        } else {
            self.check_columns(&options.columns)?;
            options.columns.join(", ")
        };

        let mut sql = format!("SELECT {} FROM {}", columns, self.table);
        self.push_joins_and_filters(&mut sql, options, placeholder_offset);

        if !options.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&options.group_by.join(", "));
        }
        if !options.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&options.order_by.join(", "));
        }

        let limit = options.limit.unwrap_or(self.default_limit);
        if limit != UNLIMITED {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = options.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        Ok((sql, options.binding.clone()))
    }

    /// COUNT(1) twin of `build_select`: same joins and filters, no
    /// grouping/ordering/pagination.
    fn build_count(&self, options: &FindOptions) -> DbResult<(String, Vec<SqlValue>)> {
        let mut sql = format!("SELECT COUNT(1) AS total FROM {}", self.table);
        self.push_joins_and_filters(&mut sql, options, 0);
        Ok((sql, options.binding.clone()))
    }

    fn build_insert(&self, data: &ColumnValues) -> DbResult<(String, Vec<SqlValue>)> {
        let present: Vec<(&str, &SqlValue)> = data
            .iter()
            .filter_map(|(column, value)| value.as_ref().map(|v| (column.as_str(), v)))
            .collect();
        if present.is_empty() {
            return Err(DbError::RepositoryUsage(format!(
                "insert into {} with no values",
                self.table
            )));
        }

        let columns: Vec<&str> = present.iter().map(|(column, _)| *column).collect();
        let placeholders: Vec<String> = (1..=present.len()).map(|i| format!("${}", i)).collect();
        let binding: Vec<SqlValue> = present.iter().map(|(_, value)| (*value).clone()).collect();

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
            self.table,
            columns.join(", "),
            placeholders.join(", ")
        );
        Ok((sql, binding))
    }

    fn build_update(&self, options: &UpdateOptions) -> DbResult<(String, Vec<SqlValue>)> {
        if options.filters.is_empty() {
            return Err(DbError::RepositoryUsage(format!(
                "update on {} requires an explicit filter",
                self.table
            )));
        }

        let present: Vec<(&str, &SqlValue)> = options
            .data
            .iter()
            .filter_map(|(column, value)| value.as_ref().map(|v| (column.as_str(), v)))
            .collect();
        if present.is_empty() {
            return Err(DbError::RepositoryUsage(format!(
                "update on {} with no values",
                self.table
            )));
        }

        let mut binding: Vec<SqlValue> = Vec::with_capacity(present.len() + options.binding.len());
        let assignments: Vec<String> = present
            .iter()
            .enumerate()
            .map(|(i, (column, value))| {
                binding.push((*value).clone());
                format!("{} = ${}", column, i + 1)
            })
            .collect();

        // Filter placeholders follow the SET clause's parameters
        let offset = binding.len();
        let clauses: Vec<String> = options
            .filters
            .iter()
            .map(|fragment| shift_placeholders(fragment, offset))
            .collect();
        binding.extend(options.binding.iter().cloned());

        let sql = format!(
            "UPDATE {} SET {} WHERE {} RETURNING *",
            self.table,
            assignments.join(", "),
            clauses.join(" AND ")
        );
        Ok((sql, binding))
    }

    fn build_delete(&self, options: &DeleteOptions) -> DbResult<(String, Vec<SqlValue>)> {
        if options.filters.is_empty() {
            return Err(DbError::RepositoryUsage(format!(
                "delete on {} requires an explicit filter",
                self.table
            )));
        }

        let clauses = options.filters.join(" AND ");
        let sql = if self.soft_delete {
            format!(
                "UPDATE {} SET deleted_at = now() WHERE {}",
                self.table, clauses
            )
        } else {
            format!("DELETE FROM {} WHERE {}", self.table, clauses)
        };
        Ok((sql, options.binding.clone()))
    }

    fn push_joins_and_filters(
        &self,
        sql: &mut String,
        options: &FindOptions,
        placeholder_offset: usize,
    ) {
        for join in &options.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        if !options.filters.is_empty() {
            let clauses: Vec<String> = options
                .filters
                .iter()
                .map(|fragment| shift_placeholders(fragment, placeholder_offset))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
    }

    fn check_columns(&self, columns: &[String]) -> DbResult<()> {
        if !self.explicit_columns {
            return Ok(());
        }
        if columns.iter().any(|column| column.trim() == "*") {
            return Err(DbError::RepositoryUsage(format!(
                "wildcard column rejected for {}; name the columns explicitly",
                self.table
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Placeholder Shifting
// =============================================================================

/// Renumbers `$n` placeholders in a filter fragment by `offset` positions.
///
/// `$` not followed by digits passes through untouched (dollar-quoted
/// strings aside, filters are short comparison fragments).
fn shift_placeholders(fragment: &str, offset: usize) -> String {
    if offset == 0 {
        return fragment.to_string();
    }

    let mut out = String::with_capacity(fragment.len() + 4);
    let mut chars = fragment.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let mut digits = String::new();
        while let Some(&next) = chars.peek() {
            if !next.is_ascii_digit() {
                break;
            }
            digits.push(next);
            chars.next();
        }

        match digits.parse::<usize>() {
            Ok(index) => out.push_str(&format!("${}", index + offset)),
            Err(_) => {
                out.push('$');
                out.push_str(&digits);
            }
        }
    }

    out
}

// =============================================================================
// Unit Tests
// =============================================================================
