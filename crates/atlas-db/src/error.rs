//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  PostgreSQL Error (sqlx::Error)                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds SQLSTATE, status class, query context    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  HTTP edge ← Maps DbError::status() onto a response status             │
//! │                                                                         │
//! │  Every error is logged at the point of failure AND propagated;         │
//! │  nothing is swallowed, nothing is retried inside this layer.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use atlas_core::ErrorStatus;

use crate::value::SqlValue;

/// SQLSTATE code PostgreSQL reports for unique-constraint violations.
const UNIQUE_VIOLATION: &str = "23505";

/// Database operation errors.
///
/// Query failures keep the normalized SQL and the bound values so a single
/// log line is enough to reproduce the statement. Bound values end up in
/// logs - callers must redact secrets before binding them.
#[derive(Debug, Error)]
pub enum DbError {
    /// Invalid or incomplete connection configuration.
    ///
    /// ## When This Occurs
    /// - Required connection parameter missing from the environment
    /// - Unparseable numeric/boolean setting
    ///
    /// Fatal at startup; nothing in this layer recovers from it.
    #[error("invalid database configuration: {0}")]
    Config(String),

    /// The pool could not establish or acquire a connection.
    ///
    /// ## When This Occurs
    /// - Server unreachable or credentials rejected
    /// - Acquire timeout elapsed while checking out a connection
    #[error("connection failed: {0}")]
    Connection(String),

    /// The driver rejected a statement.
    ///
    /// Classification: unique-violation (SQLSTATE 23505) maps to
    /// [`ErrorStatus::Conflict`], everything else to
    /// [`ErrorStatus::Internal`].
    #[error("query failed ({status}): {source}")]
    Query {
        /// SQLSTATE reported by the driver, when available.
        code: Option<String>,
        /// Status classification for the HTTP edge.
        status: ErrorStatus,
        /// Normalized text of the failing statement.
        sql: String,
        /// Values bound to the failing statement.
        params: Vec<SqlValue>,
        #[source]
        source: sqlx::Error,
    },

    /// A fetched row could not be mapped onto the requested type.
    #[error("row decode failed: {0}")]
    Decode(String),

    /// The transaction state machine was driven out of order.
    ///
    /// ## When This Occurs
    /// - commit/rollback before begin
    /// - commit/rollback on an already finished transaction
    /// - opening a transaction while another one is pinned
    ///
    /// Always a programming bug, never a recoverable runtime condition.
    #[error("transaction misuse: {0}")]
    TransactionUsage(String),

    /// A migration batch failed and was rolled back.
    #[error("migration failed: {0}")]
    Migration(String),

    /// The repository was called with arguments it refuses by contract.
    ///
    /// ## When This Occurs
    /// - update/delete with an empty filter list
    /// - find_by_id without a configured primary key
    /// - wildcard column where explicit columns are enforced
    #[error("repository misuse: {0}")]
    RepositoryUsage(String),

    /// Requested row absent and the caller asked for absence to be an error.
    #[error("{message}")]
    NotFound { message: String },

    /// Invariant violation inside this layer.
    #[error("internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Wraps a driver error together with the statement that caused it.
    pub(crate) fn query(source: sqlx::Error, sql: String, params: Vec<SqlValue>) -> Self {
        let code = source
            .as_database_error()
            .and_then(|db| db.code())
            .map(|code| code.into_owned());

        let status = match code.as_deref() {
            Some(UNIQUE_VIOLATION) => ErrorStatus::Conflict,
            _ => ErrorStatus::Internal,
        };

        DbError::Query {
            code,
            status,
            sql,
            params,
            source,
        }
    }

    /// Creates a NotFound error with the given message.
    pub fn not_found(message: impl Into<String>) -> Self {
        DbError::NotFound {
            message: message.into(),
        }
    }

    /// Status classification for this error.
    ///
    /// The HTTP edge calls this instead of matching on variants.
    pub fn status(&self) -> ErrorStatus {
        match self {
            DbError::Config(_) => ErrorStatus::Internal,
            DbError::Connection(_) => ErrorStatus::Unavailable,
            DbError::Query { status, .. } => *status,
            DbError::Decode(_) => ErrorStatus::Internal,
            DbError::TransactionUsage(_) => ErrorStatus::Internal,
            DbError::Migration(_) => ErrorStatus::Internal,
            DbError::RepositoryUsage(_) => ErrorStatus::Internal,
            DbError::NotFound { .. } => ErrorStatus::NotFound,
            DbError::Internal(_) => ErrorStatus::Internal,
        }
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Unit Tests
// =============================================================================
