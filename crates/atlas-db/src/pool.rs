//! # Database Pool Management
//!
//! Connection pool wrapper for PostgreSQL.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  Service Startup                                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbConfig::from_env() ← Configure pool settings                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Pool::new(config) ← Cheap handle; physical pool opens lazily          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │             PgPool                       │                           │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐       │  (max_connections)        │
//! │  │  │Conn1│ │Conn2│ │Conn3│ │Conn4│ ...   │                           │
//! │  │  └─────┘ └─────┘ └─────┘ └─────┘       │                           │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       │ query() routes per call:                                       │
//! │       ▼                                                                 │
//! │  No transaction  ──► any free pooled connection      ("POOL")          │
//! │  Transaction open ─► the one pinned connection       ("TX")            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Handle Semantics
//! `Pool` is a shared-ownership handle: clones share the physical
//! connection set and the pinned-connection slot, but each handle carries
//! its own logger identity. `with_logger` derives a per-request handle
//! without reopening connections, at most once per logical handle.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::TryStreamExt;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Either, FromRow, Postgres, Row, TypeInfo};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info};

use crate::config::DbConfig;
use crate::error::{DbError, DbResult};
use crate::transaction::Transaction;
use crate::value::{render_params, SqlValue};

// =============================================================================
// Query Result
// =============================================================================

/// Metadata for one result column.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub ordinal: usize,
    pub type_name: String,
}

/// Outcome of a single query call.
///
/// Produced fresh per call and never retained by the pool. Rows stay in
/// driver form; [`QueryResult::decode`] maps them onto any `FromRow` type.
#[derive(Debug)]
pub struct QueryResult {
    /// Raw result rows, in server order.
    pub rows: Vec<PgRow>,
    /// Rows affected as reported by the driver, falling back to
    /// `rows.len()` when the driver reports nothing.
    pub row_count: u64,
    /// Leading keyword of the statement (SELECT, INSERT, ...).
    pub command: String,
    /// Wall time from dispatch to completion (monotonic clock).
    pub elapsed: Duration,
    /// Result column metadata, empty for row-less statements.
    pub fields: Vec<FieldInfo>,
    /// The normalized statement text that was executed.
    pub sql: String,
    /// The values that were bound to it.
    pub params: Vec<SqlValue>,
}

impl QueryResult {
    /// Maps every row onto `T`.
    pub fn decode<T>(&self) -> DbResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, PgRow>,
    {
        self.rows
            .iter()
            .map(|row| T::from_row(row).map_err(|e| DbError::Decode(e.to_string())))
            .collect()
    }
}

// =============================================================================
// Pool
// =============================================================================

/// Which path a statement executed on; shows up in query logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuerySource {
    Pool,
    Transaction,
}

impl QuerySource {
    fn as_str(self) -> &'static str {
        match self {
            QuerySource::Pool => "POOL",
            QuerySource::Transaction => "TX",
        }
    }
}

/// Physical state shared by every handle cloned from the same pool.
struct PoolShared {
    config: DbConfig,
    /// Established lazily on first use; `None` again after `close()`.
    pg: RwLock<Option<PgPool>>,
    /// Connection pinned by the active transaction, if any.
    /// Invariant: at most one pinned connection per pool at a time.
    pinned: Mutex<Option<PoolConnection<Postgres>>>,
}

/// Shared-ownership handle to the connection pool.
///
/// ## Usage
/// ```rust,ignore
/// let pool = Pool::new(DbConfig::from_env()?);
/// pool.connect().await?;
///
/// let result = pool
///     .query("SELECT * FROM users WHERE id = $1", vec![user_id.into()])
///     .await?;
/// ```
///
/// Construct one pool at process start and pass it (or a `with_logger`
/// derivative) down through constructors; never reach it through ambient
/// global state.
#[derive(Clone)]
pub struct Pool {
    shared: Arc<PoolShared>,
    /// Logging identity for this handle.
    logger: Arc<str>,
    /// Set once `with_logger` has derived this handle.
    derived: bool,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("application_name", &self.shared.config.application_name)
            .field("logger", &self.logger)
            .field("derived", &self.derived)
            .finish()
    }
}

impl Pool {
    /// Creates a pool handle. No connection is made until [`Pool::connect`]
    /// or the first query.
    pub fn new(config: DbConfig) -> Self {
        let logger = Arc::from(config.application_name.clone());
        Pool {
            shared: Arc::new(PoolShared {
                config,
                pg: RwLock::new(None),
                pinned: Mutex::new(None),
            }),
            logger,
            derived: false,
        }
    }

    /// The configuration this pool was built with.
    pub fn config(&self) -> &DbConfig {
        &self.shared.config
    }

    /// Logger identity of this handle.
    pub fn logger(&self) -> &str {
        &self.logger
    }

    /// Derives a handle with a distinct logging identity.
    ///
    /// Shares the physical connections and the pinned-connection slot.
    /// Idempotent: a handle that is already derived returns itself.
    pub fn with_logger(&self, name: impl Into<String>) -> Pool {
        if self.derived {
            return self.clone();
        }
        Pool {
            shared: Arc::clone(&self.shared),
            logger: Arc::from(name.into()),
            derived: true,
        }
    }

    /// Establishes the physical pool.
    ///
    /// Validates the configuration, opens the pool and runs a trivial
    /// `SELECT 1+1` so misconfiguration fails here rather than on the
    /// first real query. Idempotent: a second call is a no-op.
    pub async fn connect(&self) -> DbResult<()> {
        let mut guard = self.shared.pg.write().await;
        if guard.is_some() {
            return Ok(());
        }

        let config = &self.shared.config;
        config.validate()?;

        let pool = PgPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(config.connect_options())
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        // Fail fast on a pool that cannot actually answer
        sqlx::query("SELECT 1+1")
            .execute(&pool)
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        info!(
            app = %config.application_name,
            host = %config.host,
            database = %config.database,
            max_connections = config.max_connections,
            "database pool established"
        );

        *guard = Some(pool);
        Ok(())
    }

    /// Closes the physical pool.
    ///
    /// Releases any pinned connection first. Idempotent: a second call
    /// never issues a second close. A closed pool can `connect()` again.
    pub async fn close(&self) {
        self.shared.pinned.lock().await.take();

        let mut guard = self.shared.pg.write().await;
        if let Some(pool) = guard.take() {
            pool.close().await;
            info!(app = %self.shared.config.application_name, "database pool closed");
        }
    }

    /// Executes a parameterized statement.
    ///
    /// Whitespace in `sql` is normalized, the statement runs on the pinned
    /// connection when a transaction is active (otherwise on the pool), and
    /// the call is logged with its duration whether it succeeds or fails.
    pub async fn query(&self, sql: &str, params: Vec<SqlValue>) -> DbResult<QueryResult> {
        let sql = normalize_sql(sql);
        let started = Instant::now();

        let mut pinned = self.shared.pinned.lock().await;
        let (outcome, source) = match pinned.take() {
            Some(mut conn) => {
                let outcome = run_query(&mut *conn, &sql, &params).await;
                // Re-pin: the transaction still owns this connection
                *pinned = Some(conn);
                drop(pinned);
                (outcome, QuerySource::Transaction)
            }
            None => {
                drop(pinned);
                let pool = self.ensure_connected().await?;
                (run_query(&pool, &sql, &params).await, QuerySource::Pool)
            }
        };

        let elapsed = started.elapsed();
        match outcome {
            Ok((rows, affected)) => {
                self.log_success(source, elapsed, &sql, &params);

                let row_count = if affected == 0 && !rows.is_empty() {
                    rows.len() as u64
                } else {
                    affected
                };
                let fields = rows
                    .first()
                    .map(|row| {
                        row.columns()
                            .iter()
                            .map(|col| FieldInfo {
                                name: col.name().to_string(),
                                ordinal: col.ordinal(),
                                type_name: col.type_info().name().to_string(),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let command = sql
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_uppercase();

                Ok(QueryResult {
                    rows,
                    row_count,
                    command,
                    elapsed,
                    fields,
                    sql,
                    params,
                })
            }
            Err(source_err) => {
                let err = DbError::query(source_err, sql.clone(), params.clone());
                self.log_failure(source, elapsed, &sql, &params, &err);
                Err(err)
            }
        }
    }

    /// [`Pool::query`] plus row decoding.
    pub async fn query_as<T>(&self, sql: &str, params: Vec<SqlValue>) -> DbResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, PgRow>,
    {
        self.query(sql, params).await?.decode()
    }

    /// Executes raw SQL over the simple protocol, allowing multiple
    /// statements per call.
    ///
    /// Migration files are trusted, unparameterized SQL; this is their
    /// execution path. Routing and logging match [`Pool::query`].
    pub async fn execute_unprepared(&self, sql: &str) -> DbResult<u64> {
        let started = Instant::now();

        let mut pinned = self.shared.pinned.lock().await;
        let (outcome, source) = match pinned.take() {
            Some(mut conn) => {
                let outcome = sqlx::raw_sql(sql).execute(&mut *conn).await;
                *pinned = Some(conn);
                drop(pinned);
                (outcome, QuerySource::Transaction)
            }
            None => {
                drop(pinned);
                let pool = self.ensure_connected().await?;
                (sqlx::raw_sql(sql).execute(&pool).await, QuerySource::Pool)
            }
        };

        let elapsed = started.elapsed();
        match outcome {
            Ok(result) => {
                self.log_success(source, elapsed, sql, &[]);
                Ok(result.rows_affected())
            }
            Err(source_err) => {
                let err = DbError::query(source_err, sql.to_string(), Vec::new());
                self.log_failure(source, elapsed, sql, &[], &err);
                Err(err)
            }
        }
    }

    /// Runs the validation query; true when the database answers.
    pub async fn ping(&self) -> bool {
        self.query("SELECT 1+1", Vec::new()).await.is_ok()
    }

    /// Opens an explicit transaction.
    ///
    /// Checks a connection out of the pool (bounded by the acquire
    /// timeout), pins it so every subsequent query on this pool runs on
    /// it, and issues `BEGIN`. Fails fast when a transaction is already
    /// active - nested transactions are a usage bug.
    ///
    /// Prefer [`Pool::with_transaction`]; it cannot leak the pinned
    /// connection.
    pub async fn begin_transaction(&self) -> DbResult<Transaction> {
        let pool = self.ensure_connected().await?;

        {
            let mut pinned = self.shared.pinned.lock().await;
            if pinned.is_some() {
                return Err(DbError::TransactionUsage(
                    "a transaction is already active on this pool".to_string(),
                ));
            }

            let conn = pool.acquire().await.map_err(|e| match e {
                sqlx::Error::PoolTimedOut => DbError::Connection(
                    "timed out acquiring a connection for the transaction".to_string(),
                ),
                other => DbError::Connection(other.to_string()),
            })?;
            *pinned = Some(conn);
        }

        let mut tx = Transaction::new(self.clone());
        if let Err(e) = tx.begin().await {
            // BEGIN failed; the slot must not stay occupied
            self.release().await;
            return Err(e);
        }
        Ok(tx)
    }

    /// Runs `work` inside a transaction. The preferred transactional API.
    ///
    /// Commits when `work` returns `Ok`, rolls back and returns the
    /// original error unchanged when it returns `Err`. The pinned
    /// connection is released on every path.
    pub async fn with_transaction<T, F, Fut>(&self, work: F) -> DbResult<T>
    where
        F: FnOnce(Pool) -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        let mut tx = self.begin_transaction().await?;
        match work(self.clone()).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    error!(
                        app = %self.shared.config.application_name,
                        error = %rollback_err,
                        "rollback failed after aborted transaction"
                    );
                }
                Err(err)
            }
        }
    }

    /// Returns the pinned connection to the pool, if one is held.
    /// Always safe to call; a no-op otherwise.
    pub async fn release(&self) {
        self.shared.pinned.lock().await.take();
    }

    // =========================================================================
    // Internal
    // =========================================================================

    /// Hands out the physical pool, establishing it on first use.
    async fn ensure_connected(&self) -> DbResult<PgPool> {
        {
            let guard = self.shared.pg.read().await;
            if let Some(pool) = guard.as_ref() {
                return Ok(pool.clone());
            }
        }

        self.connect().await?;

        let guard = self.shared.pg.read().await;
        guard
            .as_ref()
            .cloned()
            .ok_or_else(|| DbError::Connection("pool closed while connecting".to_string()))
    }

    fn log_success(&self, source: QuerySource, elapsed: Duration, sql: &str, params: &[SqlValue]) {
        if !self.shared.config.logging {
            return;
        }
        info!(
            app = %self.shared.config.application_name,
            logger = %self.logger,
            source = source.as_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            sql = %sql,
            params = %render_params(params),
            "query ok"
        );
    }

    fn log_failure(
        &self,
        source: QuerySource,
        elapsed: Duration,
        sql: &str,
        params: &[SqlValue],
        err: &DbError,
    ) {
        if !self.shared.config.logging {
            return;
        }
        error!(
            app = %self.shared.config.application_name,
            logger = %self.logger,
            source = source.as_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            sql = %sql,
            params = %render_params(params),
            error = %err,
            "query failed"
        );
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Collapses all whitespace runs to single spaces and trims the ends, so
/// multi-line statements log as one line and compare stably.
fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Runs one prepared statement on any executor, collecting rows and the
/// affected-row summary from the mixed output stream.
async fn run_query<'e, E>(
    executor: E,
    sql: &str,
    params: &[SqlValue],
) -> Result<(Vec<PgRow>, u64), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let mut query = sqlx::query(sql);
    for param in params {
        query = param.clone().bind(query);
    }

    let mut stream = query.fetch_many(executor);
    let mut rows = Vec::new();
    let mut affected = 0u64;

    while let Some(item) = stream.try_next().await? {
        match item {
            Either::Left(summary) => affected += summary.rows_affected(),
            Either::Right(row) => rows.push(row),
        }
    }

    Ok((rows, affected))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> DbConfig {
        DbConfig::new("localhost", "atlas_test", "atlas", "atlas")
    }

    #[test]
    fn test_normalize_sql() {
        assert_eq!(
            normalize_sql("  SELECT *\n   FROM users\t WHERE id = $1 "),
            "SELECT * FROM users WHERE id = $1"
        );
        assert_eq!(normalize_sql("SELECT 1"), "SELECT 1");
    }

    #[test]
    fn test_with_logger_is_idempotent() {
        let pool = Pool::new(test_config());
        assert_eq!(pool.logger(), "atlas");

        let request_pool = pool.with_logger("request-42");
        assert_eq!(request_pool.logger(), "request-42");

        // A derived handle refuses to re-derive
        let again = request_pool.with_logger("request-43");
        assert_eq!(again.logger(), "request-42");
    }

    #[tokio::test]
    async fn test_release_without_transaction_is_noop() {
        let pool = Pool::new(test_config());
        pool.release().await;
        pool.release().await;
    }

    #[tokio::test]
    async fn test_close_before_connect_is_noop() {
        let pool = Pool::new(test_config());
        pool.close().await;
        pool.close().await;
    }

    #[tokio::test]
    async fn test_connect_rejects_blank_config() {
        let pool = Pool::new(DbConfig::new("", "atlas", "atlas", "atlas"));
        match pool.connect().await {
            Err(DbError::Config(_)) => {}
            other => panic!("expected config error, got {:?}", other),
        }
    }
}
