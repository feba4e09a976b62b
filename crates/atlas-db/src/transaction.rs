//! # Transactions
//!
//! Explicit transaction state machine over one pinned connection.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Transaction Lifecycle                               │
//! │                                                                         │
//! │  pool.begin_transaction()                                              │
//! │       │  (checks out + pins a connection, issues BEGIN)                │
//! │       ▼                                                                 │
//! │  NOT_STARTED ──begin()──► STARTED ──commit()/rollback()──► FINISHED    │
//! │                              │                                │         │
//! │                              │ queries through the pool       │         │
//! │                              │ run on the pinned connection   │         │
//! │                              ▼                                ▼         │
//! │                        pool.query(..)              hooks fire, then    │
//! │                                                    connection released │
//! │                                                                         │
//! │  A FINISHED transaction is dead: commit()/rollback()/begin() on it     │
//! │  are usage errors, and the instance is never reused.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Explicit state transitions plus release-in-all-cases prevent the classic
//! pool-exhaustion bug where a transaction that throws before rollback
//! leaks its connection forever. [`Pool::with_transaction`] wraps this
//! machine and should be the default choice.
//!
//! [`Pool::with_transaction`]: crate::Pool::with_transaction

use futures::future::BoxFuture;
use std::future::Future;
use tracing::warn;

use crate::error::{DbError, DbResult};
use crate::pool::Pool;

/// Post-transaction hook: an async closure receiving a pool handle.
type Hook = Box<dyn FnOnce(Pool) -> BoxFuture<'static, DbResult<()>> + Send>;

/// Transaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    NotStarted,
    Started,
    Finished,
}

/// A transaction bound to the connection pinned in its pool.
///
/// ## Usage
/// ```rust,ignore
/// let mut tx = pool.begin_transaction().await?;
/// pool.query("UPDATE accounts SET balance = balance - $1 WHERE id = $2", params).await?;
/// tx.on_commit(|pool| async move {
///     // runs only after COMMIT, in registration order
///     Ok(())
/// });
/// tx.commit().await?;
/// ```
pub struct Transaction {
    pool: Pool,
    state: TxState,
    on_commit: Vec<Hook>,
    on_rollback: Vec<Hook>,
    on_finish: Vec<Hook>,
}

impl Transaction {
    /// Built by [`Pool::begin_transaction`] after pinning a connection.
    pub(crate) fn new(pool: Pool) -> Self {
        Transaction {
            pool,
            state: TxState::NotStarted,
            on_commit: Vec::new(),
            on_rollback: Vec::new(),
            on_finish: Vec::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> TxState {
        self.state
    }

    /// The pool handle this transaction shadows.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Issues `BEGIN` on the pinned connection.
    ///
    /// No-op when already started; usage error on a finished transaction.
    pub async fn begin(&mut self) -> DbResult<()> {
        match self.state {
            TxState::Started => Ok(()),
            TxState::Finished => Err(DbError::TransactionUsage(
                "begin called on a finished transaction".to_string(),
            )),
            TxState::NotStarted => {
                self.pool.query("BEGIN", Vec::new()).await?;
                self.state = TxState::Started;
                Ok(())
            }
        }
    }

    /// Registers a hook that runs after a successful terminal `COMMIT`.
    pub fn on_commit<F, Fut>(&mut self, hook: F)
    where
        F: FnOnce(Pool) -> Fut + Send + 'static,
        Fut: Future<Output = DbResult<()>> + Send + 'static,
    {
        self.on_commit.push(Box::new(move |pool| Box::pin(hook(pool))));
    }

    /// Registers a hook that runs after `ROLLBACK`.
    pub fn on_rollback<F, Fut>(&mut self, hook: F)
    where
        F: FnOnce(Pool) -> Fut + Send + 'static,
        Fut: Future<Output = DbResult<()>> + Send + 'static,
    {
        self.on_rollback
            .push(Box::new(move |pool| Box::pin(hook(pool))));
    }

    /// Registers a hook that runs on either outcome.
    pub fn on_finish<F, Fut>(&mut self, hook: F)
    where
        F: FnOnce(Pool) -> Fut + Send + 'static,
        Fut: Future<Output = DbResult<()>> + Send + 'static,
    {
        self.on_finish.push(Box::new(move |pool| Box::pin(hook(pool))));
    }

    /// Commits the transaction.
    ///
    /// Requires STARTED: committing before `begin` or a second time is a
    /// usage error and never re-issues SQL.
    pub async fn commit(&mut self) -> DbResult<()> {
        self.finish(true).await
    }

    /// Rolls the transaction back. Same state requirements as `commit`.
    pub async fn rollback(&mut self) -> DbResult<()> {
        self.finish(false).await
    }

    /// Terminal transition shared by commit and rollback.
    ///
    /// Order matters: the SQL statement runs first, the outcome hooks and
    /// then the finish hooks run even when that statement failed, and the
    /// pinned connection is released after the hooks no matter what.
    /// A statement failure takes precedence over a hook failure.
    async fn finish(&mut self, commit: bool) -> DbResult<()> {
        let verb = if commit { "commit" } else { "rollback" };
        match self.state {
            TxState::NotStarted => {
                return Err(DbError::TransactionUsage(format!(
                    "{} called before begin",
                    verb
                )));
            }
            TxState::Finished => {
                return Err(DbError::TransactionUsage(format!(
                    "{} called on a finished transaction",
                    verb
                )));
            }
            TxState::Started => {}
        }
        self.state = TxState::Finished;

        let statement = if commit { "COMMIT" } else { "ROLLBACK" };
        let sql_outcome = self.pool.query(statement, Vec::new()).await;

        let outcome_hooks = std::mem::take(if commit {
            &mut self.on_commit
        } else {
            &mut self.on_rollback
        });
        let finish_hooks = std::mem::take(&mut self.on_finish);
        let hook_outcome = run_hooks(&self.pool, outcome_hooks, finish_hooks).await;

        // Guaranteed cleanup: the connection goes back to the pool even
        // when the statement or a hook failed
        self.pool.release().await;

        sql_outcome?;
        hook_outcome
    }
}

/// Runs hook lists in registration order, stopping at the first failure.
async fn run_hooks(pool: &Pool, outcome_hooks: Vec<Hook>, finish_hooks: Vec<Hook>) -> DbResult<()> {
    for hook in outcome_hooks {
        hook(pool.clone()).await?;
    }
    for hook in finish_hooks {
        hook(pool.clone()).await?;
    }
    Ok(())
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state == TxState::Started {
            // Cannot roll back from a sync drop; flag the leak loudly
            warn!(
                app = %self.pool.config().application_name,
                "transaction dropped while open; connection stays pinned until release()"
            );
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
