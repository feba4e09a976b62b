//! # atlas-db: Database Layer for Atlas Backend
//!
//! This crate provides PostgreSQL access for the Atlas backend.
//! Everything the rest of the system knows about the database goes
//! through the types defined here.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Atlas Data Flow                                  │
//! │                                                                         │
//! │  HTTP handler (out of this workspace)                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     atlas-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐   ┌───────────────┐   ┌────────────────┐   │   │
//! │  │   │     Pool      │   │  Repository   │   │ MigrationRunner│   │   │
//! │  │   │  (pool.rs)    │   │(repository.rs)│   │ (migrations.rs)│   │   │
//! │  │   │               │   │               │   │                │   │   │
//! │  │   │ PgPool        │◄──│ query builder │   │ *.up.sql       │   │   │
//! │  │   │ pinned conn   │◄──│ Transaction   │   │ *.down.sql     │   │   │
//! │  │   │ query logging │   │ (transaction) │   │ tracking table │   │   │
//! │  │   └───────────────┘   └───────────────┘   └────────────────┘   │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                        PostgreSQL                               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Connection and pool configuration
//! - [`pool`] - Pool handle, query execution, logging
//! - [`transaction`] - Explicit transaction state machine
//! - [`migrations`] - File-based up/down migration runner
//! - [`repository`] - Generic parameterized query builder
//! - [`value`] - Dynamic bind-parameter values
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use atlas_db::{DbConfig, MigrationRunner, Pool, Repository};
//!
//! // One pool per process, passed down explicitly
//! let pool = Pool::new(DbConfig::from_env()?);
//! pool.connect().await?;
//!
//! // Apply pending migrations at startup
//! MigrationRunner::new(pool.clone(), "./migrations").up().await?;
//!
//! // Transactional work through the managed API
//! let order = pool
//!     .with_transaction(|pool| async move {
//!         let orders = Repository::new(pool, "orders");
//!         orders.create(vec![("total".into(), Some(100_i64.into()))]).await
//!     })
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod transaction;
pub mod value;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::DbConfig;
pub use error::{DbError, DbResult};
pub use migrations::MigrationRunner;
pub use pool::{FieldInfo, Pool, QueryResult};
pub use transaction::{Transaction, TxState};
pub use value::SqlValue;

// Repository re-exports for convenience
pub use repository::{
    ColumnValues, DeleteOptions, FindOptions, RejectOnEmpty, Repository, UpdateOptions, UNLIMITED,
};
