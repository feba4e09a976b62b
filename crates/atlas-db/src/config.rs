//! # Database Configuration
//!
//! Connection and pool settings for the PostgreSQL layer.
//!
//! Configuration is environment-sourced (`DB_*` variables, with `.env`
//! support in development) but consumed as plain values: the [`Pool`]
//! constructor takes a finished [`DbConfig`] and never reads the
//! environment itself.
//!
//! ## Example
//! ```rust
//! use atlas_db::DbConfig;
//!
//! let config = DbConfig::new("localhost", "atlas", "atlas", "secret")
//!     .max_connections(10)
//!     .schema("app");
//! assert_eq!(config.port, 5432);
//! ```
//!
//! [`Pool`]: crate::Pool

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::error::{DbError, DbResult};

/// Database configuration.
///
/// Immutable once handed to a pool; the pool owns its copy exclusively.
/// Serializable for config snapshots in diagnostics - note the password
/// rides along, so snapshots are operator-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// Database server host.
    pub host: String,

    /// Database server port.
    /// Default: 5432
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Login role.
    pub username: String,

    /// Login password.
    pub password: String,

    /// Schema queries run against (sets `search_path`).
    /// Default: "public"
    pub schema: String,

    /// Application name reported to the server and used in query logs.
    /// Default: "atlas"
    pub application_name: String,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Maximum number of connections in the pool.
    /// Default: 10
    pub max_connections: u32,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// Timeout for checking a connection out of the pool.
    /// Default: 30 seconds
    pub acquire_timeout: Duration,

    /// Per-statement timeout enforced by the server.
    /// Default: 30 seconds
    pub query_timeout: Duration,

    /// Whether to require TLS on the connection.
    /// Default: false
    pub ssl: bool,

    /// Whether to emit per-query log lines.
    /// Default: true
    pub logging: bool,

    /// Name of the migration tracking table.
    /// Default: "migrations"
    pub migrations_table: String,
}

impl DbConfig {
    /// Creates a configuration with the required connection parameters and
    /// defaults for everything else.
    pub fn new(
        host: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        DbConfig {
            host: host.into(),
            port: 5432,
            database: database.into(),
            username: username.into(),
            password: password.into(),
            schema: "public".to_string(),
            application_name: "atlas".to_string(),
            min_connections: 1,
            max_connections: 10,
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(30),
            query_timeout: Duration::from_secs(30),
            ssl: false,
            logging: true,
            migrations_table: "migrations".to_string(),
        }
    }

    /// Loads configuration from `DB_*` environment variables.
    ///
    /// `.env` is loaded first when present (development convenience).
    /// Host, database, username and password are required; every other
    /// key falls back to its default.
    ///
    /// ## Variables
    /// ```text
    /// DB_HOST, DB_PORT, DB_NAME, DB_USER, DB_PASSWORD, DB_SCHEMA,
    /// DB_APPLICATION_NAME, DB_POOL_MIN, DB_POOL_MAX,
    /// DB_IDLE_TIMEOUT_MS, DB_ACQUIRE_TIMEOUT_MS, DB_QUERY_TIMEOUT_MS,
    /// DB_SSL, DB_LOGGING, DB_MIGRATIONS_TABLE
    /// ```
    pub fn from_env() -> DbResult<Self> {
        dotenvy::dotenv().ok();

        let mut config = DbConfig::new(
            require("DB_HOST")?,
            require("DB_NAME")?,
            require("DB_USER")?,
            require("DB_PASSWORD")?,
        );

        if let Some(raw) = optional("DB_PORT") {
            config.port = parse("DB_PORT", &raw)?;
        }
        if let Some(schema) = optional("DB_SCHEMA") {
            config.schema = schema;
        }
        if let Some(name) = optional("DB_APPLICATION_NAME") {
            config.application_name = name;
        }
        if let Some(raw) = optional("DB_POOL_MIN") {
            config.min_connections = parse("DB_POOL_MIN", &raw)?;
        }
        if let Some(raw) = optional("DB_POOL_MAX") {
            config.max_connections = parse("DB_POOL_MAX", &raw)?;
        }
        if let Some(raw) = optional("DB_IDLE_TIMEOUT_MS") {
            config.idle_timeout = Duration::from_millis(parse("DB_IDLE_TIMEOUT_MS", &raw)?);
        }
        if let Some(raw) = optional("DB_ACQUIRE_TIMEOUT_MS") {
            config.acquire_timeout = Duration::from_millis(parse("DB_ACQUIRE_TIMEOUT_MS", &raw)?);
        }
        if let Some(raw) = optional("DB_QUERY_TIMEOUT_MS") {
            config.query_timeout = Duration::from_millis(parse("DB_QUERY_TIMEOUT_MS", &raw)?);
        }
        if let Some(raw) = optional("DB_SSL") {
            config.ssl = parse("DB_SSL", &raw)?;
        }
        if let Some(raw) = optional("DB_LOGGING") {
            config.logging = parse("DB_LOGGING", &raw)?;
        }
        if let Some(table) = optional("DB_MIGRATIONS_TABLE") {
            config.migrations_table = table;
        }

        Ok(config)
    }

    // =========================================================================
    // Builder Setters
    // =========================================================================

    /// Sets the server port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the schema (`search_path`).
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Sets the application name used on the wire and in logs.
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the idle timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the acquire timeout.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Sets the per-statement timeout.
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Requires TLS on the connection.
    pub fn ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    /// Enables or disables per-query logging.
    pub fn logging(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }

    /// Sets the migration tracking table name.
    pub fn migrations_table(mut self, table: impl Into<String>) -> Self {
        self.migrations_table = table.into();
        self
    }

    // =========================================================================
    // Internal
    // =========================================================================

    /// Rejects configurations that cannot possibly connect.
    pub(crate) fn validate(&self) -> DbResult<()> {
        for (field, value) in [
            ("host", &self.host),
            ("database", &self.database),
            ("username", &self.username),
        ] {
            if value.trim().is_empty() {
                return Err(DbError::Config(format!("{} must not be empty", field)));
            }
        }
        Ok(())
    }

    /// Driver connect options derived from this configuration.
    pub(crate) fn connect_options(&self) -> PgConnectOptions {
        let ssl_mode = if self.ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };

        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.username)
            .password(&self.password)
            .application_name(&self.application_name)
            .ssl_mode(ssl_mode)
            .options([
                ("search_path", self.schema.clone()),
                (
                    "statement_timeout",
                    self.query_timeout.as_millis().to_string(),
                ),
            ])
    }
}

// =============================================================================
// Env Helpers
// =============================================================================

fn require(key: &str) -> DbResult<String> {
    env::var(key).map_err(|_| DbError::Config(format!("{} is required", key)))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

fn parse<T: FromStr>(key: &str, raw: &str) -> DbResult<T> {
    raw.parse()
        .map_err(|_| DbError::Config(format!("invalid value for {}: {}", key, raw)))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DbConfig::new("localhost", "atlas", "atlas", "secret");

        assert_eq!(config.port, 5432);
        assert_eq!(config.schema, "public");
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.migrations_table, "migrations");
        assert!(config.logging);
        assert!(!config.ssl);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = DbConfig::new("localhost", "atlas", "atlas", "secret")
            .port(5433)
            .schema("app")
            .max_connections(3)
            .logging(false);

        assert_eq!(config.port, 5433);
        assert_eq!(config.schema, "app");
        assert_eq!(config.max_connections, 3);
        assert!(!config.logging);
    }

    #[test]
    fn test_validate_rejects_blank_required_fields() {
        let config = DbConfig::new("", "atlas", "atlas", "secret");
        assert!(matches!(config.validate(), Err(DbError::Config(_))));

        let config = DbConfig::new("localhost", "  ", "atlas", "secret");
        assert!(matches!(config.validate(), Err(DbError::Config(_))));
    }

    #[test]
    fn test_parse_helper() {
        assert_eq!(parse::<u16>("DB_PORT", "5432").unwrap(), 5432);
        assert!(parse::<u16>("DB_PORT", "lots").is_err());
        assert!(parse::<bool>("DB_SSL", "yes").is_err());
    }
}
