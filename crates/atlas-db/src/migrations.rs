//! # Database Migrations
//!
//! File-based up/down migrations with a tracking table.
//!
//! ## How Migrations Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Migration Process                                  │
//! │                                                                         │
//! │  Service Startup                                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Scan migrations/ for *.up.sql, sorted lexicographically               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Bootstrap tracking table (idempotent)                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Compare files vs applied records                                      │
//! │       │                                                                 │
//! │       ├── 20240101_create_users      ✓ (already applied)               │
//! │       └── 20240115_add_deleted_at    ⬜ (NEW - needs to run)            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ONE transaction over the whole batch:                                 │
//! │    file SQL → INSERT tracking row → next file → ...                    │
//! │    any failure rolls the ENTIRE batch back                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Service continues startup                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## File Layout
//!
//! A directory of `<name>.up.sql` / `<name>.down.sql` pairs. `<name>` must
//! sort correctly under plain lexicographic ordering - prefix with a
//! timestamp or sequence number. `down()` reverses the most recently
//! applied names first, again by name order; no dependency graph is
//! inferred beyond that.
//!
//! ## Adding New Migrations
//!
//! 1. Create `<sortable-prefix>_<description>.up.sql` with the change
//! 2. Create the matching `.down.sql` that reverses it
//! 3. **NEVER** modify an applied migration - always add a new one

use std::collections::HashSet;
use std::path::PathBuf;

use sqlx::Row;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::pool::Pool;
use crate::value::SqlValue;

const UP_SUFFIX: &str = ".up.sql";
const DOWN_SUFFIX: &str = ".down.sql";

/// A discovered migration file.
#[derive(Debug, Clone)]
struct MigrationFile {
    /// Canonical name: file name with the direction suffix stripped.
    name: String,
    path: PathBuf,
}

/// Applies and reverses SQL migration files against a pool.
///
/// ## Usage
/// ```rust,ignore
/// let runner = MigrationRunner::new(pool.clone(), "./migrations");
/// let applied = runner.up().await?;        // apply everything pending
/// let reversed = runner.down(1).await?;    // revert the latest one
/// ```
pub struct MigrationRunner {
    pool: Pool,
    directory: PathBuf,
}

impl MigrationRunner {
    /// Creates a runner over the given migration directory.
    pub fn new(pool: Pool, directory: impl Into<PathBuf>) -> Self {
        MigrationRunner {
            pool,
            directory: directory.into(),
        }
    }

    /// Applies every migration file not yet recorded, oldest first.
    ///
    /// The whole batch runs in a single transaction: either every pending
    /// file applies and is recorded, or none are. Returns the names that
    /// were applied; re-running immediately is a recorded no-op.
    pub async fn up(&self) -> DbResult<Vec<String>> {
        let files = self.discover(UP_SUFFIX).await?;
        if files.is_empty() {
            info!(directory = %self.directory.display(), "no migration files found");
            return Ok(Vec::new());
        }

        self.ensure_table().await?;

        let applied: HashSet<String> = self.applied().await?.into_iter().collect();
        let pending: Vec<MigrationFile> = files
            .into_iter()
            .filter(|file| !applied.contains(&file.name))
            .collect();
        if pending.is_empty() {
            debug!("migrations already up to date");
            return Ok(Vec::new());
        }

        let table = self.qualified_table();
        self.pool
            .with_transaction(move |pool| async move {
                let mut applied_now = Vec::with_capacity(pending.len());
                for file in &pending {
                    let sql = read_migration(&file.path).await?;
                    info!(migration = %file.name, "applying migration");
                    pool.execute_unprepared(&sql).await?;
                    pool.query(
                        &format!("INSERT INTO {} (file_name) VALUES ($1)", table),
                        vec![SqlValue::Text(file.name.clone())],
                    )
                    .await?;
                    applied_now.push(file.name.clone());
                }
                Ok(applied_now)
            })
            .await
    }

    /// Reverses the most recently applied migrations.
    ///
    /// Takes up to `limit` names from the tracking table, newest first
    /// (`-1` means all of them), and runs each `.down.sql` followed by the
    /// tracking-row delete inside one transaction. No-op when nothing is
    /// applied.
    pub async fn down(&self, limit: i64) -> DbResult<Vec<String>> {
        self.ensure_table().await?;

        let table = self.qualified_table();
        let select = if limit < 0 {
            format!("SELECT file_name FROM {} ORDER BY file_name DESC", table)
        } else {
            format!(
                "SELECT file_name FROM {} ORDER BY file_name DESC LIMIT {}",
                table, limit
            )
        };
        let names = self.fetch_names(&select).await?;
        if names.is_empty() {
            debug!("no applied migrations to revert");
            return Ok(Vec::new());
        }

        let steps: Vec<(String, PathBuf)> = names
            .into_iter()
            .map(|name| {
                let path = self.directory.join(format!("{}{}", name, DOWN_SUFFIX));
                (name, path)
            })
            .collect();

        self.pool
            .with_transaction(move |pool| async move {
                let mut reversed = Vec::with_capacity(steps.len());
                for (name, path) in &steps {
                    let sql = read_migration(path).await?;
                    info!(migration = %name, "reverting migration");
                    pool.execute_unprepared(&sql).await?;
                    pool.query(
                        &format!("DELETE FROM {} WHERE file_name = $1", table),
                        vec![SqlValue::Text(name.clone())],
                    )
                    .await?;
                    reversed.push(name.clone());
                }
                Ok(reversed)
            })
            .await
    }

    /// Names currently recorded as applied, oldest first.
    ///
    /// Assumes the tracking table exists (`up()`/`down()` bootstrap it).
    pub async fn applied(&self) -> DbResult<Vec<String>> {
        let select = format!(
            "SELECT file_name FROM {} ORDER BY file_name ASC",
            self.qualified_table()
        );
        self.fetch_names(&select).await
    }

    // =========================================================================
    // Internal
    // =========================================================================

    /// Scans the migration directory for files with the given suffix,
    /// sorted ascending by canonical name.
    async fn discover(&self, suffix: &str) -> DbResult<Vec<MigrationFile>> {
        let mut entries = tokio::fs::read_dir(&self.directory).await.map_err(|e| {
            DbError::Migration(format!(
                "cannot read migration directory {}: {}",
                self.directory.display(),
                e
            ))
        })?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DbError::Migration(e.to_string()))?
        {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if let Some(name) = file_name.strip_suffix(suffix) {
                files.push(MigrationFile {
                    name: name.to_string(),
                    path: entry.path(),
                });
            }
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    /// Bootstraps the tracking table. Idempotent, and tolerant of a
    /// half-created table from an earlier failed bootstrap: constraints
    /// are dropped and recreated every time.
    async fn ensure_table(&self) -> DbResult<()> {
        let schema = self.pool.config().schema.clone();
        let table = self.pool.config().migrations_table.clone();

        if schema != "public" {
            self.pool
                .execute_unprepared(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
                .await?;
        }

        let exists_result = self
            .pool
            .query(
                "SELECT EXISTS ( SELECT 1 FROM information_schema.tables WHERE table_schema = $1 AND table_name = $2 ) AS present",
                vec![SqlValue::Text(schema.clone()), SqlValue::Text(table.clone())],
            )
            .await?;
        let exists: bool = exists_result
            .rows
            .first()
            .map(|row| row.try_get("present"))
            .transpose()
            .map_err(|e| DbError::Decode(e.to_string()))?
            .unwrap_or(false);

        if !exists {
            self.pool
                .execute_unprepared(&format!(
                    "CREATE TABLE {}.{} ( file_name TEXT NOT NULL, created_at TIMESTAMPTZ NOT NULL DEFAULT now() )",
                    schema, table
                ))
                .await?;
        }

        let constraints = format!(
            "ALTER TABLE {s}.{t} DROP CONSTRAINT IF EXISTS {t}_pkey; \
             ALTER TABLE {s}.{t} DROP CONSTRAINT IF EXISTS {t}_file_name_key; \
             ALTER TABLE {s}.{t} ADD CONSTRAINT {t}_file_name_key UNIQUE (file_name); \
             ALTER TABLE {s}.{t} ADD CONSTRAINT {t}_pkey PRIMARY KEY (file_name);",
            s = schema,
            t = table
        );
        self.pool.execute_unprepared(&constraints).await?;

        Ok(())
    }

    fn qualified_table(&self) -> String {
        format!(
            "{}.{}",
            self.pool.config().schema,
            self.pool.config().migrations_table
        )
    }

    async fn fetch_names(&self, select: &str) -> DbResult<Vec<String>> {
        let result = self.pool.query(select, Vec::new()).await?;
        result
            .rows
            .iter()
            .map(|row| {
                row.try_get::<String, _>(0)
                    .map_err(|e| DbError::Decode(e.to_string()))
            })
            .collect()
    }
}

/// Reads one migration file as raw SQL text.
async fn read_migration(path: &PathBuf) -> DbResult<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| DbError::Migration(format!("cannot read {}: {}", path.display(), e)))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbConfig;

    fn offline_runner(directory: &std::path::Path) -> MigrationRunner {
        let pool = Pool::new(DbConfig::new("localhost", "atlas_test", "atlas", "atlas"));
        MigrationRunner::new(pool, directory)
    }

    async fn touch(dir: &std::path::Path, name: &str) {
        tokio::fs::write(dir.join(name), "SELECT 1;").await.unwrap();
    }

    #[tokio::test]
    async fn test_discover_sorts_and_strips_suffix() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "002_add_col.up.sql").await;
        touch(dir.path(), "001_init.up.sql").await;
        touch(dir.path(), "001_init.down.sql").await;
        touch(dir.path(), "notes.txt").await;

        let runner = offline_runner(dir.path());

        let ups = runner.discover(UP_SUFFIX).await.unwrap();
        let names: Vec<&str> = ups.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["001_init", "002_add_col"]);

        let downs = runner.discover(DOWN_SUFFIX).await.unwrap();
        assert_eq!(downs.len(), 1);
        assert_eq!(downs[0].name, "001_init");
    }

    #[tokio::test]
    async fn test_discover_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let runner = offline_runner(&missing);

        match runner.discover(UP_SUFFIX).await {
            Err(DbError::Migration(msg)) => assert!(msg.contains("cannot read")),
            other => panic!("expected migration error, got {:?}", other.map(|f| f.len())),
        }
    }

    #[tokio::test]
    async fn test_qualified_table_uses_schema_and_config() {
        let pool = Pool::new(
            DbConfig::new("localhost", "atlas_test", "atlas", "atlas")
                .schema("app")
                .migrations_table("schema_history"),
        );
        let runner = MigrationRunner::new(pool, "./migrations");
        assert_eq!(runner.qualified_table(), "app.schema_history");
    }
}
