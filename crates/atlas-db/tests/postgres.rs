//! Integration tests against a live PostgreSQL.
//!
//! Ignored by default: set up a database, export `DB_HOST`, `DB_NAME`,
//! `DB_USER` and `DB_PASSWORD` (or rely on the localhost defaults) and run
//! `cargo test -- --ignored`.

use std::sync::{Arc, Mutex};

use atlas_db::{
    DbConfig, DbError, DeleteOptions, FindOptions, MigrationRunner, Pool, Repository, SqlValue,
    TxState, UpdateOptions,
};
use sqlx::FromRow;

fn test_config() -> DbConfig {
    DbConfig::from_env()
        .unwrap_or_else(|_| DbConfig::new("localhost", "atlas_test", "atlas", "atlas"))
        .logging(false)
}

async fn connected_pool() -> Pool {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let pool = Pool::new(test_config());
    pool.connect().await.expect("database unavailable");
    pool
}

// =============================================================================
// Pool
// =============================================================================

#[tokio::test]
#[ignore = "requires a running PostgreSQL"]
async fn connect_close_connect_again() {
    let pool = Pool::new(test_config());

    pool.connect().await.unwrap();
    assert!(pool.ping().await);

    pool.close().await;
    // A closed pool can be re-established
    pool.connect().await.unwrap();
    assert!(pool.ping().await);
    pool.close().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL"]
async fn close_twice_is_a_noop() {
    let pool = connected_pool().await;
    pool.close().await;
    pool.close().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL"]
async fn query_result_metadata() {
    let pool = connected_pool().await;

    let result = pool
        .query("SELECT  1::bigint AS a,\n  'x' AS b", Vec::new())
        .await
        .unwrap();

    assert_eq!(result.sql, "SELECT 1::bigint AS a, 'x' AS b");
    assert_eq!(result.command, "SELECT");
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.row_count, 1);
    assert_eq!(result.fields.len(), 2);
    assert_eq!(result.fields[0].name, "a");
    assert_eq!(result.fields[1].name, "b");

    pool.close().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL"]
async fn unique_violation_is_classified_as_conflict() {
    let pool = connected_pool().await;
    pool.execute_unprepared(
        "DROP TABLE IF EXISTS it_conflict; \
         CREATE TABLE it_conflict (id BIGINT PRIMARY KEY);",
    )
    .await
    .unwrap();

    pool.query("INSERT INTO it_conflict (id) VALUES ($1)", vec![1_i64.into()])
        .await
        .unwrap();
    let err = pool
        .query("INSERT INTO it_conflict (id) VALUES ($1)", vec![1_i64.into()])
        .await
        .unwrap_err();

    assert_eq!(err.status(), atlas_core::ErrorStatus::Conflict);
    match err {
        DbError::Query { code, .. } => assert_eq!(code.as_deref(), Some("23505")),
        other => panic!("unexpected error: {:?}", other),
    }

    pool.execute_unprepared("DROP TABLE it_conflict").await.unwrap();
    pool.close().await;
}

// =============================================================================
// Transactions
// =============================================================================

#[tokio::test]
#[ignore = "requires a running PostgreSQL"]
async fn commit_releases_the_pinned_connection() {
    let pool = connected_pool().await;

    let mut tx = pool.begin_transaction().await.unwrap();
    assert_eq!(tx.state(), TxState::Started);
    pool.query("SELECT 1", Vec::new()).await.unwrap();
    tx.commit().await.unwrap();

    // The slot is free again, so a second transaction can open
    let mut tx2 = pool.begin_transaction().await.unwrap();
    tx2.rollback().await.unwrap();

    pool.close().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL"]
async fn second_commit_is_a_usage_error() {
    let pool = connected_pool().await;

    let mut tx = pool.begin_transaction().await.unwrap();
    tx.commit().await.unwrap();
    assert_eq!(tx.state(), TxState::Finished);

    match tx.commit().await {
        Err(DbError::TransactionUsage(_)) => {}
        other => panic!("expected usage error, got {:?}", other),
    }

    pool.close().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL"]
async fn nested_transaction_is_rejected() {
    let pool = connected_pool().await;

    let mut tx = pool.begin_transaction().await.unwrap();
    match pool.begin_transaction().await {
        Err(DbError::TransactionUsage(_)) => {}
        other => panic!("expected usage error, got {:?}", other.map(|_| ())),
    }
    tx.rollback().await.unwrap();

    pool.close().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL"]
async fn hooks_fire_in_registration_order() {
    let pool = connected_pool().await;
    let seen: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let mut tx = pool.begin_transaction().await.unwrap();
    for label in ["first", "second"] {
        let seen = Arc::clone(&seen);
        tx.on_commit(move |_pool| async move {
            seen.lock().unwrap().push(label);
            Ok(())
        });
    }
    {
        let seen = Arc::clone(&seen);
        tx.on_rollback(move |_pool| async move {
            seen.lock().unwrap().push("rollback");
            Ok(())
        });
    }
    {
        let seen = Arc::clone(&seen);
        tx.on_finish(move |_pool| async move {
            seen.lock().unwrap().push("finish");
            Ok(())
        });
    }
    tx.commit().await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "finish"]);
    pool.close().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL"]
async fn managed_transaction_commits_and_rolls_back() {
    let pool = connected_pool().await;
    pool.execute_unprepared(
        "DROP TABLE IF EXISTS it_managed; \
         CREATE TABLE it_managed (id BIGINT PRIMARY KEY);",
    )
    .await
    .unwrap();

    // Success path: work result is returned, insert is committed
    let value = pool
        .with_transaction(|pool| async move {
            pool.query("INSERT INTO it_managed (id) VALUES ($1)", vec![1_i64.into()])
                .await?;
            Ok(41 + 1)
        })
        .await
        .unwrap();
    assert_eq!(value, 42);

    // Failure path: the original error comes back and the insert is gone
    let err = pool
        .with_transaction(|pool| async move {
            pool.query("INSERT INTO it_managed (id) VALUES ($1)", vec![2_i64.into()])
                .await?;
            Err::<(), _>(DbError::not_found("boom"))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::NotFound { .. }));

    let result = pool
        .query("SELECT id FROM it_managed ORDER BY id", Vec::new())
        .await
        .unwrap();
    assert_eq!(result.rows.len(), 1);

    pool.execute_unprepared("DROP TABLE it_managed").await.unwrap();
    pool.close().await;
}

// =============================================================================
// Migrations
// =============================================================================

async fn write_migration(dir: &std::path::Path, name: &str, sql: &str) {
    tokio::fs::write(dir.join(name), sql).await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL"]
async fn up_is_idempotent_and_down_reverses_the_latest() {
    let pool = Pool::new(test_config().migrations_table("it_migrations_basic"));
    pool.connect().await.unwrap();
    pool.execute_unprepared(
        "DROP TABLE IF EXISTS it_migrations_basic; \
         DROP TABLE IF EXISTS it_mig_t1; \
         DROP TABLE IF EXISTS it_mig_t2;",
    )
    .await
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    write_migration(dir.path(), "001_init.up.sql", "CREATE TABLE it_mig_t1 (id BIGINT);").await;
    write_migration(dir.path(), "001_init.down.sql", "DROP TABLE it_mig_t1;").await;
    write_migration(
        dir.path(),
        "002_add_col.up.sql",
        "CREATE TABLE it_mig_t2 (id BIGINT);",
    )
    .await;
    write_migration(dir.path(), "002_add_col.down.sql", "DROP TABLE it_mig_t2;").await;

    let runner = MigrationRunner::new(pool.clone(), dir.path());

    let applied = runner.up().await.unwrap();
    assert_eq!(applied, vec!["001_init", "002_add_col"]);

    // Second run is a no-op; the tracking table still has exactly 2 rows
    let applied_again = runner.up().await.unwrap();
    assert!(applied_again.is_empty());
    assert_eq!(runner.applied().await.unwrap().len(), 2);

    // down(1) reverses only the most recent migration
    let reversed = runner.down(1).await.unwrap();
    assert_eq!(reversed, vec!["002_add_col"]);
    assert_eq!(runner.applied().await.unwrap(), vec!["001_init"]);

    // down(-1) drains the rest
    let reversed = runner.down(-1).await.unwrap();
    assert_eq!(reversed, vec!["001_init"]);
    assert!(runner.applied().await.unwrap().is_empty());

    pool.execute_unprepared("DROP TABLE IF EXISTS it_migrations_basic")
        .await
        .unwrap();
    pool.close().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL"]
async fn failing_batch_rolls_back_entirely() {
    let pool = Pool::new(test_config().migrations_table("it_migrations_fail"));
    pool.connect().await.unwrap();
    pool.execute_unprepared(
        "DROP TABLE IF EXISTS it_migrations_fail; \
         DROP TABLE IF EXISTS it_mig_fail_t1;",
    )
    .await
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    write_migration(
        dir.path(),
        "001_init.up.sql",
        "CREATE TABLE it_mig_fail_t1 (id BIGINT);",
    )
    .await;
    write_migration(dir.path(), "002_add_col.up.sql", "THIS IS NOT SQL;").await;

    let runner = MigrationRunner::new(pool.clone(), dir.path());
    assert!(runner.up().await.is_err());

    // The whole batch rolled back: no tracking rows, and 001's table is
    // gone even though its own SQL succeeded
    assert!(runner.applied().await.unwrap().is_empty());
    let result = pool
        .query(
            "SELECT to_regclass($1)::text",
            vec![SqlValue::Text("public.it_mig_fail_t1".to_string())],
        )
        .await
        .unwrap();
    let regclass: Option<String> = sqlx::Row::try_get(&result.rows[0], 0).unwrap();
    assert!(regclass.is_none());

    pool.execute_unprepared("DROP TABLE IF EXISTS it_migrations_fail")
        .await
        .unwrap();
    pool.close().await;
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, FromRow)]
struct ItUser {
    id: i64,
    name: String,
    email: String,
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL"]
async fn repository_crud_round_trip() {
    let pool = connected_pool().await;
    pool.execute_unprepared(
        "DROP TABLE IF EXISTS it_users; \
         CREATE TABLE it_users ( \
             id BIGSERIAL PRIMARY KEY, \
             name TEXT NOT NULL, \
             email TEXT NOT NULL \
         );",
    )
    .await
    .unwrap();

    let users = Repository::new(pool.clone(), "it_users");

    let created: ItUser = users
        .create(vec![
            ("name".to_string(), Some("a".into())),
            ("email".to_string(), Some("b".into())),
        ])
        .await
        .unwrap();
    assert_eq!(created.name, "a");
    assert_eq!(created.email, "b");

    let fetched: Option<ItUser> = users.find_by_id(created.id.into(), Vec::new()).await.unwrap();
    assert_eq!(fetched.unwrap().id, created.id);

    let updated: Option<ItUser> = users
        .update(UpdateOptions {
            data: vec![("name".to_string(), Some("renamed".into()))],
            filters: vec!["id = $1".into()],
            binding: vec![created.id.into()],
        })
        .await
        .unwrap();
    assert_eq!(updated.unwrap().name, "renamed");

    let (rows, total) = users
        .find_and_count_all::<ItUser>(FindOptions::default())
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(rows.len(), 1);

    let deleted = users
        .delete(DeleteOptions {
            filters: vec!["id = $1".into()],
            binding: vec![created.id.into()],
        })
        .await
        .unwrap();
    assert_eq!(deleted, 1);

    pool.execute_unprepared("DROP TABLE it_users").await.unwrap();
    pool.close().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL"]
async fn find_one_absence_semantics() {
    let pool = connected_pool().await;
    pool.execute_unprepared(
        "DROP TABLE IF EXISTS it_empty; \
         CREATE TABLE it_empty (id BIGINT PRIMARY KEY, name TEXT, email TEXT);",
    )
    .await
    .unwrap();

    let repo = Repository::new(pool.clone(), "it_empty");

    // Plain absence is not an error
    let missing: Option<ItUser> = repo.find_one(FindOptions::default()).await.unwrap();
    assert!(missing.is_none());

    // With reject_on_empty the absence carries the caller's message
    let err = repo
        .find_one::<ItUser>(FindOptions {
            reject_on_empty: Some("msg".into()),
            ..FindOptions::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.status(), atlas_core::ErrorStatus::NotFound);
    assert_eq!(err.to_string(), "msg");

    pool.execute_unprepared("DROP TABLE it_empty").await.unwrap();
    pool.close().await;
}
