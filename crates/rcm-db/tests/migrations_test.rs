//! Integration tests for migrations, pooling, and database bootstrap.

use sqlx::Row;
use uuid::Uuid;

use rcm_db::config::DbConfig;
use rcm_db::pool;
use rcm_test_utils::{create_empty_test_db, create_test_db, drop_test_db, pg_url};

/// Tables created by the initial migration, sorted.
const EXPECTED_TABLES: &[&str] = &["agent_runs", "appeals", "claims", "denials"];

#[tokio::test]
async fn migrations_create_all_tables() {
    let (pool, db_name) = create_empty_test_db().await;

    pool::run_migrations(&pool)
        .await
        .expect("migrations should succeed");

    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT tablename::text FROM pg_tables \
         WHERE schemaname = 'public' \
         ORDER BY tablename",
    )
    .fetch_all(&pool)
    .await
    .expect("should list tables");

    let user_tables: Vec<&str> = rows
        .iter()
        .map(|(name,)| name.as_str())
        .filter(|t| !t.starts_with("_sqlx"))
        .collect();

    assert_eq!(user_tables, EXPECTED_TABLES);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let (pool, db_name) = create_test_db().await;

    pool::run_migrations(&pool)
        .await
        .expect("second migration run should be a no-op");

    for table in EXPECTED_TABLES {
        let query = format!("SELECT COUNT(*) AS cnt FROM {table}");
        let row = sqlx::query(&query)
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|e| panic!("failed to count {table}: {e}"));
        let count: i64 = row.get("cnt");
        assert_eq!(count, 0, "table {table} should be empty after migrations");
    }

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn table_counts_cover_rcm_tables() {
    let (pool, db_name) = create_test_db().await;

    let counts = pool::table_counts(&pool)
        .await
        .expect("table_counts should succeed");

    let names: Vec<&str> = counts.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, EXPECTED_TABLES);
    assert!(counts.iter().all(|(_, count)| *count == 0));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn check_connection_succeeds_on_live_pool() {
    let (pool, db_name) = create_test_db().await;

    pool::check_connection(&pool)
        .await
        .expect("connectivity check should pass");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn run_status_check_constraint_rejects_unknown_status() {
    let (pool, db_name) = create_test_db().await;

    let result = sqlx::query(
        "INSERT INTO agent_runs (run_id, agent_name, agent_version, input_data, status, start_time) \
         VALUES ($1, 'coding', '1.0.0', '{}'::jsonb, 'paused', now())",
    )
    .bind(Uuid::new_v4())
    .execute(&pool)
    .await;
    assert!(result.is_err(), "status outside the state set must be rejected");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn ensure_database_exists_is_idempotent() {
    let db_name = format!("rcm_test_{}", Uuid::new_v4().simple());
    let config = DbConfig::new(format!("{}/{db_name}", pg_url().await));

    pool::ensure_database_exists(&config)
        .await
        .expect("first ensure should create the database");
    pool::ensure_database_exists(&config)
        .await
        .expect("second ensure should be a no-op");

    drop_test_db(&db_name).await;
}
