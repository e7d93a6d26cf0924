//! Connection pooling and schema bootstrap for the run store.
//!
//! `rcm db-init` calls [`ensure_database_exists`], [`create_pool`] and
//! [`run_migrations`] in that order. The harness itself only needs
//! [`create_pool`].

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tracing::{debug, info};

use crate::config::DbConfig;

/// Schema for `agent_runs` and the claim-side tables, embedded from
/// `crates/rcm-db/migrations/`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Tables owned by this crate, in the order `db-init` reports them.
pub const RCM_TABLES: &[&str] = &["agent_runs", "appeals", "claims", "denials"];

/// Connections per pool. An invocation holds at most one at a time.
const MAX_CONNECTIONS: u32 = 5;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

async fn connect(url: &str, max_connections: u32) -> std::result::Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(url)
        .await
}

/// Open the pool shared by the run recorder and the business store.
pub async fn create_pool(config: &DbConfig) -> Result<PgPool> {
    let pool = connect(&config.database_url, MAX_CONNECTIONS)
        .await
        .with_context(|| format!("cannot reach run store at {}", config.redacted_url()))?;
    debug!(url = %config.redacted_url(), "run store pool opened");
    Ok(pool)
}

/// Bring the schema up to date. Already-applied migrations are skipped.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("schema migration failed")?;
    info!(migrations = MIGRATOR.iter().count(), "run store schema is current");
    Ok(())
}

/// Fail fast if the pool cannot reach the server.
pub async fn check_connection(pool: &PgPool) -> Result<()> {
    let _: (i32,) = sqlx::query_as("SELECT 1")
        .fetch_one(pool)
        .await
        .context("run store did not answer")?;
    Ok(())
}

/// `CREATE DATABASE` cannot bind its name, so it is interpolated and must
/// be a plain identifier.
fn is_plain_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Create the run store database named in `config` if the server does
/// not have it yet.
pub async fn ensure_database_exists(config: &DbConfig) -> Result<()> {
    let db_name = config
        .database_name()
        .context("database URL does not name a database")?;
    if !is_plain_identifier(db_name) {
        anyhow::bail!("refusing to create database {db_name:?}: not a plain identifier");
    }

    let admin_url = config.maintenance_url();
    let admin = connect(&admin_url, 1).await.with_context(|| {
        format!(
            "cannot reach maintenance database at {}",
            DbConfig::new(admin_url.clone()).redacted_url()
        )
    })?;

    let present: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(db_name)
            .fetch_one(&admin)
            .await
            .context("failed to look up database in pg_database")?;

    if present {
        info!(db = db_name, "run store database present");
    } else {
        admin
            .execute(format!("CREATE DATABASE {db_name}").as_str())
            .await
            .with_context(|| format!("failed to create database {db_name}"))?;
        info!(db = db_name, "run store database created");
    }

    admin.close().await;
    Ok(())
}

/// Row count for each table in [`RCM_TABLES`].
pub async fn table_counts(pool: &PgPool) -> Result<Vec<(String, i64)>> {
    let mut counts = Vec::with_capacity(RCM_TABLES.len());
    for &table in RCM_TABLES {
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .with_context(|| format!("failed to count rows in {table}"))?;
        counts.push((table.to_string(), count));
    }
    Ok(counts)
}
