//! Postgres access: pool setup, schema, and the store implementation.

mod postgres;

#[cfg(test)]
pub(crate) mod memory;

pub use postgres::PgStore;

use anyhow::{Context, Result};
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;
use tracing::{Instrument, info, info_span};

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

// Serializes schema setup when several instances start at once.
const SCHEMA_LOCK_KEY: i64 = 0x5345_5141_5554_4800;

const SQLSTATE_UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    min_connections: u32,
    max_connections: u32,
    max_lifetime: Duration,
}

impl PoolConfig {
    /// Default pool: 1..5 connections, recycled every 2 minutes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            min_connections: 1,
            max_connections: 5,
            max_lifetime: Duration::from_secs(60 * 2),
        }
    }

    #[must_use]
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self.min_connections = self.min_connections.min(self.max_connections);
        self
    }

    #[must_use]
    pub fn max_connections(&self) -> u32 {
        self.max_connections
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Connect to Postgres.
///
/// # Errors
/// Returns an error if the DSN is invalid or the database is unreachable.
pub async fn connect(dsn: &str, config: &PoolConfig) -> Result<PgPool> {
    PgPoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .max_lifetime(config.max_lifetime)
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")
}

/// Create the `id_sequences` and `users` tables if they are missing.
///
/// # Errors
/// Returns an error if any schema statement fails.
pub async fn apply_schema(pool: &PgPool) -> Result<()> {
    let mut tx = pool.begin().await.context("begin schema transaction")?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(SCHEMA_LOCK_KEY)
        .execute(&mut *tx)
        .await
        .context("failed to acquire schema lock")?;

    for (index, statement) in split_sql_statements(SCHEMA_SQL).iter().enumerate() {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DDL",
            db.statement = statement.as_str()
        );
        sqlx::query(statement)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .with_context(|| format!("failed to execute schema statement {}", index + 1))?;
    }

    tx.commit().await.context("commit schema transaction")?;

    info!("Database schema is up to date");

    Ok(())
}

fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("--") {
            continue;
        }
        current.push_str(line);
        current.push('\n');

        if trimmed.ends_with(';') {
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let leftover = current.trim();
    if !leftover.is_empty() {
        statements.push(leftover.to_string());
    }

    statements
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .is_some_and(|code| code.as_ref() == SQLSTATE_UNIQUE_VIOLATION),
        _ => false,
    }
}

/// Name of the constraint a database error refers to, if any.
pub(crate) fn violated_constraint(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint(),
        _ => None,
    }
}
