//! `sqlx` implementation of the sequence and account stores.

use super::{is_unique_violation, violated_constraint};
use crate::{
    accounts::{AccountError, AccountStore, NewAccount, UserAccount},
    sequence::{SequenceError, SequenceStore},
};
use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::{Instrument, debug, info_span};

const USERS_USERNAME_KEY: &str = "users_username_key";
const USERS_USER_ID_KEY: &str = "users_user_id_key";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SequenceStore for PgStore {
    async fn ensure(&self, name: &str, initial: i64) -> Result<bool, SequenceError> {
        let query = r"
            INSERT INTO id_sequences (name, last_id)
            VALUES ($1, $2)
            ON CONFLICT (name) DO NOTHING
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(name)
            .bind(initial)
            .execute(&self.pool)
            .instrument(span)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn increment_and_wrap(&self, name: &str, modulus: i64) -> Result<i64, SequenceError> {
        // The UPDATE takes a row lock that is held until commit, so concurrent
        // allocators on the same name queue behind each other.
        let mut tx = self.pool.begin().await?;

        let query = r"
            UPDATE id_sequences
            SET last_id = (last_id + 1) % $2
            WHERE name = $1
            RETURNING last_id
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(name)
            .bind(modulus)
            .fetch_optional(&mut *tx)
            .instrument(span)
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Err(SequenceError::NotInitialized(name.to_string()));
        };

        let last_id: i64 = row.get("last_id");

        tx.commit().await?;

        Ok(last_id)
    }

    async fn last_id(&self, name: &str) -> Result<Option<i64>, SequenceError> {
        let query = "SELECT last_id FROM id_sequences WHERE name = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(name)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        Ok(row.map(|row| row.get("last_id")))
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserAccount>, AccountError> {
        let query = r#"
            SELECT id, user_id, username, password_hash,
                to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at
            FROM users
            WHERE username = $1
        "#;
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        Ok(row.as_ref().map(account_from_row))
    }

    async fn insert(&self, account: NewAccount) -> Result<UserAccount, AccountError> {
        let query = r#"
            INSERT INTO users (user_id, username, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, username, password_hash,
                to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at
        "#;
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(account.user_id)
            .bind(&account.username)
            .bind(&account.password_hash)
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        match row {
            Ok(row) => Ok(account_from_row(&row)),
            Err(err) if is_unique_violation(&err) => {
                let constraint = violated_constraint(&err).map(str::to_owned);
                debug!("Unique violation on {:?}", constraint);
                Err(unique_violation_error(
                    constraint.as_deref(),
                    account.user_id,
                    err,
                ))
            }
            Err(err) => Err(AccountError::Database(err)),
        }
    }
}

fn unique_violation_error(
    constraint: Option<&str>,
    user_id: i64,
    err: sqlx::Error,
) -> AccountError {
    match constraint {
        Some(USERS_USERNAME_KEY) => AccountError::UsernameTaken,
        Some(USERS_USER_ID_KEY) => AccountError::UserIdTaken(user_id),
        _ => AccountError::Database(err),
    }
}

fn account_from_row(row: &PgRow) -> UserAccount {
    UserAccount {
        internal_id: row.get("id"),
        user_id: row.get("user_id"),
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        created_at: row.get("created_at"),
    }
}
