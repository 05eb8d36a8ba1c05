//! User accounts and their password hashes.

mod password;

pub use password::{Argon2Hasher, HashParams};

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// A stored account. `password_hash` never leaves the server.
#[derive(Debug, Clone)]
pub struct UserAccount {
    pub internal_id: Uuid,
    pub user_id: i64,
    pub username: String,
    pub password_hash: String,
    /// RFC 3339 timestamp in UTC, set by the store on insert.
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub user_id: i64,
    pub username: String,
    pub password_hash: String,
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("username already exists")]
    UsernameTaken,
    #[error("user_id {0} is already assigned")]
    UserIdTaken(i64),
    #[error("account store error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserAccount>, AccountError>;

    /// Insert an account. Uniqueness of `username` and `user_id` is enforced by
    /// the store and reported as `UsernameTaken` / `UserIdTaken`.
    async fn insert(&self, account: NewAccount) -> Result<UserAccount, AccountError>;
}
