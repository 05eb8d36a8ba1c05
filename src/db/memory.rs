//! In-process store double for unit tests.
//!
//! A single async mutex stands in for the database row lock: it is held for the
//! whole read-modify-write, including a yield point, so tests exercise real
//! interleavings between concurrent callers.

use crate::{
    accounts::{AccountError, AccountStore, NewAccount, UserAccount},
    sequence::{SequenceError, SequenceStore},
};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
};
use tokio::sync::Mutex;
use uuid::Uuid;

const CREATED_AT: &str = "2024-01-01T00:00:00Z";

#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    sequences: Mutex<HashMap<String, i64>>,
    accounts: Mutex<Vec<UserAccount>>,
    increments: AtomicUsize,
    fail_sequences: bool,
    fail_inserts: bool,
    stale_lookups: bool,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every sequence operation fails as if the database were unreachable.
    pub(crate) fn with_failing_sequences(mut self) -> Self {
        self.fail_sequences = true;
        self
    }

    /// Account inserts fail with a non-constraint database error.
    pub(crate) fn with_failing_inserts(mut self) -> Self {
        self.fail_inserts = true;
        self
    }

    /// Username lookups never find anything, as when a concurrent request
    /// inserts between the check and the insert.
    pub(crate) fn with_stale_lookups(mut self) -> Self {
        self.stale_lookups = true;
        self
    }

    /// Number of `increment_and_wrap` calls, successful or not.
    pub(crate) fn increment_calls(&self) -> usize {
        self.increments.load(Ordering::SeqCst)
    }

    pub(crate) async fn account_count(&self) -> usize {
        self.accounts.lock().await.len()
    }

    pub(crate) async fn account(&self, username: &str) -> Option<UserAccount> {
        self.accounts
            .lock()
            .await
            .iter()
            .find(|account| account.username == username)
            .cloned()
    }
}

#[async_trait]
impl SequenceStore for MemoryStore {
    async fn ensure(&self, name: &str, initial: i64) -> Result<bool, SequenceError> {
        if self.fail_sequences {
            return Err(SequenceError::Database(sqlx::Error::PoolTimedOut));
        }

        let mut sequences = self.sequences.lock().await;
        if sequences.contains_key(name) {
            return Ok(false);
        }
        sequences.insert(name.to_string(), initial);
        Ok(true)
    }

    async fn increment_and_wrap(&self, name: &str, modulus: i64) -> Result<i64, SequenceError> {
        self.increments.fetch_add(1, Ordering::SeqCst);
        if self.fail_sequences {
            return Err(SequenceError::Database(sqlx::Error::PoolTimedOut));
        }

        let mut sequences = self.sequences.lock().await;
        tokio::task::yield_now().await;

        let Some(last_id) = sequences.get_mut(name) else {
            return Err(SequenceError::NotInitialized(name.to_string()));
        };
        *last_id = (*last_id + 1) % modulus;
        Ok(*last_id)
    }

    async fn last_id(&self, name: &str) -> Result<Option<i64>, SequenceError> {
        if self.fail_sequences {
            return Err(SequenceError::Database(sqlx::Error::PoolTimedOut));
        }

        Ok(self.sequences.lock().await.get(name).copied())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserAccount>, AccountError> {
        if self.stale_lookups {
            return Ok(None);
        }

        Ok(self.account(username).await)
    }

    async fn insert(&self, account: NewAccount) -> Result<UserAccount, AccountError> {
        if self.fail_inserts {
            return Err(AccountError::Database(sqlx::Error::PoolClosed));
        }

        let mut accounts = self.accounts.lock().await;
        if accounts.iter().any(|a| a.username == account.username) {
            return Err(AccountError::UsernameTaken);
        }
        if accounts.iter().any(|a| a.user_id == account.user_id) {
            return Err(AccountError::UserIdTaken(account.user_id));
        }

        let stored = UserAccount {
            internal_id: Uuid::new_v4(),
            user_id: account.user_id,
            username: account.username,
            password_hash: account.password_hash,
            created_at: CREATED_AT.to_string(),
        };
        accounts.push(stored.clone());
        Ok(stored)
    }
}
