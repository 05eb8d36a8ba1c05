//! Named counters and the user id allocator built on top of them.
//!
//! A counter is a single persisted row (`name`, `last_id`). The only mutation is
//! an atomic increment-and-wrap performed by the backing store under its own
//! transaction isolation; nothing in the process caches or locks the value, so
//! several instances behind a load balancer share one consistent sequence.

mod allocator;
mod bootstrap;

pub use allocator::IdAllocator;
pub use bootstrap::{BootstrapOutcome, bootstrap};

use async_trait::async_trait;
use thiserror::Error;

/// Logical name of the counter that feeds `users.user_id`.
pub const USER_ID_SEQUENCE: &str = "user_id";

/// Size of the user id space: ids are in `[0, MAX_ID)`.
pub const MAX_ID: i64 = 1_000_000;

/// Seed value meaning "no id issued yet"; the first allocation yields `0`.
pub const UNINITIALIZED: i64 = -1;

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("sequence `{0}` is not initialized")]
    NotInitialized(String),
    #[error("invalid sequence modulus: {0}")]
    InvalidModulus(i64),
    #[error("sequence store error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Durable storage for named counters.
#[async_trait]
pub trait SequenceStore: Send + Sync {
    /// Create the counter with `last_id = initial` if it does not exist.
    ///
    /// Returns `true` when a row was created, `false` when one already existed.
    /// Idempotent and safe to race with other `ensure` calls and allocations.
    async fn ensure(&self, name: &str, initial: i64) -> Result<bool, SequenceError>;

    /// Atomically set `last_id = (last_id + 1) % modulus` and return the new value.
    ///
    /// Concurrent callers on the same `name` are serialized by the store, so no
    /// two calls observe the same pre-increment value.
    ///
    /// # Errors
    /// `SequenceError::NotInitialized` when no row exists for `name`; nothing is
    /// written in that case.
    async fn increment_and_wrap(&self, name: &str, modulus: i64) -> Result<i64, SequenceError>;

    /// Read the current `last_id` without mutating it.
    async fn last_id(&self, name: &str) -> Result<Option<i64>, SequenceError>;
}
