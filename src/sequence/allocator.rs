use super::{MAX_ID, SequenceError, SequenceStore, USER_ID_SEQUENCE};
use std::{fmt, sync::Arc};
use tracing::{debug, instrument};

/// Hands out ids in `[0, modulus)` from a named store-backed counter.
///
/// Every successful call advances the counter exactly once. Ids are never
/// returned to a pool: if the caller fails after allocating, the id is a gap.
#[derive(Clone)]
pub struct IdAllocator {
    store: Arc<dyn SequenceStore>,
    name: String,
    modulus: i64,
}

impl IdAllocator {
    /// Build an allocator for an arbitrary counter.
    ///
    /// # Errors
    /// Returns `SequenceError::InvalidModulus` if `modulus` is not positive.
    pub fn new(
        store: Arc<dyn SequenceStore>,
        name: impl Into<String>,
        modulus: i64,
    ) -> Result<Self, SequenceError> {
        if modulus <= 0 {
            return Err(SequenceError::InvalidModulus(modulus));
        }

        Ok(Self {
            store,
            name: name.into(),
            modulus,
        })
    }

    /// The `user_id` allocator: counter `"user_id"`, ids in `[0, 1_000_000)`.
    #[must_use]
    pub fn for_user_ids(store: Arc<dyn SequenceStore>) -> Self {
        Self {
            store,
            name: USER_ID_SEQUENCE.to_string(),
            modulus: MAX_ID,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn modulus(&self) -> i64 {
        self.modulus
    }

    /// Reserve the next id.
    ///
    /// # Errors
    /// `SequenceError::NotInitialized` if the counter row is missing, or a store
    /// error. Failures are not retried.
    #[instrument(skip(self), fields(sequence = %self.name))]
    pub async fn allocate(&self) -> Result<i64, SequenceError> {
        let id = self
            .store
            .increment_and_wrap(&self.name, self.modulus)
            .await?;

        debug!(id, "allocated id");

        Ok(id)
    }
}

impl fmt::Debug for IdAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdAllocator")
            .field("name", &self.name)
            .field("modulus", &self.modulus)
            .finish_non_exhaustive()
    }
}
