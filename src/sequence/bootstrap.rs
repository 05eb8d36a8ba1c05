use super::{SequenceStore, UNINITIALIZED, USER_ID_SEQUENCE};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// The counter row was missing and has been seeded with `-1`.
    Created,
    /// The counter row already existed; it was left untouched.
    Existing,
    /// The store could not be reached or rejected the insert.
    Failed,
}

/// Make sure the `user_id` counter exists before allocations start.
///
/// Never fails: errors are logged and reported as `BootstrapOutcome::Failed`,
/// after which allocations surface `NotInitialized` until the row exists.
pub async fn bootstrap(store: &dyn SequenceStore) -> BootstrapOutcome {
    match store.ensure(USER_ID_SEQUENCE, UNINITIALIZED).await {
        Ok(true) => {
            info!(
                sequence = USER_ID_SEQUENCE,
                last_id = UNINITIALIZED,
                "Sequence initialized"
            );
            BootstrapOutcome::Created
        }
        Ok(false) => {
            info!(sequence = USER_ID_SEQUENCE, "Sequence already initialized");
            BootstrapOutcome::Existing
        }
        Err(err) => {
            error!("Failed to initialize sequence {USER_ID_SEQUENCE}: {err}");
            BootstrapOutcome::Failed
        }
    }
}
