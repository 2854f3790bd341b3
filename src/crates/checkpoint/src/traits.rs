//! The [`ExecutionStore`] trait: atomic-upsert persistence for a single
//! [`crate::state::ExecutionState`] row per execution.
//!
//! This is deliberately much narrower than a generic, channel-versioned
//! checkpoint saver: there is exactly one logical row per execution, and
//! the only concurrency hazard is two resume attempts racing each other,
//! not branching timelines or time travel. `try_claim_resume` exists
//! specifically to make that race safe: it is the only operation allowed
//! to move an execution out of `AwaitingHumanInput`, and it fails loudly
//! (rather than silently clobbering) if another caller already claimed it.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::state::ExecutionState;

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Insert or overwrite the row for `state.execution_id`, bumping
    /// `version`. Always succeeds as a plain upsert - callers wanting the
    /// race-safe resume transition use [`ExecutionStore::try_claim_resume`]
    /// instead.
    async fn save(&self, state: &ExecutionState) -> Result<()>;

    async fn load(&self, execution_id: Uuid) -> Result<Option<ExecutionState>>;

    /// Atomically transition `execution_id` from `AwaitingHumanInput` to
    /// `Running` and return the freshly-loaded state. Returns
    /// [`crate::error::CheckpointError::NotAwaitingInput`] if the row is
    /// not currently paused - the caller should treat that as "someone
    /// else already resumed this execution" rather than retry.
    async fn try_claim_resume(&self, execution_id: Uuid) -> Result<ExecutionState>;

    async fn list_awaiting_human_input(&self) -> Result<Vec<ExecutionState>>;
}
