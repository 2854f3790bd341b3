//! In-memory [`ExecutionStore`], used in tests and as a default for
//! single-process deployments. The SQLite-backed store lives in
//! `orchestrator::db` since it needs `sqlx`, which this crate does not
//! depend on.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{CheckpointError, Result};
use crate::state::{ExecutionState, ExecutionStatus};
use crate::traits::ExecutionStore;

#[derive(Default)]
pub struct InMemoryExecutionStore {
    rows: Arc<RwLock<HashMap<Uuid, ExecutionState>>>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn save(&self, state: &ExecutionState) -> Result<()> {
        let mut state = state.clone();
        let mut rows = self.rows.write();
        state.version = rows.get(&state.execution_id).map(|s| s.version + 1).unwrap_or(0);
        state.updated_at = chrono::Utc::now();
        rows.insert(state.execution_id, state);
        Ok(())
    }

    async fn load(&self, execution_id: Uuid) -> Result<Option<ExecutionState>> {
        Ok(self.rows.read().get(&execution_id).cloned())
    }

    async fn try_claim_resume(&self, execution_id: Uuid) -> Result<ExecutionState> {
        let mut rows = self.rows.write();
        let state = rows
            .get_mut(&execution_id)
            .ok_or_else(|| CheckpointError::NotFound(execution_id.to_string()))?;
        if state.status != ExecutionStatus::AwaitingHumanInput {
            return Err(CheckpointError::NotAwaitingInput(execution_id.to_string()));
        }
        state.status = ExecutionStatus::Running;
        state.version += 1;
        Ok(state.clone())
    }

    async fn list_awaiting_human_input(&self) -> Result<Vec<ExecutionState>> {
        Ok(self
            .rows
            .read()
            .values()
            .filter(|s| s.status == ExecutionStatus::AwaitingHumanInput)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_and_load_round_trips() {
        let store = InMemoryExecutionStore::new();
        let state = ExecutionState::new(Uuid::new_v4());
        store.save(&state).await.unwrap();
        let loaded = store.load(state.execution_id).await.unwrap().unwrap();
        assert_eq!(loaded.execution_id, state.execution_id);
        assert_eq!(loaded.version, 0);
    }

    #[tokio::test]
    async fn claim_resume_fails_when_not_paused() {
        let store = InMemoryExecutionStore::new();
        let state = ExecutionState::new(Uuid::new_v4());
        store.save(&state).await.unwrap();
        let err = store.try_claim_resume(state.execution_id).await.unwrap_err();
        assert!(matches!(err, CheckpointError::NotAwaitingInput(_)));
    }

    #[tokio::test]
    async fn claim_resume_transitions_status_once() {
        let store = InMemoryExecutionStore::new();
        let mut state = ExecutionState::new(Uuid::new_v4());
        state.status = ExecutionStatus::AwaitingHumanInput;
        store.save(&state).await.unwrap();

        let claimed = store.try_claim_resume(state.execution_id).await.unwrap();
        assert_eq!(claimed.status, ExecutionStatus::Running);

        let second = store.try_claim_resume(state.execution_id).await;
        assert!(second.is_err());
    }
}
