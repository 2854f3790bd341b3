//! [`DatabasePool`]: connection + schema setup. [`SqliteExecutionStore`]:
//! the [`checkpoint::ExecutionStore`] implementation the server binary
//! runs against, mirroring `checkpoint::InMemoryExecutionStore`'s
//! version-increment-on-write and claim-once `try_claim_resume` semantics
//! over a real database instead of an `RwLock<HashMap>`.
//!
//! Schema setup here is plain `CREATE TABLE IF NOT EXISTS` DDL run at
//! startup rather than
//! `sqlx::migrate!()` - this crate has no versioned `./migrations`
//! directory, and an `ExecutionState` is one flat JSON blob with no
//! columns that need a migration history of their own.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

use checkpoint::{CheckpointError, ExecutionState, ExecutionStatus, ExecutionStore};

use super::error::DatabaseError;

const CREATE_EXECUTIONS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS executions (
    execution_id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    version INTEGER NOT NULL,
    project_id TEXT,
    workflow_id TEXT,
    state_json TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

const CREATE_STATUS_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_executions_status ON executions(status)";

/// Owns the pool and runs schema setup once at startup.
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    pub async fn connect(database_url: &str) -> Result<Self, DatabaseError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| DatabaseError::Connection(e.to_string()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(DatabaseError::from)?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        sqlx::query(CREATE_EXECUTIONS_TABLE).execute(&self.pool).await.map_err(|e| DatabaseError::Migration(e.to_string()))?;
        sqlx::query(CREATE_STATUS_INDEX).execute(&self.pool).await.map_err(|e| DatabaseError::Migration(e.to_string()))?;
        super::audit::create_audit_table(&self.pool).await?;
        super::workflows::create_workflows_table(&self.pool).await?;
        Ok(())
    }

    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }
}

/// [`checkpoint::ExecutionStore`] backed by the `executions` table in
/// `DatabasePool`.
pub struct SqliteExecutionStore {
    pool: SqlitePool,
}

impl SqliteExecutionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn status_label(status: ExecutionStatus) -> &'static str {
        match status {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::AwaitingHumanInput => "awaiting_human_input",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Stopped => "stopped",
        }
    }

    fn deserialize(json: &str) -> checkpoint::error::Result<ExecutionState> {
        serde_json::from_str(json).map_err(CheckpointError::Serialization)
    }
}

#[async_trait]
impl ExecutionStore for SqliteExecutionStore {
    async fn save(&self, state: &ExecutionState) -> checkpoint::error::Result<()> {
        let mut state = state.clone();
        let current: Option<(i64,)> = sqlx::query_as("SELECT version FROM executions WHERE execution_id = ?")
            .bind(state.execution_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        state.version = current.map(|(v,)| v as u64 + 1).unwrap_or(0);
        state.updated_at = Utc::now();

        let json = serde_json::to_string(&state).map_err(CheckpointError::Serialization)?;
        sqlx::query(
            "INSERT INTO executions (execution_id, status, version, project_id, workflow_id, state_json, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(execution_id) DO UPDATE SET
                status = excluded.status,
                version = excluded.version,
                project_id = excluded.project_id,
                workflow_id = excluded.workflow_id,
                state_json = excluded.state_json,
                updated_at = excluded.updated_at",
        )
        .bind(state.execution_id.to_string())
        .bind(Self::status_label(state.status))
        .bind(state.version as i64)
        .bind(state.project_id.clone())
        .bind(state.workflow_id.clone())
        .bind(&json)
        .bind(state.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn load(&self, execution_id: Uuid) -> checkpoint::error::Result<Option<ExecutionState>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT state_json FROM executions WHERE execution_id = ?")
            .bind(execution_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        row.map(|(json,)| Self::deserialize(&json)).transpose()
    }

    async fn try_claim_resume(&self, execution_id: Uuid) -> checkpoint::error::Result<ExecutionState> {
        let mut tx = self.pool.begin().await.map_err(|e| CheckpointError::Storage(e.to_string()))?;

        let row: Option<(String, i64)> = sqlx::query_as("SELECT state_json, version FROM executions WHERE execution_id = ?")
            .bind(execution_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        let (json, version) = row.ok_or_else(|| CheckpointError::NotFound(execution_id.to_string()))?;
        let mut state = Self::deserialize(&json)?;
        if state.status != ExecutionStatus::AwaitingHumanInput {
            return Err(CheckpointError::NotAwaitingInput(execution_id.to_string()));
        }
        state.status = ExecutionStatus::Running;
        state.version = version as u64 + 1;
        state.updated_at = Utc::now();
        let new_json = serde_json::to_string(&state).map_err(CheckpointError::Serialization)?;

        let result = sqlx::query(
            "UPDATE executions SET status = ?, version = ?, state_json = ?, updated_at = ?
             WHERE execution_id = ? AND version = ?",
        )
        .bind(Self::status_label(state.status))
        .bind(state.version as i64)
        .bind(&new_json)
        .bind(state.updated_at.to_rfc3339())
        .bind(execution_id.to_string())
        .bind(version)
        .execute(&mut *tx)
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?;

        if result.rows_affected() == 0 {
            // Another resume attempt already claimed this row between our
            // SELECT and UPDATE.
            return Err(CheckpointError::NotAwaitingInput(execution_id.to_string()));
        }
        tx.commit().await.map_err(|e| CheckpointError::Storage(e.to_string()))?;
        Ok(state)
    }

    async fn list_awaiting_human_input(&self) -> checkpoint::error::Result<Vec<ExecutionState>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT state_json FROM executions WHERE status = ?")
            .bind(Self::status_label(ExecutionStatus::AwaitingHumanInput))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        rows.into_iter().map(|(json,)| Self::deserialize(&json)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteExecutionStore {
        let pool = DatabasePool::connect("sqlite::memory:").await.unwrap();
        SqliteExecutionStore::new(pool.pool())
    }

    #[tokio::test]
    async fn save_and_load_round_trips() {
        let store = store().await;
        let state = ExecutionState::new(Uuid::new_v4());
        store.save(&state).await.unwrap();
        let loaded = store.load(state.execution_id).await.unwrap().unwrap();
        assert_eq!(loaded.execution_id, state.execution_id);
        assert_eq!(loaded.version, 0);
    }

    #[tokio::test]
    async fn save_bumps_version_on_each_write() {
        let store = store().await;
        let state = ExecutionState::new(Uuid::new_v4());
        store.save(&state).await.unwrap();
        store.save(&state).await.unwrap();
        let loaded = store.load(state.execution_id).await.unwrap().unwrap();
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    async fn claim_resume_fails_when_not_paused() {
        let store = store().await;
        let state = ExecutionState::new(Uuid::new_v4());
        store.save(&state).await.unwrap();
        let err = store.try_claim_resume(state.execution_id).await.unwrap_err();
        assert!(matches!(err, CheckpointError::NotAwaitingInput(_)));
    }

    #[tokio::test]
    async fn claim_resume_transitions_status_exactly_once() {
        let store = store().await;
        let mut state = ExecutionState::new(Uuid::new_v4());
        state.status = ExecutionStatus::AwaitingHumanInput;
        store.save(&state).await.unwrap();

        let claimed = store.try_claim_resume(state.execution_id).await.unwrap();
        assert_eq!(claimed.status, ExecutionStatus::Running);

        let second = store.try_claim_resume(state.execution_id).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn lists_only_paused_executions() {
        let store = store().await;
        let mut paused = ExecutionState::new(Uuid::new_v4());
        paused.status = ExecutionStatus::AwaitingHumanInput;
        store.save(&paused).await.unwrap();
        let running = ExecutionState::new(Uuid::new_v4());
        store.save(&running).await.unwrap();

        let pending = store.list_awaiting_human_input().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].execution_id, paused.execution_id);
    }
}
