//! [`SqliteAuditLog`]: a durable [`crate::human_input::HumanInputAuditLog`]
//! recording every `POST /human-input/submit` call, independent of the
//! execution row itself - a resume that later fails to save can still be
//! traced back to the human input that triggered it.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use uuid::Uuid;

use crate::error::OrchestratorError;
use crate::human_input::HumanInputAuditLog;

use super::error::DatabaseError;

const CREATE_AUDIT_TABLE: &str = "
CREATE TABLE IF NOT EXISTS human_input_audit (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    execution_id TEXT NOT NULL,
    human_input TEXT NOT NULL,
    action TEXT NOT NULL,
    recorded_at TEXT NOT NULL
)";

const CREATE_EXECUTION_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_audit_execution ON human_input_audit(execution_id)";

pub(super) async fn create_audit_table(pool: &SqlitePool) -> Result<(), DatabaseError> {
    sqlx::query(CREATE_AUDIT_TABLE).execute(pool).await.map_err(|e| DatabaseError::Migration(e.to_string()))?;
    sqlx::query(CREATE_EXECUTION_INDEX).execute(pool).await.map_err(|e| DatabaseError::Migration(e.to_string()))?;
    Ok(())
}

/// [`HumanInputAuditLog`] backed by the `human_input_audit` table.
pub struct SqliteAuditLog {
    pool: SqlitePool,
}

impl SqliteAuditLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HumanInputAuditLog for SqliteAuditLog {
    async fn record(&self, execution_id: Uuid, human_input: &str, action: &str) -> Result<(), OrchestratorError> {
        sqlx::query("INSERT INTO human_input_audit (execution_id, human_input, action, recorded_at) VALUES (?, ?, ?, ?)")
            .bind(execution_id.to_string())
            .bind(human_input)
            .bind(action)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| OrchestratorError::Database(DatabaseError::from(e)))?;
        Ok(())
    }
}
