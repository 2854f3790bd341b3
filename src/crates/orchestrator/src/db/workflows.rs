//! [`SqliteWorkflowStore`]: the [`crate::workflow_store::WorkflowStore`]
//! implementation the server binary runs against, storing each submitted
//! graph's JSON under its `workflow_id` so a later resume can recall it.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use graph_core::graph::Graph;

use crate::error::OrchestratorError;
use crate::workflow_store::WorkflowStore;

use super::error::DatabaseError;

const CREATE_WORKFLOWS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS workflow_graphs (
    workflow_id TEXT PRIMARY KEY,
    graph_json TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

pub(super) async fn create_workflows_table(pool: &SqlitePool) -> Result<(), DatabaseError> {
    sqlx::query(CREATE_WORKFLOWS_TABLE).execute(pool).await.map_err(|e| DatabaseError::Migration(e.to_string()))?;
    Ok(())
}

pub struct SqliteWorkflowStore {
    pool: SqlitePool,
}

impl SqliteWorkflowStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkflowStore for SqliteWorkflowStore {
    async fn save_graph(&self, workflow_id: &str, graph: &Graph) -> Result<(), OrchestratorError> {
        let json = serde_json::to_string(graph)?;
        sqlx::query(
            "INSERT INTO workflow_graphs (workflow_id, graph_json, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(workflow_id) DO UPDATE SET graph_json = excluded.graph_json, updated_at = excluded.updated_at",
        )
        .bind(workflow_id)
        .bind(&json)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| OrchestratorError::Database(DatabaseError::from(e)))?;
        Ok(())
    }

    async fn load_graph(&self, workflow_id: &str) -> Result<Option<Graph>, OrchestratorError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT graph_json FROM workflow_graphs WHERE workflow_id = ?")
            .bind(workflow_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| OrchestratorError::Database(DatabaseError::from(e)))?;
        row.map(|(json,)| serde_json::from_str(&json).map_err(OrchestratorError::from)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::DatabasePool;
    use graph_core::graph::{Node, NodeConfig, NodeType};

    fn graph() -> Graph {
        Graph { nodes: vec![Node { id: "start".into(), node_type: NodeType::StartNode, data: NodeConfig::default() }], edges: vec![] }
    }

    #[tokio::test]
    async fn round_trips_through_sqlite() {
        let db = DatabasePool::connect("sqlite::memory:").await.unwrap();
        let store = SqliteWorkflowStore::new(db.pool());
        store.save_graph("wf-1", &graph()).await.unwrap();
        let loaded = store.load_graph("wf-1").await.unwrap().unwrap();
        assert_eq!(loaded.nodes[0].id, "start");
    }
}
