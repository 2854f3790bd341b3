//! SQLite-backed persistence: a [`checkpoint::ExecutionStore`] implementation
//! plus a [`crate::human_input::HumanInputAuditLog`] implementation, for the
//! server binary. [`checkpoint::InMemoryExecutionStore`] covers tests and
//! single-process embedding; this module is what `orchestrator-server`
//! actually runs against.

pub mod audit;
pub mod error;
pub mod store;
pub mod workflows;

pub use audit::SqliteAuditLog;
pub use error::DatabaseError;
pub use store::{DatabasePool, SqliteExecutionStore};
pub use workflows::SqliteWorkflowStore;
