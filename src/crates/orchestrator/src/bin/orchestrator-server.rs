//! Orchestrator server binary: the REST transport (spec.md §6) in front of
//! [`orchestrator::engine::Engine`].

use std::sync::Arc;

use orchestrator::api::create_router;
use orchestrator::config::ServerConfig;
use orchestrator::credentials::EnvCredentialStore;
use orchestrator::db::{DatabasePool, SqliteAuditLog, SqliteExecutionStore, SqliteWorkflowStore};
use orchestrator::engine::Engine;
use orchestrator::human_input;
use orchestrator::workflow_store::WorkflowStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(rust_log).init();

    let config = ServerConfig::load();
    tracing::info!(name = %config.server.name, bind = %config.bind_addr(), db = %config.database.path, "loaded server configuration");

    let db = DatabasePool::connect(&config.database_url()).await?;
    let pool = db.pool();

    let store = Arc::new(SqliteExecutionStore::new(pool.clone()));
    let audit = Arc::new(SqliteAuditLog::new(pool.clone()));
    let workflows: Arc<dyn WorkflowStore> = Arc::new(SqliteWorkflowStore::new(pool));
    let credentials = Arc::new(EnvCredentialStore);

    let engine = Arc::new(Engine::new(store.clone(), audit, credentials, None));

    let ttl = config.human_input_ttl();
    let sweep_store = store.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            match human_input::sweep_stale_executions(sweep_store.as_ref(), ttl).await {
                Ok(0) => {}
                Ok(n) => tracing::info!(count = n, "swept stale paused executions"),
                Err(e) => tracing::warn!(error = %e, "stale-execution sweep failed"),
            }
        }
    });

    let app = create_router(engine, workflows);

    let addr: std::net::SocketAddr = config.bind_addr().parse()?;
    tracing::info!(%addr, "starting orchestrator server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("orchestrator server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install CTRL-C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received CTRL-C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
