use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::{
    services::{
        cancel_task, get_result, get_task, health, probe_media, submit_combine, submit_download,
    },
    state::AppState,
};
use crate::config::Config;
use crate::mediatool::{MediaTool, SubprocessTool};
use crate::tasks::TaskStore;
use crate::worker::{TaskRunner, WorkDirs, task_queue};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Build the API router on top of an assembled state.
///
/// Split out from [`run`] so tests can drive the same routes in-process
/// with a scripted tool instead of real subprocesses.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/probe", post(probe_media))
        .route("/api/tasks/download", post(submit_download))
        .route("/api/tasks/combine", post(submit_combine))
        .route("/api/tasks/{task_id}", get(get_task))
        .route("/api/tasks/{task_id}/cancel", post(cancel_task))
        .route("/api/tasks/{task_id}/result", get(get_result))
        .route("/health", get(health))
        .with_state(state)
        // Request/response logging at the middleware level
        .layer(TraceLayer::new_for_http())
}

pub async fn run(address: Option<SocketAddr>) -> Result<(), AnyError> {
    // Load config
    info!("Loading configuration");
    let config = Config::load().map_err(|e| format!("Failed to load config: {}", e))?;
    let address = address.unwrap_or(config.server.bind_addr);

    // Working directories must exist before the runner and sweeper start
    tokio::fs::create_dir_all(&config.engine.work_dir).await?;
    tokio::fs::create_dir_all(&config.engine.artifact_dir).await?;

    let dirs = WorkDirs {
        work_dir: config.engine.work_dir.clone(),
        artifact_dir: config.engine.artifact_dir.clone(),
    };

    let store = Arc::new(TaskStore::new());
    let tool: Arc<dyn MediaTool> = Arc::new(SubprocessTool::new(&config.tools));
    let (queue, receiver) = task_queue(config.engine.queue_capacity);

    let state = AppState::new(config, store, queue, tool);

    // Single consumer drains the queue in submission order
    let runner = TaskRunner::new(
        state.store.clone(),
        state.tool.clone(),
        dirs.clone(),
        state.metrics.clone(),
    );
    tokio::spawn(runner.run(receiver));

    // Periodic artifact retention sweep
    tokio::spawn(crate::janitor::run(
        dirs.artifact_dir,
        state.config.retention.artifact_ttl.as_duration(),
        state.config.retention.sweep_interval.as_duration(),
        state.metrics.clone(),
    ));

    let app = router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "MediaBox API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())
            .expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
