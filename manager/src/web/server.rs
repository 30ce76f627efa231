use crate::web::{handlers, AppState};
use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Serves the admin API until `shutdown` flips to true
pub async fn start_web_server(state: AppState, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await?;
    Ok(())
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // === STATUS ROUTES ===
        .route("/api/health", get(handlers::get_health))
        .route("/api/pools", get(handlers::get_pools))
        .route("/api/system-logs", get(handlers::get_system_logs))
        // === INSTALL JOB ROUTES ===
        .route(
            "/api/install-jobs",
            get(handlers::list_install_jobs).post(handlers::schedule_install_job),
        )
        .route(
            "/api/install-jobs/history",
            get(handlers::list_install_history),
        )
        // === OPTION TOGGLES ===
        .route("/api/options/can-install", post(handlers::set_can_install))
        .route("/api/options/can-schedule", post(handlers::set_can_schedule))
        // === REPOSITORY ===
        .route(
            "/api/repository/files",
            get(handlers::list_repository_files),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
