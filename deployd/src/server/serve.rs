//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::EngineError;
use crate::server::handlers::{
    backend_version_handler, cancel_deployment_handler, deployment_handler,
    deployment_logs_handler, health_handler, list_deployments_handler,
    register_webhook_handler, trigger_deployment_handler, unregister_webhook_handler,
    version_handler, webhook_handler,
};
use crate::server::state::ServerState;

/// Routes of the HTTP API
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Deployments
        .route(
            "/api/v1/projects/{id}/deployments",
            get(list_deployments_handler).post(trigger_deployment_handler),
        )
        .route(
            "/api/v1/projects/{id}/deployments/{deployment_id}",
            get(deployment_handler),
        )
        .route(
            "/api/v1/projects/{id}/deployments/{deployment_id}/cancel",
            post(cancel_deployment_handler),
        )
        .route(
            "/api/v1/projects/{id}/deployments/{deployment_id}/logs",
            get(deployment_logs_handler),
        )
        // Webhooks
        .route(
            "/api/v1/projects/{id}/webhook",
            post(register_webhook_handler).delete(unregister_webhook_handler),
        )
        .route(
            "/api/v1/webhooks/{provider}/{project_id}",
            post(webhook_handler),
        )
        // Backend service
        .route("/api/v1/backend-service/version", get(backend_version_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), EngineError>>, EngineError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| EngineError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| EngineError::ServerError(e.to_string()))
    });

    Ok(handle)
}
