//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::EngineError;
use crate::models::build_log::BuildLog;
use crate::models::deployment::{Deployment, TriggerSource};
use crate::server::state::ServerState;
use crate::utils::version_info;
use crate::webhook::provider::Provider;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "deployd".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

// ================================ DEPLOYMENTS ==================================== //

pub async fn list_deployments_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<u64>,
) -> Result<Json<Vec<Deployment>>, EngineError> {
    state.store().get_project(project_id).await?;
    Ok(Json(state.store().list_deployments(project_id).await?))
}

/// Optional body of a manual trigger
#[derive(Debug, Default, Deserialize)]
pub struct TriggerRequest {
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub user_id: Option<u64>,
}

pub async fn trigger_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<u64>,
    body: Bytes,
) -> Result<impl IntoResponse, EngineError> {
    let request: TriggerRequest = if body.is_empty() {
        TriggerRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| EngineError::ValidationError(format!("invalid request body: {}", e)))?
    };

    let project = state.store().get_project(project_id).await?;
    let branch = request
        .branch
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| project.git_branch.clone());

    let mut deployment = Deployment::pending(project_id, &branch, TriggerSource::Manual);
    deployment.triggered_by_user = request.user_id;
    let deployment = state.orchestrator.trigger(deployment).await?;

    Ok((StatusCode::CREATED, Json(deployment)))
}

/// Deployment `deployment_id`, provided it belongs to `project_id`
async fn project_deployment(
    state: &ServerState,
    project_id: u64,
    deployment_id: u64,
) -> Result<Deployment, EngineError> {
    let deployment = state.store().get_deployment(deployment_id).await?;
    if deployment.project_id != project_id {
        return Err(EngineError::NotFound(format!(
            "deployment {} of project {}",
            deployment_id, project_id
        )));
    }
    Ok(deployment)
}

pub async fn deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path((project_id, deployment_id)): Path<(u64, u64)>,
) -> Result<Json<Deployment>, EngineError> {
    Ok(Json(project_deployment(&state, project_id, deployment_id).await?))
}

pub async fn cancel_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path((project_id, deployment_id)): Path<(u64, u64)>,
) -> Result<Json<Deployment>, EngineError> {
    project_deployment(&state, project_id, deployment_id).await?;
    Ok(Json(state.orchestrator.cancel(deployment_id).await?))
}

pub async fn deployment_logs_handler(
    State(state): State<Arc<ServerState>>,
    Path((project_id, deployment_id)): Path<(u64, u64)>,
) -> Result<Json<Vec<BuildLog>>, EngineError> {
    project_deployment(&state, project_id, deployment_id).await?;
    Ok(Json(state.store().list_logs(deployment_id).await?))
}

// ================================== WEBHOOKS ===================================== //

/// Push notification from a git provider
pub async fn webhook_handler(
    State(state): State<Arc<ServerState>>,
    Path((provider, project_id)): Path<(String, u64)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, EngineError> {
    let provider: Provider = provider
        .parse()
        .map_err(|_| EngineError::NotFound(format!("webhook provider {}", provider)))?;

    let signature = headers
        .get(provider.signature_header())
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let ack = state
        .gateway
        .handle_push(provider, project_id, signature, &body)
        .await?;
    let status = if ack.deployed() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(ack)))
}

#[derive(Debug, Serialize)]
pub struct WebhookRegistration {
    pub registered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Register the provider hook. Provider failures are reported, not raised.
pub async fn register_webhook_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<u64>,
) -> Result<Json<WebhookRegistration>, EngineError> {
    state.store().get_project(project_id).await?;
    match state.gateway.register(project_id).await {
        Ok(url) => Ok(Json(WebhookRegistration {
            registered: true,
            url: Some(url),
            error: None,
        })),
        Err(e) => {
            warn!("Failed to register webhook for project {}: {}", project_id, e);
            Ok(Json(WebhookRegistration {
                registered: false,
                url: None,
                error: Some(e.to_string()),
            }))
        }
    }
}

pub async fn unregister_webhook_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<u64>,
) -> Result<Json<WebhookRegistration>, EngineError> {
    state.store().get_project(project_id).await?;
    match state.gateway.unregister(project_id).await {
        Ok(()) => Ok(Json(WebhookRegistration {
            registered: false,
            url: None,
            error: None,
        })),
        Err(e) => {
            warn!("Failed to remove webhook for project {}: {}", project_id, e);
            Ok(Json(WebhookRegistration {
                registered: true,
                url: None,
                error: Some(e.to_string()),
            }))
        }
    }
}

// =============================== BACKEND SERVICE ================================= //

#[derive(Debug, Serialize)]
pub struct ProjectBackendVersion {
    pub project_id: u64,
    pub name: String,
    pub version: String,
    pub update_available: bool,
}

#[derive(Debug, Serialize)]
pub struct BackendVersionResponse {
    pub latest_version: String,
    pub projects: Vec<ProjectBackendVersion>,
}

/// Latest backend service release and the version each project runs
pub async fn backend_version_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<BackendVersionResponse>, EngineError> {
    let latest_version = state.orchestrator.latest_backend_version().await?;
    let projects = state
        .store()
        .list_projects()
        .await?
        .into_iter()
        .filter_map(|p| {
            let version = p.backend_version?;
            Some(ProjectBackendVersion {
                project_id: p.id,
                name: p.name,
                update_available: version != latest_version,
                version,
            })
        })
        .collect();

    Ok(Json(BackendVersionResponse {
        latest_version,
        projects,
    }))
}
