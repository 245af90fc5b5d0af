//! Error types for the deployment engine

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Main error type for deployd
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("failed to fetch repository: {0}")]
    FetchError(String),

    #[error("failed to read project manifest: {0}")]
    DetectionError(String),

    #[error("no available port found in range {floor}-{}", .floor + .attempts)]
    PortExhaustion { floor: u16, attempts: u16 },

    #[error("failed to build image: {0}")]
    BuildError(String),

    #[error("port conflict: {0} is already in use. Please use a different port for your project")]
    PortConflict(String),

    #[error("failed to start container: {0}")]
    ContainerStartError(String),

    #[error("reverse proxy configuration error: {0}")]
    ProxyConfigError(String),

    #[error("invalid webhook signature: {0}")]
    WebhookSignatureError(String),

    #[error("upstream API error: {0}")]
    UpstreamError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Storage error: {0}")]
    StoreError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("a deployment is already in progress for project {0}")]
    DeploymentInProgress(u64),

    #[error("deployment {0} was cancelled")]
    Cancelled(u64),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Internal(err.to_string())
    }
}

impl EngineError {
    /// HTTP status used when the error crosses the API boundary
    pub fn status_code(&self) -> StatusCode {
        match self {
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::ValidationError(_) => StatusCode::BAD_REQUEST,
            EngineError::WebhookSignatureError(_) | EngineError::AuthError(_) => {
                StatusCode::UNAUTHORIZED
            }
            EngineError::DeploymentInProgress(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
