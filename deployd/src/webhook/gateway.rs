//! Webhook gateway
//!
//! Turns verified push notifications into deployments and manages the hooks
//! registered on the hosting providers.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::credentials::CredentialResolver;
use crate::deploy::Orchestrator;
use crate::errors::EngineError;
use crate::http::client::HttpClient;
use crate::models::deployment::{short_hash, Deployment, TriggerSource};
use crate::models::project::Project;
use crate::utils::random_hex;
use crate::webhook::payload::PushEvent;
use crate::webhook::provider::{parse_gitea_url, GitProvider, Provider, ProviderApi, ProviderEndpoints};

/// Acknowledgment sent back to the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookAck {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<u64>,
    pub project_id: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub branch: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub commit: String,
}

impl WebhookAck {
    fn ignored(project_id: u64, message: String) -> Self {
        Self {
            message,
            deployment_id: None,
            project_id,
            branch: String::new(),
            commit: String::new(),
        }
    }

    /// Whether a deployment was started
    pub fn deployed(&self) -> bool {
        self.deployment_id.is_some()
    }
}

pub struct WebhookGateway {
    orchestrator: Arc<Orchestrator>,
    credentials: Arc<dyn CredentialResolver>,
    http: Arc<HttpClient>,
    endpoints: ProviderEndpoints,
    /// Public URL of this service, used in registered hook URLs
    panel_url: String,
}

impl WebhookGateway {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        credentials: Arc<dyn CredentialResolver>,
        http: Arc<HttpClient>,
        endpoints: ProviderEndpoints,
        panel_url: &str,
    ) -> Self {
        Self {
            orchestrator,
            credentials,
            http,
            endpoints,
            panel_url: panel_url.to_string(),
        }
    }

    /// Handle a push notification for `project_id`.
    ///
    /// Pushes to other branches and projects with auto-deploy disabled are
    /// acknowledged without a deployment.
    pub async fn handle_push(
        &self,
        provider: Provider,
        project_id: u64,
        signature: &str,
        body: &[u8],
    ) -> Result<WebhookAck, EngineError> {
        let project = self.orchestrator.store().get_project(project_id).await?;

        if !project.auto_deploy {
            return Ok(WebhookAck::ignored(
                project_id,
                "Auto-deploy is disabled for this project".to_string(),
            ));
        }

        if !provider.verify_signature(body, signature, &project.webhook_secret) {
            warn!("Rejected {} webhook for project {}: bad signature", provider, project_id);
            return Err(EngineError::WebhookSignatureError(format!(
                "{} does not match the project secret",
                provider.signature_header()
            )));
        }

        let push = PushEvent::parse(provider, body)?;
        let target = project.auto_deploy_target();
        if push.branch != target {
            info!(
                "Ignoring push to {} for project {} (auto-deploy branch {})",
                push.branch, project_id, target
            );
            return Ok(WebhookAck::ignored(
                project_id,
                format!(
                    "Push to {} ignored. Auto-deploy configured for {}",
                    push.branch, target
                ),
            ));
        }

        let mut deployment =
            Deployment::pending(project_id, &push.branch, TriggerSource::Webhook(provider));
        deployment.commit_hash = push.commit_hash;
        deployment.commit_message = push.commit_message;
        deployment.commit_author = push.commit_author;

        let deployment = self.orchestrator.trigger(deployment).await?;
        info!(
            "{} push to {} triggered deployment {} for project {}",
            provider, deployment.branch, deployment.id, project_id
        );

        Ok(WebhookAck {
            message: "Deployment triggered".to_string(),
            deployment_id: Some(deployment.id),
            project_id,
            branch: deployment.branch.clone(),
            commit: short_hash(&deployment.commit_hash).to_string(),
        })
    }

    /// Hook URL of a project on this instance
    pub fn hook_url(&self, provider: Provider, project_id: u64) -> Result<String, EngineError> {
        if self.panel_url.is_empty() {
            return Err(EngineError::ConfigError(
                "PANEL_URL is required to register webhooks".to_string(),
            ));
        }
        Ok(provider.hook_url(&self.panel_url, project_id))
    }

    async fn provider_api(&self, project: &Project) -> Result<(Provider, ProviderApi), EngineError> {
        let provider = project.git_provider.ok_or_else(|| {
            EngineError::ValidationError(format!("project {} has no git provider", project.id))
        })?;
        let credentials = self.credentials.resolve(project).await?.ok_or_else(|| {
            EngineError::ValidationError(format!(
                "project {} has no access token to manage webhooks",
                project.id
            ))
        })?;

        let mut api = ProviderApi::new(
            provider,
            Arc::clone(&self.http),
            credentials.token,
            self.endpoints.clone(),
        );
        if provider == Provider::Gitea {
            let (host, _, _) = parse_gitea_url(&project.git_url)?;
            api = api.with_instance_url(&host);
        }
        Ok((provider, api))
    }

    /// Register a push hook for the project, generating its secret if needed
    pub async fn register(&self, project_id: u64) -> Result<String, EngineError> {
        let store = self.orchestrator.store();
        let mut project = store.get_project(project_id).await?;
        let (provider, api) = self.provider_api(&project).await?;
        let url = self.hook_url(provider, project_id)?;

        if project.webhook_secret.is_empty() {
            project.webhook_secret = random_hex(32);
            store.update_project(&project).await?;
        }

        api.create_webhook(&project, &url).await?;
        info!("Registered {} webhook for project {}", provider, project_id);
        Ok(url)
    }

    /// Remove the project's push hook; a missing hook is not an error
    pub async fn unregister(&self, project_id: u64) -> Result<(), EngineError> {
        let project = self.orchestrator.store().get_project(project_id).await?;
        let (provider, api) = self.provider_api(&project).await?;
        let url = self.hook_url(provider, project_id)?;

        api.delete_webhook(&project, &url).await?;
        info!("Removed {} webhook for project {}", provider, project_id);
        Ok(())
    }
}
