//! Source hosting providers
//!
//! The set of providers is closed: each one is a variant of [`Provider`] and every
//! provider-specific behavior (signature scheme, webhook API, repository listing)
//! is reached through the [`GitProvider`] capability trait.

use std::sync::Arc;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, info};

use crate::errors::EngineError;
use crate::http::client::{ApiAuth, HttpClient};
use crate::models::project::Project;
use crate::utils::constant_time_eq;

type HmacSha256 = Hmac<Sha256>;

/// Supported source hosting providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[serde(rename = "github")]
    GitHub,
    #[serde(rename = "gitlab")]
    GitLab,
    Gitea,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::GitHub => "github",
            Provider::GitLab => "gitlab",
            Provider::Gitea => "gitea",
        }
    }

    /// Request header carrying the push signature
    pub fn signature_header(&self) -> &'static str {
        match self {
            Provider::GitHub => "X-Hub-Signature-256",
            Provider::GitLab => "X-Gitlab-Token",
            Provider::Gitea => "X-Gitea-Signature",
        }
    }

    /// Verify a push payload against the shared secret.
    ///
    /// GitHub sends `sha256=<hex hmac>`, Gitea the bare hex HMAC, and GitLab echoes the
    /// secret itself. An empty secret or signature never verifies.
    pub fn verify_signature(&self, body: &[u8], signature: &str, secret: &str) -> bool {
        if secret.is_empty() || signature.is_empty() {
            return false;
        }

        match self {
            Provider::GitLab => constant_time_eq(signature.as_bytes(), secret.as_bytes()),
            Provider::GitHub | Provider::Gitea => {
                let hex_sig = signature.strip_prefix("sha256=").unwrap_or(signature);
                let sig_bytes = match hex::decode(hex_sig) {
                    Ok(bytes) => bytes,
                    Err(_) => return false,
                };

                let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
                    Ok(mac) => mac,
                    Err(_) => return false,
                };
                mac.update(body);
                mac.verify_slice(&sig_bytes).is_ok()
            }
        }
    }

    /// Webhook endpoint the panel exposes for this provider and project
    pub fn hook_url(&self, panel_url: &str, project_id: u64) -> String {
        format!(
            "{}/api/v1/webhooks/{}/{}",
            panel_url.trim_end_matches('/'),
            self.as_str(),
            project_id
        )
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "github" => Ok(Provider::GitHub),
            "gitlab" => Ok(Provider::GitLab),
            "gitea" => Ok(Provider::Gitea),
            _ => Err(format!("Unsupported provider: {}", s)),
        }
    }
}

/// Sign a payload the way GitHub does
pub fn sign_payload(body: &[u8], secret: &str) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

// ================================ URL PARSING ==================================== //

/// Extract `(owner, repo)` from a GitHub HTTPS or SSH url
pub fn parse_github_url(git_url: &str) -> Result<(String, String), EngineError> {
    let trimmed = git_url.trim_end_matches(".git");
    let path = trimmed
        .strip_prefix("https://github.com/")
        .or_else(|| trimmed.strip_prefix("git@github.com:"))
        .ok_or_else(|| EngineError::ValidationError(format!("invalid GitHub URL format: {}", git_url)))?;

    let mut parts = path.split('/');
    match (parts.next(), parts.next()) {
        (Some(owner), Some(repo)) if !owner.is_empty() && !repo.is_empty() => {
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => Err(EngineError::ValidationError(format!(
            "invalid GitHub URL format: {}",
            git_url
        ))),
    }
}

/// Extract the project path (`group/subgroup/project`) from a GitLab url
pub fn parse_gitlab_url(git_url: &str) -> Result<String, EngineError> {
    let trimmed = git_url.trim_end_matches(".git");
    trimmed
        .strip_prefix("https://gitlab.com/")
        .or_else(|| trimmed.strip_prefix("git@gitlab.com:"))
        .filter(|path| path.contains('/'))
        .map(str::to_string)
        .ok_or_else(|| EngineError::ValidationError(format!("invalid GitLab URL format: {}", git_url)))
}

/// Extract `(host url, owner, repo)` from a Gitea url
pub fn parse_gitea_url(git_url: &str) -> Result<(String, String, String), EngineError> {
    let invalid = || EngineError::ValidationError(format!("invalid Gitea URL format: {}", git_url));
    let trimmed = git_url.trim_end_matches(".git");

    let (scheme, rest) = if let Some(rest) = trimmed.strip_prefix("https://") {
        ("https", rest)
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        ("http", rest)
    } else if let Some(rest) = trimmed.strip_prefix("git@") {
        let (host, path) = rest.split_once(':').ok_or_else(invalid)?;
        let (owner, repo) = path.split_once('/').ok_or_else(invalid)?;
        return Ok((format!("https://{}", host), owner.to_string(), repo.to_string()));
    } else {
        return Err(invalid());
    };

    let mut parts = rest.splitn(3, '/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(host), Some(owner), Some(repo)) if !repo.is_empty() => Ok((
            format!("{}://{}", scheme, host),
            owner.to_string(),
            repo.to_string(),
        )),
        _ => Err(invalid()),
    }
}

// ================================ CAPABILITIES =================================== //

/// A repository visible to a connected provider account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Repository {
    pub full_name: String,
    pub clone_url: String,
    pub default_branch: String,
    pub private: bool,
}

/// Capabilities every hosting provider offers
#[async_trait]
pub trait GitProvider: Send + Sync {
    fn kind(&self) -> Provider;

    fn verify_signature(&self, body: &[u8], signature: &str, secret: &str) -> bool {
        self.kind().verify_signature(body, signature, secret)
    }

    /// Register the panel's push webhook on the project's repository
    async fn create_webhook(&self, project: &Project, hook_url: &str) -> Result<(), EngineError>;

    /// Remove the panel's push webhook; a missing hook is not an error
    async fn delete_webhook(&self, project: &Project, hook_url: &str) -> Result<(), EngineError>;

    async fn list_repositories(&self) -> Result<Vec<Repository>, EngineError>;
}

/// API endpoints of the providers
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub github_api: String,
    pub gitlab_api: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            github_api: "https://api.github.com".to_string(),
            gitlab_api: "https://gitlab.com/api/v4".to_string(),
        }
    }
}

/// REST client for one provider account
pub struct ProviderApi {
    provider: Provider,
    http: Arc<HttpClient>,
    token: SecretString,
    endpoints: ProviderEndpoints,
    /// Gitea instance url, needed for repository listing
    instance_url: Option<String>,
}

impl ProviderApi {
    pub fn new(
        provider: Provider,
        http: Arc<HttpClient>,
        token: SecretString,
        endpoints: ProviderEndpoints,
    ) -> Self {
        Self {
            provider,
            http,
            token,
            endpoints,
            instance_url: None,
        }
    }

    /// Set the Gitea instance url
    pub fn with_instance_url(mut self, url: &str) -> Self {
        self.instance_url = Some(url.trim_end_matches('/').to_string());
        self
    }

    fn auth(&self) -> ApiAuth {
        match self.provider {
            Provider::GitHub => ApiAuth::Bearer(self.token.clone()),
            Provider::GitLab => ApiAuth::PrivateToken(self.token.clone()),
            Provider::Gitea => ApiAuth::Token(self.token.clone()),
        }
    }

    /// Collection url of the repository's hooks
    fn hooks_url(&self, project: &Project) -> Result<String, EngineError> {
        match self.provider {
            Provider::GitHub => {
                let (owner, repo) = parse_github_url(&project.git_url)?;
                Ok(format!("{}/repos/{}/{}/hooks", self.endpoints.github_api, owner, repo))
            }
            Provider::GitLab => {
                let path = parse_gitlab_url(&project.git_url)?;
                Ok(format!(
                    "{}/projects/{}/hooks",
                    self.endpoints.gitlab_api,
                    path.replace('/', "%2F")
                ))
            }
            Provider::Gitea => {
                let (host, owner, repo) = parse_gitea_url(&project.git_url)?;
                Ok(format!("{}/api/v1/repos/{}/{}/hooks", host, owner, repo))
            }
        }
    }

    fn hook_payload(&self, project: &Project, hook_url: &str) -> serde_json::Value {
        match self.provider {
            Provider::GitHub => serde_json::json!({
                "name": "web",
                "active": true,
                "events": ["push"],
                "config": {
                    "url": hook_url,
                    "content_type": "json",
                    "secret": project.webhook_secret,
                    "insecure_ssl": "0",
                },
            }),
            Provider::GitLab => serde_json::json!({
                "url": hook_url,
                "token": project.webhook_secret,
                "push_events": true,
                "push_events_branch_filter": project.auto_deploy_branch,
                "enable_ssl_verification": true,
            }),
            Provider::Gitea => serde_json::json!({
                "type": "gitea",
                "active": true,
                "events": ["push"],
                "config": {
                    "url": hook_url,
                    "content_type": "json",
                    "secret": project.webhook_secret,
                },
            }),
        }
    }
}

/// Find the id of the hook pointing at `hook_url` in a provider's hook listing
fn find_hook_id(hooks: &[serde_json::Value], hook_url: &str) -> Option<u64> {
    hooks
        .iter()
        .find(|hook| {
            let url = hook
                .get("config")
                .and_then(|c| c.get("url"))
                .or_else(|| hook.get("url"))
                .and_then(|u| u.as_str());
            url == Some(hook_url)
        })
        .and_then(|hook| hook.get("id"))
        .and_then(|id| id.as_u64())
}

#[async_trait]
impl GitProvider for ProviderApi {
    fn kind(&self) -> Provider {
        self.provider
    }

    async fn create_webhook(&self, project: &Project, hook_url: &str) -> Result<(), EngineError> {
        let url = self.hooks_url(project)?;
        info!("Registering {} webhook for project {}", self.provider, project.id);
        self.http
            .post(&url, &self.auth(), &self.hook_payload(project, hook_url))
            .await
    }

    async fn delete_webhook(&self, project: &Project, hook_url: &str) -> Result<(), EngineError> {
        let url = self.hooks_url(project)?;
        let hooks: Vec<serde_json::Value> = self.http.get(&url, &self.auth()).await?;

        let Some(hook_id) = find_hook_id(&hooks, hook_url) else {
            debug!("No {} webhook registered at {}", self.provider, hook_url);
            return Ok(());
        };

        info!("Deleting {} webhook {} for project {}", self.provider, hook_id, project.id);
        self.http
            .delete(&format!("{}/{}", url, hook_id), &self.auth())
            .await
    }

    async fn list_repositories(&self) -> Result<Vec<Repository>, EngineError> {
        let auth = self.auth();
        let repos = match self.provider {
            Provider::GitHub => {
                let url = format!(
                    "{}/user/repos?per_page=100&sort=updated",
                    self.endpoints.github_api
                );
                let raw: Vec<GitHubRepo> = self.http.get(&url, &auth).await?;
                raw.into_iter().map(Repository::from).collect()
            }
            Provider::GitLab => {
                let url = format!(
                    "{}/projects?membership=true&per_page=100&order_by=last_activity_at",
                    self.endpoints.gitlab_api
                );
                let raw: Vec<GitLabRepo> = self.http.get(&url, &auth).await?;
                raw.into_iter().map(Repository::from).collect()
            }
            Provider::Gitea => {
                let base = self.instance_url.as_deref().ok_or_else(|| {
                    EngineError::ConfigError("Gitea instance url is not configured".to_string())
                })?;
                let url = format!("{}/api/v1/user/repos", base);
                let raw: Vec<GitHubRepo> = self.http.get(&url, &auth).await?;
                raw.into_iter().map(Repository::from).collect()
            }
        };
        Ok(repos)
    }
}

/// Repository shape shared by GitHub and Gitea
#[derive(Debug, Deserialize)]
struct GitHubRepo {
    full_name: String,
    clone_url: String,
    #[serde(default)]
    default_branch: Option<String>,
    #[serde(default)]
    private: bool,
}

impl From<GitHubRepo> for Repository {
    fn from(repo: GitHubRepo) -> Self {
        Self {
            full_name: repo.full_name,
            clone_url: repo.clone_url,
            default_branch: repo.default_branch.unwrap_or_else(|| "main".to_string()),
            private: repo.private,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitLabRepo {
    path_with_namespace: String,
    http_url_to_repo: String,
    #[serde(default)]
    default_branch: Option<String>,
    #[serde(default)]
    visibility: Option<String>,
}

impl From<GitLabRepo> for Repository {
    fn from(repo: GitLabRepo) -> Self {
        Self {
            full_name: repo.path_with_namespace,
            clone_url: repo.http_url_to_repo,
            default_branch: repo.default_branch.unwrap_or_else(|| "main".to_string()),
            private: repo.visibility.as_deref() != Some("public"),
        }
    }
}
