//! Git credential resolution

use async_trait::async_trait;
use secrecy::SecretString;

use crate::errors::EngineError;
use crate::models::project::Project;

/// Prefix marking a token that refers to a stored OAuth connection
pub const OAUTH_PREFIX: &str = "oauth:";

/// Username and token used to authenticate git operations
#[derive(Debug, Clone)]
pub struct GitCredentials {
    pub username: String,
    pub token: SecretString,
}

/// Turns a project's stored credentials into usable ones.
///
/// `Ok(None)` means the repository is fetched anonymously.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, project: &Project) -> Result<Option<GitCredentials>, EngineError>;
}

/// Uses the stored username/token as-is; OAuth placeholders cannot be resolved.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentials;

#[async_trait]
impl CredentialResolver for StaticCredentials {
    async fn resolve(&self, project: &Project) -> Result<Option<GitCredentials>, EngineError> {
        if project.git_token.is_empty() {
            return Ok(None);
        }
        if project.git_token.starts_with(OAUTH_PREFIX) {
            return Err(EngineError::AuthError(format!(
                "no OAuth connection available for project {}",
                project.id
            )));
        }

        let username = if project.git_username.is_empty() {
            "oauth2".to_string()
        } else {
            project.git_username.clone()
        };
        Ok(Some(GitCredentials {
            username,
            token: SecretString::from(project.git_token.clone()),
        }))
    }
}
