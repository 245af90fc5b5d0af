//! Push event payloads

use serde::Deserialize;

use crate::errors::EngineError;
use crate::webhook::provider::Provider;

/// Provider-neutral summary of a push
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushEvent {
    pub branch: String,
    pub commit_hash: String,
    pub commit_message: String,
    pub commit_author: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawAuthor {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawCommit {
    #[serde(default)]
    id: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    author: RawAuthor,
}

/// Union of the fields GitHub, GitLab and Gitea send on push
#[derive(Debug, Deserialize)]
struct RawPush {
    #[serde(rename = "ref", default)]
    git_ref: String,
    #[serde(default)]
    head_commit: Option<RawCommit>,
    #[serde(default)]
    commits: Vec<RawCommit>,
}

impl PushEvent {
    /// Parse a push body sent by `provider`
    pub fn parse(provider: Provider, body: &[u8]) -> Result<Self, EngineError> {
        let raw: RawPush = serde_json::from_slice(body)
            .map_err(|e| EngineError::ValidationError(format!("invalid push payload: {}", e)))?;

        let commit = match provider {
            Provider::GitHub => raw.head_commit,
            Provider::GitLab => raw.commits.into_iter().last(),
            Provider::Gitea => raw.head_commit.or_else(|| raw.commits.into_iter().last()),
        }
        .unwrap_or_default();

        Ok(Self {
            branch: branch_from_ref(&raw.git_ref).to_string(),
            commit_hash: commit.id,
            commit_message: commit.message,
            commit_author: commit.author.name,
        })
    }
}

/// Strip the `refs/heads/` prefix from a git ref
pub fn branch_from_ref(git_ref: &str) -> &str {
    git_ref.strip_prefix("refs/heads/").unwrap_or(git_ref)
}
