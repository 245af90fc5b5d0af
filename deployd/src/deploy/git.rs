//! Repository fetcher
//!
//! Keeps one shallow checkout per project under the projects directory. The first
//! fetch clones; later fetches reuse the checkout, hard-reset it to the fetched
//! head and drop every untracked file, so files generated by an earlier deployment
//! never look committed. Credentials are only ever passed on the command line.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::credentials::GitCredentials;
use crate::errors::EngineError;

/// Directories removed from an existing checkout before it is updated
pub const PURGED_DIRS: &[&str] = &[
    "node_modules",
    ".next",
    "dist",
    "build",
    ".svelte-kit",
    ".nuxt",
    ".output",
];

pub const DEFAULT_DEPTH: u32 = 1;

/// What to fetch
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub git_ref: String,
    pub depth: u32,
    pub credentials: Option<GitCredentials>,
}

/// Metadata of the commit a checkout points at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitInfo {
    pub hash: String,
    pub message: String,
    pub author: String,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Bring the checkout for `key` to `request.git_ref` and return its path
    async fn fetch(&self, key: &str, request: &FetchRequest) -> Result<PathBuf, EngineError>;

    async fn latest_commit(&self, path: &Path) -> Result<CommitInfo, EngineError>;
}

/// Fetcher shelling out to the `git` CLI
#[derive(Debug, Clone)]
pub struct GitFetcher {
    projects_dir: PathBuf,
}

impl GitFetcher {
    pub fn new(projects_dir: impl Into<PathBuf>) -> Self {
        Self {
            projects_dir: projects_dir.into(),
        }
    }

    pub fn checkout_path(&self, key: &str) -> PathBuf {
        self.projects_dir.join(key)
    }
}

#[async_trait]
impl Fetcher for GitFetcher {
    async fn fetch(&self, key: &str, request: &FetchRequest) -> Result<PathBuf, EngineError> {
        let path = self.checkout_path(key);
        let remote = authenticated_url(&request.url, request.credentials.as_ref())?;
        let secrets = request
            .credentials
            .as_ref()
            .map(token_forms)
            .unwrap_or_default();
        let depth = request.depth.max(1).to_string();

        fs::create_dir_all(&self.projects_dir).await?;

        if is_checkout(&path).await {
            info!("Updating checkout {} to {}", path.display(), request.git_ref);
            purge_artifacts(&path).await;

            run_git(Some(&path), &["remote", "set-url", "origin", &request.url], &secrets).await?;
            run_git(
                Some(&path),
                &["fetch", "--depth", &depth, &remote, &request.git_ref],
                &secrets,
            )
            .await?;
            run_git(Some(&path), &["reset", "--hard", "FETCH_HEAD"], &secrets).await?;
            run_git(Some(&path), &["clean", "-ffdx"], &secrets).await?;
        } else {
            if fs::metadata(&path).await.is_ok() {
                warn!("{} is not a git checkout, removing it", path.display());
                fs::remove_dir_all(&path).await?;
            }

            info!("Cloning {} ({}) into {}", request.url, request.git_ref, path.display());
            let target = path.to_string_lossy().to_string();
            run_git(
                None,
                &[
                    "clone",
                    "--depth",
                    &depth,
                    "--branch",
                    &request.git_ref,
                    "--single-branch",
                    &remote,
                    &target,
                ],
                &secrets,
            )
            .await?;
            if !secrets.is_empty() {
                run_git(Some(&path), &["remote", "set-url", "origin", &request.url], &secrets).await?;
            }
        }

        Ok(path)
    }

    async fn latest_commit(&self, path: &Path) -> Result<CommitInfo, EngineError> {
        let output = run_git(Some(path), &["log", "-1", "--format=%H%n%an%n%B"], &[]).await?;
        Ok(parse_commit(&output))
    }
}

fn parse_commit(output: &str) -> CommitInfo {
    let mut lines = output.lines();
    let hash = lines.next().unwrap_or_default().trim().to_string();
    let author = lines.next().unwrap_or_default().trim().to_string();
    let message = lines.collect::<Vec<_>>().join("\n").trim().to_string();
    CommitInfo { hash, message, author }
}

/// Inject credentials into an HTTP(S) remote. Other schemes are returned untouched.
pub fn authenticated_url(
    raw: &str,
    credentials: Option<&GitCredentials>,
) -> Result<String, EngineError> {
    let Some(credentials) = credentials else {
        return Ok(raw.to_string());
    };

    let mut url = url::Url::parse(raw)
        .map_err(|e| EngineError::FetchError(format!("invalid repository URL: {}", e)))?;
    if url.scheme() != "https" && url.scheme() != "http" {
        return Ok(raw.to_string());
    }

    url.set_username(&credentials.username)
        .and_then(|_| url.set_password(Some(credentials.token.expose_secret())))
        .map_err(|_| EngineError::FetchError("repository URL cannot carry credentials".to_string()))?;
    Ok(url.to_string())
}

/// The token as given and as it appears percent-encoded inside a URL
fn token_forms(credentials: &GitCredentials) -> Vec<String> {
    let raw = credentials.token.expose_secret().to_string();
    if raw.is_empty() {
        return Vec::new();
    }

    let mut forms = vec![raw.clone()];
    if let Ok(mut url) = url::Url::parse("https://host/") {
        if url.set_password(Some(&raw)).is_ok() {
            if let Some(encoded) = url.password() {
                if encoded != raw {
                    forms.push(encoded.to_string());
                }
            }
        }
    }
    forms
}

async fn is_checkout(path: &Path) -> bool {
    fs::metadata(path.join(".git"))
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

/// Remove stale artifact directories, fixing permissions if a plain removal fails
async fn purge_artifacts(path: &Path) {
    for name in PURGED_DIRS {
        let dir = path.join(name);
        if fs::metadata(&dir).await.is_err() {
            continue;
        }

        debug!("Removing stale {}", dir.display());
        if fs::remove_dir_all(&dir).await.is_ok() {
            continue;
        }

        let _ = Command::new("chmod")
            .args(["-R", "u+rwX"])
            .arg(&dir)
            .output()
            .await;
        if let Err(e) = fs::remove_dir_all(&dir).await {
            warn!("Failed to remove {}: {}", dir.display(), e);
        }
    }
}

async fn run_git(cwd: Option<&Path>, args: &[&str], secrets: &[String]) -> Result<String, EngineError> {
    let mut command = Command::new("git");
    command.args(args).env("GIT_TERMINAL_PROMPT", "0");
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }

    let output = command
        .output()
        .await
        .map_err(|e| EngineError::FetchError(format!("failed to run git: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(EngineError::FetchError(redact(&stderr, secrets)));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn redact(message: &str, secrets: &[String]) -> String {
    secrets
        .iter()
        .filter(|s| !s.is_empty())
        .fold(message.to_string(), |out, secret| out.replace(secret.as_str(), "***"))
}
