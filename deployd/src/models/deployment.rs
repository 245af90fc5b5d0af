//! Deployment models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::webhook::provider::Provider;

/// Lifecycle status of a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    /// Created, not yet picked up
    Pending,

    /// Fetching, detecting, building
    Building,

    /// Starting containers and reconfiguring the proxy
    Deploying,

    Success,

    Failed,

    /// Stopped by the user while pending or building
    Cancelled,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Building => "building",
            DeploymentStatus::Deploying => "deploying",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Success | DeploymentStatus::Failed | DeploymentStatus::Cancelled
        )
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What started a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum TriggerSource {
    Manual,
    Webhook(Provider),
    Api,
}

impl From<TriggerSource> for String {
    fn from(source: TriggerSource) -> Self {
        match source {
            TriggerSource::Manual => "manual".to_string(),
            TriggerSource::Webhook(provider) => format!("webhook-{}", provider.as_str()),
            TriggerSource::Api => "api".to_string(),
        }
    }
}

impl TryFrom<String> for TriggerSource {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "manual" => Ok(TriggerSource::Manual),
            "api" => Ok(TriggerSource::Api),
            other => other
                .strip_prefix("webhook-")
                .and_then(|p| p.parse::<Provider>().ok())
                .map(TriggerSource::Webhook)
                .ok_or_else(|| format!("unknown trigger source: {}", other)),
        }
    }
}

/// One build-and-release attempt for a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: u64,

    pub project_id: u64,

    #[serde(default)]
    pub commit_hash: String,

    #[serde(default)]
    pub commit_message: String,

    #[serde(default)]
    pub commit_author: String,

    pub branch: String,

    pub status: DeploymentStatus,

    pub triggered_by: TriggerSource,

    /// User that triggered the deployment, if any
    #[serde(default)]
    pub triggered_by_user: Option<u64>,

    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    /// Wall-clock duration in seconds
    #[serde(default)]
    pub duration_secs: Option<u64>,

    #[serde(default)]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Deployment {
    /// A pending deployment; the store assigns the id
    pub fn pending(project_id: u64, branch: &str, triggered_by: TriggerSource) -> Self {
        Self {
            id: 0,
            project_id,
            commit_hash: String::new(),
            commit_message: String::new(),
            commit_author: String::new(),
            branch: branch.to_string(),
            status: DeploymentStatus::Pending,
            triggered_by,
            triggered_by_user: None,
            started_at: None,
            completed_at: None,
            duration_secs: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    /// First 7 characters of the commit hash
    pub fn short_commit(&self) -> &str {
        short_hash(&self.commit_hash)
    }
}

/// Shorten a commit hash for display
pub fn short_hash(hash: &str) -> &str {
    match hash.char_indices().nth(7) {
        Some((idx, _)) => &hash[..idx],
        None => hash,
    }
}
