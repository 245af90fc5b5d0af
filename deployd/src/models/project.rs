//! Project models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::domain::Domain;
use crate::utils::sanitize_name;
use crate::webhook::provider::Provider;

/// Web framework a project is built with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    #[serde(rename = "sveltekit")]
    SvelteKit,
    #[serde(rename = "nextjs")]
    NextJs,
    Nuxt,
    React,
    Vue,
    Angular,
    Generic,
}

impl Framework {
    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::SvelteKit => "sveltekit",
            Framework::NextJs => "nextjs",
            Framework::Nuxt => "nuxt",
            Framework::React => "react",
            Framework::Vue => "vue",
            Framework::Angular => "angular",
            Framework::Generic => "generic",
        }
    }
}

impl std::fmt::Display for Framework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend-as-a-service a project depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendService {
    PocketBase,
    Supabase,
    Firebase,
    Appwrite,
}

impl BackendService {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendService::PocketBase => "pocketbase",
            BackendService::Supabase => "supabase",
            BackendService::Firebase => "firebase",
            BackendService::Appwrite => "appwrite",
        }
    }

    /// Whether the service ships as a second container next to the frontend
    pub fn is_bundled(&self) -> bool {
        matches!(self, BackendService::PocketBase)
    }
}

impl std::fmt::Display for BackendService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the bundled backend service has completed its first deployment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendState {
    #[default]
    Uninitialized,
    Initialized,
}

/// Project status shown to users
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Inactive,
    Active,
}

/// A deployable unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,

    pub name: String,

    /// Owning user
    #[serde(default)]
    pub user_id: u64,

    pub git_url: String,

    #[serde(default = "default_branch")]
    pub git_branch: String,

    #[serde(default)]
    pub git_username: String,

    /// Access token, or an `oauth:<id>` placeholder resolved at deploy time
    #[serde(default)]
    pub git_token: String,

    /// Hosting provider of `git_url`, used for webhooks
    #[serde(default)]
    pub git_provider: Option<Provider>,

    /// Monorepo subdirectory holding the frontend
    #[serde(default)]
    pub root_directory: String,

    #[serde(default)]
    pub framework: Option<Framework>,

    #[serde(default)]
    pub backend_service: Option<BackendService>,

    #[serde(default)]
    pub build_command: String,

    #[serde(default)]
    pub install_command: String,

    #[serde(default)]
    pub start_command: String,

    #[serde(default)]
    pub output_dir: String,

    #[serde(default)]
    pub node_version: String,

    /// Host port of the frontend container, 0 when unassigned
    #[serde(default)]
    pub frontend_port: u16,

    /// Host port of the backend service, 0 when unassigned
    #[serde(default)]
    pub backend_port: u16,

    #[serde(default)]
    pub auto_deploy: bool,

    #[serde(default)]
    pub auto_deploy_branch: String,

    #[serde(default)]
    pub webhook_secret: String,

    #[serde(default)]
    pub status: ProjectStatus,

    #[serde(default)]
    pub last_deployed_at: Option<DateTime<Utc>>,

    /// Version of the bundled backend service last deployed
    #[serde(default)]
    pub backend_version: Option<String>,

    #[serde(default)]
    pub backend_state: BackendState,

    /// Data encryption key for the bundled backend service, generated once
    #[serde(default)]
    pub backend_encryption_key: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_branch() -> String {
    "main".to_string()
}

impl Project {
    /// Create a project with defaults for everything but the source location
    pub fn new(id: u64, name: &str, git_url: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            user_id: 0,
            git_url: git_url.to_string(),
            git_branch: default_branch(),
            git_username: String::new(),
            git_token: String::new(),
            git_provider: None,
            root_directory: String::new(),
            framework: None,
            backend_service: None,
            build_command: String::new(),
            install_command: String::new(),
            start_command: String::new(),
            output_dir: String::new(),
            node_version: String::new(),
            frontend_port: 0,
            backend_port: 0,
            auto_deploy: false,
            auto_deploy_branch: String::new(),
            webhook_secret: String::new(),
            status: ProjectStatus::Inactive,
            last_deployed_at: None,
            backend_version: None,
            backend_state: BackendState::Uninitialized,
            backend_encryption_key: None,
            created_at: Utc::now(),
        }
    }

    /// Name slug used for proxy files and container names
    pub fn slug(&self) -> String {
        sanitize_name(&self.name)
    }

    /// Branch pushes must target to trigger an automatic deployment
    pub fn auto_deploy_target(&self) -> &str {
        if self.auto_deploy_branch.is_empty() {
            &self.git_branch
        } else {
            &self.auto_deploy_branch
        }
    }

    /// Whether a bundled backend service is deployed next to the frontend
    pub fn has_bundled_backend(&self) -> bool {
        self.backend_service.map(|b| b.is_bundled()).unwrap_or(false)
    }

    /// Container name of a single-service deployment
    pub fn container_name(&self) -> String {
        format!("vps-panel-{}-{}", self.slug(), self.id)
    }

    /// Compose project name of a multi-service deployment
    pub fn compose_project_name(&self) -> String {
        format!("vps-panel-project-{}", self.id)
    }

    /// Container name of one compose service
    pub fn service_container_name(&self, service: &str) -> String {
        format!("vps-panel-{}-{}-{}", self.slug(), service, self.id)
    }

    /// Image tag of a single-service deployment
    pub fn image_tag(&self) -> String {
        format!("vps-panel/project-{}:latest", self.id)
    }

    /// Human readable port description used in conflict errors
    pub fn describe_ports(&self) -> String {
        match (self.frontend_port, self.backend_port) {
            (0, 0) => "the requested port".to_string(),
            (f, 0) => format!("port {}", f),
            (0, b) => format!("port {}", b),
            (f, b) => format!("frontend port {} or backend port {}", f, b),
        }
    }
}

/// First active domain of a project, if any
pub fn primary_domain(domains: &[Domain]) -> Option<&Domain> {
    domains.iter().find(|d| d.is_active)
}
