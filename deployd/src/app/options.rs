//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use crate::deploy::backend::DEFAULT_RELEASE_FEED;
use crate::deploy::orchestrator::OrchestratorOptions;
use crate::deploy::proxy::CaddyOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::webhook::provider::ProviderEndpoints;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub lifecycle: LifecycleOptions,

    pub storage: StorageOptions,

    pub server: ServerOptions,

    /// Where project checkouts live
    pub projects_dir: PathBuf,

    pub caddy: CaddyOptions,

    pub orchestrator: OrchestratorOptions,

    /// Public URL of this service, used for webhook registration
    pub panel_url: String,

    pub provider_endpoints: ProviderEndpoints,

    /// Release feed of the bundled backend service
    pub release_feed_url: String,

    /// Timeout of outbound HTTP calls
    pub http_timeout: Duration,

    /// Container CLI binary
    pub docker_binary: String,
}

impl Default for AppOptions {
    fn default() -> Self {
        let storage = StorageOptions::default();
        Self {
            lifecycle: LifecycleOptions::default(),
            projects_dir: storage.layout.projects_dir().path().to_path_buf(),
            storage,
            server: ServerOptions::default(),
            caddy: CaddyOptions::default(),
            orchestrator: OrchestratorOptions::default(),
            panel_url: String::new(),
            provider_endpoints: ProviderEndpoints::default(),
            release_feed_url: DEFAULT_RELEASE_FEED.to_string(),
            http_timeout: Duration::from_secs(10),
            docker_binary: "docker".to_string(),
        }
    }
}

impl AppOptions {
    /// Options for a settings file rooted at `layout`
    pub fn from_settings(layout: StorageLayout, settings: &Settings) -> Self {
        let data_file = layout.data_file(&settings.data_file).path().to_path_buf();
        let data_dir = layout.volumes_dir().path().to_path_buf();
        Self {
            storage: StorageOptions { layout, data_file },
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            projects_dir: settings.projects_dir.clone(),
            caddy: CaddyOptions {
                config_dir: settings.caddy.config_dir.clone(),
                reload_cmd: settings.caddy.reload_cmd.clone(),
                log_dir: settings.caddy.log_dir.clone(),
            },
            orchestrator: OrchestratorOptions {
                base_domain: settings.panel_domain.clone(),
                data_dir,
                build_timeout: Duration::from_secs(settings.build_timeout_secs),
                max_concurrent_builds: settings.max_concurrent_builds,
                verify_certificates: settings.verify_certificates,
                certificate_wait: Duration::from_secs(settings.certificate_wait_secs),
                ..Default::default()
            },
            panel_url: settings.panel_url.clone(),
            ..Default::default()
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Storage configuration options
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// Storage layout paths
    pub layout: StorageLayout,

    /// JSON snapshot of the store
    pub data_file: PathBuf,
}

impl Default for StorageOptions {
    fn default() -> Self {
        let layout = StorageLayout::default();
        let data_file = layout.data_file(std::path::Path::new("")).path().to_path_buf();
        Self { layout, data_file }
    }
}

/// HTTP API server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}
