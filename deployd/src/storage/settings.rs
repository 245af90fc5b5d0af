//! Settings file management

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::logs::LogLevel;

/// Engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Mirror logs into daily files under the base dir
    #[serde(default)]
    pub log_to_file: bool,

    /// HTTP API listener
    #[serde(default)]
    pub server: ServerSettings,

    /// Checkouts of every project live here
    #[serde(default = "default_projects_dir")]
    pub projects_dir: PathBuf,

    /// JSON snapshot of the in-memory store; relative paths resolve against the base dir
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,

    /// Reverse proxy configuration
    #[serde(default)]
    pub caddy: CaddySettings,

    /// Base domain generated project subdomains live under
    #[serde(default)]
    pub panel_domain: String,

    /// Public URL of this service, used for webhook registration
    #[serde(default)]
    pub panel_url: String,

    /// Upper bound of a single image build
    #[serde(default = "default_build_timeout")]
    pub build_timeout_secs: u64,

    #[serde(default = "default_max_concurrent_builds")]
    pub max_concurrent_builds: usize,

    /// Probe HTTPS after a project's first deployment
    #[serde(default = "default_true")]
    pub verify_certificates: bool,

    #[serde(default = "default_certificate_wait")]
    pub certificate_wait_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_projects_dir() -> PathBuf {
    PathBuf::from("/var/lib/deployd/projects")
}

fn default_data_file() -> PathBuf {
    PathBuf::from("data.json")
}

fn default_build_timeout() -> u64 {
    600
}

fn default_max_concurrent_builds() -> usize {
    3
}

fn default_certificate_wait() -> u64 {
    20
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_to_file: false,
            server: ServerSettings::default(),
            projects_dir: default_projects_dir(),
            data_file: default_data_file(),
            caddy: CaddySettings::default(),
            panel_domain: String::new(),
            panel_url: String::new(),
            build_timeout_secs: default_build_timeout(),
            max_concurrent_builds: default_max_concurrent_builds(),
            verify_certificates: true,
            certificate_wait_secs: default_certificate_wait(),
        }
    }
}

impl Settings {
    /// Apply environment overrides through `lookup`.
    ///
    /// Unparsable numeric values are ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = parse_var(&lookup, "PORT") {
            self.server.port = port;
        }
        if let Some(dir) = lookup("PROJECTS_DIR") {
            self.projects_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("CADDY_CONFIG_PATH") {
            self.caddy.config_dir = PathBuf::from(dir);
        }
        if let Some(cmd) = lookup("CADDY_RELOAD_CMD") {
            self.caddy.reload_cmd = cmd;
        }
        if let Some(domain) = lookup("PANEL_DOMAIN") {
            self.panel_domain = domain;
        }
        if let Some(url) = lookup("PANEL_URL") {
            self.panel_url = url;
        }
        if let Some(secs) = parse_var(&lookup, "BUILD_TIMEOUT") {
            self.build_timeout_secs = secs;
        }
        if let Some(max) = parse_var(&lookup, "MAX_CONCURRENT_BUILDS") {
            self.max_concurrent_builds = max;
        }
        if let Some(level) = parse_var(&lookup, "LOG_LEVEL") {
            self.log_level = level;
        }
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid value for {}: {:?}", key, raw);
            None
        }
    }
}

/// HTTP API listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Caddy settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaddySettings {
    /// Directory of per-project site files
    #[serde(default = "default_caddy_config_dir")]
    pub config_dir: PathBuf,

    #[serde(default = "default_caddy_reload_cmd")]
    pub reload_cmd: String,

    #[serde(default = "default_caddy_log_dir")]
    pub log_dir: PathBuf,
}

fn default_caddy_config_dir() -> PathBuf {
    PathBuf::from("/etc/caddy/sites")
}

fn default_caddy_reload_cmd() -> String {
    "systemctl reload caddy".to_string()
}

fn default_caddy_log_dir() -> PathBuf {
    PathBuf::from("/var/log/caddy")
}

impl Default for CaddySettings {
    fn default() -> Self {
        Self {
            config_dir: default_caddy_config_dir(),
            reload_cmd: default_caddy_reload_cmd(),
            log_dir: default_caddy_log_dir(),
        }
    }
}
