//! Caddy reverse proxy configuration
//!
//! One site file per project in the configured directory, named after the project's
//! slug. The file routes every active domain to the frontend port and, when present,
//! sends backend routes to the backend port.

use std::fmt::Write as _;
use std::path::PathBuf;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::EngineError;
use crate::filesys::dir::Dir;
use crate::models::domain::Domain;
use crate::models::project::{Framework, Project};

#[derive(Debug, Clone)]
pub struct CaddyOptions {
    /// Directory Caddy imports site files from
    pub config_dir: PathBuf,
    /// Command applying a new configuration, split on whitespace
    pub reload_cmd: String,
    /// Directory of per-project access logs
    pub log_dir: PathBuf,
}

impl Default for CaddyOptions {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("/etc/caddy/sites"),
            reload_cmd: "systemctl reload caddy".to_string(),
            log_dir: PathBuf::from("/var/log/caddy"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaddyProxy {
    options: CaddyOptions,
}

impl CaddyProxy {
    pub fn new(options: CaddyOptions) -> Self {
        Self { options }
    }

    pub fn config_path(&self, project: &Project) -> PathBuf {
        self.options.config_dir.join(format!("{}.caddy", project.slug()))
    }

    /// Render the site block of a project
    pub fn render(&self, project: &Project, domains: &[Domain]) -> Result<String, EngineError> {
        let hosts: Vec<&str> = domains
            .iter()
            .filter(|d| d.is_active)
            .map(|d| d.domain.as_str())
            .collect();
        if hosts.is_empty() {
            return Err(EngineError::ProxyConfigError(format!(
                "no active domains configured for project {}",
                project.id
            )));
        }

        let slug = project.slug();
        let frontend = project.frontend_port;
        let backend = project.backend_port;
        let mut out = String::new();

        let _ = writeln!(out, "# {}", slug);
        let _ = writeln!(out, "{} {{", hosts.join(", "));
        out.push_str("    encode gzip zstd\n\n");

        if project.framework == Some(Framework::SvelteKit) {
            for route in ["/api/user/*", "/api/admin/*"] {
                let _ = writeln!(out, "    handle {} {{", route);
                let _ = writeln!(out, "        reverse_proxy 127.0.0.1:{}", frontend);
                out.push_str("    }\n\n");
            }
        }

        if project.backend_service.is_some() {
            for route in ["/api/*", "/_/*"] {
                let _ = writeln!(out, "    handle {} {{", route);
                let _ = writeln!(out, "        reverse_proxy 127.0.0.1:{}", backend);
                out.push_str("    }\n\n");
            }
        }

        let _ = writeln!(out, "    reverse_proxy 127.0.0.1:{}\n", frontend);

        out.push_str("    header {\n");
        out.push_str("        Strict-Transport-Security \"max-age=31536000; includeSubDomains; preload\"\n");
        out.push_str("        X-Frame-Options \"DENY\"\n");
        out.push_str("        X-Content-Type-Options \"nosniff\"\n");
        out.push_str("        Referrer-Policy \"strict-origin-when-cross-origin\"\n");
        out.push_str("    }\n\n");

        out.push_str("    log {\n");
        let _ = writeln!(
            out,
            "        output file {}/{}.log {{",
            self.options.log_dir.display(),
            slug
        );
        out.push_str("            roll_size 100MB\n");
        out.push_str("            roll_keep 3\n");
        out.push_str("        }\n");
        out.push_str("        format json\n");
        out.push_str("    }\n");
        out.push_str("}\n");

        Ok(out)
    }

    /// Write the project's site file and return its path
    pub async fn write_config(&self, project: &Project, domains: &[Domain]) -> Result<PathBuf, EngineError> {
        let config = self.render(project, domains)?;

        Dir::new(&self.options.config_dir)
            .create()
            .await
            .map_err(|e| EngineError::ProxyConfigError(format!("failed to create config directory: {}", e)))?;
        if let Err(e) = Dir::new(&self.options.log_dir).create().await {
            warn!("Failed to create Caddy log directory: {}", e);
        }

        let path = self.config_path(project);
        Dir::new(&self.options.config_dir)
            .file(&format!("{}.caddy", project.slug()))
            .write_string(&config)
            .await
            .map_err(|e| EngineError::ProxyConfigError(format!("failed to write config: {}", e)))?;

        info!("Wrote proxy config {}", path.display());
        Ok(path)
    }

    /// Remove the project's site file if present
    pub async fn remove_config(&self, project: &Project) -> Result<(), EngineError> {
        let file = Dir::new(&self.options.config_dir).file(&format!("{}.caddy", project.slug()));
        file.delete()
            .await
            .map_err(|e| EngineError::ProxyConfigError(format!("failed to remove config: {}", e)))
    }

    /// Apply configuration changes
    pub async fn reload(&self) -> Result<(), EngineError> {
        let mut parts = self.options.reload_cmd.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| EngineError::ProxyConfigError("invalid reload command".to_string()))?;

        debug!("Reloading proxy: {}", self.options.reload_cmd);
        let output = Command::new(program)
            .args(parts)
            .output()
            .await
            .map_err(|e| EngineError::ProxyConfigError(format!("failed to run reload command: {}", e)))?;

        if !output.status.success() {
            let combined = format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            return Err(EngineError::ProxyConfigError(format!(
                "failed to reload Caddy: {} (output: {})",
                output.status,
                combined.trim()
            )));
        }
        Ok(())
    }
}
