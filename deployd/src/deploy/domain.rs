//! Generated project subdomains

use crate::errors::EngineError;
use crate::models::project::Project;

/// Strip a scheme and port from a configured base domain
pub fn normalize_base_domain(base: &str) -> String {
    let host = base
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let host = host.split('/').next().unwrap_or_default();
    host.split(':').next().unwrap_or_default().to_string()
}

/// `<sanitized-name>-<id>.<base>` for a project without a domain of its own
pub fn generated_domain(project: &Project, base: &str) -> Result<String, EngineError> {
    let base = normalize_base_domain(base);
    if base.is_empty() {
        return Err(EngineError::ConfigError(
            "no panel domain configured. Set PANEL_DOMAIN or add a custom domain to the project"
                .to_string(),
        ));
    }
    Ok(format!("{}-{}.{}", project.slug(), project.id, base))
}
