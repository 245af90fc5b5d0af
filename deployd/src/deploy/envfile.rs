//! `.env` materialization
//!
//! A `.env` this module wrote on an earlier deployment is recognized by its
//! headers: a generated file is rebuilt from scratch and a merged one has its old
//! system block replaced, so repeated deployments never stack stale values.

use std::fmt::Write as _;
use std::path::Path;

use crate::errors::EngineError;
use crate::filesys::dir::Dir;
use crate::models::domain::Domain;
use crate::models::environment::Environment;

/// Number of variables the engine injects on its own
pub const SYSTEM_VAR_COUNT: usize = 3;

const GENERATED_HEADER: &str = "# Environment variables generated at build time\n";
const SYSTEM_HEADER: &str = "# System variables (auto-injected)\n";
const REPOSITORY_HEADER: &str = "\n# Variables from repository .env file\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvFileOutcome {
    /// A committed `.env` was kept, system variables prepended
    Merged,
    /// A fresh `.env` was written with this many user variables
    Generated { user_vars: usize },
}

fn write_system_vars(out: &mut String, domain: Option<&Domain>) {
    let (url, host) = domain
        .map(|d| (d.url(), d.domain.clone()))
        .unwrap_or_default();
    let _ = writeln!(out, "DEPLOYMENT_URL={}", url);
    let _ = writeln!(out, "DEPLOYMENT_DOMAIN={}", host);
    let _ = writeln!(out, "PUBLIC_DEPLOYMENT_URL={}", url);
}

/// Write `<dir>/.env` from the project's domain and variables
pub async fn write_env_file(
    dir: &Path,
    domain: Option<&Domain>,
    vars: &[Environment],
) -> Result<EnvFileOutcome, EngineError> {
    let file = Dir::new(dir).file(".env");
    let mut out = String::new();

    let existing = if file.exists().await {
        Some(file.read_string().await?)
    } else {
        None
    };

    if let Some(committed) = existing.as_deref().and_then(committed_content) {
        out.push_str(SYSTEM_HEADER);
        write_system_vars(&mut out, domain);
        out.push_str(REPOSITORY_HEADER);
        out.push_str(committed);
        file.write_string(&out).await?;
        return Ok(EnvFileOutcome::Merged);
    }

    out.push_str(GENERATED_HEADER);
    out.push('\n');
    out.push_str(SYSTEM_HEADER);
    write_system_vars(&mut out, domain);
    out.push('\n');

    if vars.is_empty() {
        out.push_str("# No user-configured environment variables\n");
    } else {
        out.push_str("# User-configured variables\n");
        for var in vars {
            let _ = writeln!(out, "{}={}", var.key, var.value);
        }
    }

    file.write_string(&out).await?;
    Ok(EnvFileOutcome::Generated {
        user_vars: vars.len(),
    })
}

/// Repository part of an existing `.env`, `None` for a fully generated file
fn committed_content(existing: &str) -> Option<&str> {
    if existing.starts_with(GENERATED_HEADER) {
        return None;
    }
    if existing.starts_with(SYSTEM_HEADER) {
        if let Some(at) = existing.find(REPOSITORY_HEADER) {
            return Some(&existing[at + REPOSITORY_HEADER.len()..]);
        }
    }
    Some(existing)
}
