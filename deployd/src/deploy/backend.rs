//! Bundled PocketBase backend
//!
//! Files the compose stack needs next to the frontend: the backend's own build
//! recipe, its migration and hook directories and the encryption key in the
//! repository `.env`. The live database is kept in a per-project data directory
//! outside the checkout, so fetching a new revision never touches it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::errors::EngineError;
use crate::filesys::dir::Dir;
use crate::http::client::{ApiAuth, HttpClient};

pub const FALLBACK_VERSION: &str = "0.30.0";
pub const DEFAULT_RELEASE_FEED: &str =
    "https://api.github.com/repos/pocketbase/pocketbase/releases/latest";
pub const ENCRYPTION_KEY_VAR: &str = "PB_ENCRYPTION_KEY";

const GITIGNORE: &str = "
# PocketBase data directory
pb_data/

# SQLite side files
*.db-shm
*.db-wal
";

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
}

/// Latest release lookup against the upstream feed
pub struct ReleaseFeed {
    http: Arc<HttpClient>,
    url: String,
}

impl ReleaseFeed {
    pub fn new(http: Arc<HttpClient>, url: &str) -> Self {
        Self {
            http,
            url: url.to_string(),
        }
    }

    /// Latest released version with any leading `v` removed
    pub async fn latest_version(&self) -> Result<String, EngineError> {
        let release: Release = self.http.get(&self.url, &ApiAuth::None).await?;
        let version = release.tag_name.trim_start_matches('v').to_string();
        if version.is_empty() {
            return Err(EngineError::UpstreamError(
                "empty version received from release feed".to_string(),
            ));
        }
        Ok(version)
    }

    /// Latest version, or the known-good fallback when the feed is unreachable
    pub async fn version_or_fallback(&self) -> String {
        match self.latest_version().await {
            Ok(version) => version,
            Err(e) => {
                warn!(
                    "Failed to fetch latest PocketBase version: {}, falling back to {}",
                    e, FALLBACK_VERSION
                );
                FALLBACK_VERSION.to_string()
            }
        }
    }
}

/// Recipe building PocketBase from the official release archive
pub fn pocketbase_recipe(version: &str) -> String {
    format!(
        r#"FROM alpine:3.19

ARG PB_VERSION={version}

LABEL pocketbase.version="${{PB_VERSION}}"

WORKDIR /pb

RUN apk add --no-cache unzip wget ca-certificates tzdata

RUN wget -q https://github.com/pocketbase/pocketbase/releases/download/v${{PB_VERSION}}/pocketbase_${{PB_VERSION}}_linux_amd64.zip -O pocketbase.zip && \
    unzip pocketbase.zip && \
    rm pocketbase.zip && \
    chmod +x pocketbase && \
    ./pocketbase --version

RUN mkdir -p /pb/pb_data /pb/pb_migrations /pb/pb_hooks && chmod -R 755 /pb

HEALTHCHECK --interval=15s --timeout=5s --start-period=30s --retries=3 \
    CMD wget --no-verbose --tries=1 --spider http://localhost:8090/api/health || exit 1

EXPOSE 8090

CMD ["/pb/pocketbase", "serve", "--http=0.0.0.0:8090", "--dir=/pb/pb_data", "--migrationsDir=/pb/pb_migrations", "--hooksDir=/pb/pb_hooks"]
"#
    )
}

/// What [`ensure_structure`] found and did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StructureReport {
    /// A committed development database was removed
    pub removed_committed_data: bool,
    pub migrations: usize,
    pub hooks: usize,
}

async fn count_entries(dir: &Dir) -> Result<usize, EngineError> {
    let mut count = 0;
    let mut entries = tokio::fs::read_dir(dir.path()).await?;
    while entries.next_entry().await?.is_some() {
        count += 1;
    }
    Ok(count)
}

/// Prepare `pb_migrations`, `pb_hooks` and `.gitignore` under `root`.
///
/// With `purge_committed_data` set, a `pb_data/data.db` that came from the
/// repository is deleted so a development database never reaches a fresh backend.
pub async fn ensure_structure(root: &Path, purge_committed_data: bool) -> Result<StructureReport, EngineError> {
    let root = Dir::new(root);
    let mut report = StructureReport::default();

    let committed = root.subdir("pb_data");
    if purge_committed_data && committed.file("data.db").exists().await {
        match committed.delete().await {
            Ok(()) => report.removed_committed_data = true,
            Err(e) => warn!("Could not remove committed pb_data: {}", e),
        }
    }

    let migrations = root.subdir("pb_migrations");
    if migrations.exists().await {
        report.migrations = count_entries(&migrations).await?;
    } else {
        migrations.create().await?;
    }

    let hooks = root.subdir("pb_hooks");
    if hooks.exists().await {
        report.hooks = count_entries(&hooks).await?;
    } else {
        hooks.create().await?;
    }

    let gitignore = root.file(".gitignore");
    if !gitignore.exists().await {
        if let Err(e) = gitignore.write_string(GITIGNORE).await {
            warn!("Could not create .gitignore: {}", e);
        }
    }

    Ok(report)
}

/// Create the live data directory of a project and return its path
pub async fn ensure_data_dir(project_data_dir: &Path) -> Result<PathBuf, EngineError> {
    let data = Dir::new(project_data_dir).subdir("pb_data");
    data.create().await?;
    Ok(data.path().to_path_buf())
}

/// Append the encryption key to `<root>/.env` unless it is already defined.
/// Returns whether the file changed.
pub async fn ensure_encryption_key(root: &Path, key: &str) -> Result<bool, EngineError> {
    let env = Dir::new(root).file(".env");
    let existing = if env.exists().await {
        env.read_string().await?
    } else {
        String::new()
    };
    if existing.contains(ENCRYPTION_KEY_VAR) {
        return Ok(false);
    }

    info!("Adding {} to {}", ENCRYPTION_KEY_VAR, env.path().display());
    env.append_string(&format!(
        "\n# PocketBase encryption key (auto-generated)\n{}={}\n",
        ENCRYPTION_KEY_VAR, key
    ))
    .await?;
    Ok(true)
}
