//! Compose descriptor for projects with a bundled backend service

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::deploy::docker::{CONTAINER_FRONTEND_PORT, RESTART_POLICY};
use crate::errors::EngineError;
use crate::filesys::file::File;
use crate::models::project::Project;

pub const FRONTEND_SERVICE: &str = "frontend";
pub const POCKETBASE_SERVICE: &str = "pocketbase";
pub const POCKETBASE_DOCKERFILE: &str = "Dockerfile.pocketbase";
pub const POCKETBASE_PORT: u16 = 8090;
const NETWORK: &str = "app-network";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeFile {
    pub services: BTreeMap<String, Service>,
    #[serde(default)]
    pub networks: BTreeMap<String, Network>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub build: Build,
    pub container_name: String,
    pub restart: String,
    #[serde(default)]
    pub environment: Vec<String>,
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<Healthcheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub depends_on: BTreeMap<String, DependsOn>,
    #[serde(default)]
    pub networks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    pub context: String,
    pub dockerfile: String,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Healthcheck {
    pub test: Vec<String>,
    pub interval: String,
    pub timeout: String,
    pub retries: u32,
    pub start_period: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependsOn {
    pub condition: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub driver: String,
}

/// Public URL the backend is reached at; plain HTTP for local or missing domains
pub fn public_url(domain: &str) -> String {
    if domain.is_empty() || domain == "localhost" {
        format!("http://{}", domain)
    } else {
        format!("https://{}", domain)
    }
}

/// Build context of the frontend relative to the repository root
pub fn frontend_context(repo_root: &Path, frontend_dir: &Path) -> String {
    match frontend_dir.strip_prefix(repo_root) {
        Ok(rel) if !rel.as_os_str().is_empty() => {
            format!("./{}", rel.to_string_lossy().replace('\\', "/"))
        }
        _ => ".".to_string(),
    }
}

impl ComposeFile {
    /// Frontend plus PocketBase stack of a project. `live_data` is mounted as the
    /// backend's data directory.
    pub fn pocketbase_stack(
        project: &Project,
        frontend_context: &str,
        live_data: &Path,
        domain: &str,
        pb_version: &str,
    ) -> Self {
        let url = public_url(domain);
        let internal_url = format!("http://{}:{}", POCKETBASE_SERVICE, POCKETBASE_PORT);

        let pocketbase = Service {
            build: Build {
                context: ".".to_string(),
                dockerfile: POCKETBASE_DOCKERFILE.to_string(),
                args: BTreeMap::from([("PB_VERSION".to_string(), pb_version.to_string())]),
            },
            container_name: project.service_container_name(POCKETBASE_SERVICE),
            restart: RESTART_POLICY.to_string(),
            environment: vec!["PB_ENCRYPTION_KEY=${PB_ENCRYPTION_KEY:-}".to_string()],
            ports: vec![format!("127.0.0.1:{}:{}", project.backend_port, POCKETBASE_PORT)],
            volumes: vec![
                format!("{}:/pb/pb_data", live_data.display()),
                "./pb_migrations:/pb/pb_migrations:ro".to_string(),
                "./pb_hooks:/pb/pb_hooks:ro".to_string(),
            ],
            healthcheck: Some(Healthcheck {
                test: ["CMD", "wget", "--quiet", "--tries=1", "--spider"]
                    .iter()
                    .map(|s| s.to_string())
                    .chain(std::iter::once(format!(
                        "http://localhost:{}/api/health",
                        POCKETBASE_PORT
                    )))
                    .collect(),
                interval: "15s".to_string(),
                timeout: "5s".to_string(),
                retries: 5,
                start_period: "30s".to_string(),
            }),
            command: Some(format!(
                "/pb/pocketbase serve --http=0.0.0.0:{} --dir=/pb/pb_data --migrationsDir=/pb/pb_migrations --hooksDir=/pb/pb_hooks --origins={}",
                POCKETBASE_PORT, url
            )),
            depends_on: BTreeMap::new(),
            networks: vec![NETWORK.to_string()],
        };

        let frontend = Service {
            build: Build {
                context: frontend_context.to_string(),
                dockerfile: "Dockerfile".to_string(),
                args: BTreeMap::from([
                    ("PUBLIC_POCKETBASE_URL".to_string(), url.clone()),
                    ("POCKETBASE_URL".to_string(), internal_url.clone()),
                ]),
            },
            container_name: project.service_container_name(FRONTEND_SERVICE),
            restart: RESTART_POLICY.to_string(),
            environment: vec![
                "NODE_ENV=production".to_string(),
                format!("PORT={}", CONTAINER_FRONTEND_PORT),
                "HOST=0.0.0.0".to_string(),
                format!("PUBLIC_POCKETBASE_URL={}", url),
                format!("POCKETBASE_URL={}", internal_url),
                format!("ORIGIN={}", url),
            ],
            ports: vec![format!(
                "127.0.0.1:{}:{}",
                project.frontend_port, CONTAINER_FRONTEND_PORT
            )],
            volumes: Vec::new(),
            healthcheck: None,
            command: None,
            depends_on: BTreeMap::from([(
                POCKETBASE_SERVICE.to_string(),
                DependsOn {
                    condition: "service_healthy".to_string(),
                },
            )]),
            networks: vec![NETWORK.to_string()],
        };

        Self {
            services: BTreeMap::from([
                (POCKETBASE_SERVICE.to_string(), pocketbase),
                (FRONTEND_SERVICE.to_string(), frontend),
            ]),
            networks: BTreeMap::from([(
                NETWORK.to_string(),
                Network {
                    driver: "bridge".to_string(),
                },
            )]),
        }
    }

    pub fn to_yaml(&self) -> Result<String, EngineError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub async fn write(&self, file: &File) -> Result<(), EngineError> {
        file.write_string(&self.to_yaml()?).await
    }
}
