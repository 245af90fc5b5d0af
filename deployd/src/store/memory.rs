//! In-memory store with an optional JSON snapshot

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::errors::EngineError;
use crate::filesys::file::File;
use crate::models::build_log::BuildLog;
use crate::models::deployment::Deployment;
use crate::models::domain::Domain;
use crate::models::environment::Environment;
use crate::models::project::Project;
use crate::store::Store;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Tables {
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    projects: BTreeMap<u64, Project>,
    #[serde(default)]
    deployments: BTreeMap<u64, Deployment>,
    #[serde(default)]
    domains: BTreeMap<u64, Domain>,
    #[serde(default)]
    env_vars: BTreeMap<u64, Environment>,
    #[serde(default)]
    logs: Vec<BuildLog>,
}

impl Tables {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Store keeping all records in memory, optionally mirrored to a JSON file
pub struct MemoryStore {
    tables: RwLock<Tables>,
    snapshot: Option<File>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// A store that lives only as long as the process
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            snapshot: None,
        }
    }

    /// Open a store backed by `file`, loading existing records if present
    pub async fn open(file: File) -> Result<Self, EngineError> {
        let tables = if file.exists().await {
            info!("Loading store snapshot from {}", file.path().display());
            file.read_json::<Tables>().await?
        } else {
            Tables::default()
        };

        Ok(Self {
            tables: RwLock::new(tables),
            snapshot: Some(file),
        })
    }

    async fn persist(&self, tables: &Tables) -> Result<(), EngineError> {
        if let Some(file) = &self.snapshot {
            debug!("Writing store snapshot to {}", file.path().display());
            file.write_json(tables).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_project(&self, mut project: Project) -> Result<Project, EngineError> {
        let mut tables = self.tables.write().await;
        if project.id == 0 {
            project.id = tables.next_id();
        } else {
            tables.next_id = tables.next_id.max(project.id);
        }
        tables.projects.insert(project.id, project.clone());
        self.persist(&tables).await?;
        Ok(project)
    }

    async fn get_project(&self, id: u64) -> Result<Project, EngineError> {
        let tables = self.tables.read().await;
        tables
            .projects
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("project {}", id)))
    }

    async fn update_project(&self, project: &Project) -> Result<(), EngineError> {
        let mut tables = self.tables.write().await;
        if !tables.projects.contains_key(&project.id) {
            return Err(EngineError::NotFound(format!("project {}", project.id)));
        }
        tables.projects.insert(project.id, project.clone());
        self.persist(&tables).await
    }

    async fn list_projects(&self) -> Result<Vec<Project>, EngineError> {
        let tables = self.tables.read().await;
        Ok(tables.projects.values().cloned().collect())
    }

    async fn create_deployment(&self, mut deployment: Deployment) -> Result<Deployment, EngineError> {
        let mut tables = self.tables.write().await;
        deployment.id = tables.next_id();
        tables.deployments.insert(deployment.id, deployment.clone());
        self.persist(&tables).await?;
        Ok(deployment)
    }

    async fn get_deployment(&self, id: u64) -> Result<Deployment, EngineError> {
        let tables = self.tables.read().await;
        tables
            .deployments
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("deployment {}", id)))
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<(), EngineError> {
        let mut tables = self.tables.write().await;
        if !tables.deployments.contains_key(&deployment.id) {
            return Err(EngineError::NotFound(format!("deployment {}", deployment.id)));
        }
        tables.deployments.insert(deployment.id, deployment.clone());
        self.persist(&tables).await
    }

    async fn list_deployments(&self, project_id: u64) -> Result<Vec<Deployment>, EngineError> {
        let tables = self.tables.read().await;
        Ok(tables
            .deployments
            .values()
            .rev()
            .filter(|d| d.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn create_domain(&self, mut domain: Domain) -> Result<Domain, EngineError> {
        let mut tables = self.tables.write().await;
        domain.id = tables.next_id();
        tables.domains.insert(domain.id, domain.clone());
        self.persist(&tables).await?;
        Ok(domain)
    }

    async fn list_domains(&self, project_id: u64) -> Result<Vec<Domain>, EngineError> {
        let tables = self.tables.read().await;
        Ok(tables
            .domains
            .values()
            .filter(|d| d.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn create_env_var(&self, mut env: Environment) -> Result<Environment, EngineError> {
        let mut tables = self.tables.write().await;
        env.id = tables.next_id();
        tables.env_vars.insert(env.id, env.clone());
        self.persist(&tables).await?;
        Ok(env)
    }

    async fn update_env_var(&self, env: &Environment) -> Result<(), EngineError> {
        let mut tables = self.tables.write().await;
        if !tables.env_vars.contains_key(&env.id) {
            return Err(EngineError::NotFound(format!("environment variable {}", env.id)));
        }
        tables.env_vars.insert(env.id, env.clone());
        self.persist(&tables).await
    }

    async fn list_env_vars(&self, project_id: u64) -> Result<Vec<Environment>, EngineError> {
        let tables = self.tables.read().await;
        Ok(tables
            .env_vars
            .values()
            .filter(|e| e.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn append_log(&self, mut log: BuildLog) -> Result<(), EngineError> {
        let mut tables = self.tables.write().await;
        log.id = tables.next_id();
        tables.logs.push(log);
        self.persist(&tables).await
    }

    async fn list_logs(&self, deployment_id: u64) -> Result<Vec<BuildLog>, EngineError> {
        let tables = self.tables.read().await;
        Ok(tables
            .logs
            .iter()
            .filter(|l| l.deployment_id == deployment_id)
            .cloned()
            .collect())
    }
}
