//! Persistence boundary
//!
//! The engine never talks to a database directly. Everything it reads or writes about
//! projects, deployments, domains, environment variables and build logs goes through
//! the [`Store`] trait so the panel's own persistence can be plugged in.

pub mod memory;

use async_trait::async_trait;

use crate::errors::EngineError;
use crate::models::build_log::BuildLog;
use crate::models::deployment::Deployment;
use crate::models::domain::Domain;
use crate::models::environment::Environment;
use crate::models::project::Project;

pub use memory::MemoryStore;

#[async_trait]
pub trait Store: Send + Sync {
    async fn create_project(&self, project: Project) -> Result<Project, EngineError>;

    async fn get_project(&self, id: u64) -> Result<Project, EngineError>;

    async fn update_project(&self, project: &Project) -> Result<(), EngineError>;

    async fn list_projects(&self) -> Result<Vec<Project>, EngineError>;

    /// Persist a new deployment and return it with its assigned id
    async fn create_deployment(&self, deployment: Deployment) -> Result<Deployment, EngineError>;

    async fn get_deployment(&self, id: u64) -> Result<Deployment, EngineError>;

    async fn update_deployment(&self, deployment: &Deployment) -> Result<(), EngineError>;

    /// Deployments of a project, newest first
    async fn list_deployments(&self, project_id: u64) -> Result<Vec<Deployment>, EngineError>;

    async fn create_domain(&self, domain: Domain) -> Result<Domain, EngineError>;

    async fn list_domains(&self, project_id: u64) -> Result<Vec<Domain>, EngineError>;

    async fn create_env_var(&self, env: Environment) -> Result<Environment, EngineError>;

    async fn update_env_var(&self, env: &Environment) -> Result<(), EngineError>;

    async fn list_env_vars(&self, project_id: u64) -> Result<Vec<Environment>, EngineError>;

    async fn append_log(&self, log: BuildLog) -> Result<(), EngineError>;

    /// Build logs of a deployment in insertion order
    async fn list_logs(&self, deployment_id: u64) -> Result<Vec<BuildLog>, EngineError>;
}
