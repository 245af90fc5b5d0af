//! Deployment orchestrator
//!
//! Drives one deployment from a fresh checkout to a running release. Every
//! deployment runs under its project's lock; status writes re-read the stored
//! record first so a user cancellation is never overwritten.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::credentials::CredentialResolver;
use crate::deploy::backend::{
    ensure_data_dir, ensure_encryption_key, ensure_structure, pocketbase_recipe, ReleaseFeed,
};
use crate::deploy::compose::{
    frontend_context, ComposeFile, FRONTEND_SERVICE, POCKETBASE_DOCKERFILE, POCKETBASE_SERVICE,
};
use crate::deploy::detector::{self, TreeProbe};
use crate::deploy::docker::{run_container, ComposeTarget, ContainerRuntime, ContainerSpec, COMPOSE_FILE};
use crate::deploy::domain::generated_domain;
use crate::deploy::envfile::{write_env_file, EnvFileOutcome, SYSTEM_VAR_COUNT};
use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm};
use crate::deploy::git::{FetchRequest, Fetcher, DEFAULT_DEPTH};
use crate::deploy::lock::{ProjectGuard, ProjectLocks};
use crate::deploy::ports::{PortAllocator, BACKEND_PORT_FLOOR, FRONTEND_PORT_FLOOR};
use crate::deploy::proxy::CaddyProxy;
use crate::deploy::recipe::{
    default_output_dir, ensure_build_recipe, framework_label, missing_path_hint, RecipeOutcome,
};
use crate::deploy::sink::{LogSink, StoreSink};
use crate::deploy::sveltekit;
use crate::errors::EngineError;
use crate::events::EventBus;
use crate::filesys::dir::Dir;
use crate::http::client::HttpClient;
use crate::models::deployment::{Deployment, DeploymentStatus};
use crate::models::domain::Domain;
use crate::models::environment::Environment;
use crate::models::project::{primary_domain, BackendState, Project, ProjectStatus};
use crate::store::Store;
use crate::utils::random_hex;

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Base domain generated subdomains are created under
    pub base_domain: String,
    /// Live backend data, one directory per project, outside every checkout
    pub data_dir: PathBuf,
    pub clone_depth: u32,
    pub build_timeout: Duration,
    pub max_concurrent_builds: usize,
    /// Probe HTTPS after a project's first deployment
    pub verify_certificates: bool,
    pub certificate_wait: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            base_domain: String::new(),
            data_dir: PathBuf::from("/var/lib/deployd/volumes"),
            clone_depth: DEFAULT_DEPTH,
            build_timeout: Duration::from_secs(600),
            max_concurrent_builds: 3,
            verify_certificates: true,
            certificate_wait: Duration::from_secs(20),
        }
    }
}

/// Everything the orchestrator talks to
pub struct Collaborators {
    pub store: Arc<dyn Store>,
    pub events: EventBus,
    pub credentials: Arc<dyn CredentialResolver>,
    pub fetcher: Arc<dyn Fetcher>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub ports: PortAllocator,
    pub proxy: CaddyProxy,
    pub releases: ReleaseFeed,
    pub http: Arc<HttpClient>,
}

/// Directories of one deployment's checkout
#[derive(Debug, Clone)]
pub struct Workspace {
    pub repo_root: PathBuf,
    /// `repo_root` joined with the project's root directory
    pub work_dir: PathBuf,
    /// Build context of the frontend image
    pub frontend_dir: PathBuf,
}

pub struct Orchestrator {
    store: Arc<dyn Store>,
    events: EventBus,
    credentials: Arc<dyn CredentialResolver>,
    fetcher: Arc<dyn Fetcher>,
    runtime: Arc<dyn ContainerRuntime>,
    ports: PortAllocator,
    proxy: CaddyProxy,
    releases: ReleaseFeed,
    http: Arc<HttpClient>,
    locks: ProjectLocks,
    builds: Semaphore,
    options: OrchestratorOptions,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators, options: OrchestratorOptions) -> Self {
        let Collaborators {
            store,
            events,
            credentials,
            fetcher,
            runtime,
            ports,
            proxy,
            releases,
            http,
        } = collaborators;

        Self {
            store,
            events,
            credentials,
            fetcher,
            runtime,
            ports,
            proxy,
            releases,
            http,
            locks: ProjectLocks::new(),
            builds: Semaphore::new(options.max_concurrent_builds.max(1)),
            options,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn is_deploying(&self, project_id: u64) -> bool {
        self.locks.is_locked(project_id)
    }

    /// Latest released version of the bundled backend service
    pub async fn latest_backend_version(&self) -> Result<String, EngineError> {
        self.releases.latest_version().await
    }

    /// Persist a pending deployment and run it in the background.
    ///
    /// Returns as soon as the deployment is stored; a project that is already
    /// deploying is rejected before anything is written.
    pub async fn trigger(self: &Arc<Self>, deployment: Deployment) -> Result<Deployment, EngineError> {
        let project_id = deployment.project_id;
        let guard = self
            .locks
            .try_acquire(project_id)
            .ok_or(EngineError::DeploymentInProgress(project_id))?;

        self.store.get_project(project_id).await?;
        let deployment = self.store.create_deployment(deployment).await?;
        self.events
            .status(deployment.id, project_id, DeploymentStatus::Pending);
        info!(
            "Queued deployment {} for project {} ({})",
            deployment.id,
            project_id,
            String::from(deployment.triggered_by)
        );

        let orchestrator = Arc::clone(self);
        let deployment_id = deployment.id;
        tokio::spawn(async move {
            if let Err(e) = orchestrator.run(deployment_id, guard).await {
                debug!("Deployment {} finished with error: {}", deployment_id, e);
            }
        });

        Ok(deployment)
    }

    /// Run a stored deployment to completion on the current task
    pub async fn deploy(&self, deployment_id: u64) -> Result<(), EngineError> {
        let deployment = self.store.get_deployment(deployment_id).await?;
        let guard = self
            .locks
            .try_acquire(deployment.project_id)
            .ok_or(EngineError::DeploymentInProgress(deployment.project_id))?;
        self.run(deployment_id, guard).await
    }

    /// Cancel a deployment that has not started deploying yet
    pub async fn cancel(&self, deployment_id: u64) -> Result<Deployment, EngineError> {
        let mut deployment = self.store.get_deployment(deployment_id).await?;
        let mut fsm = DeploymentFsm::from_status(deployment.status);
        if !fsm.can_cancel() {
            return Err(EngineError::ValidationError(format!(
                "deployment {} is {} and can no longer be cancelled",
                deployment_id, deployment.status
            )));
        }
        deployment.status = fsm
            .process(DeploymentEvent::Cancel)
            .map_err(EngineError::ValidationError)?;
        finish(&mut deployment);
        self.store.update_deployment(&deployment).await?;
        self.events
            .status(deployment.id, deployment.project_id, deployment.status);

        self.sink(&deployment).warn("Deployment cancelled by user").await;
        info!("Cancelled deployment {}", deployment_id);
        Ok(deployment)
    }

    fn sink(&self, deployment: &Deployment) -> StoreSink {
        StoreSink::new(
            Arc::clone(&self.store),
            self.events.clone(),
            deployment.id,
            deployment.project_id,
        )
    }

    async fn run(&self, deployment_id: u64, _guard: ProjectGuard) -> Result<(), EngineError> {
        let mut deployment = self.store.get_deployment(deployment_id).await?;
        let mut project = self.store.get_project(deployment.project_id).await?;
        let sink = self.sink(&deployment);

        info!("Starting deployment {} for project {}", deployment.id, project.id);
        match self.execute(&mut deployment, &mut project, &sink).await {
            Ok(()) => {
                info!("Deployment {} succeeded", deployment.id);
                Ok(())
            }
            Err(EngineError::Cancelled(id)) => {
                info!("Deployment {} stopped after cancellation", id);
                Err(EngineError::Cancelled(id))
            }
            Err(e) => {
                error!("Deployment {} failed: {}", deployment.id, e);
                self.fail(&mut deployment, &e, &sink).await;
                Err(e)
            }
        }
    }

    async fn fail(&self, deployment: &mut Deployment, err: &EngineError, sink: &StoreSink) {
        match self.store.get_deployment(deployment.id).await {
            Ok(stored) if stored.status == DeploymentStatus::Cancelled => return,
            Ok(_) => {}
            Err(e) => warn!("Could not re-read deployment {}: {}", deployment.id, e),
        }

        let message = err.to_string();
        let mut fsm = DeploymentFsm::from_status(deployment.status);
        if let Err(e) = fsm.process(DeploymentEvent::Fail(message.clone())) {
            warn!("Unexpected failure transition for deployment {}: {}", deployment.id, e);
        }
        deployment.status = DeploymentStatus::Failed;
        deployment.error_message = Some(message.clone());
        finish(deployment);

        if let Err(e) = self.store.update_deployment(deployment).await {
            error!("Failed to record failure of deployment {}: {}", deployment.id, e);
        }
        self.events
            .status(deployment.id, deployment.project_id, deployment.status);
        sink.error(&format!("Deployment failed: {}", message)).await;
    }

    async fn execute(
        &self,
        deployment: &mut Deployment,
        project: &mut Project,
        sink: &StoreSink,
    ) -> Result<(), EngineError> {
        self.advance(deployment, DeploymentEvent::Build).await?;
        sink.info(&format!("Starting deployment for {}", project.name)).await;

        let mut workspace = self.fetch(deployment, project, sink).await?;
        self.apply_detection(&mut workspace, project, sink).await;
        self.allocate_ports(project, sink).await?;
        let domains = self.ensure_domain(project, sink).await?;
        let primary = primary_domain(&domains).cloned();

        let vars = self.store.list_env_vars(project.id).await?;
        match write_env_file(&workspace.frontend_dir, primary.as_ref(), &vars).await? {
            EnvFileOutcome::Merged => {
                sink.info("Injected system variables into the repository .env file")
                    .await
            }
            EnvFileOutcome::Generated { user_vars } => {
                sink.info(&format!(
                    "Generated .env with {} system and {} project variables",
                    SYSTEM_VAR_COUNT, user_vars
                ))
                .await
            }
        }

        let adjustment = sveltekit::adjust(&workspace.frontend_dir).await?;
        if adjustment.added_adapter_node {
            sink.info(&format!("Switched SvelteKit to {}", sveltekit::ADAPTER_NODE))
                .await;
        }
        if adjustment.removed_lockfile {
            sink.info("Removed stale package-lock.json").await;
        }

        if project.has_bundled_backend() {
            self.deploy_bundled(deployment, project, &workspace, &domains, sink)
                .await?;
        } else {
            self.deploy_single(deployment, project, &workspace, &domains, &vars, sink)
                .await?;
        }

        if project.last_deployed_at.is_none() && self.options.verify_certificates {
            if let Some(domain) = &primary {
                self.verify_certificate(domain, sink).await;
            }
        }

        self.advance(deployment, DeploymentEvent::Succeed).await?;
        let now = Utc::now();
        self.patch_project(project, |p| {
            p.status = ProjectStatus::Active;
            p.last_deployed_at = Some(now);
        })
        .await?;
        sink.info("Deployment completed successfully!").await;
        Ok(())
    }

    /// Apply a status transition, unless the deployment was cancelled meanwhile
    async fn advance(&self, deployment: &mut Deployment, event: DeploymentEvent) -> Result<(), EngineError> {
        self.ensure_not_cancelled(deployment).await?;

        let mut fsm = DeploymentFsm::from_status(deployment.status);
        let status = fsm.process(event).map_err(EngineError::Internal)?;
        deployment.status = status;
        match status {
            DeploymentStatus::Building => deployment.started_at = Some(Utc::now()),
            DeploymentStatus::Success => finish(deployment),
            _ => {}
        }

        self.store.update_deployment(deployment).await?;
        self.events
            .status(deployment.id, deployment.project_id, status);
        debug!("Deployment {} is now {}", deployment.id, status);
        Ok(())
    }

    async fn ensure_not_cancelled(&self, deployment: &Deployment) -> Result<(), EngineError> {
        let stored = self.store.get_deployment(deployment.id).await?;
        if stored.status == DeploymentStatus::Cancelled {
            return Err(EngineError::Cancelled(deployment.id));
        }
        Ok(())
    }

    /// Apply `change` to the stored project and the in-flight copy.
    ///
    /// Detected values only live on the in-flight copy and are never persisted.
    async fn patch_project<F>(&self, project: &mut Project, change: F) -> Result<(), EngineError>
    where
        F: Fn(&mut Project),
    {
        let mut stored = self.store.get_project(project.id).await?;
        change(&mut stored);
        change(project);
        self.store.update_project(&stored).await
    }

    async fn fetch(
        &self,
        deployment: &mut Deployment,
        project: &Project,
        sink: &StoreSink,
    ) -> Result<Workspace, EngineError> {
        let git_ref = if deployment.branch.is_empty() {
            project.git_branch.clone()
        } else {
            deployment.branch.clone()
        };

        let credentials = self.credentials.resolve(project).await?;
        sink.info(&format!("Cloning repository (branch {})...", git_ref))
            .await;
        let request = FetchRequest {
            url: project.git_url.clone(),
            git_ref,
            depth: self.options.clone_depth,
            credentials,
        };
        let repo_root = self
            .fetcher
            .fetch(&format!("project-{}", project.id), &request)
            .await?;
        sink.info("Repository fetched").await;

        match self.fetcher.latest_commit(&repo_root).await {
            Ok(commit) => {
                deployment.commit_hash = commit.hash;
                deployment.commit_message = commit.message;
                deployment.commit_author = commit.author;
                self.ensure_not_cancelled(deployment).await?;
                self.store.update_deployment(deployment).await?;
                sink.info(&format!(
                    "Commit {} by {}: {}",
                    deployment.short_commit(),
                    deployment.commit_author,
                    deployment.commit_message.lines().next().unwrap_or_default()
                ))
                .await;
            }
            Err(e) => sink.warn(&format!("Could not read commit info: {}", e)).await,
        }

        let root_directory = project.root_directory.trim_matches('/');
        if root_directory.split('/').any(|part| part == "..") {
            return Err(EngineError::ValidationError(format!(
                "root directory {} escapes the repository",
                project.root_directory
            )));
        }
        let work_dir = if root_directory.is_empty() {
            repo_root.clone()
        } else {
            repo_root.join(root_directory)
        };
        if !Dir::new(&work_dir).exists().await {
            return Err(EngineError::FetchError(format!(
                "root directory {} not found in repository",
                root_directory
            )));
        }
        if !root_directory.is_empty() {
            sink.info(&format!("Using root directory {}", root_directory))
                .await;
        }

        Ok(Workspace {
            repo_root,
            frontend_dir: work_dir.clone(),
            work_dir,
        })
    }

    /// Fill unset project fields from the working tree
    async fn apply_detection(&self, workspace: &mut Workspace, project: &mut Project, sink: &StoreSink) {
        let detection = detector::detect(&workspace.work_dir).await;
        for err in &detection.errors {
            sink.warn(&format!("Detection: {}", err)).await;
        }

        if project.framework.is_none() {
            project.framework = detection.framework;
        }
        if project.backend_service.is_none() {
            project.backend_service = detection.backend_service;
        }
        for (field, detected) in [
            (&mut project.build_command, &detection.build_command),
            (&mut project.install_command, &detection.install_command),
            (&mut project.start_command, &detection.start_command),
        ] {
            if field.is_empty() {
                *field = detected.clone();
            }
        }

        match project.framework {
            Some(framework) => sink.info(&format!("Framework: {}", framework)).await,
            None => sink.info("No framework detected, using a generic Node.js build").await,
        }
        if let Some(service) = project.backend_service {
            sink.info(&format!("Backend service: {}", service)).await;
        }

        if project.has_bundled_backend() && !detection.framework_dir.is_empty() {
            workspace.frontend_dir = workspace.work_dir.join(&detection.framework_dir);
            sink.info(&format!("Frontend found in {}", detection.framework_dir))
                .await;
        }
    }

    /// Keep ports held by the project's own containers, re-probe everything else
    async fn allocate_ports(&self, project: &mut Project, sink: &StoreSink) -> Result<(), EngineError> {
        let (frontend_name, backend_name) = if project.has_bundled_backend() {
            (
                project.service_container_name(FRONTEND_SERVICE),
                Some(project.service_container_name(POCKETBASE_SERVICE)),
            )
        } else {
            (project.container_name(), None)
        };

        let frontend_held =
            project.frontend_port != 0 && self.runtime.is_container_running(&frontend_name).await;
        let frontend = if frontend_held {
            project.frontend_port
        } else {
            self.ports
                .ensure_available(project.frontend_port, FRONTEND_PORT_FLOOR)?
        };

        let mut backend = project.backend_port;
        if project.backend_port != 0 || project.has_bundled_backend() {
            let held = project.backend_port != 0
                && match &backend_name {
                    Some(name) => self.runtime.is_container_running(name).await,
                    None => frontend_held,
                };
            if !held {
                backend = self
                    .ports
                    .ensure_available(project.backend_port, BACKEND_PORT_FLOOR)?;
            }
        }

        if frontend == project.frontend_port && backend == project.backend_port {
            return Ok(());
        }
        if frontend != project.frontend_port {
            sink.info(&format!("Automatically assigned frontend port: {}", frontend))
                .await;
        }
        if backend != project.backend_port {
            sink.info(&format!("Automatically assigned backend port: {}", backend))
                .await;
        }
        self.patch_project(project, |p| {
            p.frontend_port = frontend;
            p.backend_port = backend;
        })
        .await
    }

    async fn ensure_domain(&self, project: &Project, sink: &StoreSink) -> Result<Vec<Domain>, EngineError> {
        let mut domains = self.store.list_domains(project.id).await?;
        if primary_domain(&domains).is_none() {
            let host = generated_domain(project, &self.options.base_domain)?;
            let domain = self
                .store
                .create_domain(Domain::active(project.id, &host))
                .await?;
            sink.info(&format!("Auto-generated domain: {}", domain.domain))
                .await;
            domains.push(domain);
        }
        Ok(domains)
    }

    async fn deploy_single(
        &self,
        deployment: &mut Deployment,
        project: &mut Project,
        workspace: &Workspace,
        domains: &[Domain],
        vars: &[Environment],
        sink: &StoreSink,
    ) -> Result<(), EngineError> {
        let dir = &workspace.work_dir;
        let recipe = ensure_build_recipe(dir, project).await?;
        self.record_recipe(project, recipe, sink).await?;

        let tag = project.image_tag();
        sink.info("Building Docker image...").await;
        if let Err(e) = self
            .bounded_build(self.runtime.build_image(dir, &tag, sink))
            .await
        {
            if let EngineError::BuildError(output) = &e {
                let (probe, _) = TreeProbe::scan(dir).await;
                let output_dir = if project.output_dir.is_empty() {
                    default_output_dir(&probe)
                } else {
                    project.output_dir.as_str()
                };
                if let Some(hint) = missing_path_hint(output, framework_label(&probe), output_dir) {
                    for line in hint.lines() {
                        sink.error(line).await;
                    }
                }
            }
            return Err(e);
        }
        sink.info("Docker image built successfully").await;

        self.advance(deployment, DeploymentEvent::Deploy).await?;
        let spec = ContainerSpec::for_project(project, &tag, vars);
        sink.info(&format!("Starting container {}...", spec.name)).await;
        run_container(self.runtime.as_ref(), &spec).await?;
        sink.info(&format!("Container running on port {}", project.frontend_port))
            .await;

        self.configure_proxy(project, domains, sink).await
    }

    async fn deploy_bundled(
        &self,
        deployment: &mut Deployment,
        project: &mut Project,
        workspace: &Workspace,
        domains: &[Domain],
        sink: &StoreSink,
    ) -> Result<(), EngineError> {
        let root = &workspace.work_dir;
        sink.info("Preparing PocketBase backend...").await;
        let fresh_backend = project.backend_state == BackendState::Uninitialized;
        let report = ensure_structure(root, fresh_backend).await?;
        if report.removed_committed_data {
            sink.warn("Removed committed pb_data/data.db from the repository")
                .await;
        }
        let live_data = ensure_data_dir(&self.project_data_dir(project)).await?;
        sink.info(&format!(
            "Found {} migration(s) and {} hook(s)",
            report.migrations, report.hooks
        ))
        .await;

        let recipe = ensure_build_recipe(&workspace.frontend_dir, project).await?;
        self.record_recipe(project, recipe, sink).await?;

        let version = self.releases.version_or_fallback().await;
        Dir::new(root)
            .file(POCKETBASE_DOCKERFILE)
            .write_string(&pocketbase_recipe(&version))
            .await?;

        let key = match project.backend_encryption_key.clone() {
            Some(key) => key,
            None => {
                let key = random_hex(32);
                self.patch_project(project, |p| p.backend_encryption_key = Some(key.clone()))
                    .await?;
                sink.info("Generated PocketBase encryption key").await;
                key
            }
        };
        if ensure_encryption_key(root, &key).await? {
            sink.info("Added encryption key to .env").await;
        }

        let domain = primary_domain(domains)
            .map(|d| d.domain.clone())
            .unwrap_or_default();
        let context = frontend_context(root, &workspace.frontend_dir);
        ComposeFile::pocketbase_stack(project, &context, &live_data, &domain, &version)
            .write(&Dir::new(root).file(COMPOSE_FILE))
            .await?;
        self.patch_project(project, |p| p.backend_version = Some(version.clone()))
            .await?;
        sink.info(&format!("Generated {} for PocketBase {}", COMPOSE_FILE, version))
            .await;

        let target = ComposeTarget::new(root.clone(), &project.compose_project_name());
        let initialized = project.backend_state == BackendState::Initialized;
        if initialized {
            sink.info("Backend already initialized, rebuilding frontend only")
                .await;
            self.bounded_build(
                self.runtime
                    .compose_build_service(&target, FRONTEND_SERVICE, sink),
            )
            .await?;
            self.advance(deployment, DeploymentEvent::Deploy).await?;
            self.runtime
                .compose_restart_service(&target, FRONTEND_SERVICE)
                .await?;
            sink.info("Frontend restarted, backend kept running").await;
        } else {
            if let Err(e) = self.runtime.compose_down(&target).await {
                sink.info(&format!("Note: nothing to stop ({})", e)).await;
            }
            sink.info("Building services...").await;
            self.bounded_build(self.runtime.compose_build(&target, sink))
                .await?;
            self.advance(deployment, DeploymentEvent::Deploy).await?;
            sink.info("Starting services...").await;
            self.runtime.compose_up(&target).await?;
            sink.info("Services started").await;
        }

        self.configure_proxy(project, domains, sink).await?;

        if !initialized {
            self.patch_project(project, |p| p.backend_state = BackendState::Initialized)
                .await?;
        }
        Ok(())
    }

    /// Data directory of a project's bundled backend
    pub fn project_data_dir(&self, project: &Project) -> PathBuf {
        self.options.data_dir.join(format!("project-{}", project.id))
    }

    async fn record_recipe(
        &self,
        project: &mut Project,
        outcome: RecipeOutcome,
        sink: &StoreSink,
    ) -> Result<(), EngineError> {
        match outcome.kind {
            None => sink.info("Using Dockerfile from repository").await,
            Some(kind) => sink.info(&format!("Generated Dockerfile ({:?})", kind)).await,
        }
        if let Some(output_dir) = outcome.detected_output_dir {
            sink.info(&format!("Detected output directory: {}", output_dir))
                .await;
            self.patch_project(project, |p| p.output_dir = output_dir.clone())
                .await?;
        }
        Ok(())
    }

    /// Hold a build slot for the duration of `build`, bounded by the build timeout
    async fn bounded_build<F>(&self, build: F) -> Result<(), EngineError>
    where
        F: Future<Output = Result<(), EngineError>>,
    {
        let _permit = self
            .builds
            .acquire()
            .await
            .map_err(|e| EngineError::Internal(format!("build queue closed: {}", e)))?;

        match tokio::time::timeout(self.options.build_timeout, build).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::BuildError(format!(
                "build timed out after {}s",
                self.options.build_timeout.as_secs()
            ))),
        }
    }

    async fn configure_proxy(
        &self,
        project: &Project,
        domains: &[Domain],
        sink: &StoreSink,
    ) -> Result<(), EngineError> {
        let path = self.proxy.write_config(project, domains).await?;
        sink.info(&format!("Proxy configuration written to {}", path.display()))
            .await;

        match self.proxy.reload().await {
            Ok(()) => sink.info("Proxy reloaded").await,
            Err(e) => {
                warn!("Proxy reload failed for project {}: {}", project.id, e);
                sink.warn(&format!("Proxy reload failed: {}", e)).await;
            }
        }
        Ok(())
    }

    async fn verify_certificate(&self, domain: &Domain, sink: &StoreSink) {
        sink.info(&format!(
            "Waiting {}s for the TLS certificate of {}...",
            self.options.certificate_wait.as_secs(),
            domain.domain
        ))
        .await;
        tokio::time::sleep(self.options.certificate_wait).await;

        match self.http.head(&format!("https://{}", domain.domain)).await {
            Ok(()) => {
                sink.info(&format!("Your app is now live at: https://{}", domain.domain))
                    .await
            }
            Err(e) => {
                debug!("TLS probe of {} failed: {}", domain.domain, e);
                sink.warn("TLS certificate not verified yet, it will be issued on first access")
                    .await;
            }
        }
    }
}

fn finish(deployment: &mut Deployment) {
    let now = Utc::now();
    let started = deployment.started_at.unwrap_or(deployment.created_at);
    deployment.completed_at = Some(now);
    deployment.duration_secs = Some((now - started).num_seconds().max(0) as u64);
}
