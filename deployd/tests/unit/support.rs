//! Shared fixtures: in-process fakes for the container engine and git

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Notify;

use deployd::app::options::AppOptions;
use deployd::app::state::AppState;
use deployd::credentials::{CredentialResolver, StaticCredentials};
use deployd::deploy::backend::ReleaseFeed;
use deployd::deploy::compose::ComposeFile;
use deployd::deploy::docker::{ComposeTarget, ContainerRuntime, ContainerSpec, COMPOSE_FILE};
use deployd::deploy::git::{CommitInfo, FetchRequest, Fetcher};
use deployd::deploy::ports::{PortAllocator, StaticProbe};
use deployd::deploy::proxy::{CaddyOptions, CaddyProxy};
use deployd::deploy::sink::LogSink;
use deployd::deploy::{Collaborators, Orchestrator, OrchestratorOptions};
use deployd::errors::EngineError;
use deployd::events::EventBus;
use deployd::http::client::HttpClient;
use deployd::models::deployment::Deployment;
use deployd::models::project::Project;
use deployd::store::{MemoryStore, Store};

pub const BASE_DOMAIN: &str = "apps.example.com";
pub const COMMIT_HASH: &str = "9f2c4e1a7b3d5f60812a4c6e8b0d2f4a6c8e0b1d";

// ================================== RUNTIME ====================================== //

/// How `start_container` fails, when it does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartFailure {
    PortConflict,
    Crash,
}

/// Container engine that records calls and tracks existing and running containers
#[derive(Default)]
pub struct FakeRuntime {
    calls: Mutex<Vec<String>>,
    containers: Mutex<HashSet<String>>,
    running: Mutex<HashSet<String>>,
    fail_builds: Mutex<bool>,
    fail_start: Mutex<Option<StartFailure>>,
}

impl FakeRuntime {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.running.lock().unwrap().contains(name)
    }

    /// Whether a container with this name exists, running or not
    pub fn has_container(&self, name: &str) -> bool {
        self.containers.lock().unwrap().contains(name)
    }

    pub fn fail_builds(&self) {
        *self.fail_builds.lock().unwrap() = true;
    }

    /// Make every container start fail, on a host port bind or otherwise
    pub fn fail_start(&self, port_conflict: bool) {
        let failure = if port_conflict {
            StartFailure::PortConflict
        } else {
            StartFailure::Crash
        };
        *self.fail_start.lock().unwrap() = Some(failure);
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_build(&self) -> Result<(), EngineError> {
        if *self.fail_builds.lock().unwrap() {
            return Err(EngineError::BuildError(
                "COPY failed: file does not exist: build".to_string(),
            ));
        }
        Ok(())
    }

    fn stack_containers(target: &ComposeTarget) -> Vec<String> {
        let raw = std::fs::read_to_string(target.dir.join(COMPOSE_FILE)).unwrap();
        let stack: ComposeFile = serde_yaml::from_str(&raw).unwrap();
        stack
            .services
            .values()
            .map(|s| s.container_name.clone())
            .collect()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn build_image(&self, _context: &Path, tag: &str, sink: &dyn LogSink) -> Result<(), EngineError> {
        self.record(format!("build {}", tag));
        sink.info("Step 1/1 : FROM node").await;
        self.check_build()
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<(), EngineError> {
        self.record(format!("create {}", spec.name));
        self.containers.lock().unwrap().insert(spec.name.clone());
        Ok(())
    }

    async fn start_container(&self, name: &str) -> Result<(), EngineError> {
        self.record(format!("start {}", name));
        match *self.fail_start.lock().unwrap() {
            Some(StartFailure::PortConflict) => Err(EngineError::ContainerStartError(
                "driver failed programming external connectivity: Bind for 127.0.0.1:3000 failed: port is already allocated".to_string(),
            )),
            Some(StartFailure::Crash) => Err(EngineError::ContainerStartError(
                "OCI runtime create failed: exec: \"node\": executable file not found in $PATH".to_string(),
            )),
            None => {
                self.running.lock().unwrap().insert(name.to_string());
                Ok(())
            }
        }
    }

    async fn remove_container(&self, name: &str) -> Result<(), EngineError> {
        self.record(format!("rm {}", name));
        self.containers.lock().unwrap().remove(name);
        self.running.lock().unwrap().remove(name);
        Ok(())
    }

    async fn is_container_running(&self, name: &str) -> bool {
        self.is_running(name)
    }

    async fn compose_down(&self, target: &ComposeTarget) -> Result<(), EngineError> {
        self.record("compose down".to_string());
        let mut running = self.running.lock().unwrap();
        for name in Self::stack_containers(target) {
            running.remove(&name);
        }
        Ok(())
    }

    async fn compose_build(&self, _target: &ComposeTarget, _sink: &dyn LogSink) -> Result<(), EngineError> {
        self.record("compose build".to_string());
        self.check_build()
    }

    async fn compose_build_service(
        &self,
        _target: &ComposeTarget,
        service: &str,
        _sink: &dyn LogSink,
    ) -> Result<(), EngineError> {
        self.record(format!("compose build {}", service));
        self.check_build()
    }

    async fn compose_up(&self, target: &ComposeTarget) -> Result<(), EngineError> {
        self.record("compose up".to_string());
        let mut running = self.running.lock().unwrap();
        running.extend(Self::stack_containers(target));
        Ok(())
    }

    async fn compose_restart_service(&self, _target: &ComposeTarget, service: &str) -> Result<(), EngineError> {
        self.record(format!("compose restart {}", service));
        Ok(())
    }

    async fn close(&self) -> Result<(), EngineError> {
        Ok(())
    }
}

// ================================== FETCHER ====================================== //

/// Fetcher materializing a fixed file tree instead of cloning
pub struct FakeFetcher {
    root: PathBuf,
    files: Vec<(String, String)>,
    gate: Option<Arc<Notify>>,
    pub requests: Mutex<Vec<FetchRequest>>,
}

impl FakeFetcher {
    pub fn new(root: &Path, files: &[(&str, &str)]) -> Self {
        Self {
            root: root.to_path_buf(),
            files: files
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect(),
            gate: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Block every fetch until `gate` is notified
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, key: &str, request: &FetchRequest) -> Result<PathBuf, EngineError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let path = self.root.join(key);
        for (relative, content) in &self.files {
            let file = path.join(relative);
            tokio::fs::create_dir_all(file.parent().unwrap()).await?;
            tokio::fs::write(&file, content).await?;
        }
        Ok(path)
    }

    async fn latest_commit(&self, _path: &Path) -> Result<CommitInfo, EngineError> {
        Ok(CommitInfo {
            hash: COMMIT_HASH.to_string(),
            message: "Add checkout page".to_string(),
            author: "Dana".to_string(),
        })
    }
}

// ================================== FIXTURES ===================================== //

pub const NEXT_APP: &[(&str, &str)] = &[(
    "package.json",
    r#"{"name":"shop","scripts":{"build":"next build","start":"next start"},"dependencies":{"next":"14.2.0","react":"18.3.0"}}"#,
)];

pub const NEXT_WITH_POCKETBASE: &[(&str, &str)] = &[
    (
        "package.json",
        r#"{"name":"notes","scripts":{"build":"next build"},"dependencies":{"next":"14.2.0","pocketbase":"0.21.0"}}"#,
    ),
    ("pb_migrations/1700000000_init.js", "migrate(() => {})"),
];

/// Temp directories, store and fakes behind one orchestrator
pub struct Harness {
    pub tmp: TempDir,
    pub store: Arc<dyn Store>,
    pub events: EventBus,
    pub runtime: Arc<FakeRuntime>,
    pub fetcher: Arc<FakeFetcher>,
    pub probe: Arc<StaticProbe>,
    pub orchestrator: Arc<Orchestrator>,
}

pub struct HarnessBuilder {
    files: &'static [(&'static str, &'static str)],
    base_domain: String,
    busy_ports: Vec<u16>,
    gate: Option<Arc<Notify>>,
}

impl HarnessBuilder {
    pub fn new(files: &'static [(&'static str, &'static str)]) -> Self {
        Self {
            files,
            base_domain: BASE_DOMAIN.to_string(),
            busy_ports: Vec::new(),
            gate: None,
        }
    }

    pub fn base_domain(mut self, base: &str) -> Self {
        self.base_domain = base.to_string();
        self
    }

    pub fn busy_ports(mut self, ports: &[u16]) -> Self {
        self.busy_ports = ports.to_vec();
        self
    }

    pub fn gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn build(self) -> Harness {
        let tmp = TempDir::new().unwrap();
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let events = EventBus::new();
        let runtime = Arc::new(FakeRuntime::default());
        let mut fetcher = FakeFetcher::new(&tmp.path().join("projects"), self.files);
        if let Some(gate) = self.gate {
            fetcher = fetcher.gated(gate);
        }
        let fetcher = Arc::new(fetcher);
        let probe = Arc::new(StaticProbe::with_busy(self.busy_ports));
        let http = Arc::new(HttpClient::new(Duration::from_secs(2)).unwrap());

        let collaborators = Collaborators {
            store: Arc::clone(&store),
            events: events.clone(),
            credentials: Arc::new(StaticCredentials),
            fetcher: fetcher.clone(),
            runtime: runtime.clone(),
            ports: PortAllocator::new(probe.clone()),
            proxy: CaddyProxy::new(CaddyOptions {
                config_dir: tmp.path().join("sites"),
                reload_cmd: "true".to_string(),
                log_dir: tmp.path().join("caddy-logs"),
            }),
            // Nothing listens there, releases fall back to the pinned version
            releases: ReleaseFeed::new(Arc::clone(&http), "http://127.0.0.1:1/releases/latest"),
            http,
        };
        let options = OrchestratorOptions {
            base_domain: self.base_domain,
            data_dir: tmp.path().join("volumes"),
            verify_certificates: false,
            certificate_wait: Duration::ZERO,
            ..Default::default()
        };

        Harness {
            orchestrator: Arc::new(Orchestrator::new(collaborators, options)),
            tmp,
            store,
            events,
            runtime,
            fetcher,
            probe,
        }
    }
}

impl Harness {
    pub async fn add_project(&self, project: Project) -> Project {
        self.store.create_project(project).await.unwrap()
    }

    pub fn site_file(&self, project: &Project) -> PathBuf {
        self.tmp
            .path()
            .join("sites")
            .join(format!("{}.caddy", project.slug()))
    }

    /// Live backend data directory of a project
    pub fn live_data(&self, project: &Project) -> PathBuf {
        self.tmp
            .path()
            .join("volumes")
            .join(format!("project-{}", project.id))
            .join("pb_data")
    }

    pub fn checkout(&self, project: &Project) -> PathBuf {
        self.tmp
            .path()
            .join("projects")
            .join(format!("project-{}", project.id))
    }

    /// Wire the full application state around this harness
    pub fn app_state(&self, panel_url: &str) -> AppState {
        let collaborators_store = Arc::clone(&self.store);
        let http = Arc::new(HttpClient::new(Duration::from_secs(2)).unwrap());
        let credentials: Arc<dyn CredentialResolver> = Arc::new(StaticCredentials);
        let collaborators = Collaborators {
            store: collaborators_store,
            events: self.events.clone(),
            credentials: Arc::clone(&credentials),
            fetcher: self.fetcher.clone(),
            runtime: self.runtime.clone(),
            ports: PortAllocator::new(self.probe.clone()),
            proxy: CaddyProxy::new(CaddyOptions {
                config_dir: self.tmp.path().join("sites"),
                reload_cmd: "true".to_string(),
                log_dir: self.tmp.path().join("caddy-logs"),
            }),
            releases: ReleaseFeed::new(Arc::clone(&http), "http://127.0.0.1:1/releases/latest"),
            http,
        };
        let options = AppOptions {
            panel_url: panel_url.to_string(),
            orchestrator: OrchestratorOptions {
                base_domain: BASE_DOMAIN.to_string(),
                data_dir: self.tmp.path().join("volumes"),
                verify_certificates: false,
                certificate_wait: Duration::ZERO,
                ..Default::default()
            },
            ..Default::default()
        };
        AppState::assemble(collaborators, &options, credentials, self.runtime.clone())
    }
}

/// Wait until the deployment is terminal and its project lock is released
pub async fn wait_for_terminal(orchestrator: &Orchestrator, deployment_id: u64) -> Deployment {
    for _ in 0..500 {
        let deployment = orchestrator.store().get_deployment(deployment_id).await.unwrap();
        if deployment.status.is_terminal() {
            wait_for_unlock(orchestrator, deployment.project_id).await;
            return orchestrator.store().get_deployment(deployment_id).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("deployment {} did not finish", deployment_id);
}

/// Wait until the project lock is released
pub async fn wait_for_unlock(orchestrator: &Orchestrator, project_id: u64) {
    for _ in 0..500 {
        if !orchestrator.is_deploying(project_id) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("project {} is still deploying", project_id);
}

/// Messages logged for a deployment, in order
pub async fn log_messages(store: &Arc<dyn Store>, deployment_id: u64) -> Vec<String> {
    store
        .list_logs(deployment_id)
        .await
        .unwrap()
        .into_iter()
        .map(|l| l.message)
        .collect()
}
