//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::credentials::{CredentialResolver, StaticCredentials};
use crate::deploy::backend::ReleaseFeed;
use crate::deploy::docker::{ContainerRuntime, DockerCli};
use crate::deploy::git::GitFetcher;
use crate::deploy::ports::{PortAllocator, TcpProbe};
use crate::deploy::proxy::CaddyProxy;
use crate::deploy::{Collaborators, Orchestrator};
use crate::errors::EngineError;
use crate::events::EventBus;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::http::client::HttpClient;
use crate::store::{MemoryStore, Store};
use crate::webhook::WebhookGateway;

/// Main application state
pub struct AppState {
    pub store: Arc<dyn Store>,

    pub events: EventBus,

    /// Outbound HTTP for provider APIs, release feed and TLS probes
    pub http_client: Arc<HttpClient>,

    pub runtime: Arc<dyn ContainerRuntime>,

    pub orchestrator: Arc<Orchestrator>,

    pub gateway: Arc<WebhookGateway>,
}

impl AppState {
    /// Wire the production collaborators
    pub async fn init(options: &AppOptions) -> Result<Self, EngineError> {
        info!("Initializing application state...");

        options.storage.layout.setup().await?;
        Dir::new(&options.projects_dir).create().await?;

        let store: Arc<dyn Store> =
            Arc::new(MemoryStore::open(File::new(&options.storage.data_file)).await?);
        let http_client = Arc::new(HttpClient::new(options.http_timeout)?);
        let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerCli::new(&options.docker_binary));
        let credentials: Arc<dyn CredentialResolver> = Arc::new(StaticCredentials);

        let collaborators = Collaborators {
            store: Arc::clone(&store),
            events: EventBus::new(),
            credentials: Arc::clone(&credentials),
            fetcher: Arc::new(GitFetcher::new(&options.projects_dir)),
            runtime: Arc::clone(&runtime),
            ports: PortAllocator::new(Arc::new(TcpProbe)),
            proxy: CaddyProxy::new(options.caddy.clone()),
            releases: ReleaseFeed::new(Arc::clone(&http_client), &options.release_feed_url),
            http: Arc::clone(&http_client),
        };

        Ok(Self::assemble(
            collaborators,
            options,
            credentials,
            runtime,
        ))
    }

    /// Build the state around already constructed collaborators
    pub fn assemble(
        collaborators: Collaborators,
        options: &AppOptions,
        credentials: Arc<dyn CredentialResolver>,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Self {
        let store = Arc::clone(&collaborators.store);
        let events = collaborators.events.clone();
        let http_client = Arc::clone(&collaborators.http);

        let orchestrator = Arc::new(Orchestrator::new(
            collaborators,
            options.orchestrator.clone(),
        ));
        let gateway = Arc::new(WebhookGateway::new(
            Arc::clone(&orchestrator),
            credentials,
            Arc::clone(&http_client),
            options.provider_endpoints.clone(),
            &options.panel_url,
        ));

        Self {
            store,
            events,
            http_client,
            runtime,
            orchestrator,
            gateway,
        }
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        info!("Shutting down application state...");
        self.runtime.close().await
    }
}
