//! Server state

use std::sync::Arc;

use crate::deploy::Orchestrator;
use crate::store::Store;
use crate::webhook::WebhookGateway;

/// Server state shared across handlers
pub struct ServerState {
    pub orchestrator: Arc<Orchestrator>,
    pub gateway: Arc<WebhookGateway>,
}

impl ServerState {
    pub fn new(orchestrator: Arc<Orchestrator>, gateway: Arc<WebhookGateway>) -> Self {
        Self {
            orchestrator,
            gateway,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        self.orchestrator.store()
    }
}
