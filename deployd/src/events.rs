//! Deployment event bus
//!
//! Status changes and build log lines are broadcast to whoever is listening (the
//! panel's push channel). Publishing never blocks or fails the pipeline: with no
//! subscribers the event is simply dropped.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::models::build_log::BuildLogLevel;
use crate::models::deployment::DeploymentStatus;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum DeploymentEvent {
    DeploymentStatus {
        deployment_id: u64,
        project_id: u64,
        status: DeploymentStatus,
    },
    BuildLog {
        deployment_id: u64,
        project_id: u64,
        level: BuildLogLevel,
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DeploymentEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeploymentEvent> {
        self.sender.subscribe()
    }

    /// Publish an event, fire-and-forget
    pub fn publish(&self, event: DeploymentEvent) {
        if self.sender.send(event).is_err() {
            trace!("No event subscribers");
        }
    }

    pub fn status(&self, deployment_id: u64, project_id: u64, status: DeploymentStatus) {
        self.publish(DeploymentEvent::DeploymentStatus {
            deployment_id,
            project_id,
            status,
        });
    }

    pub fn log(&self, deployment_id: u64, project_id: u64, level: BuildLogLevel, message: &str) {
        self.publish(DeploymentEvent::BuildLog {
            deployment_id,
            project_id,
            level,
            message: message.to_string(),
        });
    }
}
