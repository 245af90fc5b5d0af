//! Build log sinks

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::events::EventBus;
use crate::models::build_log::{BuildLog, BuildLogLevel};
use crate::store::Store;

/// Receives human readable pipeline and builder output
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn log(&self, level: BuildLogLevel, message: &str);

    async fn info(&self, message: &str) {
        self.log(BuildLogLevel::Info, message).await
    }

    async fn warn(&self, message: &str) {
        self.log(BuildLogLevel::Warning, message).await
    }

    async fn error(&self, message: &str) {
        self.log(BuildLogLevel::Error, message).await
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl LogSink for NullSink {
    async fn log(&self, _level: BuildLogLevel, _message: &str) {}
}

/// Persists every line as a [`BuildLog`] and broadcasts it
pub struct StoreSink {
    store: Arc<dyn Store>,
    events: EventBus,
    deployment_id: u64,
    project_id: u64,
}

impl StoreSink {
    pub fn new(store: Arc<dyn Store>, events: EventBus, deployment_id: u64, project_id: u64) -> Self {
        Self {
            store,
            events,
            deployment_id,
            project_id,
        }
    }
}

#[async_trait]
impl LogSink for StoreSink {
    async fn log(&self, level: BuildLogLevel, message: &str) {
        debug!("[deployment {}] {}", self.deployment_id, message);
        let entry = BuildLog::new(self.deployment_id, level, message);
        if let Err(e) = self.store.append_log(entry).await {
            warn!("Failed to persist build log for deployment {}: {}", self.deployment_id, e);
        }
        self.events
            .log(self.deployment_id, self.project_id, level, message);
    }
}

/// Collects lines in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(BuildLogLevel, String)>>,
}

impl MemorySink {
    pub fn lines(&self) -> Vec<(BuildLogLevel, String)> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|(_, line)| line.contains(needle))
    }
}

#[async_trait]
impl LogSink for MemorySink {
    async fn log(&self, level: BuildLogLevel, message: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((level, message.to_string()));
        }
    }
}
