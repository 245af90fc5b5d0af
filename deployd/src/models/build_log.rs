//! Build log models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a build log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildLogLevel {
    Info,
    Warning,
    Error,
}

/// A timestamped line of orchestration output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildLog {
    pub id: u64,
    pub deployment_id: u64,
    pub level: BuildLogLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl BuildLog {
    pub fn new(deployment_id: u64, level: BuildLogLevel, message: &str) -> Self {
        Self {
            id: 0,
            deployment_id,
            level,
            message: message.to_string(),
            created_at: Utc::now(),
        }
    }
}
