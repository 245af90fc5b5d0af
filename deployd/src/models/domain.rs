//! Domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A hostname bound to a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    pub id: u64,

    pub project_id: u64,

    pub domain: String,

    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(default = "default_true")]
    pub ssl_enabled: bool,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Domain {
    /// An active, TLS-enabled domain; the store assigns the id
    pub fn active(project_id: u64, domain: &str) -> Self {
        Self {
            id: 0,
            project_id,
            domain: domain.to_string(),
            is_active: true,
            ssl_enabled: true,
            created_at: Utc::now(),
        }
    }

    /// Public URL of the domain
    pub fn url(&self) -> String {
        let scheme = if self.ssl_enabled { "https" } else { "http" };
        format!("{}://{}", scheme, self.domain)
    }
}
