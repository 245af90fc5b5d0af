//! Environment variable models

use serde::{Deserialize, Serialize};

/// A project environment variable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub id: u64,
    pub project_id: u64,
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub is_secret: bool,
}

impl Environment {
    pub fn new(project_id: u64, key: &str, value: &str) -> Self {
        Self {
            id: 0,
            project_id,
            key: key.to_string(),
            value: value.to_string(),
            is_secret: false,
        }
    }
}
