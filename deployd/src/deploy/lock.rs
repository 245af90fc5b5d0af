//! Per-project deployment locks

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::debug;

/// Set of projects with a deployment in flight
#[derive(Debug, Default, Clone)]
pub struct ProjectLocks {
    held: Arc<Mutex<HashSet<u64>>>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `project_id`, or `None` if it is already held
    pub fn try_acquire(&self, project_id: u64) -> Option<ProjectGuard> {
        let mut held = self.held.lock().ok()?;
        if !held.insert(project_id) {
            return None;
        }
        debug!("Acquired deployment lock for project {}", project_id);
        Some(ProjectGuard {
            project_id,
            held: Arc::clone(&self.held),
        })
    }

    pub fn is_locked(&self, project_id: u64) -> bool {
        self.held
            .lock()
            .map(|held| held.contains(&project_id))
            .unwrap_or(false)
    }
}

/// Releases the project's lock when dropped
#[derive(Debug)]
pub struct ProjectGuard {
    project_id: u64,
    held: Arc<Mutex<HashSet<u64>>>,
}

impl ProjectGuard {
    pub fn project_id(&self) -> u64 {
        self.project_id
    }
}

impl Drop for ProjectGuard {
    fn drop(&mut self) {
        if let Ok(mut held) = self.held.lock() {
            held.remove(&self.project_id);
        }
        debug!("Released deployment lock for project {}", self.project_id);
    }
}
