//! Finite state machine for a deployment's lifecycle
//!
//! ```text
//! pending -> building -> deploying -> success
//!    |          |            |
//!    |          +------------+-> failed
//!    +----------+-> cancelled
//! ```

use crate::models::deployment::DeploymentStatus;

/// Deployment event
#[derive(Debug, Clone)]
pub enum DeploymentEvent {
    /// Pipeline picked up the deployment
    Build,

    /// Image built, containers are being started
    Deploy,

    /// Pipeline completed
    Succeed,

    /// Pipeline aborted with an error
    Fail(String),

    /// User cancelled the deployment
    Cancel,
}

/// Deployment FSM
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    state: DeploymentStatus,
    error: Option<String>,
}

impl DeploymentFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self::from_status(DeploymentStatus::Pending)
    }

    /// Resume from a stored status
    pub fn from_status(state: DeploymentStatus) -> Self {
        Self { state, error: None }
    }

    pub fn state(&self) -> DeploymentStatus {
        self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether a user may still cancel the deployment
    pub fn can_cancel(&self) -> bool {
        matches!(self.state, DeploymentStatus::Pending | DeploymentStatus::Building)
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeploymentEvent) -> Result<DeploymentStatus, String> {
        let new_state = match (self.state, &event) {
            (DeploymentStatus::Pending, DeploymentEvent::Build) => DeploymentStatus::Building,

            (DeploymentStatus::Building, DeploymentEvent::Deploy) => DeploymentStatus::Deploying,

            (DeploymentStatus::Deploying, DeploymentEvent::Succeed) => DeploymentStatus::Success,

            (
                DeploymentStatus::Pending | DeploymentStatus::Building | DeploymentStatus::Deploying,
                DeploymentEvent::Fail(err),
            ) => {
                self.error = Some(err.clone());
                DeploymentStatus::Failed
            }

            (DeploymentStatus::Pending | DeploymentStatus::Building, DeploymentEvent::Cancel) => {
                DeploymentStatus::Cancelled
            }

            (state, event) => {
                return Err(format!("Invalid transition: {} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(new_state)
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}
