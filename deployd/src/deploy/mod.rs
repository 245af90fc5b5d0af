//! Deployment pipeline
//!
//! Building blocks for fetching, detecting, building and releasing a project,
//! tied together by [`orchestrator::Orchestrator`].

pub mod backend;
pub mod compose;
pub mod detector;
pub mod docker;
pub mod domain;
pub mod envfile;
pub mod fsm;
pub mod git;
pub mod lock;
pub mod orchestrator;
pub mod ports;
pub mod proxy;
pub mod recipe;
pub mod sink;
pub mod sveltekit;

pub use orchestrator::{Collaborators, Orchestrator, OrchestratorOptions};
