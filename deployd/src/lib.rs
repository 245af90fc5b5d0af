//! deployd library
//!
//! Deployment engine of a self-hosted hosting panel: fetches a project's
//! repository, detects how to build it, runs it in containers and routes its
//! domains through Caddy.

pub mod app;
pub mod credentials;
pub mod deploy;
pub mod errors;
pub mod events;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod models;
pub mod server;
pub mod storage;
pub mod store;
pub mod utils;
pub mod webhook;
