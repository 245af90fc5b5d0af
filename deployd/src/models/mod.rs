//! Data models

pub mod build_log;
pub mod deployment;
pub mod domain;
pub mod environment;
pub mod project;
