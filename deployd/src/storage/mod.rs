//! Engine state on disk

pub mod layout;
pub mod settings;
