//! Git provider integration: push webhooks and hook registration

pub mod gateway;
pub mod payload;
pub mod provider;

pub use gateway::{WebhookAck, WebhookGateway};
pub use provider::Provider;
