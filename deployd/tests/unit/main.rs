//! Integration tests

mod support;
mod test_fsm;
mod test_git;
mod test_orchestrator;
mod test_webhook;
