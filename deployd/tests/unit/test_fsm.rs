//! FSM unit tests

use deployd::deploy::fsm::{DeploymentEvent, DeploymentFsm};
use deployd::models::deployment::DeploymentStatus;

#[test]
fn test_fsm_initial_state() {
    let fsm = DeploymentFsm::new();
    assert_eq!(fsm.state(), DeploymentStatus::Pending);
    assert!(fsm.error().is_none());
    assert!(fsm.can_cancel());
}

#[test]
fn test_fsm_deploy_success_flow() {
    let mut fsm = DeploymentFsm::new();

    // Pending -> Building
    fsm.process(DeploymentEvent::Build).unwrap();
    assert_eq!(fsm.state(), DeploymentStatus::Building);

    // Building -> Deploying
    fsm.process(DeploymentEvent::Deploy).unwrap();
    assert_eq!(fsm.state(), DeploymentStatus::Deploying);
    assert!(!fsm.can_cancel());

    // Deploying -> Success
    fsm.process(DeploymentEvent::Succeed).unwrap();
    assert_eq!(fsm.state(), DeploymentStatus::Success);
}

#[test]
fn test_fsm_deploy_failure_flow() {
    let mut fsm = DeploymentFsm::new();

    fsm.process(DeploymentEvent::Build).unwrap();
    fsm.process(DeploymentEvent::Fail("test error".to_string()))
        .unwrap();

    assert_eq!(fsm.state(), DeploymentStatus::Failed);
    assert_eq!(fsm.error(), Some("test error"));
}

#[test]
fn test_fsm_cancel_only_before_deploying() {
    let mut fsm = DeploymentFsm::new();
    fsm.process(DeploymentEvent::Build).unwrap();
    assert_eq!(
        fsm.process(DeploymentEvent::Cancel).unwrap(),
        DeploymentStatus::Cancelled
    );

    let mut fsm = DeploymentFsm::from_status(DeploymentStatus::Deploying);
    assert!(fsm.process(DeploymentEvent::Cancel).is_err());
    assert_eq!(fsm.state(), DeploymentStatus::Deploying);
}

#[test]
fn test_fsm_invalid_transition() {
    let mut fsm = DeploymentFsm::new();

    // Cannot succeed without building
    let result = fsm.process(DeploymentEvent::Succeed);
    assert!(result.is_err());

    // Cancelled deployments stay cancelled
    let mut fsm = DeploymentFsm::from_status(DeploymentStatus::Cancelled);
    assert!(fsm.process(DeploymentEvent::Deploy).is_err());
}
