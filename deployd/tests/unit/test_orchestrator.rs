//! Orchestrator tests against in-process fakes

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::Notify;
use tokio_test::assert_ok;

use deployd::deploy::compose::{FRONTEND_SERVICE, POCKETBASE_SERVICE};
use deployd::errors::EngineError;
use deployd::events::DeploymentEvent;
use deployd::deploy::recipe::GENERATED_MARKER;
use deployd::models::deployment::{Deployment, DeploymentStatus, TriggerSource};
use deployd::models::environment::Environment;
use deployd::models::project::{BackendState, Project, ProjectStatus};

use crate::support::{
    log_messages, wait_for_terminal, wait_for_unlock, HarnessBuilder, BASE_DOMAIN, COMMIT_HASH,
    NEXT_APP, NEXT_WITH_POCKETBASE,
};

fn shop() -> Project {
    let mut project = Project::new(0, "My Shop", "https://github.com/acme/shop.git");
    project.frontend_port = 3000;
    project
}

fn manual(project: &Project) -> Deployment {
    Deployment::pending(project.id, &project.git_branch, TriggerSource::Manual)
}

async fn wait_for_status(
    store: &Arc<dyn deployd::store::Store>,
    deployment_id: u64,
    status: DeploymentStatus,
) {
    for _ in 0..500 {
        if store.get_deployment(deployment_id).await.unwrap().status == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("deployment {} never reached {}", deployment_id, status);
}

#[tokio::test]
async fn test_first_deploy_of_single_service_project() {
    let harness = HarnessBuilder::new(NEXT_APP).build();
    let project = harness.add_project(shop()).await;
    let mut events = harness.events.subscribe();

    let queued = harness.orchestrator.trigger(manual(&project)).await.unwrap();
    assert_eq!(queued.status, DeploymentStatus::Pending);

    let done = wait_for_terminal(&harness.orchestrator, queued.id).await;
    assert_eq!(done.status, DeploymentStatus::Success);
    assert_eq!(done.commit_hash, COMMIT_HASH);
    assert_eq!(done.commit_author, "Dana");
    assert!(done.started_at.is_some());
    assert!(done.completed_at.is_some());
    assert!(done.duration_secs.is_some());
    assert!(done.error_message.is_none());

    let mut statuses = Vec::new();
    loop {
        match events.try_recv() {
            Ok(DeploymentEvent::DeploymentStatus { status, .. }) => statuses.push(status),
            Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    assert_eq!(
        statuses,
        vec![
            DeploymentStatus::Pending,
            DeploymentStatus::Building,
            DeploymentStatus::Deploying,
            DeploymentStatus::Success,
        ]
    );

    let expected_domain = format!("my-shop-{}.{}", project.id, BASE_DOMAIN);
    let domains = harness.store.list_domains(project.id).await.unwrap();
    assert_eq!(domains.len(), 1);
    assert_eq!(domains[0].domain, expected_domain);

    let site = std::fs::read_to_string(harness.site_file(&project)).unwrap();
    assert!(site.contains(&expected_domain));
    assert!(site.contains("reverse_proxy 127.0.0.1:3000"));

    assert!(harness.checkout(&project).join("Dockerfile").exists());
    assert!(harness.checkout(&project).join(".env").exists());
    assert!(harness.runtime.is_running(&project.container_name()));
    assert_eq!(
        harness.runtime.calls(),
        vec![
            format!("build {}", project.image_tag()),
            format!("rm {}", project.container_name()),
            format!("create {}", project.container_name()),
            format!("start {}", project.container_name()),
        ]
    );

    let stored = harness.store.get_project(project.id).await.unwrap();
    assert_eq!(stored.status, ProjectStatus::Active);
    assert!(stored.last_deployed_at.is_some());
    // Detection results are not written back
    assert!(stored.framework.is_none());

    let logs = log_messages(&harness.store, queued.id).await;
    assert!(logs.iter().any(|l| l == &format!("Auto-generated domain: {}", expected_domain)));
    assert!(logs.iter().any(|l| l == "Deployment completed successfully!"));
}

#[tokio::test]
async fn test_busy_port_is_reassigned_and_persisted() {
    let harness = HarnessBuilder::new(NEXT_APP).busy_ports(&[3000]).build();
    let project = harness.add_project(shop()).await;

    let queued = harness.orchestrator.trigger(manual(&project)).await.unwrap();
    let done = wait_for_terminal(&harness.orchestrator, queued.id).await;
    assert_eq!(done.status, DeploymentStatus::Success);

    let stored = harness.store.get_project(project.id).await.unwrap();
    assert_eq!(stored.frontend_port, 3001);

    let site = std::fs::read_to_string(harness.site_file(&project)).unwrap();
    assert!(site.contains("reverse_proxy 127.0.0.1:3001"));

    let logs = log_messages(&harness.store, queued.id).await;
    assert!(logs
        .iter()
        .any(|l| l == "Automatically assigned frontend port: 3001"));
}

#[tokio::test]
async fn test_redeploy_keeps_port_held_by_own_container() {
    let harness = HarnessBuilder::new(NEXT_APP).build();
    let project = harness.add_project(shop()).await;

    let first = harness.orchestrator.trigger(manual(&project)).await.unwrap();
    wait_for_terminal(&harness.orchestrator, first.id).await;

    // The running container now holds the port
    harness.probe.occupy(3000);

    let second = harness.orchestrator.trigger(manual(&project)).await.unwrap();
    let done = wait_for_terminal(&harness.orchestrator, second.id).await;
    assert_eq!(done.status, DeploymentStatus::Success);
    assert_eq!(
        harness.store.get_project(project.id).await.unwrap().frontend_port,
        3000
    );
    let logs = log_messages(&harness.store, second.id).await;
    assert!(!logs.iter().any(|l| l.starts_with("Automatically assigned")));
    // Only one generated domain across deployments
    assert_eq!(harness.store.list_domains(project.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_bundled_backend_first_deploy_and_frontend_only_redeploy() {
    let harness = HarnessBuilder::new(NEXT_WITH_POCKETBASE).build();
    let mut notes = Project::new(0, "Notes", "https://github.com/acme/notes.git");
    notes.frontend_port = 3000;
    let project = harness.add_project(notes).await;

    let first = harness.orchestrator.trigger(manual(&project)).await.unwrap();
    let done = wait_for_terminal(&harness.orchestrator, first.id).await;
    assert_eq!(done.status, DeploymentStatus::Success, "{:?}", done.error_message);

    let stored = harness.store.get_project(project.id).await.unwrap();
    assert_eq!(stored.backend_state, BackendState::Initialized);
    assert_eq!(stored.backend_version.as_deref(), Some("0.30.0"));
    assert_eq!(stored.backend_port, 8080);
    let key = stored.backend_encryption_key.clone().unwrap();
    assert_eq!(key.len(), 64);

    let checkout = harness.checkout(&project);
    assert!(checkout.join("docker-compose.yml").exists());
    assert!(checkout.join("Dockerfile.pocketbase").exists());
    let live_data = harness.live_data(&project);
    assert!(live_data.is_dir());
    let compose = std::fs::read_to_string(checkout.join("docker-compose.yml")).unwrap();
    assert!(compose.contains(&format!("{}:/pb/pb_data", live_data.display())));
    let env = std::fs::read_to_string(checkout.join(".env")).unwrap();
    assert!(env.contains(&format!("PB_ENCRYPTION_KEY={}", key)));

    assert_eq!(
        harness.runtime.calls(),
        vec!["compose down", "compose build", "compose up"]
    );
    let backend = project.service_container_name(POCKETBASE_SERVICE);
    assert!(harness.runtime.is_running(&backend));

    let site = std::fs::read_to_string(harness.site_file(&project)).unwrap();
    assert!(site.contains("handle /api/* {"));
    assert!(site.contains("reverse_proxy 127.0.0.1:8080"));

    harness.runtime.clear_calls();
    std::fs::write(live_data.join("data.db"), "users and orders").unwrap();

    let second = harness.orchestrator.trigger(manual(&project)).await.unwrap();
    let done = wait_for_terminal(&harness.orchestrator, second.id).await;
    assert_eq!(done.status, DeploymentStatus::Success, "{:?}", done.error_message);

    assert_eq!(
        harness.runtime.calls(),
        vec![
            format!("compose build {}", FRONTEND_SERVICE),
            format!("compose restart {}", FRONTEND_SERVICE),
        ]
    );
    assert!(harness.runtime.is_running(&backend));
    let stored = harness.store.get_project(project.id).await.unwrap();
    assert_eq!(stored.backend_encryption_key.as_deref(), Some(key.as_str()));
    let env = std::fs::read_to_string(checkout.join(".env")).unwrap();
    assert_eq!(env.matches("PB_ENCRYPTION_KEY=").count(), 1);
    assert_eq!(
        std::fs::read_to_string(live_data.join("data.db")).unwrap(),
        "users and orders"
    );
}

#[tokio::test]
async fn test_build_failure_marks_deployment_failed() {
    let harness = HarnessBuilder::new(NEXT_APP).build();
    harness.runtime.fail_builds();
    let project = harness.add_project(shop()).await;

    let queued = harness.orchestrator.trigger(manual(&project)).await.unwrap();
    let done = wait_for_terminal(&harness.orchestrator, queued.id).await;

    assert_eq!(done.status, DeploymentStatus::Failed);
    assert!(done.error_message.unwrap().contains("COPY failed"));
    assert!(done.completed_at.is_some());
    assert!(!harness.runtime.is_running(&project.container_name()));

    let logs = log_messages(&harness.store, queued.id).await;
    assert!(logs.iter().any(|l| l.starts_with("Deployment failed:")));
    assert_eq!(
        harness.store.get_project(project.id).await.unwrap().status,
        ProjectStatus::Inactive
    );
}

#[tokio::test]
async fn test_port_conflict_at_start_removes_container() {
    let harness = HarnessBuilder::new(NEXT_APP).build();
    harness.runtime.fail_start(true);
    let project = harness.add_project(shop()).await;

    let queued = harness.orchestrator.trigger(manual(&project)).await.unwrap();
    let done = wait_for_terminal(&harness.orchestrator, queued.id).await;

    assert_eq!(done.status, DeploymentStatus::Failed);
    let message = done.error_message.unwrap();
    assert!(message.contains("port 3000 is already in use"), "{}", message);
    assert!(!harness.runtime.has_container(&project.container_name()));
    assert_eq!(
        harness.runtime.calls().last(),
        Some(&format!("rm {}", project.container_name()))
    );
    // Nothing routes to a container that never started
    assert!(!harness.site_file(&project).exists());
}

#[tokio::test]
async fn test_start_failure_keeps_container_for_inspection() {
    let harness = HarnessBuilder::new(NEXT_APP).build();
    harness.runtime.fail_start(false);
    let project = harness.add_project(shop()).await;

    let queued = harness.orchestrator.trigger(manual(&project)).await.unwrap();
    let done = wait_for_terminal(&harness.orchestrator, queued.id).await;

    assert_eq!(done.status, DeploymentStatus::Failed);
    assert!(done
        .error_message
        .unwrap()
        .contains("executable file not found"));
    assert!(harness.runtime.has_container(&project.container_name()));
    assert!(!harness.runtime.is_running(&project.container_name()));
    assert_eq!(
        harness.runtime.calls().last(),
        Some(&format!("start {}", project.container_name()))
    );
}

#[tokio::test]
async fn test_redeploy_picks_up_changed_env_var() {
    let harness = HarnessBuilder::new(NEXT_APP).build();
    let project = harness.add_project(shop()).await;
    let mut var = harness
        .store
        .create_env_var(Environment::new(project.id, "API_URL", "https://v1.example.com"))
        .await
        .unwrap();

    let first = harness.orchestrator.trigger(manual(&project)).await.unwrap();
    let done = wait_for_terminal(&harness.orchestrator, first.id).await;
    assert_eq!(done.status, DeploymentStatus::Success, "{:?}", done.error_message);

    var.value = "https://v2.example.com".to_string();
    harness.store.update_env_var(&var).await.unwrap();

    let second = harness.orchestrator.trigger(manual(&project)).await.unwrap();
    let done = wait_for_terminal(&harness.orchestrator, second.id).await;
    assert_eq!(done.status, DeploymentStatus::Success, "{:?}", done.error_message);

    let env = std::fs::read_to_string(harness.checkout(&project).join(".env")).unwrap();
    assert!(env.contains("API_URL=https://v2.example.com\n"));
    assert!(!env.contains("v1.example.com"));
    assert_eq!(env.matches("DEPLOYMENT_URL=").count(), 1);

    let dockerfile = std::fs::read_to_string(harness.checkout(&project).join("Dockerfile")).unwrap();
    assert!(dockerfile.starts_with(GENERATED_MARKER));
    let logs = log_messages(&harness.store, second.id).await;
    assert!(!logs.iter().any(|l| l == "Using Dockerfile from repository"));
}

#[tokio::test]
async fn test_missing_base_domain_fails_deployment() {
    let harness = HarnessBuilder::new(NEXT_APP).base_domain("").build();
    let project = harness.add_project(shop()).await;

    let queued = harness.orchestrator.trigger(manual(&project)).await.unwrap();
    let done = wait_for_terminal(&harness.orchestrator, queued.id).await;

    assert_eq!(done.status, DeploymentStatus::Failed);
    assert!(done.error_message.unwrap().contains("PANEL_DOMAIN"));
    assert!(harness.runtime.calls().is_empty());
}

#[tokio::test]
async fn test_second_trigger_while_deploying_is_rejected() {
    let gate = Arc::new(Notify::new());
    let harness = HarnessBuilder::new(NEXT_APP).gate(Arc::clone(&gate)).build();
    let project = harness.add_project(shop()).await;

    let first = harness.orchestrator.trigger(manual(&project)).await.unwrap();
    assert!(harness.orchestrator.is_deploying(project.id));

    let second = harness.orchestrator.trigger(manual(&project)).await;
    assert!(matches!(second, Err(EngineError::DeploymentInProgress(id)) if id == project.id));
    assert_eq!(
        harness.store.list_deployments(project.id).await.unwrap().len(),
        1
    );

    gate.notify_one();
    let done = wait_for_terminal(&harness.orchestrator, first.id).await;
    assert_eq!(done.status, DeploymentStatus::Success);
}

#[tokio::test]
async fn test_cancel_while_building_stops_pipeline() {
    let gate = Arc::new(Notify::new());
    let harness = HarnessBuilder::new(NEXT_APP).gate(Arc::clone(&gate)).build();
    let project = harness.add_project(shop()).await;

    let queued = harness.orchestrator.trigger(manual(&project)).await.unwrap();
    wait_for_status(&harness.store, queued.id, DeploymentStatus::Building).await;

    let cancelled = harness.orchestrator.cancel(queued.id).await.unwrap();
    assert_eq!(cancelled.status, DeploymentStatus::Cancelled);
    assert!(cancelled.completed_at.is_some());

    gate.notify_one();
    wait_for_unlock(&harness.orchestrator, project.id).await;

    let stored = harness.store.get_deployment(queued.id).await.unwrap();
    assert_eq!(stored.status, DeploymentStatus::Cancelled);
    assert!(stored.error_message.is_none());
    assert!(harness.runtime.calls().is_empty());

    let logs = log_messages(&harness.store, queued.id).await;
    assert!(logs.iter().any(|l| l == "Deployment cancelled by user"));
    assert!(!logs.iter().any(|l| l.starts_with("Deployment failed")));
}

#[tokio::test]
async fn test_finished_deployment_cannot_be_cancelled() {
    let harness = HarnessBuilder::new(NEXT_APP).build();
    let project = harness.add_project(shop()).await;

    let queued = harness.orchestrator.trigger(manual(&project)).await.unwrap();
    wait_for_terminal(&harness.orchestrator, queued.id).await;

    let result = harness.orchestrator.cancel(queued.id).await;
    assert!(matches!(result, Err(EngineError::ValidationError(_))));
    assert_eq!(
        harness.store.get_deployment(queued.id).await.unwrap().status,
        DeploymentStatus::Success
    );
}

#[tokio::test]
async fn test_deploy_runs_on_current_task() {
    let harness = HarnessBuilder::new(NEXT_APP).build();
    let project = harness.add_project(shop()).await;
    let mut deployment = manual(&project);
    deployment.branch = "release".to_string();
    let deployment = harness.store.create_deployment(deployment).await.unwrap();

    assert_ok!(harness.orchestrator.deploy(deployment.id).await);
    assert!(!harness.orchestrator.is_deploying(project.id));

    let requests = harness.fetcher.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].git_ref, "release");
    assert_eq!(requests[0].url, "https://github.com/acme/shop.git");
}

#[tokio::test]
async fn test_root_directory_outside_repository_is_rejected() {
    let harness = HarnessBuilder::new(NEXT_APP).build();
    let mut project = shop();
    project.root_directory = "../elsewhere".to_string();
    let project = harness.add_project(project).await;

    let queued = harness.orchestrator.trigger(manual(&project)).await.unwrap();
    let done = wait_for_terminal(&harness.orchestrator, queued.id).await;
    assert_eq!(done.status, DeploymentStatus::Failed);
    assert!(done.error_message.unwrap().contains("escapes the repository"));
}
