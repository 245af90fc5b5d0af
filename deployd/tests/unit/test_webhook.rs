//! Webhook gateway tests

use deployd::errors::EngineError;
use deployd::models::deployment::{DeploymentStatus, TriggerSource};
use deployd::models::project::Project;
use deployd::webhook::provider::{sign_payload, Provider};

use crate::support::{wait_for_terminal, Harness, HarnessBuilder, NEXT_APP};

const SECRET: &str = "whsec-7d1f0c";

fn push_body(branch: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "ref": format!("refs/heads/{}", branch),
        "head_commit": {
            "id": "4b825dc642cb6eb9a060e54bf8d69288fbee4904",
            "message": "Fix cart totals",
            "author": {"name": "Robin"}
        }
    }))
    .unwrap()
}

async fn auto_deploy_project(harness: &Harness) -> Project {
    let mut project = Project::new(0, "Storefront", "https://github.com/acme/storefront.git");
    project.frontend_port = 3000;
    project.auto_deploy = true;
    project.webhook_secret = SECRET.to_string();
    project.git_provider = Some(Provider::GitHub);
    harness.add_project(project).await
}

#[tokio::test]
async fn test_signed_push_triggers_deployment() {
    let harness = HarnessBuilder::new(NEXT_APP).build();
    let state = harness.app_state("https://panel.example.com");
    let project = auto_deploy_project(&harness).await;

    let body = push_body("main");
    let signature = sign_payload(&body, SECRET);
    let ack = state
        .gateway
        .handle_push(Provider::GitHub, project.id, &signature, &body)
        .await
        .unwrap();

    assert!(ack.deployed());
    assert_eq!(ack.message, "Deployment triggered");
    assert_eq!(ack.branch, "main");
    assert_eq!(ack.commit, "4b825dc");

    let deployment_id = ack.deployment_id.unwrap();
    let done = wait_for_terminal(&state.orchestrator, deployment_id).await;
    assert_eq!(done.status, DeploymentStatus::Success);
    assert_eq!(done.triggered_by, TriggerSource::Webhook(Provider::GitHub));
}

#[tokio::test]
async fn test_tampered_body_is_rejected() {
    let harness = HarnessBuilder::new(NEXT_APP).build();
    let state = harness.app_state("https://panel.example.com");
    let project = auto_deploy_project(&harness).await;

    let body = push_body("main");
    let signature = sign_payload(&body, SECRET);
    let mut tampered = body.clone();
    tampered[2] ^= 0x01;

    let result = state
        .gateway
        .handle_push(Provider::GitHub, project.id, &signature, &tampered)
        .await;
    assert!(matches!(result, Err(EngineError::WebhookSignatureError(_))));
    assert!(harness
        .store
        .list_deployments(project.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_push_to_other_branch_is_ignored() {
    let harness = HarnessBuilder::new(NEXT_APP).build();
    let state = harness.app_state("https://panel.example.com");
    let project = auto_deploy_project(&harness).await;

    let body = push_body("develop");
    let signature = sign_payload(&body, SECRET);
    let ack = state
        .gateway
        .handle_push(Provider::GitHub, project.id, &signature, &body)
        .await
        .unwrap();

    assert!(!ack.deployed());
    assert_eq!(
        ack.message,
        "Push to develop ignored. Auto-deploy configured for main"
    );
    assert!(harness
        .store
        .list_deployments(project.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_auto_deploy_branch_overrides_project_branch() {
    let harness = HarnessBuilder::new(NEXT_APP).build();
    let state = harness.app_state("https://panel.example.com");
    let mut project = auto_deploy_project(&harness).await;
    project.auto_deploy_branch = "production".to_string();
    harness.store.update_project(&project).await.unwrap();

    let body = push_body("main");
    let ack = state
        .gateway
        .handle_push(Provider::GitHub, project.id, &sign_payload(&body, SECRET), &body)
        .await
        .unwrap();
    assert!(!ack.deployed());
    assert!(ack.message.ends_with("configured for production"));
}

#[tokio::test]
async fn test_disabled_auto_deploy_is_acknowledged() {
    let harness = HarnessBuilder::new(NEXT_APP).build();
    let state = harness.app_state("https://panel.example.com");
    let mut project = auto_deploy_project(&harness).await;
    project.auto_deploy = false;
    harness.store.update_project(&project).await.unwrap();

    let body = push_body("main");
    let ack = state
        .gateway
        .handle_push(Provider::GitHub, project.id, "", &body)
        .await
        .unwrap();
    assert!(!ack.deployed());
    assert_eq!(ack.message, "Auto-deploy is disabled for this project");
}

#[tokio::test]
async fn test_gitlab_token_must_match_secret() {
    let harness = HarnessBuilder::new(NEXT_APP).build();
    let state = harness.app_state("https://panel.example.com");
    let project = auto_deploy_project(&harness).await;

    let body = serde_json::to_vec(&serde_json::json!({
        "ref": "refs/heads/main",
        "commits": [{"id": "e83c5163316f89bfbde7d9ab23ca2e25604af290", "message": "init", "author": {"name": "Sam"}}]
    }))
    .unwrap();

    let result = state
        .gateway
        .handle_push(Provider::GitLab, project.id, "wrong-token", &body)
        .await;
    assert!(matches!(result, Err(EngineError::WebhookSignatureError(_))));

    let ack = state
        .gateway
        .handle_push(Provider::GitLab, project.id, SECRET, &body)
        .await
        .unwrap();
    assert_eq!(ack.commit, "e83c516");
    wait_for_terminal(&state.orchestrator, ack.deployment_id.unwrap()).await;
}

#[tokio::test]
async fn test_unknown_project_is_not_found() {
    let harness = HarnessBuilder::new(NEXT_APP).build();
    let state = harness.app_state("https://panel.example.com");

    let body = push_body("main");
    let result = state
        .gateway
        .handle_push(Provider::GitHub, 404, &sign_payload(&body, SECRET), &body)
        .await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn test_hook_url_requires_panel_url() {
    let harness = HarnessBuilder::new(NEXT_APP).build();

    let state = harness.app_state("https://panel.example.com/");
    assert_eq!(
        state.gateway.hook_url(Provider::Gitea, 12).unwrap(),
        "https://panel.example.com/api/v1/webhooks/gitea/12"
    );

    let state = harness.app_state("");
    let mut project = auto_deploy_project(&harness).await;
    project.git_token = "ghp_0123456789abcdef".to_string();
    harness.store.update_project(&project).await.unwrap();
    let result = state.gateway.register(project.id).await;
    assert!(matches!(result, Err(EngineError::ConfigError(_))));
}
