//! Git fetcher tests against a local upstream repository

use std::path::Path;
use std::process::Command;

use secrecy::SecretString;

use deployd::credentials::GitCredentials;
use deployd::deploy::git::{FetchRequest, Fetcher, GitFetcher};

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(["-c", "user.name=Ci", "-c", "user.email=ci@example.com"])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git is installed");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn commit_file(repo: &Path, name: &str, content: &str, message: &str) -> String {
    std::fs::write(repo.join(name), content).unwrap();
    git(repo, &["add", "."]);
    git(repo, &["commit", "-q", "-m", message]);
    git(repo, &["rev-parse", "HEAD"])
}

#[tokio::test]
async fn test_clone_then_update_follows_upstream() {
    let tmp = tempfile::tempdir().unwrap();
    let upstream = tmp.path().join("upstream");
    std::fs::create_dir_all(&upstream).unwrap();
    git(&upstream, &["init", "-q"]);
    git(&upstream, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    let first = commit_file(&upstream, "package.json", "{}", "Initial commit");

    let fetcher = GitFetcher::new(tmp.path().join("projects"));
    let request = FetchRequest {
        url: format!("file://{}", upstream.display()),
        git_ref: "main".to_string(),
        depth: 1,
        credentials: None,
    };

    let checkout = fetcher.fetch("project-1", &request).await.unwrap();
    assert_eq!(checkout, fetcher.checkout_path("project-1"));
    assert!(checkout.join("package.json").exists());

    let commit = fetcher.latest_commit(&checkout).await.unwrap();
    assert_eq!(commit.hash, first);
    assert_eq!(commit.author, "Ci");
    assert_eq!(commit.message, "Initial commit");

    // Build artifacts from the previous deployment are purged on update
    std::fs::create_dir_all(checkout.join("node_modules/left-pad")).unwrap();
    let second = commit_file(&upstream, "index.js", "console.log(1)", "Add entry point");

    let checkout = fetcher.fetch("project-1", &request).await.unwrap();
    assert!(checkout.join("index.js").exists());
    assert!(!checkout.join("node_modules").exists());
    let commit = fetcher.latest_commit(&checkout).await.unwrap();
    assert_eq!(commit.hash, second);
    assert_eq!(commit.message, "Add entry point");
}

#[tokio::test]
async fn test_missing_branch_is_fetch_error() {
    let tmp = tempfile::tempdir().unwrap();
    let upstream = tmp.path().join("upstream");
    std::fs::create_dir_all(&upstream).unwrap();
    git(&upstream, &["init", "-q"]);
    git(&upstream, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    commit_file(&upstream, "README.md", "hi", "Initial commit");

    let fetcher = GitFetcher::new(tmp.path().join("projects"));
    let request = FetchRequest {
        url: format!("file://{}", upstream.display()),
        git_ref: "does-not-exist".to_string(),
        depth: 1,
        credentials: None,
    };

    let result = fetcher.fetch("project-2", &request).await;
    assert!(matches!(
        result,
        Err(deployd::errors::EngineError::FetchError(_))
    ));
}

#[tokio::test]
async fn test_update_drops_files_left_by_previous_deploy() {
    let tmp = tempfile::tempdir().unwrap();
    let upstream = tmp.path().join("upstream");
    std::fs::create_dir_all(upstream.join("web")).unwrap();
    git(&upstream, &["init", "-q"]);
    git(&upstream, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    std::fs::write(upstream.join("web/package.json"), "{}").unwrap();
    commit_file(&upstream, ".env", "FOO=bar\n", "Initial commit");

    let fetcher = GitFetcher::new(tmp.path().join("projects"));
    let request = FetchRequest {
        url: format!("file://{}", upstream.display()),
        git_ref: "main".to_string(),
        depth: 1,
        credentials: None,
    };
    let checkout = fetcher.fetch("project-3", &request).await.unwrap();

    // What a deployment writes into the tree
    std::fs::write(checkout.join(".env"), "DEPLOYMENT_URL=x\nFOO=bar\n").unwrap();
    std::fs::write(checkout.join("Dockerfile"), "FROM node:20-alpine\n").unwrap();
    std::fs::write(checkout.join("web/.env"), "API_KEY=old\n").unwrap();

    let checkout = fetcher.fetch("project-3", &request).await.unwrap();
    assert_eq!(std::fs::read_to_string(checkout.join(".env")).unwrap(), "FOO=bar\n");
    assert!(!checkout.join("Dockerfile").exists());
    assert!(!checkout.join("web/.env").exists());
    assert!(checkout.join("web/package.json").exists());
}

#[tokio::test]
async fn test_credentials_never_reach_disk_or_errors() {
    let tmp = tempfile::tempdir().unwrap();
    let upstream = tmp.path().join("upstream");
    std::fs::create_dir_all(&upstream).unwrap();
    git(&upstream, &["init", "-q"]);
    git(&upstream, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    commit_file(&upstream, "README.md", "hi", "Initial commit");

    let fetcher = GitFetcher::new(tmp.path().join("projects"));
    let local = FetchRequest {
        url: format!("file://{}", upstream.display()),
        git_ref: "main".to_string(),
        depth: 1,
        credentials: None,
    };
    let checkout = fetcher.fetch("project-4", &local).await.unwrap();

    // Nothing listens on port 1, so the authenticated fetch fails
    let remote = FetchRequest {
        url: "http://127.0.0.1:1/acme/shop.git".to_string(),
        credentials: Some(GitCredentials {
            username: "deploy".to_string(),
            token: SecretString::from("s3cr3t/t0k@n".to_string()),
        }),
        ..local
    };
    let err = fetcher.fetch("project-4", &remote).await.unwrap_err().to_string();
    assert!(!err.contains("s3cr3t"), "{}", err);
    assert!(!err.contains("t0k"), "{}", err);

    let config = std::fs::read_to_string(checkout.join(".git/config")).unwrap();
    assert!(config.contains("url = http://127.0.0.1:1/acme/shop.git"));
    assert!(!config.contains("s3cr3t"));
}
