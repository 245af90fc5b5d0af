//! Container runtime adapter
//!
//! [`ContainerRuntime`] is everything the orchestrator needs from the container
//! engine: image builds with streamed output, single-container lifecycle and compose
//! stack lifecycle. [`DockerCli`] implements it on top of the `docker` binary.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::deploy::sink::LogSink;
use crate::errors::EngineError;
use crate::models::environment::Environment;
use crate::models::project::Project;

/// Port every generated image listens on
pub const CONTAINER_FRONTEND_PORT: u16 = 3000;
pub const CONTAINER_BACKEND_PORT: u16 = 8080;
pub const RESTART_POLICY: &str = "unless-stopped";
pub const COMPOSE_FILE: &str = "docker-compose.yml";

/// Lines of builder output kept for the error message
const ERROR_TAIL: usize = 20;

const PORT_CONFLICT_MARKERS: &[&str] = &["address already in use", "port is already allocated"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    pub host_ip: String,
    pub host_port: u16,
    pub container_port: u16,
}

/// Everything needed to create a single container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub ports: Vec<PortBinding>,
    pub env: Vec<(String, String)>,
    pub restart: String,
    /// Port description used when binding fails
    pub port_description: String,
}

impl ContainerSpec {
    /// Container of a single-service project
    pub fn for_project(project: &Project, image: &str, vars: &[Environment]) -> Self {
        let mut ports = Vec::new();
        if project.frontend_port > 0 {
            ports.push(PortBinding {
                host_ip: "127.0.0.1".to_string(),
                host_port: project.frontend_port,
                container_port: CONTAINER_FRONTEND_PORT,
            });
        }
        if project.backend_port > 0 {
            ports.push(PortBinding {
                host_ip: "127.0.0.1".to_string(),
                host_port: project.backend_port,
                container_port: CONTAINER_BACKEND_PORT,
            });
        }

        let mut env = vec![
            ("NODE_ENV".to_string(), "production".to_string()),
            ("PORT".to_string(), CONTAINER_FRONTEND_PORT.to_string()),
        ];
        env.extend(vars.iter().map(|v| (v.key.clone(), v.value.clone())));

        Self {
            name: project.container_name(),
            image: image.to_string(),
            ports,
            env,
            restart: RESTART_POLICY.to_string(),
            port_description: project.describe_ports(),
        }
    }
}

/// A compose stack on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeTarget {
    pub dir: PathBuf,
    pub project_name: String,
}

impl ComposeTarget {
    pub fn new(dir: impl Into<PathBuf>, project_name: &str) -> Self {
        Self {
            dir: dir.into(),
            project_name: project_name.to_string(),
        }
    }
}

/// Whether a runtime error message is a host port binding failure
pub fn is_port_conflict(message: &str) -> bool {
    let lower = message.to_lowercase();
    PORT_CONFLICT_MARKERS.iter().any(|m| lower.contains(m))
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Build `context/Dockerfile` as `tag`, streaming output line by line
    async fn build_image(&self, context: &Path, tag: &str, sink: &dyn LogSink) -> Result<(), EngineError>;

    /// Create a stopped container from `spec`
    async fn create_container(&self, spec: &ContainerSpec) -> Result<(), EngineError>;

    async fn start_container(&self, name: &str) -> Result<(), EngineError>;

    /// Force-remove a container; a missing container is not an error
    async fn remove_container(&self, name: &str) -> Result<(), EngineError>;

    async fn is_container_running(&self, name: &str) -> bool;

    async fn compose_down(&self, target: &ComposeTarget) -> Result<(), EngineError>;

    async fn compose_build(&self, target: &ComposeTarget, sink: &dyn LogSink) -> Result<(), EngineError>;

    async fn compose_build_service(
        &self,
        target: &ComposeTarget,
        service: &str,
        sink: &dyn LogSink,
    ) -> Result<(), EngineError>;

    async fn compose_up(&self, target: &ComposeTarget) -> Result<(), EngineError>;

    /// Recreate one service from its current image without touching its dependencies
    async fn compose_restart_service(&self, target: &ComposeTarget, service: &str) -> Result<(), EngineError>;

    /// Release runtime resources
    async fn close(&self) -> Result<(), EngineError>;
}

/// Replace any same-named container with a fresh one from `spec` and start it.
///
/// A host port binding failure removes the just-created container and becomes
/// [`EngineError::PortConflict`]; any other start failure leaves the container
/// in place for inspection.
pub async fn run_container(runtime: &dyn ContainerRuntime, spec: &ContainerSpec) -> Result<(), EngineError> {
    runtime.remove_container(&spec.name).await?;

    let result = match runtime.create_container(spec).await {
        Ok(()) => runtime.start_container(&spec.name).await,
        Err(e) => Err(e),
    };
    match result {
        Err(EngineError::ContainerStartError(message)) if is_port_conflict(&message) => {
            if let Err(e) = runtime.remove_container(&spec.name).await {
                warn!("Failed to remove container {}: {}", spec.name, e);
            }
            Err(EngineError::PortConflict(spec.port_description.clone()))
        }
        other => other,
    }
}

/// Runtime driving the `docker` CLI
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }
}

struct CommandOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl DockerCli {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
        }
    }

    async fn exec(&self, args: &[String], cwd: Option<&Path>) -> Result<CommandOutput, EngineError> {
        debug!("{} {}", self.binary, args.join(" "));
        let mut command = Command::new(&self.binary);
        command.args(args);
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }

        let output = command.output().await.map_err(|e| {
            EngineError::ContainerStartError(format!("failed to run {}: {}", self.binary, e))
        })?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Run a command, forwarding stdout and stderr lines to `sink` as they arrive.
    /// On failure the last lines of output are returned as the error text.
    async fn exec_streaming(
        &self,
        args: &[String],
        cwd: &Path,
        sink: &dyn LogSink,
    ) -> Result<(), String> {
        debug!("{} {}", self.binary, args.join(" "));
        let mut child = Command::new(&self.binary)
            .args(args)
            .current_dir(cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to run {}: {}", self.binary, e))?;

        let stdout = child.stdout.take().ok_or("stdout not captured")?;
        let stderr = child.stderr.take().ok_or("stderr not captured")?;
        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let (mut out_done, mut err_done) = (false, false);
        let mut tail: VecDeque<String> = VecDeque::with_capacity(ERROR_TAIL);

        loop {
            let line = tokio::select! {
                line = out_lines.next_line(), if !out_done => match line {
                    Ok(Some(line)) => line,
                    _ => { out_done = true; continue; }
                },
                line = err_lines.next_line(), if !err_done => match line {
                    Ok(Some(line)) => line,
                    _ => { err_done = true; continue; }
                },
                else => break,
            };

            debug!("{}", line);
            sink.info(&line).await;
            if tail.len() == ERROR_TAIL {
                tail.pop_front();
            }
            tail.push_back(line);
        }

        let status = child
            .wait()
            .await
            .map_err(|e| format!("failed to wait for {}: {}", self.binary, e))?;
        if status.success() {
            return Ok(());
        }

        let detail = tail.into_iter().collect::<Vec<_>>().join("\n");
        Err(format!("{} ({})", detail, status))
    }

    fn compose_args(target: &ComposeTarget, rest: &[&str]) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "compose".into(),
            "-f".into(),
            COMPOSE_FILE.into(),
            "-p".into(),
            target.project_name.clone(),
        ];
        args.extend(rest.iter().map(|s| s.to_string()));
        args
    }

    async fn compose(&self, target: &ComposeTarget, rest: &[&str]) -> Result<(), EngineError> {
        let output = self
            .exec(&Self::compose_args(target, rest), Some(&target.dir))
            .await?;
        if output.success {
            Ok(())
        } else {
            Err(EngineError::ContainerStartError(format!(
                "docker compose {} failed: {}",
                rest.join(" "),
                output.stderr
            )))
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn build_image(&self, context: &Path, tag: &str, sink: &dyn LogSink) -> Result<(), EngineError> {
        info!("Building image {} from {}", tag, context.display());
        let args: Vec<String> = vec!["build".into(), "--rm".into(), "-t".into(), tag.into(), ".".into()];
        self.exec_streaming(&args, context, sink)
            .await
            .map_err(EngineError::BuildError)
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<(), EngineError> {
        let mut args: Vec<String> = vec![
            "create".into(),
            "--name".into(),
            spec.name.clone(),
            "--restart".into(),
            spec.restart.clone(),
        ];
        for port in &spec.ports {
            args.push("-p".into());
            args.push(format!("{}:{}:{}", port.host_ip, port.host_port, port.container_port));
        }
        for (key, value) in &spec.env {
            args.push("-e".into());
            args.push(format!("{}={}", key, value));
        }
        args.push(spec.image.clone());

        let created = self.exec(&args, None).await?;
        if !created.success {
            return Err(EngineError::ContainerStartError(created.stderr));
        }
        debug!("Created container {} ({})", spec.name, created.stdout);
        Ok(())
    }

    async fn start_container(&self, name: &str) -> Result<(), EngineError> {
        let started = self
            .exec(&["start".to_string(), name.to_string()], None)
            .await?;
        if !started.success {
            return Err(EngineError::ContainerStartError(started.stderr));
        }
        info!("Started container {}", name);
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> Result<(), EngineError> {
        let output = self
            .exec(&["rm".to_string(), "-f".to_string(), name.to_string()], None)
            .await?;
        if !output.success && !output.stderr.to_lowercase().contains("no such container") {
            return Err(EngineError::ContainerStartError(output.stderr));
        }
        Ok(())
    }

    async fn is_container_running(&self, name: &str) -> bool {
        let args = [
            "inspect".to_string(),
            "-f".to_string(),
            "{{.State.Running}}".to_string(),
            name.to_string(),
        ];
        match self.exec(&args, None).await {
            Ok(output) => output.success && output.stdout == "true",
            Err(_) => false,
        }
    }

    async fn compose_down(&self, target: &ComposeTarget) -> Result<(), EngineError> {
        self.compose(target, &["down", "--remove-orphans"]).await
    }

    async fn compose_build(&self, target: &ComposeTarget, sink: &dyn LogSink) -> Result<(), EngineError> {
        let args = Self::compose_args(target, &["build", "--no-cache"]);
        self.exec_streaming(&args, &target.dir, sink)
            .await
            .map_err(EngineError::BuildError)
    }

    async fn compose_build_service(
        &self,
        target: &ComposeTarget,
        service: &str,
        sink: &dyn LogSink,
    ) -> Result<(), EngineError> {
        let args = Self::compose_args(target, &["build", service]);
        self.exec_streaming(&args, &target.dir, sink)
            .await
            .map_err(EngineError::BuildError)
    }

    async fn compose_up(&self, target: &ComposeTarget) -> Result<(), EngineError> {
        self.compose(target, &["up", "-d"]).await.map_err(|e| match e {
            EngineError::ContainerStartError(msg) if is_port_conflict(&msg) => {
                EngineError::PortConflict(target.project_name.clone())
            }
            other => other,
        })
    }

    async fn compose_restart_service(&self, target: &ComposeTarget, service: &str) -> Result<(), EngineError> {
        self.compose(target, &["up", "-d", "--no-deps", "--force-recreate", service])
            .await
    }

    async fn close(&self) -> Result<(), EngineError> {
        Ok(())
    }
}
