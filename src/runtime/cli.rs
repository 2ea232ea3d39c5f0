//! Runtime adapter that shells out to the container CLI.
//!
//! All invocations go through [`DockerCli::exec`], which applies the
//! configured timeout and maps failures onto [`AppError`].

use std::process::Output;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info};

use super::{ContainerRuntime, ContainerState, ContainerSummary, RunSpec, RuntimeFuture};
use crate::{AppError, Result};

/// CLI-backed [`ContainerRuntime`].
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    timeout: Duration,
}

impl DockerCli {
    /// Create an adapter invoking `binary` with a per-command `timeout`.
    #[must_use]
    pub fn new(binary: String, timeout: Duration) -> Self {
        Self { binary, timeout }
    }

    /// Run one CLI command and return its raw output.
    async fn exec(&self, args: &[String]) -> Result<Output> {
        let cmd_str = format!("{} {}", self.binary, args.join(" "));
        debug!(command = %cmd_str, "invoking container cli");

        let result = tokio::time::timeout(
            self.timeout,
            Command::new(&self.binary)
                .args(args)
                .kill_on_drop(true)
                .output(),
        )
        .await;

        match result {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(err)) => Err(AppError::Runtime(format!("failed to execute '{cmd_str}': {err}"))),
            Err(_) => Err(AppError::Runtime(format!(
                "'{cmd_str}' timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    /// Run one CLI command and require a zero exit status.
    async fn exec_success(&self, args: &[String], container: &str) -> Result<Output> {
        let output = self.exec(args).await?;
        if output.status.success() {
            return Ok(output);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        if is_missing_container(&stderr) {
            return Err(AppError::NotFound(format!("no container '{container}'")));
        }
        Err(AppError::Runtime(format!(
            "{} {} failed: {stderr}",
            self.binary,
            args.first().map_or("", String::as_str)
        )))
    }
}

/// Assemble the `run` argument vector for a spec.
#[must_use]
pub fn run_args(spec: &RunSpec) -> Vec<String> {
    let mut args = vec!["run".to_owned(), "--name".to_owned(), spec.name.clone()];
    for mapping in &spec.ports {
        args.push("-p".into());
        args.push(mapping.to_string());
    }
    for cap in &spec.capabilities {
        args.push("--cap-add".into());
        args.push(cap.clone());
    }
    for opt in &spec.security_opts {
        args.push("--security-opt".into());
        args.push(opt.clone());
    }
    for mount in &spec.mounts {
        args.push("--mount".into());
        args.push(mount.to_cli_arg());
    }
    for env in &spec.env {
        args.push("-e".into());
        args.push(env.clone());
    }
    args.push("-d".into());
    args.push("--init".into());
    args.push(spec.image.clone());
    args.extend(spec.command.iter().cloned());
    args
}

fn is_missing_container(stderr: &str) -> bool {
    stderr.contains("No such container") || stderr.contains("no such container")
}

/// One line of `ps --format '{{json .}}'`.
#[derive(serde::Deserialize)]
struct PsLine {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Names")]
    names: String,
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "State", default)]
    state: String,
}

fn parse_ps_output(stdout: &str) -> Result<Vec<ContainerSummary>> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let entry: PsLine = serde_json::from_str(line)
                .map_err(|err| AppError::Runtime(format!("unexpected ps output: {err}")))?;
            Ok(ContainerSummary {
                id: entry.id,
                name: entry
                    .names
                    .split(',')
                    .next()
                    .unwrap_or_default()
                    .trim_start_matches('/')
                    .to_owned(),
                image: entry.image,
                state: entry.state,
            })
        })
        .collect()
}

impl ContainerRuntime for DockerCli {
    fn run(&self, spec: &RunSpec) -> RuntimeFuture<'_, String> {
        let args = run_args(spec);
        let name = spec.name.clone();
        Box::pin(async move {
            info!(container = %name, command = %args.join(" "), "running container");
            let output = self.exec_success(&args, &name).await?;
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
        })
    }

    fn start(&self, container: &str) -> RuntimeFuture<'_, ()> {
        let container = container.to_owned();
        Box::pin(async move {
            self.exec_success(&["start".into(), container.clone()], &container)
                .await?;
            Ok(())
        })
    }

    fn stop(&self, container: &str) -> RuntimeFuture<'_, ()> {
        let container = container.to_owned();
        Box::pin(async move {
            self.exec_success(&["stop".into(), container.clone()], &container)
                .await?;
            Ok(())
        })
    }

    fn remove(&self, container: &str) -> RuntimeFuture<'_, bool> {
        let container = container.to_owned();
        Box::pin(async move {
            match self
                .exec_success(&["rm".into(), container.clone()], &container)
                .await
            {
                Ok(_) => Ok(true),
                Err(AppError::NotFound(_)) => Ok(false),
                Err(err) => Err(err),
            }
        })
    }

    fn inspect(&self, container: &str) -> RuntimeFuture<'_, serde_json::Value> {
        let container = container.to_owned();
        Box::pin(async move {
            let output = self
                .exec_success(&["inspect".into(), container.clone()], &container)
                .await?;
            let mut docs: Vec<serde_json::Value> = serde_json::from_slice(&output.stdout)
                .map_err(|err| AppError::Runtime(format!("unexpected inspect output: {err}")))?;
            if docs.is_empty() {
                return Err(AppError::NotFound(format!("no container '{container}'")));
            }
            Ok(docs.swap_remove(0))
        })
    }

    fn state(&self, container: &str) -> RuntimeFuture<'_, ContainerState> {
        let container = container.to_owned();
        Box::pin(async move {
            let args = [
                "inspect".to_owned(),
                "-f".to_owned(),
                "{{.State.Status}}".to_owned(),
                container.clone(),
            ];
            let output = self.exec_success(&args, &container).await?;
            Ok(ContainerState::parse(&String::from_utf8_lossy(&output.stdout)))
        })
    }

    fn list(&self) -> RuntimeFuture<'_, Vec<ContainerSummary>> {
        Box::pin(async move {
            let args = [
                "ps".to_owned(),
                "-a".to_owned(),
                "--no-trunc".to_owned(),
                "--format".to_owned(),
                "{{json .}}".to_owned(),
            ];
            let output = self.exec_success(&args, "").await?;
            parse_ps_output(&String::from_utf8_lossy(&output.stdout))
        })
    }
}
