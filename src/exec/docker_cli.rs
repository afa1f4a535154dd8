// src/exec/docker_cli.rs

//! `ContainerRuntime` backed by the `docker` command-line client.

use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, bail};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::model::{BuildImage, Container, PullImage};
use crate::dag::ContainerRunConfig;
use crate::errors::Result;
use crate::exec::{ContainerRuntime, StepContext};
use crate::model::{
    ContainerName, RuntimeContainer, RuntimeImage, RuntimeNetwork, TaskEvent, TaskStep,
};
use crate::types::RuntimeType;

const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Drives `docker` through child processes.
///
/// Every runtime resource is named `<project>-...-<run id>` so that concurrent
/// runs of the same project don't collide.
#[derive(Debug, Clone)]
pub struct DockerCliRuntime {
    docker: PathBuf,
    project_name: String,
    run_id: String,
    temp_dir: PathBuf,
}

impl DockerCliRuntime {
    pub fn new(project_name: impl Into<String>) -> Self {
        let started = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        Self {
            docker: PathBuf::from("docker"),
            project_name: project_name.into(),
            run_id: format!("{}-{}", std::process::id(), started),
            temp_dir: std::env::temp_dir(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.docker);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    /// Run `docker <args>` to completion and return its trimmed stdout.
    async fn docker(&self, args: &[String]) -> anyhow::Result<String> {
        let subcommand = args.first().map(String::as_str).unwrap_or_default();
        debug!(?args, "running docker");

        let output = self
            .command()
            .args(args)
            .output()
            .await
            .with_context(|| format!("running '{} {}'", self.docker.display(), subcommand))?;

        if !output.status.success() {
            bail!(
                "'{} {}' exited with {}: {}",
                self.docker.display(),
                subcommand,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn resource_name(&self, suffix: &str) -> String {
        format!("{}-{}-{}", self.project_name, suffix, self.run_id)
    }

    async fn create_task_network(&self, runtime_type: RuntimeType, ctx: &StepContext) -> Result<()> {
        let args = strings([
            "network",
            "create",
            "--driver",
            runtime_type.network_driver(),
            &self.resource_name("network"),
        ]);

        let event = match self.docker(&args).await {
            Ok(id) => TaskEvent::TaskNetworkCreated {
                network: RuntimeNetwork::new(id),
            },
            Err(e) => TaskEvent::TaskNetworkCreationFailed {
                message: format!("{:#}", e),
            },
        };
        ctx.post_event(event).await
    }

    async fn initialise_caches(&self, caches: &BTreeSet<String>, ctx: &StepContext) -> Result<()> {
        for cache in caches {
            let args = strings(["volume", "create", &self.cache_volume(cache)]);
            if let Err(e) = self.docker(&args).await {
                return ctx
                    .post_event(TaskEvent::CacheInitialisationFailed {
                        message: format!("{:#}", e),
                    })
                    .await;
            }
        }

        ctx.post_event(TaskEvent::CachesInitialised).await
    }

    fn cache_volume(&self, cache: &str) -> String {
        format!("{}-{}", self.project_name, cache)
    }

    async fn pull_image(&self, source: &PullImage, ctx: &StepContext) -> Result<()> {
        let args = strings(["pull", "--quiet", &source.image_name]);

        let event = match self.docker(&args).await {
            Ok(_) => TaskEvent::ImagePulled {
                source: source.clone(),
                image: RuntimeImage::new(source.image_name.clone()),
            },
            Err(e) => TaskEvent::ImagePullFailed {
                source: source.clone(),
                message: format!("{:#}", e),
            },
        };
        ctx.post_event(event).await
    }

    async fn build_image(
        &self,
        source: &BuildImage,
        image_tags: &BTreeSet<String>,
        ctx: &StepContext,
    ) -> Result<()> {
        let mut args = strings(["build", "--quiet", "--file"]);
        args.push(
            source
                .build_directory
                .join(&source.dockerfile)
                .display()
                .to_string(),
        );
        for (key, value) in &source.build_args {
            args.push("--build-arg".to_string());
            args.push(format!("{}={}", key, value));
        }
        for tag in image_tags {
            args.push("--tag".to_string());
            args.push(tag.clone());
        }
        args.push(source.build_directory.display().to_string());

        let event = match self.docker(&args).await {
            Ok(id) => TaskEvent::ImageBuilt {
                source: source.clone(),
                image: RuntimeImage::new(id),
            },
            Err(e) => TaskEvent::ImageBuildFailed {
                source: source.clone(),
                message: format!("{:#}", e),
            },
        };
        ctx.post_event(event).await
    }

    async fn create_container(
        &self,
        container: &Container,
        config: &ContainerRunConfig,
        image: &RuntimeImage,
        network: &RuntimeNetwork,
        ctx: &StepContext,
    ) -> Result<()> {
        let env_file = if config.environment.is_empty() {
            None
        } else {
            let path = self
                .temp_dir
                .join(format!("{}.env", self.resource_name(&container.name)));
            match write_env_file(&path, config).await {
                Ok(()) => {
                    ctx.post_event(TaskEvent::TemporaryFileCreated {
                        container: container.name.clone(),
                        path: path.clone(),
                    })
                    .await?;
                    Some(path)
                }
                Err(e) => {
                    return ctx
                        .post_event(TaskEvent::ContainerCreationFailed {
                            container: container.name.clone(),
                            message: format!("{:#}", e),
                        })
                        .await;
                }
            }
        };

        let name = self.resource_name(&container.name);
        let args = self.create_args(&name, container, config, image, network, env_file.as_deref());

        let event = match self.docker(&args).await {
            Ok(id) => TaskEvent::ContainerCreated {
                container: container.name.clone(),
                handle: RuntimeContainer::new(id, name),
            },
            Err(e) => TaskEvent::ContainerCreationFailed {
                container: container.name.clone(),
                message: format!("{:#}", e),
            },
        };
        ctx.post_event(event).await
    }

    fn create_args(
        &self,
        name: &str,
        container: &Container,
        config: &ContainerRunConfig,
        image: &RuntimeImage,
        network: &RuntimeNetwork,
        env_file: Option<&Path>,
    ) -> Vec<String> {
        let mut args = strings([
            "create",
            "--name",
            name,
            "--network",
            &network.id,
            "--network-alias",
            &container.name,
        ]);

        if let Some(path) = env_file {
            args.push("--env-file".to_string());
            args.push(path.display().to_string());
        }
        for port in &config.ports {
            args.push("--publish".to_string());
            args.push(port.clone());
        }
        if let Some(dir) = &config.working_directory {
            args.push("--workdir".to_string());
            args.push(dir.clone());
        }
        for volume in &container.volumes {
            args.push("--volume".to_string());
            args.push(match &volume.options {
                Some(options) => format!("{}:{}:{}", volume.local, volume.container, options),
                None => format!("{}:{}", volume.local, volume.container),
            });
        }
        for cache in &container.caches {
            args.push("--volume".to_string());
            args.push(format!("{}:{}", self.cache_volume(&cache.name), cache.container));
        }
        if let Some(health) = &container.health_check {
            if let Some(command) = &health.command {
                args.push("--health-cmd".to_string());
                args.push(command.clone());
            }
            if let Some(interval) = health.interval {
                args.push("--health-interval".to_string());
                args.push(format!("{}ms", interval.as_millis()));
            }
            if let Some(retries) = health.retries {
                args.push("--health-retries".to_string());
                args.push(retries.to_string());
            }
            if let Some(start_period) = health.start_period {
                args.push("--health-start-period".to_string());
                args.push(format!("{}ms", start_period.as_millis()));
            }
        }

        args.push(image.id.clone());

        // Quoting is not supported: the command is split on whitespace.
        if let Some(command) = &config.command {
            args.extend(command.split_whitespace().map(str::to_string));
        }

        args
    }

    async fn run_container(
        &self,
        container: &ContainerName,
        handle: &RuntimeContainer,
        attach: bool,
        ctx: &StepContext,
    ) -> Result<()> {
        if !attach {
            let event = match self.docker(&strings(["start", &handle.id])).await {
                Ok(_) => TaskEvent::ContainerStarted {
                    container: container.clone(),
                },
                Err(e) => TaskEvent::ContainerRunFailed {
                    container: container.clone(),
                    message: format!("{:#}", e),
                },
            };
            return ctx.post_event(event).await;
        }

        let spawned = self
            .command()
            .args(["start", "--attach", handle.id.as_str()])
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("starting container '{}'", container));

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                return ctx
                    .post_event(TaskEvent::ContainerRunFailed {
                        container: container.clone(),
                        message: format!("{:#}", e),
                    })
                    .await;
            }
        };

        ctx.post_event(TaskEvent::ContainerStarted {
            container: container.clone(),
        })
        .await?;

        info!(container = %container, id = %handle.id, "attached to task container");

        tokio::select! {
            status = child.wait() => {
                let event = match status {
                    Ok(status) => {
                        let exit_code = status.code().map(i64::from).unwrap_or(-1);
                        info!(container = %container, exit_code, "task container exited");
                        TaskEvent::RunningContainerExited {
                            container: container.clone(),
                            exit_code,
                        }
                    }
                    Err(e) => TaskEvent::ContainerRunFailed {
                        container: container.clone(),
                        message: e.to_string(),
                    },
                };
                ctx.post_event(event).await
            }

            _ = ctx.cancellation().cancelled() => {
                info!(container = %container, "cancellation requested; detaching from task container");
                if let Err(e) = child.kill().await {
                    warn!(container = %container, error = %e, "failed to kill attached docker process");
                }
                ctx.post_event(TaskEvent::ContainerRunFailed {
                    container: container.clone(),
                    message: "The task was cancelled before the container exited.".to_string(),
                })
                .await
            }
        }
    }

    async fn wait_for_healthy(
        &self,
        container: &ContainerName,
        handle: &RuntimeContainer,
        ctx: &StepContext,
    ) -> Result<()> {
        let args = strings([
            "inspect",
            "--format",
            "{{.State.Status}} {{if .State.Health}}{{.State.Health.Status}}{{else}}none{{end}}",
            &handle.id,
        ]);

        loop {
            let state = match self.docker(&args).await {
                Ok(state) => state,
                Err(e) => {
                    return ctx
                        .post_event(TaskEvent::ContainerDidNotBecomeHealthy {
                            container: container.clone(),
                            message: format!("Waiting for the container's health status failed: {:#}", e),
                        })
                        .await;
                }
            };

            let mut parts = state.split_whitespace();
            let status = parts.next().unwrap_or_default();
            let health = parts.next().unwrap_or("none");

            match (status, health) {
                ("exited" | "dead", _) => {
                    return ctx
                        .post_event(TaskEvent::ContainerDidNotBecomeHealthy {
                            container: container.clone(),
                            message: "The container exited before becoming healthy.".to_string(),
                        })
                        .await;
                }
                (_, "none" | "healthy") => {
                    return ctx
                        .post_event(TaskEvent::ContainerBecameHealthy {
                            container: container.clone(),
                        })
                        .await;
                }
                (_, "unhealthy") => {
                    return ctx
                        .post_event(TaskEvent::ContainerDidNotBecomeHealthy {
                            container: container.clone(),
                            message: "The configured health check did not indicate that the container was healthy within the timeout period.".to_string(),
                        })
                        .await;
                }
                _ => {}
            }

            tokio::select! {
                _ = tokio::time::sleep(HEALTH_POLL_INTERVAL) => {}
                _ = ctx.cancellation().cancelled() => {
                    debug!(container = %container, "stopped waiting for container to become healthy");
                    return Ok(());
                }
            }
        }
    }

    async fn run_setup_commands(
        &self,
        container: &ContainerName,
        handle: &RuntimeContainer,
        commands: &[String],
        config: &ContainerRunConfig,
        ctx: &StepContext,
    ) -> Result<()> {
        for (index, command) in commands.iter().enumerate() {
            ctx.post_event(TaskEvent::RunningSetupCommand {
                container: container.clone(),
                command_index: index,
            })
            .await?;

            let mut exec = self.command();
            exec.arg("exec");
            if let Some(dir) = &config.working_directory {
                exec.args(["--workdir", dir.as_str()]);
            }
            exec.args([handle.id.as_str(), "sh", "-c", command.as_str()]);

            let output = match exec.output().await {
                Ok(output) => output,
                Err(e) => {
                    return ctx
                        .post_event(TaskEvent::SetupCommandExecutionError {
                            container: container.clone(),
                            command_index: index,
                            message: e.to_string(),
                        })
                        .await;
                }
            };

            if !output.status.success() {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                return ctx
                    .post_event(TaskEvent::SetupCommandFailed {
                        container: container.clone(),
                        command_index: index,
                        exit_code: output.status.code().map(i64::from).unwrap_or(-1),
                        output: text,
                    })
                    .await;
            }
        }

        if !commands.is_empty() {
            ctx.post_event(TaskEvent::SetupCommandsCompleted {
                container: container.clone(),
            })
            .await?;
        }

        ctx.post_event(TaskEvent::ContainerBecameReady {
            container: container.clone(),
        })
        .await
    }

    async fn stop_container(
        &self,
        container: &ContainerName,
        handle: &RuntimeContainer,
        ctx: &StepContext,
    ) -> Result<()> {
        let event = match self.docker(&strings(["stop", &handle.id])).await {
            Ok(_) => TaskEvent::ContainerStopped {
                container: container.clone(),
            },
            Err(e) => TaskEvent::ContainerStopFailed {
                container: container.clone(),
                message: format!("{:#}", e),
            },
        };
        ctx.post_event(event).await
    }

    async fn remove_container(
        &self,
        container: &ContainerName,
        handle: &RuntimeContainer,
        ctx: &StepContext,
    ) -> Result<()> {
        let event = match self.docker(&strings(["rm", "--volumes", &handle.id])).await {
            Ok(_) => TaskEvent::ContainerRemoved {
                container: container.clone(),
            },
            Err(e) => TaskEvent::ContainerRemovalFailed {
                container: container.clone(),
                message: format!("{:#}", e),
            },
        };
        ctx.post_event(event).await
    }

    async fn delete_task_network(&self, network: &RuntimeNetwork, ctx: &StepContext) -> Result<()> {
        let event = match self.docker(&strings(["network", "rm", &network.id])).await {
            Ok(_) => TaskEvent::TaskNetworkDeleted,
            Err(e) => TaskEvent::TaskNetworkDeletionFailed {
                network: network.clone(),
                message: format!("{:#}", e),
            },
        };
        ctx.post_event(event).await
    }
}

impl ContainerRuntime for DockerCliRuntime {
    fn run_step(
        &self,
        step: TaskStep,
        ctx: StepContext,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            match &step {
                TaskStep::CreateTaskNetwork { runtime_type } => {
                    self.create_task_network(*runtime_type, &ctx).await
                }
                TaskStep::InitialiseCaches { caches } => self.initialise_caches(caches, &ctx).await,
                TaskStep::PullImage { source } => self.pull_image(source, &ctx).await,
                TaskStep::BuildImage { source, image_tags } => {
                    self.build_image(source, image_tags, &ctx).await
                }
                TaskStep::CreateContainer {
                    container,
                    config,
                    image,
                    network,
                } => {
                    self.create_container(container, config, image, network, &ctx)
                        .await
                }
                TaskStep::RunContainer {
                    container,
                    handle,
                    attach,
                } => self.run_container(container, handle, *attach, &ctx).await,
                TaskStep::WaitForContainerToBecomeHealthy { container, handle } => {
                    self.wait_for_healthy(container, handle, &ctx).await
                }
                TaskStep::RunContainerSetupCommands {
                    container,
                    handle,
                    commands,
                    config,
                } => {
                    self.run_setup_commands(container, handle, commands, config, &ctx)
                        .await
                }
                TaskStep::StopContainer { container, handle } => {
                    self.stop_container(container, handle, &ctx).await
                }
                TaskStep::RemoveContainer { container, handle } => {
                    self.remove_container(container, handle, &ctx).await
                }
                TaskStep::DeleteTaskNetwork { network } => {
                    self.delete_task_network(network, &ctx).await
                }
                TaskStep::DeleteTemporaryFile { path } => {
                    let event = match tokio::fs::remove_file(path).await {
                        Ok(()) => TaskEvent::TemporaryFileDeleted { path: path.clone() },
                        Err(e) => TaskEvent::TemporaryFileDeletionFailed {
                            path: path.clone(),
                            message: e.to_string(),
                        },
                    };
                    ctx.post_event(event).await
                }
                TaskStep::DeleteTemporaryDirectory { path } => {
                    let event = match tokio::fs::remove_dir_all(path).await {
                        Ok(()) => TaskEvent::TemporaryDirectoryDeleted { path: path.clone() },
                        Err(e) => TaskEvent::TemporaryDirectoryDeletionFailed {
                            path: path.clone(),
                            message: e.to_string(),
                        },
                    };
                    ctx.post_event(event).await
                }
            }
        })
    }
}

async fn write_env_file(path: &Path, config: &ContainerRunConfig) -> anyhow::Result<()> {
    let contents: String = config
        .environment
        .iter()
        .map(|(key, value)| format!("{}={}\n", key, value))
        .collect();

    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("writing env file '{}'", path.display()))
}

fn strings<const N: usize>(args: [&str; N]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}
