// src/model/steps.rs

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use crate::config::model::{BuildImage, Container, PullImage};
use crate::dag::ContainerRunConfig;
use crate::model::{ContainerName, RuntimeContainer, RuntimeImage, RuntimeNetwork};
use crate::types::RuntimeType;

/// One runtime operation the engine wants performed.
///
/// Steps are plain values: executing one is entirely up to the
/// [`ContainerRuntime`](crate::exec::ContainerRuntime), which reports the
/// result back as [`TaskEvent`](crate::model::TaskEvent)s.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskStep {
    CreateTaskNetwork {
        runtime_type: RuntimeType,
    },
    InitialiseCaches {
        caches: BTreeSet<String>,
    },
    PullImage {
        source: PullImage,
    },
    BuildImage {
        source: BuildImage,
        /// `<project>-<container>` for every container using this image.
        image_tags: BTreeSet<String>,
    },
    CreateContainer {
        container: Container,
        config: ContainerRunConfig,
        image: RuntimeImage,
        network: RuntimeNetwork,
    },
    RunContainer {
        container: ContainerName,
        handle: RuntimeContainer,
        /// Only the task container is attached to the console.
        attach: bool,
    },
    WaitForContainerToBecomeHealthy {
        container: ContainerName,
        handle: RuntimeContainer,
    },
    RunContainerSetupCommands {
        container: ContainerName,
        handle: RuntimeContainer,
        commands: Vec<String>,
        config: ContainerRunConfig,
    },
    StopContainer {
        container: ContainerName,
        handle: RuntimeContainer,
    },
    RemoveContainer {
        container: ContainerName,
        handle: RuntimeContainer,
    },
    DeleteTaskNetwork {
        network: RuntimeNetwork,
    },
    DeleteTemporaryFile {
        path: PathBuf,
    },
    DeleteTemporaryDirectory {
        path: PathBuf,
    },
}

/// Discriminant of a [`TaskStep`] without its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StepKind {
    CreateTaskNetwork,
    InitialiseCaches,
    PullImage,
    BuildImage,
    CreateContainer,
    RunContainer,
    WaitForContainerToBecomeHealthy,
    RunContainerSetupCommands,
    StopContainer,
    RemoveContainer,
    DeleteTaskNetwork,
    DeleteTemporaryFile,
    DeleteTemporaryDirectory,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl TaskStep {
    pub fn kind(&self) -> StepKind {
        match self {
            TaskStep::CreateTaskNetwork { .. } => StepKind::CreateTaskNetwork,
            TaskStep::InitialiseCaches { .. } => StepKind::InitialiseCaches,
            TaskStep::PullImage { .. } => StepKind::PullImage,
            TaskStep::BuildImage { .. } => StepKind::BuildImage,
            TaskStep::CreateContainer { .. } => StepKind::CreateContainer,
            TaskStep::RunContainer { .. } => StepKind::RunContainer,
            TaskStep::WaitForContainerToBecomeHealthy { .. } => {
                StepKind::WaitForContainerToBecomeHealthy
            }
            TaskStep::RunContainerSetupCommands { .. } => StepKind::RunContainerSetupCommands,
            TaskStep::StopContainer { .. } => StepKind::StopContainer,
            TaskStep::RemoveContainer { .. } => StepKind::RemoveContainer,
            TaskStep::DeleteTaskNetwork { .. } => StepKind::DeleteTaskNetwork,
            TaskStep::DeleteTemporaryFile { .. } => StepKind::DeleteTemporaryFile,
            TaskStep::DeleteTemporaryDirectory { .. } => StepKind::DeleteTemporaryDirectory,
        }
    }

    /// Config name of the container this step acts on, if any.
    pub fn container_name(&self) -> Option<&str> {
        match self {
            TaskStep::CreateContainer { container, .. } => Some(&container.name),
            TaskStep::RunContainer { container, .. }
            | TaskStep::WaitForContainerToBecomeHealthy { container, .. }
            | TaskStep::RunContainerSetupCommands { container, .. }
            | TaskStep::StopContainer { container, .. }
            | TaskStep::RemoveContainer { container, .. } => Some(container),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStep::CreateTaskNetwork { runtime_type } => {
                write!(f, "create task network ({})", runtime_type.network_driver())
            }
            TaskStep::InitialiseCaches { caches } => {
                write!(f, "initialise {} cache(s)", caches.len())
            }
            TaskStep::PullImage { source } => write!(f, "pull image '{}'", source.image_name),
            TaskStep::BuildImage { source, .. } => {
                write!(f, "build image from '{}'", source.build_directory.display())
            }
            TaskStep::CreateContainer { container, .. } => {
                write!(f, "create container '{}'", container.name)
            }
            TaskStep::RunContainer { container, .. } => write!(f, "run container '{}'", container),
            TaskStep::WaitForContainerToBecomeHealthy { container, .. } => {
                write!(f, "wait for container '{}' to become healthy", container)
            }
            TaskStep::RunContainerSetupCommands {
                container,
                commands,
                ..
            } => write!(
                f,
                "run {} setup command(s) in container '{}'",
                commands.len(),
                container
            ),
            TaskStep::StopContainer { container, .. } => {
                write!(f, "stop container '{}'", container)
            }
            TaskStep::RemoveContainer { container, .. } => {
                write!(f, "remove container '{}'", container)
            }
            TaskStep::DeleteTaskNetwork { network } => {
                write!(f, "delete task network '{}'", network.id)
            }
            TaskStep::DeleteTemporaryFile { path } => {
                write!(f, "delete temporary file '{}'", path.display())
            }
            TaskStep::DeleteTemporaryDirectory { path } => {
                write!(f, "delete temporary directory '{}'", path.display())
            }
        }
    }
}
