// src/model/events.rs

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use crate::config::model::{BuildImage, PullImage};
use crate::model::{ContainerName, RuntimeContainer, RuntimeImage, RuntimeNetwork, TaskStep};

/// Something that happened during a task run.
///
/// Events are the only way rules learn about progress. Posting the same
/// event twice is a no-op: the second copy is dropped by [`EventSet`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskEvent {
    TaskNetworkCreated {
        network: RuntimeNetwork,
    },
    TaskNetworkCreationFailed {
        message: String,
    },
    CachesInitialised,
    CacheInitialisationFailed {
        message: String,
    },
    ImagePulled {
        source: PullImage,
        image: RuntimeImage,
    },
    ImagePullFailed {
        source: PullImage,
        message: String,
    },
    ImageBuilt {
        source: BuildImage,
        image: RuntimeImage,
    },
    ImageBuildFailed {
        source: BuildImage,
        message: String,
    },
    ContainerCreated {
        container: ContainerName,
        handle: RuntimeContainer,
    },
    ContainerCreationFailed {
        container: ContainerName,
        message: String,
    },
    /// A file created on the host for `container` (e.g. an env file) that
    /// must be deleted once the container is gone.
    TemporaryFileCreated {
        container: ContainerName,
        path: PathBuf,
    },
    TemporaryDirectoryCreated {
        container: ContainerName,
        path: PathBuf,
    },
    ContainerStarted {
        container: ContainerName,
    },
    ContainerBecameHealthy {
        container: ContainerName,
    },
    ContainerDidNotBecomeHealthy {
        container: ContainerName,
        message: String,
    },
    RunningSetupCommand {
        container: ContainerName,
        command_index: usize,
    },
    SetupCommandsCompleted {
        container: ContainerName,
    },
    SetupCommandFailed {
        container: ContainerName,
        command_index: usize,
        exit_code: i64,
        output: String,
    },
    SetupCommandExecutionError {
        container: ContainerName,
        command_index: usize,
        message: String,
    },
    ContainerBecameReady {
        container: ContainerName,
    },
    RunningContainerExited {
        container: ContainerName,
        exit_code: i64,
    },
    ContainerRunFailed {
        container: ContainerName,
        message: String,
    },
    ContainerStopped {
        container: ContainerName,
    },
    ContainerStopFailed {
        container: ContainerName,
        message: String,
    },
    ContainerRemoved {
        container: ContainerName,
    },
    ContainerRemovalFailed {
        container: ContainerName,
        message: String,
    },
    TaskNetworkDeleted,
    TaskNetworkDeletionFailed {
        network: RuntimeNetwork,
        message: String,
    },
    TemporaryFileDeleted {
        path: PathBuf,
    },
    TemporaryFileDeletionFailed {
        path: PathBuf,
        message: String,
    },
    TemporaryDirectoryDeleted {
        path: PathBuf,
    },
    TemporaryDirectoryDeletionFailed {
        path: PathBuf,
        message: String,
    },
    UserInterruptedExecution,
    ExecutionFailed {
        message: String,
    },
    /// Published to the event sink just before a step runs. Never stored.
    StepStarting {
        step: TaskStep,
    },
}

impl TaskEvent {
    /// Whether this event means the task cannot succeed.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            TaskEvent::TaskNetworkCreationFailed { .. }
                | TaskEvent::CacheInitialisationFailed { .. }
                | TaskEvent::ImagePullFailed { .. }
                | TaskEvent::ImageBuildFailed { .. }
                | TaskEvent::ContainerCreationFailed { .. }
                | TaskEvent::ContainerDidNotBecomeHealthy { .. }
                | TaskEvent::SetupCommandFailed { .. }
                | TaskEvent::SetupCommandExecutionError { .. }
                | TaskEvent::ContainerRunFailed { .. }
                | TaskEvent::ContainerStopFailed { .. }
                | TaskEvent::ContainerRemovalFailed { .. }
                | TaskEvent::TaskNetworkDeletionFailed { .. }
                | TaskEvent::TemporaryFileDeletionFailed { .. }
                | TaskEvent::TemporaryDirectoryDeletionFailed { .. }
                | TaskEvent::UserInterruptedExecution
                | TaskEvent::ExecutionFailed { .. }
        )
    }

    /// Events that are only reported, never fed to the state machine.
    pub fn is_informational(&self) -> bool {
        matches!(self, TaskEvent::StepStarting { .. })
    }
}

impl fmt::Display for TaskEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskEvent::TaskNetworkCreated { network } => {
                write!(f, "task network '{}' created", network.id)
            }
            TaskEvent::TaskNetworkCreationFailed { message } => {
                write!(f, "Could not create network for task: {}", message)
            }
            TaskEvent::CachesInitialised => f.write_str("caches initialised"),
            TaskEvent::CacheInitialisationFailed { message } => {
                write!(f, "Could not initialise caches: {}", message)
            }
            TaskEvent::ImagePulled { source, image } => {
                write!(f, "image '{}' pulled ({})", source.image_name, image)
            }
            TaskEvent::ImagePullFailed { source, message } => {
                write!(f, "Could not pull image '{}': {}", source.image_name, message)
            }
            TaskEvent::ImageBuilt { source, image } => write!(
                f,
                "image built from '{}' ({})",
                source.build_directory.display(),
                image
            ),
            TaskEvent::ImageBuildFailed { source, message } => write!(
                f,
                "Could not build image from directory '{}': {}",
                source.build_directory.display(),
                message
            ),
            TaskEvent::ContainerCreated { container, handle } => {
                write!(f, "container '{}' created ({})", container, handle.id)
            }
            TaskEvent::ContainerCreationFailed { container, message } => {
                write!(f, "Could not create container '{}': {}", container, message)
            }
            TaskEvent::TemporaryFileCreated { container, path } => write!(
                f,
                "temporary file '{}' created for container '{}'",
                path.display(),
                container
            ),
            TaskEvent::TemporaryDirectoryCreated { container, path } => write!(
                f,
                "temporary directory '{}' created for container '{}'",
                path.display(),
                container
            ),
            TaskEvent::ContainerStarted { container } => {
                write!(f, "container '{}' started", container)
            }
            TaskEvent::ContainerBecameHealthy { container } => {
                write!(f, "container '{}' became healthy", container)
            }
            TaskEvent::ContainerDidNotBecomeHealthy { container, message } => write!(
                f,
                "Container '{}' did not become healthy: {}",
                container, message
            ),
            TaskEvent::RunningSetupCommand {
                container,
                command_index,
            } => write!(
                f,
                "running setup command {} in container '{}'",
                command_index + 1,
                container
            ),
            TaskEvent::SetupCommandsCompleted { container } => {
                write!(f, "setup commands completed for container '{}'", container)
            }
            TaskEvent::SetupCommandFailed {
                container,
                command_index,
                exit_code,
                output,
            } => write!(
                f,
                "Setup command {} in container '{}' exited with code {}. Output: {}",
                command_index + 1,
                container,
                exit_code,
                output.trim_end()
            ),
            TaskEvent::SetupCommandExecutionError {
                container,
                command_index,
                message,
            } => write!(
                f,
                "Could not run setup command {} in container '{}': {}",
                command_index + 1,
                container,
                message
            ),
            TaskEvent::ContainerBecameReady { container } => {
                write!(f, "container '{}' is ready", container)
            }
            TaskEvent::RunningContainerExited {
                container,
                exit_code,
            } => write!(f, "container '{}' exited with code {}", container, exit_code),
            TaskEvent::ContainerRunFailed { container, message } => {
                write!(f, "Could not run container '{}': {}", container, message)
            }
            TaskEvent::ContainerStopped { container } => {
                write!(f, "container '{}' stopped", container)
            }
            TaskEvent::ContainerStopFailed { container, message } => {
                write!(f, "Could not stop container '{}': {}", container, message)
            }
            TaskEvent::ContainerRemoved { container } => {
                write!(f, "container '{}' removed", container)
            }
            TaskEvent::ContainerRemovalFailed { container, message } => {
                write!(f, "Could not remove container '{}': {}", container, message)
            }
            TaskEvent::TaskNetworkDeleted => f.write_str("task network deleted"),
            TaskEvent::TaskNetworkDeletionFailed { network, message } => write!(
                f,
                "Could not delete the task network '{}': {}",
                network.id, message
            ),
            TaskEvent::TemporaryFileDeleted { path } => {
                write!(f, "temporary file '{}' deleted", path.display())
            }
            TaskEvent::TemporaryFileDeletionFailed { path, message } => write!(
                f,
                "Could not delete temporary file '{}': {}",
                path.display(),
                message
            ),
            TaskEvent::TemporaryDirectoryDeleted { path } => {
                write!(f, "temporary directory '{}' deleted", path.display())
            }
            TaskEvent::TemporaryDirectoryDeletionFailed { path, message } => write!(
                f,
                "Could not delete temporary directory '{}': {}",
                path.display(),
                message
            ),
            TaskEvent::UserInterruptedExecution => f.write_str("Execution interrupted by user"),
            TaskEvent::ExecutionFailed { message } => write!(f, "{}", message),
            TaskEvent::StepStarting { step } => write!(f, "starting step: {}", step),
        }
    }
}

/// Every event posted so far during one task run.
///
/// Insertion order is irrelevant; duplicates are ignored.
#[derive(Debug, Clone, Default)]
pub struct EventSet {
    events: HashSet<TaskEvent>,
}

impl EventSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event. Returns `false` if an identical event was already present.
    pub fn insert(&mut self, event: TaskEvent) -> bool {
        self.events.insert(event)
    }

    pub fn contains(&self, event: &TaskEvent) -> bool {
        self.events.contains(event)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn has_failure(&self) -> bool {
        self.events.iter().any(TaskEvent::is_failure)
    }

    pub fn network(&self) -> Option<&RuntimeNetwork> {
        self.events.iter().find_map(|e| match e {
            TaskEvent::TaskNetworkCreated { network } => Some(network),
            _ => None,
        })
    }

    pub fn caches_initialised(&self) -> bool {
        self.events.contains(&TaskEvent::CachesInitialised)
    }

    pub fn pulled_image(&self, source: &PullImage) -> Option<&RuntimeImage> {
        self.events.iter().find_map(|e| match e {
            TaskEvent::ImagePulled { source: s, image } if s == source => Some(image),
            _ => None,
        })
    }

    pub fn built_image(&self, source: &BuildImage) -> Option<&RuntimeImage> {
        self.events.iter().find_map(|e| match e {
            TaskEvent::ImageBuilt { source: s, image } if s == source => Some(image),
            _ => None,
        })
    }

    pub fn created_container(&self, container: &str) -> Option<&RuntimeContainer> {
        self.events.iter().find_map(|e| match e {
            TaskEvent::ContainerCreated {
                container: c,
                handle,
            } if c == container => Some(handle),
            _ => None,
        })
    }

    pub fn has_started(&self, container: &str) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, TaskEvent::ContainerStarted { container: c } if c == container))
    }

    pub fn became_healthy(&self, container: &str) -> bool {
        self.events.iter().any(
            |e| matches!(e, TaskEvent::ContainerBecameHealthy { container: c } if c == container),
        )
    }

    pub fn became_ready(&self, container: &str) -> bool {
        self.events.iter().any(
            |e| matches!(e, TaskEvent::ContainerBecameReady { container: c } if c == container),
        )
    }

    pub fn has_stopped(&self, container: &str) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, TaskEvent::ContainerStopped { container: c } if c == container))
    }

    pub fn has_removed(&self, container: &str) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, TaskEvent::ContainerRemoved { container: c } if c == container))
    }

    pub fn exit_code_of(&self, container: &str) -> Option<i64> {
        self.events.iter().find_map(|e| match e {
            TaskEvent::RunningContainerExited {
                container: c,
                exit_code,
            } if c == container => Some(*exit_code),
            _ => None,
        })
    }
}

impl FromIterator<TaskEvent> for EventSet {
    fn from_iter<I: IntoIterator<Item = TaskEvent>>(iter: I) -> Self {
        Self {
            events: iter.into_iter().collect(),
        }
    }
}

impl Extend<TaskEvent> for EventSet {
    fn extend<I: IntoIterator<Item = TaskEvent>>(&mut self, iter: I) {
        self.events.extend(iter);
    }
}
