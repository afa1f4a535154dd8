use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use taskyard::engine::TaskEventSink;
use taskyard::errors::{Result, TaskyardError};
use taskyard::exec::{ContainerRuntime, StepContext};
use taskyard::model::{
    RuntimeContainer, RuntimeImage, RuntimeNetwork, StepKind, TaskEvent, TaskStep,
};

/// A scripted container runtime that:
/// - records every step it was asked to run
/// - tracks how many steps ran at the same time
/// - posts the success event for each step, unless told to fail it.
#[derive(Default)]
pub struct FakeRuntime {
    executed: Mutex<Vec<TaskStep>>,
    failures: HashSet<(StepKind, Option<String>)>,
    errors: HashSet<StepKind>,
    silent: HashSet<StepKind>,
    pause_on: Option<StepKind>,
    temporary_files: BTreeMap<String, PathBuf>,
    task_exit_code: i64,
    hold_task_container: bool,
    step_delay: Duration,
    running: AtomicUsize,
    peak: AtomicUsize,
    task_container_started: Notify,
    paused: Notify,
    resumed: Notify,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post the `*Failed` event for `kind`, for one container or for all.
    pub fn fail(mut self, kind: StepKind, container: Option<&str>) -> Self {
        self.failures
            .insert((kind, container.map(str::to_string)));
        self
    }

    /// Return `Err` from `run_step` for `kind`.
    pub fn error_on(mut self, kind: StepKind) -> Self {
        self.errors.insert(kind);
        self
    }

    /// Finish `kind` without posting any event.
    pub fn silent_on(mut self, kind: StepKind) -> Self {
        self.silent.insert(kind);
        self
    }

    /// Block each step of `kind` until [`resume`](Self::resume) is called.
    pub fn pause_on(mut self, kind: StepKind) -> Self {
        self.pause_on = Some(kind);
        self
    }

    /// Report a temporary file when `container` is created.
    pub fn temporary_file(mut self, container: &str, path: &str) -> Self {
        self.temporary_files
            .insert(container.to_string(), PathBuf::from(path));
        self
    }

    pub fn task_exit_code(mut self, code: i64) -> Self {
        self.task_exit_code = code;
        self
    }

    /// Keep the attached task container running until the step is cancelled.
    pub fn hold_task_container(mut self) -> Self {
        self.hold_task_container = true;
        self
    }

    pub fn step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    pub fn executed_steps(&self) -> Vec<TaskStep> {
        self.executed.lock().unwrap().clone()
    }

    pub fn executed_kinds(&self) -> Vec<StepKind> {
        self.executed_steps().iter().map(TaskStep::kind).collect()
    }

    /// Position of the first executed step of `kind` for `container`.
    pub fn position_of(&self, kind: StepKind, container: &str) -> Option<usize> {
        self.executed_steps()
            .iter()
            .position(|s| s.kind() == kind && s.container_name() == Some(container))
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Resolves once the attached task container has started.
    pub async fn wait_for_task_container(&self) {
        self.task_container_started.notified().await;
    }

    /// Resolves once a step of the `pause_on` kind is blocked.
    pub async fn wait_for_pause(&self) {
        self.paused.notified().await;
    }

    pub fn resume(&self) {
        self.resumed.notify_one();
    }

    fn should_fail(&self, step: &TaskStep) -> bool {
        let kind = step.kind();
        self.failures.contains(&(kind, None))
            || step
                .container_name()
                .is_some_and(|c| self.failures.contains(&(kind, Some(c.to_string()))))
    }

    async fn perform(&self, step: TaskStep, ctx: &StepContext) -> Result<()> {
        if self.errors.contains(&step.kind()) {
            return Err(TaskyardError::Other(anyhow::anyhow!(
                "fake runtime error for {}",
                step.kind()
            )));
        }

        if self.silent.contains(&step.kind()) {
            return Ok(());
        }

        let fail = self.should_fail(&step);

        match step {
            TaskStep::CreateTaskNetwork { .. } => {
                ctx.post_event(if fail {
                    TaskEvent::TaskNetworkCreationFailed {
                        message: "no network for you".to_string(),
                    }
                } else {
                    TaskEvent::TaskNetworkCreated {
                        network: RuntimeNetwork::new("fake-network"),
                    }
                })
                .await
            }
            TaskStep::InitialiseCaches { .. } => {
                ctx.post_event(if fail {
                    TaskEvent::CacheInitialisationFailed {
                        message: "no caches".to_string(),
                    }
                } else {
                    TaskEvent::CachesInitialised
                })
                .await
            }
            TaskStep::PullImage { source } => {
                ctx.post_event(if fail {
                    TaskEvent::ImagePullFailed {
                        source,
                        message: "pull failed".to_string(),
                    }
                } else {
                    let image = RuntimeImage::new(source.image_name.clone());
                    TaskEvent::ImagePulled { source, image }
                })
                .await
            }
            TaskStep::BuildImage { source, .. } => {
                ctx.post_event(if fail {
                    TaskEvent::ImageBuildFailed {
                        source,
                        message: "build failed".to_string(),
                    }
                } else {
                    let image =
                        RuntimeImage::new(format!("built-{}", source.build_directory.display()));
                    TaskEvent::ImageBuilt { source, image }
                })
                .await
            }
            TaskStep::CreateContainer { container, .. } => {
                let name = container.name;
                if let Some(path) = self.temporary_files.get(&name) {
                    ctx.post_event(TaskEvent::TemporaryFileCreated {
                        container: name.clone(),
                        path: path.clone(),
                    })
                    .await?;
                }

                ctx.post_event(if fail {
                    TaskEvent::ContainerCreationFailed {
                        container: name,
                        message: "create failed".to_string(),
                    }
                } else {
                    let handle = RuntimeContainer::new(format!("{}-id", name), name.clone());
                    TaskEvent::ContainerCreated {
                        container: name,
                        handle,
                    }
                })
                .await
            }
            TaskStep::RunContainer {
                container, attach, ..
            } => {
                if fail {
                    return ctx
                        .post_event(TaskEvent::ContainerRunFailed {
                            container,
                            message: "start failed".to_string(),
                        })
                        .await;
                }

                ctx.post_event(TaskEvent::ContainerStarted {
                    container: container.clone(),
                })
                .await?;

                if !attach {
                    return Ok(());
                }

                self.task_container_started.notify_one();

                if self.hold_task_container {
                    ctx.cancellation().cancelled().await;
                    return ctx
                        .post_event(TaskEvent::ContainerRunFailed {
                            container,
                            message: "cancelled".to_string(),
                        })
                        .await;
                }

                ctx.post_event(TaskEvent::RunningContainerExited {
                    container,
                    exit_code: self.task_exit_code,
                })
                .await
            }
            TaskStep::WaitForContainerToBecomeHealthy { container, .. } => {
                ctx.post_event(if fail {
                    TaskEvent::ContainerDidNotBecomeHealthy {
                        container,
                        message: "never became healthy".to_string(),
                    }
                } else {
                    TaskEvent::ContainerBecameHealthy { container }
                })
                .await
            }
            TaskStep::RunContainerSetupCommands {
                container,
                commands,
                ..
            } => {
                for index in 0..commands.len() {
                    ctx.post_event(TaskEvent::RunningSetupCommand {
                        container: container.clone(),
                        command_index: index,
                    })
                    .await?;

                    if fail {
                        return ctx
                            .post_event(TaskEvent::SetupCommandFailed {
                                container,
                                command_index: index,
                                exit_code: 1,
                                output: "setup failed".to_string(),
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

                ctx.post_event(TaskEvent::ContainerBecameReady { container })
                    .await
            }
            TaskStep::StopContainer { container, .. } => {
                ctx.post_event(if fail {
                    TaskEvent::ContainerStopFailed {
                        container,
                        message: "stop failed".to_string(),
                    }
                } else {
                    TaskEvent::ContainerStopped { container }
                })
                .await
            }
            TaskStep::RemoveContainer { container, .. } => {
                ctx.post_event(if fail {
                    TaskEvent::ContainerRemovalFailed {
                        container,
                        message: "remove failed".to_string(),
                    }
                } else {
                    TaskEvent::ContainerRemoved { container }
                })
                .await
            }
            TaskStep::DeleteTaskNetwork { network } => {
                ctx.post_event(if fail {
                    TaskEvent::TaskNetworkDeletionFailed {
                        network,
                        message: "network delete failed".to_string(),
                    }
                } else {
                    TaskEvent::TaskNetworkDeleted
                })
                .await
            }
            TaskStep::DeleteTemporaryFile { path } => {
                ctx.post_event(if fail {
                    TaskEvent::TemporaryFileDeletionFailed {
                        path,
                        message: "file delete failed".to_string(),
                    }
                } else {
                    TaskEvent::TemporaryFileDeleted { path }
                })
                .await
            }
            TaskStep::DeleteTemporaryDirectory { path } => {
                ctx.post_event(if fail {
                    TaskEvent::TemporaryDirectoryDeletionFailed {
                        path,
                        message: "directory delete failed".to_string(),
                    }
                } else {
                    TaskEvent::TemporaryDirectoryDeleted { path }
                })
                .await
            }
        }
    }
}

impl ContainerRuntime for FakeRuntime {
    fn run_step(
        &self,
        step: TaskStep,
        ctx: StepContext,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            {
                let mut guard = self.executed.lock().unwrap();
                guard.push(step.clone());
            }

            if self.pause_on == Some(step.kind()) {
                self.paused.notify_one();
                self.resumed.notified().await;
            }

            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            if self.step_delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(self.step_delay).await;
            }

            let result = self.perform(step, &ctx).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            result
        })
    }
}

/// Event sink that keeps every event it is given.
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<TaskEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<TaskEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl TaskEventSink for RecordingEventSink {
    fn post_event(&self, event: &TaskEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
