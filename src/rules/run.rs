// src/rules/run.rs

use std::collections::BTreeSet;

use crate::config::model::{BuildImage, ImageSource, PullImage};
use crate::dag::GraphNode;
use crate::model::{ContainerName, EventSet, TaskStep};
use crate::rules::StepRule;
use crate::types::RuntimeType;

/// Ready immediately.
pub fn create_task_network(runtime_type: RuntimeType) -> StepRule {
    StepRule::new("create task network", move |_| {
        Some(TaskStep::CreateTaskNetwork { runtime_type })
    })
}

/// Ready immediately.
pub fn initialise_caches(caches: BTreeSet<String>) -> StepRule {
    StepRule::new("initialise caches", move |_| {
        Some(TaskStep::InitialiseCaches {
            caches: caches.clone(),
        })
    })
}

/// Ready immediately.
pub fn pull_image(source: PullImage) -> StepRule {
    StepRule::new(format!("pull image '{}'", source.image_name), move |_| {
        Some(TaskStep::PullImage {
            source: source.clone(),
        })
    })
}

/// Ready immediately. `image_tags` covers every container built from `source`.
pub fn build_image(source: BuildImage, image_tags: BTreeSet<String>) -> StepRule {
    StepRule::new(
        format!("build image from '{}'", source.build_directory.display()),
        move |_| {
            Some(TaskStep::BuildImage {
                source: source.clone(),
                image_tags: image_tags.clone(),
            })
        },
    )
}

/// Ready once the task network exists, the container's image has been pulled
/// or built, and (for containers with cache mounts) caches are initialised.
pub fn create_container(node: &GraphNode) -> StepRule {
    let container = node.container().clone();
    let config = node.config().clone();

    StepRule::new(format!("create container '{}'", container.name), move |events| {
        let network = events.network()?;
        let image = match &container.image_source {
            ImageSource::Pull(source) => events.pulled_image(source)?,
            ImageSource::Build(source) => events.built_image(source)?,
        };

        if container.has_cache_mounts() && !events.caches_initialised() {
            return None;
        }

        Some(TaskStep::CreateContainer {
            container: container.clone(),
            config: config.clone(),
            image: image.clone(),
            network: network.clone(),
        })
    })
}

/// Ready once the container exists and every direct dependency is ready.
pub fn run_container(node: &GraphNode) -> StepRule {
    let container = node.name().to_string();
    let dependencies = node.depends_on_containers().clone();
    let attach = node.is_task_container();

    StepRule::new(format!("run container '{}'", container), move |events| {
        let handle = events.created_container(&container)?;

        if !all_ready(events, &dependencies) {
            return None;
        }

        Some(TaskStep::RunContainer {
            container: container.clone(),
            handle: handle.clone(),
            attach,
        })
    })
}

/// Ready once the container has started.
pub fn wait_for_container_to_become_healthy(node: &GraphNode) -> StepRule {
    let container = node.name().to_string();

    StepRule::new(
        format!("wait for container '{}' to become healthy", container),
        move |events| {
            if !events.has_started(&container) {
                return None;
            }

            let handle = events.created_container(&container)?;
            Some(TaskStep::WaitForContainerToBecomeHealthy {
                container: container.clone(),
                handle: handle.clone(),
            })
        },
    )
}

/// Ready once the container is healthy. Runs even with no commands: the step
/// is what marks the container ready.
pub fn run_setup_commands(node: &GraphNode) -> StepRule {
    let container = node.name().to_string();
    let commands = node.container().setup_commands.clone();
    let config = node.config().clone();

    StepRule::new(
        format!("run setup commands for container '{}'", container),
        move |events| {
            if !events.became_healthy(&container) {
                return None;
            }

            let handle = events.created_container(&container)?;
            Some(TaskStep::RunContainerSetupCommands {
                container: container.clone(),
                handle: handle.clone(),
                commands: commands.clone(),
                config: config.clone(),
            })
        },
    )
}

fn all_ready(events: &EventSet, containers: &BTreeSet<ContainerName>) -> bool {
    containers.iter().all(|c| events.became_ready(c))
}
