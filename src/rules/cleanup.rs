// src/rules/cleanup.rs

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::model::{ContainerName, RuntimeContainer, RuntimeNetwork, TaskStep};
use crate::rules::{CleanupResource, ManualCleanupCommand, ManualCleanupSortOrder, StepRule};
use crate::types::OperatingSystem;

/// Ready once every container in `must_stop_first` has stopped.
///
/// `must_stop_first` holds the started containers that depend on this one.
pub fn stop_container(
    container: ContainerName,
    handle: RuntimeContainer,
    must_stop_first: BTreeSet<ContainerName>,
) -> StepRule {
    StepRule::new(format!("stop container '{}'", container), move |events| {
        if !must_stop_first.iter().all(|c| events.has_stopped(c)) {
            return None;
        }

        Some(TaskStep::StopContainer {
            container: container.clone(),
            handle: handle.clone(),
        })
    })
}

/// Ready immediately if the container never started, otherwise once it has
/// stopped.
pub fn remove_container(
    container: ContainerName,
    handle: RuntimeContainer,
    was_started: bool,
) -> StepRule {
    let manual = ManualCleanupCommand {
        order: ManualCleanupSortOrder::RemoveContainers,
        resource: CleanupResource::Container(container.clone()),
        command: format!("docker rm --force --volumes {}", handle.id),
    };

    StepRule::new(format!("remove container '{}'", container), move |events| {
        if was_started && !events.has_stopped(&container) {
            return None;
        }

        Some(TaskStep::RemoveContainer {
            container: container.clone(),
            handle: handle.clone(),
        })
    })
    .with_manual_cleanup(manual)
}

/// Ready once every container in `containers_to_remove` has been removed.
pub fn delete_task_network(
    network: RuntimeNetwork,
    containers_to_remove: BTreeSet<ContainerName>,
) -> StepRule {
    let manual = ManualCleanupCommand {
        order: ManualCleanupSortOrder::DeleteTaskNetwork,
        resource: CleanupResource::Network,
        command: format!("docker network rm {}", network.id),
    };

    StepRule::new("delete task network", move |events| {
        if !containers_to_remove.iter().all(|c| events.has_removed(c)) {
            return None;
        }

        Some(TaskStep::DeleteTaskNetwork {
            network: network.clone(),
        })
    })
    .with_manual_cleanup(manual)
}

/// Ready immediately, or once `container` has been removed if given.
pub fn delete_temporary_file(
    path: PathBuf,
    container: Option<ContainerName>,
    os: OperatingSystem,
) -> StepRule {
    let shown = path.display().to_string();
    let command = match os {
        OperatingSystem::Windows => format!(
            "Remove-Item {shown} (if using PowerShell) or del {shown} (if using Command Prompt)"
        ),
        OperatingSystem::Other => format!("rm {shown}"),
    };
    let manual = ManualCleanupCommand {
        order: ManualCleanupSortOrder::DeleteTemporaryFiles,
        resource: CleanupResource::File(path.clone()),
        command,
    };

    StepRule::new(format!("delete temporary file '{}'", shown), move |events| {
        if let Some(container) = &container {
            if !events.has_removed(container) {
                return None;
            }
        }

        Some(TaskStep::DeleteTemporaryFile { path: path.clone() })
    })
    .with_manual_cleanup(manual)
}

/// Ready immediately, or once `container` has been removed if given.
pub fn delete_temporary_directory(
    path: PathBuf,
    container: Option<ContainerName>,
    os: OperatingSystem,
) -> StepRule {
    let shown = path.display().to_string();
    let command = match os {
        OperatingSystem::Windows => format!(
            "Remove-Item -Recurse {shown} (if using PowerShell) or rmdir /s /q {shown} (if using Command Prompt)"
        ),
        OperatingSystem::Other => format!("rm -rf {shown}"),
    };
    let manual = ManualCleanupCommand {
        order: ManualCleanupSortOrder::DeleteTemporaryDirectories,
        resource: CleanupResource::Directory(path.clone()),
        command,
    };

    StepRule::new(
        format!("delete temporary directory '{}'", shown),
        move |events| {
            if let Some(container) = &container {
                if !events.has_removed(container) {
                    return None;
                }
            }

            Some(TaskStep::DeleteTemporaryDirectory { path: path.clone() })
        },
    )
    .with_manual_cleanup(manual)
}
