// tests/state_machine.rs

mod common;
use crate::common::builders::{ConfigFileBuilder, ContainerBuilder, TaskBuilder};
use crate::common::{graph_for, init_tracing};

use taskyard::config::ConfigFile;
use taskyard::engine::{ManualCleanupReason, TaskStateMachine};
use taskyard::model::{
    RuntimeContainer, RuntimeImage, RuntimeNetwork, StepKind, TaskEvent, TaskStep,
};
use taskyard::stages::{CleanupStagePlanner, RunStagePlanner};
use taskyard::types::{CleanupOption, OperatingSystem, RuntimeType};

fn machine(
    cfg: &ConfigFile,
    task: &str,
    after_success: CleanupOption,
    after_failure: CleanupOption,
) -> TaskStateMachine {
    let graph = graph_for(cfg, task);
    TaskStateMachine::new(
        graph,
        &RunStagePlanner::new(RuntimeType::Linux, cfg.project_name.clone()),
        CleanupStagePlanner::new(OperatingSystem::Other),
        after_success,
        after_failure,
    )
}

/// Events a well-behaved runtime would post for `step`.
fn success_events(step: &TaskStep, task_exit_code: i64) -> Vec<TaskEvent> {
    match step.clone() {
        TaskStep::CreateTaskNetwork { .. } => vec![TaskEvent::TaskNetworkCreated {
            network: RuntimeNetwork::new("net-1"),
        }],
        TaskStep::InitialiseCaches { .. } => vec![TaskEvent::CachesInitialised],
        TaskStep::PullImage { source } => {
            let image = RuntimeImage::new(source.image_name.clone());
            vec![TaskEvent::ImagePulled { source, image }]
        }
        TaskStep::BuildImage { source, .. } => vec![TaskEvent::ImageBuilt {
            source,
            image: RuntimeImage::new("sha256:1"),
        }],
        TaskStep::CreateContainer { container, .. } => vec![TaskEvent::ContainerCreated {
            handle: RuntimeContainer::new(format!("{}-id", container.name), container.name.clone()),
            container: container.name,
        }],
        TaskStep::RunContainer {
            container, attach, ..
        } => {
            let mut events = vec![TaskEvent::ContainerStarted {
                container: container.clone(),
            }];
            if attach {
                events.push(TaskEvent::RunningContainerExited {
                    container,
                    exit_code: task_exit_code,
                });
            }
            events
        }
        TaskStep::WaitForContainerToBecomeHealthy { container, .. } => {
            vec![TaskEvent::ContainerBecameHealthy { container }]
        }
        TaskStep::RunContainerSetupCommands { container, .. } => {
            vec![TaskEvent::ContainerBecameReady { container }]
        }
        TaskStep::StopContainer { container, .. } => vec![TaskEvent::ContainerStopped { container }],
        TaskStep::RemoveContainer { container, .. } => {
            vec![TaskEvent::ContainerRemoved { container }]
        }
        TaskStep::DeleteTaskNetwork { .. } => vec![TaskEvent::TaskNetworkDeleted],
        TaskStep::DeleteTemporaryFile { path } => vec![TaskEvent::TemporaryFileDeleted { path }],
        TaskStep::DeleteTemporaryDirectory { path } => {
            vec![TaskEvent::TemporaryDirectoryDeleted { path }]
        }
    }
}

/// Run steps one at a time until the machine has nothing more to offer.
fn drive<F>(sm: &mut TaskStateMachine, mut respond: F) -> Vec<TaskStep>
where
    F: FnMut(&TaskStep) -> Vec<TaskEvent>,
{
    let mut executed = Vec::new();
    while let Some(step) = sm.pop_next_step(false) {
        for event in respond(&step) {
            sm.post_event(event);
        }
        executed.push(step);
    }
    executed
}

fn kinds(steps: &[TaskStep]) -> Vec<StepKind> {
    steps.iter().map(TaskStep::kind).collect()
}

#[test]
fn single_container_runs_then_cleans_up() {
    init_tracing();

    let cfg = common::single_container_config();
    let mut sm = machine(&cfg, "hello", CleanupOption::Cleanup, CleanupOption::Cleanup);

    let steps = drive(&mut sm, |step| success_events(step, 0));

    assert_eq!(
        kinds(&steps),
        vec![
            StepKind::CreateTaskNetwork,
            StepKind::PullImage,
            StepKind::CreateContainer,
            StepKind::RunContainer,
            StepKind::StopContainer,
            StepKind::RemoveContainer,
            StepKind::DeleteTaskNetwork,
        ]
    );
    assert!(sm.is_finished());
    assert!(!sm.task_has_failed());

    let outcome = sm.outcome();
    assert_eq!(outcome.exit_code, 0);
    assert!(outcome.manual_cleanup.is_none());
}

#[test]
fn task_exit_code_is_reported() {
    let cfg = common::single_container_config();
    let mut sm = machine(&cfg, "hello", CleanupOption::Cleanup, CleanupOption::Cleanup);

    drive(&mut sm, |step| success_events(step, 3));

    assert_eq!(sm.exit_code(), 3);
}

#[test]
fn exit_code_outside_i32_range_is_a_failure_code() {
    let cfg = common::single_container_config();
    let mut sm = machine(&cfg, "hello", CleanupOption::Cleanup, CleanupOption::Cleanup);

    drive(&mut sm, |step| success_events(step, i64::from(i32::MAX) + 1));

    assert_eq!(sm.exit_code(), -1);
}

#[test]
fn failure_drains_running_steps_before_cleanup() {
    let cfg = common::single_container_config();
    let mut sm = machine(&cfg, "hello", CleanupOption::Cleanup, CleanupOption::Cleanup);

    let network = sm.pop_next_step(false).expect("network step");
    assert_eq!(network.kind(), StepKind::CreateTaskNetwork);
    let pull = sm.pop_next_step(true).expect("pull step");
    assert_eq!(pull.kind(), StepKind::PullImage);

    for event in success_events(&network, 0) {
        sm.post_event(event);
    }
    sm.post_event(TaskEvent::ImagePullFailed {
        source: taskyard::config::PullImage::new("alpine:3.7"),
        message: "not found".to_string(),
    });
    assert!(sm.task_has_failed());

    // Another step is still running: nothing new is handed out.
    assert!(sm.pop_next_step(true).is_none());
    assert!(sm.in_run_stage());

    // Once it finishes, cleanup starts: only the network was created.
    let cleanup = sm.pop_next_step(false).expect("cleanup step");
    assert_eq!(
        cleanup,
        TaskStep::DeleteTaskNetwork {
            network: RuntimeNetwork::new("net-1")
        }
    );
    assert!(!sm.in_run_stage());

    sm.post_event(TaskEvent::TaskNetworkDeleted);
    assert!(sm.pop_next_step(false).is_none());
    assert!(sm.is_finished());
    assert_eq!(sm.exit_code(), -1);
}

#[test]
fn stalled_run_stage_fails_the_task() {
    let cfg = common::single_container_config();
    let mut sm = machine(&cfg, "hello", CleanupOption::Cleanup, CleanupOption::Cleanup);

    // The runtime never reports anything for the image pull.
    let steps = drive(&mut sm, |step| match step.kind() {
        StepKind::PullImage => vec![],
        _ => success_events(step, 0),
    });

    assert_eq!(
        kinds(&steps),
        vec![
            StepKind::CreateTaskNetwork,
            StepKind::PullImage,
            StepKind::DeleteTaskNetwork,
        ]
    );
    assert!(sm.events().contains(&TaskEvent::ExecutionFailed {
        message: "None of the remaining steps are ready to execute, but there are no steps currently running.".to_string(),
    }));
    assert_eq!(sm.exit_code(), -1);
}

#[test]
fn informational_and_duplicate_events_are_not_stored() {
    let cfg = common::single_container_config();
    let mut sm = machine(&cfg, "hello", CleanupOption::Cleanup, CleanupOption::Cleanup);

    let step = sm.pop_next_step(false).unwrap();
    assert!(!sm.post_event(TaskEvent::StepStarting { step }));
    assert!(sm.events().is_empty());

    assert!(sm.post_event(TaskEvent::CachesInitialised));
    assert!(!sm.post_event(TaskEvent::CachesInitialised));
    assert_eq!(sm.events().len(), 1);
}

#[test]
fn unhealthy_dependency_ends_run_stage_and_cleans_up() {
    let cfg = ConfigFileBuilder::new()
        .with_container(
            "db",
            ContainerBuilder::pull("postgres")
                .health_check("pg_isready", "1s", 3)
                .build(),
        )
        .with_container("app", ContainerBuilder::pull("alpine").depends_on("db").build())
        .with_task("t", TaskBuilder::new("app").build())
        .build();
    let mut sm = machine(&cfg, "t", CleanupOption::Cleanup, CleanupOption::Cleanup);

    let steps = drive(&mut sm, |step| match step {
        TaskStep::WaitForContainerToBecomeHealthy { container, .. } if container == "db" => {
            vec![TaskEvent::ContainerDidNotBecomeHealthy {
                container: container.clone(),
                message: "unhealthy".to_string(),
            }]
        }
        _ => success_events(step, 0),
    });

    // `app` was created but never started, so it's removed without a stop.
    let app_steps: Vec<StepKind> = steps
        .iter()
        .filter(|s| s.container_name() == Some("app"))
        .map(TaskStep::kind)
        .collect();
    assert_eq!(
        app_steps,
        vec![StepKind::CreateContainer, StepKind::RemoveContainer]
    );

    let db_steps: Vec<StepKind> = steps
        .iter()
        .filter(|s| s.container_name() == Some("db"))
        .map(TaskStep::kind)
        .collect();
    assert_eq!(
        db_steps,
        vec![
            StepKind::CreateContainer,
            StepKind::RunContainer,
            StepKind::WaitForContainerToBecomeHealthy,
            StepKind::StopContainer,
            StepKind::RemoveContainer,
        ]
    );

    assert_eq!(sm.exit_code(), -1);
    assert!(sm.outcome().manual_cleanup.is_none());
}

#[test]
fn dont_cleanup_after_failure_skips_cleanup_entirely() {
    let cfg = common::single_container_config();
    let mut sm = machine(&cfg, "hello", CleanupOption::Cleanup, CleanupOption::DontCleanup);

    let steps = drive(&mut sm, |step| match step {
        TaskStep::RunContainer { container, .. } => vec![TaskEvent::ContainerRunFailed {
            container: container.clone(),
            message: "cannot start".to_string(),
        }],
        _ => success_events(step, 0),
    });

    assert_eq!(steps.last().map(TaskStep::kind), Some(StepKind::RunContainer));
    assert!(sm.is_finished());

    let outcome = sm.outcome();
    assert_eq!(outcome.exit_code, -1);
    let manual = outcome.manual_cleanup.expect("manual cleanup instructions");
    assert_eq!(manual.reason, ManualCleanupReason::CleanupDisabledAfterFailure);
    assert_eq!(
        manual.commands,
        vec![
            "docker rm --force --volumes app-id".to_string(),
            "docker network rm net-1".to_string(),
        ]
    );
}

#[test]
fn dont_cleanup_after_failure_still_cleans_up_when_no_container_was_created() {
    let cfg = common::single_container_config();
    let mut sm = machine(&cfg, "hello", CleanupOption::Cleanup, CleanupOption::DontCleanup);

    let steps = drive(&mut sm, |step| match step {
        TaskStep::PullImage { source } => vec![TaskEvent::ImagePullFailed {
            source: source.clone(),
            message: "nope".to_string(),
        }],
        _ => success_events(step, 0),
    });

    assert_eq!(steps.last().map(TaskStep::kind), Some(StepKind::DeleteTaskNetwork));
    assert!(sm.outcome().manual_cleanup.is_none());
}

#[test]
fn dont_cleanup_after_success_only_stops_containers_and_fails_the_run() {
    let cfg = common::single_container_config();
    let mut sm = machine(&cfg, "hello", CleanupOption::DontCleanup, CleanupOption::Cleanup);

    let steps = drive(&mut sm, |step| success_events(step, 0));

    assert_eq!(steps.last().map(TaskStep::kind), Some(StepKind::StopContainer));
    assert!(!sm.task_has_failed());

    let outcome = sm.outcome();
    assert_eq!(outcome.exit_code, -1);
    let manual = outcome.manual_cleanup.expect("manual cleanup instructions");
    assert_eq!(manual.reason, ManualCleanupReason::CleanupDisabledAfterSuccess);
    assert_eq!(
        manual.commands,
        vec![
            "docker rm --force --volumes app-id".to_string(),
            "docker network rm net-1".to_string(),
        ]
    );
}

#[test]
fn failed_cleanup_reports_remaining_resources_and_fails_the_run() {
    let cfg = common::single_container_config();
    let mut sm = machine(&cfg, "hello", CleanupOption::Cleanup, CleanupOption::Cleanup);

    let steps = drive(&mut sm, |step| match step {
        TaskStep::RemoveContainer { container, .. } => vec![TaskEvent::ContainerRemovalFailed {
            container: container.clone(),
            message: "busy".to_string(),
        }],
        _ => success_events(step, 0),
    });

    // The network can't be deleted while the container is still there.
    assert!(!kinds(&steps).contains(&StepKind::DeleteTaskNetwork));
    assert!(sm.cleanup_failed());
    assert!(!sm.task_has_failed());

    let outcome = sm.outcome();
    assert_eq!(outcome.exit_code, -1);
    let manual = outcome.manual_cleanup.expect("manual cleanup instructions");
    assert_eq!(manual.reason, ManualCleanupReason::CleanupFailed);
    assert_eq!(
        manual.commands,
        vec![
            "docker rm --force --volumes app-id".to_string(),
            "docker network rm net-1".to_string(),
        ]
    );
}

#[test]
fn failed_stop_overrides_the_task_exit_code() {
    let cfg = common::single_container_config();
    let mut sm = machine(&cfg, "hello", CleanupOption::Cleanup, CleanupOption::Cleanup);

    drive(&mut sm, |step| match step {
        TaskStep::StopContainer { container, .. } => vec![TaskEvent::ContainerStopFailed {
            container: container.clone(),
            message: "stop failed".to_string(),
        }],
        _ => success_events(step, 3),
    });

    assert!(sm.is_finished());
    assert_eq!(sm.events().exit_code_of("app"), Some(3));
    assert_eq!(sm.exit_code(), -1);
}

#[test]
fn interruption_during_cleanup_is_a_cleanup_failure() {
    let cfg = common::single_container_config();
    let mut sm = machine(&cfg, "hello", CleanupOption::Cleanup, CleanupOption::Cleanup);

    let steps = drive(&mut sm, |step| match step {
        TaskStep::StopContainer { container, .. } => vec![
            TaskEvent::UserInterruptedExecution,
            TaskEvent::ContainerStopped {
                container: container.clone(),
            },
        ],
        _ => success_events(step, 0),
    });

    assert_eq!(steps.last().map(TaskStep::kind), Some(StepKind::DeleteTaskNetwork));
    assert!(sm.cleanup_failed());
    assert!(!sm.task_has_failed());

    let outcome = sm.outcome();
    assert_eq!(outcome.exit_code, -1);
    assert!(outcome.manual_cleanup.is_none());
}
