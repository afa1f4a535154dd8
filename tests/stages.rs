// tests/stages.rs

mod common;
use crate::common::builders::{ConfigFileBuilder, ContainerBuilder, TaskBuilder};
use crate::common::graph_for;

use std::path::PathBuf;

use taskyard::config::PullImage;
use taskyard::model::{
    EventSet, RuntimeContainer, RuntimeImage, RuntimeNetwork, StepKind, TaskEvent, TaskStep,
};
use taskyard::rules::{CleanupResource, ManualCleanupSortOrder};
use taskyard::stages::{CleanupStagePlanner, NextStep, RunStagePlanner, Stage};
use taskyard::types::{CleanupOption, OperatingSystem, RuntimeType};

fn created(container: &str) -> TaskEvent {
    TaskEvent::ContainerCreated {
        container: container.to_string(),
        handle: RuntimeContainer::new(format!("{}-id", container), container),
    }
}

fn started(container: &str) -> TaskEvent {
    TaskEvent::ContainerStarted {
        container: container.to_string(),
    }
}

fn network_created() -> TaskEvent {
    TaskEvent::TaskNetworkCreated {
        network: RuntimeNetwork::new("net-1"),
    }
}

/// Pop every ready step without posting any events.
fn drain_ready(stage: &mut Stage, events: &EventSet) -> Vec<TaskStep> {
    let mut steps = Vec::new();
    while let NextStep::Ready(step) = stage.pop_next_step(events, true) {
        steps.push(step);
    }
    steps
}

#[test]
fn run_stage_plans_network_images_and_four_rules_per_container() {
    let cfg = ConfigFileBuilder::new()
        .with_project_name("shop")
        .with_container("db", ContainerBuilder::pull("postgres:16").build())
        .with_container("db-replica", ContainerBuilder::pull("postgres:16").build())
        .with_container("api", ContainerBuilder::build_from("./svc").build())
        .with_container(
            "app",
            ContainerBuilder::build_from("./svc")
                .cache("cargo", "/cargo")
                .depends_on("db")
                .depends_on("db-replica")
                .depends_on("api")
                .build(),
        )
        .with_task("t", TaskBuilder::new("app").build())
        .build();
    let graph = graph_for(&cfg, "t");

    let mut stage = RunStagePlanner::new(RuntimeType::Linux, "shop").create_stage(&graph);
    // network + caches + 1 pull + 1 build + 4 per container
    assert_eq!(stage.remaining_rules().len(), 4 + 4 * 4);

    let initial = drain_ready(&mut stage, &EventSet::new());
    let kinds: Vec<StepKind> = initial.iter().map(TaskStep::kind).collect();
    assert_eq!(
        kinds,
        vec![
            StepKind::CreateTaskNetwork,
            StepKind::InitialiseCaches,
            StepKind::PullImage,
            StepKind::BuildImage,
        ]
    );

    let build = initial
        .iter()
        .find(|s| s.kind() == StepKind::BuildImage)
        .unwrap();
    match build {
        TaskStep::BuildImage { image_tags, .. } => {
            let tags: Vec<&str> = image_tags.iter().map(String::as_str).collect();
            assert_eq!(tags, vec!["shop-api", "shop-app"]);
        }
        _ => unreachable!(),
    }
}

#[test]
fn rule_fires_only_once_even_if_event_is_posted_twice() {
    let cfg = common::single_container_config();
    let graph = graph_for(&cfg, "hello");
    let mut stage = RunStagePlanner::new(RuntimeType::Linux, "demo").create_stage(&graph);

    let mut events = EventSet::new();
    let _ = drain_ready(&mut stage, &events);

    assert!(events.insert(network_created()));
    assert!(!events.insert(network_created()));
    let pulled = TaskEvent::ImagePulled {
        source: PullImage::new("alpine:3.7"),
        image: RuntimeImage::new("alpine:3.7"),
    };
    events.insert(pulled.clone());
    events.insert(pulled);

    let steps = drain_ready(&mut stage, &events);
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].kind(), StepKind::CreateContainer);

    assert!(drain_ready(&mut stage, &events).is_empty());
}

#[test]
fn run_stage_completes_once_task_container_exits_even_with_rules_left() {
    let cfg = common::single_container_config();
    let graph = graph_for(&cfg, "hello");
    let mut stage = RunStagePlanner::new(RuntimeType::Linux, "demo").create_stage(&graph);

    let events: EventSet = vec![
        TaskEvent::RunningContainerExited {
            container: "app".to_string(),
            exit_code: 0,
        },
    ]
    .into_iter()
    .collect();

    // Still running steps: keep handing out work.
    assert!(matches!(stage.pop_next_step(&events, true), NextStep::Ready(_)));
    assert!(!stage.remaining_rules().is_empty());

    assert_eq!(stage.pop_next_step(&events, false), NextStep::Complete);
}

#[test]
fn run_stage_reports_stall_when_nothing_can_progress() {
    let cfg = common::single_container_config();
    let graph = graph_for(&cfg, "hello");
    let mut stage = RunStagePlanner::new(RuntimeType::Linux, "demo").create_stage(&graph);
    let events = EventSet::new();

    let _ = drain_ready(&mut stage, &events);
    assert_eq!(stage.pop_next_step(&events, true), NextStep::NotReady);
    assert_eq!(stage.pop_next_step(&events, false), NextStep::Stalled);
}

#[test]
fn cleanup_stage_only_covers_created_resources() {
    let cfg = common::two_built_containers_config();
    let graph = graph_for(&cfg, "test");

    // `a` was created and started; `b` failed to be created.
    let events: EventSet = vec![
        network_created(),
        created("a"),
        started("a"),
        TaskEvent::ContainerCreationFailed {
            container: "b".to_string(),
            message: "boom".to_string(),
        },
    ]
    .into_iter()
    .collect();

    let mut stage = CleanupStagePlanner::new(OperatingSystem::Other).create_stage(
        &graph,
        &events,
        CleanupOption::Cleanup,
    );

    let descriptions: Vec<&str> = stage
        .remaining_rules()
        .iter()
        .map(|r| r.description())
        .collect();
    assert_eq!(
        descriptions,
        vec![
            "stop container 'a'",
            "remove container 'a'",
            "delete task network"
        ]
    );

    let steps = drain_ready(&mut stage, &events);
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].kind(), StepKind::StopContainer);
    assert_eq!(stage.pop_next_step(&events, false), NextStep::Complete);
}

#[test]
fn nothing_created_means_empty_cleanup() {
    let cfg = common::single_container_config();
    let graph = graph_for(&cfg, "hello");
    let events: EventSet = vec![TaskEvent::TaskNetworkCreationFailed {
        message: "no".to_string(),
    }]
    .into_iter()
    .collect();

    let mut stage = CleanupStagePlanner::new(OperatingSystem::Other).create_stage(
        &graph,
        &events,
        CleanupOption::Cleanup,
    );

    assert!(stage.remaining_rules().is_empty());
    assert!(stage.manual_cleanup_commands().is_empty());
    assert_eq!(stage.pop_next_step(&events, false), NextStep::Complete);
}

#[test]
fn dependents_are_stopped_before_their_dependencies() {
    let cfg = common::two_built_containers_config();
    let graph = graph_for(&cfg, "test");

    let mut events: EventSet = vec![
        network_created(),
        created("a"),
        started("a"),
        created("b"),
        started("b"),
    ]
    .into_iter()
    .collect();

    let mut stage = CleanupStagePlanner::new(OperatingSystem::Other).create_stage(
        &graph,
        &events,
        CleanupOption::Cleanup,
    );

    let first = drain_ready(&mut stage, &events);
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].container_name(), Some("b"));
    assert_eq!(first[0].kind(), StepKind::StopContainer);

    events.insert(TaskEvent::ContainerStopped {
        container: "b".to_string(),
    });
    let second = drain_ready(&mut stage, &events);
    let second: Vec<(StepKind, Option<&str>)> =
        second.iter().map(|s| (s.kind(), s.container_name())).collect();
    assert_eq!(
        second,
        vec![
            (StepKind::StopContainer, Some("a")),
            (StepKind::RemoveContainer, Some("b")),
        ]
    );
}

#[test]
fn dont_cleanup_keeps_only_stop_rules_but_reports_everything() {
    let cfg = common::two_built_containers_config();
    let graph = graph_for(&cfg, "test");
    let events: EventSet = vec![
        network_created(),
        created("a"),
        started("a"),
        created("b"),
        started("b"),
        TaskEvent::TemporaryFileCreated {
            container: "b".to_string(),
            path: PathBuf::from("/tmp/b.env"),
        },
        TaskEvent::TemporaryDirectoryCreated {
            container: "a".to_string(),
            path: PathBuf::from("/tmp/a-dir"),
        },
    ]
    .into_iter()
    .collect();

    let stage = CleanupStagePlanner::new(OperatingSystem::Other).create_stage(
        &graph,
        &events,
        CleanupOption::DontCleanup,
    );

    assert_eq!(stage.remaining_rules().len(), 2);
    assert!(
        stage
            .remaining_rules()
            .iter()
            .all(|r| r.description().starts_with("stop container"))
    );

    let commands: Vec<(ManualCleanupSortOrder, &str)> = stage
        .manual_cleanup_commands()
        .iter()
        .map(|c| (c.order, c.command.as_str()))
        .collect();
    assert_eq!(
        commands,
        vec![
            (ManualCleanupSortOrder::RemoveContainers, "docker rm --force --volumes a-id"),
            (ManualCleanupSortOrder::RemoveContainers, "docker rm --force --volumes b-id"),
            (ManualCleanupSortOrder::DeleteTaskNetwork, "docker network rm net-1"),
            (ManualCleanupSortOrder::DeleteTemporaryFiles, "rm /tmp/b.env"),
            (ManualCleanupSortOrder::DeleteTemporaryDirectories, "rm -rf /tmp/a-dir"),
        ]
    );

    let cleaned: EventSet = vec![TaskEvent::ContainerRemoved {
        container: "a".to_string(),
    }]
    .into_iter()
    .collect();
    assert!(CleanupResource::Container("a".to_string()).is_cleaned_up(&cleaned));
    assert!(!CleanupResource::Container("b".to_string()).is_cleaned_up(&cleaned));
}
