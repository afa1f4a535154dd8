#![allow(dead_code)]

pub use taskyard_test_utils::builders;
pub use taskyard_test_utils::fake_runtime;
pub use taskyard_test_utils::{init_tracing, with_timeout};

use taskyard::config::ConfigFile;
use taskyard::dag::DependencyGraph;

use self::builders::{ConfigFileBuilder, ContainerBuilder, TaskBuilder};

/// Single container pulling `alpine:3.7` that runs `echo hi`.
pub fn single_container_config() -> ConfigFile {
    ConfigFileBuilder::new()
        .with_project_name("demo")
        .with_container("app", ContainerBuilder::pull("alpine:3.7").command("echo hi").build())
        .with_task("hello", TaskBuilder::new("app").build())
        .build()
}

/// `b` (the task container) depends on `a`; both images are built.
pub fn two_built_containers_config() -> ConfigFile {
    ConfigFileBuilder::new()
        .with_project_name("demo")
        .with_container("a", ContainerBuilder::build_from("./a").build())
        .with_container("b", ContainerBuilder::build_from("./b").depends_on("a").build())
        .with_task("test", TaskBuilder::new("b").build())
        .build()
}

pub fn graph_for(cfg: &ConfigFile, task: &str) -> DependencyGraph {
    DependencyGraph::for_task(cfg, task).expect("graph should build")
}
