// src/stages/run_planner.rs

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::config::model::{BuildImage, ImageSource, PullImage};
use crate::dag::DependencyGraph;
use crate::rules::{StepRule, run};
use crate::stages::Stage;
use crate::types::RuntimeType;

/// Builds the run stage: everything needed to get the task container running.
#[derive(Debug, Clone)]
pub struct RunStagePlanner {
    runtime_type: RuntimeType,
    project_name: String,
}

impl RunStagePlanner {
    pub fn new(runtime_type: RuntimeType, project_name: impl Into<String>) -> Self {
        Self {
            runtime_type,
            project_name: project_name.into(),
        }
    }

    pub fn create_stage(&self, graph: &DependencyGraph) -> Stage {
        let mut rules: Vec<StepRule> = vec![run::create_task_network(self.runtime_type)];

        let caches: BTreeSet<String> = graph
            .all_nodes()
            .flat_map(|node| node.container().caches.iter().map(|c| c.name.clone()))
            .collect();
        if !caches.is_empty() {
            rules.push(run::initialise_caches(caches));
        }

        // One image rule per distinct source.
        let mut pulls: BTreeSet<PullImage> = BTreeSet::new();
        let mut builds: BTreeMap<BuildImage, BTreeSet<String>> = BTreeMap::new();
        for node in graph.all_nodes() {
            match &node.container().image_source {
                ImageSource::Pull(source) => {
                    pulls.insert(source.clone());
                }
                ImageSource::Build(source) => {
                    builds
                        .entry(source.clone())
                        .or_default()
                        .insert(format!("{}-{}", self.project_name, node.name()));
                }
            }
        }
        rules.extend(pulls.into_iter().map(run::pull_image));
        rules.extend(
            builds
                .into_iter()
                .map(|(source, tags)| run::build_image(source, tags)),
        );

        for node in graph.all_nodes() {
            rules.push(run::create_container(node));
            rules.push(run::run_container(node));
            rules.push(run::wait_for_container_to_become_healthy(node));
            rules.push(run::run_setup_commands(node));
        }

        debug!(
            task = %graph.task_name(),
            rules = rules.len(),
            "planned run stage"
        );

        Stage::run(graph.task_container_name(), rules)
    }
}
