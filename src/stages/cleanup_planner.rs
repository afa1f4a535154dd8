// src/stages/cleanup_planner.rs

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use tracing::debug;

use crate::dag::DependencyGraph;
use crate::model::{ContainerName, EventSet, RuntimeContainer, TaskEvent};
use crate::rules::{ManualCleanupCommand, StepRule, cleanup};
use crate::stages::Stage;
use crate::types::{CleanupOption, OperatingSystem};

/// Builds the cleanup stage from what the run stage actually created.
#[derive(Debug, Clone, Copy)]
pub struct CleanupStagePlanner {
    os: OperatingSystem,
}

impl CleanupStagePlanner {
    pub fn new(os: OperatingSystem) -> Self {
        Self { os }
    }

    /// Plan teardown of every resource with a creation event in `events`.
    ///
    /// With [`CleanupOption::DontCleanup`] only the stop rules are kept; the
    /// manual cleanup commands always cover everything that was created.
    pub fn create_stage(
        &self,
        graph: &DependencyGraph,
        events: &EventSet,
        option: CleanupOption,
    ) -> Stage {
        let created: BTreeMap<ContainerName, RuntimeContainer> = graph
            .all_nodes()
            .filter_map(|node| {
                events
                    .created_container(node.name())
                    .map(|handle| (node.name().to_string(), handle.clone()))
            })
            .collect();

        let started: BTreeSet<ContainerName> = created
            .keys()
            .filter(|name| events.has_started(name))
            .cloned()
            .collect();

        let mut stop_rules: Vec<StepRule> = Vec::new();
        for name in &started {
            let Some(node) = graph.node_for(name) else {
                continue;
            };
            let must_stop_first: BTreeSet<ContainerName> = node
                .depended_on_by_containers()
                .intersection(&started)
                .cloned()
                .collect();

            stop_rules.push(cleanup::stop_container(
                name.clone(),
                created[name].clone(),
                must_stop_first,
            ));
        }

        let mut other_rules: Vec<StepRule> = Vec::new();
        for (name, handle) in &created {
            other_rules.push(cleanup::remove_container(
                name.clone(),
                handle.clone(),
                started.contains(name),
            ));
        }

        if let Some(network) = events.network() {
            other_rules.push(cleanup::delete_task_network(
                network.clone(),
                created.keys().cloned().collect(),
            ));
        }

        for (path, container) in temporary_files(events) {
            let owner = container.filter(|c| created.contains_key(c));
            other_rules.push(cleanup::delete_temporary_file(path, owner, self.os));
        }

        for (path, container) in temporary_directories(events) {
            let owner = container.filter(|c| created.contains_key(c));
            other_rules.push(cleanup::delete_temporary_directory(path, owner, self.os));
        }

        let manual_cleanup: Vec<ManualCleanupCommand> = other_rules
            .iter()
            .filter_map(|rule| rule.manual_cleanup().cloned())
            .collect();

        let mut rules = stop_rules;
        if option == CleanupOption::Cleanup {
            rules.extend(other_rules);
        }

        debug!(
            created = created.len(),
            started = started.len(),
            rules = rules.len(),
            ?option,
            "planned cleanup stage"
        );

        Stage::cleanup(rules, manual_cleanup)
    }
}

fn temporary_files(events: &EventSet) -> BTreeSet<(PathBuf, Option<ContainerName>)> {
    events
        .iter()
        .filter_map(|e| match e {
            TaskEvent::TemporaryFileCreated { container, path } => {
                Some((path.clone(), Some(container.clone())))
            }
            _ => None,
        })
        .collect()
}

fn temporary_directories(events: &EventSet) -> BTreeSet<(PathBuf, Option<ContainerName>)> {
    events
        .iter()
        .filter_map(|e| match e {
            TaskEvent::TemporaryDirectoryCreated { container, path } => {
                Some((path.clone(), Some(container.clone())))
            }
            _ => None,
        })
        .collect()
}
