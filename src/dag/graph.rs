// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::config::model::{ConfigFile, Container, Task};
use crate::errors::{Result, TaskyardError};
use crate::model::ContainerName;

/// Run configuration of a container once task-level overrides are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ContainerRunConfig {
    pub command: Option<String>,
    pub environment: BTreeMap<String, String>,
    pub ports: Vec<String>,
    pub working_directory: Option<String>,
}

/// One container in the graph plus its resolved edges.
#[derive(Debug, Clone)]
pub struct GraphNode {
    container: Container,
    is_task_container: bool,
    /// Direct dependencies: containers that must be ready before this one runs.
    depends_on: BTreeSet<ContainerName>,
    /// Direct dependents: containers that list this one as a dependency.
    depended_on_by: BTreeSet<ContainerName>,
    config: ContainerRunConfig,
}

impl GraphNode {
    pub fn name(&self) -> &str {
        &self.container.name
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn is_task_container(&self) -> bool {
        self.is_task_container
    }

    pub fn depends_on_containers(&self) -> &BTreeSet<ContainerName> {
        &self.depends_on
    }

    pub fn depended_on_by_containers(&self) -> &BTreeSet<ContainerName> {
        &self.depended_on_by
    }

    pub fn config(&self) -> &ContainerRunConfig {
        &self.config
    }
}

/// Acyclic graph of every container a task needs, keyed by container name.
///
/// Built from the task container outwards: the task container depends on the
/// task's own `dependencies` plus its configured dependencies, and every other
/// container on its configured dependencies. Containers that are not reachable
/// from the task container are not part of the graph.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    task_name: String,
    task_container: ContainerName,
    nodes: BTreeMap<ContainerName, GraphNode>,
    /// Dependencies before dependents.
    startup_order: Vec<ContainerName>,
}

impl DependencyGraph {
    /// Look up `task_name` in `cfg` and build its graph.
    pub fn for_task(cfg: &ConfigFile, task_name: &str) -> Result<Self> {
        let task = cfg.tasks.get(task_name).ok_or_else(|| {
            TaskyardError::TaskNotFound(format!("The task '{}' does not exist.", task_name))
        })?;

        Self::new(cfg, task)
    }

    /// Build the graph for `task`.
    ///
    /// Fails if a referenced container does not exist, a container depends on
    /// itself, the task container is also listed as a task dependency, or the
    /// dependencies form a cycle.
    pub fn new(cfg: &ConfigFile, task: &Task) -> Result<Self> {
        let task_container_name = task.run.container.clone();

        if task.dependencies.contains(&task_container_name) {
            return Err(TaskyardError::TaskContainerIsDependency(format!(
                "The task '{}' cannot have the container '{}' as both the main task container and also a dependency.",
                task.name, task_container_name
            )));
        }

        let task_description = format!("task '{}'", task.name);
        let task_container = find_container(cfg, &task_container_name, &task_description)?;
        ensure_no_self_dependency(task_container)?;

        let mut root_deps = BTreeSet::new();
        for dep in &task.dependencies {
            find_container(cfg, dep, &task_description)?;
            root_deps.insert(dep.clone());
        }
        for dep in &task_container.dependencies {
            find_container(cfg, dep, &format!("container '{}'", task_container.name))?;
            root_deps.insert(dep.clone());
        }

        // Walk outwards from the task container, collecting direct edges.
        let mut direct: BTreeMap<ContainerName, BTreeSet<ContainerName>> = BTreeMap::new();
        direct.insert(task_container_name.clone(), root_deps);
        let mut stack: Vec<ContainerName> = vec![task_container_name.clone()];

        while let Some(name) = stack.pop() {
            let deps: Vec<ContainerName> = direct
                .get(&name)
                .map(|d| d.iter().cloned().collect())
                .unwrap_or_default();

            for dep in deps {
                if direct.contains_key(&dep) {
                    continue;
                }

                let container = find_container(cfg, &dep, &format!("container '{}'", name))?;
                ensure_no_self_dependency(container)?;
                for transitive in &container.dependencies {
                    find_container(cfg, transitive, &format!("container '{}'", container.name))?;
                }

                direct.insert(dep.clone(), container.dependencies.clone());
                stack.push(dep);
            }
        }

        let startup_order = startup_order(&task.name, &direct)?;

        let mut depended_on_by: BTreeMap<ContainerName, BTreeSet<ContainerName>> = direct
            .keys()
            .map(|name| (name.clone(), BTreeSet::new()))
            .collect();
        for (name, deps) in &direct {
            for dep in deps {
                if let Some(reverse) = depended_on_by.get_mut(dep) {
                    reverse.insert(name.clone());
                }
            }
        }

        let mut nodes = BTreeMap::new();
        for (name, deps) in direct {
            let Some(container) = cfg.containers.get(&name) else {
                continue;
            };
            let is_task_container = name == task_container_name;
            let config = if is_task_container {
                task_container_config(container, task)
            } else {
                own_config(container)
            };

            let node = GraphNode {
                container: container.clone(),
                is_task_container,
                depends_on: deps,
                depended_on_by: depended_on_by.remove(&name).unwrap_or_default(),
                config,
            };
            nodes.insert(name, node);
        }

        debug!(
            task = %task.name,
            containers = nodes.len(),
            ?startup_order,
            "built container dependency graph"
        );

        Ok(Self {
            task_name: task.name.clone(),
            task_container: task_container_name,
            nodes,
            startup_order,
        })
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// The node whose exit ends the run stage.
    pub fn task_container_node(&self) -> &GraphNode {
        // Inserted unconditionally during construction.
        &self.nodes[&self.task_container]
    }

    pub fn task_container_name(&self) -> &str {
        &self.task_container
    }

    pub fn all_nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn all_container_names(&self) -> BTreeSet<ContainerName> {
        self.nodes.keys().cloned().collect()
    }

    pub fn node_for(&self, container: &str) -> Option<&GraphNode> {
        self.nodes.get(container)
    }

    /// Containers ordered so that every container comes after its dependencies.
    pub fn startup_order(&self) -> &[ContainerName] {
        &self.startup_order
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn find_container<'a>(cfg: &'a ConfigFile, name: &str, referenced_by: &str) -> Result<&'a Container> {
    cfg.containers.get(name).ok_or_else(|| {
        TaskyardError::ContainerNotFound(format!(
            "The container '{}' referenced by {} does not exist.",
            name, referenced_by
        ))
    })
}

fn ensure_no_self_dependency(container: &Container) -> Result<()> {
    if container.dependencies.contains(&container.name) {
        return Err(TaskyardError::SelfDependency(format!(
            "The container '{}' cannot depend on itself.",
            container.name
        )));
    }
    Ok(())
}

/// Topologically sort the containers, failing with a readable description if
/// there is a cycle.
///
/// Edge direction: container -> dependency.
fn startup_order(
    task_name: &str,
    direct: &BTreeMap<ContainerName, BTreeSet<ContainerName>>,
) -> Result<Vec<ContainerName>> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in direct.keys() {
        graph.add_node(name.as_str());
    }
    for (name, deps) in direct {
        for dep in deps {
            graph.add_edge(name.as_str(), dep.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().rev().map(str::to_string).collect()),
        Err(cycle) => {
            let reported = cycle.node_id();
            let description = std::iter::once(reported)
                .chain(direct.keys().map(String::as_str))
                .find_map(|start| {
                    let mut path = vec![start.to_string()];
                    let mut visited = BTreeSet::new();
                    path_back_to(start, start, direct, &mut path, &mut visited).then_some(path)
                })
                .map(|path| describe_cycle(&path))
                .unwrap_or_else(|| format!("Container '{}' is part of a cycle.", reported));

            Err(TaskyardError::DependencyCycle(format!(
                "There is a dependency cycle in task '{}'. {}",
                task_name, description
            )))
        }
    }
}

fn path_back_to(
    start: &str,
    current: &str,
    direct: &BTreeMap<ContainerName, BTreeSet<ContainerName>>,
    path: &mut Vec<ContainerName>,
    visited: &mut BTreeSet<ContainerName>,
) -> bool {
    for dep in direct.get(current).into_iter().flatten() {
        if dep == start {
            path.push(dep.clone());
            return true;
        }

        if visited.insert(dep.clone()) {
            path.push(dep.clone());
            if path_back_to(start, dep, direct, path, visited) {
                return true;
            }
            path.pop();
        }
    }

    false
}

fn describe_cycle(path: &[ContainerName]) -> String {
    let names: Vec<String> = path.iter().map(|n| format!("'{}'", n)).collect();
    match names.split_first() {
        Some((first, rest)) => format!(
            "Container {} depends on {}.",
            first,
            rest.join(", which depends on ")
        ),
        None => String::new(),
    }
}

fn own_config(container: &Container) -> ContainerRunConfig {
    ContainerRunConfig {
        command: container.command.clone(),
        environment: container.environment.clone(),
        ports: container.ports.clone(),
        working_directory: container.working_directory.clone(),
    }
}

fn task_container_config(container: &Container, task: &Task) -> ContainerRunConfig {
    let mut config = own_config(container);

    if task.run.command.is_some() {
        config.command = task.run.command.clone();
    }
    config
        .environment
        .extend(task.run.environment.iter().map(|(k, v)| (k.clone(), v.clone())));
    config.ports.extend(task.run.ports.iter().cloned());

    config
}
