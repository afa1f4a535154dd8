// src/config/model.rs

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// project_name = "shop"
///
/// [container.db]
/// image = "postgres:16"
/// health_check = { command = "pg_isready", interval = "2s", retries = 10 }
///
/// [container.app]
/// build_directory = "./app"
/// dependencies = ["db"]
/// caches = [{ name = "cargo", container = "/usr/local/cargo/registry" }]
///
/// [task.test]
/// dependencies = []
/// run = { container = "app", command = "cargo test" }
/// ```
///
/// All sections are optional at this level; [`ConfigFile::try_from`] decides
/// what is actually acceptable.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Prefix used for image tags and runtime resource names.
    #[serde(default)]
    pub project_name: Option<String>,

    /// All containers from `[container.<name>]`.
    #[serde(default)]
    pub container: BTreeMap<String, RawContainerConfig>,

    /// All tasks from `[task.<name>]`.
    #[serde(default)]
    pub task: BTreeMap<String, RawTaskConfig>,
}

/// `[container.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawContainerConfig {
    /// Existing image to pull. Mutually exclusive with `build_directory`.
    #[serde(default)]
    pub image: Option<String>,

    /// Directory to build an image from. Mutually exclusive with `image`.
    #[serde(default)]
    pub build_directory: Option<String>,

    /// Dockerfile path relative to `build_directory`.
    #[serde(default)]
    pub dockerfile: Option<String>,

    #[serde(default)]
    pub build_args: BTreeMap<String, String>,

    #[serde(default)]
    pub command: Option<String>,

    /// Names of containers that must be ready before this one starts.
    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// Port mappings in `local:container` form.
    #[serde(default)]
    pub ports: Vec<String>,

    #[serde(default)]
    pub working_directory: Option<String>,

    #[serde(default)]
    pub volumes: Vec<VolumeMount>,

    #[serde(default)]
    pub caches: Vec<CacheMount>,

    /// Commands run inside the container once it is healthy, in order.
    #[serde(default)]
    pub setup_commands: Vec<String>,

    #[serde(default)]
    pub health_check: Option<RawHealthCheck>,
}

/// Health check as written in TOML; durations are strings like `"2s"`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawHealthCheck {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub interval: Option<String>,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub start_period: Option<String>,
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTaskConfig {
    #[serde(default)]
    pub description: Option<String>,

    /// Extra containers started for this task only.
    #[serde(default)]
    pub dependencies: Vec<String>,

    pub run: TaskRunConfiguration,
}

/// `run = { ... }` inside a task: which container is the task container, plus
/// overrides applied to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize)]
pub struct TaskRunConfiguration {
    pub container: String,

    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    #[serde(default)]
    pub ports: Vec<String>,
}

/// Bind mount from the host into a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct VolumeMount {
    pub local: String,
    pub container: String,
    #[serde(default)]
    pub options: Option<String>,
}

/// Named cache volume. Caches are initialised once per task run, before any
/// container that mounts one is created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct CacheMount {
    pub name: String,
    pub container: String,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub project_name: String,
    pub containers: BTreeMap<String, Container>,
    pub tasks: BTreeMap<String, Task>,
}

impl ConfigFile {
    /// Construct without running validation. Used by [`ConfigFile::try_from`]
    /// once the raw config has been checked, and by test builders.
    pub fn new_unchecked(
        project_name: String,
        containers: BTreeMap<String, Container>,
        tasks: BTreeMap<String, Task>,
    ) -> Self {
        Self {
            project_name,
            containers,
            tasks,
        }
    }
}

pub const DEFAULT_PROJECT_NAME: &str = "taskyard";

/// Where a container's image comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ImageSource {
    Pull(PullImage),
    Build(BuildImage),
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Pull(p) => write!(f, "pull '{}'", p.image_name),
            ImageSource::Build(b) => write!(f, "build '{}'", b.build_directory.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PullImage {
    pub image_name: String,
}

impl PullImage {
    pub fn new(image_name: impl Into<String>) -> Self {
        Self {
            image_name: image_name.into(),
        }
    }
}

/// Two containers share a built image only when all three fields match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BuildImage {
    pub build_directory: PathBuf,
    pub dockerfile: String,
    pub build_args: BTreeMap<String, String>,
}

impl BuildImage {
    pub fn new(build_directory: impl Into<PathBuf>) -> Self {
        Self {
            build_directory: build_directory.into(),
            dockerfile: "Dockerfile".to_string(),
            build_args: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct HealthCheck {
    pub command: Option<String>,
    pub interval: Option<Duration>,
    pub retries: Option<u32>,
    pub start_period: Option<Duration>,
}

/// A named unit of the task. Identity is `name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Container {
    pub name: String,
    pub image_source: ImageSource,
    pub command: Option<String>,
    pub dependencies: BTreeSet<String>,
    pub environment: BTreeMap<String, String>,
    pub ports: Vec<String>,
    pub working_directory: Option<String>,
    pub volumes: Vec<VolumeMount>,
    pub caches: Vec<CacheMount>,
    pub setup_commands: Vec<String>,
    pub health_check: Option<HealthCheck>,
}

impl Container {
    /// Minimal container with the given image source and nothing else set.
    pub fn new(name: impl Into<String>, image_source: ImageSource) -> Self {
        Self {
            name: name.into(),
            image_source,
            command: None,
            dependencies: BTreeSet::new(),
            environment: BTreeMap::new(),
            ports: Vec::new(),
            working_directory: None,
            volumes: Vec::new(),
            caches: Vec::new(),
            setup_commands: Vec::new(),
            health_check: None,
        }
    }

    pub fn has_cache_mounts(&self) -> bool {
        !self.caches.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub name: String,
    pub description: Option<String>,
    pub dependencies: BTreeSet<String>,
    pub run: TaskRunConfiguration,
}
