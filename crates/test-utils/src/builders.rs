#![allow(dead_code)]

use std::collections::BTreeMap;

use taskyard::config::{
    CacheMount, ConfigFile, RawConfigFile, RawContainerConfig, RawHealthCheck, RawTaskConfig,
    TaskRunConfiguration, VolumeMount,
};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                project_name: None,
                container: BTreeMap::new(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_project_name(mut self, name: &str) -> Self {
        self.config.project_name = Some(name.to_string());
        self
    }

    pub fn with_container(mut self, name: &str, container: RawContainerConfig) -> Self {
        self.config.container.insert(name.to_string(), container);
        self
    }

    pub fn with_task(mut self, name: &str, task: RawTaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `RawContainerConfig`.
pub struct ContainerBuilder {
    container: RawContainerConfig,
}

impl ContainerBuilder {
    /// Container whose image is pulled.
    pub fn pull(image: &str) -> Self {
        Self {
            container: RawContainerConfig {
                image: Some(image.to_string()),
                ..RawContainerConfig::default()
            },
        }
    }

    /// Container whose image is built from `dir`.
    pub fn build_from(dir: &str) -> Self {
        Self {
            container: RawContainerConfig {
                build_directory: Some(dir.to_string()),
                ..RawContainerConfig::default()
            },
        }
    }

    pub fn dockerfile(mut self, dockerfile: &str) -> Self {
        self.container.dockerfile = Some(dockerfile.to_string());
        self
    }

    pub fn build_arg(mut self, key: &str, value: &str) -> Self {
        self.container
            .build_args
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn depends_on(mut self, dep: &str) -> Self {
        self.container.dependencies.push(dep.to_string());
        self
    }

    pub fn command(mut self, command: &str) -> Self {
        self.container.command = Some(command.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.container
            .environment
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn port(mut self, mapping: &str) -> Self {
        self.container.ports.push(mapping.to_string());
        self
    }

    pub fn working_directory(mut self, dir: &str) -> Self {
        self.container.working_directory = Some(dir.to_string());
        self
    }

    pub fn volume(mut self, local: &str, container: &str) -> Self {
        self.container.volumes.push(VolumeMount {
            local: local.to_string(),
            container: container.to_string(),
            options: None,
        });
        self
    }

    pub fn cache(mut self, name: &str, container: &str) -> Self {
        self.container.caches.push(CacheMount {
            name: name.to_string(),
            container: container.to_string(),
        });
        self
    }

    pub fn setup_command(mut self, command: &str) -> Self {
        self.container.setup_commands.push(command.to_string());
        self
    }

    pub fn health_check(mut self, command: &str, interval: &str, retries: u32) -> Self {
        self.container.health_check = Some(RawHealthCheck {
            command: Some(command.to_string()),
            interval: Some(interval.to_string()),
            retries: Some(retries),
            start_period: None,
        });
        self
    }

    pub fn build(self) -> RawContainerConfig {
        self.container
    }
}

/// Builder for `RawTaskConfig`.
pub struct TaskBuilder {
    task: RawTaskConfig,
}

impl TaskBuilder {
    /// Task that runs in `container`.
    pub fn new(container: &str) -> Self {
        Self {
            task: RawTaskConfig {
                description: None,
                dependencies: vec![],
                run: TaskRunConfiguration {
                    container: container.to_string(),
                    ..TaskRunConfiguration::default()
                },
            },
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.task.description = Some(description.to_string());
        self
    }

    pub fn depends_on(mut self, dep: &str) -> Self {
        self.task.dependencies.push(dep.to_string());
        self
    }

    pub fn command(mut self, command: &str) -> Self {
        self.task.run.command = Some(command.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.task
            .run
            .environment
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn port(mut self, mapping: &str) -> Self {
        self.task.run.ports.push(mapping.to_string());
        self
    }

    pub fn build(self) -> RawTaskConfig {
        self.task
    }
}
