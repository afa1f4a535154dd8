// src/config/validate.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::model::{
    BuildImage, ConfigFile, Container, HealthCheck, ImageSource, PullImage, RawConfigFile,
    RawContainerConfig, RawHealthCheck, Task, DEFAULT_PROJECT_NAME,
};
use crate::errors::{Result, TaskyardError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::TaskyardError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_containers(&raw)?;
        let project_name = validate_project_name(raw.project_name.as_deref())?;

        let mut containers = BTreeMap::new();
        for (name, container) in raw.container {
            let container = convert_container(&name, container)?;
            containers.insert(name, container);
        }

        let mut tasks = BTreeMap::new();
        for (name, task) in raw.task {
            if task.run.container.trim().is_empty() {
                return Err(TaskyardError::ConfigError(format!(
                    "task '{}' must name a container in `run.container`",
                    name
                )));
            }

            tasks.insert(
                name.clone(),
                Task {
                    name,
                    description: task.description,
                    dependencies: task.dependencies.into_iter().collect(),
                    run: task.run,
                },
            );
        }

        // Unknown container references and cycles are reported when the
        // dependency graph for a particular task is built.
        Ok(ConfigFile::new_unchecked(project_name, containers, tasks))
    }
}

fn ensure_has_containers(cfg: &RawConfigFile) -> Result<()> {
    if cfg.container.is_empty() {
        return Err(TaskyardError::ConfigError(
            "config must contain at least one [container.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_project_name(name: Option<&str>) -> Result<String> {
    match name {
        None => Ok(DEFAULT_PROJECT_NAME.to_string()),
        Some(n) if n.is_empty() => Err(TaskyardError::ConfigError(
            "project_name must not be empty".to_string(),
        )),
        Some(n)
            if !n
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_') =>
        {
            Err(TaskyardError::ConfigError(format!(
                "project_name '{}' may only contain lowercase letters, digits, '-' and '_'",
                n
            )))
        }
        Some(n) => Ok(n.to_string()),
    }
}

fn convert_container(name: &str, raw: RawContainerConfig) -> Result<Container> {
    let image_source = match (raw.image, raw.build_directory) {
        (Some(image), None) => ImageSource::Pull(PullImage::new(image)),
        (None, Some(dir)) => ImageSource::Build(BuildImage {
            build_directory: PathBuf::from(dir),
            dockerfile: raw.dockerfile.unwrap_or_else(|| "Dockerfile".to_string()),
            build_args: raw.build_args,
        }),
        (Some(_), Some(_)) => {
            return Err(TaskyardError::ConfigError(format!(
                "container '{}' must not set both `image` and `build_directory`",
                name
            )));
        }
        (None, None) => {
            return Err(TaskyardError::ConfigError(format!(
                "container '{}' must set one of `image` or `build_directory`",
                name
            )));
        }
    };

    let health_check = raw
        .health_check
        .map(|hc| convert_health_check(name, hc))
        .transpose()?;

    Ok(Container {
        name: name.to_string(),
        image_source,
        command: raw.command,
        dependencies: raw.dependencies.into_iter().collect(),
        environment: raw.environment,
        ports: raw.ports,
        working_directory: raw.working_directory,
        volumes: raw.volumes,
        caches: raw.caches,
        setup_commands: raw.setup_commands,
        health_check,
    })
}

fn convert_health_check(container: &str, raw: RawHealthCheck) -> Result<HealthCheck> {
    let parse = |field: &str, value: Option<String>| -> Result<Option<Duration>> {
        value
            .map(|s| {
                parse_duration(&s).map_err(|e| {
                    TaskyardError::ConfigError(format!(
                        "container '{}' has an invalid health_check.{}: {}",
                        container, field, e
                    ))
                })
            })
            .transpose()
    };

    Ok(HealthCheck {
        command: raw.command,
        interval: parse("interval", raw.interval)?,
        retries: raw.retries,
        start_period: parse("start_period", raw.start_period)?,
    })
}

/// Parse strings like `"500ms"`, `"2s"`, `"1m"`, `"1h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let seconds_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };

    value
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{}' is too large", s))
}
