// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Only *planning* problems (bad config, broken dependency graph) and internal
//! scheduler faults travel through these types. Failures of individual runtime
//! operations are recorded as `*Failed` task events instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskyardError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("{0}")]
    ContainerNotFound(String),

    #[error("{0}")]
    DependencyCycle(String),

    #[error("{0}")]
    SelfDependency(String),

    #[error("{0}")]
    TaskContainerIsDependency(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Execution engine error: {0}")]
    Scheduler(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TaskyardError {
    /// Whether this error was raised while resolving the dependency graph,
    /// i.e. before any step could have run.
    pub fn is_planning_error(&self) -> bool {
        matches!(
            self,
            TaskyardError::TaskNotFound(_)
                | TaskyardError::ContainerNotFound(_)
                | TaskyardError::DependencyCycle(_)
                | TaskyardError::SelfDependency(_)
                | TaskyardError::TaskContainerIsDependency(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskyardError>;
