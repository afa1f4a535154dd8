// src/config/mod.rs

//! Task configuration: TOML model, validation and loading.
//!
//! - [`model`] holds both the raw deserialized shape and the validated
//!   containers/tasks consumed by the dependency graph.
//! - [`validate`] turns a `RawConfigFile` into a `ConfigFile`.
//! - [`loader`] reads a file from disk.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_from_str};
pub use model::{
    BuildImage, CacheMount, ConfigFile, Container, HealthCheck, ImageSource, PullImage,
    RawConfigFile, RawContainerConfig, RawHealthCheck, RawTaskConfig, Task, TaskRunConfiguration,
    VolumeMount,
};
