// src/exec/mod.rs

//! Runtime execution layer.
//!
//! - [`backend`] provides the `ContainerRuntime` trait the execution manager
//!   dispatches steps to, and the `StepContext` steps report through.
//! - [`docker_cli`] implements it by driving the `docker` CLI with
//!   `tokio::process::Command`.

pub mod backend;
pub mod docker_cli;

pub use backend::{ContainerRuntime, StepContext};
pub use docker_cli::DockerCliRuntime;
