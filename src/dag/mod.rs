// src/dag/mod.rs

//! Container dependency graph for a single task.
//!
//! - [`graph`] resolves the containers a task needs, validates their
//!   dependencies and records both edge directions.

pub mod graph;

pub use graph::{ContainerRunConfig, DependencyGraph, GraphNode};
