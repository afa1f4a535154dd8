// src/model/mod.rs

//! Plain data shared by every layer of the engine.
//!
//! - [`events`] records what has happened during a task run.
//! - [`steps`] describes the runtime operations the engine can ask for.

pub mod events;
pub mod steps;

use std::fmt;

pub use events::{EventSet, TaskEvent};
pub use steps::{StepKind, TaskStep};

/// Canonical container name type used throughout the engine.
pub type ContainerName = String;

/// A container that exists in the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuntimeContainer {
    /// Runtime-assigned ID.
    pub id: String,
    /// Name given to the container in the runtime (not the config name).
    pub name: String,
}

impl RuntimeContainer {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// The per-task network all containers are attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuntimeNetwork {
    pub id: String,
}

impl RuntimeNetwork {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// An image that was pulled or built and can be used to create containers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuntimeImage {
    pub id: String,
}

impl RuntimeImage {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl fmt::Display for RuntimeImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
