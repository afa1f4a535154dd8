// src/rules/mod.rs

//! Step rules: a readiness condition over the event set bound to the step it
//! produces.
//!
//! - [`run`] builds the rules of the run stage.
//! - [`cleanup`] builds the rules of the cleanup stage.
//!
//! A rule is a single closure that inspects the accumulated events and either
//! returns the fully-parameterised step or `None`. Stages remove a rule the
//! first time it yields a step, so a rule fires at most once.

pub mod cleanup;
pub mod run;

use std::fmt;
use std::path::PathBuf;

use crate::model::{ContainerName, EventSet, TaskStep};

type Evaluator = Box<dyn Fn(&EventSet) -> Option<TaskStep> + Send + Sync>;

/// Result of evaluating a rule against the current events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleEvaluation {
    Ready(TaskStep),
    NotReady,
}

pub struct StepRule {
    description: String,
    evaluate: Evaluator,
    manual_cleanup: Option<ManualCleanupCommand>,
}

impl StepRule {
    pub fn new<F>(description: impl Into<String>, evaluate: F) -> Self
    where
        F: Fn(&EventSet) -> Option<TaskStep> + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            evaluate: Box::new(evaluate),
            manual_cleanup: None,
        }
    }

    /// Attach the command a user would run to do this rule's work by hand.
    pub fn with_manual_cleanup(mut self, command: ManualCleanupCommand) -> Self {
        self.manual_cleanup = Some(command);
        self
    }

    pub fn evaluate(&self, events: &EventSet) -> RuleEvaluation {
        match (self.evaluate)(events) {
            Some(step) => RuleEvaluation::Ready(step),
            None => RuleEvaluation::NotReady,
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn manual_cleanup(&self) -> Option<&ManualCleanupCommand> {
        self.manual_cleanup.as_ref()
    }
}

impl fmt::Debug for StepRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRule")
            .field("description", &self.description)
            .field("manual_cleanup", &self.manual_cleanup)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for StepRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// Order in which manual cleanup commands are presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ManualCleanupSortOrder {
    RemoveContainers,
    DeleteTaskNetwork,
    DeleteTemporaryFiles,
    DeleteTemporaryDirectories,
}

/// The resource a manual cleanup command gets rid of.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CleanupResource {
    Container(ContainerName),
    Network,
    File(PathBuf),
    Directory(PathBuf),
}

impl CleanupResource {
    /// Whether the events show this resource has already been cleaned up.
    pub fn is_cleaned_up(&self, events: &EventSet) -> bool {
        use crate::model::TaskEvent;

        match self {
            CleanupResource::Container(name) => events.has_removed(name),
            CleanupResource::Network => events.contains(&TaskEvent::TaskNetworkDeleted),
            CleanupResource::File(path) => {
                events.contains(&TaskEvent::TemporaryFileDeleted { path: path.clone() })
            }
            CleanupResource::Directory(path) => {
                events.contains(&TaskEvent::TemporaryDirectoryDeleted { path: path.clone() })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ManualCleanupCommand {
    pub order: ManualCleanupSortOrder,
    pub resource: CleanupResource,
    pub command: String,
}
