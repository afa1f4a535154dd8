// src/stages/mod.rs

//! Stages own the rules for one phase of a task run.
//!
//! - [`run_planner`] builds the run stage from the dependency graph.
//! - [`cleanup_planner`] builds the cleanup stage from the events the run
//!   stage actually produced.

pub mod cleanup_planner;
pub mod run_planner;

use tracing::debug;

use crate::model::{ContainerName, EventSet, TaskStep};
use crate::rules::{ManualCleanupCommand, RuleEvaluation, StepRule};

pub use cleanup_planner::CleanupStagePlanner;
pub use run_planner::RunStagePlanner;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageKind {
    /// Ends once `task_container` has exited or every rule has fired.
    Run { task_container: ContainerName },
    /// Drains until nothing is ready and nothing is executing.
    Cleanup,
}

/// What a stage has to offer the scheduler right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    Ready(TaskStep),
    /// Nothing ready yet; more events are expected from running steps.
    NotReady,
    /// Rules remain but none can become ready: nothing is running to post
    /// the events they wait for.
    Stalled,
    Complete,
}

#[derive(Debug)]
pub struct Stage {
    kind: StageKind,
    rules: Vec<StepRule>,
    manual_cleanup: Vec<ManualCleanupCommand>,
}

impl Stage {
    pub fn run(task_container: impl Into<ContainerName>, rules: Vec<StepRule>) -> Self {
        Self {
            kind: StageKind::Run {
                task_container: task_container.into(),
            },
            rules,
            manual_cleanup: Vec::new(),
        }
    }

    /// Cleanup stage with the given rules. `manual_cleanup` is kept sorted by
    /// [`ManualCleanupSortOrder`](crate::rules::ManualCleanupSortOrder).
    pub fn cleanup(rules: Vec<StepRule>, mut manual_cleanup: Vec<ManualCleanupCommand>) -> Self {
        manual_cleanup.sort_by(|a, b| {
            a.order
                .cmp(&b.order)
                .then_with(|| a.resource.cmp(&b.resource))
        });

        Self {
            kind: StageKind::Cleanup,
            rules,
            manual_cleanup,
        }
    }

    pub fn kind(&self) -> &StageKind {
        &self.kind
    }

    pub fn is_run_stage(&self) -> bool {
        matches!(self.kind, StageKind::Run { .. })
    }

    pub fn remaining_rules(&self) -> &[StepRule] {
        &self.rules
    }

    pub fn manual_cleanup_commands(&self) -> &[ManualCleanupCommand] {
        &self.manual_cleanup
    }

    pub fn into_manual_cleanup_commands(self) -> Vec<ManualCleanupCommand> {
        self.manual_cleanup
    }

    /// Hand out the next ready step, removing its rule, or report why there
    /// is none.
    pub fn pop_next_step(&mut self, events: &EventSet, steps_still_running: bool) -> NextStep {
        if let StageKind::Run { task_container } = &self.kind {
            let task_container_exited = events.exit_code_of(task_container).is_some();
            if !steps_still_running && (self.rules.is_empty() || task_container_exited) {
                if !self.rules.is_empty() {
                    debug!(
                        abandoned = self.rules.len(),
                        "task container exited; abandoning remaining run rules"
                    );
                }
                return NextStep::Complete;
            }
        }

        if let Some(step) = self.take_ready(events) {
            return NextStep::Ready(step);
        }

        if steps_still_running {
            return NextStep::NotReady;
        }

        match self.kind {
            StageKind::Run { .. } => NextStep::Stalled,
            StageKind::Cleanup => NextStep::Complete,
        }
    }

    fn take_ready(&mut self, events: &EventSet) -> Option<TaskStep> {
        let (index, step) = self
            .rules
            .iter()
            .enumerate()
            .find_map(|(i, rule)| match rule.evaluate(events) {
                RuleEvaluation::Ready(step) => Some((i, step)),
                RuleEvaluation::NotReady => None,
            })?;

        let rule = self.rules.remove(index);
        debug!(rule = %rule, remaining = self.rules.len(), "rule ready");
        Some(step)
    }
}
