// src/engine/core.rs

//! Pure task state machine.
//!
//! [`TaskStateMachine`] owns the event set and the current stage. It is fed
//! events and asked for the next step; it switches from the run stage to the
//! cleanup stage by itself and reports the final outcome.
//!
//! It has no channels, no Tokio types, and performs no IO, so it can be
//! driven step by step from tests.

use std::fmt;

use tracing::{debug, info, warn};

use crate::dag::DependencyGraph;
use crate::model::{EventSet, TaskEvent, TaskStep};
use crate::rules::ManualCleanupCommand;
use crate::stages::{CleanupStagePlanner, NextStep, RunStagePlanner, Stage};
use crate::types::CleanupOption;

/// Exit code reported when the task or its cleanup failed, or when cleanup
/// after success was disabled.
pub const FAILURE_EXIT_CODE: i32 = -1;

const STALLED_MESSAGE: &str =
    "None of the remaining steps are ready to execute, but there are no steps currently running.";

/// Why resources were left behind for the user to remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualCleanupReason {
    CleanupDisabledAfterFailure,
    CleanupDisabledAfterSuccess,
    CleanupFailed,
}

impl fmt::Display for ManualCleanupReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManualCleanupReason::CleanupDisabledAfterFailure => f.write_str(
                "As the task failed and cleanup after failure is disabled, its containers and other resources have been left behind. Once you have finished investigating, run the following commands to clean up:",
            ),
            ManualCleanupReason::CleanupDisabledAfterSuccess => f.write_str(
                "As cleanup after success is disabled, the task's containers and other resources have been left behind. Run the following commands to clean up:",
            ),
            ManualCleanupReason::CleanupFailed => f.write_str(
                "Not all of the task's containers and other resources could be cleaned up. Run the following commands to finish cleaning up:",
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualCleanupInstructions {
    pub reason: ManualCleanupReason,
    pub commands: Vec<String>,
}

/// Final result of a task run.
#[derive(Debug, Clone)]
pub struct TaskRunOutcome {
    /// The task container's exit code, or [`FAILURE_EXIT_CODE`].
    pub exit_code: i32,
    pub manual_cleanup: Option<ManualCleanupInstructions>,
    pub events: EventSet,
}

#[derive(Debug)]
pub struct TaskStateMachine {
    graph: DependencyGraph,
    events: EventSet,
    stage: Stage,
    cleanup_planner: CleanupStagePlanner,
    behaviour_after_success: CleanupOption,
    behaviour_after_failure: CleanupOption,
    task_has_failed: bool,
    cleanup_failed: bool,
    manual_cleanup_reason: Option<ManualCleanupReason>,
    manual_cleanup: Vec<ManualCleanupCommand>,
    /// Events raised by the state machine itself, not yet seen by the sink.
    raised: Vec<TaskEvent>,
    finished: bool,
}

impl TaskStateMachine {
    pub fn new(
        graph: DependencyGraph,
        run_planner: &RunStagePlanner,
        cleanup_planner: CleanupStagePlanner,
        behaviour_after_success: CleanupOption,
        behaviour_after_failure: CleanupOption,
    ) -> Self {
        let stage = run_planner.create_stage(&graph);

        Self {
            graph,
            events: EventSet::new(),
            stage,
            cleanup_planner,
            behaviour_after_success,
            behaviour_after_failure,
            task_has_failed: false,
            cleanup_failed: false,
            manual_cleanup_reason: None,
            manual_cleanup: Vec::new(),
            raised: Vec::new(),
            finished: false,
        }
    }

    /// Record an event. Returns `false` if it was ignored: informational
    /// events and duplicates are not stored.
    pub fn post_event(&mut self, event: TaskEvent) -> bool {
        if event.is_informational() {
            return false;
        }

        let is_failure = event.is_failure();
        if !self.events.insert(event) {
            debug!("ignoring duplicate event");
            return false;
        }

        if is_failure {
            if self.stage.is_run_stage() {
                if !self.task_has_failed {
                    warn!("task failed during run stage; draining running steps");
                }
                self.task_has_failed = true;
            } else {
                self.cleanup_failed = true;
                self.manual_cleanup_reason
                    .get_or_insert(ManualCleanupReason::CleanupFailed);
            }
        }

        true
    }

    /// Next step to execute, if any.
    ///
    /// `None` means either more events are needed or the run is finished
    /// (see [`is_finished`](Self::is_finished)). Switches to the cleanup stage
    /// once the run stage completes, and drains running steps without
    /// starting new ones after a run-stage failure.
    pub fn pop_next_step(&mut self, steps_still_running: bool) -> Option<TaskStep> {
        loop {
            if self.finished {
                return None;
            }

            if self.stage.is_run_stage() && self.task_has_failed {
                if steps_still_running {
                    return None;
                }
                self.start_cleanup_stage();
                continue;
            }

            match self.stage.pop_next_step(&self.events, steps_still_running) {
                NextStep::Ready(step) => return Some(step),
                NextStep::NotReady => return None,
                NextStep::Stalled => {
                    warn!(
                        remaining = self.stage.remaining_rules().len(),
                        "run stage stalled"
                    );
                    let event = TaskEvent::ExecutionFailed {
                        message: STALLED_MESSAGE.to_string(),
                    };
                    if self.post_event(event.clone()) {
                        self.raised.push(event);
                    }
                }
                NextStep::Complete => {
                    if self.stage.is_run_stage() {
                        self.start_cleanup_stage();
                    } else {
                        info!("cleanup stage complete");
                        self.finished = true;
                        return None;
                    }
                }
            }
        }
    }

    fn start_cleanup_stage(&mut self) {
        let option = if self.task_has_failed {
            self.behaviour_after_failure
        } else {
            self.behaviour_after_success
        };

        let any_container_created = self
            .graph
            .all_nodes()
            .any(|node| self.events.created_container(node.name()).is_some());

        self.stage = if self.task_has_failed && option == CleanupOption::DontCleanup {
            if any_container_created {
                info!("task failed and cleanup after failure is disabled; skipping cleanup");
                self.manual_cleanup_reason =
                    Some(ManualCleanupReason::CleanupDisabledAfterFailure);
                let planned = self
                    .cleanup_planner
                    .create_stage(&self.graph, &self.events, option);
                Stage::cleanup(Vec::new(), planned.into_manual_cleanup_commands())
            } else {
                // Nothing worth investigating was left behind.
                self.cleanup_planner
                    .create_stage(&self.graph, &self.events, CleanupOption::Cleanup)
            }
        } else {
            if option == CleanupOption::DontCleanup {
                self.manual_cleanup_reason = Some(ManualCleanupReason::CleanupDisabledAfterSuccess);
            }
            self.cleanup_planner
                .create_stage(&self.graph, &self.events, option)
        };

        self.manual_cleanup = self.stage.manual_cleanup_commands().to_vec();

        info!(
            task_failed = self.task_has_failed,
            rules = self.stage.remaining_rules().len(),
            "starting cleanup stage"
        );
    }

    /// Events the state machine posted to itself since the last call, such as
    /// the stall failure. Already stored; only returned for reporting.
    pub fn take_raised_events(&mut self) -> Vec<TaskEvent> {
        std::mem::take(&mut self.raised)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn in_run_stage(&self) -> bool {
        self.stage.is_run_stage()
    }

    pub fn task_has_failed(&self) -> bool {
        self.task_has_failed
    }

    pub fn cleanup_failed(&self) -> bool {
        self.cleanup_failed
    }

    pub fn events(&self) -> &EventSet {
        &self.events
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn current_stage(&self) -> &Stage {
        &self.stage
    }

    /// The task container's exit code, unless anything failed (in either
    /// stage) or resources were deliberately left behind after success.
    pub fn exit_code(&self) -> i32 {
        if self.task_has_failed
            || self.cleanup_failed
            || self.manual_cleanup_reason == Some(ManualCleanupReason::CleanupDisabledAfterSuccess)
        {
            return FAILURE_EXIT_CODE;
        }

        self.events
            .exit_code_of(self.graph.task_container_name())
            .and_then(|code| i32::try_from(code).ok())
            .unwrap_or(FAILURE_EXIT_CODE)
    }

    /// Manual cleanup commands for resources that still exist, if any need
    /// reporting.
    pub fn manual_cleanup_instructions(&self) -> Option<ManualCleanupInstructions> {
        let reason = self.manual_cleanup_reason?;
        let commands: Vec<String> = self
            .manual_cleanup
            .iter()
            .filter(|cmd| !cmd.resource.is_cleaned_up(&self.events))
            .map(|cmd| cmd.command.clone())
            .collect();

        if commands.is_empty() {
            return None;
        }

        Some(ManualCleanupInstructions { reason, commands })
    }

    pub fn outcome(&self) -> TaskRunOutcome {
        TaskRunOutcome {
            exit_code: self.exit_code(),
            manual_cleanup: self.manual_cleanup_instructions(),
            events: self.events.clone(),
        }
    }
}
