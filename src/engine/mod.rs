// src/engine/mod.rs

//! Execution engine for a single task run.
//!
//! The pure state machine lives in [`core`]: it owns the event set and the
//! current stage, and decides which step runs next. The async shell in
//! [`runtime`] dispatches those steps to a
//! [`ContainerRuntime`](crate::exec::ContainerRuntime) with a concurrency cap
//! and feeds the resulting events back into the core.

use crate::model::{StepKind, TaskEvent};
use crate::types::{CleanupOption, OperatingSystem, RuntimeType};

/// Options for one task run.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Maximum number of steps executing at once. Values below 1 are treated as 1.
    pub max_parallelism: usize,
    pub behaviour_after_success: CleanupOption,
    pub behaviour_after_failure: CleanupOption,
    pub runtime_type: RuntimeType,
    /// Host OS, used to phrase manual cleanup commands.
    pub operating_system: OperatingSystem,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_parallelism: default_max_parallelism(),
            behaviour_after_success: CleanupOption::Cleanup,
            behaviour_after_failure: CleanupOption::Cleanup,
            runtime_type: RuntimeType::default(),
            operating_system: OperatingSystem::current(),
        }
    }
}

pub fn default_max_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Messages flowing into the execution manager from step workers and the
/// interrupt handle.
#[derive(Debug, Clone)]
pub(crate) enum ManagerMessage {
    /// A step reported an event.
    Event(TaskEvent),
    /// A step's worker has returned. Always sent after the step's events.
    StepFinished { kind: StepKind },
    /// The user asked to stop (e.g. Ctrl-C).
    Interrupted,
}

pub mod cancellation;
pub mod core;
pub mod runtime;
pub mod sink;

pub use cancellation::CancellationSignal;
pub use core::{ManualCleanupInstructions, ManualCleanupReason, TaskRunOutcome, TaskStateMachine};
pub use runtime::{InterruptHandle, ParallelExecutionManager};
pub use sink::{LoggingEventSink, TaskEventSink};
