// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::dag::DependencyGraph;
use crate::errors::{Result, TaskyardError};
use crate::exec::{ContainerRuntime, StepContext};
use crate::model::{TaskEvent, TaskStep};
use crate::stages::{CleanupStagePlanner, RunStagePlanner};

use super::cancellation::{CancellationSignal, CancellationSource};
use super::core::{TaskRunOutcome, TaskStateMachine};
use super::sink::TaskEventSink;
use super::{ManagerMessage, RunOptions};

/// Runs the steps handed out by a [`TaskStateMachine`] on a
/// [`ContainerRuntime`], at most `max_parallelism` at a time.
///
/// This is the async shell around the state machine. All mutation of the
/// event set and stage happens on the task calling [`run`](Self::run): step
/// workers only send messages back over a channel, and each worker's events
/// arrive before its completion notice.
pub struct ParallelExecutionManager<R: ContainerRuntime + 'static> {
    state: TaskStateMachine,
    runtime: Arc<R>,
    sink: Arc<dyn TaskEventSink>,
    max_parallelism: usize,
    in_flight: usize,
    tx: mpsc::Sender<ManagerMessage>,
    rx: mpsc::Receiver<ManagerMessage>,
    run_stage_cancellation: CancellationSource,
}

impl<R: ContainerRuntime + 'static> fmt::Debug for ParallelExecutionManager<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelExecutionManager")
            .field("state", &self.state)
            .field("max_parallelism", &self.max_parallelism)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

impl<R: ContainerRuntime + 'static> ParallelExecutionManager<R> {
    pub fn new(
        state: TaskStateMachine,
        runtime: Arc<R>,
        sink: Arc<dyn TaskEventSink>,
        max_parallelism: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(64);

        Self {
            state,
            runtime,
            sink,
            max_parallelism: max_parallelism.max(1),
            in_flight: 0,
            tx,
            rx,
            run_stage_cancellation: CancellationSource::new(),
        }
    }

    /// Plan both stages for `graph` and wire up a manager with `options`.
    pub fn for_task(
        graph: DependencyGraph,
        project_name: &str,
        runtime: Arc<R>,
        sink: Arc<dyn TaskEventSink>,
        options: &RunOptions,
    ) -> Self {
        let run_planner = RunStagePlanner::new(options.runtime_type, project_name);
        let cleanup_planner = CleanupStagePlanner::new(options.operating_system);
        let state = TaskStateMachine::new(
            graph,
            &run_planner,
            cleanup_planner,
            options.behaviour_after_success,
            options.behaviour_after_failure,
        );

        Self::new(state, runtime, sink, options.max_parallelism)
    }

    /// Handle used to interrupt the run from outside (e.g. on Ctrl-C).
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            tx: self.tx.clone(),
        }
    }

    /// Drive the task run to completion: run stage, then cleanup stage.
    ///
    /// Step failures are reported in the outcome, not as `Err`. An `Err`
    /// means the engine itself could not make progress.
    pub async fn run(mut self) -> Result<TaskRunOutcome> {
        info!(
            task = %self.state.graph().task_name(),
            max_parallelism = self.max_parallelism,
            "execution manager started"
        );

        loop {
            self.schedule();

            if self.in_flight == 0 {
                if self.state.is_finished() {
                    break;
                }

                error!("no steps running but the task run has not finished");
                return Err(TaskyardError::Scheduler(
                    "no steps are running, but the task run has not finished".to_string(),
                ));
            }

            let message = match self.rx.recv().await {
                Some(m) => m,
                None => {
                    return Err(TaskyardError::Scheduler(
                        "execution manager channel closed".to_string(),
                    ));
                }
            };

            self.handle_message(message);
        }

        let outcome = self.state.outcome();
        info!(exit_code = outcome.exit_code, "execution manager finished");
        Ok(outcome)
    }

    /// Start ready steps until the concurrency cap is reached or nothing is ready.
    fn schedule(&mut self) {
        while self.in_flight < self.max_parallelism {
            let next = self.state.pop_next_step(self.in_flight > 0);
            self.report_raised_events();
            match next {
                Some(step) => self.dispatch(step),
                None => break,
            }
        }
    }

    /// Forward events the state machine raised on its own to the sink.
    fn report_raised_events(&mut self) {
        for event in self.state.take_raised_events() {
            warn!(event = %event, "execution failed");
            self.sink.post_event(&event);
        }
    }

    fn handle_message(&mut self, message: ManagerMessage) {
        match message {
            ManagerMessage::Event(event) => self.post_event(event),
            ManagerMessage::Interrupted => {
                warn!("execution interrupted by user");
                self.post_event(TaskEvent::UserInterruptedExecution);
            }
            ManagerMessage::StepFinished { kind } => {
                self.in_flight = self.in_flight.saturating_sub(1);
                debug!(step_kind = %kind, in_flight = self.in_flight, "step finished");
            }
        }
    }

    fn post_event(&mut self, event: TaskEvent) {
        self.sink.post_event(&event);

        if event.is_informational() {
            return;
        }

        debug!(event = %event, "posting event");
        self.state.post_event(event);

        if self.state.in_run_stage()
            && self.state.task_has_failed()
            && !self.run_stage_cancellation.is_cancelled()
        {
            info!(in_flight = self.in_flight, "cancelling running steps");
            self.run_stage_cancellation.cancel();
        }
    }

    fn dispatch(&mut self, step: TaskStep) {
        self.in_flight += 1;
        info!(step = %step, in_flight = self.in_flight, "dispatching step");
        self.sink.post_event(&TaskEvent::StepStarting { step: step.clone() });

        let cancellation = if self.state.in_run_stage() {
            self.run_stage_cancellation.signal()
        } else {
            CancellationSignal::never()
        };

        let runtime = Arc::clone(&self.runtime);
        let tx = self.tx.clone();
        let kind = step.kind();

        tokio::spawn(async move {
            let ctx = StepContext::new(tx.clone(), cancellation);
            let worker = tokio::spawn(async move { runtime.run_step(step, ctx).await });

            let failure = match worker.await {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err.to_string()),
                Err(join_err) => Some(join_err.to_string()),
            };

            if let Some(message) = failure {
                error!(step_kind = %kind, error = %message, "step execution error");
                let event = TaskEvent::ExecutionFailed {
                    message: format!("During execution of step of kind '{}': {}", kind, message),
                };
                let _ = tx.send(ManagerMessage::Event(event)).await;
            }

            let _ = tx.send(ManagerMessage::StepFinished { kind }).await;
        });
    }
}

/// Cloneable handle for interrupting a running [`ParallelExecutionManager`].
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    tx: mpsc::Sender<ManagerMessage>,
}

impl InterruptHandle {
    /// Post a user interruption. Returns `false` if the run has already ended.
    pub async fn interrupt(&self) -> bool {
        self.tx.send(ManagerMessage::Interrupted).await.is_ok()
    }
}
