// src/exec/backend.rs

//! Pluggable container runtime abstraction.
//!
//! The execution manager talks to a `ContainerRuntime` instead of a concrete
//! client. Production code uses [`DockerCliRuntime`](super::DockerCliRuntime);
//! tests provide their own implementation that posts scripted events.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::engine::ManagerMessage;
use crate::engine::CancellationSignal;
use crate::errors::{Result, TaskyardError};
use crate::model::{TaskEvent, TaskStep};

/// Performs the runtime operation behind each [`TaskStep`].
///
/// Implementations report what happened by posting events through the
/// [`StepContext`]. A failed operation should post the matching `*Failed`
/// event and return `Ok(())`; returning `Err` (or panicking) is reserved for
/// problems that are not about the operation itself, and fails the task.
///
/// `run_step` is called concurrently from several workers, for independent
/// resources.
pub trait ContainerRuntime: Send + Sync {
    fn run_step(
        &self,
        step: TaskStep,
        ctx: StepContext,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Per-step handle back into the execution manager.
#[derive(Debug, Clone)]
pub struct StepContext {
    tx: mpsc::Sender<ManagerMessage>,
    cancellation: CancellationSignal,
}

impl StepContext {
    pub(crate) fn new(tx: mpsc::Sender<ManagerMessage>, cancellation: CancellationSignal) -> Self {
        Self { tx, cancellation }
    }

    /// Report an event. Events from one step are applied in the order posted.
    pub async fn post_event(&self, event: TaskEvent) -> Result<()> {
        self.tx
            .send(ManagerMessage::Event(event))
            .await
            .map_err(|_| TaskyardError::Scheduler("execution manager has stopped".to_string()))
    }

    /// Fires when the run stage has failed. Steps that can take a long time
    /// should stop early when it does.
    pub fn cancellation(&self) -> &CancellationSignal {
        &self.cancellation
    }
}
