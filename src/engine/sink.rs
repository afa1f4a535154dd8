// src/engine/sink.rs

use tracing::{debug, info, warn};

use crate::model::TaskEvent;

/// Outbound consumer of every event produced during a task run.
///
/// Implementations only observe; they cannot influence scheduling.
pub trait TaskEventSink: Send + Sync {
    fn post_event(&self, event: &TaskEvent);
}

/// Renders events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEventSink;

impl TaskEventSink for LoggingEventSink {
    fn post_event(&self, event: &TaskEvent) {
        if event.is_failure() {
            warn!(event = %event, "task event");
        } else if event.is_informational() {
            debug!(event = %event, "task event");
        } else {
            info!(event = %event, "task event");
        }
    }
}
