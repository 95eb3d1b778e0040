//! Run event stream for observing workflow execution.
//!
//! The runner emits a [`RunEvent`] for every task transition and every
//! workflow-level milestone. Consumers obtain the stream through
//! [`WorkflowRunner::subscribe`](crate::runner::WorkflowRunner::subscribe);
//! emission never blocks and a dropped subscriber never affects
//! scheduling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::TaskId;

/// An observable moment in a workflow run.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum RunEvent {
    /// The run loop started (first `run()` on this workflow).
    WorkflowStarted { at: DateTime<Utc> },

    /// A task was handed to its executor. `attempt` is the new attempt uid.
    TaskSubmitted {
        id: TaskId,
        key: String,
        attempt: String,
    },

    /// The executor confirmed the attempt began executing.
    TaskStarted { id: TaskId, key: String },

    /// The task completed and its output was recorded.
    TaskCompleted { id: TaskId, key: String },

    /// An attempt failed. `retrying` distinguishes the transient self-loop
    /// back to `Ready` from terminal failure.
    TaskFailed {
        id: TaskId,
        key: String,
        error: String,
        retrying: bool,
        remaining_retries: u32,
    },

    /// The task was cancelled while submitted or running.
    TaskAborted { id: TaskId, key: String },

    /// The task was permanently unscheduled after an upstream failure.
    TaskDisabled { id: TaskId, key: String },

    /// A breakpoint halted the scheduler before dispatching this task.
    BreakpointHit { id: TaskId, key: String },

    /// Every reachable task completed.
    WorkflowCompleted { at: DateTime<Utc> },

    /// At least one task failed or was aborted; unrelated branches ran to
    /// their own end states first.
    WorkflowFailed { failed: Vec<TaskId> },

    /// The ready set drained with breakpoints still armed.
    WorkflowPaused { halted: Vec<TaskId> },
}

/// Non-blocking emitter wrapping the event channel.
#[derive(Clone, Debug)]
pub(crate) struct EventEmitter {
    tx: flume::Sender<RunEvent>,
}

impl EventEmitter {
    pub(crate) fn new(tx: flume::Sender<RunEvent>) -> Self {
        Self { tx }
    }

    /// Emit an event; a disconnected subscriber is not an error.
    pub(crate) fn emit(&self, event: RunEvent) {
        let _ = self.tx.send(event);
    }
}
