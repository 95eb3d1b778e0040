//! Task execution strategies.
//!
//! Three executor variants, one per task type:
//!
//! - [`LocalBlockingExecutor`]: runs a registered callable synchronously on
//!   the scheduler's thread; the next ready task is not dispatched until the
//!   call returns.
//! - [`LocalThreadedExecutor`]: runs the callable on a blocking worker
//!   thread and reports back asynchronously.
//! - [`RemoteCallExecutor`]: issues the call through the external
//!   [`RpcClient`] collaborator.
//!
//! Executors never touch the workflow graph. Every lifecycle signal goes
//! through the runner's completion channel as a [`Completion`], tagged with
//! the attempt's `task_uid` so the runner can discard reports from stale
//! attempts (a retried or aborted task hands out a fresh uid).
//!
//! Cancellation is cooperative: the runner cancels the per-attempt
//! [`CancellationToken`] (and lets the executor do any variant-specific
//! bookkeeping via [`TaskExecutor::cancel`]); the underlying work may
//! ignore it. A blocking callable is not interruptible once started.

mod local;
mod remote;

pub use local::{
    CallableError, CallableRegistry, LocalBlockingExecutor, LocalThreadedExecutor, TaskCallable,
};
pub use remote::{RemoteCallExecutor, RpcClient, RpcError};

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::types::{IoMap, TaskId, TaskType};

/// Result of one task attempt.
#[derive(Clone, Debug)]
pub enum Outcome {
    /// The attempt produced an output map.
    Success(IoMap),
    /// The attempt failed; the scheduler does not distinguish error kinds,
    /// only success/failure, so the payload is a rendered message.
    Failure(String),
    /// The attempt observed its cancellation token and stopped.
    Aborted,
}

/// Lifecycle signal sent by executors to the runner.
#[derive(Clone, Debug)]
pub enum Completion {
    /// Execution of the attempt has begun.
    Started { task_id: TaskId, task_uid: Uuid },
    /// The attempt finished with the given outcome.
    Finished {
        task_id: TaskId,
        task_uid: Uuid,
        outcome: Outcome,
    },
}

impl Completion {
    pub fn task_id(&self) -> TaskId {
        match self {
            Completion::Started { task_id, .. } | Completion::Finished { task_id, .. } => *task_id,
        }
    }

    pub fn task_uid(&self) -> Uuid {
        match self {
            Completion::Started { task_uid, .. } | Completion::Finished { task_uid, .. } => {
                *task_uid
            }
        }
    }
}

/// What an executor should invoke for a task.
#[derive(Clone, Debug)]
pub enum ExecutionTarget {
    /// Name of a registered local callable.
    Callable(String),
    /// Procedure URI for the RPC collaborator.
    Procedure(String),
}

/// Everything an executor needs to run one attempt of one task.
pub struct DispatchRequest {
    pub task_id: TaskId,
    pub task_uid: Uuid,
    pub target: ExecutionTarget,
    pub input: IoMap,
    /// Channel back to the runner; the only way results travel.
    pub completions: flume::Sender<Completion>,
    /// Cooperative cancellation signal for this attempt.
    pub cancellation: CancellationToken,
}

/// Handle the runner keeps for each in-flight attempt, used to request
/// best-effort interruption.
#[derive(Clone, Debug)]
pub struct AttemptHandle {
    pub task_id: TaskId,
    pub task_uid: Uuid,
    pub cancellation: CancellationToken,
}

/// Common contract of the execution strategies.
pub trait TaskExecutor: Send + Sync {
    /// Start one attempt. Failures are reported through the completion
    /// channel, never returned in-band. For the blocking variant this call
    /// runs the work to completion before returning.
    fn dispatch(&self, request: DispatchRequest);

    /// Best-effort interruption of a previously dispatched attempt.
    /// Must not block; the work may ignore the request entirely.
    fn cancel(&self, attempt: &AttemptHandle);
}

pub(crate) fn send_completion(tx: &flume::Sender<Completion>, completion: Completion) {
    // A disconnected runner means the run was dropped; nothing to report to.
    let _ = tx.send(completion);
}

/// The executor set a runner dispatches through, keyed by [`TaskType`].
pub struct Executors {
    blocking: LocalBlockingExecutor,
    threaded: LocalThreadedExecutor,
    remote: RemoteCallExecutor,
}

impl Executors {
    /// Build the standard executor set: both local variants share the
    /// callable registry; the remote variant uses the given RPC client
    /// (remote tasks fail at dispatch when none is configured).
    #[must_use]
    pub fn new(callables: CallableRegistry, rpc: Option<Arc<dyn RpcClient>>) -> Self {
        let callables = Arc::new(callables);
        Self {
            blocking: LocalBlockingExecutor::new(Arc::clone(&callables)),
            threaded: LocalThreadedExecutor::new(callables),
            remote: RemoteCallExecutor::new(rpc),
        }
    }

    #[must_use]
    pub fn get(&self, task_type: TaskType) -> &dyn TaskExecutor {
        match task_type {
            TaskType::LocalBlocking => &self.blocking,
            TaskType::LocalThreaded => &self.threaded,
            TaskType::RemoteCall => &self.remote,
        }
    }
}
