//! Local execution: registered callables run in-process.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::{
    AttemptHandle, Completion, DispatchRequest, ExecutionTarget, Outcome, TaskExecutor,
    send_completion,
};
use crate::types::IoMap;

/// Error signalled by a local callable.
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(taskloom::executors::callable))]
pub struct CallableError {
    pub message: String,
}

impl CallableError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A named local unit of work: merged input map in, result map out.
pub type TaskCallable = dyn Fn(IoMap) -> Result<IoMap, CallableError> + Send + Sync;

/// Registry of named callables resolvable by local executors.
///
/// Resolution failure (unknown name) is reported as an ordinary attempt
/// failure: it still consumes retries, even though retrying cannot help.
///
/// # Examples
///
/// ```rust
/// use taskloom::executors::CallableRegistry;
/// use taskloom::types::IoMap;
/// use serde_json::json;
///
/// let mut registry = CallableRegistry::default();
/// registry.register("double", |input: IoMap| {
///     let n = input.get("value").and_then(|v| v.as_i64()).unwrap_or(0);
///     let mut out = IoMap::default();
///     out.insert("value".into(), json!(n * 2));
///     Ok(out)
/// });
/// assert!(registry.resolve("double").is_some());
/// ```
#[derive(Clone, Default)]
pub struct CallableRegistry {
    entries: FxHashMap<String, Arc<TaskCallable>>,
}

impl CallableRegistry {
    /// Register a callable under `name`, replacing any previous entry.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        callable: impl Fn(IoMap) -> Result<IoMap, CallableError> + Send + Sync + 'static,
    ) {
        self.entries.insert(name.into(), Arc::new(callable));
    }

    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Arc<TaskCallable>> {
        self.entries.get(name).cloned()
    }
}

impl std::fmt::Debug for CallableRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallableRegistry")
            .field("names", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn resolve_target(
    callables: &CallableRegistry,
    request: &DispatchRequest,
) -> Result<Arc<TaskCallable>, String> {
    match &request.target {
        ExecutionTarget::Callable(name) => callables
            .resolve(name)
            .ok_or_else(|| format!("unknown callable {name:?}")),
        ExecutionTarget::Procedure(uri) => {
            Err(format!("local executor cannot run remote procedure {uri:?}"))
        }
    }
}

/// Runs the callable synchronously on the scheduler's own thread.
///
/// The scheduler does not dispatch the next ready task until this call
/// returns; results still travel through the completion channel so that
/// graph mutation stays on the runner. Not interruptible once started.
pub struct LocalBlockingExecutor {
    callables: Arc<CallableRegistry>,
}

impl LocalBlockingExecutor {
    pub(crate) fn new(callables: Arc<CallableRegistry>) -> Self {
        Self { callables }
    }
}

impl TaskExecutor for LocalBlockingExecutor {
    fn dispatch(&self, request: DispatchRequest) {
        let DispatchRequest {
            task_id,
            task_uid,
            input,
            completions,
            ..
        } = &request;
        let callable = match resolve_target(&self.callables, &request) {
            Ok(callable) => callable,
            Err(message) => {
                send_completion(
                    &request.completions,
                    Completion::Finished {
                        task_id: request.task_id,
                        task_uid: request.task_uid,
                        outcome: Outcome::Failure(message),
                    },
                );
                return;
            }
        };
        send_completion(
            completions,
            Completion::Started {
                task_id: *task_id,
                task_uid: *task_uid,
            },
        );
        let outcome = match callable(input.clone()) {
            Ok(output) => Outcome::Success(output),
            Err(e) => Outcome::Failure(e.to_string()),
        };
        send_completion(
            completions,
            Completion::Finished {
                task_id: *task_id,
                task_uid: *task_uid,
                outcome,
            },
        );
    }

    fn cancel(&self, attempt: &AttemptHandle) {
        debug!(task = %attempt.task_id, "blocking attempt cannot be interrupted");
    }
}

/// Runs the callable on a blocking worker thread; `dispatch` returns
/// immediately and the result arrives through the completion channel.
///
/// Cancellation is best effort: the token is consulted before the callable
/// starts and again after it returns, so work already inside the callable
/// runs to completion but its result is discarded as `Aborted`.
pub struct LocalThreadedExecutor {
    callables: Arc<CallableRegistry>,
}

impl LocalThreadedExecutor {
    pub(crate) fn new(callables: Arc<CallableRegistry>) -> Self {
        Self { callables }
    }
}

impl TaskExecutor for LocalThreadedExecutor {
    fn dispatch(&self, request: DispatchRequest) {
        let callable = match resolve_target(&self.callables, &request) {
            Ok(callable) => callable,
            Err(message) => {
                send_completion(
                    &request.completions,
                    Completion::Finished {
                        task_id: request.task_id,
                        task_uid: request.task_uid,
                        outcome: Outcome::Failure(message),
                    },
                );
                return;
            }
        };
        let DispatchRequest {
            task_id,
            task_uid,
            input,
            completions,
            cancellation,
            ..
        } = request;
        tokio::task::spawn_blocking(move || {
            if cancellation.is_cancelled() {
                send_completion(
                    &completions,
                    Completion::Finished {
                        task_id,
                        task_uid,
                        outcome: Outcome::Aborted,
                    },
                );
                return;
            }
            send_completion(&completions, Completion::Started { task_id, task_uid });
            let result = callable(input);
            let outcome = if cancellation.is_cancelled() {
                Outcome::Aborted
            } else {
                match result {
                    Ok(output) => Outcome::Success(output),
                    Err(e) => Outcome::Failure(e.to_string()),
                }
            };
            send_completion(
                &completions,
                Completion::Finished {
                    task_id,
                    task_uid,
                    outcome,
                },
            );
        });
    }

    fn cancel(&self, attempt: &AttemptHandle) {
        attempt.cancellation.cancel();
    }
}
