//! Remote execution through the external RPC collaborator.

use async_trait::async_trait;
use miette::Diagnostic;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::{
    AttemptHandle, Completion, DispatchRequest, ExecutionTarget, Outcome, TaskExecutor,
    send_completion,
};
use crate::types::IoMap;

/// Error returned by the RPC collaborator.
///
/// The scheduler treats transport-level and application-level failures
/// identically, so a single rendered message is all it needs.
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(taskloom::executors::rpc))]
pub struct RpcError {
    pub message: String,
}

impl RpcError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// External RPC collaborator invoked for `remote_call` tasks.
///
/// Authentication and schema validation on this channel are entirely the
/// collaborator's responsibility; the scheduler only sees success or
/// failure.
#[async_trait]
pub trait RpcClient: Send + Sync {
    /// Invoke `procedure_uri` with the merged input map.
    async fn call(&self, procedure_uri: &str, input: IoMap) -> Result<IoMap, RpcError>;

    /// Best-effort cancellation of an outstanding call. Transports without
    /// cancellation support can keep the default no-op; the scheduler
    /// aborts locally either way, without waiting for the remote side.
    fn cancel(&self, task_uid: Uuid) {
        let _ = task_uid;
    }
}

/// Issues calls through an [`RpcClient`] on spawned tasks.
///
/// Cancellation aborts the local await and reports `Aborted`; whether the
/// remote side actually stops is not confirmed. A completion from a stale
/// attempt is discarded by the runner via its `task_uid`.
pub struct RemoteCallExecutor {
    client: Option<Arc<dyn RpcClient>>,
}

impl RemoteCallExecutor {
    pub(crate) fn new(client: Option<Arc<dyn RpcClient>>) -> Self {
        Self { client }
    }
}

impl TaskExecutor for RemoteCallExecutor {
    fn dispatch(&self, request: DispatchRequest) {
        let DispatchRequest {
            task_id,
            task_uid,
            target,
            input,
            completions,
            cancellation,
        } = request;
        let uri = match target {
            ExecutionTarget::Procedure(uri) => uri,
            ExecutionTarget::Callable(name) => {
                send_completion(
                    &completions,
                    Completion::Finished {
                        task_id,
                        task_uid,
                        outcome: Outcome::Failure(format!(
                            "remote executor cannot run local callable {name:?}"
                        )),
                    },
                );
                return;
            }
        };
        let Some(client) = self.client.clone() else {
            send_completion(
                &completions,
                Completion::Finished {
                    task_id,
                    task_uid,
                    outcome: Outcome::Failure("no RPC client configured".to_string()),
                },
            );
            return;
        };
        tokio::spawn(async move {
            send_completion(&completions, Completion::Started { task_id, task_uid });
            let outcome = tokio::select! {
                _ = cancellation.cancelled() => Outcome::Aborted,
                result = client.call(&uri, input) => match result {
                    Ok(output) => Outcome::Success(output),
                    Err(e) => Outcome::Failure(e.to_string()),
                },
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
        if let Some(client) = &self.client {
            client.cancel(attempt.task_uid);
        }
        debug!(task = %attempt.task_id, "remote call aborted locally; remote side not awaited");
    }
}
