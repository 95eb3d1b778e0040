//! The workflow scheduler: ready-set dispatch, completion handling, retry,
//! breakpoints, and cancellation.

use chrono::Utc;
use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::config::RunnerConfig;
use super::workflow::Workflow;
use crate::events::{EventEmitter, RunEvent};
use crate::executors::{
    AttemptHandle, Completion, DispatchRequest, ExecutionTarget, Executors, Outcome,
};
use crate::graphs::{GraphError, WorkflowGraph};
use crate::task::TransitionError;
use crate::types::{IoMap, TaskId, TaskStatus, TaskType};

/// Terminal condition of one `run()` invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every reachable task completed; `finished_at` is set.
    Completed,
    /// At least one task failed or was aborted; `finished_at` stays unset.
    Failed,
    /// The ready set drained with work remaining, typically because of an
    /// armed breakpoint. Neither completed nor failed.
    Paused,
}

/// Summary of one `run()` invocation.
///
/// Task-level errors never surface as `Err` from the runner; they are
/// visible here and through [`Workflow::has_failed`]/
/// [`Workflow::failed_tasks`].
#[derive(Clone, Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Submissions in dispatch order, retries included.
    pub dispatched: Vec<TaskId>,
    /// Tasks that ended `Failed` or `Aborted`.
    pub failed: Vec<TaskId>,
    /// Tasks halted at a breakpoint when the run returned.
    pub halted: Vec<TaskId>,
}

/// Clonable handle for requesting cancellation while `run()` is in flight.
///
/// Cancellation is cooperative and non-blocking: it asks in-flight
/// executors to stop, transitions their tasks to `Aborted`, and prevents
/// any further dispatch. It never waits for remote work to actually halt.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Errors surfaced by the runner's control surface.
///
/// Execution errors inside tasks are *not* here: those are recorded on the
/// task nodes and reported through [`RunReport`].
#[derive(Debug, Error, Diagnostic)]
pub enum RunnerError {
    #[error("unknown task id: {id}")]
    #[diagnostic(code(taskloom::runner::unknown_task))]
    UnknownTask { id: TaskId },

    #[error("operation is not legal while the workflow is running")]
    #[diagnostic(
        code(taskloom::runner::workflow_running),
        help("Seed inputs before calling run(), or wait for the run to settle.")
    )]
    WorkflowRunning,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Transition(#[from] TransitionError),
}

/// Walks a workflow graph, dispatching ready tasks through the executor
/// set and folding their completions back into the graph.
///
/// The runner is the only writer of the graph. Executors run concurrently
/// but communicate exclusively through one completion channel, so every
/// status transition happens on the runner's own thread of control.
///
/// # Usage
///
/// ```rust,no_run
/// use taskloom::executors::{CallableRegistry, Executors};
/// use taskloom::graphs::{FieldMapping, WorkflowGraph};
/// use taskloom::runner::WorkflowRunner;
/// use taskloom::task::TaskSpec;
/// use taskloom::types::IoMap;
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut registry = CallableRegistry::default();
/// registry.register("solvate", |input: IoMap| Ok(input));
///
/// let mut graph = WorkflowGraph::new();
/// let solvate = graph.add_task("solvate", "local_threaded", TaskSpec::callable("solvate"))?;
/// graph.connect(graph.root(), solvate, FieldMapping::identity())?;
///
/// let mut runner = WorkflowRunner::new(graph, Executors::new(registry, None));
/// let mut seed = IoMap::default();
/// seed.insert("box_size".into(), json!(4.2));
/// runner.input(runner.workflow().graph().root(), seed)?;
///
/// let report = runner.run().await?;
/// assert!(runner.workflow().is_completed());
/// # Ok(())
/// # }
/// ```
pub struct WorkflowRunner {
    workflow: Workflow,
    executors: Executors,
    config: RunnerConfig,
    completions_tx: flume::Sender<Completion>,
    completions_rx: flume::Receiver<Completion>,
    events: EventEmitter,
    events_rx: flume::Receiver<RunEvent>,
    /// One entry per in-flight attempt, keyed by task id.
    in_flight: FxHashMap<TaskId, (AttemptHandle, TaskType)>,
    /// Ready tasks waiting for a parallelism slot.
    queued: VecDeque<TaskId>,
    queued_set: FxHashSet<TaskId>,
    cancel_token: CancellationToken,
    cancel_requested: bool,
    dispatched_log: Vec<TaskId>,
}

impl WorkflowRunner {
    /// Attach a runner to a graph with the default configuration.
    #[must_use]
    pub fn new(graph: WorkflowGraph, executors: Executors) -> Self {
        Self::with_config(graph, executors, RunnerConfig::default())
    }

    #[must_use]
    pub fn with_config(graph: WorkflowGraph, executors: Executors, config: RunnerConfig) -> Self {
        let (completions_tx, completions_rx) = flume::unbounded();
        let (events_tx, events_rx) = flume::unbounded();
        Self {
            workflow: Workflow::new(graph),
            executors,
            config,
            completions_tx,
            completions_rx,
            events: EventEmitter::new(events_tx),
            events_rx,
            in_flight: FxHashMap::default(),
            queued: VecDeque::new(),
            queued_set: FxHashSet::default(),
            cancel_token: CancellationToken::new(),
            cancel_requested: false,
            dispatched_log: Vec::new(),
        }
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// Consume the runner, returning the workflow (e.g. to save its graph).
    #[must_use]
    pub fn into_workflow(self) -> Workflow {
        self.workflow
    }

    /// Subscribe to the run event stream. Multiple subscribers share one
    /// queue; events are buffered until read.
    #[must_use]
    pub fn subscribe(&self) -> flume::Receiver<RunEvent> {
        self.events_rx.clone()
    }

    /// Handle for cancelling a run from another task or thread.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            token: self.cancel_token.clone(),
        }
    }

    /// Merge values into a task's input map (usually the root's, to seed
    /// the workflow). Only legal while the workflow is not running.
    pub fn input(&mut self, id: TaskId, values: IoMap) -> Result<(), RunnerError> {
        if self.workflow.is_running() {
            return Err(RunnerError::WorkflowRunning);
        }
        self.workflow.graph_mut().merge_input(id, values)?;
        Ok(())
    }

    /// Clear the halt for a breakpointed task, allowing a subsequent
    /// [`run_from`](Self::run_from) to dispatch it.
    ///
    /// Stepping suppresses the breakpoint for all future dispatches of the
    /// task (retry re-entries included); the persistent `breakpoint` flag
    /// on the node itself is left armed for freshly loaded graphs.
    #[instrument(skip(self))]
    pub fn step_breakpoint(&mut self, id: TaskId) -> Result<(), RunnerError> {
        if self.workflow.graph().task(id).is_none() {
            return Err(RunnerError::UnknownTask { id });
        }
        self.workflow.halted.remove(&id);
        self.workflow.stepped.insert(id);
        info!(task = %id, "breakpoint stepped");
        Ok(())
    }

    /// Cancel directly on the runner (between runs). Equivalent to
    /// [`CancelHandle::cancel`] plus immediate bookkeeping; idempotent.
    #[instrument(skip(self))]
    pub fn cancel(&mut self) -> Result<(), RunnerError> {
        self.cancel_token.cancel();
        self.handle_cancel()
    }

    /// Run until the workflow settles: completed, failed, or paused at a
    /// breakpoint.
    pub async fn run(&mut self) -> Result<RunReport, RunnerError> {
        self.run_from(None).await
    }

    /// Like [`run`](Self::run), but seeds the ready-set scan from
    /// `resume_from` and its descendants — the usual continuation after
    /// [`step_breakpoint`](Self::step_breakpoint).
    #[instrument(skip(self), err)]
    pub async fn run_from(
        &mut self,
        resume_from: Option<TaskId>,
    ) -> Result<RunReport, RunnerError> {
        self.dispatched_log.clear();
        if let Some(anchor) = resume_from
            && self.workflow.graph().task(anchor).is_none()
        {
            return Err(RunnerError::UnknownTask { id: anchor });
        }
        if self.workflow.is_completed() {
            debug!("workflow already completed; nothing to run");
            return Ok(self.report(RunOutcome::Completed));
        }
        self.workflow.graph().validate()?;
        if self.cancel_token.is_cancelled() {
            self.cancel_requested = true;
        }
        if self.cancel_requested {
            return Ok(self.finalize());
        }

        let fresh = self.workflow.started_at().is_none();
        self.workflow.mark_started();
        if fresh {
            self.events.emit(RunEvent::WorkflowStarted { at: Utc::now() });
            info!("workflow run started");
        }

        let candidates: Vec<TaskId> = match resume_from {
            None => self.workflow.graph().topological_order(),
            Some(anchor) => {
                let subtree: FxHashSet<TaskId> = {
                    let graph = self.workflow.graph();
                    let mut set = graph.descendants(anchor);
                    set.insert(anchor);
                    set
                };
                self.workflow
                    .graph()
                    .topological_order()
                    .into_iter()
                    .filter(|id| subtree.contains(id))
                    .collect()
            }
        };
        for id in candidates {
            self.try_dispatch(id)?;
        }

        loop {
            if self.in_flight.is_empty() {
                break;
            }
            let next = {
                let rx = self.completions_rx.clone();
                let cancel = self.cancel_token.clone();
                tokio::select! {
                    _ = cancel.cancelled() => None,
                    received = rx.recv_async() => received.ok(),
                }
            };
            match next {
                Some(completion) => self.handle_completion(completion)?,
                None => self.handle_cancel()?,
            }
        }

        Ok(self.finalize())
    }

    /// Consider one task for dispatch: `Ready`, every parent `Completed`,
    /// not halted by a breakpoint, and within the parallelism limit.
    fn try_dispatch(&mut self, id: TaskId) -> Result<(), RunnerError> {
        if id.is_root() || self.cancel_requested || self.queued_set.contains(&id) {
            return Ok(());
        }
        enum Gate {
            NotReady,
            Halt { key: String, fresh: bool },
            Eligible,
        }
        let gate = {
            let graph = self.workflow.graph();
            match graph.task(id) {
                None => Gate::NotReady,
                Some(task) if task.status() != TaskStatus::Ready => Gate::NotReady,
                Some(task) => {
                    let parents_completed = graph.parents(id).into_iter().all(|p| {
                        graph
                            .task(p)
                            .map(|t| t.status() == TaskStatus::Completed)
                            .unwrap_or(false)
                    });
                    if !parents_completed {
                        Gate::NotReady
                    } else if task.breakpoint() && !self.workflow.stepped.contains(&id) {
                        Gate::Halt {
                            key: task.key().to_string(),
                            fresh: !self.workflow.halted.contains(&id),
                        }
                    } else {
                        Gate::Eligible
                    }
                }
            }
        };
        match gate {
            Gate::NotReady => Ok(()),
            Gate::Halt { key, fresh } => {
                if fresh {
                    self.workflow.halted.insert(id);
                    info!(task = %id, key = %key, "breakpoint hit; scheduling halted");
                    self.events.emit(RunEvent::BreakpointHit { id, key });
                }
                Ok(())
            }
            Gate::Eligible => {
                if self.in_flight.len() >= self.config.max_parallel {
                    self.queued.push_back(id);
                    self.queued_set.insert(id);
                    return Ok(());
                }
                self.dispatch_now(id)
            }
        }
    }

    /// Merge the task's input, enforce `requires`, and hand the attempt to
    /// its executor.
    fn dispatch_now(&mut self, id: TaskId) -> Result<(), RunnerError> {
        let merged = self.workflow.graph().merged_input(id);

        let missing: Vec<String> = {
            let Some(task) = self.workflow.graph().task(id) else {
                return Ok(());
            };
            task.requires()
                .iter()
                .filter(|key| !merged.contains_key(*key))
                .cloned()
                .collect()
        };
        if !missing.is_empty() {
            // Dispatch-time error: fatal for this task, never retried.
            let key = self.fail_task(
                id,
                format!("missing required input: {}", missing.join(", ")),
            )?;
            warn!(task = %id, key = %key, ?missing, "missing required input; task failed");
            return Ok(());
        }

        let (uid, key, task_type, target, input) = {
            let Some(task) = self.workflow.graph_mut().task_mut(id) else {
                return Ok(());
            };
            let uid = task.submit(merged)?;
            let target = match task.task_type() {
                TaskType::RemoteCall => {
                    ExecutionTarget::Procedure(task.procedure().unwrap_or_default().to_string())
                }
                TaskType::LocalBlocking | TaskType::LocalThreaded => {
                    ExecutionTarget::Callable(task.callable().unwrap_or_default().to_string())
                }
            };
            (
                uid,
                task.key().to_string(),
                task.task_type(),
                target,
                task.input().clone(),
            )
        };
        self.workflow.touch();

        let cancellation = self.cancel_token.child_token();
        let handle = AttemptHandle {
            task_id: id,
            task_uid: uid,
            cancellation: cancellation.clone(),
        };
        self.in_flight.insert(id, (handle, task_type));
        self.dispatched_log.push(id);
        self.events.emit(RunEvent::TaskSubmitted {
            id,
            key: key.clone(),
            attempt: uid.to_string(),
        });
        debug!(task = %id, key = %key, kind = %task_type, "task dispatched");

        let request = DispatchRequest {
            task_id: id,
            task_uid: uid,
            target,
            input,
            completions: self.completions_tx.clone(),
            cancellation,
        };
        self.executors.get(task_type).dispatch(request);
        Ok(())
    }

    /// Fold one executor signal back into the graph.
    fn handle_completion(&mut self, completion: Completion) -> Result<(), RunnerError> {
        let id = completion.task_id();
        let uid = completion.task_uid();
        let current = self.in_flight.get(&id).map(|(handle, _)| handle.task_uid);
        if current != Some(uid) {
            debug!(task = %id, attempt = %uid, "discarding completion from stale attempt");
            return Ok(());
        }

        match completion {
            Completion::Started { .. } => {
                let key = {
                    let Some(task) = self.workflow.graph_mut().task_mut(id) else {
                        return Ok(());
                    };
                    task.begin()?;
                    task.key().to_string()
                };
                self.workflow.touch();
                self.events.emit(RunEvent::TaskStarted { id, key });
                Ok(())
            }
            Completion::Finished { outcome, .. } => {
                self.in_flight.remove(&id);
                match outcome {
                    Outcome::Success(output) => self.complete_task(id, output)?,
                    Outcome::Failure(error) => self.fail_or_retry(id, error)?,
                    Outcome::Aborted => self.abort_task(id)?,
                }
                self.pump_queue()
            }
        }
    }

    fn complete_task(&mut self, id: TaskId, output: IoMap) -> Result<(), RunnerError> {
        let key = {
            let Some(task) = self.workflow.graph_mut().task_mut(id) else {
                return Ok(());
            };
            task.complete(output)?;
            task.key().to_string()
        };
        self.workflow.touch();
        self.events.emit(RunEvent::TaskCompleted {
            id,
            key: key.clone(),
        });
        debug!(task = %id, key = %key, "task completed");
        // Streaming dispatch: successors become ready the moment their
        // last parent completes, not at the end of a generation.
        for child in self.workflow.graph().children(id) {
            self.try_dispatch(child)?;
        }
        Ok(())
    }

    fn fail_or_retry(&mut self, id: TaskId, error: String) -> Result<(), RunnerError> {
        let retrying = self
            .workflow
            .graph()
            .task(id)
            .map(|t| t.retry_count() > 0)
            .unwrap_or(false);
        if retrying {
            let (key, remaining) = {
                let Some(task) = self.workflow.graph_mut().task_mut(id) else {
                    return Ok(());
                };
                task.retry()?;
                (task.key().to_string(), task.retry_count())
            };
            self.workflow.touch();
            warn!(task = %id, key = %key, remaining, error = %error, "task failed; retrying");
            self.events.emit(RunEvent::TaskFailed {
                id,
                key,
                error,
                retrying: true,
                remaining_retries: remaining,
            });
            self.try_dispatch(id)?;
            return Ok(());
        }
        let key = self.fail_task(id, error)?;
        warn!(task = %id, key = %key, "task failed terminally");
        Ok(())
    }

    /// Terminal failure: record it and disable the dependent subtree.
    fn fail_task(&mut self, id: TaskId, error: String) -> Result<String, RunnerError> {
        let key = {
            let Some(task) = self.workflow.graph_mut().task_mut(id) else {
                return Ok(String::new());
            };
            task.fail()?;
            task.key().to_string()
        };
        self.workflow.touch();
        self.events.emit(RunEvent::TaskFailed {
            id,
            key: key.clone(),
            error,
            retrying: false,
            remaining_retries: 0,
        });
        self.disable_descendants(id)?;
        Ok(key)
    }

    fn abort_task(&mut self, id: TaskId) -> Result<(), RunnerError> {
        let key = {
            let Some(task) = self.workflow.graph_mut().task_mut(id) else {
                return Ok(());
            };
            if !task.status().is_active() {
                return Ok(());
            }
            task.abort()?;
            task.key().to_string()
        };
        self.workflow.touch();
        self.events.emit(RunEvent::TaskAborted { id, key });
        Ok(())
    }

    /// Not-yet-submitted descendants of a failed task can never receive
    /// their inputs; park them in `Disabled` permanently.
    fn disable_descendants(&mut self, id: TaskId) -> Result<(), RunnerError> {
        let descendants = self.workflow.graph().descendants(id);
        let ordered: Vec<TaskId> = self
            .workflow
            .graph()
            .topological_order()
            .into_iter()
            .filter(|d| descendants.contains(d))
            .collect();
        for d in ordered {
            let disabled = {
                let Some(task) = self.workflow.graph_mut().task_mut(d) else {
                    continue;
                };
                if task.status() == TaskStatus::Ready {
                    task.disable()?;
                    Some(task.key().to_string())
                } else {
                    None
                }
            };
            if let Some(key) = disabled {
                self.workflow.halted.remove(&d);
                self.queued_set.remove(&d);
                self.queued.retain(|q| *q != d);
                self.workflow.touch();
                self.events.emit(RunEvent::TaskDisabled { id: d, key });
            }
        }
        Ok(())
    }

    fn pump_queue(&mut self) -> Result<(), RunnerError> {
        while self.in_flight.len() < self.config.max_parallel && !self.cancel_requested {
            let Some(id) = self.queued.pop_front() else {
                break;
            };
            self.queued_set.remove(&id);
            let still_ready = self
                .workflow
                .graph()
                .task(id)
                .map(|t| t.status() == TaskStatus::Ready)
                .unwrap_or(false);
            if still_ready {
                self.dispatch_now(id)?;
            }
        }
        Ok(())
    }

    /// Cancellation bookkeeping: abort everything in flight, drop the
    /// pending queue, and dispatch nothing further.
    fn handle_cancel(&mut self) -> Result<(), RunnerError> {
        if self.cancel_requested && self.in_flight.is_empty() {
            return Ok(());
        }
        self.cancel_requested = true;
        info!(in_flight = self.in_flight.len(), "cancelling workflow run");
        let attempts: Vec<(AttemptHandle, TaskType)> =
            self.in_flight.drain().map(|(_, entry)| entry).collect();
        for (handle, task_type) in attempts {
            self.executors.get(task_type).cancel(&handle);
            self.abort_task(handle.task_id)?;
        }
        self.queued.clear();
        self.queued_set.clear();
        Ok(())
    }

    /// Decide the run outcome and stamp workflow-level state.
    fn finalize(&mut self) -> RunReport {
        if self.workflow.has_failed() {
            let failed = self.workflow.failed_tasks();
            info!(?failed, "workflow run failed");
            self.events.emit(RunEvent::WorkflowFailed {
                failed: failed.clone(),
            });
            return self.report(RunOutcome::Failed);
        }
        if self.workflow.graph().is_fully_completed() {
            if self.workflow.finished_at().is_none() {
                self.workflow.mark_finished();
            }
            info!("workflow run completed");
            self.events.emit(RunEvent::WorkflowCompleted { at: Utc::now() });
            return self.report(RunOutcome::Completed);
        }
        let halted = self.workflow.active_breakpoints();
        info!(?halted, "workflow run paused");
        self.events.emit(RunEvent::WorkflowPaused {
            halted: halted.clone(),
        });
        self.report(RunOutcome::Paused)
    }

    fn report(&self, outcome: RunOutcome) -> RunReport {
        RunReport {
            outcome,
            dispatched: self.dispatched_log.clone(),
            failed: self.workflow.failed_tasks(),
            halted: self.workflow.active_breakpoints(),
        }
    }
}
