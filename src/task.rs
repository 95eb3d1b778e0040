//! Task nodes and their lifecycle state machine.
//!
//! A [`TaskNode`] is a single unit of schedulable work: a typed execution
//! target plus an input map, an output map, and bookkeeping metadata. All
//! status changes go through the transition methods defined here, so the
//! rest of the crate can rely on the state machine's invariants:
//!
//! - `output` is non-empty only while the task is `Completed`;
//! - `retry_count` only ever decreases, and only on failure;
//! - `active` is `true` exactly while the task is `Submitted` or `Running`.
//!
//! Retry is modelled as an explicit self-loop back to `Ready` with a bounded
//! counter rather than recursive resubmission, which keeps termination
//! obvious: a task that always fails is attempted exactly
//! `retry_count + 1` times.

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use thiserror::Error;
use uuid::Uuid;

use crate::types::{IoMap, TaskId, TaskStatus, TaskType};

/// Attempted an illegal status transition.
///
/// These indicate a scheduler bug rather than a task failure; the runner
/// surfaces them as fatal errors instead of recording them on the node.
#[derive(Debug, Error, Diagnostic)]
#[error("illegal transition for task {id}: {from} -> {attempted}")]
#[diagnostic(
    code(taskloom::task::illegal_transition),
    help("Task statuses may only change along the documented state machine.")
)]
pub struct TransitionError {
    pub id: TaskId,
    pub from: TaskStatus,
    pub attempted: &'static str,
}

/// Declaration of a task, passed to
/// [`WorkflowGraph::add_task`](crate::graphs::WorkflowGraph::add_task).
///
/// A spec names the execution target (callable name for local variants,
/// procedure URI for remote calls), the declared required input keys, any
/// statically bound input values, and the scheduling knobs.
///
/// # Examples
///
/// ```rust
/// use taskloom::task::TaskSpec;
/// use serde_json::json;
///
/// let spec = TaskSpec::callable("parametrize")
///     .require("topology")
///     .with_input("forcefield", json!("GAFF2"))
///     .with_retry_count(2)
///     .with_breakpoint();
/// assert_eq!(spec.retry_count, 2);
/// ```
#[derive(Clone, Debug, Default)]
pub struct TaskSpec {
    /// Name of the registered local callable (local executor variants).
    pub callable: Option<String>,
    /// Procedure URI for the remote-call executor.
    pub procedure: Option<String>,
    /// Input keys that must be present after merging; checked at dispatch.
    pub requires: Vec<String>,
    /// Statically bound input values, merged before upstream data flows in.
    pub input: IoMap,
    /// Additional attempts permitted after a failure.
    pub retry_count: u32,
    /// Halt the scheduler immediately before this task would be dispatched.
    pub breakpoint: bool,
    /// Persist `output` on [`save`](crate::graphs::WorkflowGraph::save).
    pub store_output: bool,
}

impl TaskSpec {
    /// Spec for a task backed by a registered local callable.
    #[must_use]
    pub fn callable(name: impl Into<String>) -> Self {
        Self {
            callable: Some(name.into()),
            store_output: true,
            ..Default::default()
        }
    }

    /// Spec for a task backed by a remote procedure.
    #[must_use]
    pub fn procedure(uri: impl Into<String>) -> Self {
        Self {
            procedure: Some(uri.into()),
            store_output: true,
            ..Default::default()
        }
    }

    /// Declare a required input key.
    #[must_use]
    pub fn require(mut self, key: impl Into<String>) -> Self {
        self.requires.push(key.into());
        self
    }

    /// Bind a static input value.
    #[must_use]
    pub fn with_input(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.input.insert(key.into(), value);
        self
    }

    /// Permit `count` additional attempts after a failure.
    #[must_use]
    pub fn with_retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    /// Arm a breakpoint on this task.
    #[must_use]
    pub fn with_breakpoint(mut self) -> Self {
        self.breakpoint = true;
        self
    }

    /// Control whether `output` is persisted on save (default: persisted).
    #[must_use]
    pub fn with_store_output(mut self, store: bool) -> Self {
        self.store_output = store;
        self
    }
}

/// A single unit of work in a workflow graph.
///
/// Fields are read-only outside this module except for `input`, which the
/// graph merges into before dispatch; every status change goes through a
/// transition method.
#[derive(Clone, Debug)]
pub struct TaskNode {
    id: TaskId,
    key: String,
    task_type: TaskType,
    status: TaskStatus,
    /// Parameter name -> value, merged from static bindings and upstream edges.
    pub(crate) input: IoMap,
    output: IoMap,
    /// Opaque identifier of the current attempt; regenerated on every
    /// (re)submission so stale executor reports can be discarded.
    task_uid: Uuid,
    retry_count: u32,
    breakpoint: bool,
    active: bool,
    store_output: bool,
    callable: Option<String>,
    procedure: Option<String>,
    requires: Vec<String>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl TaskNode {
    pub(crate) fn new(id: TaskId, key: impl Into<String>, task_type: TaskType, spec: TaskSpec) -> Self {
        Self {
            id,
            key: key.into(),
            task_type,
            status: TaskStatus::Ready,
            input: spec.input,
            output: IoMap::default(),
            task_uid: Uuid::new_v4(),
            retry_count: spec.retry_count,
            breakpoint: spec.breakpoint,
            active: false,
            store_output: spec.store_output,
            callable: spec.callable,
            procedure: spec.procedure,
            requires: spec.requires,
            started_at: None,
            ended_at: None,
        }
    }

    /// The structural root node: carries workflow-level input, is born
    /// `Completed`, and is never dispatched.
    pub(crate) fn root() -> Self {
        let mut node = Self::new(TaskId::ROOT, "root", TaskType::LocalBlocking, TaskSpec::default());
        node.status = TaskStatus::Completed;
        node
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn input(&self) -> &IoMap {
        &self.input
    }

    /// Result values; populated only while the task is `Completed`.
    pub fn output(&self) -> &IoMap {
        &self.output
    }

    /// Identifier of the current attempt.
    pub fn task_uid(&self) -> Uuid {
        self.task_uid
    }

    /// Remaining retries.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn breakpoint(&self) -> bool {
        self.breakpoint
    }

    /// `true` while the task occupies an executor.
    pub fn active(&self) -> bool {
        self.active
    }

    pub fn store_output(&self) -> bool {
        self.store_output
    }

    pub fn callable(&self) -> Option<&str> {
        self.callable.as_deref()
    }

    pub fn procedure(&self) -> Option<&str> {
        self.procedure.as_deref()
    }

    pub fn requires(&self) -> &[String] {
        &self.requires
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    fn illegal(&self, attempted: &'static str) -> TransitionError {
        TransitionError {
            id: self.id,
            from: self.status,
            attempted,
        }
    }

    /// `Ready -> Submitted`. Regenerates the attempt uid and returns it.
    pub(crate) fn submit(&mut self, merged_input: IoMap) -> Result<Uuid, TransitionError> {
        if self.status != TaskStatus::Ready {
            return Err(self.illegal("submit"));
        }
        self.input = merged_input;
        self.status = TaskStatus::Submitted;
        self.active = true;
        self.task_uid = Uuid::new_v4();
        Ok(self.task_uid)
    }

    /// `Submitted -> Running`; stamps `started_at` for this attempt.
    pub(crate) fn begin(&mut self) -> Result<(), TransitionError> {
        if self.status != TaskStatus::Submitted {
            return Err(self.illegal("begin"));
        }
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// `Running -> Completed`; records the output map.
    pub(crate) fn complete(&mut self, output: IoMap) -> Result<(), TransitionError> {
        if self.status != TaskStatus::Running {
            return Err(self.illegal("complete"));
        }
        self.status = TaskStatus::Completed;
        self.active = false;
        self.output = output;
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    /// Transient-failure self-loop: `Submitted/Running -> Ready`, consuming
    /// one retry and clearing any partial output.
    pub(crate) fn retry(&mut self) -> Result<(), TransitionError> {
        if !self.status.is_active() || self.retry_count == 0 {
            return Err(self.illegal("retry"));
        }
        self.retry_count -= 1;
        self.status = TaskStatus::Ready;
        self.active = false;
        self.output.clear();
        Ok(())
    }

    /// Terminal failure: `Ready/Submitted/Running -> Failed`. The `Ready`
    /// entry point covers dispatch-time errors (missing required input),
    /// which are never retried.
    pub(crate) fn fail(&mut self) -> Result<(), TransitionError> {
        if !matches!(
            self.status,
            TaskStatus::Ready | TaskStatus::Submitted | TaskStatus::Running
        ) {
            return Err(self.illegal("fail"));
        }
        self.status = TaskStatus::Failed;
        self.active = false;
        self.output.clear();
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    /// `Submitted/Running -> Aborted` on explicit cancellation.
    pub(crate) fn abort(&mut self) -> Result<(), TransitionError> {
        if !self.status.is_active() {
            return Err(self.illegal("abort"));
        }
        self.status = TaskStatus::Aborted;
        self.active = false;
        self.output.clear();
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    /// `Ready -> Disabled`: the task will never receive its required
    /// inputs because an upstream dependency failed.
    pub(crate) fn disable(&mut self) -> Result<(), TransitionError> {
        if self.status != TaskStatus::Ready {
            return Err(self.illegal("disable"));
        }
        self.status = TaskStatus::Disabled;
        Ok(())
    }

    /// Rehydrate a node from persisted fields. Used by the persistence
    /// layer only; invariants are the loader's responsibility.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_persisted(
        id: TaskId,
        key: String,
        task_type: TaskType,
        status: TaskStatus,
        input: IoMap,
        output: IoMap,
        task_uid: Uuid,
        retry_count: u32,
        breakpoint: bool,
        active: bool,
        store_output: bool,
        callable: Option<String>,
        procedure: Option<String>,
        requires: Vec<String>,
        started_at: Option<DateTime<Utc>>,
        ended_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            key,
            task_type,
            status,
            input,
            output,
            task_uid,
            retry_count,
            breakpoint,
            active,
            store_output,
            callable,
            procedure,
            requires,
            started_at,
            ended_at,
        }
    }
}
