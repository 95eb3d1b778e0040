//! Core types for the taskloom orchestration engine.
//!
//! This module defines the fundamental identifiers used throughout the
//! system: task identity, executor selection tags, and the task status
//! vocabulary that the scheduler's state machine operates on.
//!
//! # Key Types
//!
//! - [`TaskId`]: Graph-local identifier for a task node, stable across save/load
//! - [`TaskType`]: Closed tag selecting one of the executor strategies
//! - [`TaskStatus`]: Lifecycle state of a task node
//! - [`IoMap`]: The key/value shape of task inputs and outputs
//!
//! # Examples
//!
//! ```rust
//! use taskloom::types::{TaskStatus, TaskType};
//!
//! let kind = TaskType::parse("local_threaded").unwrap();
//! assert_eq!(kind, TaskType::LocalThreaded);
//! assert_eq!(kind.encode(), "local_threaded");
//!
//! assert!(TaskStatus::Running.is_active());
//! assert!(TaskStatus::Aborted.is_terminal());
//! ```

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Key/value map used for task inputs and outputs.
///
/// Values are arbitrary JSON; the scheduler never interprets them beyond
/// moving them along data-flow edges.
pub type IoMap = FxHashMap<String, serde_json::Value>;

/// Identifier of a task node within a workflow graph.
///
/// Ids are allocated sequentially by [`WorkflowGraph`](crate::graphs::WorkflowGraph)
/// and are stable across [`save`](crate::graphs::WorkflowGraph::save)/
/// [`load`](crate::graphs::WorkflowGraph::load) round-trips. The designated
/// root node is always [`TaskId::ROOT`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    /// The designated root node of every graph.
    pub const ROOT: TaskId = TaskId(0);

    /// Returns `true` if this is the root id.
    #[must_use]
    pub fn is_root(&self) -> bool {
        *self == Self::ROOT
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Error raised when a task-type tag is not one of the known variants.
///
/// Task types form a closed union; the string tags exist only as the
/// persisted/builder-facing spelling of the variants.
#[derive(Debug, Error, Diagnostic)]
#[error("unknown task type tag: {tag:?}")]
#[diagnostic(
    code(taskloom::types::unknown_task_type),
    help("Known tags are \"local_blocking\", \"local_threaded\" and \"remote_call\".")
)]
pub struct UnknownTaskType {
    pub tag: String,
}

/// Selects the execution strategy for a task node.
///
/// Each variant maps to one executor implementation in
/// [`crate::executors`]; the mapping is fixed at compile time rather than
/// discovered dynamically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    /// Runs the named callable synchronously on the scheduler's thread.
    LocalBlocking,
    /// Runs the named callable on a worker thread, reporting back
    /// asynchronously.
    LocalThreaded,
    /// Issues the call through the external RPC collaborator.
    RemoteCall,
}

impl TaskType {
    /// Encode this task type into its persisted string tag.
    #[must_use]
    pub fn encode(&self) -> &'static str {
        match self {
            TaskType::LocalBlocking => "local_blocking",
            TaskType::LocalThreaded => "local_threaded",
            TaskType::RemoteCall => "remote_call",
        }
    }

    /// Parse a string tag into a task type.
    ///
    /// Unknown tags are a build-time error: the graph refuses to create a
    /// node whose executor it cannot name.
    pub fn parse(tag: &str) -> Result<Self, UnknownTaskType> {
        match tag {
            "local_blocking" => Ok(TaskType::LocalBlocking),
            "local_threaded" => Ok(TaskType::LocalThreaded),
            "remote_call" => Ok(TaskType::RemoteCall),
            other => Err(UnknownTaskType {
                tag: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encode())
    }
}

/// Lifecycle state of a task node.
///
/// Transitions happen exclusively through the methods on
/// [`TaskNode`](crate::task::TaskNode); see that module for the full state
/// machine. `Completed`, `Failed` and `Aborted` are terminal; `Disabled`
/// never runs and is therefore effectively terminal as well.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Eligible for dispatch once every upstream dependency is completed.
    Ready,
    /// Handed to an executor; execution has not been confirmed yet.
    Submitted,
    /// The executor confirmed that execution has begun.
    Running,
    /// Finished successfully; `output` is populated.
    Completed,
    /// Finished unsuccessfully with no retries remaining.
    Failed,
    /// Cancelled while submitted or running.
    Aborted,
    /// Permanently unscheduled because an upstream dependency failed.
    Disabled,
}

impl TaskStatus {
    /// Encode this status into its persisted string form.
    #[must_use]
    pub fn encode(&self) -> &'static str {
        match self {
            TaskStatus::Ready => "ready",
            TaskStatus::Submitted => "submitted",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Aborted => "aborted",
            TaskStatus::Disabled => "disabled",
        }
    }

    /// Parse a persisted string form back into a status.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ready" => Some(TaskStatus::Ready),
            "submitted" => Some(TaskStatus::Submitted),
            "running" => Some(TaskStatus::Running),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            "aborted" => Some(TaskStatus::Aborted),
            "disabled" => Some(TaskStatus::Disabled),
            _ => None,
        }
    }

    /// Returns `true` while the task occupies an executor
    /// (`Submitted` or `Running`).
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Submitted | TaskStatus::Running)
    }

    /// Returns `true` for states the task can never leave.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Aborted | TaskStatus::Disabled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encode())
    }
}
