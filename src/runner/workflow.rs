//! Runtime wrapper around a workflow graph.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashSet;

use crate::graphs::WorkflowGraph;
use crate::types::{TaskId, TaskStatus};

/// A [`WorkflowGraph`] plus run-level bookkeeping.
///
/// Everything status-shaped is derived from the graph on demand rather
/// than stored: `is_running`, `is_completed`, `has_failed`, the failed-task
/// list and the set of active breakpoints. Only the timestamps and the
/// breakpoint halt/step sets are state of their own.
#[derive(Clone, Debug)]
pub struct Workflow {
    graph: WorkflowGraph,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    /// Tasks currently halted at an armed breakpoint, awaiting a step.
    pub(crate) halted: FxHashSet<TaskId>,
    /// Tasks whose breakpoint has been stepped; the halt is suppressed for
    /// all future dispatches of these tasks, including retry re-entries.
    pub(crate) stepped: FxHashSet<TaskId>,
}

impl Workflow {
    /// Wrap a graph for execution.
    ///
    /// A graph loaded in a fully completed state is recognised as such:
    /// `finished_at` is reconstructed from the latest task end time, so
    /// `is_completed` holds and a subsequent run is a no-op.
    #[must_use]
    pub fn new(graph: WorkflowGraph) -> Self {
        let finished_at = if graph.is_fully_completed() {
            graph.tasks().filter_map(|t| t.ended_at()).max()
        } else {
            None
        };
        Self {
            graph,
            started_at: None,
            finished_at,
            updated_at: None,
            halted: FxHashSet::default(),
            stepped: FxHashSet::default(),
        }
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    pub(crate) fn graph_mut(&mut self) -> &mut WorkflowGraph {
        &mut self.graph
    }

    /// Consume the wrapper, returning the graph (e.g. for saving).
    #[must_use]
    pub fn into_graph(self) -> WorkflowGraph {
        self.graph
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Set only on full, non-cancelled, non-failed completion.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Bumped on every task transition.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub(crate) fn mark_started(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    pub(crate) fn mark_finished(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }

    /// `true` while any task is submitted or running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.graph.tasks().any(|t| t.status().is_active())
    }

    /// `true` once every reachable task completed and the finish time is set.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.finished_at.is_some() && self.graph.is_fully_completed()
    }

    /// `true` if any task ended `Failed` or `Aborted`.
    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.graph
            .tasks()
            .any(|t| matches!(t.status(), TaskStatus::Failed | TaskStatus::Aborted))
    }

    /// Tasks that ended `Failed` or `Aborted`, in insertion order.
    #[must_use]
    pub fn failed_tasks(&self) -> Vec<TaskId> {
        self.graph
            .tasks()
            .filter(|t| matches!(t.status(), TaskStatus::Failed | TaskStatus::Aborted))
            .map(|t| t.id())
            .collect()
    }

    /// Tasks currently halted at a breakpoint, in insertion order.
    #[must_use]
    pub fn active_breakpoints(&self) -> Vec<TaskId> {
        self.graph
            .tasks()
            .filter(|t| self.halted.contains(&t.id()))
            .map(|t| t.id())
            .collect()
    }
}
