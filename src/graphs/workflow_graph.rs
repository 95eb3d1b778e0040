//! The workflow graph: task storage, dependency edges, topology queries.

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::path::Path;
use thiserror::Error;

use super::edges::{DependencyEdge, FieldMapping};
use crate::persistence::{PersistedGraph, PersistenceError};
use crate::task::{TaskNode, TaskSpec};
use crate::types::{IoMap, TaskId, TaskType, UnknownTaskType};

/// Build-time graph errors.
///
/// All of these are fatal and raised synchronously while the graph is being
/// constructed or validated; none of them can occur mid-execution.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    UnknownTaskType(#[from] UnknownTaskType),

    #[error("unknown task id: {id}")]
    #[diagnostic(
        code(taskloom::graphs::unknown_node),
        help("Both endpoints of an edge must name tasks already added to this graph.")
    )]
    UnknownNode { id: TaskId },

    #[error("edge {from} -> {to} would create a cycle")]
    #[diagnostic(
        code(taskloom::graphs::cycle),
        help("Workflow graphs are DAGs; reorder the dependency or drop the edge.")
    )]
    Cycle { from: TaskId, to: TaskId },

    #[error("duplicate edge {from} -> {to}")]
    #[diagnostic(code(taskloom::graphs::duplicate_edge))]
    DuplicateEdge { from: TaskId, to: TaskId },

    #[error("edges into the root node are not allowed (target {to})")]
    #[diagnostic(
        code(taskloom::graphs::edge_into_root),
        help("The root carries workflow input; it has no upstream dependencies.")
    )]
    EdgeIntoRoot { to: TaskId },

    #[error("task {id} ({key:?}) is not reachable from the root")]
    #[diagnostic(
        code(taskloom::graphs::unreachable),
        help("Every task needs at least one incoming edge chain from the root.")
    )]
    Unreachable { id: TaskId, key: String },

    #[error("local task {id} ({key:?}) names no callable")]
    #[diagnostic(code(taskloom::graphs::missing_callable))]
    MissingCallable { id: TaskId, key: String },

    #[error("remote task {id} ({key:?}) names no procedure URI")]
    #[diagnostic(code(taskloom::graphs::missing_procedure))]
    MissingProcedure { id: TaskId, key: String },
}

/// An acyclic dependency graph of [`TaskNode`]s plus data-flow edges.
///
/// The graph owns a designated root node carrying the workflow-level input
/// (see [`WorkflowGraph::root`]); every other task must be reachable from it
/// through dependency edges. Structural mistakes (unknown ids, duplicate
/// edges, cycles, unknown task-type tags) are rejected at build time.
///
/// The graph is a passive store: task status only changes through the
/// scheduler in [`crate::runner`].
#[derive(Clone, Debug)]
pub struct WorkflowGraph {
    pub(crate) tasks: FxHashMap<TaskId, TaskNode>,
    /// Insertion order; keeps iteration and topological sorting deterministic.
    pub(crate) order: Vec<TaskId>,
    pub(crate) edges: Vec<DependencyEdge>,
    pub(crate) incoming: FxHashMap<TaskId, Vec<usize>>,
    pub(crate) outgoing: FxHashMap<TaskId, Vec<usize>>,
    pub(crate) next_id: u64,
}

impl Default for WorkflowGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowGraph {
    /// Creates a graph containing only the root node.
    #[must_use]
    pub fn new() -> Self {
        let mut graph = Self::empty();
        let root = TaskNode::root();
        graph.order.push(root.id());
        graph.tasks.insert(root.id(), root);
        graph.next_id = 1;
        graph
    }

    pub(crate) fn empty() -> Self {
        Self {
            tasks: FxHashMap::default(),
            order: Vec::new(),
            edges: Vec::new(),
            incoming: FxHashMap::default(),
            outgoing: FxHashMap::default(),
            next_id: 0,
        }
    }

    /// Id of the designated root node.
    #[must_use]
    pub fn root(&self) -> TaskId {
        TaskId::ROOT
    }

    /// Adds a task in state `Ready` and returns its id.
    ///
    /// `task_type_tag` is the string spelling of the executor variant
    /// ("local_blocking", "local_threaded", "remote_call"); an unknown tag
    /// fails with [`GraphError::UnknownTaskType`].
    pub fn add_task(
        &mut self,
        key: impl Into<String>,
        task_type_tag: &str,
        spec: TaskSpec,
    ) -> Result<TaskId, GraphError> {
        let task_type = TaskType::parse(task_type_tag)?;
        let id = TaskId(self.next_id);
        self.next_id += 1;
        let node = TaskNode::new(id, key, task_type, spec);
        self.order.push(id);
        self.tasks.insert(id, node);
        Ok(id)
    }

    /// Adds a dependency edge with the given field mapping.
    ///
    /// Fails with [`GraphError::UnknownNode`] for absent endpoints,
    /// [`GraphError::DuplicateEdge`] for a repeated ordered pair, and
    /// [`GraphError::Cycle`] if the edge would close a cycle.
    pub fn connect(
        &mut self,
        from: TaskId,
        to: TaskId,
        field_mapping: FieldMapping,
    ) -> Result<(), GraphError> {
        if !self.tasks.contains_key(&from) {
            return Err(GraphError::UnknownNode { id: from });
        }
        if !self.tasks.contains_key(&to) {
            return Err(GraphError::UnknownNode { id: to });
        }
        if to.is_root() {
            return Err(GraphError::EdgeIntoRoot { to });
        }
        if self
            .edges
            .iter()
            .any(|e| e.from_id() == from && e.to_id() == to)
        {
            return Err(GraphError::DuplicateEdge { from, to });
        }
        if from == to || self.reaches(to, from) {
            return Err(GraphError::Cycle { from, to });
        }
        let index = self.edges.len();
        self.edges
            .push(DependencyEdge::new(from, to, field_mapping));
        self.outgoing.entry(from).or_default().push(index);
        self.incoming.entry(to).or_default().push(index);
        Ok(())
    }

    pub(crate) fn insert_edge_unchecked(&mut self, edge: DependencyEdge) {
        let index = self.edges.len();
        self.outgoing.entry(edge.from_id()).or_default().push(index);
        self.incoming.entry(edge.to_id()).or_default().push(index);
        self.edges.push(edge);
    }

    /// `true` if `to` is reachable from `from` along dependency edges.
    fn reaches(&self, from: TaskId, to: TaskId) -> bool {
        let mut seen = FxHashSet::default();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            for &index in self.outgoing.get(&id).map(Vec::as_slice).unwrap_or(&[]) {
                stack.push(self.edges[index].to_id());
            }
        }
        false
    }

    pub fn task(&self, id: TaskId) -> Option<&TaskNode> {
        self.tasks.get(&id)
    }

    pub(crate) fn task_mut(&mut self, id: TaskId) -> Option<&mut TaskNode> {
        self.tasks.get_mut(&id)
    }

    /// First task whose key matches; keys are not required to be unique.
    pub fn task_by_key(&self, key: &str) -> Option<&TaskNode> {
        self.order
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .find(|t| t.key() == key)
    }

    /// Tasks in insertion order, root included.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskNode> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn parents(&self, id: TaskId) -> Vec<TaskId> {
        self.incoming
            .get(&id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .map(|&index| self.edges[index].from_id())
            .collect()
    }

    pub fn children(&self, id: TaskId) -> Vec<TaskId> {
        self.outgoing
            .get(&id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .map(|&index| self.edges[index].to_id())
            .collect()
    }

    /// Every task reachable from `id` along outgoing edges, excluding `id`.
    pub fn descendants(&self, id: TaskId) -> FxHashSet<TaskId> {
        let mut seen = FxHashSet::default();
        let mut queue: VecDeque<TaskId> = self.children(id).into();
        while let Some(next) = queue.pop_front() {
            if seen.insert(next) {
                queue.extend(self.children(next));
            }
        }
        seen
    }

    /// Deterministic topological ordering (Kahn's algorithm with
    /// insertion-order tie-breaking). The root comes first.
    #[must_use]
    pub fn topological_order(&self) -> Vec<TaskId> {
        let mut indegree: FxHashMap<TaskId, usize> = self
            .order
            .iter()
            .map(|&id| (id, self.parents(id).len()))
            .collect();
        let mut ordered = Vec::with_capacity(self.order.len());
        let mut frontier: Vec<TaskId> = self
            .order
            .iter()
            .copied()
            .filter(|id| indegree[id] == 0)
            .collect();
        while !frontier.is_empty() {
            let mut next_frontier = Vec::new();
            for id in frontier {
                ordered.push(id);
                for child in self.children(id) {
                    let degree = indegree.get_mut(&child).expect("child is a known task");
                    *degree -= 1;
                    if *degree == 0 {
                        next_frontier.push(child);
                    }
                }
            }
            next_frontier.sort_by_key(|id| self.order.iter().position(|o| o == id));
            frontier = next_frontier;
        }
        ordered
    }

    /// Output map the downstream side of an edge from `id` consumes.
    ///
    /// For the root this is its input map: the root is never executed, so
    /// the workflow-level input *is* what it offers downstream.
    pub fn upstream_output(&self, id: TaskId) -> Option<&IoMap> {
        let task = self.tasks.get(&id)?;
        if id.is_root() {
            Some(task.input())
        } else {
            Some(task.output())
        }
    }

    /// Merge a task's dispatch input: its static bindings first, then the
    /// remapped output of every incoming edge in edge-insertion order.
    /// Upstream data flows override static bindings on key collisions.
    pub(crate) fn merged_input(&self, id: TaskId) -> IoMap {
        let Some(task) = self.tasks.get(&id) else {
            return IoMap::default();
        };
        let mut merged = task.input().clone();
        for &index in self.incoming.get(&id).map(Vec::as_slice).unwrap_or(&[]) {
            let edge = &self.edges[index];
            if let Some(upstream) = self.upstream_output(edge.from_id()) {
                edge.field_mapping().apply(upstream, &mut merged);
            }
        }
        merged
    }

    /// Merge values into a task's input map.
    pub(crate) fn merge_input(&mut self, id: TaskId, values: IoMap) -> Result<(), GraphError> {
        let task = self.tasks.get_mut(&id).ok_or(GraphError::UnknownNode { id })?;
        task.input.extend(values);
        Ok(())
    }

    /// Structural invariant sweep, run before execution starts.
    ///
    /// Checks that every non-root task is reachable from the root and that
    /// each task names the execution target its type requires.
    pub fn validate(&self) -> Result<(), GraphError> {
        let reachable = self.descendants(self.root());
        for task in self.tasks() {
            let id = task.id();
            if id.is_root() {
                continue;
            }
            if !reachable.contains(&id) {
                return Err(GraphError::Unreachable {
                    id,
                    key: task.key().to_string(),
                });
            }
            match task.task_type() {
                TaskType::LocalBlocking | TaskType::LocalThreaded => {
                    if task.callable().is_none() {
                        return Err(GraphError::MissingCallable {
                            id,
                            key: task.key().to_string(),
                        });
                    }
                }
                TaskType::RemoteCall => {
                    if task.procedure().is_none() {
                        return Err(GraphError::MissingProcedure {
                            id,
                            key: task.key().to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// `true` when every task reachable from the root is `Completed`.
    #[must_use]
    pub fn is_fully_completed(&self) -> bool {
        self.descendants(self.root()).iter().all(|id| {
            self.tasks
                .get(id)
                .map(|t| t.status() == crate::types::TaskStatus::Completed)
                .unwrap_or(false)
        })
    }

    /// Serialize the full graph (topology and task state) to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        let persisted = PersistedGraph::from(self);
        let json = serde_json::to_string_pretty(&persisted)
            .map_err(|e| PersistenceError::Serde { source: e })?;
        std::fs::write(path.as_ref(), json).map_err(|e| PersistenceError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })
    }

    /// Load a graph previously written by [`save`](Self::save).
    ///
    /// The round-trip is lossless: statuses, outputs (where `store_output`
    /// was set), retry counters and timestamps all survive, so loading a
    /// fully completed graph yields one that a runner will not re-execute.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let json =
            std::fs::read_to_string(path.as_ref()).map_err(|e| PersistenceError::Io {
                path: path.as_ref().display().to_string(),
                source: e,
            })?;
        let persisted: PersistedGraph =
            serde_json::from_str(&json).map_err(|e| PersistenceError::Serde { source: e })?;
        WorkflowGraph::try_from(persisted)
    }
}
