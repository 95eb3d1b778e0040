/*!
Persistence primitives for serializing/deserializing workflow graphs.

Design goals:
- Explicit serde-friendly structs decoupled from the in-memory
  representations.
- Conversion logic localized here (From / TryFrom impls) so the graph's
  `save`/`load` stay lean and declarative.
- Human-auditable encoding: statuses and task types as their string tags,
  timestamps as RFC3339 strings, attempt uids as hyphenated UUID strings.

File I/O lives on [`WorkflowGraph`](crate::graphs::WorkflowGraph); this
module is pure data transformation and (de)serialization glue.
*/

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::graphs::{DependencyEdge, FieldMapping, WorkflowGraph};
use crate::task::TaskNode;
use crate::types::{IoMap, TaskId, TaskStatus, TaskType};

/// Conversion and serialization errors for the persisted graph format.
#[derive(Debug, Error, Diagnostic)]
pub enum PersistenceError {
    #[error("JSON serialization/deserialization failed: {source}")]
    #[diagnostic(
        code(taskloom::persistence::serde),
        help("Ensure the file matches the persisted graph schema.")
    )]
    Serde {
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error on {path}: {source}")]
    #[diagnostic(code(taskloom::persistence::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid persisted graph: {what}")]
    #[diagnostic(
        code(taskloom::persistence::decode),
        help("The file was produced by an incompatible version or edited by hand.")
    )]
    Decode { what: String },
}

impl PersistenceError {
    fn decode(what: impl Into<String>) -> Self {
        Self::Decode { what: what.into() }
    }
}

/// Persisted shape of a single task node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedTask {
    pub id: u64,
    pub key: String,
    pub task_type: String,
    pub status: String,
    #[serde(default)]
    pub input: IoMap,
    /// Present only when `store_output` is set and the task completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<IoMap>,
    pub task_uid: String,
    pub retry_count: u32,
    pub breakpoint: bool,
    pub active: bool,
    pub store_output: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub procedure: Option<String>,
    #[serde(default)]
    pub requires: Vec<String>,
    /// RFC3339 timestamps; kept as strings to keep chrono out of the wire shape.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
}

/// Persisted shape of a dependency edge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedEdge {
    pub from_id: u64,
    pub to_id: u64,
    #[serde(default)]
    pub field_mapping: FieldMapping,
}

/// Full persisted graph: topology plus every task's state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedGraph {
    pub format_version: u32,
    pub root: u64,
    pub tasks: Vec<PersistedTask>,
    pub edges: Vec<PersistedEdge>,
    pub next_id: u64,
}

impl PersistedGraph {
    pub const FORMAT_VERSION: u32 = 1;
}

fn encode_time(t: Option<DateTime<Utc>>) -> Option<String> {
    t.map(|t| t.to_rfc3339())
}

fn decode_time(s: &Option<String>, field: &str) -> Result<Option<DateTime<Utc>>, PersistenceError> {
    match s {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| PersistenceError::decode(format!("bad {field} timestamp {raw:?}: {e}"))),
    }
}

/* ---------- TaskNode <-> PersistedTask ---------- */

impl From<&TaskNode> for PersistedTask {
    fn from(task: &TaskNode) -> Self {
        let output = if task.store_output() && !task.output().is_empty() {
            Some(task.output().clone())
        } else {
            None
        };
        PersistedTask {
            id: task.id().0,
            key: task.key().to_string(),
            task_type: task.task_type().encode().to_string(),
            status: task.status().encode().to_string(),
            input: task.input().clone(),
            output,
            task_uid: task.task_uid().to_string(),
            retry_count: task.retry_count(),
            breakpoint: task.breakpoint(),
            active: task.active(),
            store_output: task.store_output(),
            callable: task.callable().map(str::to_string),
            procedure: task.procedure().map(str::to_string),
            requires: task.requires().to_vec(),
            started_at: encode_time(task.started_at()),
            ended_at: encode_time(task.ended_at()),
        }
    }
}

impl TryFrom<PersistedTask> for TaskNode {
    type Error = PersistenceError;

    fn try_from(p: PersistedTask) -> Result<Self, PersistenceError> {
        let task_type = TaskType::parse(&p.task_type)
            .map_err(|e| PersistenceError::decode(format!("task {}: {e}", p.id)))?;
        let status = TaskStatus::parse(&p.status)
            .ok_or_else(|| PersistenceError::decode(format!("task {}: bad status {:?}", p.id, p.status)))?;
        let task_uid = Uuid::parse_str(&p.task_uid)
            .map_err(|e| PersistenceError::decode(format!("task {}: bad task_uid: {e}", p.id)))?;
        let started_at = decode_time(&p.started_at, "started_at")?;
        let ended_at = decode_time(&p.ended_at, "ended_at")?;
        Ok(TaskNode::from_persisted(
            TaskId(p.id),
            p.key,
            task_type,
            status,
            p.input,
            p.output.unwrap_or_default(),
            task_uid,
            p.retry_count,
            p.breakpoint,
            p.active,
            p.store_output,
            p.callable,
            p.procedure,
            p.requires,
            started_at,
            ended_at,
        ))
    }
}

/* ---------- WorkflowGraph <-> PersistedGraph ---------- */

impl From<&WorkflowGraph> for PersistedGraph {
    fn from(graph: &WorkflowGraph) -> Self {
        PersistedGraph {
            format_version: Self::FORMAT_VERSION,
            root: graph.root().0,
            tasks: graph.tasks().map(PersistedTask::from).collect(),
            edges: graph
                .edges()
                .iter()
                .map(|e| PersistedEdge {
                    from_id: e.from_id().0,
                    to_id: e.to_id().0,
                    field_mapping: e.field_mapping().clone(),
                })
                .collect(),
            next_id: graph.next_id,
        }
    }
}

impl TryFrom<PersistedGraph> for WorkflowGraph {
    type Error = PersistenceError;

    fn try_from(p: PersistedGraph) -> Result<Self, PersistenceError> {
        if p.format_version != PersistedGraph::FORMAT_VERSION {
            return Err(PersistenceError::decode(format!(
                "unsupported format_version {}",
                p.format_version
            )));
        }
        if p.root != TaskId::ROOT.0 {
            return Err(PersistenceError::decode(format!(
                "root must be task {}, found {}",
                TaskId::ROOT,
                p.root
            )));
        }
        let mut graph = WorkflowGraph::empty();
        graph.next_id = p.next_id;
        for persisted in p.tasks {
            let node = TaskNode::try_from(persisted)?;
            if graph.tasks.contains_key(&node.id()) {
                return Err(PersistenceError::decode(format!(
                    "duplicate task id {}",
                    node.id()
                )));
            }
            graph.order.push(node.id());
            graph.tasks.insert(node.id(), node);
        }
        if !graph.tasks.contains_key(&TaskId::ROOT) {
            return Err(PersistenceError::decode("missing root task"));
        }
        for edge in p.edges {
            let from = TaskId(edge.from_id);
            let to = TaskId(edge.to_id);
            if !graph.tasks.contains_key(&from) || !graph.tasks.contains_key(&to) {
                return Err(PersistenceError::decode(format!(
                    "edge {from} -> {to} references an unknown task"
                )));
            }
            graph.insert_edge_unchecked(DependencyEdge::new(from, to, edge.field_mapping));
        }
        // Kahn covers every node exactly once iff the loaded topology is
        // still acyclic; a hand-edited file must not smuggle a cycle in.
        if graph.topological_order().len() != graph.order.len() {
            return Err(PersistenceError::decode("graph contains a cycle"));
        }
        Ok(graph)
    }
}
