//! Workflow graph definition: task nodes, data-flow edges, and topology.
//!
//! The main entry point is [`WorkflowGraph`], which owns the task nodes and
//! the dependency edges between them and enforces the structural invariants
//! at build time: acyclicity, known node ids, and no duplicate edges.
//!
//! # Core Concepts
//!
//! - **Root**: a designated structural node ([`TaskId::ROOT`](crate::types::TaskId::ROOT))
//!   carrying the workflow-level input; it is born completed and never runs.
//! - **Edges**: each [`DependencyEdge`] orders two tasks and carries a
//!   [`FieldMapping`] translating upstream output keys into downstream
//!   input keys.
//! - **Topology queries**: parents/children, descendant sets, and a
//!   deterministic topological ordering.
//!
//! # Quick Start
//!
//! ```rust
//! use taskloom::graphs::{FieldMapping, WorkflowGraph};
//! use taskloom::task::TaskSpec;
//!
//! let mut graph = WorkflowGraph::new();
//! let build = graph
//!     .add_task("build_topology", "local_blocking", TaskSpec::callable("build_topology"))
//!     .unwrap();
//! let solvate = graph
//!     .add_task("solvate", "local_threaded", TaskSpec::callable("solvate"))
//!     .unwrap();
//! graph.connect(graph.root(), build, FieldMapping::identity()).unwrap();
//! graph.connect(build, solvate, FieldMapping::identity()).unwrap();
//!
//! assert_eq!(graph.topological_order(), vec![graph.root(), build, solvate]);
//! ```

mod edges;
mod workflow_graph;

pub use edges::{DependencyEdge, FieldMapping};
pub use workflow_graph::{GraphError, WorkflowGraph};
