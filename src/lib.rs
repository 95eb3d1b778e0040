//! # taskloom: DAG-driven task orchestration
//!
//! taskloom turns a statically built task dependency graph into a running,
//! fault-tolerant execution: a single-writer scheduler dispatches ready
//! tasks through pluggable executors, folds their results back into the
//! graph, and applies retry, breakpoint, and cancellation policy along the
//! way.
//!
//! ## Core Concepts
//!
//! - **Task nodes**: Units of work with a typed state machine
//!   (`Ready -> Submitted -> Running -> Completed/Failed/Aborted`)
//! - **Workflow graph**: An acyclic dependency graph whose edges also carry
//!   output-to-input field mappings
//! - **Executors**: Three execution strategies — blocking in-process,
//!   worker-thread, and remote RPC — behind one completion-channel contract
//! - **Runner**: The scheduler; the only writer of the graph
//!
//! ## Quick Start
//!
//! ```rust
//! use taskloom::executors::{CallableRegistry, Executors};
//! use taskloom::graphs::{FieldMapping, WorkflowGraph};
//! use taskloom::runner::{RunOutcome, WorkflowRunner};
//! use taskloom::task::TaskSpec;
//! use taskloom::types::IoMap;
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Register the work itself: named callables over input/output maps.
//! let mut registry = CallableRegistry::default();
//! registry.register("protonate", |input: IoMap| {
//!     let mut out = input;
//!     out.insert("protonated".into(), json!(true));
//!     Ok(out)
//! });
//!
//! // Build the dependency graph.
//! let mut graph = WorkflowGraph::new();
//! let protonate = graph.add_task(
//!     "protonate",
//!     "local_blocking",
//!     TaskSpec::callable("protonate").require("structure"),
//! )?;
//! graph.connect(graph.root(), protonate, FieldMapping::identity())?;
//!
//! // Attach a runner, seed the workflow input, run to quiescence.
//! let mut runner = WorkflowRunner::new(graph, Executors::new(registry, None));
//! let mut seed = IoMap::default();
//! seed.insert("structure".into(), json!("ligand.pdb"));
//! runner.input(runner.workflow().graph().root(), seed)?;
//!
//! let report = runner.run().await?;
//! assert_eq!(report.outcome, RunOutcome::Completed);
//! assert!(runner.workflow().is_completed());
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure Model
//!
//! Task-level errors never surface as `Err` from [`runner::WorkflowRunner::run`]:
//! an attempt failure consumes a retry if any remain, otherwise the task
//! ends `Failed` and its not-yet-submitted descendants are parked in
//! `Disabled`. Unrelated branches of the DAG keep running. Callers observe
//! failure through [`runner::Workflow::has_failed`] and
//! [`runner::Workflow::failed_tasks`]; build-time mistakes (unknown task
//! type, cycles, unresolved ids) fail synchronously at graph construction.
//!
//! ## Module Guide
//!
//! - [`types`] - Identifiers, status vocabulary, and the I/O map shape
//! - [`task`] - Task nodes and their state machine
//! - [`graphs`] - Graph construction, topology queries, save/load
//! - [`executors`] - Execution strategies and collaborator traits
//! - [`runner`] - The scheduler and the workflow wrapper
//! - [`events`] - Observable run event stream
//! - [`persistence`] - Serde models for the persisted graph format
//! - [`telemetry`] - Tracing setup helpers

pub mod events;
pub mod executors;
pub mod graphs;
pub mod persistence;
pub mod runner;
pub mod task;
pub mod telemetry;
pub mod types;
