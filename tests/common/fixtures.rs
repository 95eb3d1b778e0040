//! Shared graph fixtures for integration tests.

use serde_json::json;

use taskloom::executors::CallableRegistry;
use taskloom::graphs::{FieldMapping, WorkflowGraph};
use taskloom::task::TaskSpec;
use taskloom::types::{IoMap, TaskId};

use super::callables::adder;

/// Linear chain `root -> add_0 -> add_1 -> ...` where `add_i` computes
/// `value -> value + additions[i]`. Identity mappings throughout, so the
/// running total flows down the chain under the key `"value"`.
pub fn adder_chain(
    additions: &[i64],
    task_type_tag: &str,
) -> (WorkflowGraph, CallableRegistry, Vec<TaskId>) {
    let mut registry = CallableRegistry::default();
    let mut graph = WorkflowGraph::new();
    let mut ids = Vec::new();
    let mut upstream = graph.root();
    for (i, &k) in additions.iter().enumerate() {
        let name = format!("add_{i}");
        registry.register(&name, adder(k));
        let id = graph
            .add_task(&name, task_type_tag, TaskSpec::callable(&name).require("value"))
            .unwrap();
        graph
            .connect(upstream, id, FieldMapping::identity())
            .unwrap();
        ids.push(id);
        upstream = id;
    }
    (graph, registry, ids)
}

/// The workflow-level seed `{"value": seed}` for adder chains.
pub fn seed_value(seed: i64) -> IoMap {
    let mut map = IoMap::default();
    map.insert("value".into(), json!(seed));
    map
}

/// Collect the `"value"` output of each task, in the given order.
pub fn chain_outputs(graph: &WorkflowGraph, ids: &[TaskId]) -> Vec<i64> {
    ids.iter()
        .map(|&id| {
            graph
                .task(id)
                .and_then(|t| t.output().get("value"))
                .and_then(|v| v.as_i64())
                .unwrap_or_else(|| panic!("task {id} has no value output"))
        })
        .collect()
}
