//! Property tests for graph construction invariants.

use proptest::prelude::*;

use taskloom::graphs::{FieldMapping, GraphError, WorkflowGraph};
use taskloom::task::TaskSpec;
use taskloom::types::TaskId;

const NODES: usize = 8;

fn build_nodes(graph: &mut WorkflowGraph) -> Vec<TaskId> {
    (0..NODES)
        .map(|i| {
            graph
                .add_task(format!("t{i}"), "local_blocking", TaskSpec::callable("noop"))
                .unwrap()
        })
        .collect()
}

proptest! {
    /// No sequence of connect attempts can smuggle a cycle in: Kahn's
    /// ordering covers every node exactly once afterwards.
    #[test]
    fn arbitrary_connects_keep_the_graph_acyclic(
        edges in proptest::collection::vec((0usize..NODES, 0usize..NODES), 0..48)
    ) {
        let mut graph = WorkflowGraph::new();
        let ids = build_nodes(&mut graph);
        for (a, b) in edges {
            let _ = graph.connect(ids[a], ids[b], FieldMapping::identity());
        }
        let order = graph.topological_order();
        prop_assert_eq!(order.len(), graph.tasks().count());
        // Every accepted edge is respected by the ordering.
        for edge in graph.edges() {
            let from = order.iter().position(|id| *id == edge.from_id()).unwrap();
            let to = order.iter().position(|id| *id == edge.to_id()).unwrap();
            prop_assert!(from < to);
        }
    }

    /// A successfully added edge can never be added again.
    #[test]
    fn accepted_edges_are_unique(
        edges in proptest::collection::vec((0usize..NODES, 0usize..NODES), 0..32)
    ) {
        let mut graph = WorkflowGraph::new();
        let ids = build_nodes(&mut graph);
        for (a, b) in edges {
            if graph.connect(ids[a], ids[b], FieldMapping::identity()).is_ok() {
                prop_assert!(
                    matches!(
                        graph.connect(ids[a], ids[b], FieldMapping::identity()),
                        Err(GraphError::DuplicateEdge { .. })
                    ),
                    "re-adding an accepted edge must be rejected as a duplicate"
                );
            }
        }
    }
}
