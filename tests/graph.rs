//! Graph construction: build-time validation and topology queries.

use taskloom::graphs::{FieldMapping, GraphError, WorkflowGraph};
use taskloom::task::TaskSpec;
use taskloom::types::TaskStatus;

fn spec(name: &str) -> TaskSpec {
    TaskSpec::callable(name)
}

#[test]
fn unknown_task_type_tag_is_a_build_error() {
    let mut graph = WorkflowGraph::new();
    let err = graph
        .add_task("bad", "kubernetes_pod", spec("x"))
        .unwrap_err();
    assert!(matches!(err, GraphError::UnknownTaskType(_)));
}

#[test]
fn connect_rejects_unknown_endpoints() {
    let mut graph = WorkflowGraph::new();
    let a = graph.add_task("a", "local_blocking", spec("a")).unwrap();
    let ghost = taskloom::types::TaskId(42);
    assert!(matches!(
        graph.connect(a, ghost, FieldMapping::identity()),
        Err(GraphError::UnknownNode { .. })
    ));
    assert!(matches!(
        graph.connect(ghost, a, FieldMapping::identity()),
        Err(GraphError::UnknownNode { .. })
    ));
}

#[test]
fn connect_rejects_duplicates_cycles_and_edges_into_root() {
    let mut graph = WorkflowGraph::new();
    let a = graph.add_task("a", "local_blocking", spec("a")).unwrap();
    let b = graph.add_task("b", "local_blocking", spec("b")).unwrap();
    let c = graph.add_task("c", "local_blocking", spec("c")).unwrap();
    graph.connect(graph.root(), a, FieldMapping::identity()).unwrap();
    graph.connect(a, b, FieldMapping::identity()).unwrap();
    graph.connect(b, c, FieldMapping::identity()).unwrap();

    assert!(matches!(
        graph.connect(a, b, FieldMapping::identity()),
        Err(GraphError::DuplicateEdge { .. })
    ));
    assert!(matches!(
        graph.connect(c, a, FieldMapping::identity()),
        Err(GraphError::Cycle { .. })
    ));
    assert!(matches!(
        graph.connect(a, a, FieldMapping::identity()),
        Err(GraphError::Cycle { .. })
    ));
    assert!(matches!(
        graph.connect(c, graph.root(), FieldMapping::identity()),
        Err(GraphError::EdgeIntoRoot { .. })
    ));
}

#[test]
fn tasks_start_ready_with_defaults() {
    let mut graph = WorkflowGraph::new();
    let a = graph.add_task("a", "local_blocking", spec("a")).unwrap();
    let task = graph.task(a).unwrap();
    assert_eq!(task.status(), TaskStatus::Ready);
    assert_eq!(task.retry_count(), 0);
    assert!(!task.breakpoint());
    assert!(!task.active());
    assert!(task.output().is_empty());
}

#[test]
fn topological_order_respects_dependencies() {
    let mut graph = WorkflowGraph::new();
    let a = graph.add_task("a", "local_blocking", spec("a")).unwrap();
    let b = graph.add_task("b", "local_blocking", spec("b")).unwrap();
    let c = graph.add_task("c", "local_blocking", spec("c")).unwrap();
    let d = graph.add_task("d", "local_blocking", spec("d")).unwrap();
    graph.connect(graph.root(), a, FieldMapping::identity()).unwrap();
    graph.connect(graph.root(), b, FieldMapping::identity()).unwrap();
    graph.connect(a, c, FieldMapping::identity()).unwrap();
    graph.connect(b, c, FieldMapping::identity()).unwrap();
    graph.connect(c, d, FieldMapping::identity()).unwrap();

    let order = graph.topological_order();
    let pos = |id| order.iter().position(|x| *x == id).unwrap();
    assert_eq!(order[0], graph.root());
    assert!(pos(a) < pos(c));
    assert!(pos(b) < pos(c));
    assert!(pos(c) < pos(d));
    assert_eq!(order.len(), 5);
}

#[test]
fn descendants_and_lookup_by_key() {
    let mut graph = WorkflowGraph::new();
    let a = graph.add_task("prepare", "local_blocking", spec("a")).unwrap();
    let b = graph.add_task("simulate", "local_blocking", spec("b")).unwrap();
    let c = graph.add_task("analyze", "local_blocking", spec("c")).unwrap();
    graph.connect(graph.root(), a, FieldMapping::identity()).unwrap();
    graph.connect(a, b, FieldMapping::identity()).unwrap();
    graph.connect(b, c, FieldMapping::identity()).unwrap();

    let downstream = graph.descendants(a);
    assert!(downstream.contains(&b) && downstream.contains(&c));
    assert!(!downstream.contains(&a));

    assert_eq!(graph.task_by_key("simulate").unwrap().id(), b);
    assert!(graph.task_by_key("missing").is_none());

    assert_eq!(graph.parents(c), vec![b]);
    assert_eq!(graph.children(a), vec![b]);
}

#[test]
fn validate_flags_unreachable_tasks() {
    let mut graph = WorkflowGraph::new();
    let a = graph.add_task("a", "local_blocking", spec("a")).unwrap();
    graph.connect(graph.root(), a, FieldMapping::identity()).unwrap();
    let _orphan = graph.add_task("orphan", "local_blocking", spec("o")).unwrap();

    assert!(matches!(
        graph.validate(),
        Err(GraphError::Unreachable { .. })
    ));
}

#[test]
fn validate_flags_missing_execution_targets() {
    let mut graph = WorkflowGraph::new();
    let a = graph
        .add_task("no_callable", "local_threaded", TaskSpec::default())
        .unwrap();
    graph.connect(graph.root(), a, FieldMapping::identity()).unwrap();
    assert!(matches!(
        graph.validate(),
        Err(GraphError::MissingCallable { .. })
    ));

    let mut graph = WorkflowGraph::new();
    let r = graph
        .add_task("no_procedure", "remote_call", TaskSpec::default())
        .unwrap();
    graph.connect(graph.root(), r, FieldMapping::identity()).unwrap();
    assert!(matches!(
        graph.validate(),
        Err(GraphError::MissingProcedure { .. })
    ));
}
