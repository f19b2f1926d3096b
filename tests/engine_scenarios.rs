//! End-to-end runs over graphs built from the built-in node library

mod common;

use common::builders::{sum_graph, GraphBuilder};
use common::{assert_number, registry, test_timeout};
use crossbeam_channel::{unbounded, Receiver};
use nodeflow_rs::pipeline::{
    output_value, CancelToken, Engine, EventLog, NodeId, NullSink, RunError, RunEvent,
};
use nodeflow_rs::scripting::{ExecutionError, RhaiEvaluator, ScriptEvaluator};
use nodeflow_rs::types::{Value, ValueMap};
use std::sync::Arc;

fn id(s: &str) -> NodeId {
    NodeId::from(s)
}

fn started(events: &[RunEvent]) -> Vec<NodeId> {
    events
        .iter()
        .filter_map(|e| match e {
            RunEvent::NodeStarted { id } => Some(id.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_constants_into_add() {
    let registry = registry();
    let mut graph = sum_graph(&registry);

    let log = EventLog::new();
    let report = Engine::default().run(&mut graph, &log, &CancelToken::new());

    assert!(report.is_success());
    assert_eq!(report.order, vec![id("three"), id("four"), id("sum")]);
    assert_number(output_value(&graph, &id("sum"), "result"), 7.0);

    let events = log.events();
    assert_eq!(events.first(), Some(&RunEvent::RunStarted));
    assert_eq!(events.last(), Some(&RunEvent::RunFinished));
    assert_eq!(started(&events), report.order);
}

#[test]
fn test_division_by_zero_fails_run() {
    let registry = registry();
    let mut graph = GraphBuilder::new(&registry)
        .constant("five", 5.0)
        .constant("zero", 0.0)
        .node("divide", "div")
        .node("output", "out")
        .connect("five", 0, "div", 0)
        .connect("zero", 0, "div", 1)
        .connect("div", 0, "out", 0)
        .build();

    let log = EventLog::new();
    let report = Engine::default().run(&mut graph, &log, &CancelToken::new());

    assert_eq!(
        report.error(),
        Some(&RunError::NodeFailed {
            node_id: id("div"),
            message: "division by zero".to_string(),
        })
    );

    let events = log.events();
    let failed = RunEvent::NodeFailed {
        id: id("div"),
        message: "division by zero".to_string(),
    };
    assert_eq!(events[events.len() - 2], failed);
    assert!(matches!(events.last(), Some(RunEvent::RunFailed { .. })));
    assert!(!started(&events).contains(&id("out")));
    assert_eq!(graph.node(&id("div")).unwrap().last_error(), Some("division by zero"));
}

#[test]
fn test_cycle_runs_nothing() {
    let registry = registry();
    let mut graph = GraphBuilder::new(&registry)
        .node("output", "a")
        .node("output", "b")
        .node("output", "c")
        .connect("a", 0, "b", 0)
        .connect("b", 0, "c", 0)
        .connect("c", 0, "a", 0)
        .build();

    let log = EventLog::new();
    let report = Engine::default().run(&mut graph, &log, &CancelToken::new());

    assert_eq!(
        report.error(),
        Some(&RunError::Cycle {
            scheduled: 0,
            total: 3
        })
    );
    assert!(started(&log.events()).is_empty());
    assert!(graph.nodes().iter().all(|n| n.last_output().is_none()));
}

#[test]
fn test_unchanged_graph_is_fully_cached() {
    let registry = registry();
    let mut graph = sum_graph(&registry);
    let engine = Engine::default();

    let first = engine.run(&mut graph, &NullSink, &CancelToken::new());
    assert_eq!(first.executed.len(), 3);

    let log = EventLog::new();
    let second = engine.run(&mut graph, &log, &CancelToken::new());
    assert!(second.executed.is_empty());
    assert_eq!(second.cache_hits, first.order);
    assert!(log
        .events()
        .iter()
        .filter(|e| matches!(e, RunEvent::NodeCompleted { .. }))
        .all(|e| matches!(e, RunEvent::NodeCompleted { cached: true, .. })));
    assert_number(output_value(&graph, &id("sum"), "result"), 7.0);
}

#[test]
fn test_param_change_invalidates_downstream_only() {
    let registry = registry();
    let mut graph = GraphBuilder::new(&registry)
        .constant("three", 3.0)
        .constant("four", 4.0)
        .node("add", "sum")
        .constant("other", 1.0)
        .node("number_to_string", "label")
        .connect("three", 0, "sum", 0)
        .connect("four", 0, "sum", 1)
        .connect("other", 0, "label", 0)
        .build();
    let engine = Engine::default();
    engine.run(&mut graph, &NullSink, &CancelToken::new());

    graph
        .node_mut(&id("three"))
        .unwrap()
        .set_param("value", Value::Number(10.0))
        .unwrap();
    let report = engine.run(&mut graph, &NullSink, &CancelToken::new());

    assert!(report.is_success());
    assert_eq!(report.executed, vec![id("three"), id("sum")]);
    assert_eq!(report.cache_hits, vec![id("four"), id("other"), id("label")]);
    assert_number(output_value(&graph, &id("sum"), "result"), 14.0);
}

#[test]
fn test_same_value_upstream_keeps_downstream_cached() {
    let registry = registry();
    let mut graph = GraphBuilder::new(&registry)
        .constant("x", 2.0)
        .node("multiply", "double")
        .param("double", "b", Value::Number(0.0))
        .node("output", "out")
        .connect("x", 0, "double", 0)
        .connect("double", 0, "out", 0)
        .build();
    let engine = Engine::default();
    engine.run(&mut graph, &NullSink, &CancelToken::new());

    // x changes but double still yields 0
    graph
        .node_mut(&id("x"))
        .unwrap()
        .set_param("value", Value::Number(5.0))
        .unwrap();
    let report = engine.run(&mut graph, &NullSink, &CancelToken::new());

    assert_eq!(report.executed, vec![id("x"), id("double")]);
    assert_eq!(report.cache_hits, vec![id("out")]);
}

#[test]
fn test_added_parameter_keeps_existing_params() {
    let registry = registry();
    let mut graph = GraphBuilder::new(&registry)
        .constant("seed", 5.0)
        .build();

    let node = graph.node_mut(&id("seed")).unwrap();
    node.set_code(
        "fn constant(value: number = 0.0, offset: number = 0.5) -> number { value + offset }",
    )
    .unwrap();
    assert_eq!(node.param("value"), Some(&Value::Number(5.0)));
    assert_eq!(node.param("offset"), Some(&Value::Number(0.5)));
    assert_eq!(node.inputs().len(), 2);

    let report = Engine::default().run(&mut graph, &NullSink, &CancelToken::new());
    assert!(report.is_success());
    assert_number(output_value(&graph, &id("seed"), "result"), 5.5);
}

#[test]
fn test_removed_input_drops_its_connection() {
    let registry = registry();
    let mut graph = sum_graph(&registry);
    graph
        .node_mut(&id("sum"))
        .unwrap()
        .set_code("fn add(a: number) -> number { a + 100.0 }")
        .unwrap();

    let report = Engine::default().run(&mut graph, &NullSink, &CancelToken::new());

    assert!(report.is_success());
    assert_eq!(report.dropped_connections.len(), 1);
    assert_eq!(report.dropped_connections[0].connection.start_node, id("four"));
    assert_number(output_value(&graph, &id("sum"), "result"), 103.0);
}

#[test]
fn test_events_over_channel() {
    let registry = registry();
    let mut graph = sum_graph(&registry);
    let (tx, rx) = unbounded();

    let report = Engine::default().run(&mut graph, &tx, &CancelToken::new());
    drop(tx);

    let events: Vec<RunEvent> = rx.iter().collect();
    assert!(report.is_success());
    assert_eq!(events.len(), 2 + 2 * graph.len());
    assert!(events.last().unwrap().is_terminal());
}

#[test]
fn test_background_run_returns_graph() {
    let registry = registry();
    let graph = sum_graph(&registry);

    let handle = Engine::default().spawn(graph).unwrap();
    let mut events = Vec::new();
    while let Ok(event) = handle.events().recv_timeout(test_timeout()) {
        let last = event.is_terminal();
        events.push(event);
        if last {
            break;
        }
    }
    let (graph, report) = handle.join().unwrap();

    assert!(report.is_success());
    assert_eq!(events.last(), Some(&RunEvent::RunFinished));
    assert_number(output_value(&graph, &id("sum"), "result"), 7.0);
}

/// Evaluator that holds every call until the test releases it
struct GatedEvaluator {
    gate: Receiver<()>,
    inner: RhaiEvaluator,
}

impl ScriptEvaluator for GatedEvaluator {
    fn evaluate(&self, source: &str, entry: &str, args: &ValueMap) -> Result<Value, ExecutionError> {
        let _ = self.gate.recv_timeout(test_timeout());
        self.inner.evaluate(source, entry, args)
    }
}

#[test]
fn test_cancel_stops_before_next_node() {
    let registry = registry();
    let graph = sum_graph(&registry);
    let (release, gate) = unbounded();
    let engine = Engine::new(Arc::new(GatedEvaluator {
        gate,
        inner: RhaiEvaluator::new(),
    }));

    let handle = engine.spawn(graph).unwrap();
    loop {
        match handle.events().recv_timeout(test_timeout()) {
            Ok(RunEvent::NodeStarted { id: started }) => {
                assert_eq!(started, id("three"));
                break;
            }
            Ok(_) => continue,
            Err(e) => panic!("run did not start: {}", e),
        }
    }
    handle.cancel();
    release.send(()).unwrap();

    let rest = {
        let mut rest = Vec::new();
        while let Ok(event) = handle.events().recv_timeout(test_timeout()) {
            let last = event.is_terminal();
            rest.push(event);
            if last {
                break;
            }
        }
        rest
    };
    let (graph, report) = handle.join().unwrap();

    assert_eq!(report.error(), Some(&RunError::Cancelled));
    assert_eq!(report.executed, vec![id("three")]);
    assert!(started(&rest).is_empty());
    assert!(graph.node(&id("sum")).unwrap().last_output().is_none());
}
