//! Exported scripts evaluate to the same results as an engine run

mod common;

use common::builders::{sum_graph, GraphBuilder};
use common::{assert_number, registry};
use nodeflow_rs::pipeline::{export_script, output_value, CancelToken, Engine, NodeId, NullSink};
use nodeflow_rs::scripting::RhaiEvaluator;
use nodeflow_rs::types::Value;

fn result_of<'a>(results: &'a Value, id: &str) -> Option<&'a Value> {
    match results {
        Value::Map(nodes) => match nodes.get(id) {
            Some(Value::Map(outputs)) => outputs.get("result"),
            _ => None,
        },
        _ => None,
    }
}

#[test]
fn test_exported_sum_evaluates() {
    let registry = registry();
    let graph = sum_graph(&registry);

    let script = export_script(&graph).unwrap();
    let results = RhaiEvaluator::new().run_script(&script).unwrap();

    assert_number(result_of(&results, "sum"), 7.0);
    assert_number(result_of(&results, "three"), 3.0);
}

#[test]
fn test_export_matches_engine_run() {
    let registry = registry();
    let mut graph = GraphBuilder::new(&registry)
        .constant("x", 9.0)
        .constant("y", 3.0)
        .node("divide", "ratio")
        .node("number_to_string", "label")
        .connect("x", 0, "ratio", 0)
        .connect("y", 0, "ratio", 1)
        .connect("ratio", 0, "label", 0)
        .build();

    let script = export_script(&graph).unwrap();
    let exported = RhaiEvaluator::new().run_script(&script).unwrap();

    let report = Engine::default().run(&mut graph, &NullSink, &CancelToken::new());
    assert!(report.is_success());

    for id in ["x", "y", "ratio", "label"] {
        assert_eq!(
            result_of(&exported, id),
            output_value(&graph, &NodeId::from(id), "result"),
            "node {}",
            id
        );
    }
}

#[test]
fn test_export_writes_through_unconnected_params() {
    let registry = registry();
    let graph = GraphBuilder::new(&registry)
        .node("string_to_boolean", "flag")
        .param("flag", "text", Value::from("YES"))
        .build();

    let script = export_script(&graph).unwrap();
    let results = RhaiEvaluator::new().run_script(&script).unwrap();

    assert_eq!(result_of(&results, "flag"), Some(&Value::Boolean(true)));
}

#[test]
fn test_repeated_helper_definition_matches_engine_run() {
    let mut registry = registry();
    registry
        .register_from_code("fn twice(x: number) -> number { helper(x) }\nfn helper(x) { x * 2.0 }")
        .unwrap();
    let mut graph = GraphBuilder::new(&registry)
        .constant("seed", 1.5)
        .node("twice", "first")
        .node("twice", "second")
        .connect("seed", 0, "first", 0)
        .connect("first", 0, "second", 0)
        .build();

    let script = export_script(&graph).unwrap();
    let exported = RhaiEvaluator::new().run_script(&script).unwrap();
    assert_number(result_of(&exported, "second"), 6.0);

    let report = Engine::default().run(&mut graph, &NullSink, &CancelToken::new());
    assert!(report.is_success());
    for id in ["seed", "first", "second"] {
        assert_eq!(
            result_of(&exported, id),
            output_value(&graph, &NodeId::from(id), "result"),
            "node {}",
            id
        );
    }
}

#[test]
fn test_export_with_non_ascii_source() {
    let mut registry = registry();
    registry
        .register_from_code(
            "/* größe in Metern */\nfn label(m: number) -> string {\n    `${m} m²`\n}",
        )
        .unwrap();
    let graph = GraphBuilder::new(&registry)
        .node("label", "l")
        .param("l", "m", Value::Number(2.0))
        .build();

    let script = export_script(&graph).unwrap();
    let results = RhaiEvaluator::new().run_script(&script).unwrap();
    assert_eq!(result_of(&results, "l"), Some(&Value::from("2.0 m²")));
}
