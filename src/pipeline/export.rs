//! Linearize a graph into a standalone Rhai script.
//!
//! Each distinct node body is emitted once, with every function it declares
//! prefixed `def_<k>_` so helpers of different bodies cannot collide. The
//! script then calls the entry functions in execution order, collecting
//! results in a `results` map keyed by node id. Its final value is that map.

use crate::pipeline::compiler::PipelineCompiler;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::graph::Graph;
use crate::scripting::ParsedFunction;
use crate::types::Value;
use std::collections::HashMap;
use std::fmt::Write;

const LOOKUP_HELPER: &str = r#"fn lookup(results, id, socket, fallback) {
    if results.contains(id) {
        let outputs = results[id];
        if outputs.contains(socket) {
            return outputs[socket];
        }
    }
    fallback
}
"#;

/// Render `graph` as a Rhai script. Fails on cycles and unparsable code.
pub fn export_script(graph: &Graph) -> PipelineResult<String> {
    let plan = PipelineCompiler::compile(graph);
    if !plan.is_complete() {
        return Err(PipelineError::CycleDetected {
            scheduled: plan.order.len(),
            total: graph.len(),
        });
    }

    let mut functions = String::new();
    let mut calls = String::new();
    // node code -> prefixed entry function
    let mut emitted: HashMap<&str, String> = HashMap::new();

    for &idx in &plan.order {
        let node = graph.node_at(idx);
        let fn_name = match emitted.get(node.code()) {
            Some(name) => name.clone(),
            None => {
                let parsed = ParsedFunction::parse(node.code()).map_err(|source| {
                    PipelineError::InvalidCode {
                        node_id: node.id().clone(),
                        source,
                    }
                })?;
                let prefix = format!("def_{}_", emitted.len());
                let name = format!("{}{}", prefix, parsed.name);

                let _ = writeln!(functions, "// {}", parsed.name);
                functions.push_str(parsed.to_rhai_prefixed(&prefix).trim_end());
                functions.push_str("\n\n");
                emitted.insert(node.code(), name.clone());
                name
            }
        };

        let args: Vec<String> = node
            .inputs()
            .iter()
            .enumerate()
            .map(|(input_index, socket)| match plan.source_of(idx, input_index) {
                Some((source, output_index)) => {
                    let source_node = graph.node_at(source);
                    let output = source_node
                        .outputs()
                        .get(output_index)
                        .map(|s| s.name.clone())
                        .unwrap_or_default();
                    format!(
                        "lookup(results, {}, {}, {})",
                        Value::from(source_node.id().as_str()).to_rhai_literal(),
                        Value::from(output).to_rhai_literal(),
                        socket.value_type.default_value().to_rhai_literal()
                    )
                }
                None => node.unconnected_value(socket).to_rhai_literal(),
            })
            .collect();

        let output = node
            .outputs()
            .first()
            .map(|s| s.name.as_str())
            .unwrap_or(crate::scripting::OUTPUT_SOCKET);
        let _ = writeln!(calls, "// {} ({})", node.name(), node.id());
        let _ = writeln!(
            calls,
            "results[{}] = #{{ {}: {}({}) }};",
            Value::from(node.id().as_str()).to_rhai_literal(),
            output,
            fn_name,
            args.join(", ")
        );
    }

    let mut script = String::new();
    let _ = writeln!(script, "// Generated by nodeflow: {} nodes", graph.len());
    script.push('\n');
    script.push_str(LOOKUP_HELPER);
    script.push('\n');
    script.push_str(&functions);
    script.push_str("let results = #{};\n");
    script.push_str(&calls);
    script.push_str("results\n");

    tracing::debug!(nodes = graph.len(), bytes = script.len(), "Exported graph script");
    Ok(script)
}
