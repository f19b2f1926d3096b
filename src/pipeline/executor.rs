//! Graph executor: one pass over the graph in dependency order.
//!
//! Each run:
//! 1. Compile the graph into a plan (broken wiring dropped, Kahn order).
//! 2. Refuse to run when the order does not cover every node (cycle).
//! 3. For each node: check cancellation, resolve inputs, compare the
//!    content hash with the stored one and either reuse or execute.
//! 4. Stop at the first failing node.

use crate::pipeline::bridge::{CancelToken, EventSink, RunEvent, RunHandle};
use crate::pipeline::compiled_plan::{DroppedConnection, ExecutionPlan};
use crate::pipeline::compiler::PipelineCompiler;
use crate::pipeline::error::{PipelineError, RunError};
use crate::pipeline::graph::Graph;
use crate::pipeline::id::NodeId;
use crate::scripting::{RhaiEvaluator, ScriptEvaluator};
use crate::types::{Outputs, Value, ValueMap};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    Finished,
    Failed(RunError),
}

/// Summary of one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    /// Planned execution order
    pub order: Vec<NodeId>,
    /// Nodes whose code actually ran
    pub executed: Vec<NodeId>,
    /// Nodes whose previous outputs were reused
    pub cache_hits: Vec<NodeId>,
    pub dropped_connections: Vec<DroppedConnection>,
    pub elapsed: Duration,
}

impl RunReport {
    pub(crate) fn new() -> Self {
        Self {
            status: RunStatus::Finished,
            order: Vec::new(),
            executed: Vec::new(),
            cache_hits: Vec::new(),
            dropped_connections: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Finished
    }

    pub fn error(&self) -> Option<&RunError> {
        match &self.status {
            RunStatus::Finished => None,
            RunStatus::Failed(e) => Some(e),
        }
    }
}

/// Runs graphs against a script evaluator.
#[derive(Clone)]
pub struct Engine {
    evaluator: Arc<dyn ScriptEvaluator>,
}

impl Engine {
    pub fn new(evaluator: Arc<dyn ScriptEvaluator>) -> Self {
        Self { evaluator }
    }

    pub fn evaluator(&self) -> &dyn ScriptEvaluator {
        self.evaluator.as_ref()
    }

    /// Execute every node of `graph` at most once, updating node state in
    /// place and reporting progress to `sink`.
    pub fn run(&self, graph: &mut Graph, sink: &dyn EventSink, cancel: &CancelToken) -> RunReport {
        let start = Instant::now();
        let mut report = RunReport::new();

        sink.emit(RunEvent::RunStarted);
        tracing::info!(
            nodes = graph.len(),
            connections = graph.connections().len(),
            "Run started"
        );

        let plan = PipelineCompiler::compile(graph);
        for dropped in &plan.dropped {
            tracing::warn!(
                from = %dropped.connection.start_node,
                to = %dropped.connection.end_node,
                reason = %dropped.reason,
                "Ignoring broken connection"
            );
        }
        report.dropped_connections = plan.dropped.clone();
        report.order = plan
            .order
            .iter()
            .map(|&i| graph.node_at(i).id().clone())
            .collect();

        let outcome = if plan.is_complete() {
            self.execute_plan(graph, &plan, sink, cancel, &mut report)
        } else {
            Err(RunError::Cycle {
                scheduled: plan.order.len(),
                total: graph.len(),
            })
        };

        report.elapsed = start.elapsed();
        match outcome {
            Ok(()) => {
                tracing::info!(
                    executed = report.executed.len(),
                    cached = report.cache_hits.len(),
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Run finished"
                );
                sink.emit(RunEvent::RunFinished);
            }
            Err(err) => {
                tracing::error!(error = %err, "Run failed");
                sink.emit(RunEvent::RunFailed {
                    message: err.to_string(),
                });
                report.status = RunStatus::Failed(err);
            }
        }
        report
    }

    fn execute_plan(
        &self,
        graph: &mut Graph,
        plan: &ExecutionPlan,
        sink: &dyn EventSink,
        cancel: &CancelToken,
        report: &mut RunReport,
    ) -> Result<(), RunError> {
        // Outputs produced so far in this run, by node position
        let mut produced: HashMap<usize, Outputs> = HashMap::with_capacity(plan.order.len());

        for &idx in &plan.order {
            if cancel.is_cancelled() {
                tracing::info!("Run cancelled");
                return Err(RunError::Cancelled);
            }

            let node = graph.node_at(idx);
            let id = node.id().clone();
            sink.emit(RunEvent::NodeStarted { id: id.clone() });

            let inputs = resolve_inputs(graph, plan, &produced, idx);
            let hash = node.compute_content_hash(&inputs);

            if node.is_cache_valid(&hash) {
                let outputs = node.last_output().cloned().unwrap_or_default();
                tracing::debug!(node = %id, name = node.name(), "Cache hit");
                sink.emit(RunEvent::NodeCompleted {
                    id: id.clone(),
                    outputs: outputs.clone(),
                    cached: true,
                });
                report.cache_hits.push(id);
                produced.insert(idx, outputs);
                continue;
            }

            tracing::debug!(node = %id, name = node.name(), "Executing node");
            let result = node.execute(self.evaluator.as_ref(), &inputs);

            match result {
                Ok(outputs) => {
                    graph
                        .node_at_mut(idx)
                        .record_success(outputs.clone(), hash);
                    sink.emit(RunEvent::NodeCompleted {
                        id: id.clone(),
                        outputs: outputs.clone(),
                        cached: false,
                    });
                    report.executed.push(id);
                    produced.insert(idx, outputs);
                }
                Err(err) => {
                    let message = err.to_string();
                    tracing::warn!(node = %id, error = %message, "Node failed");
                    graph.node_at_mut(idx).record_failure(message.clone());
                    sink.emit(RunEvent::NodeFailed {
                        id: id.clone(),
                        message: message.clone(),
                    });
                    return Err(RunError::NodeFailed {
                        node_id: id,
                        message,
                    });
                }
            }
        }
        Ok(())
    }

    /// Move `graph` onto a worker thread and run it there.
    pub fn spawn(&self, graph: Graph) -> Result<RunHandle, PipelineError> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let cancel = CancelToken::new();
        let engine = self.clone();
        let token = cancel.clone();

        let worker = std::thread::Builder::new()
            .name("nodeflow-run".to_string())
            .spawn(move || {
                let mut graph = graph;
                let report = engine.run(&mut graph, &tx, &token);
                (graph, report)
            })?;

        Ok(RunHandle::new(rx, cancel, worker))
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Arc::new(RhaiEvaluator::new()))
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

/// Input values for the node at `idx`.
///
/// A connected input takes the value its source produced this run, or the
/// type default if the source produced nothing under that name. An
/// unconnected input takes the node's param, else the socket default.
fn resolve_inputs(
    graph: &Graph,
    plan: &ExecutionPlan,
    produced: &HashMap<usize, Outputs>,
    idx: usize,
) -> ValueMap {
    let node = graph.node_at(idx);
    node.inputs()
        .iter()
        .enumerate()
        .map(|(input_index, socket)| {
            let value = match plan.source_of(idx, input_index) {
                Some((source, output_index)) => {
                    let output_name = graph
                        .node_at(source)
                        .outputs()
                        .get(output_index)
                        .map(|s| s.name.as_str());
                    output_name
                        .and_then(|name| produced.get(&source).and_then(|o| o.get(name)))
                        .cloned()
                        .unwrap_or_else(|| socket.value_type.default_value())
                }
                None => node.unconnected_value(socket),
            };
            (socket.name.clone(), value)
        })
        .collect::<ValueMap>()
}

/// Value a run produced for output `socket` of `node`, if any.
pub fn output_value<'a>(graph: &'a Graph, node: &NodeId, socket: &str) -> Option<&'a Value> {
    graph
        .node(node)
        .and_then(|n| n.last_output())
        .and_then(|o| o.get(socket))
}
