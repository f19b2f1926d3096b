use crate::pipeline::graph::Connection;
use std::collections::HashMap;
use std::fmt;

/// A connection whose endpoints resolved against the current sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedEdge {
    /// Source node position in graph insertion order
    pub from: usize,
    pub output_index: usize,
    /// Target node position in graph insertion order
    pub to: usize,
    pub input_index: usize,
}

/// Why a connection was left out of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    UnknownNode,
    OutputOutOfRange,
    InputOutOfRange,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::UnknownNode => f.write_str("unknown node"),
            DropReason::OutputOutOfRange => f.write_str("output index out of range"),
            DropReason::InputOutOfRange => f.write_str("input index out of range"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedConnection {
    pub connection: Connection,
    pub reason: DropReason,
}

/// Execution plan for one run of a graph.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    /// Node positions in topological order. Shorter than the graph when it
    /// contains a cycle.
    pub order: Vec<usize>,

    /// Surviving connections
    pub edges: Vec<ResolvedEdge>,

    /// Per target node: input index -> (source node, output index)
    pub sources: Vec<HashMap<usize, (usize, usize)>>,

    /// Connections treated as absent
    pub dropped: Vec<DroppedConnection>,

    /// Compilation statistics
    pub stats: PlanStats,
}

/// Statistics about the compiled plan
#[derive(Debug, Clone, Default)]
pub struct PlanStats {
    /// Total number of nodes in the graph
    pub total_nodes: usize,

    /// Number of nodes the topological sort could place
    pub scheduled_nodes: usize,

    pub valid_connections: usize,

    pub dropped_connections: usize,

    /// Number of nodes without incoming connections
    pub source_nodes: usize,

    /// Number of nodes without outgoing connections
    pub sink_nodes: usize,

    /// Compilation time in microseconds
    pub compile_time_us: u64,
}

impl ExecutionPlan {
    /// Whether every node was scheduled, i.e. the graph has no cycle.
    pub fn is_complete(&self) -> bool {
        self.order.len() == self.stats.total_nodes
    }

    /// Source feeding input `input_index` of node `node`, if connected.
    pub fn source_of(&self, node: usize, input_index: usize) -> Option<(usize, usize)> {
        self.sources
            .get(node)
            .and_then(|inputs| inputs.get(&input_index))
            .copied()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
