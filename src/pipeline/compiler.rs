use super::compiled_plan::{DropReason, DroppedConnection, ExecutionPlan, PlanStats, ResolvedEdge};
use super::graph::Graph;
use std::collections::{HashMap, VecDeque};

/// Compiles a graph into an execution plan
pub struct PipelineCompiler;

impl PipelineCompiler {
    /// Compile a graph into an execution plan.
    ///
    /// Connections are resolved by index against the current sockets;
    /// unresolvable ones are dropped and recorded. The survivors are sorted
    /// with Kahn's algorithm, seeding the queue in graph insertion order.
    pub fn compile(graph: &Graph) -> ExecutionPlan {
        let start_time = std::time::Instant::now();

        let n = graph.len();
        let (edges, dropped) = Self::resolve_edges(graph);

        let mut sources = vec![HashMap::new(); n];
        for edge in &edges {
            sources[edge.to].insert(edge.input_index, (edge.from, edge.output_index));
        }

        let (adj, in_degree) = Self::build_adjacency(n, &edges);
        let order = Self::topological_sort(&adj, in_degree.clone());

        let stats = PlanStats {
            total_nodes: n,
            scheduled_nodes: order.len(),
            valid_connections: edges.len(),
            dropped_connections: dropped.len(),
            source_nodes: in_degree.iter().filter(|&&d| d == 0).count(),
            sink_nodes: adj.iter().filter(|out| out.is_empty()).count(),
            compile_time_us: start_time.elapsed().as_micros() as u64,
        };

        ExecutionPlan {
            order,
            edges,
            sources,
            dropped,
            stats,
        }
    }

    /// Resolve connections to node positions and socket indices
    fn resolve_edges(graph: &Graph) -> (Vec<ResolvedEdge>, Vec<DroppedConnection>) {
        let mut edges = Vec::new();
        let mut dropped = Vec::new();

        for connection in graph.connections() {
            let (from, to) = match (
                graph.position(&connection.start_node),
                graph.position(&connection.end_node),
            ) {
                (Some(from), Some(to)) => (from, to),
                _ => {
                    dropped.push(DroppedConnection {
                        connection: connection.clone(),
                        reason: DropReason::UnknownNode,
                    });
                    continue;
                }
            };

            let reason = if connection.start_socket_index >= graph.node_at(from).outputs().len() {
                Some(DropReason::OutputOutOfRange)
            } else if connection.end_socket_index >= graph.node_at(to).inputs().len() {
                Some(DropReason::InputOutOfRange)
            } else {
                None
            };

            match reason {
                Some(reason) => dropped.push(DroppedConnection {
                    connection: connection.clone(),
                    reason,
                }),
                None => edges.push(ResolvedEdge {
                    from,
                    output_index: connection.start_socket_index,
                    to,
                    input_index: connection.end_socket_index,
                }),
            }
        }

        (edges, dropped)
    }

    /// Build forward adjacency lists and in-degrees
    fn build_adjacency(n: usize, edges: &[ResolvedEdge]) -> (Vec<Vec<usize>>, Vec<usize>) {
        let mut adj = vec![Vec::new(); n];
        let mut in_degree = vec![0; n];

        for edge in edges {
            adj[edge.from].push(edge.to);
            in_degree[edge.to] += 1;
        }

        (adj, in_degree)
    }

    /// Kahn's algorithm with a FIFO ready queue
    fn topological_sort(adj: &[Vec<usize>], mut in_degree: Vec<usize>) -> Vec<usize> {
        let mut queue: VecDeque<usize> = (0..adj.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut result = Vec::with_capacity(adj.len());

        while let Some(node) = queue.pop_front() {
            result.push(node);

            for &neighbor in &adj[node] {
                in_degree[neighbor] -= 1;
                if in_degree[neighbor] == 0 {
                    queue.push_back(neighbor);
                }
            }
        }

        result
    }
}
