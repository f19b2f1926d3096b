//! Test data builders for creating graphs

use nodeflow_rs::pipeline::{Connection, Graph, NodeId};
use nodeflow_rs::registry::NodeRegistry;
use nodeflow_rs::types::Value;

/// Builder for graphs made of registry definitions with readable ids
pub struct GraphBuilder<'a> {
    registry: &'a NodeRegistry,
    graph: Graph,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(registry: &'a NodeRegistry) -> Self {
        Self {
            registry,
            graph: Graph::new(),
        }
    }

    /// Add an instance of `definition` with id `id`
    pub fn node(mut self, definition: &str, id: &str) -> Self {
        let x = self.graph.len() as f64 * 120.0;
        let node = self
            .registry
            .instantiate_with_id(definition, x, 0.0, NodeId::from(id))
            .expect("definition is registered");
        self.graph.add_node(node).expect("unique node id");
        self
    }

    /// Add a `constant` node emitting `value`
    pub fn constant(self, id: &str, value: f64) -> Self {
        self.node("constant", id).param(id, "value", Value::Number(value))
    }

    pub fn param(mut self, id: &str, name: &str, value: Value) -> Self {
        self.graph
            .node_mut(&NodeId::from(id))
            .expect("node exists")
            .set_param(name, value)
            .expect("parameter exists");
        self
    }

    pub fn connect(mut self, from: &str, output: usize, to: &str, input: usize) -> Self {
        self.graph
            .connect(Connection::new(from, output, to, input))
            .expect("valid connection");
        self
    }

    pub fn build(self) -> Graph {
        self.graph
    }
}

/// `constant(3)` and `constant(4)` feeding `add`
pub fn sum_graph(registry: &NodeRegistry) -> Graph {
    GraphBuilder::new(registry)
        .constant("three", 3.0)
        .constant("four", 4.0)
        .node("add", "sum")
        .connect("three", 0, "sum", 0)
        .connect("four", 0, "sum", 1)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_builder() {
        let registry = crate::common::registry();
        let graph = sum_graph(&registry);

        assert_eq!(graph.len(), 3);
        assert_eq!(graph.connections().len(), 2);
        assert_eq!(
            graph.node(&NodeId::from("three")).unwrap().param("value"),
            Some(&Value::Number(3.0))
        );
    }
}
