//! The editable node graph and its serialized document form.
//!
//! Nodes keep their insertion order, which is also the tie-break order for
//! scheduling. Connections refer to sockets by index; indices are checked
//! when a connection is made, but a later code edit may invalidate them.
//! The engine treats such stale connections as absent.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::NodeId;
use crate::pipeline::node::NodeInstance;
use crate::pipeline::port::PortDirection;
use crate::registry::NodeRegistry;
use crate::scripting::parse_function;
use crate::types::ValueMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A directed edge from an output socket to an input socket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub start_node: NodeId,
    pub start_socket_index: usize,
    pub end_node: NodeId,
    pub end_socket_index: usize,
}

impl Connection {
    pub fn new(
        start_node: impl Into<NodeId>,
        start_socket_index: usize,
        end_node: impl Into<NodeId>,
        end_socket_index: usize,
    ) -> Self {
        Self {
            start_node: start_node.into(),
            start_socket_index,
            end_node: end_node.into(),
            end_socket_index,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<NodeInstance>,
    index: HashMap<NodeId, usize>,
    connections: Vec<Connection>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> &[NodeInstance] {
        &self.nodes
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.index.contains_key(id)
    }

    pub fn node(&self, id: &NodeId) -> Option<&NodeInstance> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut NodeInstance> {
        match self.index.get(id) {
            Some(&i) => Some(&mut self.nodes[i]),
            None => None,
        }
    }

    /// Position of a node in insertion order.
    pub fn position(&self, id: &NodeId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub(crate) fn node_at(&self, index: usize) -> &NodeInstance {
        &self.nodes[index]
    }

    pub(crate) fn node_at_mut(&mut self, index: usize) -> &mut NodeInstance {
        &mut self.nodes[index]
    }

    pub fn add_node(&mut self, node: NodeInstance) -> PipelineResult<NodeId> {
        let id = node.id().clone();
        if self.index.contains_key(&id) {
            return Err(PipelineError::DuplicateNode(id));
        }
        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(node);
        tracing::debug!(node = %id, "Added node");
        Ok(id)
    }

    /// Remove a node and every connection touching it.
    pub fn remove_node(&mut self, id: &NodeId) -> PipelineResult<NodeInstance> {
        let pos = self
            .index
            .remove(id)
            .ok_or_else(|| PipelineError::UnknownNode(id.clone()))?;
        let node = self.nodes.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }

        let before = self.connections.len();
        self.connections
            .retain(|c| &c.start_node != id && &c.end_node != id);
        tracing::debug!(
            node = %id,
            connections_removed = before - self.connections.len(),
            "Removed node"
        );
        Ok(node)
    }

    /// Connect an output socket to an input socket.
    ///
    /// Both indices must exist and the socket types must be compatible. An
    /// input accepts one connection; an existing one is replaced. Cycles are
    /// not rejected here; the engine reports them when a run is attempted.
    pub fn connect(&mut self, connection: Connection) -> PipelineResult<()> {
        let source = self
            .node(&connection.start_node)
            .ok_or_else(|| PipelineError::UnknownNode(connection.start_node.clone()))?;
        let target = self
            .node(&connection.end_node)
            .ok_or_else(|| PipelineError::UnknownNode(connection.end_node.clone()))?;

        let output = source
            .outputs()
            .get(connection.start_socket_index)
            .ok_or_else(|| PipelineError::InvalidSocket {
                node_id: connection.start_node.clone(),
                direction: PortDirection::Output,
                index: connection.start_socket_index,
            })?;
        let input = target
            .inputs()
            .get(connection.end_socket_index)
            .ok_or_else(|| PipelineError::InvalidSocket {
                node_id: connection.end_node.clone(),
                direction: PortDirection::Input,
                index: connection.end_socket_index,
            })?;

        if !input.accepts(output) {
            return Err(PipelineError::TypeMismatch {
                from: output.value_type,
                to: input.value_type,
            });
        }

        self.disconnect(&connection.end_node, connection.end_socket_index);
        tracing::debug!(
            from = %connection.start_node,
            to = %connection.end_node,
            input = connection.end_socket_index,
            "Connected"
        );
        self.connections.push(connection);
        Ok(())
    }

    /// Remove the connection feeding an input, if any.
    pub fn disconnect(&mut self, end_node: &NodeId, end_socket_index: usize) -> Option<Connection> {
        let pos = self
            .connections
            .iter()
            .position(|c| &c.end_node == end_node && c.end_socket_index == end_socket_index)?;
        Some(self.connections.remove(pos))
    }

    /// Snapshot the graph as a serializable document.
    pub fn to_document(&self) -> GraphDocument {
        GraphDocument {
            nodes: self
                .nodes
                .iter()
                .map(|n| NodeDocument {
                    id: n.id().clone(),
                    definition_name: n.name().to_string(),
                    x: n.x,
                    y: n.y,
                    params: n.params().clone(),
                    code: Some(n.code().to_string()),
                })
                .collect(),
            connections: self.connections.clone(),
        }
    }

    /// Rebuild a graph from a document.
    ///
    /// Each node is rebuilt from its embedded code; without code (or when it
    /// does not parse) the registry definition of the same name is used.
    /// Connections to unknown node ids are dropped with a warning. Socket
    /// indices are not checked here.
    pub fn from_document(doc: &GraphDocument, registry: &NodeRegistry) -> PipelineResult<Self> {
        let mut graph = Graph::new();

        for entry in &doc.nodes {
            let embedded = entry.code.as_deref().filter(|c| !c.trim().is_empty());
            let parsed = embedded.map(parse_function);

            let (definition, code) = match (parsed, registry.get(&entry.definition_name)) {
                (Some(Ok(def)), _) => {
                    let code = def.code().to_string();
                    (Arc::new(def), code)
                }
                (Some(Err(e)), Some(def)) => {
                    tracing::warn!(
                        node = %entry.id,
                        error = %e,
                        "Embedded code does not parse, using registry definition"
                    );
                    let code = embedded.unwrap_or_default().to_string();
                    (def, code)
                }
                (Some(Err(e)), None) => {
                    return Err(PipelineError::InvalidCode {
                        node_id: entry.id.clone(),
                        source: e,
                    })
                }
                (None, Some(def)) => {
                    let code = def.code().to_string();
                    (def, code)
                }
                (None, None) => {
                    return Err(PipelineError::MissingDefinition {
                        node_id: entry.id.clone(),
                        name: entry.definition_name.clone(),
                    })
                }
            };

            graph.add_node(NodeInstance::restore(
                entry.id.clone(),
                definition,
                entry.x,
                entry.y,
                code,
                entry.params.clone(),
            ))?;
        }

        for connection in &doc.connections {
            if graph.contains(&connection.start_node) && graph.contains(&connection.end_node) {
                graph.connections.push(connection.clone());
            } else {
                tracing::warn!(
                    from = %connection.start_node,
                    to = %connection.end_node,
                    "Dropping connection to unknown node"
                );
            }
        }

        tracing::info!(
            nodes = graph.len(),
            connections = graph.connections.len(),
            "Loaded graph document"
        );
        Ok(graph)
    }
}

/// Serialized form of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDocument {
    pub id: NodeId,
    #[serde(alias = "type")]
    pub definition_name: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub params: ValueMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Serialized form of a whole graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    pub nodes: Vec<NodeDocument>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}
