//! Pipeline-specific error types.

use crate::pipeline::id::NodeId;
use crate::pipeline::port::PortDirection;
use crate::scripting::ParseError;
use crate::types::ValueType;
use thiserror::Error;

/// Errors raised while editing, loading or exporting a graph.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Node {0} already exists in the graph")]
    DuplicateNode(NodeId),

    #[error("Node {0} not found in the graph")]
    UnknownNode(NodeId),

    #[error("Node {node_id} has no {direction} socket at index {index}")]
    InvalidSocket {
        node_id: NodeId,
        direction: PortDirection,
        index: usize,
    },

    #[error("Node {node_id} has no input named `{name}`")]
    UnknownParameter { node_id: NodeId, name: String },

    #[error("Cannot connect {from} output to {to} input")]
    TypeMismatch { from: ValueType, to: ValueType },

    #[error("Node {node_id} code is invalid: {source}")]
    InvalidCode {
        node_id: NodeId,
        #[source]
        source: ParseError,
    },

    #[error("Node {node_id} references unknown definition `{name}`")]
    MissingDefinition { node_id: NodeId, name: String },

    #[error("Cycle detected in pipeline graph ({scheduled} of {total} nodes schedulable)")]
    CycleDetected { scheduled: usize, total: usize },

    #[error("Run worker panicked")]
    WorkerPanicked,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a run stops before every node has completed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunError {
    #[error("Cycle detected: {scheduled} of {total} nodes schedulable")]
    Cycle { scheduled: usize, total: usize },

    #[error("Node {node_id} failed: {message}")]
    NodeFailed { node_id: NodeId, message: String },

    #[error("Run cancelled")]
    Cancelled,
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
