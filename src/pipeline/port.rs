//! Socket descriptors for the node system.
//!
//! Each definition declares its sockets (inputs/outputs) as `SocketDef`
//! lists. The graph uses them to validate connections; the engine uses them
//! to resolve values by index.

use crate::types::{Value, ValueType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a socket is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Input => f.write_str("input"),
            PortDirection::Output => f.write_str("output"),
        }
    }
}

/// A named, typed socket with the value used when nothing else is supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketDef {
    pub name: String,
    pub value_type: ValueType,
    pub default: Value,
}

impl SocketDef {
    pub fn new(name: impl Into<String>, value_type: ValueType, default: Value) -> Self {
        Self {
            name: name.into(),
            value_type,
            default,
        }
    }

    /// Socket whose default is the canonical default of its type.
    pub fn typed(name: impl Into<String>, value_type: ValueType) -> Self {
        Self::new(name, value_type, value_type.default_value())
    }

    /// Whether a value produced by `source` may flow into this socket.
    pub fn accepts(&self, source: &SocketDef) -> bool {
        source.value_type.is_compatible_with(self.value_type)
    }
}
