//! # nodeflow-rs: scriptable dataflow node graphs
//!
//! Nodes are small typed Rhai functions. A graph wires the `result` of one
//! node into the parameters of others, and the engine runs the graph in
//! dependency order, reusing a node's previous output when nothing that
//! feeds it has changed.
//!
//! ## Architecture
//!
//! - **Scripting**: signature parsing (`fn add(a: number, b: number = 1.0)`)
//!   and a Rhai evaluator behind the [`ScriptEvaluator`] trait
//! - **Registry**: parsed definitions backed by a SQLite [`DefinitionStore`]
//! - **Pipeline**: graph editing, Kahn scheduling, content-hash caching,
//!   run events over crossbeam channels, and script export
//! - **Config**: TOML application settings and JSON graph files
//!
//! ## Configuration
//!
//! Settings and the default definition store live in the platform data
//! directory under `dev.nodeflow.nodeflow-rs`:
//!
//! - **Linux**: `~/.local/share/dev.nodeflow.nodeflow-rs/`
//! - **macOS**: `~/Library/Application Support/dev.nodeflow.nodeflow-rs/`
//! - **Windows**: `%APPDATA%\dev.nodeflow.nodeflow-rs\`
//!
//! ## Example
//!
//! ```ignore
//! use nodeflow_rs::{
//!     pipeline::{CancelToken, Connection, Engine, Graph, NullSink},
//!     registry::{NodeRegistry, SqliteDefinitionStore},
//!     types::Value,
//! };
//!
//! let store = SqliteDefinitionStore::in_memory()?;
//! let registry = NodeRegistry::open(Box::new(store))?;
//!
//! let mut graph = Graph::new();
//! let a = graph.add_node(registry.instantiate("constant", 0.0, 0.0)?)?;
//! let b = graph.add_node(registry.instantiate("constant", 0.0, 100.0)?)?;
//! let sum = graph.add_node(registry.instantiate("add", 200.0, 50.0)?)?;
//! graph.node_mut(&a).unwrap().set_param("value", Value::Number(3.0))?;
//! graph.node_mut(&b).unwrap().set_param("value", Value::Number(4.0))?;
//! graph.connect(Connection::new(a, 0, sum.clone(), 0))?;
//! graph.connect(Connection::new(b, 0, sum.clone(), 1))?;
//!
//! let report = Engine::default().run(&mut graph, &NullSink, &CancelToken::new());
//! assert!(report.is_success());
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod scripting;
pub mod types;

// Re-export commonly used types
pub use config::{AppConfig, GraphFile};
pub use error::{NodeflowError, Result};
pub use pipeline::{Engine, Graph, NodeId, NodeInstance, RunEvent, RunReport};
pub use registry::{DefinitionStore, NodeRegistry, SqliteDefinitionStore};
pub use scripting::{NodeDefinition, RhaiEvaluator, ScriptEvaluator};
pub use types::{Value, ValueType};
