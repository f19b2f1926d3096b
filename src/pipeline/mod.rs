//! Node graph and execution engine.
//!
//! Nodes are instances of script definitions; connections carry values from
//! an output socket to an input socket. A run visits nodes in dependency
//! order and skips any node whose content hash is unchanged since its last
//! successful execution.
//!
//! # Architecture
//!
//! ```text
//! [constant] ──► [add] ──► [number_to_string] ──► [output]
//! [constant] ──┘
//! ```
//!
//! # Design
//!
//! - **Insertion order is schedule order** for nodes with no dependency
//!   between them (Kahn's algorithm with a FIFO queue).
//! - **Broken wiring is tolerated**: a connection whose socket index no
//!   longer exists is ignored for the run, not reported as an error.
//! - **Fail fast**: the first node error ends the run.
//! - **Copy-on-start**: a background run owns the graph until it is joined.

pub mod bridge;
pub mod compiled_plan;
pub mod compiler;
pub mod error;
pub mod executor;
pub mod export;
pub mod graph;
pub mod id;
pub mod node;
pub mod port;

pub use bridge::{CancelToken, EventLog, EventSink, FnSink, NullSink, RunEvent, RunHandle};
pub use compiled_plan::{DropReason, DroppedConnection, ExecutionPlan, PlanStats, ResolvedEdge};
pub use compiler::PipelineCompiler;
pub use error::{PipelineError, PipelineResult, RunError};
pub use executor::{output_value, Engine, RunReport, RunStatus};
pub use export::export_script;
pub use graph::{Connection, Graph, GraphDocument, NodeDocument};
pub use id::NodeId;
pub use node::NodeInstance;
pub use port::{PortDirection, SocketDef};
