//! Rhai scripting layer for node bodies
//!
//! Every node is a single Rhai function with a type-annotated signature. This
//! module turns that source into a typed [`NodeDefinition`] and runs it:
//!
//! - [`signature`] scans the signature, derives input/output sockets and
//!   rewrites it to plain Rhai.
//! - [`RhaiEvaluator`] calls the rewritten function with named arguments
//!   and converts between [`Value`](crate::types::Value) and Rhai values.
//! - [`builtins`] holds the default node library seeded into new stores.
//!
//! ## Example Node
//!
//! ```rhai
//! // Scale a reading into volts
//! fn adc_to_volts(raw: number, vref: number = 3.3) -> number {
//!     raw * vref / 4095.0
//! }
//! ```
//!
//! ## Helper Functions
//!
//! On top of the Rhai standard library the evaluator registers:
//!
//! - `parse_date(text)` / `today()` - build a date value (`YYYY-MM-DD`)
//! - `date.to_string()` / `date.format(fmt)` - render a date
//! - `lerp(a, b, t)`, `map_range(x, in_min, in_max, out_min, out_max)`
//! - `pi()`, `e()`, `clamp(x, min, max)` and the usual float math

mod engine;
pub mod signature;

pub use engine::{EvaluatorLimits, ExecutionError, RhaiEvaluator, ScriptEvaluator};
pub use signature::{parse_function, NodeDefinition, ParseError, ParsedFunction, OUTPUT_SOCKET};

use rhai::{Engine, AST};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

/// Compiled scripts kept by a [`ScriptCache`] before the oldest is evicted
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// A compiled node function that can be called repeatedly
#[derive(Debug, Clone)]
pub struct CompiledScript {
    ast: AST,
}

impl CompiledScript {
    pub fn ast(&self) -> &AST {
        &self.ast
    }
}

/// Cache for compiled scripts to avoid recompilation
///
/// Keyed by the plain Rhai source. Once `capacity` entries are held, the
/// oldest is dropped for each new one, so code edited over a long session
/// does not pile up.
pub struct ScriptCache {
    cache: HashMap<String, CompiledScript>,
    /// Insertion order, oldest first
    order: VecDeque<String>,
    capacity: usize,
}

impl Default for ScriptCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptCache {
    /// Create a new empty cache
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cache: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Get a cached script or compile and cache it
    pub fn get_or_compile(
        &mut self,
        engine: &Engine,
        source: &str,
    ) -> Result<CompiledScript, ParseError> {
        if let Some(script) = self.cache.get(source) {
            return Ok(script.clone());
        }

        let ast = engine
            .compile(source)
            .map_err(|e| signature::syntax_error(&e))?;
        let script = CompiledScript { ast };

        while self.cache.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else { break };
            self.cache.remove(&oldest);
        }
        self.cache.insert(source.to_string(), script.clone());
        self.order.push_back(source.to_string());
        Ok(script)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn contains(&self, source: &str) -> bool {
        self.cache.contains_key(source)
    }
}

/// Thread-safe script cache wrapper
pub type SharedScriptCache = Arc<RwLock<ScriptCache>>;

/// Create a new shared script cache
pub fn create_shared_cache() -> SharedScriptCache {
    Arc::new(RwLock::new(ScriptCache::new()))
}

/// Default node library, registered into a store that does not have them yet
pub mod builtins {
    /// Emits its parameter unchanged
    pub const CONSTANT: &str = r#"
fn constant(value: number = 0.0) -> number {
    value
}
"#;

    pub const ADD: &str = r#"
fn add(a: number, b: number) -> number {
    a + b
}
"#;

    pub const SUBTRACT: &str = r#"
fn subtract(a: number, b: number) -> number {
    a - b
}
"#;

    pub const MULTIPLY: &str = r#"
fn multiply(a: number, b: number) -> number {
    a * b
}
"#;

    /// Fails the node instead of producing an infinity
    pub const DIVIDE: &str = r#"
fn divide(a: number, b: number) -> number {
    if b == 0.0 {
        throw "division by zero";
    }
    a / b
}
"#;

    /// Pass-through sink used to surface a value
    pub const OUTPUT: &str = r#"
fn output(value) {
    value
}
"#;

    pub const NUMBER_TO_STRING: &str = r#"
fn number_to_string(value: number) -> string {
    value.to_string()
}
"#;

    pub const STRING_TO_NUMBER: &str = r#"
fn string_to_number(text: string) -> number {
    parse_float(text)
}
"#;

    pub const BOOLEAN_TO_STRING: &str = r#"
fn boolean_to_string(value: bool) -> string {
    value.to_string()
}
"#;

    /// `true`, `1` and `yes` (any case) are true
    pub const STRING_TO_BOOLEAN: &str = r#"
fn string_to_boolean(text: string) -> bool {
    let t = text.to_lower();
    t == "true" || t == "1" || t == "yes"
}
"#;

    pub const STRING_TO_DATE: &str = r#"
fn string_to_date(text: string) -> date {
    parse_date(text)
}
"#;

    pub const DATE_TO_STRING: &str = r#"
fn date_to_string(value: date) -> string {
    value.to_string()
}
"#;

    /// List of all built-in nodes with names
    pub fn all() -> Vec<(&'static str, &'static str)> {
        vec![
            ("constant", CONSTANT),
            ("add", ADD),
            ("subtract", SUBTRACT),
            ("multiply", MULTIPLY),
            ("divide", DIVIDE),
            ("output", OUTPUT),
            ("number_to_string", NUMBER_TO_STRING),
            ("string_to_number", STRING_TO_NUMBER),
            ("boolean_to_string", BOOLEAN_TO_STRING),
            ("string_to_boolean", STRING_TO_BOOLEAN),
            ("string_to_date", STRING_TO_DATE),
            ("date_to_string", DATE_TO_STRING),
        ]
    }
}
