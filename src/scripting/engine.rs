//! Rhai evaluator for node functions
//!
//! [`RhaiEvaluator`] is the only place node code runs. A call is:
//! re-scan the signature, check the entry name, bind arguments by parameter
//! name, compile the annotation-free rewrite (cached by source) and call it.

use crate::scripting::signature::ParsedFunction;
use crate::scripting::{create_shared_cache, ParseError, SharedScriptCache};
use crate::types::{Value, ValueMap, DATE_FORMAT};
use chrono::{Local, NaiveDate};
use rhai::{Dynamic, Engine, EvalAltResult, Scope};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while invoking node code
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Function `{0}` not found in node code")]
    FunctionNotFound(String),

    #[error("Missing argument `{0}`")]
    MissingArgument(String),

    #[error("Unexpected argument `{0}`")]
    UnexpectedArgument(String),

    #[error("Node code does not parse: {0}")]
    Parse(#[from] ParseError),

    /// Fault raised by the code itself; displays the bare message
    #[error("{0}")]
    Runtime(String),

    #[error("Unsupported value of type `{0}`")]
    Conversion(String),
}

/// Calls a named function in a source text with named arguments.
///
/// Implementations must be shareable with a background run thread.
pub trait ScriptEvaluator: Send + Sync {
    fn evaluate(&self, source: &str, entry: &str, args: &ValueMap)
        -> Result<Value, ExecutionError>;
}

/// Safety limits applied to the Rhai engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorLimits {
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_expr_depth: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for EvaluatorLimits {
    fn default() -> Self {
        Self {
            max_operations: 100_000,
            max_call_levels: 32,
            max_expr_depth: 64,
            max_string_size: 10_000,
            max_array_size: 1_000,
            max_map_size: 1_000,
        }
    }
}

/// Rhai-backed [`ScriptEvaluator`]
pub struct RhaiEvaluator {
    /// The Rhai engine instance
    engine: Engine,
    /// Cache of compiled scripts
    cache: SharedScriptCache,
    limits: EvaluatorLimits,
}

impl RhaiEvaluator {
    /// Create an evaluator with default limits
    pub fn new() -> Self {
        Self::with_limits(EvaluatorLimits::default())
    }

    pub fn with_limits(limits: EvaluatorLimits) -> Self {
        Self::with_cache(limits, create_shared_cache())
    }

    /// Create an evaluator that shares a compile cache
    pub fn with_cache(limits: EvaluatorLimits, cache: SharedScriptCache) -> Self {
        let mut engine = Engine::new();
        Self::configure_engine(&mut engine, &limits);
        Self {
            engine,
            cache,
            limits,
        }
    }

    /// Apply safety limits and register helper functions
    fn configure_engine(engine: &mut Engine, limits: &EvaluatorLimits) {
        engine.set_max_expr_depths(limits.max_expr_depth, limits.max_expr_depth);
        engine.set_max_call_levels(limits.max_call_levels);
        engine.set_max_operations(limits.max_operations);
        engine.set_max_string_size(limits.max_string_size);
        engine.set_max_array_size(limits.max_array_size);
        engine.set_max_map_size(limits.max_map_size);

        // Dates
        engine.register_type_with_name::<NaiveDate>("date");
        engine.register_fn(
            "parse_date",
            |text: &str| -> Result<NaiveDate, Box<EvalAltResult>> {
                NaiveDate::parse_from_str(text.trim(), DATE_FORMAT)
                    .map_err(|e| format!("invalid date `{}`: {}", text, e).into())
            },
        );
        engine.register_fn("today", || Local::now().date_naive());
        engine.register_fn("to_string", |d: &mut NaiveDate| {
            d.format(DATE_FORMAT).to_string()
        });
        engine.register_fn("format", |d: &mut NaiveDate, fmt: &str| {
            d.format(fmt).to_string()
        });
        engine.register_fn("==", |a: NaiveDate, b: NaiveDate| a == b);
        engine.register_fn("!=", |a: NaiveDate, b: NaiveDate| a != b);

        // Float math
        engine.register_fn("abs", |x: f64| x.abs());
        engine.register_fn("sqrt", |x: f64| x.sqrt());
        engine.register_fn("pow", |x: f64, y: f64| x.powf(y));
        engine.register_fn("exp", |x: f64| x.exp());
        engine.register_fn("ln", |x: f64| x.ln());
        engine.register_fn("log10", |x: f64| x.log10());
        engine.register_fn("sin", |x: f64| x.sin());
        engine.register_fn("cos", |x: f64| x.cos());
        engine.register_fn("tan", |x: f64| x.tan());
        engine.register_fn("atan2", |y: f64, x: f64| y.atan2(x));
        engine.register_fn("clamp", |x: f64, min: f64, max: f64| x.clamp(min, max));
        engine.register_fn("min", |a: f64, b: f64| a.min(b));
        engine.register_fn("max", |a: f64, b: f64| a.max(b));
        engine.register_fn("pi", || std::f64::consts::PI);
        engine.register_fn("e", || std::f64::consts::E);
        engine.register_fn("lerp", |a: f64, b: f64, t: f64| a + (b - a) * t);
        engine.register_fn(
            "map_range",
            |x: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64| {
                (x - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
            },
        );
    }

    /// Evaluate a whole script (such as an exported graph) and return its
    /// final value.
    pub fn run_script(&self, script: &str) -> Result<Value, ExecutionError> {
        let compiled = {
            let mut cache = self.cache.write().map_err(|e| {
                ExecutionError::Runtime(format!("Failed to acquire cache lock: {}", e))
            })?;
            cache.get_or_compile(&self.engine, script)?
        };

        let result = self
            .engine
            .eval_ast::<Dynamic>(compiled.ast())
            .map_err(|e| ExecutionError::Runtime(runtime_message(&e)))?;
        from_dynamic(result)
    }

    /// Validate a script without executing it
    pub fn validate(&self, source: &str) -> Result<(), ParseError> {
        self.engine
            .compile(source)
            .map(|_| ())
            .map_err(|e| crate::scripting::signature::syntax_error(&e))
    }

    pub fn limits(&self) -> &EvaluatorLimits {
        &self.limits
    }

    /// Get a reference to the shared cache
    pub fn cache(&self) -> &SharedScriptCache {
        &self.cache
    }
}

impl ScriptEvaluator for RhaiEvaluator {
    fn evaluate(
        &self,
        source: &str,
        entry: &str,
        args: &ValueMap,
    ) -> Result<Value, ExecutionError> {
        let parsed = ParsedFunction::parse(source)?;
        if parsed.name != entry {
            return Err(ExecutionError::FunctionNotFound(entry.to_string()));
        }

        if let Some(extra) = args
            .keys()
            .find(|k| !parsed.param_names().any(|p| p == k.as_str()))
        {
            return Err(ExecutionError::UnexpectedArgument(extra.clone()));
        }
        let call_args = parsed
            .param_names()
            .map(|name| {
                args.get(name)
                    .map(to_dynamic)
                    .ok_or_else(|| ExecutionError::MissingArgument(name.to_string()))
            })
            .collect::<Result<Vec<Dynamic>, _>>()?;

        let compiled = {
            let mut cache = self.cache.write().map_err(|e| {
                ExecutionError::Runtime(format!("Failed to acquire cache lock: {}", e))
            })?;
            cache.get_or_compile(&self.engine, &parsed.to_rhai())?
        };

        let mut scope = Scope::new();
        let result = self
            .engine
            .call_fn::<Dynamic>(&mut scope, compiled.ast(), entry, call_args)
            .map_err(|e| ExecutionError::Runtime(runtime_message(&e)))?;
        from_dynamic(result)
    }
}

impl Default for RhaiEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RhaiEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RhaiEvaluator")
            .field("cache_size", &self.cache.read().map(|c| c.len()).ok())
            .field("limits", &self.limits)
            .finish()
    }
}

/// Peel nested call frames down to the thrown value or innermost fault.
fn runtime_message(err: &EvalAltResult) -> String {
    match err {
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => runtime_message(inner),
        EvalAltResult::ErrorRuntime(value, _) => value.to_string(),
        other => other.to_string(),
    }
}

pub fn to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Boolean(b) => Dynamic::from_bool(*b),
        Value::Number(n) => Dynamic::from_float(*n),
        Value::String(s) => Dynamic::from(s.clone()),
        Value::Date(d) => Dynamic::from(*d),
        Value::List(items) => Dynamic::from_array(items.iter().map(to_dynamic).collect()),
        Value::Map(map) => Dynamic::from_map(
            map.iter()
                .map(|(k, v)| (k.as_str().into(), to_dynamic(v)))
                .collect(),
        ),
    }
}

/// Integers coming back from Rhai become numbers.
pub fn from_dynamic(value: Dynamic) -> Result<Value, ExecutionError> {
    if value.is_unit() {
        return Ok(Value::Null);
    }
    if let Ok(b) = value.as_bool() {
        return Ok(Value::Boolean(b));
    }
    if let Ok(f) = value.as_float() {
        return Ok(Value::Number(f));
    }
    if let Ok(i) = value.as_int() {
        return Ok(Value::Number(i as f64));
    }
    if let Ok(c) = value.as_char() {
        return Ok(Value::String(c.to_string()));
    }
    if value.is_string() {
        return value
            .into_string()
            .map(Value::String)
            .map_err(|t| ExecutionError::Conversion(t.to_string()));
    }
    if value.is::<NaiveDate>() {
        return Ok(Value::Date(value.cast::<NaiveDate>()));
    }
    if value.is_array() {
        let items = value
            .into_array()
            .map_err(|t| ExecutionError::Conversion(t.to_string()))?;
        return items
            .into_iter()
            .map(from_dynamic)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List);
    }
    if value.is_map() {
        let type_name = value.type_name().to_string();
        let map = value
            .try_cast::<rhai::Map>()
            .ok_or(ExecutionError::Conversion(type_name))?;
        return map
            .into_iter()
            .map(|(k, v)| from_dynamic(v).map(|v| (k.to_string(), v)))
            .collect::<Result<ValueMap, _>>()
            .map(Value::Map);
    }
    Err(ExecutionError::Conversion(value.type_name().to_string()))
}
