//! Node instances placed in a graph.
//!
//! A [`NodeInstance`] owns a private copy of its definition's code and a
//! value for every input socket. Editing the code and calling
//! [`NodeInstance::refresh_from_code`] re-derives the socket shape without
//! touching the shared registry definition.
//!
//! Runtime state (`last_output`, `last_error`, `cache_hash`) is written only
//! by the engine through [`NodeInstance::record_success`] and
//! [`NodeInstance::record_failure`].

use crate::pipeline::error::PipelineError;
use crate::pipeline::id::NodeId;
use crate::pipeline::port::SocketDef;
use crate::scripting::{parse_function, ExecutionError, NodeDefinition, ParseError, ScriptEvaluator};
use crate::types::{Outputs, Value, ValueMap};
use sha2::{Digest, Sha256};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct NodeInstance {
    id: NodeId,
    pub x: f64,
    pub y: f64,
    definition: Arc<NodeDefinition>,
    code: String,
    params: ValueMap,
    last_output: Option<Outputs>,
    last_error: Option<String>,
    cache_hash: Option<String>,
}

impl NodeInstance {
    /// Create an instance with params seeded to the socket defaults.
    pub fn instantiate(
        definition: Arc<NodeDefinition>,
        x: f64,
        y: f64,
        id: Option<NodeId>,
    ) -> Self {
        let params = definition
            .inputs()
            .iter()
            .map(|s| (s.name.clone(), s.default.clone()))
            .collect();
        Self {
            id: id.unwrap_or_default(),
            x,
            y,
            code: definition.code().to_string(),
            definition,
            params,
            last_output: None,
            last_error: None,
            cache_hash: None,
        }
    }

    /// Rebuild an instance from saved state. `params` are laid over the
    /// socket defaults.
    pub fn restore(
        id: NodeId,
        definition: Arc<NodeDefinition>,
        x: f64,
        y: f64,
        code: String,
        params: ValueMap,
    ) -> Self {
        let mut node = Self::instantiate(definition, x, y, Some(id));
        node.code = code;
        node.params.extend(params);
        node
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn definition(&self) -> &NodeDefinition {
        &self.definition
    }

    /// Definition name, which is also the entry function name.
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn inputs(&self) -> &[SocketDef] {
        self.definition.inputs()
    }

    pub fn outputs(&self) -> &[SocketDef] {
        self.definition.outputs()
    }

    pub fn params(&self) -> &ValueMap {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    pub fn last_output(&self) -> Option<&Outputs> {
        self.last_output.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn cache_hash(&self) -> Option<&str> {
        self.cache_hash.as_deref()
    }

    /// Set the value used for an input socket when it is not connected.
    pub fn set_param(&mut self, name: &str, value: Value) -> Result<(), PipelineError> {
        if self.definition.input(name).is_none() {
            return Err(PipelineError::UnknownParameter {
                node_id: self.id.clone(),
                name: name.to_string(),
            });
        }
        self.params.insert(name.to_string(), value);
        Ok(())
    }

    /// Replace the code text and refresh the socket shape from it.
    ///
    /// The text is kept even when it does not parse, so an editor can show
    /// it; the previous sockets stay in effect until it does.
    pub fn set_code(&mut self, text: impl Into<String>) -> Result<(), ParseError> {
        self.code = text.into();
        self.refresh_from_code()
    }

    /// Re-derive sockets from the current code.
    ///
    /// Params of retained inputs keep their values, new inputs start at
    /// their declared default and params of removed inputs are dropped. On a
    /// parse error nothing changes.
    pub fn refresh_from_code(&mut self) -> Result<(), ParseError> {
        let definition = parse_function(&self.code)?;

        let params = definition
            .inputs()
            .iter()
            .map(|socket| {
                let value = self
                    .params
                    .get(&socket.name)
                    .cloned()
                    .unwrap_or_else(|| socket.default.clone());
                (socket.name.clone(), value)
            })
            .collect();

        tracing::debug!(
            node = %self.id,
            name = definition.name(),
            inputs = definition.inputs().len(),
            "Refreshed node from code"
        );

        self.code = definition.code().to_string();
        self.params = params;
        self.definition = Arc::new(definition);
        Ok(())
    }

    /// Value an unconnected input takes: the param, else the socket default.
    pub fn unconnected_value(&self, socket: &SocketDef) -> Value {
        self.params
            .get(&socket.name)
            .cloned()
            .unwrap_or_else(|| socket.default.clone())
    }

    /// SHA-256 hex digest over params, code and resolved inputs.
    ///
    /// Each component is length-prefixed; maps are serialized name-sorted.
    pub fn compute_content_hash(&self, resolved_inputs: &ValueMap) -> String {
        let params = canonical_json(&self.params);
        let inputs = canonical_json(resolved_inputs);

        let mut hasher = Sha256::new();
        for part in [params.as_bytes(), self.code.as_bytes(), inputs.as_bytes()] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        format!("{:x}", hasher.finalize())
    }

    /// Whether a previous successful run with this hash can be reused.
    pub fn is_cache_valid(&self, hash: &str) -> bool {
        self.cache_hash.as_deref() == Some(hash)
            && self.last_error.is_none()
            && self.last_output.is_some()
    }

    /// Call the node function with `resolved_inputs` bound by socket name.
    pub fn execute(
        &self,
        evaluator: &dyn ScriptEvaluator,
        resolved_inputs: &ValueMap,
    ) -> Result<Outputs, ExecutionError> {
        let value = evaluator.evaluate(&self.code, self.definition.name(), resolved_inputs)?;
        let mut outputs = Outputs::new();
        if let Some(socket) = self.definition.outputs().first() {
            outputs.insert(socket.name.clone(), value);
        }
        Ok(outputs)
    }

    pub fn record_success(&mut self, outputs: Outputs, hash: String) {
        self.last_output = Some(outputs);
        self.last_error = None;
        self.cache_hash = Some(hash);
    }

    pub fn record_failure(&mut self, message: String) {
        self.last_error = Some(message);
    }
}

/// Name-sorted JSON text of `values`; tagged forms keep dates and
/// non-finite numbers distinct.
fn canonical_json(values: &ValueMap) -> String {
    serde_json::Value::from(Value::Map(values.clone())).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripting::{builtins, RhaiEvaluator};
    use crate::types::ValueType;
    use proptest::prelude::*;

    fn node(source: &str) -> NodeInstance {
        let def = parse_function(source).unwrap();
        NodeInstance::instantiate(Arc::new(def), 10.0, 20.0, Some(NodeId::from("n")))
    }

    fn inputs(pairs: &[(&str, f64)]) -> ValueMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::Number(*v)))
            .collect()
    }

    #[test]
    fn test_instantiate_seeds_params() {
        let n = node("fn scale(v: number, k: number = 2.0) -> number { v * k }");
        assert_eq!(n.param("v"), Some(&Value::Number(0.0)));
        assert_eq!(n.param("k"), Some(&Value::Number(2.0)));
        assert!(n.last_output().is_none());
        assert!(n.cache_hash().is_none());
        assert_eq!(n.x, 10.0);
    }

    #[test]
    fn test_generated_id_when_absent() {
        let def = Arc::new(parse_function(builtins::ADD).unwrap());
        let a = NodeInstance::instantiate(def.clone(), 0.0, 0.0, None);
        let b = NodeInstance::instantiate(def, 0.0, 0.0, None);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_set_param_unknown_socket() {
        let mut n = node(builtins::ADD);
        assert!(n.set_param("a", Value::Number(1.0)).is_ok());
        assert!(matches!(
            n.set_param("zzz", Value::Null),
            Err(PipelineError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn test_refresh_keeps_retained_params() {
        let mut n = node("fn f(a: number) -> number { a }");
        n.set_param("a", Value::Number(5.0)).unwrap();

        n.set_code("fn f(a: number, b: number = 10.0) -> number { a + b }")
            .unwrap();

        assert_eq!(n.inputs().len(), 2);
        assert_eq!(n.param("a"), Some(&Value::Number(5.0)));
        assert_eq!(n.param("b"), Some(&Value::Number(10.0)));
    }

    #[test]
    fn test_refresh_drops_removed_params() {
        let mut n = node("fn f(a: number, b: number) -> number { a + b }");
        n.set_code("fn f(b: string) -> string { b }").unwrap();
        assert!(n.param("a").is_none());
        assert_eq!(n.param("b"), Some(&Value::Number(0.0)));
        assert_eq!(n.inputs()[0].value_type, ValueType::String);
    }

    #[test]
    fn test_refresh_failure_leaves_shape() {
        let mut n = node("fn f(a: number) -> number { a }");
        let before = n.definition().clone();
        assert!(n.set_code("let nothing = 1;").is_err());
        assert_eq!(n.definition(), &before);
        assert_eq!(n.code(), "let nothing = 1;");
        assert!(n.refresh_from_code().is_err());
    }

    #[test]
    fn test_hash_is_deterministic() {
        let n = node(builtins::ADD);
        let i = inputs(&[("a", 1.0), ("b", 2.0)]);
        assert_eq!(n.compute_content_hash(&i), n.compute_content_hash(&i));
        assert_eq!(n.compute_content_hash(&i).len(), 64);
    }

    #[test]
    fn test_hash_sensitive_to_each_component() {
        let mut n = node(builtins::ADD);
        let i = inputs(&[("a", 1.0), ("b", 2.0)]);
        let base = n.compute_content_hash(&i);

        assert_ne!(base, n.compute_content_hash(&inputs(&[("a", 1.0), ("b", 3.0)])));

        n.set_param("a", Value::Number(9.0)).unwrap();
        let with_param = n.compute_content_hash(&i);
        assert_ne!(base, with_param);

        n.set_code("fn add(a: number, b: number) -> number { b + a }")
            .unwrap();
        assert_ne!(with_param, n.compute_content_hash(&i));
    }

    #[test]
    fn test_hash_tells_nan_from_unit() {
        let n = node("fn f(x) { x }");
        let nan = n.compute_content_hash(&[("x".to_string(), Value::Number(f64::NAN))].into());
        let unit = n.compute_content_hash(&[("x".to_string(), Value::Null)].into());
        assert_ne!(nan, unit);
    }

    #[test]
    fn test_execute_and_cache_validity() {
        let evaluator = RhaiEvaluator::new();
        let mut n = node(builtins::ADD);
        let i = inputs(&[("a", 3.0), ("b", 4.0)]);

        let outputs = n.execute(&evaluator, &i).unwrap();
        assert_eq!(outputs.get("result"), Some(&Value::Number(7.0)));

        let hash = n.compute_content_hash(&i);
        assert!(!n.is_cache_valid(&hash));
        n.record_success(outputs, hash.clone());
        assert!(n.is_cache_valid(&hash));

        n.record_failure("boom".to_string());
        assert!(!n.is_cache_valid(&hash));
        assert_eq!(n.cache_hash(), Some(hash.as_str()));
    }

    #[test]
    fn test_execute_renamed_function() {
        let evaluator = RhaiEvaluator::new();
        let mut n = node(builtins::ADD);
        // Code edited to a different name without a successful refresh.
        n.code = "fn plus(a, b) { a + b }".to_string();
        assert!(matches!(
            n.execute(&evaluator, &inputs(&[("a", 1.0), ("b", 1.0)])),
            Err(ExecutionError::FunctionNotFound(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_hash_changes_with_input(a in -1.0e6f64..1.0e6, b in -1.0e6f64..1.0e6) {
            prop_assume!(a != b);
            let n = node(builtins::CONSTANT);
            let ha = n.compute_content_hash(&inputs(&[("value", a)]));
            let hb = n.compute_content_hash(&inputs(&[("value", b)]));
            prop_assert_ne!(ha, hb);
        }
    }
}
