//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use nodeflow_rs::registry::{MemoryDefinitionStore, NodeRegistry};
use nodeflow_rs::types::Value;
use std::time::Duration;

/// Upper bound for waiting on background runs
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Registry over an in-memory store, seeded with the built-ins
pub fn registry() -> NodeRegistry {
    NodeRegistry::open(Box::new(MemoryDefinitionStore::new())).expect("registry opens")
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Assert a value is a number approximately equal to `expected`
pub fn assert_number(value: Option<&Value>, expected: f64) {
    match value {
        Some(Value::Number(n)) => assert_float_eq(*n, expected, 1e-9),
        other => panic!("Expected number {}, got {:?}", expected, other),
    }
}
