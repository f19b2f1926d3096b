//! Node definition registry
//!
//! The registry keeps the parsed definitions that node instances are made
//! from. It is backed by a [`DefinitionStore`] holding only source text:
//!
//! 1. Opening loads every stored `(name, code)` pair and parses it. Entries
//!    that no longer parse are skipped with a warning.
//! 2. Every built-in node whose name the store does not already contain is
//!    registered, so user edits to a built-in survive restarts.
//!
//! Registering code parses it, replaces any in-memory definition of the same
//! name and upserts it into the store.

mod store;

pub use store::{DefinitionStore, MemoryDefinitionStore, SqliteDefinitionStore, StoreError};

#[cfg(test)]
pub use store::MockDefinitionStore;

use crate::error::{NodeflowError, Result};
use crate::pipeline::{NodeId, NodeInstance};
use crate::scripting::{builtins, parse_function, NodeDefinition};
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct NodeRegistry {
    store: Box<dyn DefinitionStore>,
    definitions: BTreeMap<String, Arc<NodeDefinition>>,
}

impl NodeRegistry {
    /// Open a registry over `store`, loading persisted definitions and
    /// seeding missing built-ins.
    pub fn open(store: Box<dyn DefinitionStore>) -> Result<Self> {
        let mut registry = Self {
            store,
            definitions: BTreeMap::new(),
        };
        registry.load_from_store()?;
        registry.ensure_builtins()?;

        tracing::info!(definitions = registry.len(), "Node registry ready");
        Ok(registry)
    }

    fn load_from_store(&mut self) -> Result<()> {
        for (name, code) in self.store.fetch_all()? {
            match parse_function(&code) {
                Ok(def) => {
                    self.definitions.insert(def.name().to_string(), Arc::new(def));
                }
                Err(e) => {
                    tracing::warn!(name = %name, error = %e, "Skipping stored definition");
                }
            }
        }
        Ok(())
    }

    fn ensure_builtins(&mut self) -> Result<()> {
        for (name, code) in builtins::all() {
            if self.store.exists(name)? {
                continue;
            }
            match self.register_from_code(code) {
                Ok(_) => tracing::debug!(name, "Seeded built-in definition"),
                Err(NodeflowError::Parse(e)) => {
                    tracing::warn!(name, error = %e, "Built-in definition does not parse");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Parse `code`, make it the definition of its name and persist it.
    pub fn register_from_code(&mut self, code: &str) -> Result<Arc<NodeDefinition>> {
        let def = Arc::new(parse_function(code)?);
        self.store.upsert(def.name(), def.code())?;
        self.definitions
            .insert(def.name().to_string(), Arc::clone(&def));
        tracing::info!(name = def.name(), "Registered definition");
        Ok(def)
    }

    pub fn get(&self, name: &str) -> Option<Arc<NodeDefinition>> {
        self.definitions.get(name).cloned()
    }

    /// All definitions, sorted by name.
    pub fn list_all(&self) -> Vec<Arc<NodeDefinition>> {
        self.definitions.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// New instance of a definition with a generated id.
    pub fn instantiate(&self, name: &str, x: f64, y: f64) -> Result<NodeInstance> {
        let def = self
            .get(name)
            .ok_or_else(|| NodeflowError::UnknownDefinition(name.to_string()))?;
        Ok(NodeInstance::instantiate(def, x, y, None))
    }

    pub fn instantiate_with_id(&self, name: &str, x: f64, y: f64, id: NodeId) -> Result<NodeInstance> {
        let def = self
            .get(name)
            .ok_or_else(|| NodeflowError::UnknownDefinition(name.to_string()))?;
        Ok(NodeInstance::instantiate(def, x, y, Some(id)))
    }

    pub fn store(&self) -> &dyn DefinitionStore {
        self.store.as_ref()
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("definitions", &self.definitions.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    const CUSTOM_ADD: &str = "fn add(a: number, b: number = 1.0) -> number { a + b + 100.0 }";

    #[test]
    fn test_open_seeds_builtins() {
        let registry = NodeRegistry::open(Box::new(MemoryDefinitionStore::new())).unwrap();
        assert_eq!(registry.len(), builtins::all().len());
        for (name, _) in builtins::all() {
            assert!(registry.store().exists(name).unwrap(), "{} not persisted", name);
        }
    }

    #[test]
    fn test_list_all_sorted() {
        let registry = NodeRegistry::open(Box::new(MemoryDefinitionStore::new())).unwrap();
        let names: Vec<String> = registry
            .list_all()
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_stored_override_wins_over_builtin() {
        let store = MemoryDefinitionStore::with_entries([("add", CUSTOM_ADD)]);
        let registry = NodeRegistry::open(Box::new(store)).unwrap();

        let add = registry.get("add").unwrap();
        assert_eq!(add.code(), CUSTOM_ADD);
        assert_eq!(add.inputs()[1].default, Value::Number(1.0));
    }

    #[test]
    fn test_open_with_mock_store() {
        let mut store = MockDefinitionStore::new();
        store.expect_fetch_all().times(1).returning(|| {
            Ok(vec![
                ("add".to_string(), CUSTOM_ADD.to_string()),
                ("broken".to_string(), "this is not a function".to_string()),
            ])
        });
        store
            .expect_exists()
            .returning(|name| Ok(name == "add" || name == "broken"));
        store
            .expect_upsert()
            .times(builtins::all().len() - 1)
            .returning(|_, _| Ok(()));

        let registry = NodeRegistry::open(Box::new(store)).unwrap();
        assert_eq!(registry.get("add").unwrap().code(), CUSTOM_ADD);
        assert!(registry.get("broken").is_none());
        assert!(registry.get("divide").is_some());
    }

    #[test]
    fn test_store_failure_propagates() {
        let mut store = MockDefinitionStore::new();
        store
            .expect_fetch_all()
            .returning(|| Err(StoreError::Poisoned));
        assert!(matches!(
            NodeRegistry::open(Box::new(store)),
            Err(NodeflowError::Store(StoreError::Poisoned))
        ));
    }

    #[test]
    fn test_register_from_code_last_write_wins() {
        let mut registry = NodeRegistry::open(Box::new(MemoryDefinitionStore::new())).unwrap();
        registry
            .register_from_code("fn twice(x: number) -> number { x * 2.0 }")
            .unwrap();
        let updated = registry
            .register_from_code("fn twice(x: number) -> number { x + x }")
            .unwrap();

        assert_eq!(registry.get("twice").unwrap().code(), updated.code());
        assert_eq!(
            registry.store().get("twice").unwrap().as_deref(),
            Some("fn twice(x: number) -> number { x + x }")
        );
    }

    #[test]
    fn test_register_invalid_code() {
        let mut registry = NodeRegistry::open(Box::new(MemoryDefinitionStore::new())).unwrap();
        let before = registry.len();
        assert!(matches!(
            registry.register_from_code("no function here"),
            Err(NodeflowError::Parse(_))
        ));
        assert_eq!(registry.len(), before);
    }

    #[test]
    fn test_instantiate() {
        let registry = NodeRegistry::open(Box::new(MemoryDefinitionStore::new())).unwrap();
        let node = registry.instantiate("constant", 5.0, 6.0).unwrap();
        assert_eq!(node.name(), "constant");
        assert_eq!(node.param("value"), Some(&Value::Number(0.0)));
        assert!(matches!(
            registry.instantiate("nope", 0.0, 0.0),
            Err(NodeflowError::UnknownDefinition(_))
        ));
    }
}
