use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::graph::OperatorNode;
use crate::layer::{Layer, ParseError, RegistryError};

/// Builds a layer from the parameters and attributes of one node.
pub type LayerFactory =
    Arc<dyn Fn(&OperatorNode) -> Result<Box<dyn Layer>, ParseError> + Send + Sync>;

/// Operator type name to layer factory map.
#[derive(Clone, Default)]
pub struct LayerRegistry {
    factories: HashMap<String, LayerFactory>,
}

static BUILTIN: Lazy<Arc<LayerRegistry>> = Lazy::new(|| Arc::new(LayerRegistry::builtin()));

/// Shared registry preloaded with the built-in layers.
pub fn builtin_registry() -> Arc<LayerRegistry> {
    Arc::clone(&BUILTIN)
}

impl LayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with every built-in layer.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for (op_type, factory) in crate::ops::registry::ENTRIES.iter() {
            registry
                .factories
                .insert((*op_type).to_string(), Arc::clone(factory));
        }
        registry
    }

    pub fn register<F>(&mut self, op_type: &str, factory: F) -> Result<(), RegistryError>
    where
        F: Fn(&OperatorNode) -> Result<Box<dyn Layer>, ParseError> + Send + Sync + 'static,
    {
        if self.factories.contains_key(op_type) {
            return Err(RegistryError::Duplicate(op_type.to_string()));
        }
        self.factories
            .insert(op_type.to_string(), Arc::new(factory));
        Ok(())
    }

    /// Remove a factory, e.g. to swap a built-in layer for a custom one.
    pub fn unregister(&mut self, op_type: &str) -> Option<LayerFactory> {
        self.factories.remove(op_type)
    }

    pub fn contains(&self, op_type: &str) -> bool {
        self.factories.contains_key(op_type)
    }

    pub fn get(&self, op_type: &str) -> Option<&LayerFactory> {
        self.factories.get(op_type)
    }

    /// Registered type names, sorted.
    pub fn op_types(&self) -> Vec<&str> {
        let mut names = self.factories.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }

    pub(crate) fn create(
        &self,
        node: &OperatorNode,
    ) -> Option<Result<Box<dyn Layer>, ParseError>> {
        self.factories
            .get(node.op_type())
            .map(|factory| factory(node))
    }
}
