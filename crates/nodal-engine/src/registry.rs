//! Node definition registry and evaluation context.
//!
//! A [`NodeDefinition`] is the leaf the engine consumes: a declarative type
//! name plus one async `evaluate` operation. The catalog of concrete
//! definitions (primitives, booleans, importers, ...) lives outside this
//! crate; tests register their own.
//!
//! [`NodeRegistry`] is an explicit lookup table handed to the engine at
//! construction -- there is no process-wide singleton, so isolated test
//! instances and multiple concurrent graphs in one process are routine.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use nodal_core::{Units, ValueMap};

use crate::backend::ComputeBackend;
use crate::cancel::CancelToken;
use crate::error::EvalError;

/// Context handed to every node evaluation.
///
/// Cheap to clone: the backend is shared and the cancel token is a handle
/// onto the run's flag.
#[derive(Clone)]
pub struct EvalContext {
    /// Length unit of the model being evaluated.
    pub units: Units,
    /// Modeling tolerance of the model being evaluated.
    pub tolerance: f64,
    backend: Arc<dyn ComputeBackend>,
    cancel: CancelToken,
}

impl EvalContext {
    pub fn new(
        units: Units,
        tolerance: f64,
        backend: Arc<dyn ComputeBackend>,
        cancel: CancelToken,
    ) -> Self {
        EvalContext {
            units,
            tolerance,
            backend,
            cancel,
        }
    }

    /// The compute backend for geometry operations.
    pub fn backend(&self) -> &Arc<dyn ComputeBackend> {
        &self.backend
    }

    /// The run's cancellation token. Long evaluations should poll this and
    /// return [`EvalError::Cancelled`] when it trips.
    pub fn cancel(&self) -> &CancelToken {
        &self.cancel
    }
}

/// One node type: a registry key plus its evaluation function.
///
/// `evaluate` must be a pure function of `(inputs, params)` -- no hidden
/// state -- or the cache-correctness invariant breaks: a cache hit is assumed
/// to equal a fresh evaluation.
#[async_trait]
pub trait NodeDefinition: Send + Sync {
    /// The registry key, e.g. `"Solid::Box"`.
    fn type_name(&self) -> &str;

    /// Computes output socket values from resolved inputs and parameters.
    async fn evaluate(
        &self,
        ctx: &EvalContext,
        inputs: &ValueMap,
        params: &ValueMap,
    ) -> Result<ValueMap, EvalError>;
}

/// Lookup table from type name to node definition.
#[derive(Default)]
pub struct NodeRegistry {
    definitions: HashMap<String, Arc<dyn NodeDefinition>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition under its own type name, replacing any
    /// previous registration for that name.
    pub fn register(&mut self, definition: Arc<dyn NodeDefinition>) {
        tracing::debug!(type_name = definition.type_name(), "registered node type");
        self.definitions
            .insert(definition.type_name().to_string(), definition);
    }

    /// Looks up a definition by type name.
    pub fn get(&self, type_name: &str) -> Option<Arc<dyn NodeDefinition>> {
        self.definitions.get(type_name).cloned()
    }

    /// Number of registered definitions.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;
    use nodal_core::Value;

    struct Doubler;

    #[async_trait]
    impl NodeDefinition for Doubler {
        fn type_name(&self) -> &str {
            "Math::Double"
        }

        async fn evaluate(
            &self,
            _ctx: &EvalContext,
            inputs: &ValueMap,
            _params: &ValueMap,
        ) -> Result<ValueMap, EvalError> {
            let x = inputs
                .get("x")
                .ok_or_else(|| EvalError::MissingInput { socket: "x".into() })?
                .as_int()
                .map_err(|e| EvalError::InvalidValue {
                    name: "x".into(),
                    reason: e.to_string(),
                })?;
            let mut outputs = ValueMap::new();
            outputs.insert("result".into(), Value::Int(x * 2));
            Ok(outputs)
        }
    }

    fn test_ctx() -> EvalContext {
        EvalContext::new(
            Units::Millimeters,
            1e-6,
            Arc::new(NullBackend),
            CancelToken::new(),
        )
    }

    #[test]
    fn register_and_get() {
        let mut registry = NodeRegistry::new();
        assert!(registry.is_empty());

        registry.register(Arc::new(Doubler));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("Math::Double").is_some());
        assert!(registry.get("Math::Triple").is_none());
    }

    #[tokio::test]
    async fn definition_evaluates() {
        let mut registry = NodeRegistry::new();
        registry.register(Arc::new(Doubler));

        let def = registry.get("Math::Double").unwrap();
        let mut inputs = ValueMap::new();
        inputs.insert("x".into(), Value::Int(21));

        let outputs = def
            .evaluate(&test_ctx(), &inputs, &ValueMap::new())
            .await
            .unwrap();
        assert_eq!(outputs["result"], Value::Int(42));
    }

    #[tokio::test]
    async fn missing_input_is_a_node_error() {
        let def: Arc<dyn NodeDefinition> = Arc::new(Doubler);
        let err = def
            .evaluate(&test_ctx(), &ValueMap::new(), &ValueMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::MissingInput { .. }));
    }
}
