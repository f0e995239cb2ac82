//! Registry of named leaf evaluators.
//!
//! The engine never resolves kinds by name while compiling; the registry is
//! the seam for whatever turns a textual configuration into a [`NodeDef`]
//! tree. It maps kind names to already compiled leaves and hands them out as
//! authoring nodes.
//!
//! # Usage Example
//!
//! ```rust
//! use rulemix::engine::evaluator::{Predicate, Transform};
//! use rulemix::engine::node::NodeDef;
//! use rulemix::engine::registry::EvaluatorRegistry;
//!
//! let registry = EvaluatorRegistry::new()
//!     .register_predicate("positive", Predicate::sync_fn(|v| Ok(v.as_f64().unwrap_or(0.0) > 0.0)))
//!     .register_transform("negate", Transform::sync_fn(|v| Ok((-v.as_f64().unwrap_or(0.0)).into())));
//!
//! let processor = NodeDef::decision(
//!     Some(registry.predicate("positive")?),
//!     vec![],
//!     Some(registry.transform("negate")?),
//! );
//! assert!(registry.supports_transform("negate"));
//! # Ok::<(), rulemix::errors::BuildError>(())
//! ```

use std::collections::HashMap;

use super::evaluator::{Predicate, Processor, Transform};
use super::node::{Family, NodeDef};
use crate::errors::BuildError;

/// Leaf evaluators by kind name, one namespace per family.
///
/// Registered evaluators are shared: every node handed out for a name holds
/// the same compiled evaluator.
#[derive(Default)]
pub struct EvaluatorRegistry {
    predicates: HashMap<String, Predicate>,
    transforms: HashMap<String, Transform>,
    processors: HashMap<String, Processor>,
}

impl EvaluatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a predicate under `kind`, replacing any previous one.
    pub fn register_predicate(mut self, kind: &str, predicate: Predicate) -> Self {
        self.predicates.insert(kind.to_string(), predicate);
        self
    }

    pub fn register_transform(mut self, kind: &str, transform: Transform) -> Self {
        self.transforms.insert(kind.to_string(), transform);
        self
    }

    pub fn register_processor(mut self, kind: &str, processor: Processor) -> Self {
        self.processors.insert(kind.to_string(), processor);
        self
    }

    pub fn predicate(&self, kind: &str) -> Result<NodeDef, BuildError> {
        self.predicates
            .get(kind)
            .map(|predicate| NodeDef::predicate(predicate.clone()))
            .ok_or_else(|| unknown(Family::Predicate, kind))
    }

    pub fn transform(&self, kind: &str) -> Result<NodeDef, BuildError> {
        self.transforms
            .get(kind)
            .map(|transform| NodeDef::transform(transform.clone()))
            .ok_or_else(|| unknown(Family::Transform, kind))
    }

    pub fn processor(&self, kind: &str) -> Result<NodeDef, BuildError> {
        self.processors
            .get(kind)
            .map(|processor| NodeDef::processor(processor.clone()))
            .ok_or_else(|| unknown(Family::Processor, kind))
    }

    pub fn supports_predicate(&self, kind: &str) -> bool {
        self.predicates.contains_key(kind)
    }

    pub fn supports_transform(&self, kind: &str) -> bool {
        self.transforms.contains_key(kind)
    }

    pub fn supports_processor(&self, kind: &str) -> bool {
        self.processors.contains_key(kind)
    }
}

fn unknown(family: Family, kind: &str) -> BuildError {
    BuildError::UnknownKind {
        family: family.name(),
        kind: kind.to_string(),
    }
}
