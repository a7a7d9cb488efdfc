//! TypeId and the type registry boundary.
//!
//! The graph never owns node types. It resolves a [`TypeId`] through a
//! [`TypeProvider`] exactly once, at node creation, and keeps the returned
//! `Arc<TypeDescriptor>` for the node's lifetime. [`TypeRegistry`] is the
//! table-backed provider used by embedders and tests.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::types::TypeDescriptor;

/// Identifier of a node type (e.g. `"noise"`, `"blend"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeId(pub String);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeId {
    fn from(s: &str) -> Self {
        TypeId(s.to_string())
    }
}

impl From<String> for TypeId {
    fn from(s: String) -> Self {
        TypeId(s)
    }
}

/// Source of node type descriptors.
pub trait TypeProvider: Send + Sync {
    /// Resolves a type, or `None` if the id is unknown.
    fn get_type(&self, id: &TypeId) -> Option<Arc<TypeDescriptor>>;
}

/// Table of registered node types.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<TypeId, Arc<TypeDescriptor>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    /// Registers a descriptor under its own id.
    ///
    /// Returns [`GraphError::DuplicateType`] if the id is already taken.
    pub fn register(&mut self, descriptor: TypeDescriptor) -> Result<(), GraphError> {
        if self.types.contains_key(&descriptor.id) {
            return Err(GraphError::DuplicateType {
                id: descriptor.id.clone(),
            });
        }
        self.types
            .insert(descriptor.id.clone(), Arc::new(descriptor));
        Ok(())
    }

    /// Looks up a type, failing with [`GraphError::UnknownType`].
    pub fn resolve(&self, id: &TypeId) -> Result<Arc<TypeDescriptor>, GraphError> {
        self.get_type(id)
            .ok_or_else(|| GraphError::UnknownType { id: id.clone() })
    }

    /// All registered descriptors, sorted by id.
    pub fn descriptors(&self) -> Vec<Arc<TypeDescriptor>> {
        let mut all: Vec<Arc<TypeDescriptor>> = self.types.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl TypeProvider for TypeRegistry {
    fn get_type(&self, id: &TypeId) -> Option<Arc<TypeDescriptor>> {
        self.types.get(id).cloned()
    }
}
