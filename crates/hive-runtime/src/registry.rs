//! Schema registries.
//!
//! One [`SchemaRegistry`] per schema kind, all owned by [`Registries`].
//! Registration is additive and replace-by-name; referential checks happen
//! in the validation layer, not here.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use hive_core::errors::{Result, SchemaKind, SwarmError};
use hive_core::{
    AgentSchema, CompletionSchema, EmbeddingSchema, StateSchema, StorageSchema, SwarmSchema,
    ToolSchema,
};

/// Name-keyed registry of one schema kind.
pub struct SchemaRegistry<T> {
    kind: SchemaKind,
    items: DashMap<String, Arc<T>>,
}

impl<T> SchemaRegistry<T> {
    /// Create an empty registry for `kind`.
    #[must_use]
    pub fn new(kind: SchemaKind) -> Self {
        Self {
            kind,
            items: DashMap::new(),
        }
    }

    /// Register a schema. Replaces a previous schema of the same name.
    pub fn register(&self, name: &str, schema: T) {
        debug!(kind = %self.kind, name, "schema registered");
        let _ = self.items.insert(name.to_owned(), Arc::new(schema));
    }

    /// Look up a schema; errors with the caller's `source_label`.
    pub fn get(&self, name: &str, source_label: &str) -> Result<Arc<T>> {
        self.items
            .get(name)
            .map(|entry| entry.clone())
            .ok_or_else(|| SwarmError::SchemaNotFound {
                kind: self.kind,
                name: name.to_owned(),
                source_label: source_label.to_owned(),
            })
    }

    /// Look up a schema without an error context.
    #[must_use]
    pub fn try_get(&self, name: &str) -> Option<Arc<T>> {
        self.items.get(name).map(|entry| entry.clone())
    }

    /// Whether a schema with `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    /// All registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.items.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of registered schemas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// The full set of schema registries of one runtime container.
pub struct Registries {
    /// Agent schemas.
    pub agents: SchemaRegistry<AgentSchema>,
    /// Tool schemas.
    pub tools: SchemaRegistry<ToolSchema>,
    /// Swarm schemas.
    pub swarms: SchemaRegistry<SwarmSchema>,
    /// Completion back-ends.
    pub completions: SchemaRegistry<CompletionSchema>,
    /// Embedding back-ends.
    pub embeddings: SchemaRegistry<EmbeddingSchema>,
    /// Storage schemas.
    pub storages: SchemaRegistry<StorageSchema>,
    /// State schemas.
    pub states: SchemaRegistry<StateSchema>,
}

impl Registries {
    /// Create empty registries.
    #[must_use]
    pub fn new() -> Self {
        Self {
            agents: SchemaRegistry::new(SchemaKind::Agent),
            tools: SchemaRegistry::new(SchemaKind::Tool),
            swarms: SchemaRegistry::new(SchemaKind::Swarm),
            completions: SchemaRegistry::new(SchemaKind::Completion),
            embeddings: SchemaRegistry::new(SchemaKind::Embedding),
            storages: SchemaRegistry::new(SchemaKind::Storage),
            states: SchemaRegistry::new(SchemaKind::State),
        }
    }
}

impl Default for Registries {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
