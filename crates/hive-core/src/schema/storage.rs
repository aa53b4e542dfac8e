//! Storage schema.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{ClientId, EmbeddingName, StorageName};

/// One record in a storage. The payload is untyped; the schema's
/// `create_index` extracts the text that gets embedded for search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageItem {
    /// Unique item id within the storage.
    pub id: String,
    /// Arbitrary JSON payload.
    pub data: Value,
}

impl StorageItem {
    /// Create an item.
    #[must_use]
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}

/// Observation hooks of a storage.
#[derive(Clone, Default)]
pub struct StorageCallbacks {
    /// The item set changed (upsert, remove, clear).
    pub on_update: Option<Arc<dyn Fn(&ClientId, &StorageName, &[StorageItem]) + Send + Sync>>,
    /// A similarity search ran.
    pub on_search: Option<Arc<dyn Fn(&ClientId, &StorageName, &str) + Send + Sync>>,
}

impl std::fmt::Debug for StorageCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageCallbacks")
            .field("on_update", &self.on_update.is_some())
            .field("on_search", &self.on_search.is_some())
            .finish()
    }
}

/// Declaration of an embedding-indexed item storage.
#[derive(Clone)]
pub struct StorageSchema {
    /// Unique registry name.
    pub storage_name: StorageName,
    /// Embedding back-end indexing this storage.
    pub embedding: EmbeddingName,
    /// Extracts the indexable text of an item.
    pub create_index: Arc<dyn Fn(&StorageItem) -> String + Send + Sync>,
    /// One swarm-wide instance instead of per-client instances.
    pub shared: bool,
    /// Write items through to the persistence adapter.
    pub persist: bool,
    /// Seed items for fresh instances.
    pub get_default_data: Option<Arc<dyn Fn() -> Vec<StorageItem> + Send + Sync>>,
    /// Observation hooks.
    pub callbacks: StorageCallbacks,
}

impl StorageSchema {
    /// Declare a storage.
    #[must_use]
    pub fn new(
        storage_name: impl Into<StorageName>,
        embedding: impl Into<EmbeddingName>,
        create_index: Arc<dyn Fn(&StorageItem) -> String + Send + Sync>,
    ) -> Self {
        Self {
            storage_name: storage_name.into(),
            embedding: embedding.into(),
            create_index,
            shared: false,
            persist: false,
            get_default_data: None,
            callbacks: StorageCallbacks::default(),
        }
    }

    /// Make the storage swarm-wide (builder-style).
    #[must_use]
    pub fn shared(mut self) -> Self {
        self.shared = true;
        self
    }

    /// Enable persistence write-through (builder-style).
    #[must_use]
    pub fn persisted(mut self) -> Self {
        self.persist = true;
        self
    }

    /// Set seed items (builder-style).
    #[must_use]
    pub fn with_default_data(
        mut self,
        get_default_data: Arc<dyn Fn() -> Vec<StorageItem> + Send + Sync>,
    ) -> Self {
        self.get_default_data = Some(get_default_data);
        self
    }

    /// Set observation hooks (builder-style).
    #[must_use]
    pub fn with_callbacks(mut self, callbacks: StorageCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }
}

impl std::fmt::Debug for StorageSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSchema")
            .field("storage_name", &self.storage_name)
            .field("embedding", &self.embedding)
            .field("shared", &self.shared)
            .field("persist", &self.persist)
            .finish_non_exhaustive()
    }
}
