//! Embedding-indexed item storage.
//!
//! Every item is embedded (via the schema's `create_index` text) when it
//! enters the store; `take` embeds the query and ranks by similarity.
//! Mutations serialize on the store's dispatch queue and write through to
//! the persistence adapter when the schema asks for it.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use hive_bus::EventBus;
use hive_core::embedding::Embedding;
use hive_core::errors::Result;
use hive_core::{
    ClientId, EventContext, EventSource, Embeddings, RuntimeConfig, StorageItem, StorageSchema,
    SwarmEvent,
};
use hive_persist::StoragePersistence;

/// Owner key of swarm-wide (shared) instances.
pub const SHARED_OWNER: &str = "shared";

struct IndexedItem {
    item: StorageItem,
    embedding: Embeddings,
}

/// Construction parameters of a [`ClientStorage`].
pub struct ClientStorageParams {
    /// Client the instance serves (for events; shared instances keep the
    /// client that first referenced them).
    pub client_id: ClientId,
    /// Persistence owner key: the client id, or [`SHARED_OWNER`].
    pub owner: String,
    /// The storage's schema.
    pub schema: Arc<StorageSchema>,
    /// Resolved embedding back-end.
    pub embedding: Arc<dyn Embedding>,
    /// Persistence adapter.
    pub persistence: Arc<dyn StoragePersistence>,
    /// Event bus.
    pub bus: EventBus,
    /// Shared runtime configuration.
    pub config: Arc<RwLock<RuntimeConfig>>,
}

/// One storage instance (per-client, or swarm-wide when shared).
pub struct ClientStorage {
    client_id: ClientId,
    owner: String,
    schema: Arc<StorageSchema>,
    embedding: Arc<dyn Embedding>,
    persistence: Arc<dyn StoragePersistence>,
    bus: EventBus,
    config: Arc<RwLock<RuntimeConfig>>,
    items: Mutex<Vec<IndexedItem>>,
}

impl ClientStorage {
    /// Build an instance, restoring persisted items or seeding defaults.
    pub async fn new(params: ClientStorageParams) -> Result<Self> {
        let storage = Self {
            client_id: params.client_id,
            owner: params.owner,
            schema: params.schema,
            embedding: params.embedding,
            persistence: params.persistence,
            bus: params.bus,
            config: params.config,
            items: Mutex::new(Vec::new()),
        };

        let initial = if storage.schema.persist {
            storage
                .persistence
                .load_items(&storage.schema.storage_name, &storage.owner)
                .await?
        } else {
            None
        };
        let initial = match initial {
            Some(items) => items,
            None => storage
                .schema
                .get_default_data
                .as_ref()
                .map(|f| f())
                .unwrap_or_default(),
        };

        {
            let mut items = storage.items.lock().await;
            for item in initial {
                let embedding = storage.embed_item(&item).await?;
                items.push(IndexedItem { item, embedding });
            }
        }
        debug!(
            storage_name = %storage.schema.storage_name,
            owner = %storage.owner,
            "storage instance created"
        );
        Ok(storage)
    }

    async fn embed_item(&self, item: &StorageItem) -> Result<Embeddings> {
        let text = (self.schema.create_index)(item);
        self.embedding.create_embedding(&text).await
    }

    async fn emit_event(&self, event_type: &str, input: serde_json::Value) {
        let event = SwarmEvent::now(EventSource::StorageBus, self.client_id.clone(), event_type)
            .with_input(input)
            .with_context(EventContext {
                storage_name: Some(self.schema.storage_name.clone()),
                ..EventContext::default()
            });
        self.bus.emit(&self.client_id, event).await;
    }

    async fn persist(&self, items: &[IndexedItem]) -> Result<()> {
        if self.schema.persist {
            let plain: Vec<StorageItem> = items.iter().map(|i| i.item.clone()).collect();
            self.persistence
                .save_items(&self.schema.storage_name, &self.owner, &plain)
                .await?;
        }
        Ok(())
    }

    fn fire_update(&self, items: &[IndexedItem]) {
        if let Some(on_update) = &self.schema.callbacks.on_update {
            let plain: Vec<StorageItem> = items.iter().map(|i| i.item.clone()).collect();
            on_update(&self.client_id, &self.schema.storage_name, &plain);
        }
    }

    /// Similarity search: embed `search`, rank all items, return up to
    /// `total` (default: the configured pool size) above the similarity
    /// floor.
    #[instrument(skip(self), fields(storage_name = %self.schema.storage_name))]
    pub async fn take(&self, search: &str, total: Option<usize>) -> Result<Vec<StorageItem>> {
        let (floor, pool) = {
            let config = self.config.read();
            (config.storage_search_similarity, config.storage_search_pool)
        };
        let limit = total.unwrap_or(pool);
        let query = self.embedding.create_embedding(search).await?;

        let items = self.items.lock().await;
        let mut scored: Vec<(f64, &IndexedItem)> = Vec::with_capacity(items.len());
        for indexed in items.iter() {
            let score = self
                .embedding
                .calculate_similarity(&query, &indexed.embedding)
                .await?;
            if score >= floor {
                scored.push((score, indexed));
            }
        }
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let result: Vec<StorageItem> = scored
            .into_iter()
            .take(limit)
            .map(|(_, indexed)| indexed.item.clone())
            .collect();

        if let Some(on_search) = &self.schema.callbacks.on_search {
            on_search(&self.client_id, &self.schema.storage_name, search);
        }
        self.emit_event("take", json!({ "search": search, "count": result.len() }))
            .await;
        Ok(result)
    }

    /// Insert or replace an item by id.
    pub async fn upsert(&self, item: StorageItem) -> Result<()> {
        let embedding = self.embed_item(&item).await?;
        let mut items = self.items.lock().await;
        match items.iter_mut().find(|i| i.item.id == item.id) {
            Some(existing) => *existing = IndexedItem { item, embedding },
            None => items.push(IndexedItem { item, embedding }),
        }
        self.persist(&items).await?;
        self.fire_update(&items);
        self.emit_event("upsert", json!({ "count": items.len() })).await;
        Ok(())
    }

    /// Remove an item by id. Unknown ids are logged and ignored.
    pub async fn remove(&self, item_id: &str) -> Result<()> {
        let mut items = self.items.lock().await;
        let before = items.len();
        items.retain(|i| i.item.id != item_id);
        if items.len() == before {
            warn!(
                storage_name = %self.schema.storage_name,
                item_id,
                "remove of unknown item"
            );
            return Ok(());
        }
        self.persist(&items).await?;
        self.fire_update(&items);
        self.emit_event("remove", json!({ "itemId": item_id })).await;
        Ok(())
    }

    /// Get an item by id.
    pub async fn get(&self, item_id: &str) -> Option<StorageItem> {
        self.items
            .lock()
            .await
            .iter()
            .find(|i| i.item.id == item_id)
            .map(|i| i.item.clone())
    }

    /// All items, in insertion order.
    pub async fn list(&self) -> Vec<StorageItem> {
        self.items.lock().await.iter().map(|i| i.item.clone()).collect()
    }

    /// Remove every item.
    pub async fn clear(&self) -> Result<()> {
        let mut items = self.items.lock().await;
        items.clear();
        self.persist(&items).await?;
        self.fire_update(&items);
        self.emit_event("clear", json!(null)).await;
        Ok(())
    }

    /// Tear the storage instance down.
    pub fn dispose(&self) {
        debug!(
            storage_name = %self.schema.storage_name,
            owner = %self.owner,
            "storage instance disposed"
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
