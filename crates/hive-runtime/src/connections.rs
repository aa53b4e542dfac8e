//! Memoized instance caches.
//!
//! Connection services build runtime instances once per key and hand the
//! same `Arc` to every caller until the key is evicted. Keys compose the
//! client id with the resource name (`"{clientId}:{name}"`); eviction is
//! how disposal tears a client down.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use hive_core::errors::Result;

/// Compose a memo key from a client id and resource name.
#[must_use]
pub fn memo_key(client_id: &str, name: &str) -> String {
    format!("{client_id}:{name}")
}

/// A name-keyed build-once cache of `Arc<T>` instances.
///
/// The factory runs under the cache lock, so two racing callers of the
/// same key observe one construction and share its instance.
pub struct Memo<T> {
    label: &'static str,
    items: Mutex<HashMap<String, Arc<T>>>,
}

impl<T> Memo<T> {
    /// Create an empty cache.
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            items: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached instance for `key`, building it if absent.
    pub async fn get_or_try_create<F, Fut>(&self, key: &str, factory: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<T>>>,
    {
        let mut items = self.items.lock().await;
        if let Some(existing) = items.get(key) {
            return Ok(existing.clone());
        }
        let built = factory().await?;
        debug!(cache = self.label, key, "instance memoized");
        let _ = items.insert(key.to_owned(), built.clone());
        Ok(built)
    }

    /// The cached instance for `key`, if any.
    pub async fn get(&self, key: &str) -> Option<Arc<T>> {
        self.items.lock().await.get(key).cloned()
    }

    /// Evict `key`, returning the instance that was cached.
    pub async fn clear(&self, key: &str) -> Option<Arc<T>> {
        let removed = self.items.lock().await.remove(key);
        if removed.is_some() {
            debug!(cache = self.label, key, "instance evicted");
        }
        removed
    }

    /// Evict every key starting with `prefix`, returning the instances.
    pub async fn clear_prefix(&self, prefix: &str) -> Vec<Arc<T>> {
        let mut items = self.items.lock().await;
        let keys: Vec<String> = items
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        let mut removed = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(instance) = items.remove(&key) {
                debug!(cache = self.label, key = %key, "instance evicted");
                removed.push(instance);
            }
        }
        removed
    }

    /// Number of cached instances.
    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
