//! Persistence adapters for runtime resources.
//!
//! The swarm controller, state cells, and storages persist through these
//! traits so deployments can swap the medium. Two implementations ship:
//! the default filesystem layout under `logs/data/`, and an in-memory
//! variant for tests and ephemeral runtimes.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use hive_core::errors::Result;
use hive_core::{AgentName, ClientId, StateName, StorageItem, StorageName, SwarmName};

use crate::base::PersistBase;

// ─────────────────────────────────────────────────────────────────────────────
// Traits
// ─────────────────────────────────────────────────────────────────────────────

/// Persists the active agent and navigation stack per (swarm, client).
#[async_trait]
pub trait SwarmPersistence: Send + Sync {
    /// Load the persisted active agent, if any.
    async fn load_active_agent(
        &self,
        swarm_name: &SwarmName,
        client_id: &ClientId,
    ) -> Result<Option<AgentName>>;

    /// Persist the active agent.
    async fn save_active_agent(
        &self,
        swarm_name: &SwarmName,
        client_id: &ClientId,
        agent_name: &AgentName,
    ) -> Result<()>;

    /// Load the persisted navigation stack (empty when absent).
    async fn load_navigation_stack(
        &self,
        swarm_name: &SwarmName,
        client_id: &ClientId,
    ) -> Result<Vec<AgentName>>;

    /// Persist the navigation stack.
    async fn save_navigation_stack(
        &self,
        swarm_name: &SwarmName,
        client_id: &ClientId,
        stack: &[AgentName],
    ) -> Result<()>;
}

/// Persists state values per (state, owner). The owner is the client id,
/// or `"shared"` for swarm-wide instances.
#[async_trait]
pub trait StatePersistence: Send + Sync {
    /// Load a persisted value, if any.
    async fn load_state(&self, state_name: &StateName, owner: &str) -> Result<Option<Value>>;

    /// Persist a value.
    async fn save_state(&self, state_name: &StateName, owner: &str, value: &Value) -> Result<()>;
}

/// Persists storage items per (storage, owner).
#[async_trait]
pub trait StoragePersistence: Send + Sync {
    /// Load persisted items, if any were ever saved.
    async fn load_items(
        &self,
        storage_name: &StorageName,
        owner: &str,
    ) -> Result<Option<Vec<StorageItem>>>;

    /// Persist the full item set.
    async fn save_items(
        &self,
        storage_name: &StorageName,
        owner: &str,
        items: &[StorageItem],
    ) -> Result<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire records
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActiveAgentRecord {
    agent_name: AgentName,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NavigationStackRecord {
    agent_stack: Vec<AgentName>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StateRecord {
    state: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct StorageRecord {
    data: Vec<StorageItem>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Filesystem implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Default filesystem adapter.
///
/// Layout under the root (default `./logs/data`):
///
/// ```text
/// _swarm_active_agent/<swarmName>/<clientId>.json     {"agentName": …}
/// _swarm_navigation_stack/<swarmName>/<clientId>.json {"agentStack": […]}
/// state/<stateName>/<clientId>.json                   {"state": …}
/// storage/<storageName>/<clientId>.json               {"data": […]}
/// ```
#[derive(Clone, Debug)]
pub struct FsPersistence {
    root: PathBuf,
}

impl FsPersistence {
    /// Default persistence root.
    pub const DEFAULT_ROOT: &'static str = "./logs/data";

    /// Create an adapter rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn store(&self, kind: &str, name: &str) -> PersistBase {
        PersistBase::new(self.root.join(kind).join(name))
    }
}

impl Default for FsPersistence {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ROOT)
    }
}

#[async_trait]
impl SwarmPersistence for FsPersistence {
    async fn load_active_agent(
        &self,
        swarm_name: &SwarmName,
        client_id: &ClientId,
    ) -> Result<Option<AgentName>> {
        let store = self.store("_swarm_active_agent", swarm_name.as_str());
        store.init()?;
        Ok(store
            .read_value::<ActiveAgentRecord>(client_id.as_str())?
            .map(|r| r.agent_name))
    }

    async fn save_active_agent(
        &self,
        swarm_name: &SwarmName,
        client_id: &ClientId,
        agent_name: &AgentName,
    ) -> Result<()> {
        self.store("_swarm_active_agent", swarm_name.as_str()).write_value(
            client_id.as_str(),
            &ActiveAgentRecord {
                agent_name: agent_name.clone(),
            },
        )
    }

    async fn load_navigation_stack(
        &self,
        swarm_name: &SwarmName,
        client_id: &ClientId,
    ) -> Result<Vec<AgentName>> {
        let store = self.store("_swarm_navigation_stack", swarm_name.as_str());
        store.init()?;
        Ok(store
            .read_value::<NavigationStackRecord>(client_id.as_str())?
            .map(|r| r.agent_stack)
            .unwrap_or_default())
    }

    async fn save_navigation_stack(
        &self,
        swarm_name: &SwarmName,
        client_id: &ClientId,
        stack: &[AgentName],
    ) -> Result<()> {
        self.store("_swarm_navigation_stack", swarm_name.as_str()).write_value(
            client_id.as_str(),
            &NavigationStackRecord {
                agent_stack: stack.to_vec(),
            },
        )
    }
}

#[async_trait]
impl StatePersistence for FsPersistence {
    async fn load_state(&self, state_name: &StateName, owner: &str) -> Result<Option<Value>> {
        let store = self.store("state", state_name.as_str());
        store.init()?;
        Ok(store.read_value::<StateRecord>(owner)?.map(|r| r.state))
    }

    async fn save_state(&self, state_name: &StateName, owner: &str, value: &Value) -> Result<()> {
        self.store("state", state_name.as_str())
            .write_value(owner, &StateRecord { state: value.clone() })
    }
}

#[async_trait]
impl StoragePersistence for FsPersistence {
    async fn load_items(
        &self,
        storage_name: &StorageName,
        owner: &str,
    ) -> Result<Option<Vec<StorageItem>>> {
        let store = self.store("storage", storage_name.as_str());
        store.init()?;
        Ok(store.read_value::<StorageRecord>(owner)?.map(|r| r.data))
    }

    async fn save_items(
        &self,
        storage_name: &StorageName,
        owner: &str,
        items: &[StorageItem],
    ) -> Result<()> {
        self.store("storage", storage_name.as_str()).write_value(
            owner,
            &StorageRecord {
                data: items.to_vec(),
            },
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory implementation
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory adapter for tests and ephemeral runtimes.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    active_agents: Mutex<HashMap<(SwarmName, ClientId), AgentName>>,
    stacks: Mutex<HashMap<(SwarmName, ClientId), Vec<AgentName>>>,
    states: Mutex<HashMap<(StateName, String), Value>>,
    storages: Mutex<HashMap<(StorageName, String), Vec<StorageItem>>>,
}

impl MemoryPersistence {
    /// Create an empty adapter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SwarmPersistence for MemoryPersistence {
    async fn load_active_agent(
        &self,
        swarm_name: &SwarmName,
        client_id: &ClientId,
    ) -> Result<Option<AgentName>> {
        Ok(self
            .active_agents
            .lock()
            .get(&(swarm_name.clone(), client_id.clone()))
            .cloned())
    }

    async fn save_active_agent(
        &self,
        swarm_name: &SwarmName,
        client_id: &ClientId,
        agent_name: &AgentName,
    ) -> Result<()> {
        let _ = self
            .active_agents
            .lock()
            .insert((swarm_name.clone(), client_id.clone()), agent_name.clone());
        Ok(())
    }

    async fn load_navigation_stack(
        &self,
        swarm_name: &SwarmName,
        client_id: &ClientId,
    ) -> Result<Vec<AgentName>> {
        Ok(self
            .stacks
            .lock()
            .get(&(swarm_name.clone(), client_id.clone()))
            .cloned()
            .unwrap_or_default())
    }

    async fn save_navigation_stack(
        &self,
        swarm_name: &SwarmName,
        client_id: &ClientId,
        stack: &[AgentName],
    ) -> Result<()> {
        let _ = self
            .stacks
            .lock()
            .insert((swarm_name.clone(), client_id.clone()), stack.to_vec());
        Ok(())
    }
}

#[async_trait]
impl StatePersistence for MemoryPersistence {
    async fn load_state(&self, state_name: &StateName, owner: &str) -> Result<Option<Value>> {
        Ok(self
            .states
            .lock()
            .get(&(state_name.clone(), owner.to_owned()))
            .cloned())
    }

    async fn save_state(&self, state_name: &StateName, owner: &str, value: &Value) -> Result<()> {
        let _ = self
            .states
            .lock()
            .insert((state_name.clone(), owner.to_owned()), value.clone());
        Ok(())
    }
}

#[async_trait]
impl StoragePersistence for MemoryPersistence {
    async fn load_items(
        &self,
        storage_name: &StorageName,
        owner: &str,
    ) -> Result<Option<Vec<StorageItem>>> {
        Ok(self
            .storages
            .lock()
            .get(&(storage_name.clone(), owner.to_owned()))
            .cloned())
    }

    async fn save_items(
        &self,
        storage_name: &StorageName,
        owner: &str,
        items: &[StorageItem],
    ) -> Result<()> {
        let _ = self
            .storages
            .lock()
            .insert((storage_name.clone(), owner.to_owned()), items.to_vec());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
