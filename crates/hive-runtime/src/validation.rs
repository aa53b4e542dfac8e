//! Cross-reference validation.
//!
//! [`SchemaValidation`] answers "is X registered and internally consistent"
//! over the registries, failing fast with the caller's source label.
//! [`SessionValidation`] tracks the live sessions: which swarm a client is
//! bound to, the session mode, and which agents/histories/storages/states
//! the session has touched.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use hive_core::errors::{Result, SchemaKind, SwarmError};
use hive_core::{AgentName, ClientId, StateName, StorageName, SwarmName};

use crate::registry::Registries;

// ─────────────────────────────────────────────────────────────────────────────
// Schema validation
// ─────────────────────────────────────────────────────────────────────────────

/// Validates registered entities against each other.
pub struct SchemaValidation {
    registries: Arc<Registries>,
}

impl SchemaValidation {
    /// Create a validator over `registries`.
    #[must_use]
    pub fn new(registries: Arc<Registries>) -> Self {
        Self { registries }
    }

    /// Validate a completion back-end.
    pub fn validate_completion(&self, name: &str, source_label: &str) -> Result<()> {
        let _ = self.registries.completions.get(name, source_label)?;
        Ok(())
    }

    /// Validate an embedding back-end.
    pub fn validate_embedding(&self, name: &str, source_label: &str) -> Result<()> {
        let _ = self.registries.embeddings.get(name, source_label)?;
        Ok(())
    }

    /// Validate a tool.
    pub fn validate_tool(&self, name: &str, source_label: &str) -> Result<()> {
        let _ = self.registries.tools.get(name, source_label)?;
        Ok(())
    }

    /// Validate a storage: registered, and its embedding registered.
    pub fn validate_storage(&self, name: &str, source_label: &str) -> Result<()> {
        let schema = self.registries.storages.get(name, source_label)?;
        self.validate_embedding(
            schema.embedding.as_str(),
            &format!("storage {name}"),
        )
    }

    /// Validate a state.
    pub fn validate_state(&self, name: &str, source_label: &str) -> Result<()> {
        let _ = self.registries.states.get(name, source_label)?;
        Ok(())
    }

    /// Validate an agent: registered, and its completion, tools, storages,
    /// states, and dependencies all validate.
    pub fn validate_agent(&self, name: &str, source_label: &str) -> Result<()> {
        let schema = self.registries.agents.get(name, source_label)?;
        let label = format!("agent {name}");

        self.validate_completion(schema.completion.as_str(), &label)?;
        for tool in &schema.tools {
            self.validate_tool(tool.as_str(), &label)?;
        }
        for storage in &schema.storages {
            self.validate_storage(storage.as_str(), &label)?;
        }
        for state in &schema.states {
            self.validate_state(state.as_str(), &label)?;
        }
        for dependency in &schema.depends_on {
            if !self.registries.agents.contains(dependency.as_str()) {
                return Err(SwarmError::SchemaNotFound {
                    kind: SchemaKind::Agent,
                    name: dependency.as_str().to_owned(),
                    source_label: label,
                });
            }
        }
        Ok(())
    }

    /// Validate a swarm: registered, default agent is a member, and every
    /// member agent validates.
    pub fn validate_swarm(&self, name: &str, source_label: &str) -> Result<()> {
        let schema = self.registries.swarms.get(name, source_label)?;
        if !schema.contains(&schema.default_agent) {
            return Err(SwarmError::Validation {
                kind: SchemaKind::Swarm,
                name: name.to_owned(),
                message: format!(
                    "default agent {} is not in the agent list",
                    schema.default_agent
                ),
                source_label: source_label.to_owned(),
            });
        }
        let label = format!("swarm {name}");
        for agent in &schema.agent_list {
            self.validate_agent(agent.as_str(), &label)?;
        }
        Ok(())
    }

    /// Check that `agent_name` is a member of `swarm_name`.
    pub fn validate_agent_in_swarm(
        &self,
        agent_name: &AgentName,
        swarm_name: &SwarmName,
        source_label: &str,
    ) -> Result<()> {
        let schema = self.registries.swarms.get(swarm_name.as_str(), source_label)?;
        if schema.contains(agent_name) {
            Ok(())
        } else {
            Err(SwarmError::AgentNotInSwarm {
                agent_name: agent_name.clone(),
                swarm_name: swarm_name.clone(),
            })
        }
    }

    /// Check that `agent_name` declares `storage_name`.
    pub fn validate_agent_storage(
        &self,
        agent_name: &AgentName,
        storage_name: &StorageName,
        source_label: &str,
    ) -> Result<()> {
        let schema = self.registries.agents.get(agent_name.as_str(), source_label)?;
        if schema.storages.contains(storage_name) {
            Ok(())
        } else {
            Err(SwarmError::Validation {
                kind: SchemaKind::Storage,
                name: storage_name.as_str().to_owned(),
                message: format!("not declared by agent {agent_name}"),
                source_label: source_label.to_owned(),
            })
        }
    }

    /// Check that `agent_name` declares `state_name`.
    pub fn validate_agent_state(
        &self,
        agent_name: &AgentName,
        state_name: &StateName,
        source_label: &str,
    ) -> Result<()> {
        let schema = self.registries.agents.get(agent_name.as_str(), source_label)?;
        if schema.states.contains(state_name) {
            Ok(())
        } else {
            Err(SwarmError::Validation {
                kind: SchemaKind::State,
                name: state_name.as_str().to_owned(),
                message: format!("not declared by agent {agent_name}"),
                source_label: source_label.to_owned(),
            })
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session validation
// ─────────────────────────────────────────────────────────────────────────────

/// How a session was established.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// `session()` handle.
    Session,
    /// `make_connection()` connector.
    Connection,
    /// One-shot `complete()`.
    Complete,
    /// Scheduled (delay-batched) variant.
    Scheduled,
}

/// Live-session bookkeeping for one client.
#[derive(Clone, Debug)]
pub struct SessionRecord {
    /// Swarm the session is bound to.
    pub swarm_name: SwarmName,
    /// How the session was established.
    pub session_mode: SessionMode,
    /// Multiset of agent instances referenced.
    pub agents_used: HashMap<AgentName, usize>,
    /// Multiset of history instances referenced.
    pub histories_used: HashMap<AgentName, usize>,
    /// Storages touched.
    pub storages_used: HashSet<StorageName>,
    /// States touched.
    pub states_used: HashSet<StateName>,
}

/// Tracks live sessions per client.
#[derive(Default)]
pub struct SessionValidation {
    sessions: DashMap<ClientId, SessionRecord>,
}

impl SessionValidation {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new session binding.
    pub fn add_session(
        &self,
        client_id: ClientId,
        swarm_name: SwarmName,
        session_mode: SessionMode,
    ) {
        let _ = self.sessions.insert(
            client_id,
            SessionRecord {
                swarm_name,
                session_mode,
                agents_used: HashMap::new(),
                histories_used: HashMap::new(),
                storages_used: HashSet::new(),
                states_used: HashSet::new(),
            },
        );
    }

    /// Remove a session binding and return its record.
    pub fn remove_session(&self, client_id: &ClientId) -> Option<SessionRecord> {
        self.sessions.remove(client_id).map(|(_, record)| record)
    }

    /// Whether a client has a live session.
    #[must_use]
    pub fn has_session(&self, client_id: &ClientId) -> bool {
        self.sessions.contains_key(client_id)
    }

    /// Fail-fast session lookup.
    pub fn validate(&self, client_id: &ClientId, source_label: &str) -> Result<()> {
        if self.has_session(client_id) {
            Ok(())
        } else {
            Err(SwarmError::SessionNotFound {
                client_id: client_id.clone(),
                source_label: source_label.to_owned(),
            })
        }
    }

    /// Swarm the client's session is bound to.
    pub fn swarm_name(&self, client_id: &ClientId, source_label: &str) -> Result<SwarmName> {
        self.sessions
            .get(client_id)
            .map(|record| record.swarm_name.clone())
            .ok_or_else(|| SwarmError::SessionNotFound {
                client_id: client_id.clone(),
                source_label: source_label.to_owned(),
            })
    }

    /// Mode of the client's session.
    pub fn session_mode(&self, client_id: &ClientId, source_label: &str) -> Result<SessionMode> {
        self.sessions
            .get(client_id)
            .map(|record| record.session_mode)
            .ok_or_else(|| SwarmError::SessionNotFound {
                client_id: client_id.clone(),
                source_label: source_label.to_owned(),
            })
    }

    /// Record that the session referenced an agent instance.
    pub fn mark_agent_usage(&self, client_id: &ClientId, agent_name: &AgentName) {
        if let Some(mut record) = self.sessions.get_mut(client_id) {
            *record.agents_used.entry(agent_name.clone()).or_insert(0) += 1;
        }
    }

    /// Record that the session referenced a history instance.
    pub fn mark_history_usage(&self, client_id: &ClientId, agent_name: &AgentName) {
        if let Some(mut record) = self.sessions.get_mut(client_id) {
            *record.histories_used.entry(agent_name.clone()).or_insert(0) += 1;
        }
    }

    /// Record that the session touched a storage.
    pub fn mark_storage_usage(&self, client_id: &ClientId, storage_name: &StorageName) {
        if let Some(mut record) = self.sessions.get_mut(client_id) {
            let _ = record.storages_used.insert(storage_name.clone());
        }
    }

    /// Record that the session touched a state.
    pub fn mark_state_usage(&self, client_id: &ClientId, state_name: &StateName) {
        if let Some(mut record) = self.sessions.get_mut(client_id) {
            let _ = record.states_used.insert(state_name.clone());
        }
    }

    /// Snapshot of the client's session record.
    #[must_use]
    pub fn record(&self, client_id: &ClientId) -> Option<SessionRecord> {
        self.sessions.get(client_id).map(|r| r.clone())
    }

    /// Number of live sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
