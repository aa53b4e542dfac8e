//! The runtime container.
//!
//! [`SwarmRuntime`] owns the registries, validators, connection caches,
//! bus, persistence adapters, and configuration — the single container the
//! public facade delegates to. It also implements the [`ToolSurface`]
//! capability handle (through a weak back-reference, so tools never create
//! ownership cycles).

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, instrument};

use hive_bus::EventBus;
use hive_core::errors::{Result, SwarmError};
use hive_core::tool::{ToolSchema, ToolSurface};
use hive_core::{
    AgentName, ClientId, ExecutionMode, RuntimeConfig, StateName, StorageName, SwarmName,
    ToolCallId,
};
use hive_persist::{FsPersistence, MemoryPersistence, StatePersistence, StoragePersistence,
    SwarmPersistence};

use crate::agent::{ClientAgent, ClientAgentParams};
use crate::connections::{memo_key, Memo};
use crate::history::MessageHistory;
use crate::registry::Registries;
use crate::session::ClientSession;
use crate::state::{ClientState, ClientStateParams};
use crate::storage::{ClientStorage, ClientStorageParams, SHARED_OWNER};
use crate::swarm::{ClientSwarm, ClientSwarmParams};
use crate::validation::{SchemaValidation, SessionMode, SessionValidation};

struct RuntimeInner {
    registries: Arc<Registries>,
    schema_validation: SchemaValidation,
    session_validation: SessionValidation,
    bus: EventBus,
    config: Arc<RwLock<RuntimeConfig>>,
    swarm_persistence: Arc<dyn SwarmPersistence>,
    state_persistence: Arc<dyn StatePersistence>,
    storage_persistence: Arc<dyn StoragePersistence>,
    agents: Memo<ClientAgent>,
    histories: Memo<MessageHistory>,
    swarms: Memo<ClientSwarm>,
    sessions: Memo<ClientSession>,
    storages: Memo<ClientStorage>,
    states: Memo<ClientState>,
}

/// The execution core container. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SwarmRuntime {
    inner: Arc<RuntimeInner>,
}

impl SwarmRuntime {
    /// Create a runtime with explicit persistence adapters.
    #[must_use]
    pub fn with_adapters(
        swarm_persistence: Arc<dyn SwarmPersistence>,
        state_persistence: Arc<dyn StatePersistence>,
        storage_persistence: Arc<dyn StoragePersistence>,
    ) -> Self {
        let registries = Arc::new(Registries::new());
        Self {
            inner: Arc::new(RuntimeInner {
                schema_validation: SchemaValidation::new(registries.clone()),
                session_validation: SessionValidation::new(),
                registries,
                bus: EventBus::new(),
                config: Arc::new(RwLock::new(RuntimeConfig::default())),
                swarm_persistence,
                state_persistence,
                storage_persistence,
                agents: Memo::new("agents"),
                histories: Memo::new("histories"),
                swarms: Memo::new("swarms"),
                sessions: Memo::new("sessions"),
                storages: Memo::new("storages"),
                states: Memo::new("states"),
            }),
        }
    }

    /// Create a runtime persisting to the default filesystem layout.
    #[must_use]
    pub fn new() -> Self {
        let fs = Arc::new(FsPersistence::default());
        Self::with_adapters(fs.clone(), fs.clone(), fs)
    }

    /// Create a runtime with in-memory persistence (tests, ephemeral use).
    #[must_use]
    pub fn in_memory() -> Self {
        let memory = Arc::new(MemoryPersistence::new());
        Self::with_adapters(memory.clone(), memory.clone(), memory)
    }

    // ── Accessors ───────────────────────────────────────────────────────

    /// The schema registries.
    #[must_use]
    pub fn registries(&self) -> &Arc<Registries> {
        &self.inner.registries
    }

    /// The cross-reference validator.
    #[must_use]
    pub fn schema_validation(&self) -> &SchemaValidation {
        &self.inner.schema_validation
    }

    /// The live-session tracker.
    #[must_use]
    pub fn session_validation(&self) -> &SessionValidation {
        &self.inner.session_validation
    }

    /// The event bus.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// The shared configuration.
    #[must_use]
    pub fn config(&self) -> &Arc<RwLock<RuntimeConfig>> {
        &self.inner.config
    }

    /// Mutate the configuration in place.
    pub fn update_config(&self, apply: impl FnOnce(&mut RuntimeConfig)) {
        apply(&mut self.inner.config.write());
    }

    // ── Connection services ─────────────────────────────────────────────

    /// Build-once history for `(client_id, agent_name)`.
    pub async fn get_history(
        &self,
        client_id: &ClientId,
        agent_name: &AgentName,
    ) -> Result<Arc<MessageHistory>> {
        let key = memo_key(client_id.as_str(), agent_name.as_str());
        let history = self
            .inner
            .histories
            .get_or_try_create(&key, || async {
                let schema = self
                    .inner
                    .registries
                    .agents
                    .get(agent_name.as_str(), "history connection")?;
                Ok(Arc::new(MessageHistory::new(
                    client_id.clone(),
                    agent_name.clone(),
                    self.inner.bus.clone(),
                    schema.callbacks.clone(),
                )))
            })
            .await?;
        self.inner
            .session_validation
            .mark_history_usage(client_id, agent_name);
        Ok(history)
    }

    /// Build-once turn engine for `(client_id, agent_name)`.
    pub async fn get_agent(
        &self,
        client_id: &ClientId,
        agent_name: &AgentName,
    ) -> Result<Arc<ClientAgent>> {
        let key = memo_key(client_id.as_str(), agent_name.as_str());
        let agent = self
            .inner
            .agents
            .get_or_try_create(&key, || async {
                self.inner
                    .schema_validation
                    .validate_agent(agent_name.as_str(), "agent connection")?;
                let schema = self
                    .inner
                    .registries
                    .agents
                    .get(agent_name.as_str(), "agent connection")?;
                let completion = self
                    .inner
                    .registries
                    .completions
                    .get(schema.completion.as_str(), &format!("agent {agent_name}"))?
                    .completion
                    .clone();
                let mut tools: Vec<ToolSchema> = Vec::with_capacity(schema.tools.len());
                for tool_name in &schema.tools {
                    let tool = self
                        .inner
                        .registries
                        .tools
                        .get(tool_name.as_str(), &format!("agent {agent_name}"))?;
                    tools.push((*tool).clone());
                }
                let history = self.get_history(client_id, agent_name).await?;
                let surface: Arc<dyn ToolSurface> = Arc::new(SurfaceHandle {
                    inner: Arc::downgrade(&self.inner),
                });
                Ok(Arc::new(ClientAgent::new(ClientAgentParams {
                    client_id: client_id.clone(),
                    schema,
                    completion,
                    tools,
                    history,
                    bus: self.inner.bus.clone(),
                    config: self.inner.config.clone(),
                    surface,
                })))
            })
            .await?;
        self.inner
            .session_validation
            .mark_agent_usage(client_id, agent_name);
        Ok(agent)
    }

    /// Build-once swarm controller for `(client_id, swarm_name)`, with
    /// every member agent constructed and registered.
    pub async fn get_swarm(
        &self,
        client_id: &ClientId,
        swarm_name: &SwarmName,
    ) -> Result<Arc<ClientSwarm>> {
        let key = memo_key(client_id.as_str(), swarm_name.as_str());
        self.inner
            .swarms
            .get_or_try_create(&key, || async {
                let schema = self
                    .inner
                    .registries
                    .swarms
                    .get(swarm_name.as_str(), "swarm connection")?;
                let swarm = Arc::new(
                    ClientSwarm::new(ClientSwarmParams {
                        client_id: client_id.clone(),
                        schema: schema.clone(),
                        persistence: self.inner.swarm_persistence.clone(),
                        bus: self.inner.bus.clone(),
                    })
                    .await?,
                );
                for agent_name in &schema.agent_list {
                    let agent = self.get_agent(client_id, agent_name).await?;
                    swarm.set_agent_ref(agent_name.clone(), agent)?;
                }
                Ok(swarm)
            })
            .await
    }

    /// Build-once session for `client_id`, bound to `swarm_name`.
    pub async fn get_session(
        &self,
        client_id: &ClientId,
        swarm_name: &SwarmName,
        mode: SessionMode,
    ) -> Result<Arc<ClientSession>> {
        self.inner
            .schema_validation
            .validate_swarm(swarm_name.as_str(), "session connection")?;
        if !self.inner.session_validation.has_session(client_id) {
            self.inner
                .session_validation
                .add_session(client_id.clone(), swarm_name.clone(), mode);
        }
        self.inner
            .sessions
            .get_or_try_create(client_id.as_str(), || async {
                let swarm = self.get_swarm(client_id, swarm_name).await?;
                Ok(Arc::new(ClientSession::new(
                    client_id.clone(),
                    swarm_name.clone(),
                    swarm,
                    self.inner.bus.clone(),
                )))
            })
            .await
    }

    /// The swarm controller of the client's live session.
    pub async fn session_swarm(&self, client_id: &ClientId) -> Result<Arc<ClientSwarm>> {
        let swarm_name = self
            .inner
            .session_validation
            .swarm_name(client_id, "session lookup")?;
        self.get_swarm(client_id, &swarm_name).await
    }

    /// The client's live session.
    pub async fn session(&self, client_id: &ClientId) -> Result<Arc<ClientSession>> {
        self.inner
            .sessions
            .get(client_id.as_str())
            .await
            .ok_or_else(|| SwarmError::SessionNotFound {
                client_id: client_id.clone(),
                source_label: "session lookup".to_owned(),
            })
    }

    /// Build-once storage instance. Shared schemas produce one swarm-wide
    /// instance; others one per client.
    pub async fn get_storage(
        &self,
        client_id: &ClientId,
        storage_name: &StorageName,
    ) -> Result<Arc<ClientStorage>> {
        self.inner
            .schema_validation
            .validate_storage(storage_name.as_str(), "storage connection")?;
        let schema = self
            .inner
            .registries
            .storages
            .get(storage_name.as_str(), "storage connection")?;
        let owner = if schema.shared {
            SHARED_OWNER.to_owned()
        } else {
            client_id.as_str().to_owned()
        };
        let key = memo_key(&owner, storage_name.as_str());
        let storage = self
            .inner
            .storages
            .get_or_try_create(&key, || async {
                let embedding = self
                    .inner
                    .registries
                    .embeddings
                    .get(schema.embedding.as_str(), &format!("storage {storage_name}"))?
                    .embedding
                    .clone();
                Ok(Arc::new(
                    ClientStorage::new(ClientStorageParams {
                        client_id: client_id.clone(),
                        owner: owner.clone(),
                        schema: schema.clone(),
                        embedding,
                        persistence: self.inner.storage_persistence.clone(),
                        bus: self.inner.bus.clone(),
                        config: self.inner.config.clone(),
                    })
                    .await?,
                ))
            })
            .await?;
        self.inner
            .session_validation
            .mark_storage_usage(client_id, storage_name);
        Ok(storage)
    }

    /// Build-once state instance. Shared schemas produce one swarm-wide
    /// instance; others one per client.
    pub async fn get_state(
        &self,
        client_id: &ClientId,
        state_name: &StateName,
    ) -> Result<Arc<ClientState>> {
        self.inner
            .schema_validation
            .validate_state(state_name.as_str(), "state connection")?;
        let schema = self
            .inner
            .registries
            .states
            .get(state_name.as_str(), "state connection")?;
        let owner = if schema.shared {
            SHARED_OWNER.to_owned()
        } else {
            client_id.as_str().to_owned()
        };
        let key = memo_key(&owner, state_name.as_str());
        let state = self
            .inner
            .states
            .get_or_try_create(&key, || async {
                Ok(Arc::new(
                    ClientState::new(ClientStateParams {
                        client_id: client_id.clone(),
                        owner: owner.clone(),
                        schema: schema.clone(),
                        persistence: self.inner.state_persistence.clone(),
                        bus: self.inner.bus.clone(),
                    })
                    .await?,
                ))
            })
            .await?;
        self.inner
            .session_validation
            .mark_state_usage(client_id, state_name);
        Ok(state)
    }

    // ── Core operations ─────────────────────────────────────────────────

    /// Run one turn on the client's active agent, bypassing the session
    /// queue. This is the re-entrant path tools use mid-turn.
    #[instrument(skip(self, content), fields(client_id = %client_id))]
    pub async fn execute_direct(
        &self,
        client_id: &ClientId,
        content: &str,
        mode: ExecutionMode,
    ) -> Result<String> {
        let swarm = self.session_swarm(client_id).await?;
        let agent = swarm.get_agent()?;
        let wait = swarm.wait_for_output();
        agent.execute(content, mode).await?;
        Ok(wait.await)
    }

    /// Stateless completion pass on the client's active agent.
    pub async fn run_stateless(&self, client_id: &ClientId, content: &str) -> Result<String> {
        let swarm = self.session_swarm(client_id).await?;
        swarm.get_agent()?.run(content).await
    }

    /// Resolve an agent for an agent-addressed operation, enforcing the
    /// active-agent guard unless `force` is set.
    async fn addressed_agent(
        &self,
        client_id: &ClientId,
        agent_name: &AgentName,
        force: bool,
    ) -> Result<Arc<ClientAgent>> {
        let swarm = self.session_swarm(client_id).await?;
        if !force && swarm.get_agent_name() != *agent_name {
            return Err(SwarmError::AgentNotActive {
                agent_name: agent_name.clone(),
                client_id: client_id.clone(),
            });
        }
        self.get_agent(client_id, agent_name).await
    }

    /// Append a tool result to an agent.
    pub async fn commit_tool_output(
        &self,
        client_id: &ClientId,
        agent_name: &AgentName,
        tool_id: &ToolCallId,
        content: &str,
        force: bool,
    ) -> Result<()> {
        let agent = self.addressed_agent(client_id, agent_name, force).await?;
        agent.commit_tool_output(tool_id, content).await;
        Ok(())
    }

    /// Append a system message to an agent.
    pub async fn commit_system_message(
        &self,
        client_id: &ClientId,
        agent_name: &AgentName,
        content: &str,
        force: bool,
    ) -> Result<()> {
        let agent = self.addressed_agent(client_id, agent_name, force).await?;
        agent.commit_system_message(content).await;
        Ok(())
    }

    /// Append a user message to an agent without completion.
    pub async fn commit_user_message(
        &self,
        client_id: &ClientId,
        agent_name: &AgentName,
        content: &str,
        mode: ExecutionMode,
        force: bool,
    ) -> Result<()> {
        let agent = self.addressed_agent(client_id, agent_name, force).await?;
        agent.commit_user_message(content, mode).await;
        Ok(())
    }

    /// Append an assistant message to an agent without completion.
    pub async fn commit_assistant_message(
        &self,
        client_id: &ClientId,
        agent_name: &AgentName,
        content: &str,
        force: bool,
    ) -> Result<()> {
        let agent = self.addressed_agent(client_id, agent_name, force).await?;
        agent.commit_assistant_message(content).await;
        Ok(())
    }

    /// Append a `flush` reset marker to an agent.
    pub async fn commit_flush(
        &self,
        client_id: &ClientId,
        agent_name: &AgentName,
        force: bool,
    ) -> Result<()> {
        let agent = self.addressed_agent(client_id, agent_name, force).await?;
        agent.commit_flush().await;
        Ok(())
    }

    /// Halt an agent's remaining tool dispatches.
    pub async fn commit_stop_tools(
        &self,
        client_id: &ClientId,
        agent_name: &AgentName,
        force: bool,
    ) -> Result<()> {
        let agent = self.addressed_agent(client_id, agent_name, force).await?;
        agent.commit_stop_tools().await;
        Ok(())
    }

    /// Make `agent_name` the client's active agent.
    pub async fn change_to_agent(
        &self,
        agent_name: &AgentName,
        client_id: &ClientId,
    ) -> Result<()> {
        let swarm = self.session_swarm(client_id).await?;
        self.inner.schema_validation.validate_agent_in_swarm(
            agent_name,
            &swarm.schema().swarm_name,
            "change agent",
        )?;
        swarm.set_agent_name(agent_name.clone()).await
    }

    /// Pop the navigation stack and activate the result.
    pub async fn change_to_prev_agent(&self, client_id: &ClientId) -> Result<AgentName> {
        let swarm = self.session_swarm(client_id).await?;
        swarm.navigation_pop().await
    }

    /// Activate the swarm's default agent.
    pub async fn change_to_default_agent(&self, client_id: &ClientId) -> Result<()> {
        let swarm = self.session_swarm(client_id).await?;
        let default_agent = swarm.schema().default_agent.clone();
        swarm.set_agent_name(default_agent).await
    }

    /// Convert the client's pending output wait into an empty string.
    pub async fn cancel_output(&self, client_id: &ClientId) -> Result<()> {
        let swarm = self.session_swarm(client_id).await?;
        swarm.cancel_output().await;
        Ok(())
    }

    /// Publish a string straight to the client's session output path.
    pub async fn emit_to_session(&self, content: &str, client_id: &ClientId) -> Result<()> {
        let session = self.session(client_id).await?;
        session.emit(content).await
    }

    // ── Disposal ────────────────────────────────────────────────────────

    /// Tear down everything the client owns: session, swarm instances,
    /// agents, histories, per-client storages and states, bus
    /// subscriptions, and the session record.
    #[instrument(skip(self), fields(client_id = %client_id))]
    pub async fn dispose(&self, client_id: &ClientId) {
        info!("disposing client");
        let prefix = format!("{}:", client_id.as_str());

        if let Some(session) = self.inner.sessions.clear(client_id.as_str()).await {
            session.dispose();
        }
        for swarm in self.inner.swarms.clear_prefix(&prefix).await {
            swarm.dispose();
        }
        for agent in self.inner.agents.clear_prefix(&prefix).await {
            agent.dispose();
        }
        for history in self.inner.histories.clear_prefix(&prefix).await {
            history.dispose();
        }
        for storage in self.inner.storages.clear_prefix(&prefix).await {
            storage.dispose();
        }
        for state in self.inner.states.clear_prefix(&prefix).await {
            state.dispose();
        }
        self.inner.bus.dispose(client_id);
        let _ = self.inner.session_validation.remove_session(client_id);
        debug!("client disposed");
    }
}

impl Default for SwarmRuntime {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool surface
// ─────────────────────────────────────────────────────────────────────────────

/// Weak capability handle handed to running tools.
struct SurfaceHandle {
    inner: Weak<RuntimeInner>,
}

impl SurfaceHandle {
    fn runtime(&self) -> Result<SwarmRuntime> {
        self.inner
            .upgrade()
            .map(|inner| SwarmRuntime { inner })
            .ok_or_else(|| SwarmError::SessionNotFound {
                client_id: ClientId::from("unknown"),
                source_label: "tool surface after runtime shutdown".to_owned(),
            })
    }
}

#[async_trait]
impl ToolSurface for SurfaceHandle {
    async fn commit_tool_output(
        &self,
        client_id: &ClientId,
        agent_name: &AgentName,
        tool_id: &ToolCallId,
        content: &str,
    ) -> Result<()> {
        self.runtime()?
            .commit_tool_output(client_id, agent_name, tool_id, content, true)
            .await
    }

    async fn commit_system_message(
        &self,
        client_id: &ClientId,
        agent_name: &AgentName,
        content: &str,
    ) -> Result<()> {
        self.runtime()?
            .commit_system_message(client_id, agent_name, content, true)
            .await
    }

    async fn commit_user_message(
        &self,
        client_id: &ClientId,
        agent_name: &AgentName,
        content: &str,
        mode: ExecutionMode,
    ) -> Result<()> {
        self.runtime()?
            .commit_user_message(client_id, agent_name, content, mode, true)
            .await
    }

    async fn commit_assistant_message(
        &self,
        client_id: &ClientId,
        agent_name: &AgentName,
        content: &str,
    ) -> Result<()> {
        self.runtime()?
            .commit_assistant_message(client_id, agent_name, content, true)
            .await
    }

    async fn commit_flush(&self, client_id: &ClientId, agent_name: &AgentName) -> Result<()> {
        self.runtime()?.commit_flush(client_id, agent_name, true).await
    }

    async fn commit_stop_tools(&self, client_id: &ClientId, agent_name: &AgentName) -> Result<()> {
        self.runtime()?.commit_stop_tools(client_id, agent_name, true).await
    }

    async fn change_to_agent(&self, agent_name: &AgentName, client_id: &ClientId) -> Result<()> {
        self.runtime()?.change_to_agent(agent_name, client_id).await
    }

    async fn change_to_prev_agent(&self, client_id: &ClientId) -> Result<()> {
        let _ = self.runtime()?.change_to_prev_agent(client_id).await?;
        Ok(())
    }

    async fn execute(&self, content: &str, client_id: &ClientId) -> Result<String> {
        self.runtime()?
            .execute_direct(client_id, content, ExecutionMode::Tool)
            .await
    }

    async fn emit(&self, content: &str, client_id: &ClientId) -> Result<()> {
        self.runtime()?.emit_to_session(content, client_id).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
