//! # hive
//!
//! A runtime for orchestrating swarms of cooperating LLM-backed agents
//! that share one conversational session per client. Register agents,
//! tools, and swarms; connect clients; the runtime routes every message to
//! the client's active agent, dispatches tool calls, recovers from
//! malformed model output, and emits bus events for observability.
//!
//! ```no_run
//! use std::sync::Arc;
//! use hive::{AgentSchema, CompletionSchema, Hive, SwarmSchema};
//! use hive_core::completion::mock::MockCompletion;
//!
//! # async fn demo() -> hive::Result<()> {
//! let hive = Hive::new();
//! hive.add_completion(CompletionSchema::new("echo", Arc::new(MockCompletion::echo())));
//! hive.add_agent(AgentSchema::new("triage", "echo", "You are a triage agent."));
//! hive.add_swarm(SwarmSchema::new("support", "triage", vec!["triage".into()]));
//!
//! let session = hive.session(&"client-1".into(), &"support".into()).await?;
//! let reply = session.complete("hello").await?;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```
//!
//! Logging rides on [`tracing`]; install any subscriber to receive it.
//! Persistence defaults to JSON files under `./logs/data` and can be
//! swapped through [`Hive::with_adapters`].

mod session_api;

use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use hive_core::clean_scope;
use hive_persist::{StatePersistence, StoragePersistence, SwarmPersistence};
use hive_runtime::SwarmRuntime;

pub use hive_bus::{EventFilter, EventHandler, Subscription};
pub use hive_core::{
    AgentCallbacks, AgentName, AgentSchema, ClientId, Completion, CompletionArgs,
    CompletionName, CompletionSchema, Embedding, EmbeddingName, EmbeddingSchema, EventContext,
    EventSource, ExecutionContext, ExecutionMode, FunctionCall, MessageRole, MethodContext,
    ModelMessage, RescueStrategy, Result, RuntimeConfig, StateCallbacks, StateName, StateSchema,
    StorageCallbacks, StorageItem, StorageName, StorageSchema, SwarmCallbacks, SwarmError,
    SwarmEvent, SwarmName, SwarmSchema, SwarmTool, ToolCall, ToolCallId, ToolCallbacks,
    ToolFunction, ToolName, ToolRequest, ToolSchema, ToolSurface,
};
pub use hive_runtime::{SendFn, SessionMode, SessionOutput};
pub use session_api::{
    AutoDispose, Connection, OnDestroyFn, ScheduledConnection, ScheduledSession, Session,
};

/// Snapshot of the ambient call/turn identity, plus the process id.
#[derive(Clone, Debug)]
pub struct SessionContext {
    /// This process's configured identity.
    pub process_id: String,
    /// The innermost active method context, if any.
    pub method_context: Option<MethodContext>,
    /// The innermost active execution context, if any.
    pub execution_context: Option<ExecutionContext>,
}

/// The embedder-facing surface. Cheap to clone; clones share the runtime.
#[derive(Clone)]
pub struct Hive {
    runtime: SwarmRuntime,
}

impl Hive {
    /// Create a runtime persisting to the default filesystem layout
    /// (`./logs/data`).
    #[must_use]
    pub fn new() -> Self {
        Self {
            runtime: SwarmRuntime::new(),
        }
    }

    /// Create a runtime with explicit persistence adapters.
    #[must_use]
    pub fn with_adapters(
        swarm: Arc<dyn SwarmPersistence>,
        state: Arc<dyn StatePersistence>,
        storage: Arc<dyn StoragePersistence>,
    ) -> Self {
        Self {
            runtime: SwarmRuntime::with_adapters(swarm, state, storage),
        }
    }

    /// Create a runtime with in-memory persistence.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            runtime: SwarmRuntime::in_memory(),
        }
    }

    /// The underlying execution core.
    #[must_use]
    pub fn runtime(&self) -> &SwarmRuntime {
        &self.runtime
    }

    /// Mutate the global configuration.
    pub fn update_config(&self, apply: impl FnOnce(&mut RuntimeConfig)) {
        self.runtime.update_config(apply);
    }

    // ── Registration ────────────────────────────────────────────────────

    /// Register an agent schema; returns its name.
    pub fn add_agent(&self, schema: AgentSchema) -> AgentName {
        let name = schema.agent_name.clone();
        self.runtime.registries().agents.register(name.as_str(), schema);
        name
    }

    /// Register a tool schema; returns its name.
    pub fn add_tool(&self, schema: ToolSchema) -> ToolName {
        let name = schema.tool_name.clone();
        self.runtime.registries().tools.register(name.as_str(), schema);
        name
    }

    /// Register a swarm schema; returns its name.
    pub fn add_swarm(&self, schema: SwarmSchema) -> SwarmName {
        let name = schema.swarm_name.clone();
        self.runtime.registries().swarms.register(name.as_str(), schema);
        name
    }

    /// Register a completion back-end; returns its name.
    pub fn add_completion(&self, schema: CompletionSchema) -> CompletionName {
        let name = schema.completion_name.clone();
        self.runtime
            .registries()
            .completions
            .register(name.as_str(), schema);
        name
    }

    /// Register an embedding back-end; returns its name.
    pub fn add_embedding(&self, schema: EmbeddingSchema) -> EmbeddingName {
        let name = schema.embedding_name.clone();
        self.runtime
            .registries()
            .embeddings
            .register(name.as_str(), schema);
        name
    }

    /// Register a storage schema; returns its name.
    pub fn add_storage(&self, schema: StorageSchema) -> StorageName {
        let name = schema.storage_name.clone();
        self.runtime
            .registries()
            .storages
            .register(name.as_str(), schema);
        name
    }

    /// Register a state schema; returns its name.
    pub fn add_state(&self, schema: StateSchema) -> StateName {
        let name = schema.state_name.clone();
        self.runtime.registries().states.register(name.as_str(), schema);
        name
    }

    // ── Sessions and connections ────────────────────────────────────────

    /// Open (or reuse) a session binding `client_id` to `swarm_name`.
    pub async fn session(&self, client_id: &ClientId, swarm_name: &SwarmName) -> Result<Session> {
        let ctx = MethodContext::new(client_id.clone(), "session")
            .with_swarm(swarm_name.clone());
        ctx.scope(async {
            let _ = self
                .runtime
                .get_session(client_id, swarm_name, SessionMode::Session)
                .await?;
            Ok(Session {
                hive: self.clone(),
                client_id: client_id.clone(),
                swarm_name: swarm_name.clone(),
            })
        })
        .await
    }

    /// Open a session whose `complete` batches messages within `delay`.
    pub async fn session_scheduled(
        &self,
        client_id: &ClientId,
        swarm_name: &SwarmName,
        delay: Duration,
    ) -> Result<ScheduledSession> {
        let ctx = MethodContext::new(client_id.clone(), "session_scheduled")
            .with_swarm(swarm_name.clone());
        ctx.scope(async {
            let _ = self
                .runtime
                .get_session(client_id, swarm_name, SessionMode::Scheduled)
                .await?;
            Ok(ScheduledSession::new(
                Session {
                    hive: self.clone(),
                    client_id: client_id.clone(),
                    swarm_name: swarm_name.clone(),
                },
                delay,
            ))
        })
        .await
    }

    /// Bridge a bidirectional connector: turn outputs (and server-side
    /// emits) flow to `on_output`; the returned [`Connection`] sends
    /// incoming messages.
    pub async fn make_connection(
        &self,
        on_output: SendFn,
        client_id: &ClientId,
        swarm_name: &SwarmName,
    ) -> Result<Connection> {
        let ctx = MethodContext::new(client_id.clone(), "make_connection")
            .with_swarm(swarm_name.clone());
        ctx.scope(async {
            let session = self
                .runtime
                .get_session(client_id, swarm_name, SessionMode::Connection)
                .await?;
            let receive = session.connect(on_output);
            Ok(Connection {
                hive: self.clone(),
                client_id: client_id.clone(),
                receive: Box::new(receive),
            })
        })
        .await
    }

    /// Scheduled variant of [`Hive::make_connection`].
    pub async fn make_connection_scheduled(
        &self,
        on_output: SendFn,
        client_id: &ClientId,
        swarm_name: &SwarmName,
        delay: Duration,
    ) -> Result<ScheduledConnection> {
        let connection = self.make_connection(on_output, client_id, swarm_name).await?;
        Ok(ScheduledConnection::new(connection, delay))
    }

    /// One-shot: open (or reuse) a session and run one turn.
    #[instrument(skip(self, message), fields(client_id = %client_id, swarm_name = %swarm_name))]
    pub async fn complete(
        &self,
        message: &str,
        client_id: &ClientId,
        swarm_name: &SwarmName,
    ) -> Result<String> {
        let ctx = MethodContext::new(client_id.clone(), "complete")
            .with_swarm(swarm_name.clone());
        ctx.scope(async {
            let session = self
                .runtime
                .get_session(client_id, swarm_name, SessionMode::Complete)
                .await?;
            ExecutionContext::new(client_id.clone())
                .scope(session.execute(message, ExecutionMode::User))
                .await
        })
        .await
    }

    pub(crate) async fn session_complete(
        &self,
        client_id: &ClientId,
        swarm_name: &SwarmName,
        message: &str,
    ) -> Result<String> {
        let ctx = MethodContext::new(client_id.clone(), "session.complete")
            .with_swarm(swarm_name.clone());
        ctx.scope(async {
            let session = self
                .runtime
                .get_session(client_id, swarm_name, SessionMode::Session)
                .await?;
            ExecutionContext::new(client_id.clone())
                .scope(session.execute(message, ExecutionMode::User))
                .await
        })
        .await
    }

    // ── Turn operations (agent-addressed) ───────────────────────────────

    fn assert_session(&self, client_id: &ClientId, label: &str) -> Result<()> {
        self.runtime.session_validation().validate(client_id, label)
    }

    async fn assert_active(&self, client_id: &ClientId, agent_name: &AgentName) -> Result<()> {
        let swarm = self.runtime.session_swarm(client_id).await?;
        if swarm.get_agent_name() == *agent_name {
            Ok(())
        } else {
            Err(SwarmError::AgentNotActive {
                agent_name: agent_name.clone(),
                client_id: client_id.clone(),
            })
        }
    }

    /// Run a tool-mode turn on `agent_name` (which must be active).
    pub async fn execute(
        &self,
        content: &str,
        client_id: &ClientId,
        agent_name: &AgentName,
    ) -> Result<String> {
        let ctx = MethodContext::new(client_id.clone(), "execute")
            .with_agent(agent_name.clone());
        ctx.scope(async {
            self.assert_session(client_id, "execute")?;
            self.assert_active(client_id, agent_name).await?;
            ExecutionContext::new(client_id.clone())
                .scope(self.runtime.execute_direct(client_id, content, ExecutionMode::Tool))
                .await
        })
        .await
    }

    /// Run a tool-mode turn on the active agent, whichever it is.
    pub async fn execute_force(&self, content: &str, client_id: &ClientId) -> Result<String> {
        let ctx = MethodContext::new(client_id.clone(), "execute_force");
        ctx.scope(async {
            self.assert_session(client_id, "execute_force")?;
            ExecutionContext::new(client_id.clone())
                .scope(self.runtime.execute_direct(client_id, content, ExecutionMode::Tool))
                .await
        })
        .await
    }

    /// Stateless completion pass on `agent_name` (which must be active).
    pub async fn run(
        &self,
        content: &str,
        client_id: &ClientId,
        agent_name: &AgentName,
    ) -> Result<String> {
        let ctx = MethodContext::new(client_id.clone(), "run").with_agent(agent_name.clone());
        ctx.scope(async {
            self.assert_session(client_id, "run")?;
            self.assert_active(client_id, agent_name).await?;
            self.runtime.run_stateless(client_id, content).await
        })
        .await
    }

    /// Stateless completion pass on the active agent.
    pub async fn run_force(&self, content: &str, client_id: &ClientId) -> Result<String> {
        let ctx = MethodContext::new(client_id.clone(), "run_force");
        ctx.scope(async {
            self.assert_session(client_id, "run_force")?;
            self.runtime.run_stateless(client_id, content).await
        })
        .await
    }

    /// Publish a string straight to the session output path, bypassing
    /// the model. `agent_name` must be active.
    pub async fn emit(
        &self,
        content: &str,
        client_id: &ClientId,
        agent_name: &AgentName,
    ) -> Result<()> {
        let ctx = MethodContext::new(client_id.clone(), "emit").with_agent(agent_name.clone());
        ctx.scope(async {
            self.assert_session(client_id, "emit")?;
            self.assert_active(client_id, agent_name).await?;
            self.runtime.emit_to_session(content, client_id).await
        })
        .await
    }

    /// Publish to the session output path regardless of the active agent.
    pub async fn emit_force(&self, content: &str, client_id: &ClientId) -> Result<()> {
        let ctx = MethodContext::new(client_id.clone(), "emit_force");
        ctx.scope(async {
            self.assert_session(client_id, "emit_force")?;
            self.runtime.emit_to_session(content, client_id).await
        })
        .await
    }

    // ── Navigation ──────────────────────────────────────────────────────

    /// Make `agent_name` the client's active agent.
    pub async fn change_to_agent(
        &self,
        agent_name: &AgentName,
        client_id: &ClientId,
    ) -> Result<()> {
        // May run inside a tool inside a turn: never inherit that scope.
        clean_scope(async {
            let ctx = MethodContext::new(client_id.clone(), "change_to_agent")
                .with_agent(agent_name.clone());
            ctx.scope(async {
                self.assert_session(client_id, "change_to_agent")?;
                self.runtime.change_to_agent(agent_name, client_id).await
            })
            .await
        })
        .await
    }

    /// Pop the navigation stack (default agent when empty) and activate
    /// the result.
    pub async fn change_to_prev_agent(&self, client_id: &ClientId) -> Result<AgentName> {
        clean_scope(async {
            let ctx = MethodContext::new(client_id.clone(), "change_to_prev_agent");
            ctx.scope(async {
                self.assert_session(client_id, "change_to_prev_agent")?;
                self.runtime.change_to_prev_agent(client_id).await
            })
            .await
        })
        .await
    }

    /// Activate the swarm's default agent.
    pub async fn change_to_default_agent(&self, client_id: &ClientId) -> Result<()> {
        clean_scope(async {
            let ctx = MethodContext::new(client_id.clone(), "change_to_default_agent");
            ctx.scope(async {
                self.assert_session(client_id, "change_to_default_agent")?;
                self.runtime.change_to_default_agent(client_id).await
            })
            .await
        })
        .await
    }

    /// Convert a pending output wait into an empty-string completion.
    /// `agent_name` must be active.
    pub async fn cancel_output(&self, client_id: &ClientId, agent_name: &AgentName) -> Result<()> {
        let ctx =
            MethodContext::new(client_id.clone(), "cancel_output").with_agent(agent_name.clone());
        ctx.scope(async {
            self.assert_session(client_id, "cancel_output")?;
            self.assert_active(client_id, agent_name).await?;
            self.runtime.cancel_output(client_id).await
        })
        .await
    }

    /// Cancel the pending output wait regardless of the active agent.
    pub async fn cancel_output_force(&self, client_id: &ClientId) -> Result<()> {
        let ctx = MethodContext::new(client_id.clone(), "cancel_output_force");
        ctx.scope(async {
            self.assert_session(client_id, "cancel_output_force")?;
            self.runtime.cancel_output(client_id).await
        })
        .await
    }

    // ── Commits ─────────────────────────────────────────────────────────

    /// Append a tool result to `agent_name` (which must be active).
    pub async fn commit_tool_output(
        &self,
        tool_id: &ToolCallId,
        content: &str,
        client_id: &ClientId,
        agent_name: &AgentName,
    ) -> Result<()> {
        let ctx = MethodContext::new(client_id.clone(), "commit_tool_output")
            .with_agent(agent_name.clone());
        ctx.scope(async {
            self.assert_session(client_id, "commit_tool_output")?;
            self.runtime
                .commit_tool_output(client_id, agent_name, tool_id, content, false)
                .await
        })
        .await
    }

    /// Append a tool result to the active agent.
    pub async fn commit_tool_output_force(
        &self,
        tool_id: &ToolCallId,
        content: &str,
        client_id: &ClientId,
    ) -> Result<()> {
        let ctx = MethodContext::new(client_id.clone(), "commit_tool_output_force");
        ctx.scope(async {
            self.assert_session(client_id, "commit_tool_output_force")?;
            let swarm = self.runtime.session_swarm(client_id).await?;
            let active = swarm.get_agent_name();
            self.runtime
                .commit_tool_output(client_id, &active, tool_id, content, true)
                .await
        })
        .await
    }

    /// Append a system message to `agent_name` (which must be active).
    pub async fn commit_system_message(
        &self,
        content: &str,
        client_id: &ClientId,
        agent_name: &AgentName,
    ) -> Result<()> {
        let ctx = MethodContext::new(client_id.clone(), "commit_system_message")
            .with_agent(agent_name.clone());
        ctx.scope(async {
            self.assert_session(client_id, "commit_system_message")?;
            self.runtime
                .commit_system_message(client_id, agent_name, content, false)
                .await
        })
        .await
    }

    /// Append a system message to the active agent.
    pub async fn commit_system_message_force(
        &self,
        content: &str,
        client_id: &ClientId,
    ) -> Result<()> {
        let ctx = MethodContext::new(client_id.clone(), "commit_system_message_force");
        ctx.scope(async {
            self.assert_session(client_id, "commit_system_message_force")?;
            let active = self.runtime.session_swarm(client_id).await?.get_agent_name();
            self.runtime
                .commit_system_message(client_id, &active, content, true)
                .await
        })
        .await
    }

    /// Append a user message to `agent_name` without completion.
    pub async fn commit_user_message(
        &self,
        content: &str,
        mode: ExecutionMode,
        client_id: &ClientId,
        agent_name: &AgentName,
    ) -> Result<()> {
        let ctx = MethodContext::new(client_id.clone(), "commit_user_message")
            .with_agent(agent_name.clone());
        ctx.scope(async {
            self.assert_session(client_id, "commit_user_message")?;
            self.runtime
                .commit_user_message(client_id, agent_name, content, mode, false)
                .await
        })
        .await
    }

    /// Append a user message to the active agent without completion.
    pub async fn commit_user_message_force(
        &self,
        content: &str,
        mode: ExecutionMode,
        client_id: &ClientId,
    ) -> Result<()> {
        let ctx = MethodContext::new(client_id.clone(), "commit_user_message_force");
        ctx.scope(async {
            self.assert_session(client_id, "commit_user_message_force")?;
            let active = self.runtime.session_swarm(client_id).await?.get_agent_name();
            self.runtime
                .commit_user_message(client_id, &active, content, mode, true)
                .await
        })
        .await
    }

    /// Append an assistant message to `agent_name` without completion.
    pub async fn commit_assistant_message(
        &self,
        content: &str,
        client_id: &ClientId,
        agent_name: &AgentName,
    ) -> Result<()> {
        let ctx = MethodContext::new(client_id.clone(), "commit_assistant_message")
            .with_agent(agent_name.clone());
        ctx.scope(async {
            self.assert_session(client_id, "commit_assistant_message")?;
            self.runtime
                .commit_assistant_message(client_id, agent_name, content, false)
                .await
        })
        .await
    }

    /// Append an assistant message to the active agent.
    pub async fn commit_assistant_message_force(
        &self,
        content: &str,
        client_id: &ClientId,
    ) -> Result<()> {
        let ctx = MethodContext::new(client_id.clone(), "commit_assistant_message_force");
        ctx.scope(async {
            self.assert_session(client_id, "commit_assistant_message_force")?;
            let active = self.runtime.session_swarm(client_id).await?.get_agent_name();
            self.runtime
                .commit_assistant_message(client_id, &active, content, true)
                .await
        })
        .await
    }

    /// Append a `flush` reset marker to `agent_name`.
    pub async fn commit_flush(&self, client_id: &ClientId, agent_name: &AgentName) -> Result<()> {
        let ctx =
            MethodContext::new(client_id.clone(), "commit_flush").with_agent(agent_name.clone());
        ctx.scope(async {
            self.assert_session(client_id, "commit_flush")?;
            self.runtime.commit_flush(client_id, agent_name, false).await
        })
        .await
    }

    /// Append a `flush` reset marker to the active agent.
    pub async fn commit_flush_force(&self, client_id: &ClientId) -> Result<()> {
        let ctx = MethodContext::new(client_id.clone(), "commit_flush_force");
        ctx.scope(async {
            self.assert_session(client_id, "commit_flush_force")?;
            let active = self.runtime.session_swarm(client_id).await?.get_agent_name();
            self.runtime.commit_flush(client_id, &active, true).await
        })
        .await
    }

    /// Halt the remaining tool dispatches of `agent_name`.
    pub async fn commit_stop_tools(
        &self,
        client_id: &ClientId,
        agent_name: &AgentName,
    ) -> Result<()> {
        let ctx = MethodContext::new(client_id.clone(), "commit_stop_tools")
            .with_agent(agent_name.clone());
        ctx.scope(async {
            self.assert_session(client_id, "commit_stop_tools")?;
            self.runtime.commit_stop_tools(client_id, agent_name, false).await
        })
        .await
    }

    /// Halt the active agent's remaining tool dispatches.
    pub async fn commit_stop_tools_force(&self, client_id: &ClientId) -> Result<()> {
        let ctx = MethodContext::new(client_id.clone(), "commit_stop_tools_force");
        ctx.scope(async {
            self.assert_session(client_id, "commit_stop_tools_force")?;
            let active = self.runtime.session_swarm(client_id).await?.get_agent_name();
            self.runtime.commit_stop_tools(client_id, &active, true).await
        })
        .await
    }

    // ── Event listeners ─────────────────────────────────────────────────

    fn listen(&self, source: EventSource, client_id: &ClientId, handler: EventHandler) -> Subscription {
        self.runtime.bus().subscribe(client_id.clone(), source, handler)
    }

    fn listen_once(
        &self,
        source: EventSource,
        client_id: &ClientId,
        filter: EventFilter,
        handler: EventHandler,
    ) -> Subscription {
        self.runtime
            .bus()
            .once(client_id.clone(), source, filter, handler)
    }

    /// Subscribe to turn-engine events.
    pub fn listen_agent_event(&self, client_id: &ClientId, handler: EventHandler) -> Subscription {
        self.listen(EventSource::AgentBus, client_id, handler)
    }

    /// Subscribe to history events.
    pub fn listen_history_event(
        &self,
        client_id: &ClientId,
        handler: EventHandler,
    ) -> Subscription {
        self.listen(EventSource::HistoryBus, client_id, handler)
    }

    /// Subscribe to session events.
    pub fn listen_session_event(
        &self,
        client_id: &ClientId,
        handler: EventHandler,
    ) -> Subscription {
        self.listen(EventSource::SessionBus, client_id, handler)
    }

    /// Subscribe to state events.
    pub fn listen_state_event(&self, client_id: &ClientId, handler: EventHandler) -> Subscription {
        self.listen(EventSource::StateBus, client_id, handler)
    }

    /// Subscribe to storage events.
    pub fn listen_storage_event(
        &self,
        client_id: &ClientId,
        handler: EventHandler,
    ) -> Subscription {
        self.listen(EventSource::StorageBus, client_id, handler)
    }

    /// Subscribe to swarm events.
    pub fn listen_swarm_event(&self, client_id: &ClientId, handler: EventHandler) -> Subscription {
        self.listen(EventSource::SwarmBus, client_id, handler)
    }

    /// One-shot filtered subscription to turn-engine events.
    pub fn listen_agent_event_once(
        &self,
        client_id: &ClientId,
        filter: EventFilter,
        handler: EventHandler,
    ) -> Subscription {
        self.listen_once(EventSource::AgentBus, client_id, filter, handler)
    }

    /// One-shot filtered subscription to history events.
    pub fn listen_history_event_once(
        &self,
        client_id: &ClientId,
        filter: EventFilter,
        handler: EventHandler,
    ) -> Subscription {
        self.listen_once(EventSource::HistoryBus, client_id, filter, handler)
    }

    /// One-shot filtered subscription to session events.
    pub fn listen_session_event_once(
        &self,
        client_id: &ClientId,
        filter: EventFilter,
        handler: EventHandler,
    ) -> Subscription {
        self.listen_once(EventSource::SessionBus, client_id, filter, handler)
    }

    /// One-shot filtered subscription to state events.
    pub fn listen_state_event_once(
        &self,
        client_id: &ClientId,
        filter: EventFilter,
        handler: EventHandler,
    ) -> Subscription {
        self.listen_once(EventSource::StateBus, client_id, filter, handler)
    }

    /// One-shot filtered subscription to storage events.
    pub fn listen_storage_event_once(
        &self,
        client_id: &ClientId,
        filter: EventFilter,
        handler: EventHandler,
    ) -> Subscription {
        self.listen_once(EventSource::StorageBus, client_id, filter, handler)
    }

    /// One-shot filtered subscription to swarm events.
    pub fn listen_swarm_event_once(
        &self,
        client_id: &ClientId,
        filter: EventFilter,
        handler: EventHandler,
    ) -> Subscription {
        self.listen_once(EventSource::SwarmBus, client_id, filter, handler)
    }

    // ── History and session introspection ───────────────────────────────

    async fn active_history(&self, client_id: &ClientId) -> Result<Vec<ModelMessage>> {
        let swarm = self.runtime.session_swarm(client_id).await?;
        let agent = swarm.get_agent()?;
        Ok(agent.history().to_array_for_raw())
    }

    /// The active agent's raw history.
    pub async fn get_raw_history(&self, client_id: &ClientId) -> Result<Vec<ModelMessage>> {
        let ctx = MethodContext::new(client_id.clone(), "get_raw_history");
        ctx.scope(async {
            self.assert_session(client_id, "get_raw_history")?;
            self.active_history(client_id).await
        })
        .await
    }

    /// The completion-facing projection of `agent_name`'s history.
    pub async fn get_agent_history(
        &self,
        client_id: &ClientId,
        agent_name: &AgentName,
    ) -> Result<Vec<ModelMessage>> {
        let ctx = MethodContext::new(client_id.clone(), "get_agent_history")
            .with_agent(agent_name.clone());
        ctx.scope(async {
            self.assert_session(client_id, "get_agent_history")?;
            let schema = self
                .runtime
                .registries()
                .agents
                .get(agent_name.as_str(), "get_agent_history")?;
            let history = self.runtime.get_history(client_id, agent_name).await?;
            let keep = self.runtime.config().read().keep_messages;
            Ok(history.to_array_for_agent(&schema.prompt, &schema.system, keep))
        })
        .await
    }

    /// Human (`mode == user`) user messages of the active agent's history.
    pub async fn get_user_history(&self, client_id: &ClientId) -> Result<Vec<ModelMessage>> {
        let ctx = MethodContext::new(client_id.clone(), "get_user_history");
        ctx.scope(async {
            self.assert_session(client_id, "get_user_history")?;
            Ok(self
                .active_history(client_id)
                .await?
                .into_iter()
                .filter(|m| m.role == MessageRole::User && m.mode == ExecutionMode::User)
                .collect())
        })
        .await
    }

    /// Assistant messages of the active agent's history.
    pub async fn get_assistant_history(&self, client_id: &ClientId) -> Result<Vec<ModelMessage>> {
        let ctx = MethodContext::new(client_id.clone(), "get_assistant_history");
        ctx.scope(async {
            self.assert_session(client_id, "get_assistant_history")?;
            Ok(self
                .active_history(client_id)
                .await?
                .into_iter()
                .filter(|m| m.role == MessageRole::Assistant)
                .collect())
        })
        .await
    }

    /// Content of the last human user message, if any.
    pub async fn get_last_user_message(&self, client_id: &ClientId) -> Result<Option<String>> {
        Ok(self
            .get_user_history(client_id)
            .await?
            .last()
            .map(|m| m.content.clone()))
    }

    /// Content of the last assistant message, if any.
    pub async fn get_last_assistant_message(
        &self,
        client_id: &ClientId,
    ) -> Result<Option<String>> {
        Ok(self
            .get_assistant_history(client_id)
            .await?
            .last()
            .map(|m| m.content.clone()))
    }

    /// Content of the last system message, if any.
    pub async fn get_last_system_message(&self, client_id: &ClientId) -> Result<Option<String>> {
        let ctx = MethodContext::new(client_id.clone(), "get_last_system_message");
        ctx.scope(async {
            self.assert_session(client_id, "get_last_system_message")?;
            Ok(self
                .active_history(client_id)
                .await?
                .into_iter()
                .rev()
                .find(|m| m.role == MessageRole::System)
                .map(|m| m.content))
        })
        .await
    }

    /// How the client's session was established.
    pub async fn get_session_mode(&self, client_id: &ClientId) -> Result<SessionMode> {
        self.runtime
            .session_validation()
            .session_mode(client_id, "get_session_mode")
    }

    /// Name of the client's active agent.
    pub async fn get_agent_name(&self, client_id: &ClientId) -> Result<AgentName> {
        self.assert_session(client_id, "get_agent_name")?;
        Ok(self.runtime.session_swarm(client_id).await?.get_agent_name())
    }

    /// Snapshot of the ambient call/turn identity.
    #[must_use]
    pub fn get_session_context(&self) -> SessionContext {
        SessionContext {
            process_id: self.runtime.config().read().process_id.clone(),
            method_context: MethodContext::current(),
            execution_context: ExecutionContext::current(),
        }
    }

    // ── Storage and state ───────────────────────────────────────────────

    async fn declared_storage(
        &self,
        client_id: &ClientId,
        storage_name: &StorageName,
    ) -> Result<Arc<hive_runtime::ClientStorage>> {
        self.assert_session(client_id, "storage access")?;
        let active = self.runtime.session_swarm(client_id).await?.get_agent_name();
        self.runtime.schema_validation().validate_agent_storage(
            &active,
            storage_name,
            "storage access",
        )?;
        self.runtime.get_storage(client_id, storage_name).await
    }

    async fn declared_state(
        &self,
        client_id: &ClientId,
        state_name: &StateName,
    ) -> Result<Arc<hive_runtime::ClientState>> {
        self.assert_session(client_id, "state access")?;
        let active = self.runtime.session_swarm(client_id).await?.get_agent_name();
        self.runtime
            .schema_validation()
            .validate_agent_state(&active, state_name, "state access")?;
        self.runtime.get_state(client_id, state_name).await
    }

    /// Similarity search over a storage the active agent declares.
    pub async fn storage_take(
        &self,
        client_id: &ClientId,
        storage_name: &StorageName,
        search: &str,
        total: Option<usize>,
    ) -> Result<Vec<StorageItem>> {
        let ctx = MethodContext::new(client_id.clone(), "storage_take")
            .with_storage(storage_name.clone());
        ctx.scope(async {
            self.declared_storage(client_id, storage_name)
                .await?
                .take(search, total)
                .await
        })
        .await
    }

    /// Insert or replace an item in a declared storage.
    pub async fn storage_upsert(
        &self,
        client_id: &ClientId,
        storage_name: &StorageName,
        item: StorageItem,
    ) -> Result<()> {
        let ctx = MethodContext::new(client_id.clone(), "storage_upsert")
            .with_storage(storage_name.clone());
        ctx.scope(async {
            self.declared_storage(client_id, storage_name)
                .await?
                .upsert(item)
                .await
        })
        .await
    }

    /// Remove an item from a declared storage.
    pub async fn storage_remove(
        &self,
        client_id: &ClientId,
        storage_name: &StorageName,
        item_id: &str,
    ) -> Result<()> {
        let ctx = MethodContext::new(client_id.clone(), "storage_remove")
            .with_storage(storage_name.clone());
        ctx.scope(async {
            self.declared_storage(client_id, storage_name)
                .await?
                .remove(item_id)
                .await
        })
        .await
    }

    /// Get an item from a declared storage.
    pub async fn storage_get(
        &self,
        client_id: &ClientId,
        storage_name: &StorageName,
        item_id: &str,
    ) -> Result<Option<StorageItem>> {
        let ctx = MethodContext::new(client_id.clone(), "storage_get")
            .with_storage(storage_name.clone());
        ctx.scope(async {
            Ok(self
                .declared_storage(client_id, storage_name)
                .await?
                .get(item_id)
                .await)
        })
        .await
    }

    /// List all items of a declared storage.
    pub async fn storage_list(
        &self,
        client_id: &ClientId,
        storage_name: &StorageName,
    ) -> Result<Vec<StorageItem>> {
        let ctx = MethodContext::new(client_id.clone(), "storage_list")
            .with_storage(storage_name.clone());
        ctx.scope(async {
            Ok(self
                .declared_storage(client_id, storage_name)
                .await?
                .list()
                .await)
        })
        .await
    }

    /// Clear a declared storage.
    pub async fn storage_clear(
        &self,
        client_id: &ClientId,
        storage_name: &StorageName,
    ) -> Result<()> {
        let ctx = MethodContext::new(client_id.clone(), "storage_clear")
            .with_storage(storage_name.clone());
        ctx.scope(async {
            self.declared_storage(client_id, storage_name)
                .await?
                .clear()
                .await
        })
        .await
    }

    /// Read a state the active agent declares.
    pub async fn get_state(
        &self,
        client_id: &ClientId,
        state_name: &StateName,
    ) -> Result<serde_json::Value> {
        let ctx =
            MethodContext::new(client_id.clone(), "get_state").with_state(state_name.clone());
        ctx.scope(async {
            Ok(self
                .declared_state(client_id, state_name)
                .await?
                .get_state()
                .await)
        })
        .await
    }

    /// Write a state the active agent declares.
    pub async fn set_state(
        &self,
        client_id: &ClientId,
        state_name: &StateName,
        value: serde_json::Value,
    ) -> Result<()> {
        let ctx =
            MethodContext::new(client_id.clone(), "set_state").with_state(state_name.clone());
        ctx.scope(async {
            self.declared_state(client_id, state_name)
                .await?
                .set_state(value)
                .await
        })
        .await
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Inactivity-driven teardown for a client's session.
    pub fn make_auto_dispose(
        &self,
        client_id: &ClientId,
        swarm_name: &SwarmName,
        timeout: Duration,
        on_destroy: Option<OnDestroyFn>,
    ) -> AutoDispose {
        AutoDispose::spawn(
            self.clone(),
            client_id.clone(),
            swarm_name.clone(),
            timeout,
            on_destroy,
        )
    }

    /// Tear down everything the client owns.
    pub async fn dispose(&self, client_id: &ClientId) {
        let ctx = MethodContext::new(client_id.clone(), "dispose");
        ctx.scope(self.runtime.dispose(client_id)).await;
    }
}

impl Default for Hive {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use hive_core::completion::mock::MockCompletion;

    fn hive() -> Hive {
        let hive = Hive::in_memory();
        let _ = hive.add_completion(CompletionSchema::new(
            "echo",
            Arc::new(MockCompletion::echo()),
        ));
        let _ = hive.add_agent(AgentSchema::new("triage", "echo", "prompt"));
        let _ = hive.add_swarm(SwarmSchema::new("support", "triage", vec!["triage".into()]));
        hive
    }

    #[tokio::test]
    async fn registration_returns_names() {
        let hive = Hive::in_memory();
        let name = hive.add_agent(AgentSchema::new("a", "c", "p"));
        assert_eq!(name.as_str(), "a");
        assert!(hive.runtime().registries().agents.contains("a"));
    }

    #[tokio::test]
    async fn complete_requires_registered_swarm() {
        let hive = Hive::in_memory();
        let err = hive
            .complete("hi", &"c1".into(), &"ghost".into())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[tokio::test]
    async fn session_context_is_empty_outside_calls() {
        let hive = hive();
        let snapshot = hive.get_session_context();
        assert!(snapshot.method_context.is_none());
        assert!(snapshot.execution_context.is_none());
        assert!(!snapshot.process_id.is_empty());
    }

    #[tokio::test]
    async fn operations_without_session_error() {
        let hive = hive();
        let err = hive
            .get_raw_history(&"nobody".into())
            .await
            .unwrap_err();
        assert!(matches!(err, SwarmError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn update_config_applies() {
        let hive = hive();
        hive.update_config(|config| config.keep_messages = 7);
        assert_eq!(hive.runtime().config().read().keep_messages, 7);
    }
}
