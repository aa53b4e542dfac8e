//! The swarm controller.
//!
//! [`ClientSwarm`] tracks the active agent of one client, owns the
//! navigation stack, and arbitrates output waiting. Active-agent and stack
//! changes persist through the configured [`SwarmPersistence`] adapter.
//!
//! Agent transitions never hand out pointers between agents: the outgoing
//! agent is told via `commit_agent_change` (halting its dispatch chain) and
//! waiters re-arm on the incoming agent.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tracing::{debug, info, instrument};

use hive_bus::EventBus;
use hive_core::errors::{Result, SwarmError};
use hive_core::{
    AgentName, ClientId, EventContext, EventSource, Signal, SwarmEvent, SwarmSchema,
};
use hive_persist::SwarmPersistence;

use crate::agent::ClientAgent;

/// Construction parameters of a [`ClientSwarm`].
pub struct ClientSwarmParams {
    /// Client this instance serves.
    pub client_id: ClientId,
    /// The swarm's schema.
    pub schema: Arc<SwarmSchema>,
    /// Active-agent / navigation-stack persistence.
    pub persistence: Arc<dyn SwarmPersistence>,
    /// Event bus.
    pub bus: EventBus,
}

/// Per-client swarm state: active agent, navigation stack, agent refs.
pub struct ClientSwarm {
    client_id: ClientId,
    schema: Arc<SwarmSchema>,
    persistence: Arc<dyn SwarmPersistence>,
    bus: EventBus,
    active_agent: Mutex<AgentName>,
    navigation_stack: Mutex<Vec<AgentName>>,
    agents: Mutex<HashMap<AgentName, Arc<ClientAgent>>>,
    agent_changed: Signal<AgentName>,
    cancel: Signal<String>,
}

impl ClientSwarm {
    /// Build an instance, restoring the persisted active agent and stack.
    pub async fn new(params: ClientSwarmParams) -> Result<Self> {
        let active = params
            .persistence
            .load_active_agent(&params.schema.swarm_name, &params.client_id)
            .await?
            .filter(|agent| params.schema.contains(agent))
            .unwrap_or_else(|| params.schema.default_agent.clone());
        let stack = params
            .persistence
            .load_navigation_stack(&params.schema.swarm_name, &params.client_id)
            .await?;

        if let Some(on_init) = &params.schema.callbacks.on_init {
            on_init(&params.client_id, &params.schema.swarm_name);
        }
        debug!(
            client_id = %params.client_id,
            swarm_name = %params.schema.swarm_name,
            active_agent = %active,
            "swarm instance created"
        );

        Ok(Self {
            client_id: params.client_id,
            schema: params.schema,
            persistence: params.persistence,
            bus: params.bus,
            active_agent: Mutex::new(active),
            navigation_stack: Mutex::new(stack),
            agents: Mutex::new(HashMap::new()),
            agent_changed: Signal::new(),
            cancel: Signal::new(),
        })
    }

    /// The swarm's schema.
    #[must_use]
    pub fn schema(&self) -> &Arc<SwarmSchema> {
        &self.schema
    }

    /// Name of the active agent.
    #[must_use]
    pub fn get_agent_name(&self) -> AgentName {
        self.active_agent.lock().clone()
    }

    /// The active agent instance.
    pub fn get_agent(&self) -> Result<Arc<ClientAgent>> {
        let name = self.get_agent_name();
        self.agents
            .lock()
            .get(&name)
            .cloned()
            .ok_or_else(|| SwarmError::AgentNotActive {
                agent_name: name,
                client_id: self.client_id.clone(),
            })
    }

    /// A registered agent instance by name.
    #[must_use]
    pub fn agent_ref(&self, agent_name: &AgentName) -> Option<Arc<ClientAgent>> {
        self.agents.lock().get(agent_name).cloned()
    }

    /// Register a concrete agent instance for a member of the schema.
    pub fn set_agent_ref(&self, agent_name: AgentName, agent: Arc<ClientAgent>) -> Result<()> {
        if !self.schema.contains(&agent_name) {
            return Err(SwarmError::AgentNotInSwarm {
                agent_name,
                swarm_name: self.schema.swarm_name.clone(),
            });
        }
        let _ = self.agents.lock().insert(agent_name, agent);
        Ok(())
    }

    async fn activate(&self, agent_name: AgentName, push_prior: bool) -> Result<()> {
        if !self.schema.contains(&agent_name) {
            return Err(SwarmError::AgentNotInSwarm {
                agent_name,
                swarm_name: self.schema.swarm_name.clone(),
            });
        }

        let prior = self.get_agent_name();

        // Halt the outgoing agent's dispatch chain before switching.
        if let Some(outgoing) = self.agent_ref(&prior) {
            outgoing.commit_agent_change().await;
        }

        if push_prior {
            let stack_snapshot = {
                let mut stack = self.navigation_stack.lock();
                stack.push(prior.clone());
                stack.clone()
            };
            self.persistence
                .save_navigation_stack(&self.schema.swarm_name, &self.client_id, &stack_snapshot)
                .await?;
        }

        *self.active_agent.lock() = agent_name.clone();
        self.persistence
            .save_active_agent(&self.schema.swarm_name, &self.client_id, &agent_name)
            .await?;

        if let Some(on_agent_changed) = &self.schema.callbacks.on_agent_changed {
            on_agent_changed(&self.client_id, &agent_name, &self.schema.swarm_name);
        }
        self.bus
            .emit(
                &self.client_id,
                SwarmEvent::now(EventSource::SwarmBus, self.client_id.clone(), "agent-changed")
                    .with_input(json!({ "from": prior, "to": agent_name }))
                    .with_context(EventContext {
                        agent_name: Some(agent_name.clone()),
                        swarm_name: Some(self.schema.swarm_name.clone()),
                        ..EventContext::default()
                    }),
            )
            .await;

        info!(
            client_id = %self.client_id,
            swarm_name = %self.schema.swarm_name,
            from = %prior,
            to = %agent_name,
            "active agent changed"
        );
        let _ = self.agent_changed.send(agent_name);
        Ok(())
    }

    /// Atomic switch: push the prior agent onto the navigation stack and
    /// activate `agent_name`.
    #[instrument(skip(self), fields(client_id = %self.client_id))]
    pub async fn set_agent_name(&self, agent_name: AgentName) -> Result<()> {
        self.activate(agent_name, true).await
    }

    /// Pop the navigation stack (default agent when empty), activate the
    /// result, and return it.
    #[instrument(skip(self), fields(client_id = %self.client_id))]
    pub async fn navigation_pop(&self) -> Result<AgentName> {
        let (target, stack_snapshot) = {
            let mut stack = self.navigation_stack.lock();
            let target = stack.pop().unwrap_or_else(|| self.schema.default_agent.clone());
            (target, stack.clone())
        };
        self.persistence
            .save_navigation_stack(&self.schema.swarm_name, &self.client_id, &stack_snapshot)
            .await?;
        self.activate(target.clone(), false).await?;
        Ok(target)
    }

    /// Snapshot of the navigation stack, oldest first.
    #[must_use]
    pub fn navigation_stack(&self) -> Vec<AgentName> {
        self.navigation_stack.lock().clone()
    }

    /// Wait for the next output of the swarm: whichever registered agent
    /// publishes first, or the empty string on [`ClientSwarm::cancel_output`].
    ///
    /// Listener registration happens at call time (before the returned
    /// future is awaited), so an output published by a turn started right
    /// after this call cannot be missed. Because every member agent is
    /// armed, the wait survives mid-turn agent changes and resolves with
    /// the incoming agent's output.
    pub fn wait_for_output(&self) -> impl Future<Output = String> + Send + 'static {
        let output_listeners: Vec<_> = self
            .agents
            .lock()
            .values()
            .map(|agent| agent.signals().output.listen())
            .collect();
        let cancel = self.cancel.listen();

        async move {
            let outputs = async move {
                if output_listeners.is_empty() {
                    return std::future::pending().await;
                }
                let (value, _, _) = futures::future::select_all(output_listeners).await;
                value
            };
            tokio::select! {
                // Cancellation wins when both are ready.
                biased;
                value = cancel => value,
                value = outputs => value,
            }
        }
    }

    /// Convert any outstanding output wait into an empty-string completion.
    pub async fn cancel_output(&self) {
        self.bus
            .emit(
                &self.client_id,
                SwarmEvent::now(EventSource::SwarmBus, self.client_id.clone(), "cancel-output")
                    .with_context(EventContext {
                        swarm_name: Some(self.schema.swarm_name.clone()),
                        ..EventContext::default()
                    }),
            )
            .await;
        let _ = self.cancel.send(String::new());
    }

    /// Tear the swarm instance down.
    pub fn dispose(&self) {
        if let Some(on_dispose) = &self.schema.callbacks.on_dispose {
            on_dispose(&self.client_id, &self.schema.swarm_name);
        }
        debug!(
            client_id = %self.client_id,
            swarm_name = %self.schema.swarm_name,
            "swarm instance disposed"
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{ClientAgent, ClientAgentParams};
    use crate::history::MessageHistory;
    use async_trait::async_trait;
    use hive_core::completion::mock::MockCompletion;
    use hive_core::tool::ToolSurface;
    use hive_core::{
        AgentCallbacks, AgentSchema, ExecutionMode, RuntimeConfig, SwarmCallbacks, SwarmName,
        ToolCallId,
    };
    use hive_persist::MemoryPersistence;
    use parking_lot::RwLock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct InertSurface;

    #[async_trait]
    impl ToolSurface for InertSurface {
        async fn commit_tool_output(
            &self,
            _client_id: &ClientId,
            _agent_name: &AgentName,
            _tool_id: &ToolCallId,
            _content: &str,
        ) -> Result<()> {
            Ok(())
        }
        async fn commit_system_message(
            &self,
            _client_id: &ClientId,
            _agent_name: &AgentName,
            _content: &str,
        ) -> Result<()> {
            Ok(())
        }
        async fn commit_user_message(
            &self,
            _client_id: &ClientId,
            _agent_name: &AgentName,
            _content: &str,
            _mode: ExecutionMode,
        ) -> Result<()> {
            Ok(())
        }
        async fn commit_assistant_message(
            &self,
            _client_id: &ClientId,
            _agent_name: &AgentName,
            _content: &str,
        ) -> Result<()> {
            Ok(())
        }
        async fn commit_flush(
            &self,
            _client_id: &ClientId,
            _agent_name: &AgentName,
        ) -> Result<()> {
            Ok(())
        }
        async fn commit_stop_tools(
            &self,
            _client_id: &ClientId,
            _agent_name: &AgentName,
        ) -> Result<()> {
            Ok(())
        }
        async fn change_to_agent(
            &self,
            _agent_name: &AgentName,
            _client_id: &ClientId,
        ) -> Result<()> {
            Ok(())
        }
        async fn change_to_prev_agent(&self, _client_id: &ClientId) -> Result<()> {
            Ok(())
        }
        async fn execute(&self, _content: &str, _client_id: &ClientId) -> Result<String> {
            Ok(String::new())
        }
        async fn emit(&self, _content: &str, _client_id: &ClientId) -> Result<()> {
            Ok(())
        }
    }

    fn make_agent(name: &str, bus: &EventBus) -> Arc<ClientAgent> {
        let client_id = ClientId::from("c1");
        let schema = Arc::new(AgentSchema::new(name, "mock", "prompt"));
        let history = Arc::new(MessageHistory::new(
            client_id.clone(),
            schema.agent_name.clone(),
            bus.clone(),
            AgentCallbacks::default(),
        ));
        Arc::new(ClientAgent::new(ClientAgentParams {
            client_id,
            schema,
            completion: Arc::new(MockCompletion::echo()),
            tools: vec![],
            history,
            bus: bus.clone(),
            config: Arc::new(RwLock::new(RuntimeConfig::default())),
            surface: Arc::new(InertSurface),
        }))
    }

    fn swarm_schema() -> SwarmSchema {
        SwarmSchema::new(
            "support",
            "triage",
            vec![
                AgentName::from("triage"),
                AgentName::from("sales"),
                AgentName::from("refund"),
            ],
        )
    }

    async fn make_swarm(schema: SwarmSchema) -> (ClientSwarm, EventBus) {
        let bus = EventBus::new();
        let swarm = ClientSwarm::new(ClientSwarmParams {
            client_id: ClientId::from("c1"),
            schema: Arc::new(schema),
            persistence: Arc::new(MemoryPersistence::new()),
            bus: bus.clone(),
        })
        .await
        .unwrap();
        for name in ["triage", "sales", "refund"] {
            swarm
                .set_agent_ref(AgentName::from(name), make_agent(name, &bus))
                .unwrap();
        }
        (swarm, bus)
    }

    #[tokio::test]
    async fn starts_on_default_agent() {
        let (swarm, _bus) = make_swarm(swarm_schema()).await;
        assert_eq!(swarm.get_agent_name(), AgentName::from("triage"));
        assert_eq!(swarm.get_agent().unwrap().agent_name().as_str(), "triage");
    }

    #[tokio::test]
    async fn set_agent_ref_rejects_foreign_agent() {
        let (swarm, bus) = make_swarm(swarm_schema()).await;
        let err = swarm
            .set_agent_ref(AgentName::from("rogue"), make_agent("rogue", &bus))
            .unwrap_err();
        assert!(matches!(err, SwarmError::AgentNotInSwarm { .. }));
    }

    #[tokio::test]
    async fn set_agent_name_switches_and_pushes_stack() {
        let (swarm, _bus) = make_swarm(swarm_schema()).await;
        swarm.set_agent_name(AgentName::from("sales")).await.unwrap();
        assert_eq!(swarm.get_agent_name(), AgentName::from("sales"));
        assert_eq!(swarm.navigation_stack(), vec![AgentName::from("triage")]);
    }

    #[tokio::test]
    async fn set_agent_name_rejects_foreign_agent() {
        let (swarm, _bus) = make_swarm(swarm_schema()).await;
        assert!(swarm.set_agent_name(AgentName::from("rogue")).await.is_err());
    }

    #[tokio::test]
    async fn set_agent_name_to_current_still_records() {
        let (swarm, _bus) = make_swarm(swarm_schema()).await;
        swarm.set_agent_name(AgentName::from("triage")).await.unwrap();
        assert_eq!(swarm.get_agent_name(), AgentName::from("triage"));
        assert_eq!(swarm.navigation_stack(), vec![AgentName::from("triage")]);
    }

    #[tokio::test]
    async fn navigation_pop_round_trip() {
        let (swarm, _bus) = make_swarm(swarm_schema()).await;
        swarm.set_agent_name(AgentName::from("sales")).await.unwrap();
        swarm.set_agent_name(AgentName::from("refund")).await.unwrap();

        let popped = swarm.navigation_pop().await.unwrap();
        assert_eq!(popped, AgentName::from("sales"));
        assert_eq!(swarm.get_agent_name(), AgentName::from("sales"));
    }

    #[tokio::test]
    async fn navigation_pop_empty_stack_goes_default() {
        let (swarm, _bus) = make_swarm(swarm_schema()).await;
        swarm.set_agent_name(AgentName::from("sales")).await.unwrap();
        // Drain the stack (one entry), then pop again on empty.
        let _ = swarm.navigation_pop().await.unwrap();
        let popped = swarm.navigation_pop().await.unwrap();
        assert_eq!(popped, AgentName::from("triage"));
        assert_eq!(swarm.get_agent_name(), AgentName::from("triage"));
    }

    #[tokio::test]
    async fn on_agent_changed_fires() {
        let changes = Arc::new(AtomicUsize::new(0));
        let counter = changes.clone();
        let schema = swarm_schema().with_callbacks(SwarmCallbacks {
            on_agent_changed: Some(Arc::new(move |_, _, _| {
                let _ = counter.fetch_add(1, Ordering::SeqCst);
            })),
            on_init: None,
            on_dispose: None,
        });
        let (swarm, _bus) = make_swarm(schema).await;

        swarm.set_agent_name(AgentName::from("sales")).await.unwrap();
        let _ = swarm.navigation_pop().await.unwrap();
        assert_eq!(changes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancel_output_short_circuits_wait() {
        let (swarm, _bus) = make_swarm(swarm_schema()).await;
        let wait = swarm.wait_for_output();
        swarm.cancel_output().await;
        assert_eq!(wait.await, "");
    }

    #[tokio::test]
    async fn wait_resolves_with_any_member_output() {
        let (swarm, _bus) = make_swarm(swarm_schema()).await;
        let wait = swarm.wait_for_output();
        let sales = swarm.agent_ref(&AgentName::from("sales")).unwrap();
        let _ = sales.signals().output.send("from sales".into());
        assert_eq!(wait.await, "from sales");
    }

    #[tokio::test]
    async fn active_agent_is_restored_from_persistence() {
        let persistence = Arc::new(MemoryPersistence::new());
        let bus = EventBus::new();
        persistence
            .save_active_agent(
                &SwarmName::from("support"),
                &ClientId::from("c1"),
                &AgentName::from("refund"),
            )
            .await
            .unwrap();

        let swarm = ClientSwarm::new(ClientSwarmParams {
            client_id: ClientId::from("c1"),
            schema: Arc::new(swarm_schema()),
            persistence,
            bus,
        })
        .await
        .unwrap();
        assert_eq!(swarm.get_agent_name(), AgentName::from("refund"));
    }

    #[tokio::test]
    async fn persisted_foreign_agent_falls_back_to_default() {
        let persistence = Arc::new(MemoryPersistence::new());
        persistence
            .save_active_agent(
                &SwarmName::from("support"),
                &ClientId::from("c1"),
                &AgentName::from("rogue"),
            )
            .await
            .unwrap();

        let swarm = ClientSwarm::new(ClientSwarmParams {
            client_id: ClientId::from("c1"),
            schema: Arc::new(swarm_schema()),
            persistence,
            bus: EventBus::new(),
        })
        .await
        .unwrap();
        assert_eq!(swarm.get_agent_name(), AgentName::from("triage"));
    }
}
