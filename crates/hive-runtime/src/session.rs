//! The session layer.
//!
//! [`ClientSession`] is the per-client message gateway. Client-facing
//! operations go through a fair FIFO queue so concurrent calls for the
//! same client linearize; the output wait is armed *before* the turn
//! starts so the single-slot publish cannot be missed.
//!
//! `connect` bridges a bidirectional connector: incoming messages run
//! turns, and a background pump forwards every turn output (and every
//! server-side `emit`) to the connector's `send` callback.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use hive_bus::EventBus;
use hive_core::errors::Result;
use hive_core::{
    AgentName, ClientId, EventContext, EventSource, ExecutionMode, Signal, SwarmEvent, SwarmName,
    ToolCallId,
};

use crate::swarm::ClientSwarm;

/// Payload handed to a connector's `send` callback.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionOutput {
    /// The output string.
    pub data: String,
    /// Agent that produced it (the active agent at send time).
    pub agent_name: AgentName,
    /// Client the output belongs to.
    pub client_id: ClientId,
}

/// Connector send callback.
pub type SendFn = Arc<dyn Fn(SessionOutput) -> BoxFuture<'static, ()> + Send + Sync>;

/// Per-client message gateway.
pub struct ClientSession {
    client_id: ClientId,
    swarm_name: SwarmName,
    swarm: Arc<ClientSwarm>,
    bus: EventBus,
    queue: Mutex<()>,
    emit_signal: Signal<String>,
    pump_token: CancellationToken,
}

impl ClientSession {
    /// Create a session over a swarm instance.
    #[must_use]
    pub fn new(
        client_id: ClientId,
        swarm_name: SwarmName,
        swarm: Arc<ClientSwarm>,
        bus: EventBus,
    ) -> Self {
        debug!(client_id = %client_id, swarm_name = %swarm_name, "session created");
        Self {
            client_id,
            swarm_name,
            swarm,
            bus,
            queue: Mutex::new(()),
            emit_signal: Signal::new(),
            pump_token: CancellationToken::new(),
        }
    }

    /// The session's swarm instance.
    #[must_use]
    pub fn swarm(&self) -> &Arc<ClientSwarm> {
        &self.swarm
    }

    async fn emit_event(&self, event_type: &str, input: serde_json::Value) {
        let event = SwarmEvent::now(EventSource::SessionBus, self.client_id.clone(), event_type)
            .with_input(input)
            .with_context(EventContext {
                swarm_name: Some(self.swarm_name.clone()),
                ..EventContext::default()
            });
        self.bus.emit(&self.client_id, event).await;
    }

    /// Run one turn on the active agent and return its output. Serialized
    /// per session in FIFO order.
    #[instrument(skip(self, message), fields(client_id = %self.client_id))]
    pub async fn execute(&self, message: &str, mode: ExecutionMode) -> Result<String> {
        let _guard = self.queue.lock().await;
        self.emit_event("execute", json!({ "content": message })).await;

        let agent = self.swarm.get_agent()?;
        // Arm the wait before the turn so the output publish is buffered.
        let wait = self.swarm.wait_for_output();
        agent.execute(message, mode).await?;
        Ok(wait.await)
    }

    /// Stateless completion pass on the active agent.
    pub async fn run(&self, message: &str) -> Result<String> {
        let _guard = self.queue.lock().await;
        self.emit_event("run", json!({ "content": message })).await;
        self.swarm.get_agent()?.run(message).await
    }

    /// Append a tool result to the active agent.
    pub async fn commit_tool_output(&self, tool_id: &ToolCallId, content: &str) -> Result<()> {
        let _guard = self.queue.lock().await;
        self.swarm.get_agent()?.commit_tool_output(tool_id, content).await;
        Ok(())
    }

    /// Append a system message to the active agent.
    pub async fn commit_system_message(&self, content: &str) -> Result<()> {
        let _guard = self.queue.lock().await;
        self.swarm.get_agent()?.commit_system_message(content).await;
        Ok(())
    }

    /// Append a user message to the active agent without completion.
    pub async fn commit_user_message(&self, content: &str, mode: ExecutionMode) -> Result<()> {
        let _guard = self.queue.lock().await;
        self.swarm.get_agent()?.commit_user_message(content, mode).await;
        Ok(())
    }

    /// Append an assistant message to the active agent without completion.
    pub async fn commit_assistant_message(&self, content: &str) -> Result<()> {
        let _guard = self.queue.lock().await;
        self.swarm.get_agent()?.commit_assistant_message(content).await;
        Ok(())
    }

    /// Append a `flush` reset marker to the active agent.
    pub async fn commit_flush(&self) -> Result<()> {
        let _guard = self.queue.lock().await;
        self.swarm.get_agent()?.commit_flush().await;
        Ok(())
    }

    /// Halt the active agent's remaining tool dispatches.
    pub async fn commit_stop_tools(&self) -> Result<()> {
        let _guard = self.queue.lock().await;
        self.swarm.get_agent()?.commit_stop_tools().await;
        Ok(())
    }

    /// Publish a string to the connector path, bypassing the model.
    pub async fn emit(&self, message: &str) -> Result<()> {
        self.emit_event("emit", json!({ "content": message })).await;
        let _ = self.emit_signal.send(message.to_owned());
        Ok(())
    }

    /// Bridge a connector: outputs (turn results and server-side emits)
    /// flow to `send`; the returned closure feeds incoming messages in.
    pub fn connect(
        self: &Arc<Self>,
        send: SendFn,
    ) -> impl Fn(String) -> BoxFuture<'static, Result<String>> + Send + Sync + 'static {
        let pump_session = self.clone();
        let pump_send = send;
        let token = self.pump_token.clone();
        let _pump = tokio::spawn(async move {
            loop {
                let output = pump_session.swarm.wait_for_output();
                let emitted = pump_session.emit_signal.listen();
                let data = tokio::select! {
                    () = token.cancelled() => break,
                    data = output => data,
                    data = emitted => data,
                };
                let payload = SessionOutput {
                    data,
                    agent_name: pump_session.swarm.get_agent_name(),
                    client_id: pump_session.client_id.clone(),
                };
                pump_send(payload).await;
            }
            debug!(client_id = %pump_session.client_id, "session pump stopped");
        });

        let session = self.clone();
        move |incoming: String| {
            let session = session.clone();
            Box::pin(async move { session.execute(&incoming, ExecutionMode::User).await })
        }
    }

    /// Tear the session down, stopping any connector pump.
    pub fn dispose(&self) {
        self.pump_token.cancel();
        debug!(client_id = %self.client_id, "session disposed");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
