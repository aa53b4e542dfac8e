//! Tool abstraction.
//!
//! A tool is validated, then *started* — never awaited — by the turn
//! engine; the engine instead races the terminal signals (commit, agent
//! change, stop, error, rescue). The running tool talks back to the runtime
//! exclusively through the [`ToolSurface`] capability handle it receives,
//! so there is no pointer graph between tools, agents, and swarms.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::Result;
use crate::ids::{AgentName, ClientId, ToolCallId, ToolName};
use crate::messages::{ExecutionMode, ToolCall, ToolFunction};

// ─────────────────────────────────────────────────────────────────────────────
// Tool request
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a tool invocation gets to see about its call.
#[derive(Clone, Debug)]
pub struct ToolRequest {
    /// ID of this call.
    pub tool_id: ToolCallId,
    /// Client owning the turn.
    pub client_id: ClientId,
    /// Agent that dispatched the call.
    pub agent_name: AgentName,
    /// Untyped JSON parameters. Validation is the tool's responsibility.
    pub params: Value,
    /// Every call of the assistant message, for tools that coordinate.
    pub tool_calls: Vec<ToolCall>,
    /// Whether this is the last call of the batch.
    pub is_last: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Runtime capability handle
// ─────────────────────────────────────────────────────────────────────────────

/// Operations the runtime exposes to a running tool.
///
/// Committing output (or changing agents, or stopping the chain) is how a
/// tool terminates its dispatch slot — a tool that does none of these
/// leaves the dispatcher waiting (the watchdog will log).
#[async_trait]
pub trait ToolSurface: Send + Sync {
    /// Append a tool result answering `tool_id` and release the dispatcher.
    async fn commit_tool_output(
        &self,
        client_id: &ClientId,
        agent_name: &AgentName,
        tool_id: &ToolCallId,
        content: &str,
    ) -> Result<()>;

    /// Append a system message to the agent's history.
    async fn commit_system_message(
        &self,
        client_id: &ClientId,
        agent_name: &AgentName,
        content: &str,
    ) -> Result<()>;

    /// Append a user message without triggering a completion.
    async fn commit_user_message(
        &self,
        client_id: &ClientId,
        agent_name: &AgentName,
        content: &str,
        mode: ExecutionMode,
    ) -> Result<()>;

    /// Append an assistant message without triggering a completion.
    async fn commit_assistant_message(
        &self,
        client_id: &ClientId,
        agent_name: &AgentName,
        content: &str,
    ) -> Result<()>;

    /// Append a `flush` reset marker.
    async fn commit_flush(&self, client_id: &ClientId, agent_name: &AgentName) -> Result<()>;

    /// Halt the remaining calls of the current batch.
    async fn commit_stop_tools(&self, client_id: &ClientId, agent_name: &AgentName) -> Result<()>;

    /// Make `agent_name` the active agent for the client. Ends the current
    /// dispatch chain on the outgoing agent.
    async fn change_to_agent(&self, agent_name: &AgentName, client_id: &ClientId) -> Result<()>;

    /// Pop the navigation stack (default agent when empty) and activate
    /// the result.
    async fn change_to_prev_agent(&self, client_id: &ClientId) -> Result<()>;

    /// Run a tool-mode turn on the client's active agent and return its
    /// output.
    async fn execute(&self, content: &str, client_id: &ClientId) -> Result<String>;

    /// Publish a string straight to the session output, bypassing the
    /// model.
    async fn emit(&self, content: &str, client_id: &ClientId) -> Result<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// SwarmTool trait and schema
// ─────────────────────────────────────────────────────────────────────────────

/// The trait every tool implements.
#[async_trait]
pub trait SwarmTool: Send + Sync {
    /// Wire schema sent to the completion back-end.
    fn function(&self) -> ToolFunction;

    /// Check the request before dispatch. Returning `false` aborts the
    /// batch through the rescue path.
    async fn validate(&self, request: &ToolRequest) -> bool {
        let _ = request;
        true
    }

    /// Run the tool. Started without being awaited; communicate through
    /// `swarm`.
    async fn call(&self, request: ToolRequest, swarm: Arc<dyn ToolSurface>) -> Result<()>;
}

/// Per-tool observation hooks.
#[derive(Clone, Default)]
pub struct ToolCallbacks {
    /// Fired right before the tool is started.
    pub on_before_call: Option<Arc<dyn Fn(&ToolRequest) + Send + Sync>>,
    /// Fired after the dispatcher observed a terminal signal for the call.
    pub on_after_call: Option<Arc<dyn Fn(&ToolRequest) + Send + Sync>>,
}

impl std::fmt::Debug for ToolCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCallbacks")
            .field("on_before_call", &self.on_before_call.is_some())
            .field("on_after_call", &self.on_after_call.is_some())
            .finish()
    }
}

/// A registered tool.
#[derive(Clone)]
pub struct ToolSchema {
    /// Unique registry name. Must match `function().name` for dispatch.
    pub tool_name: ToolName,
    /// The implementation.
    pub tool: Arc<dyn SwarmTool>,
    /// Observation hooks.
    pub callbacks: ToolCallbacks,
}

impl ToolSchema {
    /// Register a tool under a name.
    #[must_use]
    pub fn new(tool_name: impl Into<ToolName>, tool: Arc<dyn SwarmTool>) -> Self {
        Self {
            tool_name: tool_name.into(),
            tool,
            callbacks: ToolCallbacks::default(),
        }
    }

    /// Set the observation hooks (builder-style).
    #[must_use]
    pub fn with_callbacks(mut self, callbacks: ToolCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }
}

impl std::fmt::Debug for ToolSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSchema")
            .field("tool_name", &self.tool_name)
            .field("callbacks", &self.callbacks)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct NoopTool;

    #[async_trait]
    impl SwarmTool for NoopTool {
        fn function(&self) -> ToolFunction {
            ToolFunction {
                name: "noop".into(),
                description: "Does nothing".into(),
                parameters: json!({"type": "object", "properties": {}}),
            }
        }

        async fn call(&self, _request: ToolRequest, _swarm: Arc<dyn ToolSurface>) -> Result<()> {
            Ok(())
        }
    }

    fn request() -> ToolRequest {
        ToolRequest {
            tool_id: ToolCallId::from("tc-1"),
            client_id: ClientId::from("c1"),
            agent_name: AgentName::from("triage"),
            params: json!({}),
            tool_calls: vec![],
            is_last: true,
        }
    }

    #[tokio::test]
    async fn validate_defaults_to_true() {
        let tool = NoopTool;
        assert!(tool.validate(&request()).await);
    }

    #[test]
    fn schema_carries_name_and_callbacks() {
        let called = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = called.clone();
        let schema = ToolSchema::new("noop", Arc::new(NoopTool)).with_callbacks(ToolCallbacks {
            on_before_call: Some(Arc::new(move |_| {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
            })),
            on_after_call: None,
        });
        assert_eq!(schema.tool_name.as_str(), "noop");
        schema.callbacks.on_before_call.as_ref().unwrap()(&request());
        assert!(called.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn callbacks_debug_shows_presence() {
        let callbacks = ToolCallbacks::default();
        assert!(format!("{callbacks:?}").contains("on_before_call: false"));
    }
}
