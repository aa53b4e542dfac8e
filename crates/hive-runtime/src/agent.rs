//! The turn engine.
//!
//! [`ClientAgent`] runs one conversational turn at a time for one
//! (client, agent) pair: append the user input, call the completion
//! back-end, then either dispatch the returned tool calls or validate and
//! publish the text output.
//!
//! Tool calls are *started, never awaited*. A tool may drive further
//! operations on the same client (including full turns), so awaiting its
//! body from the dispatcher would deadlock on the per-client serialization.
//! The dispatcher instead races the five terminal signals — `toolCommit`,
//! `agentChange`, `toolStop`, `toolError`, `rescue` — with a watchdog that
//! logs when a tool stays quiet past the configured window.

use std::sync::Arc;

use parking_lot::RwLock;
use rand::seq::SliceRandom;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use hive_bus::EventBus;
use hive_core::completion::{Completion, CompletionArgs};
use hive_core::errors::{Result, SwarmError};
use hive_core::tool::{ToolRequest, ToolSchema, ToolSurface};
use hive_core::{
    AgentName, AgentSchema, ClientId, EventContext, EventSource, ExecutionMode, ModelMessage,
    RescueStrategy, RuntimeConfig, Signal, SwarmEvent, ToolCall, ToolCallId, ToolFunction,
};

use crate::history::MessageHistory;

// ─────────────────────────────────────────────────────────────────────────────
// Signals
// ─────────────────────────────────────────────────────────────────────────────

/// The six internal signals of a turn engine.
pub struct AgentSignals {
    /// The swarm moved this client to another agent.
    pub agent_change: Signal<()>,
    /// A tool result was committed; the dispatcher may proceed.
    pub tool_commit: Signal<()>,
    /// A tool body failed.
    pub tool_error: Signal<String>,
    /// Further tool dispatches were halted.
    pub tool_stop: Signal<()>,
    /// A model rescue ran.
    pub rescue: Signal<()>,
    /// The turn's output.
    pub output: Signal<String>,
}

impl AgentSignals {
    fn new() -> Self {
        Self {
            agent_change: Signal::new(),
            tool_commit: Signal::new(),
            tool_error: Signal::new(),
            tool_stop: Signal::new(),
            rescue: Signal::new(),
            output: Signal::new(),
        }
    }
}

/// How a dispatch slot ended.
enum DispatchOutcome {
    /// Tool committed its result; continue with the next call.
    Commit,
    /// A terminal signal halted the chain.
    Halt(&'static str),
    /// The tool body errored.
    Error(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// ClientAgent
// ─────────────────────────────────────────────────────────────────────────────

/// Construction parameters of a [`ClientAgent`].
pub struct ClientAgentParams {
    /// Client the agent instance serves.
    pub client_id: ClientId,
    /// The agent's schema.
    pub schema: Arc<AgentSchema>,
    /// Resolved completion back-end.
    pub completion: Arc<dyn Completion>,
    /// Resolved tool schemas, in declaration order.
    pub tools: Vec<ToolSchema>,
    /// The agent's history.
    pub history: Arc<MessageHistory>,
    /// Event bus.
    pub bus: EventBus,
    /// Shared runtime configuration.
    pub config: Arc<RwLock<RuntimeConfig>>,
    /// Capability handle passed to running tools.
    pub surface: Arc<dyn ToolSurface>,
}

/// One-turn execution engine for a (client, agent) pair.
pub struct ClientAgent {
    client_id: ClientId,
    schema: Arc<AgentSchema>,
    completion: Arc<dyn Completion>,
    tools: Vec<ToolSchema>,
    history: Arc<MessageHistory>,
    bus: EventBus,
    config: Arc<RwLock<RuntimeConfig>>,
    surface: Arc<dyn ToolSurface>,
    signals: Arc<AgentSignals>,
    execute_lock: Mutex<()>,
}

impl ClientAgent {
    /// Build an agent instance and fire its `on_init` callback.
    #[must_use]
    pub fn new(params: ClientAgentParams) -> Self {
        let agent = Self {
            client_id: params.client_id,
            schema: params.schema,
            completion: params.completion,
            tools: params.tools,
            history: params.history,
            bus: params.bus,
            config: params.config,
            surface: params.surface,
            signals: Arc::new(AgentSignals::new()),
            execute_lock: Mutex::new(()),
        };
        if let Some(on_init) = &agent.schema.callbacks.on_init {
            on_init(&agent.client_id, &agent.schema.agent_name);
        }
        agent
    }

    /// The agent's name.
    #[must_use]
    pub fn agent_name(&self) -> &AgentName {
        &self.schema.agent_name
    }

    /// The agent's signals.
    #[must_use]
    pub fn signals(&self) -> &Arc<AgentSignals> {
        &self.signals
    }

    /// The agent's history.
    #[must_use]
    pub fn history(&self) -> &Arc<MessageHistory> {
        &self.history
    }

    fn config_snapshot(&self) -> RuntimeConfig {
        self.config.read().clone()
    }

    fn find_tool(&self, name: &str) -> Option<&ToolSchema> {
        self.tools.iter().find(|t| t.tool_name.as_str() == name)
    }

    fn apply_transform(&self, config: &RuntimeConfig, raw: String) -> String {
        match &self.schema.transform {
            Some(transform) => transform(raw),
            None => config.default_output_transform(&raw),
        }
    }

    /// `None` = output accepted, `Some(reason)` = rejected.
    fn check_output(&self, output: &str) -> Option<String> {
        self.schema.validate.as_ref().and_then(|validate| validate(output))
    }

    async fn emit_event(&self, event_type: &str, input: serde_json::Value) {
        let event = SwarmEvent::now(EventSource::AgentBus, self.client_id.clone(), event_type)
            .with_input(input)
            .with_context(EventContext {
                agent_name: Some(self.schema.agent_name.clone()),
                ..EventContext::default()
            });
        self.bus.emit(&self.client_id, event).await;
    }

    /// Request a completion over the current projection and apply the
    /// `map` hook.
    async fn request_completion(&self, mode: ExecutionMode) -> Result<ModelMessage> {
        let config = self.config_snapshot();
        let mut system = self.schema.system.clone();
        system.extend(config.default_system_prompt.iter().cloned());

        let messages =
            self.history
                .to_array_for_agent(&self.schema.prompt, &system, config.keep_messages);

        let tools: Option<Vec<ToolFunction>> = if self.tools.is_empty() {
            None
        } else {
            Some(self.tools.iter().map(|t| t.tool.function()).collect())
        };

        let message = self
            .completion
            .get_completion(CompletionArgs {
                client_id: self.client_id.clone(),
                agent_name: self.schema.agent_name.clone(),
                mode,
                messages,
                tools,
            })
            .await?;

        Ok(match &self.schema.map {
            Some(map) => map(message),
            None => message,
        })
    }

    // ── Rescue ──────────────────────────────────────────────────────────

    /// Recover from unusable model output. Fires the `rescue` signal and
    /// the `on_resurrect` callback, then applies the configured strategy.
    async fn resurrect(&self, mode: ExecutionMode, reason: &str) -> Result<String> {
        let config = self.config_snapshot();
        warn!(
            client_id = %self.client_id,
            agent_name = %self.schema.agent_name,
            strategy = ?config.rescue_strategy,
            reason,
            "resurrecting model"
        );

        let _ = self.signals.rescue.send(());
        if let Some(on_resurrect) = &self.schema.callbacks.on_resurrect {
            on_resurrect(&self.client_id, &self.schema.agent_name, reason);
        }
        self.emit_event("resurrect", json!({ "reason": reason })).await;

        match config.rescue_strategy {
            RescueStrategy::Flush => {
                self.history
                    .push(ModelMessage::resque(self.schema.agent_name.clone(), reason))
                    .await;
                self.history
                    .push(ModelMessage::user(
                        self.schema.agent_name.clone(),
                        config.rescue_flush_prompt.clone(),
                        ExecutionMode::Tool,
                    ))
                    .await;
                let placeholder = config
                    .empty_output_placeholders
                    .choose(&mut rand::thread_rng())
                    .cloned()
                    .unwrap_or_default();
                Ok(placeholder)
            }
            RescueStrategy::Recomplete => {
                self.history
                    .push(ModelMessage::resque(self.schema.agent_name.clone(), reason))
                    .await;
                self.history
                    .push(ModelMessage::user(
                        self.schema.agent_name.clone(),
                        config.rescue_recomplete_prompt.clone(),
                        ExecutionMode::Tool,
                    ))
                    .await;
                // One retry, no second rescue. Raw content: the caller
                // applies the output transform exactly once.
                let message =
                    self.request_completion(mode)
                        .await
                        .map_err(|e| SwarmError::RescueFailed {
                            agent_name: self.schema.agent_name.clone(),
                            client_id: self.client_id.clone(),
                            message: e.to_string(),
                        })?;
                Ok(message.content)
            }
            RescueStrategy::Custom => {
                let custom = config.custom_rescue.clone().ok_or_else(|| {
                    SwarmError::RescueFailed {
                        agent_name: self.schema.agent_name.clone(),
                        client_id: self.client_id.clone(),
                        message: "custom rescue strategy configured without a callback".to_owned(),
                    }
                })?;
                let message = custom(&self.client_id, &self.schema.agent_name);
                Ok(message.content)
            }
        }
    }

    // ── Output ──────────────────────────────────────────────────────────

    /// Publish `content` to the `output` signal, the `on_output` callback,
    /// and the bus.
    async fn publish_output(&self, content: &str) {
        if let Some(on_output) = &self.schema.callbacks.on_output {
            on_output(&self.client_id, &self.schema.agent_name, content);
        }
        self.emit_event("emit-output", json!({ "content": content })).await;
        let _ = self.signals.output.send(content.to_owned());
    }

    /// Rescue, then put the product through the normal output path:
    /// transform once, validate, persist, publish. A rejected rescue
    /// product is fatal; there is no second rescue.
    async fn rescue_and_emit(&self, mode: ExecutionMode, reason: &str) -> Result<()> {
        let config = self.config_snapshot();
        let rescued = self.resurrect(mode, reason).await?;
        let transformed = self.apply_transform(&config, rescued);

        match self.check_output(&transformed) {
            None => {
                self.history
                    .push(ModelMessage::assistant(
                        self.schema.agent_name.clone(),
                        transformed.clone(),
                    ))
                    .await;
                self.publish_output(&transformed).await;
                Ok(())
            }
            Some(final_reason) => {
                error!(
                    client_id = %self.client_id,
                    agent_name = %self.schema.agent_name,
                    reason = %final_reason,
                    "rescued output rejected"
                );
                Err(SwarmError::RescueFailed {
                    agent_name: self.schema.agent_name.clone(),
                    client_id: self.client_id.clone(),
                    message: final_reason,
                })
            }
        }
    }

    /// Transform → validate → publish. One rescue retry on rejection;
    /// a second rejection is fatal.
    async fn emit_output(&self, mode: ExecutionMode, raw: String) -> Result<()> {
        let config = self.config_snapshot();
        let transformed = self.apply_transform(&config, raw);

        match self.check_output(&transformed) {
            None => {
                self.history
                    .push(ModelMessage::assistant(
                        self.schema.agent_name.clone(),
                        transformed.clone(),
                    ))
                    .await;
                self.publish_output(&transformed).await;
                Ok(())
            }
            Some(reason) => {
                self.rescue_and_emit(mode, &format!("invalid model output: {reason}"))
                    .await
            }
        }
    }

    // ── Tool dispatch ───────────────────────────────────────────────────

    /// Start one tool call and race the terminal signals.
    async fn dispatch_tool(&self, schema: &ToolSchema, request: ToolRequest) -> DispatchOutcome {
        let watchdog_timeout = self.config_snapshot().tool_watchdog_timeout;
        let tool_name = schema.tool_name.clone();

        if let Some(on_before) = &schema.callbacks.on_before_call {
            on_before(&request);
        }

        // Listeners first: a tool that signals before its first await
        // must not be missed.
        let mut commit = self.signals.tool_commit.listen();
        let mut change = self.signals.agent_change.listen();
        let mut stop = self.signals.tool_stop.listen();
        let mut rescue = self.signals.rescue.listen();
        let mut tool_error = self.signals.tool_error.listen();

        let tool = schema.tool.clone();
        let surface = self.surface.clone();
        let signals = self.signals.clone();
        let spawned_request = request.clone();
        let spawned_name = tool_name.clone();
        let _task = tokio::spawn(async move {
            if let Err(e) = tool.call(spawned_request, surface).await {
                error!(tool_name = %spawned_name, error = %e, "tool call failed");
                let _ = signals.tool_error.send(e.to_string());
            }
        });

        let outcome = loop {
            tokio::select! {
                () = &mut commit => break DispatchOutcome::Commit,
                () = &mut change => break DispatchOutcome::Halt("agent-change"),
                () = &mut stop => break DispatchOutcome::Halt("tool-stop"),
                () = &mut rescue => break DispatchOutcome::Halt("rescue"),
                message = &mut tool_error => break DispatchOutcome::Error(message),
                () = tokio::time::sleep(watchdog_timeout) => {
                    warn!(
                        client_id = %self.client_id,
                        tool_name = %tool_name,
                        "tool produced no signal within the watchdog window"
                    );
                }
            }
        };

        if let Some(on_after) = &schema.callbacks.on_after_call {
            on_after(&request);
        }
        outcome
    }

    /// Run the tool-call branch of a turn.
    async fn run_tool_calls(
        &self,
        mode: ExecutionMode,
        message: ModelMessage,
        mut calls: Vec<ToolCall>,
    ) -> Result<()> {
        for call in &mut calls {
            call.normalize();
        }

        // The assistant message is persisted in full; truncation only
        // bounds what gets dispatched.
        self.history
            .push(
                ModelMessage::assistant(self.schema.agent_name.clone(), message.content)
                    .with_tool_calls(calls.clone()),
            )
            .await;
        self.emit_event("tool-calls", json!({ "count": calls.len() })).await;

        let dispatch_count = self
            .schema
            .max_tool_calls
            .map_or(calls.len(), |max| max.min(calls.len()));

        for (index, call) in calls[..dispatch_count].iter().enumerate() {
            let Some(tool_schema) = self.find_tool(&call.function.name) else {
                warn!(
                    client_id = %self.client_id,
                    function = %call.function.name,
                    "no target function for tool call"
                );
                self.rescue_and_emit(mode, "no target function").await?;
                self.finish_tool_calls().await;
                return Ok(());
            };

            let request = ToolRequest {
                tool_id: ToolCallId::from(call.id.as_str()),
                client_id: self.client_id.clone(),
                agent_name: self.schema.agent_name.clone(),
                params: call.function.arguments.clone(),
                tool_calls: calls.clone(),
                is_last: index + 1 == dispatch_count,
            };

            if !tool_schema.tool.validate(&request).await {
                warn!(
                    client_id = %self.client_id,
                    tool_name = %tool_schema.tool_name,
                    "tool rejected its parameters"
                );
                self.rescue_and_emit(mode, "tool validation failed").await?;
                self.finish_tool_calls().await;
                return Ok(());
            }

            match self.dispatch_tool(tool_schema, request).await {
                DispatchOutcome::Commit => {}
                DispatchOutcome::Halt(signal) => {
                    debug!(
                        client_id = %self.client_id,
                        agent_name = %self.schema.agent_name,
                        signal,
                        "tool chain halted"
                    );
                    self.finish_tool_calls().await;
                    return Ok(());
                }
                DispatchOutcome::Error(message) => {
                    warn!(
                        client_id = %self.client_id,
                        tool_name = %tool_schema.tool_name,
                        error = %message,
                        "tool call errored"
                    );
                    self.rescue_and_emit(mode, "function call failed").await?;
                    self.finish_tool_calls().await;
                    return Ok(());
                }
            }
        }

        self.finish_tool_calls().await;
        Ok(())
    }

    async fn finish_tool_calls(&self) {
        if let Some(on_after) = &self.schema.callbacks.on_after_tool_calls {
            on_after(&self.client_id, &self.schema.agent_name);
        }
        self.emit_event("after-tool-calls", json!(null)).await;
    }

    // ── Public operations ───────────────────────────────────────────────

    /// Run one turn. Serialized per agent instance; publishes exactly one
    /// output unless rescue itself fails.
    #[instrument(skip(self, incoming), fields(client_id = %self.client_id, agent_name = %self.schema.agent_name))]
    pub async fn execute(&self, incoming: &str, mode: ExecutionMode) -> Result<()> {
        let _guard = self.execute_lock.lock().await;
        info!("turn started");

        if let Some(on_execute) = &self.schema.callbacks.on_execute {
            on_execute(&self.client_id, &self.schema.agent_name, incoming, mode);
        }

        self.history
            .push(ModelMessage::user(
                self.schema.agent_name.clone(),
                incoming.trim(),
                mode,
            ))
            .await;
        self.emit_event("execute", json!({ "content": incoming.trim(), "mode": mode }))
            .await;

        let message = match self.request_completion(mode).await {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "completion failed");
                self.rescue_and_emit(mode, "completion failed").await?;
                return Ok(());
            }
        };

        if message.has_tool_calls() {
            let calls = message.tool_calls.clone().unwrap_or_default();
            self.run_tool_calls(mode, message, calls).await
        } else {
            let content = message.content;
            self.emit_output(mode, content).await
        }
    }

    /// Stateless completion pass. Reads the projection, never writes
    /// history; returns the empty string when tool calls appear or
    /// validation rejects the output.
    #[instrument(skip(self, incoming), fields(client_id = %self.client_id, agent_name = %self.schema.agent_name))]
    pub async fn run(&self, incoming: &str) -> Result<String> {
        if let Some(on_run) = &self.schema.callbacks.on_run {
            on_run(&self.client_id, &self.schema.agent_name, incoming);
        }
        self.emit_event("run", json!({ "content": incoming })).await;

        let config = self.config_snapshot();
        let mut system = self.schema.system.clone();
        system.extend(config.default_system_prompt.iter().cloned());

        let mut messages =
            self.history
                .to_array_for_agent(&self.schema.prompt, &system, config.keep_messages);
        messages.push(ModelMessage::user(
            self.schema.agent_name.clone(),
            incoming.trim(),
            ExecutionMode::User,
        ));

        let tools: Option<Vec<ToolFunction>> = if self.tools.is_empty() {
            None
        } else {
            Some(self.tools.iter().map(|t| t.tool.function()).collect())
        };

        let message = self
            .completion
            .get_completion(CompletionArgs {
                client_id: self.client_id.clone(),
                agent_name: self.schema.agent_name.clone(),
                mode: ExecutionMode::User,
                messages,
                tools,
            })
            .await?;

        let message = match &self.schema.map {
            Some(map) => map(message),
            None => message,
        };

        if message.has_tool_calls() {
            debug!("run produced tool calls; returning empty output");
            return Ok(String::new());
        }

        let transformed = self.apply_transform(&config, message.content);
        match self.check_output(&transformed) {
            None => Ok(transformed),
            Some(reason) => {
                debug!(reason = %reason, "run output rejected");
                Ok(String::new())
            }
        }
    }

    /// Resolve with the next published output.
    pub async fn wait_for_output(&self) -> String {
        self.signals.output.wait().await
    }

    /// Append a user message without triggering a completion.
    pub async fn commit_user_message(&self, content: &str, mode: ExecutionMode) {
        self.history
            .push(ModelMessage::user(self.schema.agent_name.clone(), content, mode))
            .await;
        self.emit_event("commit-user-message", json!({ "content": content })).await;
    }

    /// Append an assistant message without triggering a completion.
    pub async fn commit_assistant_message(&self, content: &str) {
        self.history
            .push(ModelMessage::assistant(self.schema.agent_name.clone(), content))
            .await;
        self.emit_event("commit-assistant-message", json!({ "content": content }))
            .await;
    }

    /// Append a system message.
    pub async fn commit_system_message(&self, content: &str) {
        self.history
            .push(ModelMessage::system(self.schema.agent_name.clone(), content))
            .await;
        self.emit_event("commit-system-message", json!({ "content": content })).await;
    }

    /// Append a tool result answering `tool_id` and release the
    /// dispatcher.
    pub async fn commit_tool_output(&self, tool_id: &ToolCallId, content: &str) {
        self.history
            .push(ModelMessage::tool(
                self.schema.agent_name.clone(),
                tool_id.clone(),
                content,
            ))
            .await;
        self.emit_event(
            "commit-tool-output",
            json!({ "toolId": tool_id, "content": content }),
        )
        .await;
        let _ = self.signals.tool_commit.send(());
    }

    /// Append a `flush` reset marker.
    pub async fn commit_flush(&self) {
        self.history
            .push(ModelMessage::flush(self.schema.agent_name.clone()))
            .await;
        self.emit_event("commit-flush", json!(null)).await;
    }

    /// Signal that the client moved to another agent; halts a running
    /// dispatch chain.
    pub async fn commit_agent_change(&self) {
        self.emit_event("commit-agent-change", json!(null)).await;
        let _ = self.signals.agent_change.send(());
    }

    /// Halt the remaining tool calls of the current batch.
    pub async fn commit_stop_tools(&self) {
        self.emit_event("commit-stop-tools", json!(null)).await;
        let _ = self.signals.tool_stop.send(());
    }

    /// Tear the agent instance down.
    pub fn dispose(&self) {
        debug!(
            client_id = %self.client_id,
            agent_name = %self.schema.agent_name,
            "agent disposed"
        );
        if let Some(on_dispose) = &self.schema.callbacks.on_dispose {
            on_dispose(&self.client_id, &self.schema.agent_name);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hive_core::completion::mock::MockCompletion;
    use hive_core::tool::SwarmTool;
    use hive_core::{AgentCallbacks, MessageRole};
    use parking_lot::Mutex as SyncMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Surface that relays commits back to the agent under test.
    #[derive(Default)]
    struct LoopbackSurface {
        agent: SyncMutex<Option<Arc<ClientAgent>>>,
    }

    impl LoopbackSurface {
        fn bind(&self, agent: Arc<ClientAgent>) {
            *self.agent.lock() = Some(agent);
        }

        fn agent(&self) -> Arc<ClientAgent> {
            self.agent.lock().clone().expect("surface not bound")
        }
    }

    #[async_trait]
    impl ToolSurface for LoopbackSurface {
        async fn commit_tool_output(
            &self,
            _client_id: &ClientId,
            _agent_name: &AgentName,
            tool_id: &ToolCallId,
            content: &str,
        ) -> Result<()> {
            self.agent().commit_tool_output(tool_id, content).await;
            Ok(())
        }

        async fn commit_system_message(
            &self,
            _client_id: &ClientId,
            _agent_name: &AgentName,
            content: &str,
        ) -> Result<()> {
            self.agent().commit_system_message(content).await;
            Ok(())
        }

        async fn commit_user_message(
            &self,
            _client_id: &ClientId,
            _agent_name: &AgentName,
            content: &str,
            mode: ExecutionMode,
        ) -> Result<()> {
            self.agent().commit_user_message(content, mode).await;
            Ok(())
        }

        async fn commit_assistant_message(
            &self,
            _client_id: &ClientId,
            _agent_name: &AgentName,
            content: &str,
        ) -> Result<()> {
            self.agent().commit_assistant_message(content).await;
            Ok(())
        }

        async fn commit_flush(&self, _client_id: &ClientId, _agent_name: &AgentName) -> Result<()> {
            self.agent().commit_flush().await;
            Ok(())
        }

        async fn commit_stop_tools(
            &self,
            _client_id: &ClientId,
            _agent_name: &AgentName,
        ) -> Result<()> {
            self.agent().commit_stop_tools().await;
            Ok(())
        }

        async fn change_to_agent(
            &self,
            _agent_name: &AgentName,
            _client_id: &ClientId,
        ) -> Result<()> {
            self.agent().commit_agent_change().await;
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

    /// Tool committing a fixed result.
    struct CommitTool {
        result: String,
    }

    #[async_trait]
    impl SwarmTool for CommitTool {
        fn function(&self) -> ToolFunction {
            ToolFunction {
                name: "commit".into(),
                description: "Commits a fixed result".into(),
                parameters: json!({"type": "object", "properties": {}}),
            }
        }

        async fn call(&self, request: ToolRequest, swarm: Arc<dyn ToolSurface>) -> Result<()> {
            swarm
                .commit_tool_output(
                    &request.client_id,
                    &request.agent_name,
                    &request.tool_id,
                    &self.result,
                )
                .await
        }
    }

    /// Tool whose body errors.
    struct FailTool;

    #[async_trait]
    impl SwarmTool for FailTool {
        fn function(&self) -> ToolFunction {
            ToolFunction {
                name: "fail".into(),
                description: "Always fails".into(),
                parameters: json!({"type": "object"}),
            }
        }

        async fn call(&self, request: ToolRequest, _swarm: Arc<dyn ToolSurface>) -> Result<()> {
            Err(SwarmError::Tool {
                tool_name: "fail".into(),
                tool_call_id: request.tool_id.as_str().to_owned(),
                message: "boom".into(),
            })
        }
    }

    /// Tool that navigates away instead of committing.
    struct NavigateTool;

    #[async_trait]
    impl SwarmTool for NavigateTool {
        fn function(&self) -> ToolFunction {
            ToolFunction {
                name: "navigate".into(),
                description: "Changes the active agent".into(),
                parameters: json!({"type": "object"}),
            }
        }

        async fn call(&self, request: ToolRequest, swarm: Arc<dyn ToolSurface>) -> Result<()> {
            swarm
                .change_to_agent(&AgentName::from("sales"), &request.client_id)
                .await
        }
    }

    /// Tool rejecting every request.
    struct RejectingTool;

    #[async_trait]
    impl SwarmTool for RejectingTool {
        fn function(&self) -> ToolFunction {
            ToolFunction {
                name: "reject".into(),
                description: "Rejects all parameters".into(),
                parameters: json!({"type": "object"}),
            }
        }

        async fn validate(&self, _request: &ToolRequest) -> bool {
            false
        }

        async fn call(&self, _request: ToolRequest, _swarm: Arc<dyn ToolSurface>) -> Result<()> {
            Ok(())
        }
    }

    struct AgentFixture {
        agent: Arc<ClientAgent>,
        completion: Arc<MockCompletion>,
        config: Arc<RwLock<RuntimeConfig>>,
    }

    fn fixture(
        schema: AgentSchema,
        completion: MockCompletion,
        tools: Vec<ToolSchema>,
    ) -> AgentFixture {
        let client_id = ClientId::from("c1");
        let bus = EventBus::new();
        let completion = Arc::new(completion);
        let surface = Arc::new(LoopbackSurface::default());
        let schema = Arc::new(schema);
        let config = Arc::new(RwLock::new(RuntimeConfig::default()));
        let history = Arc::new(MessageHistory::new(
            client_id.clone(),
            schema.agent_name.clone(),
            bus.clone(),
            AgentCallbacks::default(),
        ));
        let agent = Arc::new(ClientAgent::new(ClientAgentParams {
            client_id,
            schema,
            completion: completion.clone(),
            tools,
            history,
            bus,
            config: config.clone(),
            surface: surface.clone(),
        }));
        surface.bind(agent.clone());
        AgentFixture {
            agent,
            completion,
            config,
        }
    }

    fn schema() -> AgentSchema {
        AgentSchema::new("triage", "mock", "You are a triage agent.")
    }

    #[tokio::test]
    async fn execute_publishes_echoed_output() {
        let f = fixture(schema(), MockCompletion::echo(), vec![]);

        let wait = f.agent.signals().output.listen();
        f.agent.execute("hello", ExecutionMode::User).await.unwrap();
        assert_eq!(wait.await, "hello");

        let raw = f.agent.history().to_array_for_raw();
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[0].role, MessageRole::User);
        assert_eq!(raw[1].role, MessageRole::Assistant);
        assert_eq!(raw[1].content, "hello");
    }

    #[tokio::test]
    async fn execute_trims_incoming() {
        let f = fixture(schema(), MockCompletion::echo(), vec![]);
        let wait = f.agent.signals().output.listen();
        f.agent.execute("  padded  ", ExecutionMode::User).await.unwrap();
        assert_eq!(wait.await, "padded");
    }

    #[tokio::test]
    async fn tool_call_commits_and_turn_ends() {
        let completion = MockCompletion::new(|args| {
            ModelMessage::assistant(args.agent_name.clone(), "")
                .with_tool_calls(vec![ToolCall::new("commit", json!({}))])
        });
        let tools = vec![ToolSchema::new(
            "commit",
            Arc::new(CommitTool { result: "done".into() }),
        )];
        let f = fixture(schema().with_tools(vec!["commit".into()]), completion, tools);

        f.agent.execute("go", ExecutionMode::User).await.unwrap();

        let raw = f.agent.history().to_array_for_raw();
        // user, assistant(tool_calls), tool result
        assert_eq!(raw.len(), 3);
        assert_eq!(raw[2].role, MessageRole::Tool);
        assert_eq!(raw[2].content, "done");
    }

    #[tokio::test]
    async fn missing_tool_rescues_and_emits_placeholder() {
        let completion = MockCompletion::new(|args| {
            ModelMessage::assistant(args.agent_name.clone(), "")
                .with_tool_calls(vec![ToolCall::new("ghost", json!({}))])
        });
        let f = fixture(schema(), completion, vec![]);

        let rescue_seen = f.agent.signals().rescue.listen();
        let wait = f.agent.signals().output.listen();
        f.agent.execute("go", ExecutionMode::User).await.unwrap();
        let output = wait.await;
        rescue_seen.await;

        let config = RuntimeConfig::default();
        assert!(config.empty_output_placeholders.contains(&output));

        // Exactly one rescue: one resque marker plus its synthetic prompt.
        let raw = f.agent.history().to_array_for_raw();
        let resques = raw.iter().filter(|m| m.role == MessageRole::Resque).count();
        assert_eq!(resques, 1);
    }

    #[tokio::test]
    async fn failing_tool_rescues() {
        let completion = MockCompletion::new(|args| {
            ModelMessage::assistant(args.agent_name.clone(), "")
                .with_tool_calls(vec![ToolCall::new("fail", json!({}))])
        });
        let tools = vec![ToolSchema::new("fail", Arc::new(FailTool))];
        let f = fixture(schema().with_tools(vec!["fail".into()]), completion, tools);

        let wait = f.agent.signals().output.listen();
        f.agent.execute("go", ExecutionMode::User).await.unwrap();
        let output = wait.await;
        assert!(RuntimeConfig::default().empty_output_placeholders.contains(&output));
    }

    #[tokio::test]
    async fn tool_failure_rescue_goes_through_transform_and_history() {
        let completion = MockCompletion::new(|args| {
            ModelMessage::assistant(args.agent_name.clone(), "")
                .with_tool_calls(vec![ToolCall::new("fail", json!({}))])
        });
        let tools = vec![ToolSchema::new("fail", Arc::new(FailTool))];
        let agent_schema = schema()
            .with_tools(vec!["fail".into()])
            .with_transform(Arc::new(|s| format!("[{s}]")));
        let f = fixture(agent_schema, completion, tools);

        let wait = f.agent.signals().output.listen();
        f.agent.execute("go", ExecutionMode::User).await.unwrap();
        let output = wait.await;

        // The rescued reply passes the agent transform like any output.
        let inner = output
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .expect("transform not applied to rescued output");
        assert!(RuntimeConfig::default()
            .empty_output_placeholders
            .contains(&inner.to_owned()));

        // And it is persisted as the turn's assistant message.
        let raw = f.agent.history().to_array_for_raw();
        assert_eq!(raw.last().unwrap().role, MessageRole::Assistant);
        assert_eq!(raw.last().unwrap().content, output);
    }

    #[tokio::test]
    async fn rejecting_tool_rescues() {
        let completion = MockCompletion::new(|args| {
            ModelMessage::assistant(args.agent_name.clone(), "")
                .with_tool_calls(vec![ToolCall::new("reject", json!({}))])
        });
        let tools = vec![ToolSchema::new("reject", Arc::new(RejectingTool))];
        let f = fixture(schema().with_tools(vec!["reject".into()]), completion, tools);

        let wait = f.agent.signals().output.listen();
        f.agent.execute("go", ExecutionMode::User).await.unwrap();
        let _ = wait.await;

        // The rejected call never ran, so no tool result exists.
        let raw = f.agent.history().to_array_for_raw();
        assert!(!raw.iter().any(|m| m.role == MessageRole::Tool));
    }

    #[tokio::test]
    async fn agent_change_halts_remaining_calls() {
        let calls_made = Arc::new(AtomicUsize::new(0));
        let completion = MockCompletion::new(|args| {
            ModelMessage::assistant(args.agent_name.clone(), "").with_tool_calls(vec![
                ToolCall::new("navigate", json!({})),
                ToolCall::new("commit", json!({})),
            ])
        });
        let counter = calls_made.clone();
        let tools = vec![
            ToolSchema::new("navigate", Arc::new(NavigateTool)).with_callbacks(
                hive_core::ToolCallbacks {
                    on_before_call: Some(Arc::new(move |_| {
                        let _ = counter.fetch_add(1, Ordering::SeqCst);
                    })),
                    on_after_call: None,
                },
            ),
            ToolSchema::new("commit", Arc::new(CommitTool { result: "x".into() })),
        ];
        let f = fixture(
            schema().with_tools(vec!["navigate".into(), "commit".into()]),
            completion,
            tools,
        );

        f.agent.execute("go", ExecutionMode::User).await.unwrap();

        // Only the navigate call dispatched; commit never ran.
        assert_eq!(calls_made.load(Ordering::SeqCst), 1);
        let raw = f.agent.history().to_array_for_raw();
        assert!(!raw.iter().any(|m| m.role == MessageRole::Tool));
    }

    #[tokio::test]
    async fn max_tool_calls_truncates_dispatch_not_history() {
        let dispatched = Arc::new(AtomicUsize::new(0));
        let completion = MockCompletion::new(|args| {
            ModelMessage::assistant(args.agent_name.clone(), "").with_tool_calls(vec![
                ToolCall::new("commit", json!({})),
                ToolCall::new("commit", json!({})),
                ToolCall::new("commit", json!({})),
            ])
        });
        let counter = dispatched.clone();
        let tools = vec![ToolSchema::new(
            "commit",
            Arc::new(CommitTool { result: "r".into() }),
        )
        .with_callbacks(hive_core::ToolCallbacks {
            on_before_call: Some(Arc::new(move |_| {
                let _ = counter.fetch_add(1, Ordering::SeqCst);
            })),
            on_after_call: None,
        })];
        let f = fixture(
            schema().with_tools(vec!["commit".into()]).with_max_tool_calls(2),
            completion,
            tools,
        );

        f.agent.execute("go", ExecutionMode::User).await.unwrap();
        assert_eq!(dispatched.load(Ordering::SeqCst), 2);

        // History keeps the assistant message with all three calls.
        let raw = f.agent.history().to_array_for_raw();
        let assistant = raw.iter().find(|m| m.has_tool_calls()).unwrap();
        assert_eq!(assistant.tool_calls.as_ref().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn tool_call_ids_are_normalized() {
        let completion = MockCompletion::new(|args| {
            let call = ToolCall {
                id: String::new(),
                call_type: String::new(),
                function: hive_core::FunctionCall {
                    name: "commit".into(),
                    arguments: json!({}),
                },
            };
            ModelMessage::assistant(args.agent_name.clone(), "").with_tool_calls(vec![call])
        });
        let tools = vec![ToolSchema::new(
            "commit",
            Arc::new(CommitTool { result: "ok".into() }),
        )];
        let f = fixture(schema().with_tools(vec!["commit".into()]), completion, tools);

        f.agent.execute("go", ExecutionMode::User).await.unwrap();

        let raw = f.agent.history().to_array_for_raw();
        let assistant = raw.iter().find(|m| m.has_tool_calls()).unwrap();
        let call = &assistant.tool_calls.as_ref().unwrap()[0];
        assert!(!call.id.is_empty());
        assert_eq!(call.call_type, "function");
    }

    #[tokio::test]
    async fn invalid_output_flush_rescue_emits_placeholder() {
        let agent_schema = schema().with_validate(Arc::new(|out| {
            (out == "invalid").then(|| "bad".to_owned())
        }));
        let completion =
            MockCompletion::new(|args| ModelMessage::assistant(args.agent_name.clone(), "invalid"));
        let f = fixture(agent_schema, completion, vec![]);

        let wait = f.agent.signals().output.listen();
        f.agent.execute("go", ExecutionMode::User).await.unwrap();
        let output = wait.await;
        assert!(RuntimeConfig::default().empty_output_placeholders.contains(&output));
        assert_eq!(f.completion.call_count(), 1);
    }

    #[tokio::test]
    async fn recomplete_rescue_asks_model_again() {
        let agent_schema = schema().with_validate(Arc::new(|out| {
            (out == "invalid").then(|| "bad".to_owned())
        }));
        let completion = MockCompletion::new(|args| {
            // Invalid first, fine after the recomplete prompt was recorded.
            let recompleted = args
                .messages
                .iter()
                .any(|m| m.role == MessageRole::Resque);
            if recompleted {
                ModelMessage::assistant(args.agent_name.clone(), "better")
            } else {
                ModelMessage::assistant(args.agent_name.clone(), "invalid")
            }
        });
        let f = fixture(agent_schema, completion, vec![]);
        f.config.write().rescue_strategy = RescueStrategy::Recomplete;

        let wait = f.agent.signals().output.listen();
        f.agent.execute("go", ExecutionMode::User).await.unwrap();
        assert_eq!(wait.await, "better");
        assert_eq!(f.completion.call_count(), 2);
    }

    #[tokio::test]
    async fn recompleted_output_is_transformed_once() {
        let agent_schema = schema()
            .with_transform(Arc::new(|s| format!("[{s}]")))
            .with_validate(Arc::new(|out| {
                (out == "[invalid]").then(|| "bad".to_owned())
            }));
        let completion = MockCompletion::new(|args| {
            let recompleted = args
                .messages
                .iter()
                .any(|m| m.role == MessageRole::Resque);
            if recompleted {
                ModelMessage::assistant(args.agent_name.clone(), "better")
            } else {
                ModelMessage::assistant(args.agent_name.clone(), "invalid")
            }
        });
        let f = fixture(agent_schema, completion, vec![]);
        f.config.write().rescue_strategy = RescueStrategy::Recomplete;

        let wait = f.agent.signals().output.listen();
        f.agent.execute("go", ExecutionMode::User).await.unwrap();
        // Exactly one application of the transform, not "[[better]]".
        assert_eq!(wait.await, "[better]");
    }

    #[tokio::test]
    async fn custom_rescue_uses_callback() {
        let agent_schema = schema().with_validate(Arc::new(|out| {
            (out == "invalid").then(|| "bad".to_owned())
        }));
        let completion =
            MockCompletion::new(|args| ModelMessage::assistant(args.agent_name.clone(), "invalid"));
        let f = fixture(agent_schema, completion, vec![]);
        {
            let mut config = f.config.write();
            config.rescue_strategy = RescueStrategy::Custom;
            config.custom_rescue = Some(Arc::new(|_, agent_name| {
                ModelMessage::assistant(agent_name.clone(), "replaced")
            }));
        }

        let wait = f.agent.signals().output.listen();
        f.agent.execute("go", ExecutionMode::User).await.unwrap();
        assert_eq!(wait.await, "replaced");
    }

    #[tokio::test]
    async fn rescue_failure_is_fatal() {
        // Validation rejects everything, placeholders included.
        let agent_schema =
            schema().with_validate(Arc::new(|_| Some("never valid".to_owned())));
        let completion =
            MockCompletion::new(|args| ModelMessage::assistant(args.agent_name.clone(), "x"));
        let f = fixture(agent_schema, completion, vec![]);

        let err = f.agent.execute("go", ExecutionMode::User).await.unwrap_err();
        assert!(err.is_rescue_failure());
    }

    #[tokio::test]
    async fn run_is_stateless() {
        let f = fixture(schema(), MockCompletion::echo(), vec![]);
        let out = f.agent.run("ping").await.unwrap();
        assert_eq!(out, "ping");
        assert!(f.agent.history().is_empty());
    }

    #[tokio::test]
    async fn run_returns_empty_on_tool_calls() {
        let completion = MockCompletion::new(|args| {
            ModelMessage::assistant(args.agent_name.clone(), "text")
                .with_tool_calls(vec![ToolCall::new("commit", json!({}))])
        });
        let f = fixture(schema(), completion, vec![]);
        assert_eq!(f.agent.run("ping").await.unwrap(), "");
    }

    #[tokio::test]
    async fn run_returns_empty_on_invalid_output() {
        let agent_schema =
            schema().with_validate(Arc::new(|_| Some("rejected".to_owned())));
        let f = fixture(agent_schema, MockCompletion::echo(), vec![]);
        assert_eq!(f.agent.run("ping").await.unwrap(), "");
    }

    #[tokio::test]
    async fn commits_append_without_completion() {
        let f = fixture(schema(), MockCompletion::echo(), vec![]);
        f.agent.commit_user_message("u", ExecutionMode::User).await;
        f.agent.commit_assistant_message("a").await;
        f.agent.commit_system_message("s").await;
        f.agent.commit_flush().await;

        let raw = f.agent.history().to_array_for_raw();
        assert_eq!(raw.len(), 4);
        assert_eq!(f.completion.call_count(), 0);
        assert!(raw[3].is_flush());
    }

    #[tokio::test]
    async fn commit_tool_output_fires_signal() {
        let f = fixture(schema(), MockCompletion::echo(), vec![]);
        let commit = f.agent.signals().tool_commit.listen();
        f.agent
            .commit_tool_output(&ToolCallId::from("tc-1"), "result")
            .await;
        commit.await;

        let raw = f.agent.history().to_array_for_raw();
        assert_eq!(raw[0].tool_call_id, Some(ToolCallId::from("tc-1")));
    }

    #[tokio::test]
    async fn executes_are_serialized_per_agent() {
        let f = fixture(
            schema(),
            MockCompletion::echo().with_delay(Duration::from_millis(10)),
            vec![],
        );

        let mut outputs = Vec::new();
        for text in ["one", "two"] {
            let wait = f.agent.signals().output.listen();
            f.agent.execute(text, ExecutionMode::User).await.unwrap();
            outputs.push(wait.await);
        }
        assert_eq!(outputs, vec!["one", "two"]);

        let raw = f.agent.history().to_array_for_raw();
        let roles: Vec<MessageRole> = raw.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User,
                MessageRole::Assistant
            ]
        );
    }
}
