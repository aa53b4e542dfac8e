//! Per-(client, agent) message history.
//!
//! The raw log is append-only. The agent projection used for completion
//! calls is filtered: it restarts after the most recent `flush` marker,
//! keeps only messages of this agent plus user/assistant messages, and is
//! truncated to the configured keep-last-N without splitting a tool-call
//! message from its tool-result replies.

use parking_lot::Mutex;
use serde_json::json;
use tracing::debug;

use hive_bus::EventBus;
use hive_core::{
    AgentCallbacks, AgentName, ClientId, EventContext, EventSource, MessageRole, ModelMessage,
    SwarmEvent,
};

/// Append-only message log for one (client, agent) pair.
pub struct MessageHistory {
    client_id: ClientId,
    agent_name: AgentName,
    bus: EventBus,
    callbacks: AgentCallbacks,
    messages: Mutex<Vec<ModelMessage>>,
}

impl MessageHistory {
    /// Create an empty history.
    #[must_use]
    pub fn new(
        client_id: ClientId,
        agent_name: AgentName,
        bus: EventBus,
        callbacks: AgentCallbacks,
    ) -> Self {
        Self {
            client_id,
            agent_name,
            bus,
            callbacks,
            messages: Mutex::new(Vec::new()),
        }
    }

    /// The agent this history belongs to.
    #[must_use]
    pub fn agent_name(&self) -> &AgentName {
        &self.agent_name
    }

    /// Append a message, fire the push callback, emit a history-bus event.
    pub async fn push(&self, message: ModelMessage) {
        if let Some(on_push) = &self.callbacks.on_history_push {
            on_push(&self.client_id, &self.agent_name, &message);
        }
        let event = SwarmEvent::now(EventSource::HistoryBus, self.client_id.clone(), "push")
            .with_input(json!({
                "role": message.role,
                "content": message.content,
            }))
            .with_context(EventContext {
                agent_name: Some(self.agent_name.clone()),
                ..EventContext::default()
            });
        self.messages.lock().push(message);
        self.bus.emit(&self.client_id, event).await;
    }

    /// The entire raw log, in push order.
    #[must_use]
    pub fn to_array_for_raw(&self) -> Vec<ModelMessage> {
        self.messages.lock().clone()
    }

    /// Number of raw messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// Whether the raw log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    /// Prompt/system preamble followed by the filtered projection.
    ///
    /// `keep` bounds the projected log length (the preamble is not
    /// counted).
    #[must_use]
    pub fn to_array_for_agent(
        &self,
        prompt: &str,
        system: &[String],
        keep: usize,
    ) -> Vec<ModelMessage> {
        let mut result = Vec::new();
        if !prompt.is_empty() {
            result.push(ModelMessage::system(self.agent_name.clone(), prompt));
        }
        for line in system {
            result.push(ModelMessage::system(self.agent_name.clone(), line.clone()));
        }

        let messages = self.messages.lock();

        // The projection restarts after the most recent flush marker.
        let start = messages
            .iter()
            .rposition(ModelMessage::is_flush)
            .map_or(0, |i| i + 1);

        let mut filtered: Vec<ModelMessage> = messages[start..]
            .iter()
            .filter(|m| {
                m.agent_name == self.agent_name
                    || matches!(m.role, MessageRole::User | MessageRole::Assistant)
            })
            .cloned()
            .collect();

        if filtered.len() > keep {
            let mut cut = filtered.len() - keep;
            // Never lead with orphaned tool results whose tool-call
            // message fell off the truncation boundary.
            while cut < filtered.len() && filtered[cut].role == MessageRole::Tool {
                cut += 1;
            }
            filtered.drain(..cut);
        }

        result.extend(filtered);
        result
    }

    /// Tear the history down.
    pub fn dispose(&self) {
        debug!(client_id = %self.client_id, agent_name = %self.agent_name, "history disposed");
        self.messages.lock().clear();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
