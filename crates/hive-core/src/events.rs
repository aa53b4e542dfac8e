//! Bus event types.
//!
//! Every observable action in the runtime emits a [`SwarmEvent`] on one of
//! six source topics. Subscribers filter by `(client_id, source)`; payloads
//! are untyped JSON so embedders can attach whatever their tooling needs.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{AgentName, ClientId, StateName, StorageName, SwarmName};

/// Source topic an event was emitted on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventSource {
    /// Turn engine events (execute, run, commits, rescue, output).
    #[serde(rename = "agent-bus")]
    AgentBus,
    /// History push/flush events.
    #[serde(rename = "history-bus")]
    HistoryBus,
    /// Session lifecycle and connector events.
    #[serde(rename = "session-bus")]
    SessionBus,
    /// State read/write events.
    #[serde(rename = "state-bus")]
    StateBus,
    /// Storage mutation/search events.
    #[serde(rename = "storage-bus")]
    StorageBus,
    /// Active-agent and navigation events.
    #[serde(rename = "swarm-bus")]
    SwarmBus,
}

impl EventSource {
    /// All sources, in a stable order.
    pub const ALL: [EventSource; 6] = [
        EventSource::AgentBus,
        EventSource::HistoryBus,
        EventSource::SessionBus,
        EventSource::StateBus,
        EventSource::StorageBus,
        EventSource::SwarmBus,
    ];
}

/// Resource names resolved from the ambient method context at emit time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    /// Agent involved, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<AgentName>,
    /// Swarm involved, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swarm_name: Option<SwarmName>,
    /// Storage involved, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_name: Option<StorageName>,
    /// State involved, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_name: Option<StateName>,
}

/// An observable runtime event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmEvent {
    /// Topic the event was emitted on.
    pub source: EventSource,
    /// Client the event belongs to.
    pub client_id: ClientId,
    /// Machine-readable event type, e.g. `"emit-output"` or `"commit-flush"`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Operation input payload.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub input: Value,
    /// Operation output payload.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub output: Value,
    /// Resource names involved.
    #[serde(default)]
    pub context: EventContext,
    /// Emit timestamp (RFC 3339).
    pub timestamp: String,
}

impl SwarmEvent {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn now(
        source: EventSource,
        client_id: ClientId,
        event_type: impl Into<String>,
    ) -> Self {
        Self {
            source,
            client_id,
            event_type: event_type.into(),
            input: Value::Null,
            output: Value::Null,
            context: EventContext::default(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Set the input payload (builder-style).
    #[must_use]
    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    /// Set the output payload (builder-style).
    #[must_use]
    pub fn with_output(mut self, output: Value) -> Self {
        self.output = output;
        self
    }

    /// Set the resource context (builder-style).
    #[must_use]
    pub fn with_context(mut self, context: EventContext) -> Self {
        self.context = context;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
