//! Message types for the swarm conversation model.
//!
//! [`ModelMessage`] is the single record type flowing through history, the
//! completion back-end, and the bus. Roles cover the usual conversation
//! roles plus two runtime markers: `resque` (a model-rescue attempt was
//! recorded here) and `flush` (logical history reset for projection
//! purposes — raw history is never deleted).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{AgentName, ToolCallId};

// ─────────────────────────────────────────────────────────────────────────────
// Roles and modes
// ─────────────────────────────────────────────────────────────────────────────

/// Conversation role of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Model output.
    Assistant,
    /// System instruction.
    System,
    /// Tool result referencing a `tool_call_id`.
    Tool,
    /// Human or tool-injected input (see [`ExecutionMode`]).
    User,
    /// Rescue marker appended when the model produced unusable output.
    Resque,
    /// Logical reset marker — history projection restarts after it.
    Flush,
}

/// Distinguishes human input from tool-injected input. History filters and
/// callbacks use this to tell the two apart; the wire role is `user` either
/// way.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Input originating from the connected client.
    #[default]
    User,
    /// Input injected by a tool mid-turn.
    Tool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool calls
// ─────────────────────────────────────────────────────────────────────────────

/// The function part of a tool call: name plus untyped JSON arguments.
///
/// Argument validation is the tool's responsibility — the runtime never
/// types arbitrary tool parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Target function name.
    pub name: String,
    /// JSON arguments as produced by the model.
    #[serde(default)]
    pub arguments: Value,
}

/// A tool call emitted by the assistant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID. May arrive empty from the model; [`ToolCall::normalize`]
    /// mints one in that case.
    #[serde(default)]
    pub id: String,
    /// Discriminator tag — always `"function"`.
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,
    /// The requested function invocation.
    pub function: FunctionCall,
}

fn function_type() -> String {
    "function".to_owned()
}

impl ToolCall {
    /// Create a call with a generated ID.
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: ToolCallId::generate().into_inner(),
            call_type: function_type(),
            function: FunctionCall {
                name: name.into(),
                arguments,
            },
        }
    }

    /// Ensure the call has an ID and the `"function"` type tag.
    ///
    /// Models occasionally omit ids; the minted value is local to this
    /// process and is not reported back to the completion back-end.
    pub fn normalize(&mut self) {
        if self.id.is_empty() {
            self.id = ToolCallId::generate().into_inner();
        }
        if self.call_type.is_empty() {
            self.call_type = function_type();
        }
    }
}

/// Wire schema of a callable function, sent to the completion back-end.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolFunction {
    /// Function name — the exact string the model calls.
    pub name: String,
    /// Human/model-readable description.
    pub description: String,
    /// JSON Schema of the parameters.
    pub parameters: Value,
}

// ─────────────────────────────────────────────────────────────────────────────
// ModelMessage
// ─────────────────────────────────────────────────────────────────────────────

/// A single conversation record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMessage {
    /// Conversation role.
    pub role: MessageRole,
    /// Agent this message belongs to.
    pub agent_name: AgentName,
    /// Human vs. tool-injected input.
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Text content.
    pub content: String,
    /// Tool calls requested by an assistant message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// For `tool` role messages: the call this result answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<ToolCallId>,
}

impl ModelMessage {
    /// Create a user message.
    #[must_use]
    pub fn user(agent_name: AgentName, content: impl Into<String>, mode: ExecutionMode) -> Self {
        Self {
            role: MessageRole::User,
            agent_name,
            mode,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create an assistant message.
    #[must_use]
    pub fn assistant(agent_name: AgentName, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            agent_name,
            mode: ExecutionMode::Tool,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a system message.
    #[must_use]
    pub fn system(agent_name: AgentName, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            agent_name,
            mode: ExecutionMode::Tool,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a tool result message answering `tool_call_id`.
    #[must_use]
    pub fn tool(
        agent_name: AgentName,
        tool_call_id: ToolCallId,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: MessageRole::Tool,
            agent_name,
            mode: ExecutionMode::Tool,
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(tool_call_id),
        }
    }

    /// Create a `flush` reset marker.
    #[must_use]
    pub fn flush(agent_name: AgentName) -> Self {
        Self {
            role: MessageRole::Flush,
            agent_name,
            mode: ExecutionMode::Tool,
            content: String::new(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a `resque` rescue marker.
    #[must_use]
    pub fn resque(agent_name: AgentName, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Resque,
            agent_name,
            mode: ExecutionMode::Tool,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Attach tool calls (builder-style).
    #[must_use]
    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.tool_calls = Some(calls);
        self
    }

    /// Whether this message carries at least one tool call.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// Whether this is the `flush` reset marker.
    #[must_use]
    pub fn is_flush(&self) -> bool {
        self.role == MessageRole::Flush
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn agent() -> AgentName {
        AgentName::from("triage")
    }

    // -- ToolCall --

    #[test]
    fn tool_call_new_has_id_and_type() {
        let tc = ToolCall::new("navigate", json!({"to": "sales"}));
        assert!(!tc.id.is_empty());
        assert_eq!(tc.call_type, "function");
        assert_eq!(tc.function.name, "navigate");
    }

    #[test]
    fn normalize_mints_missing_id() {
        let mut tc = ToolCall {
            id: String::new(),
            call_type: String::new(),
            function: FunctionCall {
                name: "navigate".into(),
                arguments: json!({}),
            },
        };
        tc.normalize();
        assert!(!tc.id.is_empty());
        assert_eq!(tc.call_type, "function");
    }

    #[test]
    fn normalize_keeps_existing_id() {
        let mut tc = ToolCall::new("navigate", json!({}));
        let id = tc.id.clone();
        tc.normalize();
        assert_eq!(tc.id, id);
    }

    #[test]
    fn tool_call_deserializes_without_id() {
        let tc: ToolCall =
            serde_json::from_value(json!({"function": {"name": "f", "arguments": {}}})).unwrap();
        assert!(tc.id.is_empty());
        assert_eq!(tc.call_type, "function");
    }

    #[test]
    fn tool_call_serde_roundtrip() {
        let tc = ToolCall::new("navigate", json!({"to": "refund"}));
        let json = serde_json::to_value(&tc).unwrap();
        assert_eq!(json["type"], "function");
        let back: ToolCall = serde_json::from_value(json).unwrap();
        assert_eq!(tc, back);
    }

    // -- roles / modes --

    #[test]
    fn role_serde() {
        assert_eq!(
            serde_json::to_string(&MessageRole::Resque).unwrap(),
            "\"resque\""
        );
        assert_eq!(
            serde_json::to_string(&MessageRole::Flush).unwrap(),
            "\"flush\""
        );
    }

    #[test]
    fn mode_default_is_user() {
        assert_eq!(ExecutionMode::default(), ExecutionMode::User);
    }

    // -- ModelMessage --

    #[test]
    fn user_message() {
        let msg = ModelMessage::user(agent(), "hello", ExecutionMode::User);
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.content, "hello");
        assert!(!msg.has_tool_calls());
    }

    #[test]
    fn assistant_with_tool_calls() {
        let msg = ModelMessage::assistant(agent(), "")
            .with_tool_calls(vec![ToolCall::new("navigate", json!({}))]);
        assert!(msg.has_tool_calls());
    }

    #[test]
    fn empty_tool_calls_is_not_has_tool_calls() {
        let msg = ModelMessage::assistant(agent(), "text").with_tool_calls(vec![]);
        assert!(!msg.has_tool_calls());
    }

    #[test]
    fn tool_result_references_call() {
        let id = ToolCallId::from("tc-1");
        let msg = ModelMessage::tool(agent(), id.clone(), "done");
        assert_eq!(msg.role, MessageRole::Tool);
        assert_eq!(msg.tool_call_id, Some(id));
    }

    #[test]
    fn flush_marker() {
        let msg = ModelMessage::flush(agent());
        assert!(msg.is_flush());
        assert!(msg.content.is_empty());
    }

    #[test]
    fn serde_roundtrip() {
        let msg = ModelMessage::user(agent(), "test", ExecutionMode::Tool);
        let json = serde_json::to_string(&msg).unwrap();
        let back: ModelMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn serde_camel_case_fields() {
        let msg = ModelMessage::tool(agent(), ToolCallId::from("tc-9"), "ok");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["agentName"], "triage");
        assert_eq!(json["toolCallId"], "tc-9");
    }
}
