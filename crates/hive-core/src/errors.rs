//! Error hierarchy for the hive runtime.
//!
//! A single [`SwarmError`] enum covers all error domains. Recoverable turn
//! failures (missing tool, invalid model output, tool errors) never surface
//! through this type — they are handled by the rescue path inside the turn
//! engine. What's left is the fail-fast surface: registration, validation,
//! lookup, persistence, and rescue-itself-failed.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{AgentName, ClientId, CompletionName, SwarmName, ToolName};

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, SwarmError>;

/// Kind of registered schema, used in lookup/validation errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    /// Agent schema.
    Agent,
    /// Tool schema.
    Tool,
    /// Swarm schema.
    Swarm,
    /// Completion schema.
    Completion,
    /// Embedding schema.
    Embedding,
    /// Storage schema.
    Storage,
    /// State schema.
    State,
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agent => write!(f, "agent"),
            Self::Tool => write!(f, "tool"),
            Self::Swarm => write!(f, "swarm"),
            Self::Completion => write!(f, "completion"),
            Self::Embedding => write!(f, "embedding"),
            Self::Storage => write!(f, "storage"),
            Self::State => write!(f, "state"),
        }
    }
}

/// Persistence operation that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistOperation {
    /// Reading from disk.
    Read,
    /// Writing to disk.
    Write,
    /// Removing from disk.
    Remove,
    /// Scanning a directory at init.
    Init,
}

impl fmt::Display for PersistOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Remove => write!(f, "remove"),
            Self::Init => write!(f, "init"),
        }
    }
}

/// Top-level error type for the hive runtime.
#[derive(Debug, Error)]
pub enum SwarmError {
    /// A schema lookup failed.
    #[error("{kind} schema not found: {name} (requested by {source_label})")]
    SchemaNotFound {
        /// Kind of the missing schema.
        kind: SchemaKind,
        /// Name that was looked up.
        name: String,
        /// Caller description included for diagnostics.
        source_label: String,
    },

    /// A public entry referenced a client with no live session.
    #[error("session not found for client {client_id} (requested by {source_label})")]
    SessionNotFound {
        /// Client without a session.
        client_id: ClientId,
        /// Caller description.
        source_label: String,
    },

    /// Navigation targeted an agent outside the session's swarm.
    #[error("agent {agent_name} is not part of swarm {swarm_name}")]
    AgentNotInSwarm {
        /// The requested agent.
        agent_name: AgentName,
        /// The swarm bound to the session.
        swarm_name: SwarmName,
    },

    /// Cross-reference validation failed.
    #[error("{kind} {name} failed validation: {message} (requested by {source_label})")]
    Validation {
        /// Kind of the invalid entity.
        kind: SchemaKind,
        /// Name of the invalid entity.
        name: String,
        /// What was wrong.
        message: String,
        /// Caller description.
        source_label: String,
    },

    /// An agent-addressed entry targeted an agent that is not active
    /// for the client (use the `*_force` variant to skip the guard).
    #[error("agent {agent_name} is not the active agent for client {client_id}")]
    AgentNotActive {
        /// The requested agent.
        agent_name: AgentName,
        /// The client whose active agent differs.
        client_id: ClientId,
    },

    /// The completion back-end failed.
    #[error("completion {name} failed: {message}")]
    Completion {
        /// The completion that failed.
        name: CompletionName,
        /// Back-end error description.
        message: String,
    },

    /// The embedding back-end failed.
    #[error("embedding failed: {message}")]
    Embedding {
        /// Back-end error description.
        message: String,
    },

    /// A tool body returned an error. Observed by the dispatcher as the
    /// `toolError` signal; surfaces only if the follow-up rescue fails.
    #[error("tool {tool_name} (call {tool_call_id}) failed: {message}")]
    Tool {
        /// The failing tool.
        tool_name: ToolName,
        /// The call that failed.
        tool_call_id: String,
        /// Tool error description.
        message: String,
    },

    /// Model rescue itself produced invalid output — fatal for the turn.
    #[error("model rescue failed for agent {agent_name} (client {client_id}): {message}")]
    RescueFailed {
        /// Agent whose output could not be rescued.
        agent_name: AgentName,
        /// Client owning the turn.
        client_id: ClientId,
        /// The validation message of the final attempt.
        message: String,
    },

    /// Persistence failure. Corrupt reads during init are self-healed and
    /// never produce this; writes always surface.
    #[error("persistence {operation} failed at {path}: {message}")]
    Persistence {
        /// Operation that failed.
        operation: PersistOperation,
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error description.
        message: String,
    },
}

impl SwarmError {
    /// Create a persistence error from an I/O error.
    #[must_use]
    pub fn persist_io(operation: PersistOperation, path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self::Persistence {
            operation,
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Whether this error is fatal for the whole turn (rescue exhausted).
    #[must_use]
    pub fn is_rescue_failure(&self) -> bool {
        matches!(self, Self::RescueFailed { .. })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_not_found_display() {
        let err = SwarmError::SchemaNotFound {
            kind: SchemaKind::Agent,
            name: "triage".into(),
            source_label: "swarm support".into(),
        };
        let text = err.to_string();
        assert!(text.contains("agent"));
        assert!(text.contains("triage"));
        assert!(text.contains("swarm support"));
    }

    #[test]
    fn agent_not_in_swarm_display() {
        let err = SwarmError::AgentNotInSwarm {
            agent_name: AgentName::from("rogue"),
            swarm_name: SwarmName::from("support"),
        };
        assert!(err.to_string().contains("rogue"));
        assert!(err.to_string().contains("support"));
    }

    #[test]
    fn rescue_failed_is_fatal() {
        let err = SwarmError::RescueFailed {
            agent_name: AgentName::from("triage"),
            client_id: ClientId::from("c1"),
            message: "output rejected twice".into(),
        };
        assert!(err.is_rescue_failure());
        assert!(err.to_string().contains("c1"));
    }

    #[test]
    fn persist_io_carries_path() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = SwarmError::persist_io(PersistOperation::Write, "/tmp/x.json", &io);
        assert!(err.to_string().contains("/tmp/x.json"));
        assert!(err.to_string().contains("denied"));
        assert!(!err.is_rescue_failure());
    }

    #[test]
    fn schema_kind_display() {
        assert_eq!(SchemaKind::Storage.to_string(), "storage");
        assert_eq!(SchemaKind::Completion.to_string(), "completion");
    }

    #[test]
    fn is_std_error() {
        let err = SwarmError::Embedding {
            message: "dim mismatch".into(),
        };
        let _: &dyn std::error::Error = &err;
    }
}
