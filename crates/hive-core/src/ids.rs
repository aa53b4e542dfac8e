//! Branded ID newtypes for type safety.
//!
//! Every entity in the hive system has a distinct ID type implemented as a
//! newtype wrapper around `String`. This prevents accidentally passing a
//! client ID where an agent name is expected.
//!
//! Two flavors: *generated* IDs ([`ToolCallId`], [`ExecutionId`]) can mint a
//! fresh random value; *names* ([`AgentName`], [`SwarmName`], …) are always
//! chosen by the embedder and only convert from strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_string {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

macro_rules! generated_id {
    ($(#[$meta:meta])* $name:ident, $gen:expr) => {
        branded_string! {
            $(#[$meta])*
            $name
        }

        impl $name {
            /// Mint a fresh random ID.
            #[must_use]
            pub fn generate() -> Self {
                Self($gen)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::generate()
            }
        }
    };
}

branded_string! {
    /// Opaque identifier for a connected client. One per conversational
    /// session; the wildcard value `"*"` subscribes across all clients on
    /// the event bus.
    ClientId
}

impl ClientId {
    /// The bus wildcard matching every client.
    #[must_use]
    pub fn wildcard() -> Self {
        Self("*".to_owned())
    }

    /// Whether this is the bus wildcard.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.0 == "*"
    }
}

branded_string! {
    /// Unique name of a registered agent schema.
    AgentName
}

branded_string! {
    /// Unique name of a registered tool schema.
    ToolName
}

branded_string! {
    /// Unique name of a registered swarm schema.
    SwarmName
}

branded_string! {
    /// Unique name of a registered completion back-end.
    CompletionName
}

branded_string! {
    /// Unique name of a registered embedding back-end.
    EmbeddingName
}

branded_string! {
    /// Unique name of a registered storage schema.
    StorageName
}

branded_string! {
    /// Unique name of a registered state schema.
    StateName
}

generated_id! {
    /// Identifier of a single tool call within a turn. Minted (UUID v4)
    /// when the model omits one; the generated value is not reconciled
    /// with the completion back-end.
    ToolCallId,
    Uuid::new_v4().to_string()
}

generated_id! {
    /// Identifier of one turn execution (UUID v7, time-ordered).
    ExecutionId,
    Uuid::now_v7().to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_id_generate_is_uuid() {
        let id = ToolCallId::generate();
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn execution_id_is_uuid_v7() {
        let id = ExecutionId::generate();
        let parsed = Uuid::parse_str(id.as_str()).expect("should be valid UUID");
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(ToolCallId::generate(), ToolCallId::generate());
        assert_ne!(ExecutionId::default(), ExecutionId::default());
    }

    #[test]
    fn client_id_wildcard() {
        assert!(ClientId::wildcard().is_wildcard());
        assert!(!ClientId::from("c1").is_wildcard());
    }

    #[test]
    fn from_str_ref() {
        let name = AgentName::from("triage");
        assert_eq!(name.as_str(), "triage");
    }

    #[test]
    fn deref_to_str() {
        let name = SwarmName::from("support");
        let s: &str = &name;
        assert_eq!(s, "support");
    }

    #[test]
    fn display() {
        let name = ToolName::from("navigate");
        assert_eq!(format!("{name}"), "navigate");
    }

    #[test]
    fn into_string() {
        let id = ClientId::from("c1");
        let s: String = id.into();
        assert_eq!(s, "c1");
    }

    #[test]
    fn serde_roundtrip() {
        let id = ClientId::from("serde-test");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"serde-test\"");
        let back: ClientId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn hash_and_eq() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        let name = AgentName::from("same");
        let _ = set.insert(name.clone());
        let _ = set.insert(name);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn into_inner() {
        let name = StateName::from("inner");
        assert_eq!(name.into_inner(), "inner");
    }
}
