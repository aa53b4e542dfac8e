//! # hive-core
//!
//! Core types of the hive agent swarm runtime: branded IDs, the message
//! model, registrable schemas, the completion/embedding/tool abstractions,
//! bus event shapes, runtime configuration, the signal coordination
//! primitive, and the ambient context scopes.
//!
//! Everything here is runtime-free data and traits; the orchestration logic
//! lives in `hive-runtime`, the embedder surface in `hive`.

pub mod completion;
pub mod config;
pub mod embedding;
pub mod errors;
pub mod events;
pub mod ids;
pub mod messages;
pub mod schema;
pub mod scope;
pub mod signal;
pub mod tool;

pub use completion::{Completion, CompletionArgs, CompletionSchema};
pub use config::{RescueStrategy, RuntimeConfig};
pub use embedding::{Embedding, EmbeddingSchema, Embeddings};
pub use errors::{Result, SchemaKind, SwarmError};
pub use events::{EventContext, EventSource, SwarmEvent};
pub use ids::{
    AgentName, ClientId, CompletionName, EmbeddingName, ExecutionId, StateName, StorageName,
    SwarmName, ToolCallId, ToolName,
};
pub use messages::{ExecutionMode, FunctionCall, MessageRole, ModelMessage, ToolCall, ToolFunction};
pub use schema::{
    AgentCallbacks, AgentSchema, StateCallbacks, StateSchema, StorageCallbacks, StorageItem,
    StorageSchema, SwarmCallbacks, SwarmSchema,
};
pub use scope::{clean_scope, ExecutionContext, MethodContext};
pub use signal::{Signal, SignalListener};
pub use tool::{SwarmTool, ToolCallbacks, ToolRequest, ToolSchema, ToolSurface};
