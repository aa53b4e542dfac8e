//! Schemas the embedder registers: agents, swarms, storages, states.
//!
//! Tool, completion, and embedding schemas live next to their traits in
//! [`crate::tool`], [`crate::completion`], and [`crate::embedding`].

pub mod agent;
pub mod state;
pub mod storage;
pub mod swarm;

pub use agent::{AgentCallbacks, AgentSchema, MapFn, TransformFn, ValidateFn};
pub use state::{StateCallbacks, StateSchema};
pub use storage::{StorageCallbacks, StorageItem, StorageSchema};
pub use swarm::{SwarmCallbacks, SwarmSchema};
