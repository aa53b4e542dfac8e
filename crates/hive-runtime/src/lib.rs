//! # hive-runtime
//!
//! The execution core of the hive agent swarm runtime: schema registries,
//! cross-reference validation, per-(client, agent) histories, the
//! [`ClientAgent`](agent::ClientAgent) turn engine, the
//! [`ClientSwarm`](swarm::ClientSwarm) controller, the
//! [`ClientSession`](session::ClientSession) gateway, memoized connection
//! caches, storage/state clients, and the [`SwarmRuntime`](runtime::SwarmRuntime)
//! container that wires them together.
//!
//! Embedders normally consume the `hive` facade crate instead of this one.

pub mod agent;
pub mod connections;
pub mod history;
pub mod registry;
pub mod runtime;
pub mod session;
pub mod state;
pub mod storage;
pub mod swarm;
pub mod validation;

pub use agent::{AgentSignals, ClientAgent, ClientAgentParams};
pub use connections::{memo_key, Memo};
pub use history::MessageHistory;
pub use registry::{Registries, SchemaRegistry};
pub use runtime::SwarmRuntime;
pub use session::{ClientSession, SendFn, SessionOutput};
pub use state::{ClientState, ClientStateParams};
pub use storage::{ClientStorage, ClientStorageParams, SHARED_OWNER};
pub use swarm::{ClientSwarm, ClientSwarmParams};
pub use validation::{SchemaValidation, SessionMode, SessionRecord, SessionValidation};
