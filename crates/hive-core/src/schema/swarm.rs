//! Swarm schema.

use std::sync::Arc;

use crate::ids::{AgentName, ClientId, SwarmName};

/// Lifecycle hooks of a swarm.
#[derive(Clone, Default)]
pub struct SwarmCallbacks {
    /// The active agent changed for a client.
    pub on_agent_changed: Option<Arc<dyn Fn(&ClientId, &AgentName, &SwarmName) + Send + Sync>>,
    /// A client swarm instance was built.
    pub on_init: Option<Arc<dyn Fn(&ClientId, &SwarmName) + Send + Sync>>,
    /// A client swarm instance was disposed.
    pub on_dispose: Option<Arc<dyn Fn(&ClientId, &SwarmName) + Send + Sync>>,
}

impl std::fmt::Debug for SwarmCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwarmCallbacks")
            .field("on_agent_changed", &self.on_agent_changed.is_some())
            .field("on_init", &self.on_init.is_some())
            .field("on_dispose", &self.on_dispose.is_some())
            .finish()
    }
}

/// A named collection of agents with a designated default.
#[derive(Clone)]
pub struct SwarmSchema {
    /// Unique registry name.
    pub swarm_name: SwarmName,
    /// Agent activated for fresh sessions and empty navigation stacks.
    /// Must be a member of `agent_list`.
    pub default_agent: AgentName,
    /// Members of the swarm.
    pub agent_list: Vec<AgentName>,
    /// Lifecycle hooks.
    pub callbacks: SwarmCallbacks,
}

impl SwarmSchema {
    /// Declare a swarm.
    #[must_use]
    pub fn new(
        swarm_name: impl Into<SwarmName>,
        default_agent: impl Into<AgentName>,
        agent_list: Vec<AgentName>,
    ) -> Self {
        Self {
            swarm_name: swarm_name.into(),
            default_agent: default_agent.into(),
            agent_list,
            callbacks: SwarmCallbacks::default(),
        }
    }

    /// Set lifecycle hooks (builder-style).
    #[must_use]
    pub fn with_callbacks(mut self, callbacks: SwarmCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Whether `agent_name` is a member of this swarm.
    #[must_use]
    pub fn contains(&self, agent_name: &AgentName) -> bool {
        self.agent_list.contains(agent_name)
    }
}

impl std::fmt::Debug for SwarmSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwarmSchema")
            .field("swarm_name", &self.swarm_name)
            .field("default_agent", &self.default_agent)
            .field("agent_list", &self.agent_list)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_member() {
        let schema = SwarmSchema::new(
            "support",
            "triage",
            vec![AgentName::from("triage"), AgentName::from("sales")],
        );
        assert!(schema.contains(&AgentName::from("sales")));
        assert!(!schema.contains(&AgentName::from("refund")));
    }
}
