//! State schema.

use std::sync::Arc;

use serde_json::Value;

use crate::ids::{ClientId, StateName};

/// Observation hooks of a state.
#[derive(Clone, Default)]
pub struct StateCallbacks {
    /// The state was read.
    pub on_read: Option<Arc<dyn Fn(&ClientId, &StateName, &Value) + Send + Sync>>,
    /// The state was written.
    pub on_write: Option<Arc<dyn Fn(&ClientId, &StateName, &Value) + Send + Sync>>,
}

impl std::fmt::Debug for StateCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateCallbacks")
            .field("on_read", &self.on_read.is_some())
            .field("on_write", &self.on_write.is_some())
            .finish()
    }
}

/// Declaration of a long-term state cell. Values are untyped JSON; typing
/// them is the embedder's concern.
#[derive(Clone)]
pub struct StateSchema {
    /// Unique registry name.
    pub state_name: StateName,
    /// Produces the value of a fresh instance.
    pub get_default_state: Arc<dyn Fn() -> Value + Send + Sync>,
    /// One swarm-wide instance instead of per-client instances.
    pub shared: bool,
    /// Write values through to the persistence adapter.
    pub persist: bool,
    /// Observation hooks.
    pub callbacks: StateCallbacks,
}

impl StateSchema {
    /// Declare a state.
    #[must_use]
    pub fn new(
        state_name: impl Into<StateName>,
        get_default_state: Arc<dyn Fn() -> Value + Send + Sync>,
    ) -> Self {
        Self {
            state_name: state_name.into(),
            get_default_state,
            shared: false,
            persist: false,
            callbacks: StateCallbacks::default(),
        }
    }

    /// Make the state swarm-wide (builder-style).
    #[must_use]
    pub fn shared(mut self) -> Self {
        self.shared = true;
        self
    }

    /// Enable persistence write-through (builder-style).
    #[must_use]
    pub fn persisted(mut self) -> Self {
        self.persist = true;
        self
    }

    /// Set observation hooks (builder-style).
    #[must_use]
    pub fn with_callbacks(mut self, callbacks: StateCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }
}

impl std::fmt::Debug for StateSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSchema")
            .field("state_name", &self.state_name)
            .field("shared", &self.shared)
            .field("persist", &self.persist)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_state_is_produced() {
        let schema = StateSchema::new("cart", Arc::new(|| json!({"items": []}))).persisted();
        assert_eq!((schema.get_default_state)(), json!({"items": []}));
        assert!(schema.persist);
        assert!(!schema.shared);
    }
}
