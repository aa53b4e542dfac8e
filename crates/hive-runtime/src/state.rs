//! Long-term state cells.
//!
//! A [`ClientState`] holds one untyped JSON value per (state, owner),
//! seeded from the schema's default and optionally written through to the
//! persistence adapter on every set.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::debug;

use hive_bus::EventBus;
use hive_core::errors::Result;
use hive_core::{ClientId, EventContext, EventSource, StateSchema, SwarmEvent};
use hive_persist::StatePersistence;

/// Construction parameters of a [`ClientState`].
pub struct ClientStateParams {
    /// Client the instance serves.
    pub client_id: ClientId,
    /// Persistence owner key: the client id, or `"shared"`.
    pub owner: String,
    /// The state's schema.
    pub schema: Arc<StateSchema>,
    /// Persistence adapter.
    pub persistence: Arc<dyn StatePersistence>,
    /// Event bus.
    pub bus: EventBus,
}

/// One state cell (per-client, or swarm-wide when shared).
pub struct ClientState {
    client_id: ClientId,
    owner: String,
    schema: Arc<StateSchema>,
    persistence: Arc<dyn StatePersistence>,
    bus: EventBus,
    value: Mutex<Value>,
}

impl ClientState {
    /// Build an instance, restoring the persisted value or seeding the
    /// schema default.
    pub async fn new(params: ClientStateParams) -> Result<Self> {
        let restored = if params.schema.persist {
            params
                .persistence
                .load_state(&params.schema.state_name, &params.owner)
                .await?
        } else {
            None
        };
        let value = restored.unwrap_or_else(|| (params.schema.get_default_state)());

        debug!(
            state_name = %params.schema.state_name,
            owner = %params.owner,
            "state instance created"
        );
        Ok(Self {
            client_id: params.client_id,
            owner: params.owner,
            schema: params.schema,
            persistence: params.persistence,
            bus: params.bus,
            value: Mutex::new(value),
        })
    }

    /// Read the current value.
    pub async fn get_state(&self) -> Value {
        let value = self.value.lock().await.clone();
        if let Some(on_read) = &self.schema.callbacks.on_read {
            on_read(&self.client_id, &self.schema.state_name, &value);
        }
        self.bus
            .emit(
                &self.client_id,
                SwarmEvent::now(EventSource::StateBus, self.client_id.clone(), "get-state")
                    .with_context(EventContext {
                        state_name: Some(self.schema.state_name.clone()),
                        ..EventContext::default()
                    }),
            )
            .await;
        value
    }

    /// Replace the value, writing through when the schema persists.
    pub async fn set_state(&self, new_value: Value) -> Result<()> {
        {
            let mut value = self.value.lock().await;
            *value = new_value.clone();
            if self.schema.persist {
                self.persistence
                    .save_state(&self.schema.state_name, &self.owner, &value)
                    .await?;
            }
        }
        if let Some(on_write) = &self.schema.callbacks.on_write {
            on_write(&self.client_id, &self.schema.state_name, &new_value);
        }
        self.bus
            .emit(
                &self.client_id,
                SwarmEvent::now(EventSource::StateBus, self.client_id.clone(), "set-state")
                    .with_input(json!({ "state": new_value }))
                    .with_context(EventContext {
                        state_name: Some(self.schema.state_name.clone()),
                        ..EventContext::default()
                    }),
            )
            .await;
        Ok(())
    }

    /// Tear the state instance down.
    pub fn dispose(&self) {
        debug!(
            state_name = %self.schema.state_name,
            owner = %self.owner,
            "state instance disposed"
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use hive_persist::MemoryPersistence;

    async fn state_with(
        schema: StateSchema,
        persistence: Arc<MemoryPersistence>,
    ) -> ClientState {
        ClientState::new(ClientStateParams {
            client_id: ClientId::from("c1"),
            owner: "c1".to_owned(),
            schema: Arc::new(schema),
            persistence,
            bus: EventBus::new(),
        })
        .await
        .unwrap()
    }

    fn schema() -> StateSchema {
        StateSchema::new("cart", Arc::new(|| json!({ "items": [] })))
    }

    #[tokio::test]
    async fn fresh_state_is_default() {
        let state = state_with(schema(), Arc::new(MemoryPersistence::new())).await;
        assert_eq!(state.get_state().await, json!({ "items": [] }));
    }

    #[tokio::test]
    async fn set_then_get() {
        let state = state_with(schema(), Arc::new(MemoryPersistence::new())).await;
        state.set_state(json!({ "items": [1, 2] })).await.unwrap();
        assert_eq!(state.get_state().await, json!({ "items": [1, 2] }));
    }

    #[tokio::test]
    async fn persisted_state_restores() {
        let persistence = Arc::new(MemoryPersistence::new());
        {
            let state = state_with(schema().persisted(), persistence.clone()).await;
            state.set_state(json!({ "items": [9] })).await.unwrap();
        }
        let restored = state_with(schema().persisted(), persistence).await;
        assert_eq!(restored.get_state().await, json!({ "items": [9] }));
    }

    #[tokio::test]
    async fn unpersisted_state_does_not_restore() {
        let persistence = Arc::new(MemoryPersistence::new());
        {
            let state = state_with(schema(), persistence.clone()).await;
            state.set_state(json!({ "items": [9] })).await.unwrap();
        }
        let fresh = state_with(schema(), persistence).await;
        assert_eq!(fresh.get_state().await, json!({ "items": [] }));
    }
}
