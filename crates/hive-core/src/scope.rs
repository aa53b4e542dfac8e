//! Ambient context scopes.
//!
//! Two dynamically-scoped value holders ride along with every public-facade
//! call: [`MethodContext`] (who called what, with which resources) and
//! [`ExecutionContext`] (which turn is running). Both are task-locals —
//! nested scopes shadow outer ones, and every async continuation started
//! under the scope can read them.
//!
//! Entries that must *not* inherit an ambient scope (e.g. navigation run
//! from inside a tool) use [`clean_scope`], which hides both contexts for
//! the duration of the future.

use crate::ids::{AgentName, ClientId, ExecutionId, StateName, StorageName, SwarmName};

/// Ambient metadata of the public-facade call currently in flight.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodContext {
    /// Client the call is for.
    pub client_id: ClientId,
    /// Name of the facade method, e.g. `"complete"`.
    pub method_name: String,
    /// Agent resource addressed by the call, if any.
    pub agent_name: Option<AgentName>,
    /// Swarm resource addressed by the call, if any.
    pub swarm_name: Option<SwarmName>,
    /// Storage resource addressed by the call, if any.
    pub storage_name: Option<StorageName>,
    /// State resource addressed by the call, if any.
    pub state_name: Option<StateName>,
}

impl MethodContext {
    /// Create a context for a method on a client.
    #[must_use]
    pub fn new(client_id: ClientId, method_name: impl Into<String>) -> Self {
        Self {
            client_id,
            method_name: method_name.into(),
            agent_name: None,
            swarm_name: None,
            storage_name: None,
            state_name: None,
        }
    }

    /// Set the agent resource (builder-style).
    #[must_use]
    pub fn with_agent(mut self, agent_name: AgentName) -> Self {
        self.agent_name = Some(agent_name);
        self
    }

    /// Set the swarm resource (builder-style).
    #[must_use]
    pub fn with_swarm(mut self, swarm_name: SwarmName) -> Self {
        self.swarm_name = Some(swarm_name);
        self
    }

    /// Set the storage resource (builder-style).
    #[must_use]
    pub fn with_storage(mut self, storage_name: StorageName) -> Self {
        self.storage_name = Some(storage_name);
        self
    }

    /// Set the state resource (builder-style).
    #[must_use]
    pub fn with_state(mut self, state_name: StateName) -> Self {
        self.state_name = Some(state_name);
        self
    }

    /// Whether a method context is active on the current task.
    #[must_use]
    pub fn has_context() -> bool {
        METHOD_CONTEXT.try_with(Option::is_some).unwrap_or(false)
    }

    /// The innermost active method context, if any.
    #[must_use]
    pub fn current() -> Option<MethodContext> {
        METHOD_CONTEXT.try_with(Clone::clone).ok().flatten()
    }

    /// Run `fut` with this context active.
    pub async fn scope<F>(self, fut: F) -> F::Output
    where
        F: std::future::Future,
    {
        METHOD_CONTEXT.scope(Some(self), fut).await
    }
}

/// Ambient identity of the turn execution currently in flight.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionContext {
    /// Client the turn belongs to.
    pub client_id: ClientId,
    /// Unique id of this execution.
    pub execution_id: ExecutionId,
}

impl ExecutionContext {
    /// Create a context with a fresh execution id.
    #[must_use]
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            execution_id: ExecutionId::generate(),
        }
    }

    /// Whether an execution context is active on the current task.
    #[must_use]
    pub fn has_context() -> bool {
        EXECUTION_CONTEXT.try_with(Option::is_some).unwrap_or(false)
    }

    /// The innermost active execution context, if any.
    #[must_use]
    pub fn current() -> Option<ExecutionContext> {
        EXECUTION_CONTEXT.try_with(Clone::clone).ok().flatten()
    }

    /// Run `fut` with this context active.
    pub async fn scope<F>(self, fut: F) -> F::Output
    where
        F: std::future::Future,
    {
        EXECUTION_CONTEXT.scope(Some(self), fut).await
    }
}

tokio::task_local! {
    static METHOD_CONTEXT: Option<MethodContext>;
    static EXECUTION_CONTEXT: Option<ExecutionContext>;
}

/// Run `fut` with both ambient contexts suppressed.
///
/// Inside, `has_context()` reports `false` even when an outer scope is
/// active — the context-begin behavior required by entries that may run
/// inside a tool executing inside a turn.
pub async fn clean_scope<F>(fut: F) -> F::Output
where
    F: std::future::Future,
{
    METHOD_CONTEXT
        .scope(None, EXECUTION_CONTEXT.scope(None, fut))
        .await
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_context_outside_scope() {
        assert!(!MethodContext::has_context());
        assert!(MethodContext::current().is_none());
        assert!(!ExecutionContext::has_context());
    }

    #[tokio::test]
    async fn context_visible_inside_scope() {
        let ctx = MethodContext::new(ClientId::from("c1"), "complete")
            .with_swarm(SwarmName::from("support"));
        ctx.scope(async {
            assert!(MethodContext::has_context());
            let current = MethodContext::current().unwrap();
            assert_eq!(current.method_name, "complete");
            assert_eq!(current.swarm_name, Some(SwarmName::from("support")));
        })
        .await;
        assert!(!MethodContext::has_context());
    }

    #[tokio::test]
    async fn inner_scope_shadows_outer() {
        let outer = MethodContext::new(ClientId::from("c1"), "outer");
        let inner = MethodContext::new(ClientId::from("c1"), "inner");
        outer
            .scope(async {
                inner
                    .scope(async {
                        assert_eq!(MethodContext::current().unwrap().method_name, "inner");
                    })
                    .await;
                assert_eq!(MethodContext::current().unwrap().method_name, "outer");
            })
            .await;
    }

    #[tokio::test]
    async fn execution_context_scope() {
        let ctx = ExecutionContext::new(ClientId::from("c1"));
        let id = ctx.execution_id.clone();
        ctx.scope(async move {
            let current = ExecutionContext::current().unwrap();
            assert_eq!(current.execution_id, id);
            assert_eq!(current.client_id, ClientId::from("c1"));
        })
        .await;
    }

    #[tokio::test]
    async fn clean_scope_suppresses_both() {
        let method = MethodContext::new(ClientId::from("c1"), "execute");
        let exec = ExecutionContext::new(ClientId::from("c1"));
        method
            .scope(exec.scope(async {
                assert!(MethodContext::has_context());
                assert!(ExecutionContext::has_context());
                clean_scope(async {
                    assert!(!MethodContext::has_context());
                    assert!(!ExecutionContext::has_context());
                })
                .await;
                assert!(MethodContext::has_context());
            }))
            .await;
    }

    #[tokio::test]
    async fn context_survives_await_points() {
        let ctx = MethodContext::new(ClientId::from("c1"), "run");
        ctx.scope(async {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            assert!(MethodContext::has_context());
        })
        .await;
    }
}
