//! Completion back-end abstraction.
//!
//! The runtime is model-agnostic: everything it needs from an LLM is
//! [`Completion::get_completion`] — messages in, one [`ModelMessage`] out.
//! Streaming, retries, and transport are the back-end's business.

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::Result;
use crate::ids::{AgentName, ClientId, CompletionName};
use crate::messages::{ExecutionMode, ModelMessage, ToolFunction};

/// Arguments of one completion call.
#[derive(Clone, Debug)]
pub struct CompletionArgs {
    /// Client owning the turn.
    pub client_id: ClientId,
    /// Agent the completion is for.
    pub agent_name: AgentName,
    /// Whether the triggering input was human or tool-injected.
    pub mode: ExecutionMode,
    /// Prompt preamble plus the filtered history projection.
    pub messages: Vec<ModelMessage>,
    /// Wire schemas of the agent's tools, if it has any.
    pub tools: Option<Vec<ToolFunction>>,
}

/// An LLM completion back-end.
#[async_trait]
pub trait Completion: Send + Sync {
    /// Produce the next model message for the given conversation.
    async fn get_completion(&self, args: CompletionArgs) -> Result<ModelMessage>;
}

/// A registered completion back-end.
#[derive(Clone)]
pub struct CompletionSchema {
    /// Unique registry name.
    pub completion_name: CompletionName,
    /// The back-end implementation.
    pub completion: Arc<dyn Completion>,
}

impl CompletionSchema {
    /// Register a back-end under a name.
    #[must_use]
    pub fn new(completion_name: impl Into<CompletionName>, completion: Arc<dyn Completion>) -> Self {
        Self {
            completion_name: completion_name.into(),
            completion,
        }
    }
}

impl std::fmt::Debug for CompletionSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionSchema")
            .field("completion_name", &self.completion_name)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock back-end for deterministic tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(any(test, feature = "mock"))]
pub mod mock {
    //! Pre-programmed completion for tests — no API calls.
    //!
    //! Gated behind the `mock` cargo feature so it stays out of
    //! production builds; this crate's own tests always have it.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::{Completion, CompletionArgs};
    use crate::errors::Result;
    use crate::messages::ModelMessage;
    use async_trait::async_trait;

    type ResponderFn = dyn Fn(&CompletionArgs) -> ModelMessage + Send + Sync;

    /// Mock completion that computes each response from the request,
    /// optionally after a fixed delay. Counts calls.
    pub struct MockCompletion {
        responder: Box<ResponderFn>,
        delay: Option<Duration>,
        call_count: AtomicUsize,
    }

    impl MockCompletion {
        /// Create a mock from a response function.
        pub fn new<F>(responder: F) -> Self
        where
            F: Fn(&CompletionArgs) -> ModelMessage + Send + Sync + 'static,
        {
            Self {
                responder: Box::new(responder),
                delay: None,
                call_count: AtomicUsize::new(0),
            }
        }

        /// Echo the last user message back as the assistant reply.
        #[must_use]
        pub fn echo() -> Self {
            Self::new(|args| {
                let last_user = args
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == crate::messages::MessageRole::User)
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                ModelMessage::assistant(args.agent_name.clone(), last_user)
            })
        }

        /// Sleep before answering (builder-style).
        #[must_use]
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Number of completion calls served so far.
        #[must_use]
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl Completion for MockCompletion {
        async fn get_completion(&self, args: CompletionArgs) -> Result<ModelMessage> {
            let _ = self.call_count.fetch_add(1, Ordering::Relaxed);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok((self.responder)(&args))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
