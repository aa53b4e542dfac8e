//! Agent schema.

use std::sync::Arc;

use crate::ids::{
    AgentName, ClientId, CompletionName, StateName, StorageName, ToolName,
};
use crate::messages::{ExecutionMode, ModelMessage};

/// Output validation hook: `Some(reason)` rejects the output and triggers
/// the rescue path; `None` accepts it.
pub type ValidateFn = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Output transform applied before validation and emission.
pub type TransformFn = Arc<dyn Fn(String) -> String + Send + Sync>;

/// Raw-completion transform, e.g. normalizing JSON-encoded tool calls into
/// the canonical `tool_calls` shape.
pub type MapFn = Arc<dyn Fn(ModelMessage) -> ModelMessage + Send + Sync>;

/// Lifecycle hooks of an agent. All optional, all fire-and-forget.
#[derive(Clone, Default)]
pub struct AgentCallbacks {
    /// A turn started.
    pub on_execute: Option<Arc<dyn Fn(&ClientId, &AgentName, &str, ExecutionMode) + Send + Sync>>,
    /// A stateless `run` pass started.
    pub on_run: Option<Arc<dyn Fn(&ClientId, &AgentName, &str) + Send + Sync>>,
    /// Validated output was published.
    pub on_output: Option<Arc<dyn Fn(&ClientId, &AgentName, &str) + Send + Sync>>,
    /// A model rescue ran.
    pub on_resurrect: Option<Arc<dyn Fn(&ClientId, &AgentName, &str) + Send + Sync>>,
    /// The tool-call chain of a turn finished (normally or halted).
    pub on_after_tool_calls: Option<Arc<dyn Fn(&ClientId, &AgentName) + Send + Sync>>,
    /// A message was appended to the agent's history.
    pub on_history_push:
        Option<Arc<dyn Fn(&ClientId, &AgentName, &ModelMessage) + Send + Sync>>,
    /// The agent instance was built.
    pub on_init: Option<Arc<dyn Fn(&ClientId, &AgentName) + Send + Sync>>,
    /// The agent instance was disposed.
    pub on_dispose: Option<Arc<dyn Fn(&ClientId, &AgentName) + Send + Sync>>,
}

impl std::fmt::Debug for AgentCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentCallbacks")
            .field("on_execute", &self.on_execute.is_some())
            .field("on_run", &self.on_run.is_some())
            .field("on_output", &self.on_output.is_some())
            .field("on_resurrect", &self.on_resurrect.is_some())
            .field("on_after_tool_calls", &self.on_after_tool_calls.is_some())
            .finish_non_exhaustive()
    }
}

/// Declaration of one LLM-backed conversational agent.
#[derive(Clone)]
pub struct AgentSchema {
    /// Unique registry name.
    pub agent_name: AgentName,
    /// Completion back-end this agent talks to.
    pub completion: CompletionName,
    /// Main prompt, sent as the leading system message of every call.
    pub prompt: String,
    /// Additional system lines after the prompt.
    pub system: Vec<String>,
    /// Tools the agent may call.
    pub tools: Vec<ToolName>,
    /// Storages the agent declares. Access to undeclared storages is
    /// rejected by validation.
    pub storages: Vec<StorageName>,
    /// States the agent declares.
    pub states: Vec<StateName>,
    /// Other agents this one depends on (e.g. navigation targets).
    pub depends_on: Vec<AgentName>,
    /// Output validation hook.
    pub validate: Option<ValidateFn>,
    /// Output transform hook. When unset, the config default transform
    /// applies.
    pub transform: Option<TransformFn>,
    /// Raw-completion transform hook.
    pub map: Option<MapFn>,
    /// Upper bound on dispatched tool calls per turn.
    pub max_tool_calls: Option<usize>,
    /// Lifecycle hooks.
    pub callbacks: AgentCallbacks,
}

impl AgentSchema {
    /// Declare an agent with its completion and prompt.
    #[must_use]
    pub fn new(
        agent_name: impl Into<AgentName>,
        completion: impl Into<CompletionName>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            completion: completion.into(),
            prompt: prompt.into(),
            system: Vec::new(),
            tools: Vec::new(),
            storages: Vec::new(),
            states: Vec::new(),
            depends_on: Vec::new(),
            validate: None,
            transform: None,
            map: None,
            max_tool_calls: None,
            callbacks: AgentCallbacks::default(),
        }
    }

    /// Add system lines (builder-style).
    #[must_use]
    pub fn with_system(mut self, system: Vec<String>) -> Self {
        self.system = system;
        self
    }

    /// Declare tools (builder-style).
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolName>) -> Self {
        self.tools = tools;
        self
    }

    /// Declare storages (builder-style).
    #[must_use]
    pub fn with_storages(mut self, storages: Vec<StorageName>) -> Self {
        self.storages = storages;
        self
    }

    /// Declare states (builder-style).
    #[must_use]
    pub fn with_states(mut self, states: Vec<StateName>) -> Self {
        self.states = states;
        self
    }

    /// Declare dependencies (builder-style).
    #[must_use]
    pub fn with_depends_on(mut self, depends_on: Vec<AgentName>) -> Self {
        self.depends_on = depends_on;
        self
    }

    /// Set the output validation hook (builder-style).
    #[must_use]
    pub fn with_validate(mut self, validate: ValidateFn) -> Self {
        self.validate = Some(validate);
        self
    }

    /// Set the output transform hook (builder-style).
    #[must_use]
    pub fn with_transform(mut self, transform: TransformFn) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Set the raw-completion transform hook (builder-style).
    #[must_use]
    pub fn with_map(mut self, map: MapFn) -> Self {
        self.map = Some(map);
        self
    }

    /// Cap dispatched tool calls per turn (builder-style).
    #[must_use]
    pub fn with_max_tool_calls(mut self, max: usize) -> Self {
        self.max_tool_calls = Some(max);
        self
    }

    /// Set lifecycle hooks (builder-style).
    #[must_use]
    pub fn with_callbacks(mut self, callbacks: AgentCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }
}

impl std::fmt::Debug for AgentSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSchema")
            .field("agent_name", &self.agent_name)
            .field("completion", &self.completion)
            .field("tools", &self.tools)
            .field("storages", &self.storages)
            .field("states", &self.states)
            .field("max_tool_calls", &self.max_tool_calls)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_chain() {
        let schema = AgentSchema::new("triage", "mock", "You are a triage agent.")
            .with_tools(vec![ToolName::from("navigate")])
            .with_storages(vec![StorageName::from("faq")])
            .with_max_tool_calls(3)
            .with_validate(Arc::new(|out| {
                (!out.contains("ok")).then(|| "must contain ok".to_owned())
            }));

        assert_eq!(schema.agent_name.as_str(), "triage");
        assert_eq!(schema.tools.len(), 1);
        assert_eq!(schema.max_tool_calls, Some(3));
        let validate = schema.validate.as_ref().unwrap();
        assert!(validate("all ok").is_none());
        assert_eq!(validate("bad").as_deref(), Some("must contain ok"));
    }

    #[test]
    fn debug_skips_closures() {
        let schema = AgentSchema::new("triage", "mock", "prompt");
        let text = format!("{schema:?}");
        assert!(text.contains("triage"));
        assert!(text.contains("mock"));
    }
}
