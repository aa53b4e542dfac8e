//! Runtime configuration.
//!
//! One [`RuntimeConfig`] per container, mutable through the facade's
//! `update_config`. Defaults are tuned for interactive sessions; everything
//! a deployment reasonably overrides is here rather than scattered as
//! constants.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{AgentName, ClientId};
use crate::messages::ModelMessage;

/// How the turn engine recovers from unusable model output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RescueStrategy {
    /// Record a reset prompt and answer with a placeholder.
    #[default]
    Flush,
    /// Record a retry prompt and ask the model once more.
    Recomplete,
    /// Delegate to [`RuntimeConfig::custom_rescue`].
    Custom,
}

/// Callback producing a replacement message for the `custom` rescue
/// strategy.
pub type CustomRescueFn =
    Arc<dyn Fn(&ClientId, &AgentName) -> ModelMessage + Send + Sync>;

/// Global knobs of the runtime.
#[derive(Clone)]
pub struct RuntimeConfig {
    /// Rescue strategy for invalid model output.
    pub rescue_strategy: RescueStrategy,
    /// Synthetic user prompt recorded by the `flush` strategy.
    pub rescue_flush_prompt: String,
    /// Synthetic user prompt recorded by the `recomplete` strategy.
    pub rescue_recomplete_prompt: String,
    /// Replacement-message producer for the `custom` strategy.
    pub custom_rescue: Option<CustomRescueFn>,
    /// Placeholder replies; the `flush` strategy picks one at random.
    pub empty_output_placeholders: Vec<String>,
    /// Keep-last-N truncation applied to the history projection.
    pub keep_messages: usize,
    /// Quiet period after which the tool watchdog logs a warning. The
    /// watchdog never cancels the tool.
    pub tool_watchdog_timeout: Duration,
    /// Enable plain operation logging.
    pub enable_log: bool,
    /// Enable debug-level operation logging.
    pub enable_debug: bool,
    /// Enable info-level operation logging.
    pub enable_info: bool,
    /// Minimum cosine similarity for storage search hits.
    pub storage_search_similarity: f64,
    /// Default number of items returned by storage search.
    pub storage_search_pool: usize,
    /// Identity of this process, stamped into session context snapshots.
    pub process_id: String,
    /// System prompt lines prepended for every agent, before the agent's
    /// own `system` lines.
    pub default_system_prompt: Vec<String>,
    /// Tags stripped from model output by the default transform, e.g.
    /// `"<tool_call>"`.
    pub disallowed_tags: Vec<String>,
    /// Symbols stripped from model output by the default transform.
    pub disallowed_symbols: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            rescue_strategy: RescueStrategy::Flush,
            rescue_flush_prompt: "Start the conversation over.".to_owned(),
            rescue_recomplete_prompt:
                "The previous answer was invalid. Answer the user's last message again."
                    .to_owned(),
            custom_rescue: None,
            empty_output_placeholders: vec![
                "Sorry, I lost the thread for a moment. Could you repeat that?".to_owned(),
                "I didn't catch that. Could you say it again?".to_owned(),
                "Something went sideways on my end. One more time, please?".to_owned(),
            ],
            keep_messages: 25,
            tool_watchdog_timeout: Duration::from_secs(15),
            enable_log: false,
            enable_debug: false,
            enable_info: false,
            storage_search_similarity: 0.65,
            storage_search_pool: 5,
            process_id: Uuid::new_v4().to_string(),
            default_system_prompt: Vec::new(),
            disallowed_tags: vec!["<tool_call>".to_owned(), "</tool_call>".to_owned()],
            disallowed_symbols: Vec::new(),
        }
    }
}

impl RuntimeConfig {
    /// Apply the default output transform: trim and strip disallowed tags
    /// and symbols.
    #[must_use]
    pub fn default_output_transform(&self, output: &str) -> String {
        let mut cleaned = output.to_owned();
        for tag in &self.disallowed_tags {
            cleaned = cleaned.replace(tag, "");
        }
        for symbol in &self.disallowed_symbols {
            cleaned = cleaned.replace(symbol, "");
        }
        cleaned.trim().to_owned()
    }
}

impl std::fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("rescue_strategy", &self.rescue_strategy)
            .field("keep_messages", &self.keep_messages)
            .field("tool_watchdog_timeout", &self.tool_watchdog_timeout)
            .field("storage_search_similarity", &self.storage_search_similarity)
            .field("storage_search_pool", &self.storage_search_pool)
            .field("process_id", &self.process_id)
            .field("custom_rescue", &self.custom_rescue.is_some())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.rescue_strategy, RescueStrategy::Flush);
        assert_eq!(config.keep_messages, 25);
        assert_eq!(config.tool_watchdog_timeout, Duration::from_secs(15));
        assert!(!config.empty_output_placeholders.is_empty());
        assert!(!config.process_id.is_empty());
    }

    #[test]
    fn rescue_strategy_serde() {
        assert_eq!(
            serde_json::to_string(&RescueStrategy::Recomplete).unwrap(),
            "\"recomplete\""
        );
        let back: RescueStrategy = serde_json::from_str("\"custom\"").unwrap();
        assert_eq!(back, RescueStrategy::Custom);
    }

    #[test]
    fn default_transform_strips_tags() {
        let config = RuntimeConfig::default();
        let out = config.default_output_transform("  <tool_call>hello</tool_call>  ");
        assert_eq!(out, "hello");
    }

    #[test]
    fn default_transform_strips_symbols() {
        let config = RuntimeConfig {
            disallowed_symbols: vec!["~".to_owned()],
            ..RuntimeConfig::default()
        };
        assert_eq!(config.default_output_transform("a~b~c"), "abc");
    }

    #[test]
    fn debug_does_not_dump_closures() {
        let config = RuntimeConfig::default();
        let text = format!("{config:?}");
        assert!(text.contains("rescue_strategy"));
        assert!(text.contains("custom_rescue: false"));
    }
}
