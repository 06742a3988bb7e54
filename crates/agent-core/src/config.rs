//! Agent configuration
//!
//! Built once at startup and shared behind an `Arc`.

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::provider::GenerationOptions;
use crate::session::DEFAULT_MAX_HISTORY;

/// Default number of producer calls allowed per turn
pub const DEFAULT_ITERATION_LIMIT: usize = 5;

/// Default character budget for each re-injected tool outcome
pub const DEFAULT_MAX_OUTCOME_CHARS: usize = 2000;

pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are the decision engine of a personal assistant. Read the user's request and the conversation so far, then choose exactly one next action.

Possible actions:
1. REPLY: answer the user directly.
2. CALL_TOOL: run one of the available tools to make progress.
3. ASK_USER: ask the user for missing information.
4. DELEGATE: hand the request off when it is outside what you can do.

Respond with a single JSON object and nothing else:
{
  "action_type": "REPLY" | "CALL_TOOL" | "ASK_USER" | "DELEGATE",
  "action_content": <reply text> or {"tool_name": "...", "parameters": {...}, "reason": "..."},
  "confidence": <number between 0 and 1>,
  "reasoning": "<one sentence on why>"
}

After a tool runs you will see its result; use it to decide the next action. Prefer answering once you have what you need."#;

/// Agent configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Base instructions given to the decision producer
    pub system_prompt: String,

    /// Maximum producer calls in one turn
    pub iteration_limit: usize,

    /// Conversation store capacity
    pub max_history: usize,

    /// Per-outcome character budget when outcomes are fed back to the producer
    pub max_outcome_chars: usize,

    /// Generation options
    pub generation: GenerationOptions,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            iteration_limit: DEFAULT_ITERATION_LIMIT,
            max_history: DEFAULT_MAX_HISTORY,
            max_outcome_chars: DEFAULT_MAX_OUTCOME_CHARS,
            generation: GenerationOptions::default(),
        }
    }
}

impl AgentConfig {
    pub fn with_iteration_limit(mut self, limit: usize) -> Self {
        self.iteration_limit = limit;
        self
    }

    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_generation(mut self, generation: GenerationOptions) -> Self {
        self.generation = generation;
        self
    }

    /// Reject settings that would make every turn fail or the store useless
    pub fn validate(&self) -> Result<()> {
        if self.iteration_limit == 0 {
            return Err(AgentError::Config("iteration_limit must be at least 1".into()));
        }
        if self.max_history == 0 {
            return Err(AgentError::Config("max_history must be at least 1".into()));
        }
        if self.max_outcome_chars == 0 {
            return Err(AgentError::Config("max_outcome_chars must be at least 1".into()));
        }
        Ok(())
    }
}
