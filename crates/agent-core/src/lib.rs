//! # agent-core
//!
//! The agent orchestration loop with a provider-agnostic decision step and an
//! explicit tool registry.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                     InteractionDriver                         │
//! │  ┌──────────────────┐  ┌──────────────┐  ┌─────────────────┐  │
//! │  │ DecisionProducer │  │ToolDispatcher│  │ConversationStore│  │
//! │  │  (LlmProvider)   │──│ (registry)   │──│ (bounded log)   │  │
//! │  └──────────────────┘  └──────────────┘  └─────────────────┘  │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every turn is bounded by `AgentConfig::iteration_limit` and always ends
//! with a response, whatever the producer or the tools do.

pub mod config;
pub mod decision;
pub mod driver;
pub mod error;
pub mod message;
pub mod producer;
pub mod provider;
pub mod session;
pub mod tool;

pub use config::AgentConfig;
pub use decision::{Action, ActionKind, Decision, parse_decision};
pub use driver::{InteractionDriver, TurnContext, TurnExit, TurnReport};
pub use error::{AgentError, Result, ToolError, ToolErrorKind};
pub use message::{HistoryEntry, Message, Role};
pub use producer::{DecisionProducer, LlmDecisionProducer};
pub use provider::LlmProvider;
pub use session::{ConversationContext, ConversationStore, SessionId};
pub use tool::{
    InvocationOutcome, InvocationRequest, Tool, ToolDirectory, ToolDispatcher, ToolRegistry, ToolSchema,
};
