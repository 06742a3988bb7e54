//! Decision Producers
//!
//! [`DecisionProducer`] is the driver's only view of "what happens next".
//! [`LlmDecisionProducer`] asks a language model and parses its answer.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::AgentConfig;
use crate::decision::{Action, Decision, parse_decision};
use crate::driver::TurnContext;
use crate::message::{Message, Role};
use crate::provider::LlmProvider;
use crate::session::ConversationContext;
use crate::tool::InvocationOutcome;

/// Source of decisions for the interaction driver
///
/// `decide` is total: implementations turn every internal failure into a
/// decision (normally a low-confidence reply).
#[async_trait]
pub trait DecisionProducer: Send + Sync {
    async fn decide(&self, context: &TurnContext) -> Decision;
}

/// Decision producer backed by an [`LlmProvider`]
pub struct LlmDecisionProducer {
    provider: Arc<dyn LlmProvider>,
    config: Arc<AgentConfig>,
}

impl LlmDecisionProducer {
    pub fn new(provider: Arc<dyn LlmProvider>, config: Arc<AgentConfig>) -> Self {
        Self { provider, config }
    }

    /// Request sent to the provider for `context`:
    /// system prompt, history, this turn's decisions each followed by its
    /// tool outcome, then a closing user message.
    pub fn build_messages(&self, context: &TurnContext) -> Vec<Message> {
        let mut messages = Vec::with_capacity(context.history().len() + context.decisions().len() * 2 + 2);
        messages.push(Message::system(self.system_prompt(context)));
        messages.extend(context.history().iter().map(Message::from));

        let mut outcomes = context.outcomes().iter();
        for decision in context.decisions() {
            messages.push(Message::assistant(describe_decision(decision)));
            if matches!(decision.action, Action::CallTool(_)) {
                if let Some(outcome) = outcomes.next() {
                    messages.push(Message::user(describe_outcome(outcome, self.config.max_outcome_chars)));
                }
            }
        }

        if context.decisions().is_empty() {
            let already_present = context
                .history()
                .last()
                .is_some_and(|entry| entry.role == Role::User && entry.content == context.user_input());
            if !already_present {
                messages.push(Message::user(context.user_input()));
            }
        } else {
            messages.push(Message::user(format!(
                "Based on the tool results above, decide the next action. The original request was: {}",
                context.user_input()
            )));
        }

        messages
    }

    fn system_prompt(&self, context: &TurnContext) -> String {
        let mut prompt = self.config.system_prompt.clone();
        prompt.push_str("\n\n");
        prompt.push_str(&context.directory().prompt_section());

        if let Some(conversation) = context.conversation().filter(|c| !c.is_empty()) {
            prompt.push('\n');
            prompt.push_str(&session_section(conversation));
        }
        prompt
    }
}

#[async_trait]
impl DecisionProducer for LlmDecisionProducer {
    async fn decide(&self, context: &TurnContext) -> Decision {
        let messages = self.build_messages(context);
        debug!(
            provider = self.provider.name(),
            messages = messages.len(),
            iteration = context.current_iteration() + 1,
            "Requesting decision"
        );

        match self.provider.complete(&messages, &self.config.generation).await {
            Ok(completion) => parse_decision(&completion.content, completion.reasoning.as_deref()),
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "Provider call failed");
                Decision::provider_failure(e)
            }
        }
    }
}

fn describe_decision(decision: &Decision) -> String {
    match &decision.action {
        Action::CallTool(request) => {
            let parameters: BTreeMap<_, _> = request.parameters.iter().collect();
            let parameters = serde_json::to_string(&parameters).unwrap_or_default();
            format!(
                "I decided to call tool '{}' with parameters {} because: {}",
                request.tool_name, parameters, request.reason
            )
        }
        other => format!("My reply was: {}", other.text().unwrap_or_default()),
    }
}

fn describe_outcome(outcome: &InvocationOutcome, max_chars: usize) -> String {
    let rendered = outcome.render_truncated(max_chars);
    if outcome.is_success() {
        format!("Tool '{}' succeeded with result: {rendered}", outcome.tool_name())
    } else {
        format!("Tool '{}' failed with error: {rendered}", outcome.tool_name())
    }
}

fn session_section(conversation: &ConversationContext) -> String {
    let mut section = String::from("## Session Context\n\n");
    if let Some(intent) = &conversation.last_user_intent {
        let _ = writeln!(section, "Previous user intent: {intent}");
    }
    if let Some(action) = conversation.last_assistant_action {
        let _ = writeln!(section, "Previous assistant action: {action}");
    }
    if let Some(summary) = &conversation.context_summary {
        let _ = writeln!(section, "Summary: {summary}");
    }
    for outcome in &conversation.last_tool_outcomes {
        let status = if outcome.success { "ok" } else { "failed" };
        let _ = writeln!(section, "Previous tool {} ({status}): {}", outcome.tool_name, outcome.result);
    }
    section
}
