//! Interaction Driver
//!
//! The bounded decide/act loop run for every user turn. Each iteration asks
//! the decision producer for one decision; a tool call is dispatched and its
//! outcome fed into the next iteration, anything else ends the turn.
//!
//! A turn never fails: tool failures end it with an explanatory reply and the
//! iteration limit caps the number of producer calls.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::decision::{Action, ActionKind, Decision};
use crate::message::{HistoryEntry, Metadata, truncate_chars};
use crate::producer::DecisionProducer;
use crate::session::{ContextUpdate, ConversationContext, ConversationStore, OutcomeSummary};
use crate::tool::{InvocationOutcome, ToolDirectory, ToolDispatcher};

/// Response used when a turn runs out of iterations
pub const ITERATION_BUDGET_EXCEEDED_MESSAGE: &str =
    "Sorry, I reached the maximum number of steps for this request without finishing it. \
     Please try rephrasing it or splitting it into smaller requests.";

/// Characters of user input kept as the last intent
const USER_INTENT_CHARS: usize = 100;

/// Everything the producer may look at during one turn
#[derive(Clone, Debug)]
pub struct TurnContext {
    user_input: String,
    history: Vec<HistoryEntry>,
    decisions: Vec<Decision>,
    outcomes: Vec<InvocationOutcome>,
    iteration_limit: usize,
    directory: ToolDirectory,
    conversation: Option<ConversationContext>,
}

impl TurnContext {
    pub fn new(user_input: impl Into<String>, history: Vec<HistoryEntry>, iteration_limit: usize) -> Self {
        Self {
            user_input: user_input.into(),
            history,
            decisions: Vec::new(),
            outcomes: Vec::new(),
            iteration_limit,
            directory: ToolDirectory::default(),
            conversation: None,
        }
    }

    pub fn with_directory(mut self, directory: ToolDirectory) -> Self {
        self.directory = directory;
        self
    }

    pub fn with_conversation(mut self, conversation: ConversationContext) -> Self {
        self.conversation = Some(conversation);
        self
    }

    pub fn user_input(&self) -> &str {
        &self.user_input
    }

    /// Store history at the start of the turn, oldest first
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Decisions made so far this turn
    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    /// Tool outcomes gathered so far this turn
    pub fn outcomes(&self) -> &[InvocationOutcome] {
        &self.outcomes
    }

    pub fn iteration_limit(&self) -> usize {
        self.iteration_limit
    }

    pub fn current_iteration(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.current_iteration() >= self.iteration_limit
    }

    pub fn directory(&self) -> &ToolDirectory {
        &self.directory
    }

    /// Running context of the store, absent for detached turns
    pub fn conversation(&self) -> Option<&ConversationContext> {
        self.conversation.as_ref()
    }

    pub fn record_decision(&mut self, decision: Decision) {
        self.decisions.push(decision);
    }

    pub fn record_outcome(&mut self, outcome: InvocationOutcome) {
        self.outcomes.push(outcome);
    }

    fn into_report(self, response: String, exit: TurnExit) -> TurnReport {
        TurnReport {
            response,
            exit,
            decisions: self.decisions,
            outcomes: self.outcomes,
        }
    }
}

/// How a turn ended
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "exit", content = "detail", rename_all = "snake_case")]
pub enum TurnExit {
    /// A reply, question or delegation was produced
    Responded(ActionKind),
    /// The named tool failed
    ToolFailed(String),
    /// The iteration limit was reached
    BudgetExhausted,
}

/// Full record of one turn
#[derive(Clone, Debug, Serialize)]
pub struct TurnReport {
    pub response: String,
    pub exit: TurnExit,
    pub decisions: Vec<Decision>,
    pub outcomes: Vec<InvocationOutcome>,
}

impl TurnReport {
    pub fn last_action_kind(&self) -> Option<ActionKind> {
        self.decisions.last().map(Decision::kind)
    }

    /// Metadata attached to the assistant message that records this turn
    pub fn message_metadata(&self) -> Metadata {
        let tool_outcomes: Vec<Value> = self
            .outcomes
            .iter()
            .map(|o| json!({"tool": o.tool_name(), "success": o.is_success()}))
            .collect();
        let action_kind = self
            .last_action_kind()
            .map_or(Value::Null, |kind| json!(kind.as_str()));

        let mut metadata = Metadata::new();
        metadata.insert("action_kind".into(), action_kind);
        metadata.insert("tool_outcomes".into(), Value::Array(tool_outcomes));
        metadata
    }
}

/// Runs user turns against a producer and a dispatcher
pub struct InteractionDriver {
    producer: Arc<dyn DecisionProducer>,
    dispatcher: Arc<dyn ToolDispatcher>,
    config: Arc<AgentConfig>,
}

impl InteractionDriver {
    pub fn new(
        producer: Arc<dyn DecisionProducer>,
        dispatcher: Arc<dyn ToolDispatcher>,
        config: Arc<AgentConfig>,
    ) -> Self {
        Self {
            producer,
            dispatcher,
            config,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<dyn ToolDispatcher> {
        &self.dispatcher
    }

    /// Run one turn and return the response text
    pub async fn run_turn(&self, user_input: &str, store: &mut ConversationStore) -> String {
        self.execute_turn(user_input, store).await.response
    }

    /// Run one turn against `store`, recording the input, the response and
    /// the updated context.
    pub async fn execute_turn(&self, user_input: &str, store: &mut ConversationStore) -> TurnReport {
        store.add_user_message(user_input);

        let context = TurnContext::new(user_input, store.history(), self.config.iteration_limit)
            .with_directory(self.dispatcher.directory())
            .with_conversation(store.context().clone());

        info!(session_id = %store.id(), "Starting turn");
        let report = self.drive(context).await;
        Self::finalize(store, user_input, &report);
        report
    }

    /// Run one turn against a history snapshot without touching any store
    pub async fn run_detached(&self, user_input: &str, history: Vec<HistoryEntry>) -> TurnReport {
        let context = TurnContext::new(user_input, history, self.config.iteration_limit)
            .with_directory(self.dispatcher.directory());
        self.drive(context).await
    }

    async fn drive(&self, mut context: TurnContext) -> TurnReport {
        while !context.is_exhausted() {
            let decision = self.producer.decide(&context).await;
            let kind = decision.kind();
            debug!(
                iteration = context.current_iteration() + 1,
                action = %kind,
                confidence = decision.confidence,
                "Decision received"
            );

            let request = match &decision.action {
                Action::CallTool(request) => request.clone(),
                terminal => {
                    let response = terminal.text().unwrap_or_default().to_owned();
                    context.record_decision(decision);
                    return context.into_report(response, TurnExit::Responded(kind));
                }
            };
            context.record_decision(decision);

            let outcome = self.dispatcher.execute(&request).await;
            if outcome.is_success() {
                context.record_outcome(outcome);
                continue;
            }

            let response = format!(
                "executing tool {} failed: {}",
                request.tool_name,
                outcome.error().unwrap_or_default()
            );
            context.record_outcome(outcome);
            return context.into_report(response, TurnExit::ToolFailed(request.tool_name));
        }

        warn!(iteration_limit = context.iteration_limit(), "Iteration budget exhausted");
        context.into_report(ITERATION_BUDGET_EXCEEDED_MESSAGE.to_owned(), TurnExit::BudgetExhausted)
    }

    fn finalize(store: &mut ConversationStore, user_input: &str, report: &TurnReport) {
        store.add_assistant_message(report.response.clone(), report.message_metadata());

        let Some(kind) = report.last_action_kind() else {
            return;
        };
        store.update_context(
            ContextUpdate::default()
                .tool_outcomes(report.outcomes.iter().map(OutcomeSummary::from).collect())
                .assistant_action(kind)
                .user_intent(truncate_chars(user_input, USER_INTENT_CHARS)),
        );
    }
}
