//! Delegate Tool
//!
//! Hands a self-contained task to a nested agent turn. The nested turn starts
//! from an empty history, only sees the tools it was given and stops at its
//! own iteration limit.

use std::sync::Arc;

use agent_core::tool::{ParamType, ParameterSchema, Parameters, str_param};
use agent_core::{
    AgentConfig, DecisionProducer, InteractionDriver, Tool, ToolDispatcher, ToolError, ToolSchema, TurnExit,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info};

/// Decisions a delegated turn may make
pub const DELEGATE_ITERATION_LIMIT: usize = 5;

/// Tool running a task through a nested agent turn
pub struct DelegateTool {
    driver: InteractionDriver,
}

impl DelegateTool {
    /// `dispatcher` holds the tools the nested turn may call
    pub fn new(
        producer: Arc<dyn DecisionProducer>,
        dispatcher: Arc<dyn ToolDispatcher>,
        iteration_limit: usize,
    ) -> Self {
        let config = AgentConfig::default().with_iteration_limit(iteration_limit);
        Self {
            driver: InteractionDriver::new(producer, dispatcher, Arc::new(config)),
        }
    }
}

#[async_trait]
impl Tool for DelegateTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "delegate".into(),
            description: "Hand a self-contained task to a helper agent that works it out with its own tools \
                          and reports the answer. The helper cannot see this conversation, so describe the \
                          task completely."
                .into(),
            parameters: vec![ParameterSchema::required(
                "task",
                ParamType::String,
                "Complete description of the task",
            )],
            category: Some("agent".into()),
            has_side_effects: false,
        }
    }

    async fn call(&self, params: &Parameters) -> Result<Value, ToolError> {
        let task = str_param(params, "task")?.trim();
        if task.is_empty() {
            return Err(ToolError::invalid("task must not be empty"));
        }

        info!(limit = self.driver.config().iteration_limit, "Delegating task");
        let report = self.driver.run_detached(task, Vec::new()).await;
        debug!(exit = ?report.exit, steps = report.decisions.len(), "Delegated task finished");

        match report.exit {
            TurnExit::Responded(kind) => Ok(json!({
                "response": report.response,
                "action": kind.as_str(),
                "steps": report.decisions.len(),
            })),
            TurnExit::ToolFailed(_) | TurnExit::BudgetExhausted => Err(ToolError::execution(report.response)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use agent_core::{Decision, InvocationRequest, ToolRegistry, TurnContext};

    use super::*;
    use crate::CalculatorTool;

    /// Plays back decisions, then replies with the last tool result; records
    /// what each turn could see
    #[derive(Default)]
    struct Scripted {
        decisions: Mutex<VecDeque<Decision>>,
        seen: Mutex<Vec<(usize, Vec<String>)>>,
    }

    #[async_trait]
    impl DecisionProducer for Scripted {
        async fn decide(&self, context: &TurnContext) -> Decision {
            let tools = context.directory().names().map(str::to_string).collect();
            self.seen.lock().unwrap().push((context.history().len(), tools));
            if let Some(next) = self.decisions.lock().unwrap().pop_front() {
                return next;
            }
            let last = context.outcomes().last().map(|o| o.render()).unwrap_or_default();
            Decision::reply(last)
        }
    }

    fn delegate(decisions: Vec<Decision>, limit: usize) -> (DelegateTool, Arc<Scripted>) {
        let producer = Arc::new(Scripted {
            decisions: Mutex::new(decisions.into()),
            ..Scripted::default()
        });
        let mut tools = ToolRegistry::new();
        tools.register(CalculatorTool);
        (DelegateTool::new(producer.clone(), Arc::new(tools), limit), producer)
    }

    fn add(a: i64, b: i64) -> Decision {
        let params = serde_json::from_value(json!({"a": a, "b": b, "operation": "add"})).unwrap();
        Decision::call_tool(InvocationRequest::new("calculator", params))
    }

    fn task(text: &str) -> Parameters {
        serde_json::from_value(json!({ "task": text })).unwrap()
    }

    #[tokio::test]
    async fn nested_turn_uses_its_own_tools_and_no_history() {
        let (tool, producer) = delegate(vec![add(10, 5)], DELEGATE_ITERATION_LIMIT);

        let result = tool.call(&task("add 10 and 5")).await.unwrap();

        assert_eq!(result["response"], json!("15"));
        assert_eq!(result["action"], json!("reply"));
        assert_eq!(result["steps"], json!(2));
        let seen = producer.seen.lock().unwrap();
        assert!(seen.iter().all(|(history, tools)| *history == 0 && tools == &["calculator"]));
    }

    #[tokio::test]
    async fn nested_turn_stops_at_its_own_limit() {
        let (tool, producer) = delegate(vec![add(1, 1), add(2, 2), add(3, 3)], 2);

        let err = tool.call(&task("keep adding")).await.unwrap_err();

        assert!(matches!(err, ToolError::Execution(_)));
        assert_eq!(producer.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn blank_task_is_rejected() {
        let (tool, producer) = delegate(vec![], DELEGATE_ITERATION_LIMIT);
        assert!(matches!(tool.call(&task("  ")).await, Err(ToolError::InvalidParameters(_))));
        assert!(producer.seen.lock().unwrap().is_empty());
    }
}
