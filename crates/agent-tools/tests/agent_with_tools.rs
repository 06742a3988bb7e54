//! Turns through the driver using the bundled tools.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use agent_core::{
    AgentConfig, ConversationStore, Decision, DecisionProducer, InteractionDriver, InvocationRequest, ToolDispatcher,
    TurnContext, TurnExit,
};
use agent_runtime::Scheduler;
use agent_tools::standard_registry;
use async_trait::async_trait;
use serde_json::{Value, json};

/// Hands out queued decisions, then replies with the last tool result
struct Scripted {
    decisions: Mutex<VecDeque<Decision>>,
}

#[async_trait]
impl DecisionProducer for Scripted {
    async fn decide(&self, context: &TurnContext) -> Decision {
        if let Some(next) = self.decisions.lock().unwrap().pop_front() {
            return next;
        }
        let last = context.outcomes().last().map(|o| o.render()).unwrap_or_default();
        Decision::reply(last)
    }
}

fn call(tool: &str, params: Value) -> Decision {
    Decision::call_tool(InvocationRequest::new(tool, serde_json::from_value(params).unwrap()))
}

fn agent(decisions: Vec<Decision>) -> (InteractionDriver, Scheduler) {
    let producer = Arc::new(Scripted {
        decisions: Mutex::new(decisions.into()),
    });

    let scheduler = Scheduler::new();
    let dispatcher: Arc<dyn ToolDispatcher> = Arc::new(standard_registry(&scheduler, producer.clone()));
    scheduler.bind(&dispatcher).unwrap();

    let driver = InteractionDriver::new(producer, dispatcher, Arc::new(AgentConfig::default()));
    (driver, scheduler)
}

#[tokio::test]
async fn ten_plus_five() {
    let (driver, _) = agent(vec![call("calculator", json!({"a": 10, "b": 5, "operation": "add"}))]);
    let mut store = ConversationStore::new(20);

    let report = driver.execute_turn("10+5", &mut store).await;

    assert_eq!(report.response, "15");
    assert_eq!(report.outcomes[0].result(), Some(&json!(15)));
    assert_eq!(store.context().last_tool_outcomes[0].result, "15");
}

#[tokio::test]
async fn division_by_zero_ends_the_turn() {
    let (driver, _) = agent(vec![call("calculator", json!({"a": 1, "b": 0, "operation": "divide"}))]);
    let mut store = ConversationStore::new(20);

    let report = driver.execute_turn("1/0", &mut store).await;

    assert_eq!(report.exit, TurnExit::ToolFailed("calculator".into()));
    assert_eq!(
        report.response,
        "executing tool calculator failed: execution error: division by zero"
    );
}

#[tokio::test]
async fn agent_schedules_a_job() {
    let (driver, scheduler) = agent(vec![call(
        "scheduler",
        json!({
            "action": "add",
            "job_id": "hourly-time",
            "trigger": "cron",
            "trigger_args": {"minute": 0},
            "tool_name": "datetime"
        }),
    )]);
    let mut store = ConversationStore::new(20);

    let report = driver.execute_turn("tell me the time every hour", &mut store).await;

    assert!(report.outcomes[0].is_success(), "{:?}", report.outcomes[0].error());
    let jobs = scheduler.list().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, "hourly-time");
    assert_eq!(jobs[0].tool_name, "datetime");
    assert_eq!(jobs[0].trigger, "cron[0 0 * * * *]");
    assert!(!scheduler.is_running().await);
}

#[tokio::test]
async fn delegated_task_runs_apart_from_the_conversation() {
    let (driver, _) = agent(vec![
        call("delegate", json!({"task": "add 10 and 5"})),
        call("calculator", json!({"a": 10, "b": 5, "operation": "add"})),
    ]);
    let mut store = ConversationStore::new(20);
    store.add_user_message("earlier question");

    let report = driver.execute_turn("ask the helper", &mut store).await;

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].tool_name(), "delegate");
    let result = report.outcomes[0].result().unwrap();
    assert_eq!(result["response"], json!("15"));
    assert_eq!(store.len(), 3);
    assert_eq!(store.context().last_tool_outcomes[0].tool_name, "delegate");
}
