//! Scheduler Tool
//!
//! Lets the agent manage recurring jobs. A job names another registered tool
//! and the arguments to call it with; the [`Scheduler`] fires it through the
//! same dispatcher the agent uses.

use agent_core::tool::{ParamType, ParameterSchema, Parameters, opt_str_param, str_param};
use agent_core::{Tool, ToolError, ToolSchema};
use agent_runtime::scheduler::{JobSpec, Scheduler, Trigger};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::info;

const TOOL_NAME: &str = "scheduler";

/// Tool for adding, removing and listing scheduled jobs
pub struct SchedulerTool {
    scheduler: Scheduler,
}

impl SchedulerTool {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }

    async fn add(&self, params: &Parameters) -> Result<Value, ToolError> {
        let tool_name = opt_str_param(params, "tool_name")
            .ok_or_else(|| ToolError::invalid("action 'add' requires 'tool_name'"))?;
        if tool_name == TOOL_NAME {
            return Err(ToolError::invalid("the scheduler cannot schedule itself"));
        }

        let kind = opt_str_param(params, "trigger").unwrap_or("date");
        let empty = Map::new();
        let trigger_args = params.get("trigger_args").and_then(Value::as_object).unwrap_or(&empty);
        let trigger = Trigger::from_args(kind, trigger_args)?;

        let args = params
            .get("args")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let kwargs: Parameters = params
            .get("kwargs")
            .and_then(Value::as_object)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        let mut spec = JobSpec::new(tool_name, trigger).with_args(args).with_kwargs(kwargs);
        if let Some(id) = opt_str_param(params, "job_id") {
            spec = spec.with_id(id);
        }

        let job = self.scheduler.add(spec).await?;
        Ok(json!({
            "job_id": job.id,
            "next_run_time": job.next_run_time.map(|t| t.to_rfc3339()),
        }))
    }

    async fn remove(&self, params: &Parameters) -> Result<Value, ToolError> {
        let id = opt_str_param(params, "job_id")
            .ok_or_else(|| ToolError::invalid("action 'remove' requires 'job_id'"))?;
        self.scheduler.remove(id).await?;
        Ok(json!({ "removed": id }))
    }

    async fn list(&self) -> Result<Value, ToolError> {
        let jobs = self.scheduler.list().await;
        serde_json::to_value(jobs).map_err(|e| ToolError::execution(e.to_string()))
    }
}

#[async_trait]
impl Tool for SchedulerTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: TOOL_NAME.into(),
            description: "Manage scheduled jobs that call another tool later or repeatedly. \
                Actions: add, remove, list, start, shutdown."
                .into(),
            parameters: vec![
                ParameterSchema::required("action", ParamType::String, "add | remove | list | start | shutdown")
                    .with_enum(
                        ["add", "remove", "list", "start", "shutdown"]
                            .iter()
                            .map(|a| json!(a))
                            .collect(),
                    ),
                ParameterSchema::optional("job_id", ParamType::String, "Job id; required for remove, optional for add"),
                ParameterSchema::optional("trigger", ParamType::String, "date | interval | cron")
                    .with_default(json!("date"))
                    .with_enum(vec![json!("date"), json!("interval"), json!("cron")]),
                ParameterSchema::optional(
                    "trigger_args",
                    ParamType::Object,
                    "date: {run_date}; interval: {weeks, days, hours, minutes, seconds}; \
                     cron: {expression} (crontab line, 0 or 7 = Sunday) or \
                     {second, minute, hour, day, month, day_of_week (0 = Monday), year}",
                ),
                ParameterSchema::optional("tool_name", ParamType::String, "Tool the job calls; required for add"),
                ParameterSchema::optional("args", ParamType::Array, "Positional arguments for the tool"),
                ParameterSchema::optional("kwargs", ParamType::Object, "Named arguments for the tool"),
            ],
            category: Some("scheduling".into()),
            has_side_effects: true,
        }
    }

    async fn call(&self, params: &Parameters) -> Result<Value, ToolError> {
        let action = str_param(params, "action")?;
        info!(action = %action, "Scheduler tool invoked");

        match action {
            "add" => self.add(params).await,
            "remove" => self.remove(params).await,
            "list" => self.list().await,
            "start" => {
                self.scheduler.start().await?;
                Ok(json!({ "started": true }))
            }
            "shutdown" => {
                self.scheduler.shutdown().await?;
                Ok(json!({ "shutdown": true }))
            }
            other => Err(ToolError::invalid(format!("unknown action: {other}"))),
        }
    }
}
