//! Tool System
//!
//! Tools are registered explicitly at startup and invoked by the interaction
//! driver through the [`ToolDispatcher`] contract. The registry holds no
//! per-turn state: everything a call needs arrives in the
//! [`InvocationRequest`], so the same registry can serve an interactive turn
//! and background jobs at once.

use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ToolError, ToolErrorKind};
use crate::message::truncate_chars;

/// Named arguments for a tool call
pub type Parameters = HashMap<String, Value>;

/// Tool call request produced by a decision
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    /// Registered tool name
    #[serde(default)]
    pub tool_name: String,

    /// Arguments as key-value pairs
    #[serde(default)]
    pub parameters: Parameters,

    /// Why the caller wants this tool run
    #[serde(default)]
    pub reason: String,
}

impl InvocationRequest {
    pub fn new(tool_name: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters,
            reason: String::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }
}

/// Result of a tool invocation
///
/// Exactly one of `result` and `error` is present, matching `success`. The
/// fields are private so the two constructors are the only way to build one.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InvocationOutcome {
    tool_name: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<ToolErrorKind>,
}

impl InvocationOutcome {
    pub fn success(tool_name: impl Into<String>, result: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: true,
            result: Some(result),
            error: None,
            error_kind: None,
        }
    }

    pub fn failure(tool_name: impl Into<String>, error: &ToolError) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: false,
            result: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn error_kind(&self) -> Option<ToolErrorKind> {
        self.error_kind
    }

    /// Text form of the payload: the value on success, the error otherwise.
    /// Strings are rendered without JSON quoting.
    pub fn render(&self) -> String {
        match (&self.result, &self.error) {
            (Some(Value::String(s)), _) => s.clone(),
            (Some(value), _) => value.to_string(),
            (None, Some(err)) => err.clone(),
            (None, None) => String::new(),
        }
    }

    /// [`render`](Self::render) cut to `max_chars`, with a marker noting how
    /// much was dropped.
    pub fn render_truncated(&self, max_chars: usize) -> String {
        let full = self.render();
        let total = full.chars().count();
        if total <= max_chars {
            return full;
        }
        format!(
            "{}…[truncated {} chars]",
            truncate_chars(&full, max_chars),
            total - max_chars
        )
    }
}

/// JSON type accepted by a parameter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    Any,
}

impl ParamType {
    fn accepts(self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::Array => value.is_array(),
            ParamType::Any => true,
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
            ParamType::Any => "any",
        };
        f.write_str(name)
    }
}

/// Parameter definition for a tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// Accepted JSON type
    #[serde(rename = "type")]
    pub param_type: ParamType,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl ParameterSchema {
    pub fn required(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: true,
            default: None,
            enum_values: None,
        }
    }

    pub fn optional(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }
}

/// Tool definition schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to the decision producer)
    pub description: String,

    /// Parameter definitions, in positional order
    pub parameters: Vec<ParameterSchema>,

    /// Category for grouping
    #[serde(default)]
    pub category: Option<String>,

    /// Whether tool has side effects
    #[serde(default)]
    pub has_side_effects: bool,
}

impl ToolSchema {
    /// Check `params` against the declared signature: no unknown names, every
    /// required parameter present, values of the declared type and within
    /// the allowed set.
    pub fn check(&self, params: &Parameters) -> Result<(), ToolError> {
        let mut unknown: Vec<&str> = params
            .keys()
            .filter(|key| !self.parameters.iter().any(|p| &p.name == *key))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            unknown.sort_unstable();
            return Err(ToolError::invalid(format!(
                "{}() got unexpected parameter(s): {}",
                self.name,
                unknown.join(", ")
            )));
        }

        for param in &self.parameters {
            match params.get(&param.name) {
                None | Some(Value::Null) if param.required => {
                    return Err(ToolError::invalid(format!(
                        "{}() missing required parameter '{}'",
                        self.name, param.name
                    )));
                }
                None | Some(Value::Null) => {}
                Some(value) => {
                    if !param.param_type.accepts(value) {
                        return Err(ToolError::invalid(format!(
                            "parameter '{}' of {}() expects {}, got {}",
                            param.name, self.name, param.param_type, value
                        )));
                    }
                    if let Some(allowed) = &param.enum_values {
                        if !allowed.contains(value) {
                            return Err(ToolError::invalid(format!(
                                "parameter '{}' of {}() must be one of {}",
                                param.name,
                                self.name,
                                Value::Array(allowed.clone())
                            )));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Copy of `params` with declared defaults filled in for absent entries.
    pub fn with_defaults(&self, params: &Parameters) -> Parameters {
        let mut filled = params.clone();
        for param in &self.parameters {
            if let Some(default) = &param.default {
                let absent = filled.get(&param.name).is_none_or(Value::is_null);
                if absent {
                    filled.insert(param.name.clone(), default.clone());
                }
            }
        }
        filled
    }

    pub fn parameter_names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's schema
    fn schema(&self) -> ToolSchema;

    /// Run the tool with validated, default-filled parameters
    async fn call(&self, params: &Parameters) -> Result<Value, ToolError>;

    /// Validate arguments before execution
    fn validate(&self, params: &Parameters) -> Result<(), ToolError> {
        self.schema().check(params)
    }
}

/// Directory entry for one tool
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Parameter names in positional order
    pub parameters: Vec<String>,
    pub description: String,
}

/// Read-only `{name → {parameters, description}}` view of a dispatcher
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolDirectory(BTreeMap<String, ToolInfo>);

impl ToolDirectory {
    pub fn get(&self, name: &str) -> Option<&ToolInfo> {
        self.0.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ToolInfo)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Markdown section describing every tool, for decision-producer prompts
    pub fn prompt_section(&self) -> String {
        let mut section = String::from("## Available Tools\n\n");
        if self.0.is_empty() {
            section.push_str("No tools are available.\n");
            return section;
        }
        for (name, info) in &self.0 {
            section.push_str(&format!("### {name}\n"));
            if !info.description.is_empty() {
                section.push_str(&format!("{}\n", info.description));
            }
            if !info.parameters.is_empty() {
                section.push_str(&format!("Parameters: {}\n", info.parameters.join(", ")));
            }
            section.push('\n');
        }
        section
    }
}

impl FromIterator<(String, ToolInfo)> for ToolDirectory {
    fn from_iter<I: IntoIterator<Item = (String, ToolInfo)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Executes invocation requests
///
/// `execute` is total: every failure becomes an unsuccessful
/// [`InvocationOutcome`].
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Run the requested tool
    async fn execute(&self, request: &InvocationRequest) -> InvocationOutcome;

    /// Describe every registered tool
    fn directory(&self) -> ToolDirectory;
}

/// Registry for available tools
///
/// Built once in the composition root, then shared behind an `Arc`.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Register a shared tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        if self.tools.insert(schema.name.clone(), tool).is_some() {
            warn!(tool = %schema.name, "Replacing previously registered tool");
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Sorted tool names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// All tool schemas, sorted by name
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    async fn run(&self, request: &InvocationRequest) -> Result<Value, ToolError> {
        let tool = self.get(&request.tool_name).ok_or_else(|| ToolError::NotFound {
            name: request.tool_name.clone(),
            available: self.names(),
        })?;

        tool.validate(&request.parameters)?;
        let params = tool.schema().with_defaults(&request.parameters);

        match AssertUnwindSafe(tool.call(&params)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(ToolError::execution(format!(
                "tool panicked: {}",
                panic_message(panic.as_ref())
            ))),
        }
    }
}

#[async_trait]
impl ToolDispatcher for ToolRegistry {
    async fn execute(&self, request: &InvocationRequest) -> InvocationOutcome {
        debug!(tool = %request.tool_name, reason = %request.reason, "Executing tool");

        match self.run(request).await {
            Ok(value) => InvocationOutcome::success(&request.tool_name, value),
            Err(err) => {
                warn!(tool = %request.tool_name, error = %err, "Tool invocation failed");
                InvocationOutcome::failure(&request.tool_name, &err)
            }
        }
    }

    fn directory(&self) -> ToolDirectory {
        self.tools
            .values()
            .map(|tool| {
                let schema = tool.schema();
                let info = ToolInfo {
                    parameters: schema.parameter_names(),
                    description: schema.description,
                };
                (schema.name, info)
            })
            .collect()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".into()
    }
}

// ============================================================================
// Parameter helpers for tool implementations
// ============================================================================

/// Fetch a required string parameter
pub fn str_param<'a>(params: &'a Parameters, name: &str) -> Result<&'a str, ToolError> {
    params
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::invalid(format!("'{name}' must be a string")))
}

/// Fetch an optional string parameter
pub fn opt_str_param<'a>(params: &'a Parameters, name: &str) -> Option<&'a str> {
    params.get(name).and_then(Value::as_str)
}

/// Fetch a required numeric parameter
pub fn number_param(params: &Parameters, name: &str) -> Result<serde_json::Number, ToolError> {
    match params.get(name) {
        Some(Value::Number(n)) => Ok(n.clone()),
        _ => Err(ToolError::invalid(format!("'{name}' must be a number"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "echo".into(),
                description: "Repeat the text back".into(),
                parameters: vec![
                    ParameterSchema::required("text", ParamType::String, "Text to echo"),
                    ParameterSchema::optional("times", ParamType::Integer, "Repetitions")
                        .with_default(json!(1)),
                ],
                category: None,
                has_side_effects: false,
            }
        }

        async fn call(&self, params: &Parameters) -> Result<Value, ToolError> {
            let text = str_param(params, "text")?;
            let times = params.get("times").and_then(Value::as_u64).unwrap_or(1);
            Ok(json!(text.repeat(usize::try_from(times).unwrap_or(1))))
        }
    }

    struct Failing;

    #[async_trait]
    impl Tool for Failing {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "failing".into(),
                description: "Always fails".into(),
                parameters: vec![],
                category: None,
                has_side_effects: false,
            }
        }

        async fn call(&self, _params: &Parameters) -> Result<Value, ToolError> {
            Err(anyhow::anyhow!("upstream unreachable").into())
        }
    }

    struct Panicking;

    #[async_trait]
    impl Tool for Panicking {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "panicking".into(),
                description: "Panics".into(),
                parameters: vec![],
                category: None,
                has_side_effects: false,
            }
        }

        async fn call(&self, _params: &Parameters) -> Result<Value, ToolError> {
            panic!("index out of range")
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Echo);
        registry.register(Failing);
        registry.register(Panicking);
        registry
    }

    fn request(name: &str, params: Value) -> InvocationRequest {
        let parameters = serde_json::from_value(params).unwrap();
        InvocationRequest::new(name, parameters)
    }

    #[tokio::test]
    async fn successful_call_carries_result_only() {
        let outcome = registry().execute(&request("echo", json!({"text": "ab", "times": 2}))).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.result(), Some(&json!("abab")));
        assert!(outcome.error().is_none());
        assert!(outcome.error_kind().is_none());
    }

    #[tokio::test]
    async fn defaults_are_filled_before_the_call() {
        let outcome = registry().execute(&request("echo", json!({"text": "x"}))).await;
        assert_eq!(outcome.result(), Some(&json!("x")));
    }

    #[tokio::test]
    async fn unknown_tool_lists_known_names() {
        let outcome = registry().execute(&request("unknown_tool", json!({}))).await;
        assert!(!outcome.is_success());
        assert!(outcome.result().is_none());
        assert_eq!(outcome.error_kind(), Some(ToolErrorKind::NotFound));
        let error = outcome.error().unwrap();
        assert!(error.contains("unknown_tool"));
        assert!(error.contains("echo, failing, panicking"));
    }

    #[tokio::test]
    async fn parameter_mismatches_are_parameter_errors() {
        let registry = registry();
        for params in [
            json!({}),
            json!({"text": 5}),
            json!({"text": "a", "colour": "red"}),
            json!({"text": "a", "times": 1.5}),
        ] {
            let outcome = registry.execute(&request("echo", params)).await;
            assert_eq!(outcome.error_kind(), Some(ToolErrorKind::InvalidParameters));
            assert!(outcome.error().unwrap().starts_with("parameter error:"));
        }
    }

    #[tokio::test]
    async fn tool_errors_and_panics_are_execution_errors() {
        let registry = registry();

        let failed = registry.execute(&request("failing", json!({}))).await;
        assert_eq!(failed.error_kind(), Some(ToolErrorKind::Execution));
        assert!(failed.error().unwrap().contains("upstream unreachable"));

        let panicked = registry.execute(&request("panicking", json!({}))).await;
        assert!(!panicked.is_success());
        assert_eq!(panicked.error_kind(), Some(ToolErrorKind::Execution));
        assert!(panicked.error().unwrap().contains("index out of range"));
    }

    #[test]
    fn directory_lists_parameters_in_order() {
        let directory = registry().directory();
        assert_eq!(directory.len(), 3);
        let echo = directory.get("echo").unwrap();
        assert_eq!(echo.parameters, vec!["text".to_string(), "times".to_string()]);
        assert_eq!(echo.description, "Repeat the text back");

        let section = directory.prompt_section();
        assert!(section.contains("### echo"));
        assert!(section.contains("Parameters: text, times"));
    }

    #[test]
    fn enum_values_are_enforced() {
        let schema = ToolSchema {
            name: "mode".into(),
            description: String::new(),
            parameters: vec![ParameterSchema::required("m", ParamType::String, "")
                .with_enum(vec![json!("fast"), json!("slow")])],
            category: None,
            has_side_effects: false,
        };
        let ok: Parameters = serde_json::from_value(json!({"m": "fast"})).unwrap();
        let bad: Parameters = serde_json::from_value(json!({"m": "medium"})).unwrap();
        assert!(schema.check(&ok).is_ok());
        assert!(schema.check(&bad).is_err());
    }

    #[test]
    fn render_truncates_long_results() {
        let outcome = InvocationOutcome::success("echo", json!("x".repeat(30)));
        let rendered = outcome.render_truncated(10);
        assert!(rendered.starts_with("xxxxxxxxxx…"));
        assert!(rendered.ends_with("[truncated 20 chars]"));
        assert_eq!(outcome.render_truncated(100), "x".repeat(30));
    }
}
