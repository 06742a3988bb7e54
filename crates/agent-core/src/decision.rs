//! Decisions
//!
//! One structured decision per producer call, and the tolerant parser that
//! turns free LLM text into one. Parsing never fails: anything that cannot be
//! understood becomes a low-confidence reply.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::tool::InvocationRequest;

/// Confidence assigned when none (or an unusable one) is supplied
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Confidence of replies synthesized from decode failures
pub const FALLBACK_CONFIDENCE: f64 = 0.3;

/// Discriminant of [`Action`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Reply,
    CallTool,
    AskUser,
    Delegate,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Reply => "reply",
            ActionKind::CallTool => "call_tool",
            ActionKind::AskUser => "ask_user",
            ActionKind::Delegate => "delegate",
        }
    }

    /// Case-insensitive lookup, accepting the short and legacy spellings
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "reply" | "direct_reply" => Some(ActionKind::Reply),
            "call_tool" | "tool" => Some(ActionKind::CallTool),
            "ask_user" | "ask" => Some(ActionKind::AskUser),
            "delegate" => Some(ActionKind::Delegate),
            _ => None,
        }
    }

    /// Whether a decision of this kind ends the turn
    pub fn is_terminal(self) -> bool {
        !matches!(self, ActionKind::CallTool)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the producer wants to happen next
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Action {
    /// Answer the user
    Reply(String),
    /// Run a tool and decide again with its outcome
    CallTool(InvocationRequest),
    /// Ask the user for more information
    AskUser(String),
    /// Hand the request off; finalized like a reply
    Delegate(String),
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Reply(_) => ActionKind::Reply,
            Action::CallTool(_) => ActionKind::CallTool,
            Action::AskUser(_) => ActionKind::AskUser,
            Action::Delegate(_) => ActionKind::Delegate,
        }
    }

    /// Payload text of a terminal action
    pub fn text(&self) -> Option<&str> {
        match self {
            Action::Reply(text) | Action::AskUser(text) | Action::Delegate(text) => Some(text),
            Action::CallTool(_) => None,
        }
    }
}

/// One structured decision
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Decision {
    pub action: Action,
    /// Self-reported confidence in `[0, 1]`
    pub confidence: f64,
    pub reasoning: String,
}

impl Decision {
    pub fn new(action: Action, confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            action,
            confidence,
            reasoning: reasoning.into(),
        }
    }

    pub fn reply(text: impl Into<String>) -> Self {
        Self::new(Action::Reply(text.into()), DEFAULT_CONFIDENCE, String::new())
    }

    pub fn call_tool(request: InvocationRequest) -> Self {
        Self::new(Action::CallTool(request), DEFAULT_CONFIDENCE, String::new())
    }

    /// Low-confidence reply standing in for a response that could not be used
    pub fn fallback(problem: impl std::fmt::Display, raw: &str) -> Self {
        Self::new(
            Action::Reply(format!(
                "Sorry, I could not process that request ({problem}). Raw response: {raw}"
            )),
            FALLBACK_CONFIDENCE,
            format!("decode error: {problem}"),
        )
    }

    /// Low-confidence reply used when the provider could not be reached
    pub fn provider_failure(error: impl std::fmt::Display) -> Self {
        Self::new(
            Action::Reply(format!("Sorry, the language model is unavailable right now ({error}).")),
            FALLBACK_CONFIDENCE,
            format!("provider error: {error}"),
        )
    }

    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }
}

/// Why a response could not be decoded into a decision
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("decision must be a JSON object")]
    NotAnObject,

    #[error("call_tool requires an object payload, got {0}")]
    ToolPayload(String),

    #[error("malformed tool request: {0}")]
    ToolRequest(serde_json::Error),
}

/// Parse a provider response into a decision.
///
/// `provider_reasoning` is the provider's separate reasoning channel, used
/// when the decoded object carries no `reasoning` of its own.
pub fn parse_decision(raw: &str, provider_reasoning: Option<&str>) -> Decision {
    let fallback_reasoning = provider_reasoning.unwrap_or_default();

    let Some(object) = extract_object(raw) else {
        return Decision::new(
            Action::Reply(raw.to_string()),
            DEFAULT_CONFIDENCE,
            fallback_reasoning,
        );
    };

    match decode(object, fallback_reasoning) {
        Ok(decision) => decision,
        Err(err) => {
            tracing::debug!(error = %err, "Falling back to reply for undecodable response");
            Decision::fallback(&err, raw)
        }
    }
}

/// Span from the first `{` to the last `}`
fn extract_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn decode(object: &str, fallback_reasoning: &str) -> Result<Decision, DecodeError> {
    let Value::Object(fields) = serde_json::from_str::<Value>(object)? else {
        return Err(DecodeError::NotAnObject);
    };

    let (kind, recognized) = match fields.get("action_type") {
        None | Some(Value::Null) => (ActionKind::Reply, true),
        Some(Value::String(label)) => match ActionKind::from_label(label) {
            Some(kind) => (kind, true),
            None => (ActionKind::Reply, false),
        },
        Some(_) => (ActionKind::Reply, false),
    };

    let content = fields.get("action_content").cloned().unwrap_or(Value::Null);
    let action = match kind {
        ActionKind::CallTool => Action::CallTool(tool_request(content)?),
        ActionKind::Reply => Action::Reply(payload_text(content)),
        ActionKind::AskUser => Action::AskUser(payload_text(content)),
        ActionKind::Delegate => Action::Delegate(payload_text(content)),
    };

    let mut confidence = confidence(&fields);
    if !recognized {
        confidence = confidence.min(DEFAULT_CONFIDENCE);
    }

    let reasoning = fields
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or(fallback_reasoning);

    Ok(Decision::new(action, confidence, reasoning))
}

fn tool_request(content: Value) -> Result<InvocationRequest, DecodeError> {
    match content {
        Value::Object(_) => serde_json::from_value(content).map_err(DecodeError::ToolRequest),
        other => Err(DecodeError::ToolPayload(type_name(&other).to_string())),
    }
}

fn payload_text(content: Value) -> String {
    match content {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn confidence(fields: &Map<String, Value>) -> f64 {
    let value = match fields.get("confidence") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    value
        .filter(|c| (0.0..=1.0).contains(c))
        .unwrap_or(DEFAULT_CONFIDENCE)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
