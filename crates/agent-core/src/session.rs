//! Session Management
//!
//! The conversation store: a capped, ordered message log plus the running
//! context the driver derives from finished turns. A store can be written to
//! and read back from a JSON session document.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::decision::ActionKind;
use crate::error::{AgentError, Result};
use crate::message::{HistoryEntry, Message, Metadata, Role, timestamp, truncate_chars};
use crate::tool::InvocationOutcome;

/// Default number of messages retained by a store
pub const DEFAULT_MAX_HISTORY: usize = 20;

/// Messages covered by [`ConversationStore::summary`]
const SUMMARY_WINDOW: usize = 10;
const SUMMARY_LINE_CHARS: usize = 80;
const OUTCOME_SUMMARY_CHARS: usize = 200;

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// `conv_<date>_<time>_<8 hex>`, sortable by creation time
    pub fn new() -> Self {
        let now = Utc::now();
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("conv_{}_{}", now.format("%Y%m%d_%H%M%S"), &suffix[..8]))
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compact record of one tool outcome kept across turns
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeSummary {
    pub tool_name: String,
    pub success: bool,
    /// Rendered result (or error), cut to 200 characters
    #[serde(default, deserialize_with = "result_text")]
    pub result: String,
}

/// Result text, rendering any non-string JSON value
fn result_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Action label, also in the `ActionType.DIRECT_REPLY` spelling of older
/// session files; an unrecognised label reads as no action.
fn action_label<'de, D>(deserializer: D) -> std::result::Result<Option<ActionKind>, D::Error>
where
    D: Deserializer<'de>,
{
    let label = Option::<String>::deserialize(deserializer)?;
    Ok(label.as_deref().and_then(|label| {
        let bare = label.rsplit_once('.').map_or(label, |(_, variant)| variant);
        ActionKind::from_label(bare)
    }))
}

impl From<&InvocationOutcome> for OutcomeSummary {
    fn from(outcome: &InvocationOutcome) -> Self {
        Self {
            tool_name: outcome.tool_name().to_string(),
            success: outcome.is_success(),
            result: truncate_chars(&outcome.render(), OUTCOME_SUMMARY_CHARS).to_string(),
        }
    }
}

/// State carried from one turn to the next
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    #[serde(default, alias = "last_tool_results")]
    pub last_tool_outcomes: Vec<OutcomeSummary>,
    #[serde(default)]
    pub last_user_intent: Option<String>,
    #[serde(default, deserialize_with = "action_label")]
    pub last_assistant_action: Option<ActionKind>,
    #[serde(default)]
    pub context_summary: Option<String>,
}

impl ConversationContext {
    /// Apply every field present in `update`, leaving the others alone
    pub fn apply(&mut self, update: ContextUpdate) {
        if let Some(outcomes) = update.tool_outcomes {
            self.last_tool_outcomes = outcomes;
        }
        if let Some(intent) = update.user_intent {
            self.last_user_intent = Some(intent);
        }
        if let Some(action) = update.assistant_action {
            self.last_assistant_action = Some(action);
        }
        if let Some(summary) = update.context_summary {
            self.context_summary = Some(summary);
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Partial context update; `None` fields are left unchanged
#[derive(Clone, Debug, Default)]
pub struct ContextUpdate {
    pub tool_outcomes: Option<Vec<OutcomeSummary>>,
    pub user_intent: Option<String>,
    pub assistant_action: Option<ActionKind>,
    pub context_summary: Option<String>,
}

impl ContextUpdate {
    pub fn tool_outcomes(mut self, outcomes: Vec<OutcomeSummary>) -> Self {
        self.tool_outcomes = Some(outcomes);
        self
    }

    pub fn user_intent(mut self, intent: impl Into<String>) -> Self {
        self.user_intent = Some(intent.into());
        self
    }

    pub fn assistant_action(mut self, action: ActionKind) -> Self {
        self.assistant_action = Some(action);
        self
    }

    pub fn context_summary(mut self, summary: impl Into<String>) -> Self {
        self.context_summary = Some(summary.into());
        self
    }
}

/// Per-session counters
#[derive(Clone, Debug, Serialize)]
pub struct SessionStats {
    pub session_id: SessionId,
    pub total_messages: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub system_messages: usize,
    pub start_time: DateTime<Utc>,
    pub duration_seconds: f64,
}

impl std::fmt::Display for SessionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "session_id: {}", self.session_id)?;
        writeln!(f, "total_messages: {}", self.total_messages)?;
        writeln!(f, "user_messages: {}", self.user_messages)?;
        writeln!(f, "assistant_messages: {}", self.assistant_messages)?;
        writeln!(f, "system_messages: {}", self.system_messages)?;
        writeln!(f, "start_time: {}", self.start_time.to_rfc3339())?;
        write!(f, "duration_seconds: {:.1}", self.duration_seconds)
    }
}

/// On-disk form of a store
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionDocument {
    #[serde(alias = "conversation_id")]
    pub session_id: SessionId,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub context: ConversationContext,
}

/// Bounded message log plus running context for one session
///
/// The id and start time are fixed at creation. Appending beyond
/// `max_history_length` evicts the oldest message.
#[derive(Clone, Debug)]
pub struct ConversationStore {
    id: SessionId,
    start_time: DateTime<Utc>,
    messages: VecDeque<Message>,
    context: ConversationContext,
    max_history_length: usize,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl ConversationStore {
    /// Create an empty store retaining at most `max_history_length` messages
    pub fn new(max_history_length: usize) -> Self {
        let store = Self {
            id: SessionId::new(),
            start_time: Utc::now(),
            messages: VecDeque::with_capacity(max_history_length.min(256)),
            context: ConversationContext::default(),
            max_history_length,
        };
        info!(session_id = %store.id, max_history_length, "New conversation session");
        store
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn max_history_length(&self) -> usize {
        self.max_history_length
    }

    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Stored messages, oldest first
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// Append a message, evicting from the front past capacity
    pub fn push(&mut self, message: Message) {
        self.messages.push_back(message);
        while self.messages.len() > self.max_history_length {
            if let Some(evicted) = self.messages.pop_front() {
                debug!(session_id = %self.id, role = %evicted.role, "Evicted oldest message");
            }
        }
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.push(Message::user(content));
    }

    pub fn add_assistant_message(&mut self, content: impl Into<String>, metadata: Metadata) {
        self.push(Message::assistant(content).with_metadata(metadata));
    }

    pub fn add_system_message(&mut self, content: impl Into<String>) {
        self.push(Message::system(content));
    }

    /// Answer a trailing user message that never got a reply, as left by
    /// a turn cut short. The note carries `"interrupted": true` metadata.
    /// Returns whether a note was added.
    pub fn close_unanswered_turn(&mut self, note: impl Into<String>) -> bool {
        if !self.messages.back().is_some_and(|m| m.role == Role::User) {
            return false;
        }
        let mut metadata = Metadata::new();
        metadata.insert("interrupted".into(), Value::Bool(true));
        self.add_assistant_message(note, metadata);
        debug!(session_id = %self.id, "Closed interrupted turn");
        true
    }

    /// Full history as role/content pairs, oldest first
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.messages.iter().map(Message::entry).collect()
    }

    /// The last `count` messages, oldest first
    pub fn recent(&self, count: usize) -> Vec<&Message> {
        let skip = self.messages.len().saturating_sub(count);
        self.messages.iter().skip(skip).collect()
    }

    /// One short line per message for the last ten messages
    pub fn summary(&self) -> String {
        if self.messages.is_empty() {
            return "No conversation yet.".into();
        }
        self.recent(SUMMARY_WINDOW)
            .into_iter()
            .map(|m| {
                format!(
                    "[{}] {}",
                    m.role.label(),
                    truncate_chars(&m.content, SUMMARY_LINE_CHARS)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn update_context(&mut self, update: ContextUpdate) {
        self.context.apply(update);
        debug!(session_id = %self.id, "Updated conversation context");
    }

    /// Drop every message and reset the context
    pub fn clear_history(&mut self) {
        self.messages.clear();
        self.context = ConversationContext::default();
        info!(session_id = %self.id, "Cleared conversation history");
    }

    pub fn stats(&self) -> SessionStats {
        let count = |role: Role| self.messages.iter().filter(|m| m.role == role).count();
        let elapsed = Utc::now() - self.start_time;
        #[allow(clippy::cast_precision_loss)]
        let duration_seconds = elapsed.num_milliseconds() as f64 / 1000.0;
        SessionStats {
            session_id: self.id.clone(),
            total_messages: self.messages.len(),
            user_messages: count(Role::User),
            assistant_messages: count(Role::Assistant),
            system_messages: count(Role::System),
            start_time: self.start_time,
            duration_seconds,
        }
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    pub fn to_document(&self) -> SessionDocument {
        SessionDocument {
            session_id: self.id.clone(),
            start_time: self.start_time,
            messages: self.messages.iter().cloned().collect(),
            context: self.context.clone(),
        }
    }

    /// Rebuild a store; when the document holds more than
    /// `max_history_length` messages only the most recent are kept.
    pub fn from_document(doc: SessionDocument, max_history_length: usize) -> Self {
        let mut messages: VecDeque<Message> = doc.messages.into();
        while messages.len() > max_history_length {
            messages.pop_front();
        }
        Self {
            id: doc.session_id,
            start_time: doc.start_time,
            messages,
            context: doc.context,
            max_history_length,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }

    pub fn from_json(json: &str, max_history_length: usize) -> Result<Self> {
        let doc: SessionDocument = serde_json::from_str(json)?;
        Ok(Self::from_document(doc, max_history_length))
    }

    /// Write the session document to `path`
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|e| AgentError::persistence(path, e))?;
        info!(session_id = %self.id, path = %path.display(), "Conversation saved");
        Ok(())
    }

    /// Write `<dir>/<session_id>.json`, creating `dir` if needed
    pub fn save_to_dir(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| AgentError::persistence(dir, e))?;
        let path = dir.join(format!("{}.json", self.id));
        self.save_to_file(&path)?;
        Ok(path)
    }

    /// Read a session document; any failure yields a fresh empty store
    pub fn load_from_file(path: impl AsRef<Path>, max_history_length: usize) -> Self {
        let path = path.as_ref();
        match Self::try_load(path, max_history_length) {
            Ok(store) => {
                info!(
                    session_id = %store.id,
                    path = %path.display(),
                    messages = store.len(),
                    "Conversation loaded"
                );
                store
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load conversation, starting fresh");
                Self::new(max_history_length)
            }
        }
    }

    /// Read a session document, reporting failures
    pub fn try_load(path: impl AsRef<Path>, max_history_length: usize) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| AgentError::persistence(path, e))?;
        Self::from_json(&json, max_history_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn numbered(store: &mut ConversationStore, n: usize) {
        for i in 0..n {
            store.add_user_message(format!("message {i}"));
        }
    }

    #[test]
    fn test_session_creation() {
        let store = ConversationStore::new(20);
        assert!(store.is_empty());
        assert!(store.id().as_str().starts_with("conv_"));
        assert!(store.context().is_empty());
    }

    #[test]
    fn oldest_messages_are_evicted_first() {
        let mut store = ConversationStore::new(3);
        numbered(&mut store, 5);
        let contents: Vec<_> = store.messages().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["message 2", "message 3", "message 4"]);
    }

    #[test]
    fn recent_returns_tail_in_order() {
        let mut store = ConversationStore::new(10);
        numbered(&mut store, 4);
        let recent: Vec<_> = store.recent(2).iter().map(|m| m.content.clone()).collect();
        assert_eq!(recent, vec!["message 2", "message 3"]);
        assert_eq!(store.recent(100).len(), 4);
    }

    #[test]
    fn summary_covers_last_ten_and_cuts_long_lines() {
        let mut store = ConversationStore::new(50);
        assert_eq!(store.summary(), "No conversation yet.");

        numbered(&mut store, 11);
        store.add_assistant_message("a".repeat(200), Metadata::new());
        let summary = store.summary();
        let lines: Vec<_> = summary.lines().collect();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0], "[User] message 2");
        assert_eq!(lines[9], format!("[Assistant] {}", "a".repeat(80)));
    }

    #[test]
    fn unanswered_input_gets_a_closing_note() {
        let mut store = ConversationStore::default();
        assert!(!store.close_unanswered_turn("(interrupted)"));

        store.add_user_message("long task");
        assert!(store.close_unanswered_turn("(interrupted)"));
        let last = store.messages().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, "(interrupted)");
        assert_eq!(last.metadata["interrupted"], json!(true));

        assert!(!store.close_unanswered_turn("(interrupted)"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn context_updates_are_field_independent() {
        let mut store = ConversationStore::default();
        store.update_context(ContextUpdate::default().user_intent("add numbers"));
        store.update_context(ContextUpdate::default().assistant_action(ActionKind::CallTool));
        assert_eq!(store.context().last_user_intent.as_deref(), Some("add numbers"));
        assert_eq!(store.context().last_assistant_action, Some(ActionKind::CallTool));
        assert!(store.context().context_summary.is_none());
    }

    #[test]
    fn clear_resets_messages_and_context_but_not_identity() {
        let mut store = ConversationStore::default();
        let id = store.id().clone();
        numbered(&mut store, 3);
        store.update_context(ContextUpdate::default().context_summary("math"));
        store.clear_history();
        assert!(store.is_empty());
        assert!(store.context().is_empty());
        assert_eq!(store.id(), &id);
    }

    #[test]
    fn stats_count_by_role() {
        let mut store = ConversationStore::default();
        store.add_system_message("be brief");
        store.add_user_message("hi");
        store.add_assistant_message("hello", Metadata::new());
        store.add_user_message("bye");
        let stats = store.stats();
        assert_eq!(stats.total_messages, 4);
        assert_eq!(stats.user_messages, 2);
        assert_eq!(stats.assistant_messages, 1);
        assert_eq!(stats.system_messages, 1);
        assert!(stats.duration_seconds >= 0.0);
        assert!(stats.to_string().contains("user_messages: 2"));
    }

    fn populated_store() -> ConversationStore {
        let mut store = ConversationStore::new(20);
        store.add_system_message("You are terse.");
        store.add_user_message("10+5");
        let mut metadata = Metadata::new();
        metadata.insert("action_kind".into(), json!("reply"));
        metadata.insert("tool_outcomes".into(), json!([{"tool": "calculator", "success": true}]));
        store.add_assistant_message("15", metadata);
        store.update_context(
            ContextUpdate::default()
                .tool_outcomes(vec![OutcomeSummary {
                    tool_name: "calculator".into(),
                    success: true,
                    result: "15".into(),
                }])
                .user_intent("10+5")
                .assistant_action(ActionKind::Reply)
                .context_summary("arithmetic"),
        );
        store
    }

    #[test]
    fn json_round_trip_is_lossless() {
        let store = populated_store();
        let restored = ConversationStore::from_json(&store.to_json().unwrap(), 20).unwrap();
        assert_eq!(restored.to_document(), store.to_document());
    }

    #[test]
    fn file_round_trip_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let store = populated_store();
        let path = store.save_to_dir(dir.path().join("logs")).unwrap();
        assert!(path.ends_with(format!("{}.json", store.id())));

        let restored = ConversationStore::load_from_file(&path, 20);
        assert_eq!(restored.to_document(), store.to_document());
    }

    #[test]
    fn malformed_or_missing_files_yield_fresh_store() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();

        let from_bad = ConversationStore::load_from_file(&bad, 20);
        assert!(from_bad.is_empty());
        let from_missing = ConversationStore::load_from_file(dir.path().join("nope.json"), 20);
        assert!(from_missing.is_empty());
        assert!(matches!(
            ConversationStore::try_load(dir.path().join("nope.json"), 20),
            Err(AgentError::Persistence { .. })
        ));
    }

    #[test]
    fn save_failure_is_reported_and_state_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = populated_store();
        let target = dir.path().join("missing-dir").join("session.json");
        assert!(store.save_to_file(&target).is_err());
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn legacy_documents_are_accepted() {
        let json = r#"{
            "conversation_id": "conv_20240101_120000",
            "start_time": "2024-01-01T12:00:00Z",
            "messages": [
                {"role": "user", "content": "hi", "timestamp": "2024-01-01T12:00:01Z", "metadata": {}}
            ],
            "context": {"last_tool_outcomes": [], "last_user_intent": "hi"}
        }"#;
        let store = ConversationStore::from_json(json, 20).unwrap();
        assert_eq!(store.id().as_str(), "conv_20240101_120000");
        assert_eq!(store.len(), 1);
        assert_eq!(store.context().last_user_intent.as_deref(), Some("hi"));
    }

    /// Written by the original Python `ConversationManager.save_to_file`
    const ORIGINAL_SESSION_FILE: &str = r#"{
  "conversation_id": "conv_20240101_120000",
  "start_time": "2024-01-01T12:00:00.123456",
  "messages": [
    {
      "role": "user",
      "content": "10加5等于多少？",
      "timestamp": "2024-01-01T12:00:05.654321",
      "metadata": {}
    },
    {
      "role": "assistant",
      "content": "10 + 5 = 15",
      "timestamp": "2024-01-01T12:00:07.000001",
      "metadata": {
        "action_type": "ActionType.DIRECT_REPLY",
        "tool_results": [
          {
            "tool": "calculator",
            "success": true
          }
        ]
      }
    },
    {
      "role": "system",
      "content": "session resumed",
      "timestamp": "2024-01-01T12:00:09"
    }
  ],
  "context": {
    "last_tool_results": [
      {
        "tool_name": "calculator",
        "success": true,
        "result": "15"
      }
    ],
    "last_user_intent": "10加5等于多少？",
    "last_assistant_action": "ActionType.DIRECT_REPLY",
    "context_summary": null
  }
}"#;

    #[test]
    fn original_session_files_load() {
        use chrono::{Local, NaiveDate};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conv_20240101_120000.json");
        std::fs::write(&path, ORIGINAL_SESSION_FILE).unwrap();

        let store = ConversationStore::try_load(&path, 20).unwrap();
        assert_eq!(store.id().as_str(), "conv_20240101_120000");
        let started = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_micro_opt(12, 0, 0, 123_456)
            .unwrap();
        assert_eq!(store.start_time().with_timezone(&Local).naive_local(), started);

        let roles: Vec<_> = store.messages().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::System]);
        let reply = store.messages().nth(1).unwrap();
        assert_eq!(reply.metadata["action_type"], json!("ActionType.DIRECT_REPLY"));

        let context = store.context();
        assert_eq!(
            context.last_tool_outcomes,
            vec![OutcomeSummary {
                tool_name: "calculator".into(),
                success: true,
                result: "15".into(),
            }]
        );
        assert_eq!(context.last_user_intent.as_deref(), Some("10加5等于多少？"));
        assert_eq!(context.last_assistant_action, Some(ActionKind::Reply));
        assert!(context.context_summary.is_none());

        // Saved again in the current format, nothing is lost
        let resaved = ConversationStore::from_json(&store.to_json().unwrap(), 20).unwrap();
        assert_eq!(resaved.to_document(), store.to_document());
    }

    #[test]
    fn odd_context_values_are_tolerated() {
        let json = r#"{
            "conversation_id": "conv_x",
            "start_time": "2024-01-01T12:00:00",
            "context": {
                "last_tool_results": [{"tool_name": "calculator", "success": true, "result": 15}],
                "last_assistant_action": "ActionType.SOMETHING_NEW"
            }
        }"#;
        let store = ConversationStore::from_json(json, 20).unwrap();
        assert_eq!(store.context().last_tool_outcomes[0].result, "15");
        assert_eq!(store.context().last_assistant_action, None);

        let labelled = r#"{"session_id": "s", "start_time": "2024-01-01T12:00:00Z",
            "context": {"last_assistant_action": "call_tool"}}"#;
        let store = ConversationStore::from_json(labelled, 20).unwrap();
        assert_eq!(store.context().last_assistant_action, Some(ActionKind::CallTool));
    }

    #[test]
    fn loading_trims_to_capacity() {
        let mut big = ConversationStore::new(10);
        numbered(&mut big, 10);
        let restored = ConversationStore::from_json(&big.to_json().unwrap(), 4).unwrap();
        assert_eq!(restored.len(), 4);
        assert_eq!(restored.messages().next().unwrap().content, "message 6");
    }

    fn metadata_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i64>().prop_map(|v| json!(v)),
            any::<f64>().prop_filter("JSON has no NaN or infinity", |v| v.is_finite()).prop_map(|v| json!(v)),
            any::<bool>().prop_map(|v| json!(v)),
            "[a-z0-9 ]{0,12}".prop_map(|v| json!(v)),
        ]
    }

    proptest! {
        #[test]
        fn metadata_round_trips_exactly(
            values in proptest::collection::vec(metadata_value(), 1..16),
            floats in proptest::collection::vec(any::<f64>().prop_filter("finite", |v| v.is_finite()), 1..16),
        ) {
            let mut store = ConversationStore::new(20);
            let mut metadata = Metadata::new();
            for (i, value) in values.into_iter().enumerate() {
                metadata.insert(format!("value_{i}"), value);
            }
            metadata.insert("floats".into(), json!(floats));
            store.add_assistant_message("numbers", metadata);

            let restored = ConversationStore::from_json(&store.to_json().unwrap(), 20).unwrap();
            prop_assert_eq!(restored.to_document(), store.to_document());
            let back: Vec<f64> = serde_json::from_value(
                restored.messages().next().unwrap().metadata["floats"].clone(),
            )
            .unwrap();
            prop_assert_eq!(
                back.iter().map(|f| f.to_bits()).collect::<Vec<_>>(),
                floats.iter().map(|f| f.to_bits()).collect::<Vec<_>>()
            );
        }

        #[test]
        fn appending_within_capacity_keeps_everything(cap in 1usize..40, fill in 0usize..40) {
            let n = fill.min(cap);
            let mut store = ConversationStore::new(cap);
            numbered(&mut store, n);
            prop_assert_eq!(store.len(), n);
            for (i, m) in store.messages().enumerate() {
                prop_assert_eq!(&m.content, &format!("message {i}"));
            }
        }

        #[test]
        fn appending_past_capacity_keeps_most_recent(cap in 1usize..30, extra in 1usize..30) {
            let mut store = ConversationStore::new(cap);
            numbered(&mut store, cap + extra);
            prop_assert_eq!(store.len(), cap);
            for (i, m) in store.messages().enumerate() {
                prop_assert_eq!(&m.content, &format!("message {}", i + extra));
            }
        }
    }
}
