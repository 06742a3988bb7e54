//! Conversation Messages
//!
//! Standard message format used across the agent system.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Free-form key-value metadata attached to a message
pub type Metadata = HashMap<String, serde_json::Value>;

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
}

impl Role {
    /// Label used in human-readable summaries
    pub fn label(self) -> &'static str {
        match self {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single message in a conversation
///
/// Messages are never edited after they enter a store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Text content
    pub content: String,

    /// Timestamp
    #[serde(default = "Utc::now", deserialize_with = "timestamp::deserialize")]
    pub timestamp: DateTime<Utc>,

    /// Opaque metadata
    #[serde(default)]
    pub metadata: Metadata,
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: Metadata::new(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// The `{role, content}` view handed to decision producers
    pub fn entry(&self) -> HistoryEntry {
        HistoryEntry {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// Timestamp reading for session documents. RFC 3339 is the written form;
/// timestamps without an offset, as older session files hold them, are
/// taken as local time.
pub(crate) mod timestamp {
    use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
            return Some(at.with_timezone(&Utc));
        }
        let naive = raw.trim().parse::<NaiveDateTime>().ok()?;
        let at = Local
            .from_local_datetime(&naive)
            .earliest()
            .map_or_else(|| naive.and_utc(), |local| local.with_timezone(&Utc));
        Some(at)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp '{raw}'")))
    }
}

/// A role/content pair, the shape of history handed to an LLM
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

impl HistoryEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

impl From<&HistoryEntry> for Message {
    fn from(entry: &HistoryEntry) -> Self {
        Message::new(entry.role, entry.content.clone())
    }
}

/// Truncate to at most `max` characters, never splitting a code point.
pub(crate) fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");
        assert!(msg.metadata.is_empty());
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        let role: Role = serde_json::from_str("\"system\"").unwrap();
        assert_eq!(role, Role::System);
    }

    #[test]
    fn missing_metadata_defaults_to_empty() {
        let msg: Message = serde_json::from_str(
            r#"{"role":"user","content":"hi","timestamp":"2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert!(msg.metadata.is_empty());
        assert_eq!(msg.entry(), HistoryEntry::new(Role::User, "hi"));
    }

    #[test]
    fn offsetless_timestamps_read_as_local_time() {
        use chrono::{Local, NaiveDate};

        let msg: Message = serde_json::from_str(
            r#"{"role":"user","content":"hi","timestamp":"2024-01-01T12:00:00.123456"}"#,
        )
        .unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_micro_opt(12, 0, 0, 123_456)
            .unwrap();
        assert_eq!(msg.timestamp.with_timezone(&Local).naive_local(), expected);

        assert!(timestamp::parse("2024-01-01T12:00:00").is_some());
        assert_eq!(
            timestamp::parse("2024-05-01T10:00:00+02:00").unwrap().to_rfc3339(),
            "2024-05-01T08:00:00+00:00"
        );
        assert!(timestamp::parse("yesterday").is_none());
        assert!(serde_json::from_str::<Message>(r#"{"role":"user","content":"hi","timestamp":"soon"}"#).is_err());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }
}
