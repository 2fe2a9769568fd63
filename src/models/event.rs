//! Journal event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// The kind of observation an [`Event`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A message from the user.
    UserMessage,
    /// Output produced by the assistant.
    AssistantOutput,
    /// A tool invocation.
    ToolCall,
    /// The result of a tool invocation.
    ToolResult,
    /// An error observed by the runtime.
    Error,
    /// A scheduler tick.
    SchedulerRun,
    /// A decision recorded by an agent.
    DecisionLog,
    /// A checkpoint was taken.
    Checkpoint,
    /// A maintenance pass ran.
    Maintenance,
}

impl EventType {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UserMessage => "user_message",
            Self::AssistantOutput => "assistant_output",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::Error => "error",
            Self::SchedulerRun => "scheduler_run",
            Self::DecisionLog => "decision_log",
            Self::Checkpoint => "checkpoint",
            Self::Maintenance => "maintenance",
        }
    }

    /// Parses a wire name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "user_message" => Some(Self::UserMessage),
            "assistant_output" => Some(Self::AssistantOutput),
            "tool_call" => Some(Self::ToolCall),
            "tool_result" => Some(Self::ToolResult),
            "error" => Some(Self::Error),
            "scheduler_run" => Some(Self::SchedulerRun),
            "decision_log" => Some(Self::DecisionLog),
            "checkpoint" => Some(Self::Checkpoint),
            "maintenance" => Some(Self::Maintenance),
            _ => None,
        }
    }

    /// Events the engine writes about itself.
    ///
    /// These are excluded from distillation windows.
    #[must_use]
    pub const fn is_bookkeeping(&self) -> bool {
        matches!(self, Self::Checkpoint | Self::Maintenance)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable observation written to the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier; assigned on ingest when empty.
    #[serde(default)]
    pub id: String,
    /// What kind of observation this is.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Free-form payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Session correlation key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Run correlation key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// When the observation happened; the zero instant means "now".
    #[serde(default)]
    pub timestamp: DateTime<Utc>,
    /// Arbitrary typed values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl Event {
    /// Creates an event of the given type stamped with the current instant.
    #[must_use]
    pub fn new(event_type: EventType) -> Self {
        Self {
            id: String::new(),
            event_type,
            text: None,
            session_id: None,
            run_id: None,
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    /// Sets the text payload.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Sets the timestamp.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Sets the session id.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Sets one metadata entry.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// Returns a metadata value as a trimmed, non-empty string.
    #[must_use]
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .as_ref()?
            .get(key)?
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Normalizes the event for ingest.
    ///
    /// Trims strings (empty becomes absent), assigns an id when missing and
    /// replaces the zero instant with the current one.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.id = self.id.trim().to_string();
        if self.id.is_empty() {
            self.id = Uuid::new_v4().to_string();
        }
        self.text = trim_opt(self.text);
        self.session_id = trim_opt(self.session_id);
        self.run_id = trim_opt(self.run_id);
        if super::is_zero_timestamp(&self.timestamp) {
            self.timestamp = Utc::now();
        }
        self
    }
}

fn trim_opt(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
