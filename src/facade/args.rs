//! Argument types for facade operations.
//!
//! All argument types use `#[serde(deny_unknown_fields)]` so a misspelled
//! field is reported instead of silently ignored.

use crate::models::ItemStatus;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Maximum content length, in bytes.
pub const MAX_CONTENT_LENGTH: usize = 1_048_576;

/// Maximum query length, in bytes.
pub const MAX_QUERY_LENGTH: usize = 10_240;

/// Importance given to written items when none is passed.
pub const DEFAULT_WRITE_IMPORTANCE: i64 = 3;

/// Confidence given to written items when none is passed.
pub const DEFAULT_WRITE_CONFIDENCE: f64 = 0.85;

/// Importance given to logged decisions when none is passed.
pub const DEFAULT_DECISION_IMPORTANCE: i64 = 4;

/// Confidence given to logged decisions when none is passed.
pub const DEFAULT_DECISION_CONFIDENCE: f64 = 0.9;

/// Arguments for `search`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchArgs {
    /// Free-text query; empty lists by importance.
    pub query: Option<String>,
    /// Maximum results (default 8, at most 50).
    pub limit: Option<usize>,
    /// Minimum importance (default 1).
    pub min_importance: Option<i64>,
    /// Status to search (default `active`).
    pub status: Option<String>,
}

/// Arguments for `write`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WriteArgs {
    /// Item kind.
    pub kind: String,
    /// Item title.
    pub title: String,
    /// Item content.
    pub content: String,
    /// Importance (default 3).
    pub importance: Option<i64>,
    /// Confidence (default 0.85).
    pub confidence: Option<f64>,
    /// Initial status (default `active`).
    pub status: Option<String>,
}

impl WriteArgs {
    /// Creates write arguments with defaults for the optional fields.
    #[must_use]
    pub fn new(kind: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            title: title.into(),
            content: content.into(),
            importance: None,
            confidence: None,
            status: None,
        }
    }

    /// Sets the importance.
    #[must_use]
    pub const fn with_importance(mut self, importance: i64) -> Self {
        self.importance = Some(importance);
        self
    }

    /// Sets the confidence.
    #[must_use]
    pub const fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Arguments for `update`; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateArgs {
    /// Target item.
    pub id: String,
    /// New kind.
    pub kind: Option<String>,
    /// New title.
    pub title: Option<String>,
    /// New content.
    pub content: Option<String>,
    /// New importance.
    pub importance: Option<i64>,
    /// New confidence.
    pub confidence: Option<f64>,
    /// New status.
    pub status: Option<String>,
}

impl UpdateArgs {
    /// Creates update arguments that change nothing yet.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// Arguments for `forget`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForgetArgs {
    /// Target item.
    pub id: String,
}

/// Arguments for `health`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthArgs {}

/// Arguments for `decision.log`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecisionArgs {
    /// Decision title.
    pub title: String,
    /// What was decided and why.
    pub content: String,
    /// Importance (default 4).
    pub importance: Option<i64>,
    /// Confidence (default 0.9).
    pub confidence: Option<f64>,
    /// Extra fields copied into the journal event.
    pub metadata: Option<Map<String, Value>>,
}

impl DecisionArgs {
    /// Creates decision arguments with defaults for the optional fields.
    #[must_use]
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            importance: None,
            confidence: None,
            metadata: None,
        }
    }
}

/// Arguments for `checkpoint`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckpointArgs {
    /// Events read at most (default from config, 250).
    pub max_events: Option<usize>,
}

/// Arguments for `maintenance`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaintenanceArgs {
    /// Staleness threshold in days (default from config, 45).
    pub stale_days: Option<i64>,
    /// Report without archiving or compacting.
    pub dry_run: Option<bool>,
}

/// Decodes tool arguments; `null` reads as an empty object.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the arguments do not match `T`.
pub fn decode<T: serde::de::DeserializeOwned>(tool: &str, arguments: Value) -> Result<T> {
    let arguments = if arguments.is_null() {
        Value::Object(Map::new())
    } else {
        arguments
    };
    serde_json::from_value(arguments)
        .map_err(|e| Error::InvalidInput(format!("{tool}: invalid arguments: {e}")))
}

/// Validates that a string input does not exceed the maximum allowed length.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the input exceeds `max_length`.
pub fn validate_input_length(input: &str, field_name: &str, max_length: usize) -> Result<()> {
    if input.len() > max_length {
        return Err(Error::InvalidInput(format!(
            "{field_name} exceeds maximum length ({} > {max_length} bytes)",
            input.len()
        )));
    }
    Ok(())
}

/// Returns the trimmed value, or an error naming the empty field.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the value is blank.
pub fn require<'a>(value: &'a str, field_name: &str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(format!("{field_name} is required")));
    }
    Ok(trimmed)
}

/// Parses a status name strictly.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for anything but `active`, `forgotten`
/// or `archived`.
pub fn parse_status(value: &str) -> Result<ItemStatus> {
    let value = value.trim().to_lowercase();
    ItemStatus::all()
        .into_iter()
        .find(|s| s.as_str() == value)
        .ok_or_else(|| Error::InvalidInput(format!("unknown status '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test]
    fn test_decode_null_as_empty() {
        let args: SearchArgs = decode("search", Value::Null).unwrap();
        assert!(args.query.is_none());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = decode::<ForgetArgs>("forget", json!({"id": "x", "hard": true})).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_missing_required_rejected() {
        let err = decode::<WriteArgs>("write", json!({"kind": "note", "title": "t"})).unwrap_err();
        assert!(err.to_string().contains("content"));
    }

    #[test_case("active", Some(ItemStatus::Active))]
    #[test_case(" Archived ", Some(ItemStatus::Archived))]
    #[test_case("forgotten", Some(ItemStatus::Forgotten))]
    #[test_case("deleted", None)]
    fn test_parse_status(input: &str, expected: Option<ItemStatus>) {
        assert_eq!(parse_status(input).ok(), expected);
    }

    #[test]
    fn test_length_limit() {
        assert!(validate_input_length("abc", "query", 3).is_ok());
        assert!(validate_input_length("abcd", "query", 3).is_err());
    }

    #[test]
    fn test_require() {
        assert_eq!(require("  x ", "title").unwrap(), "x");
        assert!(require("   ", "title").is_err());
    }
}
