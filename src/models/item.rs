//! Memory item types and normalization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind assigned when none is given.
pub const DEFAULT_KIND: &str = "note";

/// Confidence assigned when the given value is not positive.
pub const DEFAULT_CONFIDENCE: f64 = 0.7;

/// Lowest importance.
pub const MIN_IMPORTANCE: i64 = 1;

/// Highest importance.
pub const MAX_IMPORTANCE: i64 = 5;

/// Lifecycle status of a memory item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Searchable.
    #[default]
    Active,
    /// Logically deleted by request.
    Forgotten,
    /// Retired by maintenance.
    Archived,
}

impl ItemStatus {
    /// Returns the status as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Forgotten => "forgotten",
            Self::Archived => "archived",
        }
    }

    /// Parses a status; anything unknown is `Active`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "forgotten" => Self::Forgotten,
            "archived" => Self::Archived,
            _ => Self::Active,
        }
    }

    /// All statuses, in reporting order.
    #[must_use]
    pub const fn all() -> [Self; 3] {
        [Self::Active, Self::Forgotten, Self::Archived]
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable unit of recall owned by one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Identifier, unique within the agent.
    #[serde(default)]
    pub id: String,
    /// Owning agent.
    #[serde(default)]
    pub agent_id: String,
    /// Free-form category (`note`, `preference`, `decision`, ...).
    #[serde(default)]
    pub kind: String,
    /// Short title.
    pub title: String,
    /// Body text.
    pub content: String,
    /// 1 (trivia) to 5 (critical).
    #[serde(default)]
    pub importance: i64,
    /// 0.0 to 1.0.
    #[serde(default)]
    pub confidence: f64,
    /// Lifecycle status.
    #[serde(default)]
    pub status: ItemStatus,
    /// Creation instant; stable across updates.
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    /// Last mutation instant.
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

impl MemoryItem {
    /// Creates an active item with default importance and confidence.
    #[must_use]
    pub fn new(kind: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            agent_id: String::new(),
            kind: kind.into(),
            title: title.into(),
            content: content.into(),
            importance: 3,
            confidence: DEFAULT_CONFIDENCE,
            status: ItemStatus::Active,
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
        }
    }

    /// Sets the importance.
    #[must_use]
    pub const fn with_importance(mut self, importance: i64) -> Self {
        self.importance = importance;
        self
    }

    /// Sets the confidence.
    #[must_use]
    pub const fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Sets the id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Returns true if the item is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ItemStatus::Active
    }

    /// Normalizes fields in place.
    ///
    /// Trims strings, defaults an empty kind to `note`, clamps importance to
    /// 1..=5, replaces a non-positive (or NaN) confidence with 0.7 and caps
    /// it at 1.0. Applying it twice changes nothing.
    pub fn normalize(&mut self) {
        self.id = self.id.trim().to_string();
        self.agent_id = self.agent_id.trim().to_string();
        self.kind = self.kind.trim().to_string();
        if self.kind.is_empty() {
            self.kind = DEFAULT_KIND.to_string();
        }
        self.title = self.title.trim().to_string();
        self.content = self.content.trim().to_string();
        self.importance = self.importance.clamp(MIN_IMPORTANCE, MAX_IMPORTANCE);
        self.confidence = normalize_confidence(self.confidence);
    }

    /// Returns a normalized copy.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }
}

fn normalize_confidence(value: f64) -> f64 {
    if value.is_nan() || value <= 0.0 {
        DEFAULT_CONFIDENCE
    } else {
        value.min(1.0)
    }
}
