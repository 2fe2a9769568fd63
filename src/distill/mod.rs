//! Event distillation.
//!
//! The [`Distiller`] turns a window of journal events into a [`Proposal`]:
//! new items to store and content updates for existing ones. The model
//! path sends the window to a chat completion endpoint and parses the reply
//! strictly; any transport or parse failure falls back to a deterministic
//! rule set, so a checkpoint always produces a proposal.
//!
//! # Example
//!
//! ```rust,ignore
//! use agentmem::distill::Distiller;
//!
//! let distiller = Distiller::deterministic();
//! let outcome = distiller.distill(&events, &[], &CancelToken::new())?;
//! assert_eq!(outcome.mode.as_str(), "deterministic_fallback");
//! ```

mod fallback;
mod parse;
mod prompt;

pub use fallback::{PREFERENCE_MARKERS, fallback_proposal};
pub use parse::{extract_json_object, parse_proposal};
pub use prompt::{SYSTEM_PROMPT, build_user_prompt};

use crate::cancel::CancelToken;
use crate::llm::LlmProvider;
use crate::models::{Event, MemoryItem};
use crate::observability::metrics::DISTILL_RUNS;
use crate::{ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Most recent events considered per distillation.
pub const MAX_WINDOW_EVENTS: usize = 200;

/// Upper bound on each proposal array.
pub const MAX_PROPOSAL_ENTRIES: usize = 200;

/// How a proposal was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistillMode {
    /// Parsed from a model reply.
    Model,
    /// Built by the local rule set.
    DeterministicFallback,
}

impl DistillMode {
    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::DeterministicFallback => "deterministic_fallback",
        }
    }
}

impl std::fmt::Display for DistillMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A new item proposed by the distiller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProposedItem {
    /// Item kind.
    pub kind: String,
    /// Short title.
    pub title: String,
    /// Body.
    pub content: String,
    /// Importance in `[1, 5]`.
    pub importance: i64,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

impl ProposedItem {
    /// Converts the proposal into a fresh, normalized item.
    #[must_use]
    pub fn into_item(self) -> MemoryItem {
        MemoryItem::new(self.kind, self.title, self.content)
            .with_importance(self.importance)
            .with_confidence(self.confidence)
            .normalized()
    }
}

/// A content update for an existing item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProposedUpdate {
    /// Target item id.
    pub id: String,
    /// Replacement content.
    pub new_content: String,
    /// Replacement confidence.
    pub confidence: f64,
}

/// Distiller output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Proposal {
    /// Items to create.
    pub new_items: Vec<ProposedItem>,
    /// Items to revise.
    pub updates: Vec<ProposedUpdate>,
}

/// An existing item shown to the model so updates can address real ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KnownItem {
    /// Item id.
    pub id: String,
    /// Item kind.
    pub kind: String,
    /// Item title.
    pub title: String,
}

impl From<&MemoryItem> for KnownItem {
    fn from(item: &MemoryItem) -> Self {
        Self {
            id: item.id.clone(),
            kind: item.kind.clone(),
            title: item.title.clone(),
        }
    }
}

/// A proposal together with the path that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Distillation {
    /// The proposal.
    pub proposal: Proposal,
    /// Which path produced it.
    pub mode: DistillMode,
    /// Why the model path was abandoned, when it was.
    pub fallback_reason: Option<String>,
}

/// Converts event windows into proposals.
pub struct Distiller {
    provider: Option<Arc<dyn LlmProvider>>,
}

impl Distiller {
    /// Creates a distiller; `None` always uses the rule set.
    #[must_use]
    pub fn new(provider: Option<Arc<dyn LlmProvider>>) -> Self {
        Self { provider }
    }

    /// Creates a distiller without a model.
    #[must_use]
    pub fn deterministic() -> Self {
        Self::new(None)
    }

    /// Returns true if a model provider is configured.
    #[must_use]
    pub fn has_model(&self) -> bool {
        self.provider.is_some()
    }

    /// Distills the most recent [`MAX_WINDOW_EVENTS`] of `events`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Cancelled`] if `cancel` fires. Transport and
    /// parse failures are not errors: they select the fallback path.
    #[instrument(skip_all, fields(operation = "distill", events = events.len()))]
    pub fn distill(
        &self,
        events: &[Event],
        known: &[KnownItem],
        cancel: &CancelToken,
    ) -> Result<Distillation> {
        cancel.check("distill")?;
        let window = &events[events.len().saturating_sub(MAX_WINDOW_EVENTS)..];

        let mut fallback_reason = None;
        if let Some(provider) = &self.provider {
            let user = build_user_prompt(window, known);
            let attempt = provider
                .complete_with_system(SYSTEM_PROMPT, &user, cancel)
                .and_then(|raw| parse_proposal(&raw));
            match attempt {
                Ok(proposal) => {
                    info!(
                        provider = provider.name(),
                        new_items = proposal.new_items.len(),
                        updates = proposal.updates.len(),
                        "Distilled events with model"
                    );
                    return Ok(Self::finish(proposal, DistillMode::Model, None));
                },
                Err(e) if e.kind() == ErrorKind::Timeout => return Err(e),
                Err(e) => {
                    cancel.check("distill")?;
                    warn!(provider = provider.name(), error = %e, "Model distillation failed, using fallback");
                    fallback_reason = Some(e.to_string());
                },
            }
        }

        let proposal = fallback_proposal(window);
        Ok(Self::finish(
            proposal,
            DistillMode::DeterministicFallback,
            fallback_reason,
        ))
    }

    fn finish(proposal: Proposal, mode: DistillMode, fallback_reason: Option<String>) -> Distillation {
        metrics::counter!(DISTILL_RUNS, "mode" => mode.as_str()).increment(1);
        Distillation {
            proposal,
            mode,
            fallback_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::models::EventType;
    use std::sync::Mutex;

    struct Scripted {
        reply: Result<String>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(reply: Result<String>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    impl LlmProvider for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn complete_with_system(
            &self,
            _system: &str,
            user: &str,
            _cancel: &CancelToken,
        ) -> Result<String> {
            self.prompts.lock().unwrap().push(user.to_string());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(Error::Transport {
                    operation: "chat/completions".to_string(),
                    cause: e.to_string(),
                }),
            }
        }
    }

    fn events() -> Vec<Event> {
        vec![
            Event::new(EventType::UserMessage).with_text("I prefer short answers"),
            Event::new(EventType::ToolCall).with_text("ls"),
        ]
    }

    #[test]
    fn test_model_path() {
        let provider = Scripted::new(Ok(r#"{"new_items":[{"kind":"fact","title":"t","content":"c","importance":2,"confidence":0.5}],"updates":[]}"#.to_string()));
        let distiller = Distiller::new(Some(provider.clone()));
        let known = vec![KnownItem {
            id: "item-1".to_string(),
            kind: "note".to_string(),
            title: "Known".to_string(),
        }];
        let outcome = distiller
            .distill(&events(), &known, &CancelToken::new())
            .unwrap();
        assert_eq!(outcome.mode, DistillMode::Model);
        assert_eq!(outcome.proposal.new_items[0].kind, "fact");
        assert!(outcome.fallback_reason.is_none());
        assert!(provider.prompts.lock().unwrap()[0].contains("item-1"));
    }

    #[test]
    fn test_parse_failure_falls_back() {
        let provider = Scripted::new(Ok("sorry, I cannot do that".to_string()));
        let outcome = Distiller::new(Some(provider))
            .distill(&events(), &[], &CancelToken::new())
            .unwrap();
        assert_eq!(outcome.mode, DistillMode::DeterministicFallback);
        assert!(outcome.fallback_reason.unwrap().contains("parse failure"));
        assert_eq!(outcome.proposal.new_items[0].kind, "preference");
    }

    #[test]
    fn test_transport_failure_falls_back() {
        let provider = Scripted::new(Err(Error::QueueFull));
        let outcome = Distiller::new(Some(provider))
            .distill(&events(), &[], &CancelToken::new())
            .unwrap();
        assert_eq!(outcome.mode, DistillMode::DeterministicFallback);
    }

    #[test]
    fn test_cancelled_surfaces() {
        let token = CancelToken::new();
        token.cancel();
        let err = Distiller::deterministic()
            .distill(&events(), &[], &token)
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));
    }

    #[test]
    fn test_window_keeps_most_recent() {
        let provider = Scripted::new(Ok("{}".to_string()));
        let mut many: Vec<Event> = (0..MAX_WINDOW_EVENTS)
            .map(|i| Event::new(EventType::ToolCall).with_text(format!("call-{i}")))
            .collect();
        many.insert(0, Event::new(EventType::ToolCall).with_text("oldest-call"));
        let _ = Distiller::new(Some(provider.clone()))
            .distill(&many, &[], &CancelToken::new())
            .unwrap();
        let prompt = provider.prompts.lock().unwrap()[0].clone();
        assert!(!prompt.contains("oldest-call"));
        assert!(prompt.contains("call-199"));
    }

    #[test]
    fn test_mode_labels() {
        assert_eq!(DistillMode::Model.as_str(), "model");
        assert_eq!(
            DistillMode::DeterministicFallback.to_string(),
            "deterministic_fallback"
        );
    }
}
