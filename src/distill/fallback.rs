//! Deterministic rule set used when the model path is unavailable.

use super::{Proposal, ProposedItem};
use crate::models::{Event, EventType};
use std::collections::BTreeMap;

/// Phrases that mark a user message as a stated preference.
pub const PREFERENCE_MARKERS: &[&str] = &[
    "i prefer",
    "prefer ",
    "please",
    "always",
    "never",
    "remind me",
    "don't",
    "do not",
];

const TITLE_CHARS: usize = 80;

/// Builds a proposal from event types alone.
///
/// Decisions, errors and preference-bearing user messages each become one
/// item; when none apply, a single summary item counts the events by type.
/// The output depends only on the input events and is ordered by the
/// lowercased `kind|title|content` key.
#[must_use]
pub fn fallback_proposal(events: &[Event]) -> Proposal {
    let mut keyed: BTreeMap<String, ProposedItem> = BTreeMap::new();
    for event in events {
        let candidate = match event.event_type {
            EventType::DecisionLog => Some(decision_item(event)),
            EventType::Error => Some(issue_item(event)),
            EventType::UserMessage => preference_item(event),
            _ => None,
        };
        if let Some(item) = candidate {
            keyed.entry(dedup_key(&item)).or_insert(item);
        }
    }

    if keyed.is_empty() && !events.is_empty() {
        return Proposal {
            new_items: vec![summary_item(events)],
            updates: Vec::new(),
        };
    }

    Proposal {
        new_items: keyed.into_values().collect(),
        updates: Vec::new(),
    }
}

fn decision_item(event: &Event) -> ProposedItem {
    let title = event.meta_str("title").unwrap_or("Decision noted").to_string();
    let content = text_of(event).map_or_else(|| title.clone(), str::to_string);
    ProposedItem {
        kind: "decision".to_string(),
        title,
        content,
        importance: 4,
        confidence: 0.9,
    }
}

fn issue_item(event: &Event) -> ProposedItem {
    let text = text_of(event);
    let title = event
        .meta_str("title")
        .map(str::to_string)
        .or_else(|| text.map(headline))
        .unwrap_or_else(|| "Error observed".to_string());
    ProposedItem {
        kind: "issue".to_string(),
        title,
        content: text.unwrap_or("Error event without details").to_string(),
        importance: 4,
        confidence: 0.85,
    }
}

fn preference_item(event: &Event) -> Option<ProposedItem> {
    let text = text_of(event)?;
    let lowered = text.to_lowercase();
    if !PREFERENCE_MARKERS.iter().any(|m| lowered.contains(m)) {
        return None;
    }
    Some(ProposedItem {
        kind: "preference".to_string(),
        title: headline(text),
        content: text.to_string(),
        importance: 3,
        confidence: 0.75,
    })
}

fn summary_item(events: &[Event]) -> ProposedItem {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for event in events {
        *counts.entry(event.event_type.as_str()).or_default() += 1;
    }
    let parts: Vec<String> = counts
        .iter()
        .map(|(kind, count)| format!("{kind}={count}"))
        .collect();
    ProposedItem {
        kind: "summary".to_string(),
        title: "Checkpoint summary".to_string(),
        content: format!("Checkpoint event summary: {}", parts.join(", ")),
        importance: 2,
        confidence: 0.6,
    }
}

fn text_of(event: &Event) -> Option<&str> {
    event
        .text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// First line of `text`, cut to a title-sized prefix.
fn headline(text: &str) -> String {
    let line = text.lines().next().unwrap_or(text).trim();
    if line.chars().count() <= TITLE_CHARS {
        return line.to_string();
    }
    let cut: String = line.chars().take(TITLE_CHARS).collect();
    format!("{}...", cut.trim_end())
}

fn dedup_key(item: &ProposedItem) -> String {
    format!("{}|{}|{}", item.kind, item.title, item.content).to_lowercase()
}
