//! Prompts for the model path.

use super::KnownItem;
use crate::models::{Event, format_timestamp};
use serde_json::{Value, json};

/// Longest event text forwarded to the model, in characters.
const MAX_EVENT_TEXT_CHARS: usize = 4000;

/// System prompt for distillation.
pub const SYSTEM_PROMPT: &str = r#"You maintain the long-term memory of an AI agent.
You receive a batch of recent events and a list of memory items the agent already has.
Extract durable knowledge: decisions, user preferences, facts, recurring issues, commitments.
Ignore small talk and transient tool chatter.

Respond with exactly one JSON object and nothing else, in this shape:
{
  "new_items": [{"kind": "string", "title": "string", "content": "string", "importance": 1, "confidence": 0.0}],
  "updates": [{"id": "string", "new_content": "string", "confidence": 0.0}]
}

Rules:
- importance is an integer from 1 (trivia) to 5 (critical).
- confidence is a number from 0 to 1.
- kind, title and content must be non-empty.
- Only use ids from the known items in "updates"; rewrite the whole content.
- Do not repeat knowledge that a known item already holds.
- Do not add any other fields.
- At most 200 entries per array; empty arrays are fine."#;

/// Renders the event window and known items as the user message.
#[must_use]
pub fn build_user_prompt(events: &[Event], known: &[KnownItem]) -> String {
    let rendered: Vec<Value> = events.iter().map(render_event).collect();
    let payload = json!({
        "known_items": known,
        "events": rendered,
    });
    format!("Distill the following events into memory items.\n\n{payload}")
}

fn render_event(event: &Event) -> Value {
    let mut value = json!({
        "type": event.event_type.as_str(),
        "timestamp": format_timestamp(&event.timestamp),
    });
    if let Some(text) = &event.text {
        value["text"] = Value::String(truncate_chars(text, MAX_EVENT_TEXT_CHARS));
    }
    if let Some(metadata) = &event.metadata {
        value["metadata"] = Value::Object(metadata.clone());
    }
    value
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventType;

    #[test]
    fn test_prompt_contains_events_and_known_items() {
        let events = vec![
            Event::new(EventType::DecisionLog)
                .with_text("go with plan B")
                .with_meta("title", "Plan"),
        ];
        let known = vec![KnownItem {
            id: "abc".to_string(),
            kind: "fact".to_string(),
            title: "Plan A".to_string(),
        }];
        let prompt = build_user_prompt(&events, &known);
        assert!(prompt.contains("\"type\":\"decision_log\""));
        assert!(prompt.contains("go with plan B"));
        assert!(prompt.contains("\"id\":\"abc\""));
    }

    #[test]
    fn test_long_text_is_truncated() {
        let text = "é".repeat(MAX_EVENT_TEXT_CHARS + 10);
        let out = truncate_chars(&text, MAX_EVENT_TEXT_CHARS);
        assert_eq!(out.chars().count(), MAX_EVENT_TEXT_CHARS + 3);
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
