//! Strict parsing of model proposals.

use super::{MAX_PROPOSAL_ENTRIES, Proposal};
use crate::{Error, Result};

/// Parses and validates a raw model reply.
///
/// Strips a leading code fence, takes the first balanced `{...}` object,
/// decodes it rejecting unknown fields, then validates every entry.
///
/// # Errors
///
/// Returns [`Error::Parse`] describing the first violation.
pub fn parse_proposal(raw: &str) -> Result<Proposal> {
    let json = extract_json_object(raw)
        .ok_or_else(|| Error::Parse("no JSON object in model reply".to_string()))?;
    let proposal: Proposal =
        serde_json::from_str(json).map_err(|e| Error::Parse(format!("proposal schema: {e}")))?;
    validate(&proposal)?;
    Ok(proposal)
}

/// Locates the first balanced JSON object, honouring string escapes.
#[must_use]
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let text = strip_fence(raw);
    let start = text.find('{')?;
    let mut depth = 0_usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, byte) in text.as_bytes()[start..].iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {},
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            },
            _ => {},
        }
    }
    None
}

fn strip_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn validate(proposal: &Proposal) -> Result<()> {
    if proposal.new_items.len() > MAX_PROPOSAL_ENTRIES {
        return Err(Error::Parse(format!(
            "new_items has {} entries (max {MAX_PROPOSAL_ENTRIES})",
            proposal.new_items.len()
        )));
    }
    if proposal.updates.len() > MAX_PROPOSAL_ENTRIES {
        return Err(Error::Parse(format!(
            "updates has {} entries (max {MAX_PROPOSAL_ENTRIES})",
            proposal.updates.len()
        )));
    }
    for (i, item) in proposal.new_items.iter().enumerate() {
        if item.kind.trim().is_empty() || item.title.trim().is_empty() || item.content.trim().is_empty() {
            return Err(Error::Parse(format!("new_items[{i}] has empty kind/title/content")));
        }
        if !(1..=5).contains(&item.importance) {
            return Err(Error::Parse(format!("new_items[{i}].importance out of range")));
        }
        if !unit_interval(item.confidence) {
            return Err(Error::Parse(format!("new_items[{i}].confidence out of range")));
        }
    }
    for (i, update) in proposal.updates.iter().enumerate() {
        if update.id.trim().is_empty() || update.new_content.trim().is_empty() {
            return Err(Error::Parse(format!("updates[{i}] has empty id/new_content")));
        }
        if !unit_interval(update.confidence) {
            return Err(Error::Parse(format!("updates[{i}].confidence out of range")));
        }
    }
    Ok(())
}

fn unit_interval(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const VALID: &str = r#"{"new_items":[{"kind":"preference","title":"Tone","content":"be brief","importance":3,"confidence":0.8}],"updates":[]}"#;

    #[test]
    fn test_plain_object() {
        let proposal = parse_proposal(VALID).unwrap();
        assert_eq!(proposal.new_items.len(), 1);
        assert_eq!(proposal.new_items[0].title, "Tone");
    }

    #[test]
    fn test_fenced_with_chatter() {
        let raw = format!("```json\n{VALID}\n```");
        assert!(parse_proposal(&raw).is_ok());
        let raw = format!("Here you go: {VALID} hope that helps");
        assert!(parse_proposal(&raw).is_ok());
    }

    #[test]
    fn test_braces_inside_strings() {
        let raw = r#"{"new_items":[{"kind":"note","title":"a } \" {","content":"x","importance":1,"confidence":0}],"updates":[]} trailing }"#;
        let proposal = parse_proposal(raw).unwrap();
        assert_eq!(proposal.new_items[0].title, "a } \" {");
    }

    #[test_case(r#"{"new_items":[],"updates":[],"extra":1}"# ; "unknown top-level field")]
    #[test_case(r#"{"new_items":[{"kind":"k","title":"t","content":"c","importance":3,"confidence":0.5,"tags":[]}],"updates":[]}"# ; "unknown item field")]
    #[test_case(r#"{"new_items":[{"kind":"k","title":"t","content":"c","importance":6,"confidence":0.5}],"updates":[]}"# ; "importance too high")]
    #[test_case(r#"{"new_items":[{"kind":"k","title":" ","content":"c","importance":3,"confidence":0.5}],"updates":[]}"# ; "blank title")]
    #[test_case(r#"{"new_items":[],"updates":[{"id":"x","new_content":"c","confidence":1.5}]}"# ; "update confidence too high")]
    #[test_case(r#"{"new_items":[]}"# ; "missing updates")]
    #[test_case("no json here" ; "no object")]
    #[test_case(r#"{"new_items":[ "# ; "unbalanced")]
    fn test_rejections(raw: &str) {
        assert!(matches!(parse_proposal(raw), Err(Error::Parse(_))));
    }

    #[test]
    fn test_too_many_entries() {
        let item = r#"{"kind":"k","title":"t","content":"c","importance":3,"confidence":0.5}"#;
        let items = vec![item; MAX_PROPOSAL_ENTRIES + 1].join(",");
        let raw = format!(r#"{{"new_items":[{items}],"updates":[]}}"#);
        assert!(matches!(parse_proposal(&raw), Err(Error::Parse(_))));
    }
}
