//! `${VAR}` expansion for configuration values.

use once_cell::sync::Lazy;
use regex::Regex;

static ENV_REF: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").ok());

/// Expands `${VAR}` references from the process environment.
///
/// Unset variables expand to the empty string.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    expand_with(value, |name| std::env::var(name).ok())
}

pub(super) fn expand_with(value: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let Some(re) = ENV_REF.as_ref() else {
        return value.to_string();
    };
    re.replace_all(value, |caps: &regex::Captures<'_>| {
        lookup(&caps[1]).unwrap_or_default()
    })
    .into_owned()
}

/// Returns true if the whole value is a single `${VAR}` reference.
pub(super) fn is_reference(value: &str) -> bool {
    ENV_REF
        .as_ref()
        .and_then(|re| re.find(value))
        .is_some_and(|m| m.start() == 0 && m.end() == value.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_with_lookup() {
        let lookup = |name: &str| (name == "KEY").then(|| "secret".to_string());
        assert_eq!(expand_with("${KEY}", lookup), "secret");
        assert_eq!(expand_with("Bearer ${KEY}!", lookup), "Bearer secret!");
        assert_eq!(expand_with("${MISSING}", lookup), "");
        assert_eq!(expand_with("plain", lookup), "plain");
    }

    #[test]
    fn test_is_reference() {
        assert!(is_reference("${OPENAI_API_KEY}"));
        assert!(!is_reference("sk-${KEY}"));
        assert!(!is_reference("sk-raw"));
    }
}
