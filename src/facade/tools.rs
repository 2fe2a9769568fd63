//! Tool names and the policy gate consulted before dispatch.

use crate::{Error, Result};
use std::fmt;

/// Operations reachable through [`super::MemoryFacade::invoke`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    /// `memory.search`
    Search,
    /// `memory.write`
    Write,
    /// `memory.update`
    Update,
    /// `memory.forget`
    Forget,
    /// `memory.health`
    Health,
    /// `memory.decision.log`
    DecisionLog,
    /// `memory.checkpoint`
    Checkpoint,
    /// `memory.maintenance`
    Maintenance,
}

impl ToolName {
    /// Prefix tool registries put in front of every name.
    pub const PREFIX: &'static str = "memory.";

    /// Every tool, in registration order.
    pub const ALL: [Self; 8] = [
        Self::Search,
        Self::Write,
        Self::Update,
        Self::Forget,
        Self::Health,
        Self::DecisionLog,
        Self::Checkpoint,
        Self::Maintenance,
    ];

    /// The unprefixed name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Write => "write",
            Self::Update => "update",
            Self::Forget => "forget",
            Self::Health => "health",
            Self::DecisionLog => "decision.log",
            Self::Checkpoint => "checkpoint",
            Self::Maintenance => "maintenance",
        }
    }

    /// Returns true for tools that change stored state.
    #[must_use]
    pub const fn is_mutating(self) -> bool {
        !matches!(self, Self::Search | Self::Health)
    }

    /// Parses a tool name, with or without the `memory.` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an unknown tool.
    pub fn parse(name: &str) -> Result<Self> {
        let trimmed = name.trim();
        let bare = trimmed.strip_prefix(Self::PREFIX).unwrap_or(trimmed);
        Self::ALL
            .into_iter()
            .find(|tool| tool.as_str() == bare)
            .ok_or_else(|| Error::InvalidInput(format!("unknown tool '{name}'")))
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.as_str())
    }
}

/// Capability check run before every tool invocation.
pub trait ToolPolicy: Send + Sync {
    /// Returns true if `agent_id` may call `tool`.
    fn allows(&self, agent_id: &str, tool: ToolName) -> bool;
}

impl<F> ToolPolicy for F
where
    F: Fn(&str, ToolName) -> bool + Send + Sync,
{
    fn allows(&self, agent_id: &str, tool: ToolName) -> bool {
        self(agent_id, tool)
    }
}

/// Policy that grants every tool.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl ToolPolicy for AllowAll {
    fn allows(&self, _agent_id: &str, _tool: ToolName) -> bool {
        true
    }
}

/// Policy that grants only non-mutating tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOnly;

impl ToolPolicy for ReadOnly {
    fn allows(&self, _agent_id: &str, tool: ToolName) -> bool {
        !tool.is_mutating()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("search", ToolName::Search)]
    #[test_case("memory.search", ToolName::Search)]
    #[test_case(" memory.decision.log ", ToolName::DecisionLog)]
    #[test_case("maintenance", ToolName::Maintenance)]
    fn test_parse(input: &str, expected: ToolName) {
        assert_eq!(ToolName::parse(input).unwrap(), expected);
    }

    #[test]
    fn test_unknown_tool() {
        assert!(ToolName::parse("memory.delete_all").is_err());
        assert!(ToolName::parse("").is_err());
    }

    #[test]
    fn test_display_has_prefix() {
        assert_eq!(ToolName::Forget.to_string(), "memory.forget");
    }

    #[test]
    fn test_policies() {
        assert!(AllowAll.allows("a", ToolName::Forget));
        assert!(ReadOnly.allows("a", ToolName::Search));
        assert!(!ReadOnly.allows("a", ToolName::Write));
        let only_planner = |agent: &str, _tool: ToolName| agent == "planner";
        assert!(only_planner.allows("planner", ToolName::Write));
        assert!(!only_planner.allows("other", ToolName::Write));
    }
}
