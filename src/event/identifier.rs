//! Identifiers locating an event's origin.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an event came from: the producing subsystem (`source`), the
/// instrumentation scope inside it (`scope`), and the message or operation
/// name (`message`).
///
/// Identifiers double as match patterns: an empty component matches any
/// value for that component, so `EventIdentifier::any()` matches every
/// event and `("", "checkout", "")` matches every event from the
/// `checkout` scope. Record constructors in this crate fill `source` with
/// the record kind (`"span"`, `"log"`), which lets a pattern select a kind
/// without inspecting properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventIdentifier {
    pub source: String,
    pub scope: String,
    pub message: String,
}

impl EventIdentifier {
    pub fn new(
        source: impl Into<String>,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            scope: scope.into(),
            message: message.into(),
        }
    }

    /// The identifier with every component empty; as a pattern it matches
    /// all events.
    pub fn any() -> Self {
        Self::default()
    }

    /// A pattern matching every event from one instrumentation scope.
    pub fn for_scope(scope: impl Into<String>) -> Self {
        Self {
            source: String::new(),
            scope: scope.into(),
            message: String::new(),
        }
    }

    /// Treat `self` as a pattern and test it against a concrete identifier.
    ///
    /// Each component of the pattern must either be empty or equal the
    /// corresponding component of `candidate`.
    pub fn matches(&self, candidate: &EventIdentifier) -> bool {
        component_matches(&self.source, &candidate.source)
            && component_matches(&self.scope, &candidate.scope)
            && component_matches(&self.message, &candidate.message)
    }

    /// Whether every component is empty.
    pub fn is_wildcard(&self) -> bool {
        self.source.is_empty() && self.scope.is_empty() && self.message.is_empty()
    }
}

fn component_matches(pattern: &str, value: &str) -> bool {
    pattern.is_empty() || pattern == value
}

impl fmt::Display for EventIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let part = |s: &str| if s.is_empty() { "*" } else { s }.to_string();
        write!(
            f,
            "{}/{}/{}",
            part(&self.source),
            part(&self.scope),
            part(&self.message)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let id = EventIdentifier::new("span", "checkout", "ProcessOrder");
        assert!(id.matches(&EventIdentifier::new("span", "checkout", "ProcessOrder")));
        assert!(!id.matches(&EventIdentifier::new("span", "checkout", "Other")));
        assert!(!id.matches(&EventIdentifier::new("log", "checkout", "ProcessOrder")));
    }

    #[test]
    fn test_wildcard_components() {
        let any = EventIdentifier::any();
        assert!(any.is_wildcard());
        assert!(any.matches(&EventIdentifier::new("span", "a", "b")));

        let scoped = EventIdentifier::for_scope("checkout");
        assert!(scoped.matches(&EventIdentifier::new("span", "checkout", "X")));
        assert!(scoped.matches(&EventIdentifier::new("log", "checkout", "Y")));
        assert!(!scoped.matches(&EventIdentifier::new("log", "billing", "Y")));
    }

    #[test]
    fn test_match_is_directional() {
        // A concrete identifier does not match a wildcard candidate.
        let concrete = EventIdentifier::new("span", "checkout", "X");
        assert!(!concrete.matches(&EventIdentifier::any()));
    }

    #[test]
    fn test_display() {
        let id = EventIdentifier::for_scope("checkout");
        assert_eq!(id.to_string(), "*/checkout/*");
        assert_eq!(EventIdentifier::new("a", "b", "c").to_string(), "a/b/c");
    }
}
