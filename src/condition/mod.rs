//! Composable conditions evaluated against single events.
//!
//! A [`Condition`] answers one question about one event with a tri-state
//! [`Outcome`]: `Pending` when the event is not the one being looked for,
//! `Successful` when it is, and `Failed` when observing it proves the
//! surrounding expectation wrong. Conditions are built with the named
//! functions in [`builders`] and combined with [`builders::and`] and
//! [`builders::or`]; they stay cheap to clone because closures travel
//! behind `Arc`.

pub mod builders;

pub use builders::{
    all_properties, always, and, capture, capture_with, extract_equals, from_scope, is_public,
    matches_regex, message_is, never, on_identifier, or, predicate, predicate_with_state,
    property_equals, property_equals_with, verdict,
};

use crate::event::{EventIdentifier, PropertyValue, TraceEvent, ValueComparer};
use crate::outcome::Outcome;
use crate::state::EventScope;
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// Stateless yes/no test over an event.
pub type PredicateFn = Arc<dyn Fn(&EventIdentifier, &TraceEvent) -> bool + Send + Sync>;

/// Yes/no test that can also read the branch's accumulated state.
pub type StatePredicateFn =
    Arc<dyn Fn(&EventIdentifier, &TraceEvent, &EventScope) -> bool + Send + Sync>;

/// Full tri-state test, for conditions that need to fail a branch outright.
pub type VerdictFn = Arc<dyn Fn(&EventIdentifier, &TraceEvent) -> Outcome + Send + Sync>;

/// Pulls a single comparable value out of an event.
pub type ExtractorFn = Arc<dyn Fn(&TraceEvent) -> Option<PropertyValue> + Send + Sync>;

/// A reusable test applied to events as a pattern consumes the stream.
#[derive(Clone)]
pub struct Condition {
    pub(crate) kind: ConditionKind,
}

#[derive(Clone)]
pub(crate) enum ConditionKind {
    Always,
    Never,
    And(Vec<Condition>),
    Or(Vec<Condition>),
    OnIdentifier {
        pattern: EventIdentifier,
        inner: Box<Condition>,
    },
    PropertyEquals {
        property: String,
        expected: PropertyValue,
        comparer: Option<ValueComparer>,
    },
    AllProperties(Vec<(String, PropertyValue)>),
    ExtractEquals {
        extract: ExtractorFn,
        expected: PropertyValue,
    },
    MatchesRegex {
        property: String,
        regex: Regex,
    },
    Predicate(PredicateFn),
    StatePredicate(StatePredicateFn),
    Verdict(VerdictFn),
    Capture {
        inner: Box<Condition>,
        source: CaptureSource,
        store_as: String,
    },
    Public,
}

#[derive(Clone)]
pub(crate) enum CaptureSource {
    Property(String),
    Extractor(ExtractorFn),
}

impl Condition {
    pub(crate) fn from_kind(kind: ConditionKind) -> Self {
        Self { kind }
    }

    /// Evaluate this condition against one event.
    ///
    /// `identifier` is the event's own identifier, passed separately so
    /// predicates can route on it without touching the payload. Capture
    /// conditions write into the scope's global state when they succeed.
    pub fn check(
        &self,
        identifier: &EventIdentifier,
        event: &TraceEvent,
        scope: &mut EventScope<'_>,
    ) -> Outcome {
        match &self.kind {
            ConditionKind::Always => Outcome::Successful,
            ConditionKind::Never => Outcome::Pending,
            ConditionKind::And(conditions) => {
                for condition in conditions {
                    match condition.check(identifier, event, scope) {
                        Outcome::Successful => {}
                        // First non-success decides; later conditions are
                        // not evaluated and cannot capture.
                        other => return other,
                    }
                }
                Outcome::Successful
            }
            ConditionKind::Or(conditions) => {
                let mut all_failed = !conditions.is_empty();
                for condition in conditions {
                    match condition.check(identifier, event, scope) {
                        Outcome::Successful => return Outcome::Successful,
                        Outcome::Failed => {}
                        Outcome::Pending => all_failed = false,
                    }
                }
                if all_failed {
                    Outcome::Failed
                } else {
                    Outcome::Pending
                }
            }
            ConditionKind::OnIdentifier { pattern, inner } => {
                if pattern.matches(identifier) {
                    inner.check(identifier, event, scope)
                } else {
                    Outcome::Pending
                }
            }
            ConditionKind::PropertyEquals {
                property,
                expected,
                comparer,
            } => match event.property(property) {
                Some(actual) => {
                    let equal = match comparer {
                        Some(comparer) => comparer(expected, &actual),
                        None => expected == &actual,
                    };
                    Outcome::from_match(equal)
                }
                None => Outcome::Pending,
            },
            ConditionKind::AllProperties(expectations) => {
                // Subset test: every expected property present and equal.
                // An empty expectation set is a subset of any event.
                for (property, expected) in expectations {
                    match event.property(property) {
                        Some(actual) if &actual == expected => {}
                        _ => return Outcome::Pending,
                    }
                }
                Outcome::Successful
            }
            ConditionKind::ExtractEquals { extract, expected } => match extract(event) {
                Some(actual) => Outcome::from_match(&actual == expected),
                None => Outcome::Pending,
            },
            ConditionKind::MatchesRegex { property, regex } => match event.property(property) {
                Some(actual) => Outcome::from_match(regex.is_match(&actual.to_string())),
                None => Outcome::Pending,
            },
            ConditionKind::Predicate(test) => {
                Outcome::from_match(test(identifier, event))
            }
            ConditionKind::StatePredicate(test) => {
                Outcome::from_match(test(identifier, event, scope))
            }
            ConditionKind::Verdict(judge) => judge(identifier, event),
            ConditionKind::Capture {
                inner,
                source,
                store_as,
            } => {
                let outcome = inner.check(identifier, event, scope);
                if outcome.is_successful() {
                    let value = match source {
                        CaptureSource::Property(name) => event.property(name),
                        CaptureSource::Extractor(extract) => extract(event),
                    };
                    if let Some(value) = value {
                        scope.set(store_as.clone(), value);
                    }
                }
                outcome
            }
            ConditionKind::Public => Outcome::from_match(scope.is_public()),
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ConditionKind::Always => write!(f, "Always"),
            ConditionKind::Never => write!(f, "Never"),
            ConditionKind::And(conditions) => f.debug_tuple("And").field(conditions).finish(),
            ConditionKind::Or(conditions) => f.debug_tuple("Or").field(conditions).finish(),
            ConditionKind::OnIdentifier { pattern, inner } => f
                .debug_struct("OnIdentifier")
                .field("pattern", pattern)
                .field("inner", inner)
                .finish(),
            ConditionKind::PropertyEquals {
                property, expected, ..
            } => f
                .debug_struct("PropertyEquals")
                .field("property", property)
                .field("expected", expected)
                .finish(),
            ConditionKind::AllProperties(expectations) => f
                .debug_tuple("AllProperties")
                .field(expectations)
                .finish(),
            ConditionKind::ExtractEquals { expected, .. } => f
                .debug_struct("ExtractEquals")
                .field("expected", expected)
                .finish(),
            ConditionKind::MatchesRegex { property, regex } => f
                .debug_struct("MatchesRegex")
                .field("property", property)
                .field("regex", &regex.as_str())
                .finish(),
            ConditionKind::Predicate(_) => write!(f, "Predicate"),
            ConditionKind::StatePredicate(_) => write!(f, "StatePredicate"),
            ConditionKind::Verdict(_) => write!(f, "Verdict"),
            ConditionKind::Capture {
                inner, store_as, ..
            } => f
                .debug_struct("Capture")
                .field("inner", inner)
                .field("store_as", store_as)
                .finish(),
            ConditionKind::Public => write!(f, "Public"),
        }
    }
}
