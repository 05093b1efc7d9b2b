//! Named constructors for conditions.
//!
//! Everything here returns a plain [`Condition`] value; composition is by
//! function call, never by operator overloading, so a pattern definition
//! reads top to bottom.
//!
//! # Examples
//!
//! ```rust,ignore
//! use tracexpect::condition::{and, capture, on_identifier, property_equals};
//! use tracexpect::event::EventIdentifier;
//!
//! let order_accepted = and([
//!     on_identifier(
//!         EventIdentifier::for_scope("checkout"),
//!         property_equals("Status", "accepted"),
//!     ),
//!     capture(always(), "OrderId", "accepted_order"),
//! ]);
//! ```

use super::{CaptureSource, Condition, ConditionKind};
use crate::error::{Result, TracexpectError};
use crate::event::{keys, EventIdentifier, PropertyValue, TraceEvent};
use crate::outcome::Outcome;
use crate::state::EventScope;
use regex::Regex;
use std::sync::Arc;

/// Succeeds on every event.
pub fn always() -> Condition {
    Condition::from_kind(ConditionKind::Always)
}

/// Matches no event, ever. Useful as a gate that keeps a filter closed.
pub fn never() -> Condition {
    Condition::from_kind(ConditionKind::Never)
}

/// Succeeds when every inner condition succeeds on the same event.
///
/// Evaluation stops at the first non-success, and that outcome is the
/// result: one failing member fails the conjunction.
pub fn and(conditions: impl IntoIterator<Item = Condition>) -> Condition {
    Condition::from_kind(ConditionKind::And(conditions.into_iter().collect()))
}

/// Succeeds when any inner condition succeeds on the same event.
///
/// Fails only when every member fails; a mix of pending and failed members
/// stays pending.
pub fn or(conditions: impl IntoIterator<Item = Condition>) -> Condition {
    Condition::from_kind(ConditionKind::Or(conditions.into_iter().collect()))
}

/// Applies `inner` only to events whose identifier matches `pattern`;
/// other events stay pending. Empty pattern components match anything.
pub fn on_identifier(pattern: EventIdentifier, inner: Condition) -> Condition {
    Condition::from_kind(ConditionKind::OnIdentifier {
        pattern,
        inner: Box::new(inner),
    })
}

/// Shorthand for scope-only identifier matching: succeeds on any event
/// originating from `scope`.
pub fn from_scope(scope: impl Into<String>) -> Condition {
    on_identifier(EventIdentifier::for_scope(scope), always())
}

/// Succeeds when the event carries a `Message` property equal to `message`.
/// Log records expose their message under that key; spans stay pending.
pub fn message_is(message: impl Into<String>) -> Condition {
    property_equals(keys::MESSAGE, message.into())
}

/// Succeeds when the named property is present and structurally equal to
/// `expected`. A present-but-different value and an absent property both
/// stay pending.
pub fn property_equals(
    property: impl Into<String>,
    expected: impl Into<PropertyValue>,
) -> Condition {
    Condition::from_kind(ConditionKind::PropertyEquals {
        property: property.into(),
        expected: expected.into(),
        comparer: None,
    })
}

/// [`property_equals`] with a custom comparer, called as
/// `comparer(expected, observed)`.
pub fn property_equals_with(
    property: impl Into<String>,
    expected: impl Into<PropertyValue>,
    comparer: impl Fn(&PropertyValue, &PropertyValue) -> bool + Send + Sync + 'static,
) -> Condition {
    Condition::from_kind(ConditionKind::PropertyEquals {
        property: property.into(),
        expected: expected.into(),
        comparer: Some(Arc::new(comparer)),
    })
}

/// Succeeds when every named property is present and equal: a subset test
/// against the event. An empty expectation list matches every event.
pub fn all_properties<K, V>(expectations: impl IntoIterator<Item = (K, V)>) -> Condition
where
    K: Into<String>,
    V: Into<PropertyValue>,
{
    Condition::from_kind(ConditionKind::AllProperties(
        expectations
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect(),
    ))
}

/// Succeeds when `extract` pulls a value out of the event equal to
/// `expected`. Extraction returning `None` stays pending, so the extractor
/// doubles as a type filter.
pub fn extract_equals(
    extract: impl Fn(&TraceEvent) -> Option<PropertyValue> + Send + Sync + 'static,
    expected: impl Into<PropertyValue>,
) -> Condition {
    Condition::from_kind(ConditionKind::ExtractEquals {
        extract: Arc::new(extract),
        expected: expected.into(),
    })
}

/// Succeeds when the named property's textual form matches the regex.
///
/// The regex compiles once, here; an unparsable pattern is reported
/// immediately rather than at dispatch time.
pub fn matches_regex(property: impl Into<String>, pattern: &str) -> Result<Condition> {
    let regex = Regex::new(pattern)
        .map_err(|e| TracexpectError::InvalidRegex(format!("Pattern '{pattern}': {e}")))?;
    Ok(Condition::from_kind(ConditionKind::MatchesRegex {
        property: property.into(),
        regex,
    }))
}

/// Wraps a yes/no closure. `true` succeeds, `false` stays pending; a plain
/// predicate cannot fail a branch.
pub fn predicate(
    test: impl Fn(&EventIdentifier, &TraceEvent) -> bool + Send + Sync + 'static,
) -> Condition {
    Condition::from_kind(ConditionKind::Predicate(Arc::new(test)))
}

/// Like [`predicate`], with read access to the branch's global state.
pub fn predicate_with_state(
    test: impl Fn(&EventIdentifier, &TraceEvent, &EventScope) -> bool + Send + Sync + 'static,
) -> Condition {
    Condition::from_kind(ConditionKind::StatePredicate(Arc::new(test)))
}

/// Wraps a closure returning the full tri-state, for expectations that can
/// declare a branch failed on sight of a single event.
pub fn verdict(
    judge: impl Fn(&EventIdentifier, &TraceEvent) -> Outcome + Send + Sync + 'static,
) -> Condition {
    Condition::from_kind(ConditionKind::Verdict(Arc::new(judge)))
}

/// When `inner` succeeds, also store the named property of the triggering
/// event into global state under `store_as`. The outcome is `inner`'s;
/// a missing property captures nothing but does not change the verdict.
pub fn capture(
    inner: Condition,
    property: impl Into<String>,
    store_as: impl Into<String>,
) -> Condition {
    Condition::from_kind(ConditionKind::Capture {
        inner: Box::new(inner),
        source: CaptureSource::Property(property.into()),
        store_as: store_as.into(),
    })
}

/// [`capture`] with a custom extractor instead of a property name.
pub fn capture_with(
    inner: Condition,
    extract: impl Fn(&TraceEvent) -> Option<PropertyValue> + Send + Sync + 'static,
    store_as: impl Into<String>,
) -> Condition {
    Condition::from_kind(ConditionKind::Capture {
        inner: Box::new(inner),
        source: CaptureSource::Extractor(Arc::new(extract)),
        store_as: store_as.into(),
    })
}

/// Succeeds when the producer flagged the current dispatch as public.
pub fn is_public() -> Condition {
    Condition::from_kind(ConditionKind::Public)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{LogLevel, LogRecord, SpanRecord};
    use crate::state::GlobalState;

    fn span_event() -> TraceEvent {
        TraceEvent::from(
            SpanRecord::start("checkout", "ProcessOrder", "trace-1", "span-1")
                .with_attribute("OrderId", "order-7")
                .with_attribute("Amount", 250),
        )
    }

    #[test]
    fn test_always_and_never() {
        let event = span_event();
        let mut globals = GlobalState::new();
        let mut scope = EventScope::new(false, &mut globals);

        assert_eq!(
            always().check(event.identifier(), &event, &mut scope),
            Outcome::Successful
        );
        assert_eq!(
            never().check(event.identifier(), &event, &mut scope),
            Outcome::Pending
        );
    }

    #[test]
    fn test_property_equals() {
        let event = span_event();
        let mut globals = GlobalState::new();
        let mut scope = EventScope::new(false, &mut globals);

        let hit = property_equals("OrderId", "order-7");
        let miss = property_equals("OrderId", "order-8");
        let absent = property_equals("Nope", "x");

        assert_eq!(hit.check(event.identifier(), &event, &mut scope), Outcome::Successful);
        assert_eq!(miss.check(event.identifier(), &event, &mut scope), Outcome::Pending);
        assert_eq!(absent.check(event.identifier(), &event, &mut scope), Outcome::Pending);
    }

    #[test]
    fn test_property_equals_with_comparer() {
        let event = span_event();
        let mut globals = GlobalState::new();
        let mut scope = EventScope::new(false, &mut globals);

        let condition = property_equals_with("OrderId", "ORDER-7", |expected, actual| {
            match (expected, actual) {
                (PropertyValue::Text(a), PropertyValue::Text(b)) => a.eq_ignore_ascii_case(b),
                _ => expected == actual,
            }
        });
        assert_eq!(
            condition.check(event.identifier(), &event, &mut scope),
            Outcome::Successful
        );
    }

    #[test]
    fn test_all_properties() {
        let event = span_event();
        let mut globals = GlobalState::new();
        let mut scope = EventScope::new(false, &mut globals);

        let both = all_properties([("OrderId", PropertyValue::from("order-7")), ("Amount", 250.into())]);
        assert_eq!(both.check(event.identifier(), &event, &mut scope), Outcome::Successful);

        let one_off = all_properties([("OrderId", PropertyValue::from("order-7")), ("Amount", 9.into())]);
        assert_eq!(one_off.check(event.identifier(), &event, &mut scope), Outcome::Pending);

        let empty = all_properties(Vec::<(String, PropertyValue)>::new());
        assert_eq!(empty.check(event.identifier(), &event, &mut scope), Outcome::Successful);
    }

    #[test]
    fn test_and_stops_at_first_non_success() {
        let event = span_event();
        let mut globals = GlobalState::new();
        let mut scope = EventScope::new(false, &mut globals);

        let condition = and([
            property_equals("OrderId", "order-8"), // pending
            capture(always(), "OrderId", "should_not_capture"),
        ]);
        assert_eq!(
            condition.check(event.identifier(), &event, &mut scope),
            Outcome::Pending
        );
        assert_eq!(scope.get("should_not_capture"), None);
    }

    #[test]
    fn test_or_failure_requires_all_failed() {
        let event = span_event();
        let mut globals = GlobalState::new();
        let mut scope = EventScope::new(false, &mut globals);

        let fail = verdict(|_, _| Outcome::Failed);
        let pend = never();

        let all_fail = or([fail.clone(), fail.clone()]);
        assert_eq!(all_fail.check(event.identifier(), &event, &mut scope), Outcome::Failed);

        let mixed = or([fail.clone(), pend]);
        assert_eq!(mixed.check(event.identifier(), &event, &mut scope), Outcome::Pending);

        let rescued = or([fail, always()]);
        assert_eq!(rescued.check(event.identifier(), &event, &mut scope), Outcome::Successful);
    }

    #[test]
    fn test_on_identifier_routing() {
        let event = span_event();
        let log = TraceEvent::from(LogRecord::new("billing", LogLevel::Info, "charged"));
        let mut globals = GlobalState::new();
        let mut scope = EventScope::new(false, &mut globals);

        let condition = on_identifier(EventIdentifier::for_scope("checkout"), always());
        assert_eq!(
            condition.check(event.identifier(), &event, &mut scope),
            Outcome::Successful
        );
        assert_eq!(
            condition.check(log.identifier(), &log, &mut scope),
            Outcome::Pending
        );
    }

    #[test]
    fn test_matches_regex() {
        let event = span_event();
        let mut globals = GlobalState::new();
        let mut scope = EventScope::new(false, &mut globals);

        let condition = matches_regex("OrderId", r"^order-\d+$").unwrap();
        assert_eq!(
            condition.check(event.identifier(), &event, &mut scope),
            Outcome::Successful
        );

        // Non-text properties match through their textual form.
        let numeric = matches_regex("Amount", r"^\d{3}$").unwrap();
        assert_eq!(
            numeric.check(event.identifier(), &event, &mut scope),
            Outcome::Successful
        );

        let err = matches_regex("OrderId", "(unclosed").unwrap_err();
        assert!(matches!(err, TracexpectError::InvalidRegex(_)));
    }

    #[test]
    fn test_extract_equals() {
        let event = span_event();
        let mut globals = GlobalState::new();
        let mut scope = EventScope::new(false, &mut globals);

        let condition = extract_equals(
            |event| {
                event
                    .as_span()
                    .map(|span| PropertyValue::Text(span.trace_id().to_string()))
            },
            "trace-1",
        );
        assert_eq!(
            condition.check(event.identifier(), &event, &mut scope),
            Outcome::Successful
        );

        // Extractor declines non-span events.
        let log = TraceEvent::from(LogRecord::new("checkout", LogLevel::Info, "x"));
        assert_eq!(condition.check(log.identifier(), &log, &mut scope), Outcome::Pending);
    }

    #[test]
    fn test_capture_stores_on_success_only() {
        let event = span_event();
        let mut globals = GlobalState::new();
        let mut scope = EventScope::new(false, &mut globals);

        let miss = capture(property_equals("OrderId", "other"), "OrderId", "seen_order");
        assert_eq!(miss.check(event.identifier(), &event, &mut scope), Outcome::Pending);
        assert_eq!(scope.get("seen_order"), None);

        let hit = capture(always(), "OrderId", "seen_order");
        assert_eq!(hit.check(event.identifier(), &event, &mut scope), Outcome::Successful);
        assert_eq!(
            scope.get("seen_order"),
            Some(PropertyValue::Text("order-7".into()))
        );
    }

    #[test]
    fn test_predicate_with_state_reads_captures() {
        let event = span_event();
        let mut globals = GlobalState::new();
        globals.set("expected_order", "order-7");
        let mut scope = EventScope::new(false, &mut globals);

        let condition = predicate_with_state(|_, event, scope| {
            event.property("OrderId") == scope.get("expected_order")
        });
        assert_eq!(
            condition.check(event.identifier(), &event, &mut scope),
            Outcome::Successful
        );
    }

    #[test]
    fn test_is_public() {
        let event = span_event();
        let mut globals = GlobalState::new();

        let mut private_scope = EventScope::new(false, &mut globals);
        assert_eq!(
            is_public().check(event.identifier(), &event, &mut private_scope),
            Outcome::Pending
        );
        drop(private_scope);

        let mut public_scope = EventScope::new(true, &mut globals);
        assert_eq!(
            is_public().check(event.identifier(), &event, &mut public_scope),
            Outcome::Successful
        );
    }
}
