//! Pattern trees of expectation steps.
//!
//! A [`Pattern`] is a tree built from the constructor functions in this
//! module: [`match_event`], [`sequence`], [`filter`], [`all_of`],
//! [`one_of`], [`data`], [`record`], and the grouping builders
//! [`group_by`], [`group_by_span`], and [`group_by_trace`]. Registering a
//! pattern with a validator compiles the tree into a flat step program and
//! validates its structure; malformed trees are rejected at that point,
//! before any event flows.

pub(crate) mod program;

use crate::condition::Condition;
use crate::error::{Result, TracexpectError};
use crate::event::{PropertyValue, TraceEvent, ValueComparer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// One step in an expectation tree.
///
/// Patterns are inert descriptions; evaluation state lives per registered
/// branch, so the same pattern value can be registered with several
/// validators.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub(crate) label: Option<String>,
    pub(crate) kind: PatternKind,
    pub(crate) children: Vec<Pattern>,
}

#[derive(Debug, Clone)]
pub(crate) enum PatternKind {
    Match { condition: Condition },
    Sequence,
    Filter { gate: Condition },
    AllOf,
    OneOf,
    Data { templates: Vec<PartialRecord> },
    GroupBy {
        property: String,
        bind_as: String,
        until: Option<Condition>,
        comparer: Option<KeyComparer>,
    },
    GroupBySpan { bind_as: String },
    GroupByTrace { bind_as: String },
    Record { sink: RecordSink },
}

impl PatternKind {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Match { .. } => "match",
            Self::Sequence => "sequence",
            Self::Filter { .. } => "filter",
            Self::AllOf => "all_of",
            Self::OneOf => "one_of",
            Self::Data { .. } => "data",
            Self::GroupBy { .. } => "group_by",
            Self::GroupBySpan { .. } => "group_by_span",
            Self::GroupByTrace { .. } => "group_by_trace",
            Self::Record { .. } => "record",
        }
    }
}

impl Pattern {
    fn new(kind: PatternKind) -> Self {
        Self {
            label: None,
            kind,
            children: Vec::new(),
        }
    }

    /// Name this step so branch queries can ask whether it has succeeded.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Append a child step. Whether children are legal for this step kind
    /// is checked when the pattern is registered.
    pub fn with_child(mut self, child: Pattern) -> Self {
        self.children.push(child);
        self
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

/// A step that arms on the first event satisfying `condition`, then routes
/// subsequent events to its children until all of them complete.
///
/// Without children the step succeeds on the arming event itself.
pub fn match_event(condition: Condition) -> Pattern {
    Pattern::new(PatternKind::Match { condition })
}

/// Children must complete in order; an event only reaches the child at the
/// cursor. A failed child fails the sequence.
pub fn sequence(children: impl IntoIterator<Item = Pattern>) -> Pattern {
    let mut pattern = Pattern::new(PatternKind::Sequence);
    pattern.children = children.into_iter().collect();
    pattern
}

/// Offers an event to the children only when `gate` succeeds on it; gated
/// events reach every incomplete child. Completes when all children have,
/// fails if the gate ever fails.
pub fn filter(gate: Condition, children: impl IntoIterator<Item = Pattern>) -> Pattern {
    let mut pattern = Pattern::new(PatternKind::Filter { gate });
    pattern.children = children.into_iter().collect();
    pattern
}

/// Children complete in any order; every event is offered to each
/// incomplete child. One failed child fails the step.
pub fn all_of(children: impl IntoIterator<Item = Pattern>) -> Pattern {
    let mut pattern = Pattern::new(PatternKind::AllOf);
    pattern.children = children.into_iter().collect();
    pattern
}

/// Succeeds as soon as any child succeeds; fails only when every child has
/// failed.
pub fn one_of(children: impl IntoIterator<Item = Pattern>) -> Pattern {
    let mut pattern = Pattern::new(PatternKind::OneOf);
    pattern.children = children.into_iter().collect();
    pattern
}

/// An ordered run of record templates. Each arriving event is compared
/// against the template at the cursor; a subset match advances it, and the
/// step succeeds when the last template has matched. Non-matching events
/// are ignored.
pub fn data(templates: impl IntoIterator<Item = PartialRecord>) -> Pattern {
    Pattern::new(PatternKind::Data {
        templates: templates.into_iter().collect(),
    })
}

/// Copies every event this subtree observes into `sink`, then behaves as
/// its child. Recording stops once the child completes.
pub fn record(sink: &RecordSink, child: Pattern) -> Pattern {
    let mut pattern = Pattern::new(PatternKind::Record { sink: sink.clone() });
    pattern.children = vec![child];
    pattern
}

/// Group events by the value of one property.
///
/// The first event carrying a value of `property` not yet claimed by a
/// sibling branch forks the branch: the original binds that value and
/// follows it, the fork stays unbound for the next value. Finish the
/// builder with [`GroupByBuilder::build`].
pub fn group_by(property: impl Into<String>) -> GroupByBuilder {
    GroupByBuilder {
        scope: GroupScope::Property(property.into()),
        bind_as: None,
        until: None,
        comparer: None,
        inner: None,
    }
}

/// [`group_by`] with an explicit close condition: the group completes when
/// `close` matches an event of the bound group, successfully if the inner
/// expression (when present) has already succeeded.
pub fn group_by_until(property: impl Into<String>, close: Condition) -> GroupByBuilder {
    GroupByBuilder {
        scope: GroupScope::Property(property.into()),
        bind_as: None,
        until: Some(close),
        comparer: None,
        inner: None,
    }
}

/// Group events by span: binds the trace and span ids of the first
/// unclaimed span it sees and closes when that span stops.
pub fn group_by_span() -> GroupByBuilder {
    GroupByBuilder {
        scope: GroupScope::Span,
        bind_as: None,
        until: None,
        comparer: None,
        inner: None,
    }
}

/// Group events by trace: binds the trace id of the first unclaimed trace
/// it sees and closes when the trace's root span stops.
pub fn group_by_trace() -> GroupByBuilder {
    GroupByBuilder {
        scope: GroupScope::Trace,
        bind_as: None,
        until: None,
        comparer: None,
        inner: None,
    }
}

enum GroupScope {
    Property(String),
    Span,
    Trace,
}

/// A [`ValueComparer`] carried inside a pattern kind. Patterns stay
/// `Debug` while the closure itself is opaque.
#[derive(Clone)]
pub(crate) struct KeyComparer(pub(crate) ValueComparer);

impl fmt::Debug for KeyComparer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyComparer")
    }
}

/// Assembles a grouping step; see [`group_by`], [`group_by_span`], and
/// [`group_by_trace`].
pub struct GroupByBuilder {
    scope: GroupScope,
    bind_as: Option<String>,
    until: Option<Condition>,
    comparer: Option<ValueComparer>,
    inner: Option<Pattern>,
}

impl GroupByBuilder {
    /// Global-state name the claimed correlation value is bound under.
    /// Defaults to the grouped property name, or `"SpanKey"` /
    /// `"TraceKey"` for span and trace grouping.
    pub fn bound_as(mut self, name: impl Into<String>) -> Self {
        self.bind_as = Some(name.into());
        self
    }

    /// Compare correlation values with `comparer` instead of structural
    /// equality, called as `comparer(bound, observed)`. The comparer
    /// decides both which events belong to a bound group and whether a
    /// sibling branch already claimed an observed value.
    ///
    /// Only property groups compare values; span and trace groups match
    /// their ids structurally and ignore this setting.
    pub fn with_comparer(
        mut self,
        comparer: impl Fn(&PropertyValue, &PropertyValue) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.comparer = Some(Arc::new(comparer));
        self
    }

    /// The expression evaluated against the bound group's events. At most
    /// one inner expression is accepted.
    pub fn inner(mut self, pattern: Pattern) -> Self {
        self.inner = Some(pattern);
        self
    }

    pub fn build(self) -> Pattern {
        let kind = match self.scope {
            GroupScope::Property(property) => {
                let bind_as = self.bind_as.unwrap_or_else(|| property.clone());
                PatternKind::GroupBy {
                    property,
                    bind_as,
                    until: self.until,
                    comparer: self.comparer.map(KeyComparer),
                }
            }
            GroupScope::Span => PatternKind::GroupBySpan {
                bind_as: self.bind_as.unwrap_or_else(|| "SpanKey".to_string()),
            },
            GroupScope::Trace => PatternKind::GroupByTrace {
                bind_as: self.bind_as.unwrap_or_else(|| "TraceKey".to_string()),
            },
        };
        let mut pattern = Pattern::new(kind);
        pattern.children = self.inner.into_iter().collect();
        pattern
    }
}

/// A template matched against events by subset: every field named in the
/// template must be present on the event with an equal value; extra event
/// properties are ignored. An empty template matches any event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialRecord {
    fields: BTreeMap<String, PropertyValue>,
}

impl PartialRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Build a template from a JSON object of scalar fields.
    ///
    /// Nested objects and arrays have no subset-match semantics here and
    /// are rejected.
    pub fn from_json(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(TracexpectError::InvalidTemplate(format!(
                "expected a JSON object, got {}",
                json_type_name(value)
            )));
        };
        let mut fields = BTreeMap::new();
        for (name, field) in map {
            match PropertyValue::from_json(field) {
                Some(scalar) => {
                    fields.insert(name.clone(), scalar);
                }
                None => {
                    return Err(TracexpectError::InvalidTemplate(format!(
                        "field '{}' is not a scalar value",
                        name
                    )));
                }
            }
        }
        Ok(Self { fields })
    }

    /// Subset test against an event's properties.
    pub fn matches(&self, event: &TraceEvent) -> bool {
        self.fields
            .iter()
            .all(|(name, expected)| event.property(name).as_ref() == Some(expected))
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Shared collector behind [`record`] steps.
///
/// The pattern holds one handle and the test holds another; events pushed
/// during evaluation are visible through [`RecordSink::events`] afterward.
/// Recorded events keep their payloads alive, including pooled records.
#[derive(Clone, Default)]
pub struct RecordSink {
    events: Arc<Mutex<Vec<TraceEvent>>>,
}

impl RecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, event: TraceEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drop everything recorded so far, releasing any pooled records the
    /// sink was keeping alive.
    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for RecordSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordSink")
            .field("recorded", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::always;
    use crate::event::SpanRecord;
    use serde_json::json;

    #[test]
    fn test_pattern_labels() {
        let pattern = match_event(always()).with_label("armed");
        assert_eq!(pattern.label(), Some("armed"));
        assert_eq!(pattern.kind.name(), "match");
    }

    #[test]
    fn test_group_builder_defaults() {
        let by_property = group_by("OrderId").build();
        let PatternKind::GroupBy { property, bind_as, until, comparer } = &by_property.kind else {
            panic!("expected group_by kind");
        };
        assert_eq!(property, "OrderId");
        assert_eq!(bind_as, "OrderId");
        assert!(until.is_none());
        assert!(comparer.is_none());

        let by_span = group_by_span().bound_as("current").build();
        let PatternKind::GroupBySpan { bind_as } = &by_span.kind else {
            panic!("expected group_by_span kind");
        };
        assert_eq!(bind_as, "current");
        assert!(by_span.children.is_empty());

        let with_inner = group_by_trace().inner(match_event(always())).build();
        assert_eq!(with_inner.children.len(), 1);
    }

    #[test]
    fn test_partial_record_subset_match() {
        let template = PartialRecord::new()
            .with("OrderId", "order-1")
            .with("Amount", 100);
        let event = TraceEvent::from(
            SpanRecord::start("checkout", "Op", "t", "s")
                .with_attribute("OrderId", "order-1")
                .with_attribute("Amount", 100)
                .with_attribute("Extra", true),
        );
        assert!(template.matches(&event));

        let mismatched = PartialRecord::new().with("Amount", 101);
        assert!(!mismatched.matches(&event));

        let absent = PartialRecord::new().with("Missing", 1);
        assert!(!absent.matches(&event));

        assert!(PartialRecord::new().matches(&event));
    }

    #[test]
    fn test_partial_record_from_json() {
        let template =
            PartialRecord::from_json(&json!({"OrderId": "order-1", "Amount": 100})).unwrap();
        assert_eq!(template.len(), 2);

        let err = PartialRecord::from_json(&json!({"Nested": {"a": 1}})).unwrap_err();
        assert!(matches!(err, TracexpectError::InvalidTemplate(_)));

        let err = PartialRecord::from_json(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, TracexpectError::InvalidTemplate(_)));
    }

    #[test]
    fn test_record_sink_snapshot() {
        let sink = RecordSink::new();
        assert!(sink.is_empty());

        sink.push(TraceEvent::from(SpanRecord::start("s", "A", "t", "sp")));
        sink.push(TraceEvent::from(SpanRecord::stop("s", "A", "t", "sp")));

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(sink.len(), 2);

        // The pattern-side handle shares storage.
        let handle = sink.clone();
        handle.push(TraceEvent::from(SpanRecord::start("s", "B", "t2", "sp2")));
        assert_eq!(sink.len(), 3);
    }
}
