//! Concrete record types produced by instrumented code under test.
//!
//! Three immutable record kinds cover the usual shapes of instrumentation
//! output: [`SpanRecord`] for operation start/stop pairs, [`LogRecord`] for
//! leveled messages, and [`ValueRecord`] for arbitrary JSON payloads.
//! [`EventRecord`] is the mutable bag behind pooled events.

use super::identifier::EventIdentifier;
use super::value::PropertyValue;
use super::TraceData;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// `source` component used by [`SpanRecord`] identifiers.
pub const SOURCE_SPAN: &str = "span";

/// `source` component used by [`LogRecord`] identifiers.
pub const SOURCE_LOG: &str = "log";

/// Property names shared by record kinds that carry correlation data.
///
/// Conditions and grouping expressions address these through the ordinary
/// property interface, so a pattern written against `keys::TRACE_ID` works
/// for any record kind that knows its trace.
pub mod keys {
    /// Identifier of the trace an event belongs to.
    pub const TRACE_ID: &str = "TraceId";
    /// Identifier of the span an event belongs to.
    pub const SPAN_ID: &str = "SpanId";
    /// Identifier of the parent span, for nested spans.
    pub const PARENT_SPAN_ID: &str = "ParentSpanId";
    /// Lifecycle phase of a span record: `"Start"` or `"Stop"`.
    pub const SPAN_PHASE: &str = "SpanPhase";
    /// Operation name of a span record.
    pub const SPAN_NAME: &str = "SpanName";
    /// Severity of a log record.
    pub const LEVEL: &str = "Level";
    /// Message of a log record.
    pub const MESSAGE: &str = "Message";
}

/// Lifecycle phase of a span record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpanPhase {
    Start,
    Stop,
}

impl SpanPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::Stop => "Stop",
        }
    }
}

impl fmt::Display for SpanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One endpoint of an operation: either the start or the stop of a span.
///
/// A span belongs to a trace, has its own id, and optionally a parent span
/// id when the operation is nested. The operation name lives in the
/// identifier's `message` component and is also exposed as the
/// [`keys::SPAN_NAME`] property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    identifier: EventIdentifier,
    trace_id: String,
    span_id: String,
    parent_span_id: Option<String>,
    phase: SpanPhase,
    attributes: BTreeMap<String, PropertyValue>,
}

impl SpanRecord {
    /// A span-start record for the named operation.
    pub fn start(
        scope: impl Into<String>,
        name: impl Into<String>,
        trace_id: impl Into<String>,
        span_id: impl Into<String>,
    ) -> Self {
        Self::with_phase(scope, name, trace_id, span_id, SpanPhase::Start)
    }

    /// A span-stop record for the named operation.
    pub fn stop(
        scope: impl Into<String>,
        name: impl Into<String>,
        trace_id: impl Into<String>,
        span_id: impl Into<String>,
    ) -> Self {
        Self::with_phase(scope, name, trace_id, span_id, SpanPhase::Stop)
    }

    fn with_phase(
        scope: impl Into<String>,
        name: impl Into<String>,
        trace_id: impl Into<String>,
        span_id: impl Into<String>,
        phase: SpanPhase,
    ) -> Self {
        Self {
            identifier: EventIdentifier::new(SOURCE_SPAN, scope, name),
            trace_id: trace_id.into(),
            span_id: span_id.into(),
            parent_span_id: None,
            phase,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_parent(mut self, parent_span_id: impl Into<String>) -> Self {
        self.parent_span_id = Some(parent_span_id.into());
        self
    }

    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    pub fn parent_span_id(&self) -> Option<&str> {
        self.parent_span_id.as_deref()
    }

    pub fn phase(&self) -> SpanPhase {
        self.phase
    }

    pub fn name(&self) -> &str {
        &self.identifier.message
    }

    /// Whether this span is the root of its trace.
    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }
}

impl TraceData for SpanRecord {
    fn identifier(&self) -> &EventIdentifier {
        &self.identifier
    }

    fn property_names(&self) -> Vec<String> {
        let mut names = vec![
            keys::TRACE_ID.to_string(),
            keys::SPAN_ID.to_string(),
            keys::SPAN_PHASE.to_string(),
            keys::SPAN_NAME.to_string(),
        ];
        if self.parent_span_id.is_some() {
            names.push(keys::PARENT_SPAN_ID.to_string());
        }
        names.extend(self.attributes.keys().cloned());
        names
    }

    fn property(&self, name: &str) -> Option<PropertyValue> {
        match name {
            keys::TRACE_ID => Some(PropertyValue::Text(self.trace_id.clone())),
            keys::SPAN_ID => Some(PropertyValue::Text(self.span_id.clone())),
            keys::PARENT_SPAN_ID => self
                .parent_span_id
                .as_ref()
                .map(|parent| PropertyValue::Text(parent.clone())),
            keys::SPAN_PHASE => Some(PropertyValue::Text(self.phase.as_str().to_string())),
            keys::SPAN_NAME => Some(PropertyValue::Text(self.identifier.message.clone())),
            other => self.attributes.get(other).cloned(),
        }
    }
}

/// Severity of a log record, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "Trace",
            Self::Debug => "Debug",
            Self::Info => "Info",
            Self::Warn => "Warn",
            Self::Error => "Error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A leveled log message, optionally correlated to a span.
///
/// The message lives in the identifier's `message` component. Structured
/// fields attached with [`LogRecord::with_field`] are reachable as
/// properties under their own names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    identifier: EventIdentifier,
    level: LogLevel,
    trace_id: Option<String>,
    span_id: Option<String>,
    fields: BTreeMap<String, PropertyValue>,
}

impl LogRecord {
    pub fn new(scope: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            identifier: EventIdentifier::new(SOURCE_LOG, scope, message),
            level,
            trace_id: None,
            span_id: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_correlation(
        mut self,
        trace_id: impl Into<String>,
        span_id: impl Into<String>,
    ) -> Self {
        self.trace_id = Some(trace_id.into());
        self.span_id = Some(span_id.into());
        self
    }

    /// Correlate this record to the trace and span of an existing span record.
    pub fn in_span(self, span: &SpanRecord) -> Self {
        self.with_correlation(span.trace_id(), span.span_id())
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn message(&self) -> &str {
        &self.identifier.message
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub fn span_id(&self) -> Option<&str> {
        self.span_id.as_deref()
    }
}

impl TraceData for LogRecord {
    fn identifier(&self) -> &EventIdentifier {
        &self.identifier
    }

    fn property_names(&self) -> Vec<String> {
        let mut names = vec![keys::LEVEL.to_string(), keys::MESSAGE.to_string()];
        if self.trace_id.is_some() {
            names.push(keys::TRACE_ID.to_string());
        }
        if self.span_id.is_some() {
            names.push(keys::SPAN_ID.to_string());
        }
        names.extend(self.fields.keys().cloned());
        names
    }

    fn property(&self, name: &str) -> Option<PropertyValue> {
        match name {
            keys::LEVEL => Some(PropertyValue::Text(self.level.as_str().to_string())),
            keys::MESSAGE => Some(PropertyValue::Text(self.identifier.message.clone())),
            keys::TRACE_ID => self
                .trace_id
                .as_ref()
                .map(|id| PropertyValue::Text(id.clone())),
            keys::SPAN_ID => self
                .span_id
                .as_ref()
                .map(|id| PropertyValue::Text(id.clone())),
            other => self.fields.get(other).cloned(),
        }
    }
}

/// An arbitrary JSON payload addressed through dotted property paths.
///
/// `property("Order.Id")` walks the JSON body one key per dot and converts
/// the scalar it lands on. Paths that miss, or that land on an array or
/// object, yield `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueRecord {
    identifier: EventIdentifier,
    body: Value,
}

impl ValueRecord {
    pub fn new(identifier: EventIdentifier, body: Value) -> Self {
        Self { identifier, body }
    }

    pub fn body(&self) -> &Value {
        &self.body
    }
}

impl TraceData for ValueRecord {
    fn identifier(&self) -> &EventIdentifier {
        &self.identifier
    }

    /// Top-level keys of the body object. Nested paths are reachable through
    /// [`TraceData::property`] but not enumerated here.
    fn property_names(&self) -> Vec<String> {
        match &self.body {
            Value::Object(map) => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    fn property(&self, name: &str) -> Option<PropertyValue> {
        let mut current = &self.body;
        for part in name.split('.') {
            current = current.get(part)?;
        }
        PropertyValue::from_json(current)
    }
}

/// The mutable record bag behind pooled events.
///
/// Reset and refilled on every lease; see [`crate::event::RecordPool`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventRecord {
    identifier: EventIdentifier,
    properties: BTreeMap<String, PropertyValue>,
}

impl EventRecord {
    pub fn new(identifier: EventIdentifier) -> Self {
        Self {
            identifier,
            properties: BTreeMap::new(),
        }
    }

    pub fn set_identifier(&mut self, identifier: EventIdentifier) {
        self.identifier = identifier;
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties.insert(name.into(), value.into());
    }

    /// Clear all state so the record can be leased again.
    pub(crate) fn reset(&mut self) {
        self.identifier = EventIdentifier::default();
        self.properties.clear();
    }
}

impl TraceData for EventRecord {
    fn identifier(&self) -> &EventIdentifier {
        &self.identifier
    }

    fn property_names(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    fn property(&self, name: &str) -> Option<PropertyValue> {
        self.properties.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_span_record_properties() {
        let span = SpanRecord::start("checkout", "ProcessOrder", "trace-1", "span-1")
            .with_attribute("OrderId", 42);

        assert_eq!(span.identifier().source, SOURCE_SPAN);
        assert_eq!(span.identifier().scope, "checkout");
        assert_eq!(span.name(), "ProcessOrder");
        assert!(span.is_root());

        assert_eq!(
            span.property(keys::TRACE_ID),
            Some(PropertyValue::Text("trace-1".into()))
        );
        assert_eq!(
            span.property(keys::SPAN_PHASE),
            Some(PropertyValue::Text("Start".into()))
        );
        assert_eq!(span.property("OrderId"), Some(PropertyValue::Int(42)));
        assert_eq!(span.property(keys::PARENT_SPAN_ID), None);
        assert_eq!(span.property("Missing"), None);
    }

    #[test]
    fn test_span_record_parent() {
        let child = SpanRecord::stop("checkout", "ChargeCard", "trace-1", "span-2")
            .with_parent("span-1");

        assert!(!child.is_root());
        assert_eq!(child.parent_span_id(), Some("span-1"));
        assert_eq!(
            child.property(keys::PARENT_SPAN_ID),
            Some(PropertyValue::Text("span-1".into()))
        );
        assert!(child
            .property_names()
            .contains(&keys::PARENT_SPAN_ID.to_string()));
    }

    #[test]
    fn test_log_record_properties() {
        let span = SpanRecord::start("checkout", "ProcessOrder", "trace-1", "span-1");
        let log = LogRecord::new("checkout", LogLevel::Warn, "retrying payment")
            .with_field("Attempt", 2)
            .in_span(&span);

        assert_eq!(log.identifier().source, SOURCE_LOG);
        assert_eq!(log.message(), "retrying payment");
        assert_eq!(
            log.property(keys::LEVEL),
            Some(PropertyValue::Text("Warn".into()))
        );
        assert_eq!(
            log.property(keys::TRACE_ID),
            Some(PropertyValue::Text("trace-1".into()))
        );
        assert_eq!(log.property("Attempt"), Some(PropertyValue::Int(2)));
    }

    #[test]
    fn test_log_record_without_correlation() {
        let log = LogRecord::new("billing", LogLevel::Info, "started");
        assert_eq!(log.property(keys::TRACE_ID), None);
        assert_eq!(log.property(keys::SPAN_ID), None);
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Error > LogLevel::Warn);
        assert!(LogLevel::Trace < LogLevel::Debug);
    }

    #[test]
    fn test_value_record_nested_paths() {
        let record = ValueRecord::new(
            EventIdentifier::new("metrics", "orders", "OrderPlaced"),
            json!({
                "Order": {
                    "Id": "order-9",
                    "Total": 99.5
                },
                "Accepted": true
            }),
        );

        assert_eq!(
            record.property("Order.Id"),
            Some(PropertyValue::Text("order-9".into()))
        );
        assert_eq!(
            record.property("Order.Total"),
            Some(PropertyValue::Float(99.5))
        );
        assert_eq!(record.property("Accepted"), Some(PropertyValue::Bool(true)));
        assert_eq!(record.property("Order.Missing"), None);
        // A path landing on an object has no scalar form.
        assert_eq!(record.property("Order"), None);

        let mut names = record.property_names();
        names.sort();
        assert_eq!(names, vec!["Accepted", "Order"]);
    }

    #[test]
    fn test_event_record_reset() {
        let mut record = EventRecord::new(EventIdentifier::new("a", "b", "c"));
        record.set_property("Key", "value");
        assert_eq!(record.property("Key"), Some(PropertyValue::Text("value".into())));

        record.reset();
        assert_eq!(record.property("Key"), None);
        assert!(record.identifier().is_wildcard());
    }
}
