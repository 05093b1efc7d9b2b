//! Trace events and the data model behind them.
//!
//! Everything a pattern can observe about an event goes through the
//! [`TraceData`] interface: an [`EventIdentifier`] naming its origin and a
//! flat bag of named scalar [`PropertyValue`]s. The [`TraceEvent`] enum
//! closes the set of record kinds the engine dispatches, so evaluation is
//! a static match rather than a trait-object downcast at the hot edge.

pub mod data;
pub mod identifier;
pub mod pool;
pub mod value;

pub use data::{
    keys, EventRecord, LogLevel, LogRecord, SpanPhase, SpanRecord, ValueRecord, SOURCE_LOG,
    SOURCE_SPAN,
};
pub use identifier::EventIdentifier;
pub use pool::{PooledEvent, RecordPool, DEFAULT_POOL_CAPACITY};
pub use value::{PropertyValue, ValueComparer};

use std::sync::Arc;

/// Read access to an event's identity and properties.
///
/// Property lookup is by name and returns an owned scalar; a missing
/// property and a property with no scalar representation are both `None`.
pub trait TraceData: Send + Sync {
    /// The identifier naming this event's origin.
    fn identifier(&self) -> &EventIdentifier;

    /// Names of the properties this event carries.
    fn property_names(&self) -> Vec<String>;

    /// Look up one property by name.
    fn property(&self, name: &str) -> Option<PropertyValue>;
}

/// One event in a trace stream.
///
/// Immutable record kinds travel behind `Arc`, so cloning an event for a
/// record sink or a forked branch never copies the payload. The `Pooled`
/// variant carries its own reference-counted lease; cloning it retains the
/// pooled record.
#[derive(Debug, Clone)]
pub enum TraceEvent {
    Span(Arc<SpanRecord>),
    Log(Arc<LogRecord>),
    Value(Arc<ValueRecord>),
    Pooled(PooledEvent),
}

impl TraceEvent {
    /// The event's data interface, independent of kind.
    pub fn data(&self) -> &dyn TraceData {
        match self {
            Self::Span(record) => record.as_ref(),
            Self::Log(record) => record.as_ref(),
            Self::Value(record) => record.as_ref(),
            Self::Pooled(event) => event,
        }
    }

    pub fn identifier(&self) -> &EventIdentifier {
        self.data().identifier()
    }

    pub fn property(&self, name: &str) -> Option<PropertyValue> {
        self.data().property(name)
    }

    pub fn property_names(&self) -> Vec<String> {
        self.data().property_names()
    }

    /// The trace this event belongs to, when it carries one.
    pub fn trace_id(&self) -> Option<String> {
        match self.property(keys::TRACE_ID)? {
            PropertyValue::Text(id) => Some(id),
            other => Some(other.to_string()),
        }
    }

    /// The span this event belongs to, when it carries one.
    pub fn span_id(&self) -> Option<String> {
        match self.property(keys::SPAN_ID)? {
            PropertyValue::Text(id) => Some(id),
            other => Some(other.to_string()),
        }
    }

    pub fn as_span(&self) -> Option<&SpanRecord> {
        match self {
            Self::Span(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_log(&self) -> Option<&LogRecord> {
        match self {
            Self::Log(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&ValueRecord> {
        match self {
            Self::Value(record) => Some(record),
            _ => None,
        }
    }
}

impl From<SpanRecord> for TraceEvent {
    fn from(record: SpanRecord) -> Self {
        Self::Span(Arc::new(record))
    }
}

impl From<LogRecord> for TraceEvent {
    fn from(record: LogRecord) -> Self {
        Self::Log(Arc::new(record))
    }
}

impl From<ValueRecord> for TraceEvent {
    fn from(record: ValueRecord) -> Self {
        Self::Value(Arc::new(record))
    }
}

impl From<PooledEvent> for TraceEvent {
    fn from(event: PooledEvent) -> Self {
        Self::Pooled(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_accessors() {
        let event = TraceEvent::from(SpanRecord::start("checkout", "Op", "t-1", "s-1"));
        assert!(event.as_span().is_some());
        assert!(event.as_log().is_none());
        assert_eq!(event.identifier().scope, "checkout");
    }

    #[test]
    fn test_correlation_helpers() {
        let span = TraceEvent::from(SpanRecord::start("checkout", "Op", "t-1", "s-1"));
        assert_eq!(span.trace_id(), Some("t-1".to_string()));
        assert_eq!(span.span_id(), Some("s-1".to_string()));

        let log = TraceEvent::from(LogRecord::new("checkout", LogLevel::Info, "hi"));
        assert_eq!(log.trace_id(), None);
    }

    #[test]
    fn test_pooled_event_through_enum() {
        let pool = RecordPool::new();
        let leased = pool.acquire(EventIdentifier::new("span", "scope", "msg"));
        leased.set_property(keys::TRACE_ID, "t-9");

        let event = TraceEvent::from(leased);
        assert_eq!(event.trace_id(), Some("t-9".to_string()));

        // The enum clone retains the lease.
        let clone = event.clone();
        drop(event);
        assert_eq!(clone.property(keys::TRACE_ID), Some(PropertyValue::Text("t-9".into())));
    }

    #[test]
    fn test_clone_shares_payload() {
        let event = TraceEvent::from(SpanRecord::start("s", "Op", "t", "sp"));
        let clone = event.clone();
        let (TraceEvent::Span(a), TraceEvent::Span(b)) = (&event, &clone) else {
            panic!("expected span events");
        };
        assert!(Arc::ptr_eq(a, b));
    }
}
