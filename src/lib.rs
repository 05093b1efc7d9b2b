//! # Tracexpect
//!
//! Temporal pattern assertions over instrumentation event streams for
//! integration tests.
//!
//! A test declares the shape of the events a system should emit: ordered
//! runs, unordered sets, and groups keyed by a correlation value, a span,
//! or a whole trace. The pattern is registered with a [`Validator`], the
//! system's trace events are fed in, and the test waits for a verdict.
//! Verdicts are tri-state: a branch stays pending until enough evidence
//! arrives, and a completed verdict never changes.
//!
//! ## Quick Start
//!
//! ### Ordered expectations
//!
//! ```rust,ignore
//! use tracexpect::{condition, pattern, Validator};
//!
//! let validator = Validator::new();
//! let path = validator.add(pattern::sequence(vec![
//!     pattern::match_event(condition::message_is("job claimed")),
//!     pattern::match_event(condition::message_is("job finished")),
//! ]))?;
//!
//! // Wire `validator.on_trace(..)` into the system's instrumentation,
//! // run the workload, then wait for the verdict.
//! let finished = path
//!     .get_finished_async(|branch| branch.is_successful(), None)
//!     .await;
//! assert!(finished.is_some());
//! # Ok::<(), tracexpect::TracexpectError>(())
//! ```
//!
//! ### Grouped expectations
//!
//! ```rust,ignore
//! use tracexpect::{condition, pattern, Validator};
//!
//! // Every claimed job must finish. Each distinct JobId value claims its
//! // own branch; unmatched values keep a fresh branch waiting.
//! let per_job = pattern::group_by("JobId")
//!     .inner(pattern::sequence(vec![
//!         pattern::match_event(condition::message_is("claimed")),
//!         pattern::match_event(condition::message_is("finished")),
//!     ]))
//!     .build();
//!
//! let validator = Validator::new();
//! let path = validator.add(per_job)?;
//! # Ok::<(), tracexpect::TracexpectError>(())
//! ```
//!
//! ### Publishing events
//!
//! ```rust,ignore
//! use tracexpect::{LogLevel, LogRecord, TraceEvent, ValidatorRegistry};
//!
//! // Producers publish through a registry; a panicking validator is
//! // isolated from the producing side.
//! let registry = ValidatorRegistry::new();
//! let _registration = registry.register(validator);
//!
//! let event = TraceEvent::from(
//!     LogRecord::new("worker", LogLevel::Info, "claimed").with_field("JobId", 7),
//! );
//! registry.publish(true, &event);
//! ```

pub mod condition;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod outcome;
pub mod pattern;
pub mod registry;
pub mod state;

// Validator surface
pub use engine::{CallbackGuard, FinishedBranch, Validator, ValidatorPath};
pub use registry::{RegistrationGuard, ValidatorRegistry};

// Core types and errors
pub use config::ValidatorConfig;
pub use error::{Result, TracexpectError};
pub use outcome::Outcome;

// Event data model
pub use event::{
    EventIdentifier, LogLevel, LogRecord, PooledEvent, PropertyValue, RecordPool, SpanPhase,
    SpanRecord, TraceData, TraceEvent, ValueRecord,
};

// Pattern building blocks
pub use condition::Condition;
pub use pattern::{GroupByBuilder, PartialRecord, Pattern, RecordSink};

// Branch state visible through queries
pub use state::{EventScope, ExecutionState, ForkState, GlobalState};
