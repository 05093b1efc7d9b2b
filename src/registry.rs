//! Process-wide fan-out from event producers to validators.
//!
//! Instrumentation shims publish through a registry so producers need no
//! knowledge of which tests are listening. A panic escaping a validator
//! (a user predicate, usually) is caught and reported; it never takes the
//! producing side down and never blocks delivery to other validators.

use crate::engine::Validator;
use crate::event::TraceEvent;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

struct RegistryInner {
    validators: RwLock<Arc<Vec<(u64, Validator)>>>,
    next_id: AtomicU64,
}

impl RegistryInner {
    fn remove(&self, id: u64) {
        let mut validators = self
            .validators
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let remaining: Vec<_> = validators
            .iter()
            .filter(|(existing, _)| *existing != id)
            .cloned()
            .collect();
        *validators = Arc::new(remaining);
    }
}

/// Fan-out point between event producers and validators.
///
/// Cloning shares the registration set, so a test harness can hand one
/// clone to its instrumentation layer and register validators on another.
#[derive(Clone)]
pub struct ValidatorRegistry {
    inner: Arc<RegistryInner>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                validators: RwLock::new(Arc::new(Vec::new())),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Register a validator. It receives every event published after this
    /// call until the returned guard drops.
    pub fn register(&self, validator: Validator) -> RegistrationGuard {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut validators = self
                .inner
                .validators
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let mut grown = Vec::with_capacity(validators.len() + 1);
            grown.extend(validators.iter().cloned());
            grown.push((id, validator));
            *validators = Arc::new(grown);
        }
        tracing::debug!(validator = id, "validator registered");
        RegistrationGuard {
            registry: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Publish one event to every registered validator.
    ///
    /// A panic inside one validator is caught and logged; delivery to the
    /// remaining validators continues.
    pub fn publish(&self, public: bool, event: &TraceEvent) {
        let validators = self
            .inner
            .validators
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for (id, validator) in validators.iter() {
            let outcome = catch_unwind(AssertUnwindSafe(|| validator.on_trace(public, event)));
            if let Err(payload) = outcome {
                tracing::error!(
                    validator = *id,
                    panic = panic_message(payload.as_ref()),
                    "validator panicked during dispatch"
                );
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .validators
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ValidatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorRegistry")
            .field("validators", &self.len())
            .finish()
    }
}

/// Deregisters its validator when dropped.
#[must_use = "the validator is deregistered as soon as the guard drops"]
pub struct RegistrationGuard {
    registry: Weak<RegistryInner>,
    id: u64,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl fmt::Debug for RegistrationGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationGuard")
            .field("id", &self.id)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition;
    use crate::event::{LogLevel, LogRecord};
    use crate::pattern;

    fn log(message: &str) -> TraceEvent {
        TraceEvent::from(LogRecord::new("svc", LogLevel::Info, message))
    }

    #[test]
    fn test_publish_reaches_registered_validator() {
        let registry = ValidatorRegistry::new();
        let validator = Validator::new();
        let path = validator
            .add(pattern::match_event(condition::message_is("ping")))
            .unwrap();

        let guard = registry.register(validator);
        registry.publish(true, &log("ping"));

        assert!(path.get_successful().is_some());
        drop(guard);
    }

    #[test]
    fn test_dropped_guard_stops_delivery() {
        let registry = ValidatorRegistry::new();
        let validator = Validator::new();
        let path = validator
            .add(pattern::match_event(condition::message_is("ping")))
            .unwrap();

        let guard = registry.register(validator);
        drop(guard);
        assert!(registry.is_empty());

        registry.publish(true, &log("ping"));
        assert!(path.get_successful().is_none());
    }

    #[test]
    fn test_panicking_validator_does_not_block_others() {
        let registry = ValidatorRegistry::new();

        let poisoned = Validator::new();
        poisoned
            .add(pattern::match_event(condition::predicate(|_, _| {
                panic!("user predicate exploded")
            })))
            .unwrap();

        let healthy = Validator::new();
        let path = healthy
            .add(pattern::match_event(condition::message_is("ping")))
            .unwrap();

        let _first = registry.register(poisoned);
        let _second = registry.register(healthy);

        registry.publish(true, &log("ping"));
        assert!(path.get_successful().is_some());
    }

    #[test]
    fn test_publish_without_registrations_is_a_noop() {
        let registry = ValidatorRegistry::new();
        registry.publish(true, &log("ping"));
        assert!(registry.is_empty());
    }
}
