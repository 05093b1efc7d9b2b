//! A reference-counted pool of reusable event records.
//!
//! High-volume producers can lease an [`EventRecord`] from a [`RecordPool`],
//! fill it, and dispatch it without allocating per event. A lease is
//! represented by a [`PooledEvent`] handle: cloning the handle retains the
//! underlying record, dropping it releases one reference, and when the last
//! reference drops the record is cleared and returned to the pool's free
//! list. A record sink or finished-branch snapshot that still holds a clone
//! therefore keeps the record alive and out of circulation.

use super::data::EventRecord;
use super::identifier::EventIdentifier;
use super::value::PropertyValue;
use super::TraceData;
use std::fmt;
use std::sync::atomic::{fence, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

/// Free-list bound used by [`RecordPool::new`].
pub const DEFAULT_POOL_CAPACITY: usize = 128;

/// A bounded pool of reusable event records.
///
/// Cloning the pool is cheap and yields another handle to the same free
/// list. Records leased while the pool has no free slot are freshly
/// allocated; releases beyond the capacity bound simply drop the record.
#[derive(Clone)]
pub struct RecordPool {
    shared: Arc<PoolShared>,
}

struct PoolShared {
    free: Mutex<Vec<Arc<PoolSlot>>>,
    max_pooled: usize,
}

struct PoolSlot {
    refs: AtomicU32,
    record: RwLock<EventRecord>,
    pool: Weak<PoolShared>,
}

impl RecordPool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_POOL_CAPACITY)
    }

    /// A pool retaining at most `max_pooled` free records.
    pub fn with_capacity(max_pooled: usize) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                free: Mutex::new(Vec::new()),
                max_pooled,
            }),
        }
    }

    /// Lease a record, reusing a pooled one when available.
    ///
    /// The returned handle starts with a reference count of one.
    pub fn acquire(&self, identifier: EventIdentifier) -> PooledEvent {
        let slot = {
            let mut free = self
                .shared
                .free
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            free.pop()
        };
        let slot = slot.unwrap_or_else(|| {
            Arc::new(PoolSlot {
                refs: AtomicU32::new(0),
                record: RwLock::new(EventRecord::default()),
                pool: Arc::downgrade(&self.shared),
            })
        });

        // The slot is not visible to any other handle here.
        slot.refs.store(1, Ordering::Relaxed);
        {
            let mut record = slot
                .record
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            record.set_identifier(identifier.clone());
        }

        PooledEvent {
            identifier: Arc::new(identifier),
            slot,
        }
    }

    /// Lease a record and fill its properties in one step.
    pub fn acquire_with(
        &self,
        identifier: EventIdentifier,
        properties: impl IntoIterator<Item = (String, PropertyValue)>,
    ) -> PooledEvent {
        let event = self.acquire(identifier);
        for (name, value) in properties {
            event.set_property(name, value);
        }
        event
    }

    /// Number of records currently waiting on the free list.
    pub fn free_count(&self) -> usize {
        self.shared
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for RecordPool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecordPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordPool")
            .field("free", &self.free_count())
            .field("max_pooled", &self.shared.max_pooled)
            .finish()
    }
}

/// A counted lease on a pooled event record.
///
/// Clone to retain; drop to release. The record returns to its pool only
/// when the last handle drops, so holding a clone (in a record sink, for
/// example) pins the data for later inspection.
pub struct PooledEvent {
    slot: Arc<PoolSlot>,
    identifier: Arc<EventIdentifier>,
}

impl PooledEvent {
    /// Current reference count, mainly useful in tests.
    pub fn ref_count(&self) -> u32 {
        self.slot.refs.load(Ordering::Acquire)
    }

    /// Set a property on the leased record.
    ///
    /// Producers fill the record between leasing and dispatching it;
    /// mutation after dispatch is visible to every holder of the lease.
    pub fn set_property(&self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        self.slot
            .record
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set_property(name, value);
    }
}

impl Clone for PooledEvent {
    fn clone(&self) -> Self {
        self.slot.refs.fetch_add(1, Ordering::Relaxed);
        Self {
            slot: Arc::clone(&self.slot),
            identifier: Arc::clone(&self.identifier),
        }
    }
}

impl Drop for PooledEvent {
    fn drop(&mut self) {
        if self.slot.refs.fetch_sub(1, Ordering::Release) != 1 {
            return;
        }
        fence(Ordering::Acquire);

        // Last reference: clear the record and hand the slot back, unless
        // the pool itself is gone or already full.
        let Some(pool) = self.slot.pool.upgrade() else {
            return;
        };
        {
            let mut record = self
                .slot
                .record
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            record.reset();
        }
        let mut free = pool.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < pool.max_pooled {
            free.push(Arc::clone(&self.slot));
        }
    }
}

impl TraceData for PooledEvent {
    fn identifier(&self) -> &EventIdentifier {
        &self.identifier
    }

    fn property_names(&self) -> Vec<String> {
        self.slot
            .record
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .property_names()
    }

    fn property(&self, name: &str) -> Option<PropertyValue> {
        self.slot
            .record
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .property(name)
    }
}

impl fmt::Debug for PooledEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledEvent")
            .field("identifier", &self.identifier)
            .field("refs", &self.ref_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_identifier(message: &str) -> EventIdentifier {
        EventIdentifier::new("span", "pool-test", message)
    }

    #[test]
    fn test_lease_and_release_cycle() {
        let pool = RecordPool::with_capacity(4);
        assert_eq!(pool.free_count(), 0);

        let event = pool.acquire(test_identifier("first"));
        assert_eq!(event.ref_count(), 1);
        assert_eq!(pool.free_count(), 0);

        drop(event);
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn test_clone_retains() {
        let pool = RecordPool::with_capacity(4);
        let event = pool.acquire(test_identifier("first"));
        let retained = event.clone();

        assert_eq!(event.ref_count(), 2);
        drop(event);
        // One handle still alive: nothing returned yet.
        assert_eq!(pool.free_count(), 0);
        assert_eq!(retained.ref_count(), 1);
        assert_eq!(retained.identifier().message, "first");

        drop(retained);
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn test_record_reset_between_leases() {
        let pool = RecordPool::with_capacity(4);
        let first = pool.acquire(test_identifier("first"));
        first.set_property("OrderId", 42);
        let first_slot = Arc::clone(&first.slot);
        drop(first);

        let second = pool.acquire(test_identifier("second"));
        // Same underlying slot, fully reset.
        assert!(Arc::ptr_eq(&first_slot, &second.slot));
        assert_eq!(second.property("OrderId"), None);
        assert_eq!(second.identifier().message, "second");
    }

    #[test]
    fn test_capacity_bound() {
        let pool = RecordPool::with_capacity(1);
        let a = pool.acquire(test_identifier("a"));
        let b = pool.acquire(test_identifier("b"));
        drop(a);
        drop(b);
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn test_handle_outlives_pool() {
        let pool = RecordPool::with_capacity(2);
        let event = pool.acquire(test_identifier("survivor"));
        event.set_property("Key", "value");
        drop(pool);

        assert_eq!(
            event.property("Key"),
            Some(PropertyValue::Text("value".into()))
        );
        // Release with the pool gone simply frees the record.
        drop(event);
    }

    #[test]
    fn test_properties_visible_to_clones() {
        let pool = RecordPool::new();
        let event = pool.acquire(test_identifier("shared"));
        let clone = event.clone();
        event.set_property("Seen", true);
        assert_eq!(clone.property("Seen"), Some(PropertyValue::Bool(true)));
    }
}
