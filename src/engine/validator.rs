//! Pattern registration and event fan-out.

use crate::config::ValidatorConfig;
use crate::engine::path::ValidatorPath;
use crate::error::Result;
use crate::event::TraceEvent;
use crate::pattern::program::PatternProgram;
use crate::pattern::Pattern;
use crate::state::GlobalState;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Shared interior of a validator. Paths keep a weak reference back so a
/// disposed path can remove itself.
pub(crate) struct ValidatorCore {
    paths: RwLock<Arc<Vec<Arc<ValidatorPath>>>>,
    config: ValidatorConfig,
    next_path: AtomicU64,
}

impl ValidatorCore {
    pub(crate) fn remove_path(&self, id: u64) {
        let mut paths = self.paths.write().unwrap_or_else(PoisonError::into_inner);
        let remaining: Vec<_> = paths
            .iter()
            .filter(|path| path.id() != id)
            .cloned()
            .collect();
        *paths = Arc::new(remaining);
    }

    fn push_path(&self, path: Arc<ValidatorPath>) {
        let mut paths = self.paths.write().unwrap_or_else(PoisonError::into_inner);
        let mut grown = Vec::with_capacity(paths.len() + 1);
        grown.extend(paths.iter().cloned());
        grown.push(path);
        *paths = Arc::new(grown);
    }

    fn snapshot(&self) -> Arc<Vec<Arc<ValidatorPath>>> {
        self.paths
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Registers patterns and fans incoming trace events out to their paths.
///
/// Cloning a validator is cheap and shares the registered paths, so a test
/// can hand one clone to the event producer and keep another for queries.
#[derive(Clone)]
pub struct Validator {
    core: Arc<ValidatorCore>,
}

impl Validator {
    pub fn new() -> Self {
        Self::with_config(ValidatorConfig::default())
    }

    pub fn with_config(config: ValidatorConfig) -> Self {
        Self {
            core: Arc::new(ValidatorCore {
                paths: RwLock::new(Arc::new(Vec::new())),
                config,
                next_path: AtomicU64::new(0),
            }),
        }
    }

    /// Compile `pattern` and start validating it.
    ///
    /// Structural problems in the pattern are reported here, before any
    /// event is dispatched.
    pub fn add(&self, pattern: Pattern) -> Result<Arc<ValidatorPath>> {
        self.add_with_state(pattern, GlobalState::new())
    }

    /// [`Validator::add`] with pre-seeded global state, for patterns whose
    /// conditions consult values known before the run starts.
    pub fn add_with_state(
        &self,
        pattern: Pattern,
        globals: GlobalState,
    ) -> Result<Arc<ValidatorPath>> {
        let program = PatternProgram::compile(pattern)?;
        let id = self.core.next_path.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(path = id, steps = program.len(), "pattern registered");
        let path = ValidatorPath::new(
            id,
            program,
            globals,
            self.core.config.clone(),
            Arc::downgrade(&self.core),
        );
        self.core.push_path(Arc::clone(&path));
        Ok(path)
    }

    /// Dispatch one event to every registered path.
    ///
    /// `public` marks events on the system's announced surface; conditions
    /// can require it via [`crate::condition::is_public`].
    pub fn on_trace(&self, public: bool, event: &TraceEvent) {
        let paths = self.core.snapshot();
        for path in paths.iter() {
            path.on_trace(public, event);
        }
    }

    pub fn path_count(&self) -> usize {
        self.core.snapshot().len()
    }

    /// Handles to every registered path.
    pub fn paths(&self) -> Vec<Arc<ValidatorPath>> {
        self.core.snapshot().as_ref().clone()
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("paths", &self.path_count())
            .finish()
    }
}
