//! One registered pattern and the branch collection executing it.
//!
//! A path starts with a single branch. Dispatching an event walks every
//! running branch independently; grouping steps fork new branches, and
//! branches reaching a verdict move to the finished list. The branch
//! collection is read through an `Arc` snapshot and every branch guards
//! its state behind its own mutex, so queries run concurrently with
//! dispatch. Dispatch passes themselves are serialized per path, which
//! keeps fork spawning deterministic: a branch forked while processing one
//! event sees the stream starting at the next event.

use crate::config::ValidatorConfig;
use crate::engine::eval::{evaluate, EvalContext, ForkProbe};
use crate::event::{PropertyValue, TraceEvent};
use crate::outcome::Outcome;
use crate::pattern::program::PatternProgram;
use crate::state::{ExecutionState, ForkState, GlobalState};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::sync::Notify;

use super::validator::ValidatorCore;

/// A branch that reached a final verdict, frozen at the moment of
/// completion.
#[derive(Debug, Clone)]
pub struct FinishedBranch {
    result: Outcome,
    state: ExecutionState,
}

impl FinishedBranch {
    /// The verdict this branch finished with.
    pub fn result(&self) -> Outcome {
        self.result
    }

    pub fn is_successful(&self) -> bool {
        self.result.is_successful()
    }

    /// The branch state at completion: memos, globals, and bindings.
    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    pub fn globals(&self) -> &GlobalState {
        self.state.globals()
    }

    pub fn has_succeeded(&self, label: &str) -> bool {
        self.state.has_succeeded(label)
    }
}

/// One running branch: its execution state plus a lock-free-readable copy
/// of its correlation bindings for sibling dedupe scans.
struct BranchCell {
    id: u64,
    state: Mutex<ExecutionState>,
    /// Refreshed after every dispatch into the branch; probed by sibling
    /// branches without touching the state lock.
    fork_mirror: Mutex<ForkState>,
}

impl BranchCell {
    fn with_state(id: u64, state: ExecutionState) -> Arc<Self> {
        let mirror = state.fork_state().clone();
        Arc::new(Self {
            id,
            state: Mutex::new(state),
            fork_mirror: Mutex::new(mirror),
        })
    }
}

/// Probe over the branch snapshot of the current dispatch pass, excluding
/// the branch being evaluated.
struct SnapshotProbe<'a> {
    cells: &'a [Arc<BranchCell>],
    current: u64,
}

impl ForkProbe for SnapshotProbe<'_> {
    fn binding_exists(&self, name: &str, value: &PropertyValue) -> bool {
        self.cells.iter().any(|cell| {
            cell.id != self.current
                && cell
                    .fork_mirror
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .contains(name, value)
        })
    }
}

/// The branch collection for one registered pattern.
///
/// Obtained from [`crate::Validator::add`]; used to query running and
/// finished branches, synchronously or with a timeout.
pub struct ValidatorPath {
    id: u64,
    program: PatternProgram,
    config: ValidatorConfig,
    branches: RwLock<Arc<Vec<Arc<BranchCell>>>>,
    finished: Mutex<Vec<Arc<FinishedBranch>>>,
    callbacks: Mutex<Vec<CallbackEntry>>,
    /// Serializes dispatch passes; queries read concurrently.
    dispatch_lock: Mutex<()>,
    completion: Notify,
    next_branch: AtomicU64,
    next_callback: AtomicU64,
    disposed: AtomicBool,
    owner: Weak<ValidatorCore>,
}

struct CallbackEntry {
    id: u64,
    callback: Arc<dyn Fn(&FinishedBranch) + Send + Sync>,
}

impl ValidatorPath {
    pub(crate) fn new(
        id: u64,
        program: PatternProgram,
        globals: GlobalState,
        config: ValidatorConfig,
        owner: Weak<ValidatorCore>,
    ) -> Arc<Self> {
        let root = ExecutionState::seed(&program, globals);
        let cell = BranchCell::with_state(0, root);
        Arc::new(Self {
            id,
            program,
            config,
            branches: RwLock::new(Arc::new(vec![cell])),
            finished: Mutex::new(Vec::new()),
            callbacks: Mutex::new(Vec::new()),
            dispatch_lock: Mutex::new(()),
            completion: Notify::new(),
            next_branch: AtomicU64::new(1),
            next_callback: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
            owner,
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Dispatch one event into every running branch.
    pub(crate) fn on_trace(&self, public: bool, event: &TraceEvent) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        let pass = self
            .dispatch_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let snapshot = self
            .branches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut newly_finished: Vec<Arc<FinishedBranch>> = Vec::new();
        let mut finished_ids: Vec<u64> = Vec::new();
        let mut spawned: HashMap<u64, Vec<Arc<BranchCell>>> = HashMap::new();

        for cell in snapshot.iter() {
            let mut state = cell.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.result().is_complete() {
                continue;
            }

            let probe = SnapshotProbe {
                cells: &snapshot,
                current: cell.id,
            };
            let mut ctx = EvalContext {
                program: &self.program,
                event,
                public,
                exec: &mut state,
                probe: &probe,
                forks: Vec::new(),
            };
            let outcome = evaluate(&mut ctx, self.program.root());
            let forks = ctx.forks;

            // Keep the probe-visible binding view in step with the state
            // before the next branch is evaluated.
            *cell
                .fork_mirror
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = state.fork_state().clone();

            if outcome.is_complete() {
                newly_finished.push(Arc::new(FinishedBranch {
                    result: outcome,
                    state: state.clone(),
                }));
                finished_ids.push(cell.id);
            }
            drop(state);

            if !forks.is_empty() {
                let cells = forks
                    .into_iter()
                    .map(|fork| {
                        let id = self.next_branch.fetch_add(1, Ordering::Relaxed);
                        BranchCell::with_state(id, fork)
                    })
                    .collect();
                spawned.insert(cell.id, cells);
            }
        }

        if newly_finished.is_empty() && spawned.is_empty() {
            return;
        }

        {
            let mut branches = self
                .branches
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            // A dispose landing mid-pass already emptied the collection;
            // installing the rebuilt list would resurrect branches on a
            // disposed path.
            if self.disposed.load(Ordering::Acquire) {
                return;
            }
            let extra: usize = spawned.values().map(Vec::len).sum();
            let mut rebuilt = Vec::with_capacity(branches.len() + extra);
            for cell in branches.iter() {
                if !finished_ids.contains(&cell.id) {
                    rebuilt.push(Arc::clone(cell));
                }
                // Forked branches run adjacent to their origin.
                if let Some(cells) = spawned.remove(&cell.id) {
                    rebuilt.extend(cells);
                }
            }
            for (_, cells) in spawned {
                rebuilt.extend(cells);
            }
            *branches = Arc::new(rebuilt);
        }

        if !newly_finished.is_empty() {
            self.finished
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(newly_finished.iter().cloned());

            let callbacks: Vec<_> = self
                .callbacks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|entry| Arc::clone(&entry.callback))
                .collect();
            // Callbacks run outside every lock, so one may dispatch back
            // into this path.
            drop(pass);
            for branch in &newly_finished {
                for callback in &callbacks {
                    callback(branch);
                }
            }
            tracing::debug!(
                path = self.id,
                finished = newly_finished.len(),
                "branches finished"
            );
            self.completion.notify_waiters();
        }
    }

    /// Number of branches still running.
    pub fn running_count(&self) -> usize {
        self.branches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of branches that reached a verdict.
    pub fn finished_count(&self) -> usize {
        self.finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Snapshot of a running branch on which the labeled step has
    /// succeeded. Branch states are persistent, so the snapshot is a cheap
    /// structural-sharing clone.
    pub fn get_running(&self, label: &str) -> Option<ExecutionState> {
        let snapshot = self
            .branches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for cell in snapshot.iter() {
            let state = cell.state.lock().unwrap_or_else(PoisonError::into_inner);
            if !state.result().is_complete() && state.has_succeeded(label) {
                return Some(state.clone());
            }
        }
        None
    }

    /// Snapshots of every running branch.
    pub fn list_running(&self) -> Vec<ExecutionState> {
        let snapshot = self
            .branches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        snapshot
            .iter()
            .map(|cell| {
                cell.state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone()
            })
            .collect()
    }

    /// First finished branch the predicate accepts.
    pub fn get_finished(
        &self,
        predicate: impl Fn(&FinishedBranch) -> bool,
    ) -> Option<Arc<FinishedBranch>> {
        let finished = self.finished.lock().unwrap_or_else(PoisonError::into_inner);
        for branch in finished.iter() {
            if predicate(branch) {
                return Some(Arc::clone(branch));
            }
        }
        None
    }

    /// Every finished branch, in completion order.
    pub fn list_finished(&self) -> Vec<Arc<FinishedBranch>> {
        self.finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// First finished branch with a successful verdict.
    pub fn get_successful(&self) -> Option<Arc<FinishedBranch>> {
        self.get_finished(|branch| branch.is_successful())
    }

    /// Wait until a running branch carries the labeled success.
    ///
    /// Wakes on completion activity and otherwise polls at the configured
    /// interval. `None` on timeout or disposal; a `timeout` of `None` uses
    /// the configured wait timeout.
    pub async fn get_running_async(
        &self,
        label: &str,
        timeout: Option<Duration>,
    ) -> Option<ExecutionState> {
        let limit = timeout.unwrap_or(self.config.wait_timeout);
        let wait = async {
            loop {
                if let Some(state) = self.get_running(label) {
                    return Some(state);
                }
                if self.disposed.load(Ordering::Acquire) {
                    return None;
                }
                let wake = self.completion.notified();
                tokio::select! {
                    _ = wake => {}
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        };
        tokio::time::timeout(limit, wait).await.ok().flatten()
    }

    /// Wait until a finished branch satisfies the predicate.
    ///
    /// `None` on timeout or disposal; a `timeout` of `None` uses the
    /// configured wait timeout.
    pub async fn get_finished_async(
        &self,
        predicate: impl Fn(&FinishedBranch) -> bool,
        timeout: Option<Duration>,
    ) -> Option<Arc<FinishedBranch>> {
        let limit = timeout.unwrap_or(self.config.wait_timeout);
        let wait = async {
            loop {
                if let Some(branch) = self.get_finished(&predicate) {
                    return Some(branch);
                }
                if self.disposed.load(Ordering::Acquire) {
                    return None;
                }
                let wake = self.completion.notified();
                tokio::select! {
                    _ = wake => {}
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        };
        tokio::time::timeout(limit, wait).await.ok().flatten()
    }

    /// Run `callback` for every branch finishing after this call. The
    /// subscription lives as long as the returned guard.
    pub fn add_finish_callback(
        self: &Arc<Self>,
        callback: impl Fn(&FinishedBranch) + Send + Sync + 'static,
    ) -> CallbackGuard {
        let id = self.next_callback.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(CallbackEntry {
                id,
                callback: Arc::new(callback),
            });
        CallbackGuard {
            path: Arc::downgrade(self),
            id,
        }
    }

    /// Stop this path: drop all running branches, wake every waiter, and
    /// deregister from the owning validator. Finished branches stay
    /// queryable.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        {
            let mut branches = self
                .branches
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            *branches = Arc::new(Vec::new());
        }
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.completion.notify_waiters();
        if let Some(owner) = self.owner.upgrade() {
            owner.remove_path(self.id);
        }
        tracing::debug!(path = self.id, "validator path disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ValidatorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorPath")
            .field("id", &self.id)
            .field("running", &self.running_count())
            .field("finished", &self.finished_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Unsubscribes its finish callback when dropped.
#[must_use = "the callback is removed as soon as the guard drops"]
pub struct CallbackGuard {
    path: Weak<ValidatorPath>,
    id: u64,
}

impl Drop for CallbackGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.upgrade() {
            path.callbacks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|entry| entry.id != self.id);
        }
    }
}

impl fmt::Debug for CallbackGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackGuard").field("id", &self.id).finish()
    }
}
