//! The complete evaluation state of one branch.

use super::bags::{ForkState, GlobalState};
use super::memo::NodeMemo;
use crate::outcome::Outcome;
use crate::pattern::program::{PatternProgram, StepId};

/// Everything one branch knows: a memo per pattern step, the accumulated
/// global state, the correlation values it has claimed, and the labels of
/// steps that have succeeded.
///
/// All four parts are persistent structures, so cloning a branch for a
/// fork is a pointer copy and the two copies diverge independently through
/// structural sharing. Query helpers hand out clones of this type as
/// immutable snapshots.
#[derive(Debug, Clone)]
pub struct ExecutionState {
    pub(crate) memos: im::Vector<NodeMemo>,
    pub(crate) globals: GlobalState,
    pub(crate) fork: ForkState,
    pub(crate) succeeded: im::HashSet<String>,
}

impl ExecutionState {
    /// Fresh state for a compiled program, with one initial memo per step.
    pub(crate) fn seed(program: &PatternProgram, globals: GlobalState) -> Self {
        let memos = program
            .nodes()
            .map(|node| NodeMemo::for_kind(&node.kind))
            .collect();
        Self {
            memos,
            globals,
            fork: ForkState::new(),
            succeeded: im::HashSet::new(),
        }
    }

    pub(crate) fn memo(&self, id: StepId) -> &NodeMemo {
        &self.memos[id as usize]
    }

    pub(crate) fn memo_mut(&mut self, id: StepId) -> &mut NodeMemo {
        &mut self.memos[id as usize]
    }

    pub(crate) fn mark_succeeded(&mut self, label: String) {
        self.succeeded.insert(label);
    }

    /// The branch's overall outcome: the root step's result.
    pub fn result(&self) -> Outcome {
        self.memos.get(0).map_or(Outcome::Pending, NodeMemo::result)
    }

    /// Global state accumulated by captures and group bindings.
    pub fn globals(&self) -> &GlobalState {
        &self.globals
    }

    /// Correlation values this branch has claimed.
    pub fn fork_state(&self) -> &ForkState {
        &self.fork
    }

    /// Whether the labeled step has succeeded in this branch.
    pub fn has_succeeded(&self, label: &str) -> bool {
        self.succeeded.contains(label)
    }

    /// Labels of all steps that have succeeded so far.
    pub fn succeeded_labels(&self) -> impl Iterator<Item = &str> {
        self.succeeded.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::always;
    use crate::pattern::{match_event, sequence};

    fn seeded() -> ExecutionState {
        let program =
            PatternProgram::compile(sequence([match_event(always()), match_event(always())]))
                .unwrap();
        ExecutionState::seed(&program, GlobalState::new())
    }

    #[test]
    fn test_seed_creates_memo_per_step() {
        let state = seeded();
        assert_eq!(state.memos.len(), 3);
        assert_eq!(state.result(), Outcome::Pending);
    }

    #[test]
    fn test_clone_isolates_memos() {
        let original = seeded();
        let mut forked = original.clone();

        forked.memo_mut(1).set_result(Outcome::Successful);
        forked.mark_succeeded("step".to_string());

        assert_eq!(original.memo(1).result(), Outcome::Pending);
        assert!(!original.has_succeeded("step"));
        assert!(forked.has_succeeded("step"));
    }

    #[test]
    fn test_succeeded_labels_iteration() {
        let mut state = seeded();
        state.mark_succeeded("armed".to_string());
        let labels: Vec<&str> = state.succeeded_labels().collect();
        assert_eq!(labels, vec!["armed"]);
    }
}
