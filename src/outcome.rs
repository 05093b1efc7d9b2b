//! The tri-state verdict shared by conditions, pattern steps, and branches.

/// Result of offering an event to a condition or pattern step, and the
/// final state of a branch.
///
/// `Pending` carries no verdict: the condition did not bite on this event,
/// or the step still needs more events. `Successful` and `Failed` are the
/// two complete states. Once a step or branch reports a complete outcome it
/// never changes again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// No verdict yet; keep watching the stream.
    #[default]
    Pending,
    /// The expectation was met.
    Successful,
    /// The expectation can no longer be met.
    Failed,
}

impl Outcome {
    /// Whether this outcome is a final verdict.
    pub fn is_complete(self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn is_pending(self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn is_successful(self) -> bool {
        matches!(self, Self::Successful)
    }

    pub fn is_failed(self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Lift a yes/no answer into the tri-state: `true` succeeds, `false`
    /// stays pending. Plain predicates cannot fail a branch.
    pub(crate) fn from_match(matched: bool) -> Self {
        if matched {
            Self::Successful
        } else {
            Self::Pending
        }
    }
}
