//! Per-step evaluation memos.
//!
//! Each branch keeps one memo per compiled step, indexed by the step's id.
//! The memo is a tagged union over the step kinds, so evaluation reads and
//! writes exactly the state its kind defines and the compiler checks the
//! pairing exhaustively.

use crate::event::PropertyValue;
use crate::outcome::Outcome;
use crate::pattern::PatternKind;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NodeMemo {
    Match { matched: bool, result: Outcome },
    Sequence { cursor: usize, result: Outcome },
    Filter { result: Outcome },
    AllOf { result: Outcome },
    OneOf { result: Outcome },
    Data { cursor: usize, result: Outcome },
    Group { binding: Option<GroupBinding>, result: Outcome },
    Record { result: Outcome },
}

/// The correlation a grouping step has claimed, with the trace and span
/// ids that came with the claiming event when it carried them.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GroupBinding {
    pub value: PropertyValue,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
}

impl NodeMemo {
    /// The initial memo for a step of the given kind.
    pub fn for_kind(kind: &PatternKind) -> Self {
        match kind {
            PatternKind::Match { .. } => Self::Match {
                matched: false,
                result: Outcome::Pending,
            },
            PatternKind::Sequence => Self::Sequence {
                cursor: 0,
                result: Outcome::Pending,
            },
            PatternKind::Filter { .. } => Self::Filter {
                result: Outcome::Pending,
            },
            PatternKind::AllOf => Self::AllOf {
                result: Outcome::Pending,
            },
            PatternKind::OneOf => Self::OneOf {
                result: Outcome::Pending,
            },
            PatternKind::Data { .. } => Self::Data {
                cursor: 0,
                result: Outcome::Pending,
            },
            PatternKind::GroupBy { .. }
            | PatternKind::GroupBySpan { .. }
            | PatternKind::GroupByTrace { .. } => Self::Group {
                binding: None,
                result: Outcome::Pending,
            },
            PatternKind::Record { .. } => Self::Record {
                result: Outcome::Pending,
            },
        }
    }

    pub fn result(&self) -> Outcome {
        match self {
            Self::Match { result, .. }
            | Self::Sequence { result, .. }
            | Self::Filter { result }
            | Self::AllOf { result }
            | Self::OneOf { result }
            | Self::Data { result, .. }
            | Self::Group { result, .. }
            | Self::Record { result } => *result,
        }
    }

    pub fn set_result(&mut self, outcome: Outcome) {
        match self {
            Self::Match { result, .. }
            | Self::Sequence { result, .. }
            | Self::Filter { result }
            | Self::AllOf { result }
            | Self::OneOf { result }
            | Self::Data { result, .. }
            | Self::Group { result, .. }
            | Self::Record { result } => *result = outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::always;
    use crate::pattern::match_event;

    #[test]
    fn test_initial_memo_shapes() {
        let pattern = match_event(always());
        let memo = NodeMemo::for_kind(&pattern.kind);
        assert_eq!(
            memo,
            NodeMemo::Match {
                matched: false,
                result: Outcome::Pending
            }
        );
        assert_eq!(memo.result(), Outcome::Pending);
    }

    #[test]
    fn test_set_result() {
        let mut memo = NodeMemo::Sequence {
            cursor: 2,
            result: Outcome::Pending,
        };
        memo.set_result(Outcome::Successful);
        assert_eq!(memo.result(), Outcome::Successful);
        // Cursor state survives result updates.
        assert_eq!(
            memo,
            NodeMemo::Sequence {
                cursor: 2,
                result: Outcome::Successful
            }
        );
    }
}
