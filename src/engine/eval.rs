//! Step evaluation for dispatching one event into one branch.
//!
//! A branch is evaluated top-down from the root step. Each step consults its
//! memo slot first: completed steps return their stored verdict without
//! re-evaluating, so a verdict reached once can never be revised by later
//! events. Grouping steps may request sibling branches by pushing cloned
//! states into [`EvalContext::forks`]; the owning path spawns them after the
//! dispatch returns.

use crate::condition::Condition;
use crate::event::{PropertyValue, SpanPhase, TraceEvent, ValueComparer};
use crate::outcome::Outcome;
use crate::pattern::program::{PatternProgram, ProgramNode, StepId};
use crate::pattern::{PartialRecord, PatternKind, RecordSink};
use crate::state::memo::{GroupBinding, NodeMemo};
use crate::state::{EventScope, ExecutionState};
use std::sync::Arc;

/// Visibility into sibling branches during a dispatch pass.
///
/// Grouping steps ask the probe whether a correlation value is already
/// followed by another branch before binding it themselves.
pub(crate) trait ForkProbe {
    fn binding_exists(&self, name: &str, value: &PropertyValue) -> bool;
}

/// Probe that never reports a claimed binding. Used for single-branch
/// evaluation in tests.
#[cfg(test)]
pub(crate) struct NoSiblings;

#[cfg(test)]
impl ForkProbe for NoSiblings {
    fn binding_exists(&self, _name: &str, _value: &PropertyValue) -> bool {
        false
    }
}

/// Everything one dispatch of one event into one branch needs.
pub(crate) struct EvalContext<'a> {
    pub program: &'a PatternProgram,
    pub event: &'a TraceEvent,
    pub public: bool,
    pub exec: &'a mut ExecutionState,
    pub probe: &'a dyn ForkProbe,
    /// Branch states cloned before a correlation bind. The caller spawns
    /// these as siblings once the dispatch completes.
    pub forks: Vec<ExecutionState>,
}

/// Evaluate one step against the context event.
///
/// Returns the step's outcome after this event. Completed outcomes are
/// written back to the memo so subsequent events skip the step entirely.
pub(crate) fn evaluate(ctx: &mut EvalContext<'_>, id: StepId) -> Outcome {
    let stored = ctx.exec.memo(id).result();
    if stored.is_complete() {
        return stored;
    }

    let program = ctx.program;
    let node = program.node(id);
    let outcome = match &node.kind {
        PatternKind::Match { condition } => eval_match(ctx, node, condition),
        PatternKind::Sequence => eval_sequence(ctx, node),
        PatternKind::Filter { gate } => eval_filter(ctx, node, gate),
        PatternKind::AllOf => eval_all_of(ctx, node),
        PatternKind::OneOf => eval_one_of(ctx, node),
        PatternKind::Data { templates } => eval_data(ctx, node, templates),
        PatternKind::GroupBy {
            property,
            bind_as,
            until,
            comparer,
        } => eval_group(
            ctx,
            node,
            GroupMode::Property {
                property,
                until: until.as_ref(),
                comparer: comparer.as_ref().map(|comparer| &comparer.0),
            },
            bind_as,
        ),
        PatternKind::GroupBySpan { bind_as } => eval_group(ctx, node, GroupMode::Span, bind_as),
        PatternKind::GroupByTrace { bind_as } => eval_group(ctx, node, GroupMode::Trace, bind_as),
        PatternKind::Record { sink } => eval_record(ctx, node, sink),
    };

    if outcome.is_complete() {
        ctx.exec.memo_mut(id).set_result(outcome);
        if outcome.is_successful() {
            if let Some(label) = &node.label {
                ctx.exec.mark_succeeded(label.clone());
            }
        }
        tracing::trace!(
            step = %program.step_path(id),
            kind = node.kind.name(),
            depth = node.depth,
            ?outcome,
            "step completed"
        );
    }
    outcome
}

/// Run a condition against the context event with capture access to the
/// branch globals.
fn check_condition(ctx: &mut EvalContext<'_>, condition: &Condition) -> Outcome {
    let mut scope = EventScope::new(ctx.public, &mut ctx.exec.globals);
    condition.check(ctx.event.identifier(), ctx.event, &mut scope)
}

/// Offer the event to every listed child. Fails on the first failed child,
/// succeeds once all children have succeeded.
fn route_to_all(ctx: &mut EvalContext<'_>, children: &[StepId]) -> Outcome {
    let mut all_complete = true;
    for &child in children {
        match evaluate(ctx, child) {
            Outcome::Failed => return Outcome::Failed,
            Outcome::Pending => all_complete = false,
            Outcome::Successful => {}
        }
    }
    if all_complete {
        Outcome::Successful
    } else {
        Outcome::Pending
    }
}

fn eval_match(ctx: &mut EvalContext<'_>, node: &ProgramNode, condition: &Condition) -> Outcome {
    let NodeMemo::Match { matched, .. } = *ctx.exec.memo(node.id) else {
        unreachable!("match step with mismatched memo");
    };

    if !matched {
        return match check_condition(ctx, condition) {
            Outcome::Pending => Outcome::Pending,
            Outcome::Failed => Outcome::Failed,
            Outcome::Successful => {
                let NodeMemo::Match { matched, .. } = ctx.exec.memo_mut(node.id) else {
                    unreachable!("match step with mismatched memo");
                };
                *matched = true;
                if node.children.is_empty() {
                    Outcome::Successful
                } else {
                    // Children start watching with the next event.
                    Outcome::Pending
                }
            }
        };
    }

    route_to_all(ctx, &node.children)
}

fn eval_sequence(ctx: &mut EvalContext<'_>, node: &ProgramNode) -> Outcome {
    let NodeMemo::Sequence { cursor, .. } = *ctx.exec.memo(node.id) else {
        unreachable!("sequence step with mismatched memo");
    };
    let Some(&active) = node.children.get(cursor) else {
        return Outcome::Successful;
    };

    // Only the child at the cursor sees the event; later children wait
    // their turn.
    match evaluate(ctx, active) {
        Outcome::Successful => {
            let next = cursor + 1;
            let NodeMemo::Sequence { cursor, .. } = ctx.exec.memo_mut(node.id) else {
                unreachable!("sequence step with mismatched memo");
            };
            *cursor = next;
            if next == node.children.len() {
                Outcome::Successful
            } else {
                Outcome::Pending
            }
        }
        other => other,
    }
}

fn eval_filter(ctx: &mut EvalContext<'_>, node: &ProgramNode, gate: &Condition) -> Outcome {
    match check_condition(ctx, gate) {
        // Events declined by the gate are invisible to the children.
        Outcome::Pending => Outcome::Pending,
        Outcome::Failed => Outcome::Failed,
        Outcome::Successful => route_to_all(ctx, &node.children),
    }
}

fn eval_all_of(ctx: &mut EvalContext<'_>, node: &ProgramNode) -> Outcome {
    route_to_all(ctx, &node.children)
}

fn eval_one_of(ctx: &mut EvalContext<'_>, node: &ProgramNode) -> Outcome {
    let mut all_failed = true;
    for &child in &node.children {
        match evaluate(ctx, child) {
            Outcome::Successful => return Outcome::Successful,
            Outcome::Failed => {}
            Outcome::Pending => all_failed = false,
        }
    }
    if all_failed {
        Outcome::Failed
    } else {
        Outcome::Pending
    }
}

fn eval_data(ctx: &mut EvalContext<'_>, node: &ProgramNode, templates: &[PartialRecord]) -> Outcome {
    let NodeMemo::Data { cursor, .. } = *ctx.exec.memo(node.id) else {
        unreachable!("data step with mismatched memo");
    };
    let Some(template) = templates.get(cursor) else {
        return Outcome::Successful;
    };

    if !template.matches(ctx.event) {
        // Non-matching events pass by without advancing the cursor.
        return Outcome::Pending;
    }

    let next = cursor + 1;
    let NodeMemo::Data { cursor, .. } = ctx.exec.memo_mut(node.id) else {
        unreachable!("data step with mismatched memo");
    };
    *cursor = next;
    if next == templates.len() {
        Outcome::Successful
    } else {
        Outcome::Pending
    }
}

fn eval_record(ctx: &mut EvalContext<'_>, node: &ProgramNode, sink: &RecordSink) -> Outcome {
    // Every event reaching an unfinished record step is retained, including
    // the one that completes the inner expression.
    sink.push(ctx.event.clone());
    evaluate(ctx, node.children[0])
}

/// How a grouping step derives a correlation key from an event.
enum GroupMode<'p> {
    Property {
        property: &'p str,
        until: Option<&'p Condition>,
        comparer: Option<&'p ValueComparer>,
    },
    Span,
    Trace,
}

impl GroupMode<'_> {
    /// Whether `observed` belongs to the group keyed by `bound`.
    fn same_key(&self, bound: &PropertyValue, observed: &PropertyValue) -> bool {
        match self {
            Self::Property {
                comparer: Some(comparer),
                ..
            } => comparer(bound, observed),
            _ => bound == observed,
        }
    }
}

/// A correlation observed on the current event, with the span coordinates
/// needed to recognize the group's closing event later.
struct Correlation {
    value: PropertyValue,
    trace_id: Option<String>,
    span_id: Option<String>,
}

fn observe_correlation(event: &TraceEvent, mode: &GroupMode<'_>) -> Option<Correlation> {
    match mode {
        GroupMode::Property { property, .. } => {
            let value = event.property(property)?;
            Some(Correlation {
                value,
                trace_id: event.trace_id(),
                span_id: event.span_id(),
            })
        }
        GroupMode::Span => {
            let trace_id = event.trace_id()?;
            let span_id = event.span_id()?;
            let value = PropertyValue::Text(format!("{trace_id}:{span_id}"));
            Some(Correlation {
                value,
                trace_id: Some(trace_id),
                span_id: Some(span_id),
            })
        }
        GroupMode::Trace => {
            let trace_id = event.trace_id()?;
            let value = PropertyValue::Text(trace_id.clone());
            Some(Correlation {
                value,
                trace_id: Some(trace_id),
                span_id: event.span_id(),
            })
        }
    }
}

/// Does this event end the span group bound to `binding`?
fn span_stop_matches(event: &TraceEvent, binding: &GroupBinding) -> bool {
    let Some(span) = event.as_span() else {
        return false;
    };
    span.phase() == SpanPhase::Stop
        && Some(span.trace_id()) == binding.trace_id.as_deref()
        && Some(span.span_id()) == binding.span_id.as_deref()
}

/// Does this event end the trace group bound to `binding`? Only the stop of
/// a root span (one without a parent) closes a trace.
fn root_stop_matches(event: &TraceEvent, binding: &GroupBinding) -> bool {
    let Some(span) = event.as_span() else {
        return false;
    };
    span.phase() == SpanPhase::Stop
        && span.is_root()
        && Some(span.trace_id()) == binding.trace_id.as_deref()
}

fn eval_group(
    ctx: &mut EvalContext<'_>,
    node: &ProgramNode,
    mode: GroupMode<'_>,
    bind_as: &str,
) -> Outcome {
    let NodeMemo::Group { binding, .. } = ctx.exec.memo(node.id) else {
        unreachable!("group step with mismatched memo");
    };
    let binding = binding.clone();
    let observed = observe_correlation(ctx.event, &mode);

    let binding = match binding {
        Some(existing) => existing,
        None => {
            let Some(observed) = observed.as_ref() else {
                // Events without the correlation slide past an unbound group.
                return Outcome::Pending;
            };
            if ctx.exec.fork.contains(bind_as, &observed.value)
                || ctx.probe.binding_exists(bind_as, &observed.value)
            {
                // Another branch already follows this value.
                return Outcome::Pending;
            }

            // Clone before binding: the sibling stays unbound and will claim
            // the next unseen value, starting from the next event.
            ctx.forks.push(ctx.exec.clone());
            tracing::debug!(
                step = %ctx.program.step_path(node.id),
                binding = bind_as,
                value = %observed.value,
                "correlation bound, sibling branch forked"
            );

            let bound = GroupBinding {
                value: observed.value.clone(),
                trace_id: observed.trace_id.clone(),
                span_id: observed.span_id.clone(),
            };
            match &mode {
                GroupMode::Property {
                    comparer: Some(comparer),
                    ..
                } => ctx.exec.fork.bind_with(
                    bind_as.to_string(),
                    observed.value.clone(),
                    Arc::clone(comparer),
                ),
                _ => ctx
                    .exec
                    .fork
                    .bind(bind_as.to_string(), observed.value.clone()),
            }
            ctx.exec
                .globals
                .set(bind_as.to_string(), observed.value.clone());
            let NodeMemo::Group { binding, .. } = ctx.exec.memo_mut(node.id) else {
                unreachable!("group step with mismatched memo");
            };
            *binding = Some(bound.clone());
            bound
        }
    };

    // Events correlated to a different value belong to sibling branches.
    if let Some(observed) = &observed {
        if !mode.same_key(&binding.value, &observed.value) {
            return Outcome::Pending;
        }
    }

    // The event belongs to the bound group: offer it to the inner
    // expression first so a closing event can still complete it.
    let inner_outcome = match node.children.first() {
        Some(&child) => evaluate(ctx, child),
        None => Outcome::Successful,
    };
    if inner_outcome == Outcome::Failed {
        return Outcome::Failed;
    }

    let closed = match &mode {
        GroupMode::Property {
            until: Some(condition),
            ..
        } => match check_condition(ctx, condition) {
            Outcome::Successful => true,
            Outcome::Failed => return Outcome::Failed,
            Outcome::Pending => false,
        },
        GroupMode::Property { until: None, .. } => {
            // Without a close condition the group mirrors its inner
            // expression; a bare binding is already a success.
            return inner_outcome;
        }
        GroupMode::Span => span_stop_matches(ctx.event, &binding),
        GroupMode::Trace => root_stop_matches(ctx.event, &binding),
    };

    if closed {
        // The group ends here; whatever the inner expression still waits
        // for will never arrive.
        if inner_outcome.is_successful() {
            Outcome::Successful
        } else {
            Outcome::Failed
        }
    } else {
        Outcome::Pending
    }
}
