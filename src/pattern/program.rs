//! Compiled form of a pattern tree.
//!
//! Registration flattens the tree into a preorder vector of steps
//! addressed by dense [`StepId`]s. Branch state is then a parallel vector
//! of memos indexed by the same ids, so execution never walks the tree
//! looking for "where was I": the coordinate of a step is its id.

use super::{Pattern, PatternKind};
use crate::error::{Result, TracexpectError};

/// Index of a step in its compiled program; the root is always 0.
pub(crate) type StepId = u32;

#[derive(Debug, Clone)]
pub(crate) struct ProgramNode {
    pub id: StepId,
    pub parent: Option<StepId>,
    pub depth: u16,
    pub label: Option<String>,
    pub kind: PatternKind,
    pub children: Vec<StepId>,
}

/// A validated, flattened pattern tree.
#[derive(Debug, Clone)]
pub(crate) struct PatternProgram {
    nodes: Vec<ProgramNode>,
}

impl PatternProgram {
    /// Flatten and validate a pattern tree.
    ///
    /// Structural rules are enforced here, once, so evaluation can assume
    /// a well-formed program: leaf kinds reject children, grouping steps
    /// accept at most one inner expression, record steps exactly one
    /// child, and the child-routing kinds at least one.
    pub fn compile(pattern: Pattern) -> Result<Self> {
        let mut nodes = Vec::new();
        flatten(pattern, None, 0, &mut nodes)?;
        Ok(Self { nodes })
    }

    pub fn root(&self) -> StepId {
        0
    }

    pub fn node(&self, id: StepId) -> &ProgramNode {
        &self.nodes[id as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ProgramNode> {
        self.nodes.iter()
    }

    /// Dotted child-index path of a step, for diagnostics: the root is
    /// `"0"`, its second child `"0.1"`.
    pub fn step_path(&self, id: StepId) -> String {
        let mut indices = Vec::new();
        let mut current = id;
        while let Some(parent) = self.nodes[current as usize].parent {
            let position = self.nodes[parent as usize]
                .children
                .iter()
                .position(|child| *child == current)
                .unwrap_or(0);
            indices.push(position);
            current = parent;
        }
        indices.reverse();
        let mut path = String::from("0");
        for index in indices {
            path.push('.');
            path.push_str(&index.to_string());
        }
        path
    }
}

fn flatten(
    pattern: Pattern,
    parent: Option<StepId>,
    depth: u16,
    nodes: &mut Vec<ProgramNode>,
) -> Result<StepId> {
    validate(&pattern)?;
    let id = nodes.len() as StepId;
    let Pattern {
        label,
        kind,
        children,
    } = pattern;
    nodes.push(ProgramNode {
        id,
        parent,
        depth,
        label,
        kind,
        children: Vec::new(),
    });
    let mut child_ids = Vec::with_capacity(children.len());
    for child in children {
        child_ids.push(flatten(child, Some(id), depth + 1, nodes)?);
    }
    nodes[id as usize].children = child_ids;
    Ok(id)
}

fn validate(pattern: &Pattern) -> Result<()> {
    let kind_name = pattern.kind.name();
    match &pattern.kind {
        PatternKind::Match { .. } => Ok(()),
        PatternKind::Sequence
        | PatternKind::Filter { .. }
        | PatternKind::AllOf
        | PatternKind::OneOf => {
            if pattern.children.is_empty() {
                Err(TracexpectError::InvalidPattern(format!(
                    "{kind_name} step requires at least one child"
                )))
            } else {
                Ok(())
            }
        }
        PatternKind::Data { templates } => {
            if !pattern.children.is_empty() {
                Err(TracexpectError::InvalidPattern(
                    "data step cannot have children".to_string(),
                ))
            } else if templates.is_empty() {
                Err(TracexpectError::InvalidPattern(
                    "data step requires at least one template".to_string(),
                ))
            } else {
                Ok(())
            }
        }
        PatternKind::GroupBy { property, .. } => {
            if property.is_empty() {
                Err(TracexpectError::InvalidPattern(
                    "group_by property name must not be empty".to_string(),
                ))
            } else if pattern.children.len() > 1 {
                Err(TracexpectError::InvalidPattern(format!(
                    "{kind_name} step accepts at most one inner expression"
                )))
            } else {
                Ok(())
            }
        }
        PatternKind::GroupBySpan { .. } | PatternKind::GroupByTrace { .. } => {
            if pattern.children.len() > 1 {
                Err(TracexpectError::InvalidPattern(format!(
                    "{kind_name} step accepts at most one inner expression"
                )))
            } else {
                Ok(())
            }
        }
        PatternKind::Record { .. } => {
            if pattern.children.len() != 1 {
                Err(TracexpectError::InvalidPattern(
                    "record step requires exactly one child".to_string(),
                ))
            } else {
                Ok(())
            }
        }
    }
}
