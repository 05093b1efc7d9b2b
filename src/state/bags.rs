//! Shared and branch-local state bags.
//!
//! Both bags are persistent maps: cloning a branch copies a handful of
//! pointers, and the clone diverges from the original through structural
//! sharing instead of a deep copy. That property is what makes forking a
//! branch on every new correlation value affordable.

use crate::event::{PropertyValue, ValueComparer};
use std::fmt;

/// Named values a branch accumulates while it runs.
///
/// Capture conditions write here and later conditions read here, so a
/// pattern can compare values across events. Each branch owns its view;
/// writes after a fork are invisible to sibling branches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalState {
    values: im::HashMap<String, PropertyValue>,
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.values.iter()
    }
}

impl FromIterator<(String, PropertyValue)> for GlobalState {
    fn from_iter<I: IntoIterator<Item = (String, PropertyValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// What a condition sees besides the event itself: the branch's global
/// state and whether the producer flagged this dispatch as public.
///
/// The engine constructs a fresh scope per condition check; conditions
/// never hold on to it.
pub struct EventScope<'a> {
    public: bool,
    globals: &'a mut GlobalState,
}

impl<'a> EventScope<'a> {
    pub fn new(public: bool, globals: &'a mut GlobalState) -> Self {
        Self { public, globals }
    }

    /// Whether the producer marked the current dispatch as publicly
    /// observable. The engine dispatches every event regardless; the flag
    /// exists so conditions can discriminate.
    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn get(&self, name: &str) -> Option<PropertyValue> {
        self.globals.get(name).cloned()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        self.globals.set(name, value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.globals.contains(name)
    }
}

/// Correlation values a branch has claimed, with the comparer each value
/// was bound under.
///
/// Sibling branches consult each other's fork state before forking so that
/// one correlation value is claimed by exactly one branch.
#[derive(Clone, Default)]
pub struct ForkState {
    values: im::HashMap<String, PropertyValue>,
    comparers: im::HashMap<String, ValueComparer>,
}

impl ForkState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a correlation value under structural equality.
    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Claim a correlation value with a custom comparer. The comparer
    /// travels with the state through clones, so dedupe checks in forked
    /// branches keep using it.
    pub fn bind_with(
        &mut self,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
        comparer: ValueComparer,
    ) {
        let name = name.into();
        self.values.insert(name.clone(), value.into());
        self.comparers.insert(name, comparer);
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.values.get(name)
    }

    /// Whether `name` is bound to something equal to `value`, under the
    /// comparer the binding was made with.
    pub fn contains(&self, name: &str, value: &PropertyValue) -> bool {
        match self.values.get(name) {
            Some(bound) => match self.comparers.get(name) {
                Some(comparer) => comparer(bound, value),
                None => bound == value,
            },
            None => false,
        }
    }

    /// Partial containment: every binding of `probe` is present here and
    /// equal under this state's comparers. Bindings only `self` has are
    /// ignored.
    pub fn contains_all(&self, probe: &ForkState) -> bool {
        probe
            .values
            .iter()
            .all(|(name, value)| self.contains(name, value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.values.iter()
    }
}

impl PartialEq for ForkState {
    /// Equality over bound values; comparers are ignored.
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl fmt::Debug for ForkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForkState")
            .field("values", &self.values)
            .finish()
    }
}
