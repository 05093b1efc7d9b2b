//! Validators, their paths, and the dispatch machinery.
//!
//! A [`Validator`] owns a set of [`ValidatorPath`]s, one per registered
//! pattern. Dispatching an event walks every path, every path walks its
//! running branches, and each branch advances its own memoized view of the
//! pattern. Branch state is persistent, so the forking a grouping step
//! performs is a constant-time clone.

pub(crate) mod eval;
pub mod path;
pub mod validator;

pub use path::{CallbackGuard, FinishedBranch, ValidatorPath};
pub use validator::Validator;
