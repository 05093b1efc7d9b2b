//! Branch state: persistent bags and per-step memos.
//!
//! State is split by audience. [`GlobalState`] and [`ForkState`] are the
//! value bags patterns interact with; [`ExecutionState`] bundles them with
//! the per-step memos into the full picture of one branch. Everything
//! clones in O(1) with structural sharing, which is what keeps forking
//! cheap no matter how much a branch has accumulated.

pub mod bags;
pub mod branch;
pub(crate) mod memo;

pub use bags::{EventScope, ForkState, GlobalState};
pub use branch::ExecutionState;
