//! Planning module for apply operations.
//!
//! This module handles the comparison between a package and current org
//! state, and turns the result into phased plans it can execute.

mod diff;
mod executor;
mod plan;

pub use diff::{
    ChangeType, Diff, DiffCounts, DiffEngine, DiffEntry, DiffIdentifier, DiffLabelMapping,
    DiffValues,
};
pub use executor::{
    ActionResult, ApplyExecutor, ApplyFailure, DEFAULT_MAX_CONCURRENCY, ExecutionResult,
};
pub use plan::{ActionType, ApplyPlan, KindOrder, LinkTarget, PlannedAction};
