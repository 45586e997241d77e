//! Read decisions: mode selection and the diff pipeline

mod diff;
mod engine;

pub use diff::{unified_diff, UnifiedDiff};
pub use engine::{
    canonical_path_key, is_sensitive_path, resolve_target, DecisionEngine, ReadContext,
    ReadOutcome, ReadRequest, ResolvedTarget,
};
