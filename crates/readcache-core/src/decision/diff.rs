//! Unified diff construction for the full-scope pipeline

use similar::{ChangeTag, TextDiff};

/// A rendered unified diff between two file bodies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnifiedDiff {
    /// Diff payload including `--- a/<path>` / `+++ b/<path>` headers
    pub text: String,
    /// Changed-line count: a modified line counts once, not as a
    /// delete-insert pair
    pub changed_lines: u64,
}

/// Build a unified diff with filename headers and standard hunks
///
/// Returns `None` when the bodies produce no hunks, which the caller treats
/// as a baseline-fallback signal.
pub fn unified_diff(path: &str, base: &str, current: &str) -> Option<UnifiedDiff> {
    let diff = TextDiff::from_lines(base, current);
    let mut inserted: u64 = 0;
    let mut deleted: u64 = 0;
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => inserted += 1,
            ChangeTag::Delete => deleted += 1,
            ChangeTag::Equal => {}
        }
    }
    let changed_lines = inserted.max(deleted);
    if changed_lines == 0 {
        return None;
    }
    let text = diff
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{path}"), &format!("b/{path}"))
        .to_string();
    Some(UnifiedDiff {
        text,
        changed_lines,
    })
}
