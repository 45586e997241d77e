//! Branch replay and the trust state machine
//!
//! Reconstructs per-scope trust for the active branch from the persisted
//! entry sequence, under a strict compaction barrier: replay starts after
//! the latest compaction marker on the path and `firstKeptEntryId` is
//! deliberately ignored. Anchor modes (`full`, `baseline_fallback`) may
//! bootstrap trust; derived modes (`unchanged`, `diff`, `unchanged_range`)
//! only advance trust when their base-chain guard holds. A replay window
//! with no anchor for a slot therefore never yields trust for it.

use crate::meta::{self, ReadMeta, ReadMode, READCACHE_NAMESPACE, READ_TOOL_NAME};
use crate::replay::knowledge::{KnowledgeMap, ScopeTrust};
use crate::scope::ScopeKey;
use crate::session::SessionEntry;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Identifies the context-safe boundary a replay started from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BoundaryKey {
    /// No compaction on the branch path; replay covers the whole branch
    Root,
    /// Replay starts immediately after this compaction entry
    Compaction(String),
}

impl fmt::Display for BoundaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::Compaction(id) => write!(f, "compaction:{id}"),
        }
    }
}

/// Locate the replay boundary on a root-to-leaf branch path
///
/// Returns the index replay starts at (clamped to the sequence length) and
/// the boundary key for memoization.
pub fn replay_boundary(entries: &[SessionEntry]) -> (usize, BoundaryKey) {
    for (idx, entry) in entries.iter().enumerate().rev() {
        if let SessionEntry::Compaction { id, .. } = entry {
            return ((idx + 1).min(entries.len()), BoundaryKey::Compaction(id.clone()));
        }
    }
    (0, BoundaryKey::Root)
}

/// Knowledge reconstructed from one replay of the active branch
#[derive(Debug, Clone)]
pub struct ReplayedKnowledge {
    /// Trust per `(pathKey, scopeKey)` slot
    pub map: KnowledgeMap,
    /// Ranges whose candidates are unavailable until a matching range anchor
    pub blocked: HashMap<String, HashSet<ScopeKey>>,
    /// Boundary the replay started from
    pub boundary: BoundaryKey,
    /// Entries inside the replay window
    pub entries_replayed: usize,
    /// Valid `ReadMeta` events per mode, for the status surface
    pub mode_counts: HashMap<ReadMode, u64>,
    /// Highest sequence number stamped during this replay
    pub max_seq: u64,
}

impl ReplayedKnowledge {
    fn empty(boundary: BoundaryKey) -> Self {
        Self {
            map: KnowledgeMap::new(),
            blocked: HashMap::new(),
            boundary,
            entries_replayed: 0,
            mode_counts: HashMap::new(),
            max_seq: 0,
        }
    }

    /// Whether candidates for this range request are currently unavailable
    pub fn is_blocked(&self, path_key: &str, scope: &ScopeKey) -> bool {
        self.blocked
            .get(path_key)
            .map(|set| set.contains(scope))
            .unwrap_or(false)
    }
}

/// Replay a root-to-leaf branch path into a [`ReplayedKnowledge`]
pub fn replay_branch(entries: &[SessionEntry]) -> ReplayedKnowledge {
    let (start, boundary) = replay_boundary(entries);
    let window = &entries[start..];

    let mut state = ReplayedKnowledge::empty(boundary);
    state.entries_replayed = window.len();

    let mut seq: u64 = 0;
    for entry in window {
        match entry {
            SessionEntry::ToolResult { tool, details, .. } if tool == READ_TOOL_NAME => {
                let Some(record) = details.get(READCACHE_NAMESPACE) else {
                    continue;
                };
                let Some(read) = meta::parse_read_meta(record) else {
                    continue;
                };
                seq += 1;
                state.max_seq = seq;
                *state.mode_counts.entry(read.mode).or_insert(0) += 1;
                apply_read_meta(&mut state, &read, seq);
            }
            SessionEntry::Custom {
                namespace, payload, ..
            } if namespace == READCACHE_NAMESPACE => {
                if let Some(inv) = meta::parse_invalidation(payload) {
                    apply_invalidation(&mut state, &inv.path_key, &inv.scope_key);
                }
            }
            _ => {}
        }
    }
    state
}

/// One trust transition; invalid events fall through without effect
fn apply_read_meta(state: &mut ReplayedKnowledge, read: &ReadMeta, seq: u64) {
    let path = read.path_key.as_str();
    let scope = read.scope_key.clone();
    let served = read.served_hash.clone();

    match read.mode {
        // Anchors establish trust unconditionally; a range anchor also
        // lifts any pending block on that range.
        ReadMode::Full | ReadMode::BaselineFallback => {
            if let ScopeKey::Range { .. } = &scope {
                unblock_range(state, path, &scope);
            }
            state.map.set(path, scope, ScopeTrust::new(served, seq));
        }
        ReadMode::Unchanged => {
            if !scope.is_full() {
                return;
            }
            let Some(base) = read.base_hash.as_deref() else {
                return;
            };
            let matches = state
                .map
                .get(path, &ScopeKey::Full)
                .map(|t| t.hash == base)
                .unwrap_or(false);
            if matches && served == base {
                state
                    .map
                    .set(path, ScopeKey::Full, ScopeTrust::new(served, seq));
            }
        }
        ReadMode::Diff => {
            if !scope.is_full() {
                return;
            }
            let Some(base) = read.base_hash.as_deref() else {
                return;
            };
            let matches = state
                .map
                .get(path, &ScopeKey::Full)
                .map(|t| t.hash == base)
                .unwrap_or(false);
            if matches {
                state
                    .map
                    .set(path, ScopeKey::Full, ScopeTrust::new(served, seq));
            }
        }
        ReadMode::UnchangedRange => {
            if scope.is_full() {
                return;
            }
            let Some(base) = read.base_hash.as_deref() else {
                return;
            };
            let exact = state
                .map
                .get(path, &scope)
                .map(|t| t.hash == base)
                .unwrap_or(false);
            let full = state
                .map
                .get(path, &ScopeKey::Full)
                .map(|t| t.hash == base)
                .unwrap_or(false);
            if exact || full {
                state.map.set(path, scope, ScopeTrust::new(served, seq));
            }
        }
    }
}

fn apply_invalidation(state: &mut ReplayedKnowledge, path_key: &str, scope: &ScopeKey) {
    state.map.invalidate(path_key, scope);
    if let ScopeKey::Range { .. } = scope {
        state
            .blocked
            .entry(path_key.to_string())
            .or_default()
            .insert(scope.clone());
    }
}

fn unblock_range(state: &mut ReplayedKnowledge, path_key: &str, scope: &ScopeKey) {
    if let Some(set) = state.blocked.get_mut(path_key) {
        set.remove(scope);
        if set.is_empty() {
            state.blocked.remove(path_key);
        }
    }
}

/// Select the base candidate for a request scope
///
/// Full requests consult only the full slot. Range requests pick the
/// fresher of the exact-range and full slots (exact wins ties) unless the
/// range is blocked by an un-anchored invalidation, in which case no
/// candidate is available.
pub fn base_candidate(
    map: &KnowledgeMap,
    blocked: &HashMap<String, HashSet<ScopeKey>>,
    path_key: &str,
    scope: &ScopeKey,
) -> Option<ScopeTrust> {
    match scope {
        ScopeKey::Full => map.get(path_key, &ScopeKey::Full).cloned(),
        ScopeKey::Range { .. } => {
            if blocked
                .get(path_key)
                .map(|set| set.contains(scope))
                .unwrap_or(false)
            {
                return None;
            }
            let exact = map.get(path_key, scope);
            let full = map.get(path_key, &ScopeKey::Full);
            match (exact, full) {
                (None, None) => None,
                (Some(t), None) | (None, Some(t)) => Some(t.clone()),
                (Some(exact), Some(full)) => {
                    if full.seq > exact.seq {
                        Some(full.clone())
                    } else {
                        Some(exact.clone())
                    }
                }
            }
        }
    }
}
