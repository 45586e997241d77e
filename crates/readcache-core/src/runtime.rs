//! Runtime state: memoized replay results, per-leaf overlays, lifecycle
//! clearing
//!
//! The overlay captures trust established by same-turn decisions whose
//! results the host has not yet persisted. Overlay sequence numbers come
//! from a disjoint high band so they always out-rank replay-derived
//! sequences for the same slot. Host lifecycle events discard memoized
//! replay results and overlays wholesale; they never touch canonical
//! session-derived state.

use crate::replay::{
    self, base_candidate, BoundaryKey, KnowledgeMap, ReplayedKnowledge, ScopeTrust,
};
use crate::scope::ScopeKey;
use crate::session::SessionView;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// First sequence value of the overlay band; replay sequences stay far below
pub const OVERLAY_SEQ_BASE: u64 = 1_000_000_000;

/// Host lifecycle notifications the runtime reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Start,
    Compact,
    Tree,
    Fork,
    Switch,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MemoKey {
    session_id: String,
    leaf_id: String,
    boundary: String,
}

#[derive(Debug, Default)]
struct Overlay {
    leaf_id: String,
    map: KnowledgeMap,
    /// Scopes that received anchor-mode writes this turn; a live range
    /// anchor lifts the replay-derived block before the entry is persisted
    anchored: HashSet<(String, ScopeKey)>,
}

/// Merged view of replayed and overlay trust handed to the decision engine
///
/// The map is a deep clone; callers cannot mutate shared state through it.
#[derive(Debug, Clone)]
pub struct KnowledgeSnapshot {
    pub map: KnowledgeMap,
    pub blocked: HashMap<String, HashSet<ScopeKey>>,
    pub boundary: BoundaryKey,
    pub entries_replayed: usize,
    pub mode_counts: HashMap<crate::meta::ReadMode, u64>,
}

impl KnowledgeSnapshot {
    /// Select the base candidate for a request scope
    pub fn base_candidate(&self, path_key: &str, scope: &ScopeKey) -> Option<ScopeTrust> {
        base_candidate(&self.map, &self.blocked, path_key, scope)
    }
}

/// Per-runtime cache container
pub struct CacheRuntime {
    memo: Mutex<HashMap<MemoKey, Arc<ReplayedKnowledge>>>,
    overlays: Mutex<HashMap<String, Overlay>>,
    overlay_seq: AtomicU64,
}

impl CacheRuntime {
    pub fn new() -> Self {
        Self {
            memo: Mutex::new(HashMap::new()),
            overlays: Mutex::new(HashMap::new()),
            overlay_seq: AtomicU64::new(OVERLAY_SEQ_BASE),
        }
    }

    /// Next overlay sequence number; strictly increasing across the runtime
    pub fn next_overlay_seq(&self) -> u64 {
        self.overlay_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Build the merged knowledge view for the session's active leaf
    ///
    /// Replays the branch (or reuses the memoized result for the same
    /// `(session, leaf, boundary)`), deep-clones the map, then merges the
    /// session's overlay when its recorded leaf still matches. A stale
    /// overlay means the leaf moved; it is discarded wholesale.
    pub fn knowledge_for(&self, session: &dyn SessionView) -> KnowledgeSnapshot {
        let session_id = session.session_id();
        let leaf_id = session.leaf_id().unwrap_or_else(|| "root".to_string());
        let entries = session.branch_entries();
        let (_, boundary) = replay::replay_boundary(&entries);

        let key = MemoKey {
            session_id: session_id.clone(),
            leaf_id: leaf_id.clone(),
            boundary: boundary.to_string(),
        };
        let replayed = {
            let mut memo = self.memo.lock();
            match memo.get(&key) {
                Some(found) => {
                    debug!(session = %session_id, leaf = %leaf_id, "replay memo hit");
                    Arc::clone(found)
                }
                None => {
                    let fresh = Arc::new(replay::replay_branch(&entries));
                    memo.insert(key, Arc::clone(&fresh));
                    fresh
                }
            }
        };

        let mut map = replayed.map.clone();
        let mut blocked = replayed.blocked.clone();

        let mut overlays = self.overlays.lock();
        if let Some(overlay) = overlays.get(&session_id) {
            if overlay.leaf_id == leaf_id {
                map.merge(&overlay.map);
                for (path, scope) in &overlay.anchored {
                    if let Some(set) = blocked.get_mut(path) {
                        set.remove(scope);
                        if set.is_empty() {
                            blocked.remove(path);
                        }
                    }
                }
            } else {
                debug!(session = %session_id, "discarding stale overlay");
                overlays.remove(&session_id);
            }
        }

        KnowledgeSnapshot {
            map,
            blocked,
            boundary: replayed.boundary.clone(),
            entries_replayed: replayed.entries_replayed,
            mode_counts: replayed.mode_counts.clone(),
        }
    }

    /// Record a live decision into the overlay; returns the stamped sequence
    pub fn record_overlay(
        &self,
        session_id: &str,
        leaf_id: &str,
        path_key: &str,
        scope: ScopeKey,
        hash: &str,
        anchor: bool,
    ) -> u64 {
        let seq = self.next_overlay_seq();
        let mut overlays = self.overlays.lock();
        let overlay = overlays.entry(session_id.to_string()).or_default();
        if overlay.leaf_id != leaf_id {
            // leaf moved since the last write; start a fresh overlay
            *overlay = Overlay {
                leaf_id: leaf_id.to_string(),
                ..Default::default()
            };
        }
        if anchor {
            overlay
                .anchored
                .insert((path_key.to_string(), scope.clone()));
        }
        overlay
            .map
            .set(path_key, scope, ScopeTrust::new(hash, seq));
        seq
    }

    /// Drop every memoized replay result and overlay
    pub fn clear_all(&self) {
        self.memo.lock().clear();
        self.overlays.lock().clear();
        debug!("cleared runtime caches");
    }

    /// React to a host lifecycle notification
    ///
    /// Everything except `Start` discards the runtime caches; the start
    /// sweep of the object store is wired by the decision engine.
    pub fn on_session_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::Start => {}
            SessionEvent::Compact
            | SessionEvent::Tree
            | SessionEvent::Fork
            | SessionEvent::Switch
            | SessionEvent::Shutdown => self.clear_all(),
        }
    }
}

impl Default for CacheRuntime {
    fn default() -> Self {
        Self::new()
    }
}
