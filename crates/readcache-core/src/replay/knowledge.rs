//! Per-scope trust state
//!
//! A [`KnowledgeMap`] records, for each `(pathKey, scopeKey)` observed on
//! the active branch, the most recently established trust. Full-file trust
//! and range trusts for the same file are independent slots.

use crate::scope::ScopeKey;
use std::collections::HashMap;

/// Trust established for one scope of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeTrust {
    /// Digest of the content body associated with establishing this trust
    pub hash: String,
    /// Arbitrates freshness between candidate bases; higher wins
    pub seq: u64,
}

impl ScopeTrust {
    pub fn new(hash: impl Into<String>, seq: u64) -> Self {
        Self {
            hash: hash.into(),
            seq,
        }
    }
}

/// Mapping from path key to per-scope trust
///
/// Invariant: every present path has a non-empty inner map; scope deletions
/// that empty an inner map drop the outer entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnowledgeMap {
    files: HashMap<String, HashMap<ScopeKey, ScopeTrust>>,
}

impl KnowledgeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up trust for one scope
    pub fn get(&self, path_key: &str, scope: &ScopeKey) -> Option<&ScopeTrust> {
        self.files.get(path_key).and_then(|scopes| scopes.get(scope))
    }

    /// Establish or advance trust for one scope
    pub fn set(&mut self, path_key: impl Into<String>, scope: ScopeKey, trust: ScopeTrust) {
        self.files
            .entry(path_key.into())
            .or_default()
            .insert(scope, trust);
    }

    /// Apply an invalidation: full scope erases every slot for the path,
    /// a range scope erases only that slot
    pub fn invalidate(&mut self, path_key: &str, scope: &ScopeKey) {
        match scope {
            ScopeKey::Full => {
                self.files.remove(path_key);
            }
            ScopeKey::Range { .. } => {
                if let Some(scopes) = self.files.get_mut(path_key) {
                    scopes.remove(scope);
                    if scopes.is_empty() {
                        self.files.remove(path_key);
                    }
                }
            }
        }
    }

    /// Overlay another map on top of this one; the other map's slots win
    pub fn merge(&mut self, other: &KnowledgeMap) {
        for (path, scopes) in &other.files {
            for (scope, trust) in scopes {
                self.set(path.clone(), scope.clone(), trust.clone());
            }
        }
    }

    /// Number of tracked paths
    pub fn path_count(&self) -> usize {
        self.files.len()
    }

    /// Number of tracked `(path, scope)` slots
    pub fn scope_count(&self) -> usize {
        self.files.values().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterate every tracked slot
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScopeKey, &ScopeTrust)> {
        self.files.iter().flat_map(|(path, scopes)| {
            scopes
                .iter()
                .map(move |(scope, trust)| (path.as_str(), scope, trust))
        })
    }
}
