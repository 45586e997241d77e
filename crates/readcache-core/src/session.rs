//! Session entry model and session-view facade
//!
//! The host owns the persisted session; the core consumes it through the
//! [`SessionView`] trait and only distinguishes three entry shapes: read-tool
//! results carrying a `ReadMeta` record, custom entries under the reserved
//! namespace carrying an `Invalidation`, and compaction markers. Everything
//! else is opaque.
//!
//! [`MemorySession`] is a plain-vector implementation backing tests: a tree
//! of entries with parent pointers, an active leaf, and JSONL save/load so
//! resumed-session scenarios are expressible.

use crate::error::{CacheError, CacheResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// One entry in the host's session stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEntry {
    /// A tool-result entry; the read cache only inspects entries whose tool
    /// name is the intercepted read tool
    ToolResult {
        id: String,
        tool: String,
        details: Value,
    },
    /// A custom entry under some namespace
    Custom {
        id: String,
        namespace: String,
        payload: Value,
    },
    /// A compaction marker demarcating a summarization boundary
    Compaction {
        id: String,
        #[serde(
            rename = "firstKeptEntryId",
            skip_serializing_if = "Option::is_none",
            default
        )]
        first_kept_entry_id: Option<String>,
    },
    /// Any other entry kind; ignored by replay
    Other { id: String },
}

impl SessionEntry {
    /// The entry's identifier
    pub fn id(&self) -> &str {
        match self {
            Self::ToolResult { id, .. }
            | Self::Custom { id, .. }
            | Self::Compaction { id, .. }
            | Self::Other { id } => id,
        }
    }
}

/// Facade over the host's session storage
///
/// Implementations expose the active branch as an ordered root-to-leaf
/// sequence; the core never mutates session state except through
/// [`SessionView::append_custom`].
pub trait SessionView: Send + Sync {
    /// Stable identifier of the session
    fn session_id(&self) -> String;

    /// Identifier of the currently active leaf entry, if any
    fn leaf_id(&self) -> Option<String>;

    /// Ordered root-to-leaf entries on the active branch path
    fn branch_entries(&self) -> Vec<SessionEntry>;

    /// Every entry in the session, in insertion order
    fn entries(&self) -> Vec<SessionEntry>;

    /// Look up a single entry by id
    fn entry(&self, id: &str) -> Option<SessionEntry>;

    /// Append a custom entry under the given namespace as a child of the
    /// active leaf; returns the new entry id
    fn append_custom(&self, namespace: &str, payload: Value) -> String;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredNode {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    parent: Option<String>,
    entry: SessionEntry,
}

#[derive(Debug, Default)]
struct MemorySessionInner {
    nodes: HashMap<String, StoredNode>,
    order: Vec<String>,
    leaf: Option<String>,
}

/// In-memory session backed by a plain entry list
///
/// Appends always attach to the active leaf; `switch_leaf` repositions the
/// leaf so sibling branches can be grown from any earlier entry.
#[derive(Debug, Clone)]
pub struct MemorySession {
    session_id: String,
    inner: Arc<RwLock<MemorySessionInner>>,
}

impl MemorySession {
    /// Create an empty session with a fresh id
    pub fn new() -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string())
    }

    /// Create an empty session with a caller-chosen id
    pub fn with_id(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            inner: Arc::new(RwLock::new(MemorySessionInner::default())),
        }
    }

    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()[..8].to_string()
    }

    /// Append an entry as a child of the active leaf and advance the leaf
    pub fn append(&self, entry: SessionEntry) -> String {
        let id = entry.id().to_string();
        let mut inner = self.inner.write();
        let parent = inner.leaf.clone();
        inner.nodes.insert(id.clone(), StoredNode { parent, entry });
        inner.order.push(id.clone());
        inner.leaf = Some(id.clone());
        id
    }

    /// Append a tool-result entry carrying the given details area
    pub fn append_tool_result(&self, tool: impl Into<String>, details: Value) -> String {
        self.append(SessionEntry::ToolResult {
            id: self.next_id(),
            tool: tool.into(),
            details,
        })
    }

    /// Append a compaction marker
    pub fn append_compaction(&self, first_kept_entry_id: Option<String>) -> String {
        self.append(SessionEntry::Compaction {
            id: self.next_id(),
            first_kept_entry_id,
        })
    }

    /// Append an opaque entry
    pub fn append_other(&self) -> String {
        self.append(SessionEntry::Other { id: self.next_id() })
    }

    /// Reposition the active leaf onto an existing entry
    pub fn switch_leaf(&self, id: &str) -> CacheResult<()> {
        let mut inner = self.inner.write();
        if !inner.nodes.contains_key(id) {
            return Err(CacheError::InvalidInput(format!("unknown entry: {id}")));
        }
        inner.leaf = Some(id.to_string());
        Ok(())
    }

    /// Persist the session as one JSON node per line
    pub async fn save_to(&self, path: impl AsRef<Path>) -> CacheResult<()> {
        let lines: Vec<String> = {
            let inner = self.inner.read();
            inner
                .order
                .iter()
                .filter_map(|id| inner.nodes.get(id))
                .map(|node| serde_json::to_string(node).map_err(CacheError::from))
                .collect::<CacheResult<_>>()?
        };
        tokio::fs::write(path.as_ref(), lines.join("\n"))
            .await
            .map_err(|e| CacheError::io_at(e.to_string(), path.as_ref().display().to_string()))
    }

    /// Reopen a session persisted by [`MemorySession::save_to`]
    ///
    /// The leaf lands on the last stored entry, matching a linear resume.
    pub async fn load_from(
        session_id: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> CacheResult<Self> {
        let raw = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| CacheError::io_at(e.to_string(), path.as_ref().display().to_string()))?;
        let session = Self::with_id(session_id);
        {
            let mut inner = session.inner.write();
            for line in raw.lines().filter(|l| !l.trim().is_empty()) {
                let node: StoredNode = serde_json::from_str(line)?;
                let id = node.entry.id().to_string();
                inner.nodes.insert(id.clone(), node);
                inner.order.push(id.clone());
                inner.leaf = Some(id);
            }
        }
        Ok(session)
    }
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionView for MemorySession {
    fn session_id(&self) -> String {
        self.session_id.clone()
    }

    fn leaf_id(&self) -> Option<String> {
        self.inner.read().leaf.clone()
    }

    fn branch_entries(&self) -> Vec<SessionEntry> {
        let inner = self.inner.read();
        let mut chain = Vec::new();
        let mut cursor = inner.leaf.clone();
        while let Some(id) = cursor {
            match inner.nodes.get(&id) {
                Some(node) => {
                    chain.push(node.entry.clone());
                    cursor = node.parent.clone();
                }
                None => break,
            }
        }
        chain.reverse();
        chain
    }

    fn entries(&self) -> Vec<SessionEntry> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.nodes.get(id).map(|n| n.entry.clone()))
            .collect()
    }

    fn entry(&self, id: &str) -> Option<SessionEntry> {
        self.inner.read().nodes.get(id).map(|n| n.entry.clone())
    }

    fn append_custom(&self, namespace: &str, payload: Value) -> String {
        self.append(SessionEntry::Custom {
            id: self.next_id(),
            namespace: namespace.to_string(),
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn branch_follows_leaf() {
        let session = MemorySession::new();
        let a = session.append_tool_result("read", json!({}));
        let b = session.append_tool_result("read", json!({}));
        assert_eq!(session.leaf_id().as_deref(), Some(b.as_str()));

        let branch = session.branch_entries();
        assert_eq!(branch.len(), 2);
        assert_eq!(branch[0].id(), a);
        assert_eq!(branch[1].id(), b);
    }

    #[test]
    fn sibling_branches_are_disjoint() {
        let session = MemorySession::new();
        let root = session.append_other();
        let left = session.append_tool_result("read", json!({"n": 1}));

        session.switch_leaf(&root).unwrap();
        let right = session.append_tool_result("read", json!({"n": 2}));

        let branch = session.branch_entries();
        let ids: Vec<&str> = branch.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec![root.as_str(), right.as_str()]);
        assert!(!ids.contains(&left.as_str()));

        // entries() still sees everything
        assert_eq!(session.entries().len(), 3);
    }

    #[test]
    fn switch_leaf_rejects_unknown_ids() {
        let session = MemorySession::new();
        assert!(session.switch_leaf("missing").is_err());
    }

    #[test]
    fn entry_lookup() {
        let session = MemorySession::new();
        let id = session.append_compaction(None);
        assert!(matches!(
            session.entry(&id),
            Some(SessionEntry::Compaction { .. })
        ));
        assert!(session.entry("nope").is_none());
    }

    #[tokio::test]
    async fn save_and_reload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("session.jsonl");

        let session = MemorySession::with_id("s1");
        session.append_tool_result("read", json!({"readcache": {"v": 1}}));
        session.append_custom("readcache", json!({"kind": "invalidate"}));
        session.append_compaction(Some("x".into()));
        session.save_to(&path).await.unwrap();

        let reopened = MemorySession::load_from("s1", &path).await.unwrap();
        assert_eq!(reopened.entries().len(), 3);
        assert_eq!(reopened.branch_entries().len(), 3);
        assert_eq!(
            reopened.leaf_id(),
            session.leaf_id(),
            "leaf resumes at the last entry"
        );
    }

    #[test]
    fn entry_serde_shape() {
        let entry = SessionEntry::Compaction {
            id: "c1".into(),
            first_kept_entry_id: Some("e9".into()),
        };
        let raw = serde_json::to_value(&entry).unwrap();
        assert_eq!(raw["type"], "compaction");
        assert_eq!(raw["firstKeptEntryId"], "e9");
    }
}
