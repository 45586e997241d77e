//! Metadata codec for persisted read records
//!
//! Two record kinds ride inside session entries: a per-read result record
//! (`ReadMeta`) in the tool-result details area, and an explicit
//! `Invalidation` record in a custom entry under the reserved namespace.
//! Parsing is fail-open: malformed records yield `None` and the replay
//! engine treats them as absent.

use crate::scope::ScopeKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Record format version understood by this build
pub const META_VERSION: u64 = 1;

/// Reserved custom-entry namespace and details-area key
pub const READCACHE_NAMESPACE: &str = "readcache";

/// Name of the intercepted read tool
pub const READ_TOOL_NAME: &str = "read";

/// Kind discriminator carried by invalidation records
pub const INVALIDATE_KIND: &str = "invalidate";

/// Output mode of a read decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    Full,
    Unchanged,
    UnchangedRange,
    Diff,
    BaselineFallback,
}

impl ReadMode {
    /// Anchor modes may bootstrap trust without any prior trust for the slot
    pub fn is_anchor(&self) -> bool {
        matches!(self, Self::Full | Self::BaselineFallback)
    }

    /// Derived modes require a validated base chain
    pub fn is_derived(&self) -> bool {
        !self.is_anchor()
    }

    /// The wire string for this mode
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Unchanged => "unchanged",
            Self::UnchangedRange => "unchanged_range",
            Self::Diff => "diff",
            Self::BaselineFallback => "baseline_fallback",
        }
    }
}

/// Per-read result record persisted in the session stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadMeta {
    pub v: u64,
    pub path_key: String,
    pub scope_key: ScopeKey,
    pub served_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_hash: Option<String>,
    pub mode: ReadMode,
    pub total_lines: u32,
    pub range_start: u32,
    pub range_end: u32,
    pub bytes: u64,
}

impl ReadMeta {
    /// Whether this record satisfies every validation rule
    pub fn is_valid(&self) -> bool {
        if self.v != META_VERSION {
            return false;
        }
        if self.path_key.is_empty() || self.served_hash.is_empty() {
            return false;
        }
        if self.total_lines < 1 || self.range_start < 1 || self.range_end < self.range_start {
            return false;
        }
        if self.range_end > self.total_lines {
            return false;
        }
        match &self.base_hash {
            Some(base) if base.is_empty() => return false,
            Some(_) => {}
            None if self.mode.is_derived() => return false,
            None => {}
        }
        if let ScopeKey::Range { start, end } = self.scope_key {
            if start < 1 || end < start {
                return false;
            }
        }
        true
    }

    /// Serialize into the raw details-area value
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Explicit refresh record persisted in the session stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invalidation {
    pub v: u64,
    pub kind: String,
    pub path_key: String,
    pub scope_key: ScopeKey,
    pub at: i64,
}

impl Invalidation {
    /// Create an invalidation stamped with the given epoch-millis time
    pub fn new(path_key: impl Into<String>, scope_key: ScopeKey, at: i64) -> Self {
        Self {
            v: META_VERSION,
            kind: INVALIDATE_KIND.to_string(),
            path_key: path_key.into(),
            scope_key,
            at,
        }
    }

    /// Whether this record satisfies every validation rule
    pub fn is_valid(&self) -> bool {
        self.v == META_VERSION && self.kind == INVALIDATE_KIND && !self.path_key.is_empty()
    }

    /// Serialize into the raw custom-entry payload
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Extract a `ReadMeta` from a raw untyped record; malformed records yield
/// `None` and no error escapes
pub fn parse_read_meta(value: &Value) -> Option<ReadMeta> {
    let meta: ReadMeta = serde_json::from_value(value.clone()).ok()?;
    if meta.is_valid() {
        Some(meta)
    } else {
        None
    }
}

/// Extract an `Invalidation` from a raw untyped record; malformed records
/// yield `None` and no error escapes
pub fn parse_invalidation(value: &Value) -> Option<Invalidation> {
    let inv: Invalidation = serde_json::from_value(value.clone()).ok()?;
    if inv.is_valid() {
        Some(inv)
    } else {
        None
    }
}
