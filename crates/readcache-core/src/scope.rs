//! Scope keys for tracked file regions
//!
//! A scope is either the whole file (`full`) or a 1-based inclusive line
//! range (`r:<start>:<end>`). Trust is tracked independently per scope.

use crate::error::{CacheError, CacheResult};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// The string token for the full-file scope
pub const FULL_SCOPE_TOKEN: &str = "full";

/// Identity of a tracked file region
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScopeKey {
    /// Every line of the file as it currently stands
    Full,
    /// 1-based inclusive line range
    Range { start: u32, end: u32 },
}

impl ScopeKey {
    /// Build a range scope, rejecting invalid bounds
    pub fn range(start: u32, end: u32) -> Option<Self> {
        if start >= 1 && end >= start {
            Some(Self::Range { start, end })
        } else {
            None
        }
    }

    /// Canonicalize a request range against the current line count: a range
    /// spanning the whole file collapses to `Full`
    pub fn canonical(start: u32, end: u32, total_lines: u32) -> Self {
        if start == 1 && end == total_lines {
            Self::Full
        } else {
            Self::Range { start, end }
        }
    }

    /// Whether this is the full-file scope
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full)
    }

    /// The range bounds, when this is a range scope
    pub fn as_range(&self) -> Option<(u32, u32)> {
        match self {
            Self::Full => None,
            Self::Range { start, end } => Some((*start, *end)),
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "{}", FULL_SCOPE_TOKEN),
            Self::Range { start, end } => write!(f, "r:{}:{}", start, end),
        }
    }
}

impl FromStr for ScopeKey {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == FULL_SCOPE_TOKEN {
            return Ok(Self::Full);
        }
        let rest = s
            .strip_prefix("r:")
            .ok_or_else(|| CacheError::InvalidInput(format!("invalid scope key: {s}")))?;
        let (start, end) = rest
            .split_once(':')
            .ok_or_else(|| CacheError::InvalidInput(format!("invalid scope key: {s}")))?;
        let start: u32 = start
            .parse()
            .map_err(|_| CacheError::InvalidInput(format!("invalid scope key: {s}")))?;
        let end: u32 = end
            .parse()
            .map_err(|_| CacheError::InvalidInput(format!("invalid scope key: {s}")))?;
        Self::range(start, end)
            .ok_or_else(|| CacheError::InvalidInput(format!("invalid scope key: {s}")))
    }
}

impl Serialize for ScopeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ScopeKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(|_| {
            D::Error::custom(format!("invalid scope key: {raw}"))
        })
    }
}

/// Parse a `n` or `n-m` range suffix from a `path:range` shorthand
///
/// Returns `(start, end)` with `end >= start >= 1`, or `None` when the
/// suffix does not look like a range at all.
pub fn parse_range_suffix(suffix: &str) -> Option<(u32, u32)> {
    if let Some((a, b)) = suffix.split_once('-') {
        let start: u32 = a.parse().ok()?;
        let end: u32 = b.parse().ok()?;
        if start >= 1 && end >= start {
            return Some((start, end));
        }
        return None;
    }
    let line: u32 = suffix.parse().ok()?;
    if line >= 1 {
        Some((line, line))
    } else {
        None
    }
}

/// Resolved request range over the current content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: u32,
    pub end: u32,
    pub scope: ScopeKey,
}

/// Normalize an `offset`/`limit` pair against the current line count
///
/// `start = offset ?? 1`, `end = limit ? start + limit - 1 : totalLines`,
/// clamped to `totalLines`. A start beyond the end of the file is a
/// validation error, matching the baseline reader's semantics.
pub fn normalize_range(
    offset: Option<u32>,
    limit: Option<u32>,
    total_lines: u32,
) -> CacheResult<ResolvedRange> {
    if offset.is_none() && limit.is_none() {
        return Ok(ResolvedRange {
            start: 1,
            end: total_lines,
            scope: ScopeKey::Full,
        });
    }
    let start = offset.unwrap_or(1);
    if start < 1 {
        return Err(CacheError::InvalidInput(
            "offset must be a positive integer".to_string(),
        ));
    }
    if start > total_lines {
        return Err(CacheError::InvalidInput(format!(
            "offset {start} exceeds total lines {total_lines}"
        )));
    }
    let end = match limit {
        Some(0) => {
            return Err(CacheError::InvalidInput(
                "limit must be a positive integer".to_string(),
            ));
        }
        None => total_lines,
        Some(l) => start.saturating_add(l - 1).min(total_lines),
    };
    Ok(ResolvedRange {
        start,
        end,
        scope: ScopeKey::canonical(start, end, total_lines),
    })
}
