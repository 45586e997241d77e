//! Configuration for the read cache

use serde::{Deserialize, Serialize};

/// Default object retention horizon for the start-of-session sweep
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Byte-size gate above which the diff pipeline degrades to baseline
pub const DEFAULT_DIFF_MAX_BYTES: u64 = 2 * 1024 * 1024;

/// Line-count gate above which the diff pipeline degrades to baseline
pub const DEFAULT_DIFF_MAX_LINES: u32 = 12_000;

/// Line budget shared with the baseline reader
pub const DEFAULT_BASELINE_MAX_LINES: u32 = 2_000;

/// Per-line character budget shared with the baseline reader
pub const DEFAULT_MAX_LINE_LENGTH: usize = 2_000;

/// Configuration for the read cache
///
/// Loaded by the host and handed to [`crate::decision::DecisionEngine`] at
/// construction. All limits have conservative defaults; the cache degrades
/// to plain baseline reads whenever a limit trips.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadCacheConfig {
    /// Master switch; when false every read is a plain baseline read
    pub enabled: bool,

    /// Age horizon in days for the object-store sweep at session start
    pub retention_days: u32,

    /// Maximum byte size of either side before diffing is skipped
    pub diff_max_bytes: u64,

    /// Maximum line count of either side before diffing is skipped
    pub diff_max_lines: u32,

    /// Maximum lines the baseline reader emits before truncating
    pub baseline_max_lines: u32,

    /// Maximum characters per emitted line before truncating
    pub max_line_length: usize,
}

impl Default for ReadCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_days: DEFAULT_RETENTION_DAYS,
            diff_max_bytes: DEFAULT_DIFF_MAX_BYTES,
            diff_max_lines: DEFAULT_DIFF_MAX_LINES,
            baseline_max_lines: DEFAULT_BASELINE_MAX_LINES,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl ReadCacheConfig {
    /// Retention horizon expressed in milliseconds
    pub fn retention_ms(&self) -> u64 {
        self.retention_days as u64 * 24 * 60 * 60 * 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ReadCacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.retention_days, 30);
        assert_eq!(config.diff_max_bytes, 2 * 1024 * 1024);
        assert_eq!(config.diff_max_lines, 12_000);
    }

    #[test]
    fn retention_in_millis() {
        let config = ReadCacheConfig {
            retention_days: 1,
            ..Default::default()
        };
        assert_eq!(config.retention_ms(), 86_400_000);
    }

    #[test]
    fn roundtrips_through_json() {
        let config = ReadCacheConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ReadCacheConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.baseline_max_lines, config.baseline_max_lines);
    }
}
