//! Slash commands: `readcache-status` and `readcache-refresh`

use crate::refresh::invalidate;
use readcache_core::decision::DecisionEngine;
use readcache_core::meta::{self, ReadMode, READCACHE_NAMESPACE, READ_TOOL_NAME};
use readcache_core::replay::replay_boundary;
use readcache_core::scope::parse_range_suffix;
use readcache_core::session::{SessionEntry, SessionView};
use readcache_core::tools::ToolError;
use std::collections::HashMap;
use std::path::Path;

/// Command name: print cache status for the active session
pub const STATUS_COMMAND: &str = "readcache-status";

/// Command name: refresh a path or range
pub const REFRESH_COMMAND: &str = "readcache-refresh";

/// Rough bytes-per-token divisor for the savings estimate
const BYTES_PER_TOKEN: u64 = 4;

const MODE_ORDER: &[ReadMode] = &[
    ReadMode::Full,
    ReadMode::Unchanged,
    ReadMode::UnchangedRange,
    ReadMode::Diff,
    ReadMode::BaselineFallback,
];

/// Render the `readcache-status` report for the active session
pub async fn status_report(engine: &DecisionEngine, session: &dyn SessionView) -> String {
    let snapshot = engine.runtime().knowledge_for(session);

    let mut out = String::from("Read cache status\n");
    out.push_str(&format!(
        "  tracked: {} files, {} scopes\n",
        snapshot.map.path_count(),
        snapshot.map.scope_count()
    ));
    out.push_str(&format!(
        "  replay window: {} entries since {}\n",
        snapshot.entries_replayed, snapshot.boundary
    ));

    out.push_str("  modes:");
    for mode in MODE_ORDER {
        let count = snapshot.mode_counts.get(mode).copied().unwrap_or(0);
        out.push_str(&format!(" {}={}", mode.as_str(), count));
    }
    out.push('\n');

    let saved = estimate_tokens_saved(engine, session).await;
    out.push_str(&format!("  estimated tokens saved: ~{saved}\n"));

    let stats = engine.store().stats().await;
    out.push_str(&format!(
        "  object store: {} objects, {} bytes\n",
        stats.objects, stats.bytes
    ));
    out
}

/// Best-effort savings estimate over the current replay window
///
/// For every derived-mode read, the avoided cost is the stored full body
/// minus the payload actually served. Blobs that cannot be loaded are
/// skipped.
async fn estimate_tokens_saved(engine: &DecisionEngine, session: &dyn SessionView) -> u64 {
    let entries = session.branch_entries();
    let (start, _) = replay_boundary(&entries);

    let mut blob_sizes: HashMap<String, Option<u64>> = HashMap::new();
    let mut saved_bytes: u64 = 0;

    for entry in &entries[start..] {
        let SessionEntry::ToolResult { tool, details, .. } = entry else {
            continue;
        };
        if tool != READ_TOOL_NAME {
            continue;
        }
        let Some(read) = details.get(READCACHE_NAMESPACE).and_then(meta::parse_read_meta) else {
            continue;
        };
        if read.mode.is_anchor() {
            continue;
        }
        let full_bytes = match blob_sizes.get(&read.served_hash) {
            Some(cached) => *cached,
            None => {
                let loaded = engine
                    .store()
                    .load(&read.served_hash)
                    .await
                    .ok()
                    .flatten()
                    .map(|text| text.len() as u64);
                blob_sizes.insert(read.served_hash.clone(), loaded);
                loaded
            }
        };
        if let Some(full_bytes) = full_bytes {
            saved_bytes += full_bytes.saturating_sub(read.bytes);
        }
    }
    saved_bytes / BYTES_PER_TOKEN
}

/// Execute `readcache-refresh <path> [start-end]`
pub async fn refresh_command(
    engine: &DecisionEngine,
    session: &dyn SessionView,
    cwd: &Path,
    args: &str,
) -> Result<String, ToolError> {
    let mut parts = args.split_whitespace();
    let path = parts.next().ok_or_else(|| {
        ToolError::InvalidArguments(format!("usage: /{REFRESH_COMMAND} <path> [start-end]"))
    })?;

    let (offset, limit) = match parts.next() {
        Some(range) => match parse_range_suffix(range) {
            Some((start, end)) => (Some(start), Some(end - start + 1)),
            None => {
                return Err(ToolError::InvalidArguments(format!(
                    "invalid range {range:?}; expected n or n-m"
                )));
            }
        },
        None => (None, None),
    };

    let (path_key, scope) = invalidate(engine, session, cwd, path, offset, limit).await?;
    Ok(format!("Read cache refreshed for {path_key} ({scope})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::FsBaselineReader;
    use readcache_core::runtime::CacheRuntime;
    use readcache_core::session::MemorySession;
    use readcache_core::store::ObjectStore;
    use readcache_core::ReadCacheConfig;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn engine(repo: &Path) -> DecisionEngine {
        DecisionEngine::new(
            ReadCacheConfig::default(),
            Arc::new(ObjectStore::for_repo(repo)),
            Arc::new(CacheRuntime::new()),
            Arc::new(FsBaselineReader::default()),
        )
    }

    #[tokio::test]
    async fn status_reports_empty_session() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(tmp.path());
        let session = MemorySession::with_id("s");

        let report = status_report(&engine, &session).await;
        assert!(report.contains("tracked: 0 files, 0 scopes"));
        assert!(report.contains("replay window: 0 entries since root"));
        assert!(report.contains("estimated tokens saved: ~0"));
    }

    #[tokio::test]
    async fn status_counts_tracked_scopes() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(tmp.path());
        let session = MemorySession::with_id("s");
        session.append_tool_result(
            "read",
            serde_json::json!({
                "readcache": {
                    "v": 1,
                    "pathKey": "/a.txt",
                    "scopeKey": "full",
                    "servedHash": "a".repeat(64),
                    "mode": "full",
                    "totalLines": 3,
                    "rangeStart": 1,
                    "rangeEnd": 3,
                    "bytes": 12
                }
            }),
        );

        let report = status_report(&engine, &session).await;
        assert!(report.contains("tracked: 1 files, 1 scopes"));
        assert!(report.contains("full=1"));
    }

    #[tokio::test]
    async fn refresh_command_requires_a_path() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(tmp.path());
        let session = MemorySession::with_id("s");

        let err = refresh_command(&engine, &session, tmp.path(), "")
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn refresh_command_parses_trailing_range() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.txt");
        let body: String = (1..=10).map(|i| format!("line {i}\n")).collect();
        std::fs::write(&file, body).unwrap();

        let engine = engine(tmp.path());
        let session = MemorySession::with_id("s");

        let message = refresh_command(&engine, &session, tmp.path(), "a.txt 2-5")
            .await
            .unwrap();
        assert!(message.contains("r:2:5"));

        let err = refresh_command(&engine, &session, tmp.path(), "a.txt 5-2")
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
