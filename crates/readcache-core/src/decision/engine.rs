//! The read-decision engine
//!
//! Entry point of the read-tool override. For each request it computes the
//! current content hash, consults replayed trust for the active leaf, and
//! chooses among full output, an unchanged marker, a unified diff, or a
//! baseline fallback. Any uncertainty degrades to baseline content: the
//! user-visible outcome is never less informative than the plain read.

use crate::baseline::{BaselineEnvelope, BaselineReader, ContentBlock, Truncation};
use crate::config::ReadCacheConfig;
use crate::decision::diff::unified_diff;
use crate::error::{CacheError, CacheResult};
use crate::meta::{ReadMeta, ReadMode, META_VERSION};
use crate::runtime::{CacheRuntime, SessionEvent};
use crate::scope::{normalize_range, parse_range_suffix, ResolvedRange, ScopeKey};
use crate::session::SessionView;
use crate::store::ObjectStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use wildmatch::WildMatch;

/// File-name patterns that always bypass the cache
const SENSITIVE_PATTERNS: &[&str] = &[
    ".env*",
    "*.pem",
    "*.key",
    "*.p12",
    "*.pfx",
    "*.crt",
    "*.cer",
    "*.der",
    "*.pk8",
    "id_rsa",
    "id_ed25519",
    ".npmrc",
    ".netrc",
];

/// A normalized read request
#[derive(Debug, Clone, Default)]
pub struct ReadRequest {
    /// Raw path as supplied by the caller; may carry a `:n` / `:n-m` suffix
    pub path: String,
    /// 1-based start line
    pub offset: Option<u32>,
    /// Maximum number of lines
    pub limit: Option<u32>,
    /// Skip trust consultation and serve full content
    pub bypass: bool,
}

/// Host-provided invocation context
pub struct ReadContext<'a> {
    pub session: &'a dyn SessionView,
    pub cwd: &'a Path,
    pub cancel: CancellationToken,
}

/// Outcome of a read decision
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub blocks: Vec<ContentBlock>,
    pub truncation: Option<Truncation>,
    /// The metadata record the host persists with the tool result; absent
    /// on passthrough paths (images, sensitive files, undecodable content)
    pub meta: Option<ReadMeta>,
}

impl ReadOutcome {
    fn passthrough(envelope: BaselineEnvelope) -> Self {
        Self {
            blocks: envelope.blocks,
            truncation: envelope.truncation,
            meta: None,
        }
    }

    /// Concatenated text content
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The decision mode, when a metadata record was attached
    pub fn mode(&self) -> Option<ReadMode> {
        self.meta.as_ref().map(|m| m.mode)
    }
}

/// Resolved request target after shorthand parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub path: PathBuf,
    pub offset: Option<u32>,
    pub limit: Option<u32>,
}

/// Resolve a raw path with optional `:n` / `:n-m` shorthand
///
/// Explicit `offset`/`limit` win and keep the raw path. Otherwise an
/// existing path is kept as-is; a non-existing path is split on the
/// rightmost `:`, and when the prefix resolves to a file the suffix must be
/// a well-formed range. A malformed suffix on a resolvable prefix is a
/// validation error, not a fail-open case.
pub async fn resolve_target(
    cwd: &Path,
    raw: &str,
    offset: Option<u32>,
    limit: Option<u32>,
) -> CacheResult<ResolvedTarget> {
    if offset == Some(0) {
        return Err(CacheError::InvalidInput(
            "offset must be a positive integer".to_string(),
        ));
    }
    if limit == Some(0) {
        return Err(CacheError::InvalidInput(
            "limit must be a positive integer".to_string(),
        ));
    }

    let absolutize = |s: &str| {
        let p = Path::new(s);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            cwd.join(p)
        }
    };

    let path = absolutize(raw);
    if offset.is_some() || limit.is_some() {
        return Ok(ResolvedTarget {
            path,
            offset,
            limit,
        });
    }
    if fs::try_exists(&path).await.unwrap_or(false) {
        return Ok(ResolvedTarget {
            path,
            offset: None,
            limit: None,
        });
    }
    if let Some((prefix, suffix)) = raw.rsplit_once(':') {
        if !prefix.is_empty() {
            let candidate = absolutize(prefix);
            if fs::try_exists(&candidate).await.unwrap_or(false) {
                return match parse_range_suffix(suffix) {
                    Some((start, end)) => Ok(ResolvedTarget {
                        path: candidate,
                        offset: Some(start),
                        limit: Some(end - start + 1),
                    }),
                    None => Err(CacheError::InvalidInput(format!(
                        "invalid range suffix {suffix:?} in {raw:?}"
                    ))),
                };
            }
        }
    }
    Ok(ResolvedTarget {
        path,
        offset: None,
        limit: None,
    })
}

/// Whether the resolved path matches the built-in sensitive set
pub fn is_sensitive_path(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    SENSITIVE_PATTERNS
        .iter()
        .any(|pattern| WildMatch::new(pattern).matches(name))
}

/// Canonical identity of a tracked file; symlinks resolved where possible
pub async fn canonical_path_key(path: &Path) -> String {
    match fs::canonicalize(path).await {
        Ok(resolved) => resolved.to_string_lossy().to_string(),
        Err(_) => path.to_string_lossy().to_string(),
    }
}

fn unchanged_full_marker(total_lines: u32) -> String {
    format!("[readcache: unchanged, {total_lines} lines]")
}

fn unchanged_range_marker(start: u32, end: u32, total_lines: u32) -> String {
    format!("[readcache: unchanged in lines {start}-{end} of {total_lines}]")
}

fn unchanged_range_outside_marker(start: u32, end: u32) -> String {
    format!("[readcache: unchanged in lines {start}-{end}; changes exist outside this range]")
}

fn diff_marker(changed_lines: u64, total_lines: u32) -> String {
    format!("[readcache: {changed_lines} lines changed of {total_lines}]")
}

fn slice_lines(text: &str, start: u32, end: u32) -> Vec<&str> {
    text.lines()
        .skip(start as usize - 1)
        .take((end - start + 1) as usize)
        .collect()
}

fn ensure_live(cancel: &CancellationToken) -> CacheResult<()> {
    if cancel.is_cancelled() {
        Err(CacheError::Aborted)
    } else {
        Ok(())
    }
}

enum Body {
    /// Compact marker or diff payload replacing the baseline text
    Synthetic(String),
    /// The baseline envelope as produced by the host
    Baseline(BaselineEnvelope),
}

/// The read-decision engine
pub struct DecisionEngine {
    config: ReadCacheConfig,
    store: Arc<ObjectStore>,
    runtime: Arc<CacheRuntime>,
    baseline: Arc<dyn BaselineReader>,
}

impl DecisionEngine {
    pub fn new(
        config: ReadCacheConfig,
        store: Arc<ObjectStore>,
        runtime: Arc<CacheRuntime>,
        baseline: Arc<dyn BaselineReader>,
    ) -> Self {
        Self {
            config,
            store,
            runtime,
            baseline,
        }
    }

    pub fn config(&self) -> &ReadCacheConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ObjectStore> {
        &self.store
    }

    pub fn runtime(&self) -> &Arc<CacheRuntime> {
        &self.runtime
    }

    /// React to a host lifecycle notification
    ///
    /// Session start spawns the age-based object sweep; every other event
    /// discards the runtime caches wholesale.
    pub fn on_session_event(&self, event: SessionEvent) {
        self.runtime.on_session_event(event);
        if event == SessionEvent::Start {
            let store = Arc::clone(&self.store);
            let max_age_ms = self.config.retention_ms();
            tokio::spawn(async move {
                let now_ms = chrono::Utc::now().timestamp_millis() as u64;
                let outcome = store.prune_older_than(max_age_ms, now_ms).await;
                debug!(
                    scanned = outcome.scanned,
                    deleted = outcome.deleted,
                    "object store sweep finished"
                );
            });
        }
    }

    /// Decide the response for one read request
    pub async fn read(
        &self,
        ctx: &ReadContext<'_>,
        req: &ReadRequest,
    ) -> CacheResult<ReadOutcome> {
        ensure_live(&ctx.cancel)?;

        let target = resolve_target(ctx.cwd, &req.path, req.offset, req.limit).await?;
        let envelope = self
            .baseline
            .read(&target.path, target.offset, target.limit)
            .await?;

        if envelope.has_images() {
            return Ok(ReadOutcome::passthrough(envelope));
        }
        if !self.config.enabled || is_sensitive_path(&target.path) {
            return Ok(ReadOutcome::passthrough(envelope));
        }

        ensure_live(&ctx.cancel)?;
        let content = match fs::read(&target.path).await {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    debug!(path = %target.path.display(), "non-UTF-8 content bypasses cache");
                    return Ok(ReadOutcome::passthrough(envelope));
                }
            },
            Err(e) => {
                debug!(path = %target.path.display(), error = %e, "content read failed");
                return Ok(ReadOutcome::passthrough(envelope));
            }
        };

        let total_lines = (content.lines().count() as u32).max(1);
        let range = normalize_range(target.offset, target.limit, total_lines)?;
        let path_key = canonical_path_key(&target.path).await;
        let current_hash = ObjectStore::hash_text(&content);

        if req.bypass {
            return self
                .finish(
                    ctx,
                    &path_key,
                    &range,
                    total_lines,
                    &current_hash,
                    &content,
                    None,
                    ReadMode::Full,
                    Body::Baseline(envelope),
                )
                .await;
        }

        let snapshot = self.runtime.knowledge_for(ctx.session);
        let Some(candidate) = snapshot.base_candidate(&path_key, &range.scope) else {
            return self
                .finish(
                    ctx,
                    &path_key,
                    &range,
                    total_lines,
                    &current_hash,
                    &content,
                    None,
                    ReadMode::Full,
                    Body::Baseline(envelope),
                )
                .await;
        };

        if candidate.hash == current_hash {
            let (mode, marker) = match range.scope {
                ScopeKey::Full => (ReadMode::Unchanged, unchanged_full_marker(total_lines)),
                ScopeKey::Range { .. } => (
                    ReadMode::UnchangedRange,
                    unchanged_range_marker(range.start, range.end, total_lines),
                ),
            };
            return self
                .finish(
                    ctx,
                    &path_key,
                    &range,
                    total_lines,
                    &current_hash,
                    &content,
                    Some(candidate.hash.clone()),
                    mode,
                    Body::Synthetic(marker),
                )
                .await;
        }

        ensure_live(&ctx.cancel)?;
        let base_text = match self.store.load(&candidate.hash).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!(hash = %candidate.hash, "base object missing");
                return self
                    .finish(
                        ctx,
                        &path_key,
                        &range,
                        total_lines,
                        &current_hash,
                        &content,
                        Some(candidate.hash.clone()),
                        ReadMode::BaselineFallback,
                        Body::Baseline(envelope),
                    )
                    .await;
            }
            Err(e) => {
                warn!(hash = %candidate.hash, error = %e, "base object load failed");
                return self
                    .finish(
                        ctx,
                        &path_key,
                        &range,
                        total_lines,
                        &current_hash,
                        &content,
                        Some(candidate.hash.clone()),
                        ReadMode::BaselineFallback,
                        Body::Baseline(envelope),
                    )
                    .await;
            }
        };

        match range.scope {
            ScopeKey::Range { .. } => {
                // Compare the exact requested slice; no range-level diffs.
                let base_slice = slice_lines(&base_text, range.start, range.end);
                let current_slice = slice_lines(&content, range.start, range.end);
                if base_slice == current_slice {
                    self.finish(
                        ctx,
                        &path_key,
                        &range,
                        total_lines,
                        &current_hash,
                        &content,
                        Some(candidate.hash.clone()),
                        ReadMode::UnchangedRange,
                        Body::Synthetic(unchanged_range_outside_marker(range.start, range.end)),
                    )
                    .await
                } else {
                    self.finish(
                        ctx,
                        &path_key,
                        &range,
                        total_lines,
                        &current_hash,
                        &content,
                        Some(candidate.hash.clone()),
                        ReadMode::BaselineFallback,
                        Body::Baseline(envelope),
                    )
                    .await
                }
            }
            ScopeKey::Full => {
                self.decide_diff(
                    ctx,
                    &path_key,
                    &range,
                    total_lines,
                    &current_hash,
                    &content,
                    &candidate.hash,
                    &base_text,
                    envelope,
                )
                .await
            }
        }
    }

    /// Full-scope pipeline once the base blob is in hand and hashes differ
    #[allow(clippy::too_many_arguments)]
    async fn decide_diff(
        &self,
        ctx: &ReadContext<'_>,
        path_key: &str,
        range: &ResolvedRange,
        total_lines: u32,
        current_hash: &str,
        content: &str,
        base_hash: &str,
        base_text: &str,
        envelope: BaselineEnvelope,
    ) -> CacheResult<ReadOutcome> {
        let fallback = |body: BaselineEnvelope| {
            (
                ReadMode::BaselineFallback,
                Body::Baseline(body),
            )
        };

        let base_bytes = base_text.len() as u64;
        let current_bytes = content.len() as u64;
        let base_lines = base_text.lines().count() as u32;

        let decision = if base_bytes.max(current_bytes) > self.config.diff_max_bytes {
            fallback(envelope)
        } else if base_lines.max(total_lines) > self.config.diff_max_lines {
            fallback(envelope)
        } else {
            ensure_live(&ctx.cancel)?;
            match unified_diff(path_key, base_text, content) {
                None => fallback(envelope),
                Some(diff) => {
                    let useful = (diff.text.len() as u64) < current_bytes
                        && diff.changed_lines <= total_lines as u64;
                    let truncates = diff.text.lines().count() as u32 > self.config.baseline_max_lines
                        || diff
                            .text
                            .lines()
                            .any(|l| l.len() > self.config.max_line_length);
                    if !useful || truncates {
                        fallback(envelope)
                    } else {
                        let payload = format!(
                            "{}\n{}",
                            diff_marker(diff.changed_lines, total_lines),
                            diff.text
                        );
                        (ReadMode::Diff, Body::Synthetic(payload))
                    }
                }
            }
        };

        let (mode, body) = decision;
        self.finish(
            ctx,
            path_key,
            range,
            total_lines,
            current_hash,
            content,
            Some(base_hash.to_string()),
            mode,
            body,
        )
        .await
    }

    /// Common completion path: persist the current blob, update the
    /// overlay, and assemble the outcome with its metadata record
    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        ctx: &ReadContext<'_>,
        path_key: &str,
        range: &ResolvedRange,
        total_lines: u32,
        current_hash: &str,
        content: &str,
        base_hash: Option<String>,
        mode: ReadMode,
        body: Body,
    ) -> CacheResult<ReadOutcome> {
        ensure_live(&ctx.cancel)?;

        if let Err(e) = self.store.put_if_absent(current_hash, content).await {
            warn!(hash = %current_hash, error = %e, "object persist failed");
        }

        let session_id = ctx.session.session_id();
        let leaf_id = ctx.session.leaf_id().unwrap_or_else(|| "root".to_string());
        self.runtime.record_overlay(
            &session_id,
            &leaf_id,
            path_key,
            range.scope.clone(),
            current_hash,
            mode.is_anchor(),
        );

        let (blocks, truncation, served_bytes) = match body {
            Body::Synthetic(text) => {
                let bytes = text.len() as u64;
                (vec![ContentBlock::text(text)], None, bytes)
            }
            Body::Baseline(envelope) => {
                let bytes = envelope.text().len() as u64;
                (envelope.blocks, envelope.truncation, bytes)
            }
        };

        let meta = ReadMeta {
            v: META_VERSION,
            path_key: path_key.to_string(),
            scope_key: range.scope.clone(),
            served_hash: current_hash.to_string(),
            base_hash,
            mode,
            total_lines,
            range_start: range.start,
            range_end: range.end.max(range.start),
            bytes: served_bytes,
        };

        Ok(ReadOutcome {
            blocks,
            truncation,
            meta: Some(meta),
        })
    }
}
