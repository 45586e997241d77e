//! The `readcache_refresh` tool
//!
//! Forces the next read of a scope to serve full content: appends an
//! invalidation record to the session under the reserved namespace and
//! clears the runtime caches. The invalidation replays on resume, so the
//! refresh survives restarts.

use crate::context::HostContext;
use async_trait::async_trait;
use readcache_core::decision::{canonical_path_key, resolve_target, DecisionEngine};
use readcache_core::error::CacheResult;
use readcache_core::meta::{Invalidation, READCACHE_NAMESPACE};
use readcache_core::scope::{normalize_range, ScopeKey};
use readcache_core::session::SessionView;
use readcache_core::tools::{Tool, ToolCall, ToolError, ToolParameter, ToolResult, ToolSchema};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Normalize a refresh target and append its invalidation to the session
///
/// Returns the `(pathKey, scopeKey)` that was invalidated. The current file
/// is consulted best-effort so a range spanning the whole file collapses to
/// a full-scope invalidation; an unreadable file falls back to the literal
/// range.
pub async fn invalidate(
    engine: &DecisionEngine,
    session: &dyn SessionView,
    cwd: &Path,
    raw_path: &str,
    offset: Option<u32>,
    limit: Option<u32>,
) -> CacheResult<(String, ScopeKey)> {
    let target = resolve_target(cwd, raw_path, offset, limit).await?;
    let path_key = canonical_path_key(&target.path).await;

    let scope = match (target.offset, target.limit) {
        (None, None) => ScopeKey::Full,
        (offset, limit) => match tokio::fs::read_to_string(&target.path).await {
            Ok(content) => {
                let total_lines = (content.lines().count() as u32).max(1);
                normalize_range(offset, limit, total_lines)?.scope
            }
            Err(_) => {
                let start = offset.unwrap_or(1);
                limit
                    .and_then(|l| ScopeKey::range(start, start.saturating_add(l - 1)))
                    .unwrap_or(ScopeKey::Full)
            }
        },
    };

    let record = Invalidation::new(
        path_key.clone(),
        scope.clone(),
        chrono::Utc::now().timestamp_millis(),
    );
    session.append_custom(READCACHE_NAMESPACE, record.to_value());
    engine.runtime().clear_all();
    info!(path = %path_key, scope = %scope, "read cache refreshed");

    Ok((path_key, scope))
}

/// Refresh tool backed by the cache decision engine
pub struct RefreshTool {
    engine: Arc<DecisionEngine>,
    context: Option<HostContext>,
}

impl RefreshTool {
    pub fn new(engine: Arc<DecisionEngine>) -> Self {
        Self {
            engine,
            context: None,
        }
    }

    pub fn with_context(engine: Arc<DecisionEngine>, context: HostContext) -> Self {
        Self {
            engine,
            context: Some(context),
        }
    }
}

#[async_trait]
impl Tool for RefreshTool {
    fn name(&self) -> &str {
        "readcache_refresh"
    }

    fn description(&self) -> &str {
        "Forgets what the read cache knows about a file or line range, so the \
next read serves full content again."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            self.name(),
            self.description(),
            vec![
                ToolParameter::string("path", "Path to the file to refresh"),
                ToolParameter::number("offset", "Start line of the range to refresh (1-based)")
                    .optional(),
                ToolParameter::number("limit", "Number of lines to refresh").optional(),
            ],
        )
    }

    fn validate(&self, call: &ToolCall) -> Result<(), ToolError> {
        if call.get_string("path").is_none() {
            return Err(ToolError::InvalidArguments(
                "Missing 'path' parameter".to_string(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        self.validate(call)?;
        let context = self.context.as_ref().ok_or_else(|| {
            ToolError::MissingContext("refresh tool requires a host session context".to_string())
        })?;

        let path = call.get_string("path").unwrap_or_default();
        let (path_key, scope) = invalidate(
            &self.engine,
            context.session.as_ref(),
            &context.cwd,
            &path,
            call.get_u32("offset"),
            call.get_u32("limit"),
        )
        .await?;

        Ok(ToolResult::success(
            &call.id,
            self.name(),
            format!("Read cache refreshed for {path_key} ({scope})"),
        ))
    }
}
