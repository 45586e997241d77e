//! The `read` tool override
//!
//! Keeps the host's built-in read surface (`path`, `offset`, `limit`) and
//! adds the `bypass` flag. All decisions are delegated to the core engine;
//! the tool only maps arguments in and the outcome's metadata record out
//! into the result's details area.

use crate::context::HostContext;
use async_trait::async_trait;
use readcache_core::decision::{DecisionEngine, ReadContext, ReadRequest};
use readcache_core::tools::{Tool, ToolCall, ToolError, ToolParameter, ToolResult, ToolSchema};
use readcache_core::READCACHE_NAMESPACE;
use std::sync::Arc;

/// Read tool backed by the cache decision engine
pub struct ReadCacheTool {
    engine: Arc<DecisionEngine>,
    context: Option<HostContext>,
}

impl ReadCacheTool {
    /// Create a tool without a context; execution fails until the host
    /// provides one
    pub fn new(engine: Arc<DecisionEngine>) -> Self {
        Self {
            engine,
            context: None,
        }
    }

    /// Create a tool bound to a host context
    pub fn with_context(engine: Arc<DecisionEngine>, context: HostContext) -> Self {
        Self {
            engine,
            context: Some(context),
        }
    }

    fn require_context(&self) -> Result<&HostContext, ToolError> {
        self.context.as_ref().ok_or_else(|| {
            ToolError::MissingContext("read tool requires a host session context".to_string())
        })
    }
}

#[async_trait]
impl Tool for ReadCacheTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Reads a file from the local filesystem with line numbers.

When the current content of the requested scope was already shown earlier \
in this conversation, returns a compact unchanged marker or a diff against \
the last seen version instead of the full bytes. Pass bypass=true to force \
full content.

Usage:
- Read a file: {\"path\": \"/path/to/file.txt\"}
- Read a range: {\"path\": \"/path/to/file.txt\", \"offset\": 100, \"limit\": 50}
- Range shorthand: {\"path\": \"/path/to/file.txt:100-149\"}"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            self.name(),
            self.description(),
            vec![
                ToolParameter::string("path", "Path to the file to read"),
                ToolParameter::number("offset", "Line number to start reading from (1-based)")
                    .optional(),
                ToolParameter::number("limit", "Maximum number of lines to read").optional(),
                ToolParameter::boolean("bypass", "Serve full content, skipping the cache")
                    .optional(),
            ],
        )
    }

    fn validate(&self, call: &ToolCall) -> Result<(), ToolError> {
        if call.get_string("path").is_none() {
            return Err(ToolError::InvalidArguments(
                "Missing 'path' parameter".to_string(),
            ));
        }
        for key in ["offset", "limit"] {
            if call.arguments.contains_key(key) {
                match call.get_u32(key) {
                    Some(v) if v >= 1 => {}
                    _ => {
                        return Err(ToolError::InvalidArguments(format!(
                            "'{key}' must be a positive integer"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        self.validate(call)?;
        let context = self.require_context()?;

        let request = ReadRequest {
            path: call.get_string("path").unwrap_or_default(),
            offset: call.get_u32("offset"),
            limit: call.get_u32("limit"),
            bypass: call.get_bool("bypass").unwrap_or(false),
        };
        let ctx = ReadContext {
            session: context.session.as_ref(),
            cwd: &context.cwd,
            cancel: context.cancel.clone(),
        };

        let outcome = self.engine.read(&ctx, &request).await?;

        let mut result = ToolResult::success(&call.id, self.name(), outcome.text());
        if let Some(meta) = &outcome.meta {
            result = result.with_metadata(READCACHE_NAMESPACE, meta.to_value());
        }
        if let Some(truncation) = &outcome.truncation {
            result = result.with_metadata("truncation", serde_json::to_value(truncation)?);
        }
        Ok(result)
    }
}
