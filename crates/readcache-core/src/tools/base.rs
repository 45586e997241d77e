//! Base trait for tools exposed to the host

use crate::error::CacheError;
use crate::tools::types::{ToolCall, ToolResult, ToolSchema};
use async_trait::async_trait;

/// Error type for tool operations
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Invalid arguments provided to the tool
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Tool execution failed
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// The tool requires a host-provided context
    #[error("Missing context: {0}")]
    MissingContext(String),

    /// Execution was aborted through the cancellation signal
    #[error("Execution aborted")]
    Aborted,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<CacheError> for ToolError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::InvalidInput(msg) => ToolError::InvalidArguments(msg),
            CacheError::MissingContext => {
                ToolError::MissingContext("read cache requires a host session".to_string())
            }
            CacheError::Aborted => ToolError::Aborted,
            other => ToolError::ExecutionFailed(other.to_string()),
        }
    }
}

/// Base trait for all tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's name
    fn name(&self) -> &str;

    /// Get the tool's description
    fn description(&self) -> &str;

    /// Get the tool's JSON schema
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with the given arguments
    async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError>;

    /// Validate the tool call arguments (optional override)
    fn validate(&self, call: &ToolCall) -> Result<(), ToolError> {
        let _ = call;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_errors_map_to_tool_errors() {
        assert!(matches!(
            ToolError::from(CacheError::InvalidInput("bad".into())),
            ToolError::InvalidArguments(_)
        ));
        assert!(matches!(
            ToolError::from(CacheError::MissingContext),
            ToolError::MissingContext(_)
        ));
        assert!(matches!(
            ToolError::from(CacheError::Aborted),
            ToolError::Aborted
        ));
        assert!(matches!(
            ToolError::from(CacheError::storage("oops")),
            ToolError::ExecutionFailed(_)
        ));
    }
}
