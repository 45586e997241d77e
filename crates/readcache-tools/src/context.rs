//! Host invocation context shared by the cache tools

use readcache_core::session::SessionView;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything the host supplies when registering the cache tools
#[derive(Clone)]
pub struct HostContext {
    /// Facade over the host's session storage
    pub session: Arc<dyn SessionView>,
    /// Working directory relative paths resolve against
    pub cwd: PathBuf,
    /// Cooperative cancellation signal for in-flight calls
    pub cancel: CancellationToken,
}

impl HostContext {
    pub fn new(session: Arc<dyn SessionView>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            session,
            cwd: cwd.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the cancellation token, e.g. per tool call
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}
