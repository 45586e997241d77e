//! Host-facing tools of the pi read-cache
//!
//! This crate wires the `readcache-core` decision engine into the host's
//! tool surface:
//!
//! - [`ReadCacheTool`], the `read` tool override
//! - [`RefreshTool`], the `readcache_refresh` tool
//! - [`commands`], the `readcache-status` / `readcache-refresh` slash
//!   commands
//! - [`FsBaselineReader`], the filesystem baseline used when the host
//!   supplies no reader of its own
//!
//! The host registers the tools once at startup, supplies a
//! [`HostContext`] per session, and forwards its lifecycle notifications to
//! [`readcache_core::DecisionEngine::on_session_event`].

pub mod baseline;
pub mod commands;
pub mod context;
pub mod read;
pub mod refresh;

pub use baseline::FsBaselineReader;
pub use context::HostContext;
pub use read::ReadCacheTool;
pub use refresh::{invalidate, RefreshTool};
