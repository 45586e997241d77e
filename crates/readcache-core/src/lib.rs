//! Read-cache core for the pi coding agent
//!
//! Intercepts the agent's file-read tool and decides, per request, whether
//! the model has already observed the current content of a file scope
//! within its active context. When it provably has, the cache returns a
//! compact marker or a unified diff instead of the full bytes; on any
//! uncertainty it degrades to the host's baseline read.
//!
//! # Key Components
//!
//! - [`replay`] reconstructs per-scope trust for the active branch from
//!   persisted session entries, under a strict compaction barrier
//! - [`decision`] provides the [`decision::DecisionEngine`] invoked by the
//!   read override: base selection, mode choice, the diff pipeline
//! - [`store`] is the content-addressed [`store::ObjectStore`] holding
//!   hashed snapshots so diffs survive restarts
//! - [`meta`] is the fail-open codec for the persisted `ReadMeta` and
//!   `Invalidation` records
//! - [`runtime`] holds memoized replay results, per-leaf overlays, and
//!   lifecycle-event clearing
//! - [`session`] defines the [`session::SessionView`] facade over host
//!   storage, with an in-memory implementation for tests
//! - [`tools`] is the tool contract the host registers against
//!
//! The host-facing tool implementations live in the `readcache-tools`
//! crate.

pub mod baseline;
pub mod config;
pub mod decision;
pub mod error;
pub mod meta;
pub mod replay;
pub mod runtime;
pub mod scope;
pub mod session;
pub mod store;
pub mod tools;

pub use baseline::{BaselineEnvelope, BaselineReader, ContentBlock, Truncation};
pub use config::ReadCacheConfig;
pub use decision::{DecisionEngine, ReadContext, ReadOutcome, ReadRequest};
pub use error::{CacheError, CacheResult};
pub use meta::{Invalidation, ReadMeta, ReadMode, READCACHE_NAMESPACE, READ_TOOL_NAME};
pub use replay::{KnowledgeMap, ReplayedKnowledge, ScopeTrust};
pub use runtime::{CacheRuntime, KnowledgeSnapshot, SessionEvent, OVERLAY_SEQ_BASE};
pub use scope::ScopeKey;
pub use session::{MemorySession, SessionEntry, SessionView};
pub use store::{ObjectStore, PruneOutcome, StoreStats};
pub use tools::{Tool, ToolCall, ToolError, ToolParameter, ToolResult, ToolSchema};
