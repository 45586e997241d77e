//! Contract for the host's baseline read implementation
//!
//! The cache never re-implements the host's read semantics; it delegates to
//! a [`BaselineReader`] and degrades to its output whenever cache
//! correctness cannot be guaranteed. The envelope mirrors the host's result
//! shape: content blocks plus an optional truncation record.

use crate::error::CacheResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One block of baseline output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { media_type: String, path: PathBuf },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Truncation record the host attaches when the line budget fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Truncation {
    pub shown_start: u32,
    pub shown_end: u32,
    pub total_lines: u32,
}

/// Result envelope of a baseline read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaselineEnvelope {
    pub blocks: Vec<ContentBlock>,
    pub truncation: Option<Truncation>,
}

impl BaselineEnvelope {
    /// Envelope holding a single text block
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            blocks: vec![ContentBlock::text(text)],
            truncation: None,
        }
    }

    /// Concatenated text content of the envelope
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

    /// Whether any block is an image; image results bypass the cache
    pub fn has_images(&self) -> bool {
        self.blocks
            .iter()
            .any(|b| matches!(b, ContentBlock::Image { .. }))
    }
}

/// The host's unmodified read implementation
#[async_trait]
pub trait BaselineReader: Send + Sync {
    /// Read a file slice; `offset`/`limit` are 1-based line parameters
    async fn read(
        &self,
        path: &Path,
        offset: Option<u32>,
        limit: Option<u32>,
    ) -> CacheResult<BaselineEnvelope>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_concatenation_skips_images() {
        let envelope = BaselineEnvelope {
            blocks: vec![
                ContentBlock::text("alpha"),
                ContentBlock::Image {
                    media_type: "image/png".into(),
                    path: PathBuf::from("/x.png"),
                },
                ContentBlock::text("beta"),
            ],
            truncation: None,
        };
        assert_eq!(envelope.text(), "alpha\nbeta");
        assert!(envelope.has_images());
    }

    #[test]
    fn from_text_builds_single_block() {
        let envelope = BaselineEnvelope::from_text("body");
        assert_eq!(envelope.blocks.len(), 1);
        assert!(!envelope.has_images());
    }
}
