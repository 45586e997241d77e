//! Filesystem baseline reader
//!
//! The default [`BaselineReader`] wired in when the host supplies none.
//! Mirrors the host's built-in read: line-numbered output, 1-based
//! offset/limit pagination, long-line truncation, binary and image
//! detection. Image results come back as image blocks and bypass the cache
//! entirely.

use async_trait::async_trait;
use readcache_core::baseline::{BaselineEnvelope, BaselineReader, ContentBlock, Truncation};
use readcache_core::config::ReadCacheConfig;
use readcache_core::error::{CacheError, CacheResult};
use std::path::Path;
use tokio::fs;

/// Files larger than this are refused outright
const MAX_FILE_BYTES: u64 = 100 * 1024 * 1024;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp", "ico"];

/// Baseline reader over the local filesystem
pub struct FsBaselineReader {
    max_lines: u32,
    max_line_length: usize,
}

impl FsBaselineReader {
    /// Create a reader with the cache configuration's line budgets
    pub fn new(config: &ReadCacheConfig) -> Self {
        Self {
            max_lines: config.baseline_max_lines,
            max_line_length: config.max_line_length,
        }
    }

    /// Create a reader with explicit budgets
    pub fn with_limits(max_lines: u32, max_line_length: usize) -> Self {
        Self {
            max_lines,
            max_line_length,
        }
    }
}

impl Default for FsBaselineReader {
    fn default() -> Self {
        Self::new(&ReadCacheConfig::default())
    }
}

#[async_trait]
impl BaselineReader for FsBaselineReader {
    async fn read(
        &self,
        path: &Path,
        offset: Option<u32>,
        limit: Option<u32>,
    ) -> CacheResult<BaselineEnvelope> {
        let metadata = fs::metadata(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CacheError::io_at("File not found", path.display().to_string())
            } else {
                CacheError::io_at(e.to_string(), path.display().to_string())
            }
        })?;

        if metadata.is_dir() {
            return Err(CacheError::io_at(
                "Path is a directory, not a file",
                path.display().to_string(),
            ));
        }
        if metadata.len() > MAX_FILE_BYTES {
            return Err(CacheError::io_at(
                format!("File too large to read: {} bytes", metadata.len()),
                path.display().to_string(),
            ));
        }

        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            let ext = ext.to_ascii_lowercase();
            if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
                return Ok(BaselineEnvelope {
                    blocks: vec![ContentBlock::Image {
                        media_type: format!("image/{ext}"),
                        path: path.to_path_buf(),
                    }],
                    truncation: None,
                });
            }
        }

        let bytes = fs::read(path)
            .await
            .map_err(|e| CacheError::io_at(e.to_string(), path.display().to_string()))?;
        let content = match String::from_utf8(bytes) {
            Ok(content) => content,
            Err(_) => {
                return Ok(BaselineEnvelope::from_text(format!(
                    "[Binary file: {}]\n\nFile contains non-UTF-8 data and cannot be displayed as text.\nFile size: {} bytes",
                    path.display(),
                    metadata.len()
                )));
            }
        };

        let lines: Vec<&str> = content.lines().collect();
        let total_lines = lines.len();
        if total_lines == 0 {
            return Ok(BaselineEnvelope::from_text(""));
        }

        let start = offset.unwrap_or(1) as usize;
        if start > total_lines {
            return Err(CacheError::InvalidInput(format!(
                "offset {start} exceeds total lines {total_lines}"
            )));
        }
        let end = match limit {
            Some(limit) => (start + limit as usize - 1).min(total_lines),
            None => (start + self.max_lines as usize - 1).min(total_lines),
        };

        let mut formatted: Vec<String> = Vec::with_capacity(end - start + 1);
        for (idx, line) in lines[start - 1..end].iter().enumerate() {
            let line_num = start + idx;
            let rendered = if line.len() > self.max_line_length {
                format!(
                    "{}... [line truncated, {} chars total]",
                    &line[..self.max_line_length],
                    line.len()
                )
            } else {
                (*line).to_string()
            };
            formatted.push(format!("{line_num:>6}→{rendered}"));
        }
        let mut output = formatted.join("\n");

        // The line budget only truncates unbounded reads; an explicit limit
        // is a slice, not a truncation.
        let truncation = if limit.is_none() && end < total_lines {
            output.push_str(&format!(
                "\n\n[Content truncated: showing lines {start}-{end} of {total_lines} total lines. Use offset parameter to read more.]"
            ));
            Some(Truncation {
                shown_start: start as u32,
                shown_end: end as u32,
                total_lines: total_lines as u32,
            })
        } else {
            None
        };

        Ok(BaselineEnvelope {
            blocks: vec![ContentBlock::text(output)],
            truncation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn reader() -> FsBaselineReader {
        FsBaselineReader::default()
    }

    #[tokio::test]
    async fn reads_with_line_numbers() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        std::fs::write(&path, "alpha\nbeta\ngamma").unwrap();

        let envelope = reader().read(&path, None, None).await.unwrap();
        let text = envelope.text();
        assert!(text.contains("     1→alpha"));
        assert!(text.contains("     3→gamma"));
        assert!(envelope.truncation.is_none());
    }

    #[tokio::test]
    async fn paginates_with_offset_and_limit() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        let body: String = (1..=20).map(|i| format!("line {i}\n")).collect();
        std::fs::write(&path, body).unwrap();

        let envelope = reader().read(&path, Some(11), Some(5)).await.unwrap();
        let text = envelope.text();
        assert!(text.contains("    11→line 11"));
        assert!(text.contains("    15→line 15"));
        assert!(!text.contains("line 10"));
        assert!(!text.contains("line 16"));
        assert!(envelope.truncation.is_none(), "explicit limit is a slice");
    }

    #[tokio::test]
    async fn unbounded_reads_truncate_at_budget() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        let body: String = (1..=50).map(|i| format!("line {i}\n")).collect();
        std::fs::write(&path, body).unwrap();

        let envelope = FsBaselineReader::with_limits(10, 2000)
            .read(&path, None, None)
            .await
            .unwrap();
        let truncation = envelope.truncation.unwrap();
        assert_eq!(truncation.shown_end, 10);
        assert_eq!(truncation.total_lines, 50);
        assert!(envelope.text().contains("[Content truncated"));
    }

    #[tokio::test]
    async fn long_lines_are_clipped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        std::fs::write(&path, "x".repeat(3000)).unwrap();

        let envelope = reader().read(&path, None, None).await.unwrap();
        assert!(envelope.text().contains("[line truncated, 3000 chars total]"));
    }

    #[tokio::test]
    async fn offset_past_eof_is_validation_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        std::fs::write(&path, "one\ntwo").unwrap();

        let err = reader().read(&path, Some(5), None).await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let err = reader()
            .read(&tmp.path().join("nope.txt"), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Io { .. }));
    }

    #[tokio::test]
    async fn directories_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = reader().read(tmp.path(), None, None).await.unwrap_err();
        assert!(matches!(err, CacheError::Io { .. }));
    }

    #[tokio::test]
    async fn images_come_back_as_image_blocks() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("shot.png");
        std::fs::write(&path, [0x89, 0x50, 0x4e, 0x47]).unwrap();

        let envelope = reader().read(&path, None, None).await.unwrap();
        assert!(envelope.has_images());
    }

    #[tokio::test]
    async fn binary_content_is_described_not_dumped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blob.dat");
        std::fs::write(&path, [0xff, 0xfe, 0x00, 0x01]).unwrap();

        let envelope = reader().read(&path, None, None).await.unwrap();
        assert!(envelope.text().contains("non-UTF-8"));
        assert!(!envelope.has_images());
    }

    #[tokio::test]
    async fn empty_file_reads_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty.txt");
        std::fs::write(&path, "").unwrap();

        let envelope = reader().read(&path, None, None).await.unwrap();
        assert_eq!(envelope.text(), "");
    }
}
