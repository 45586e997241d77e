//! Content-addressed object store
//!
//! Holds hashed snapshots of file bodies so diffs and range comparisons
//! remain possible across restarts. Objects are keyed by the lowercase-hex
//! SHA-256 of the text body and live under `<repo>/.pi/readcache/objects/`
//! as `sha256-<64hex>.txt`. Writes go through a sibling `tmp/` directory and
//! an atomic rename; two writers racing on the same hash are both safe.

use crate::error::{CacheError, CacheResult};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Directory under the repository root that holds cache state
pub const STORE_DIR: &str = ".pi/readcache";

const OBJECT_PREFIX: &str = "sha256-";
const OBJECT_SUFFIX: &str = ".txt";

/// Best-effort object store statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub objects: u64,
    pub bytes: u64,
}

/// Outcome of an age-based sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneOutcome {
    pub scanned: u64,
    pub deleted: u64,
}

/// Content-addressed blob store shared across sessions
#[derive(Debug, Clone)]
pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    /// Create a store rooted at the given directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create a store under the repository-scoped cache directory
    pub fn for_repo(repo_root: impl AsRef<Path>) -> Self {
        Self::new(repo_root.as_ref().join(STORE_DIR))
    }

    /// The store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn objects_dir(&self) -> PathBuf {
        self.root.join("objects")
    }

    fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    fn object_path(&self, hash: &str) -> PathBuf {
        self.objects_dir()
            .join(format!("{OBJECT_PREFIX}{hash}{OBJECT_SUFFIX}"))
    }

    /// Lowercase-hex SHA-256 of the raw byte sequence
    pub fn hash_text(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Whether the value is exactly 64 lowercase hex characters
    pub fn is_valid_hash(hash: &str) -> bool {
        hash.len() == 64
            && hash
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }

    fn require_valid_hash(hash: &str) -> CacheResult<()> {
        if Self::is_valid_hash(hash) {
            Ok(())
        } else {
            Err(CacheError::storage(format!(
                "invalid object hash: {hash:?}"
            )))
        }
    }

    async fn ensure_dirs(&self) -> CacheResult<()> {
        for dir in [self.objects_dir(), self.tmp_dir()] {
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| CacheError::storage(format!("create {}: {e}", dir.display())))?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let perms = std::fs::Permissions::from_mode(0o700);
                // Tightening permissions is best-effort on exotic mounts.
                if let Err(e) = fs::set_permissions(&dir, perms).await {
                    debug!(dir = %dir.display(), error = %e, "could not restrict permissions");
                }
            }
        }
        Ok(())
    }

    /// Persist a blob unless it already exists; returns whether this call
    /// created the object
    ///
    /// The write lands in a uniquely named temp file, then renames into the
    /// object path. When another writer wins the race the temp file is
    /// discarded and the call still succeeds: both writers carried the same
    /// content.
    pub async fn put_if_absent(&self, hash: &str, text: &str) -> CacheResult<bool> {
        Self::require_valid_hash(hash)?;
        let target = self.object_path(hash);
        if fs::try_exists(&target).await.unwrap_or(false) {
            return Ok(false);
        }
        self.ensure_dirs().await?;

        let tmp_name = format!(
            "put-{}-{}-{}.tmp",
            std::process::id(),
            chrono::Utc::now().timestamp_millis(),
            uuid::Uuid::new_v4().simple()
        );
        let tmp_path = self.tmp_dir().join(tmp_name);

        let mut file = fs::File::create(&tmp_path)
            .await
            .map_err(|e| CacheError::storage(format!("create temp object: {e}")))?;
        file.write_all(text.as_bytes())
            .await
            .map_err(|e| CacheError::storage(format!("write temp object: {e}")))?;
        file.sync_all().await.ok();
        drop(file);

        match fs::rename(&tmp_path, &target).await {
            Ok(()) => {
                debug!(hash, bytes = text.len(), "stored object");
                Ok(true)
            }
            Err(e) => {
                fs::remove_file(&tmp_path).await.ok();
                if fs::try_exists(&target).await.unwrap_or(false) {
                    // Another writer won; the object carries identical content.
                    Ok(false)
                } else {
                    Err(CacheError::storage(format!("publish object: {e}")))
                }
            }
        }
    }

    /// Load a blob by hash; absence is `Ok(None)`, not an error
    pub async fn load(&self, hash: &str) -> CacheResult<Option<String>> {
        Self::require_valid_hash(hash)?;
        let path = self.object_path(hash);
        match fs::read(&path).await {
            Ok(bytes) => {
                let text = String::from_utf8(bytes)
                    .map_err(|_| CacheError::storage(format!("object {hash} is not UTF-8")))?;
                Ok(Some(text))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::storage(format!("read object {hash}: {e}"))),
        }
    }

    /// Best-effort store statistics; traversal errors yield zero counts
    pub async fn stats(&self) -> StoreStats {
        let mut stats = StoreStats::default();
        let mut entries = match fs::read_dir(self.objects_dir()).await {
            Ok(entries) => entries,
            Err(_) => return stats,
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(OBJECT_PREFIX) || !name.ends_with(OBJECT_SUFFIX) {
                continue;
            }
            if let Ok(meta) = entry.metadata().await {
                stats.objects += 1;
                stats.bytes += meta.len();
            }
        }
        stats
    }

    /// Delete objects whose modification time predates `now_ms - max_age_ms`
    ///
    /// Errors on individual files are swallowed; the sweep reports what it
    /// saw and what it removed.
    pub async fn prune_older_than(&self, max_age_ms: u64, now_ms: u64) -> PruneOutcome {
        let cutoff_ms = now_ms.saturating_sub(max_age_ms);
        let mut outcome = PruneOutcome::default();
        let mut entries = match fs::read_dir(self.objects_dir()).await {
            Ok(entries) => entries,
            Err(_) => return outcome,
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let name = name.to_string_lossy().to_string();
            if !name.starts_with(OBJECT_PREFIX) || !name.ends_with(OBJECT_SUFFIX) {
                continue;
            }
            outcome.scanned += 1;
            let modified_ms = entry
                .metadata()
                .await
                .ok()
                .and_then(|m| m.modified().ok())
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as u64);
            let Some(modified_ms) = modified_ms else {
                continue;
            };
            if modified_ms < cutoff_ms {
                match fs::remove_file(entry.path()).await {
                    Ok(()) => outcome.deleted += 1,
                    Err(e) => warn!(object = %name, error = %e, "prune failed"),
                }
            }
        }
        outcome
    }
}
