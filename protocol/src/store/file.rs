//! # File-Backed Binding Store
//!
//! The simplest thing that works: one file per identity under `data/`,
//! containing the literal address string. The file's modification time is
//! the freshness clock; a record older than the configured TTL resolves as
//! if it were absent, with no cleanup pass needed. Revocation is a sentinel
//! file of the same name under `revoked/`, checked before freshness.
//!
//! Writes go through a temp file + rename, so a reader never observes a
//! half-written address and concurrent writers to the same identity
//! degenerate to last-rename-wins, which is the documented contract.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tracing::debug;

use crate::identity::Identity;

use super::{BindingStatus, BindingStore, StoreError};

/// Binding store backed by per-identity files and filesystem mtimes.
pub struct FileStore {
    data_dir: PathBuf,
    revoked_dir: PathBuf,
    ttl: Duration,
    /// Monotonic suffix for temp files, so concurrent updates to the same
    /// identity never share a scratch path.
    tmp_seq: AtomicU64,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`, with the given
    /// binding freshness window.
    pub fn open(root: impl AsRef<Path>, ttl: Duration) -> Result<Self, StoreError> {
        let root = root.as_ref();
        let data_dir = root.join("data");
        let revoked_dir = root.join("revoked");
        std::fs::create_dir_all(&data_dir)?;
        std::fs::create_dir_all(&revoked_dir)?;
        Ok(Self {
            data_dir,
            revoked_dir,
            ttl,
            tmp_seq: AtomicU64::new(0),
        })
    }

    /// The freshness window this store was opened with.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn data_path(&self, identity: &Identity) -> PathBuf {
        // Identity strings are validated hex, so they are always safe as
        // bare file names.
        self.data_dir.join(identity.as_str())
    }

    fn revoked_path(&self, identity: &Identity) -> PathBuf {
        self.revoked_dir.join(identity.as_str())
    }
}

#[async_trait]
impl BindingStore for FileStore {
    async fn check(&self, identity: &Identity) -> Result<BindingStatus, StoreError> {
        if tokio::fs::try_exists(self.revoked_path(identity)).await? {
            return Ok(BindingStatus::Revoked);
        }

        let path = self.data_path(identity);
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BindingStatus::Unregistered),
            Err(e) => return Err(e.into()),
        };

        let modified = metadata.modified()?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        if age > self.ttl {
            // Stale record: the bytes stay on disk until the next update,
            // but for every caller this identity is now unregistered.
            debug!(identity = %identity, age_secs = age.as_secs(), "binding expired");
            return Ok(BindingStatus::Unregistered);
        }

        let address = tokio::fs::read_to_string(&path).await?;
        Ok(BindingStatus::Registered { address })
    }

    async fn update(&self, identity: &Identity, address: &str) -> Result<(), StoreError> {
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self.data_dir.join(format!(".{}.{seq}", identity.as_str()));
        tokio::fs::write(&tmp, address).await?;
        tokio::fs::rename(&tmp, self.data_path(identity)).await?;
        debug!(identity = %identity, address, "binding updated");
        Ok(())
    }

    async fn revoke(&self, identity: &Identity) -> Result<(), StoreError> {
        // Writing the sentinel is naturally idempotent.
        tokio::fs::write(self.revoked_path(identity), "").await?;
        match tokio::fs::remove_file(self.data_path(identity)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!(identity = %identity, "identity revoked");
        Ok(())
    }
}
