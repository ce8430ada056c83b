//! Image filesystem capacity/available reporting: `statvfs`-based,
//! preferring the fragment size over the block size when available.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsUsage {
    pub available_bytes: u64,
    pub capacity_bytes: u64,
}

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("statvfs failed for {path}: {source}")]
    Statvfs {
        path: PathBuf,
        source: nix::Error,
    },
}

#[async_trait]
pub trait FsStatsProvider: Send + Sync {
    async fn image_fs_stats(&self) -> Result<FsUsage, StatsError>;
}

/// Real implementation backed by `statvfs(2)` against a configured mount
/// path (the root of the image filesystem).
pub struct StatvfsFsStats {
    path: PathBuf,
}

impl StatvfsFsStats {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        StatvfsFsStats { path: path.into() }
    }
}

#[async_trait]
impl FsStatsProvider for StatvfsFsStats {
    async fn image_fs_stats(&self) -> Result<FsUsage, StatsError> {
        let path = self.path.clone();
        // statvfs is a blocking syscall; run it on the blocking pool
        // rather than the async reactor thread.
        tokio::task::spawn_blocking(move || stat_path(&path))
            .await
            .expect("statvfs blocking task panicked")
    }
}

fn stat_path(path: &Path) -> Result<FsUsage, StatsError> {
    let stat = nix::sys::statvfs::statvfs(path).map_err(|source| StatsError::Statvfs {
        path: path.to_path_buf(),
        source,
    })?;

    // https://unix.stackexchange.com/a/703650: prefer the fragment size,
    // falling back to the block size when fragments aren't reported.
    let block_size = if stat.fragment_size() > 0 {
        stat.fragment_size()
    } else {
        stat.block_size()
    };

    // blocks_available (not blocks_free) since the daemon runs unprivileged.
    let available_bytes = stat.blocks_available() * block_size;
    let capacity_bytes = stat.blocks() * block_size;

    Ok(FsUsage {
        available_bytes,
        capacity_bytes,
    })
}
