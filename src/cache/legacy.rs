//! The original on-disk layout: content lives directly at `root/key`, with
//! no sidecar metadata at all.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::cache::metadata::CacheFileInfo;
use crate::cache::CacheLayout;
use crate::key::Key;

/// A flat cache with no persisted provenance. A hit is indistinguishable
/// from a hit served by any other store: `lookup_cache_info` always misses,
/// so [`crate::cache::FileCache`] falls back to reporting the local path as
/// the identity and an empty upstream chain.
pub struct LegacyFileCache;

#[async_trait]
impl CacheLayout for LegacyFileCache {
    fn cache_lookup_path(&self, root: &Path, key: &Key, _upstream_identity: Option<&str>) -> PathBuf {
        root.join(key.as_str())
    }

    fn sidecar_path(&self, _lookup_path: &Path) -> Option<PathBuf> {
        None
    }

    async fn lookup_cache_info(&self, _sidecar_path: &Path) -> Option<CacheFileInfo> {
        None
    }

    async fn add_cache_file_info(&self, _sidecar_path: &Path, _info: &CacheFileInfo) -> anyhow::Result<()> {
        Ok(())
    }

    fn prefers_upstream_identity(&self) -> bool {
        false
    }
}
