//! The identity-partitioned layout: content is filed under a short hash of
//! the upstream's resolved identity rather than directly under the key, so
//! two upstreams that happen to share a key never collide on disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha1::{Digest, Sha1};

use crate::cache::metadata::{self, CacheFileInfo};
use crate::cache::{write_atomically, CacheLayout};
use crate::key::Key;

/// Identity-partitioned cache, with a `<path>.cache_info` sidecar recording
/// the upstream diagnostics chain observed at ingest time.
pub struct IdentityFileCache;

impl IdentityFileCache {
    /// Lower-case hex of the first 8 bytes of SHA-1(identity). Collisions
    /// are possible at this truncation but accepted: see DESIGN.md.
    fn identity_dir_name(identity: &str) -> String {
        let digest = Sha1::digest(identity.as_bytes());
        base16::encode_lower(&digest[..8])
    }
}

#[async_trait]
impl CacheLayout for IdentityFileCache {
    fn cache_lookup_path(&self, root: &Path, key: &Key, upstream_identity: Option<&str>) -> PathBuf {
        match upstream_identity {
            Some(identity) => {
                let (dir, file) = key.split_dir_file();
                let hash_dir = Self::identity_dir_name(identity);
                if dir.is_empty() {
                    root.join(hash_dir).join(file)
                } else {
                    root.join(dir).join(hash_dir).join(file)
                }
            }
            // the upstream couldn't predict an identity before dispatch
            // (a union store); fall back to a plain key-keyed path.
            None => root.join(key.as_str()),
        }
    }

    fn sidecar_path(&self, lookup_path: &Path) -> Option<PathBuf> {
        Some(PathBuf::from(format!("{}.cache_info", lookup_path.display())))
    }

    async fn lookup_cache_info(&self, sidecar_path: &Path) -> Option<CacheFileInfo> {
        let text = tokio::fs::read_to_string(sidecar_path).await.ok()?;
        metadata::parse(&text)
    }

    async fn add_cache_file_info(&self, sidecar_path: &Path, info: &CacheFileInfo) -> anyhow::Result<()> {
        let text = metadata::format(info);
        write_atomically(sidecar_path, text.as_bytes()).await
    }

    fn prefers_upstream_identity(&self) -> bool {
        true
    }
}
