//! The local-disk layer: serves from a cached copy when one exists,
//! otherwise delegates to an upstream store and ingests what it returns.
//!
//! [`CacheLayout`] factors out the one thing that differs between cache
//! generations -- where on disk a key's content (and, if any, its sidecar
//! metadata) lives -- from [`FileCache`], which implements the read-through
//! algorithm itself exactly once.

pub mod identity;
pub mod legacy;
pub mod metadata;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::diagnostics::{Diagnostics, Outcome};
use crate::key::Key;
use crate::log::ResultExt;
use crate::result::{CacheValidityPolicy, OpenStream, SearchResult};
use crate::stores::Store;
use metadata::CacheFileInfo;

/// The on-disk layout a [`FileCache`] delegates path decisions to.
#[async_trait]
pub trait CacheLayout: Send + Sync {
    /// Where this key's content would live, given the upstream's predicted
    /// identity for it (from a sync [`Store::get_file_identity`] call, made
    /// before any query is issued).
    fn cache_lookup_path(&self, root: &Path, key: &Key, upstream_identity: Option<&str>) -> PathBuf;

    /// The sidecar metadata path for a given content path, or `None` for
    /// layouts that persist no metadata.
    fn sidecar_path(&self, lookup_path: &Path) -> Option<PathBuf>;

    /// Loads persisted metadata for a cache hit, if this layout has any.
    async fn lookup_cache_info(&self, sidecar_path: &Path) -> Option<CacheFileInfo>;

    /// Persists metadata alongside a freshly ingested file. A no-op for
    /// layouts that don't track it.
    async fn add_cache_file_info(&self, sidecar_path: &Path, info: &CacheFileInfo) -> anyhow::Result<()>;

    /// Whether `get_file_identity` should prefer the upstream's own
    /// prediction over reporting this cache's local path.
    fn prefers_upstream_identity(&self) -> bool;
}

/// Read-through file cache over an upstream [`Store`], parameterized by a
/// [`CacheLayout`].
pub struct FileCache<L: CacheLayout> {
    name: String,
    root: PathBuf,
    upstream: Arc<dyn Store>,
    layout: L,
}

impl<L: CacheLayout> FileCache<L> {
    pub fn new(root: impl Into<PathBuf>, upstream: Arc<dyn Store>, layout: L) -> Self {
        let root = root.into();
        let name = root.display().to_string();
        FileCache {
            name,
            root,
            upstream,
            layout,
        }
    }

    fn display_path(path: &Path) -> String {
        path.display().to_string()
    }
}

#[async_trait]
impl<L: CacheLayout> Store for FileCache<L> {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_file_identity(&self, key: &Key) -> Option<String> {
        if self.layout.prefers_upstream_identity() {
            if let Some(id) = self.upstream.get_file_identity(key) {
                return Some(id);
            }
        }
        let path = self.layout.cache_lookup_path(&self.root, key, None);
        Some(Self::display_path(&path))
    }

    async fn find(
        &self,
        key: &Key,
        cancel: &CancellationToken,
        policy: &CacheValidityPolicy,
    ) -> SearchResult {
        let query_time = SystemTime::now();
        let predicted_identity = self.upstream.get_file_identity(key);
        let local_path = self
            .layout
            .cache_lookup_path(&self.root, key, predicted_identity.as_deref());
        let sidecar_path = self.layout.sidecar_path(&local_path);

        if tokio::fs::metadata(&local_path).await.is_ok() {
            return self.serve_from_cache(&local_path, sidecar_path.as_deref(), query_time).await;
        }

        let upstream_result = self.upstream.find(key, cancel, policy).await;
        if upstream_result.outcome() != Outcome::Success {
            // both an authoritative miss and an unreachable upstream
            // collapse to NotFound from the cache's own perspective -- the
            // cache itself never reports Unreachable.
            return self.make_result(
                OpenStream::empty(),
                Outcome::NotFound,
                None,
                Self::display_path(&local_path),
                query_time,
                Some(upstream_result.diagnostics.clone()),
            );
        }

        self.ingest(key, &local_path, sidecar_path.as_deref(), query_time, upstream_result)
            .await
    }
}

impl<L: CacheLayout> FileCache<L> {
    async fn serve_from_cache(
        &self,
        local_path: &Path,
        sidecar_path: Option<&Path>,
        query_time: SystemTime,
    ) -> SearchResult {
        let info = match sidecar_path {
            Some(sc) => self.layout.lookup_cache_info(sc).await,
            None => None,
        };
        let (identity, upstream_chain) = match &info {
            Some(info) => (Some(info.file_identity.clone()), reconstruct_chain(info)),
            None => (Some(Self::display_path(local_path)), None),
        };
        tracing::debug!(path = %local_path.display(), "cache hit");
        self.make_result(
            open_local_file(local_path.to_path_buf()),
            Outcome::Success,
            identity,
            Self::display_path(local_path),
            query_time,
            upstream_chain,
        )
    }

    async fn ingest(
        &self,
        key: &Key,
        local_path: &Path,
        sidecar_path: Option<&Path>,
        query_time: SystemTime,
        upstream_result: SearchResult,
    ) -> SearchResult {
        let info = CacheFileInfo::from_upstream(
            upstream_result.identity.clone(),
            &Self::display_path(local_path),
            &upstream_result.diagnostics,
        );

        // sidecar before content: a reader that races ingest never observes
        // content without metadata describing it.
        if let Some(sidecar) = sidecar_path {
            self.layout
                .add_cache_file_info(sidecar, &info)
                .await
                .with_context(|| format!("failed to persist cache sidecar {} for {key}", sidecar.display()))
                .or_warn();
        }

        let mut content = match upstream_result.open_stream.open().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "failed to open upstream stream while ingesting {key}");
                return self.make_result(
                    OpenStream::empty(),
                    Outcome::NotFound,
                    None,
                    Self::display_path(local_path),
                    query_time,
                    Some(upstream_result.diagnostics.clone()),
                );
            }
        };

        if let Err(e) = write_stream_atomically(local_path, content.as_mut()).await {
            tracing::warn!(error = %e, path = %local_path.display(), "failed to ingest cache content for {key}");
            return self.make_result(
                OpenStream::empty(),
                Outcome::NotFound,
                None,
                Self::display_path(local_path),
                query_time,
                Some(upstream_result.diagnostics.clone()),
            );
        }

        let identity = Some(info.file_identity.clone());
        let upstream_chain = reconstruct_chain(&info);
        self.make_result(
            open_local_file(local_path.to_path_buf()),
            Outcome::Success,
            identity,
            Self::display_path(local_path),
            query_time,
            upstream_chain,
        )
    }
}

fn open_local_file(path: PathBuf) -> OpenStream {
    OpenStream::new(move || async move {
        let file = tokio::fs::File::open(&path).await?;
        Ok(Box::new(file) as Box<dyn AsyncRead + Send + Unpin>)
    })
}

/// Folds a sidecar's flat upstream-query list back into a diagnostics
/// chain: the last entry (innermost, origin) becomes the deepest node, and
/// each entry before it wraps the accumulated chain. Every reconstructed
/// node reports `Success` -- only successful ingests are ever cached.
fn reconstruct_chain(info: &CacheFileInfo) -> Option<Arc<Diagnostics>> {
    let mut chain: Option<Arc<Diagnostics>> = None;
    for q in info.upstream_queries.iter().rev() {
        chain = Some(Diagnostics::new(
            q.store_name.clone(),
            Outcome::Success,
            q.file_path.clone(),
            q.last_query_time,
            chain,
        ));
    }
    chain
}

/// Writes `reader`'s content to a sibling temp file, then renames it into
/// place -- a reader can never observe a partially-written `local_path`.
async fn write_stream_atomically(
    path: &Path,
    reader: &mut (dyn AsyncRead + Send + Unpin),
) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating cache directory {}", dir.display()))?;
    }
    let tmp_path = PathBuf::from(format!("{}.tmp", path.display()));
    {
        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .with_context(|| format!("creating temp file {}", tmp_path.display()))?;
        tokio::io::copy(reader, &mut file)
            .await
            .context("writing cache content")?;
    }
    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("renaming {} into place", tmp_path.display()))?;
    Ok(())
}

/// Writes `contents` to a sibling temp file, then renames it into place.
/// Used for sidecar metadata, which is always small enough to hold in
/// memory at once.
pub(crate) async fn write_atomically(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating cache directory {}", dir.display()))?;
    }
    let tmp_path = PathBuf::from(format!("{}.tmp", path.display()));
    tokio::fs::write(&tmp_path, contents)
        .await
        .with_context(|| format!("writing temp file {}", tmp_path.display()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("renaming {} into place", tmp_path.display()))?;
    Ok(())
}
