//! End-to-end scenarios for the cache layer over an in-process mock store.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use symcache::cache::identity::IdentityFileCache;
use symcache::cache::legacy::LegacyFileCache;
use symcache::cache::FileCache;
use symcache::{CacheValidityPolicy, Key, OpenStream, Outcome, SearchResult, Store};

/// A store that always answers the same key with fixed bytes, tagged with
/// its own name as identity.
struct MockStore {
    name: String,
    bytes: Vec<u8>,
}

#[async_trait]
impl Store for MockStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_file_identity(&self, key: &Key) -> Option<String> {
        Some(format!("{}/{}", self.name, key.as_str()))
    }

    async fn find(
        &self,
        key: &Key,
        _cancel: &CancellationToken,
        _policy: &CacheValidityPolicy,
    ) -> SearchResult {
        let bytes = self.bytes.clone();
        let open_stream = OpenStream::new(move || async move {
            Ok(Box::new(std::io::Cursor::new(bytes)) as Box<dyn tokio::io::AsyncRead + Send + Unpin>)
        });
        self.make_result(
            open_stream,
            Outcome::Success,
            self.get_file_identity(key),
            format!("{}/{}", self.name, key.as_str()),
            SystemTime::now(),
            None,
        )
    }
}

/// A store that always answers `NotFound`.
struct MissingStore;

#[async_trait]
impl Store for MissingStore {
    fn name(&self) -> &str {
        "missing"
    }

    fn get_file_identity(&self, _key: &Key) -> Option<String> {
        None
    }

    async fn find(
        &self,
        _key: &Key,
        _cancel: &CancellationToken,
        _policy: &CacheValidityPolicy,
    ) -> SearchResult {
        self.make_result(
            OpenStream::empty(),
            Outcome::NotFound,
            None,
            "missing",
            SystemTime::now(),
            None,
        )
    }
}

async fn read_all(result: &mut SearchResult) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut reader = std::mem::replace(&mut result.open_stream, OpenStream::empty())
        .open()
        .await
        .unwrap();
    tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut buf)
        .await
        .unwrap();
    buf
}

#[tokio::test]
async fn multiple_files_per_key_same_cache_root() {
    let dir = tempfile::tempdir().unwrap();
    let mock1: Arc<dyn Store> = Arc::new(MockStore {
        name: "Mock1".to_string(),
        bytes: vec![1, 2, 3],
    });
    let mock2: Arc<dyn Store> = Arc::new(MockStore {
        name: "Mock2".to_string(),
        bytes: vec![4, 5, 6],
    });
    let cache1 = FileCache::new(dir.path(), mock1, IdentityFileCache);
    let cache2 = FileCache::new(dir.path(), mock2, IdentityFileCache);
    let key = Key::new("a/b/c").unwrap();
    let cancel = CancellationToken::new();
    let policy = CacheValidityPolicy::default();

    let mut r1 = cache1.find(&key, &cancel, &policy).await;
    let mut r2 = cache2.find(&key, &cancel, &policy).await;
    let mut r3 = cache1.find(&key, &cancel, &policy).await;

    assert_eq!(read_all(&mut r1).await[0], 1);
    assert_eq!(read_all(&mut r2).await[0], 4);
    assert_eq!(read_all(&mut r3).await[0], 1);
}

#[tokio::test]
async fn diagnostics_reconstruction_across_repeated_finds() {
    let dir = tempfile::tempdir().unwrap();
    let mock: Arc<dyn Store> = Arc::new(MockStore {
        name: "Mock1".to_string(),
        bytes: vec![1, 2, 3],
    });
    let cache = FileCache::new(dir.path(), mock, IdentityFileCache);
    let key = Key::new("a/b/c").unwrap();
    let cancel = CancellationToken::new();
    let policy = CacheValidityPolicy::default();

    let first = cache.find(&key, &cancel, &policy).await;
    assert_eq!(first.outcome(), Outcome::Success);
    let nested = first.diagnostics.upstream.as_ref().expect("reconstructed chain");
    assert_eq!(nested.store_name, "Mock1");
    assert_eq!(nested.file_path, "Mock1/a/b/c");

    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = cache.find(&key, &cancel, &policy).await;
    assert_eq!(second.outcome(), Outcome::Success);
    let nested2 = second.diagnostics.upstream.as_ref().expect("reconstructed chain");
    assert_eq!(nested2.query_time, nested.query_time);
    assert_ne!(second.diagnostics.query_time, first.diagnostics.query_time);
}

#[tokio::test]
async fn identity_hash_directory_component() {
    let dir = tempfile::tempdir().unwrap();
    let mock: Arc<dyn Store> = Arc::new(MockStore {
        name: "Mock1".to_string(),
        bytes: vec![9],
    });
    let cache = FileCache::new(dir.path(), mock, IdentityFileCache);
    let key = Key::new("a/b/c").unwrap();
    let cancel = CancellationToken::new();
    let result = cache.find(&key, &cancel, &CacheValidityPolicy::default()).await;
    assert_eq!(result.outcome(), Outcome::Success);
    assert!(result.diagnostics.file_path.ends_with("a/b/cf2da09ef5f2261e/c"));
}

#[tokio::test]
async fn union_first_success_wins_over_http_stores() {
    let miss: Arc<dyn Store> = Arc::new(MissingStore);
    let hit: Arc<dyn Store> = Arc::new(MockStore {
        name: "second".to_string(),
        bytes: vec![7],
    });
    let union = symcache::stores::union::UnionStore::new(vec![miss, hit]);
    let key = Key::new("a/b/c").unwrap();
    let cancel = CancellationToken::new();
    let result = union.find(&key, &cancel, &CacheValidityPolicy::default()).await;
    assert_eq!(result.outcome(), Outcome::Success);
    assert_eq!(result.diagnostics.store_name, "second");
}

#[tokio::test]
async fn identity_cache_falls_back_to_flat_path_with_no_predicted_identity() {
    let dir = tempfile::tempdir().unwrap();
    let upstream: Arc<dyn Store> = Arc::new(MissingIdentityMockStore);
    let cache = FileCache::new(dir.path(), upstream, IdentityFileCache);
    let key = Key::new("a/b/c").unwrap();
    let cancel = CancellationToken::new();
    let result = cache.find(&key, &cancel, &CacheValidityPolicy::default()).await;
    assert_eq!(result.outcome(), Outcome::Success);
    assert!(result.diagnostics.file_path.ends_with("a/b/c"));

    // the identity cache still writes a sidecar even without a predicted
    // identity, and it must parse back.
    let sidecar_path = dir.path().join("a/b/c.cache_info");
    let text = tokio::fs::read_to_string(&sidecar_path).await.unwrap();
    assert!(symcache::cache::metadata::parse(&text).is_some());
}

#[tokio::test]
async fn legacy_cache_writes_no_sidecar() {
    let dir = tempfile::tempdir().unwrap();
    let upstream: Arc<dyn Store> = Arc::new(MissingIdentityMockStore);
    let cache = FileCache::new(dir.path(), upstream, LegacyFileCache);
    let key = Key::new("a/b/c").unwrap();
    let cancel = CancellationToken::new();
    let result = cache.find(&key, &cancel, &CacheValidityPolicy::default()).await;
    assert_eq!(result.outcome(), Outcome::Success);
    assert!(result.diagnostics.file_path.ends_with("a/b/c"));
    assert!(!dir.path().join("a/b/c.cache_info").exists());
}

/// A store whose `get_file_identity` always reports `None`, to exercise the
/// legacy/no-identity cache path.
struct MissingIdentityMockStore;

#[async_trait]
impl Store for MissingIdentityMockStore {
    fn name(&self) -> &str {
        "no-identity"
    }

    fn get_file_identity(&self, _key: &Key) -> Option<String> {
        None
    }

    async fn find(
        &self,
        key: &Key,
        _cancel: &CancellationToken,
        _policy: &CacheValidityPolicy,
    ) -> SearchResult {
        let open_stream = OpenStream::new(|| async {
            Ok(Box::new(std::io::Cursor::new(vec![1_u8])) as Box<dyn tokio::io::AsyncRead + Send + Unpin>)
        });
        self.make_result(
            open_stream,
            Outcome::Success,
            None,
            format!("no-identity/{}", key.as_str()),
            SystemTime::now(),
            None,
        )
    }
}
