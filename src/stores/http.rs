//! A single symbol-server-query-protocol client: a plain `GET` of a key
//! relative to a base URL, with an unreachable-backoff memory.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::diagnostics::Outcome;
use crate::key::Key;
use crate::result::{CacheValidityPolicy, OpenStream, SearchResult};
use crate::stores::Store;

/// What an `additional_requests` hook hands back when it has an answer of
/// its own to report. `None` lets [`HttpStore::find`] fall through to
/// `NotFound`.
pub struct AdditionalResult {
    pub outcome: Outcome,
    pub identity: Option<String>,
    pub file_path: String,
    pub open_stream: OpenStream,
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Extension point run on a 404, expressed as a function-valued field
/// rather than a subclass hook. Receives a clone of the client/base URL
/// (cheap: `reqwest::Client` is itself `Arc`-backed) so it can issue its
/// own requests.
pub type AdditionalRequestsFn = Arc<
    dyn Fn(reqwest::Client, String, Key, CancellationToken, SystemTime) -> BoxFuture<'static, Option<AdditionalResult>>
        + Send
        + Sync,
>;

/// A symbol server reachable over plain HTTP `GET {base}/{key}`.
pub struct HttpStore {
    base_url: String,
    client: reqwest::Client,
    last_unreachable_time: Mutex<Option<Instant>>,
    additional_requests: Option<AdditionalRequestsFn>,
}

impl HttpStore {
    /// `base_url` must have no trailing slash.
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpStore {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            last_unreachable_time: Mutex::new(None),
            additional_requests: None,
        }
    }

    /// Builds a store sharing an existing client (used by
    /// [`crate::stores::microsoft::MicrosoftHttpStore`] so its probes and
    /// the base GET reuse one connection pool), with the given
    /// 404-extension hook installed.
    pub fn with_client(
        base_url: impl Into<String>,
        client: reqwest::Client,
        additional_requests: Option<AdditionalRequestsFn>,
    ) -> Self {
        HttpStore {
            base_url: base_url.into(),
            client,
            last_unreachable_time: Mutex::new(None),
            additional_requests,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn client(&self) -> reqwest::Client {
        self.client.clone()
    }

    async fn mark_unreachable(&self, at: Instant) {
        *self.last_unreachable_time.lock().await = Some(at);
    }
}

#[async_trait]
impl Store for HttpStore {
    fn name(&self) -> &str {
        &self.base_url
    }

    fn get_file_identity(&self, key: &Key) -> Option<String> {
        Some(format!("{}/{}", self.base_url, key.as_str()))
    }

    async fn find(
        &self,
        key: &Key,
        cancel: &CancellationToken,
        policy: &CacheValidityPolicy,
    ) -> SearchResult {
        let query_time = SystemTime::now();
        let now = Instant::now();

        {
            let last = *self.last_unreachable_time.lock().await;
            if let Some(last) = last {
                if now.saturating_duration_since(last) < policy.unreachable_status_validity_period
                {
                    tracing::debug!(store = %self.base_url, "circuit open, short-circuiting to Unreachable");
                    return self.make_result(
                        OpenStream::empty(),
                        Outcome::Unreachable,
                        self.get_file_identity(key),
                        format!("{}/{}", self.base_url, key.as_str()),
                        query_time,
                        None,
                    );
                }
            }
        }

        let url = format!("{}/{}", self.base_url, key.as_str());
        let identity = self.get_file_identity(key);
        tracing::debug!(store = %self.base_url, %url, "issuing GET");

        let request = self.client.get(&url).send();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(store = %self.base_url, "cancelled before response headers");
                return self.make_result(
                    OpenStream::empty(),
                    Outcome::Unreachable,
                    identity,
                    url,
                    query_time,
                    None,
                );
            }
            r = request => r,
        };

        match response {
            Ok(resp) if resp.status().is_success() => {
                let stream = OpenStream::new(move || async move {
                    let reader = tokio_util::io::StreamReader::new(
                        resp.bytes_stream()
                            .map(|r| r.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))),
                    );
                    Ok(Box::new(reader) as Box<dyn tokio::io::AsyncRead + Send + Unpin>)
                });
                self.make_result(stream, Outcome::Success, identity, url, query_time, None)
            }
            Ok(resp) if resp.status() == reqwest::StatusCode::NOT_FOUND => {
                if let Some(hook) = &self.additional_requests {
                    if let Some(extra) = hook(
                        self.client.clone(),
                        self.base_url.clone(),
                        key.clone(),
                        cancel.child_token(),
                        query_time,
                    )
                    .await
                    {
                        return self.make_result(
                            extra.open_stream,
                            extra.outcome,
                            extra.identity,
                            extra.file_path,
                            query_time,
                            None,
                        );
                    }
                }
                self.make_result(
                    OpenStream::empty(),
                    Outcome::NotFound,
                    identity,
                    url,
                    query_time,
                    None,
                )
            }
            Ok(resp) => {
                tracing::warn!(store = %self.base_url, status = %resp.status(), "unexpected HTTP status");
                self.mark_unreachable(now).await;
                self.make_result(
                    OpenStream::empty(),
                    Outcome::Unreachable,
                    identity,
                    url,
                    query_time,
                    None,
                )
            }
            Err(e) => {
                tracing::warn!(store = %self.base_url, error = %e, "transport error");
                self.mark_unreachable(now).await;
                self.make_result(
                    OpenStream::empty(),
                    Outcome::Unreachable,
                    identity,
                    url,
                    query_time,
                    None,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};
    use std::net::SocketAddr;

    async fn spawn(router: Router) -> (SocketAddr, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn success_reads_body() {
        let app = Router::new().route("/a/b/c", get(|| async { "hello" }));
        let (addr, _h) = spawn(app).await;
        let store = HttpStore::new(format!("http://{addr}"));
        let key = Key::new("a/b/c").unwrap();
        let cancel = CancellationToken::new();
        let result = store.find(&key, &cancel, &CacheValidityPolicy::default()).await;
        assert_eq!(result.outcome(), Outcome::Success);
        let mut buf = Vec::new();
        let mut reader = result.open_stream.open().await.unwrap();
        tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut buf)
            .await
            .unwrap();
        assert_eq!(buf, b"hello");
    }

    #[tokio::test]
    async fn not_found_reports_not_found() {
        let app = Router::new();
        let (addr, _h) = spawn(app).await;
        let store = HttpStore::new(format!("http://{addr}"));
        let key = Key::new("missing").unwrap();
        let cancel = CancellationToken::new();
        let result = store.find(&key, &cancel, &CacheValidityPolicy::default()).await;
        assert_eq!(result.outcome(), Outcome::NotFound);
    }

    #[tokio::test]
    async fn server_error_triggers_backoff_and_memoizes() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        let app = Router::new().route(
            "/a",
            get(move || {
                let hits = hits2.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR
                }
            }),
        );
        let (addr, _h) = spawn(app).await;
        let store = HttpStore::new(format!("http://{addr}"));
        let key = Key::new("a").unwrap();
        let cancel = CancellationToken::new();
        let policy = CacheValidityPolicy {
            unreachable_status_validity_period: std::time::Duration::from_secs(300),
            file_result_validity_period: None,
        };
        let first = store.find(&key, &cancel, &policy).await;
        assert_eq!(first.outcome(), Outcome::Unreachable);
        let second = store.find(&key, &cancel, &policy).await;
        assert_eq!(second.outcome(), Outcome::Unreachable);
        assert_eq!(hits.load(Ordering::SeqCst), 1, "second query should not hit the network");
    }

    #[tokio::test]
    async fn two_consecutive_404s_do_not_trigger_backoff() {
        let app = Router::new();
        let (addr, _h) = spawn(app).await;
        let store = HttpStore::new(format!("http://{addr}"));
        let key = Key::new("missing").unwrap();
        let cancel = CancellationToken::new();
        let policy = CacheValidityPolicy::default();
        let first = store.find(&key, &cancel, &policy).await;
        let second = store.find(&key, &cancel, &policy).await;
        assert_eq!(first.outcome(), Outcome::NotFound);
        assert_eq!(second.outcome(), Outcome::NotFound);
    }

    #[test]
    fn get_file_identity_is_base_plus_key() {
        let store = HttpStore::new("http://example/store");
        let key = Key::new("a/b/c").unwrap();
        assert_eq!(
            store.get_file_identity(&key).unwrap(),
            "http://example/store/a/b/c"
        );
    }
}
