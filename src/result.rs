//! The value a [`crate::stores::Store::find`] returns, and the policy that
//! governs how aggressively it re-queries.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncRead;

use crate::diagnostics::{Diagnostics, Outcome};

/// A move-only factory that yields a byte-read handle exactly once.
///
/// Calling it more than once is a caller bug; implementations of
/// [`crate::stores::Store`] only ever call it zero or one times per
/// `find`.
pub struct OpenStream(
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = anyhow::Result<Box<dyn AsyncRead + Send + Unpin>>> + Send>> + Send>,
);

impl OpenStream {
    /// Wraps an async factory function as an `OpenStream`.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Box<dyn AsyncRead + Send + Unpin>>> + Send + 'static,
    {
        OpenStream(Box::new(move || Box::pin(f())))
    }

    /// Produces a factory that always yields an empty stream, for
    /// non-success results.
    pub fn empty() -> Self {
        OpenStream::new(|| async { Ok(Box::new(std::io::Cursor::new(Vec::new())) as Box<dyn AsyncRead + Send + Unpin>) })
    }

    /// Invokes the factory, producing the stream. Must be called at most
    /// once.
    pub async fn open(self) -> anyhow::Result<Box<dyn AsyncRead + Send + Unpin>> {
        (self.0)().await
    }
}

/// The outcome of one `find`, together with everything needed to consume
/// the content and inspect its provenance.
pub struct SearchResult {
    /// `None` when the identity of the answering file is unpredictable
    /// before dispatch (e.g. a union store that hasn't resolved yet).
    pub identity: Option<String>,
    pub diagnostics: Arc<Diagnostics>,
    pub open_stream: OpenStream,
}

impl SearchResult {
    pub fn outcome(&self) -> Outcome {
        self.diagnostics.outcome
    }

    /// Builds a `NotFound` result carrying no content, tagged with the
    /// given identity/path and diagnostics.
    pub fn not_found(identity: Option<String>, diagnostics: Arc<Diagnostics>) -> Self {
        SearchResult {
            identity,
            diagnostics,
            open_stream: OpenStream::empty(),
        }
    }
}

/// Governs re-query behavior for a store stack. Present on every query;
/// `unreachable_status_validity_period` drives the HTTP circuit breaker,
/// `file_result_validity_period` is reserved for content TTL and is
/// currently unenforced (cached successes never expire on their own).
#[derive(Debug, Clone, Copy)]
pub struct CacheValidityPolicy {
    pub unreachable_status_validity_period: Duration,
    pub file_result_validity_period: Option<Duration>,
}

impl Default for CacheValidityPolicy {
    fn default() -> Self {
        CacheValidityPolicy {
            unreachable_status_validity_period: Duration::from_secs(5 * 60),
            file_result_validity_period: None,
        }
    }
}
