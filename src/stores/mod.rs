//! The abstract store contract and its concrete implementations: a single
//! HTTP symbol server ([`http::HttpStore`]), its compound-query extension
//! ([`microsoft::MicrosoftHttpStore`]), and a fan-out over several
//! upstreams ([`union::UnionStore`]).

pub mod http;
pub mod microsoft;
pub mod union;

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::diagnostics::{Diagnostics, Outcome};
use crate::key::Key;
use crate::result::{CacheValidityPolicy, OpenStream, SearchResult};

/// A source that can locate a symbol file by [`Key`].
///
/// `find` never fails with a Rust error: transport/protocol failure is
/// encoded as [`Outcome::Unreachable`], absence as [`Outcome::NotFound`],
/// presence as [`Outcome::Success`].
#[async_trait]
pub trait Store: Send + Sync {
    /// Human-meaningful identifier: a URL, a cache root path, or `"Union"`.
    fn name(&self) -> &str;

    /// Returns the identity of the file that would answer `key`, without
    /// performing any I/O. `None` when the identity cannot be predicted
    /// before a query (e.g. a union store).
    fn get_file_identity(&self, key: &Key) -> Option<String>;

    /// Looks up `key`, cooperatively honoring `cancel`. `policy` is
    /// expected to default to [`CacheValidityPolicy::default()`] at call
    /// sites that have no stronger requirement.
    async fn find(
        &self,
        key: &Key,
        cancel: &CancellationToken,
        policy: &CacheValidityPolicy,
    ) -> SearchResult;

    /// Builds a [`SearchResult`] tagged with this store's name, inserting
    /// a fresh diagnostics node on top of an optional upstream chain.
    ///
    /// Every [`Store`] implementation builds its results through this
    /// helper so that diagnostics chains are constructed uniformly.
    fn make_result(
        &self,
        open_stream: OpenStream,
        outcome: Outcome,
        identity: Option<String>,
        file_path: impl Into<String>,
        query_time: SystemTime,
        upstream: Option<Arc<Diagnostics>>,
    ) -> SearchResult {
        let diagnostics = Diagnostics::new(self.name(), outcome, file_path, query_time, upstream);
        SearchResult {
            identity,
            diagnostics,
            open_stream,
        }
    }
}
