//! Per-query provenance: which store produced a result, and when each
//! layer of a stack was consulted.

use std::sync::Arc;
use std::time::SystemTime;

/// The closed set of outcomes a [`crate::stores::Store::find`] can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Content is available.
    Success,
    /// Authoritative absence (HTTP 404, or a cache miss whose upstream
    /// also reported absence).
    NotFound,
    /// Transport error, non-404 HTTP error, an open circuit breaker, or a
    /// cancellation observed at the transport layer.
    Unreachable,
}

/// An immutable record of one store's attempt to answer a key, optionally
/// chained to the diagnostics of the upstream it consulted.
///
/// The chain runs from outermost (`self`) to innermost (origin) via
/// `upstream`, and has no cycles by construction: each node is built once,
/// at the point its store observed a result, never mutated or shared back
/// into its own ancestry.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    pub outcome: Outcome,
    pub file_path: String,
    pub query_time: SystemTime,
    pub store_name: String,
    pub upstream: Option<Arc<Diagnostics>>,
}

impl Diagnostics {
    /// Builds a new diagnostics node tagged with `store_name`, wrapping an
    /// optional upstream chain.
    pub fn new(
        store_name: impl Into<String>,
        outcome: Outcome,
        file_path: impl Into<String>,
        query_time: SystemTime,
        upstream: Option<Arc<Diagnostics>>,
    ) -> Arc<Diagnostics> {
        Arc::new(Diagnostics {
            outcome,
            file_path: file_path.into(),
            query_time,
            store_name: store_name.into(),
            upstream,
        })
    }

    /// Walks the chain outermost-first, collecting `(store_name, file_path,
    /// query_time)` triples. Used by cache ingest to flatten a live
    /// diagnostics chain into a [`crate::cache::metadata::CacheFileInfo`].
    ///
    /// Iterative by construction: spec.md warns that the recursive
    /// flatten/unflatten must stay bounded by chain length, so this never
    /// recurses.
    pub fn flatten(self: &Arc<Diagnostics>) -> Vec<(String, String, SystemTime)> {
        let mut out = Vec::new();
        let mut node = Some(self.clone());
        while let Some(n) = node {
            out.push((n.store_name.clone(), n.file_path.clone(), n.query_time));
            node = n.upstream.clone();
        }
        out
    }
}
