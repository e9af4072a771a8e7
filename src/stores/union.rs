//! Fan-out across several upstream stores: first success wins, and wins
//! cancel every other in-flight lookup.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::diagnostics::Outcome;
use crate::key::Key;
use crate::result::{CacheValidityPolicy, SearchResult};
use crate::stores::Store;

/// Dispatches one logical `find` to every upstream concurrently. The
/// moment any upstream completes with [`Outcome::Success`], the rest are
/// cancelled -- but "first to finish with `NotFound`" does *not* cancel
/// peers, so a fast authoritative miss on one upstream never suppresses a
/// slower hit on another.
///
/// The union never wraps a selected result in diagnostics of its own: the
/// caller observes whichever upstream actually answered, directly.
pub struct UnionStore {
    upstreams: Vec<Arc<dyn Store>>,
}

impl UnionStore {
    pub fn new(upstreams: Vec<Arc<dyn Store>>) -> Self {
        UnionStore { upstreams }
    }
}

#[async_trait]
impl Store for UnionStore {
    fn name(&self) -> &str {
        "Union"
    }

    /// Identity is not knowable before dispatch: different upstreams may
    /// answer the same key with different files.
    fn get_file_identity(&self, _key: &Key) -> Option<String> {
        None
    }

    async fn find(
        &self,
        key: &Key,
        cancel: &CancellationToken,
        policy: &CacheValidityPolicy,
    ) -> SearchResult {
        let n = self.upstreams.len();
        if n == 0 {
            return SearchResult::not_found(
                None,
                crate::diagnostics::Diagnostics::new(
                    self.name(),
                    Outcome::NotFound,
                    "",
                    std::time::SystemTime::now(),
                    None,
                ),
            );
        }

        let token = cancel.child_token();
        let (tx, mut rx) = tokio::sync::mpsc::channel(n);
        for (index, upstream) in self.upstreams.iter().cloned().enumerate() {
            let key = key.clone();
            let child = token.clone();
            let policy = *policy;
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = upstream.find(&key, &child, &policy).await;
                let _ = tx.send((index, result)).await;
            });
        }
        drop(tx);

        let mut results: Vec<Option<SearchResult>> = (0..n).map(|_| None).collect();
        let mut received = 0;
        while received < n {
            match rx.recv().await {
                Some((index, result)) => {
                    received += 1;
                    if result.outcome() == Outcome::Success {
                        // cancel the rest; we still drain every remaining
                        // completion below before returning.
                        token.cancel();
                    }
                    results[index] = Some(result);
                }
                None => break,
            }
        }

        // first success in original upstream order; if none succeeded,
        // fall back to the first upstream's own (non-success) result so
        // its diagnostics are still what the caller sees.
        let success_index = results
            .iter()
            .position(|r| matches!(r, Some(res) if res.outcome() == Outcome::Success));
        let chosen = success_index.or(Some(0)).unwrap();
        results[chosen]
            .take()
            .expect("every index was filled before this point")
    }
}
