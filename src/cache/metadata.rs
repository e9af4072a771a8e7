//! Round-trippable textual codec for the cache sidecar file.
//!
//! Grammar: a `File Identity:` line, followed by zero or more groups of
//! three lines (`Store:`, `File Path:`, `Last Query Time:`). Trailing
//! `\r` is permitted; empty lines are ignored. Any group that fails to
//! parse invalidates the whole file.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use std::sync::Arc;

use crate::diagnostics::Diagnostics;

/// One upstream hop recorded at ingest time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamQuery {
    pub store_name: String,
    pub file_path: String,
    pub last_query_time: SystemTime,
}

/// The persisted sidecar: a flattened projection of the upstream
/// diagnostics chain at ingest time. Every recorded step is implicitly
/// `Success` -- non-success steps are never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheFileInfo {
    pub file_identity: String,
    pub upstream_queries: Vec<UpstreamQuery>,
}

impl CacheFileInfo {
    /// Flattens a live upstream diagnostics chain into a sidecar record,
    /// tagging it with the identity the upstream resolved (or the cache's
    /// own local path, if the upstream couldn't predict one).
    pub fn from_upstream(identity: Option<String>, fallback_identity: &str, diagnostics: &Arc<Diagnostics>) -> Self {
        let upstream_queries = diagnostics
            .flatten()
            .into_iter()
            .map(|(store_name, file_path, last_query_time)| UpstreamQuery {
                store_name,
                file_path,
                last_query_time,
            })
            .collect();
        CacheFileInfo {
            file_identity: identity.unwrap_or_else(|| fallback_identity.to_string()),
            upstream_queries,
        }
    }
}

/// Serializes a [`CacheFileInfo`] to its textual sidecar form.
pub fn format(info: &CacheFileInfo) -> String {
    let mut out = format!("File Identity: {}\n", info.file_identity);
    for q in &info.upstream_queries {
        out.push_str(&format!("Store: {}\n", q.store_name));
        out.push_str(&format!("File Path: {}\n", q.file_path));
        out.push_str(&format!("Last Query Time: {}\n", format_timestamp(q.last_query_time)));
    }
    out
}

/// Parses a textual sidecar form. `None` on any malformed line or group --
/// a torn/corrupted sidecar degrades to a cache miss, not an error.
pub fn parse(text: &str) -> Option<CacheFileInfo> {
    let mut lines = text
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.is_empty());
    let first = lines.next()?;
    let file_identity = first.strip_prefix("File Identity: ")?.to_string();
    let mut upstream_queries = Vec::new();
    loop {
        let store_line = match lines.next() {
            Some(l) => l,
            None => break,
        };
        let store_name = store_line.strip_prefix("Store: ")?.to_string();
        let path_line = lines.next()?;
        let file_path = path_line.strip_prefix("File Path: ")?.to_string();
        let time_line = lines.next()?;
        let last_query_time = parse_timestamp(time_line.strip_prefix("Last Query Time: ")?)?;
        upstream_queries.push(UpstreamQuery {
            store_name,
            file_path,
            last_query_time,
        });
    }
    Some(CacheFileInfo {
        file_identity,
        upstream_queries,
    })
}

/// `<seconds>.<nanoseconds>` since the Unix epoch. No datetime-formatting
/// crate is in the dependency stack, so this is the textual timestamp
/// form this crate commits to -- see DESIGN.md.
fn format_timestamp(t: SystemTime) -> String {
    let dur = t.duration_since(UNIX_EPOCH).unwrap_or_default();
    format!("{}.{:09}", dur.as_secs(), dur.subsec_nanos())
}

fn parse_timestamp(s: &str) -> Option<SystemTime> {
    let (secs_str, nanos_str) = s.split_once('.')?;
    let secs: u64 = secs_str.parse().ok()?;
    let nanos: u32 = nanos_str.parse().ok()?;
    Some(UNIX_EPOCH + Duration::new(secs, nanos))
}
