//! The compound-query extension of [`crate::stores::http::HttpStore`]: on
//! a 404, races a redirect-pointer probe against a compressed-blob probe.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::diagnostics::Outcome;
use crate::key::Key;
use crate::result::{CacheValidityPolicy, OpenStream, SearchResult};
use crate::stores::http::{AdditionalResult, HttpStore};
use crate::stores::Store;

const USER_AGENT_HEADER: &str = "symcache";

/// [`HttpStore`] plus the two extra 404 probes Microsoft's symbol server
/// protocol supports: a `file.ptr` redirect pointer, and a compressed
/// blob with its key's last character replaced by `_`.
pub struct MicrosoftHttpStore {
    inner: HttpStore,
}

impl MicrosoftHttpStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let client = reqwest::Client::new();
        let hook: crate::stores::http::AdditionalRequestsFn =
            Arc::new(move |client, base_url, key, cancel, query_time| {
                Box::pin(run_compound_query(client, base_url, key, cancel, query_time))
            });
        let inner = HttpStore::with_client(base_url, client, Some(hook));
        MicrosoftHttpStore { inner }
    }
}

#[async_trait]
impl Store for MicrosoftHttpStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn get_file_identity(&self, key: &Key) -> Option<String> {
        self.inner.get_file_identity(key)
    }

    async fn find(
        &self,
        key: &Key,
        cancel: &CancellationToken,
        policy: &CacheValidityPolicy,
    ) -> SearchResult {
        self.inner.find(key, cancel, policy).await
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Runs both probes concurrently under a shared cancellation token; the
/// first to return `Some` cancels the other, but both are always awaited
/// to completion before this returns -- no caller ever observes a result
/// while a losing branch is still reading.
fn run_compound_query(
    client: reqwest::Client,
    base_url: String,
    key: Key,
    cancel: CancellationToken,
    _query_time: SystemTime,
) -> BoxFuture<'static, Option<AdditionalResult>> {
    Box::pin(async move {
        let token = cancel;
        let mut pointer_task = tokio::spawn(probe_pointer_file(
            client.clone(),
            base_url.clone(),
            key.clone(),
            token.clone(),
        ));
        let mut blob_task = tokio::spawn(probe_compressed_blob(
            client.clone(),
            base_url.clone(),
            key.clone(),
            token.clone(),
        ));

        let mut pointer_result = None;
        let mut blob_result = None;
        let mut pointer_done = false;
        let mut blob_done = false;

        while !(pointer_done && blob_done) {
            tokio::select! {
                r = &mut pointer_task, if !pointer_done => {
                    pointer_done = true;
                    pointer_result = r.unwrap_or(None);
                    if pointer_result.is_some() {
                        token.cancel();
                    }
                }
                r = &mut blob_task, if !blob_done => {
                    blob_done = true;
                    blob_result = r.unwrap_or(None);
                    if blob_result.is_some() {
                        token.cancel();
                    }
                }
            }
        }

        // redirect pointer wins ties over the compressed blob
        pointer_result.or(blob_result)
    })
}

/// Path found inside a `file.ptr` body.
#[derive(Debug, PartialEq, Eq)]
enum PointerFile {
    /// `MSG: ...` -- informational, ignored.
    Message(String),
    /// `PATH: ...` -- a local filesystem path to redirect to.
    Path(String),
}

/// Parses a `file.ptr` body. Leading sentinel alone decides the kind;
/// empty body or any other prefix fails to parse.
fn parse_pointer_file(body: &str) -> Option<PointerFile> {
    let line = body.lines().next()?.trim_end_matches('\r');
    if let Some(rest) = line.strip_prefix("PATH:") {
        Some(PointerFile::Path(rest.trim().to_string()))
    } else if let Some(rest) = line.strip_prefix("MSG:") {
        Some(PointerFile::Message(rest.trim().to_string()))
    } else {
        None
    }
}

/// `{base}/{dir(key)}/file.ptr`, where `dir(key)` is `key` up to and
/// including its last `/`.
fn pointer_file_url(base_url: &str, key: &Key) -> String {
    let (dir, _file) = key.split_dir_file();
    if dir.is_empty() {
        format!("{base_url}/file.ptr")
    } else {
        format!("{base_url}/{dir}/file.ptr")
    }
}

/// `{key with its last character replaced by '_'}`.
fn compressed_blob_key(key: &Key) -> String {
    let mut s = key.as_str().to_string();
    s.pop();
    s.push('_');
    s
}

async fn probe_pointer_file(
    client: reqwest::Client,
    base_url: String,
    key: Key,
    cancel: CancellationToken,
) -> Option<AdditionalResult> {
    let url = pointer_file_url(&base_url, &key);
    let request = client
        .get(&url)
        .header(reqwest::header::USER_AGENT, USER_AGENT_HEADER)
        .send();
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::debug!(%url, "pointer probe cancelled");
            return None;
        }
        r = request => r,
    };
    let response = match response {
        Ok(r) if r.status().is_success() => r,
        Ok(r) => {
            tracing::debug!(%url, status = %r.status(), "pointer probe: no pointer file");
            return None;
        }
        Err(e) => {
            tracing::debug!(%url, error = %e, "pointer probe failed");
            return None;
        }
    };
    let body = match response.text().await {
        Ok(b) => b,
        Err(e) => {
            tracing::debug!(%url, error = %e, "pointer probe: failed reading body");
            return None;
        }
    };
    let path = match parse_pointer_file(&body) {
        Some(PointerFile::Path(p)) => p,
        Some(PointerFile::Message(m)) => {
            tracing::debug!(%url, message = %m, "pointer file is informational only");
            return None;
        }
        None => {
            tracing::debug!(%url, "pointer file failed to parse");
            return None;
        }
    };
    let pathbuf = std::path::PathBuf::from(&path);
    if !pathbuf.exists() {
        tracing::debug!(target = %path, "pointer target does not exist locally");
        return None;
    }
    let identity = Some(url.clone());
    let file_path = path.clone();
    let open_stream = OpenStream::new(move || async move {
        let file = tokio::fs::File::open(&pathbuf).await?;
        Ok(Box::new(file) as Box<dyn tokio::io::AsyncRead + Send + Unpin>)
    });
    Some(AdditionalResult {
        outcome: Outcome::Success,
        identity,
        file_path,
        open_stream,
    })
}

async fn probe_compressed_blob(
    client: reqwest::Client,
    base_url: String,
    key: Key,
    cancel: CancellationToken,
) -> Option<AdditionalResult> {
    let blob_key = compressed_blob_key(&key);
    let url = format!("{base_url}/{blob_key}");
    let request = client
        .get(&url)
        .header(reqwest::header::USER_AGENT, USER_AGENT_HEADER)
        .send();
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::debug!(%url, "compressed blob probe cancelled");
            return None;
        }
        r = request => r,
    };
    let response = match response {
        Ok(r) if r.status().is_success() => r,
        Ok(r) => {
            tracing::debug!(%url, status = %r.status(), "compressed blob probe: nothing there");
            return None;
        }
        Err(e) => {
            tracing::debug!(%url, error = %e, "compressed blob probe failed");
            return None;
        }
    };
    let bytes = match response.bytes().await {
        Ok(b) => b.to_vec(),
        Err(e) => {
            tracing::debug!(%url, error = %e, "compressed blob probe: failed reading body");
            return None;
        }
    };
    let identity = Some(url.clone());
    let file_path = url.clone();
    let open_stream = OpenStream::new(move || async move {
        crate::decompress::inflate_compressed_blob(bytes).await
    });
    Some(AdditionalResult {
        outcome: Outcome::Success,
        identity,
        file_path,
        open_stream,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_path_line() {
        assert_eq!(
            parse_pointer_file("PATH: c:\\temp\\foo.dll\r\n"),
            Some(PointerFile::Path("c:\\temp\\foo.dll".to_string()))
        );
    }

    #[test]
    fn parses_msg_line() {
        assert_eq!(
            parse_pointer_file("MSG: not available\n"),
            Some(PointerFile::Message("not available".to_string()))
        );
    }

    #[test]
    fn rejects_other_prefix_or_empty() {
        assert_eq!(parse_pointer_file(""), None);
        assert_eq!(parse_pointer_file("whatever\n"), None);
    }

    #[test]
    fn pointer_file_url_inserts_directory() {
        let key = Key::new("clr.dll/4ba21eeb965000/clr.dll").unwrap();
        assert_eq!(
            pointer_file_url("http://base", &key),
            "http://base/clr.dll/4ba21eeb965000/file.ptr"
        );
    }

    #[test]
    fn compressed_blob_key_replaces_last_char() {
        let key = Key::new("clr.dll/4ba21eeb965000/clr.dll").unwrap();
        assert_eq!(
            compressed_blob_key(&key),
            "clr.dll/4ba21eeb965000/clr.dl_"
        );
    }
}
