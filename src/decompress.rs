//! Adapter around the cabinet-decompression collaborator used to inflate
//! one compressed-path response from a Microsoft-style symbol server.
//!
//! This is an external collaborator by design: we define the interface the
//! Microsoft store needs and delegate the actual inflate to
//! `compress-tools`.

use std::io::Cursor;

use anyhow::Context;
use tokio::io::AsyncRead;

/// Inflates a single-file cabinet-compressed blob -- the Microsoft symbol
/// server convention where a key's last character is replaced with `_` --
/// into a plain byte stream.
///
/// The cabinet wraps exactly one member; this adapter doesn't care what
/// it's named, only that there's one.
pub async fn inflate_compressed_blob(
    data: Vec<u8>,
) -> anyhow::Result<Box<dyn AsyncRead + Send + Unpin>> {
    let member = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<u8>> {
        let mut archive = Cursor::new(data);
        let members = compress_tools::list_archive_files(&mut archive)
            .context("listing members of compressed blob")?;
        let name = members
            .into_iter()
            .next()
            .context("compressed blob has no members")?;
        archive.set_position(0);
        let mut out = Vec::new();
        compress_tools::uncompress_archive_file(&mut archive, &mut out, &name)
            .context("inflating compressed blob")?;
        Ok(out)
    })
    .await
    .context("decompression task panicked")??;
    Ok(Box::new(Cursor::new(member)))
}
