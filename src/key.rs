//! Keys identifying a symbol file, and the handful of pure helpers that
//! build them for the binary formats debuggers actually ask for.

use std::fmt;

/// An opaque, forward-slash-delimited relative path identifying a symbol
/// file, e.g. `clr.dll/4ba21eeb965000/clr.dll`.
///
/// Two keys are equal iff their byte sequences match. Construction
/// enforces the sanitization rules of the wire format: no `..` segments,
/// no absolute-path prefix, no null bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(String);

impl Key {
    /// Validates and wraps a key string.
    pub fn new(raw: impl Into<String>) -> anyhow::Result<Self> {
        let raw = raw.into();
        sanitize(&raw)?;
        Ok(Key(raw))
    }

    /// Returns the key as a plain `&str`, forward-slash delimited.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the key into its parent directory (forward-slash form, may be
    /// empty) and final component, as used by the identity-partitioned
    /// cache to insert the identity directory before the file name.
    pub fn split_dir_file(&self) -> (&str, &str) {
        match self.0.rfind('/') {
            Some(i) => (&self.0[..i], &self.0[i + 1..]),
            None => ("", &self.0[..]),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Rejects keys containing `..` path segments, absolute-path markers, or
/// null bytes, per the wire-format sanitization rule.
fn sanitize(raw: &str) -> anyhow::Result<()> {
    anyhow::ensure!(!raw.is_empty(), "key is empty");
    anyhow::ensure!(!raw.contains('\0'), "key {raw:?} contains a null byte");
    anyhow::ensure!(
        !raw.starts_with('/') && !raw.starts_with('\\'),
        "key {raw:?} looks absolute"
    );
    // a bare drive letter prefix such as `c:/...` is also an absolute-path marker
    if let Some(colon) = raw.find(':') {
        anyhow::ensure!(colon != 1, "key {raw:?} looks absolute");
    }
    anyhow::ensure!(
        raw.split(['/', '\\']).all(|segment| segment != ".."),
        "key {raw:?} contains a `..` segment"
    );
    Ok(())
}

/// Builds the key debuggers use to ask for an executable image, given its
/// file name, PE timestamp and image size.
///
/// `<filename>/<timestamp-hex><imagesize-hex>/<filename>`, hex without
/// leading zeros on the concatenated segment, lower case.
pub fn image_key(filename: &str, timestamp: u32, image_size: u32) -> anyhow::Result<Key> {
    let id = format!("{timestamp:x}{image_size:x}");
    Key::new(format!("{filename}/{id}/{filename}"))
}

/// Builds the key debuggers use to ask for a debug database (PDB), given
/// its file name, GUID and age.
///
/// `<pdbname>/<guid-hex-nohyphens><age-hex>/<pdbname>`, lower case.
pub fn debug_database_key(pdbname: &str, guid: &[u8; 16], age: u32) -> anyhow::Result<Key> {
    let mut id = base16::encode_lower(guid);
    id.push_str(&format!("{age:x}"));
    Key::new(format!("{pdbname}/{id}/{pdbname}"))
}
