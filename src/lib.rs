//! Layered symbol-file retrieval and caching.
//!
//! A [`stores::Store`] resolves a [`key::Key`] to a byte stream: a plain
//! HTTP symbol server ([`stores::http::HttpStore`]), its Microsoft
//! compound-query variant ([`stores::microsoft::MicrosoftHttpStore`]), or a
//! fan-out over several upstreams ([`stores::union::UnionStore`]). A
//! [`cache::FileCache`] sits in front of any of these as a read-through
//! local disk cache, in either the flat legacy layout
//! ([`cache::legacy::LegacyFileCache`]) or the identity-partitioned one
//! ([`cache::identity::IdentityFileCache`]).

pub mod cache;
pub mod config;
pub mod decompress;
pub mod diagnostics;
pub mod key;
pub mod log;
pub mod result;
pub mod stores;

pub use diagnostics::{Diagnostics, Outcome};
pub use key::Key;
pub use result::{CacheValidityPolicy, OpenStream, SearchResult};
pub use stores::Store;
