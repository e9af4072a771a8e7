//! Thin CLI over the `symcache` library: resolve one key through a
//! configured store stack and print its local path.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use symcache::cache::identity::IdentityFileCache;
use symcache::cache::FileCache;
use symcache::stores::http::HttpStore;
use symcache::stores::microsoft::MicrosoftHttpStore;
use symcache::stores::union::UnionStore;
use symcache::{config, CacheValidityPolicy, Key, Outcome, Store};

/// A layered symbol-file retrieval and caching tool.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Options {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolves a key through the configured store stack.
    Get {
        /// The key to resolve, e.g. `clr.dll/4ba21eeb965000/clr.dll`.
        key: String,
        /// An upstream store base URL. May be repeated; falls back to
        /// `SYMCACHE_STORES` when omitted.
        #[arg(long = "store")]
        stores: Vec<String>,
        /// Overrides the cache root; falls back to `SYMCACHE_CACHE_ROOT`,
        /// then `$TEMP/Symbols`.
        #[arg(long)]
        cache_root: Option<PathBuf>,
        /// Treats every given store as a Microsoft-variant compound-query
        /// server instead of a plain HTTP one.
        #[arg(long)]
        microsoft: bool,
    },
}

fn build_upstream(store_urls: &[String], microsoft: bool) -> Arc<dyn Store> {
    let stores: Vec<Arc<dyn Store>> = store_urls
        .iter()
        .map(|url| -> Arc<dyn Store> {
            if microsoft {
                Arc::new(MicrosoftHttpStore::new(url.clone()))
            } else {
                Arc::new(HttpStore::new(url.clone()))
            }
        })
        .collect();
    match stores.len() {
        1 => stores.into_iter().next().expect("length checked above"),
        _ => Arc::new(UnionStore::new(stores)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    config::install_default_log_filter();
    tracing_subscriber::fmt().without_time().init();

    let options = Options::parse();
    match options.command {
        Command::Get {
            key,
            stores,
            cache_root,
            microsoft,
        } => run_get(key, stores, cache_root, microsoft).await,
    }
}

async fn run_get(
    key: String,
    cli_stores: Vec<String>,
    cli_cache_root: Option<PathBuf>,
    microsoft: bool,
) -> anyhow::Result<ExitCode> {
    let key = Key::new(key)?;
    let store_urls = config::resolve_stores(cli_stores);
    let cache_root = config::resolve_cache_root(cli_cache_root);
    let upstream = build_upstream(&store_urls, microsoft);
    let cache = FileCache::new(cache_root, upstream, IdentityFileCache);

    let cancel = CancellationToken::new();
    let result = cache
        .find(&key, &cancel, &CacheValidityPolicy::default())
        .await;
    match result.outcome() {
        Outcome::Success => {
            println!("{}", result.diagnostics.file_path);
            Ok(ExitCode::SUCCESS)
        }
        outcome => {
            eprintln!("{key}: {outcome:?}");
            Ok(ExitCode::FAILURE)
        }
    }
}
