//! Resolves effective configuration by merging CLI flags with environment
//! variables: CLI flag wins, then the matching environment variable, then a
//! built-in default.

use std::ffi::OsString;
use std::path::PathBuf;

const CACHE_ROOT_ENV: &str = "SYMCACHE_CACHE_ROOT";
const STORES_ENV: &str = "SYMCACHE_STORES";

/// Resolves the cache root: `--cache-root`, else `$SYMCACHE_CACHE_ROOT`,
/// else `$TEMP/Symbols`.
pub fn resolve_cache_root(cli_value: Option<PathBuf>) -> PathBuf {
    resolve_cache_root_with(cli_value, |k| std::env::var_os(k), std::env::temp_dir)
}

fn resolve_cache_root_with(
    cli_value: Option<PathBuf>,
    env: impl Fn(&str) -> Option<OsString>,
    temp_dir: impl Fn() -> PathBuf,
) -> PathBuf {
    if let Some(p) = cli_value {
        return p;
    }
    if let Some(p) = env(CACHE_ROOT_ENV) {
        return PathBuf::from(p);
    }
    temp_dir().join("Symbols")
}

/// Resolves the upstream store URL list: `--store` (repeatable), else
/// `$SYMCACHE_STORES` (semicolon-separated), else empty -- callers must
/// supply at least one upstream for `get` to do anything but read the
/// local cache.
pub fn resolve_stores(cli_values: Vec<String>) -> Vec<String> {
    resolve_stores_with(cli_values, |k| std::env::var(k).ok())
}

fn resolve_stores_with(cli_values: Vec<String>, env: impl Fn(&str) -> Option<String>) -> Vec<String> {
    if !cli_values.is_empty() {
        return cli_values;
    }
    match env(STORES_ENV) {
        Some(v) => v
            .split(';')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => Vec::new(),
    }
}

/// Installs the crate's default `RUST_LOG` directive when the caller hasn't
/// set one already.
pub fn install_default_log_filter() {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "symcache=info,reqwest=warn,warn");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_cache_root_wins() {
        let root = resolve_cache_root_with(
            Some(PathBuf::from("/explicit")),
            |_| Some(OsString::from("/from-env")),
            || PathBuf::from("/tmp"),
        );
        assert_eq!(root, PathBuf::from("/explicit"));
    }

    #[test]
    fn env_cache_root_wins_over_default() {
        let root = resolve_cache_root_with(None, |_| Some(OsString::from("/from-env")), || PathBuf::from("/tmp"));
        assert_eq!(root, PathBuf::from("/from-env"));
    }

    #[test]
    fn falls_back_to_temp_symbols() {
        let root = resolve_cache_root_with(None, |_| None, || PathBuf::from("/tmp"));
        assert_eq!(root, PathBuf::from("/tmp/Symbols"));
    }

    #[test]
    fn cli_stores_win() {
        let stores = resolve_stores_with(vec!["http://a".to_string()], |_| Some("http://b;http://c".to_string()));
        assert_eq!(stores, vec!["http://a".to_string()]);
    }

    #[test]
    fn env_stores_are_split_and_trimmed() {
        let stores = resolve_stores_with(vec![], |_| Some(" http://a ; http://b".to_string()));
        assert_eq!(stores, vec!["http://a".to_string(), "http://b".to_string()]);
    }

    #[test]
    fn no_stores_is_empty() {
        let stores = resolve_stores_with(vec![], |_| None);
        assert!(stores.is_empty());
    }
}
