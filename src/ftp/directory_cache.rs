//! Server-path-keyed raw `LIST` cache with a readers/writer discipline
//! (spec §4.5).
//!
//! Unlike the rest of this crate's pooling code — which follows the
//! teacher's plain `tokio::sync::Mutex` throughout — this cache uses
//! `tokio::sync::RwLock`: the spec's lookup algorithm is explicitly
//! read-then-maybe-upgrade-to-write, and `RwLock` is the idiomatic
//! tokio type for that shape.

use crate::ftp::parser::{EntryKind, ListingParser, ParsedEntry};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Cached raw listing bytes for one directory, keyed by server path.
#[derive(Default)]
pub struct DirectoryCache {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Step 1–2 of spec §4.5's lookup algorithm: if `parent` is cached,
    /// scan it for `child_name` and return the parsed entry (or `None`
    /// if the scan completes without a match). Returns `None` overall
    /// (distinguishable by the caller re-trying with `fetch_and_insert`)
    /// when `parent` isn't cached at all.
    pub async fn lookup(&self, parent: &str, child_name: &str) -> CacheLookup {
        let guard = self.entries.read().await;
        match guard.get(parent) {
            Some(raw) => {
                let text = String::from_utf8_lossy(raw);
                let mut parser = ListingParser::new();
                for line in text.lines() {
                    let entry = parser.feed_line(line);
                    if matches!(entry.kind, EntryKind::Ignore) {
                        continue;
                    }
                    if entry.name == child_name {
                        return CacheLookup::Found(entry);
                    }
                }
                CacheLookup::Miss
            }
            None => CacheLookup::NotCached,
        }
    }

    /// All non-ignored entries of a cached directory, or `None` if not
    /// cached.
    pub async fn entries(&self, parent: &str) -> Option<Vec<ParsedEntry>> {
        let guard = self.entries.read().await;
        let raw = guard.get(parent)?;
        let text = String::from_utf8_lossy(raw);
        let mut parser = ListingParser::new();
        Some(
            text.lines()
                .map(|l| parser.feed_line(l))
                .filter(|e| !matches!(e.kind, EntryKind::Ignore))
                .collect(),
        )
    }

    /// Step 3: insert freshly fetched `LIST` bytes for `parent`.
    pub async fn insert(&self, parent: &str, raw: Vec<u8>) {
        let mut guard = self.entries.write().await;
        guard.insert(parent.to_string(), raw);
    }

    /// Purge one directory's cache entry (spec §4.5 invalidation: any
    /// mutating operation purges its parent directory's entry).
    pub async fn invalidate(&self, parent: &str) {
        let mut guard = self.entries.write().await;
        guard.remove(parent);
    }

    pub async fn clear(&self) {
        let mut guard = self.entries.write().await;
        guard.clear();
    }
}

/// Result of a cache lookup, distinguishing "not cached at all" from
/// "cached but the entry wasn't found in it" — the backend only falls
/// back to per-file probes in the latter case after a fetch.
pub enum CacheLookup {
    Found(ParsedEntry),
    Miss,
    NotCached,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_before_insert_is_not_cached() {
        let cache = DirectoryCache::new();
        assert!(matches!(
            cache.lookup("/a", "b.txt").await,
            CacheLookup::NotCached
        ));
    }

    #[tokio::test]
    async fn lookup_after_insert_finds_entry() {
        let cache = DirectoryCache::new();
        let raw = b"-rw-r--r--   1 user group  1234 Jan  1 12:00 b.txt\n".to_vec();
        cache.insert("/a", raw).await;
        match cache.lookup("/a", "b.txt").await {
            CacheLookup::Found(e) => assert_eq!(e.size, "1234"),
            _ => panic!("expected Found"),
        }
        assert!(matches!(
            cache.lookup("/a", "missing.txt").await,
            CacheLookup::Miss
        ));
    }

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let cache = DirectoryCache::new();
        cache.insert("/a", b"total 0\n".to_vec()).await;
        cache.invalidate("/a").await;
        assert!(matches!(
            cache.lookup("/a", "b.txt").await,
            CacheLookup::NotCached
        ));
    }
}
