//! In-process fetch cache with tag-based invalidation.
//!
//! Entries are keyed by request URL and carry zero or more [`CacheTag`]s.
//! Revalidating a tag drops every entry that was stored under it, so the
//! next fetch for those URLs goes upstream again.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheTag(String);

impl CacheTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Tag under which the record for `slug` is cached.
    pub fn video(slug: &str) -> Self {
        Self(format!("video-{}", slug))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a fetch interacts with the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchPolicy {
    /// Always go upstream, never store.
    NoStore,
    /// Serve from cache when present; store successful responses under `tags`.
    Cache {
        tags: Vec<CacheTag>,
        max_age: Option<Duration>,
    },
}

impl FetchPolicy {
    pub fn tagged(tag: CacheTag, max_age: Option<Duration>) -> Self {
        Self::Cache {
            tags: vec![tag],
            max_age,
        }
    }
}

struct Entry<V> {
    value: V,
    tags: Vec<CacheTag>,
    stored_at: Instant,
    max_age: Option<Duration>,
}

impl<V> Entry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        match self.max_age {
            Some(max_age) => now.duration_since(self.stored_at) < max_age,
            None => true,
        }
    }
}

struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    by_tag: HashMap<CacheTag, HashSet<String>>,
    generations: HashMap<CacheTag, u64>,
}

impl<V> Inner<V> {
    fn remove(&mut self, key: &str) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        for tag in &entry.tags {
            if let Some(keys) = self.by_tag.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_tag.remove(tag);
                }
            }
        }
        Some(entry)
    }

    fn generation(&self, tags: &[CacheTag]) -> Generation {
        Generation(
            tags.iter()
                .map(|tag| self.generations.get(tag).copied().unwrap_or(0))
                .collect(),
        )
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.stored_at)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.remove(&key);
        }
    }

    fn store(
        &mut self,
        key: &str,
        value: V,
        tags: Vec<CacheTag>,
        max_age: Option<Duration>,
        max_entries: Option<usize>,
    ) {
        self.remove(key);
        if let Some(max) = max_entries {
            while !self.entries.is_empty() && self.entries.len() >= max {
                self.evict_oldest();
            }
        }
        for tag in &tags {
            self.by_tag
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                tags,
                stored_at: Instant::now(),
                max_age,
            },
        );
    }
}

/// Revalidation counters of a set of tags, taken before a fetch starts.
///
/// A response is only stored if none of its tags were revalidated while the
/// request was in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation(Vec<u64>);

pub struct FetchCache<V = serde_json::Value> {
    inner: RwLock<Inner<V>>,
    max_entries: Option<usize>,
}

impl<V: Clone> Default for FetchCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> FetchCache<V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                by_tag: HashMap::new(),
                generations: HashMap::new(),
            }),
            max_entries: None,
        }
    }

    /// A cache holding at most `max_entries` entries. The oldest entry is
    /// evicted to make room for a new one.
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            max_entries: Some(max_entries.max(1)),
            ..Self::new()
        }
    }

    /// Returns a fresh entry for `key`. Expired entries are evicted.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        {
            let inner = self.inner.read();
            match inner.entries.get(key) {
                Some(entry) if entry.is_fresh(now) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let mut inner = self.inner.write();
        if inner.entries.get(key).is_some_and(|e| !e.is_fresh(now)) {
            inner.remove(key);
        }
        None
    }

    pub fn insert(&self, key: &str, value: V, tags: Vec<CacheTag>, max_age: Option<Duration>) {
        self.inner
            .write()
            .store(key, value, tags, max_age, self.max_entries);
    }

    pub fn generation(&self, tags: &[CacheTag]) -> Generation {
        self.inner.read().generation(tags)
    }

    /// Stores `value` unless one of `tags` was revalidated since `seen` was
    /// taken. Returns whether the entry was stored.
    pub fn insert_if_current(
        &self,
        key: &str,
        value: V,
        tags: Vec<CacheTag>,
        max_age: Option<Duration>,
        seen: &Generation,
    ) -> bool {
        let mut inner = self.inner.write();
        if inner.generation(&tags) != *seen {
            return false;
        }
        inner.store(key, value, tags, max_age, self.max_entries);
        true
    }

    /// Drops every entry stored under `tag`. Returns how many were dropped.
    ///
    /// Fetches for `tag` that are already in flight will not store their
    /// response.
    pub fn revalidate_tag(&self, tag: &CacheTag) -> usize {
        let mut inner = self.inner.write();
        *inner.generations.entry(tag.clone()).or_insert(0) += 1;
        let keys = match inner.by_tag.remove(tag) {
            Some(keys) => keys,
            None => return 0,
        };
        keys.iter().filter(|key| inner.remove(key).is_some()).count()
    }

    pub fn tags_for(&self, key: &str) -> Vec<CacheTag> {
        self.inner
            .read()
            .entries
            .get(key)
            .map(|e| e.tags.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_tag_format() {
        assert_eq!(CacheTag::video("abc").as_str(), "video-abc");
        assert_eq!(CacheTag::video("abc").to_string(), "video-abc");
    }

    #[test]
    fn revalidate_drops_only_tagged_entries() {
        let cache: FetchCache<u32> = FetchCache::new();
        cache.insert("a", 1, vec![CacheTag::video("a")], None);
        cache.insert("b", 2, vec![CacheTag::video("b")], None);

        assert_eq!(cache.revalidate_tag(&CacheTag::video("a")), 1);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
    }

    #[test]
    fn revalidate_unknown_tag_is_noop() {
        let cache: FetchCache<u32> = FetchCache::new();
        cache.insert("a", 1, vec![CacheTag::video("a")], None);
        assert_eq!(cache.revalidate_tag(&CacheTag::video("zzz")), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn replacing_entry_moves_tags() {
        let cache: FetchCache<u32> = FetchCache::new();
        cache.insert("a", 1, vec![CacheTag::new("old")], None);
        cache.insert("a", 2, vec![CacheTag::new("new")], None);

        assert_eq!(cache.revalidate_tag(&CacheTag::new("old")), 0);
        assert_eq!(cache.get("a"), Some(2));
        assert_eq!(cache.tags_for("a"), vec![CacheTag::new("new")]);
    }

    #[test]
    fn entry_with_multiple_tags_is_dropped_once() {
        let cache: FetchCache<u32> = FetchCache::new();
        cache.insert("a", 1, vec![CacheTag::new("x"), CacheTag::new("y")], None);

        assert_eq!(cache.revalidate_tag(&CacheTag::new("x")), 1);
        assert_eq!(cache.revalidate_tag(&CacheTag::new("y")), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn expired_entries_are_evicted() {
        let cache: FetchCache<u32> = FetchCache::new();
        cache.insert("a", 1, vec![], Some(Duration::from_millis(0)));
        assert_eq!(cache.get("a"), None);
        assert!(!cache.contains("a"));

        cache.insert("b", 2, vec![], Some(Duration::from_secs(60)));
        assert_eq!(cache.get("b"), Some(2));
    }

    #[test]
    fn revalidation_during_fetch_skips_stale_store() {
        let cache: FetchCache<u32> = FetchCache::new();
        let tags = vec![CacheTag::video("a")];

        let seen = cache.generation(&tags);
        cache.revalidate_tag(&CacheTag::video("a"));
        assert!(!cache.insert_if_current("a", 1, tags.clone(), None, &seen));
        assert!(cache.is_empty());

        let seen = cache.generation(&tags);
        assert!(cache.insert_if_current("a", 2, tags, None, &seen));
        assert_eq!(cache.get("a"), Some(2));
    }

    #[test]
    fn revalidating_other_tag_keeps_generation() {
        let cache: FetchCache<u32> = FetchCache::new();
        let tags = vec![CacheTag::video("a")];

        let seen = cache.generation(&tags);
        cache.revalidate_tag(&CacheTag::video("b"));
        assert!(cache.insert_if_current("a", 1, tags, None, &seen));
    }

    #[test]
    fn capacity_evicts_oldest_entry() {
        let cache: FetchCache<u32> = FetchCache::with_capacity(2);
        cache.insert("a", 1, vec![CacheTag::new("x")], None);
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("b", 2, vec![CacheTag::new("x")], None);
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("c", 3, vec![CacheTag::new("x")], None);

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains("a"));
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.revalidate_tag(&CacheTag::new("x")), 2);
    }

    #[test]
    fn replacing_entry_at_capacity_keeps_others() {
        let cache: FetchCache<u32> = FetchCache::with_capacity(2);
        cache.insert("a", 1, vec![], None);
        cache.insert("b", 2, vec![], None);
        cache.insert("b", 3, vec![], None);

        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("b"), Some(3));
    }
}
