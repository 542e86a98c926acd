//! In-memory mapping from key to [`CacheEntry`], maintained in access order.
//!
//! Built on `lru::LruCache::unbounded()`; the byte budget is enforced by
//! [`LruIndex::evict_until`], not by the map's own capacity limit.
use crate::entry::{CacheEntry, EntryState};
use lru::LruCache;
use std::time::SystemTime;

pub struct LruIndex {
    map: LruCache<String, CacheEntry>,
}

impl LruIndex {
    pub fn new() -> Self {
        Self {
            map: LruCache::unbounded(),
        }
    }

    /// Returns the entry, having moved it to MRU and stamped
    /// `last_accessed`. `None` if the key is absent.
    pub fn get(&mut self, key: &str, now: SystemTime) -> Option<&mut CacheEntry> {
        let entry = self.map.get_mut(key)?;
        entry.last_accessed = now;
        Some(entry)
    }

    /// Looks at the entry without disturbing its recency.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry> {
        self.map.peek(key)
    }

    /// Inserts, or replaces and moves to MRU if already present.
    pub fn put(&mut self, entry: CacheEntry) {
        self.map.put(entry.key.clone(), entry);
    }

    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        self.map.pop(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains(key)
    }

    /// Byte-sum of all non-`Deleted` entries.
    pub fn len_bytes(&self) -> usize {
        self.map
            .iter()
            .filter(|(_, e)| e.state != EntryState::Deleted)
            .map(|(_, e)| e.size())
            .sum()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// While `len_bytes() > max`, removes the LRU (head) entry. Pure memory
    /// eviction: never touches disk, never transitions state.
    pub fn evict_until(&mut self, max: usize) -> Vec<CacheEntry> {
        let mut evicted = Vec::new();
        while self.len_bytes() > max {
            match self.map.pop_lru() {
                Some((_, entry)) => evicted.push(entry),
                None => break,
            }
        }
        evicted
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    /// Visits every entry in arbitrary order, for the flush engine.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut CacheEntry> {
        self.map.iter_mut().map(|(_, e)| e)
    }
}

impl Default for LruIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entry::EntryState;
    use std::time::SystemTime;

    fn entry(key: &str, size: usize, state: EntryState) -> CacheEntry {
        CacheEntry::new(key, vec![0u8; size], state, SystemTime::now())
    }

    #[test]
    fn get_moves_to_mru() {
        let mut idx = LruIndex::new();
        idx.put(entry("a", 1, EntryState::Synced));
        idx.put(entry("b", 1, EntryState::Synced));
        idx.get("a", SystemTime::now());

        // "b" is now LRU; evicting a budget of 1 byte must drop "b" first.
        let evicted = idx.evict_until(1);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].key, "b");
        assert!(idx.contains("a"));
    }

    #[test]
    fn len_bytes_excludes_deleted() {
        let mut idx = LruIndex::new();
        idx.put(entry("a", 10, EntryState::Synced));
        idx.put(entry("b", 20, EntryState::Deleted));
        assert_eq!(idx.len_bytes(), 10);
    }

    #[test]
    fn evict_until_stops_at_budget() {
        let mut idx = LruIndex::new();
        for i in 0..5 {
            idx.put(entry(&i.to_string(), 1024, EntryState::Synced));
        }
        let evicted = idx.evict_until(3 * 1024);
        assert_eq!(evicted.len(), 2);
        assert_eq!(idx.len_bytes(), 3 * 1024);
    }

    #[test]
    fn key_appears_at_most_once() {
        let mut idx = LruIndex::new();
        idx.put(entry("a", 1, EntryState::Updated));
        idx.put(entry("a", 2, EntryState::Updated));
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.peek("a").unwrap().size(), 2);
    }
}
