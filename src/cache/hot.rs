//! Hot Layer Module
//!
//! Bounded in-process copy of recently used envelopes, kept in front of the
//! backend store. Recency is tracked in a VecDeque where:
//! - Front = Most recently used
//! - Back = Least recently used

use std::collections::{HashMap, VecDeque};

use super::CacheEntry;

// == Hot Layer ==
#[derive(Debug)]
pub struct HotLayer {
    entries: HashMap<String, CacheEntry>,
    order: VecDeque<String>,
    capacity: usize,
}

impl HotLayer {
    /// Creates an empty layer holding at most `capacity` envelopes.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns a copy of the envelope for `key` and marks it recently used.
    pub fn get(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.get(key).cloned()?;
        self.touch(key);
        Some(entry)
    }

    /// Inserts or replaces an envelope.
    ///
    /// Returns the number of entries evicted to make room.
    pub fn insert(&mut self, key: &str, entry: CacheEntry) -> usize {
        if self.capacity == 0 {
            return 0;
        }

        let mut evicted = 0;
        if !self.entries.contains_key(key) {
            while self.entries.len() >= self.capacity {
                match self.order.pop_back() {
                    Some(oldest) => {
                        self.entries.remove(&oldest);
                        evicted += 1;
                    }
                    None => break,
                }
            }
        }

        self.entries.insert(key.to_string(), entry);
        self.touch(key);
        evicted
    }

    /// Drops the envelope for `key`, if present.
    pub fn remove(&mut self, key: &str) {
        if self.entries.remove(key).is_some() {
            self.order.retain(|k| k != key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn touch(&mut self, key: &str) {
        if self.order.front().map(String::as_str) == Some(key) {
            return;
        }
        self.order.retain(|k| k != key);
        self.order.push_front(key.to_string());
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(n: i64) -> CacheEntry {
        CacheEntry::new(json!(n), None)
    }

    #[test]
    fn test_hot_insert_and_get() {
        let mut hot = HotLayer::new(2);
        assert!(hot.is_empty());

        hot.insert("a", entry(1));
        assert_eq!(hot.get("a").map(|e| e.value), Some(json!(1)));
        assert!(hot.get("b").is_none());
    }

    #[test]
    fn test_hot_evicts_least_recently_used() {
        let mut hot = HotLayer::new(2);
        hot.insert("a", entry(1));
        hot.insert("b", entry(2));

        // Reading 'a' makes 'b' the eviction candidate
        hot.get("a");
        let evicted = hot.insert("c", entry(3));

        assert_eq!(evicted, 1);
        assert_eq!(hot.len(), 2);
        assert!(hot.get("b").is_none());
        assert!(hot.get("a").is_some());
        assert!(hot.get("c").is_some());
    }

    #[test]
    fn test_hot_overwrite_does_not_evict() {
        let mut hot = HotLayer::new(2);
        hot.insert("a", entry(1));
        hot.insert("b", entry(2));

        assert_eq!(hot.insert("a", entry(10)), 0);
        assert_eq!(hot.len(), 2);
        assert_eq!(hot.get("a").map(|e| e.value), Some(json!(10)));
    }

    #[test]
    fn test_hot_remove() {
        let mut hot = HotLayer::new(4);
        hot.insert("a", entry(1));
        hot.remove("a");
        hot.remove("missing");

        assert!(hot.is_empty());
        assert!(hot.get("a").is_none());
    }

    #[test]
    fn test_hot_zero_capacity_stores_nothing() {
        let mut hot = HotLayer::new(0);
        assert_eq!(hot.insert("a", entry(1)), 0);
        assert!(hot.is_empty());
    }
}
