//! Capacity-bounded recency cache of responders.
//!
//! Keyed by (address, port). When full, inserting a new key evicts the
//! least-recently-seen one, so a responder that repeats after being evicted
//! is counted as new again.

use std::num::NonZeroUsize;

use lru::LruCache;

use super::ResponderKey;

/// LRU window over recently seen responders.
pub struct WindowCache {
    cache: LruCache<ResponderKey, ()>,
}

impl WindowCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            cache: LruCache::new(capacity),
        }
    }

    /// Look up `key`, inserting it if absent. Returns `true` if it was
    /// already present. A hit refreshes the key's recency.
    pub fn get_or_insert(&mut self, key: ResponderKey) -> bool {
        if self.cache.get(&key).is_some() {
            return true;
        }
        self.cache.put(key, ());
        false
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn key(last: u8, port: u16) -> ResponderKey {
        ResponderKey::new(Ipv4Addr::new(192, 0, 2, last), port)
    }

    fn window(cap: usize) -> WindowCache {
        WindowCache::new(NonZeroUsize::new(cap).unwrap())
    }

    #[test]
    fn test_first_insert_is_new_second_is_repeat() {
        let mut w = window(4);
        assert!(!w.get_or_insert(key(1, 80)));
        assert!(w.get_or_insert(key(1, 80)));
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn test_port_is_part_of_key() {
        let mut w = window(4);
        assert!(!w.get_or_insert(key(1, 80)));
        assert!(!w.get_or_insert(key(1, 443)), "same address, different port is distinct");
    }

    #[test]
    fn test_eviction_of_least_recent() {
        let mut w = window(2);
        w.get_or_insert(key(1, 80));
        w.get_or_insert(key(2, 80));
        w.get_or_insert(key(3, 80)); // evicts key(1)
        assert_eq!(w.len(), 2);
        assert!(!w.get_or_insert(key(1, 80)), "evicted key must be treated as new");
    }

    #[test]
    fn test_hit_refreshes_recency() {
        let mut w = window(2);
        w.get_or_insert(key(1, 80));
        w.get_or_insert(key(2, 80));
        assert!(w.get_or_insert(key(1, 80))); // key(2) is now least recent
        w.get_or_insert(key(3, 80)); // evicts key(2)
        assert!(w.get_or_insert(key(1, 80)), "recently seen key must survive eviction");
        assert!(!w.get_or_insert(key(2, 80)));
    }

    #[test]
    fn test_capacity_reported() {
        assert_eq!(window(16).capacity(), 16);
        assert!(window(16).is_empty());
    }
}
