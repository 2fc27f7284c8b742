use core::time::Duration;
use std::collections::HashMap;
use tokio::time::Instant;

/// Small map whose entries expire a fixed time after they were stored. Expired entries are
/// dropped lazily when they are looked up or when new entries are stored.
#[derive(Debug)]
pub struct TtlCache {
    ttl: Duration,
    entries: HashMap<String, (Instant, String)>,
    /// Bumped by every [`TtlCache::clear`]
    generation: u64,
}

impl TtlCache {
    #[must_use]
    #[inline]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
            generation: 0,
        }
    }

    /// Returns the stored value for `key` if it is still fresh
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn get(&mut self, key: &str) -> Option<String> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some((stored_at, value)) if now.duration_since(*stored_at) < self.ttl => {
                return Some(value.clone());
            }
            Some(_) => {}
            None => return None,
        }
        self.entries.remove(key);
        None
    }

    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn insert(&mut self, key: String, value: String) {
        let now = Instant::now();
        let ttl = self.ttl;
        self.entries
            .retain(|_, (stored_at, _)| now.duration_since(*stored_at) < ttl);
        self.entries.insert(key, (now, value));
    }

    /// Drops every entry and starts a new generation
    #[inline]
    pub fn clear(&mut self) {
        self.entries.clear();
        self.generation = self.generation.wrapping_add(1);
    }

    /// Changes whenever the cache is cleared. Values computed while an older generation was
    /// current must not be stored.
    #[must_use]
    #[inline]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires() {
        let mut cache = TtlCache::new(Duration::from_secs(300));
        cache.insert(String::from("sci-fi"), String::from("Dune"));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get("sci-fi").as_deref(), Some("Dune"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("sci-fi"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_exact() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        cache.insert(String::from("sci-fi"), String::from("Dune"));
        assert_eq!(cache.get("Sci-Fi"), None);
        assert_eq!(cache.get("sci-fi "), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_drops_stale_entries() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        cache.insert(String::from("old"), String::from("a"));
        tokio::time::advance(Duration::from_secs(61)).await;
        cache.insert(String::from("new"), String::from("b"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        cache.insert(String::from("a"), String::from("b"));
        let before = cache.generation();
        cache.clear();
        assert_eq!(cache.get("a"), None);
        assert_ne!(cache.generation(), before);
    }
}
