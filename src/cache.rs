// Search response cache
// Sits between the search controller and the backend: identical parameter tuples
// inside the TTL are answered locally, and the entry count is bounded.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::{models::Attraction, query::SearchQuery};

pub type SearchResults = Arc<Vec<Attraction>>;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub items_count: usize,
    pub hit_count: usize,
    pub miss_count: usize,
    pub eviction_count: usize,
    pub expired_count: usize,
}

// Explicit eviction policy: entries older than `ttl` are stale, and past
// `capacity` the oldest-inserted entry goes first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub ttl: Duration,
    pub capacity: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            capacity: 50,
        }
    }
}

// Key over the full parameter tuple
pub fn create_cache_key(query: &SearchQuery) -> String {
    let opt = |v: Option<String>| v.unwrap_or_default();
    let (lat, lng, radius) = match query.near {
        Some(near) => (
            near.center.lat.to_string(),
            near.center.lng.to_string(),
            near.radius_m.to_string(),
        ),
        None => Default::default(),
    };

    format!(
        "{}:{}:{}:{}:{}:{}:{}",
        opt(query.text.clone()),
        opt(query.category.clone()),
        opt(query.min_rating.map(|v| v.to_string())),
        opt(query.max_price.map(|v| v.to_string())),
        lat,
        lng,
        radius,
    )
}

struct CacheEntry {
    results: SearchResults,
    stored_at: Instant,
    seq: u64,
}

pub struct SearchCache {
    store: DashMap<String, CacheEntry>,
    // insertion sequence -> key, oldest first
    order: RwLock<BTreeMap<u64, String>>,
    next_seq: AtomicU64,
    policy: CachePolicy,
    stats: Arc<RwLock<CacheStats>>,
}

impl SearchCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            store: DashMap::new(),
            order: RwLock::new(BTreeMap::new()),
            next_seq: AtomicU64::new(0),
            policy,
            stats: Arc::new(RwLock::new(CacheStats::default())),
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    fn is_alive(&self, entry: &CacheEntry) -> bool {
        entry.stored_at.elapsed() < self.policy.ttl
    }

    // Caller holds the order lock
    fn remove_oldest(&self, order: &mut BTreeMap<u64, String>) -> bool {
        let Some((_, key)) = order.pop_first() else {
            return false;
        };

        if self.store.remove(&key).is_some() {
            self.stats.write().eviction_count += 1;
            debug!(key = %key, "evicted search cache entry");
        }
        true
    }

    pub fn store(&self, key: &str, results: SearchResults) {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let entry = CacheEntry {
            results,
            stored_at: Instant::now(),
            seq,
        };

        let mut order = self.order.write();
        if let Some(previous) = self.store.insert(key.to_string(), entry) {
            order.remove(&previous.seq);
        }
        order.insert(seq, key.to_string());

        while self.store.len() > self.policy.capacity {
            if !self.remove_oldest(&mut order) {
                break;
            }
        }

        self.stats.write().items_count = self.store.len();
    }

    // Fresh results for `key`, expired entries are dropped on the way
    pub fn get(&self, key: &str) -> Option<SearchResults> {
        let lookup = self
            .store
            .get(key)
            .map(|entry| (self.is_alive(&entry), entry.results.clone(), entry.seq));

        match lookup {
            Some((true, results, _)) => {
                self.stats.write().hit_count += 1;
                Some(results)
            }
            Some((false, _, seq)) => {
                // a concurrent store may already have replaced the stale entry
                self.store.remove_if(key, |_, entry| entry.seq == seq);
                self.order.write().remove(&seq);
                let mut stats = self.stats.write();
                stats.expired_count += 1;
                stats.miss_count += 1;
                stats.items_count = self.store.len();
                None
            }
            None => {
                self.stats.write().miss_count += 1;
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn clear(&self) -> usize {
        let removed = self.store.len();
        self.store.clear();
        self.order.write().clear();
        self.stats.write().items_count = 0;
        removed
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }
}

impl Default for SearchCache {
    fn default() -> Self {
        Self::new(CachePolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn results(ids: &[i64]) -> SearchResults {
        Arc::new(
            ids.iter()
                .map(|id| Attraction {
                    id: *id,
                    place_id: format!("place{id}"),
                    ..Default::default()
                })
                .collect(),
        )
    }

    #[test]
    fn test_key_covers_every_parameter() {
        let base = SearchQuery::from_query_string("q=louvre&category=museum");
        let rated = SearchQuery::from_query_string("q=louvre&category=museum&minRating=4");
        let located =
            SearchQuery::from_query_string("q=louvre&category=museum&lat=48.8&lng=2.3&radius_m=500");

        assert_ne!(create_cache_key(&base), create_cache_key(&rated));
        assert_ne!(create_cache_key(&base), create_cache_key(&located));
        assert_eq!(
            create_cache_key(&base),
            create_cache_key(&SearchQuery::from_query_string("category=museum&q=louvre"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiration_and_ttl() {
        let cache = SearchCache::new(CachePolicy {
            ttl: Duration::from_secs(5),
            capacity: 10,
        });

        cache.store("museums", results(&[1, 2]));
        assert_eq!(cache.get("museums"), Some(results(&[1, 2])));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(cache.get("museums").is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("museums").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hit_count, 2);
        assert_eq!(stats.expired_count, 1);
        assert_eq!(stats.items_count, 0);
    }

    #[test]
    fn test_capacity_evicts_oldest_entry() {
        let cache = SearchCache::new(CachePolicy {
            ttl: Duration::from_secs(300),
            capacity: 3,
        });

        for i in 0..4 {
            cache.store(&format!("key{i}"), results(&[i]));
        }

        assert_eq!(cache.len(), 3);
        assert!(cache.get("key0").is_none(), "oldest entry should be gone");
        assert!(cache.get("key3").is_some());
        assert_eq!(cache.stats().eviction_count, 1);
    }

    #[test]
    fn test_restoring_a_key_refreshes_its_age_rank() {
        let cache = SearchCache::new(CachePolicy {
            ttl: Duration::from_secs(300),
            capacity: 2,
        });

        cache.store("a", results(&[1]));
        cache.store("b", results(&[2]));
        cache.store("a", results(&[3]));
        cache.store("c", results(&[4]));

        assert!(cache.get("b").is_none());
        assert_eq!(cache.get("a"), Some(results(&[3])));
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_concurrent_access_with_contention() {
        let cache = Arc::new(SearchCache::new(CachePolicy {
            ttl: Duration::from_secs(300),
            capacity: 64,
        }));

        let mut handles = vec![];
        for i in 0..8 {
            let cache = cache.clone();
            handles.push(thread::spawn(move || {
                for j in 0..500 {
                    let key = format!("key{}", (i * 7 + j) % 100);
                    if j % 4 == 0 {
                        cache.store(&key, results(&[j as i64]));
                    } else {
                        let _ = cache.get(&key);
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.len() <= 64, "capacity exceeded: {}", cache.len());
        let stats = cache.stats();
        assert_eq!(stats.hit_count + stats.miss_count, 8 * 375);
    }

    #[test]
    fn test_clear() {
        let cache = SearchCache::default();
        cache.store("a", results(&[1]));
        cache.store("b", results(&[2]));

        assert_eq!(cache.clear(), 2);
        assert!(cache.is_empty());
        assert!(cache.get("a").is_none());
    }
}
