//! Process-wide caches for the retrieval pipeline.
//!
//! Both caches bound themselves by insertion order rather than true LRU: a
//! hit does not refresh an entry's position. The workload is a small number
//! of hot repeated queries, so the accuracy loss is acceptable for O(1)
//! bookkeeping, and the single-threaded-per-request event loop means a plain
//! lock suffices. Concurrent identical misses are not deduplicated; both
//! callers recompute.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Normalize query text for cache keying: trimmed and lowercased.
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Time-boxed, size-bounded cache mapping normalized query text to an
/// embedding vector. Constructed once at process start and injected into the
/// components that need it.
pub struct EmbeddingCache {
    ttl: Duration,
    capacity: usize,
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    entries: HashMap<String, (Vec<f32>, Instant)>,
    insertion_order: VecDeque<String>,
}

impl EmbeddingCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                insertion_order: VecDeque::new(),
            }),
        }
    }

    pub fn get(&self, normalized_query: &str) -> Option<Vec<f32>> {
        self.get_at(normalized_query, Instant::now())
    }

    pub fn put(&self, normalized_query: &str, embedding: Vec<f32>) {
        self.put_at(normalized_query, embedding, Instant::now());
    }

    /// Deterministic-clock variant of [`get`](Self::get); entries older than
    /// the TTL are dropped and reported as misses even under capacity.
    pub fn get_at(&self, normalized_query: &str, now: Instant) -> Option<Vec<f32>> {
        let mut inner = self.inner.lock();
        match inner.entries.get(normalized_query) {
            Some((_, created)) if now.duration_since(*created) > self.ttl => {
                inner.entries.remove(normalized_query);
                inner
                    .insertion_order
                    .retain(|k| k != normalized_query);
                None
            }
            Some((embedding, _)) => Some(embedding.clone()),
            None => None,
        }
    }

    /// Deterministic-clock variant of [`put`](Self::put). Re-inserting an
    /// existing key refreshes its value and timestamp but not its eviction
    /// position.
    pub fn put_at(&self, normalized_query: &str, embedding: Vec<f32>, now: Instant) {
        let mut inner = self.inner.lock();
        if inner
            .entries
            .insert(normalized_query.to_string(), (embedding, now))
            .is_none()
        {
            inner.insertion_order.push_back(normalized_query.to_string());
        }
        while inner.entries.len() > self.capacity {
            let Some(oldest) = inner.insertion_order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Size-bounded cache without a TTL, used for client-side placeholder
/// results keyed by `mode:normalized_query`.
pub struct BoundedCache<V> {
    capacity: usize,
    inner: Mutex<BoundedInner<V>>,
}

struct BoundedInner<V> {
    entries: HashMap<String, V>,
    insertion_order: VecDeque<String>,
}

impl<V: Clone> BoundedCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(BoundedInner {
                entries: HashMap::new(),
                insertion_order: VecDeque::new(),
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.lock().entries.get(key).cloned()
    }

    pub fn put(&self, key: &str, value: V) {
        let mut inner = self.inner.lock();
        if inner.entries.insert(key.to_string(), value).is_none() {
            inner.insertion_order.push_back(key.to_string());
        }
        while inner.entries.len() > self.capacity {
            let Some(oldest) = inner.insertion_order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }
}
