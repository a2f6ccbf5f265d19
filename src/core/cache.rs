// src/core/cache.rs

//! A minimal capability-typed TTL cache shared by the pre-router middlewares.

use dashmap::DashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// The operation set middleware needs from a cache: lookups and TTL inserts
/// for the pre-router, expiry sweeps for the sweeper task. Implementations
/// are swappable; the core never assumes a specific backend.
pub trait Cache<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;
    fn set(&self, key: K, value: V, ttl: Option<Duration>);
    /// Drops every expired entry and returns how many were removed.
    fn purge_expired(&self) -> usize;
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory cache over a concurrent map. Expired entries are dropped lazily
/// on read and swept periodically by the cache sweeper task.
#[derive(Debug, Default)]
pub struct MemoryCache<K: Eq + Hash, V> {
    entries: DashMap<K, Entry<V>>,
}

impl<K: Eq + Hash, V> MemoryCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> Cache<K, V> for MemoryCache<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired(now) {
                drop(entry);
                self.entries.remove_if(key, |_, e| e.is_expired(now));
                return None;
            }
            return Some(entry.value.clone());
        }
        None
    }

    fn set(&self, key: K, value: V, ttl: Option<Duration>) {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.insert(key, Entry { value, expires_at });
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }
}
