// src/cache.rs
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, info};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::models::CandidateEntity;

pub const DEFAULT_MAX_ENTRIES_PER_KEY: usize = 5;

/// One remembered resolution of a normalized name.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResolution {
    pub entity: CandidateEntity,
    pub confidence: f64,
    pub last_seen: DateTime<Utc>,
}

/// Bounded resolution history for one normalized key.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub normalized_key: String,
    pub entries: Vec<CachedResolution>,
}

impl CacheEntry {
    fn new(normalized_key: &str) -> Self {
        Self {
            normalized_key: normalized_key.to_string(),
            entries: Vec::new(),
        }
    }

    /// Most confident entry, most recent on ties.
    pub fn best(&self) -> Option<&CachedResolution> {
        self.entries.iter().max_by(|a, b| {
            a.confidence
                .total_cmp(&b.confidence)
                .then_with(|| a.last_seen.cmp(&b.last_seen))
        })
    }

    fn upsert(&mut self, entity: CandidateEntity, confidence: f64, cap: usize) {
        let now = Utc::now();
        match self.entries.iter_mut().find(|e| e.entity.id == entity.id) {
            Some(existing) => {
                existing.entity = entity;
                existing.confidence = confidence;
                existing.last_seen = now;
            }
            None => self.entries.push(CachedResolution {
                entity,
                confidence,
                last_seen: now,
            }),
        }

        while self.entries.len() > cap {
            let weakest = self
                .entries
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    a.confidence
                        .total_cmp(&b.confidence)
                        .then_with(|| a.last_seen.cmp(&b.last_seen))
                })
                .map(|(idx, _)| idx);
            match weakest {
                Some(idx) => {
                    let evicted = self.entries.remove(idx);
                    debug!(
                        "Cache evicted {} ({:.3}) from key '{}'",
                        evicted.entity.id, evicted.confidence, self.normalized_key
                    );
                }
                None => break,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub keys: usize,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// Process-lifetime cache of high-confidence resolutions keyed by normalized
/// name. Sharded map, so writers to one key never block readers of another.
pub struct ExactMatchCache {
    entries: DashMap<String, CacheEntry>,
    max_entries_per_key: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ExactMatchCache {
    pub fn new(max_entries_per_key: usize) -> Self {
        let max_entries_per_key = max_entries_per_key.max(1);
        info!(
            "Initializing ExactMatchCache with {} entries per key",
            max_entries_per_key
        );
        Self {
            entries: DashMap::new(),
            max_entries_per_key,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn lookup(&self, normalized_key: &str) -> Option<CachedResolution> {
        let found = self
            .entries
            .get(normalized_key)
            .and_then(|entry| entry.best().cloned());

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    pub fn record(&self, normalized_key: &str, entity: CandidateEntity, confidence: f64) {
        if normalized_key.is_empty() {
            return;
        }
        let confidence = confidence.clamp(0.0, 1.0);
        debug!(
            "Caching '{}' -> {} ({:.3})",
            normalized_key, entity.id, confidence
        );
        self.entries
            .entry(normalized_key.to_string())
            .or_insert_with(|| CacheEntry::new(normalized_key))
            .upsert(entity, confidence, self.max_entries_per_key);
    }

    pub fn entry(&self, normalized_key: &str) -> Option<CacheEntry> {
        self.entries.get(normalized_key).map(|e| e.value().clone())
    }

    pub fn max_entries_per_key(&self) -> usize {
        self.max_entries_per_key
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            keys: self.entries.len(),
            entries: self.entries.iter().map(|e| e.entries.len()).sum(),
            hits,
            misses,
            hit_rate: if lookups > 0 {
                hits as f64 / lookups as f64
            } else {
                0.0
            },
        }
    }
}

pub type SharedMatchCache = Arc<ExactMatchCache>;

pub fn create_shared_cache(max_entries_per_key: usize) -> SharedMatchCache {
    Arc::new(ExactMatchCache::new(max_entries_per_key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(id: &str) -> CandidateEntity {
        CandidateEntity::new(id, format!("Entity {}", id))
    }

    #[test]
    fn test_lookup_returns_most_confident() {
        let cache = ExactMatchCache::new(5);
        assert!(cache.lookup("acme").is_none());

        cache.record("acme", entity("a"), 0.96);
        cache.record("acme", entity("b"), 0.99);
        let best = cache.lookup("acme").map(|r| r.entity.id);
        assert_eq!(best.as_deref(), Some("b"));

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert_eq!((stats.keys, stats.entries), (1, 2));
    }

    #[test]
    fn test_cap_evicts_least_confident() {
        let cache = ExactMatchCache::new(2);
        cache.record("acme", entity("a"), 0.97);
        cache.record("acme", entity("b"), 0.95);
        cache.record("acme", entity("c"), 0.99);

        let entry = cache.entry("acme").unwrap();
        let mut ids: Vec<&str> = entry.entries.iter().map(|e| e.entity.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_rerecording_updates_in_place() {
        let cache = ExactMatchCache::new(2);
        cache.record("acme", entity("a"), 0.95);
        cache.record("acme", entity("a"), 0.98);
        let entry = cache.entry("acme").unwrap();
        assert_eq!(entry.entries.len(), 1);
        assert_eq!(entry.entries[0].confidence, 0.98);
    }

    #[test]
    fn test_zero_cap_is_raised_and_empty_key_ignored() {
        let cache = ExactMatchCache::new(0);
        assert_eq!(cache.max_entries_per_key(), 1);
        cache.record("", entity("a"), 1.0);
        assert_eq!(cache.stats().keys, 0);
    }

    #[tokio::test]
    async fn test_concurrent_writers_respect_cap() {
        let cache = create_shared_cache(3);
        let handles: Vec<_> = (0..32)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    let key = if i % 2 == 0 { "even" } else { "odd" };
                    cache.record(key, entity(&i.to_string()), 0.9 + (i as f64) / 1000.0);
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let stats = cache.stats();
        assert_eq!(stats.keys, 2);
        assert_eq!(stats.entries, 6);
        assert_eq!(cache.lookup("odd").map(|r| r.entity.id).as_deref(), Some("31"));
    }
}
