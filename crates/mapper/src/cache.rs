//! Configuration cache.
//!
//! Memoizes resolved configurations per type key. Published entries are
//! read through an `RwLock` and handed out as `Arc`s, so readers never wait
//! on a build. A miss registers an in-flight slot for its key: the first
//! caller builds, later callers for the same key block on that slot and
//! receive the leader's result, whether success or failure. Builds for
//! different keys never share a lock.
//!
//! Failed builds are not recorded; the next call for the key builds again.
//!
//! Entries are keyed by type key only. Contexts sharing one cache must use
//! the same declarations and the same resolver, or they will be served each
//! other's configurations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock};
use serde::Serialize;

use common::{MapperError, MapperResult};

use crate::config::{TypeConfiguration, TypeKey};

type Outcome = MapperResult<Arc<TypeConfiguration>>;

/// Rendezvous point for callers waiting on one build.
#[derive(Default)]
struct BuildSlot {
    outcome: Mutex<Option<Outcome>>,
    ready: Condvar,
}

impl BuildSlot {
    fn wait(&self) -> Outcome {
        let mut outcome = self.outcome.lock();
        loop {
            if let Some(result) = outcome.as_ref() {
                return result.clone();
            }
            self.ready.wait(&mut outcome);
        }
    }
}

/// Published configurations and the invalidation counters guarding them.
///
/// Both live under one lock so that checking a build's generation and
/// publishing it cannot interleave with an invalidation.
#[derive(Default)]
struct Entries {
    published: HashMap<TypeKey, Arc<TypeConfiguration>>,
    /// Bumped by `invalidate` for one key
    generations: HashMap<TypeKey, u64>,
    /// Bumped by `clear` for every key
    epoch: u64,
}

impl Entries {
    fn generation(&self, key: &TypeKey) -> (u64, u64) {
        (self.epoch, self.generations.get(key).copied().unwrap_or_default())
    }
}

/// Counters for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub builds: u64,
    pub failures: u64,
    pub entries: usize,
}

/// Process-scoped configuration cache.
#[derive(Default)]
pub struct ConfigurationCache {
    entries: RwLock<Entries>,
    in_flight: Mutex<HashMap<TypeKey, Arc<BuildSlot>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    builds: AtomicU64,
    failures: AtomicU64,
}

impl ConfigurationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached configuration for `key`, building it with `build` on a miss.
    ///
    /// At most one `build` runs per key at a time; concurrent callers for
    /// the same key observe its outcome.
    pub fn get_or_build<F>(&self, key: &TypeKey, build: F) -> Outcome
    where
        F: FnOnce() -> MapperResult<TypeConfiguration>,
    {
        if let Some(found) = self.lookup(key) {
            return Ok(found);
        }

        let (slot, generation) = {
            let mut in_flight = self.in_flight.lock();
            // A leader publishes before it releases its slot
            if let Some(found) = self.lookup(key) {
                return Ok(found);
            }
            self.misses.fetch_add(1, Ordering::Relaxed);
            if let Some(slot) = in_flight.get(key) {
                let slot = Arc::clone(slot);
                drop(in_flight);
                tracing::trace!(type_key = %key, "Waiting for in-flight configuration build");
                return slot.wait();
            }
            let slot = Arc::new(BuildSlot::default());
            in_flight.insert(key.clone(), Arc::clone(&slot));
            (slot, self.entries.read().generation(key))
        };

        self.builds.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(type_key = %key, "Building configuration");

        let guard = BuildGuard {
            cache: self,
            key,
            slot: &slot,
            generation,
            armed: true,
        };
        let outcome = build().map(Arc::new);
        guard.complete(outcome)
    }

    /// Published configuration, if any
    pub fn get(&self, key: &TypeKey) -> Option<Arc<TypeConfiguration>> {
        self.entries.read().published.get(key).cloned()
    }

    pub fn contains(&self, key: &TypeKey) -> bool {
        self.entries.read().published.contains_key(key)
    }

    /// Drop one entry; returned `Arc`s stay valid and an in-flight build
    /// of the same key is not published
    pub fn invalidate(&self, key: &TypeKey) -> bool {
        let removed = {
            let mut entries = self.entries.write();
            *entries.generations.entry(key.clone()).or_default() += 1;
            entries.published.remove(key).is_some()
        };
        if removed {
            tracing::debug!(type_key = %key, "Invalidated configuration");
        }
        removed
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.epoch += 1;
        entries.published.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().published.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().published.is_empty()
    }

    /// Published keys, sorted
    pub fn keys(&self) -> Vec<TypeKey> {
        let mut keys: Vec<TypeKey> = self.entries.read().published.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            builds: self.builds.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    fn lookup(&self, key: &TypeKey) -> Option<Arc<TypeConfiguration>> {
        let found = self.get(key)?;
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(found)
    }

    fn finish(&self, key: &TypeKey, slot: &BuildSlot, generation: (u64, u64), outcome: &Outcome) {
        match outcome {
            Ok(configuration) => {
                let mut entries = self.entries.write();
                if entries.generation(key) == generation {
                    entries.published.insert(key.clone(), Arc::clone(configuration));
                    drop(entries);
                    tracing::debug!(type_key = %key, "Published configuration");
                } else {
                    tracing::debug!(type_key = %key, "Cache invalidated during build; not publishing");
                }
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(type_key = %key, error = %e, "Configuration build failed");
            }
        }

        self.in_flight.lock().remove(key);
        *slot.outcome.lock() = Some(outcome.clone());
        slot.ready.notify_all();
    }
}

/// Releases the in-flight slot even if the build panics.
struct BuildGuard<'a> {
    cache: &'a ConfigurationCache,
    key: &'a TypeKey,
    slot: &'a BuildSlot,
    generation: (u64, u64),
    armed: bool,
}

impl BuildGuard<'_> {
    fn complete(mut self, outcome: Outcome) -> Outcome {
        self.armed = false;
        self.cache
            .finish(self.key, self.slot, self.generation, &outcome);
        outcome
    }
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let outcome = Err(MapperError::internal(format!(
                "configuration build for {} panicked",
                self.key
            )));
            self.cache
                .finish(self.key, self.slot, self.generation, &outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    use domain::ItemId;

    fn configuration(key: &str) -> TypeConfiguration {
        TypeConfiguration::new(TypeKey::new(key), ItemId::NULL, ItemId::NULL, vec![], vec![])
    }

    #[test]
    fn test_hit_after_build() {
        let cache = ConfigurationCache::new();
        let key = TypeKey::new("Article");

        let first = cache.get_or_build(&key, || Ok(configuration("Article"))).unwrap();
        let second = cache
            .get_or_build(&key, || panic!("must not rebuild"))
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.builds), (1, 1, 1));
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_concurrent_callers_share_one_build() {
        const CALLERS: usize = 8;
        let cache = ConfigurationCache::new();
        let key = TypeKey::new("Article");
        let built = AtomicUsize::new(0);
        let barrier = Barrier::new(CALLERS);

        let results: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = (0..CALLERS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        cache.get_or_build(&key, || {
                            built.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(50));
                            Ok(configuration("Article"))
                        })
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(built.load(Ordering::SeqCst), 1);
        let first = results[0].as_ref().unwrap();
        for result in &results {
            assert!(Arc::ptr_eq(first, result.as_ref().unwrap()));
        }
        assert_eq!(cache.stats().builds, 1);
    }

    #[test]
    fn test_concurrent_callers_share_one_failure() {
        const CALLERS: usize = 6;
        let cache = ConfigurationCache::new();
        let key = TypeKey::new("Broken");
        let built = AtomicUsize::new(0);
        let barrier = Barrier::new(CALLERS);

        let results: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = (0..CALLERS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        cache.get_or_build(&key, || {
                            built.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(50));
                            Err(MapperError::configuration("Broken", "bad template"))
                        })
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(built.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(
                result.unwrap_err(),
                MapperError::configuration("Broken", "bad template")
            );
        }
        assert!(cache.is_empty());
        assert_eq!(cache.stats().failures, 1);
    }

    #[test]
    fn test_failure_is_retried() {
        let cache = ConfigurationCache::new();
        let key = TypeKey::new("Article");

        assert!(cache
            .get_or_build(&key, || Err(MapperError::internal("flaky")))
            .is_err());
        assert!(cache.get(&key).is_none());

        assert!(cache.get_or_build(&key, || Ok(configuration("Article"))).is_ok());
        assert_eq!(cache.stats().builds, 2);
    }

    #[test]
    fn test_different_keys_build_independently() {
        let cache = ConfigurationCache::new();
        let barrier = Barrier::new(2);

        thread::scope(|s| {
            for name in ["Article", "Person"] {
                let cache = &cache;
                let barrier = &barrier;
                s.spawn(move || {
                    cache
                        .get_or_build(&TypeKey::new(name), || {
                            // Both builds must be in progress at once to pass
                            barrier.wait();
                            Ok(configuration(name))
                        })
                        .unwrap();
                });
            }
        });

        assert_eq!(cache.keys(), vec![TypeKey::new("Article"), TypeKey::new("Person")]);
    }

    #[test]
    fn test_panicking_build_releases_slot() {
        let cache = ConfigurationCache::new();
        let key = TypeKey::new("Article");

        let result = catch_unwind(AssertUnwindSafe(|| {
            cache.get_or_build(&key, || panic!("boom"))
        }));
        assert!(result.is_err());
        assert!(cache.in_flight.lock().is_empty());

        assert!(cache.get_or_build(&key, || Ok(configuration("Article"))).is_ok());
    }

    #[test]
    fn test_invalidate_keeps_handed_out_configurations() {
        let cache = ConfigurationCache::new();
        let key = TypeKey::new("Article");

        let held = cache.get_or_build(&key, || Ok(configuration("Article"))).unwrap();
        assert!(cache.invalidate(&key));
        assert!(!cache.invalidate(&key));
        assert_eq!(held.type_key(), &key);

        let rebuilt = cache.get_or_build(&key, || Ok(configuration("Article"))).unwrap();
        assert!(!Arc::ptr_eq(&held, &rebuilt));
    }

    #[test]
    fn test_build_outdated_by_invalidation_is_not_published() {
        let cache = ConfigurationCache::new();
        let key = TypeKey::new("Article");

        let result = cache.get_or_build(&key, || {
            cache.clear();
            Ok(configuration("Article"))
        });
        assert!(result.is_ok());
        assert!(!cache.contains(&key));
    }

    #[test]
    fn test_invalidating_same_key_during_build_is_not_published() {
        let cache = ConfigurationCache::new();
        let key = TypeKey::new("Article");

        let result = cache.get_or_build(&key, || {
            cache.invalidate(&key);
            Ok(configuration("Article"))
        });
        assert!(result.is_ok());
        assert!(!cache.contains(&key));

        // The next call builds against the new generation and publishes
        cache.get_or_build(&key, || Ok(configuration("Article"))).unwrap();
        assert!(cache.contains(&key));
    }

    #[test]
    fn test_invalidating_other_key_during_build_still_publishes() {
        let cache = ConfigurationCache::new();
        let key = TypeKey::new("Article");
        let other = TypeKey::new("Person");
        cache.get_or_build(&other, || Ok(configuration("Person"))).unwrap();

        cache
            .get_or_build(&key, || {
                cache.invalidate(&other);
                Ok(configuration("Article"))
            })
            .unwrap();

        assert!(cache.contains(&key));
        assert!(!cache.contains(&other));
        assert_eq!(cache.keys(), vec![key]);
    }

    #[test]
    fn test_invalidation_racing_a_build_never_leaves_a_stale_entry() {
        let cache = ConfigurationCache::new();
        let key = TypeKey::new("Article");
        let building = Barrier::new(2);
        let invalidated = Barrier::new(2);

        thread::scope(|s| {
            s.spawn(|| {
                cache
                    .get_or_build(&key, || {
                        building.wait();
                        invalidated.wait();
                        Ok(configuration("Article"))
                    })
                    .unwrap();
            });
            building.wait();
            cache.invalidate(&key);
            invalidated.wait();
        });

        assert!(!cache.contains(&key));
    }
}
