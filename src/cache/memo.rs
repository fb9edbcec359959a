use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::{
    cache::disk::DiskStore,
    cache::key::{CacheKey, Fingerprint},
    cache::CacheValue,
    foundation::error::AnimResult,
};

type Slot<V> = Arc<Mutex<Option<V>>>;

/// Keyed single-flight memoization for one kind of value.
///
/// Each key owns a slot guarded by its own mutex: the first caller computes while holding
/// it, concurrent callers for the same key block on it and reuse the result. Distinct keys
/// never contend beyond the short map lookup. Failed computations leave the slot empty.
pub struct MemoCache<V> {
    name: &'static str,
    slots: Mutex<HashMap<CacheKey, Slot<V>>>,
    disk: Option<Arc<DiskStore>>,
    retain: bool,
    computes: AtomicU64,
    hits: AtomicU64,
}

impl<V> std::fmt::Debug for MemoCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoCache")
            .field("name", &self.name)
            .field("entries", &lock(&self.slots).len())
            .field("disk", &self.disk.is_some())
            .field("retain", &self.retain)
            .finish()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // Poisoned locks stay usable; slots only ever hold complete values.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<V: Clone> MemoCache<V> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: Mutex::new(HashMap::new()),
            disk: None,
            retain: true,
            computes: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    pub fn with_disk(mut self, disk: Arc<DiskStore>) -> Self {
        self.disk = Some(disk);
        self
    }

    /// Keep only the single-flight guarantee, not the values. Used for large values that
    /// are persisted or consumed once.
    pub fn without_retention(mut self) -> Self {
        self.retain = false;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of in-memory misses. A miss served from the disk store still counts.
    pub fn compute_count(&self) -> u64 {
        self.computes.load(Ordering::Relaxed)
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    fn slot(&self, key: &CacheKey) -> Slot<V> {
        lock(&self.slots)
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Return the cached value for `key`, computing it at most once per run.
    pub fn get_or_compute<F>(&self, key: &CacheKey, compute: F) -> AnimResult<V>
    where
        F: FnOnce() -> AnimResult<V>,
    {
        let slot = self.slot(key);
        let mut guard = lock(&slot);
        if let Some(v) = guard.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(v.clone());
        }
        self.computes.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(cache = self.name, %key, "compute");
        let v = compute()?;
        if self.retain {
            *guard = Some(v.clone());
        }
        Ok(v)
    }

    /// Drop every in-memory entry. Persisted entries are cleared through
    /// [`RunCache::clear`](crate::cache::RunCache::clear).
    pub fn clear(&self) {
        lock(&self.slots).clear();
    }
}

impl<V: CacheValue + Clone> MemoCache<V> {
    /// Like [`get_or_compute`](Self::get_or_compute), but consults the attached disk store
    /// before computing and persists fresh results. Entries whose inputs fingerprint or
    /// payload digest do not match are discarded and recomputed.
    pub fn get_or_compute_persisted<F>(
        &self,
        key: &CacheKey,
        inputs: Fingerprint,
        compute: F,
    ) -> AnimResult<V>
    where
        F: FnOnce() -> AnimResult<V>,
    {
        let Some(disk) = self.disk.clone() else {
            return self.get_or_compute(key, compute);
        };
        self.get_or_compute(key, || {
            match disk.load(key, inputs) {
                Ok(Some(bytes)) => match V::decode(&bytes) {
                    Ok(v) => {
                        tracing::debug!(cache = self.name, %key, "disk hit");
                        return Ok(v);
                    }
                    Err(err) => {
                        tracing::warn!(cache = self.name, %key, error = %err, "discarding undecodable entry");
                        disk.remove(key);
                    }
                },
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(cache = self.name, %key, error = %err, "discarding cache entry");
                    disk.remove(key);
                }
            }
            let v = compute()?;
            match v.encode() {
                Ok(bytes) => {
                    if let Err(err) = disk.store(key, inputs, &bytes) {
                        tracing::warn!(cache = self.name, %key, error = %err, "failed to persist entry");
                    }
                }
                Err(err) => {
                    tracing::warn!(cache = self.name, %key, error = %err, "failed to encode entry");
                }
            }
            Ok(v)
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/memo.rs"]
mod tests;
