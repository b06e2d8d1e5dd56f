//! Per-hash reference counting for the content-addressed store.
//!
//! Entries live in a fixed array of lock shards indexed by `hash mod N`, so
//! memory stays bounded no matter how many hashes pass through. Every
//! operation holds the owning shard's lock for its whole read-modify-write,
//! which makes operations on the same hash linearizable. The GC signal fires
//! exactly once per 1→0 transition, synchronously inside the critical
//! section; callbacks must not re-enter the store for the same hash.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

const SHARD_COUNT: usize = 64;

/// Refcount and size for one content hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefCountEntry {
    pub ref_count: u64,
    pub size: u64,
}

/// Result of a batch decrement: per-hash final counts plus the hashes whose
/// count reached zero during this batch.
#[derive(Debug, Default)]
pub struct BatchDecrementResult {
    pub results: HashMap<String, u64>,
    pub hashes_reached_zero: Vec<String>,
}

/// Point-in-time operation counters.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefCountMetrics {
    pub increments: u64,
    pub decrements: u64,
    pub cas_ops: u64,
    pub cas_failures: u64,
    pub contended_acquires: u64,
    pub lock_wait_ms: u64,
    pub gc_signals: u64,
    pub batch_ops: u64,
}

#[derive(Default)]
struct Counters {
    increments: AtomicU64,
    decrements: AtomicU64,
    cas_ops: AtomicU64,
    cas_failures: AtomicU64,
    contended_acquires: AtomicU64,
    lock_wait_ms: AtomicU64,
    gc_signals: AtomicU64,
    batch_ops: AtomicU64,
}

pub struct RefCountStore {
    shards: Vec<Mutex<HashMap<String, RefCountEntry>>>,
    counters: Counters,
}

impl Default for RefCountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RefCountStore {
    pub fn new() -> Self {
        let shards = (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect();
        RefCountStore { shards, counters: Counters::default() }
    }

    fn shard_index(hash: &str) -> usize {
        // FNV-1a keeps the shard spread uniform for hex inputs.
        let mut h: u64 = 0xcbf29ce484222325;
        for b in hash.bytes() {
            h ^= u64::from(b);
            h = h.wrapping_mul(0x100000001b3);
        }
        (h % SHARD_COUNT as u64) as usize
    }

    /// Acquire the shard lock for `hash`, recording contention when the
    /// acquisition had to wait.
    fn lock(&self, hash: &str) -> MutexGuard<'_, HashMap<String, RefCountEntry>> {
        let shard = &self.shards[Self::shard_index(hash)];
        match shard.try_lock() {
            Ok(guard) => guard,
            Err(std::sync::TryLockError::WouldBlock) => {
                self.counters.contended_acquires.fetch_add(1, Ordering::Relaxed);
                let start = Instant::now();
                let guard = shard.lock().unwrap_or_else(|p| p.into_inner());
                self.counters
                    .lock_wait_ms
                    .fetch_add(start.elapsed().as_millis() as u64, Ordering::Relaxed);
                guard
            }
            Err(std::sync::TryLockError::Poisoned(p)) => p.into_inner(),
        }
    }

    /// Current refcount; 0 when the hash is unknown.
    pub fn get(&self, hash: &str) -> u64 {
        self.lock(hash).get(hash).map_or(0, |e| e.ref_count)
    }

    /// Force the refcount. A count of 0 deletes the entry.
    pub fn set(&self, hash: &str, count: u64) {
        let mut shard = self.lock(hash);
        if count == 0 {
            shard.remove(hash);
        } else {
            shard
                .entry(hash.to_string())
                .and_modify(|e| e.ref_count = count)
                .or_insert(RefCountEntry { ref_count: count, size: 0 });
        }
    }

    /// Increment and return the new count. Creates the entry on first use.
    pub fn increment(&self, hash: &str) -> u64 {
        self.counters.increments.fetch_add(1, Ordering::Relaxed);
        let mut shard = self.lock(hash);
        let entry = shard
            .entry(hash.to_string())
            .or_insert(RefCountEntry { ref_count: 0, size: 0 });
        entry.ref_count += 1;
        entry.ref_count
    }

    /// Decrement, saturating at 0; the entry is removed once the count hits 0.
    pub fn decrement(&self, hash: &str) -> u64 {
        self.decrement_inner(hash, |_| {})
    }

    /// Decrement; `on_gc` runs iff this call is the one that took the count
    /// from 1 to 0. The callback executes inside the hash's critical section
    /// and must not acquire the same hash's lock.
    pub fn decrement_with_gc(&self, hash: &str, on_gc: impl FnOnce(&str)) -> u64 {
        self.decrement_inner(hash, on_gc)
    }

    fn decrement_inner(&self, hash: &str, on_gc: impl FnOnce(&str)) -> u64 {
        self.counters.decrements.fetch_add(1, Ordering::Relaxed);
        let mut shard = self.lock(hash);
        let Some(entry) = shard.get_mut(hash) else {
            return 0;
        };
        if entry.ref_count == 0 {
            return 0;
        }
        entry.ref_count -= 1;
        if entry.ref_count == 0 {
            shard.remove(hash);
            self.counters.gc_signals.fetch_add(1, Ordering::Relaxed);
            on_gc(hash);
            return 0;
        }
        entry.ref_count
    }

    /// Compare-and-swap the refcount. `expected == 0` treats an absent entry
    /// as matching; `new == 0` deletes. Returns whether the swap applied.
    pub fn cas(&self, hash: &str, expected: u64, new: u64) -> bool {
        self.counters.cas_ops.fetch_add(1, Ordering::Relaxed);
        let mut shard = self.lock(hash);
        let current = shard.get(hash).map_or(0, |e| e.ref_count);
        if current != expected {
            self.counters.cas_failures.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        if new == 0 {
            shard.remove(hash);
        } else {
            shard
                .entry(hash.to_string())
                .and_modify(|e| e.ref_count = new)
                .or_insert(RefCountEntry { ref_count: new, size: 0 });
        }
        true
    }

    /// Increment each hash; duplicates apply once per occurrence. Returns the
    /// final count observed for each distinct hash.
    pub fn batch_increment(&self, hashes: &[String]) -> HashMap<String, u64> {
        self.counters.batch_ops.fetch_add(1, Ordering::Relaxed);
        let mut results = HashMap::new();
        for hash in hashes {
            let count = self.increment(hash);
            results.insert(hash.clone(), count);
        }
        results
    }

    /// Decrement each hash; duplicates apply once per occurrence. `on_gc`
    /// fires per 1→0 transition, as in [`Self::decrement_with_gc`].
    pub fn batch_decrement(
        &self,
        hashes: &[String],
        mut on_gc: Option<&mut dyn FnMut(&str)>,
    ) -> BatchDecrementResult {
        self.counters.batch_ops.fetch_add(1, Ordering::Relaxed);
        let mut out = BatchDecrementResult::default();
        for hash in hashes {
            let mut reached_zero = false;
            let count = self.decrement_inner(hash, |h| {
                reached_zero = true;
                if let Some(cb) = on_gc.as_mut() {
                    cb(h);
                }
            });
            if reached_zero {
                out.hashes_reached_zero.push(hash.clone());
            }
            out.results.insert(hash.clone(), count);
        }
        out
    }

    /// Record the blob size for a hash. Creates a zero-count entry when the
    /// hash is not yet referenced so the size survives until first increment.
    pub fn set_size(&self, hash: &str, size: u64) {
        let mut shard = self.lock(hash);
        shard
            .entry(hash.to_string())
            .and_modify(|e| e.size = size)
            .or_insert(RefCountEntry { ref_count: 0, size });
    }

    pub fn get_size(&self, hash: &str) -> u64 {
        self.lock(hash).get(hash).map_or(0, |e| e.size)
    }

    /// Point-in-time copy of every entry, consistent per hash.
    pub fn snapshot(&self) -> HashMap<String, RefCountEntry> {
        let mut out = HashMap::new();
        for shard in &self.shards {
            let guard = shard.lock().unwrap_or_else(|p| p.into_inner());
            for (hash, entry) in guard.iter() {
                out.insert(hash.clone(), *entry);
            }
        }
        out
    }

    /// Bytes saved by deduplication: `Σ size(h) · (refCount(h) − 1)`.
    pub fn deduplicated_bytes(&self) -> u64 {
        self.snapshot()
            .values()
            .map(|e| e.size * e.ref_count.saturating_sub(1))
            .sum()
    }

    pub fn metrics(&self) -> RefCountMetrics {
        RefCountMetrics {
            increments: self.counters.increments.load(Ordering::Relaxed),
            decrements: self.counters.decrements.load(Ordering::Relaxed),
            cas_ops: self.counters.cas_ops.load(Ordering::Relaxed),
            cas_failures: self.counters.cas_failures.load(Ordering::Relaxed),
            contended_acquires: self.counters.contended_acquires.load(Ordering::Relaxed),
            lock_wait_ms: self.counters.lock_wait_ms.load(Ordering::Relaxed),
            gc_signals: self.counters.gc_signals.load(Ordering::Relaxed),
            batch_ops: self.counters.batch_ops.load(Ordering::Relaxed),
        }
    }
}
