//! Bounded in-memory frame store with LRU eviction
//!
//! **Why**: Smooth playback needs decoded frames resident in RAM, but a few
//! seconds of 4K RGBA already measures in gigabytes. The store keeps frames
//! under a byte budget and evicts the least-recently-used ones first.
//!
//! **Used by**: PrefetchWorker (insert/touch), consumer (get by index)
//!
//! # Architecture
//!
//! - **LruCache**: O(1) access and eviction via `lru` crate
//! - **Mutex**: all map operations serialized; the worker and the consumer
//!   share the store without further coordination
//! - **AtomicUsize**: lock-free memory usage tracking
//!
//! Entry count is unbounded; eviction is purely byte-driven. The budget can
//! be resized at runtime and is enforced immediately.

use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};

use log::{debug, info};
use lru::LruCache;
use sysinfo::System;

use crate::frame::Frame;

/// Store operations the prefetch worker depends on.
///
/// The worker never assumes exclusive access; implementations serialize
/// worker writes against consumer reads internally.
pub trait FrameStore: Send + Sync {
    /// Is the frame at `index` currently resident? Does not refresh LRU order.
    fn contains(&self, index: i64) -> bool;

    /// Insert a frame under its own index, evicting LRU entries as needed to
    /// respect the byte budget.
    fn insert(&self, frame: Frame);

    /// Refresh the LRU position of `index` without fetching it.
    fn touch(&self, index: i64);

    /// Evict everything.
    fn clear_all(&self);

    /// Current byte budget. May change at runtime.
    fn max_bytes(&self) -> i64;
}

/// Hit/miss counters for consumer lookups.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.hits() + self.misses()
    }

    /// Hit rate in 0.0..=1.0; 0.0 when no lookups happened yet.
    pub fn hit_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

/// LRU frame map bounded by a byte budget.
///
/// A non-positive budget disables eviction (unlimited).
#[derive(Debug)]
pub struct MemoryStore {
    frames: Mutex<LruCache<i64, Frame>>,
    memory_usage: AtomicUsize,
    max_bytes: AtomicI64,
    stats: CacheStats,
}

impl MemoryStore {
    /// Create a store with an explicit byte budget.
    pub fn new(max_bytes: i64) -> Self {
        Self {
            frames: Mutex::new(LruCache::unbounded()),
            memory_usage: AtomicUsize::new(0),
            max_bytes: AtomicI64::new(max_bytes),
            stats: CacheStats::default(),
        }
    }

    /// Create a store sized from currently available system memory.
    ///
    /// `mem_fraction` is the share of available RAM to use (0.0-1.0) after
    /// subtracting `reserve_gb` for the rest of the system.
    pub fn with_system_budget(mem_fraction: f64, reserve_gb: f64) -> Self {
        let mut sys = System::new_all();
        sys.refresh_memory();

        let available = sys.available_memory() as usize;
        let reserve = (reserve_gb * 1024.0 * 1024.0 * 1024.0) as usize;
        let usable = available.saturating_sub(reserve);
        let budget = (usable as f64 * mem_fraction) as i64;

        info!(
            "Store budget: {} MB ({}% of available, {} MB reserved)",
            budget / 1024 / 1024,
            (mem_fraction * 100.0) as u32,
            reserve / 1024 / 1024
        );

        Self::new(budget)
    }

    /// Consumer lookup. Returns a cheap clone and refreshes LRU order.
    pub fn get(&self, index: i64) -> Option<Frame> {
        let mut frames = self.frames.lock().unwrap();
        let result = frames.get(&index).cloned();
        if result.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        result
    }

    /// Number of resident frames.
    pub fn len(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().unwrap().is_empty()
    }

    /// Current (usage, budget) in bytes.
    pub fn mem(&self) -> (usize, i64) {
        (
            self.memory_usage.load(Ordering::Relaxed),
            self.max_bytes.load(Ordering::Relaxed),
        )
    }

    /// Resize the budget and enforce it immediately.
    pub fn set_max_bytes(&self, max_bytes: i64) {
        self.max_bytes.store(max_bytes, Ordering::Relaxed);
        let mut frames = self.frames.lock().unwrap();
        self.make_room(&mut frames, 0);
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Evict LRU entries until `incoming` more bytes fit under the budget.
    /// Caller holds the map lock.
    fn make_room(&self, frames: &mut LruCache<i64, Frame>, incoming: usize) {
        let budget = self.max_bytes.load(Ordering::Relaxed);
        if budget <= 0 {
            return;
        }
        let budget = budget as usize;

        while self.memory_usage.load(Ordering::Relaxed) + incoming > budget {
            match frames.pop_lru() {
                Some((index, evicted)) => {
                    let size = evicted.mem();
                    self.free_memory(size);
                    debug!("Evicted frame {} ({} bytes)", index, size);
                }
                None => break,
            }
        }
    }

    /// Saturating usage decrement.
    fn free_memory(&self, bytes: usize) {
        loop {
            let current = self.memory_usage.load(Ordering::Relaxed);
            let next = current.saturating_sub(bytes);
            if self
                .memory_usage
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        // 75% of available RAM with 2 GB reserved, as a reasonable default
        // for a playback session that owns the machine.
        Self::with_system_budget(0.75, 2.0)
    }
}

impl FrameStore for MemoryStore {
    fn contains(&self, index: i64) -> bool {
        self.frames.lock().unwrap().peek(&index).is_some()
    }

    fn insert(&self, frame: Frame) {
        let index = frame.index();
        let size = frame.mem();
        let mut frames = self.frames.lock().unwrap();

        // Replacing an existing entry must release its bytes first,
        // otherwise usage drifts upward on every overwrite.
        if let Some(old) = frames.pop(&index) {
            self.free_memory(old.mem());
        }

        self.make_room(&mut frames, size);
        frames.put(index, frame);
        self.memory_usage.fetch_add(size, Ordering::Relaxed);

        debug!("Cached frame {} ({} bytes)", index, size);
    }

    fn touch(&self, index: i64) {
        // get() refreshes recency; the value itself is not needed.
        let _ = self.frames.lock().unwrap().get(&index);
    }

    fn clear_all(&self) {
        let mut frames = self.frames.lock().unwrap();
        frames.clear();
        self.memory_usage.store(0, Ordering::Relaxed);
        debug!("Cleared entire store");
    }

    fn max_bytes(&self) -> i64 {
        self.max_bytes.load(Ordering::Relaxed)
    }
}
