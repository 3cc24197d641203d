//! Shared playback intent record
//!
//! **Why**: The consumer thread (UI, encoder) and the prefetch worker both
//! act on the playhead many times per second. Everything here is a scalar
//! behind an atomic, so neither side ever blocks the other.
//!
//! Write discipline: the consumer owns `requested_frame`, `speed` and the
//! seek flag (raised only); the worker owns the cursor and clears the seek
//! flag. `last_dir` is written by `set_speed` on the consumer side.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, Ordering};

use crate::policy;

/// Atomic record of where playback is and where it is heading.
#[derive(Debug)]
pub struct PlayheadState {
    /// Frame the consumer currently wants (1-based).
    requested_frame: AtomicI64,
    /// Signed playback rate; 0 is paused.
    speed: AtomicI32,
    /// Last non-zero direction, +1 or -1. Preserved across pauses.
    last_dir: AtomicI32,
    /// One-shot: raised by a preroll seek, cleared by the worker.
    user_seek_pending: AtomicBool,
    /// The worker's progress cursor through the caching window.
    last_cached_index: AtomicI64,
    /// Cumulative count of frames the worker has inserted.
    inserted_frames: AtomicI64,
}

impl PlayheadState {
    /// Fresh state at frame 1, paused, assuming forward direction.
    pub fn new() -> Self {
        Self {
            requested_frame: AtomicI64::new(1),
            speed: AtomicI32::new(0),
            last_dir: AtomicI32::new(1),
            user_seek_pending: AtomicBool::new(false),
            last_cached_index: AtomicI64::new(0),
            inserted_frames: AtomicI64::new(0),
        }
    }

    /// Update speed. A non-zero speed also records its sign as the direction
    /// memory; pausing leaves that memory intact so the window does not snap
    /// to the other side of the playhead.
    pub fn set_speed(&self, new_speed: i32) {
        if new_speed != 0 {
            let dir = if new_speed > 0 { 1 } else { -1 };
            self.last_dir.store(dir, Ordering::Relaxed);
        }
        self.speed.store(new_speed, Ordering::Relaxed);
    }

    pub fn speed(&self) -> i32 {
        self.speed.load(Ordering::Relaxed)
    }

    pub fn last_dir(&self) -> i32 {
        self.last_dir.load(Ordering::Relaxed)
    }

    /// Effective direction for this instant (+1 or -1).
    pub fn direction(&self) -> i32 {
        policy::direction(self.speed(), self.last_dir())
    }

    pub fn request_frame(&self, frame: i64) {
        self.requested_frame.store(frame, Ordering::Relaxed);
    }

    pub fn requested_frame(&self) -> i64 {
        self.requested_frame.load(Ordering::Relaxed)
    }

    /// Raise the one-shot seek flag (consumer side).
    pub fn raise_seek(&self) {
        self.user_seek_pending.store(true, Ordering::Relaxed);
    }

    /// Consume the seek flag if raised (worker side).
    pub fn take_seek(&self) -> bool {
        self.user_seek_pending.swap(false, Ordering::Relaxed)
    }

    /// Peek at the seek flag without consuming it.
    pub fn seek_pending(&self) -> bool {
        self.user_seek_pending.load(Ordering::Relaxed)
    }

    pub fn cursor(&self) -> i64 {
        self.last_cached_index.load(Ordering::Relaxed)
    }

    pub fn set_cursor(&self, index: i64) {
        self.last_cached_index.store(index, Ordering::Relaxed);
    }

    /// Place the cursor just behind the playhead so the next pass fills
    /// outward from there.
    pub fn reseat_cursor(&self, playhead: i64, dir: i32) {
        self.set_cursor(playhead - dir as i64);
    }

    pub fn record_insert(&self) {
        self.inserted_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inserted_count(&self) -> i64 {
        self.inserted_frames.load(Ordering::Relaxed)
    }

    /// Preroll predicate: has the worker inserted more than `min_preroll`
    /// frames since start?
    pub fn is_ready(&self, min_preroll: i64) -> bool {
        self.inserted_count() > min_preroll
    }
}

impl Default for PlayheadState {
    fn default() -> Self {
        Self::new()
    }
}
