//! Background prefetch worker keeping a directional frame window resident
//!
//! **Why**: The render thread must never block on decode. One worker per
//! playback session follows the playhead and keeps a window of decoded
//! frames in the store, ahead of the playhead in the direction of travel.
//!
//! **Used by**: playback controller (seek/speed), render thread (`is_ready`)
//!
//! # Loop shape
//!
//! Each tick snapshots the tunables and playhead, derives the caching window
//! from the store's byte budget, and walks the window cursor inserting
//! missing frames. A pending seek pre-empts the walk between frames, so a
//! jump is honored within at most one frame's decode time. While paused the
//! worker keeps the playhead entry hot and re-fills the window if eviction
//! or an external clear removed it.
//!
//! # Concurrency
//!
//! The worker is a single thread; shared state lives in `PlayheadState`
//! atomics and the store's own locks. No lock is held across a decode call.
//! Shutdown is cooperative: the exit flag is polled between ticks and
//! between every per-frame step.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use crate::playhead::PlayheadState;
use crate::policy;
use crate::settings::{CacheSettings, SettingsSnapshot};
use crate::source::{FrameSource, SourceError};
use crate::store::FrameStore;

/// Sleep while idle (caching disabled, no source, degenerate capacity).
const IDLE_POLL: Duration = Duration::from_millis(50);
/// Poll interval while waiting for the thread to stop.
const STOP_POLL: Duration = Duration::from_millis(5);

/// State shared between the worker thread and the consumer handle.
struct Shared {
    playhead: PlayheadState,
    settings: Arc<CacheSettings>,
    source: RwLock<Option<Arc<dyn FrameSource>>>,
    should_exit: AtomicBool,
    running: AtomicBool,
}

impl Shared {
    fn should_exit(&self) -> bool {
        self.should_exit.load(Ordering::Relaxed)
    }

    fn current_source(&self) -> Option<Arc<dyn FrameSource>> {
        self.source.read().unwrap().clone()
    }

    fn run(&self) {
        info!("Prefetch worker started");

        while !self.should_exit() {
            let snapshot = self.settings.snapshot();
            let Some(source) = self.current_source() else {
                thread::sleep(IDLE_POLL);
                continue;
            };
            if !snapshot.enable_caching {
                thread::sleep(IDLE_POLL);
                continue;
            }

            self.tick(&snapshot, source.as_ref());
        }

        info!("Prefetch worker stopped");
    }

    /// One pass of the caching state machine.
    fn tick(&self, snapshot: &SettingsSnapshot, source: &dyn FrameSource) {
        let store = source.store();
        let meta = source.meta();
        let timeline_end = source.max_frame();

        let playhead = self.playhead.requested_frame();
        let paused = self.playhead.speed() == 0;
        let dir = self.playhead.direction();

        let bytes_per_frame = policy::bytes_per_frame(
            meta.effective_width(),
            meta.effective_height(),
            meta.sample_rate,
            meta.channels,
            meta.fps,
        );
        let capacity = policy::capacity(
            store.max_bytes(),
            bytes_per_frame,
            snapshot.max_frames_hard_cap,
        );
        if capacity < 1 {
            trace!(
                "Degenerate capacity (budget {} bytes, {} bytes/frame), retrying",
                store.max_bytes(),
                bytes_per_frame
            );
            thread::sleep(IDLE_POLL);
            return;
        }

        let ahead = policy::ahead_count(capacity, snapshot.percent_ahead);

        if self.playhead.take_seek() {
            debug!("Seek to frame {}, reseating cursor", playhead);
            self.playhead.reseat_cursor(playhead, dir);
        } else if !paused {
            // During playback the cursor can fall outside the window when
            // the playhead outruns it or external clears reset the store.
            let (begin, end) = policy::window(playhead, dir, ahead, timeline_end);
            let cursor = self.playhead.cursor();
            let drifted = (dir > 0 && cursor > end) || (dir < 0 && cursor < begin);
            if drifted {
                trace!(
                    "Cursor {} drifted outside window [{}, {}], reseating",
                    cursor, begin, end
                );
                self.playhead.reseat_cursor(playhead, dir);
            }
        }

        if self.clear_if_paused(playhead, paused, store.as_ref()) {
            self.playhead.reseat_cursor(playhead, dir);
        }

        let (begin, end) = policy::window(playhead, dir, ahead, timeline_end);
        let window_full = self.prefetch_window(store.as_ref(), begin, end, dir, source);

        // A paused playhead must survive LRU pressure from other users of
        // the store.
        if paused && window_full {
            store.touch(playhead);
        }

        thread::sleep(quarter_frame_period(meta.fps));
    }

    /// While paused, a playhead that fell out of the store means the cached
    /// window is useless; drop everything and refill around the playhead.
    fn clear_if_paused(&self, playhead: i64, paused: bool, store: &dyn FrameStore) -> bool {
        if paused && !store.contains(playhead) {
            debug!("Paused at uncached frame {}, clearing store", playhead);
            store.clear_all();
            return true;
        }
        false
    }

    /// Walk the cursor from `last_cached_index + dir` to the window edge,
    /// inserting missing frames and touching present ones.
    ///
    /// Returns true when the window was already full (nothing inserted).
    /// Breaks early on shutdown, a pending seek, or the timeline edge.
    fn prefetch_window(
        &self,
        store: &dyn FrameStore,
        begin: i64,
        end: i64,
        dir: i32,
        source: &dyn FrameSource,
    ) -> bool {
        let step = dir as i64;
        let mut window_full = true;
        let mut cursor = self.playhead.cursor() + step;

        while (dir > 0 && cursor <= end) || (dir < 0 && cursor >= begin) {
            if self.should_exit() {
                break;
            }
            // Surrender to the seeker; the next tick re-derives the window.
            if self.playhead.seek_pending() {
                break;
            }

            if !store.contains(cursor) {
                match source.get_frame(cursor) {
                    Ok(frame) => {
                        store.insert(frame);
                        self.playhead.record_insert();
                        window_full = false;
                    }
                    Err(SourceError::OutOfBounds(_)) => break,
                    Err(err) => {
                        // Keep playback alive; the gap surfaces as a cache
                        // miss on the consumer's own fetch path.
                        warn!("Frame {} fetch failed: {}", cursor, err);
                        break;
                    }
                }
            } else {
                store.touch(cursor);
            }

            self.playhead.set_cursor(cursor);
            cursor += step;
        }

        window_full
    }
}

/// Sleep between ticks: a quarter of one frame's duration.
fn quarter_frame_period(fps: f64) -> Duration {
    if fps > 0.0 {
        Duration::from_micros((1_000_000.0 / fps / 4.0) as u64)
    } else {
        IDLE_POLL
    }
}

/// Consumer handle for the prefetch loop. One per playback session.
pub struct PrefetchWorker {
    shared: Arc<Shared>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl PrefetchWorker {
    pub fn new(settings: Arc<CacheSettings>) -> Self {
        Self {
            shared: Arc::new(Shared {
                playhead: PlayheadState::new(),
                settings,
                source: RwLock::new(None),
                should_exit: AtomicBool::new(false),
                running: AtomicBool::new(false),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Bind a frame source. May be called before or after `start`; the
    /// worker picks it up on its next tick.
    pub fn attach_source(&self, source: Arc<dyn FrameSource>) {
        *self.shared.source.write().unwrap() = Some(source);
    }

    /// Spawn the background loop. Returns whether it is running.
    pub fn start(&self) -> bool {
        let mut handle = self.handle.lock().unwrap();
        if self.shared.running.load(Ordering::Relaxed) {
            return true;
        }

        self.shared.should_exit.store(false, Ordering::Relaxed);
        self.shared.running.store(true, Ordering::Relaxed);

        let shared = Arc::clone(&self.shared);
        match thread::Builder::new()
            .name("prefetch-cache".into())
            .spawn(move || {
                shared.run();
                shared.running.store(false, Ordering::Relaxed);
            }) {
            Ok(joiner) => {
                *handle = Some(joiner);
                true
            }
            Err(err) => {
                warn!("Failed to spawn prefetch thread: {}", err);
                self.shared.running.store(false, Ordering::Relaxed);
                false
            }
        }
    }

    /// Request exit and wait up to `timeout`. Returns whether the worker
    /// actually stopped; on timeout the handle is abandoned.
    pub fn stop(&self, timeout: Duration) -> bool {
        self.shared.should_exit.store(true, Ordering::Relaxed);

        let deadline = Instant::now() + timeout;
        while self.shared.running.load(Ordering::Relaxed) {
            if Instant::now() >= deadline {
                warn!("Prefetch worker did not stop within {:?}", timeout);
                let _ = self.handle.lock().unwrap().take();
                return false;
            }
            thread::sleep(STOP_POLL);
        }

        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        true
    }

    /// Move the playhead without disturbing the cached window.
    pub fn seek(&self, frame: i64) {
        self.shared.playhead.request_frame(frame);
    }

    /// Move the playhead and start a preroll: the seek flag pre-empts any
    /// in-flight window fill, and a jump to an uncached frame drops the
    /// whole store so the refill starts clean.
    pub fn seek_with_preroll(&self, frame: i64) {
        self.shared.playhead.raise_seek();

        if let Some(source) = self.shared.current_source() {
            let store = source.store();
            if !store.contains(frame) {
                debug!("Preroll seek to uncached frame {}, clearing store", frame);
                store.clear_all();
            }
        }

        self.shared.playhead.request_frame(frame);
    }

    pub fn set_speed(&self, speed: i32) {
        self.shared.playhead.set_speed(speed);
    }

    pub fn speed(&self) -> i32 {
        self.shared.playhead.speed()
    }

    /// Has the initial fill inserted enough frames for playback to begin?
    pub fn is_ready(&self) -> bool {
        self.shared
            .playhead
            .is_ready(self.shared.settings.min_preroll_frames())
    }

    /// Shared playhead record, for inspection.
    pub fn playhead(&self) -> &PlayheadState {
        &self.shared.playhead
    }
}

impl Drop for PrefetchWorker {
    fn drop(&mut self) {
        debug!("Prefetch worker handle dropped, signalling exit");
        self.shared.should_exit.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::source::FrameMeta;
    use crate::store::MemoryStore;

    /// Synthetic source: 50x50 RGBA frames (10 kB each), no audio, 100 fps
    /// so tick sleeps stay short.
    struct StubSource {
        store: Arc<MemoryStore>,
        max_frame: i64,
        fail_at: Option<i64>,
    }

    impl StubSource {
        fn new(max_frame: i64, max_bytes: i64) -> Self {
            Self {
                store: Arc::new(MemoryStore::new(max_bytes)),
                max_frame,
                fail_at: None,
            }
        }
    }

    impl FrameSource for StubSource {
        fn get_frame(&self, index: i64) -> Result<Frame, SourceError> {
            if index < 1 || index > self.max_frame {
                return Err(SourceError::OutOfBounds(index));
            }
            if self.fail_at == Some(index) {
                return Err(SourceError::Failed("decoder stall".into()));
            }
            Ok(Frame::blank(index, 50, 50, 0))
        }

        fn max_frame(&self) -> i64 {
            self.max_frame
        }

        fn meta(&self) -> FrameMeta {
            FrameMeta {
                width: 50,
                height: 50,
                preview_width: 0,
                preview_height: 0,
                sample_rate: 0,
                channels: 0,
                fps: 100.0,
            }
        }

        fn store(&self) -> Arc<dyn FrameStore> {
            Arc::clone(&self.store) as Arc<dyn FrameStore>
        }
    }

    fn make_shared() -> Arc<Shared> {
        Arc::new(Shared {
            playhead: PlayheadState::new(),
            settings: Arc::new(CacheSettings::new()),
            source: RwLock::new(None),
            should_exit: AtomicBool::new(false),
            running: AtomicBool::new(false),
        })
    }

    /// Store wrapper that raises the seek flag right after a chosen frame
    /// lands, simulating a user jump mid-fill.
    struct InterruptingStore {
        inner: Arc<MemoryStore>,
        shared: Arc<Shared>,
        interrupt_at: i64,
    }

    impl FrameStore for InterruptingStore {
        fn contains(&self, index: i64) -> bool {
            self.inner.contains(index)
        }

        fn insert(&self, frame: Frame) {
            let index = frame.index();
            self.inner.insert(frame);
            if index == self.interrupt_at {
                self.shared.playhead.raise_seek();
            }
        }

        fn touch(&self, index: i64) {
            self.inner.touch(index);
        }

        fn clear_all(&self) {
            self.inner.clear_all();
        }

        fn max_bytes(&self) -> i64 {
            self.inner.max_bytes()
        }
    }

    #[test]
    fn test_prefetch_window_forward_fill() {
        let shared = make_shared();
        let source = StubSource::new(50, 100_000_000);
        let store = source.store();

        shared.playhead.set_cursor(9);
        let full = shared.prefetch_window(store.as_ref(), 10, 20, 1, &source);

        assert!(!full);
        assert_eq!(shared.playhead.cursor(), 20);
        for f in 10..=20 {
            assert!(store.contains(f), "frame {} missing", f);
        }

        // Second pass over a full window: nothing inserted, cursor parked.
        let full = shared.prefetch_window(store.as_ref(), 10, 20, 1, &source);
        assert!(full);
        assert_eq!(shared.playhead.cursor(), 20);
    }

    #[test]
    fn test_prefetch_window_backward_fill() {
        let shared = make_shared();
        let source = StubSource::new(100, 100_000_000);
        let store = source.store();

        shared.playhead.set_cursor(16);
        let full = shared.prefetch_window(store.as_ref(), 10, 15, -1, &source);

        assert!(!full);
        assert_eq!(shared.playhead.cursor(), 10);
        for f in 10..=15 {
            assert!(store.contains(f), "frame {} missing", f);
        }

        let full = shared.prefetch_window(store.as_ref(), 10, 15, -1, &source);
        assert!(full);
        assert_eq!(shared.playhead.cursor(), 10);
    }

    #[test]
    fn test_prefetch_window_backward_clamped_at_start() {
        let shared = make_shared();
        let source = StubSource::new(100, 100_000_000);
        let store = source.store();

        // Playhead 3, ahead 10: window clamps to [1, 3].
        let (begin, end) = policy::window(3, -1, 10, 100);
        assert_eq!((begin, end), (1, 3));

        shared.playhead.set_cursor(4);
        shared.prefetch_window(store.as_ref(), begin, end, -1, &source);

        assert_eq!(shared.playhead.cursor(), 1);
        for f in 1..=3 {
            assert!(store.contains(f), "frame {} missing", f);
        }
    }

    #[test]
    fn test_prefetch_window_stops_at_timeline_edge() {
        let shared = make_shared();
        let source = StubSource::new(50, 100_000_000);
        let store = source.store();

        // Window deliberately reaches past the timeline; the source's
        // out-of-bounds reply ends the fill without touching the cursor
        // past the last good frame.
        shared.playhead.set_cursor(47);
        let full = shared.prefetch_window(store.as_ref(), 48, 55, 1, &source);

        assert!(!full);
        assert_eq!(shared.playhead.cursor(), 50);
        assert!(store.contains(50));
        assert!(!store.contains(51));
    }

    #[test]
    fn test_prefetch_window_seek_preemption() {
        let shared = make_shared();
        let source = StubSource::new(100, 100_000_000);

        let interrupting = InterruptingStore {
            inner: Arc::new(MemoryStore::new(100_000_000)),
            shared: Arc::clone(&shared),
            interrupt_at: 23,
        };

        shared.playhead.set_cursor(19);
        let full = shared.prefetch_window(&interrupting, 20, 30, 1, &source);

        // Stops right after 23 lands; 24 is never requested.
        assert!(!full);
        assert_eq!(shared.playhead.cursor(), 23);
        assert!(interrupting.contains(23));
        assert!(!interrupting.contains(24));
    }

    #[test]
    fn test_prefetch_window_source_failure_ends_fill() {
        let shared = make_shared();
        let mut source = StubSource::new(50, 100_000_000);
        source.fail_at = Some(13);
        let store = source.store();

        shared.playhead.set_cursor(9);
        let full = shared.prefetch_window(store.as_ref(), 10, 15, 1, &source);

        assert!(!full);
        assert_eq!(shared.playhead.cursor(), 12);
        assert!(store.contains(12));
        assert!(!store.contains(13));
    }

    #[test]
    fn test_clear_if_paused_missing_playhead() {
        let shared = make_shared();
        let store = MemoryStore::new(100_000_000);
        store.insert(Frame::blank(5, 50, 50, 0));
        store.insert(Frame::blank(10, 50, 50, 0));

        let did_clear = shared.clear_if_paused(42, true, &store);
        assert!(did_clear);
        assert!(store.is_empty());

        shared.playhead.reseat_cursor(42, 1);
        assert_eq!(shared.playhead.cursor(), 41);
    }

    #[test]
    fn test_clear_if_paused_present_playhead() {
        let shared = make_shared();
        let store = MemoryStore::new(100_000_000);
        store.insert(Frame::blank(5, 50, 50, 0));

        let did_clear = shared.clear_if_paused(5, true, &store);
        assert!(!did_clear);
        assert!(store.contains(5));
    }

    #[test]
    fn test_clear_if_paused_not_paused() {
        let shared = make_shared();
        let store = MemoryStore::new(100_000_000);
        store.insert(Frame::blank(5, 50, 50, 0));

        let did_clear = shared.clear_if_paused(99, false, &store);
        assert!(!did_clear);
        assert!(store.contains(5));
    }

    #[test]
    fn test_tick_fills_forward_window() {
        let shared = make_shared();
        let source = StubSource::new(50, 100_000_000);
        let store = source.store();
        let snapshot = shared.settings.snapshot();

        // capacity = min(budget / 10kB, 30) = 30, ahead = 21
        shared.playhead.request_frame(10);
        shared.playhead.set_speed(1);
        shared.playhead.set_cursor(9);

        shared.tick(&snapshot, &source);

        assert_eq!(shared.playhead.cursor(), 31);
        for f in 10..=31 {
            assert!(store.contains(f), "frame {} missing", f);
        }
        assert!(!store.contains(32));
    }

    #[test]
    fn test_tick_reseats_drifted_cursor() {
        let shared = make_shared();
        let source = StubSource::new(50, 100_000_000);
        let store = source.store();
        let snapshot = shared.settings.snapshot();

        shared.playhead.request_frame(10);
        shared.playhead.set_speed(1);
        // Cursor far beyond the [10, 31] window.
        shared.playhead.set_cursor(45);

        shared.tick(&snapshot, &source);

        assert_eq!(shared.playhead.cursor(), 31);
        assert!(store.contains(10));
    }

    #[test]
    fn test_tick_handles_pending_seek() {
        let shared = make_shared();
        let source = StubSource::new(100, 100_000_000);
        let store = source.store();
        let snapshot = shared.settings.snapshot();

        shared.playhead.request_frame(60);
        shared.playhead.set_speed(1);
        shared.playhead.set_cursor(5);
        shared.playhead.raise_seek();

        shared.tick(&snapshot, &source);

        assert!(!shared.playhead.seek_pending());
        assert_eq!(shared.playhead.cursor(), 81);
        assert!(store.contains(60));
        assert!(!store.contains(6));
    }

    #[test]
    fn test_tick_paused_clears_and_refills() {
        let shared = make_shared();
        let source = StubSource::new(50, 100_000_000);
        let store = source.store();
        let snapshot = shared.settings.snapshot();

        store.insert(Frame::blank(5, 50, 50, 0));
        shared.playhead.request_frame(42);
        // speed stays 0: paused, direction defaults forward

        shared.tick(&snapshot, &source);

        assert!(!store.contains(5));
        for f in 42..=50 {
            assert!(store.contains(f), "frame {} missing", f);
        }

        // Second tick: window already full, cursor parked at the edge.
        let cursor_before = shared.playhead.cursor();
        shared.tick(&snapshot, &source);
        assert_eq!(shared.playhead.cursor(), cursor_before);
        assert!(store.contains(42));
    }

    #[test]
    fn test_tick_degenerate_capacity_is_a_no_op() {
        let shared = make_shared();
        let source = StubSource::new(50, 0);
        let store = source.store();
        let snapshot = shared.settings.snapshot();

        shared.playhead.request_frame(10);
        shared.playhead.set_speed(1);
        shared.playhead.set_cursor(9);

        shared.tick(&snapshot, &source);

        assert_eq!(shared.playhead.cursor(), 9);
        assert!(!store.contains(10));
    }

    #[test]
    fn test_seek_with_preroll_clears_when_uncached() {
        let settings = Arc::new(CacheSettings::new());
        let worker = PrefetchWorker::new(settings);
        let source = Arc::new(StubSource::new(50, 100_000_000));
        let store = Arc::clone(&source.store);
        worker.attach_source(source);

        store.insert(Frame::blank(5, 50, 50, 0));
        worker.seek_with_preroll(42);

        assert!(store.is_empty());
        assert!(worker.playhead().seek_pending());
        assert_eq!(worker.playhead().requested_frame(), 42);
    }

    #[test]
    fn test_seek_with_preroll_keeps_cached_target() {
        let settings = Arc::new(CacheSettings::new());
        let worker = PrefetchWorker::new(settings);
        let source = Arc::new(StubSource::new(50, 100_000_000));
        let store = source.store();
        worker.attach_source(source);

        store.insert(Frame::blank(7, 50, 50, 0));
        worker.seek_with_preroll(7);

        assert!(store.contains(7));
        assert!(worker.playhead().seek_pending());
    }

    #[test]
    fn test_plain_seek_has_no_side_effects() {
        let settings = Arc::new(CacheSettings::new());
        let worker = PrefetchWorker::new(settings);
        let source = Arc::new(StubSource::new(50, 100_000_000));
        let store = source.store();
        worker.attach_source(source);

        store.insert(Frame::blank(5, 50, 50, 0));
        worker.seek(42);
        worker.seek(42);

        assert!(store.contains(5));
        assert!(!worker.playhead().seek_pending());
        assert_eq!(worker.playhead().requested_frame(), 42);
    }

    #[test]
    fn test_worker_lifecycle() {
        let settings = Arc::new(CacheSettings::new());
        let worker = PrefetchWorker::new(settings);
        let source = Arc::new(StubSource::new(50, 100_000_000));
        let store = source.store();
        worker.attach_source(source);

        assert!(worker.start());
        // Second start is a no-op on a running worker.
        assert!(worker.start());

        worker.seek_with_preroll(10);
        worker.set_speed(1);
        assert_eq!(worker.speed(), 1);

        // capacity 30, ahead 21: wait for the [10, 31] window to fill.
        let deadline = Instant::now() + Duration::from_secs(2);
        while !(store.contains(10) && store.contains(31)) {
            assert!(Instant::now() < deadline, "window did not fill in time");
            thread::sleep(Duration::from_millis(5));
        }

        assert!(worker.is_ready());
        assert!(worker.stop(Duration::from_secs(5)));
    }

    #[test]
    fn test_worker_idles_without_source() {
        let settings = Arc::new(CacheSettings::new());
        let worker = PrefetchWorker::new(settings);

        assert!(worker.start());
        thread::sleep(Duration::from_millis(20));
        assert!(worker.stop(Duration::from_secs(5)));
    }

    #[test]
    fn test_worker_idles_when_caching_disabled() {
        let settings = Arc::new(CacheSettings::new());
        settings.set_enable_caching(false);
        let worker = PrefetchWorker::new(Arc::clone(&settings));
        let source = Arc::new(StubSource::new(50, 100_000_000));
        let store = Arc::clone(&source.store);
        worker.attach_source(source);

        assert!(worker.start());
        worker.seek_with_preroll(10);
        worker.set_speed(1);
        thread::sleep(Duration::from_millis(100));

        assert!(store.is_empty());
        assert!(worker.stop(Duration::from_secs(5)));
    }
}
