//! Pure window arithmetic for the prefetch worker
//!
//! Direction, window bounds, and capacity derivation as total functions with
//! no side effects. The worker calls these every tick; tests hit them
//! directly.

/// Effective playback direction: sign of `speed`, or `last_dir` when paused.
/// Always returns +1 or -1.
pub fn direction(speed: i32, last_dir: i32) -> i32 {
    if speed != 0 {
        if speed > 0 { 1 } else { -1 }
    } else if last_dir < 0 {
        -1
    } else {
        1
    }
}

/// Closed caching window around `playhead` in direction `dir`.
///
/// Forward: `[playhead, playhead + ahead_count]`.
/// Backward: `[playhead - ahead_count, playhead]`.
/// Clamped to `[1, timeline_end]`; at a degenerate edge the result may be
/// empty (end < begin) and callers treat it as nothing to fill.
pub fn window(playhead: i64, dir: i32, ahead_count: i64, timeline_end: i64) -> (i64, i64) {
    let (begin, end) = if dir > 0 {
        (playhead, playhead + ahead_count)
    } else {
        (playhead - ahead_count, playhead)
    };
    (begin.max(1), end.min(timeline_end))
}

/// Rough per-frame memory estimate: RGBA video plus one frame's worth of
/// f32 audio samples.
pub fn bytes_per_frame(width: i32, height: i32, sample_rate: i32, channels: i32, fps: f64) -> i64 {
    let video = width as i64 * height as i64 * 4;
    let audio = if fps > 0.0 {
        ((sample_rate as f64 * channels as f64 / fps) * 4.0) as i64
    } else {
        0
    };
    video + audio
}

/// How many frames fit in `max_bytes`, capped by `hard_cap`.
/// Zero when either input is non-positive.
pub fn capacity(max_bytes: i64, bytes_per_frame: i64, hard_cap: i64) -> i64 {
    if max_bytes > 0 && bytes_per_frame > 0 {
        (max_bytes / bytes_per_frame).min(hard_cap).max(0)
    } else {
        0
    }
}

/// Share of the capacity placed in the direction of travel.
pub fn ahead_count(capacity: i64, percent_ahead: f64) -> i64 {
    (capacity as f64 * percent_ahead).floor() as i64
}
