//! Runtime tunables for the prefetch worker
//!
//! The worker takes one `SettingsSnapshot` per tick and works from that,
//! so a mid-tick settings change never produces a half-old half-new window.
//! Live fields are atomics; there is no global singleton, callers share an
//! `Arc<CacheSettings>` explicitly.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use log::info;
use serde::{Deserialize, Serialize};

/// Frames that must be inserted before the cache reports ready.
pub const DEFAULT_MIN_PREROLL_FRAMES: i64 = 4;
/// Absolute ceiling on derived frame capacity.
pub const DEFAULT_MAX_FRAMES_HARD_CAP: i64 = 30;
/// Fraction of capacity placed in the direction of travel.
pub const DEFAULT_PERCENT_AHEAD: f64 = 0.7;

/// Live tunables, safe to mutate from any thread.
#[derive(Debug)]
pub struct CacheSettings {
    enable_caching: AtomicBool,
    min_preroll_frames: AtomicI64,
    max_frames_hard_cap: AtomicI64,
    /// f64 stored as raw bits for lock-free access.
    percent_ahead_bits: AtomicU64,
}

impl CacheSettings {
    pub fn new() -> Self {
        Self {
            enable_caching: AtomicBool::new(true),
            min_preroll_frames: AtomicI64::new(DEFAULT_MIN_PREROLL_FRAMES),
            max_frames_hard_cap: AtomicI64::new(DEFAULT_MAX_FRAMES_HARD_CAP),
            percent_ahead_bits: AtomicU64::new(DEFAULT_PERCENT_AHEAD.to_bits()),
        }
    }

    pub fn enable_caching(&self) -> bool {
        self.enable_caching.load(Ordering::Relaxed)
    }

    pub fn set_enable_caching(&self, enabled: bool) {
        self.enable_caching.store(enabled, Ordering::Relaxed);
    }

    pub fn min_preroll_frames(&self) -> i64 {
        self.min_preroll_frames.load(Ordering::Relaxed)
    }

    pub fn set_min_preroll_frames(&self, frames: i64) {
        self.min_preroll_frames.store(frames, Ordering::Relaxed);
    }

    pub fn max_frames_hard_cap(&self) -> i64 {
        self.max_frames_hard_cap.load(Ordering::Relaxed)
    }

    pub fn set_max_frames_hard_cap(&self, frames: i64) {
        self.max_frames_hard_cap.store(frames, Ordering::Relaxed);
    }

    pub fn percent_ahead(&self) -> f64 {
        f64::from_bits(self.percent_ahead_bits.load(Ordering::Relaxed))
    }

    /// Clamped to `[0, 1]`. A zero share collapses the window to the
    /// playhead itself.
    pub fn set_percent_ahead(&self, percent: f64) {
        let clamped = percent.clamp(0.0, 1.0);
        self.percent_ahead_bits
            .store(clamped.to_bits(), Ordering::Relaxed);
    }

    /// Immutable view for one worker tick.
    pub fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            enable_caching: self.enable_caching(),
            min_preroll_frames: self.min_preroll_frames(),
            max_frames_hard_cap: self.max_frames_hard_cap(),
            percent_ahead: self.percent_ahead(),
        }
    }

    pub fn apply(&self, snapshot: &SettingsSnapshot) {
        self.set_enable_caching(snapshot.enable_caching);
        self.set_min_preroll_frames(snapshot.min_preroll_frames);
        self.set_max_frames_hard_cap(snapshot.max_frames_hard_cap);
        self.set_percent_ahead(snapshot.percent_ahead);
    }

    /// Save current values as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let json = serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| format!("Serialize error: {}", e))?;
        std::fs::write(path, json).map_err(|e| format!("Write error: {}", e))?;
        info!("Cache settings saved to {}", path.display());
        Ok(())
    }

    /// Load values from JSON, applying them to the live fields. Missing
    /// keys fall back to defaults.
    pub fn load(&self, path: &Path) -> Result<(), String> {
        let json = std::fs::read_to_string(path).map_err(|e| format!("Read error: {}", e))?;
        let snapshot: SettingsSnapshot =
            serde_json::from_str(&json).map_err(|e| format!("Parse error: {}", e))?;
        self.apply(&snapshot);
        info!("Cache settings loaded from {}", path.display());
        Ok(())
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain-value settings view, one per worker tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsSnapshot {
    pub enable_caching: bool,
    pub min_preroll_frames: i64,
    pub max_frames_hard_cap: i64,
    pub percent_ahead: f64,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            enable_caching: true,
            min_preroll_frames: DEFAULT_MIN_PREROLL_FRAMES,
            max_frames_hard_cap: DEFAULT_MAX_FRAMES_HARD_CAP,
            percent_ahead: DEFAULT_PERCENT_AHEAD,
        }
    }
}
