//! Frame producer seam between the prefetch worker and the decode backend
//!
//! The worker only sees this interface. Concrete producers (file decoder,
//! composited timeline, image sequence) implement it and bind a store that
//! receives everything the worker pulls.

use std::sync::Arc;

use thiserror::Error;

use crate::frame::Frame;
use crate::store::FrameStore;

/// Stream properties used for per-frame byte estimation.
///
/// `preview_width`/`preview_height`, when non-zero, override the full-size
/// dimensions. A timeline rendering half-resolution previews caches far more
/// frames into the same budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMeta {
    pub width: i32,
    pub height: i32,
    pub preview_width: i32,
    pub preview_height: i32,
    pub sample_rate: i32,
    pub channels: i32,
    pub fps: f64,
}

impl FrameMeta {
    /// Width used for byte estimation (preview override wins).
    pub fn effective_width(&self) -> i32 {
        if self.preview_width > 0 {
            self.preview_width
        } else {
            self.width
        }
    }

    /// Height used for byte estimation (preview override wins).
    pub fn effective_height(&self) -> i32 {
        if self.preview_height > 0 {
            self.preview_height
        } else {
            self.height
        }
    }
}

/// Errors a frame producer can report.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Requested index lies outside `[1, max_frame]`. Ends the current
    /// window fill; the worker resumes next tick.
    #[error("frame {0} is outside the timeline")]
    OutOfBounds(i64),

    /// Any other producer failure (decoder stall, I/O error). The worker
    /// logs it and keeps running.
    #[error("frame source failed: {0}")]
    Failed(String),
}

/// A producer that can synthesize any frame by index on demand.
///
/// `get_frame` is blocking from the worker's point of view; the producer may
/// use its own threads internally. Implementations are shared across threads
/// and must be internally synchronized.
pub trait FrameSource: Send + Sync {
    /// Decode or compose the frame at `index` (1-based).
    fn get_frame(&self, index: i64) -> Result<Frame, SourceError>;

    /// Highest valid frame index. Queried every tick, so a growing timeline
    /// is picked up without restarting the worker.
    fn max_frame(&self) -> i64;

    /// Stream properties for byte estimation.
    fn meta(&self) -> FrameMeta;

    /// The store bound to this source (one-to-one).
    fn store(&self) -> Arc<dyn FrameStore>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_override() {
        let mut meta = FrameMeta {
            width: 1920,
            height: 1080,
            preview_width: 0,
            preview_height: 0,
            sample_rate: 48000,
            channels: 2,
            fps: 24.0,
        };
        assert_eq!(meta.effective_width(), 1920);
        assert_eq!(meta.effective_height(), 1080);

        meta.preview_width = 960;
        meta.preview_height = 540;
        assert_eq!(meta.effective_width(), 960);
        assert_eq!(meta.effective_height(), 540);
    }

    #[test]
    fn test_error_display() {
        let err = SourceError::OutOfBounds(51);
        assert_eq!(err.to_string(), "frame 51 is outside the timeline");

        let err = SourceError::Failed("decoder stall".into());
        assert_eq!(err.to_string(), "frame source failed: decoder stall");
    }
}
