//! Decoded frame payload (video pixels + audio samples)
//!
//! **Why**: The store and worker shuffle frames between threads constantly.
//! Pixel/audio buffers live behind an `Arc` so cloning a `Frame` is cheap
//! (pointer copy), matching how the store hands copies to the consumer.
//!
//! **Used by**: MemoryStore (cached values), FrameSource (produced values)

use std::sync::Arc;

/// Immutable decoded data for a single frame.
#[derive(Debug)]
struct FrameData {
    width: usize,
    height: usize,
    /// RGBA, 4 bytes per pixel, row-major.
    pixels: Vec<u8>,
    /// Interleaved audio samples for this frame's duration.
    audio: Vec<f32>,
}

/// Single decoded frame, addressed by its 1-based timeline index.
///
/// Frames are immutable once produced. The worker never holds one beyond
/// handing it to the store.
#[derive(Debug, Clone)]
pub struct Frame {
    index: i64,
    data: Arc<FrameData>,
}

impl Frame {
    /// Wrap decoded buffers into a frame.
    pub fn new(index: i64, width: usize, height: usize, pixels: Vec<u8>, audio: Vec<f32>) -> Self {
        Self {
            index,
            data: Arc::new(FrameData {
                width,
                height,
                pixels,
                audio,
            }),
        }
    }

    /// Zero-filled frame of the given dimensions. Handy for synthetic
    /// sources and tests where pixel content is irrelevant.
    pub fn blank(index: i64, width: usize, height: usize, sample_count: usize) -> Self {
        Self::new(
            index,
            width,
            height,
            vec![0u8; width * height * 4],
            vec![0.0f32; sample_count],
        )
    }

    /// 1-based timeline index.
    #[inline]
    pub fn index(&self) -> i64 {
        self.index
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.data.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.data.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data.pixels
    }

    pub fn audio(&self) -> &[f32] {
        &self.data.audio
    }

    /// Memory footprint in bytes (pixel buffer + audio buffer).
    pub fn mem(&self) -> usize {
        self.data.pixels.len() + self.data.audio.len() * std::mem::size_of::<f32>()
    }
}
