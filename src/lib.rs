//! PLAYCACHE - directional playback prefetch cache
//!
//! A background worker keeps a sliding window of decoded frames resident in
//! memory around a moving playhead, so the render thread can pull frames
//! without blocking on decode. The window follows the playhead forward or
//! backward, respects the store's byte budget, abandons in-progress work
//! when the user jumps, and shuts down cooperatively.
//!
//! # Components
//!
//! - [`PrefetchWorker`]: the background loop and consumer-facing controls
//! - [`PlayheadState`]: shared atomic record of playback intent
//! - [`policy`]: pure window/capacity arithmetic
//! - [`MemoryStore`]: bounded LRU frame store ([`FrameStore`] contract)
//! - [`FrameSource`]: the producer seam (decoder, composited timeline)
//! - [`CacheSettings`]: runtime tunables, snapshotted once per tick

pub mod frame;
pub mod playhead;
pub mod policy;
pub mod settings;
pub mod source;
pub mod store;
pub mod worker;

pub use frame::Frame;
pub use playhead::PlayheadState;
pub use settings::{CacheSettings, SettingsSnapshot};
pub use source::{FrameMeta, FrameSource, SourceError};
pub use store::{CacheStats, FrameStore, MemoryStore};
pub use worker::PrefetchWorker;
