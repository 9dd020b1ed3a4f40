//! Audio signal path: frame hand-off, processing and the shared snapshot

pub mod buffer;
pub mod processor;
pub mod snapshot;

pub use buffer::{create_shared_slot, FrameSlot, SharedFrameSlot};
pub use processor::{AutoGain, SignalProcessor};
pub use snapshot::{SharedSnapshot, SpectrumSnapshot};
