//! Latest-wins frame hand-off between the receive and render threads
//!
//! No queue: the producer overwrites whatever the consumer has not picked
//! up yet, so end-to-end latency stays within one render tick.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::protocol::AudioFrame;

/// Single-slot mailbox for decoded frames
pub struct FrameSlot {
    slot: Mutex<Option<AudioFrame>>,
    published: AtomicU64,
    overwritten: AtomicU64,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            published: AtomicU64::new(0),
            overwritten: AtomicU64::new(0),
        }
    }

    /// Publish a frame, replacing any unread one
    pub fn publish(&self, frame: AudioFrame) {
        let previous = self.slot.lock().replace(frame);
        self.published.fetch_add(1, Ordering::Relaxed);
        if previous.is_some() {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Take the newest frame, if one arrived since the last take
    pub fn take(&self) -> Option<AudioFrame> {
        self.slot.lock().take()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }

    /// Frames published since creation
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Frames dropped because a newer one replaced them unread
    pub fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe handle to a frame slot
pub type SharedFrameSlot = Arc<FrameSlot>;

/// Create a new shared frame slot
pub fn create_shared_slot() -> SharedFrameSlot {
    Arc::new(FrameSlot::new())
}
