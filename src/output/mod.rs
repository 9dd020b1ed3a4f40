//! Output sinks
//!
//! The render loop hands every frame to an [`OutputSink`]. Hardware drivers
//! live outside this crate and implement the same trait.

pub mod terminal;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::effects::Framebuffer;
use crate::error::OutputError;

pub use terminal::TerminalSink;

/// Destination for rendered frames
///
/// `show` is called once per tick from the render thread and must return
/// within a bounded time.
pub trait OutputSink: Send {
    fn show(&mut self, frame: &Framebuffer) -> Result<(), OutputError>;

    /// Turn every pixel off
    fn clear(&mut self) -> Result<(), OutputError>;

    fn name(&self) -> &'static str;

    /// Global brightness out of 255; sinks without dimming ignore it
    fn set_brightness(&mut self, _brightness: u8) {}
}

/// Headless sink; clones share the frame counter and last frame
#[derive(Clone, Default)]
pub struct NullSink {
    frames: Arc<AtomicU64>,
    last: Arc<Mutex<Option<Framebuffer>>>,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn last_frame(&self) -> Option<Framebuffer> {
        self.last.lock().clone()
    }
}

impl OutputSink for NullSink {
    fn show(&mut self, frame: &Framebuffer) -> Result<(), OutputError> {
        self.frames.fetch_add(1, Ordering::Relaxed);
        *self.last.lock() = Some(frame.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), OutputError> {
        let mut last = self.last.lock();
        if let Some(frame) = last.as_mut() {
            frame.clear();
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

/// Retries each call up to `attempts` times before giving up
pub struct RetryingSink {
    inner: Box<dyn OutputSink>,
    attempts: u32,
}

impl RetryingSink {
    pub fn new(inner: Box<dyn OutputSink>, attempts: u32) -> Self {
        Self {
            inner,
            attempts: attempts.max(1),
        }
    }

    fn retry<F>(&mut self, what: &str, mut op: F) -> Result<(), OutputError>
    where
        F: FnMut(&mut dyn OutputSink) -> Result<(), OutputError>,
    {
        for attempt in 1..=self.attempts {
            match op(self.inner.as_mut()) {
                Ok(()) => return Ok(()),
                Err(e) => tracing::warn!(
                    "{} sink {} failed (attempt {}/{}): {}",
                    self.inner.name(),
                    what,
                    attempt,
                    self.attempts,
                    e
                ),
            }
        }
        Err(OutputError::RetriesExhausted(self.attempts))
    }
}

impl OutputSink for RetryingSink {
    fn show(&mut self, frame: &Framebuffer) -> Result<(), OutputError> {
        self.retry("show", |sink| sink.show(frame))
    }

    fn clear(&mut self) -> Result<(), OutputError> {
        self.retry("clear", |sink| sink.clear())
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn set_brightness(&mut self, brightness: u8) {
        self.inner.set_brightness(brightness);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::Pixel;

    struct Flaky {
        failures_left: u32,
        calls: Arc<AtomicU64>,
    }

    impl OutputSink for Flaky {
        fn show(&mut self, _frame: &Framebuffer) -> Result<(), OutputError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(OutputError::WriteFailed("bus busy".into()));
            }
            Ok(())
        }

        fn clear(&mut self) -> Result<(), OutputError> {
            Err(OutputError::WriteFailed("unplugged".into()))
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    #[test]
    fn test_null_sink_counts_frames() {
        let sink = NullSink::new();
        let mut handle = sink.clone();
        let mut frame = Framebuffer::new(4);
        frame.fill(Pixel::rgb(9, 9, 9));

        handle.show(&frame).unwrap();
        handle.show(&frame).unwrap();
        assert_eq!(sink.frames(), 2);
        assert_eq!(sink.last_frame(), Some(frame));

        handle.clear().unwrap();
        assert!(sink.last_frame().unwrap().is_dark());
    }

    #[test]
    fn test_retrying_sink_recovers_within_budget() {
        let calls = Arc::new(AtomicU64::new(0));
        let flaky = Flaky {
            failures_left: 2,
            calls: calls.clone(),
        };
        let mut sink = RetryingSink::new(Box::new(flaky), 3);
        sink.show(&Framebuffer::new(1)).unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_retrying_sink_gives_up() {
        let flaky = Flaky {
            failures_left: 10,
            calls: Arc::new(AtomicU64::new(0)),
        };
        let mut sink = RetryingSink::new(Box::new(flaky), 3);
        assert!(matches!(
            sink.show(&Framebuffer::new(1)),
            Err(OutputError::RetriesExhausted(3))
        ));
        assert!(sink.clear().is_err());
    }
}
