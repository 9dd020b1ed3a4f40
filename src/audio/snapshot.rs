//! Shared spectrum state read by the renderer

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

use crate::protocol::AudioFormat;

/// Smoothed spectrum after gain processing
///
/// Readers always work on a copy taken under the read lock, so a render
/// never sees half of one update and half of the next.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SpectrumSnapshot {
    /// Smoothed band energies in `[0, 1]`, native band count of the source
    pub bands: Vec<f32>,
    /// Smoothed overall level in `[0, 1]`
    pub volume: f32,
    /// Beat flag from the most recent frame
    pub peak: bool,
    /// Multiplier currently applied by auto-gain (1.0 when disabled)
    pub gain: f32,
    pub audio_active: bool,
    pub format: Option<AudioFormat>,
    pub major_peak_hz: f32,
    /// Incremented on every processed frame
    pub sequence: u64,
}

impl SpectrumSnapshot {
    /// Silent snapshot with `bands` zeroed bins
    pub fn silent(bands: usize) -> Self {
        Self {
            bands: vec![0.0; bands],
            gain: 1.0,
            ..Default::default()
        }
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// Energy of bin `index` when the spectrum is viewed as `count` bins
    ///
    /// Averages source bands when `count` is smaller than the native band
    /// count and interpolates linearly when it is larger.
    pub fn bin(&self, index: usize, count: usize) -> f32 {
        let n = self.bands.len();
        if n == 0 || count == 0 || index >= count {
            return 0.0;
        }
        if n == count {
            return self.bands[index];
        }

        if n > count {
            let start = index * n / count;
            let end = ((index + 1) * n / count).max(start + 1).min(n);
            let sum: f32 = self.bands[start..end].iter().sum();
            return sum / (end - start) as f32;
        }

        if count == 1 {
            return self.bands[0];
        }
        let pos = index as f32 * (n - 1) as f32 / (count - 1) as f32;
        let lo = pos.floor() as usize;
        let hi = (lo + 1).min(n - 1);
        let frac = pos - lo as f32;
        self.bands[lo] * (1.0 - frac) + self.bands[hi] * frac
    }

    /// The whole spectrum resampled to `count` bins
    pub fn bins(&self, count: usize) -> Vec<f32> {
        (0..count).map(|i| self.bin(i, count)).collect()
    }

    /// Mean of bins `range` when viewed as `count` bins
    pub fn mean(&self, range: std::ops::Range<usize>, count: usize) -> f32 {
        if range.is_empty() {
            return 0.0;
        }
        let len = range.len();
        range.map(|i| self.bin(i, count)).sum::<f32>() / len as f32
    }
}

/// Snapshot shared between the processor (writer) and readers
#[derive(Clone, Default)]
pub struct SharedSnapshot {
    inner: Arc<RwLock<SpectrumSnapshot>>,
}

impl SharedSnapshot {
    pub fn new(initial: SpectrumSnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Copy of the current snapshot
    pub fn read(&self) -> SpectrumSnapshot {
        self.inner.read().clone()
    }

    /// Replace the snapshot; the lock is held only for the assignment
    pub fn store(&self, snapshot: SpectrumSnapshot) {
        *self.inner.write() = snapshot;
    }

    pub fn audio_active(&self) -> bool {
        self.inner.read().audio_active
    }

    pub fn volume(&self) -> f32 {
        self.inner.read().volume
    }
}
