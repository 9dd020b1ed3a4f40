//! Signal processing: compensation, auto-gain, clamping and smoothing
//!
//! Runs once per render tick on the render thread. All math happens on
//! the processor's own state; the shared snapshot is only touched for the
//! final assignment.

use std::time::{Duration, Instant};

use super::buffer::FrameSlot;
use super::snapshot::{SharedSnapshot, SpectrumSnapshot};
use crate::config::AudioConfig;
use crate::protocol::{AudioFormat, AudioFrame};

/// Lowest peak the tracker will divide by
const AUTO_GAIN_FLOOR: f32 = 0.02;

/// Upper bound on the step fed to the decay math
const MAX_DT: Duration = Duration::from_secs(1);

/// Fixed multiplier applied before clamping
#[inline]
pub fn apply_gain(value: f32, compensation: f32) -> f32 {
    value * compensation
}

/// `prev * factor + next * (1 - factor)`
#[inline]
pub fn smooth(prev: f32, next: f32, factor: f32) -> f32 {
    prev * factor + next * (1.0 - factor)
}

/// Rolling-peak gain tracker
///
/// The multiplier starts at `target / peak` when a stream begins and then
/// relaxes toward 1.0 with time constant `auto_gain_decay`. The tracked
/// peak bounds it from above at all times, so a loud transient pulls the
/// gain down immediately.
#[derive(Debug, Clone)]
pub struct AutoGain {
    peak: f32,
    gain: f32,
    armed: bool,
}

impl AutoGain {
    pub fn new() -> Self {
        Self {
            peak: 0.0,
            gain: 1.0,
            armed: false,
        }
    }

    /// Feed the loudest compensated value of a frame, get the multiplier
    pub fn update(&mut self, frame_peak: f32, dt: Duration, config: &AudioConfig) -> f32 {
        let release = (-dt.min(MAX_DT).as_secs_f32() / config.auto_gain_decay).exp();
        self.peak = (self.peak * release).max(frame_peak).max(AUTO_GAIN_FLOOR);
        let ceiling = (config.auto_gain_target / self.peak).clamp(1.0, config.max_auto_gain);

        let relaxed = if self.armed {
            1.0 + (self.gain - 1.0) * release
        } else {
            self.armed = true;
            ceiling
        };
        self.gain = relaxed.min(ceiling);
        self.gain
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }
}

impl Default for AutoGain {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns decoded frames into the shared spectrum snapshot
pub struct SignalProcessor {
    bands: Vec<f32>,
    volume: f32,
    peak: bool,
    major_peak_hz: f32,
    format: Option<AudioFormat>,
    auto_gain: AutoGain,
    active: bool,
    last_frame_at: Option<Instant>,
    last_tick: Option<Instant>,
    sequence: u64,
}

impl SignalProcessor {
    pub fn new() -> Self {
        Self {
            bands: Vec::new(),
            volume: 0.0,
            peak: false,
            major_peak_hz: 0.0,
            format: None,
            auto_gain: AutoGain::new(),
            active: false,
            last_frame_at: None,
            last_tick: None,
            sequence: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Process one tick
    ///
    /// Returns the snapshot to publish, or `None` when nothing changed.
    pub fn process(
        &mut self,
        frame: Option<AudioFrame>,
        now: Instant,
        config: &AudioConfig,
    ) -> Option<SpectrumSnapshot> {
        let dt = self
            .last_tick
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or_default();
        self.last_tick = Some(now);

        match frame {
            Some(frame) => {
                self.apply_frame(frame, dt, config);
                Some(self.snapshot())
            }
            None => self.idle(now, config),
        }
    }

    /// Take the newest frame from `slot` and publish into `shared`
    pub fn tick(
        &mut self,
        slot: &FrameSlot,
        shared: &SharedSnapshot,
        now: Instant,
        config: &AudioConfig,
    ) -> bool {
        match self.process(slot.take(), now, config) {
            Some(snapshot) => {
                shared.store(snapshot);
                true
            }
            None => false,
        }
    }

    fn apply_frame(&mut self, frame: AudioFrame, dt: Duration, config: &AudioConfig) {
        let comp = config.volume_compensation;
        let compensated: Vec<f32> = frame.bands.iter().map(|b| apply_gain(*b, comp)).collect();
        let volume = apply_gain(frame.volume, comp);

        let gain = if config.auto_gain {
            let loudest = compensated.iter().copied().fold(volume, f32::max);
            self.auto_gain.update(loudest, dt, config)
        } else {
            self.auto_gain.reset();
            1.0
        };

        let bands: Vec<f32> = compensated
            .into_iter()
            .map(|b| (b * gain).clamp(0.0, 1.0))
            .collect();
        let volume = (volume * gain).clamp(0.0, 1.0);

        if self.bands.len() != bands.len() {
            if !self.bands.is_empty() {
                tracing::debug!("Band count changed {} -> {}", self.bands.len(), bands.len());
            }
            self.bands = bands;
            self.volume = volume;
        } else {
            let s = config.smoothing;
            for (prev, next) in self.bands.iter_mut().zip(bands) {
                *prev = smooth(*prev, next, s);
            }
            self.volume = smooth(self.volume, volume, s);
        }

        if !self.active {
            tracing::info!(
                "Audio stream detected ({:?}, {} bands)",
                frame.format,
                frame.band_count()
            );
        }
        self.active = true;
        self.peak = frame.peak;
        self.major_peak_hz = frame.major_peak_hz;
        self.format = Some(frame.format);
        self.last_frame_at = Some(frame.received_at);
        self.sequence += 1;
    }

    fn idle(&mut self, now: Instant, config: &AudioConfig) -> Option<SpectrumSnapshot> {
        if !self.active {
            return None;
        }

        let timeout = Duration::from_secs_f64(config.silence_timeout);
        let stale = self
            .last_frame_at
            .map(|t| now.saturating_duration_since(t) >= timeout)
            .unwrap_or(true);

        if stale {
            tracing::warn!(
                "No audio frames for {:.1}s, falling back to silence",
                config.silence_timeout
            );
            self.active = false;
            self.bands.iter_mut().for_each(|b| *b = 0.0);
            self.volume = 0.0;
            self.peak = false;
            self.auto_gain.reset();
            self.sequence += 1;
            return Some(self.snapshot());
        }

        // A beat lasts one tick
        if self.peak {
            self.peak = false;
            return Some(self.snapshot());
        }
        None
    }

    fn snapshot(&self) -> SpectrumSnapshot {
        SpectrumSnapshot {
            bands: self.bands.clone(),
            volume: self.volume,
            peak: self.peak,
            gain: self.auto_gain.gain(),
            audio_active: self.active,
            format: self.format,
            major_peak_hz: self.major_peak_hz,
            sequence: self.sequence,
        }
    }
}

impl Default for SignalProcessor {
    fn default() -> Self {
        Self::new()
    }
}
