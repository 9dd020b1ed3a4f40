//! Spectrum-driven effects

use std::f32::consts::TAU;

use super::color::hsv;
use super::{Effect, EffectKind, Framebuffer, RenderInput};
use crate::audio::SpectrumSnapshot;
use crate::constants::FFT_BINS;

const SEGMENTS: usize = 8;

/// Level of each of `SEGMENTS` bin pairs, capped at 1.0
pub(crate) fn segment_levels(snapshot: &SpectrumSnapshot) -> [f32; SEGMENTS] {
    let per = FFT_BINS / SEGMENTS;
    let mut levels = [0.0; SEGMENTS];
    for (seg, level) in levels.iter_mut().enumerate() {
        let start = seg * per;
        *level = snapshot.mean(start..start + per, FFT_BINS).min(1.0);
    }
    levels
}

/// Segment layout for a strip of `n` pixels: (count, pixels per segment)
pub(crate) fn segment_layout(n: usize) -> (usize, usize) {
    let count = SEGMENTS.min(n).max(1);
    (count, n / count)
}

/// Mirrored centre-out spectrum, colours drifting along the strip
pub struct SpectrumBars;

impl Effect for SpectrumBars {
    fn kind(&self) -> EffectKind {
        EffectKind::SpectrumBars
    }

    fn reset(&mut self, _num_leds: usize) {}

    fn render(&mut self, input: &RenderInput<'_>) -> Framebuffer {
        let n = input.num_leds;
        let bins = input.snapshot.bins(FFT_BINS);
        let center = (n / 2).max(1);
        let span = n * 2;
        let time_offset = ((input.frames() * 0.15) as usize) % span.max(1);

        let mut fb = Framebuffer::new(n);
        for (i, pixel) in fb.pixels_mut().iter_mut().enumerate() {
            let mut pos = (i + time_offset) % span;
            if pos >= n {
                pos = span - pos - 1;
            }
            let distance = pos.abs_diff(n / 2);
            let bin = (distance * FFT_BINS / center).min(FFT_BINS - 1);
            let brightness = bins[bin];

            let hue = match bin {
                0..=4 => 320.0,
                5..=10 => 280.0,
                _ => 200.0,
            };
            *pixel = hsv(hue, 0.7 + brightness * 0.3, brightness);
        }
        fb
    }
}

/// Eight segments filling from their start, blue to pink along the strip
pub struct VuMeter;

impl Effect for VuMeter {
    fn kind(&self) -> EffectKind {
        EffectKind::VuMeter
    }

    fn reset(&mut self, _num_leds: usize) {}

    fn render(&mut self, input: &RenderInput<'_>) -> Framebuffer {
        let n = input.num_leds;
        let (count, per) = segment_layout(n);
        let levels = segment_levels(input.snapshot);
        let last = (n.max(2) - 1) as f32;

        let mut fb = Framebuffer::new(n);
        for (seg, level) in levels.iter().take(count).enumerate() {
            let start = seg * per;
            let lit = (level * per as f32) as usize;
            for i in start..start + lit.min(per) {
                let pos = i as f32 / last;
                let hue = 260.0 + pos * 60.0;
                let brightness = (1.0 - pos * 0.2) * level;
                fb.set(i, hsv(hue, 0.7 + pos * 0.3, brightness));
            }
        }
        fb
    }
}

/// Position rainbow whose brightness follows nearby bands
pub struct RainbowSpectrum;

impl Effect for RainbowSpectrum {
    fn kind(&self) -> EffectKind {
        EffectKind::RainbowSpectrum
    }

    fn reset(&mut self, _num_leds: usize) {}

    fn render(&mut self, input: &RenderInput<'_>) -> Framebuffer {
        let n = input.num_leds;
        let bins = input.snapshot.bins(FFT_BINS);
        let beat = input.beat();

        let mut fb = Framebuffer::new(n);
        for (i, pixel) in fb.pixels_mut().iter_mut().enumerate() {
            let led_pos = i as f32 / n as f32;
            let influence: f32 = bins
                .iter()
                .enumerate()
                .map(|(j, level)| {
                    let distance = (j as f32 / FFT_BINS as f32 - led_pos).abs();
                    if distance < 0.2 {
                        level * (1.0 - distance / 0.2)
                    } else {
                        0.0
                    }
                })
                .sum();

            let brightness = if beat {
                1.0
            } else {
                0.3 + (influence * 0.7).min(0.7)
            };
            *pixel = hsv(led_pos * 360.0, 1.0, brightness);
        }
        fb
    }
}

/// Segments expanding from their centres over a fading canvas
pub struct FrequencyWave {
    canvas: Framebuffer,
}

impl FrequencyWave {
    pub fn new() -> Self {
        Self {
            canvas: Framebuffer::default(),
        }
    }
}

impl Default for FrequencyWave {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for FrequencyWave {
    fn kind(&self) -> EffectKind {
        EffectKind::FrequencyWave
    }

    fn reset(&mut self, num_leds: usize) {
        self.canvas = Framebuffer::new(num_leds);
    }

    fn render(&mut self, input: &RenderInput<'_>) -> Framebuffer {
        let n = input.num_leds;
        self.canvas.resize(n);
        self.canvas.fade(input.fade(0.90));

        let (count, per) = segment_layout(n);
        let levels = segment_levels(input.snapshot);
        let bins_per = FFT_BINS / SEGMENTS;

        for (seg, level) in levels.iter().take(count).enumerate() {
            let start = seg * per;
            let end = (start + per).min(n);
            let center = (start + end) / 2;
            let half = (end - start) / 2;

            let start_bin = seg * bins_per;
            let bin_pos = (start_bin as f32 + bins_per as f32 / 2.0) / FFT_BINS as f32;
            let hue = 320.0 - bin_pos * 120.0;

            let lit = ((level * half as f32) as usize).min(half);
            for i in start..end {
                let distance = i.abs_diff(center);
                if distance < lit {
                    let ratio = distance as f32 / half.max(1) as f32;
                    let brightness = (1.0 - ratio * 0.2) * level;
                    self.canvas.set(i, hsv(hue, 0.7 + ratio * 0.3, brightness));
                }
            }
        }
        self.canvas.clone()
    }
}

/// Band-coloured spots that blur out
pub struct Blurz {
    canvas: Framebuffer,
}

impl Blurz {
    const THRESHOLD: f32 = 100.0 / 255.0;

    pub fn new() -> Self {
        Self {
            canvas: Framebuffer::default(),
        }
    }
}

impl Default for Blurz {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Blurz {
    fn kind(&self) -> EffectKind {
        EffectKind::Blurz
    }

    fn reset(&mut self, num_leds: usize) {
        self.canvas = Framebuffer::new(num_leds);
    }

    fn render(&mut self, input: &RenderInput<'_>) -> Framebuffer {
        let n = input.num_leds;
        self.canvas.resize(n);
        self.canvas.fade(input.fade(0.85));

        let spacing = n as f32 / FFT_BINS as f32;
        for (bin, level) in input.snapshot.bins(FFT_BINS).into_iter().enumerate() {
            if level > Self::THRESHOLD {
                let pos = (((bin as f32 + 0.5) * spacing) as usize).min(n.saturating_sub(1));
                let hue = bin as f32 / FFT_BINS as f32 * 360.0;
                self.canvas.set(pos, hsv(hue, 1.0, level));
            }
        }
        self.canvas.clone()
    }
}

/// Whole strip takes a spectrum-weighted hue with a travelling sine wobble
pub struct ColorWave {
    hue: f32,
}

impl ColorWave {
    pub fn new() -> Self {
        Self { hue: 0.0 }
    }
}

impl Default for ColorWave {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for ColorWave {
    fn kind(&self) -> EffectKind {
        EffectKind::ColorWave
    }

    fn reset(&mut self, _num_leds: usize) {
        self.hue = 0.0;
    }

    fn render(&mut self, input: &RenderInput<'_>) -> Framebuffer {
        let n = input.num_leds;
        let snap = input.snapshot;
        let bass = snap.mean(0..5, FFT_BINS);
        let mids = snap.mean(5..11, FFT_BINS);
        let highs = snap.mean(11..16, FFT_BINS);

        let total = bass + mids + highs + 1.0 / 255.0;
        let target = (bass * 320.0 + mids * 280.0 + highs * 200.0) / total;
        let keep = input.fade(0.9);
        self.hue = self.hue * keep + target * (1.0 - keep);

        let volume = input.volume();
        let (saturation, brightness) = if input.beat() {
            (1.0, 1.0)
        } else {
            (0.7 + volume * 0.3, 0.5 + volume * 0.5)
        };

        let phase = input.frames() * 0.1;
        let mut fb = Framebuffer::new(n);
        for (i, pixel) in fb.pixels_mut().iter_mut().enumerate() {
            let wave = (i as f32 / n as f32 * TAU + phase).sin();
            *pixel = hsv(self.hue + wave * 40.0, saturation, brightness);
        }
        fb
    }
}

/// Dominant band colour pushed in at index 0, one pixel per tick
pub struct Waterfall {
    canvas: Framebuffer,
}

impl Waterfall {
    pub fn new() -> Self {
        Self {
            canvas: Framebuffer::default(),
        }
    }

    /// Low bins map to cyan, the middle to purple, the top wraps to red
    fn hue_for(bin: usize) -> f32 {
        let f = bin as f32 / FFT_BINS as f32;
        let hue = if f < 0.5 {
            190.0 + f * 2.0 * 90.0
        } else {
            280.0 + (f - 0.5) * 2.0 * 90.0
        };
        hue % 360.0
    }
}

impl Default for Waterfall {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Waterfall {
    fn kind(&self) -> EffectKind {
        EffectKind::Waterfall
    }

    fn reset(&mut self, num_leds: usize) {
        self.canvas = Framebuffer::new(num_leds);
    }

    fn render(&mut self, input: &RenderInput<'_>) -> Framebuffer {
        self.canvas.resize(input.num_leds);

        let bins = input.snapshot.bins(FFT_BINS);
        let (index, level) = bins
            .iter()
            .copied()
            .enumerate()
            .fold((0, 0.0f32), |best, (i, v)| if v > best.1 { (i, v) } else { best });

        let brightness = level.min(1.0);
        let head = hsv(Self::hue_for(index), 0.7 + brightness * 0.3, brightness);
        self.canvas.shift_in(head);
        self.canvas.clone()
    }
}

/// Whole-strip pulse; the hue steps 30 degrees on every beat
pub struct BeatPulse {
    hue: f32,
}

impl BeatPulse {
    pub fn new() -> Self {
        Self { hue: 0.0 }
    }
}

impl Default for BeatPulse {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for BeatPulse {
    fn kind(&self) -> EffectKind {
        EffectKind::BeatPulse
    }

    fn reset(&mut self, _num_leds: usize) {
        self.hue = 0.0;
    }

    fn render(&mut self, input: &RenderInput<'_>) -> Framebuffer {
        let beat = input.beat();
        if beat {
            self.hue = (self.hue + 30.0) % 360.0;
        }

        let pulse = (input.frames() * 0.2).sin() * 0.2 + 0.5;
        let brightness = if beat { 0.7 } else { input.volume() * pulse };

        let mut fb = Framebuffer::new(input.num_leds);
        for (i, pixel) in fb.pixels_mut().iter_mut().enumerate() {
            *pixel = hsv(self.hue + i as f32 * 2.0, 1.0, brightness);
        }
        fb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EffectsConfig;
    use crate::effects::test_support::{input, snapshot};

    #[test]
    fn test_segment_levels_pair_bins() {
        let mut snap = snapshot(0.0, false);
        snap.bands[0] = 0.2;
        snap.bands[1] = 0.4;
        snap.bands[15] = 1.0;
        let levels = segment_levels(&snap);
        assert!((levels[0] - 0.3).abs() < 1e-6);
        assert!((levels[7] - 0.5).abs() < 1e-6);
        assert_eq!(levels[3], 0.0);
    }

    #[test]
    fn test_vu_meter_fills_proportionally() {
        let config = EffectsConfig::default();
        let mut snap = snapshot(0.0, false);
        snap.bands[0] = 0.5;
        snap.bands[1] = 0.5;

        let fb = VuMeter.render(&input(&snap, &config, 80, 0));
        let lit: Vec<bool> = fb.pixels().iter().map(|p| !p.is_black()).collect();
        assert_eq!(lit[..10].iter().filter(|l| **l).count(), 5);
        assert!(lit[10..].iter().all(|l| !l));
    }

    #[test]
    fn test_silence_is_dark_for_meters() {
        let config = EffectsConfig::default();
        let snap = snapshot(0.0, false);
        assert!(VuMeter.render(&input(&snap, &config, 60, 0)).is_dark());
        assert!(SpectrumBars.render(&input(&snap, &config, 60, 0)).is_dark());
    }

    #[test]
    fn test_rainbow_spectrum_flashes_on_beat() {
        let config = EffectsConfig::default();
        let snap = snapshot(0.0, true);
        let fb = RainbowSpectrum.render(&input(&snap, &config, 10, 0));
        assert_eq!(fb.get(0), Some(hsv(0.0, 1.0, 1.0)));
    }

    #[test]
    fn test_waterfall_shifts_down() {
        let config = EffectsConfig::default();
        let mut effect = Waterfall::new();
        effect.reset(5);

        let loud = snapshot(1.0, false);
        let quiet = snapshot(0.0, false);
        effect.render(&input(&loud, &config, 5, 0));
        let fb = effect.render(&input(&quiet, &config, 5, 16));

        assert!(fb.get(0).unwrap().is_black());
        assert!(!fb.get(1).unwrap().is_black());
        assert!(fb.get(2).unwrap().is_black());
    }

    #[test]
    fn test_frequency_wave_fades_when_silent() {
        let config = EffectsConfig::default();
        let mut effect = FrequencyWave::new();
        effect.reset(64);
        let loud = snapshot(1.0, false);
        let quiet = snapshot(0.0, false);

        let first = effect.render(&input(&loud, &config, 64, 0));
        assert!(!first.is_dark());
        let mut last = first;
        for tick in 1..200 {
            last = effect.render(&input(&quiet, &config, 64, tick * 16));
        }
        assert!(last.is_dark());
    }

    #[test]
    fn test_beat_pulse_steps_hue() {
        let config = EffectsConfig::default();
        let mut effect = BeatPulse::new();
        let beat = snapshot(0.5, true);
        effect.render(&input(&beat, &config, 4, 0));
        effect.render(&input(&beat, &config, 4, 16));
        assert_eq!(effect.hue, 60.0);
        effect.reset(4);
        assert_eq!(effect.hue, 0.0);
    }
}
