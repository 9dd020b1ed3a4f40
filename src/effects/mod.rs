//! Effect catalog and rendering contract
//!
//! The catalog is closed: [`EffectKind::ALL`] lists every effect in its
//! fixed order and [`create`] builds the matching implementation.

pub mod basic;
pub mod color;
pub mod particles;
pub mod registry;
pub mod spectrum;
pub mod white;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::audio::SpectrumSnapshot;
use crate::config::EffectsConfig;
use crate::error::ConfigError;

pub use color::{Framebuffer, Pixel};
pub use registry::EffectRegistry;

/// Animation speeds are expressed per frame at this rate
pub const REFERENCE_FPS: f32 = 60.0;

/// What an effect needs from the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    NeedsAudio,
    None,
    WhiteOnly,
}

/// Every effect the renderer knows, in catalog order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Off,
    Rainbow,
    SpectrumBars,
    VuMeter,
    RainbowSpectrum,
    Fire,
    FrequencyWave,
    Blurz,
    Pixels,
    Puddles,
    Ripple,
    ColorWave,
    Waterfall,
    BeatPulse,
    WhiteSegments,
    WhiteArrow,
    WhiteMarquee,
}

impl EffectKind {
    pub const ALL: [EffectKind; 17] = [
        EffectKind::Off,
        EffectKind::Rainbow,
        EffectKind::SpectrumBars,
        EffectKind::VuMeter,
        EffectKind::RainbowSpectrum,
        EffectKind::Fire,
        EffectKind::FrequencyWave,
        EffectKind::Blurz,
        EffectKind::Pixels,
        EffectKind::Puddles,
        EffectKind::Ripple,
        EffectKind::ColorWave,
        EffectKind::Waterfall,
        EffectKind::BeatPulse,
        EffectKind::WhiteSegments,
        EffectKind::WhiteArrow,
        EffectKind::WhiteMarquee,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EffectKind::Off => "off",
            EffectKind::Rainbow => "rainbow",
            EffectKind::SpectrumBars => "spectrum_bars",
            EffectKind::VuMeter => "vu_meter",
            EffectKind::RainbowSpectrum => "rainbow_spectrum",
            EffectKind::Fire => "fire",
            EffectKind::FrequencyWave => "frequency_wave",
            EffectKind::Blurz => "blurz",
            EffectKind::Pixels => "pixels",
            EffectKind::Puddles => "puddles",
            EffectKind::Ripple => "ripple",
            EffectKind::ColorWave => "color_wave",
            EffectKind::Waterfall => "waterfall",
            EffectKind::BeatPulse => "beat_pulse",
            EffectKind::WhiteSegments => "white_segments",
            EffectKind::WhiteArrow => "white_arrow",
            EffectKind::WhiteMarquee => "white_marquee",
        }
    }

    /// Position in [`EffectKind::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn capability(self) -> Capability {
        match self {
            EffectKind::Off | EffectKind::Rainbow => Capability::None,
            EffectKind::WhiteSegments | EffectKind::WhiteArrow | EffectKind::WhiteMarquee => {
                Capability::WhiteOnly
            }
            _ => Capability::NeedsAudio,
        }
    }

    pub fn needs_audio(self) -> bool {
        self.capability() != Capability::None
    }

    pub fn description(self) -> &'static str {
        match self {
            EffectKind::Off => "All LEDs off",
            EffectKind::Rainbow => "Cycling colour wheel",
            EffectKind::SpectrumBars => "Mirrored centre-out spectrum in pink, purple and blue",
            EffectKind::VuMeter => "Eight segment level meter with a blue to pink gradient",
            EffectKind::RainbowSpectrum => "Position rainbow modulated by nearby bands",
            EffectKind::Fire => "Heat simulation sparked by bass",
            EffectKind::FrequencyWave => "Segments expanding from their centres",
            EffectKind::Blurz => "Band coloured spots that blur out",
            EffectKind::Pixels => "Random pixels coloured from the volume history",
            EffectKind::Puddles => "Random puddles sized by volume",
            EffectKind::Ripple => "Rings expanding from the centre on each beat",
            EffectKind::ColorWave => "Whole strip hue follows the spectrum balance",
            EffectKind::Waterfall => "Dominant band colour cascading down the strip",
            EffectKind::BeatPulse => "Whole strip pulse, hue steps on each beat",
            EffectKind::WhiteSegments => "Eight segment level meter in white",
            EffectKind::WhiteArrow => "White arrow fired on each beat",
            EffectKind::WhiteMarquee => "Slow moving white window",
        }
    }

    pub fn info(self) -> EffectInfo {
        EffectInfo {
            name: self.as_str(),
            capability: self.capability(),
            description: self.description(),
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EffectKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EffectKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownEffect(s.to_string()))
    }
}

/// Catalog metadata served by the API
#[derive(Debug, Clone, Serialize)]
pub struct EffectInfo {
    pub name: &'static str,
    pub capability: Capability,
    pub description: &'static str,
}

/// Everything an effect sees for one tick
#[derive(Debug, Clone, Copy)]
pub struct RenderInput<'a> {
    pub snapshot: &'a SpectrumSnapshot,
    /// Time since the effect was activated
    pub elapsed: Duration,
    /// Time since the previous tick
    pub dt: Duration,
    pub config: &'a EffectsConfig,
    pub num_leds: usize,
    pub rgbw: bool,
}

impl RenderInput<'_> {
    /// Elapsed time in reference frames
    pub fn frames(&self) -> f32 {
        self.elapsed.as_secs_f32() * REFERENCE_FPS
    }

    /// This tick's length in reference frames
    pub fn step(&self) -> f32 {
        self.dt.as_secs_f32() * REFERENCE_FPS
    }

    /// Per-frame fade `base` adjusted to this tick's length
    pub fn fade(&self, base: f32) -> f32 {
        base.powf(self.step())
    }

    pub fn beat(&self) -> bool {
        self.snapshot.peak
    }

    pub fn volume(&self) -> f32 {
        self.snapshot.volume
    }
}

/// A stateful renderer for one catalog entry
pub trait Effect: Send {
    fn kind(&self) -> EffectKind;

    /// Drop all simulation state and size it for `num_leds`
    fn reset(&mut self, num_leds: usize);

    /// Produce exactly `input.num_leds` pixels
    fn render(&mut self, input: &RenderInput<'_>) -> Framebuffer;
}

/// Build the implementation for `kind`
///
/// `seed` drives every random choice the effect makes.
pub fn create(kind: EffectKind, seed: u64) -> Box<dyn Effect> {
    match kind {
        EffectKind::Off => Box::new(basic::Off),
        EffectKind::Rainbow => Box::new(basic::Rainbow),
        EffectKind::SpectrumBars => Box::new(spectrum::SpectrumBars),
        EffectKind::VuMeter => Box::new(spectrum::VuMeter),
        EffectKind::RainbowSpectrum => Box::new(spectrum::RainbowSpectrum),
        EffectKind::Fire => Box::new(particles::Fire::new(seed)),
        EffectKind::FrequencyWave => Box::new(spectrum::FrequencyWave::new()),
        EffectKind::Blurz => Box::new(spectrum::Blurz::new()),
        EffectKind::Pixels => Box::new(particles::Pixels::new(seed)),
        EffectKind::Puddles => Box::new(particles::Puddles::new(seed)),
        EffectKind::Ripple => Box::new(particles::Ripple::new()),
        EffectKind::ColorWave => Box::new(spectrum::ColorWave::new()),
        EffectKind::Waterfall => Box::new(spectrum::Waterfall::new()),
        EffectKind::BeatPulse => Box::new(spectrum::BeatPulse::new()),
        EffectKind::WhiteSegments => Box::new(white::WhiteSegments),
        EffectKind::WhiteArrow => Box::new(white::WhiteArrow::new()),
        EffectKind::WhiteMarquee => Box::new(white::WhiteMarquee),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn snapshot(level: f32, peak: bool) -> SpectrumSnapshot {
        SpectrumSnapshot {
            bands: vec![level; 16],
            volume: level,
            peak,
            gain: 1.0,
            audio_active: true,
            ..Default::default()
        }
    }

    pub fn input<'a>(
        snapshot: &'a SpectrumSnapshot,
        config: &'a EffectsConfig,
        num_leds: usize,
        elapsed_ms: u64,
    ) -> RenderInput<'a> {
        RenderInput {
            snapshot,
            elapsed: Duration::from_millis(elapsed_ms),
            dt: Duration::from_millis(16),
            config,
            num_leds,
            rgbw: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_order_and_names() {
        let names: Vec<&str> = EffectKind::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(names.len(), 17);
        assert_eq!(names[0], "off");
        assert_eq!(names[1], "rainbow");
        assert_eq!(names[16], "white_marquee");
        for (i, kind) in EffectKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
            assert_eq!(kind.as_str().parse::<EffectKind>().unwrap(), *kind);
        }
    }

    #[test]
    fn test_capabilities() {
        assert!(!EffectKind::Off.needs_audio());
        assert!(!EffectKind::Rainbow.needs_audio());
        assert!(EffectKind::Fire.needs_audio());
        assert_eq!(EffectKind::WhiteArrow.capability(), Capability::WhiteOnly);
        assert_eq!(EffectKind::BeatPulse.capability(), Capability::NeedsAudio);
    }

    #[test]
    fn test_unknown_name() {
        assert!(matches!(
            "strobe".parse::<EffectKind>(),
            Err(ConfigError::UnknownEffect(_))
        ));
    }

    #[test]
    fn test_every_effect_renders_exact_length() {
        let config = EffectsConfig::default();
        let snap = test_support::snapshot(0.8, true);
        for kind in EffectKind::ALL {
            for n in [1, 7, 60, 300] {
                let mut effect = create(kind, 7);
                effect.reset(n);
                for tick in 0..5 {
                    let input = test_support::input(&snap, &config, n, tick * 16);
                    assert_eq!(effect.render(&input).len(), n, "{} at {} leds", kind, n);
                }
            }
        }
    }
}
