//! Effect activation and per-tick rendering
//!
//! The renderer owns the registry, the activation clock and fault
//! isolation: a panicking or misbehaving effect costs one blank frame.

use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::audio::SpectrumSnapshot;
use crate::config::EffectsConfig;
use crate::constants::MAX_TICK_STEP_MS;
use crate::effects::{EffectKind, EffectRegistry, Framebuffer, RenderInput};

const MAX_TICK_STEP: Duration = Duration::from_millis(MAX_TICK_STEP_MS);

/// Drives the active effect
pub struct Renderer {
    registry: EffectRegistry,
    active: EffectKind,
    generation: u64,
    elapsed: Duration,
    last_tick: Option<Instant>,
    num_leds: usize,
    faults: u64,
}

impl Renderer {
    pub fn new(mut registry: EffectRegistry, initial: EffectKind, num_leds: usize) -> Self {
        registry.get_mut(initial).reset(num_leds);
        Self {
            registry,
            active: initial,
            generation: 0,
            elapsed: Duration::ZERO,
            last_tick: None,
            num_leds,
            faults: 0,
        }
    }

    pub fn active(&self) -> EffectKind {
        self.active
    }

    /// Time since the active effect was (re)activated
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Render faults caught so far
    pub fn faults(&self) -> u64 {
        self.faults
    }

    pub fn registry_mut(&mut self) -> &mut EffectRegistry {
        &mut self.registry
    }

    /// Switch to `kind`, resetting its state even when it is already active
    pub fn activate(&mut self, kind: EffectKind) {
        if kind != self.active {
            tracing::info!("Effect: {} -> {}", self.active, kind);
        }
        self.active = kind;
        self.elapsed = Duration::ZERO;
        self.registry.get_mut(kind).reset(self.num_leds);
    }

    /// Follow the playback selection
    ///
    /// `generation` changes on every selection, so re-selecting the active
    /// effect still resets it. Unknown names keep the current effect.
    pub fn sync(&mut self, name: &str, generation: u64) {
        if generation == self.generation && name == self.active.as_str() {
            return;
        }
        self.generation = generation;
        match EffectKind::from_str(name) {
            Ok(kind) => self.activate(kind),
            Err(_) => tracing::warn!("Unknown effect '{}', keeping {}", name, self.active),
        }
    }

    /// Render one tick
    pub fn render(
        &mut self,
        now: Instant,
        snapshot: &SpectrumSnapshot,
        config: &EffectsConfig,
        num_leds: usize,
        rgbw: bool,
    ) -> Framebuffer {
        let dt = self
            .last_tick
            .map(|t| now.saturating_duration_since(t).min(MAX_TICK_STEP))
            .unwrap_or_default();
        self.last_tick = Some(now);
        self.elapsed += dt;

        if num_leds != self.num_leds {
            tracing::info!("LED count changed {} -> {}", self.num_leds, num_leds);
            self.num_leds = num_leds;
            self.registry.get_mut(self.active).reset(num_leds);
        }

        // Audio effects stay dark until the stream comes back
        if self.active.needs_audio() && !snapshot.audio_active {
            return Framebuffer::new(num_leds);
        }

        let input = RenderInput {
            snapshot,
            elapsed: self.elapsed,
            dt,
            config,
            num_leds,
            rgbw,
        };

        let effect = self.registry.get_mut(self.active);
        let result = panic::catch_unwind(AssertUnwindSafe(|| effect.render(&input)));

        match result {
            Ok(frame) if frame.len() == num_leds => frame,
            Ok(frame) => {
                tracing::error!(
                    "Effect {} produced {} pixels, expected {}",
                    self.active,
                    frame.len(),
                    num_leds
                );
                self.recover()
            }
            Err(payload) => {
                tracing::error!("Effect {} panicked: {}", self.active, panic_message(&*payload));
                self.recover()
            }
        }
    }

    fn recover(&mut self) -> Framebuffer {
        self.faults += 1;
        self.registry.get_mut(self.active).reset(self.num_leds);
        Framebuffer::new(self.num_leds)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{Effect, Pixel};

    struct Exploding {
        calls: u32,
    }

    impl Effect for Exploding {
        fn kind(&self) -> EffectKind {
            EffectKind::Fire
        }

        fn reset(&mut self, _num_leds: usize) {}

        fn render(&mut self, input: &RenderInput<'_>) -> Framebuffer {
            self.calls += 1;
            if self.calls == 1 {
                panic!("boom");
            }
            let mut fb = Framebuffer::new(input.num_leds);
            fb.fill(Pixel::rgb(1, 2, 3));
            fb
        }
    }

    struct Short;

    impl Effect for Short {
        fn kind(&self) -> EffectKind {
            EffectKind::Blurz
        }
        fn reset(&mut self, _num_leds: usize) {}
        fn render(&mut self, _input: &RenderInput<'_>) -> Framebuffer {
            Framebuffer::new(1)
        }
    }

    fn live() -> SpectrumSnapshot {
        SpectrumSnapshot {
            bands: vec![0.6; 16],
            volume: 0.6,
            audio_active: true,
            ..SpectrumSnapshot::silent(16)
        }
    }

    fn renderer(initial: EffectKind) -> Renderer {
        Renderer::new(EffectRegistry::new(1), initial, 10)
    }

    #[test]
    fn test_panicking_effect_yields_blank_frame_then_recovers() {
        let mut registry = EffectRegistry::new(1);
        registry.insert(Box::new(Exploding { calls: 0 }));
        let mut r = Renderer::new(registry, EffectKind::Fire, 10);
        let snap = live();
        let cfg = EffectsConfig::default();
        let t0 = Instant::now();

        let first = r.render(t0, &snap, &cfg, 10, false);
        assert!(first.is_dark());
        assert_eq!(first.len(), 10);
        assert_eq!(r.faults(), 1);

        let second = r.render(t0 + Duration::from_millis(16), &snap, &cfg, 10, false);
        assert_eq!(second.get(0), Some(Pixel::rgb(1, 2, 3)));
    }

    #[test]
    fn test_wrong_length_is_a_fault() {
        let mut registry = EffectRegistry::new(1);
        registry.insert(Box::new(Short));
        let mut r = Renderer::new(registry, EffectKind::Blurz, 10);
        let snap = live();

        let frame = r.render(Instant::now(), &snap, &EffectsConfig::default(), 10, false);
        assert_eq!(frame.len(), 10);
        assert_eq!(r.faults(), 1);
    }

    #[test]
    fn test_audio_effects_go_dark_on_silence() {
        let cfg = EffectsConfig::default();
        let silent = SpectrumSnapshot::silent(16);
        let loud = live();

        for kind in EffectKind::ALL.into_iter().filter(|k| k.needs_audio()) {
            let mut r = renderer(kind);
            let t0 = Instant::now();
            for i in 0..30u64 {
                r.render(t0 + Duration::from_millis(16 * i), &loud, &cfg, 10, false);
            }
            for i in 30..80u64 {
                let frame = r.render(t0 + Duration::from_millis(16 * i), &silent, &cfg, 10, false);
                assert!(frame.is_dark(), "{kind} lit while silent");
            }
            assert!(r.elapsed() >= Duration::from_millis(16 * 79), "{kind} clock stalled");
        }

        let mut r = renderer(EffectKind::Rainbow);
        let frame = r.render(Instant::now(), &silent, &cfg, 10, false);
        assert!(!frame.is_dark());
    }

    #[test]
    fn test_activation_clock_caps_large_gaps() {
        let mut r = renderer(EffectKind::Rainbow);
        let snap = SpectrumSnapshot::silent(16);
        let cfg = EffectsConfig::default();
        let t0 = Instant::now();

        r.render(t0, &snap, &cfg, 10, false);
        r.render(t0 + Duration::from_millis(20), &snap, &cfg, 10, false);
        r.render(t0 + Duration::from_secs(30), &snap, &cfg, 10, false);
        assert_eq!(r.elapsed(), Duration::from_millis(120));
    }

    #[test]
    fn test_unknown_effect_keeps_current() {
        let mut r = renderer(EffectKind::Ripple);
        r.sync("strobe", 1);
        assert_eq!(r.active(), EffectKind::Ripple);
        r.sync("fire", 2);
        assert_eq!(r.active(), EffectKind::Fire);
    }

    #[test]
    fn test_reselect_resets_clock() {
        let mut r = renderer(EffectKind::Rainbow);
        let snap = SpectrumSnapshot::silent(16);
        let cfg = EffectsConfig::default();
        let t0 = Instant::now();
        r.render(t0, &snap, &cfg, 10, false);
        r.render(t0 + Duration::from_millis(50), &snap, &cfg, 10, false);
        assert!(r.elapsed() > Duration::ZERO);

        // Same name, same generation: nothing happens
        r.sync("rainbow", 0);
        assert!(r.elapsed() > Duration::ZERO);

        r.sync("rainbow", 1);
        assert_eq!(r.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_switch_resets_fire_heat() {
        let mut r = renderer(EffectKind::Fire);
        let beat = crate::effects::test_support::snapshot(1.0, true);
        let cfg = EffectsConfig::default();
        let t0 = Instant::now();
        for i in 0..10 {
            r.render(t0 + Duration::from_millis(i * 16), &beat, &cfg, 10, false);
        }
        r.sync("off", 1);
        r.sync("fire", 2);

        let quiet = SpectrumSnapshot::silent(16);
        let frame = r.render(t0 + Duration::from_millis(200), &quiet, &cfg, 10, false);
        assert!(frame.is_dark());
    }
}
