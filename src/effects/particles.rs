//! Simulation effects with their own state and randomness

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

use super::color::{heat_color, hsv};
use super::{Effect, EffectKind, Framebuffer, RenderInput};
use crate::constants::FFT_BINS;

/// Fire2012-style heat grid
pub struct Fire {
    seed: u64,
    rng: StdRng,
    heat: Vec<u8>,
}

impl Fire {
    /// Sparks land within this many cells of the base
    const SPARK_ZONE: usize = 7;
    const BEAT_SPARKS: usize = 3;

    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
            heat: Vec::new(),
        }
    }

    pub fn heat(&self) -> &[u8] {
        &self.heat
    }

    fn spark(&mut self) {
        let zone = Self::SPARK_ZONE.min(self.heat.len());
        if zone == 0 {
            return;
        }
        let y = self.rng.random_range(0..zone);
        let add = self.rng.random_range(160..=255u8);
        self.heat[y] = self.heat[y].saturating_add(add);
    }
}

impl Effect for Fire {
    fn kind(&self) -> EffectKind {
        EffectKind::Fire
    }

    fn reset(&mut self, num_leds: usize) {
        self.rng = StdRng::seed_from_u64(self.seed);
        self.heat = vec![0; num_leds];
    }

    fn render(&mut self, input: &RenderInput<'_>) -> Framebuffer {
        let n = input.num_leds;
        self.heat.resize(n, 0);
        let cfg = &input.config.fire;

        let max_cool = (cfg.cooling as usize * 10) / n.max(1) + 2;
        for cell in self.heat.iter_mut() {
            let cool = self.rng.random_range(0..=max_cool.min(255)) as u8;
            *cell = cell.saturating_sub(cool);
        }

        for k in (2..n).rev() {
            let drift = (self.heat[k - 1] as u16 + 2 * self.heat[k - 2] as u16) / 3;
            self.heat[k] = drift as u8;
        }

        let bass = input.snapshot.mean(0..5, FFT_BINS);
        let chance = cfg.sparking as f32 * bass;
        if (self.rng.random_range(0..255u32) as f32) < chance {
            self.spark();
        }
        if input.beat() {
            for _ in 0..Self::BEAT_SPARKS {
                self.spark();
            }
        }

        self.heat.iter().map(|h| heat_color(*h)).collect::<Vec<_>>().into()
    }
}

/// Random pixels coloured from the recent volume history
pub struct Pixels {
    seed: u64,
    rng: StdRng,
    canvas: Framebuffer,
    history: VecDeque<f32>,
}

impl Pixels {
    const HISTORY: usize = 32;

    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
            canvas: Framebuffer::default(),
            history: VecDeque::with_capacity(Self::HISTORY),
        }
    }
}

impl Effect for Pixels {
    fn kind(&self) -> EffectKind {
        EffectKind::Pixels
    }

    fn reset(&mut self, num_leds: usize) {
        self.rng = StdRng::seed_from_u64(self.seed);
        self.canvas = Framebuffer::new(num_leds);
        self.history.clear();
    }

    fn render(&mut self, input: &RenderInput<'_>) -> Framebuffer {
        let n = input.num_leds;
        self.canvas.resize(n);
        self.canvas.fade(input.fade(0.75));

        let volume = input.volume();
        if self.history.len() == Self::HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(volume * 255.0);

        let count = (volume * 8.0) as usize + 1;
        for _ in 0..count {
            let pos = self.rng.random_range(0..n);
            let idx = self.rng.random_range(0..self.history.len());
            let hue = self.history[idx] + idx as f32 * 16.0;
            self.canvas.set(pos, hsv(hue, 1.0, volume * 1.5));
        }
        self.canvas.clone()
    }
}

/// Puddles of colour dropped whenever the volume crosses a threshold
pub struct Puddles {
    seed: u64,
    rng: StdRng,
    canvas: Framebuffer,
}

impl Puddles {
    const THRESHOLD: f32 = 50.0 / 255.0;

    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
            canvas: Framebuffer::default(),
        }
    }
}

impl Effect for Puddles {
    fn kind(&self) -> EffectKind {
        EffectKind::Puddles
    }

    fn reset(&mut self, num_leds: usize) {
        self.rng = StdRng::seed_from_u64(self.seed);
        self.canvas = Framebuffer::new(num_leds);
    }

    fn render(&mut self, input: &RenderInput<'_>) -> Framebuffer {
        let n = input.num_leds;
        self.canvas.resize(n);
        self.canvas.fade(input.fade(0.88));

        let volume = input.volume();
        if volume > Self::THRESHOLD {
            let pos = self.rng.random_range(0..n);
            let size = (volume * 8.0) as usize + 1;
            let color = hsv(input.frames() * 2.0, 1.0, 1.0);
            for i in pos..(pos + size).min(n) {
                self.canvas.set(i, color);
            }
        }
        self.canvas.clone()
    }
}

struct Ring {
    radius: f32,
    hue: f32,
    brightness: f32,
}

/// Rings expanding from the centre on each loud enough beat
pub struct Ripple {
    canvas: Framebuffer,
    rings: Vec<Ring>,
}

impl Ripple {
    const MAX_RINGS: usize = 32;
    const MIN_VOLUME: f32 = 0.15;
    const GROWTH: f32 = 0.5;

    pub fn new() -> Self {
        Self {
            canvas: Framebuffer::default(),
            rings: Vec::new(),
        }
    }

    pub fn ring_count(&self) -> usize {
        self.rings.len()
    }
}

impl Default for Ripple {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Ripple {
    fn kind(&self) -> EffectKind {
        EffectKind::Ripple
    }

    fn reset(&mut self, num_leds: usize) {
        self.canvas = Framebuffer::new(num_leds);
        self.rings.clear();
    }

    fn render(&mut self, input: &RenderInput<'_>) -> Framebuffer {
        let n = input.num_leds;
        self.canvas.resize(n);
        self.canvas.fade(input.fade(0.95));

        let volume = input.volume();
        if input.beat() && volume > Self::MIN_VOLUME && self.rings.len() < Self::MAX_RINGS {
            self.rings.push(Ring {
                radius: 0.0,
                hue: (input.frames() * 5.0) % 360.0,
                brightness: (volume * 1.5 + 0.3).min(1.0),
            });
        }

        let center = n / 2;
        let limit = (n / 2).max(1) as f32;
        let growth = Self::GROWTH * input.step();
        let canvas = &mut self.canvas;

        self.rings.retain_mut(|ring| {
            ring.radius += growth;
            if ring.radius >= limit {
                return false;
            }
            let decay = (ring.radius / limit).powf(0.7);
            let color = hsv(ring.hue, 1.0, ring.brightness * (1.0 - decay));
            let r = ring.radius as usize;
            if let Some(left) = center.checked_sub(r) {
                canvas.set(left, color);
            }
            canvas.set(center + r, color);
            true
        });
        self.canvas.clone()
    }
}
