//! White-only effects
//!
//! These write the dedicated white channel on RGBW strips and equal RGB
//! everywhere else.

use std::time::Duration;

use super::color::Pixel;
use super::spectrum::{segment_layout, segment_levels};
use super::{Effect, EffectKind, Framebuffer, RenderInput};

/// Eight segment level meter in white
pub struct WhiteSegments;

impl Effect for WhiteSegments {
    fn kind(&self) -> EffectKind {
        EffectKind::WhiteSegments
    }

    fn reset(&mut self, _num_leds: usize) {}

    fn render(&mut self, input: &RenderInput<'_>) -> Framebuffer {
        let n = input.num_leds;
        let (count, per) = segment_layout(n);
        let levels = segment_levels(input.snapshot);

        let mut fb = Framebuffer::new(n);
        for (seg, level) in levels.iter().take(count).enumerate() {
            let start = seg * per;
            let lit = ((level * per as f32) as usize).min(per);
            let color = Pixel::white(*level, input.rgbw);
            for i in start..start + lit {
                fb.set(i, color);
            }
        }
        fb
    }
}

/// Arrows fired from the start of the strip on each beat
pub struct WhiteArrow {
    heads: Vec<f32>,
    last_fired: Option<Duration>,
}

impl WhiteArrow {
    const MAX_ARROWS: usize = 16;

    pub fn new() -> Self {
        Self {
            heads: Vec::new(),
            last_fired: None,
        }
    }

    pub fn arrow_count(&self) -> usize {
        self.heads.len()
    }
}

impl Default for WhiteArrow {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for WhiteArrow {
    fn kind(&self) -> EffectKind {
        EffectKind::WhiteArrow
    }

    fn reset(&mut self, _num_leds: usize) {
        self.heads.clear();
        self.last_fired = None;
    }

    fn render(&mut self, input: &RenderInput<'_>) -> Framebuffer {
        let n = input.num_leds;
        let cfg = &input.config.white_arrow;
        let length = cfg.length.max(1);

        let interval = Duration::from_secs_f32(cfg.min_interval.max(0.0));
        let ready = self
            .last_fired
            .map_or(true, |t| input.elapsed.saturating_sub(t) >= interval);
        if input.beat() && ready && self.heads.len() < Self::MAX_ARROWS {
            self.heads.push(0.0);
            self.last_fired = Some(input.elapsed);
        }

        let advance = cfg.speed * input.step();
        let mut fb = Framebuffer::new(n);
        self.heads.retain_mut(|pos| {
            *pos += advance;
            let head = *pos as usize;
            let tail_start = head.saturating_sub(length);
            for i in tail_start..=head.min(n.saturating_sub(1)) {
                let d = (head - i) as f32 / length as f32;
                let level = (1.0 - d).powi(2);
                fb.set(i, Pixel::white(level, input.rgbw));
            }
            *pos < (n + length) as f32
        });
        fb
    }
}

/// Slow white window wrapping along the strip
pub struct WhiteMarquee;

impl Effect for WhiteMarquee {
    fn kind(&self) -> EffectKind {
        EffectKind::WhiteMarquee
    }

    fn reset(&mut self, _num_leds: usize) {}

    fn render(&mut self, input: &RenderInput<'_>) -> Framebuffer {
        let n = input.num_leds;
        let cfg = &input.config.white_marquee;
        let length = cfg.length.max(1) as f32;
        let pos = (input.frames() * cfg.speed) % (n as f32 + length);

        let mut fb = Framebuffer::new(n);
        for (i, pixel) in fb.pixels_mut().iter_mut().enumerate() {
            let d = (i as f32 - pos).abs();
            if d <= length {
                let level = (1.0 - d / length).powi(2);
                *pixel = Pixel::white(level, input.rgbw);
            }
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
    fn test_white_segments_use_w_channel_on_rgbw() {
        let config = EffectsConfig::default();
        let snap = snapshot(1.0, false);
        let mut rgbw = input(&snap, &config, 16, 0);
        rgbw.rgbw = true;

        let fb = WhiteSegments.render(&rgbw);
        assert!(fb.pixels().iter().all(|p| p.w == 255 && p.r == 0));

        let fb = WhiteSegments.render(&input(&snap, &config, 16, 0));
        assert!(fb.pixels().iter().all(|p| p.r == 255 && p.g == 255 && p.b == 255 && p.w == 0));
    }

    #[test]
    fn test_white_arrow_respects_min_interval() {
        let config = EffectsConfig::default();
        let beat = snapshot(1.0, true);
        let mut arrow = WhiteArrow::new();
        arrow.reset(100);

        arrow.render(&input(&beat, &config, 100, 0));
        arrow.render(&input(&beat, &config, 100, 100));
        assert_eq!(arrow.arrow_count(), 1);

        arrow.render(&input(&beat, &config, 100, 450));
        assert_eq!(arrow.arrow_count(), 2);
    }

    #[test]
    fn test_white_arrow_leaves_the_strip() {
        let config = EffectsConfig::default();
        let mut arrow = WhiteArrow::new();
        arrow.reset(20);
        arrow.render(&input(&snapshot(1.0, true), &config, 20, 0));

        let quiet = snapshot(0.0, false);
        let mut fb = Framebuffer::default();
        for tick in 1..40 {
            fb = arrow.render(&input(&quiet, &config, 20, tick * 16));
        }
        assert_eq!(arrow.arrow_count(), 0);
        assert!(fb.is_dark());
    }

    #[test]
    fn test_marquee_moves() {
        let config = EffectsConfig::default();
        let snap = snapshot(0.0, false);
        let a = WhiteMarquee.render(&input(&snap, &config, 50, 0));
        let b = WhiteMarquee.render(&input(&snap, &config, 50, 2_000));
        assert_ne!(a, b);
        assert_eq!(a.get(0), Some(Pixel::white(1.0, false)));
    }
}
