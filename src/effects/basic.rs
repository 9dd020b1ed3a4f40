//! Effects that ignore audio

use super::color::wheel;
use super::{Effect, EffectKind, Framebuffer, RenderInput};

/// All pixels dark
pub struct Off;

impl Effect for Off {
    fn kind(&self) -> EffectKind {
        EffectKind::Off
    }

    fn reset(&mut self, _num_leds: usize) {}

    fn render(&mut self, input: &RenderInput<'_>) -> Framebuffer {
        Framebuffer::new(input.num_leds)
    }
}

/// Colour wheel spread over the strip, one step every `speed` ms
pub struct Rainbow;

impl Rainbow {
    fn offset(input: &RenderInput<'_>) -> usize {
        let speed = input.config.rainbow.speed.max(1) as u128;
        ((input.elapsed.as_millis() / speed) % 256) as usize
    }
}

impl Effect for Rainbow {
    fn kind(&self) -> EffectKind {
        EffectKind::Rainbow
    }

    fn reset(&mut self, _num_leds: usize) {}

    fn render(&mut self, input: &RenderInput<'_>) -> Framebuffer {
        let n = input.num_leds;
        let brightness = input.config.rainbow.brightness as f32 / 255.0;
        let offset = Self::offset(input);

        let mut fb = Framebuffer::new(n);
        for (i, pixel) in fb.pixels_mut().iter_mut().enumerate() {
            let pos = (i * 256 / n.max(1) + offset) & 255;
            *pixel = wheel(pos as u8, brightness);
        }
        fb
    }
}
