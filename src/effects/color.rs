//! Pixels, framebuffers and colour math

use serde::Serialize;

/// One RGBW pixel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Pixel {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub w: u8,
}

impl Pixel {
    pub const BLACK: Pixel = Pixel { r: 0, g: 0, b: 0, w: 0 };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, w: 0 }
    }

    /// Build from unit floats, clamping each channel
    pub fn from_unit(r: f32, g: f32, b: f32) -> Self {
        Self::rgb(to_channel(r), to_channel(g), to_channel(b))
    }

    /// White at `level` in `[0, 1]`: the dedicated channel on RGBW strips,
    /// equal RGB otherwise
    pub fn white(level: f32, rgbw: bool) -> Self {
        let v = to_channel(level);
        if rgbw {
            Self { r: 0, g: 0, b: 0, w: v }
        } else {
            Self::rgb(v, v, v)
        }
    }

    /// Multiply every channel, truncating like integer LED math does
    pub fn scaled(self, factor: f32) -> Self {
        let f = factor.clamp(0.0, 1.0);
        let scale = |c: u8| (c as f32 * f) as u8;
        Self {
            r: scale(self.r),
            g: scale(self.g),
            b: scale(self.b),
            w: scale(self.w),
        }
    }

    pub fn is_black(&self) -> bool {
        *self == Self::BLACK
    }
}

/// Unit float to channel value, NaN maps to 0
#[inline]
pub fn to_channel(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    (value * 255.0).clamp(0.0, 255.0) as u8
}

/// HSV to RGB with hue in degrees and saturation/value in `[0, 1]`
pub fn hsv(hue: f32, saturation: f32, value: f32) -> Pixel {
    let h = hue.rem_euclid(360.0) / 360.0;
    let s = saturation.clamp(0.0, 1.0);
    let v = value.clamp(0.0, 1.0);

    let c = v * s;
    let x = c * (1.0 - ((h * 6.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = match (h * 6.0) as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    Pixel::from_unit(r + m, g + m, b + m)
}

/// Classic 0..=255 colour wheel, scaled by `brightness`
pub fn wheel(pos: u8, brightness: f32) -> Pixel {
    let f = brightness.clamp(0.0, 1.0);
    let ch = |v: u32| (v as f32 * f) as u8;
    let pos = pos as u32;
    if pos < 85 {
        Pixel::rgb(ch(pos * 3), ch(255 - pos * 3), 0)
    } else if pos < 170 {
        let p = pos - 85;
        Pixel::rgb(ch(255 - p * 3), 0, ch(p * 3))
    } else {
        let p = pos - 170;
        Pixel::rgb(0, ch(p * 3), ch(255 - p * 3))
    }
}

/// Fire2012 heat palette: black, red, yellow, white
pub fn heat_color(heat: u8) -> Pixel {
    let t192 = ((heat as u16 * 191) / 255) as u8;
    let ramp = (t192 & 0x3F) << 2;
    if t192 > 0x80 {
        Pixel::rgb(255, 255, ramp)
    } else if t192 > 0x40 {
        Pixel::rgb(255, ramp, 0)
    } else {
        Pixel::rgb(ramp, 0, 0)
    }
}

/// One tick's worth of pixels
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Framebuffer {
    pixels: Vec<Pixel>,
}

impl Framebuffer {
    /// All-off buffer of `len` pixels
    pub fn new(len: usize) -> Self {
        Self {
            pixels: vec![Pixel::BLACK; len],
        }
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn pixels(&self) -> &[Pixel] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [Pixel] {
        &mut self.pixels
    }

    pub fn get(&self, index: usize) -> Option<Pixel> {
        self.pixels.get(index).copied()
    }

    /// Set a pixel; out-of-range indices are ignored
    pub fn set(&mut self, index: usize, pixel: Pixel) {
        if let Some(p) = self.pixels.get_mut(index) {
            *p = pixel;
        }
    }

    pub fn fill(&mut self, pixel: Pixel) {
        self.pixels.iter_mut().for_each(|p| *p = pixel);
    }

    pub fn clear(&mut self) {
        self.fill(Pixel::BLACK);
    }

    /// Scale every pixel by `factor`
    pub fn fade(&mut self, factor: f32) {
        self.pixels.iter_mut().for_each(|p| *p = p.scaled(factor));
    }

    /// Move every pixel one step toward the end, `head` enters at index 0
    pub fn shift_in(&mut self, head: Pixel) {
        if self.pixels.is_empty() {
            return;
        }
        self.pixels.rotate_right(1);
        self.pixels[0] = head;
    }

    /// Resize to `len`, keeping existing pixels
    pub fn resize(&mut self, len: usize) {
        self.pixels.resize(len, Pixel::BLACK);
    }

    pub fn is_dark(&self) -> bool {
        self.pixels.iter().all(Pixel::is_black)
    }
}

impl From<Vec<Pixel>> for Framebuffer {
    fn from(pixels: Vec<Pixel>) -> Self {
        Self { pixels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hsv_primaries() {
        assert_eq!(hsv(0.0, 1.0, 1.0), Pixel::rgb(255, 0, 0));
        assert_eq!(hsv(120.0, 1.0, 1.0), Pixel::rgb(0, 255, 0));
        assert_eq!(hsv(240.0, 1.0, 1.0), Pixel::rgb(0, 0, 255));
        assert_eq!(hsv(360.0, 1.0, 1.0), Pixel::rgb(255, 0, 0));
        assert_eq!(hsv(200.0, 0.5, 0.0), Pixel::BLACK);
    }

    #[test]
    fn test_hsv_clamps_out_of_range() {
        assert_eq!(hsv(-120.0, 2.0, 5.0), hsv(240.0, 1.0, 1.0));
        assert_eq!(hsv(f32::NAN, 1.0, 1.0).w, 0);
    }

    #[test]
    fn test_wheel_brightness() {
        assert_eq!(wheel(0, 1.0), Pixel::rgb(0, 255, 0));
        assert_eq!(wheel(85, 1.0), Pixel::rgb(255, 0, 0));
        assert_eq!(wheel(170, 1.0), Pixel::rgb(0, 0, 255));
        assert_eq!(wheel(85, 0.0), Pixel::BLACK);
    }

    #[test]
    fn test_white_channel_selection() {
        assert_eq!(Pixel::white(1.0, true), Pixel { r: 0, g: 0, b: 0, w: 255 });
        assert_eq!(Pixel::white(1.0, false), Pixel::rgb(255, 255, 255));
    }

    #[test]
    fn test_heat_color_ramp() {
        assert_eq!(heat_color(0), Pixel::BLACK);
        let hot = heat_color(255);
        assert_eq!((hot.r, hot.g), (255, 255));
    }

    #[test]
    fn test_framebuffer_shift_and_fade() {
        let mut fb = Framebuffer::new(3);
        fb.shift_in(Pixel::rgb(200, 100, 50));
        fb.shift_in(Pixel::rgb(10, 10, 10));
        assert_eq!(fb.get(0), Some(Pixel::rgb(10, 10, 10)));
        assert_eq!(fb.get(1), Some(Pixel::rgb(200, 100, 50)));

        fb.fade(0.5);
        assert_eq!(fb.get(1), Some(Pixel::rgb(100, 50, 25)));

        fb.set(99, Pixel::rgb(1, 1, 1));
        assert_eq!(fb.len(), 3);
    }
}
