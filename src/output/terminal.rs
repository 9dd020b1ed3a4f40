//! Terminal LED emulator
//!
//! Draws each frame as true-colour block characters. The strip is redrawn
//! in place from the top-left corner every frame.

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use std::io::{self, Stdout, Write};

use super::OutputSink;
use crate::config::DisplayMode;
use crate::effects::{Framebuffer, Pixel};
use crate::error::OutputError;

const BLOCK: &str = "█";

/// Emulates the strip in a terminal
pub struct TerminalSink<W: Write + Send = Stdout> {
    out: W,
    mode: DisplayMode,
    grid_width: usize,
    brightness: u8,
    started: bool,
}

impl TerminalSink<Stdout> {
    pub fn stdout(mode: DisplayMode, grid_width: usize, brightness: u8) -> Self {
        Self::new(io::stdout(), mode, grid_width, brightness)
    }
}

impl<W: Write + Send> TerminalSink<W> {
    pub fn new(out: W, mode: DisplayMode, grid_width: usize, brightness: u8) -> Self {
        Self {
            out,
            mode,
            grid_width: grid_width.max(1),
            brightness,
            started: false,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    /// Colour the terminal shows for `pixel`; white blends into RGB
    fn display_color(&self, pixel: Pixel) -> Color {
        let p = pixel.scaled(self.brightness as f32 / 255.0);
        Color::Rgb {
            r: p.r.max(p.w),
            g: p.g.max(p.w),
            b: p.b.max(p.w),
        }
    }

    fn draw(&mut self, frame: &Framebuffer) -> io::Result<()> {
        if !self.started {
            queue!(self.out, Hide, Clear(ClearType::All))?;
            self.started = true;
        }
        queue!(self.out, MoveTo(0, 0))?;

        let per_row = match self.mode {
            DisplayMode::Horizontal => frame.len().max(1),
            DisplayMode::Vertical => 1,
            DisplayMode::Grid => self.grid_width,
        };

        for (row, chunk) in frame.pixels().chunks(per_row).enumerate() {
            if row > 0 {
                queue!(self.out, Print("\r\n"))?;
            }
            for pixel in chunk {
                let color = self.display_color(*pixel);
                queue!(self.out, SetForegroundColor(color), Print(BLOCK))?;
            }
        }
        queue!(self.out, ResetColor)?;
        self.out.flush()
    }
}

fn write_failed(e: io::Error) -> OutputError {
    OutputError::WriteFailed(e.to_string())
}

impl<W: Write + Send> OutputSink for TerminalSink<W> {
    fn show(&mut self, frame: &Framebuffer) -> Result<(), OutputError> {
        self.draw(frame).map_err(write_failed)
    }

    fn clear(&mut self) -> Result<(), OutputError> {
        queue!(self.out, ResetColor, Clear(ClearType::All), MoveTo(0, 0))
            .and_then(|_| self.out.flush())
            .map_err(write_failed)
    }

    fn name(&self) -> &'static str {
        "terminal"
    }

    fn set_brightness(&mut self, brightness: u8) {
        self.brightness = brightness;
    }
}

impl<W: Write + Send> Drop for TerminalSink<W> {
    fn drop(&mut self) {
        if self.started {
            let _ = queue!(self.out, ResetColor, Show, Print("\r\n"));
            let _ = self.out.flush();
        }
    }
}
