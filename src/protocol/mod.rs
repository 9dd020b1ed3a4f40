//! Audio sync wire protocols
//!
//! Every supported sender format is a [`PacketParser`]; the
//! [`PacketDecoder`] picks the ordered set of parsers for the configured
//! [`PacketFormat`] and turns datagrams into normalized [`AudioFrame`]s.

pub mod decoder;
pub mod eqstreamer;
pub mod wled;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use crate::error::ProtocolError;

pub use decoder::{DecoderStats, PacketDecoder};
pub use eqstreamer::EqStreamerParser;
pub use wled::{WledV1Parser, WledV2Parser};

/// Wire format a frame was decoded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    EqStreamer,
    WledV1,
    WledV2,
}

impl AudioFormat {
    /// Number of bands every frame of this format carries
    pub fn band_count(self) -> usize {
        match self {
            AudioFormat::EqStreamer => crate::constants::EQSTREAMER_BANDS,
            AudioFormat::WledV1 | AudioFormat::WledV2 => crate::constants::WLED_BANDS,
        }
    }
}

/// Decoder mode selected by `network.audio_format`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketFormat {
    #[default]
    Auto,
    Wled,
    EqStreamer,
}

impl fmt::Display for PacketFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PacketFormat::Auto => "auto",
            PacketFormat::Wled => "wled",
            PacketFormat::EqStreamer => "eqstreamer",
        })
    }
}

impl FromStr for PacketFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(PacketFormat::Auto),
            "wled" => Ok(PacketFormat::Wled),
            "eqstreamer" => Ok(PacketFormat::EqStreamer),
            other => Err(format!("unknown audio format '{other}' (auto, wled, eqstreamer)")),
        }
    }
}

/// One decoded datagram
///
/// Amplitudes and `volume` are normalized to `[0, 1]`.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub format: AudioFormat,
    pub bands: Vec<f32>,
    pub volume: f32,
    /// Beat/peak detected by the sender
    pub peak: bool,
    /// Dominant frequency in Hz, when the format carries it
    pub major_peak_hz: f32,
    /// Raw FFT magnitude, when the format carries it
    pub magnitude: f32,
    pub received_at: Instant,
}

impl AudioFrame {
    pub fn band_count(&self) -> usize {
        self.bands.len()
    }
}

/// A wire format recognizer and parser
///
/// `matches` is the cheap detection used in auto mode; `parse` does the
/// full validation and may still reject a packet that matched.
pub trait PacketParser: Send + Sync {
    fn format(&self) -> AudioFormat;

    fn matches(&self, data: &[u8]) -> bool;

    fn parse(&self, data: &[u8], received_at: Instant) -> Result<AudioFrame, ProtocolError>;
}

/// Map a byte level (0..=255) to `[0, 1]`
pub(crate) fn normalize_u8(value: u8) -> f32 {
    value as f32 / 255.0
}

/// Map a sender level on the 0..=255 scale to `[0, 1]`, dropping NaN/inf
pub(crate) fn normalize_level(value: f64) -> f32 {
    if value.is_finite() {
        (value / 255.0).clamp(0.0, 1.0) as f32
    } else {
        0.0
    }
}

pub(crate) fn finite_or_zero(value: f64) -> f32 {
    if value.is_finite() {
        value as f32
    } else {
        0.0
    }
}

pub(crate) fn check_len(data: &[u8], expected: usize) -> Result<(), ProtocolError> {
    if data.len() < expected {
        Err(ProtocolError::TooShort {
            expected,
            actual: data.len(),
        })
    } else {
        Ok(())
    }
}
