//! EQ Streamer packets
//!
//! Layout: `'E' 'Q' version` followed by 32 unsigned band levels.

use std::time::Instant;

use super::{check_len, normalize_u8, AudioFormat, AudioFrame, PacketParser};
use crate::constants::EQSTREAMER_BANDS;
use crate::error::ProtocolError;

const MAGIC: &[u8; 2] = b"EQ";
const HEADER_LEN: usize = 3;
pub const PACKET_LEN: usize = HEADER_LEN + EQSTREAMER_BANDS;

/// Bass is the first five bands; a mean above this counts as a beat
const BASS_BANDS: usize = 5;
const BEAT_THRESHOLD: f32 = 150.0 / 255.0;

/// Parser for the 32-band EQ Streamer format
#[derive(Debug, Default, Clone, Copy)]
pub struct EqStreamerParser;

impl PacketParser for EqStreamerParser {
    fn format(&self) -> AudioFormat {
        AudioFormat::EqStreamer
    }

    fn matches(&self, data: &[u8]) -> bool {
        data.starts_with(MAGIC)
    }

    fn parse(&self, data: &[u8], received_at: Instant) -> Result<AudioFrame, ProtocolError> {
        if !self.matches(data) {
            return Err(ProtocolError::BadMagic);
        }
        check_len(data, PACKET_LEN)?;

        let bands: Vec<f32> = data[HEADER_LEN..PACKET_LEN]
            .iter()
            .copied()
            .map(normalize_u8)
            .collect();

        let volume = bands.iter().sum::<f32>() / bands.len() as f32;
        let bass = bands[..BASS_BANDS].iter().sum::<f32>() / BASS_BANDS as f32;
        let magnitude = bands.iter().copied().fold(0.0f32, f32::max);

        Ok(AudioFrame {
            format: AudioFormat::EqStreamer,
            bands,
            volume,
            peak: bass > BEAT_THRESHOLD,
            major_peak_hz: 0.0,
            magnitude,
            received_at,
        })
    }
}

/// Build a packet; used by tests and the bench
pub fn encode(version: u8, bands: &[u8; EQSTREAMER_BANDS]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(PACKET_LEN);
    packet.extend_from_slice(MAGIC);
    packet.push(version);
    packet.extend_from_slice(bands);
    packet
}
