//! Datagram decoder
//!
//! Selects a parser by mode (or by magic prefix in auto mode), counts
//! everything, and never surfaces an error to the receive loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use super::{
    AudioFormat, AudioFrame, EqStreamerParser, PacketFormat, PacketParser, WledV1Parser,
    WledV2Parser,
};
use crate::constants::MAX_PACKET_SIZE;
use crate::error::ProtocolError;

/// Packet decoder for one configured mode
pub struct PacketDecoder {
    mode: PacketFormat,
    parsers: Vec<Box<dyn PacketParser>>,
    packets_seen: AtomicU64,
    invalid_packets: AtomicU64,
    eqstreamer_frames: AtomicU64,
    wled_v1_frames: AtomicU64,
    wled_v2_frames: AtomicU64,
}

impl PacketDecoder {
    /// Create a decoder with the built-in parsers for `mode`
    pub fn new(mode: PacketFormat) -> Self {
        let parsers: Vec<Box<dyn PacketParser>> = match mode {
            PacketFormat::Auto => vec![
                Box::new(EqStreamerParser),
                Box::new(WledV2Parser),
                Box::new(WledV1Parser),
            ],
            PacketFormat::Wled => vec![Box::new(WledV2Parser), Box::new(WledV1Parser)],
            PacketFormat::EqStreamer => vec![Box::new(EqStreamerParser)],
        };
        Self::with_parsers(mode, parsers)
    }

    /// Create a decoder with a custom parser chain, tried in order
    pub fn with_parsers(mode: PacketFormat, parsers: Vec<Box<dyn PacketParser>>) -> Self {
        Self {
            mode,
            parsers,
            packets_seen: AtomicU64::new(0),
            invalid_packets: AtomicU64::new(0),
            eqstreamer_frames: AtomicU64::new(0),
            wled_v1_frames: AtomicU64::new(0),
            wled_v2_frames: AtomicU64::new(0),
        }
    }

    pub fn mode(&self) -> PacketFormat {
        self.mode
    }

    /// Decode one datagram; malformed input is counted and dropped
    pub fn decode(&self, data: &[u8]) -> Option<AudioFrame> {
        self.decode_at(data, Instant::now())
    }

    pub fn decode_at(&self, data: &[u8], received_at: Instant) -> Option<AudioFrame> {
        self.packets_seen.fetch_add(1, Ordering::Relaxed);

        match self.try_decode(data, received_at) {
            Ok(frame) => {
                self.counter(frame.format).fetch_add(1, Ordering::Relaxed);
                Some(frame)
            }
            Err(e) => {
                self.invalid_packets.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("Dropped {} byte packet: {}", data.len(), e);
                None
            }
        }
    }

    fn try_decode(&self, data: &[u8], received_at: Instant) -> Result<AudioFrame, ProtocolError> {
        if data.len() > MAX_PACKET_SIZE {
            return Err(ProtocolError::TooLarge(data.len()));
        }

        // In a single-parser mode the parser reports the precise failure
        if let [parser] = self.parsers.as_slice() {
            return parser.parse(data, received_at);
        }

        let parser = self
            .parsers
            .iter()
            .find(|p| p.matches(data))
            .ok_or(ProtocolError::Unrecognized)?;
        parser.parse(data, received_at)
    }

    fn counter(&self, format: AudioFormat) -> &AtomicU64 {
        match format {
            AudioFormat::EqStreamer => &self.eqstreamer_frames,
            AudioFormat::WledV1 => &self.wled_v1_frames,
            AudioFormat::WledV2 => &self.wled_v2_frames,
        }
    }

    /// Number of dropped packets
    pub fn invalid_packets(&self) -> u64 {
        self.invalid_packets.load(Ordering::Relaxed)
    }

    /// Get statistics
    pub fn stats(&self) -> DecoderStats {
        DecoderStats {
            packets_seen: self.packets_seen.load(Ordering::Relaxed),
            invalid_packets: self.invalid_packets.load(Ordering::Relaxed),
            eqstreamer_frames: self.eqstreamer_frames.load(Ordering::Relaxed),
            wled_v1_frames: self.wled_v1_frames.load(Ordering::Relaxed),
            wled_v2_frames: self.wled_v2_frames.load(Ordering::Relaxed),
        }
    }
}

/// Decoder statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct DecoderStats {
    pub packets_seen: u64,
    pub invalid_packets: u64,
    pub eqstreamer_frames: u64,
    pub wled_v1_frames: u64,
    pub wled_v2_frames: u64,
}

impl DecoderStats {
    pub fn frames_decoded(&self) -> u64 {
        self.eqstreamer_frames + self.wled_v1_frames + self.wled_v2_frames
    }
}
