//! WLED Audio Sync packets (v1 and v2)
//!
//! v1 (83 bytes):
//! `header[6] myVals[32] sampleAgc:i32 sampleRaw:i32 sampleAvg:f32
//!  samplePeak:u8 fftResult[16] FFT_Magnitude:f64 FFT_MajorPeak:f64`
//!
//! v2 (44 bytes):
//! `header[6] reserved[2] sampleRaw:f32 sampleSmth:f32 samplePeak:u8
//!  frameCounter:u8 fftResult[16] reserved[2] FFT_Magnitude:f32
//!  FFT_MajorPeak:f32`
//!
//! All multi-byte fields are little-endian.

use bytes::{Buf, BufMut, BytesMut};
use std::time::Instant;

use super::{
    check_len, finite_or_zero, normalize_level, normalize_u8, AudioFormat, AudioFrame,
    PacketParser,
};
use crate::constants::WLED_BANDS;
use crate::error::ProtocolError;

const HEADER_LEN: usize = 6;
const V1_MAGIC: &[u8; 5] = b"00001";
const V2_MAGIC: &[u8; 5] = b"00002";
const V1_MY_VALS: usize = 32;

pub const V1_PACKET_LEN: usize = 83;
pub const V2_PACKET_LEN: usize = 44;

fn has_magic(data: &[u8], magic: &[u8; 5]) -> bool {
    data.len() >= HEADER_LEN && data.starts_with(magic)
}

fn read_bins(buf: &mut &[u8]) -> Vec<f32> {
    let mut raw = [0u8; WLED_BANDS];
    buf.copy_to_slice(&mut raw);
    raw.iter().copied().map(normalize_u8).collect()
}

/// Parser for the original WLED sync packet
#[derive(Debug, Default, Clone, Copy)]
pub struct WledV1Parser;

impl PacketParser for WledV1Parser {
    fn format(&self) -> AudioFormat {
        AudioFormat::WledV1
    }

    fn matches(&self, data: &[u8]) -> bool {
        has_magic(data, V1_MAGIC)
    }

    fn parse(&self, data: &[u8], received_at: Instant) -> Result<AudioFrame, ProtocolError> {
        if !self.matches(data) {
            return Err(ProtocolError::BadMagic);
        }
        check_len(data, V1_PACKET_LEN)?;

        let mut buf = &data[HEADER_LEN..];
        buf.advance(V1_MY_VALS);
        let sample_agc = buf.get_i32_le();
        let _sample_raw = buf.get_i32_le();
        let _sample_avg = buf.get_f32_le();
        let sample_peak = buf.get_u8();
        let bands = read_bins(&mut buf);
        let magnitude = buf.get_f64_le();
        let major_peak = buf.get_f64_le();

        Ok(AudioFrame {
            format: AudioFormat::WledV1,
            bands,
            volume: normalize_level(sample_agc as f64),
            peak: sample_peak > 0,
            major_peak_hz: finite_or_zero(major_peak),
            magnitude: finite_or_zero(magnitude),
            received_at,
        })
    }
}

/// Parser for the compact v2 sync packet
#[derive(Debug, Default, Clone, Copy)]
pub struct WledV2Parser;

impl PacketParser for WledV2Parser {
    fn format(&self) -> AudioFormat {
        AudioFormat::WledV2
    }

    fn matches(&self, data: &[u8]) -> bool {
        has_magic(data, V2_MAGIC)
    }

    fn parse(&self, data: &[u8], received_at: Instant) -> Result<AudioFrame, ProtocolError> {
        if !self.matches(data) {
            return Err(ProtocolError::BadMagic);
        }
        check_len(data, V2_PACKET_LEN)?;

        let mut buf = &data[HEADER_LEN..];
        buf.advance(2);
        let _sample_raw = buf.get_f32_le();
        let sample_smooth = buf.get_f32_le();
        let sample_peak = buf.get_u8();
        let _frame_counter = buf.get_u8();
        let bands = read_bins(&mut buf);
        buf.advance(2);
        let magnitude = buf.get_f32_le();
        let major_peak = buf.get_f32_le();

        Ok(AudioFrame {
            format: AudioFormat::WledV2,
            bands,
            volume: normalize_level(sample_smooth as f64),
            peak: sample_peak > 0,
            major_peak_hz: finite_or_zero(major_peak as f64),
            magnitude: finite_or_zero(magnitude as f64),
            received_at,
        })
    }
}

/// Fields a test sender fills in
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncSample {
    pub volume: f32,
    pub peak: bool,
    pub bins: [u8; WLED_BANDS],
    pub magnitude: f32,
    pub major_peak_hz: f32,
}

/// Encode a v1 packet
pub fn encode_v1(sample: &SyncSample) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(V1_PACKET_LEN);
    buf.put_slice(V1_MAGIC);
    buf.put_u8(0);
    buf.put_bytes(0, V1_MY_VALS);
    buf.put_i32_le(sample.volume.round() as i32);
    buf.put_i32_le(sample.volume.round() as i32);
    buf.put_f32_le(sample.volume);
    buf.put_u8(sample.peak as u8);
    buf.put_slice(&sample.bins);
    buf.put_f64_le(sample.magnitude as f64);
    buf.put_f64_le(sample.major_peak_hz as f64);
    buf.to_vec()
}

/// Encode a v2 packet
pub fn encode_v2(sample: &SyncSample) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(V2_PACKET_LEN);
    buf.put_slice(V2_MAGIC);
    buf.put_u8(0);
    buf.put_bytes(0, 2);
    buf.put_f32_le(sample.volume);
    buf.put_f32_le(sample.volume);
    buf.put_u8(sample.peak as u8);
    buf.put_u8(0);
    buf.put_slice(&sample.bins);
    buf.put_bytes(0, 2);
    buf.put_f32_le(sample.magnitude);
    buf.put_f32_le(sample.major_peak_hz);
    buf.to_vec()
}
