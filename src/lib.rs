//! # Glimmer
//!
//! Audio-reactive LED strip controller driven by network spectrum data.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                   Audio source (WLED / EQStreamer)                   │
//! └───────────────────────────────┬──────────────────────────────────────┘
//!                                 │ UDP over LAN
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │  Receive thread (network::receiver)                                  │
//! │  socket2 socket ──► PacketDecoder (protocol) ──► FrameSlot           │
//! │                     EQStreamer | WLED v1 | WLED v2   latest wins     │
//! └───────────────────────────────┬──────────────────────────────────────┘
//!                                 │
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │  Render thread (engine), one tick per frame period                   │
//! │  ┌────────────────┐  ┌──────────────────┐  ┌──────────┐  ┌────────┐  │
//! │  │SignalProcessor │─►│PlaybackController│─►│ Renderer │─►│  Sink  │  │
//! │  │gain, smoothing │  │playlist / manual │  │ effects  │  │ output │  │
//! │  └───────┬────────┘  └────────▲─────────┘  └──────────┘  └────────┘  │
//! │          ▼                    │                                      │
//! │   SharedSnapshot         EngineHandle::apply(ControlEvent)           │
//! └──────────────────────────────┬───────────────────────────────────────┘
//!                                │
//!              ┌─────────────────┴─────────────────┐
//!              ▼                                   ▼
//!   ┌─────────────────────┐            ┌──────────────────────┐
//!   │ HTTP API (ui, axum) │            │ Keyboard (crossterm) │
//!   └─────────────────────┘            └──────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod effects;
pub mod engine;
pub mod error;
pub mod keyboard;
pub mod network;
pub mod output;
pub mod playback;
pub mod protocol;
pub mod render;
pub mod ui;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Largest datagram the receiver accepts
    pub const MAX_PACKET_SIZE: usize = 2048;

    /// Bands per EQStreamer packet
    pub const EQSTREAMER_BANDS: usize = 32;

    /// Bands per WLED Audio Sync packet
    pub const WLED_BANDS: usize = 16;

    /// Bin count the effects are written against
    pub const FFT_BINS: usize = 16;

    /// Default UDP port for audio sync packets
    pub const DEFAULT_AUDIO_PORT: u16 = 31337;

    /// Default HTTP API port
    pub const DEFAULT_API_PORT: u16 = 1129;

    pub const DEFAULT_FPS: u32 = 60;
    pub const MAX_FPS: u32 = 240;

    pub const MAX_LEDS: usize = 10_000;

    /// Global strip brightness out of 255
    pub const DEFAULT_BRIGHTNESS: u8 = 77;

    /// Seconds without audio before falling back to silence
    pub const DEFAULT_SILENCE_TIMEOUT_SECS: f64 = 3.0;

    pub const MIN_ROTATION_PERIOD_SECS: f64 = 1.0;

    /// Socket read timeout so the receive loop can poll for shutdown
    pub const SOCKET_READ_TIMEOUT_MS: u64 = 100;

    /// Keyboard poll timeout
    pub const KEY_POLL_TIMEOUT_MS: u64 = 100;

    /// Largest step the activation clock advances in one tick
    pub const MAX_TICK_STEP_MS: u64 = 100;

    /// Interval between periodic stats log lines
    pub const STATS_INTERVAL_SECS: u64 = 5;

    /// Config file used when present in the working directory
    pub const DEFAULT_CONFIG_PATH: &str = "config/config.json";
}
