//! Boundary events and status reporting

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::AppConfig;
use crate::network::ReceiverStats;
use crate::playback::PlaybackMode;

/// Every state change the API and keyboard can request
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    /// Manual-select an effect by name
    SelectEffect(String),
    /// Manual-select by supported-effects index (digit keys)
    SelectIndex(usize),
    Next,
    Previous,
    /// Back to playlist mode
    Resume,
    PlaylistAdd(String),
    PlaylistRemove(String),
    /// Merge a partial config document
    UpdateConfig(serde_json::Value),
    Shutdown,
}

/// Snapshot of engine state served by `/api/status`
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub current_effect: String,
    pub playlist_mode: bool,
    pub mode: PlaybackMode,
    pub audio_active: bool,
    pub volume: f32,
    pub gain: f32,
    pub available_effects: Vec<String>,
    pub config: AppConfig,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub frames_rendered: u64,
    pub render_faults: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver: Option<ReceiverStats>,
}
