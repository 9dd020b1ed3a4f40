//! Engine context: shared state, the render thread and the control surface
//!
//! Lock order when more than one lock is held: config, then playback.

pub mod control;
mod render_loop;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crate::audio::{create_shared_slot, SharedFrameSlot, SharedSnapshot, SpectrumSnapshot};
use crate::config::{AppConfig, ConfigStore};
use crate::effects::{EffectKind, EffectRegistry};
use crate::error::{ConfigError, Error, NetworkError, OutputError, PlaybackError};
use crate::network::{AudioReceiver, ReceiverStats};
use crate::output::OutputSink;
use crate::playback::{self, PlaybackController};
use crate::render::Renderer;

pub use control::{ControlEvent, EngineStatus};

struct EngineState {
    config: RwLock<ConfigStore>,
    playback: Mutex<PlaybackController>,
    snapshot: SharedSnapshot,
    slot: SharedFrameSlot,
    receiver: Mutex<Option<AudioReceiver>>,
    running: AtomicBool,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
    frames_rendered: AtomicU64,
    render_faults: AtomicU64,
    started_at: Instant,
    started_wall: chrono::DateTime<chrono::Utc>,
}

/// Cloneable access to the engine for the API and keyboard
#[derive(Clone)]
pub struct EngineHandle {
    state: Arc<EngineState>,
}

/// Owns the render thread and the audio receiver
pub struct Engine {
    handle: EngineHandle,
    seed: u64,
    render_thread: Option<JoinHandle<Result<(), OutputError>>>,
}

impl Engine {
    pub fn new(store: ConfigStore) -> Self {
        Self::with_seed(store, rand::random())
    }

    /// Engine whose randomized effects replay identically for `seed`
    pub fn with_seed(store: ConfigStore, seed: u64) -> Self {
        let now = Instant::now();
        let playback = PlaybackController::new(store.config(), now);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(0);

        let state = EngineState {
            config: RwLock::new(store),
            playback: Mutex::new(playback),
            snapshot: SharedSnapshot::new(SpectrumSnapshot::silent(0)),
            slot: create_shared_slot(),
            receiver: Mutex::new(None),
            running: AtomicBool::new(true),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
            frames_rendered: AtomicU64::new(0),
            render_faults: AtomicU64::new(0),
            started_at: now,
            started_wall: chrono::Utc::now(),
        };
        Self {
            handle: EngineHandle {
                state: Arc::new(state),
            },
            seed,
            render_thread: None,
        }
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Bind the UDP socket and start receiving; bind failures are fatal
    pub fn start_receiver(&self) -> Result<(), NetworkError> {
        let network = self.handle.config().network;
        let mut receiver = AudioReceiver::new(network.audio_format, self.handle.state.slot.clone());
        receiver.start(&network)?;
        *self.handle.state.receiver.lock() = Some(receiver);
        Ok(())
    }

    /// Spawn the fixed-rate render thread driving `sink`
    pub fn start_render(&mut self, sink: Box<dyn OutputSink>) -> Result<(), Error> {
        let state = self.handle.state.clone();
        let (initial, num_leds) = {
            let store = state.config.read();
            let pb = state.playback.lock();
            let kind = EffectKind::from_str(pb.current()).unwrap_or(EffectKind::Off);
            (kind, store.config().hardware.num_leds)
        };
        let renderer = Renderer::new(EffectRegistry::new(self.seed), initial, num_leds);

        let thread = std::thread::Builder::new()
            .name("render".into())
            .spawn(move || render_loop::run(&state, renderer, sink))?;
        self.render_thread = Some(thread);
        tracing::info!("Render loop started with {} on {} LEDs", initial, num_leds);
        Ok(())
    }

    /// Wait for the render thread; a persistent sink failure comes back here
    pub fn join(&mut self) -> Result<(), OutputError> {
        match self.render_thread.take() {
            Some(thread) => thread
                .join()
                .unwrap_or_else(|_| Err(OutputError::WriteFailed("render thread panicked".into()))),
            None => Ok(()),
        }
    }

    /// Stop everything: render loop (blanks the strip), then the receiver
    pub fn shutdown(&mut self) -> Result<(), OutputError> {
        self.handle.shutdown();
        let result = self.join();
        let receiver = self.handle.state.receiver.lock().take();
        if let Some(mut receiver) = receiver {
            receiver.stop();
        }
        result
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

impl EngineHandle {
    /// Apply one control event; the single entry point for every boundary
    pub fn apply(&self, event: ControlEvent) -> Result<(), Error> {
        tracing::debug!("Control event: {:?}", event);
        let now = Instant::now();
        match event {
            ControlEvent::SelectEffect(name) => self.with_playback(|pb, cfg| pb.select(&name, cfg, now)),
            ControlEvent::SelectIndex(index) => {
                self.with_playback(|pb, cfg| {
                    if pb.select_index(index, cfg, now).is_none() {
                        tracing::debug!("No supported effect at index {}", index);
                    }
                    Ok(())
                })
            }
            ControlEvent::Next => self.with_playback(|pb, cfg| pb.next(cfg, now)),
            ControlEvent::Previous => self.with_playback(|pb, cfg| pb.previous(cfg, now)),
            ControlEvent::Resume => self.with_playback(|pb, cfg| {
                pb.resume(cfg, now);
                Ok(())
            }),
            ControlEvent::PlaylistAdd(name) => self.mutate_config(|cfg| {
                let next = playback::playlist_add(cfg, &name)?;
                if next.is_none() {
                    tracing::info!("{} already in playlist", name);
                }
                Ok(next)
            }),
            ControlEvent::PlaylistRemove(name) => {
                self.mutate_config(|cfg| Ok(Some(playback::playlist_remove(cfg, &name)?)))
            }
            ControlEvent::UpdateConfig(patch) => {
                self.mutate_config(|cfg| Ok(Some(cfg.merged(&patch)?)))
            }
            ControlEvent::Shutdown => {
                self.shutdown();
                Ok(())
            }
        }
    }

    fn with_playback<F>(&self, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut PlaybackController, &AppConfig) -> Result<(), PlaybackError>,
    {
        let store = self.state.config.read();
        let mut pb = self.state.playback.lock();
        f(&mut *pb, store.config()).map_err(Error::from)
    }

    /// Validate, store, re-sync playback, then report any persist failure
    fn mutate_config<F>(&self, f: F) -> Result<(), Error>
    where
        F: FnOnce(&AppConfig) -> Result<Option<AppConfig>, Error>,
    {
        let mut store = self.state.config.write();
        let previous = store.config().clone();
        let Some(next) = f(&previous)? else {
            return Ok(());
        };
        store.stage(next)?;

        let persisted = store.persist();
        self.state
            .playback
            .lock()
            .on_config_changed(&previous, store.config(), Instant::now());
        drop(store);

        persisted.map_err(|e| {
            tracing::error!("Config change applied but not saved: {}", e);
            Error::from(e)
        })
    }

    /// Copy of the current config document
    pub fn config(&self) -> AppConfig {
        self.state.config.read().config().clone()
    }

    /// Override config in memory only (CLI flags)
    pub fn override_config<F>(&self, f: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut store = self.state.config.write();
        let previous = store.config().clone();
        store.override_runtime(f)?;
        self.state
            .playback
            .lock()
            .on_config_changed(&previous, store.config(), Instant::now());
        Ok(())
    }

    pub fn current_effect(&self) -> String {
        self.state.playback.lock().current().to_string()
    }

    pub fn is_playlist_mode(&self) -> bool {
        self.state.playback.lock().is_playlist()
    }

    pub fn snapshot(&self) -> SpectrumSnapshot {
        self.state.snapshot.read()
    }

    /// Shared snapshot, written by the render thread
    pub fn shared_snapshot(&self) -> SharedSnapshot {
        self.state.snapshot.clone()
    }

    /// Slot the receiver publishes decoded frames into
    pub fn frame_slot(&self) -> SharedFrameSlot {
        self.state.slot.clone()
    }

    pub fn receiver_stats(&self) -> Option<ReceiverStats> {
        self.state.receiver.lock().as_ref().map(AudioReceiver::stats)
    }

    pub fn frames_rendered(&self) -> u64 {
        self.state.frames_rendered.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> EngineStatus {
        let (config, current_effect, mode) = {
            let store = self.state.config.read();
            let pb = self.state.playback.lock();
            (store.config().clone(), pb.current().to_string(), pb.mode())
        };
        let snapshot = self.state.snapshot.read();

        EngineStatus {
            running: self.is_running(),
            current_effect,
            playlist_mode: mode == playback::PlaybackMode::Playlist,
            mode,
            audio_active: snapshot.audio_active,
            volume: snapshot.volume,
            gain: snapshot.gain,
            available_effects: config.hardware.supported_effects.clone(),
            config,
            started_at: self.state.started_wall,
            uptime_seconds: self.state.started_at.elapsed().as_secs(),
            frames_rendered: self.frames_rendered(),
            render_faults: self.state.render_faults.load(Ordering::Relaxed),
            receiver: self.receiver_stats(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    /// Ask every activity to stop; safe to call more than once
    pub fn shutdown(&self) {
        if self.state.running.swap(false, Ordering::SeqCst) {
            tracing::info!("Shutdown requested");
        }
        // Dropping the sender wakes every receiver
        self.state.shutdown_tx.lock().take();
    }

    /// Channel that disconnects once shutdown starts
    pub fn shutdown_signal(&self) -> Receiver<()> {
        self.state.shutdown_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn handle_with(playlist: &[&str]) -> (Engine, EngineHandle) {
        let mut config = AppConfig::default();
        config.runtime.effects_playlist = playlist.iter().map(|s| s.to_string()).collect();
        let engine = Engine::with_seed(ConfigStore::in_memory(config).unwrap(), 1);
        let handle = engine.handle();
        (engine, handle)
    }

    #[test]
    fn test_select_and_resume_through_apply() {
        let (_engine, handle) = handle_with(&["ripple", "blurz"]);
        assert_eq!(handle.current_effect(), "ripple");

        handle.apply(ControlEvent::SelectEffect("fire".into())).unwrap();
        assert_eq!(handle.current_effect(), "fire");
        assert!(!handle.is_playlist_mode());

        handle.apply(ControlEvent::Resume).unwrap();
        assert_eq!(handle.current_effect(), "ripple");
        assert!(handle.is_playlist_mode());
    }

    #[test]
    fn test_unsupported_select_is_rejected() {
        let (_engine, handle) = handle_with(&["off"]);
        handle
            .apply(ControlEvent::UpdateConfig(json!({
                "hardware.supported_effects": ["off", "rainbow"]
            })))
            .unwrap();
        let err = handle.apply(ControlEvent::SelectEffect("fire".into())).unwrap_err();
        assert!(matches!(err, Error::Playback(PlaybackError::NotSupported(_))));
    }

    #[test]
    fn test_playlist_remove_current_resets_effect() {
        let (_engine, handle) = handle_with(&["ripple", "blurz"]);
        handle.apply(ControlEvent::PlaylistRemove("ripple".into())).unwrap();
        assert_eq!(handle.config().runtime.effects_playlist, vec!["blurz"]);
        assert_eq!(handle.current_effect(), "blurz");

        let err = handle
            .apply(ControlEvent::PlaylistRemove("blurz".into()))
            .unwrap_err();
        assert!(matches!(err, Error::Playback(PlaybackError::LastEffect)));
        assert_eq!(handle.config().runtime.effects_playlist, vec!["blurz"]);
    }

    #[test]
    fn test_invalid_update_keeps_config() {
        let (_engine, handle) = handle_with(&["ripple"]);
        let before = handle.config();
        let err = handle
            .apply(ControlEvent::UpdateConfig(json!({"runtime.rotation_period": 0.2})))
            .unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::RotationPeriod(_))));
        assert_eq!(handle.config(), before);
    }

    #[test]
    fn test_cli_override_survives_playlist_write_but_is_not_saved() {
        let path = std::env::temp_dir().join(format!(
            "glimmer-engine-override-{}.json",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        let engine = Engine::with_seed(ConfigStore::open(&path).unwrap(), 1);
        let handle = engine.handle();
        handle
            .override_config(|c| c.network.audio_port = 40000)
            .unwrap();
        handle.apply(ControlEvent::PlaylistAdd("blurz".into())).unwrap();

        assert_eq!(handle.config().network.audio_port, 40000);
        let on_disk = AppConfig::load(&path).unwrap();
        assert!(on_disk.runtime.effects_playlist.contains(&"blurz".to_string()));
        assert_eq!(on_disk.network.audio_port, AppConfig::default().network.audio_port);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_digit_out_of_range_is_noop() {
        let (_engine, handle) = handle_with(&["ripple"]);
        handle
            .apply(ControlEvent::UpdateConfig(json!({
                "hardware.supported_effects": ["off", "rainbow", "ripple"]
            })))
            .unwrap();
        handle.apply(ControlEvent::SelectIndex(9)).unwrap();
        assert_eq!(handle.current_effect(), "ripple");
        assert!(handle.is_playlist_mode());

        handle.apply(ControlEvent::SelectIndex(1)).unwrap();
        assert_eq!(handle.current_effect(), "rainbow");
    }

    #[test]
    fn test_shutdown_disconnects_signal() {
        let (_engine, handle) = handle_with(&["off"]);
        let signal = handle.shutdown_signal();
        handle.apply(ControlEvent::Shutdown).unwrap();
        assert!(!handle.is_running());
        assert!(signal.recv().is_err());
    }

    #[test]
    fn test_status_reports_mode_and_effects() {
        let (_engine, handle) = handle_with(&["fire"]);
        let status = handle.status();
        assert!(status.running);
        assert!(status.playlist_mode);
        assert_eq!(status.current_effect, "fire");
        assert_eq!(status.available_effects.len(), 17);
        assert!(!status.audio_active);
        assert!(status.receiver.is_none());
    }
}
