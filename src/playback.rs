//! Playlist / manual playback state machine
//!
//! Every transition takes an explicit `now` so behaviour is reproducible.
//! The controller never holds config; callers pass the current document.

use serde::Serialize;
use std::time::{Duration, Instant};

use crate::config::AppConfig;
use crate::error::PlaybackError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMode {
    Playlist,
    Manual,
}

/// Which effect is showing and why
#[derive(Debug, Clone)]
pub struct PlaybackController {
    mode: PlaybackMode,
    current: String,
    index: usize,
    last_rotation: Instant,
    generation: u64,
}

impl PlaybackController {
    /// Start in playlist mode on the first playlist entry
    pub fn new(config: &AppConfig, now: Instant) -> Self {
        Self {
            mode: PlaybackMode::Playlist,
            current: first_entry(config),
            index: 0,
            last_rotation: now,
            generation: 0,
        }
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn is_playlist(&self) -> bool {
        self.mode == PlaybackMode::Playlist
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    /// Position in the playlist (meaningful in playlist mode)
    pub fn index(&self) -> usize {
        self.index
    }

    /// Bumped on every selection, including re-selecting the same effect
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_rotation(&self) -> Instant {
        self.last_rotation
    }

    fn show(&mut self, effect: String) {
        self.current = effect;
        self.generation += 1;
    }

    /// Rotate if the period has elapsed; returns whether the effect changed
    pub fn tick(&mut self, config: &AppConfig, now: Instant) -> bool {
        let playlist = &config.runtime.effects_playlist;
        if self.mode != PlaybackMode::Playlist || playlist.len() <= 1 {
            return false;
        }

        let period = Duration::from_secs_f64(config.runtime.rotation_period);
        if now.saturating_duration_since(self.last_rotation) < period {
            return false;
        }

        self.index = (self.index + 1) % playlist.len();
        let next = playlist[self.index].clone();
        tracing::info!("Playlist rotation: {} -> {}", self.current, next);
        self.show(next);

        // Stay on the original schedule unless we fell a whole period behind
        let scheduled = self.last_rotation + period;
        self.last_rotation = if now.saturating_duration_since(scheduled) < period {
            scheduled
        } else {
            now
        };
        true
    }

    /// Pin `effect` and suspend rotation
    pub fn select(
        &mut self,
        effect: &str,
        config: &AppConfig,
        _now: Instant,
    ) -> Result<(), PlaybackError> {
        if !config.supports(effect) {
            return Err(PlaybackError::NotSupported(effect.to_string()));
        }
        self.mode = PlaybackMode::Manual;
        self.show(effect.to_string());
        tracing::info!("Manual mode: {}", effect);
        Ok(())
    }

    /// Back to the first playlist entry with a fresh rotation timer
    pub fn resume(&mut self, config: &AppConfig, now: Instant) {
        self.mode = PlaybackMode::Playlist;
        self.index = 0;
        self.last_rotation = now;
        self.show(first_entry(config));
        tracing::info!("Playlist mode resumed: {}", self.current);
    }

    /// Manual-select the next supported effect, wrapping around
    pub fn next(&mut self, config: &AppConfig, now: Instant) -> Result<(), PlaybackError> {
        self.step(config, now, 1)
    }

    /// Manual-select the previous supported effect, wrapping around
    pub fn previous(&mut self, config: &AppConfig, now: Instant) -> Result<(), PlaybackError> {
        self.step(config, now, -1)
    }

    fn step(&mut self, config: &AppConfig, now: Instant, delta: isize) -> Result<(), PlaybackError> {
        let supported = &config.hardware.supported_effects;
        if supported.is_empty() {
            return Err(PlaybackError::NotSupported(self.current.clone()));
        }
        let len = supported.len() as isize;
        let target = match supported.iter().position(|e| *e == self.current) {
            Some(pos) => (pos as isize + delta).rem_euclid(len) as usize,
            None => 0,
        };
        let effect = supported[target].clone();
        self.select(&effect, config, now)
    }

    /// Manual-select by supported-effects index; out of range is a no-op
    pub fn select_index(
        &mut self,
        index: usize,
        config: &AppConfig,
        now: Instant,
    ) -> Option<String> {
        let effect = config.hardware.supported_effects.get(index)?.clone();
        self.select(&effect, config, now).ok()?;
        Some(effect)
    }

    /// Re-synchronise after the config document changed
    pub fn on_config_changed(&mut self, previous: &AppConfig, config: &AppConfig, now: Instant) {
        match self.mode {
            PlaybackMode::Manual => {
                if !config.supports(&self.current) {
                    tracing::warn!("{} is no longer supported, resuming playlist", self.current);
                    self.resume(config, now);
                }
            }
            PlaybackMode::Playlist => {
                let playlist = &config.runtime.effects_playlist;
                match playlist.iter().position(|e| *e == self.current) {
                    Some(pos) => {
                        self.index = pos;
                        if previous.runtime != config.runtime {
                            self.last_rotation = now;
                        }
                    }
                    None => {
                        self.index = 0;
                        self.last_rotation = now;
                        self.show(first_entry(config));
                        tracing::info!("Current effect left the playlist, now {}", self.current);
                    }
                }
            }
        }
    }
}

fn first_entry(config: &AppConfig) -> String {
    config
        .runtime
        .effects_playlist
        .first()
        .cloned()
        .unwrap_or_else(|| "off".to_string())
}

/// Digit key to supported-effects index: `1`-`9` are 0-8, `0` is 9
pub fn digit_index(key: char) -> Option<usize> {
    match key.to_digit(10)? {
        0 => Some(9),
        d => Some(d as usize - 1),
    }
}

/// Config with `effect` appended to the playlist
///
/// `Ok(None)` when the effect is already present.
pub fn playlist_add(config: &AppConfig, effect: &str) -> Result<Option<AppConfig>, PlaybackError> {
    if !config.supports(effect) {
        return Err(PlaybackError::NotSupported(effect.to_string()));
    }
    if config.runtime.effects_playlist.iter().any(|e| e == effect) {
        return Ok(None);
    }
    let mut next = config.clone();
    next.runtime.effects_playlist.push(effect.to_string());
    Ok(Some(next))
}

/// Config with `effect` removed from the playlist
pub fn playlist_remove(config: &AppConfig, effect: &str) -> Result<AppConfig, PlaybackError> {
    let playlist = &config.runtime.effects_playlist;
    let pos = playlist
        .iter()
        .position(|e| e == effect)
        .ok_or_else(|| PlaybackError::NotInPlaylist(effect.to_string()))?;
    if playlist.len() == 1 {
        return Err(PlaybackError::LastEffect);
    }
    let mut next = config.clone();
    next.runtime.effects_playlist.remove(pos);
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(playlist: &[&str], period: f64) -> AppConfig {
        let mut config = AppConfig::default();
        config.runtime.effects_playlist = playlist.iter().map(|s| s.to_string()).collect();
        config.runtime.rotation_period = period;
        config.validate().unwrap();
        config
    }

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn test_rotation_schedule() {
        let cfg = config(&["fire", "ripple", "blurz"], 10.0);
        let t0 = Instant::now();
        let mut pb = PlaybackController::new(&cfg, t0);

        let mut seen = Vec::new();
        for tenth in 0..=400u32 {
            let now = t0 + secs(tenth as f64 / 10.0);
            pb.tick(&cfg, now);
            seen.push((tenth, pb.current().to_string()));
        }

        let at = |s: u32| seen[(s * 10) as usize].1.as_str();
        assert_eq!(at(0), "fire");
        assert_eq!(seen[99].1, "fire");
        assert_eq!(at(10), "ripple");
        assert_eq!(at(19), "ripple");
        assert_eq!(at(20), "blurz");
        assert_eq!(at(29), "blurz");
        assert_eq!(at(30), "fire");
        assert_eq!(at(40), "ripple");
    }

    #[test]
    fn test_rotation_is_drift_free() {
        let cfg = config(&["fire", "ripple"], 10.0);
        let t0 = Instant::now();
        let mut pb = PlaybackController::new(&cfg, t0);

        assert!(pb.tick(&cfg, t0 + secs(10.3)));
        assert_eq!(pb.last_rotation(), t0 + secs(10.0));

        // More than a period late: resync to now
        assert!(pb.tick(&cfg, t0 + secs(45.0)));
        assert_eq!(pb.last_rotation(), t0 + secs(45.0));
    }

    #[test]
    fn test_single_effect_never_rotates() {
        let cfg = config(&["fire"], 1.0);
        let t0 = Instant::now();
        let mut pb = PlaybackController::new(&cfg, t0);
        for s in 0..1000 {
            assert!(!pb.tick(&cfg, t0 + secs(s as f64)));
        }
        assert_eq!(pb.current(), "fire");
    }

    #[test]
    fn test_manual_select_then_resume() {
        let cfg = config(&["ripple", "blurz"], 5.0);
        let t0 = Instant::now();
        let mut pb = PlaybackController::new(&cfg, t0);

        pb.select("fire", &cfg, t0).unwrap();
        assert_eq!(pb.mode(), PlaybackMode::Manual);
        assert_eq!(pb.current(), "fire");
        assert!(!pb.tick(&cfg, t0 + secs(60.0)));

        let t1 = t0 + secs(61.0);
        pb.resume(&cfg, t1);
        assert_eq!(pb.mode(), PlaybackMode::Playlist);
        assert_eq!(pb.current(), "ripple");
        assert_eq!(pb.last_rotation(), t1);
    }

    #[test]
    fn test_select_unsupported_fails() {
        let mut cfg = config(&["off"], 5.0);
        cfg.hardware.supported_effects = vec!["off".into(), "rainbow".into()];
        let t0 = Instant::now();
        let mut pb = PlaybackController::new(&cfg, t0);

        assert_eq!(
            pb.select("fire", &cfg, t0),
            Err(PlaybackError::NotSupported("fire".into()))
        );
        assert!(pb.is_playlist());
    }

    #[test]
    fn test_reselect_bumps_generation() {
        let cfg = config(&["off"], 5.0);
        let t0 = Instant::now();
        let mut pb = PlaybackController::new(&cfg, t0);
        pb.select("fire", &cfg, t0).unwrap();
        let g = pb.generation();
        pb.select("fire", &cfg, t0).unwrap();
        assert_eq!(pb.generation(), g + 1);
    }

    #[test]
    fn test_removing_current_resets_to_first() {
        let before = config(&["fire", "ripple", "blurz"], 10.0);
        let t0 = Instant::now();
        let mut pb = PlaybackController::new(&before, t0);
        pb.tick(&before, t0 + secs(10.0));
        assert_eq!(pb.current(), "ripple");

        let after = playlist_remove(&before, "ripple").unwrap();
        let t1 = t0 + secs(12.0);
        pb.on_config_changed(&before, &after, t1);
        assert_eq!(pb.current(), "fire");
        assert_eq!(pb.index(), 0);
        assert_eq!(pb.last_rotation(), t1);
    }

    #[test]
    fn test_playlist_change_resyncs_index() {
        let before = config(&["fire", "ripple"], 10.0);
        let t0 = Instant::now();
        let mut pb = PlaybackController::new(&before, t0);
        pb.tick(&before, t0 + secs(10.0));

        let mut after = before.clone();
        after.runtime.effects_playlist = vec!["blurz".into(), "fire".into(), "ripple".into()];
        pb.on_config_changed(&before, &after, t0 + secs(11.0));
        assert_eq!(pb.current(), "ripple");
        assert_eq!(pb.index(), 2);
        assert_eq!(pb.last_rotation(), t0 + secs(11.0));
    }

    #[test]
    fn test_unsupported_manual_effect_resumes_playlist() {
        let before = config(&["off"], 10.0);
        let t0 = Instant::now();
        let mut pb = PlaybackController::new(&before, t0);
        pb.select("fire", &before, t0).unwrap();

        let mut after = before.clone();
        after.hardware.supported_effects = vec!["off".into(), "rainbow".into()];
        pb.on_config_changed(&before, &after, t0);
        assert!(pb.is_playlist());
        assert_eq!(pb.current(), "off");
    }

    #[test]
    fn test_remove_last_effect_rejected() {
        let cfg = config(&["fire"], 10.0);
        assert_eq!(playlist_remove(&cfg, "fire"), Err(PlaybackError::LastEffect));
        assert_eq!(
            playlist_remove(&cfg, "ripple"),
            Err(PlaybackError::NotInPlaylist("ripple".into()))
        );
    }

    #[test]
    fn test_add_is_idempotent() {
        let cfg = config(&["fire"], 10.0);
        let next = playlist_add(&cfg, "ripple").unwrap().unwrap();
        assert_eq!(next.runtime.effects_playlist, vec!["fire", "ripple"]);
        assert!(playlist_add(&next, "ripple").unwrap().is_none());
        assert!(matches!(
            playlist_add(&cfg, "strobe"),
            Err(PlaybackError::NotSupported(_))
        ));
    }

    #[test]
    fn test_digit_mapping() {
        assert_eq!(digit_index('1'), Some(0));
        assert_eq!(digit_index('9'), Some(8));
        assert_eq!(digit_index('0'), Some(9));
        assert_eq!(digit_index('x'), None);

        let mut cfg = config(&["off"], 10.0);
        cfg.hardware.supported_effects = vec!["off".into(), "rainbow".into(), "fire".into()];
        let t0 = Instant::now();
        let mut pb = PlaybackController::new(&cfg, t0);

        assert_eq!(pb.select_index(2, &cfg, t0).as_deref(), Some("fire"));
        assert_eq!(pb.select_index(9, &cfg, t0), None);
        assert_eq!(pb.current(), "fire");
    }

    #[test]
    fn test_next_previous_wrap() {
        let mut cfg = config(&["off"], 10.0);
        cfg.hardware.supported_effects = vec!["off".into(), "rainbow".into(), "fire".into()];
        let t0 = Instant::now();
        let mut pb = PlaybackController::new(&cfg, t0);

        pb.previous(&cfg, t0).unwrap();
        assert_eq!(pb.current(), "fire");
        pb.next(&cfg, t0).unwrap();
        assert_eq!(pb.current(), "off");
        pb.next(&cfg, t0).unwrap();
        assert_eq!(pb.current(), "rainbow");
        assert_eq!(pb.mode(), PlaybackMode::Manual);
    }
}
