//! Configuration document, validation, merge and persistence
//!
//! The whole document is validated on every load and every mutation. A
//! rejected mutation leaves the previous document in place.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::constants::*;
use crate::effects::EffectKind;
use crate::error::ConfigError;
use crate::protocol::PacketFormat;

/// Top-level sections accepted in a partial update
pub const SECTIONS: [&str; 6] = ["runtime", "audio", "effects", "network", "simulator", "hardware"];

/// Complete configuration document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub runtime: RuntimeConfig,
    pub audio: AudioConfig,
    pub effects: EffectsConfig,
    pub network: NetworkConfig,
    pub simulator: SimulatorConfig,
    pub hardware: HardwareConfig,
}

/// Playlist and rotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub effects_playlist: Vec<String>,
    /// Seconds between rotations when the playlist has several effects
    pub rotation_period: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            effects_playlist: ["spectrum_bars", "vu_meter", "fire", "ripple"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            rotation_period: 30.0,
        }
    }
}

/// Signal processing applied to every audio-reactive effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AudioConfig {
    /// Fixed multiplier on every band (0.1 - 5.0)
    pub volume_compensation: f32,
    /// Track the rolling peak and normalize it to `auto_gain_target`
    pub auto_gain: bool,
    pub auto_gain_target: f32,
    pub max_auto_gain: f32,
    /// Time constant in seconds for peak release and gain relaxation
    pub auto_gain_decay: f32,
    /// Exponential smoothing factor, 0 disables
    pub smoothing: f32,
    /// Seconds without a valid frame before falling back to silence
    pub silence_timeout: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            volume_compensation: 1.0,
            auto_gain: false,
            auto_gain_target: 0.8,
            max_auto_gain: 4.0,
            auto_gain_decay: 5.0,
            smoothing: 0.4,
            silence_timeout: DEFAULT_SILENCE_TIMEOUT_SECS,
        }
    }
}

/// Per-effect parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct EffectsConfig {
    pub rainbow: RainbowConfig,
    pub fire: FireConfig,
    pub white_arrow: WhiteArrowConfig,
    pub white_marquee: WhiteMarqueeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RainbowConfig {
    /// Milliseconds per wheel step (1 - 100)
    pub speed: u32,
    pub brightness: u8,
}

impl Default for RainbowConfig {
    fn default() -> Self {
        Self {
            speed: 20,
            brightness: 77,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FireConfig {
    /// Heat lost per cell per frame, scaled (20 - 100 is sensible)
    pub cooling: u8,
    /// Chance out of 255 of a new spark at full bass
    pub sparking: u8,
}

impl Default for FireConfig {
    fn default() -> Self {
        Self {
            cooling: 55,
            sparking: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WhiteArrowConfig {
    /// Pixels per frame
    pub speed: f32,
    pub length: usize,
    /// Minimum seconds between arrows
    pub min_interval: f32,
}

impl Default for WhiteArrowConfig {
    fn default() -> Self {
        Self {
            speed: 2.0,
            length: 8,
            min_interval: 0.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WhiteMarqueeConfig {
    /// Pixels per frame
    pub speed: f32,
    pub length: usize,
}

impl Default for WhiteMarqueeConfig {
    fn default() -> Self {
        Self {
            speed: 0.3,
            length: 10,
        }
    }
}

/// UDP input and HTTP API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    pub bind_address: String,
    pub audio_port: u16,
    pub audio_format: PacketFormat,
    pub api_bind_address: String,
    pub api_port: u16,
    pub reconnect_backoff_ms: u64,
    pub max_reconnect_backoff_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            audio_port: DEFAULT_AUDIO_PORT,
            audio_format: PacketFormat::Auto,
            api_bind_address: "0.0.0.0".to_string(),
            api_port: DEFAULT_API_PORT,
            reconnect_backoff_ms: 500,
            max_reconnect_backoff_ms: 8_000,
        }
    }
}

/// Terminal emulator layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Horizontal,
    Vertical,
    Grid,
}

impl FromStr for DisplayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "horizontal" => Ok(DisplayMode::Horizontal),
            "vertical" => Ok(DisplayMode::Vertical),
            "grid" => Ok(DisplayMode::Grid),
            other => Err(format!("unknown display mode '{other}' (horizontal, vertical, grid)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulatorConfig {
    pub display_mode: DisplayMode,
    /// Pixels per row in grid mode
    pub grid_width: usize,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            display_mode: DisplayMode::Horizontal,
            grid_width: 30,
        }
    }
}

/// Strip hardware and capabilities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HardwareConfig {
    pub num_leds: usize,
    pub pin: u8,
    /// Global brightness applied by the sink (0 - 255)
    pub brightness: u8,
    /// Strip has a dedicated white channel
    pub rgbw: bool,
    pub fps: u32,
    /// Attempts per frame before the sink is considered dead
    pub output_retries: u32,
    pub supported_effects: Vec<String>,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            num_leds: 60,
            pin: 18,
            brightness: DEFAULT_BRIGHTNESS,
            rgbw: false,
            fps: DEFAULT_FPS,
            output_retries: 3,
            supported_effects: EffectKind::ALL.iter().map(|k| k.as_str().to_string()).collect(),
        }
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn check_effect_list(key: &str, names: &[String]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for name in names {
        if EffectKind::from_str(name).is_err() {
            return Err(ConfigError::UnknownEffect(name.clone()));
        }
        if !seen.insert(name.as_str()) {
            return Err(invalid(key, format!("duplicate effect '{name}'")));
        }
    }
    Ok(())
}

impl AppConfig {
    /// Check every cross-section invariant
    pub fn validate(&self) -> Result<(), ConfigError> {
        let hw = &self.hardware;
        if hw.supported_effects.is_empty() {
            return Err(invalid("hardware.supported_effects", "must not be empty"));
        }
        check_effect_list("hardware.supported_effects", &hw.supported_effects)?;

        let playlist = &self.runtime.effects_playlist;
        if playlist.is_empty() {
            return Err(ConfigError::EmptyPlaylist);
        }
        check_effect_list("runtime.effects_playlist", playlist)?;
        let unsupported: Vec<String> = playlist
            .iter()
            .filter(|e| !hw.supported_effects.contains(e))
            .cloned()
            .collect();
        if !unsupported.is_empty() {
            return Err(ConfigError::NotSupported(unsupported));
        }

        let period = self.runtime.rotation_period;
        if !period.is_finite() || period < MIN_ROTATION_PERIOD_SECS {
            return Err(ConfigError::RotationPeriod(period));
        }

        let audio = &self.audio;
        if !(0.1..=5.0).contains(&audio.volume_compensation) {
            return Err(invalid("audio.volume_compensation", "must be within 0.1 - 5.0"));
        }
        if !(audio.auto_gain_target > 0.0 && audio.auto_gain_target <= 1.0) {
            return Err(invalid("audio.auto_gain_target", "must be within (0, 1]"));
        }
        if !(1.0..=16.0).contains(&audio.max_auto_gain) {
            return Err(invalid("audio.max_auto_gain", "must be within 1.0 - 16.0"));
        }
        if !(audio.auto_gain_decay > 0.0 && audio.auto_gain_decay.is_finite()) {
            return Err(invalid("audio.auto_gain_decay", "must be positive"));
        }
        if !(0.0..=0.99).contains(&audio.smoothing) {
            return Err(invalid("audio.smoothing", "must be within 0.0 - 0.99"));
        }
        if !(audio.silence_timeout > 0.0 && audio.silence_timeout.is_finite()) {
            return Err(invalid("audio.silence_timeout", "must be positive"));
        }

        let fx = &self.effects;
        if !(1..=100).contains(&fx.rainbow.speed) {
            return Err(invalid("effects.rainbow.speed", "must be within 1 - 100"));
        }
        if !(fx.white_arrow.speed > 0.0 && fx.white_arrow.speed.is_finite()) {
            return Err(invalid("effects.white_arrow.speed", "must be positive"));
        }
        if fx.white_arrow.length == 0 {
            return Err(invalid("effects.white_arrow.length", "must be at least 1"));
        }
        if !(fx.white_arrow.min_interval >= 0.0 && fx.white_arrow.min_interval.is_finite()) {
            return Err(invalid("effects.white_arrow.min_interval", "must not be negative"));
        }
        if !(fx.white_marquee.speed > 0.0 && fx.white_marquee.speed.is_finite()) {
            return Err(invalid("effects.white_marquee.speed", "must be positive"));
        }
        if fx.white_marquee.length == 0 {
            return Err(invalid("effects.white_marquee.length", "must be at least 1"));
        }

        if !(1..=MAX_LEDS).contains(&hw.num_leds) {
            return Err(invalid("hardware.num_leds", format!("must be within 1 - {MAX_LEDS}")));
        }
        if !(1..=MAX_FPS).contains(&hw.fps) {
            return Err(invalid("hardware.fps", format!("must be within 1 - {MAX_FPS}")));
        }
        if hw.output_retries == 0 {
            return Err(invalid("hardware.output_retries", "must be at least 1"));
        }

        let net = &self.network;
        if net.audio_port == 0 {
            return Err(invalid("network.audio_port", "must be within 1 - 65535"));
        }
        if net.api_port == 0 {
            return Err(invalid("network.api_port", "must be within 1 - 65535"));
        }
        if net.reconnect_backoff_ms == 0 || net.max_reconnect_backoff_ms < net.reconnect_backoff_ms {
            return Err(invalid(
                "network.reconnect_backoff_ms",
                "must be positive and not above max_reconnect_backoff_ms",
            ));
        }

        if self.simulator.grid_width == 0 {
            return Err(invalid("simulator.grid_width", "must be at least 1"));
        }

        Ok(())
    }

    /// Apply a partial document and return the validated result
    ///
    /// `patch` may use dot-notation keys (`"runtime.rotation_period"`) and
    /// may be wrapped in a `led_config` object. `self` is never modified.
    pub fn merged(&self, patch: &Value) -> Result<AppConfig, ConfigError> {
        let patch = normalize_patch(patch)?;

        let mut base = serde_json::to_value(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        merge_values(&mut base, Value::Object(patch));

        let next: AppConfig =
            serde_json::from_value(base).map_err(|e| ConfigError::Parse(e.to_string()))?;
        next.validate()?;
        Ok(next)
    }

    /// Parse a document from JSON (comments and trailing commas allowed)
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_json::from_str(&strip_jsonc(text))
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file, choosing the format by extension
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        if is_toml(path) {
            Self::from_toml(&text)
        } else {
            Self::from_json(&text)
        }
    }

    /// Serialize in the format matching `path`
    pub fn render(&self, path: &Path) -> Result<String, ConfigError> {
        if is_toml(path) {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Persist(e.to_string()))
        } else {
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Persist(e.to_string()))
        }
    }

    /// Write atomically (temp file + rename)
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = self.render(path)?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, text)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn supports(&self, effect: &str) -> bool {
        self.hardware.supported_effects.iter().any(|e| e == effect)
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

/// Unwrap `led_config`, expand dotted keys and reject unknown sections
fn normalize_patch(patch: &Value) -> Result<Map<String, Value>, ConfigError> {
    let object = patch
        .as_object()
        .ok_or_else(|| ConfigError::Parse("update must be a JSON object".to_string()))?;

    let expanded = expand_dot_keys(object);
    let expanded = match expanded.get("led_config") {
        Some(Value::Object(inner)) if expanded.len() == 1 => expand_dot_keys(inner),
        _ => expanded,
    };

    let unknown: Vec<&str> = expanded
        .keys()
        .map(String::as_str)
        .filter(|k| !SECTIONS.contains(k))
        .collect();
    if expanded.is_empty() || !unknown.is_empty() {
        return Err(ConfigError::UnknownKeys(format!(
            "got {:?}, valid sections are {}",
            unknown,
            SECTIONS.join(", ")
        )));
    }
    Ok(expanded)
}

/// Turn `{"a.b.c": 1}` into `{"a": {"b": {"c": 1}}}`
pub fn expand_dot_keys(object: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in object {
        let value = match value {
            Value::Object(inner) => Value::Object(expand_dot_keys(inner)),
            other => other.clone(),
        };

        let mut parts: Vec<&str> = key.split('.').collect();
        let last = parts.pop().unwrap_or_default();
        let mut nested = Map::new();
        nested.insert(last.to_string(), value);
        let mut node = Value::Object(nested);
        while let Some(part) = parts.pop() {
            let mut wrapper = Map::new();
            wrapper.insert(part.to_string(), node);
            node = Value::Object(wrapper);
        }

        let mut target = Value::Object(std::mem::take(&mut out));
        merge_values(&mut target, node);
        if let Value::Object(map) = target {
            out = map;
        }
    }
    out
}

/// Recursive merge: objects merge key by key, everything else replaces
pub fn merge_values(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, patch) => *base = patch,
    }
}

/// Remove `//` and `/* */` comments and trailing commas outside strings
pub fn strip_jsonc(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    let mut in_string = false;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if c == '\\' && i + 1 < chars.len() {
                out.push(chars[i + 1]);
                i += 2;
                continue;
            }
            if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
                i += 1;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                    i += 1;
                }
                i += 2;
            }
            ',' => {
                let mut j = i + 1;
                while j < chars.len() && chars[j].is_whitespace() {
                    j += 1;
                }
                if !matches!(chars.get(j), Some('}') | Some(']')) {
                    out.push(c);
                }
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Default config location: `config/config.json` when present, otherwise
/// the platform config directory
pub fn default_config_path() -> PathBuf {
    let local = PathBuf::from(DEFAULT_CONFIG_PATH);
    if local.exists() {
        return local;
    }
    directories::ProjectDirs::from("", "", "glimmer")
        .map(|dirs| dirs.config_dir().join("config.json"))
        .unwrap_or(local)
}

/// Leaf-level difference: the parts of `new` that differ from `old`
pub fn diff_values(old: &Value, new: &Value) -> Option<Value> {
    match (old, new) {
        (Value::Object(old), Value::Object(new)) => {
            let changed: Map<String, Value> = new
                .iter()
                .filter_map(|(key, value)| {
                    let diff = match old.get(key) {
                        Some(prev) => diff_values(prev, value),
                        None => Some(value.clone()),
                    };
                    diff.map(|d| (key.clone(), d))
                })
                .collect();
            (!changed.is_empty()).then_some(Value::Object(changed))
        }
        (old, new) if old == new => None,
        (_, new) => Some(new.clone()),
    }
}

/// Drop every leaf of `layer` that `changes` also sets
fn remove_paths(layer: &mut Value, changes: &Value) {
    let (Value::Object(layer), Value::Object(changes)) = (layer, changes) else {
        return;
    };
    for (key, change) in changes {
        let emptied = match layer.get_mut(key) {
            Some(inner) if inner.is_object() && change.is_object() => {
                remove_paths(inner, change);
                inner.as_object().is_some_and(Map::is_empty)
            }
            Some(_) => true,
            None => false,
        };
        if emptied {
            layer.remove(key);
        }
    }
}

fn to_value(config: &AppConfig) -> Result<Value, ConfigError> {
    serde_json::to_value(config).map_err(|e| ConfigError::Parse(e.to_string()))
}

fn from_value(value: Value) -> Result<AppConfig, ConfigError> {
    serde_json::from_value(value).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// The persisted document, an in-memory override layer and where the
/// document is saved
///
/// `config()` is always `base` with `overrides` merged on top. Only `base`
/// is ever written to disk.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    base: AppConfig,
    overrides: Value,
    config: AppConfig,
    path: Option<PathBuf>,
}

impl ConfigStore {
    fn with_base(base: AppConfig, path: Option<PathBuf>) -> Self {
        Self {
            config: base.clone(),
            base,
            overrides: Value::Object(Map::new()),
            path,
        }
    }

    /// In-memory store; mutations are not persisted
    pub fn in_memory(config: AppConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_base(config, None))
    }

    /// Load from `path`, writing defaults there first when it is missing
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = if path.exists() {
            AppConfig::load(&path)?
        } else {
            tracing::info!("Config {} not found, writing defaults", path.display());
            let config = AppConfig::default();
            config.save(&path)?;
            config
        };
        Ok(Self::with_base(config, Some(path)))
    }

    /// The effective document (persisted base plus overrides)
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The document as it is persisted, without overrides
    pub fn base(&self) -> &AppConfig {
        &self.base
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Swap in a new effective document without persisting
    ///
    /// Fields that differ from the current document are written into the
    /// base. An override on a field the caller changed is dropped, so the
    /// explicit write wins. Both the base and the effective document must
    /// validate, otherwise the store is untouched.
    pub fn stage(&mut self, next: AppConfig) -> Result<(), ConfigError> {
        next.validate()?;
        let Some(changes) = diff_values(&to_value(&self.config)?, &to_value(&next)?) else {
            return Ok(());
        };

        let mut base = to_value(&self.base)?;
        merge_values(&mut base, changes.clone());
        let base = from_value(base)?;
        base.validate()?;

        let mut overrides = self.overrides.clone();
        remove_paths(&mut overrides, &changes);
        let mut effective = to_value(&base)?;
        merge_values(&mut effective, overrides.clone());
        let effective = from_value(effective)?;
        effective.validate()?;

        self.base = base;
        self.overrides = overrides;
        self.config = effective;
        Ok(())
    }

    /// Validate and stage a new document, then persist
    ///
    /// Validation failures leave the store untouched. A persist failure
    /// keeps the new document in memory and is reported to the caller.
    pub fn replace(&mut self, next: AppConfig) -> Result<(), ConfigError> {
        self.stage(next)?;
        self.persist()
    }

    /// Merge a partial document; see [`AppConfig::merged`]
    pub fn apply_patch(&mut self, patch: &Value) -> Result<(), ConfigError> {
        let next = self.config.merged(patch)?;
        self.replace(next)
    }

    /// Mutate in place through a closure, with the same rollback rules
    pub fn update<F>(&mut self, f: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut next = self.config.clone();
        f(&mut next);
        self.replace(next)
    }

    /// Write the base document; overrides never reach the file
    pub fn persist(&self) -> Result<(), ConfigError> {
        match &self.path {
            Some(path) => self.base.save(path),
            None => Ok(()),
        }
    }

    /// Override without persisting (CLI flags)
    pub fn override_runtime<F>(&mut self, f: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut next = self.config.clone();
        f(&mut next);
        next.validate()?;
        if let Some(changes) = diff_values(&to_value(&self.config)?, &to_value(&next)?) {
            merge_values(&mut self.overrides, changes);
        }
        self.config = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_path(name: &str, ext: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "glimmer-config-{}-{}.{}",
            name,
            std::process::id(),
            ext
        ))
    }

    #[test]
    fn test_default_config_is_valid() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn test_empty_playlist_rejected() {
        let mut config = AppConfig::default();
        config.runtime.effects_playlist.clear();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyPlaylist)));
    }

    #[test]
    fn test_playlist_must_be_subset_of_supported() {
        let mut config = AppConfig::default();
        config.hardware.supported_effects = vec!["off".into(), "rainbow".into()];
        config.runtime.effects_playlist = vec!["rainbow".into(), "fire".into()];
        match config.validate() {
            Err(ConfigError::NotSupported(missing)) => assert_eq!(missing, vec!["fire"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_rotation_period_floor() {
        let mut config = AppConfig::default();
        config.runtime.rotation_period = 0.5;
        assert!(matches!(config.validate(), Err(ConfigError::RotationPeriod(_))));
        config.runtime.rotation_period = 1.0;
        config.validate().unwrap();
    }

    #[test]
    fn test_unknown_effect_rejected() {
        let mut config = AppConfig::default();
        config.runtime.effects_playlist = vec!["strobe".into()];
        assert!(matches!(config.validate(), Err(ConfigError::UnknownEffect(_))));
    }

    #[test]
    fn test_expand_dot_keys() {
        let patch = json!({
            "runtime.rotation_period": 5,
            "effects.rainbow.speed": 10,
            "effects.rainbow.brightness": 200,
            "audio": {"auto_gain": true}
        });
        let expanded = expand_dot_keys(patch.as_object().unwrap());
        assert_eq!(
            Value::Object(expanded),
            json!({
                "runtime": {"rotation_period": 5},
                "effects": {"rainbow": {"speed": 10, "brightness": 200}},
                "audio": {"auto_gain": true}
            })
        );
    }

    #[test]
    fn test_merge_keeps_untouched_fields() {
        let base = AppConfig::default();
        let next = base
            .merged(&json!({"runtime.rotation_period": 12.5, "audio": {"auto_gain": true}}))
            .unwrap();
        assert_eq!(next.runtime.rotation_period, 12.5);
        assert!(next.audio.auto_gain);
        assert_eq!(next.runtime.effects_playlist, base.runtime.effects_playlist);
        assert_eq!(next.hardware, base.hardware);
    }

    #[test]
    fn test_merge_unwraps_led_config() {
        let next = AppConfig::default()
            .merged(&json!({"led_config": {"effects.rainbow.speed": 42}}))
            .unwrap();
        assert_eq!(next.effects.rainbow.speed, 42);
    }

    #[test]
    fn test_merge_rejects_unknown_sections() {
        let err = AppConfig::default()
            .merged(&json!({"current_effect": "fire"}))
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKeys(_)));

        let err = AppConfig::default().merged(&json!({})).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKeys(_)));
    }

    #[test]
    fn test_merge_rejects_type_errors() {
        let err = AppConfig::default()
            .merged(&json!({"runtime": {"rotation_period": "fast"}}))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_failed_patch_keeps_previous_document() {
        let mut store = ConfigStore::in_memory(AppConfig::default()).unwrap();
        let before = store.config().clone();

        let err = store
            .apply_patch(&json!({"runtime": {"effects_playlist": []}}))
            .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyPlaylist));
        assert_eq!(store.config(), &before);

        let err = store
            .apply_patch(&json!({"hardware.supported_effects": ["off"]}))
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotSupported(_)));
        assert_eq!(store.config(), &before);
    }

    #[test]
    fn test_strip_jsonc() {
        let text = r#"{
            // playlist
            "runtime": {"effects_playlist": ["fire", "off",], /* inline */ "rotation_period": 3},
            "network": {"bind_address": "http://not//a/comment"},
        }"#;
        let value: Value = serde_json::from_str(&strip_jsonc(text)).unwrap();
        assert_eq!(value["runtime"]["effects_playlist"], json!(["fire", "off"]));
        assert_eq!(value["network"]["bind_address"], "http://not//a/comment");
    }

    #[test]
    fn test_json_save_and_load() {
        let path = temp_path("json", "json");
        let mut config = AppConfig::default();
        config.runtime.rotation_period = 7.0;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_toml_save_and_load() {
        let path = temp_path("toml", "toml");
        let mut config = AppConfig::default();
        config.simulator.display_mode = DisplayMode::Grid;
        config.save(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("[simulator]"));
        assert_eq!(AppConfig::load(&path).unwrap(), config);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_overrides_never_reach_the_file() {
        let path = temp_path("override", "json");
        let _ = fs::remove_file(&path);

        let mut store = ConfigStore::open(&path).unwrap();
        store
            .override_runtime(|c| {
                c.hardware.num_leds = 5;
                c.hardware.fps = 30;
            })
            .unwrap();
        store
            .apply_patch(&json!({"runtime.rotation_period": 9}))
            .unwrap();

        assert_eq!(store.config().hardware.num_leds, 5);
        assert_eq!(store.config().runtime.rotation_period, 9.0);

        let on_disk = AppConfig::load(&path).unwrap();
        assert_eq!(on_disk.runtime.rotation_period, 9.0);
        assert_eq!(on_disk.hardware.num_leds, AppConfig::default().hardware.num_leds);
        assert_eq!(on_disk.hardware.fps, AppConfig::default().hardware.fps);
        assert_eq!(&on_disk, store.base());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_explicit_write_replaces_override() {
        let mut store = ConfigStore::in_memory(AppConfig::default()).unwrap();
        store.override_runtime(|c| c.hardware.num_leds = 5).unwrap();

        store.apply_patch(&json!({"hardware.num_leds": 12})).unwrap();
        assert_eq!(store.config().hardware.num_leds, 12);
        assert_eq!(store.base().hardware.num_leds, 12);

        store.apply_patch(&json!({"runtime.rotation_period": 4})).unwrap();
        assert_eq!(store.config().hardware.num_leds, 12);
    }

    #[test]
    fn test_invalid_patch_leaves_file_untouched() {
        let path = temp_path("invalid", "json");
        let _ = fs::remove_file(&path);

        let mut store = ConfigStore::open(&path).unwrap();
        store
            .apply_patch(&json!({"runtime.rotation_period": 6}))
            .unwrap();
        let before = fs::read(&path).unwrap();

        for bad in [
            json!({"runtime.effects_playlist": []}),
            json!({"runtime.rotation_period": 0.2}),
            json!({"hardware.supported_effects": ["off"]}),
            json!({"nonsense": 1}),
        ] {
            assert!(store.apply_patch(&bad).is_err(), "{bad}");
            assert_eq!(fs::read(&path).unwrap(), before, "{bad}");
        }
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_diff_values() {
        let old = json!({"a": {"b": 1, "c": [1, 2]}, "d": true});
        let new = json!({"a": {"b": 1, "c": [1, 3]}, "d": true});
        assert_eq!(diff_values(&old, &new), Some(json!({"a": {"c": [1, 3]}})));
        assert_eq!(diff_values(&old, &old), None);
    }

    #[test]
    fn test_store_open_writes_defaults_and_persists_updates() {
        let path = temp_path("store", "json");
        let _ = fs::remove_file(&path);

        let mut store = ConfigStore::open(&path).unwrap();
        assert!(path.exists());
        store
            .apply_patch(&json!({"runtime.rotation_period": 9}))
            .unwrap();

        let reloaded = AppConfig::load(&path).unwrap();
        assert_eq!(reloaded.runtime.rotation_period, 9.0);
        let _ = fs::remove_file(&path);
    }
}
