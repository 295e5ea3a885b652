//! Configuration loading and types for talki
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Config file (~/.config/talki/config.toml)
//! 3. Environment variables (TALKI_*)
//! 4. CLI arguments (highest priority)

use crate::error::TalkiError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = r#"# Talki Configuration
#
# Location: ~/.config/talki/config.toml
# All settings can be overridden via CLI flags

[hotkey]
# Key to hold for push-to-talk (record while held)
# Use `evtest` to find key names for your keyboard
push_to_talk = "F9"

# Key that starts/stops recording on each press
toggle = "F10"

[audio]
# Audio input device ("default" uses system default)
# List devices with: pactl list sources short
device = "default"

# Sample rate in Hz (whisper expects 16000)
sample_rate = 16000

# Maximum recording duration in seconds (safety limit)
max_duration_secs = 120

[whisper]
# Model to use for transcription
# Options: tiny, tiny.en, base, base.en, small, small.en, medium, large-v3
# Or provide an absolute path to a custom .bin model file
model = "base.en"

# Language for transcription ("auto" for auto-detection)
language = "en"

# Number of CPU threads for inference (omit for auto-detection)
# threads = 4

[transcribe]
# How often the growing recording is re-transcribed, in milliseconds.
# Values below 300 are clamped to 300 to bound inference load.
interval_ms = 1500

[inject]
# Injection backend: "direct" or "clipboard"
# - direct: synthesizes one keystroke per character (US layout)
# - clipboard: pastes new text via clipboard + Ctrl+V, restores clipboard after
mode = "direct"

# Restore the previous clipboard contents after a clipboard-mode paste
restore_clipboard = true
"#;

/// Floor for the re-transcription interval. Ticks any faster than this
/// saturate the inference thread without improving latency.
pub const MIN_TRANSCRIBE_INTERVAL_MS: u64 = 300;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub hotkey: HotkeyConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub whisper: WhisperConfig,

    #[serde(default)]
    pub transcribe: TranscribeConfig,

    #[serde(default)]
    pub inject: InjectConfig,
}

/// Hotkey interception configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HotkeyConfig {
    /// Key held for push-to-talk (evdev KEY_* name, without the KEY_ prefix)
    #[serde(default = "default_push_to_talk")]
    pub push_to_talk: String,

    /// Key that starts/stops recording on each press
    #[serde(default = "default_toggle")]
    pub toggle: String,
}

/// Audio capture configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioConfig {
    /// PipeWire/PulseAudio device name, or "default"
    #[serde(default = "default_device")]
    pub device: String,

    /// Sample rate in Hz (whisper expects 16000)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Maximum recording duration in seconds (safety limit)
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: u32,
}

/// Whisper speech-to-text configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WhisperConfig {
    /// Model name: tiny, base, small, medium, large-v3
    /// Can also be an absolute path to a .bin file
    #[serde(default = "default_model")]
    pub model: String,

    /// Language code (en, es, fr, auto, etc.)
    #[serde(default = "default_language")]
    pub language: String,

    /// Number of threads for inference (None = auto-detect)
    #[serde(default)]
    pub threads: Option<usize>,
}

/// Incremental transcription configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscribeConfig {
    /// Re-transcription interval in milliseconds (clamped to a 300ms floor)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

/// Text injection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InjectConfig {
    /// Injection backend
    #[serde(default)]
    pub mode: InjectMode,

    /// Restore previous clipboard contents after a clipboard-mode paste
    #[serde(default = "default_true")]
    pub restore_clipboard: bool,
}

/// Injection backend selection
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InjectMode {
    /// Synthesize one keystroke per character (US layout)
    #[default]
    Direct,
    /// Paste new text via clipboard + Ctrl+V
    Clipboard,
}

fn default_push_to_talk() -> String {
    "F9".to_string()
}

fn default_toggle() -> String {
    "F10".to_string()
}

fn default_device() -> String {
    "default".to_string()
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_max_duration() -> u32 {
    120
}

fn default_model() -> String {
    "base.en".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_interval_ms() -> u64 {
    1500
}

fn default_true() -> bool {
    true
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            push_to_talk: default_push_to_talk(),
            toggle: default_toggle(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            sample_rate: default_sample_rate(),
            max_duration_secs: default_max_duration(),
        }
    }
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            language: default_language(),
            threads: None,
        }
    }
}

impl Default for TranscribeConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

impl Default for InjectConfig {
    fn default() -> Self {
        Self {
            mode: InjectMode::Direct,
            restore_clipboard: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hotkey: HotkeyConfig::default(),
            audio: AudioConfig::default(),
            whisper: WhisperConfig::default(),
            transcribe: TranscribeConfig::default(),
            inject: InjectConfig::default(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "talki")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path (for models)
    pub fn data_dir() -> PathBuf {
        directories::ProjectDirs::from("", "", "talki")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Get the models directory path
    pub fn models_dir() -> PathBuf {
        Self::data_dir().join("models")
    }

    /// Effective re-transcription interval with the floor applied
    pub fn transcribe_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(
            self.transcribe.interval_ms.max(MIN_TRANSCRIBE_INTERVAL_MS),
        )
    }
}

/// Load configuration from file, with defaults for missing values
pub fn load_config(path: Option<&Path>) -> Result<Config, TalkiError> {
    let mut config = Config::default();

    let config_path = path.map(PathBuf::from).or_else(Config::default_path);

    if let Some(ref path) = config_path {
        if path.exists() {
            tracing::debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)
                .map_err(|e| TalkiError::Config(format!("Failed to read config: {}", e)))?;

            config = toml::from_str(&contents)
                .map_err(|e| TalkiError::Config(format!("Invalid config: {}", e)))?;
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
        }
    }

    // Override from environment variables
    if let Ok(key) = std::env::var("TALKI_PUSH_TO_TALK") {
        config.hotkey.push_to_talk = key;
    }
    if let Ok(key) = std::env::var("TALKI_TOGGLE") {
        config.hotkey.toggle = key;
    }
    if let Ok(model) = std::env::var("TALKI_MODEL") {
        config.whisper.model = model;
    }
    if let Ok(mode) = std::env::var("TALKI_INJECT_MODE") {
        config.inject.mode = match mode.to_lowercase().as_str() {
            "clipboard" => InjectMode::Clipboard,
            _ => InjectMode::Direct,
        };
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.hotkey.push_to_talk, "F9");
        assert_eq!(config.hotkey.toggle, "F10");
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.whisper.model, "base.en");
        assert_eq!(config.transcribe.interval_ms, 1500);
        assert_eq!(config.inject.mode, InjectMode::Direct);
        assert!(config.inject.restore_clipboard);
    }

    #[test]
    fn test_default_config_template_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.hotkey.push_to_talk, "F9");
        assert_eq!(config.inject.mode, InjectMode::Direct);
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
            [hotkey]
            push_to_talk = "SCROLLLOCK"
            toggle = "PAUSE"

            [audio]
            device = "pipewire"
            max_duration_secs = 60

            [whisper]
            model = "small.en"

            [transcribe]
            interval_ms = 800

            [inject]
            mode = "clipboard"
            restore_clipboard = false
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.hotkey.push_to_talk, "SCROLLLOCK");
        assert_eq!(config.hotkey.toggle, "PAUSE");
        assert_eq!(config.audio.device, "pipewire");
        assert_eq!(config.audio.sample_rate, 16000); // default
        assert_eq!(config.whisper.model, "small.en");
        assert_eq!(config.transcribe.interval_ms, 800);
        assert_eq!(config.inject.mode, InjectMode::Clipboard);
        assert!(!config.inject.restore_clipboard);
    }

    #[test]
    fn test_interval_floor() {
        let config: Config = toml::from_str("[transcribe]\ninterval_ms = 50\n").unwrap();
        assert_eq!(
            config.transcribe_interval(),
            std::time::Duration::from_millis(MIN_TRANSCRIBE_INTERVAL_MS)
        );
    }
}
