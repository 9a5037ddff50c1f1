//! Configuration loading and types for voxbridge
//!
//! Settings merge in order of increasing priority: built-in defaults, the
//! config file (~/.config/voxbridge/config.toml), VOXBRIDGE_* environment
//! variables, then CLI arguments.

use crate::error::VoxbridgeError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Template written to config.toml on first run
pub const DEFAULT_CONFIG: &str = r#"# Voxbridge configuration
#
# Lives at ~/.config/voxbridge/config.toml. Anything here can also be set
# per invocation through CLI flags.

# Where the daemon publishes its current state for bars and scripts
# ("idle", "recording", "transcribing", "formatting", "injecting").
# "auto" writes to $XDG_RUNTIME_DIR/voxbridge/state; a path writes there;
# "disabled" turns publishing off. `voxbridge status` and
# `voxbridge record toggle` both read this file.
state_file = "auto"

[hotkey]
# Push-to-talk key, held while speaking.
# RIGHTALT, SCROLLLOCK, PAUSE and F13-F24 are the usual picks; run
# `evtest` to see what names your keyboard reports.
key = "RIGHTALT"

# Modifiers that must be down together with the key, e.g. ["LEFTCTRL"]
modifiers = []

# Built-in hotkey detection (on by default). Turn off when Hyprland or
# Sway keybindings drive `voxbridge record start/stop/toggle` instead.
# enabled = true

[audio]
# Input device name, or "default" for the system default.
# `pactl list sources short` shows what is available.
device = "default"

# Capture rate in Hz. whisper models are trained on 16 kHz audio.
sample_rate = 16000

# Recording cap in seconds. The buffer stops growing at this point;
# release still ends the session normally.
max_duration_secs = 60

[whisper]
# Transcription model: tiny, base, small, medium, large-v3 or
# large-v3-turbo, each with an English-only .en variant that is faster
# and more accurate for English. An absolute path to a ggml .bin file
# also works.
model = "small"

# Language code ("ja", "en", ...) or "auto" to detect per recording
language = "ja"

# Translate everything to English instead of transcribing verbatim
translate = false

# Inference threads; omit to size from the machine's cores
# threads = 4

# Load the model at daemon startup (true) or on first use (false)
# preload = true

[formatter]
# Reformat transcripts through a local LLM served by Ollama before injection.
# When the model is not yet present (or Ollama is unreachable), sessions
# inject the raw transcript unchanged.
enabled = true

# Ollama model used for formatting
model = "qwen2.5:7b"

# Ollama endpoint
endpoint = "http://127.0.0.1:11434"

# Prompt template file. "{text}" is replaced with the transcript; without
# the placeholder the transcript is appended. Relative paths resolve
# against the config directory. Omit to use the built-in prompt.
# prompt_file = "prompts/format.txt"

# Give up on formatting after this many seconds and inject the raw
# transcript instead
timeout_secs = 30

[inject]
# Applications that get a confirm keystroke (Enter) after the paste.
# Matched case-insensitively against the focused window's app id.
confirm_apps = ["Alacritty", "kitty", "foot"]

# Delay between clipboard write and paste keystroke in milliseconds
paste_delay_ms = 100

# Delay between paste and confirm keystroke in milliseconds
confirm_delay_ms = 150

[notification]
# Desktop notification when recording starts
on_recording_start = false

# Desktop notification when a session completes
on_complete = true

# Desktop notification when a session fails
on_error = true
"#;

/// Top-level settings, one section per pipeline stage
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub hotkey: HotkeyConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub whisper: WhisperConfig,

    #[serde(default)]
    pub formatter: FormatterConfig,

    #[serde(default)]
    pub inject: InjectConfig,

    #[serde(default)]
    pub notification: NotificationConfig,

    /// State file location: "auto", a path, or "disabled".
    /// The daemon writes the current session state word there on every
    /// transition, for Waybar and similar consumers.
    #[serde(default = "default_state_file")]
    pub state_file: Option<String>,
}

/// Push-to-talk hotkey settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HotkeyConfig {
    /// Push-to-talk key, named like the evdev constant minus the KEY_
    /// prefix: "RIGHTALT", "SCROLLLOCK", "F24"
    #[serde(default = "default_hotkey_key")]
    pub key: String,

    /// Modifiers that must be down together with the key
    #[serde(default)]
    pub modifiers: Vec<String>,

    /// Built-in detection on/off; off defers to compositor keybindings
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Microphone capture settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioConfig {
    /// Input device name as cpal reports it, or "default"
    #[serde(default = "default_audio_device")]
    pub device: String,

    /// Capture rate in Hz; whisper models are trained on 16 kHz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Maximum recording duration in seconds. The capture buffer stops
    /// growing at this cap; the session still ends on release.
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: u32,
}

/// Whisper transcription settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WhisperConfig {
    /// Model short name (tiny through large-v3-turbo) or a path to a
    /// ggml .bin file
    #[serde(default = "default_whisper_model")]
    pub model: String,

    /// Language code (ja, en, auto, ...)
    #[serde(default = "default_language")]
    pub language: String,

    /// Produce English output regardless of spoken language
    #[serde(default)]
    pub translate: bool,

    /// Inference threads; None sizes from the machine's cores
    #[serde(default)]
    pub threads: Option<usize>,

    /// Load the model at daemon startup (true) or on first use (false)
    #[serde(default = "default_true")]
    pub preload: bool,
}

/// LLM formatting configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FormatterConfig {
    /// Reformat transcripts before injection
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Ollama model used for formatting
    #[serde(default = "default_formatter_model")]
    pub model: String,

    /// Ollama endpoint
    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,

    /// Prompt template file ("{text}" is replaced with the transcript).
    /// Relative paths resolve against the config directory.
    #[serde(default)]
    pub prompt_file: Option<PathBuf>,

    /// Formatting timeout in seconds; on expiry the raw transcript is used
    #[serde(default = "default_format_timeout")]
    pub timeout_secs: u64,
}

/// Text injection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InjectConfig {
    /// App ids that get a confirm keystroke (Enter) after the paste,
    /// matched case-insensitively
    #[serde(default = "default_confirm_apps")]
    pub confirm_apps: Vec<String>,

    /// Delay between clipboard write and paste keystroke (ms)
    #[serde(default = "default_paste_delay")]
    pub paste_delay_ms: u64,

    /// Delay between paste and confirm keystroke (ms)
    #[serde(default = "default_confirm_delay")]
    pub confirm_delay_ms: u64,
}

/// Desktop notification settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// Notify when recording starts
    #[serde(default)]
    pub on_recording_start: bool,

    /// Notify when a session completes
    #[serde(default = "default_true")]
    pub on_complete: bool,

    /// Notify when a session fails
    #[serde(default = "default_true")]
    pub on_error: bool,
}

fn default_hotkey_key() -> String {
    "RIGHTALT".to_string()
}

fn default_audio_device() -> String {
    "default".to_string()
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_max_duration() -> u32 {
    60
}

fn default_whisper_model() -> String {
    "small".to_string()
}

fn default_language() -> String {
    "ja".to_string()
}

fn default_formatter_model() -> String {
    "qwen2.5:7b".to_string()
}

fn default_ollama_endpoint() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_format_timeout() -> u64 {
    30
}

fn default_confirm_apps() -> Vec<String> {
    vec![
        "Alacritty".to_string(),
        "kitty".to_string(),
        "foot".to_string(),
    ]
}

fn default_paste_delay() -> u64 {
    100
}

fn default_confirm_delay() -> u64 {
    150
}

fn default_state_file() -> Option<String> {
    Some("auto".to_string())
}

fn default_true() -> bool {
    true
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            key: default_hotkey_key(),
            modifiers: vec![],
            enabled: true,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: default_audio_device(),
            sample_rate: default_sample_rate(),
            max_duration_secs: default_max_duration(),
        }
    }
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model: default_whisper_model(),
            language: default_language(),
            translate: false,
            threads: None,
            preload: true,
        }
    }
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: default_formatter_model(),
            endpoint: default_ollama_endpoint(),
            prompt_file: None,
            timeout_secs: default_format_timeout(),
        }
    }
}

impl Default for InjectConfig {
    fn default() -> Self {
        Self {
            confirm_apps: default_confirm_apps(),
            paste_delay_ms: default_paste_delay(),
            confirm_delay_ms: default_confirm_delay(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            on_recording_start: false,
            on_complete: true,
            on_error: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hotkey: HotkeyConfig::default(),
            audio: AudioConfig::default(),
            whisper: WhisperConfig::default(),
            formatter: FormatterConfig::default(),
            inject: InjectConfig::default(),
            notification: NotificationConfig::default(),
            state_file: default_state_file(),
        }
    }
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "voxbridge")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Runtime directory for ephemeral files (state, pid)
    pub fn runtime_dir() -> PathBuf {
        let base = std::env::var_os("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/tmp"));
        base.join("voxbridge")
    }

    /// Where the state file goes, or None when publishing is off
    pub fn resolve_state_file(&self) -> Option<PathBuf> {
        let raw = self.state_file.as_deref()?;
        match raw.to_lowercase().as_str() {
            "disabled" | "none" | "off" | "false" => None,
            "auto" => Some(Self::runtime_dir().join("state")),
            _ => Some(PathBuf::from(raw)),
        }
    }

    /// Config directory under XDG config home
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "voxbridge")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Data directory under XDG data home
    pub fn data_dir() -> PathBuf {
        directories::ProjectDirs::from("", "", "voxbridge")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Where whisper models are stored
    pub fn models_dir() -> PathBuf {
        Self::data_dir().join("models")
    }

    /// Create the config and models directories if missing
    pub fn ensure_directories() -> std::io::Result<()> {
        if let Some(config_dir) = Self::config_dir() {
            std::fs::create_dir_all(config_dir)?;
        }
        let models_dir = Self::models_dir();
        std::fs::create_dir_all(&models_dir)?;
        tracing::debug!("Directories ready, models at {:?}", models_dir);
        Ok(())
    }
}

impl FormatterConfig {
    /// Resolve the prompt file path. Relative paths resolve against the
    /// config directory; None means the built-in prompt is used.
    pub fn resolve_prompt_file(&self) -> Option<PathBuf> {
        self.prompt_file.as_ref().map(|path| {
            if path.is_absolute() {
                path.clone()
            } else {
                Config::config_dir()
                    .map(|dir| dir.join(path))
                    .unwrap_or_else(|| path.clone())
            }
        })
    }
}

/// Load configuration, filling anything unset from defaults
pub fn load_config(path: Option<&Path>) -> Result<Config, VoxbridgeError> {
    let config_path = path.map(PathBuf::from).or_else(Config::default_path);

    let mut config = match config_path {
        Some(ref path) if path.exists() => {
            tracing::debug!("Reading config file {}", path.display());
            let contents = std::fs::read_to_string(path).map_err(|e| {
                VoxbridgeError::Config(format!("Failed to read {:?}: {}", path, e))
            })?;
            toml::from_str(&contents)
                .map_err(|e| VoxbridgeError::Config(format!("Invalid config {:?}: {}", path, e)))?
        }
        _ => {
            tracing::debug!("No config file, using defaults");
            Config::default()
        }
    };

    // Environment overrides, applied after the file
    if let Ok(key) = std::env::var("VOXBRIDGE_HOTKEY") {
        config.hotkey.key = key;
    }
    if let Ok(model) = std::env::var("VOXBRIDGE_MODEL") {
        config.whisper.model = model;
    }
    if let Ok(url) = std::env::var("VOXBRIDGE_OLLAMA_URL") {
        config.formatter.endpoint = url;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_defaults() {
        let config = Config::default();
        assert_eq!(config.hotkey.key, "RIGHTALT");
        assert!(config.hotkey.enabled);
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.max_duration_secs, 60);
        assert_eq!(config.whisper.model, "small");
        assert_eq!(config.whisper.language, "ja");
        assert!(config.whisper.preload);
        assert!(config.formatter.enabled);
        assert_eq!(config.formatter.model, "qwen2.5:7b");
        assert_eq!(config.formatter.timeout_secs, 30);
        assert_eq!(config.inject.confirm_apps.len(), 3);
        assert!(config.notification.on_complete);
    }

    #[test]
    fn test_default_config_template_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.hotkey.key, "RIGHTALT");
        assert_eq!(config.formatter.endpoint, "http://127.0.0.1:11434");
        assert_eq!(config.state_file, Some("auto".to_string()));
    }

    #[test]
    fn test_toml_overrides_merge_with_defaults() {
        let toml_str = r#"
            [hotkey]
            key = "F13"
            modifiers = ["LEFTMETA"]

            [audio]
            max_duration_secs = 45

            [whisper]
            model = "tiny.en"
            language = "en"

            [formatter]
            enabled = false

            [inject]
            confirm_apps = ["Warp"]

            [notification]
            on_recording_start = true
            on_complete = false
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.hotkey.key, "F13");
        assert_eq!(config.hotkey.modifiers, vec!["LEFTMETA"]);
        assert_eq!(config.audio.max_duration_secs, 45);
        assert_eq!(config.audio.sample_rate, 16000); // default survives
        assert_eq!(config.whisper.model, "tiny.en");
        assert!(!config.formatter.enabled);
        assert_eq!(config.formatter.model, "qwen2.5:7b"); // default survives
        assert_eq!(config.inject.confirm_apps, vec!["Warp"]);
        assert!(config.notification.on_recording_start);
        assert!(!config.notification.on_complete);
        assert!(config.notification.on_error); // default
    }

    #[test]
    fn test_hotkey_key_optional_when_disabled() {
        // A config that only turns the hotkey off must parse without a key
        let toml_str = r#"
            [hotkey]
            enabled = false
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(!config.hotkey.enabled);
        assert_eq!(config.hotkey.key, "RIGHTALT"); // default
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.whisper.model, "small");
        assert!(config.formatter.enabled);
        // No state_file key at all leaves the "auto" default in place
        assert_eq!(config.state_file, Some("auto".to_string()));
    }

    #[test]
    fn test_resolve_state_file() {
        let mut config = Config::default();

        config.state_file = Some("disabled".to_string());
        assert!(config.resolve_state_file().is_none());

        config.state_file = Some("/tmp/custom-state".to_string());
        assert_eq!(
            config.resolve_state_file(),
            Some(PathBuf::from("/tmp/custom-state"))
        );

        config.state_file = Some("auto".to_string());
        let resolved = config.resolve_state_file().unwrap();
        assert!(resolved.ends_with("voxbridge/state"));

        config.state_file = None;
        assert!(config.resolve_state_file().is_none());
    }

    #[test]
    fn test_resolve_prompt_file_absolute() {
        let mut config = FormatterConfig::default();
        assert!(config.resolve_prompt_file().is_none());

        config.prompt_file = Some(PathBuf::from("/etc/voxbridge/prompt.txt"));
        assert_eq!(
            config.resolve_prompt_file(),
            Some(PathBuf::from("/etc/voxbridge/prompt.txt"))
        );
    }
}
