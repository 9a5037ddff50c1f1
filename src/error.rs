//! Error types
//!
//! One thiserror enum per pipeline stage, rolled up into [`VoxbridgeError`]
//! at the application boundary. Messages spell out the fix where a common
//! misconfiguration is the likely cause.

use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum VoxbridgeError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Hotkey monitor error: {0}")]
    Hotkey(#[from] HotkeyError),

    #[error("Microphone error: {0}")]
    Audio(#[from] AudioError),

    #[error("Speech-to-text error: {0}")]
    Transcribe(#[from] TranscribeError),

    #[error("Formatting error: {0}")]
    Format(#[from] FormatError),

    #[error("Injection error: {0}")]
    Inject(#[from] InjectError),

    #[error("Model asset error: {0}")]
    Asset(#[from] AssetError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Hotkey detection failures
#[derive(Error, Debug)]
pub enum HotkeyError {
    #[error("No permission to read input device '{0}'.\n  Add yourself to the input group: sudo usermod -aG input $USER\n  (then log out and back in)")]
    DeviceAccess(String),

    #[error("Unrecognized key name: {0}")]
    UnknownKey(String),

    #[error("No keyboard found under /dev/input")]
    NoKeyboard,

    #[error("evdev: {0}")]
    Evdev(String),

    #[error("{0}")]
    NotSupported(String),
}

impl HotkeyError {
    /// True for the failure modes caused by missing input-group permissions.
    /// The daemon treats these as non-fatal and keeps the signal trigger path.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, HotkeyError::DeviceAccess(_) | HotkeyError::NoKeyboard)
    }
}

/// Microphone capture failures
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Could not reach the audio backend: {0}")]
    Connection(String),

    #[error("No input device named '{0}'. See: pactl list sources short")]
    DeviceNotFound(String),

    #[error("No input device named '{requested}'. {available}")]
    DeviceNotFoundWithList { requested: String, available: String },

    #[error("Capture thread did not stop within {0}s")]
    StopTimeout(u32),

    #[error("Input stream error: {0}")]
    StreamError(String),
}

/// Speech-to-text failures
#[derive(Error, Debug)]
pub enum TranscribeError {
    #[error("Model not found: {0}\n  Run 'voxbridge setup --download' to fetch it.")]
    ModelNotFound(String),

    #[error("Could not initialize whisper: {0}")]
    InitFailed(String),

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("Bad audio input: {0}")]
    AudioFormat(String),
}

/// LLM formatting backend failures
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Cannot reach Ollama: {0}. Is `ollama serve` running?")]
    Unreachable(String),

    #[error("Ollama returned HTTP {0}: {1}")]
    Api(u16, String),

    #[error("Malformed response from Ollama: {0}")]
    Response(String),
}

/// Text injection failures
#[derive(Error, Debug)]
pub enum InjectError {
    #[error("wl-copy not found in PATH. Install the wl-clipboard package.")]
    WlCopyNotFound,

    #[error("Clipboard write failed: {0}")]
    Clipboard(String),
}

/// Formatter model asset failures
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Cannot reach Ollama: {0}. Is `ollama serve` running?")]
    Unreachable(String),

    #[error("Ollama returned HTTP {0}: {1}")]
    Api(u16, String),

    #[error("Model pull failed: {0}")]
    PullFailed(String),
}

pub type Result<T> = std::result::Result<T, VoxbridgeError>;

#[cfg(target_os = "linux")]
impl From<evdev::Error> for HotkeyError {
    fn from(e: evdev::Error) -> Self {
        HotkeyError::Evdev(e.to_string())
    }
}
