//! Voxbridge: Push-to-talk dictation for Wayland
//!
//! The pieces of the pipeline, in order:
//! - hotkey press detection through evdev, below the compositor
//! - microphone capture through cpal (PipeWire, PulseAudio, ALSA)
//! - offline transcription through whisper.cpp (whisper-rs)
//! - optional transcript reformatting through a local Ollama model
//! - text injection through wl-copy plus a ydotool paste keystroke
//!
//! # How the pieces connect
//!
//! ```text
//!                  ┌─────────────────────────────────────┐
//!                  │              Daemon                 │
//!                  └─────────────────────────────────────┘
//!                                    │
//!              ┌─────────────────────┼─────────────────────┐
//!              │                     │                     │
//!              ▼                     ▼                     ▼
//!     ┌──────────────┐      ┌──────────────┐      ┌──────────────┐
//!     │    Hotkey    │      │   Signals    │      │    Asset     │
//!     │   (evdev)    │      │ (USR1/USR2)  │      │   Manager    │
//!     └──────────────┘      └──────────────┘      └──────────────┘
//!              │ press/release       │ start/stop
//!              ▼                     ▼
//!     ┌─────────────────────────────────────────────────────────┐
//!     │                    SessionController                    │
//!     │   Idle ─▶ Recording ─▶ Transcribing ─▶ Formatting       │
//!     │                           ─▶ Injecting ─▶ Idle          │
//!     └─────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//!                           ┌──────────────┐
//!                           │    Audio     │
//!                           │    (cpal)    │
//!                           └──────────────┘
//!                                    │ 16 kHz mono samples
//!                                    ▼
//!                           ┌──────────────┐
//!                           │   Whisper    │
//!                           │ (whisper-rs) │
//!                           └──────────────┘
//!                                    │ raw transcript
//!                                    ▼
//!                           ┌──────────────┐
//!                           │  Formatter   │ (optional: local LLM)
//!                           │   (Ollama)   │
//!                           └──────────────┘
//!                                    │ final text
//!                                    ▼
//!                           ┌──────────────┐
//!                           │   Injector   │
//!                           │   (wl-copy   │
//!                           │  + ydotool)  │
//!                           └──────────────┘
//! ```

pub mod asset;
pub mod audio;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod format;
pub mod hotkey;
pub mod inject;
pub mod notification;
pub mod session;
pub mod setup;
pub mod state;
pub mod status;
pub mod transcribe;

pub use cli::{Cli, Commands, RecordAction};
pub use config::Config;
pub use daemon::Daemon;
pub use error::{Result, VoxbridgeError};
