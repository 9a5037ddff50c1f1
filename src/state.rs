//! Session state machine
//!
//! A dictation session walks Idle → Recording → Transcribing → Formatting →
//! Injecting → Idle. Formatting only appears when the formatter is engaged
//! for that session. Failed is transient: it is published so presenters can
//! show the failure, then the session settles back to Idle.

use std::time::Instant;

/// Recorded microphone samples: f32, mono, 16 kHz
pub type AudioBuffer = Vec<f32>;

/// Where a dictation session currently is
#[derive(Debug, Clone, Default)]
pub enum SessionState {
    /// Nothing in flight, waiting for the hotkey
    #[default]
    Idle,

    /// Hotkey down, microphone open
    Recording {
        /// Set when the session started, for duration reporting
        started_at: Instant,
    },

    /// Running whisper over the recorded buffer
    Transcribing,

    /// Rewriting the transcript through the LLM
    Formatting,

    /// Delivering text to the focused application
    Injecting,

    /// A stage failed; resolves to Idle right after publishing
    Failed {
        /// Short stage name ("audio", "stt", "inject")
        reason: String,
    },
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, SessionState::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, SessionState::Recording { .. })
    }

    /// How long the microphone has been open, when recording
    pub fn recording_duration(&self) -> Option<std::time::Duration> {
        if let SessionState::Recording { started_at } = self {
            Some(started_at.elapsed())
        } else {
            None
        }
    }

    /// Lowercase state word for the state file and status output
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Recording { .. } => "recording",
            SessionState::Transcribing => "transcribing",
            SessionState::Formatting => "formatting",
            SessionState::Injecting => "injecting",
            SessionState::Failed { .. } => "failed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Recording { started_at } => {
                write!(f, "Recording for {:.1}s", started_at.elapsed().as_secs_f32())
            }
            SessionState::Failed { reason } => write!(f, "Failed ({})", reason),
            SessionState::Idle => f.write_str("Idle"),
            SessionState::Transcribing => f.write_str("Transcribing"),
            SessionState::Formatting => f.write_str("Formatting"),
            SessionState::Injecting => f.write_str("Injecting"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_idle() {
        assert!(SessionState::default().is_idle());
        assert!(SessionState::default().recording_duration().is_none());
    }

    #[test]
    fn test_recording_reports_duration() {
        let state = SessionState::Recording {
            started_at: Instant::now(),
        };
        assert!(state.is_recording());
        assert!(!state.is_idle());
        assert!(state.recording_duration().is_some());
    }

    #[test]
    fn test_state_words() {
        assert_eq!(SessionState::Idle.as_str(), "idle");
        assert_eq!(SessionState::Transcribing.as_str(), "transcribing");
        assert_eq!(SessionState::Formatting.as_str(), "formatting");
        assert_eq!(SessionState::Injecting.as_str(), "injecting");
        assert_eq!(
            SessionState::Failed {
                reason: "stt".to_string()
            }
            .as_str(),
            "failed"
        );
    }

    #[test]
    fn test_display_includes_failure_reason() {
        assert_eq!(SessionState::Idle.to_string(), "Idle");
        let failed = SessionState::Failed {
            reason: "inject".to_string(),
        };
        assert_eq!(failed.to_string(), "Failed (inject)");
        let recording = SessionState::Recording {
            started_at: Instant::now(),
        };
        assert!(recording.to_string().starts_with("Recording"));
    }
}
