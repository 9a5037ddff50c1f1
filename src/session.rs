//! Dictation session controller
//!
//! Owns the Idle → Recording → Transcribing → Formatting → Injecting state
//! machine. One session at a time: a hotkey press while any stage is
//! running is dropped, and every state change is published to the status
//! sink before the next stage runs.

use crate::asset::{AssetManager, AssetState};
use crate::audio::AudioCapture;
use crate::format::{FormattingOutcome, FormattingStage};
use crate::inject::{InjectionOutcome, Injector};
use crate::state::SessionState;
use crate::status::{StatusEvent, StatusSink};
use crate::transcribe::Transcriber;
use std::sync::Arc;
use std::time::Instant;

/// Minimum session length: 0.1s of 16kHz audio. Anything shorter is an
/// accidental tap and is discarded without transcription.
const MIN_SESSION_SAMPLES: usize = 1600;

/// Drives one dictation session at a time through its stages
pub struct SessionController {
    capture: Box<dyn AudioCapture>,
    transcriber: Arc<dyn Transcriber>,
    /// Present only when formatting is enabled in config
    formatting: Option<FormattingStage>,
    /// Model whose asset state gates the formatting stage
    formatter_model: String,
    injector: Arc<dyn Injector>,
    assets: Arc<AssetManager>,
    sink: Arc<dyn StatusSink>,
    state: SessionState,
}

impl SessionController {
    pub fn new(
        capture: Box<dyn AudioCapture>,
        transcriber: Arc<dyn Transcriber>,
        formatting: Option<FormattingStage>,
        formatter_model: String,
        injector: Arc<dyn Injector>,
        assets: Arc<AssetManager>,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            capture,
            transcriber,
            formatting,
            formatter_model,
            injector,
            assets,
            sink,
            state: SessionState::Idle,
        }
    }

    /// Whether a new session could start right now
    pub fn is_idle(&self) -> bool {
        self.state.is_idle()
    }

    /// Hotkey pressed: start recording if idle, otherwise drop the press.
    /// A press never queues and never cancels the active session.
    pub async fn on_press(&mut self) {
        if !self.state.is_idle() {
            tracing::debug!("Press dropped: session already {}", self.state);
            return;
        }

        match self.capture.begin().await {
            Ok(()) => {
                self.set_state(
                    SessionState::Recording {
                        started_at: Instant::now(),
                    },
                    None,
                );
            }
            Err(e) => {
                tracing::error!("Could not start recording: {}", e);
                self.fail("audio");
            }
        }
    }

    /// Hotkey released: stop recording and run the pipeline to completion.
    /// Ignored when no recording is in progress.
    pub async fn on_release(&mut self) {
        if !self.state.is_recording() {
            tracing::debug!("Release ignored: no recording in progress");
            return;
        }

        let duration = self.state.recording_duration();

        let samples = match self.capture.end().await {
            Ok(samples) => samples,
            Err(e) => {
                tracing::error!("Could not stop recording: {}", e);
                self.fail("audio");
                return;
            }
        };

        if let Some(duration) = duration {
            tracing::debug!(
                "Recorded {:.1}s ({} samples)",
                duration.as_secs_f32(),
                samples.len()
            );
        }

        // Accidental tap or empty capture: nothing worth transcribing
        if samples.len() < MIN_SESSION_SAMPLES {
            tracing::info!(
                "Recording too short ({} samples), discarding",
                samples.len()
            );
            self.set_state(SessionState::Idle, Some("too short"));
            return;
        }

        self.set_state(SessionState::Transcribing, None);
        let transcriber = self.transcriber.clone();
        let transcript =
            match tokio::task::spawn_blocking(move || transcriber.transcribe(&samples)).await {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    tracing::error!("Speech-to-text failed: {}", e);
                    self.fail("stt");
                    return;
                }
                Err(e) => {
                    tracing::error!("Transcription worker failed: {}", e);
                    self.fail("stt");
                    return;
                }
            };

        if transcript.trim().is_empty() {
            tracing::info!("No speech detected");
            self.set_state(SessionState::Idle, Some("no speech"));
            return;
        }

        tracing::info!("Transcribed {} characters", transcript.chars().count());
        tracing::debug!("Transcript: {:?}", preview(&transcript));

        // Formatting failures fall back to the exact raw transcript
        let text = match self.run_formatting(&transcript).await {
            FormattingOutcome::Formatted(formatted) => formatted,
            FormattingOutcome::Skipped(reason) => {
                tracing::debug!("Formatting skipped: {}", reason);
                transcript
            }
            FormattingOutcome::Failed(reason) => {
                tracing::warn!("Formatting failed ({}), injecting raw transcript", reason);
                transcript
            }
        };

        self.set_state(SessionState::Injecting, None);
        match self.injector.inject(&text).await {
            Ok(InjectionOutcome::Injected) => {
                self.set_state(SessionState::Idle, Some("done"));
            }
            Ok(InjectionOutcome::ClipboardOnly) => {
                self.set_state(SessionState::Idle, Some("clipboard-only"));
            }
            Err(e) => {
                tracing::error!("Injection failed: {}", e);
                self.fail("inject");
            }
        }
    }

    /// Decide whether formatting is engaged for this session and run it.
    /// The Formatting state is published only when the stage actually runs.
    async fn run_formatting(&mut self, transcript: &str) -> FormattingOutcome {
        let stage = match self.formatting.clone() {
            Some(stage) => stage,
            None => return FormattingOutcome::Skipped("formatting disabled".to_string()),
        };

        let asset = self.assets.current(&self.formatter_model);
        if asset != AssetState::Present {
            return FormattingOutcome::Skipped(format!("model not ready ({})", asset));
        }

        self.set_state(SessionState::Formatting, None);
        stage.run(transcript).await
    }

    /// Publish a state change synchronously before any further work
    fn set_state(&mut self, state: SessionState, detail: Option<&str>) {
        self.state = state.clone();
        self.sink.publish(StatusEvent::Session {
            state,
            detail: detail.map(|d| d.to_string()),
        });
    }

    /// Publish the transient failure state, then settle back to Idle
    fn fail(&mut self, reason: &str) {
        self.set_state(
            SessionState::Failed {
                reason: reason.to_string(),
            },
            None,
        );
        self.set_state(SessionState::Idle, None);
    }
}

/// Shorten a transcript for log output
fn preview(text: &str) -> String {
    if text.chars().count() > 60 {
        format!("{}...", text.chars().take(60).collect::<String>())
    } else {
        text.to_string()
    }
}
