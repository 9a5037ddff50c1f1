//! End-to-end dictation session tests with scripted component stubs
//!
//! These tests drive the SessionController through complete sessions and
//! verify the published state sequence, the text handed to the injector,
//! and the drop/skip/fallback rules, without microphones, models, or a
//! compositor.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use voxbridge::asset::{AssetManager, AssetState, ModelFetcher};
use voxbridge::audio::{AudioBuffer, AudioCapture};
use voxbridge::error::{AssetError, AudioError, FormatError, InjectError, TranscribeError};
use voxbridge::format::{FormattingStage, TextFormatter};
use voxbridge::inject::{InjectionOutcome, Injector};
use voxbridge::session::SessionController;
use voxbridge::state::SessionState;
use voxbridge::status::{StatusEvent, StatusSink};
use voxbridge::transcribe::Transcriber;

const TEST_MODEL: &str = "test-model";

// ============================================================================
// Stub components
// ============================================================================

/// Capture stub that hands out one scripted buffer per session
struct ScriptedCapture {
    buffers: Mutex<VecDeque<AudioBuffer>>,
    begins: Arc<AtomicUsize>,
}

impl ScriptedCapture {
    fn new(buffers: Vec<AudioBuffer>) -> Box<Self> {
        Self::counting(buffers, Arc::new(AtomicUsize::new(0)))
    }

    fn counting(buffers: Vec<AudioBuffer>, begins: Arc<AtomicUsize>) -> Box<Self> {
        Box::new(Self {
            buffers: Mutex::new(buffers.into()),
            begins,
        })
    }
}

#[async_trait]
impl AudioCapture for ScriptedCapture {
    async fn begin(&mut self) -> Result<(), AudioError> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn end(&mut self) -> Result<AudioBuffer, AudioError> {
        Ok(self
            .buffers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }
}

/// Capture stub whose stream never starts
struct BrokenCapture;

#[async_trait]
impl AudioCapture for BrokenCapture {
    async fn begin(&mut self) -> Result<(), AudioError> {
        Err(AudioError::Connection("no input device".to_string()))
    }

    async fn end(&mut self) -> Result<AudioBuffer, AudioError> {
        Ok(Vec::new())
    }
}

/// Transcriber stub returning a fixed transcript, counting invocations
struct FixedTranscriber {
    text: String,
    calls: AtomicUsize,
}

impl FixedTranscriber {
    fn new(text: &str) -> Arc<Self> {
        Arc::new(Self {
            text: text.to_string(),
            calls: AtomicUsize::new(0),
        })
    }
}

impl Transcriber for FixedTranscriber {
    fn transcribe(&self, _samples: &[f32]) -> Result<String, TranscribeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }
}

/// Transcriber stub that fails on the first call and succeeds after
struct FlakyTranscriber {
    failed_once: AtomicBool,
}

impl FlakyTranscriber {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            failed_once: AtomicBool::new(false),
        })
    }
}

impl Transcriber for FlakyTranscriber {
    fn transcribe(&self, _samples: &[f32]) -> Result<String, TranscribeError> {
        if !self.failed_once.swap(true, Ordering::SeqCst) {
            Err(TranscribeError::InferenceFailed(
                "decoder returned no tokens".to_string(),
            ))
        } else {
            Ok("second attempt".to_string())
        }
    }
}

/// Formatter stub returning a marked rewrite, counting invocations
struct MarkingFormatter {
    calls: AtomicUsize,
}

impl MarkingFormatter {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TextFormatter for MarkingFormatter {
    async fn format(&self, text: &str) -> Result<String, FormatError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("[formatted] {}", text))
    }

    fn available(&self) -> bool {
        true
    }
}

/// Formatter stub whose backend always errors
struct FailingFormatter;

#[async_trait]
impl TextFormatter for FailingFormatter {
    async fn format(&self, _text: &str) -> Result<String, FormatError> {
        Err(FormatError::Api(500, "model crashed".to_string()))
    }

    fn available(&self) -> bool {
        true
    }
}

/// Formatter stub that answers slower than the stage timeout
struct SlowFormatter {
    delay: Duration,
}

#[async_trait]
impl TextFormatter for SlowFormatter {
    async fn format(&self, text: &str) -> Result<String, FormatError> {
        tokio::time::sleep(self.delay).await;
        Ok(format!("[late] {}", text))
    }

    fn available(&self) -> bool {
        true
    }
}

/// Injector stub that records what it was asked to insert
struct RecordingInjector {
    outcome: InjectionOutcome,
    injected: Mutex<Vec<String>>,
}

impl RecordingInjector {
    fn new(outcome: InjectionOutcome) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            injected: Mutex::new(Vec::new()),
        })
    }

    fn injected(&self) -> Vec<String> {
        self.injected.lock().unwrap().clone()
    }
}

#[async_trait]
impl Injector for RecordingInjector {
    async fn inject(&self, text: &str) -> Result<InjectionOutcome, InjectError> {
        self.injected.lock().unwrap().push(text.to_string());
        Ok(self.outcome)
    }
}

/// Injector stub that cannot even reach the clipboard
struct BrokenInjector;

#[async_trait]
impl Injector for BrokenInjector {
    async fn inject(&self, _text: &str) -> Result<InjectionOutcome, InjectError> {
        Err(InjectError::Clipboard("wl-copy exited with status 1".to_string()))
    }
}

/// Fetcher stub reporting every model as already pulled
struct PresentFetcher;

impl ModelFetcher for PresentFetcher {
    fn is_present(&self, _model: &str) -> Result<bool, AssetError> {
        Ok(true)
    }

    fn pull(&self, _model: &str, _progress: &dyn Fn(Option<f32>)) -> Result<(), AssetError> {
        Ok(())
    }
}

/// Sink that records every published session transition in order
#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<(String, Option<String>)>>,
}

impl RecordingSink {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn session_events(&self) -> Vec<(String, Option<String>)> {
        self.events.lock().unwrap().clone()
    }
}

impl StatusSink for RecordingSink {
    fn publish(&self, event: StatusEvent) {
        if let StatusEvent::Session { state, detail } = event {
            let label = match &state {
                SessionState::Failed { reason } => format!("failed({})", reason),
                other => other.as_str().to_string(),
            };
            self.events.lock().unwrap().push((label, detail));
        }
    }
}

// ============================================================================
// Wiring helpers
// ============================================================================

/// One second of quiet 16kHz audio, comfortably above the length floor
fn speech() -> AudioBuffer {
    vec![0.1; 16000]
}

/// An accidental tap: well under the minimum session length
fn tap() -> AudioBuffer {
    vec![0.1; 800]
}

fn stage(formatter: Arc<dyn TextFormatter>, timeout_ms: u64) -> FormattingStage {
    FormattingStage::new(formatter, Duration::from_millis(timeout_ms))
}

fn ev(state: &str, detail: Option<&str>) -> (String, Option<String>) {
    (state.to_string(), detail.map(|d| d.to_string()))
}

/// Assemble a controller around the given stubs. When `model_ready` is
/// set, the formatter model is materialized first, the way the daemon
/// does at startup.
async fn controller_with(
    capture: Box<dyn AudioCapture>,
    transcriber: Arc<dyn Transcriber>,
    formatting: Option<FormattingStage>,
    model_ready: bool,
    injector: Arc<dyn Injector>,
    sink: Arc<RecordingSink>,
) -> SessionController {
    let assets = Arc::new(AssetManager::new(
        Arc::new(PresentFetcher),
        sink.clone() as Arc<dyn StatusSink>,
    ));
    if model_ready {
        assert_eq!(assets.ensure(TEST_MODEL).await, AssetState::Present);
    }

    SessionController::new(
        capture,
        transcriber,
        formatting,
        TEST_MODEL.to_string(),
        injector,
        assets,
        sink as Arc<dyn StatusSink>,
    )
}

// ============================================================================
// Happy paths
// ============================================================================

#[tokio::test]
async fn full_session_with_formatting() {
    let sink = RecordingSink::new();
    let transcriber = FixedTranscriber::new("hello world");
    let formatter = MarkingFormatter::new();
    let injector = RecordingInjector::new(InjectionOutcome::Injected);

    let mut controller = controller_with(
        ScriptedCapture::new(vec![speech()]),
        transcriber.clone(),
        Some(stage(formatter.clone(), 500)),
        true,
        injector.clone(),
        sink.clone(),
    )
    .await;

    controller.on_press().await;
    controller.on_release().await;

    assert_eq!(
        sink.session_events(),
        vec![
            ev("recording", None),
            ev("transcribing", None),
            ev("formatting", None),
            ev("injecting", None),
            ev("idle", Some("done")),
        ]
    );
    assert_eq!(injector.injected(), vec!["[formatted] hello world"]);
    assert_eq!(formatter.calls.load(Ordering::SeqCst), 1);
    assert!(controller.is_idle());
}

#[tokio::test]
async fn formatting_disabled_injects_exact_raw_transcript() {
    let sink = RecordingSink::new();
    let injector = RecordingInjector::new(InjectionOutcome::Injected);

    let mut controller = controller_with(
        ScriptedCapture::new(vec![speech()]),
        FixedTranscriber::new("Raw transcript, as heard."),
        None,
        true,
        injector.clone(),
        sink.clone(),
    )
    .await;

    controller.on_press().await;
    controller.on_release().await;

    // No formatting state is published when the stage is disabled
    assert_eq!(
        sink.session_events(),
        vec![
            ev("recording", None),
            ev("transcribing", None),
            ev("injecting", None),
            ev("idle", Some("done")),
        ]
    );
    assert_eq!(injector.injected(), vec!["Raw transcript, as heard."]);
}

#[tokio::test]
async fn formatting_skipped_while_model_not_ready() {
    let sink = RecordingSink::new();
    let formatter = MarkingFormatter::new();
    let injector = RecordingInjector::new(InjectionOutcome::Injected);

    // Formatting is enabled but the model was never materialized
    let mut controller = controller_with(
        ScriptedCapture::new(vec![speech()]),
        FixedTranscriber::new("untouched"),
        Some(stage(formatter.clone(), 500)),
        false,
        injector.clone(),
        sink.clone(),
    )
    .await;

    controller.on_press().await;
    controller.on_release().await;

    assert_eq!(
        sink.session_events(),
        vec![
            ev("recording", None),
            ev("transcribing", None),
            ev("injecting", None),
            ev("idle", Some("done")),
        ]
    );
    assert_eq!(injector.injected(), vec!["untouched"]);
    assert_eq!(formatter.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn clipboard_only_is_reported_as_degraded_success() {
    let sink = RecordingSink::new();
    let injector = RecordingInjector::new(InjectionOutcome::ClipboardOnly);

    let mut controller = controller_with(
        ScriptedCapture::new(vec![speech()]),
        FixedTranscriber::new("paste me"),
        None,
        true,
        injector.clone(),
        sink.clone(),
    )
    .await;

    controller.on_press().await;
    controller.on_release().await;

    let events = sink.session_events();
    assert_eq!(
        events.last(),
        Some(&ev("idle", Some("clipboard-only"))),
        "degraded injection should still settle Idle: {:?}",
        events
    );
    assert_eq!(injector.injected(), vec!["paste me"]);
    assert!(controller.is_idle());
}

// ============================================================================
// Dropped and degenerate input
// ============================================================================

#[tokio::test]
async fn press_while_busy_is_dropped() {
    let sink = RecordingSink::new();
    let begins = Arc::new(AtomicUsize::new(0));
    let injector = RecordingInjector::new(InjectionOutcome::Injected);

    let mut controller = controller_with(
        ScriptedCapture::counting(vec![speech()], begins.clone()),
        FixedTranscriber::new("one session"),
        None,
        true,
        injector.clone(),
        sink.clone(),
    )
    .await;

    controller.on_press().await;
    // Second press arrives while the first session is still recording
    controller.on_press().await;
    controller.on_release().await;

    let events = sink.session_events();
    let recordings = events.iter().filter(|(s, _)| s == "recording").count();
    assert_eq!(recordings, 1, "dropped press must not publish Recording");
    assert_eq!(injector.injected(), vec!["one session"]);
    // The capture was only started once
    assert_eq!(begins.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn release_without_recording_is_ignored() {
    let sink = RecordingSink::new();
    let injector = RecordingInjector::new(InjectionOutcome::Injected);

    let mut controller = controller_with(
        ScriptedCapture::new(vec![]),
        FixedTranscriber::new("never"),
        None,
        true,
        injector.clone(),
        sink.clone(),
    )
    .await;

    controller.on_release().await;

    assert!(sink.session_events().is_empty());
    assert!(injector.injected().is_empty());
}

#[tokio::test]
async fn degenerate_tap_skips_transcription() {
    let sink = RecordingSink::new();
    let transcriber = FixedTranscriber::new("should never run");
    let injector = RecordingInjector::new(InjectionOutcome::Injected);

    let mut controller = controller_with(
        ScriptedCapture::new(vec![tap()]),
        transcriber.clone(),
        None,
        true,
        injector.clone(),
        sink.clone(),
    )
    .await;

    controller.on_press().await;
    controller.on_release().await;

    assert_eq!(
        sink.session_events(),
        vec![ev("recording", None), ev("idle", Some("too short"))]
    );
    assert_eq!(transcriber.calls.load(Ordering::SeqCst), 0);
    assert!(injector.injected().is_empty());
}

#[tokio::test]
async fn empty_transcript_skips_formatting_and_injection() {
    let sink = RecordingSink::new();
    let formatter = MarkingFormatter::new();
    let injector = RecordingInjector::new(InjectionOutcome::Injected);

    let mut controller = controller_with(
        ScriptedCapture::new(vec![speech()]),
        FixedTranscriber::new("   \n"),
        Some(stage(formatter.clone(), 500)),
        true,
        injector.clone(),
        sink.clone(),
    )
    .await;

    controller.on_press().await;
    controller.on_release().await;

    assert_eq!(
        sink.session_events(),
        vec![
            ev("recording", None),
            ev("transcribing", None),
            ev("idle", Some("no speech")),
        ]
    );
    assert_eq!(formatter.calls.load(Ordering::SeqCst), 0);
    assert!(injector.injected().is_empty());
}

// ============================================================================
// Formatter fallback
// ============================================================================

#[tokio::test]
async fn formatter_failure_falls_back_to_raw_transcript() {
    let sink = RecordingSink::new();
    let injector = RecordingInjector::new(InjectionOutcome::Injected);

    let mut controller = controller_with(
        ScriptedCapture::new(vec![speech()]),
        FixedTranscriber::new("keep the raw words"),
        Some(stage(Arc::new(FailingFormatter), 500)),
        true,
        injector.clone(),
        sink.clone(),
    )
    .await;

    controller.on_press().await;
    controller.on_release().await;

    // The session still completes through Injecting, with raw text
    assert_eq!(
        sink.session_events(),
        vec![
            ev("recording", None),
            ev("transcribing", None),
            ev("formatting", None),
            ev("injecting", None),
            ev("idle", Some("done")),
        ]
    );
    assert_eq!(injector.injected(), vec!["keep the raw words"]);
}

#[tokio::test]
async fn formatter_timeout_falls_back_to_raw_transcript() {
    let sink = RecordingSink::new();
    let injector = RecordingInjector::new(InjectionOutcome::Injected);

    let slow = Arc::new(SlowFormatter {
        delay: Duration::from_millis(300),
    });

    let mut controller = controller_with(
        ScriptedCapture::new(vec![speech()]),
        FixedTranscriber::new("delivered on time"),
        Some(stage(slow, 30)),
        true,
        injector.clone(),
        sink.clone(),
    )
    .await;

    controller.on_press().await;
    controller.on_release().await;

    assert_eq!(
        sink.session_events(),
        vec![
            ev("recording", None),
            ev("transcribing", None),
            ev("formatting", None),
            ev("injecting", None),
            ev("idle", Some("done")),
        ]
    );
    assert_eq!(injector.injected(), vec!["delivered on time"]);
}

// ============================================================================
// Failures settle back to Idle
// ============================================================================

#[tokio::test]
async fn capture_failure_reports_audio_and_recovers() {
    let sink = RecordingSink::new();
    let injector = RecordingInjector::new(InjectionOutcome::Injected);

    let mut controller = controller_with(
        Box::new(BrokenCapture),
        FixedTranscriber::new("never"),
        None,
        true,
        injector.clone(),
        sink.clone(),
    )
    .await;

    controller.on_press().await;

    assert_eq!(
        sink.session_events(),
        vec![ev("failed(audio)", None), ev("idle", None)]
    );
    assert!(controller.is_idle());
    assert!(injector.injected().is_empty());
}

#[tokio::test]
async fn transcription_failure_reports_stt_and_next_session_works() {
    let sink = RecordingSink::new();
    let injector = RecordingInjector::new(InjectionOutcome::Injected);

    let mut controller = controller_with(
        ScriptedCapture::new(vec![speech(), speech()]),
        FlakyTranscriber::new(),
        None,
        true,
        injector.clone(),
        sink.clone(),
    )
    .await;

    controller.on_press().await;
    controller.on_release().await;

    assert_eq!(
        sink.session_events(),
        vec![
            ev("recording", None),
            ev("transcribing", None),
            ev("failed(stt)", None),
            ev("idle", None),
        ]
    );
    assert!(controller.is_idle());
    assert!(injector.injected().is_empty());

    // The transient failure must not wedge the controller
    controller.on_press().await;
    controller.on_release().await;

    assert_eq!(injector.injected(), vec!["second attempt"]);
    assert_eq!(
        sink.session_events().last(),
        Some(&ev("idle", Some("done")))
    );
}

#[tokio::test]
async fn injection_failure_reports_inject() {
    let sink = RecordingSink::new();

    let mut controller = controller_with(
        ScriptedCapture::new(vec![speech()]),
        FixedTranscriber::new("lost words"),
        None,
        true,
        Arc::new(BrokenInjector),
        sink.clone(),
    )
    .await;

    controller.on_press().await;
    controller.on_release().await;

    assert_eq!(
        sink.session_events(),
        vec![
            ev("recording", None),
            ev("transcribing", None),
            ev("injecting", None),
            ev("failed(inject)", None),
            ev("idle", None),
        ]
    );
    assert!(controller.is_idle());
}
