//! Long-running daemon process
//!
//! Owns the long-lived components (hotkey monitor, session controller,
//! asset manager) and the signal handlers, and forwards trigger events to
//! the controller one at a time.

use crate::asset::{AssetManager, AssetState, OllamaFetcher};
use crate::audio;
use crate::config::{Config, HotkeyConfig, NotificationConfig};
use crate::error::{HotkeyError, Result, VoxbridgeError};
use crate::format::{FormattingStage, OllamaFormatter};
use crate::hotkey::{self, HotkeyEvent, HotkeyMonitor};
use crate::inject;
use crate::notification;
use crate::session::SessionController;
use crate::state::SessionState;
use crate::status::{StatusEvent, StatusSink};
use crate::transcribe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;

/// Best-effort write of a runtime file (state word or PID), creating the
/// directory if needed. Returns false when the write did not happen.
fn write_runtime_file(path: &Path, contents: &str) -> bool {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Failed to create {:?}: {}", parent, e);
            return false;
        }
    }
    match std::fs::write(path, contents) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Failed to write {:?}: {}", path, e);
            false
        }
    }
}

/// Remove a runtime file at shutdown
fn remove_runtime_file(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!("Failed to remove {:?}: {}", path, e);
        }
    }
}

fn unix_signal(kind: SignalKind, name: &str) -> Result<Signal> {
    signal(kind)
        .map_err(|e| VoxbridgeError::Config(format!("Failed to set up {} handler: {}", name, e)))
}

/// Status sink for the daemon: state file, desktop notifications, logs.
///
/// publish() must stay cheap, so notify-send is spawned without waiting
/// and file writes are small. It never calls back into the pipeline.
pub struct DaemonPresenter {
    state_file_path: Option<PathBuf>,
    notifications: NotificationConfig,
}

impl DaemonPresenter {
    pub fn new(state_file_path: Option<PathBuf>, notifications: NotificationConfig) -> Self {
        Self {
            state_file_path,
            notifications,
        }
    }

    fn update_state_file(&self, word: &str) {
        if let Some(ref path) = self.state_file_path {
            if write_runtime_file(path, word) {
                tracing::trace!("State file updated: {}", word);
            }
        }
    }
}

impl StatusSink for DaemonPresenter {
    fn publish(&self, event: StatusEvent) {
        match event {
            StatusEvent::Session { state, detail } => {
                self.update_state_file(state.as_str());

                match (&state, detail.as_deref()) {
                    (SessionState::Recording { .. }, _) => {
                        tracing::info!("Recording started");
                        if self.notifications.on_recording_start {
                            notification::send_sync("Recording", "Listening...");
                        }
                    }
                    (SessionState::Failed { reason }, _) => {
                        if self.notifications.on_error {
                            notification::send_sync("Dictation failed", reason);
                        }
                    }
                    (SessionState::Idle, Some("done")) => {
                        if self.notifications.on_complete {
                            notification::send_sync("Dictation complete", "Text inserted");
                        }
                    }
                    (SessionState::Idle, Some("clipboard-only")) => {
                        if self.notifications.on_complete {
                            notification::send_sync(
                                "Dictation complete",
                                "Text copied to clipboard, paste manually",
                            );
                        }
                    }
                    (SessionState::Idle, Some("too short")) => {
                        if self.notifications.on_complete {
                            notification::send_sync("Nothing recorded", "Recording too short");
                        }
                    }
                    (SessionState::Idle, Some("no speech")) => {
                        if self.notifications.on_complete {
                            notification::send_sync("Nothing recorded", "No speech detected");
                        }
                    }
                    _ => {}
                }
            }
            StatusEvent::Asset { model, state } => {
                tracing::debug!("Model {}: {}", model, state);
            }
        }
    }
}

/// Main daemon that owns all components
pub struct Daemon {
    config: Config,
    state_file_path: Option<PathBuf>,
    pid_file_path: Option<PathBuf>,
}

impl Daemon {
    /// A daemon for `config`, pipeline not yet assembled
    pub fn new(config: Config) -> Self {
        let state_file_path = config.resolve_state_file();

        Self {
            config,
            state_file_path,
            pid_file_path: None,
        }
    }

    /// Bring the pipeline up and run until SIGINT or SIGTERM
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("Starting voxbridge daemon");

        // PID file lets `voxbridge record` find us for signal triggers
        let pid_path = Config::runtime_dir().join("pid");
        if write_runtime_file(&pid_path, &std::process::id().to_string()) {
            tracing::debug!("PID file written: {:?}", pid_path);
            self.pid_file_path = Some(pid_path);
        }

        let mut sigusr1 = unix_signal(SignalKind::user_defined1(), "SIGUSR1")?;
        let mut sigusr2 = unix_signal(SignalKind::user_defined2(), "SIGUSR2")?;
        let mut sigterm = unix_signal(SignalKind::terminate(), "SIGTERM")?;

        Config::ensure_directories().map_err(|e| {
            VoxbridgeError::Config(format!("Failed to create directories: {}", e))
        })?;

        if let Some(ref path) = self.state_file_path {
            tracing::info!("Publishing state to {}", path.display());
        }

        // Status sink shared by the controller and the asset manager
        let presenter: Arc<dyn StatusSink> = Arc::new(DaemonPresenter::new(
            self.state_file_path.clone(),
            self.config.notification.clone(),
        ));

        // Components. The capture instance is reused across sessions; the
        // transcriber factory handles preload vs lazy loading.
        let capture = audio::create_capture(&self.config.audio)?;
        let transcriber = transcribe::create_transcriber(&self.config.whisper)?;
        let injector = inject::create_injector(&self.config.inject);

        let assets = Arc::new(AssetManager::new(
            Arc::new(OllamaFetcher::new(&self.config.formatter.endpoint)),
            presenter.clone(),
        ));

        let formatting = if self.config.formatter.enabled {
            tracing::info!(
                "Formatting with {} via {}",
                self.config.formatter.model,
                self.config.formatter.endpoint
            );
            let formatter = OllamaFormatter::new(&self.config.formatter);
            Some(FormattingStage::new(
                Arc::new(formatter),
                Duration::from_secs(self.config.formatter.timeout_secs),
            ))
        } else {
            tracing::info!("Formatting disabled, raw transcripts will be injected");
            None
        };

        let mut controller = SessionController::new(
            capture,
            transcriber,
            formatting,
            self.config.formatter.model.clone(),
            injector,
            assets.clone(),
            presenter.clone(),
        );

        // Materialize the formatter model in the background. Sessions run
        // without formatting until it reports Present.
        if self.config.formatter.enabled {
            let assets = assets.clone();
            let model = self.config.formatter.model.clone();
            let endpoint = self.config.formatter.endpoint.clone();
            tokio::spawn(async move {
                match assets.ensure(&model).await {
                    AssetState::Present => {
                        tracing::info!("Formatter model {} ready", model);
                    }
                    AssetState::Error(reason) => {
                        tracing::warn!(
                            "Ollama not available at {} ({}). Continuing without formatting.",
                            endpoint,
                            reason
                        );
                    }
                    other => {
                        tracing::warn!("Formatter model {} not ready: {}", model, other);
                    }
                }
            });
        }

        // Hotkey monitor. Permission problems are non-fatal because the
        // signal trigger path keeps working.
        let mut monitor: Option<Box<dyn HotkeyMonitor>> = None;
        let mut hotkey_rx: Option<mpsc::Receiver<HotkeyEvent>> = None;
        if self.config.hotkey.enabled {
            match start_monitor(&self.config.hotkey).await {
                Ok((m, rx)) => {
                    tracing::info!(
                        "Hotkey: {} (hold to record, release to transcribe)",
                        self.config.hotkey.key
                    );
                    monitor = Some(m);
                    hotkey_rx = Some(rx);
                }
                Err(e) if e.is_permission_denied() => {
                    tracing::warn!("{}", e);
                    tracing::warn!(
                        "Hotkey disabled; 'voxbridge record' and compositor keybindings still work"
                    );
                    notification::send_sync(
                        "Hotkey unavailable",
                        "Check input group membership. Signal triggers still work.",
                    );
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            tracing::info!(
                "Built-in hotkey disabled, use 'voxbridge record' or compositor keybindings"
            );
        }

        // External consumers see Idle as soon as the daemon is up
        presenter.publish(StatusEvent::Session {
            state: SessionState::Idle,
            detail: None,
        });

        loop {
            tokio::select! {
                // Hotkey events, when the monitor is running
                Some(hotkey_event) = async {
                    match &mut hotkey_rx {
                        Some(rx) => rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => {
                    match hotkey_event {
                        HotkeyEvent::Pressed => controller.on_press().await,
                        HotkeyEvent::Released => {
                            controller.on_release().await;
                            drain_hotkey_events(&mut hotkey_rx);
                        }
                    }
                }

                // SIGUSR1 - start recording (for compositor keybindings)
                _ = sigusr1.recv() => {
                    tracing::debug!("SIGUSR1: start recording");
                    controller.on_press().await;
                }

                // SIGUSR2 - stop recording and run the pipeline
                _ = sigusr2.recv() => {
                    tracing::debug!("SIGUSR2: stop recording");
                    controller.on_release().await;
                    drain_hotkey_events(&mut hotkey_rx);
                }

                // Graceful shutdown (SIGINT from Ctrl+C)
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("SIGINT, shutting down");
                    break;
                }

                // Graceful shutdown (SIGTERM from systemctl stop)
                _ = sigterm.recv() => {
                    tracing::info!("SIGTERM, shutting down");
                    break;
                }
            }
        }

        // Cleanup
        if let Some(mut monitor) = monitor {
            monitor.stop().await?;
        }

        if let Some(ref path) = self.state_file_path {
            remove_runtime_file(path);
        }
        if let Some(ref path) = self.pid_file_path {
            remove_runtime_file(path);
        }

        tracing::info!("Daemon exited");

        Ok(())
    }
}

/// Create and start the hotkey monitor, returning it with its event stream
async fn start_monitor(
    config: &HotkeyConfig,
) -> std::result::Result<(Box<dyn HotkeyMonitor>, mpsc::Receiver<HotkeyEvent>), HotkeyError> {
    let mut monitor = hotkey::create_monitor(config)?;
    let rx = monitor.start().await?;
    Ok((monitor, rx))
}

/// Drop hotkey events that queued up while a session was running.
/// A press never queues: it either starts a session or it is dropped.
fn drain_hotkey_events(hotkey_rx: &mut Option<mpsc::Receiver<HotkeyEvent>>) {
    if let Some(rx) = hotkey_rx {
        while let Ok(event) = rx.try_recv() {
            tracing::debug!("Dropping hotkey event received while busy: {:?}", event);
        }
    }
}
