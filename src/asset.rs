//! Formatter model asset management
//!
//! Tracks whether the configured Ollama model is available locally and
//! pulls it on demand. Transitions are reported to the status sink so the
//! UI can show download progress. A second ensure() for a model already
//! being pulled attaches to the in-flight transfer instead of starting
//! another one.

use crate::error::AssetError;
use crate::status::{StatusEvent, StatusSink};
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};

/// Lifecycle of a model asset
#[derive(Debug, Clone, PartialEq)]
pub enum AssetState {
    /// Not available locally and no transfer running
    NotPresent,
    /// Transfer in progress; fraction is completed/total when known
    Downloading(Option<f32>),
    /// Ready for use
    Present,
    /// Last attempt failed; stays until a later ensure() starts fresh
    Error(String),
}

impl std::fmt::Display for AssetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetState::NotPresent => write!(f, "not present"),
            AssetState::Downloading(Some(fraction)) => {
                write!(f, "downloading {:.0}%", fraction * 100.0)
            }
            AssetState::Downloading(None) => write!(f, "downloading"),
            AssetState::Present => write!(f, "present"),
            AssetState::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}

/// Backend that can check for and pull models.
///
/// Implementations are blocking; the manager invokes them from
/// spawn_blocking workers.
pub trait ModelFetcher: Send + Sync {
    /// Whether the model is already available locally
    fn is_present(&self, model: &str) -> Result<bool, AssetError>;

    /// Pull the model, reporting progress fractions via the callback
    fn pull(&self, model: &str, progress: &dyn Fn(Option<f32>)) -> Result<(), AssetError>;
}

/// Fetcher backed by a local Ollama server
pub struct OllamaFetcher {
    agent: ureq::Agent,
    endpoint: String,
}

impl OllamaFetcher {
    pub fn new(endpoint: &str) -> Self {
        // Pulls stream for minutes; only bound the connect phase
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .build();
        Self {
            agent,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }
}

impl ModelFetcher for OllamaFetcher {
    fn is_present(&self, model: &str) -> Result<bool, AssetError> {
        let url = format!("{}/api/tags", self.endpoint);
        let response = self.agent.get(&url).call().map_err(map_ureq_error)?;

        let json: serde_json::Value = response
            .into_json()
            .map_err(|e| AssetError::PullFailed(format!("malformed tags response: {}", e)))?;

        let present = json["models"]
            .as_array()
            .map(|models| {
                models.iter().any(|m| {
                    m["name"]
                        .as_str()
                        .map(|name| model_matches(name, model))
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false);

        Ok(present)
    }

    fn pull(&self, model: &str, progress: &dyn Fn(Option<f32>)) -> Result<(), AssetError> {
        let url = format!("{}/api/pull", self.endpoint);
        let response = self
            .agent
            .post(&url)
            .send_json(serde_json::json!({ "name": model, "stream": true }))
            .map_err(map_ureq_error)?;

        // The reply is NDJSON; each line reports a pull phase
        let reader = BufReader::new(response.into_reader());
        for line in reader.lines() {
            let line = line.map_err(|e| AssetError::PullFailed(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }

            let update: serde_json::Value = serde_json::from_str(&line)
                .map_err(|e| AssetError::PullFailed(format!("malformed pull line: {}", e)))?;

            if let Some(err) = update["error"].as_str() {
                return Err(AssetError::PullFailed(err.to_string()));
            }

            match (update["completed"].as_f64(), update["total"].as_f64()) {
                (Some(completed), Some(total)) if total > 0.0 => {
                    progress(Some((completed / total) as f32));
                }
                _ => progress(None),
            }

            if update["status"].as_str() == Some("success") {
                return Ok(());
            }
        }

        // Stream ended without an explicit success line; Ollama treats
        // that as completion
        Ok(())
    }
}

fn map_ureq_error(e: ureq::Error) -> AssetError {
    match e {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            AssetError::Api(code, body.chars().take(200).collect())
        }
        ureq::Error::Transport(t) => AssetError::Unreachable(t.to_string()),
    }
}

/// Ollama tags report fully qualified names ("qwen2.5:7b"); a bare model
/// name matches its ":latest" tag.
fn model_matches(tag_name: &str, wanted: &str) -> bool {
    tag_name == wanted || (!wanted.contains(':') && tag_name == format!("{}:latest", wanted))
}

/// Tracks formatter model assets and shares in-flight transfers
pub struct AssetManager {
    fetcher: Arc<dyn ModelFetcher>,
    sink: Arc<dyn StatusSink>,
    /// Last known state per model, for the non-blocking current() snapshot
    known: StdMutex<HashMap<String, AssetState>>,
    /// In-flight ensures; late callers subscribe instead of re-pulling
    inflight: Mutex<HashMap<String, watch::Receiver<AssetState>>>,
}

impl AssetManager {
    pub fn new(fetcher: Arc<dyn ModelFetcher>, sink: Arc<dyn StatusSink>) -> Self {
        Self {
            fetcher,
            sink,
            known: StdMutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Non-blocking snapshot of the last known state.
    /// A model that was never checked reports NotPresent.
    pub fn current(&self, model: &str) -> AssetState {
        self.known_lock()
            .get(model)
            .cloned()
            .unwrap_or(AssetState::NotPresent)
    }

    /// Make sure the model is available, pulling it when necessary.
    ///
    /// Returns the terminal state (Present or Error). Concurrent calls for
    /// the same model share one check/pull; there is no automatic retry
    /// after an Error.
    pub async fn ensure(&self, model: &str) -> AssetState {
        let tx = {
            let mut inflight = self.inflight.lock().await;
            if let Some(rx) = inflight.get(model) {
                let mut rx = rx.clone();
                drop(inflight);
                tracing::debug!("Attaching to in-flight ensure of {}", model);
                return wait_terminal(&mut rx).await;
            }

            let (tx, rx) = watch::channel(AssetState::NotPresent);
            inflight.insert(model.to_string(), rx);
            tx
        };

        let terminal = self.run_ensure(model, &tx).await;

        // Broadcast the terminal state, then retire the in-flight entry
        let _ = tx.send(terminal.clone());
        self.inflight.lock().await.remove(model);

        terminal
    }

    async fn run_ensure(&self, model: &str, tx: &watch::Sender<AssetState>) -> AssetState {
        // Presence check on a blocking worker
        let fetcher = self.fetcher.clone();
        let check_model = model.to_string();
        let present = tokio::task::spawn_blocking(move || fetcher.is_present(&check_model)).await;

        match present {
            Ok(Ok(true)) => {
                tracing::debug!("Model {} already present", model);
                let state = AssetState::Present;
                self.set_state(model, state.clone());
                return state;
            }
            Ok(Ok(false)) => {}
            Ok(Err(e)) => {
                tracing::warn!("Cannot check model {}: {}", model, e);
                let state = AssetState::Error(e.to_string());
                self.set_state(model, state.clone());
                return state;
            }
            Err(e) => {
                let state = AssetState::Error(format!("presence check failed: {}", e));
                self.set_state(model, state.clone());
                return state;
            }
        }

        tracing::info!("Pulling model {} (this can take a while)", model);
        let state = AssetState::Downloading(None);
        self.set_state(model, state.clone());
        let _ = tx.send(state);

        // Pull on a blocking worker, forwarding progress over a channel
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<Option<f32>>();
        let fetcher = self.fetcher.clone();
        let pull_model = model.to_string();

        let mut worker = tokio::task::spawn_blocking(move || {
            fetcher.pull(&pull_model, &move |fraction| {
                let _ = progress_tx.send(fraction);
            })
        });

        // Publish at whole-percent granularity to keep the sink quiet
        let mut last_percent: Option<u32> = None;
        let result = loop {
            tokio::select! {
                update = progress_rx.recv() => {
                    match update {
                        Some(fraction) => {
                            let percent =
                                fraction.map(|f| (f.clamp(0.0, 1.0) * 100.0) as u32);
                            if percent != last_percent {
                                last_percent = percent;
                                let state = AssetState::Downloading(fraction);
                                self.set_state(model, state.clone());
                                let _ = tx.send(state);
                            }
                        }
                        // Sender gone, the worker is wrapping up
                        None => break worker.await,
                    }
                }
                result = &mut worker => break result,
            }
        };

        let terminal = match result {
            Ok(Ok(())) => {
                tracing::info!("Model {} ready", model);
                AssetState::Present
            }
            Ok(Err(e)) => {
                tracing::warn!("Pull of {} failed: {}", model, e);
                AssetState::Error(e.to_string())
            }
            Err(e) => AssetState::Error(format!("pull worker failed: {}", e)),
        };

        self.set_state(model, terminal.clone());
        terminal
    }

    /// Record a state change and publish it
    fn set_state(&self, model: &str, state: AssetState) {
        self.known_lock().insert(model.to_string(), state.clone());
        self.sink.publish(StatusEvent::Asset {
            model: model.to_string(),
            state,
        });
    }

    fn known_lock(&self) -> MutexGuard<'_, HashMap<String, AssetState>> {
        match self.known.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Wait on an in-flight transfer until it reaches a terminal state
async fn wait_terminal(rx: &mut watch::Receiver<AssetState>) -> AssetState {
    loop {
        {
            let current = rx.borrow();
            if matches!(*current, AssetState::Present | AssetState::Error(_)) {
                return current.clone();
            }
        }
        if rx.changed().await.is_err() {
            // Driver went away; report whatever was last seen
            return rx.borrow().clone();
        }
    }
}
