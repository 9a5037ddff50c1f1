//! Whisper-based speech-to-text
//!
//! Runs whisper.cpp locally through the whisper-rs bindings.

use super::Transcriber;
use crate::config::{Config, WhisperConfig};
use crate::error::TranscribeError;
use std::path::PathBuf;
use std::sync::Mutex;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

/// Beam width for decoding. Beam search is noticeably more accurate than
/// greedy sampling on short dictation clips at a modest latency cost.
const BEAM_SIZE: i32 = 5;

/// Transcriber holding a loaded whisper model
pub struct WhisperTranscriber {
    ctx: WhisperContext,
    language: String,
    translate: bool,
    threads: usize,
}

impl WhisperTranscriber {
    pub fn new(config: &WhisperConfig) -> Result<Self, TranscribeError> {
        let model_path = locate_model_file(&config.model)?;

        tracing::info!("Loading whisper model: {}", model_path.display());
        let start = std::time::Instant::now();
        let ctx = WhisperContext::new_with_params(
            model_path.to_str().ok_or_else(|| {
                TranscribeError::ModelNotFound("Model path is not valid UTF-8".to_string())
            })?,
            WhisperContextParameters::default(),
        )
        .map_err(|e| TranscribeError::InitFailed(e.to_string()))?;
        tracing::info!("Whisper model ready after {:.2}s", start.elapsed().as_secs_f32());

        Ok(Self {
            ctx,
            language: config.language.clone(),
            translate: config.translate,
            threads: config.threads.unwrap_or_else(|| num_cpus::get().min(4)),
        })
    }
}

impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, samples: &[f32]) -> Result<String, TranscribeError> {
        if samples.is_empty() {
            return Err(TranscribeError::AudioFormat(
                "Empty audio buffer".to_string(),
            ));
        }

        let duration_secs = samples.len() as f32 / 16000.0;
        let start = std::time::Instant::now();

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| TranscribeError::InferenceFailed(e.to_string()))?;

        let mut params = FullParams::new(SamplingStrategy::BeamSearch {
            beam_size: BEAM_SIZE,
            patience: -1.0,
        });
        params.set_language(if self.language == "auto" {
            None
        } else {
            Some(&self.language)
        });
        params.set_translate(self.translate);
        params.set_n_threads(self.threads as i32);

        // whisper.cpp prints its own chatter to stdout unless silenced
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        params.set_suppress_blank(true);
        params.set_suppress_nst(true);

        // Dictation clips are short. A single segment plus a decoder context
        // sized to the clip cuts latency substantially.
        if duration_secs < 30.0 {
            params.set_single_segment(true);
        }
        if let Some(audio_ctx) = audio_ctx_for(duration_secs) {
            tracing::debug!("audio_ctx={} for {:.2}s clip", audio_ctx, duration_secs);
            params.set_audio_ctx(audio_ctx);
        }

        state
            .full(params, samples)
            .map_err(|e| TranscribeError::InferenceFailed(e.to_string()))?;

        let mut text = String::new();
        for segment in state.as_iter() {
            let piece = segment
                .to_str()
                .map_err(|e| TranscribeError::InferenceFailed(e.to_string()))?;
            text.push_str(piece);
        }
        let transcript = text.trim().to_string();

        // The transcript itself only goes to debug logs, in the session layer
        tracing::info!(
            "Transcribed {:.2}s of audio in {:.2}s ({} chars)",
            duration_secs,
            start.elapsed().as_secs_f32(),
            transcript.chars().count()
        );

        Ok(transcript)
    }
}

/// Defers model loading until the first transcription request.
///
/// Used when `whisper.preload = false`. The first dictation pays the
/// multi-second model load, subsequent ones reuse the loaded context.
pub struct LazyTranscriber {
    config: WhisperConfig,
    inner: Mutex<Option<WhisperTranscriber>>,
}

impl LazyTranscriber {
    pub fn new(config: WhisperConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(None),
        }
    }
}

impl Transcriber for LazyTranscriber {
    fn transcribe(&self, samples: &[f32]) -> Result<String, TranscribeError> {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if guard.is_none() {
            tracing::info!("Loading whisper model on first use");
            *guard = Some(WhisperTranscriber::new(&self.config)?);
        }

        let transcriber = guard
            .as_ref()
            .ok_or_else(|| TranscribeError::InitFailed("model not loaded".to_string()))?;

        transcriber.transcribe(samples)
    }
}

/// Find the model file for a configured model name or path
fn locate_model_file(model: &str) -> Result<PathBuf, TranscribeError> {
    let direct = PathBuf::from(model);
    if direct.is_absolute() && direct.exists() {
        return Ok(direct);
    }

    let filename = match known_model_filename(model) {
        Some(name) => name.to_string(),
        None if model.ends_with(".bin") => model.to_string(),
        None => {
            return Err(TranscribeError::ModelNotFound(format!(
                "'{}' is not a known model. Use tiny, base, small, medium, large-v3, \
                 large-v3-turbo, or a path to a ggml .bin file",
                model
            )));
        }
    };

    // Data dir first, then the working directory for development setups
    let candidates = [
        Config::models_dir().join(&filename),
        PathBuf::from(&filename),
        PathBuf::from("models").join(&filename),
    ];
    if let Some(found) = candidates.iter().find(|p| p.exists()) {
        return Ok(found.clone());
    }

    let searched: Vec<String> = candidates
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect();
    Err(TranscribeError::ModelNotFound(format!(
        "Model '{}' not found. Looked in:\n{}",
        model,
        searched.join("\n")
    )))
}

/// ggml filename for a known model short name
fn known_model_filename(model: &str) -> Option<&'static str> {
    Some(match model {
        "tiny" => "ggml-tiny.bin",
        "tiny.en" => "ggml-tiny.en.bin",
        "base" => "ggml-base.bin",
        "base.en" => "ggml-base.en.bin",
        "small" => "ggml-small.bin",
        "small.en" => "ggml-small.en.bin",
        "medium" => "ggml-medium.bin",
        "medium.en" => "ggml-medium.en.bin",
        "large" | "large-v1" => "ggml-large-v1.bin",
        "large-v2" => "ggml-large-v2.bin",
        "large-v3" => "ggml-large-v3.bin",
        "large-v3-turbo" => "ggml-large-v3-turbo.bin",
        _ => return None,
    })
}

/// Filename a model is stored under; custom names pass through unchanged
pub fn get_model_filename(model: &str) -> String {
    known_model_filename(model).unwrap_or(model).to_string()
}

/// Download URL for a model on the whisper.cpp Hugging Face mirror
pub fn get_model_url(model: &str) -> String {
    format!(
        "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/{}",
        get_model_filename(model)
    )
}

/// Decoder context size for short clips (up to 22.5s): seconds * 50 + 64.
/// Longer clips use the whisper default.
fn audio_ctx_for(duration_secs: f32) -> Option<i32> {
    if duration_secs <= 22.5 {
        Some((duration_secs * 50.0) as i32 + 64)
    } else {
        None
    }
}
