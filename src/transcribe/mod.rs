//! Speech-to-text
//!
//! Provides offline transcription via whisper.cpp (whisper-rs crate).
//! No audio ever leaves the machine.

pub mod whisper;

use crate::config::WhisperConfig;
use crate::error::TranscribeError;
use std::sync::Arc;

/// Trait for speech-to-text implementations.
///
/// Inference is synchronous and CPU-bound; callers run it inside
/// `spawn_blocking` to keep the async runtime responsive.
pub trait Transcriber: Send + Sync {
    /// Turn 16 kHz mono f32 samples into text
    fn transcribe(&self, samples: &[f32]) -> Result<String, TranscribeError>;
}

/// Transcriber for the configured model.
///
/// With `preload = true` the model is loaded immediately so the first
/// dictation doesn't pay the multi-second load cost. Otherwise a lazy
/// wrapper defers loading until the first transcription request.
pub fn create_transcriber(config: &WhisperConfig) -> Result<Arc<dyn Transcriber>, TranscribeError> {
    if config.preload {
        tracing::info!("Preloading whisper model: {}", config.model);
        Ok(Arc::new(whisper::WhisperTranscriber::new(config)?))
    } else {
        tracing::info!("Deferring whisper model load until first use: {}", config.model);
        Ok(Arc::new(whisper::LazyTranscriber::new(config.clone())))
    }
}
