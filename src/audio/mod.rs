//! Audio capture for push-to-talk recording
//!
//! Captures microphone audio using cpal, which works with PipeWire,
//! PulseAudio, and ALSA backends. Recordings are delivered as 16kHz mono
//! f32 samples ready for transcription.

pub mod cpal_capture;

use crate::config::AudioConfig;
use crate::error::AudioError;

pub use crate::state::AudioBuffer;

/// Microphone capture backends implement this
#[async_trait::async_trait]
pub trait AudioCapture: Send + Sync {
    /// Start capturing from the microphone
    async fn begin(&mut self) -> Result<(), AudioError>;

    /// Stop capturing and return everything recorded since begin().
    ///
    /// Returns an empty buffer if nothing was captured (e.g. the stream
    /// produced no callbacks between press and release).
    async fn end(&mut self) -> Result<AudioBuffer, AudioError>;
}

/// Capture backend for the configured device
pub fn create_capture(config: &AudioConfig) -> Result<Box<dyn AudioCapture>, AudioError> {
    Ok(Box::new(cpal_capture::CpalCapture::new(config)?))
}

/// Resample mono audio with linear interpolation.
///
/// Good enough for speech fed into whisper; swap in `rubato` if music-grade
/// quality ever matters. Returns the input unchanged when rates match.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let step = from_rate as f64 / to_rate as f64;
    let out_len = (samples.len() as f64 / step).ceil() as usize;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = pos as usize;
            let frac = (pos - idx as f64) as f32;
            match (samples.get(idx), samples.get(idx + 1)) {
                (Some(&a), Some(&b)) => a + (b - a) * frac,
                (Some(&a), None) => a,
                _ => 0.0,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_same_rate_is_identity() {
        let samples = vec![0.5, -0.5, 0.25, -0.25];
        assert_eq!(resample(&samples, 16000, 16000), samples);
    }

    #[test]
    fn test_resample_48k_to_16k() {
        let samples: Vec<f32> = (0..9).map(|i| i as f32).collect();
        let result = resample(&samples, 48000, 16000);
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_resample_8k_to_16k_doubles() {
        let result = resample(&[1.0, 2.0], 8000, 16000);
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn test_resample_interpolates_between_samples() {
        // Midpoint of 0.0 and 1.0 at 2x upsampling
        let result = resample(&[0.0, 1.0], 8000, 16000);
        assert!((result[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_resample_empty_input() {
        assert!(resample(&[], 48000, 16000).is_empty());
    }
}
