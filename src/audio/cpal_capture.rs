//! Microphone capture through cpal
//!
//! Works against PipeWire, PulseAudio, and raw ALSA through cpal's backends.
//!
//! cpal::Stream is not Send, so the stream lives on a dedicated thread.
//! The only control message is "stop and hand back the samples", so the
//! control channel carries the reply sender directly.

use super::{resample, AudioCapture};
use crate::config::AudioConfig;
use crate::error::AudioError;
use crate::state::AudioBuffer;
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::sync::oneshot;

/// Shared sample buffer with a hard size cap.
///
/// The cap keeps a stuck hotkey from growing the buffer without bound. The
/// stream keeps running when the cap is hit; overflow samples are dropped.
#[derive(Clone)]
struct CaptureSink {
    samples: Arc<Mutex<Vec<f32>>>,
    cap: usize,
}

impl CaptureSink {
    fn new(cap: usize) -> Self {
        Self {
            samples: Arc::new(Mutex::new(Vec::new())),
            cap,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<f32>> {
        match self.samples.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Append samples up to the cap. Returns true if any were discarded.
    fn push(&self, new: &[f32]) -> bool {
        let mut buf = self.lock();
        let room = self.cap.saturating_sub(buf.len());
        if room >= new.len() {
            buf.extend_from_slice(new);
            false
        } else {
            buf.extend_from_slice(&new[..room]);
            true
        }
    }

    fn take(&self) -> Vec<f32> {
        std::mem::take(&mut *self.lock())
    }
}

/// Microphone capture backed by a dedicated cpal stream thread
pub struct CpalCapture {
    config: AudioConfig,
    stop_tx: Option<std::sync::mpsc::Sender<oneshot::Sender<Vec<f32>>>>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl CpalCapture {
    pub fn new(config: &AudioConfig) -> Result<Self, AudioError> {
        Ok(Self {
            config: config.clone(),
            stop_tx: None,
            thread_handle: None,
        })
    }
}

/// Pick an input device by name.
///
/// An exact name wins over a case-insensitive match, which wins over a
/// substring match, so "usb_mic", "analog-stereo" and full cpal names like
/// "alsa_input.pci-0000_00_1f.3.analog-stereo" all work in config.
fn find_audio_device(host: &cpal::Host, requested: &str) -> Result<cpal::Device, AudioError> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let mut devices: Vec<(String, cpal::Device)> = host
        .input_devices()
        .map_err(|e| AudioError::Connection(e.to_string()))?
        .filter_map(|d| d.name().ok().map(|n| (n, d)))
        .collect();

    let wanted = requested.to_lowercase();
    let rank = |name: &str| {
        if name == requested {
            Some(0u8)
        } else if name.to_lowercase() == wanted {
            Some(1)
        } else if name.to_lowercase().contains(&wanted) {
            Some(2)
        } else {
            None
        }
    };

    let mut best: Option<(u8, usize)> = None;
    for (i, (name, _)) in devices.iter().enumerate() {
        match rank(name) {
            Some(0) => {
                best = Some((0, i));
                break;
            }
            Some(r) if best.map_or(true, |(b, _)| r < b) => best = Some((r, i)),
            _ => {}
        }
    }

    if let Some((r, i)) = best {
        let (name, device) = devices.swap_remove(i);
        match r {
            0 => tracing::debug!("Audio device: {} (exact match)", name),
            1 => tracing::debug!("Audio device: {} (case-insensitive match for {})", name, requested),
            _ => tracing::debug!("Audio device: {} (substring match for {})", name, requested),
        }
        return Ok(device);
    }

    let available = if devices.is_empty() {
        "No audio input devices are available.".to_string()
    } else {
        let listing: Vec<String> = devices
            .iter()
            .map(|(name, _)| format!("  - {}", name))
            .collect();
        format!("Available devices:\n{}", listing.join("\n"))
    };
    Err(AudioError::DeviceNotFoundWithList {
        requested: requested.to_string(),
        available,
    })
}

#[async_trait::async_trait]
impl AudioCapture for CpalCapture {
    async fn begin(&mut self) -> Result<(), AudioError> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        let host = cpal::default_host();
        let device = if self.config.device == "default" {
            host.default_input_device()
                .ok_or_else(|| AudioError::DeviceNotFound("default".to_string()))?
        } else {
            find_audio_device(&host, &self.config.device)?
        };
        tracing::info!(
            "Using audio device: {}",
            device.name().unwrap_or_else(|_| "unknown".to_string())
        );

        let supported = device
            .default_input_config()
            .map_err(|e| AudioError::Connection(e.to_string()))?;
        let source_rate = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        let sample_format = supported.sample_format();
        let target_rate = self.config.sample_rate;
        tracing::debug!(
            "Input config: {} Hz, {} channel(s), {:?} samples",
            source_rate,
            channels,
            sample_format
        );

        let sink = CaptureSink::new(
            target_rate as usize * self.config.max_duration_secs.max(1) as usize,
        );

        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<oneshot::Sender<Vec<f32>>>();

        let thread_handle = thread::spawn(move || {
            let stream_config = cpal::StreamConfig {
                channels: supported.channels(),
                sample_rate: supported.sample_rate(),
                buffer_size: cpal::BufferSize::Default,
            };

            let stream = match sample_format {
                cpal::SampleFormat::F32 => build_stream::<f32>(
                    &device,
                    &stream_config,
                    sink.clone(),
                    source_rate,
                    target_rate,
                    channels,
                ),
                cpal::SampleFormat::I16 => build_stream::<i16>(
                    &device,
                    &stream_config,
                    sink.clone(),
                    source_rate,
                    target_rate,
                    channels,
                ),
                cpal::SampleFormat::U16 => build_stream::<u16>(
                    &device,
                    &stream_config,
                    sink.clone(),
                    source_rate,
                    target_rate,
                    channels,
                ),
                format => {
                    tracing::error!("Sample format {:?} is not supported", format);
                    return;
                }
            };
            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!("Could not build input stream: {}", e);
                    return;
                }
            };
            if let Err(e) = stream.play() {
                tracing::error!("Could not start input stream: {}", e);
                return;
            }
            tracing::debug!("Capture thread running");

            if let Ok(reply) = stop_rx.recv() {
                drop(stream);
                let _ = reply.send(sink.take());
            }
            tracing::debug!("Capture thread exiting");
        });

        self.stop_tx = Some(stop_tx);
        self.thread_handle = Some(thread_handle);
        Ok(())
    }

    async fn end(&mut self) -> Result<AudioBuffer, AudioError> {
        let samples = match self.stop_tx.take() {
            Some(stop_tx) => {
                let (reply_tx, reply_rx) = oneshot::channel();
                if stop_tx.send(reply_tx).is_ok() {
                    match tokio::time::timeout(std::time::Duration::from_secs(2), reply_rx).await {
                        Ok(Ok(samples)) => samples,
                        Ok(Err(_)) => {
                            return Err(AudioError::StreamError(
                                "Capture thread dropped its reply channel".to_string(),
                            ))
                        }
                        Err(_) => return Err(AudioError::StopTimeout(2)),
                    }
                } else {
                    Vec::new()
                }
            }
            None => Vec::new(),
        };

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }

        tracing::debug!(
            "Capture ended with {} samples ({:.2}s)",
            samples.len(),
            samples.len() as f32 / self.config.sample_rate as f32
        );

        // An empty buffer is not an error here. The session layer decides
        // what to do with recordings that are too short to transcribe.
        Ok(samples)
    }
}

/// Build an input stream for a concrete sample type.
///
/// The callback mixes frames down to mono, resamples to the target rate, then
/// appends to the sink. The scratch buffer is reused across callbacks.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sink: CaptureSink,
    source_rate: u32,
    target_rate: u32,
    channels: usize,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    use cpal::traits::DeviceTrait;

    let mut mono: Vec<f32> = Vec::new();
    let mut cap_warned = false;

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                mono.clear();
                mono.extend(data.chunks(channels).map(|frame| {
                    frame
                        .iter()
                        .map(|&s| <f32 as cpal::FromSample<T>>::from_sample_(s))
                        .sum::<f32>()
                        / frame.len() as f32
                }));

                let truncated = if source_rate == target_rate {
                    sink.push(&mono)
                } else {
                    sink.push(&resample(&mono, source_rate, target_rate))
                };
                if truncated && !cap_warned {
                    cap_warned = true;
                    tracing::warn!("Maximum recording duration reached, discarding further audio");
                }
            },
            |err| tracing::error!("Input stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::StreamError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_push_within_cap() {
        let sink = CaptureSink::new(8);
        assert!(!sink.push(&[0.1, 0.2, 0.3]));
        assert_eq!(sink.take().len(), 3);
    }

    #[test]
    fn test_sink_push_truncates_at_cap() {
        let sink = CaptureSink::new(4);
        assert!(!sink.push(&[0.0; 3]));
        assert!(sink.push(&[1.0, 2.0, 3.0]));
        let collected = sink.take();
        assert_eq!(collected.len(), 4);
        assert_eq!(collected[3], 1.0);
    }

    #[test]
    fn test_sink_push_at_cap_discards_everything() {
        let sink = CaptureSink::new(2);
        sink.push(&[0.0, 0.0]);
        assert!(sink.push(&[1.0]));
        assert_eq!(sink.take().len(), 2);
    }

    #[test]
    fn test_sink_take_resets() {
        let sink = CaptureSink::new(8);
        sink.push(&[0.5; 4]);
        assert_eq!(sink.take().len(), 4);
        assert!(sink.take().is_empty());
    }
}
