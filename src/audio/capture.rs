//! Microphone capture via `cpal`.
//!
//! [`AudioCapture`] wraps the cpal host/device/stream lifecycle.  Call
//! [`AudioCapture::start`] to begin streaming [`AudioChunk`]s over an mpsc
//! channel.  The returned [`StreamHandle`] is a RAII guard — dropping it
//! stops the underlying cpal stream and releases the hardware.
//!
//! The device callback normalises whatever the hardware delivers: any
//! channel count is downmixed by averaging, any native rate is resampled to
//! 16 kHz by linear interpolation, and samples are quantised to `i16`.
//! Every chunk that leaves this module is therefore **16 kHz mono i16**,
//! the only format the rest of the pipeline speaks.

use std::sync::mpsc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

/// Capture pipeline sample rate in Hz.
pub const SAMPLE_RATE: u32 = 16_000;

/// Full-scale divisor for 16-bit samples.
const FULL_SCALE: f32 = 32_768.0;

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// A single buffer of capture data, already converted to 16 kHz mono i16.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// PCM samples, 16 kHz mono.
    pub samples: Vec<i16>,
}

// ---------------------------------------------------------------------------
// StreamHandle
// ---------------------------------------------------------------------------

/// RAII guard that keeps the cpal stream alive.
///
/// Dropping this value stops the underlying hardware stream; the callback's
/// channel sender is dropped with it, so the consuming end disconnects.
pub struct StreamHandle {
    _stream: cpal::Stream,
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while setting up or running the audio capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("sample format not supported: {0}")]
    UnsupportedFormat(String),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

// ---------------------------------------------------------------------------
// AudioCapture
// ---------------------------------------------------------------------------

/// Microphone capture device wrapper built on top of `cpal`.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::mpsc;
/// use voice_recorder::audio::{AudioCapture, AudioChunk};
///
/// let (tx, rx) = mpsc::channel::<AudioChunk>();
/// let capture = AudioCapture::new().unwrap();
/// let _handle = capture.start(tx).unwrap();
/// // `_handle` keeps the stream alive; drop it to stop recording.
/// ```
pub struct AudioCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    /// Native sample rate reported by the device (Hz).
    native_rate: u32,
    /// Number of interleaved channels reported by the device.
    channels: u16,
}

impl AudioCapture {
    /// Create an [`AudioCapture`] on the system default input device.
    ///
    /// The hardware buffer is requested as twice the smallest size the
    /// platform reports, bounded by the supported maximum.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::NoDevice`] when no input device is available,
    /// or [`CaptureError::DefaultConfig`] when the device cannot report a
    /// default stream configuration.
    pub fn new() -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;
        let supported = device.default_input_config()?;

        let channels = supported.channels();
        let native_rate = supported.sample_rate().0;
        let sample_format = supported.sample_format();

        let buffer_size = match supported.buffer_size() {
            cpal::SupportedBufferSize::Range { min, max } => {
                let (min, max) = (*min, *max);
                cpal::BufferSize::Fixed(min.saturating_mul(2).clamp(min, max))
            }
            cpal::SupportedBufferSize::Unknown => cpal::BufferSize::Default,
        };

        let mut config: cpal::StreamConfig = supported.into();
        config.buffer_size = buffer_size;

        log::info!(
            "capture: device opened ({native_rate} Hz, {channels} ch, {sample_format:?})"
        );

        Ok(Self {
            device,
            config,
            sample_format,
            native_rate,
            channels,
        })
    }

    /// Start recording and send [`AudioChunk`]s to `tx`.
    ///
    /// The cpal callback runs on a dedicated audio thread; each hardware
    /// buffer is converted to 16 kHz mono i16 and forwarded over the
    /// channel.  Send errors (receiver dropped) are silently ignored so the
    /// audio thread never panics.  Stream errors are logged and the
    /// affected buffer is simply missing from the output — the consumer
    /// keeps running.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::UnsupportedFormat`] for sample formats other
    /// than i16/f32, or [`CaptureError::BuildStream`] /
    /// [`CaptureError::PlayStream`] if the platform rejects the stream.
    pub fn start(&self, tx: mpsc::Sender<AudioChunk>) -> Result<StreamHandle, CaptureError> {
        let err_fn = |err: cpal::StreamError| {
            log::error!("capture: stream error: {err}");
        };

        let channels = self.channels;
        let native_rate = self.native_rate;

        let stream = match self.sample_format {
            cpal::SampleFormat::I16 => self.device.build_input_stream(
                &self.config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let scaled: Vec<f32> =
                        data.iter().map(|&s| f32::from(s) / FULL_SCALE).collect();
                    let _ = tx.send(to_chunk(&scaled, channels, native_rate));
                },
                err_fn,
                None,
            )?,
            cpal::SampleFormat::F32 => self.device.build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let _ = tx.send(to_chunk(data, channels, native_rate));
                },
                err_fn,
                None,
            )?,
            other => {
                return Err(CaptureError::UnsupportedFormat(format!("{other:?}")));
            }
        };

        stream.play()?;
        Ok(StreamHandle { _stream: stream })
    }

    /// Native sample rate of the underlying device in Hz.
    pub fn native_rate(&self) -> u32 {
        self.native_rate
    }

    /// Number of interleaved channels the device delivers.
    pub fn channels(&self) -> u16 {
        self.channels
    }
}

// ---------------------------------------------------------------------------
// Format conversion
// ---------------------------------------------------------------------------

/// Convert one interleaved `f32` hardware buffer into a pipeline chunk.
fn to_chunk(data: &[f32], channels: u16, native_rate: u32) -> AudioChunk {
    let mono = downmix_to_mono(data, channels);
    let resampled = if native_rate == SAMPLE_RATE {
        mono
    } else {
        resample_linear(&mono, native_rate, SAMPLE_RATE)
    };
    AudioChunk {
        samples: resampled.iter().map(|&s| quantize(s)).collect(),
    }
}

/// Mix interleaved multi-channel audio down to mono by averaging.
fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

/// Resample `samples` from `from` Hz to `to` Hz by linear interpolation.
fn resample_linear(samples: &[f32], from: u32, to: u32) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let ratio = f64::from(to) / f64::from(from);
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = (src_pos - idx as f64) as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };
        output.push(sample);
    }

    output
}

/// Quantise a normalized sample to i16, saturating at full scale.
fn quantize(sample: f32) -> i16 {
    (sample * FULL_SCALE).clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// `AudioChunk` must be `Send` so it can cross thread boundaries.
    #[test]
    fn audio_chunk_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<AudioChunk>();
    }

    // ---- Downmix ------------------------------------------------------------

    #[test]
    fn downmix_mono_is_identity() {
        let input = vec![0.1_f32, 0.2, 0.3];
        assert_eq!(downmix_to_mono(&input, 1), input);
    }

    #[test]
    fn downmix_stereo_averages_frames() {
        let input = vec![1.0_f32, -1.0, 0.5, 0.5];
        let out = downmix_to_mono(&input, 2);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn downmix_zero_channels_yields_empty() {
        assert!(downmix_to_mono(&[1.0_f32, 2.0], 0).is_empty());
    }

    // ---- Resample -----------------------------------------------------------

    #[test]
    fn resample_48k_to_16k_output_length() {
        // 480 samples @ 48 kHz = 10 ms → 160 samples @ 16 kHz
        let input = vec![0.5_f32; 480];
        assert_eq!(resample_linear(&input, 48_000, 16_000).len(), 160);
    }

    #[test]
    fn resample_preserves_dc_amplitude() {
        let input = vec![0.5_f32; 480];
        for &s in &resample_linear(&input, 48_000, 16_000) {
            assert!((s - 0.5).abs() < 1e-5, "amplitude drift: {s}");
        }
    }

    #[test]
    fn resample_empty_input() {
        assert!(resample_linear(&[], 48_000, 16_000).is_empty());
    }

    // ---- Quantize -----------------------------------------------------------

    #[test]
    fn quantize_round_trips_i16_exactly() {
        for s in [0_i16, 1, -1, 1000, -32_768, 32_767] {
            assert_eq!(quantize(f32::from(s) / FULL_SCALE), s);
        }
    }

    #[test]
    fn quantize_saturates_out_of_range_input() {
        assert_eq!(quantize(2.0), i16::MAX);
        assert_eq!(quantize(-2.0), i16::MIN);
    }

    // ---- End-to-end conversion ----------------------------------------------

    #[test]
    fn to_chunk_native_rate_mono_is_lossless() {
        let data = vec![0.25_f32; 320];
        let chunk = to_chunk(&data, 1, SAMPLE_RATE);
        assert_eq!(chunk.samples.len(), 320);
        assert!(chunk.samples.iter().all(|&s| s == 8192));
    }

    #[test]
    fn to_chunk_stereo_48k_is_mono_16k() {
        // 960 interleaved stereo samples @ 48 kHz = 480 frames = 10 ms
        let data = vec![0.5_f32; 960];
        let chunk = to_chunk(&data, 2, 48_000);
        assert_eq!(chunk.samples.len(), 160);
    }
}
