//! Audio pipeline — microphone capture → per-chunk enhancement → PCM container.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (mpsc, 16 kHz mono i16)
//!           → ChunkPipeline (gate → voice isolation → auto-gain)
//!           → WavStreamWriter (streaming header + backpatch)
//! ```
//!
//! The overlap-add [`spectral::SpectralGate`] serves double duty: the
//! per-chunk voice-isolation stage while recording, and the full-buffer
//! filter of the enhancement pass after the stream ends.

pub mod capture;
pub mod pipeline;
pub mod spectral;
pub mod wav;

pub use capture::{AudioCapture, AudioChunk, CaptureError, StreamHandle, SAMPLE_RATE};
pub use pipeline::{apply_auto_gain, peak_level, rms, ChunkPipeline};
pub use spectral::{aggressive_gate, SpectralGate};
pub use wav::{WavError, WavStreamWriter};
