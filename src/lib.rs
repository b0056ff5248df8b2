//! Real-time voice recorder with noise suppression and voice isolation.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (16 kHz mono i16, mpsc)
//!           → ChunkPipeline (hard gate → voice-band filter → auto-gain)
//!           → streaming PCM container (placeholder header, backpatched)
//! stop → full-buffer enhancement pass → peak normalize → atomic replace
//! ```
//!
//! [`recorder::Recorder`] owns the lifecycle: `start_recording`,
//! `stop_recording` and `cleanup`, with every transition published as an
//! [`recorder::AudioState`] on a latest-value subscription.  Offline
//! editing is delegated to an external tool through the
//! [`editor::AudioEditor`] capability trait.

pub mod audio;
pub mod config;
pub mod editor;
pub mod recorder;
