//! Per-chunk enhancement pipeline and level metering.
//!
//! [`ChunkPipeline`] applies up to three stages to every chunk the capture
//! loop reads, always in the same order:
//!
//! 1. hard noise gate ([`aggressive_gate`]) at the configured threshold,
//! 2. voice-band isolation ([`SpectralGate::isolate_voice`]),
//! 3. auto-gain toward the configured loudness target.
//!
//! Disabled stages are identity.  Every stage operates on the whole chunk
//! in place; no state leaks between stages apart from the spectral gate's
//! own noise profile.
//!
//! The metering helpers ([`peak_level`], [`rms`]) are used by the capture
//! loop on the *processed* chunk, so the level meter shows what is actually
//! written to disk.

use crate::audio::spectral::{aggressive_gate, SpectralGate};
use crate::config::ProcessingConfig;

/// Guards `log10` against zero input.
const EPSILON: f32 = 1e-10;

/// Full-scale divisor for 16-bit samples.
const FULL_SCALE: f32 = 32_768.0;

/// Linear auto-gain multiplier bounds.
const MIN_GAIN: f32 = 0.1;
const MAX_GAIN: f32 = 10.0;

/// dB range of the level meter; −96 dBFS maps to 0.0, 0 dBFS to 1.0.
const METER_FLOOR_DB: f32 = 96.0;

// ---------------------------------------------------------------------------
// ChunkPipeline
// ---------------------------------------------------------------------------

/// Applies the configured enhancement stages to each capture chunk.
pub struct ChunkPipeline {
    config: ProcessingConfig,
    gate: SpectralGate,
}

impl ChunkPipeline {
    /// Build a pipeline for one recording session.
    pub fn new(config: ProcessingConfig, sample_rate: u32) -> Self {
        Self {
            config,
            gate: SpectralGate::new(sample_rate),
        }
    }

    /// Configuration this pipeline was built with.
    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Run all enabled stages over `chunk`, mutating it in place.
    pub fn process(&mut self, chunk: &mut Vec<i16>) {
        if self.config.enable_noise_suppression {
            aggressive_gate(chunk, self.config.suppression_level.threshold());
        }
        if self.config.enable_voice_isolation {
            *chunk = self.gate.isolate_voice(chunk);
        }
        if self.config.enable_auto_gain {
            apply_auto_gain(chunk, self.config.target_loudness_db);
        }
    }
}

// ---------------------------------------------------------------------------
// Auto-gain
// ---------------------------------------------------------------------------

/// Scale `samples` so their RMS loudness approaches `target_db` dBFS.
///
/// The linear multiplier is clamped to `[0.1, 10.0]`; sample values are
/// truncated after the multiply (no dithering).  Empty and silent input are
/// left untouched — the epsilon keeps the dB conversion finite and the
/// clamp bounds the resulting gain.
pub fn apply_auto_gain(samples: &mut [i16], target_db: f32) {
    if samples.is_empty() {
        return;
    }

    let current_db = 20.0 * (rms(samples) / FULL_SCALE + EPSILON).log10();
    let gain_db = target_db - current_db;
    let gain = 10.0_f32.powf(gain_db / 20.0).clamp(MIN_GAIN, MAX_GAIN);

    for s in samples.iter_mut() {
        *s = (f32::from(*s) * gain) as i16;
    }
}

// ---------------------------------------------------------------------------
// Metering
// ---------------------------------------------------------------------------

/// Root-mean-square amplitude of `samples`, in sample units.
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

/// Normalized peak meter value in `[0.0, 1.0]`.
///
/// The peak amplitude is converted to dBFS and mapped linearly from the
/// −96 dB floor: `(20·log10(peak/32768 + ε) + 96) / 96`.
pub fn peak_level(samples: &[i16]) -> f32 {
    let peak = samples
        .iter()
        .map(|&s| i32::from(s).unsigned_abs())
        .max()
        .unwrap_or(0) as f32;

    let db = 20.0 * (peak / FULL_SCALE + EPSILON).log10();
    ((db + METER_FLOOR_DB) / METER_FLOOR_DB).clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
