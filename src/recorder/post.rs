//! Full-buffer enhancement pass, run after a recording stops.
//!
//! The pass rereads the whole recorded file, runs the overlap-add
//! voice-band filter when isolation was requested, peak-normalizes, and
//! atomically replaces the file on disk.  Progress milestones 0.3 / 0.5 /
//! 0.8 are reported through the caller's closure between stages.
//!
//! Replacement is rename-only: the enhanced buffer is written to a sibling
//! temporary file which is then renamed over the original, so the last
//! durable state survives any failure mid-pass.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use crate::audio::{wav, SpectralGate};
use crate::config::ProcessingConfig;

/// Normalization target: full scale for 16-bit samples.
const PEAK_TARGET: f32 = 32_767.0;

// ---------------------------------------------------------------------------
// PostError
// ---------------------------------------------------------------------------

/// Failure modes of the enhancement pass.
#[derive(Debug, Error)]
pub(crate) enum PostError {
    #[error(transparent)]
    Wav(#[from] wav::WavError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The session was torn down while the pass was running.
    #[error("enhancement cancelled")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// Enhancement pass
// ---------------------------------------------------------------------------

/// Enhance the finished recording at `path` in place.
///
/// Returns the recording duration in milliseconds.  `abort` is checked at
/// every stage boundary; once it reads `true` the pass stops with
/// [`PostError::Cancelled`] and the original file is left as it was.
pub(crate) fn enhance_recording(
    path: &Path,
    config: &ProcessingConfig,
    sample_rate: u32,
    abort: &AtomicBool,
    mut progress: impl FnMut(f32),
) -> Result<u64, PostError> {
    progress(0.3);
    let mut samples = wav::read_all(path)?;
    log::debug!("post: read {} samples from {}", samples.len(), path.display());

    if abort.load(Ordering::Relaxed) {
        return Err(PostError::Cancelled);
    }

    if config.enable_voice_isolation {
        let mut gate = SpectralGate::new(sample_rate);
        samples = gate.isolate_voice(&samples);
    }
    progress(0.5);

    if abort.load(Ordering::Relaxed) {
        return Err(PostError::Cancelled);
    }

    peak_normalize(&mut samples);
    progress(0.8);

    if abort.load(Ordering::Relaxed) {
        return Err(PostError::Cancelled);
    }

    let tmp = path.with_extension("wav.tmp");
    wav::write_all(&tmp, &samples, sample_rate)?;
    std::fs::rename(&tmp, path)?;
    log::debug!("post: replaced {}", path.display());

    Ok(samples.len() as u64 * 1000 / u64::from(sample_rate))
}

/// Scale `samples` so the maximum absolute value reaches full scale.
///
/// The divisor is floored at 1.0, so an all-zero buffer stays all-zero
/// instead of being amplified.
pub(crate) fn peak_normalize(samples: &mut [i16]) {
    let peak = samples
        .iter()
        .map(|&s| i32::from(s).unsigned_abs())
        .max()
        .unwrap_or(0) as f32;

    let gain = PEAK_TARGET / peak.max(1.0);
    for s in samples.iter_mut() {
        *s = (f32::from(*s) * gain).clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
