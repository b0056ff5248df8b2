//! External audio-editing capability interface.
//!
//! Offline editing (cut, merge, effect chains, time-stretch, pitch-shift,
//! silence trimming) is performed by an external multimedia command-line
//! tool.  This module defines only the seam the orchestration layer
//! programs against: operation descriptors, an error type, and the async
//! [`AudioEditor`] trait.  How an implementation constructs its commands is
//! its own business and is never inspected from here.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

// ---------------------------------------------------------------------------
// EditOperation
// ---------------------------------------------------------------------------

/// One editing operation to apply to a recording.
#[derive(Debug, Clone, PartialEq)]
pub enum EditOperation {
    /// Remove the span between the two timestamps.
    Cut { start_ms: u64, end_ms: u64 },
    /// Append another recording.
    Merge { other: PathBuf },
    /// Effect chain, passed through to the tool verbatim.
    Effects { chain: Vec<String> },
    /// Change playback speed by `ratio` (2.0 = twice as fast).
    ChangeSpeed { ratio: f32 },
    /// Shift pitch by `ratio` without changing speed.
    ChangePitch { ratio: f32 },
    /// Drop passages quieter than `threshold_db` dBFS.
    TrimSilence { threshold_db: f32 },
}

// ---------------------------------------------------------------------------
// EditError
// ---------------------------------------------------------------------------

/// Failure reported by the editing collaborator.
#[derive(Debug, Error)]
pub enum EditError {
    /// The tool ran and reported an error.
    #[error("editing tool failed: {0}")]
    Failed(String),

    /// The tool reported success but produced no output file.
    #[error("editing tool produced no output file")]
    NoOutput,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// AudioEditor trait
// ---------------------------------------------------------------------------

/// Async interface to the external editing tool.
///
/// Implementors must be `Send + Sync` so they can be shared behind an
/// `Arc<dyn AudioEditor>`.  Given an input file and an operation
/// descriptor, an implementation asynchronously produces either a completed
/// output file or a failure message.
#[async_trait]
pub trait AudioEditor: Send + Sync {
    /// Apply `op` to `input`, yielding the path of the edited result.
    async fn apply(&self, input: &Path, op: &EditOperation) -> Result<PathBuf, EditError>;
}

// Compile-time assertion: Box<dyn AudioEditor> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn AudioEditor>) {}
};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
