//! Recording session states and the latest-value state broadcast.
//!
//! [`AudioState`] is the single source of truth for a session's lifecycle.
//! Exactly one state holds at any time:
//!
//! ```text
//! Idle ──start──▶ Recording ──stop──▶ Processing ──▶ Complete
//!                     │                    │
//!                     │ (both filters off) │
//!                     └──────▶ Complete    └──▶ Error
//! any state ──fatal failure──▶ Error
//! Complete / Error ──cleanup or new start──▶ Idle
//! ```
//!
//! States are published through a `tokio::sync::watch` channel: a
//! single-slot broadcast of the latest value.  Observers may miss
//! intermediate `Recording` meter updates (it is a metering signal, not a
//! guaranteed-delivery stream) but always observe the current state
//! immediately on subscribing, and see `Complete`/`Error` exactly once per
//! session.

use std::path::PathBuf;

use tokio::sync::watch;

// ---------------------------------------------------------------------------
// AudioState
// ---------------------------------------------------------------------------

/// Lifecycle state of the capture pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioState {
    /// No active capture or processing.
    Idle,

    /// Live capture in progress.
    Recording {
        /// Normalized loudness meter value in `[0.0, 1.0]`, measured on the
        /// processed chunk.
        level: f32,
        /// Elapsed recording time in milliseconds.
        elapsed_ms: u64,
    },

    /// The full-buffer enhancement pass is running.
    Processing {
        /// Pass progress in `[0.0, 1.0]`.
        progress: f32,
    },

    /// Terminal success.
    Complete {
        /// Finished recording on disk.
        output_path: PathBuf,
        /// Total recorded duration in milliseconds.
        duration_ms: u64,
    },

    /// Terminal failure.  The session stays here until `cleanup()` or a new
    /// start resets it.
    Error { message: String },
}

impl AudioState {
    /// Returns `true` while capture or enhancement work is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            AudioState::Recording { .. } | AudioState::Processing { .. }
        )
    }

    /// Returns `true` for the two terminal states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AudioState::Complete { .. } | AudioState::Error { .. })
    }

    /// A short human-readable label suitable for a status line.
    pub fn label(&self) -> &'static str {
        match self {
            AudioState::Idle => "Idle",
            AudioState::Recording { .. } => "Recording",
            AudioState::Processing { .. } => "Processing",
            AudioState::Complete { .. } => "Done",
            AudioState::Error { .. } => "Error",
        }
    }
}

impl Default for AudioState {
    fn default() -> Self {
        AudioState::Idle
    }
}

// ---------------------------------------------------------------------------
// State broadcast
// ---------------------------------------------------------------------------

/// Receiving half of the state broadcast.
///
/// `borrow()` yields the current state synchronously; `changed().await`
/// waits for the next transition.  Cheap to clone.
pub type StateReceiver = watch::Receiver<AudioState>;

/// Create the broadcast pair, initialised to [`AudioState::Idle`].
pub(crate) fn state_channel() -> (watch::Sender<AudioState>, StateReceiver) {
    watch::channel(AudioState::Idle)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
