//! Recording session module — commands, state machine and enhancement pass.
//!
//! # Architecture
//!
//! ```text
//! caller thread                         "capture-loop" thread
//! ─────────────                         ─────────────────────
//! Recorder::start_recording ──spawn──▶  recv chunk (mpsc, bounded wait)
//! Recorder::stop_recording  ──flags──▶    ├─ ChunkPipeline::process
//! Recorder::cleanup         ──flags──▶    ├─ meter + elapsed → watch
//!                                         └─ WavStreamWriter::append
//! StateReceiver ◀──────── watch ────────  shutdown: finalize → post-pass
//! ```
//!
//! The caller only issues commands and observes [`AudioState`]; the capture
//! thread exclusively owns the chunk channel, the output file and the
//! pipeline.  The cpal stream handle stays with the caller so that stop and
//! cleanup release the microphone immediately.

mod post;
pub mod session;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use session::{Recorder, RecorderError};
pub use state::{AudioState, StateReceiver};
