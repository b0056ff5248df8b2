//! Capture session orchestration — owns the microphone and the capture loop.
//!
//! [`Recorder`] exposes the three commands (`start_recording`,
//! `stop_recording`, `cleanup`) and a state subscription.  One dedicated
//! thread runs the read → process → write loop; the calling thread only
//! issues commands and observes [`AudioState`] transitions, never touching
//! the hardware or the sample buffers.
//!
//! # Lifecycle
//!
//! ```text
//! start_recording ─▶ open mic ─▶ placeholder header ─▶ spawn "capture-loop"
//!   loop: recv chunk ─▶ ChunkPipeline ─▶ meter + elapsed ─▶ append to file
//! stop_recording  ─▶ stop flag + drop stream (mic released, channel closes)
//!   loop shutdown (always): flush ─▶ backpatch ─▶ close
//!     filters on  ─▶ enhancement pass ─▶ Complete | Error
//!     filters off ─▶ Complete
//! cleanup ─▶ abort + stop flags, join, publish Idle   (idempotent)
//! ```
//!
//! The shutdown path runs on *every* loop exit — cancellation, channel
//! disconnect or write failure — so the container on disk always carries
//! correct size fields for the samples that reached it.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use thread_priority::{set_current_thread_priority, ThreadPriority};
use tokio::sync::watch;

use crate::audio::{
    peak_level, AudioCapture, AudioChunk, CaptureError, ChunkPipeline, StreamHandle, WavError,
    WavStreamWriter, SAMPLE_RATE,
};
use crate::config::ProcessingConfig;

use super::post::{self, PostError};
use super::state::{state_channel, AudioState, StateReceiver};

/// Longest the loop blocks waiting for one chunk before rechecking the
/// cancellation flags.
const CHUNK_WAIT: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// RecorderError
// ---------------------------------------------------------------------------

/// Errors returned directly to command callers.  Fatal session failures are
/// additionally published as [`AudioState::Error`].
#[derive(Debug, Error)]
pub enum RecorderError {
    /// `start_recording` was called while a session is active.
    #[error("a recording is already in progress")]
    AlreadyActive,

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Wav(#[from] WavError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Copying a finished recording to a caller-chosen destination failed.
    /// Never affects the state machine.
    #[error("failed to export recording to {dest}: {source}")]
    Export {
        dest: PathBuf,
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Session internals
// ---------------------------------------------------------------------------

/// Cancellation flags shared with the capture loop, checked once per
/// iteration and at every enhancement stage boundary.
struct SessionFlags {
    /// Graceful stop: run the shutdown path, then the enhancement pass.
    stop: AtomicBool,
    /// Hard abort (`cleanup`): run the shutdown path, publish no terminal
    /// state — the caller resets to `Idle`.
    abort: AtomicBool,
}

impl SessionFlags {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            stop: AtomicBool::new(false),
            abort: AtomicBool::new(false),
        })
    }
}

struct ActiveSession {
    flags: Arc<SessionFlags>,
    /// Keeps the cpal stream alive.  Taken on stop/cleanup to release the
    /// microphone and disconnect the chunk channel.
    stream: Option<StreamHandle>,
    join: Option<JoinHandle<()>>,
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

/// Recording session state machine.
///
/// Holds the exclusive handle to the microphone while a session is active.
/// At most one session runs at a time; a second `start_recording` fails
/// fast with [`RecorderError::AlreadyActive`].
pub struct Recorder {
    state_tx: Arc<watch::Sender<AudioState>>,
    session: Option<ActiveSession>,
}

impl Recorder {
    /// Create an idle recorder.
    pub fn new() -> Self {
        let (tx, _rx) = state_channel();
        Self {
            state_tx: Arc::new(tx),
            session: None,
        }
    }

    /// Subscribe to the state broadcast.
    ///
    /// The receiver immediately holds the current state; `changed().await`
    /// yields on every transition thereafter.
    pub fn subscribe(&self) -> StateReceiver {
        self.state_tx.subscribe()
    }

    /// Current state, synchronously.
    pub fn current_state(&self) -> AudioState {
        self.state_tx.borrow().clone()
    }

    /// Start capturing to `output_path` with the given per-session config.
    ///
    /// Opens the default input device, writes the placeholder container
    /// header and spawns the capture loop.  Fails fast with
    /// [`RecorderError::AlreadyActive`] when a session is already running.
    /// Hardware or file-creation failures publish [`AudioState::Error`] and
    /// are also returned to the caller.
    pub fn start_recording(
        &mut self,
        output_path: &Path,
        config: ProcessingConfig,
    ) -> Result<(), RecorderError> {
        if let Some(session) = &self.session {
            if session.join.as_ref().is_some_and(|j| !j.is_finished()) {
                return Err(RecorderError::AlreadyActive);
            }
        }
        self.session = None;

        log::info!("recorder: starting capture to {}", output_path.display());

        let capture = match AudioCapture::new() {
            Ok(capture) => capture,
            Err(e) => return Err(self.fail(format!("microphone unavailable: {e}"), e)),
        };

        let writer = match WavStreamWriter::create(output_path, SAMPLE_RATE) {
            Ok(writer) => writer,
            Err(e) => return Err(self.fail(format!("cannot create output file: {e}"), e)),
        };

        let (chunk_tx, chunk_rx) = mpsc::channel::<AudioChunk>();
        let stream = match capture.start(chunk_tx) {
            Ok(stream) => stream,
            Err(e) => return Err(self.fail(format!("cannot start capture stream: {e}"), e)),
        };

        let flags = SessionFlags::new();
        let loop_flags = Arc::clone(&flags);
        let loop_state = Arc::clone(&self.state_tx);
        let loop_path = output_path.to_path_buf();

        let join = match thread::Builder::new()
            .name("capture-loop".into())
            .spawn(move || run_capture_loop(chunk_rx, writer, config, loop_path, loop_state, loop_flags))
        {
            Ok(join) => join,
            Err(e) => return Err(self.fail(format!("cannot spawn capture thread: {e}"), e)),
        };

        self.session = Some(ActiveSession {
            flags,
            stream: Some(stream),
            join: Some(join),
        });
        Ok(())
    }

    /// Stop the active recording.
    ///
    /// Returns promptly; the loop's shutdown path (flush → backpatch →
    /// close) and the enhancement pass continue in the background, ending
    /// in `Complete` or `Error`.  No-op without an active session.
    pub fn stop_recording(&mut self) {
        if let Some(session) = &mut self.session {
            log::info!("recorder: stop requested");
            session.flags.stop.store(true, Ordering::Relaxed);
            // Releases the microphone and disconnects the chunk channel,
            // unblocking the loop without waiting out the recv timeout.
            session.stream.take();
        }
    }

    /// Hard teardown: cancel any in-flight loop, release the hardware and
    /// reset the state to `Idle`.  Safe to call repeatedly and from drop.
    pub fn cleanup(&mut self) {
        if let Some(mut session) = self.session.take() {
            log::info!("recorder: cleanup");
            session.flags.abort.store(true, Ordering::Relaxed);
            session.flags.stop.store(true, Ordering::Relaxed);
            session.stream.take();
            if let Some(join) = session.join.take() {
                if join.join().is_err() {
                    log::error!("recorder: capture loop panicked during teardown");
                }
            }
        }
        self.state_tx.send_replace(AudioState::Idle);
    }

    /// Copy a finished recording to a caller-chosen destination.
    ///
    /// Failure is reported to the caller only; the state machine is not
    /// touched.
    pub fn export_to(&self, recording: &Path, dest: &Path) -> Result<PathBuf, RecorderError> {
        std::fs::copy(recording, dest).map_err(|source| RecorderError::Export {
            dest: dest.to_path_buf(),
            source,
        })?;
        log::info!(
            "recorder: exported {} to {}",
            recording.display(),
            dest.display()
        );
        Ok(dest.to_path_buf())
    }

    /// Publish a fatal session failure and hand the cause back to the caller.
    fn fail<E: Into<RecorderError>>(&self, message: String, cause: E) -> RecorderError {
        log::error!("recorder: {message}");
        self.state_tx.send_replace(AudioState::Error { message });
        cause.into()
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.cleanup();
    }
}

// ---------------------------------------------------------------------------
// Capture loop
// ---------------------------------------------------------------------------

/// The read → process → write loop, run on the dedicated capture thread.
fn run_capture_loop(
    chunk_rx: mpsc::Receiver<AudioChunk>,
    mut writer: WavStreamWriter,
    config: ProcessingConfig,
    output_path: PathBuf,
    state_tx: Arc<watch::Sender<AudioState>>,
    flags: Arc<SessionFlags>,
) {
    // Missed reads are audible dropouts, not just jitter.
    if let Err(e) = set_current_thread_priority(ThreadPriority::Max) {
        log::warn!("recorder: could not raise capture thread priority: {e:?}");
    }

    let mut pipeline = ChunkPipeline::new(config.clone(), SAMPLE_RATE);
    let mut total_samples: u64 = 0;
    let mut stream_failure: Option<String> = None;

    while !flags.stop.load(Ordering::Relaxed) {
        match chunk_rx.recv_timeout(CHUNK_WAIT) {
            Ok(mut chunk) => {
                // An empty read is skipped, not fatal.
                if chunk.samples.is_empty() {
                    continue;
                }

                pipeline.process(&mut chunk.samples);

                let level = peak_level(&chunk.samples);
                total_samples += chunk.samples.len() as u64;
                let elapsed_ms = total_samples * 1000 / u64::from(SAMPLE_RATE);
                state_tx.send_replace(AudioState::Recording { level, elapsed_ms });

                if let Err(e) = writer.append(&chunk.samples) {
                    stream_failure = Some(format!("failed to write chunk: {e}"));
                    break;
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    // Shutdown path — runs on every exit: flush, backpatch, close.
    let finalized = writer.finalize();
    log::info!("recorder: capture loop ended after {total_samples} samples");

    if flags.abort.load(Ordering::Relaxed) {
        // Hard teardown; `cleanup` publishes Idle after joining us.
        return;
    }

    if let Some(message) = stream_failure {
        state_tx.send_replace(AudioState::Error { message });
        return;
    }

    if let Err(e) = finalized {
        state_tx.send_replace(AudioState::Error {
            message: format!("failed to finalize container: {e}"),
        });
        return;
    }

    if config.wants_enhancement_pass() {
        let result = post::enhance_recording(
            &output_path,
            &config,
            SAMPLE_RATE,
            &flags.abort,
            |progress| {
                state_tx.send_replace(AudioState::Processing { progress });
            },
        );
        match result {
            Ok(duration_ms) => {
                state_tx.send_replace(AudioState::Complete {
                    output_path,
                    duration_ms,
                });
            }
            // Torn down mid-pass; Idle follows from cleanup.
            Err(PostError::Cancelled) => {}
            Err(e) => {
                state_tx.send_replace(AudioState::Error {
                    message: format!("enhancement failed: {e}"),
                });
            }
        }
    } else {
        let duration_ms = total_samples * 1000 / u64::from(SAMPLE_RATE);
        state_tx.send_replace(AudioState::Complete {
            output_path,
            duration_ms,
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::wav;
    use tempfile::tempdir;

    /// Run the capture loop synchronously over pre-queued chunks.
    fn run_loop_with_chunks(
        chunks: Vec<Vec<i16>>,
        config: ProcessingConfig,
        flags: Arc<SessionFlags>,
    ) -> (AudioState, PathBuf, tempfile::TempDir) {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("take.wav");
        let writer = WavStreamWriter::create(&path, SAMPLE_RATE).expect("writer");

        let (tx, rx) = mpsc::channel();
        for samples in chunks {
            tx.send(AudioChunk { samples }).expect("queue chunk");
        }
        drop(tx); // loop exits via disconnect once the queue drains

        let (state_tx, _state_rx) = state_channel();
        let state_tx = Arc::new(state_tx);
        run_capture_loop(
            rx,
            writer,
            config,
            path.clone(),
            Arc::clone(&state_tx),
            flags,
        );

        let state = state_tx.borrow().clone();
        (state, path, dir)
    }

    // ---- End-to-end over the capture-loop seam ------------------------------

    /// One loud chunk with the default config: the loop must stream, run the
    /// enhancement pass and finish in `Complete` with a positive duration.
    #[test]
    fn default_config_single_chunk_reaches_complete() {
        let (state, path, _dir) = run_loop_with_chunks(
            vec![vec![20_000_i16; 3200]],
            ProcessingConfig::default(),
            SessionFlags::new(),
        );

        match state {
            AudioState::Complete {
                output_path,
                duration_ms,
            } => {
                assert_eq!(output_path, path);
                assert_eq!(duration_ms, 200); // 3200 samples at 16 kHz
            }
            other => panic!("expected Complete, got {other:?}"),
        }

        let samples = wav::read_all(&path).expect("read back");
        assert_eq!(samples.len(), 3200);
    }

    /// With every filter disabled the enhancement pass is skipped and the
    /// streamed data is the final data.
    #[test]
    fn disabled_filters_complete_without_enhancement() {
        let config = ProcessingConfig {
            enable_noise_suppression: false,
            enable_voice_isolation: false,
            enable_auto_gain: false,
            ..Default::default()
        };
        let (state, path, _dir) =
            run_loop_with_chunks(vec![vec![1000_i16; 1000]], config, SessionFlags::new());

        match state {
            AudioState::Complete { duration_ms, .. } => {
                // 1000 samples at 16 kHz floor to 62 ms.
                assert_eq!(duration_ms, 62);
            }
            other => panic!("expected Complete, got {other:?}"),
        }

        assert_eq!(wav::read_all(&path).expect("read back"), vec![1000_i16; 1000]);
    }

    /// Chunks are processed before they are written: with auto-gain enabled
    /// the file contains scaled samples, not the raw input.
    #[test]
    fn processed_chunk_is_what_lands_on_disk() {
        let config = ProcessingConfig {
            enable_noise_suppression: false,
            enable_voice_isolation: false,
            enable_auto_gain: true,
            ..Default::default()
        };
        let (state, path, _dir) =
            run_loop_with_chunks(vec![vec![20_000_i16; 800]], config, SessionFlags::new());

        assert!(matches!(state, AudioState::Complete { .. }), "{state:?}");
        let samples = wav::read_all(&path).expect("read back");
        assert_eq!(samples.len(), 800);
        // −16 dBFS target attenuates a near-full-scale constant signal.
        assert!(samples[0] < 20_000, "sample not attenuated: {}", samples[0]);
        assert!(samples.iter().all(|&s| s == samples[0]));
    }

    /// Empty chunks count as skipped reads: no samples, no failure.
    #[test]
    fn empty_chunks_are_skipped() {
        let (state, path, _dir) = run_loop_with_chunks(
            vec![Vec::new(), vec![500_i16; 160], Vec::new()],
            ProcessingConfig {
                enable_noise_suppression: false,
                enable_voice_isolation: false,
                enable_auto_gain: false,
                ..Default::default()
            },
            SessionFlags::new(),
        );

        assert!(matches!(state, AudioState::Complete { duration_ms: 10, .. }), "{state:?}");
        assert_eq!(wav::read_all(&path).expect("read back").len(), 160);
    }

    /// A hard abort runs the shutdown path (the container is finalized) but
    /// publishes no terminal state.
    #[test]
    fn abort_finalizes_container_without_terminal_state() {
        let flags = SessionFlags::new();
        flags.abort.store(true, Ordering::Relaxed);
        flags.stop.store(true, Ordering::Relaxed);

        let (state, path, _dir) =
            run_loop_with_chunks(Vec::new(), ProcessingConfig::default(), flags);

        assert_eq!(state, AudioState::Idle);
        // Header exists and carries zero-sample size fields.
        let bytes = std::fs::read(&path).expect("read file");
        assert_eq!(bytes.len() as u64, wav::HEADER_LEN);
        assert_eq!(u32::from_le_bytes(bytes[40..44].try_into().unwrap()), 0);
    }

    // ---- Recorder commands --------------------------------------------------

    #[test]
    fn cleanup_is_idempotent_and_resets_to_idle() {
        let mut recorder = Recorder::new();
        recorder.cleanup();
        recorder.cleanup();
        assert_eq!(recorder.current_state(), AudioState::Idle);
    }

    #[test]
    fn stop_without_session_is_a_noop() {
        let mut recorder = Recorder::new();
        recorder.stop_recording();
        assert_eq!(recorder.current_state(), AudioState::Idle);
    }

    #[test]
    fn cleanup_clears_a_published_error() {
        let recorder = Recorder::new();
        recorder.state_tx.send_replace(AudioState::Error {
            message: "microphone unavailable".into(),
        });

        let mut recorder = recorder;
        recorder.cleanup();
        assert_eq!(recorder.current_state(), AudioState::Idle);
    }

    #[test]
    fn subscribe_sees_current_state_immediately() {
        let recorder = Recorder::new();
        let rx = recorder.subscribe();
        assert_eq!(*rx.borrow(), AudioState::Idle);
    }

    // ---- Export -------------------------------------------------------------

    #[test]
    fn export_copies_the_recording() {
        let dir = tempdir().expect("temp dir");
        let src = dir.path().join("take.wav");
        let dest = dir.path().join("saved.wav");
        wav::write_all(&src, &[1_i16, 2, 3], SAMPLE_RATE).expect("seed");

        let recorder = Recorder::new();
        let out = recorder.export_to(&src, &dest).expect("export");
        assert_eq!(out, dest);
        assert_eq!(wav::read_all(&dest).expect("read back"), vec![1, 2, 3]);
    }

    /// Export failure goes to the caller; the state machine is untouched.
    #[test]
    fn export_failure_does_not_touch_state() {
        let dir = tempdir().expect("temp dir");
        let recorder = Recorder::new();

        let err = recorder
            .export_to(&dir.path().join("missing.wav"), &dir.path().join("out.wav"))
            .unwrap_err();
        assert!(matches!(err, RecorderError::Export { .. }), "{err}");
        assert_eq!(recorder.current_state(), AudioState::Idle);
    }
}
