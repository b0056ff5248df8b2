//! Application entry point — record from the default microphone until Enter
//! is pressed, then enhance and finalize the file.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Resolve the output path (first CLI argument, or the recordings
//!    directory with a timestamped name).
//! 4. Create the tokio runtime and spawn the state printer.
//! 5. Start recording; block on stdin until Enter.
//! 6. Stop, wait for the terminal state and report it.

use std::io::BufRead;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use voice_recorder::config::{AppConfig, AppPaths};
use voice_recorder::recorder::{AudioState, Recorder};

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("voice recorder starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Output path
    let output_path = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let dir = config
                .output
                .recordings_dir
                .clone()
                .unwrap_or_else(|| AppPaths::new().recordings_dir);
            std::fs::create_dir_all(&dir)?;
            let stamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
            dir.join(format!("{}-{stamp}.wav", config.output.file_prefix))
        }
    };

    // 4. Runtime + state printer
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;

    let mut recorder = Recorder::new();

    let mut printer_rx = recorder.subscribe();
    rt.spawn(async move {
        while printer_rx.changed().await.is_ok() {
            let state = printer_rx.borrow_and_update().clone();
            match state {
                AudioState::Recording { level, elapsed_ms } => {
                    log::info!("recording: {elapsed_ms:>6} ms  level {level:.2}");
                }
                AudioState::Processing { progress } => {
                    log::info!("enhancing: {:.0} %", progress * 100.0);
                }
                other => log::info!("state: {}", other.label()),
            }
        }
    });

    // 5. Record until Enter
    recorder.start_recording(&output_path, config.processing.clone())?;
    println!(
        "Recording to {} — press Enter to stop.",
        output_path.display()
    );
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;

    // 6. Stop and wait for the terminal state
    recorder.stop_recording();
    let mut rx = recorder.subscribe();
    let final_state = rt.block_on(async move {
        loop {
            let state = rx.borrow_and_update().clone();
            if state.is_terminal() {
                break state;
            }
            if rx.changed().await.is_err() {
                break rx.borrow().clone();
            }
        }
    });

    match final_state {
        AudioState::Complete {
            output_path,
            duration_ms,
        } => {
            println!("Saved {} ({duration_ms} ms).", output_path.display());
            Ok(())
        }
        AudioState::Error { message } => Err(anyhow::anyhow!(message)),
        other => Err(anyhow::anyhow!("unexpected final state: {}", other.label())),
    }
}
