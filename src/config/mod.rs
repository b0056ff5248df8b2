//! Configuration module for the voice recorder.
//!
//! Provides `AppConfig` (top-level settings), the per-session
//! `ProcessingConfig`, `AppPaths` for cross-platform data directories, and
//! TOML persistence via `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{AppConfig, OutputConfig, ProcessingConfig, SuppressionLevel};
