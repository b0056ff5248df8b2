//! Recorder settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::AppPaths;

// ---------------------------------------------------------------------------
// SuppressionLevel
// ---------------------------------------------------------------------------

/// How hard the per-chunk noise gate bites.
///
/// Each level maps to an amplitude threshold (fraction of full scale);
/// every sample below the threshold is zeroed.
///
/// | Variant  | Threshold |
/// |----------|-----------|
/// | Maximum  | 0.10      |
/// | Strong   | 0.05      |
/// | Moderate | 0.02      |
/// | Gentle   | 0.01      |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuppressionLevel {
    /// Gate everything below 10 % of full scale.
    Maximum,
    /// Gate below 5 % of full scale.
    Strong,
    /// Gate below 2 % of full scale.
    Moderate,
    /// Gate below 1 % of full scale — quiet rooms only.
    Gentle,
}

impl SuppressionLevel {
    /// Amplitude threshold for the hard gate, as a fraction of full scale.
    pub fn threshold(self) -> f32 {
        match self {
            SuppressionLevel::Maximum => 0.10,
            SuppressionLevel::Strong => 0.05,
            SuppressionLevel::Moderate => 0.02,
            SuppressionLevel::Gentle => 0.01,
        }
    }

    /// All levels, strictest first.
    pub const ALL: [SuppressionLevel; 4] = [
        SuppressionLevel::Maximum,
        SuppressionLevel::Strong,
        SuppressionLevel::Moderate,
        SuppressionLevel::Gentle,
    ];
}

impl Default for SuppressionLevel {
    fn default() -> Self {
        Self::Strong
    }
}

// ---------------------------------------------------------------------------
// ProcessingConfig
// ---------------------------------------------------------------------------

/// Per-session processing switches.  Immutable once a recording starts;
/// the entire tunable surface of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Apply the per-chunk hard noise gate while recording.
    pub enable_noise_suppression: bool,
    /// Apply the overlap-add voice-band filter (per chunk and in the
    /// enhancement pass).
    pub enable_voice_isolation: bool,
    /// Normalize chunk loudness toward [`target_loudness_db`](Self::target_loudness_db).
    pub enable_auto_gain: bool,
    /// Hard-gate strictness.
    pub suppression_level: SuppressionLevel,
    /// Auto-gain target in dBFS.
    pub target_loudness_db: f32,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            enable_noise_suppression: true,
            enable_voice_isolation: true,
            enable_auto_gain: true,
            suppression_level: SuppressionLevel::default(),
            target_loudness_db: -16.0,
        }
    }
}

impl ProcessingConfig {
    /// Returns `true` when stopping a recording should run the full-buffer
    /// enhancement pass.
    pub fn wants_enhancement_pass(&self) -> bool {
        self.enable_noise_suppression || self.enable_voice_isolation
    }
}

// ---------------------------------------------------------------------------
// OutputConfig
// ---------------------------------------------------------------------------

/// Where finished recordings land.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Recordings directory override.  `None` means the platform default
    /// from [`AppPaths`].
    pub recordings_dir: Option<PathBuf>,
    /// File-name prefix for new recordings (`<prefix>-<timestamp>.wav`).
    pub file_prefix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            recordings_dir: None,
            file_prefix: "recording".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use voice_recorder::config::AppConfig;
///
/// // Load (returns Default when the file is missing)
/// let config = AppConfig::load().unwrap();
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Processing switches used for new recording sessions.
    pub processing: ProcessingConfig,
    /// Output location settings.
    pub output: OutputConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    // ---- SuppressionLevel ---------------------------------------------------

    /// Thresholds must fall strictly as the levels get looser.
    #[test]
    fn thresholds_are_monotonically_decreasing() {
        let thresholds: Vec<f32> = SuppressionLevel::ALL.iter().map(|l| l.threshold()).collect();
        assert_eq!(thresholds, vec![0.10, 0.05, 0.02, 0.01]);
        for pair in thresholds.windows(2) {
            assert!(pair[0] > pair[1], "{} !> {}", pair[0], pair[1]);
        }
    }

    // ---- Defaults -----------------------------------------------------------

    #[test]
    fn default_processing_config() {
        let cfg = ProcessingConfig::default();
        assert!(cfg.enable_noise_suppression);
        assert!(cfg.enable_voice_isolation);
        assert!(cfg.enable_auto_gain);
        assert_eq!(cfg.suppression_level, SuppressionLevel::Strong);
        assert!((cfg.target_loudness_db - (-16.0)).abs() < f32::EPSILON);
        assert!(cfg.wants_enhancement_pass());
    }

    #[test]
    fn enhancement_pass_skipped_when_both_filters_off() {
        let cfg = ProcessingConfig {
            enable_noise_suppression: false,
            enable_voice_isolation: false,
            ..Default::default()
        };
        assert!(!cfg.wants_enhancement_pass());

        let only_gain = ProcessingConfig {
            enable_noise_suppression: false,
            enable_voice_isolation: false,
            enable_auto_gain: true,
            ..Default::default()
        };
        assert!(!only_gain.wants_enhancement_pass());
    }

    // ---- Persistence --------------------------------------------------------

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(original, loaded);
    }

    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = AppConfig::default();
        cfg.processing.enable_voice_isolation = false;
        cfg.processing.suppression_level = SuppressionLevel::Gentle;
        cfg.processing.target_loudness_db = -20.0;
        cfg.output.recordings_dir = Some(PathBuf::from("/tmp/captures"));
        cfg.output.file_prefix = "memo".into();

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded, cfg);
        assert_eq!(loaded.processing.suppression_level, SuppressionLevel::Gentle);
        assert_eq!(loaded.output.file_prefix, "memo");
    }

    /// `load_from` on a non-existent path must return `Default` without error.
    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nested/deeper/settings.toml");

        AppConfig::default().save_to(&path).expect("save");
        assert!(path.exists());
    }
}
