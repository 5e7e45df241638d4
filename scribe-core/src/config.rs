//! # Configuration Module
//!
//! Application settings, stored as pretty-printed JSON. Every field has a
//! default, so a partial file (or no file at all) is a valid configuration.

use crate::analysis::AnalysisConfig;
use crate::score::LilypondConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Default capture rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Samples per live-preview analysis block (~46ms at 44.1kHz).
pub const DEFAULT_BLOCK_SIZE: usize = 2048;

/// Settings for the capture worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Requested sample rate in Hz. Devices that cannot deliver it use the
    /// closest supported rate instead.
    pub sample_rate: u32,
    /// Block length for the live preview.
    pub block_size: usize,
    /// Substring of the input device name to use; the host default otherwise.
    pub device: Option<String>,
    /// How often the capture worker checks for a stop request.
    pub poll_interval_ms: u64,
    /// Emit display-only pitch events while capturing.
    pub live_preview: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            device: None,
            poll_interval_ms: 20,
            live_preview: true,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub capture: CaptureConfig,
    pub analysis: AnalysisConfig,
    pub lilypond: LilypondConfig,
    /// Where the score PDF is written when capture stops.
    pub output_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            analysis: AnalysisConfig::default(),
            lilypond: LilypondConfig::default(),
            output_path: PathBuf::from("partitura.pdf"),
        }
    }
}

impl AppConfig {
    /// Loads a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file =
            File::open(path).with_context(|| format!("opening config {}", path.display()))?;
        let mut data = String::new();
        file.read_to_string(&mut data)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = serde_json::from_str(&data)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Loads `path`, falling back to defaults when the file does not exist.
    ///
    /// A file that exists but cannot be parsed is still an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("[CONFIG] {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Saves the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json_string = serde_json::to_string_pretty(self)?;
        let mut file =
            File::create(path).with_context(|| format!("creating config {}", path.display()))?;
        file.write_all(json_string.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_then_load_preserves_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notescribe.json");
        let mut config = AppConfig::default();
        config.capture.sample_rate = 48000;
        config.capture.device = Some("loopback".to_string());
        config.lilypond.executable = PathBuf::from("/opt/lilypond/bin/lilypond");
        config.output_path = PathBuf::from("take.pdf");

        config.save(&path).unwrap();
        assert_eq!(AppConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(dir.path().join("absent.json")).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(AppConfig::load(dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{ "capture": { "live_preview": false }, "analysis": { "fmin": 80.0 } }"#)
            .unwrap();

        let config = AppConfig::load_or_default(&path).unwrap();
        assert!(!config.capture.live_preview);
        assert_eq!(config.capture.sample_rate, DEFAULT_SAMPLE_RATE);
        assert_eq!(config.analysis.fmin, 80.0);
        assert_eq!(config.analysis.n_fft, 2048);
        assert_eq!(config.lilypond, LilypondConfig::default());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(AppConfig::load_or_default(&path).is_err());
    }
}
