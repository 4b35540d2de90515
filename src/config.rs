//! Upload configuration module.
//!
//! Handles loading, validating, and merging `config.toml` files. Stock
//! defaults are overridden by a user config file; the file only needs the
//! keys it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! max_size_mb = 5.0           # Validation ceiling
//! max_width = 2048            # Transform scaling bound (pixels)
//! max_height = 2048
//! compression_quality = 0.85  # Lossy encode fidelity, 0 < q <= 1
//! accepted_mime_types = ["image/jpeg", "image/png", "image/webp", "image/gif"]
//! # crop_aspect_ratio = 1.0   # Enables the crop stage (width / height)
//! destination_prefix = "pixels"
//! allow_retry = true
//!
//! [progress]
//! step_percent = 10           # Synthetic progress increment
//! interval_ms = 200           # Delay between increments
//!
//! [storage]
//! root = "uploads"            # Local storage directory (CLI only)
//! public_base_url = "http://localhost:8080/uploads"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Immutable per-pipeline configuration.
///
/// All fields have defaults. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadConfig {
    /// Largest accepted file, in mebibytes.
    pub max_size_mb: f64,
    /// Transform bound: images wider than this are scaled down.
    pub max_width: u32,
    /// Transform bound: images taller than this are scaled down.
    pub max_height: u32,
    /// Lossy encode fidelity in `(0, 1]`.
    pub compression_quality: f32,
    /// MIME whitelist. `image/*` accepts every image type.
    pub accepted_mime_types: Vec<String>,
    /// Width / height ratio the crop stage enforces. Absent disables cropping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_aspect_ratio: Option<f64>,
    /// Logical folder prepended to every storage key.
    pub destination_prefix: String,
    /// Retain the source file after a retryable failure.
    pub allow_retry: bool,
    /// Synthetic progress tuning.
    pub progress: ProgressConfig,
    /// Local storage backend settings (used by the CLI).
    pub storage: StorageConfig,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_size_mb: 5.0,
            max_width: 2048,
            max_height: 2048,
            compression_quality: 0.85,
            accepted_mime_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/webp".to_string(),
                "image/gif".to_string(),
            ],
            crop_aspect_ratio: None,
            destination_prefix: "pixels".to_string(),
            allow_retry: true,
            progress: ProgressConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl UploadConfig {
    /// Size ceiling in bytes.
    pub fn max_size_bytes(&self) -> u64 {
        (self.max_size_mb * 1024.0 * 1024.0) as u64
    }

    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.max_size_mb.is_finite() || self.max_size_bytes() == 0 {
            return Err(ConfigError::Validation(
                "max_size_mb must be greater than zero".into(),
            ));
        }
        if !(self.compression_quality > 0.0 && self.compression_quality <= 1.0) {
            return Err(ConfigError::Validation(
                "compression_quality must be in (0, 1]".into(),
            ));
        }
        if self.max_width == 0 || self.max_height == 0 {
            return Err(ConfigError::Validation(
                "max_width and max_height must be non-zero".into(),
            ));
        }
        if let Some(ratio) = self.crop_aspect_ratio
            && !(ratio.is_finite() && ratio > 0.0)
        {
            return Err(ConfigError::Validation(
                "crop_aspect_ratio must be a positive number".into(),
            ));
        }
        if self.accepted_mime_types.is_empty() {
            return Err(ConfigError::Validation(
                "accepted_mime_types must not be empty".into(),
            ));
        }
        if self.progress.step_percent == 0 || self.progress.step_percent > 90 {
            return Err(ConfigError::Validation(
                "progress.step_percent must be 1-90".into(),
            ));
        }
        if self.progress.interval_ms == 0 {
            return Err(ConfigError::Validation(
                "progress.interval_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Synthetic progress settings.
///
/// Storage offers no progress channel, so the upload stage advances by
/// `step_percent` every `interval_ms` up to 90%.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProgressConfig {
    pub step_percent: u8,
    pub interval_ms: u64,
}

impl ProgressConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            step_percent: 10,
            interval_ms: 200,
        }
    }
}

/// Local-directory storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory objects are written under.
    pub root: String,
    /// URL prefix that serves `root`.
    pub public_base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: "uploads".to_string(),
            public_base_url: "http://localhost:8080/uploads".to_string(),
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(UploadConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<UploadConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: UploadConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load a config file, merging it over stock defaults.
///
/// `None` yields the validated stock defaults.
pub fn load_config(path: Option<&Path>) -> Result<UploadConfig, ConfigError> {
    let overlay = match path {
        Some(p) => {
            let content = fs::read_to_string(p)?;
            Some(toml::from_str::<toml::Value>(&content)?)
        }
        None => None,
    };
    resolve_config(stock_defaults_value(), overlay)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Pixel Upload Configuration
# ==========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# Largest accepted file, in mebibytes.
max_size_mb = 5.0

# Images larger than this box are scaled down, preserving aspect ratio.
# Images are never scaled up.
max_width = 2048
max_height = 2048

# JPEG quality for re-encoded images, 0 < q <= 1.
# PNG sources stay PNG and ignore this value.
compression_quality = 0.85

# Accepted MIME types. Use "image/*" to accept any image.
accepted_mime_types = ["image/jpeg", "image/png", "image/webp", "image/gif"]

# Width / height ratio for the crop stage. Omit to skip cropping.
# crop_aspect_ratio = 1.0

# Logical folder prepended to every storage key.
destination_prefix = "pixels"

# Keep the file after a retryable failure so it can be retried.
allow_retry = true

# ---------------------------------------------------------------------------
# Synthetic upload progress
# ---------------------------------------------------------------------------
[progress]
# Percent added per tick while the transfer is outstanding (capped at 90).
step_percent = 10

# Milliseconds between ticks.
interval_ms = 200

# ---------------------------------------------------------------------------
# Local storage (used by the `upload` command)
# ---------------------------------------------------------------------------
[storage]
root = "uploads"
public_base_url = "http://localhost:8080/uploads"
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // =========================================================================
    // Defaults and validation
    // =========================================================================

    #[test]
    fn default_config_is_valid() {
        UploadConfig::default().validate().unwrap();
    }

    #[test]
    fn default_max_size_is_five_mebibytes() {
        assert_eq!(UploadConfig::default().max_size_bytes(), 5 * 1024 * 1024);
    }

    #[test]
    fn fractional_size_limit() {
        let config = UploadConfig {
            max_size_mb: 0.5,
            ..UploadConfig::default()
        };
        assert_eq!(config.max_size_bytes(), 512 * 1024);
    }

    #[test]
    fn rejects_zero_size_limit() {
        let config = UploadConfig {
            max_size_mb: 0.0,
            ..UploadConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_quality_out_of_range() {
        for q in [0.0, -0.5, 1.01, f32::NAN] {
            let config = UploadConfig {
                compression_quality: q,
                ..UploadConfig::default()
            };
            assert!(config.validate().is_err(), "quality {q} should be rejected");
        }
    }

    #[test]
    fn quality_of_one_is_valid() {
        let config = UploadConfig {
            compression_quality: 1.0,
            ..UploadConfig::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn rejects_non_positive_crop_ratio() {
        let config = UploadConfig {
            crop_aspect_ratio: Some(0.0),
            ..UploadConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_progress_step() {
        let mut config = UploadConfig::default();
        config.progress.step_percent = 0;
        assert!(config.validate().is_err());
    }

    // =========================================================================
    // Merging and loading
    // =========================================================================

    #[test]
    fn merge_overrides_scalar_and_keeps_rest() {
        let overlay: toml::Value = toml::from_str("max_width = 800").unwrap();
        let config = resolve_config(stock_defaults_value(), Some(overlay)).unwrap();
        assert_eq!(config.max_width, 800);
        assert_eq!(config.max_height, 2048);
    }

    #[test]
    fn merge_nested_table_partially() {
        let overlay: toml::Value = toml::from_str("[progress]\ninterval_ms = 50").unwrap();
        let config = resolve_config(stock_defaults_value(), Some(overlay)).unwrap();
        assert_eq!(config.progress.interval_ms, 50);
        assert_eq!(config.progress.step_percent, 10);
    }

    #[test]
    fn load_without_file_gives_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config, UploadConfig::default());
    }

    #[test]
    fn load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            r#"
max_size_mb = 2
crop_aspect_ratio = 1.0
accepted_mime_types = ["image/*"]
destination_prefix = "ads"
"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.max_size_bytes(), 2 * 1024 * 1024);
        assert_eq!(config.crop_aspect_ratio, Some(1.0));
        assert_eq!(config.accepted_mime_types, vec!["image/*".to_string()]);
        assert_eq!(config.destination_prefix, "ads");
    }

    #[test]
    fn load_rejects_unknown_keys() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "max_widht = 10\n").unwrap();

        assert!(matches!(
            load_config(Some(&path)),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn load_rejects_invalid_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "compression_quality = 1.5\n").unwrap();

        assert!(matches!(
            load_config(Some(&path)),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let result = load_config(Some(&tmp.path().join("absent.toml")));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn stock_config_parses_to_defaults() {
        let value: toml::Value = toml::from_str(stock_config_toml()).unwrap();
        let config = resolve_config(stock_defaults_value(), Some(value)).unwrap();
        assert_eq!(config, UploadConfig::default());
    }
}
