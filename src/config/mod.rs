//! Configuration module for voxgraph
//!
//! Settings are stored as TOML. Every section and field has a default, so a
//! partial file (or none at all) yields a usable configuration.
//!
//! # Config Location
//!
//! The default file lives in the platform config directory:
//! - **Linux**: `~/.config/voxgraph/config.toml`
//! - **macOS**: `~/Library/Application Support/voxgraph/config.toml`
//! - **Windows**: `%APPDATA%\voxgraph\config.toml`
//!
//! # Example
//!
//! ```ignore
//! use voxgraph::config::WorkbenchConfig;
//!
//! let config = WorkbenchConfig::load_or_default(WorkbenchConfig::default_path()?);
//! println!("sigma = {}", config.filters.default_sigma);
//! ```

pub mod presets;

pub use presets::{builtin_presets, VolumePreset};

use crate::error::{Result, ResultExt, WorkbenchError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "voxgraph";

/// Config filename
pub const CONFIG_FILE: &str = "config.toml";

/// Default tracing filter when neither `RUST_LOG` nor the config sets one
pub const DEFAULT_LOG_FILTER: &str = "info,voxgraph=debug";

/// Default number of repeated convolutions per timing row
pub const DEFAULT_TIMING_RUNS: u32 = 5;

/// Default seconds of rendering before an FPS row is emitted
pub const DEFAULT_FPS_LOG_AFTER_SECS: u64 = 30;

// ==================== Sections ====================

/// Logging setup for the binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Directory for daily rolling log files; console only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            log_dir: None,
        }
    }
}

/// Filter module defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSettings {
    /// Sigma used by new Gaussian smoothing modules
    #[serde(default = "default_sigma")]
    pub default_sigma: f64,

    /// Convolutions averaged per timing row
    #[serde(default = "default_timing_runs")]
    pub timing_runs: u32,

    /// Whether pixel-domain filters time their convolutions
    #[serde(default)]
    pub log_timings: bool,

    /// Where timing CSV files are written
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            default_sigma: default_sigma(),
            timing_runs: DEFAULT_TIMING_RUNS,
            log_timings: false,
            log_dir: None,
        }
    }
}

/// Renderer module defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererSettings {
    /// Emit one average-FPS row per image after `fps_log_after_secs`
    #[serde(default)]
    pub log_fps: bool,

    #[serde(default = "default_fps_log_after_secs")]
    pub fps_log_after_secs: u64,

    /// Radians added to the volume rotation each frame
    #[serde(default = "default_rotation_step")]
    pub rotation_step: f64,

    /// Scale applied to pointer drag deltas when adjusting the window level
    #[serde(default = "default_pointer_multiplier")]
    pub pointer_multiplier: f64,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            log_fps: false,
            fps_log_after_secs: DEFAULT_FPS_LOG_AFTER_SECS,
            rotation_step: default_rotation_step(),
            pointer_multiplier: default_pointer_multiplier(),
        }
    }
}

/// Volume data sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSettings {
    /// Base directory for preset raw files
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default = "builtin_presets")]
    pub presets: Vec<VolumePreset>,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            data_dir: None,
            presets: builtin_presets(),
        }
    }
}

// ==================== Workbench Config ====================

/// Complete workbench configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkbenchConfig {
    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub filters: FilterSettings,

    #[serde(default)]
    pub renderer: RendererSettings,

    #[serde(default)]
    pub data: DataSettings,
}

impl WorkbenchConfig {
    /// Default config file path
    pub fn default_path() -> Result<PathBuf> {
        dirs_next::config_dir()
            .map(|p| p.join(APP_ID).join(CONFIG_FILE))
            .ok_or_else(|| {
                WorkbenchError::Config("Could not determine config directory".to_string())
            })
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            WorkbenchError::Config(format!("Failed to read config {:?}: {}", path, e))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            WorkbenchError::Config(format!("Failed to parse config {:?}: {}", path, e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let (config, error) = Self::load_or_default_reporting(path);
        if let Some(e) = error {
            tracing::warn!("Failed to load config, using defaults: {}", e);
        }
        config
    }

    /// Like [`load_or_default`](Self::load_or_default), but hands the load
    /// error back instead of logging it. A missing file is not an error.
    pub fn load_or_default_reporting(path: impl AsRef<Path>) -> (Self, Option<WorkbenchError>) {
        let path = path.as_ref();
        if !path.exists() {
            return (Self::default(), None);
        }
        match Self::load(path) {
            Ok(config) => (config, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    /// Save configuration as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(WorkbenchError::from)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| WorkbenchError::Serialization(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(WorkbenchError::from)
            .with_context(|| format!("Failed to write config {:?}", path))
    }

    /// Reject values no module could work with
    pub fn validate(&self) -> Result<()> {
        if !(self.filters.default_sigma.is_finite() && self.filters.default_sigma > 0.0) {
            return Err(WorkbenchError::Config(format!(
                "filters.default_sigma must be positive, got {}",
                self.filters.default_sigma
            )));
        }
        if self.filters.timing_runs == 0 {
            return Err(WorkbenchError::Config(
                "filters.timing_runs must be at least 1".to_string(),
            ));
        }
        if self.data.presets.is_empty() {
            return Err(WorkbenchError::Preset(
                "at least one volume preset is required".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

fn default_sigma() -> f64 {
    1.0
}

fn default_timing_runs() -> u32 {
    DEFAULT_TIMING_RUNS
}

fn default_fps_log_after_secs() -> u64 {
    DEFAULT_FPS_LOG_AFTER_SECS
}

fn default_rotation_step() -> f64 {
    0.01
}

fn default_pointer_multiplier() -> f64 {
    4.0
}
