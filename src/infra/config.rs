//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! Every section is optional. Operator preferences that change at runtime
//! (URL, token, refresh rate, toggles) live in the settings file instead,
//! see `infra::settings`.

use crate::services::transform::{
    CoordinateTransform, DEFAULT_PREVIEW_SCALE, DEFAULT_PREVIEW_SENSOR_OFFSET, DEFAULT_SCALE, DEFAULT_SENSOR_OFFSET,
};
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Size and placement of one drawing surface (virtual pixels)
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SurfaceConfig {
    pub width: f64,
    pub height: f64,
    /// Pixels per millimeter
    pub scale: f64,
    /// Distance from the sensor origin to the bottom edge
    pub sensor_offset: f64,
}

impl SurfaceConfig {
    fn main() -> Self {
        Self { width: 800.0, height: 600.0, scale: DEFAULT_SCALE, sensor_offset: DEFAULT_SENSOR_OFFSET }
    }

    fn preview() -> Self {
        Self {
            width: 300.0,
            height: 200.0,
            scale: DEFAULT_PREVIEW_SCALE,
            sensor_offset: DEFAULT_PREVIEW_SENSOR_OFFSET,
        }
    }

    fn valid(&self) -> bool {
        self.width > 0.0 && self.height > 0.0 && self.scale > 0.0 && self.scale.is_finite()
    }

    pub fn transform(&self) -> CoordinateTransform {
        CoordinateTransform::bottom_center(self.width, self.height, self.scale, self.sensor_offset)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_ms: default_timeout_ms() }
    }
}

fn default_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettingsConfig {
    /// Where operator settings are persisted
    #[serde(default = "default_settings_file")]
    pub file: String,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self { file: default_settings_file() }
    }
}

fn default_settings_file() -> String {
    "ld2450-settings.toml".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log file; the console owns the terminal so nothing goes to stdout
    #[serde(default = "default_log_file")]
    pub file: String,
    /// Filter used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { file: default_log_file(), level: default_log_level() }
    }
}

fn default_log_file() -> String {
    "ld2450-zones.log".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub canvas: Option<SurfaceConfig>,
    #[serde(default)]
    pub preview: Option<SurfaceConfig>,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    canvas: SurfaceConfig,
    preview: SurfaceConfig,
    http_timeout_ms: u64,
    settings_file: String,
    log_file: String,
    log_level: String,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            canvas: SurfaceConfig::main(),
            preview: SurfaceConfig::preview(),
            http_timeout_ms: default_timeout_ms(),
            settings_file: default_settings_file(),
            log_file: default_log_file(),
            log_level: default_log_level(),
            metrics_interval_secs: default_metrics_interval(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        // Unusable surfaces fall back to the built-in geometry
        let canvas = toml_config.canvas.filter(SurfaceConfig::valid).unwrap_or_else(SurfaceConfig::main);
        let preview = toml_config.preview.filter(SurfaceConfig::valid).unwrap_or_else(SurfaceConfig::preview);

        Ok(Self {
            canvas,
            preview,
            http_timeout_ms: toml_config.http.timeout_ms.max(1),
            settings_file: toml_config.settings.file,
            log_file: toml_config.logging.file,
            log_level: toml_config.logging.level,
            metrics_interval_secs: toml_config.metrics.interval_secs.max(1),
            config_file: path.display().to_string(),
        })
    }

    /// Load from an explicit path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    pub fn canvas(&self) -> &SurfaceConfig {
        &self.canvas
    }

    pub fn preview(&self) -> &SurfaceConfig {
        &self.preview
    }

    pub fn http_timeout_ms(&self) -> u64 {
        self.http_timeout_ms
    }

    pub fn settings_file(&self) -> &str {
        &self.settings_file
    }

    pub fn log_file(&self) -> &str {
        &self.log_file
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Override the settings file (for testing)
    pub fn with_settings_file(mut self, file: &str) -> Self {
        self.settings_file = file.to_string();
        self
    }
}
