//! Operator settings persisted between runs
//!
//! Stored as a small TOML file next to the config. A missing file means
//! defaults; reset deletes the file.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_REFRESH_RATE_MS: u64 = 500;
/// Faster polling than this hammers the Home Assistant instance
pub const MIN_REFRESH_RATE_MS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggle(&self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub ha_url: String,
    pub ha_token: String,
    pub refresh_rate_ms: u64,
    pub show_grid: bool,
    pub enable_persistence: bool,
    pub theme: Theme,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ha_url: String::new(),
            ha_token: String::new(),
            refresh_rate_ms: DEFAULT_REFRESH_RATE_MS,
            show_grid: true,
            enable_persistence: false,
            theme: Theme::Light,
        }
    }
}

impl Settings {
    /// Poll period; 0 reads as the default, anything else is floored
    pub fn refresh_rate(&self) -> Duration {
        let ms = match self.refresh_rate_ms {
            0 => DEFAULT_REFRESH_RATE_MS,
            ms => ms.max(MIN_REFRESH_RATE_MS),
        };
        Duration::from_millis(ms)
    }

    /// Both URL and token are required before connecting
    pub fn has_credentials(&self) -> bool {
        !self.ha_url.trim().is_empty() && !self.ha_token.trim().is_empty()
    }

    /// Drop values a previous version stored in a broken form
    fn sanitize(mut self) -> Self {
        if self.ha_url.contains("http://http:") {
            warn!(ha_url = %self.ha_url, "settings_malformed_url_discarded");
            self.ha_url.clear();
        }
        self
    }
}

#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read settings; a missing file yields defaults
    pub fn load(&self) -> anyhow::Result<Settings> {
        if !self.path.exists() {
            return Ok(Settings::default());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings file {}", self.path.display()))?;
        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file {}", self.path.display()))?;
        Ok(settings.sanitize())
    }

    /// Like `load`, but an unreadable file is logged and replaced by defaults
    pub fn load_or_default(&self) -> Settings {
        match self.load() {
            Ok(settings) => settings,
            Err(e) => {
                warn!(path = %self.path.display(), error = %format!("{:#}", e), "settings_load_failed");
                Settings::default()
            }
        }
    }

    pub fn save(&self, settings: &Settings) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create settings directory {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(settings).context("Failed to serialize settings")?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write settings file {}", self.path.display()))?;
        info!(path = %self.path.display(), "settings_saved");
        Ok(())
    }

    /// Forget everything stored
    pub fn reset(&self) -> anyhow::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "settings_reset");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to remove settings file {}", self.path.display()))
            }
        }
    }
}
