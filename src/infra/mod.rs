//! Infrastructure - configuration, settings and metrics
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML loading, defaults)
//! - `settings` - Operator settings persisted between runs
//! - `metrics` - Lock-free metrics collection

pub mod config;
pub mod metrics;
pub mod settings;

// Re-export commonly used types
pub use config::Config;
pub use metrics::Metrics;
pub use settings::{Settings, SettingsStore, Theme};
