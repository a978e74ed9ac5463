//! Integration tests for configuration loading

use ld2450_zones::infra::Config;
use ld2450_zones::services::transform::{Millimeters, Pixel};
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[canvas]
width = 1000.0
height = 500.0
scale = 0.2
sensor_offset = 40.0

[http]
timeout_ms = 1500

[settings]
file = "/tmp/ld2450/settings.toml"

[logging]
file = "/tmp/ld2450/console.log"
level = "debug"

[metrics]
interval_secs = 15
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.canvas().width, 1000.0);
    assert_eq!(config.http_timeout_ms(), 1500);
    assert_eq!(config.settings_file(), "/tmp/ld2450/settings.toml");
    assert_eq!(config.log_file(), "/tmp/ld2450/console.log");
    assert_eq!(config.log_level(), "debug");
    assert_eq!(config.metrics_interval_secs(), 15);

    // Missing preview section keeps the built-in preview surface
    assert_eq!(config.preview().width, 300.0);

    let view = config.canvas().transform();
    assert_eq!(view.origin(), Pixel { px: 500.0, py: 460.0 });
    assert_eq!(view.to_canvas(Millimeters { x: 1000.0, y: 1000.0 }), Pixel { px: 700.0, py: 260.0 });
}

#[test]
fn test_invalid_surface_falls_back() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file
        .write_all(b"[canvas]\nwidth = 0.0\nheight = 600.0\nscale = 0.1\nsensor_offset = 50.0\n")
        .unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(config.canvas().width, 800.0);
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.canvas().width, 800.0);
    assert_eq!(config.canvas().height, 600.0);
    assert_eq!(config.http_timeout_ms(), 5000);
    assert_eq!(config.settings_file(), "ld2450-settings.toml");
    assert_eq!(config.config_file(), "default");
}

#[test]
fn test_malformed_file_is_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[http]\ntimeout_ms = \"soon\"\n").unwrap();
    temp_file.flush().unwrap();

    assert!(Config::from_file(temp_file.path()).is_err());
}

#[test]
fn test_dev_config_parses() {
    let config = Config::from_file(concat!(env!("CARGO_MANIFEST_DIR"), "/config/dev.toml")).unwrap();
    assert_eq!(config.canvas().scale, 0.1);
    assert_eq!(config.preview().scale, 0.05);
}
