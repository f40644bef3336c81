//! Configuration loading and parsing

use anyhow::{ensure, Context, Result};
use gws_protocol::ShifterConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration (loaded from config.toml)
///
/// Every section is optional; command-line flags override file values.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub shifter: ShifterConfig,
    #[serde(default)]
    pub led: LedConfig,
    #[serde(default)]
    pub receive: ReceiveConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BusConfig {
    /// candump log to replay ("-" for stdin)
    pub input: Option<PathBuf>,
    /// File receiving outbound frames in candump format (default: stdout)
    pub output: Option<PathBuf>,
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Pace the replay by the capture timestamps
    #[serde(default)]
    pub realtime: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            channel: default_channel(),
            realtime: false,
        }
    }
}

fn default_channel() -> String {
    "can0".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LedConfig {
    #[serde(default = "default_refresh_hz")]
    pub refresh_hz: u32,
    /// Send one backlight frame (0x202) at startup
    #[serde(default = "default_backlight_enabled")]
    pub backlight_enabled: bool,
    /// Brightness carried by that frame
    #[serde(default = "default_backlight")]
    pub backlight: u8,
}

impl Default for LedConfig {
    fn default() -> Self {
        Self {
            refresh_hz: default_refresh_hz(),
            backlight_enabled: default_backlight_enabled(),
            backlight: default_backlight(),
        }
    }
}

fn default_refresh_hz() -> u32 {
    10
}

fn default_backlight_enabled() -> bool {
    true
}

fn default_backlight() -> u8 {
    0xFF
}

impl LedConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(1) / self.refresh_hz.max(1)
    }

    /// Brightness to send at startup, or None when the frame is disabled
    pub fn startup_backlight(&self) -> Option<u8> {
        self.backlight_enabled.then_some(self.backlight)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReceiveConfig {
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    1000
}

impl ReceiveConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl AppConfig {
    /// Reject settings the runtime cannot work with
    pub fn validate(&self) -> Result<()> {
        ensure!(self.led.refresh_hz > 0, "[led] refresh_hz must be at least 1");
        ensure!(
            self.led.refresh_hz <= 1000,
            "[led] refresh_hz {} exceeds 1000",
            self.led.refresh_hz
        );
        ensure!(self.receive.timeout_ms > 0, "[receive] timeout_ms must be positive");
        ensure!(!self.bus.channel.is_empty(), "[bus] channel must not be empty");
        Ok(())
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .validate()
        .with_context(|| format!("Invalid config file: {:?}", path))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gws_protocol::GearState;
    use std::io::Write;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            [bus]
            input = "capture.log"
            channel = "vcan0"
            realtime = true

            [shifter]
            toggle_timeout_ms = 300
            initial_gear = "N"
            flash_led = true

            [led]
            refresh_hz = 20
            backlight = 128

            [receive]
            timeout_ms = 250
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.bus.input, Some(PathBuf::from("capture.log")));
        assert_eq!(config.bus.channel, "vcan0");
        assert!(config.bus.realtime);
        assert_eq!(config.shifter.toggle_timeout_ms, 300);
        assert_eq!(config.shifter.initial_gear, GearState::Neutral);
        assert!(config.shifter.flash_led);
        assert!(!config.shifter.reject_crc_mismatch);
        assert_eq!(config.led.refresh_interval(), Duration::from_millis(50));
        assert_eq!(config.led.startup_backlight(), Some(128));
        assert_eq!(config.receive.timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.bus.channel, "can0");
        assert_eq!(config.shifter.initial_gear, GearState::Park);
        assert_eq!(config.shifter.toggle_timeout_ms, 500);
        assert_eq!(config.led.refresh_hz, 10);
        assert_eq!(config.led.startup_backlight(), Some(0xFF));
        assert_eq!(config.receive.timeout_ms, 1000);
    }

    #[test]
    fn test_backlight_can_be_disabled() {
        let config: AppConfig = toml::from_str("[led]\nbacklight_enabled = false").unwrap();
        assert_eq!(config.led.startup_backlight(), None);
        assert_eq!(config.led.refresh_hz, 10);
    }

    #[test]
    fn test_load_config_rejects_bad_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[led]\nrefresh_hz = 0").unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("refresh_hz"));
    }

    #[test]
    fn test_load_config_rejects_bad_gear() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[shifter]\ninitial_gear = \"M9\"").unwrap();

        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/gws.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
