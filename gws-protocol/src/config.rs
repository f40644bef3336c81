//! Engine configuration types
//!
//! This module defines the settings the protocol engine needs. Transport and
//! process settings (bus paths, refresh rates) live in the application layer.

use crate::types::GearState;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Minimum time between two accepted lever toggles
pub const DEFAULT_TOGGLE_TIMEOUT_MS: u64 = 500;

/// Configuration for the shifter engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShifterConfig {
    /// Debounce window for lever toggles, in milliseconds
    #[serde(default = "default_toggle_timeout")]
    pub toggle_timeout_ms: u64,

    /// Gear selected at startup
    #[serde(default)]
    pub initial_gear: GearState,

    /// Drop lever frames with a bad CRC instead of applying them
    #[serde(default)]
    pub reject_crc_mismatch: bool,

    /// Set the blink bit (0x08) on the LED code
    #[serde(default)]
    pub flash_led: bool,
}

fn default_toggle_timeout() -> u64 {
    DEFAULT_TOGGLE_TIMEOUT_MS
}

impl Default for ShifterConfig {
    fn default() -> Self {
        Self {
            toggle_timeout_ms: DEFAULT_TOGGLE_TIMEOUT_MS,
            initial_gear: GearState::Park,
            reject_crc_mismatch: false,
            flash_led: false,
        }
    }
}

impl ShifterConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the toggle debounce window
    pub fn with_toggle_timeout(mut self, timeout: Duration) -> Self {
        self.toggle_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Builder method: set the startup gear
    pub fn with_initial_gear(mut self, gear: GearState) -> Self {
        self.initial_gear = gear;
        self
    }

    /// Builder method: drop frames whose CRC does not verify
    pub fn with_crc_rejection(mut self, enabled: bool) -> Self {
        self.reject_crc_mismatch = enabled;
        self
    }

    /// Builder method: enable the LED blink bit
    pub fn with_flash_led(mut self, enabled: bool) -> Self {
        self.flash_led = enabled;
        self
    }

    /// Debounce window as a Duration
    pub fn toggle_timeout(&self) -> Duration {
        Duration::from_millis(self.toggle_timeout_ms)
    }
}
