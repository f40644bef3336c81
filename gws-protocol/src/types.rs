//! Core types for the GWS protocol engine
//!
//! This module defines the gear state, the lever positions and button bits seen
//! on the wire, the raw CAN frame passed between bus adapters and the engine,
//! and the error type shared by the whole library.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Timestamp type used for wall-clock stamps (log captures, snapshots)
pub type Timestamp = DateTime<Utc>;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, GwsError>;

/// Highest selectable manual gear
pub const MAX_MANUAL_GEAR: u8 = 8;

/// Lowest selectable manual gear
pub const MIN_MANUAL_GEAR: u8 = 1;

/// Raw CAN frame as received from (or sent to) a bus adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanFrame {
    /// Capture time in microseconds since epoch (only set for replayed logs)
    pub timestamp_us: Option<u64>,
    /// Interface name (e.g. "can0")
    pub channel: String,
    /// CAN arbitration ID (11-bit)
    pub can_id: u32,
    /// Frame data bytes (0-8 bytes)
    pub data: Vec<u8>,
}

impl CanFrame {
    /// Create a frame without capture time
    pub fn new(channel: impl Into<String>, can_id: u32, data: Vec<u8>) -> Self {
        Self {
            timestamp_us: None,
            channel: channel.into(),
            can_id,
            data,
        }
    }

    /// Convert the capture time to DateTime<Utc>, if the frame has one
    pub fn timestamp(&self) -> Option<Timestamp> {
        let us = self.timestamp_us?;
        let secs = (us / 1_000_000) as i64;
        let nsecs = ((us % 1_000_000) * 1_000) as u32;
        DateTime::from_timestamp(secs, nsecs)
    }

    /// Get the data length code (DLC) - number of data bytes
    pub fn dlc(&self) -> usize {
        self.data.len()
    }
}

/// Errors that can occur in the engine
#[derive(Debug, thiserror::Error)]
pub enum GwsError {
    #[error("Frame too short: CAN ID 0x{can_id:03X} carried {len} bytes")]
    FrameTooShort { can_id: u32, len: usize },

    #[error("CRC mismatch: expected 0x{expected:02X}, received 0x{received:02X}")]
    CrcMismatch { expected: u8, received: u8 },

    #[error("Invalid gear: {0}")]
    InvalidGear(String),

    #[error("Failed to parse log line {line}: {message}")]
    LogParseError { line: usize, message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Transmission mode selected with the lever
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GearState {
    #[default]
    Park,
    Reverse,
    Neutral,
    Drive,
    /// Manual/sport mode with the selected level (always 1..=8)
    Manual(u8),
}

impl GearState {
    /// Build a manual gear, rejecting levels outside 1..=8
    pub fn manual(level: u8) -> Result<Self> {
        if (MIN_MANUAL_GEAR..=MAX_MANUAL_GEAR).contains(&level) {
            Ok(GearState::Manual(level))
        } else {
            Err(GwsError::InvalidGear(format!(
                "manual level {} outside {}..={}",
                level, MIN_MANUAL_GEAR, MAX_MANUAL_GEAR
            )))
        }
    }

    /// True for any manual level
    pub fn is_manual(&self) -> bool {
        matches!(self, GearState::Manual(_))
    }

    /// Manual level, if in manual mode
    pub fn manual_level(&self) -> Option<u8> {
        match self {
            GearState::Manual(level) => Some(*level),
            _ => None,
        }
    }
}

impl fmt::Display for GearState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GearState::Park => write!(f, "P"),
            GearState::Reverse => write!(f, "R"),
            GearState::Neutral => write!(f, "N"),
            GearState::Drive => write!(f, "D"),
            GearState::Manual(level) => write!(f, "M{}", level),
        }
    }
}

impl FromStr for GearState {
    type Err = GwsError;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        match upper.as_str() {
            "P" | "PARK" => Ok(GearState::Park),
            "R" | "REVERSE" => Ok(GearState::Reverse),
            "N" | "NEUTRAL" => Ok(GearState::Neutral),
            "D" | "DRIVE" => Ok(GearState::Drive),
            _ => {
                let level = upper
                    .strip_prefix('M')
                    .and_then(|rest| rest.parse::<u8>().ok())
                    .ok_or_else(|| GwsError::InvalidGear(s.to_string()))?;
                GearState::manual(level)
            }
        }
    }
}

impl Serialize for GearState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GearState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Lever position byte as reported in the lever status frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LeverRawPosition {
    /// Primary rest point (0x0E)
    #[default]
    Center,
    /// Pushed forward one step (0x1E)
    Up,
    /// Pushed forward past the first step (0x2E)
    UpPlus,
    /// Pulled back (0x3E)
    Down,
    /// Side gate rest point (0x7E)
    Side,
    /// Side gate pulled back (0x5E)
    ManualDown,
    /// Side gate pushed forward (0x6E)
    ManualUp,
    /// Anything not in the table above
    Unknown(u8),
}

impl LeverRawPosition {
    pub const CENTER: u8 = 0x0E;
    pub const UP: u8 = 0x1E;
    pub const UP_PLUS: u8 = 0x2E;
    pub const DOWN: u8 = 0x3E;
    pub const SIDE: u8 = 0x7E;
    pub const MANUAL_DOWN: u8 = 0x5E;
    pub const MANUAL_UP: u8 = 0x6E;

    /// Decode a position byte. Total: unmapped bytes become `Unknown`.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            Self::CENTER => LeverRawPosition::Center,
            Self::UP => LeverRawPosition::Up,
            Self::UP_PLUS => LeverRawPosition::UpPlus,
            Self::DOWN => LeverRawPosition::Down,
            Self::SIDE => LeverRawPosition::Side,
            Self::MANUAL_DOWN => LeverRawPosition::ManualDown,
            Self::MANUAL_UP => LeverRawPosition::ManualUp,
            other => LeverRawPosition::Unknown(other),
        }
    }

    /// Wire byte for this position
    pub fn raw(&self) -> u8 {
        match self {
            LeverRawPosition::Center => Self::CENTER,
            LeverRawPosition::Up => Self::UP,
            LeverRawPosition::UpPlus => Self::UP_PLUS,
            LeverRawPosition::Down => Self::DOWN,
            LeverRawPosition::Side => Self::SIDE,
            LeverRawPosition::ManualDown => Self::MANUAL_DOWN,
            LeverRawPosition::ManualUp => Self::MANUAL_UP,
            LeverRawPosition::Unknown(raw) => *raw,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, LeverRawPosition::Unknown(_))
    }
}

impl fmt::Display for LeverRawPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeverRawPosition::Center => write!(f, "Center"),
            LeverRawPosition::Up => write!(f, "Up (R)"),
            LeverRawPosition::UpPlus => write!(f, "Up+ (Beyond R)"),
            LeverRawPosition::Down => write!(f, "Down (D)"),
            LeverRawPosition::Side => write!(f, "Side (S)"),
            LeverRawPosition::ManualDown => write!(f, "Manual Down (-)"),
            LeverRawPosition::ManualUp => write!(f, "Manual Up (+)"),
            LeverRawPosition::Unknown(raw) => write!(f, "Unknown (0x{:02X})", raw),
        }
    }
}

/// Button bits carried in the lever status frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ButtonState {
    /// "P" button on top of the lever (bit 0)
    pub park_pressed: bool,
    /// Unlock button on the side of the lever (bit 1)
    pub unlock_pressed: bool,
}

impl ButtonState {
    const PARK_BIT: u8 = 0x01;
    const UNLOCK_BIT: u8 = 0x02;

    /// Decode the button byte; bits other than 0 and 1 are ignored
    pub fn from_bits(bits: u8) -> Self {
        Self {
            park_pressed: bits & Self::PARK_BIT != 0,
            unlock_pressed: bits & Self::UNLOCK_BIT != 0,
        }
    }

    /// Encode back to the button byte
    pub fn bits(&self) -> u8 {
        let mut bits = 0;
        if self.park_pressed {
            bits |= Self::PARK_BIT;
        }
        if self.unlock_pressed {
            bits |= Self::UNLOCK_BIT;
        }
        bits
    }
}

/// Non-fatal conditions reported while processing a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnostic {
    /// Lever frame CRC did not match; frame was still applied
    CrcMismatch { expected: u8, received: u8 },
    /// Position byte outside the known set
    UnknownLeverPosition(u8),
    /// Manual shift requested past the first or last gear
    ManualBoundClamp(GearState),
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::CrcMismatch { expected, received } => write!(
                f,
                "CRC mismatch (expected 0x{:02X}, received 0x{:02X})",
                expected, received
            ),
            Diagnostic::UnknownLeverPosition(raw) => {
                write!(f, "unknown lever position 0x{:02X}", raw)
            }
            Diagnostic::ManualBoundClamp(gear) => write!(f, "manual shift clamped at {}", gear),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gear_display_and_parse() {
        assert_eq!(GearState::Park.to_string(), "P");
        assert_eq!(GearState::Manual(3).to_string(), "M3");

        assert_eq!("d".parse::<GearState>().unwrap(), GearState::Drive);
        assert_eq!("Neutral".parse::<GearState>().unwrap(), GearState::Neutral);
        assert_eq!("M8".parse::<GearState>().unwrap(), GearState::Manual(8));
        assert!("M9".parse::<GearState>().is_err());
        assert!("M0".parse::<GearState>().is_err());
        assert!("S".parse::<GearState>().is_err());
    }

    #[test]
    fn test_manual_constructor_bounds() {
        assert!(GearState::manual(0).is_err());
        assert_eq!(GearState::manual(1).unwrap(), GearState::Manual(1));
        assert_eq!(GearState::manual(8).unwrap(), GearState::Manual(8));
        assert!(GearState::manual(9).is_err());
    }

    #[test]
    fn test_lever_position_mapping() {
        assert_eq!(LeverRawPosition::from_raw(0x0E), LeverRawPosition::Center);
        assert_eq!(LeverRawPosition::from_raw(0x1E), LeverRawPosition::Up);
        assert_eq!(LeverRawPosition::from_raw(0x2E), LeverRawPosition::UpPlus);
        assert_eq!(LeverRawPosition::from_raw(0x3E), LeverRawPosition::Down);
        assert_eq!(LeverRawPosition::from_raw(0x7E), LeverRawPosition::Side);
        assert_eq!(LeverRawPosition::from_raw(0x5E), LeverRawPosition::ManualDown);
        assert_eq!(LeverRawPosition::from_raw(0x6E), LeverRawPosition::ManualUp);
        assert_eq!(LeverRawPosition::from_raw(0x4E), LeverRawPosition::Unknown(0x4E));

        for raw in 0..=u8::MAX {
            assert_eq!(LeverRawPosition::from_raw(raw).raw(), raw);
        }
    }

    #[test]
    fn test_lever_position_labels() {
        assert_eq!(LeverRawPosition::Up.to_string(), "Up (R)");
        assert_eq!(LeverRawPosition::Unknown(0xAB).to_string(), "Unknown (0xAB)");
    }

    #[test]
    fn test_button_bits() {
        let both = ButtonState::from_bits(0x03);
        assert!(both.park_pressed);
        assert!(both.unlock_pressed);

        let park_only = ButtonState::from_bits(0xFD);
        assert!(park_only.park_pressed);
        assert!(!park_only.unlock_pressed);
        assert_eq!(park_only.bits(), 0x01);

        assert_eq!(ButtonState::from_bits(0x00), ButtonState::default());
    }

    #[test]
    fn test_gear_serde_as_string() {
        let json = serde_json::to_string(&GearState::Manual(4)).unwrap();
        assert_eq!(json, "\"M4\"");
        let back: GearState = serde_json::from_str("\"R\"").unwrap();
        assert_eq!(back, GearState::Reverse);
    }

    #[test]
    fn test_frame_timestamp() {
        let mut frame = CanFrame::new("can0", 0x197, vec![0; 4]);
        assert!(frame.timestamp().is_none());
        frame.timestamp_us = Some(1_697_040_000_123_456);
        let ts = frame.timestamp().unwrap();
        assert_eq!(ts.timestamp(), 1_697_040_000);
        assert_eq!(ts.timestamp_subsec_micros(), 123_456);
        assert_eq!(frame.dlc(), 4);
    }
}
