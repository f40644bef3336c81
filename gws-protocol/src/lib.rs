//! GWS Shifter Protocol Library
//!
//! Decodes and re-encodes the CAN protocol of the BMW F-series electronic gear
//! selector ("GWS") and turns the stream of momentary lever positions into a
//! durable gear state (P/R/N/D/M1-M8).
//!
//! # Architecture
//!
//! - CRC-8 codec for the two frame families (lever status, LED/status)
//! - Typed frames: lever status in (0x197), LED command out (0x3FD), backlight (0x202)
//! - Debounced toggle state machine mapping lever excursions to gear changes
//! - LED encoder with the rolling message counter
//! - A thread-safe controller tying it together
//!
//! The library does NOT:
//! - Open CAN interfaces or configure bitrates
//! - Spawn threads or own a refresh loop
//! - Initialise a logger
//!
//! Those belong to the application layer (gws-cli).
//!
//! # Example Usage
//!
//! ```
//! use gws_protocol::{GearState, GwsController, ShifterConfig};
//!
//! let controller = GwsController::new(ShifterConfig::new().with_initial_gear(GearState::Neutral));
//!
//! // Lever pushed up, then released back to center
//! controller.on_frame(0x197, &[0x87, 0x01, 0x1E, 0x00]).unwrap();
//! controller.on_frame(0x197, &[0xBF, 0x02, 0x0E, 0x00]).unwrap();
//! assert_eq!(controller.gear(), GearState::Reverse);
//!
//! // Render the LED frame to put back on the bus
//! let (id, data) = controller.next_led_frame();
//! assert_eq!(id, 0x3FD);
//! assert_eq!(&data[1..], &[0x01, 0x40, 0x00, 0x00]);
//! ```

// Public modules
pub mod config;
pub mod controller;
pub mod crc;
pub mod formats;
pub mod frames;
pub mod state_machine;
pub mod types;

// Re-export main types for convenience
pub use config::ShifterConfig;
pub use controller::{BusStats, ControllerSnapshot, FrameOutcome, GwsController};
pub use crc::{crc8_lever, crc8_status};
pub use frames::{
    BacklightFrame, GwsCounter, LedEncoder, LedFrame, LeverFrame, BACKLIGHT_ID, HEARTBEAT_ID,
    LED_STATUS_ID, LEVER_STATUS_ID,
};
pub use state_machine::{GearShifter, ShiftCause, ShiftOutcome, ToggleTracker, Transition};
pub use types::{
    ButtonState, CanFrame, Diagnostic, GearState, GwsError, LeverRawPosition, Result, Timestamp,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
