//! GWS frame layouts
//!
//! Typed views of the frames exchanged with the gear selector:
//! - 0x197 lever status (inbound)
//! - 0x3FD LED/status command (outbound)
//! - 0x202 backlight (outbound)

pub mod led;
pub mod lever;

pub use led::{BacklightFrame, GwsCounter, LedEncoder, LedFrame};
pub use lever::LeverFrame;

/// Lever status frame sent by the selector
pub const LEVER_STATUS_ID: u32 = 0x197;

/// LED/status command sent to the selector
pub const LED_STATUS_ID: u32 = 0x3FD;

/// Selector backlight brightness
pub const BACKLIGHT_ID: u32 = 0x202;

/// Selector heartbeat
pub const HEARTBEAT_ID: u32 = 0x55E;
