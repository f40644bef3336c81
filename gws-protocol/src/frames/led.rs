//! LED/status command frame (0x3FD) and backlight frame (0x202)

use crate::crc::crc8_status;
use crate::frames::{BACKLIGHT_ID, LED_STATUS_ID};
use crate::types::GearState;

/// Payload length of an LED/status frame, CRC included
pub const LED_FRAME_LEN: usize = 5;

/// Blink modifier for the LED code
pub const LED_FLASH_BIT: u8 = 0x08;

const COUNTER_MIN: u8 = 0x01;
const COUNTER_MAX: u8 = 0x0E;

/// Rolling message counter carried in every LED frame (0x01..=0x0E)
///
/// Holds the value of the last frame sent; a fresh counter sits at 0x0E so
/// the first frame goes out with 0x01.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GwsCounter(u8);

impl GwsCounter {
    pub fn new() -> Self {
        Self(COUNTER_MAX)
    }

    /// Value carried by the most recent frame
    pub fn value(&self) -> u8 {
        self.0
    }

    /// Step to the next value, wrapping 0x0E -> 0x01, and return it
    pub fn advance(&mut self) -> u8 {
        self.0 = if self.0 >= COUNTER_MAX {
            COUNTER_MIN
        } else {
            self.0 + 1
        };
        self.0
    }
}

impl Default for GwsCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// LED code shown by the selector for a gear
///
/// All manual levels share one code; the cluster cannot show the level here.
pub fn led_code(gear: GearState) -> u8 {
    match gear {
        GearState::Park => 0x20,
        GearState::Reverse => 0x40,
        GearState::Neutral => 0x60,
        GearState::Drive => 0x80,
        GearState::Manual(_) => 0x81,
    }
}

/// Encoded LED/status frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedFrame {
    pub crc: u8,
    pub counter: u8,
    pub led_code: u8,
}

impl LedFrame {
    /// Payload without the CRC byte: `[counter, led_code, 0x00, 0x00]`
    pub fn payload(&self) -> [u8; LED_FRAME_LEN - 1] {
        [self.counter, self.led_code, 0x00, 0x00]
    }

    /// Wire bytes: `[crc, counter, led_code, 0x00, 0x00]`
    pub fn to_bytes(&self) -> [u8; LED_FRAME_LEN] {
        let [counter, code, a, b] = self.payload();
        [self.crc, counter, code, a, b]
    }

    /// `(arbitration id, data)` pair for a bus adapter
    pub fn to_can(&self) -> (u32, Vec<u8>) {
        (LED_STATUS_ID, self.to_bytes().to_vec())
    }
}

/// Renders gear state into LED frames; sole owner of the rolling counter
#[derive(Debug, Clone, Default)]
pub struct LedEncoder {
    counter: GwsCounter,
    flash: bool,
}

impl LedEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encoder that sets the blink bit on every frame
    pub fn with_flash(flash: bool) -> Self {
        Self {
            counter: GwsCounter::new(),
            flash,
        }
    }

    pub fn counter(&self) -> GwsCounter {
        self.counter
    }

    /// Encode the next frame for `gear`, advancing the counter
    pub fn encode(&mut self, gear: GearState) -> LedFrame {
        let mut code = led_code(gear);
        if self.flash {
            code |= LED_FLASH_BIT;
        }
        let counter = self.counter.advance();
        let mut frame = LedFrame {
            crc: 0,
            counter,
            led_code: code,
        };
        frame.crc = crc8_status(&frame.payload());
        frame
    }
}

/// Backlight brightness command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacklightFrame {
    pub brightness: u8,
}

impl BacklightFrame {
    pub const FULL: BacklightFrame = BacklightFrame { brightness: 0xFF };

    pub fn to_bytes(&self) -> [u8; 2] {
        [self.brightness, 0x00]
    }

    pub fn to_can(&self) -> (u32, Vec<u8>) {
        (BACKLIGHT_ID, self.to_bytes().to_vec())
    }
}
