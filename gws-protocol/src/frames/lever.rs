//! Lever status frame (0x197)
//!
//! Layout: `[crc, counter, lever_position, button_bits]`. The CRC covers the
//! three bytes after it.

use crate::crc::crc8_lever;
use crate::frames::LEVER_STATUS_ID;
use crate::types::{ButtonState, GwsError, LeverRawPosition, Result};

/// Payload length of a lever status frame
pub const LEVER_FRAME_LEN: usize = 4;

/// Decoded lever status frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeverFrame {
    /// CRC byte as received
    pub crc: u8,
    /// Rolling counter set by the selector
    pub counter: u8,
    pub position: LeverRawPosition,
    /// Button byte as received (only bits 0 and 1 are defined)
    pub button_bits: u8,
}

impl LeverFrame {
    /// Decode a lever status payload
    ///
    /// Fails only when the payload is shorter than four bytes. A bad CRC is
    /// not an error here; check [`LeverFrame::crc_valid`].
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let &[crc, counter, position, buttons, ..] = payload else {
            return Err(GwsError::FrameTooShort {
                can_id: LEVER_STATUS_ID,
                len: payload.len(),
            });
        };

        Ok(Self {
            crc,
            counter,
            position: LeverRawPosition::from_raw(position),
            button_bits: buttons,
        })
    }

    /// Build a frame with a correct CRC (used by simulators and tests)
    pub fn new(counter: u8, position: LeverRawPosition, buttons: ButtonState) -> Self {
        let mut frame = Self {
            crc: 0,
            counter,
            position,
            button_bits: buttons.bits(),
        };
        frame.crc = frame.expected_crc();
        frame
    }

    pub fn buttons(&self) -> ButtonState {
        ButtonState::from_bits(self.button_bits)
    }

    /// CRC the selector should have sent for this content
    pub fn expected_crc(&self) -> u8 {
        crc8_lever(&[self.counter, self.position.raw(), self.button_bits])
    }

    pub fn crc_valid(&self) -> bool {
        self.crc == self.expected_crc()
    }

    /// Error describing the CRC mismatch, if any
    pub fn verify(&self) -> Result<()> {
        if self.crc_valid() {
            Ok(())
        } else {
            Err(GwsError::CrcMismatch {
                expected: self.expected_crc(),
                received: self.crc,
            })
        }
    }

    /// Wire bytes for this frame
    pub fn to_bytes(&self) -> [u8; LEVER_FRAME_LEN] {
        [
            self.crc,
            self.counter,
            self.position.raw(),
            self.button_bits,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_valid_frame() {
        let frame = LeverFrame::decode(&[0x87, 0x01, 0x1E, 0x00]).unwrap();
        assert_eq!(frame.counter, 0x01);
        assert_eq!(frame.position, LeverRawPosition::Up);
        assert_eq!(frame.buttons(), ButtonState::default());
        assert!(frame.crc_valid());
        assert!(frame.verify().is_ok());
    }

    #[test]
    fn test_decode_too_short() {
        for len in 0..LEVER_FRAME_LEN {
            let payload = vec![0u8; len];
            match LeverFrame::decode(&payload) {
                Err(GwsError::FrameTooShort { can_id, len: got }) => {
                    assert_eq!(can_id, LEVER_STATUS_ID);
                    assert_eq!(got, len);
                }
                other => panic!("expected FrameTooShort, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let frame = LeverFrame::decode(&[0xBF, 0x02, 0x0E, 0x00, 0xAA, 0xBB]).unwrap();
        assert_eq!(frame.position, LeverRawPosition::Center);
        assert!(frame.crc_valid());
    }

    #[test]
    fn test_crc_mismatch_still_decodes() {
        let frame = LeverFrame::decode(&[0x00, 0x01, 0x1E, 0x00]).unwrap();
        assert_eq!(frame.position, LeverRawPosition::Up);
        assert!(!frame.crc_valid());
        match frame.verify() {
            Err(GwsError::CrcMismatch { expected, received }) => {
                assert_eq!(expected, 0x87);
                assert_eq!(received, 0x00);
            }
            other => panic!("expected CrcMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_buttons_and_unknown_position() {
        let frame = LeverFrame::decode(&[0x00, 0x05, 0x4E, 0x03]).unwrap();
        assert_eq!(frame.position, LeverRawPosition::Unknown(0x4E));
        assert!(frame.buttons().park_pressed);
        assert!(frame.buttons().unlock_pressed);
    }

    #[test]
    fn test_crc_covers_reserved_button_bits() {
        // Upper button bits are not decoded but are still part of the CRC input
        let crc = crc8_lever(&[0x03, 0x0E, 0xF0]);
        let frame = LeverFrame::decode(&[crc, 0x03, 0x0E, 0xF0]).unwrap();
        assert!(frame.crc_valid());
        assert_eq!(frame.buttons(), ButtonState::default());
    }

    #[test]
    fn test_new_stamps_crc() {
        let frame = LeverFrame::new(0x02, LeverRawPosition::Center, ButtonState::default());
        assert_eq!(frame.to_bytes(), [0xBF, 0x02, 0x0E, 0x00]);
    }
}
