//! CRC-8 variants used by the GWS frames
//!
//! Both variants share polynomial 0x1D, init 0x00, no reflection. They differ
//! only in the final XOR mask:
//! - 0x70 for the LED/status family (0x3FD)
//! - 0x53 for the lever status family (0x197)

const POLY: u8 = 0x1D;

/// Output XOR for the LED/status frames (0x3FD)
pub const STATUS_XOR_OUT: u8 = 0x70;

/// Output XOR for the lever status frames (0x197)
pub const LEVER_XOR_OUT: u8 = 0x53;

const TABLE: [u8; 256] = build_table();

const fn build_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

fn crc8(payload: &[u8], xor_out: u8) -> u8 {
    payload
        .iter()
        .fold(0u8, |crc, &byte| TABLE[(crc ^ byte) as usize])
        ^ xor_out
}

/// CRC for LED/status frames, computed over the payload after the CRC byte
pub fn crc8_status(payload: &[u8]) -> u8 {
    crc8(payload, STATUS_XOR_OUT)
}

/// CRC for lever status frames, computed over `[counter, position, buttons]`
pub fn crc8_lever(payload: &[u8]) -> u8 {
    crc8(payload, LEVER_XOR_OUT)
}
