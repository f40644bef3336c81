//! candump text log parser
//!
//! Reads the text format written by `candump -L` (SocketCAN can-utils):
//!
//! ```text
//! (1697040000.123456) can0 197#87011E00
//! ```
//!
//! The bare `can0 197#87011E00` form (no timestamp) is accepted as well.
//! Blank lines and lines starting with `#` are skipped.

use crate::formats::LogFileParser;
use crate::types::{CanFrame, GwsError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// candump log parser
pub struct CandumpParser;

impl CandumpParser {
    /// Open a candump log file and return an iterator over its frames
    pub fn parse(path: &Path) -> Result<CandumpFrameIterator<BufReader<File>>> {
        log::info!("Parsing candump log: {:?}", path);

        let file = File::open(path).map_err(|e| GwsError::LogParseError {
            line: 0,
            message: format!("Failed to open {:?}: {}", path, e),
        })?;

        Ok(CandumpFrameIterator::new(BufReader::new(file)))
    }
}

/// Iterator over CAN frames from any buffered candump source
pub struct CandumpFrameIterator<R: BufRead> {
    reader: R,
    line_number: usize,
    buf: String,
}

impl<R: BufRead> CandumpFrameIterator<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
            buf: String::new(),
        }
    }
}

impl<R: BufRead> Iterator for CandumpFrameIterator<R> {
    type Item = Result<CanFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(GwsError::IoError(e))),
            }
            self.line_number += 1;

            let line = self.buf.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            return Some(parse_candump_line(line).map_err(|message| GwsError::LogParseError {
                line: self.line_number,
                message,
            }));
        }
    }
}

impl LogFileParser for CandumpFrameIterator<BufReader<File>> {
    fn parse(path: &Path) -> Result<Self> {
        CandumpParser::parse(path)
    }
}

/// Parse one candump line (without comment/blank handling)
pub fn parse_candump_line(line: &str) -> std::result::Result<CanFrame, String> {
    let mut fields = line.split_whitespace();
    let mut field = fields.next().ok_or("empty line")?;

    let timestamp_us = if field.starts_with('(') {
        let stamp = field
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(|| format!("malformed timestamp '{}'", field))?;
        let us = parse_timestamp(stamp)?;
        field = fields.next().ok_or("missing interface")?;
        Some(us)
    } else {
        None
    };

    let channel = field.to_string();
    let body = fields.next().ok_or("missing frame")?;

    let (id_hex, data_hex) = body
        .split_once('#')
        .ok_or_else(|| format!("missing '#' in '{}'", body))?;

    let can_id = u32::from_str_radix(id_hex, 16)
        .map_err(|e| format!("bad CAN ID '{}': {}", id_hex, e))?;

    let data = parse_hex_bytes(data_hex)?;
    if data.len() > 8 {
        return Err(format!("{} data bytes exceed classic CAN", data.len()));
    }

    Ok(CanFrame {
        timestamp_us,
        channel,
        can_id,
        data,
    })
}

/// Format a frame the way `candump -L` does
pub fn format_candump_line(frame: &CanFrame) -> String {
    let data: String = frame.data.iter().map(|b| format!("{:02X}", b)).collect();
    match frame.timestamp_us {
        Some(us) => format!(
            "({}.{:06}) {} {:03X}#{}",
            us / 1_000_000,
            us % 1_000_000,
            frame.channel,
            frame.can_id,
            data
        ),
        None => format!("{} {:03X}#{}", frame.channel, frame.can_id, data),
    }
}

fn parse_timestamp(stamp: &str) -> std::result::Result<u64, String> {
    let (secs, frac) = stamp.split_once('.').unwrap_or((stamp, "0"));
    let secs: u64 = secs
        .parse()
        .map_err(|e| format!("bad timestamp '{}': {}", stamp, e))?;
    if frac.is_empty() || frac.len() > 6 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("bad timestamp fraction '{}'", stamp));
    }
    // Right-pad to microseconds
    let micros: u64 = format!("{:0<6}", frac)
        .parse()
        .map_err(|e| format!("bad timestamp '{}': {}", stamp, e))?;
    secs.checked_mul(1_000_000)
        .and_then(|us| us.checked_add(micros))
        .ok_or_else(|| format!("timestamp out of range '{}'", stamp))
}

fn parse_hex_bytes(hex: &str) -> std::result::Result<Vec<u8>, String> {
    // Remote frames ("R") carry no data
    if hex.starts_with('R') {
        return Ok(Vec::new());
    }
    if hex.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in '{}'", hex));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("bad hex data '{}'", hex))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_timestamped_line() {
        let frame = parse_candump_line("(1697040000.123456) can0 197#87011E00").unwrap();
        assert_eq!(frame.timestamp_us, Some(1_697_040_000_123_456));
        assert_eq!(frame.channel, "can0");
        assert_eq!(frame.can_id, 0x197);
        assert_eq!(frame.data, vec![0x87, 0x01, 0x1E, 0x00]);
    }

    #[test]
    fn test_parse_bare_line() {
        let frame = parse_candump_line("vcan0 55E#").unwrap();
        assert_eq!(frame.timestamp_us, None);
        assert_eq!(frame.channel, "vcan0");
        assert_eq!(frame.can_id, 0x55E);
        assert!(frame.data.is_empty());
    }

    #[test]
    fn test_short_fraction_is_padded() {
        let frame = parse_candump_line("(12.5) can0 202#FF00").unwrap();
        assert_eq!(frame.timestamp_us, Some(12_500_000));
    }

    #[test]
    fn test_bad_lines() {
        assert!(parse_candump_line("can0").is_err());
        assert!(parse_candump_line("can0 197").is_err());
        assert!(parse_candump_line("can0 XYZ#00").is_err());
        assert!(parse_candump_line("can0 197#0").is_err());
        assert!(parse_candump_line("can0 197#GG").is_err());
        assert!(parse_candump_line("(abc) can0 197#00").is_err());
        assert!(parse_candump_line("can0 197#000102030405060708").is_err());
        assert!(parse_candump_line("(99999999999999999.000000) can0 197#BF020E00").is_err());
    }

    #[test]
    fn test_iterator_skips_comments_and_reports_line_numbers() {
        let log = "# captured on the bench\n\
                   \n\
                   (1.000000) can0 197#87011E00\n\
                   can0 197#nothex\n";
        let mut frames = CandumpFrameIterator::new(Cursor::new(log));

        let first = frames.next().unwrap().unwrap();
        assert_eq!(first.can_id, 0x197);

        match frames.next() {
            Some(Err(GwsError::LogParseError { line, .. })) => assert_eq!(line, 4),
            other => panic!("expected parse error, got {:?}", other),
        }
        assert!(frames.next().is_none());
    }

    #[test]
    fn test_format_line() {
        let mut frame = CanFrame::new("can0", 0x3FD, vec![0x8D, 0x01, 0x40, 0x00, 0x00]);
        assert_eq!(format_candump_line(&frame), "can0 3FD#8D01400000");

        frame.timestamp_us = Some(1_000_042);
        let line = format_candump_line(&frame);
        assert_eq!(line, "(1.000042) can0 3FD#8D01400000");
        assert_eq!(parse_candump_line(&line).unwrap(), frame);
    }

    #[test]
    fn test_trait_parse_reads_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "(5.000000) can0 55E#").unwrap();
        writeln!(file, "(5.100000) can0 197#BF020E00").unwrap();

        let frames: Vec<CanFrame> =
            <CandumpFrameIterator<BufReader<File>> as LogFileParser>::parse(file.path())
                .unwrap()
                .collect::<Result<_>>()
                .unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].can_id, 0x197);
        assert_eq!(frames[1].timestamp_us, Some(5_100_000));
    }

    #[test]
    fn test_parse_missing_file() {
        let result = CandumpParser::parse(Path::new("/nonexistent/gws.log"));
        assert!(matches!(result, Err(GwsError::LogParseError { line: 0, .. })));
    }
}
