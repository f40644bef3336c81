//! Log file formats
//!
//! Readers that turn captured bus traffic into a stream of CanFrame objects,
//! used to replay a session through the engine.

use crate::types::{CanFrame, Result};
use std::path::Path;

pub mod candump;

pub use candump::{format_candump_line, parse_candump_line, CandumpFrameIterator, CandumpParser};

/// Common trait for all log file parsers
///
/// Each parser returns an iterator over CanFrame objects.
pub trait LogFileParser: Iterator<Item = Result<CanFrame>> + Sized {
    /// Parse a log file and return an iterator over CAN frames
    fn parse(path: &Path) -> Result<Self>;
}
