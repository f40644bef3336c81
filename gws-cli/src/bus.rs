//! Bus adapters
//!
//! The engine never touches hardware. Inbound frames come from a
//! [`BusAdapter`] and outbound frames go to a [`FrameSink`]; this module
//! provides the candump-based pair used for replay and capture.

use anyhow::{Context, Result};
use gws_protocol::formats::{format_candump_line, CandumpFrameIterator, LogFileParser};
use gws_protocol::{CanFrame, GwsError};
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

/// Frames buffered between the reader thread and the receiver
const READ_AHEAD: usize = 256;

/// Result of one receive call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Frame(CanFrame),
    /// Nothing arrived within the timeout
    Timeout,
    /// The source is exhausted
    Closed,
}

/// Source of inbound CAN frames
pub trait BusAdapter: Send {
    /// Block for at most `timeout` waiting for the next frame
    fn recv(&mut self, timeout: Duration) -> Result<Received>;
}

/// Destination for outbound CAN frames
pub trait FrameSink: Send {
    fn send(&mut self, can_id: u32, data: &[u8]) -> Result<()>;
}

/// Replays candump frames as if they came from a live bus
///
/// A reader thread pulls lines from the source and hands them over a bounded
/// channel, so `recv` never blocks past its timeout even on a quiet stdin.
pub struct CandumpReplay {
    frames: Receiver<gws_protocol::Result<CanFrame>>,
    realtime: bool,
    /// Frame read early because it was not yet due
    pending: Option<CanFrame>,
    /// Wall-clock anchor for the first stamped frame
    origin: Option<(Instant, u64)>,
    closed: bool,
}

impl CandumpReplay {
    /// Replay a candump log file
    pub fn open(path: &Path, realtime: bool) -> Result<Self> {
        let frames = <CandumpFrameIterator<BufReader<File>> as LogFileParser>::parse(path)
            .with_context(|| format!("Failed to open input: {:?}", path))?;
        Self::from_frames(frames, realtime)
    }

    /// Replay candump text arriving on stdin, e.g. piped from `candump -L`
    pub fn stdin(realtime: bool) -> Result<Self> {
        Self::from_frames(CandumpFrameIterator::new(BufReader::new(io::stdin())), realtime)
    }

    /// Replay any frame source on a dedicated reader thread
    pub fn from_frames<I>(frames: I, realtime: bool) -> Result<Self>
    where
        I: Iterator<Item = gws_protocol::Result<CanFrame>> + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(READ_AHEAD);
        thread::Builder::new()
            .name("gws-reader".to_string())
            .spawn(move || {
                for item in frames {
                    // Anything but a bad line means the source is broken
                    let fatal = matches!(&item, Err(e) if !matches!(e, GwsError::LogParseError { .. }));
                    if tx.send(item).is_err() || fatal {
                        break;
                    }
                }
            })
            .context("Failed to spawn reader thread")?;

        Ok(Self {
            frames: rx,
            realtime,
            pending: None,
            origin: None,
            closed: false,
        })
    }

    /// How long until `frame` is due, relative to the first stamped frame
    fn wait_for(&mut self, frame: &CanFrame) -> Duration {
        let Some(stamp) = frame.timestamp_us else {
            return Duration::ZERO;
        };
        let (anchor, first) = *self.origin.get_or_insert((Instant::now(), stamp));
        let due = anchor + Duration::from_micros(stamp.saturating_sub(first));
        due.saturating_duration_since(Instant::now())
    }
}

impl BusAdapter for CandumpReplay {
    fn recv(&mut self, timeout: Duration) -> Result<Received> {
        if self.closed {
            return Ok(Received::Closed);
        }

        let frame = match self.pending.take() {
            Some(frame) => frame,
            None => match self.frames.recv_timeout(timeout) {
                Ok(Ok(frame)) => frame,
                Ok(Err(e @ GwsError::LogParseError { .. })) => {
                    return Err(e).context("Skipping malformed candump line");
                }
                Ok(Err(e)) => {
                    self.closed = true;
                    return Err(e).context("Failed to read candump input");
                }
                Err(RecvTimeoutError::Timeout) => return Ok(Received::Timeout),
                Err(RecvTimeoutError::Disconnected) => {
                    self.closed = true;
                    return Ok(Received::Closed);
                }
            },
        };

        if self.realtime {
            let wait = self.wait_for(&frame);
            if wait > timeout {
                thread::sleep(timeout);
                self.pending = Some(frame);
                return Ok(Received::Timeout);
            }
            thread::sleep(wait);
        }

        Ok(Received::Frame(frame))
    }
}

/// Writes outbound frames as `candump -L` lines stamped with wall-clock time
pub struct CandumpWriter<W: Write> {
    writer: W,
    channel: String,
}

impl<W: Write> CandumpWriter<W> {
    pub fn new(writer: W, channel: impl Into<String>) -> Self {
        Self {
            writer,
            channel: channel.into(),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> FrameSink for CandumpWriter<W> {
    fn send(&mut self, can_id: u32, data: &[u8]) -> Result<()> {
        let mut frame = CanFrame::new(self.channel.as_str(), can_id, data.to_vec());
        frame.timestamp_us = u64::try_from(chrono::Utc::now().timestamp_micros()).ok();

        writeln!(self.writer, "{}", format_candump_line(&frame))
            .and_then(|_| self.writer.flush())
            .with_context(|| format!("Failed to write frame 0x{:03X}", can_id))
    }
}
