//! Two-thread runtime: bus receiver and LED refresher
//!
//! The receiver is the only thread that feeds the controller. The LED thread
//! only pulls frames from it. Both stop on a shared flag, raised by the
//! receiver when the input is exhausted or the frame limit is reached, or
//! from outside (Ctrl-C). The LED thread sends a final Park frame on the way
//! out.

use crate::bus::{BusAdapter, FrameSink, Received};
use anyhow::{anyhow, Context, Result};
use gws_protocol::{CanFrame, GwsController};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Runtime settings derived from the application config
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub receive_timeout: Duration,
    pub refresh_interval: Duration,
    pub max_frames: Option<usize>,
    pub backlight: Option<u8>,
}

/// Counters kept by the runtime threads
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub receive_errors: u64,
    pub receive_timeouts: u64,
    pub frames_sent: u64,
    pub elapsed_ms: u64,
}

/// Maps capture timestamps onto the monotonic clock
///
/// Stamped frames are placed relative to the first stamped frame so a fast
/// replay keeps the original spacing for debounce purposes.
#[derive(Debug, Default)]
struct FrameClock {
    origin: Option<(Instant, u64)>,
}

impl FrameClock {
    fn instant_for(&mut self, frame: &CanFrame) -> Instant {
        match frame.timestamp_us {
            Some(stamp) => {
                let (anchor, first) = *self.origin.get_or_insert((Instant::now(), stamp));
                anchor + Duration::from_micros(stamp.saturating_sub(first))
            }
            None => Instant::now(),
        }
    }
}

/// Run both threads until the input is exhausted or `shutdown` is raised
pub fn run(
    controller: Arc<GwsController>,
    bus: Box<dyn BusAdapter>,
    sink: Box<dyn FrameSink>,
    options: &RuntimeOptions,
    shutdown: Arc<AtomicBool>,
) -> Result<RunSummary> {
    let started = Instant::now();

    let receiver = {
        let controller = Arc::clone(&controller);
        let shutdown = Arc::clone(&shutdown);
        let options = options.clone();
        thread::Builder::new()
            .name("gws-rx".to_string())
            .spawn(move || receive_loop(&controller, bus, &shutdown, &options))
            .context("Failed to spawn receiver thread")?
    };

    let refresher = {
        let shutdown = Arc::clone(&shutdown);
        let options = options.clone();
        thread::Builder::new()
            .name("gws-led".to_string())
            .spawn(move || led_loop(&controller, sink, &shutdown, &options))
            .context("Failed to spawn LED thread")?
    };

    let received = receiver.join().map_err(|_| anyhow!("Receiver thread panicked"));
    // The LED thread must see the flag even if the receiver died
    shutdown.store(true, Ordering::SeqCst);
    let sent = refresher.join().map_err(|_| anyhow!("LED thread panicked"))?;

    let mut summary = received?;
    summary.frames_sent = sent?;
    summary.elapsed_ms = started.elapsed().as_millis() as u64;
    Ok(summary)
}

fn receive_loop(
    controller: &GwsController,
    mut bus: Box<dyn BusAdapter>,
    shutdown: &AtomicBool,
    options: &RuntimeOptions,
) -> RunSummary {
    let mut summary = RunSummary::default();
    let mut clock = FrameClock::default();

    while !shutdown.load(Ordering::SeqCst) {
        match bus.recv(options.receive_timeout) {
            Ok(Received::Frame(frame)) => {
                summary.frames_received += 1;
                let now = clock.instant_for(&frame);
                match controller.on_frame_at(frame.can_id, &frame.data, now) {
                    Ok(outcome) => {
                        for diagnostic in &outcome.diagnostics {
                            log::debug!("0x{:03X}: {}", frame.can_id, diagnostic);
                        }
                    }
                    Err(e) => {
                        summary.frames_dropped += 1;
                        log::debug!("Dropped frame 0x{:03X}: {}", frame.can_id, e);
                    }
                }

                if let Some(max) = options.max_frames {
                    if summary.frames_received >= max as u64 {
                        log::info!("Frame limit of {} reached", max);
                        break;
                    }
                }
            }
            Ok(Received::Timeout) => {
                summary.receive_timeouts += 1;
                log::debug!("No frame within {:?}", options.receive_timeout);
            }
            Ok(Received::Closed) => {
                log::info!("Input exhausted after {} frames", summary.frames_received);
                break;
            }
            Err(e) => {
                summary.receive_errors += 1;
                log::warn!("Receive error: {:#}", e);
            }
        }
    }

    shutdown.store(true, Ordering::SeqCst);
    summary
}

fn led_loop(
    controller: &GwsController,
    mut sink: Box<dyn FrameSink>,
    shutdown: &AtomicBool,
    options: &RuntimeOptions,
) -> Result<u64> {
    let mut sent = 0u64;
    let mut send = |(id, data): (u32, Vec<u8>)| -> Result<()> {
        sink.send(id, &data)?;
        sent += 1;
        Ok(())
    };

    if let Some(brightness) = options.backlight {
        log::debug!("Backlight brightness 0x{:02X}", brightness);
        send(controller.backlight_frame(brightness))?;
    }

    while !shutdown.load(Ordering::SeqCst) {
        if let Err(e) = send(controller.next_led_frame()) {
            shutdown.store(true, Ordering::SeqCst);
            return Err(e);
        }
        thread::sleep(options.refresh_interval);
    }

    log::info!("Shutting down, showing Park");
    send(controller.park_frame())?;
    Ok(sent)
}
