//! End-of-run summary report (text or JSON)

use crate::runtime::RunSummary;
use anyhow::Result;
use gws_protocol::ControllerSnapshot;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct RunReport<'a> {
    engine: &'a ControllerSnapshot,
    runtime: &'a RunSummary,
}

/// Write the summary for a finished run
pub fn write_report<W: Write>(
    out: &mut W,
    snapshot: &ControllerSnapshot,
    summary: &RunSummary,
    json: bool,
) -> Result<()> {
    if json {
        let report = RunReport {
            engine: snapshot,
            runtime: summary,
        };
        serde_json::to_writer_pretty(&mut *out, &report)?;
        writeln!(out)?;
        return Ok(());
    }

    let stats = &snapshot.stats;
    writeln!(out, "═══════════════════════════════════════════════")?;
    writeln!(out, "  GWS Shifter - Run Summary")?;
    writeln!(out, "═══════════════════════════════════════════════")?;
    writeln!(out, "  Final gear:      {}", snapshot.gear)?;
    writeln!(out, "  Lever position:  {}", snapshot.lever)?;
    writeln!(
        out,
        "  Buttons:         park={} unlock={}",
        snapshot.buttons.park_pressed, snapshot.buttons.unlock_pressed
    )?;
    match snapshot.last_update {
        Some(at) => writeln!(out, "  Last lever frame: {}", at.format("%Y-%m-%d %H:%M:%S%.3f UTC"))?,
        None => writeln!(out, "  Last lever frame: never")?,
    }

    writeln!(out, "\nInbound:")?;
    writeln!(out, "  Frames:          {}", stats.frames_total)?;
    writeln!(out, "  Lever frames:    {}", stats.lever_frames)?;
    writeln!(out, "  Heartbeats:      {}", stats.heartbeats)?;
    writeln!(out, "  Ignored:         {}", stats.ignored_frames)?;
    writeln!(out, "  Short frames:    {}", stats.short_frames)?;
    writeln!(out, "  CRC mismatches:  {}", stats.crc_mismatches)?;
    writeln!(out, "  Unknown lever:   {}", stats.unknown_positions)?;
    writeln!(out, "  Receive errors:  {}", summary.receive_errors)?;
    writeln!(out, "  Dropped:         {}", summary.frames_dropped)?;
    writeln!(out, "  Idle timeouts:   {}", summary.receive_timeouts)?;

    writeln!(out, "\nShifts:")?;
    writeln!(out, "  Transitions:     {}", stats.transitions)?;
    writeln!(out, "  Clamped:         {}", stats.clamped_shifts)?;

    writeln!(out, "\nOutbound:")?;
    writeln!(out, "  LED frames:      {}", stats.led_frames)?;
    writeln!(out, "  Frames sent:     {}", summary.frames_sent)?;
    writeln!(out, "  Elapsed:         {} ms", summary.elapsed_ms)?;
    Ok(())
}
