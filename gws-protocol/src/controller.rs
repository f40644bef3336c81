//! Main controller API
//!
//! This module provides the primary interface for the library. The
//! GwsController owns every piece of mutable engine state behind a single
//! lock, so a bus receiver thread, an LED refresh thread and any number of
//! telemetry readers can share one instance through an `Arc`.

use crate::config::ShifterConfig;
use crate::frames::{
    BacklightFrame, LedEncoder, LeverFrame, BACKLIGHT_ID, HEARTBEAT_ID, LED_STATUS_ID,
    LEVER_STATUS_ID,
};
use crate::state_machine::{GearShifter, ShiftOutcome, Transition};
use crate::types::{
    ButtonState, Diagnostic, GearState, GwsError, LeverRawPosition, Result, Timestamp,
};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::time::Instant;

/// Traffic counters kept by the controller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    pub frames_total: u64,
    pub lever_frames: u64,
    pub crc_mismatches: u64,
    pub short_frames: u64,
    pub unknown_positions: u64,
    pub heartbeats: u64,
    pub ignored_frames: u64,
    pub transitions: u64,
    pub clamped_shifts: u64,
    pub led_frames: u64,
}

/// What happened to one inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameOutcome {
    /// False when the ID is not one the engine consumes
    pub handled: bool,
    pub shift: ShiftOutcome,
    pub diagnostics: Vec<Diagnostic>,
}

impl FrameOutcome {
    pub fn ignored() -> Self {
        Self {
            handled: false,
            shift: ShiftOutcome::Idle,
            diagnostics: Vec::new(),
        }
    }

    fn handled() -> Self {
        Self {
            handled: true,
            ..Self::ignored()
        }
    }

    pub fn transition(&self) -> Option<Transition> {
        self.shift.transition()
    }
}

/// Consistent view of the controller for dashboards and telemetry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerSnapshot {
    pub gear: GearState,
    pub lever: LeverRawPosition,
    pub buttons: ButtonState,
    pub stats: BusStats,
    /// Wall-clock time of the last lever frame
    pub last_update: Option<Timestamp>,
}

struct ControllerState {
    shifter: GearShifter,
    lever: LeverRawPosition,
    encoder: LedEncoder,
    stats: BusStats,
    last_update: Option<Timestamp>,
}

/// The main controller - entry point for bus adapters and telemetry readers
pub struct GwsController {
    config: ShifterConfig,
    state: Mutex<ControllerState>,
}

impl GwsController {
    /// Create a controller with the given configuration
    pub fn new(config: ShifterConfig) -> Self {
        log::info!(
            "GWS controller starting in {} (toggle timeout {} ms)",
            config.initial_gear,
            config.toggle_timeout_ms
        );
        let state = ControllerState {
            shifter: GearShifter::new(&config),
            lever: LeverRawPosition::Center,
            encoder: LedEncoder::with_flash(config.flash_led),
            stats: BusStats::default(),
            last_update: None,
        };
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    pub fn config(&self) -> &ShifterConfig {
        &self.config
    }

    /// Inbound hook: feed one received frame, timed with the monotonic clock
    pub fn on_frame(&self, can_id: u32, payload: &[u8]) -> Result<FrameOutcome> {
        self.on_frame_at(can_id, payload, Instant::now())
    }

    /// Inbound hook with an explicit monotonic time
    ///
    /// # Returns
    /// * `Ok(FrameOutcome)` - frame consumed or ignored
    /// * `Err(FrameTooShort)` - lever frame with fewer than four bytes, dropped
    /// * `Err(CrcMismatch)` - only when CRC rejection is enabled, dropped
    pub fn on_frame_at(&self, can_id: u32, payload: &[u8], now: Instant) -> Result<FrameOutcome> {
        let mut state = self.state.lock();
        state.stats.frames_total += 1;

        match can_id {
            LEVER_STATUS_ID => self.apply_lever(&mut state, payload, now),
            HEARTBEAT_ID => {
                state.stats.heartbeats += 1;
                log::trace!("Heartbeat received");
                Ok(FrameOutcome::handled())
            }
            // Echoes of our own LED and backlight traffic
            LED_STATUS_ID | BACKLIGHT_ID => Ok(FrameOutcome::ignored()),
            other => {
                state.stats.ignored_frames += 1;
                log::trace!("Ignored frame with CAN ID 0x{:03X}", other);
                Ok(FrameOutcome::ignored())
            }
        }
    }

    fn apply_lever(
        &self,
        state: &mut ControllerState,
        payload: &[u8],
        now: Instant,
    ) -> Result<FrameOutcome> {
        let frame = match LeverFrame::decode(payload) {
            Ok(frame) => frame,
            Err(e) => {
                state.stats.short_frames += 1;
                log::warn!("Dropping lever frame: {}", e);
                return Err(e);
            }
        };
        state.stats.lever_frames += 1;

        let mut outcome = FrameOutcome::handled();

        if let Err(GwsError::CrcMismatch { expected, received }) = frame.verify() {
            state.stats.crc_mismatches += 1;
            if self.config.reject_crc_mismatch {
                log::warn!(
                    "Dropping lever frame with bad CRC (expected 0x{:02X}, received 0x{:02X})",
                    expected,
                    received
                );
                return Err(GwsError::CrcMismatch { expected, received });
            }
            log::warn!(
                "Lever frame CRC mismatch (expected 0x{:02X}, received 0x{:02X}), applying anyway",
                expected,
                received
            );
            outcome
                .diagnostics
                .push(Diagnostic::CrcMismatch { expected, received });
        }

        if let LeverRawPosition::Unknown(raw) = frame.position {
            state.stats.unknown_positions += 1;
            log::warn!("Unknown lever position 0x{:02X}", raw);
            outcome.diagnostics.push(Diagnostic::UnknownLeverPosition(raw));
        }

        state.lever = frame.position;
        state.last_update = Some(Utc::now());

        outcome.shift = state.shifter.apply(&frame, now);
        match outcome.shift {
            ShiftOutcome::Shifted(_) => state.stats.transitions += 1,
            ShiftOutcome::Clamped(gear) => {
                state.stats.clamped_shifts += 1;
                outcome.diagnostics.push(Diagnostic::ManualBoundClamp(gear));
            }
            ShiftOutcome::Debounced | ShiftOutcome::Idle => {}
        }

        Ok(outcome)
    }

    /// Outbound hook: LED frame for the current gear, advancing the counter
    pub fn next_led_frame(&self) -> (u32, Vec<u8>) {
        let mut state = self.state.lock();
        let gear = state.shifter.gear();
        Self::encode_led(&mut state, gear)
    }

    /// LED frame showing Park without touching the gear (sent on shutdown)
    pub fn park_frame(&self) -> (u32, Vec<u8>) {
        let mut state = self.state.lock();
        Self::encode_led(&mut state, GearState::Park)
    }

    fn encode_led(state: &mut ControllerState, gear: GearState) -> (u32, Vec<u8>) {
        state.stats.led_frames += 1;
        let frame = state.encoder.encode(gear);
        log::trace!(
            "LED frame for {}: counter 0x{:02X}, code 0x{:02X}",
            gear,
            frame.counter,
            frame.led_code
        );
        frame.to_can()
    }

    /// Backlight command frame
    pub fn backlight_frame(&self, brightness: u8) -> (u32, Vec<u8>) {
        BacklightFrame { brightness }.to_can()
    }

    /// Read-only snapshot: gear, last lever position, last button state
    pub fn current_state(&self) -> (GearState, LeverRawPosition, ButtonState) {
        let state = self.state.lock();
        (state.shifter.gear(), state.lever, state.shifter.buttons())
    }

    pub fn gear(&self) -> GearState {
        self.state.lock().shifter.gear()
    }

    /// Full snapshot including traffic counters
    pub fn snapshot(&self) -> ControllerSnapshot {
        let state = self.state.lock();
        ControllerSnapshot {
            gear: state.shifter.gear(),
            lever: state.lever,
            buttons: state.shifter.buttons(),
            stats: state.stats.clone(),
            last_update: state.last_update,
        }
    }
}

impl Default for GwsController {
    fn default() -> Self {
        Self::new(ShifterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::crc8_status;
    use std::time::Duration;

    fn lever(counter: u8, position: LeverRawPosition, buttons: u8) -> Vec<u8> {
        LeverFrame::new(counter, position, ButtonState::from_bits(buttons))
            .to_bytes()
            .to_vec()
    }

    #[test]
    fn test_controller_creation() {
        let controller = GwsController::default();
        let (gear, lever, buttons) = controller.current_state();
        assert_eq!(gear, GearState::Park);
        assert_eq!(lever, LeverRawPosition::Center);
        assert_eq!(buttons, ButtonState::default());
        assert_eq!(controller.snapshot().stats, BusStats::default());
    }

    #[test]
    fn test_short_frame_is_dropped() {
        let controller = GwsController::new(ShifterConfig::new().with_initial_gear(GearState::Neutral));
        let result = controller.on_frame(LEVER_STATUS_ID, &[0x00, 0x01, 0x1E]);
        assert!(matches!(result, Err(GwsError::FrameTooShort { len: 3, .. })));

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.stats.short_frames, 1);
        assert_eq!(snapshot.stats.lever_frames, 0);
        assert_eq!(snapshot.gear, GearState::Neutral);
        assert!(snapshot.last_update.is_none());
    }

    #[test]
    fn test_crc_mismatch_fails_open() {
        let controller = GwsController::new(ShifterConfig::new().with_initial_gear(GearState::Neutral));
        let t0 = Instant::now();

        let outcome = controller.on_frame_at(LEVER_STATUS_ID, &[0x00, 0x01, 0x1E, 0x00], t0).unwrap();
        assert_eq!(
            outcome.diagnostics,
            vec![Diagnostic::CrcMismatch { expected: 0x87, received: 0x00 }]
        );

        let outcome = controller
            .on_frame_at(LEVER_STATUS_ID, &[0x00, 0x02, 0x0E, 0x00], t0 + Duration::from_millis(20))
            .unwrap();
        assert_eq!(outcome.transition().map(|t| t.to), Some(GearState::Reverse));
        assert_eq!(controller.snapshot().stats.crc_mismatches, 2);
    }

    #[test]
    fn test_crc_rejection_drops_frame() {
        let config = ShifterConfig::new()
            .with_initial_gear(GearState::Neutral)
            .with_crc_rejection(true);
        let controller = GwsController::new(config);

        let result = controller.on_frame(LEVER_STATUS_ID, &[0x00, 0x01, 0x1E, 0x00]);
        assert!(matches!(result, Err(GwsError::CrcMismatch { .. })));
        let (_, lever, _) = controller.current_state();
        assert_eq!(lever, LeverRawPosition::Center);
    }

    #[test]
    fn test_unknown_position_reported() {
        let controller = GwsController::default();
        let outcome = controller
            .on_frame(LEVER_STATUS_ID, &lever(1, LeverRawPosition::Unknown(0x4E), 0))
            .unwrap();
        assert!(outcome.handled);
        assert_eq!(outcome.diagnostics, vec![Diagnostic::UnknownLeverPosition(0x4E)]);
        assert!(outcome.transition().is_none());
        assert_eq!(controller.current_state().1, LeverRawPosition::Unknown(0x4E));
    }

    #[test]
    fn test_other_ids() {
        let controller = GwsController::default();
        assert!(controller.on_frame(HEARTBEAT_ID, &[]).unwrap().handled);
        assert!(!controller.on_frame(LED_STATUS_ID, &[0; 5]).unwrap().handled);
        assert!(!controller.on_frame(0x123, &[1, 2, 3]).unwrap().handled);

        let stats = controller.snapshot().stats;
        assert_eq!(stats.frames_total, 3);
        assert_eq!(stats.heartbeats, 1);
        assert_eq!(stats.ignored_frames, 1);
    }

    #[test]
    fn test_clamp_reported_as_diagnostic() {
        let controller = GwsController::new(ShifterConfig::new().with_initial_gear(GearState::Manual(8)));
        let t0 = Instant::now();
        controller
            .on_frame_at(LEVER_STATUS_ID, &lever(1, LeverRawPosition::ManualUp, 0), t0)
            .unwrap();
        let outcome = controller
            .on_frame_at(LEVER_STATUS_ID, &lever(2, LeverRawPosition::Side, 0), t0)
            .unwrap();
        assert_eq!(
            outcome.diagnostics,
            vec![Diagnostic::ManualBoundClamp(GearState::Manual(8))]
        );
        assert_eq!(controller.snapshot().stats.clamped_shifts, 1);
    }

    #[test]
    fn test_led_frames_follow_gear() {
        let controller = GwsController::default();
        let (id, data) = controller.next_led_frame();
        assert_eq!(id, LED_STATUS_ID);
        assert_eq!(&data[1..], &[0x01, 0x20, 0x00, 0x00]);
        assert_eq!(data[0], crc8_status(&data[1..]));

        controller
            .on_frame(LEVER_STATUS_ID, &lever(1, LeverRawPosition::Center, 0x02))
            .unwrap();
        let (_, data) = controller.next_led_frame();
        assert_eq!(&data[1..], &[0x02, 0x60, 0x00, 0x00]);
    }

    #[test]
    fn test_park_frame_leaves_gear() {
        let controller = GwsController::new(ShifterConfig::new().with_initial_gear(GearState::Drive));
        let (id, data) = controller.park_frame();
        assert_eq!(id, LED_STATUS_ID);
        assert_eq!(data[2], 0x20);
        assert_eq!(controller.gear(), GearState::Drive);
        assert_eq!(controller.snapshot().stats.led_frames, 1);
    }

    #[test]
    fn test_backlight_frame() {
        let controller = GwsController::default();
        assert_eq!(controller.backlight_frame(0x80), (BACKLIGHT_ID, vec![0x80, 0x00]));
    }
}
