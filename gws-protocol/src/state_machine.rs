//! Toggle state machine
//!
//! The GWS lever is spring-loaded: it always falls back to one of two rest
//! points (the center 0x0E, or the side gate 0x7E once in manual). A gear
//! change is therefore inferred from an excursion-and-return cycle, keyed by
//! the position the lever held just before it came back to rest.
//!
//! Processing order per lever frame:
//! 1. Unlock button at center while parked -> Neutral
//! 2. Park button at center -> Park
//! 3. Debounce gate (toggle timeout since the last accepted toggle)
//! 4. Return to center -> primary transition table
//! 5. Return to the side gate -> manual transition table
//!
//! Buttons bypass the debounce gate. Time is passed in by the caller as a
//! monotonic [`Instant`].

use crate::config::ShifterConfig;
use crate::frames::LeverFrame;
use crate::types::{ButtonState, GearState, LeverRawPosition, MAX_MANUAL_GEAR, MIN_MANUAL_GEAR};
use std::fmt;
use std::time::{Duration, Instant};

/// Lever motion bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleTracker {
    pub current_position: LeverRawPosition,
    pub previous_position: LeverRawPosition,
    /// Armed (false) while the lever is away from the center
    pub returned_to_center: bool,
    /// Armed (false) while the lever is away from the side gate
    pub returned_to_side_center: bool,
    /// When the last center/side edge was consumed
    pub last_toggle: Option<Instant>,
}

impl Default for ToggleTracker {
    fn default() -> Self {
        Self {
            current_position: LeverRawPosition::Center,
            previous_position: LeverRawPosition::Center,
            returned_to_center: true,
            returned_to_side_center: true,
            last_toggle: None,
        }
    }
}

impl ToggleTracker {
    fn record(&mut self, position: LeverRawPosition) {
        self.previous_position = self.current_position;
        self.current_position = position;
    }

    fn debounced(&self, now: Instant, timeout: Duration) -> bool {
        match self.last_toggle {
            Some(last) => now.saturating_duration_since(last) < timeout,
            None => false,
        }
    }
}

/// Why a gear change happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftCause {
    UnlockButton,
    ParkButton,
    /// Lever returned to center from the given position
    Toggle(LeverRawPosition),
    /// Lever returned to the side gate from the given position
    ManualToggle(LeverRawPosition),
}

impl fmt::Display for ShiftCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShiftCause::UnlockButton => write!(f, "unlock button"),
            ShiftCause::ParkButton => write!(f, "park button"),
            ShiftCause::Toggle(from) => write!(f, "toggle from {}", from),
            ShiftCause::ManualToggle(from) => write!(f, "manual toggle from {}", from),
        }
    }
}

/// A gear change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: GearState,
    pub to: GearState,
    pub cause: ShiftCause,
}

/// Result of feeding one lever frame to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOutcome {
    /// The gear changed
    Shifted(Transition),
    /// Manual shift past the first/last gear; gear unchanged
    Clamped(GearState),
    /// Frame arrived inside the toggle timeout; no toggle evaluated
    Debounced,
    /// Nothing to do
    Idle,
}

impl ShiftOutcome {
    pub fn transition(&self) -> Option<Transition> {
        match self {
            ShiftOutcome::Shifted(t) => Some(*t),
            _ => None,
        }
    }
}

/// Result of a table lookup
enum Resolution {
    Gear(GearState),
    Clamped,
    NoMatch,
}

/// Debounced lever toggle state machine
#[derive(Debug, Clone)]
pub struct GearShifter {
    gear: GearState,
    tracker: ToggleTracker,
    buttons: ButtonState,
    toggle_timeout: Duration,
}

impl GearShifter {
    pub fn new(config: &ShifterConfig) -> Self {
        Self {
            gear: config.initial_gear,
            tracker: ToggleTracker::default(),
            buttons: ButtonState::default(),
            toggle_timeout: config.toggle_timeout(),
        }
    }

    pub fn gear(&self) -> GearState {
        self.gear
    }

    pub fn tracker(&self) -> &ToggleTracker {
        &self.tracker
    }

    /// Buttons seen in the last frame
    pub fn buttons(&self) -> ButtonState {
        self.buttons
    }

    /// Apply one decoded lever frame at time `now`
    pub fn apply(&mut self, frame: &LeverFrame, now: Instant) -> ShiftOutcome {
        self.step(frame.position, frame.buttons(), now)
    }

    /// Apply a lever position and button state at time `now`
    pub fn step(
        &mut self,
        position: LeverRawPosition,
        buttons: ButtonState,
        now: Instant,
    ) -> ShiftOutcome {
        self.tracker.record(position);
        self.buttons = buttons;

        let at_center = position == LeverRawPosition::Center;

        if buttons.unlock_pressed && at_center && self.gear == GearState::Park {
            return self.shift_to(GearState::Neutral, ShiftCause::UnlockButton);
        }

        if buttons.park_pressed && at_center {
            return self.shift_to(GearState::Park, ShiftCause::ParkButton);
        }

        if self.tracker.debounced(now, self.toggle_timeout) {
            log::trace!("Lever frame inside toggle timeout: {}", position);
            return ShiftOutcome::Debounced;
        }

        let left_from = self.tracker.previous_position;
        let mut outcome = ShiftOutcome::Idle;

        if at_center {
            if !self.tracker.returned_to_center {
                self.tracker.returned_to_center = true;
                self.tracker.last_toggle = Some(now);
                outcome = self.resolve(
                    Self::primary_transition(left_from, self.gear),
                    ShiftCause::Toggle(left_from),
                );
            }
        } else {
            self.tracker.returned_to_center = false;
        }

        if position == LeverRawPosition::Side {
            if !self.tracker.returned_to_side_center {
                self.tracker.returned_to_side_center = true;
                self.tracker.last_toggle = Some(now);
                outcome = self.resolve(
                    Self::manual_transition(left_from, self.gear),
                    ShiftCause::ManualToggle(left_from),
                );
            }
        } else {
            self.tracker.returned_to_side_center = false;
        }

        outcome
    }

    /// Primary table, keyed by the position the lever left to reach center
    fn primary_transition(left_from: LeverRawPosition, gear: GearState) -> Resolution {
        use GearState::*;
        use LeverRawPosition as L;

        match (left_from, gear) {
            (L::Up, Neutral) => Resolution::Gear(Reverse),
            (L::Up, _) => Resolution::Gear(Neutral),
            (L::UpPlus, _) => Resolution::Gear(Park),
            (L::Down, Reverse) => Resolution::Gear(Neutral),
            (L::Down, _) => Resolution::Gear(Drive),
            (L::Side, _) => Resolution::Gear(Self::side_toggle(gear)),
            _ => Resolution::NoMatch,
        }
    }

    /// Manual table, keyed by the position the lever left to reach the side gate
    fn manual_transition(left_from: LeverRawPosition, gear: GearState) -> Resolution {
        match (left_from, gear) {
            (LeverRawPosition::ManualUp, GearState::Manual(level)) => {
                if level < MAX_MANUAL_GEAR {
                    Resolution::Gear(GearState::Manual(level + 1))
                } else {
                    Resolution::Clamped
                }
            }
            (LeverRawPosition::ManualDown, GearState::Manual(level)) => {
                if level > MIN_MANUAL_GEAR {
                    Resolution::Gear(GearState::Manual(level - 1))
                } else {
                    Resolution::Clamped
                }
            }
            (LeverRawPosition::Center, _) => Resolution::Gear(Self::side_toggle(gear)),
            _ => Resolution::NoMatch,
        }
    }

    /// Drive <-> Manual(1); anything else goes to Drive
    fn side_toggle(gear: GearState) -> GearState {
        match gear {
            GearState::Drive => GearState::Manual(MIN_MANUAL_GEAR),
            _ => GearState::Drive,
        }
    }

    fn resolve(&mut self, resolution: Resolution, cause: ShiftCause) -> ShiftOutcome {
        match resolution {
            Resolution::Gear(gear) => self.shift_to(gear, cause),
            Resolution::Clamped => {
                log::info!("Manual shift clamped at {} ({})", self.gear, cause);
                ShiftOutcome::Clamped(self.gear)
            }
            Resolution::NoMatch => ShiftOutcome::Idle,
        }
    }

    fn shift_to(&mut self, gear: GearState, cause: ShiftCause) -> ShiftOutcome {
        if gear == self.gear {
            return ShiftOutcome::Idle;
        }
        let transition = Transition {
            from: self.gear,
            to: gear,
            cause,
        };
        self.gear = gear;
        log::info!("Gear {} -> {} ({})", transition.from, transition.to, cause);
        ShiftOutcome::Shifted(transition)
    }
}
