//! Fall state machine
//!
//! Transition logic is the pure function [`next_state`]; the
//! [`PersonStateMachine`] wrapper only keeps the bookkeeping around it (state
//! entry time, bounded transition history and the one-shot alarm flag).
//!
//! | From | Condition | To |
//! |---|---|---|
//! | Standing | falling fast | Falling |
//! | Falling | lying, time in state ≥ fall duration | Fallen |
//! | Falling | not lying | Standing |
//! | Fallen | immobile, time in state ≥ immobility duration | Alarm |
//! | Fallen | not lying | Standing |
//! | Alarm | not lying | Standing |
//!
//! `Bending` is reserved: nothing transitions into or out of it.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::indicators::Indicators;
use crate::config::DetectionConfig;
use crate::tracking::TrackId;

/// Transition history entries kept per machine
pub const HISTORY_CAPACITY: usize = 100;

/// Fall state of one person
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallState {
    /// Upright or moving normally
    #[default]
    Standing,
    /// Reserved
    Bending,
    /// Fall onset detected
    Falling,
    /// On the ground
    Fallen,
    /// On the ground and still for too long
    Alarm,
}

impl FallState {
    /// Lower-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            FallState::Standing => "standing",
            FallState::Bending => "bending",
            FallState::Falling => "falling",
            FallState::Fallen => "fallen",
            FallState::Alarm => "alarm",
        }
    }

    /// Whether the person is on the ground (Fallen or Alarm)
    pub fn is_down(&self) -> bool {
        matches!(self, FallState::Fallen | FallState::Alarm)
    }
}

impl fmt::Display for FallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dwell times gating the timed transitions, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DwellThresholds {
    /// Time lying in Falling before Fallen
    pub fall_duration: f64,
    /// Time immobile in Fallen before Alarm
    pub immobility: f64,
}

impl From<&DetectionConfig> for DwellThresholds {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            fall_duration: config.fall_duration_threshold,
            immobility: config.immobility_threshold,
        }
    }
}

impl Default for DwellThresholds {
    fn default() -> Self {
        Self::from(&DetectionConfig::default())
    }
}

/// Next state for the given indicators and time spent in `state`
pub fn next_state(
    state: FallState,
    indicators: &Indicators,
    time_in_state: f64,
    dwell: &DwellThresholds,
) -> FallState {
    match state {
        FallState::Standing if indicators.falling_fast => FallState::Falling,
        FallState::Falling if !indicators.lying => FallState::Standing,
        FallState::Falling if time_in_state >= dwell.fall_duration => FallState::Fallen,
        FallState::Fallen if indicators.immobile && time_in_state >= dwell.immobility => {
            FallState::Alarm
        }
        FallState::Fallen if !indicators.lying => FallState::Standing,
        FallState::Alarm if !indicators.lying => FallState::Standing,
        unchanged => unchanged,
    }
}

/// Result of one [`PersonStateMachine::update`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    /// State before the update
    pub previous: FallState,
    /// State after the update
    pub state: FallState,
    /// The alarm flag went from false to true on this update
    pub alarm_raised: bool,
}

impl StepOutcome {
    /// Whether the state changed
    pub fn transitioned(&self) -> bool {
        self.previous != self.state
    }
}

/// Bookkeeping around [`next_state`] for one track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonStateMachine {
    track_id: TrackId,
    state: FallState,
    /// Time the current state was entered
    entered_at: f64,
    /// `(state, entry time)`, oldest first
    history: VecDeque<(FallState, f64)>,
    alarm_triggered: bool,
    alarm_time: Option<f64>,
}

impl PersonStateMachine {
    /// A machine in `Standing`, entered at `now`
    pub fn new(track_id: TrackId, now: f64) -> Self {
        let mut history = VecDeque::with_capacity(HISTORY_CAPACITY);
        history.push_back((FallState::Standing, now));
        Self {
            track_id,
            state: FallState::Standing,
            entered_at: now,
            history,
            alarm_triggered: false,
            alarm_time: None,
        }
    }

    /// Apply one set of indicators observed at `now`
    pub fn update(&mut self, indicators: &Indicators, now: f64, dwell: &DwellThresholds) -> StepOutcome {
        let previous = self.state;
        let next = next_state(previous, indicators, self.time_in_state(now), dwell);

        if next != previous {
            self.transition_to(next, now);
            if previous == FallState::Alarm {
                self.alarm_triggered = false;
                self.alarm_time = None;
            }
        }

        let mut alarm_raised = false;
        if self.state == FallState::Alarm && !self.alarm_triggered {
            self.alarm_triggered = true;
            self.alarm_time = Some(now);
            alarm_raised = true;
        }

        StepOutcome {
            previous,
            state: self.state,
            alarm_raised,
        }
    }

    /// Return to `Standing` and clear the alarm
    pub fn reset(&mut self, now: f64) {
        self.transition_to(FallState::Standing, now);
        self.alarm_triggered = false;
        self.alarm_time = None;
    }

    fn transition_to(&mut self, state: FallState, now: f64) {
        self.state = state;
        self.entered_at = now;
        self.history.push_back((state, now));
        while self.history.len() > HISTORY_CAPACITY {
            self.history.pop_front();
        }
    }

    /// Seconds spent in the current state as of `now`, never negative
    pub fn time_in_state(&self, now: f64) -> f64 {
        (now - self.entered_at).max(0.0)
    }

    /// Owning track
    pub fn track_id(&self) -> TrackId {
        self.track_id
    }

    /// Current state
    pub fn state(&self) -> FallState {
        self.state
    }

    /// Time the current state was entered
    pub fn entered_at(&self) -> f64 {
        self.entered_at
    }

    /// Transition history, oldest first
    pub fn history(&self) -> &VecDeque<(FallState, f64)> {
        &self.history
    }

    /// Whether the alarm has fired for the current Alarm interval
    pub fn alarm_triggered(&self) -> bool {
        self.alarm_triggered
    }

    /// When the alarm fired
    pub fn alarm_time(&self) -> Option<f64> {
        self.alarm_time
    }
}
