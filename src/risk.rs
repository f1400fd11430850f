//! Risk fusion
//!
//! Combines fall speed, stillness, time on the ground and an optional
//! classifier opinion into a single 0-100 urgency score, then bounds it by
//! the current fall state:
//!
//! ```text
//! score = (speed × w_speed + immobility × w_immobility + lying × w_lying) × 100
//!       + P(fall) × boost                       (fall-labelled classification only)
//! score = min(score, 30)   Standing
//!         max(score, 50)   Falling
//!         max(score, 60)   Fallen
//!         max(score, 80)   Alarm
//! score = clamp(score, 0, 100)
//! ```
//!
//! `speed` and `lying` are in [0, 1]; `immobility` is the immobility score
//! scaled to [0, 100].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::RiskConfig;
use crate::observation::Classification;
use crate::state::{FallState, PersonStateMachine};
use crate::tracking::Track;

/// Upper bound of the score while standing
const STANDING_CAP: f64 = 30.0;
/// Lower bound of the score while falling
const FALLING_FLOOR: f64 = 50.0;
/// Lower bound of the score while fallen
const FALLEN_FLOOR: f64 = 60.0;
/// Lower bound of the score during an alarm
const ALARM_FLOOR: f64 = 80.0;

/// Categorical risk level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Safe,
    Warning,
    Alarm,
    Emergency,
}

impl RiskLevel {
    /// Lower-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Safe => "safe",
            RiskLevel::Warning => "warning",
            RiskLevel::Alarm => "alarm",
            RiskLevel::Emergency => "emergency",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unweighted risk components
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskComponents {
    /// Vertical speed over the saturation speed, in [0, 1]
    pub fall_speed: f64,
    /// Immobility score × 100
    pub immobility: f64,
    /// Time on the ground over the saturation duration, in [0, 1]
    pub lying_duration: f64,
}

/// Every intermediate value of one score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskBreakdown {
    pub components: RiskComponents,
    /// Weighted sum × 100, before the boost
    pub weighted: f64,
    /// Points added by a fall-labelled classification
    pub classifier_boost: f64,
    /// State the bounds were taken from
    pub state: FallState,
    /// Final score in [0, 100]
    pub score: f64,
}

/// Fuses per-track signals into a risk score
#[derive(Debug, Clone, PartialEq)]
pub struct RiskScorer {
    config: RiskConfig,
}

impl RiskScorer {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Components for a track as of its latest observation
    pub fn components(
        &self,
        track: &Track,
        machine: &PersonStateMachine,
        immobility_score: f64,
    ) -> RiskComponents {
        let fall_speed = (track.vertical_speed() / self.config.max_fall_speed).min(1.0);

        let lying_duration = if machine.state().is_down() {
            (machine.time_in_state(track.last_timestamp()) / self.config.max_lying_duration).min(1.0)
        } else {
            0.0
        };

        RiskComponents {
            fall_speed,
            immobility: immobility_score * 100.0,
            lying_duration,
        }
    }

    /// Weight, boost, bound by state and clamp
    pub fn fuse(
        &self,
        components: &RiskComponents,
        state: FallState,
        classification: Option<&Classification>,
    ) -> RiskBreakdown {
        let w = &self.config.weights;
        let weighted = (components.fall_speed * w.fall_speed
            + components.immobility * w.immobility
            + components.lying_duration * w.lying_duration)
            * 100.0;

        let classifier_boost = match classification {
            Some(c) if c.is_fall() => c.probability * self.config.classifier_boost,
            _ => 0.0,
        };

        let score = if self.config.enabled {
            let bounded = match state {
                FallState::Standing => (weighted + classifier_boost).min(STANDING_CAP),
                FallState::Falling => (weighted + classifier_boost).max(FALLING_FLOOR),
                FallState::Fallen => (weighted + classifier_boost).max(FALLEN_FLOOR),
                FallState::Alarm => (weighted + classifier_boost).max(ALARM_FLOOR),
                FallState::Bending => weighted + classifier_boost,
            };
            bounded.clamp(0.0, 100.0)
        } else {
            0.0
        };

        RiskBreakdown {
            components: *components,
            weighted,
            classifier_boost,
            state,
            score,
        }
    }

    /// Full breakdown for a track
    pub fn breakdown(
        &self,
        track: &Track,
        machine: &PersonStateMachine,
        immobility_score: f64,
        classification: Option<&Classification>,
    ) -> RiskBreakdown {
        let components = self.components(track, machine, immobility_score);
        self.fuse(&components, machine.state(), classification)
    }

    /// Risk score in [0, 100]
    pub fn calculate(
        &self,
        track: &Track,
        machine: &PersonStateMachine,
        immobility_score: f64,
        classification: Option<&Classification>,
    ) -> f64 {
        self.breakdown(track, machine, immobility_score, classification)
            .score
    }

    /// Level of a score under the configured thresholds
    pub fn risk_level(&self, score: f64) -> RiskLevel {
        let th = &self.config.thresholds;
        if score < th.warning {
            RiskLevel::Safe
        } else if score < th.alarm {
            RiskLevel::Warning
        } else if score < th.emergency {
            RiskLevel::Alarm
        } else {
            RiskLevel::Emergency
        }
    }

    /// Whether a score reaches the alarm threshold
    pub fn should_trigger_alert(&self, score: f64) -> bool {
        score >= self.config.thresholds.alarm
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }
}
