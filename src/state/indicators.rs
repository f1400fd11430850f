//! Boolean posture and kinematic votes consumed by the fall state machine
//!
//! Three signals feed a transition:
//! - **lying**: a vote over independently evaluated posture conditions
//! - **falling fast**: a sudden normalized drop or a high normalized speed
//! - **immobile**: the frame's motion energy is below the motion threshold
//!
//! The lying vote depends on the [`PerceptionMode`]. With pose input the
//! floor-distance condition takes part when the observation carries one and
//! abstains otherwise. Contour input never has a floor estimate, so the
//! horizontal condition also accepts a wide bounding box.

use serde::{Deserialize, Serialize};

use crate::config::{DetectionConfig, FallingThresholds, LyingThresholds, PerceptionMode};
use crate::observation::{Classification, Observation};
use crate::tracking::Track;

/// Votes required for the lying indicator
const REQUIRED_VOTES: usize = 2;

/// Individual conditions of the lying indicator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LyingVote {
    /// The body axis is closer to horizontal than the angle threshold
    pub horizontal: bool,
    /// The centroid sits low in the frame
    pub low: bool,
    /// The hips are near the floor; `None` when the condition abstains
    pub near_floor: Option<bool>,
    /// A confident fall classification forced the vote
    pub classifier_override: bool,
}

impl LyingVote {
    /// Evaluate the posture conditions for one observation
    pub fn evaluate(
        observation: &Observation,
        mode: PerceptionMode,
        thresholds: &LyingThresholds,
    ) -> Self {
        let low = observation.centroid_height_ratio > thresholds.centroid_height_ratio;
        match mode {
            PerceptionMode::Pose => Self {
                horizontal: observation.posture_angle() > thresholds.angle,
                low,
                near_floor: observation
                    .floor_distance
                    .map(|d| d < thresholds.floor_distance),
                classifier_override: false,
            },
            PerceptionMode::Contour => Self {
                horizontal: observation.orientation > thresholds.angle
                    || observation.aspect_ratio > thresholds.aspect_ratio,
                low,
                near_floor: None,
                classifier_override: false,
            },
        }
    }

    /// Conditions currently holding
    pub fn votes(&self) -> usize {
        usize::from(self.horizontal)
            + usize::from(self.low)
            + usize::from(self.near_floor.unwrap_or(false))
    }

    /// Conditions taking part in the vote
    pub fn participants(&self) -> usize {
        if self.near_floor.is_some() {
            3
        } else {
            2
        }
    }

    /// Whether the lying indicator holds
    pub fn is_lying(&self) -> bool {
        self.classifier_override || self.votes() >= REQUIRED_VOTES
    }
}

/// Whether a track shows a fall onset: a large drop over the drop window or
/// a high normalized vertical speed
pub fn is_falling_fast(track: &Track, thresholds: &FallingThresholds) -> bool {
    track.vertical_drop(thresholds.drop_window) > thresholds.drop
        || track.vertical_speed_normalized() > thresholds.speed
}

/// Whether a classification is confident enough to force the lying vote
pub fn classifier_forces_lying(classification: Option<&Classification>, min_probability: f64) -> bool {
    classification.is_some_and(|c| c.is_fall() && c.probability > min_probability)
}

/// The three inputs of a state transition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indicators {
    /// Lying posture
    pub lying: bool,
    /// Fall onset
    pub falling_fast: bool,
    /// Motion below the motion threshold
    pub immobile: bool,
}

impl Indicators {
    /// Build from explicit values
    pub fn new(lying: bool, falling_fast: bool, immobile: bool) -> Self {
        Self {
            lying,
            falling_fast,
            immobile,
        }
    }

    /// Evaluate every indicator for a track's latest observation
    pub fn evaluate(
        track: &Track,
        motion_energy: f64,
        classification: Option<&Classification>,
        config: &DetectionConfig,
    ) -> Self {
        let mut vote = LyingVote::evaluate(track.last_observation(), config.perception, &config.lying);
        vote.classifier_override =
            classifier_forces_lying(classification, config.classifier_override_probability);

        Self {
            lying: vote.is_lying(),
            falling_fast: is_falling_fast(track, &config.falling),
            immobile: motion_energy < config.motion_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::observation::{BoundingBox, FallClass};
    use crate::tracking::TrackId;

    fn observation(angle: f64, height_ratio: f64) -> Observation {
        Observation::from_bbox(BoundingBox::new(0.0, 0.0, 80.0, 200.0), 480.0, 0.0)
            .with_centroid(nalgebra::Point2::new(40.0, height_ratio * 480.0), height_ratio)
            .with_orientation(angle)
    }

    #[test]
    fn test_pose_vote_two_of_three() {
        let thresholds = LyingThresholds::default();

        // horizontal + near floor, not low
        let obs = observation(70.0, 0.4).with_floor_distance(0.1);
        let vote = LyingVote::evaluate(&obs, PerceptionMode::Pose, &thresholds);
        assert_eq!(vote.participants(), 3);
        assert_eq!(vote.votes(), 2);
        assert!(vote.is_lying());

        // only near floor
        let obs = observation(10.0, 0.4).with_floor_distance(0.1);
        assert!(!LyingVote::evaluate(&obs, PerceptionMode::Pose, &thresholds).is_lying());
    }

    #[test]
    fn test_pose_vote_without_floor_needs_both() {
        let thresholds = LyingThresholds::default();

        let obs = observation(70.0, 0.4);
        let vote = LyingVote::evaluate(&obs, PerceptionMode::Pose, &thresholds);
        assert_eq!(vote.near_floor, None);
        assert_eq!(vote.participants(), 2);
        assert!(!vote.is_lying());

        let obs = observation(70.0, 0.7);
        assert!(LyingVote::evaluate(&obs, PerceptionMode::Pose, &thresholds).is_lying());
    }

    #[test]
    fn test_pose_vote_prefers_torso_angle() {
        let thresholds = LyingThresholds::default();
        let obs = observation(80.0, 0.7).with_torso_angle(20.0);
        assert!(!LyingVote::evaluate(&obs, PerceptionMode::Pose, &thresholds).is_lying());
    }

    #[test]
    fn test_contour_vote_accepts_wide_box_and_ignores_floor() {
        let thresholds = LyingThresholds::default();
        let mut obs = observation(0.0, 0.7).with_floor_distance(0.01);
        obs.aspect_ratio = 1.8;
        let vote = LyingVote::evaluate(&obs, PerceptionMode::Contour, &thresholds);
        assert_eq!(vote.near_floor, None);
        assert!(vote.horizontal);
        assert!(vote.is_lying());

        obs.centroid_height_ratio = 0.3;
        assert!(!LyingVote::evaluate(&obs, PerceptionMode::Contour, &thresholds).is_lying());
    }

    #[test]
    fn test_classifier_override_threshold() {
        let fall = Classification::new(FallClass::Fall, 0.9, 0.9);
        let weak = Classification::new(FallClass::Fall, 0.8, 0.9);
        let not_fall = Classification::new(FallClass::NotFall, 0.95, 0.9);
        assert!(classifier_forces_lying(Some(&fall), 0.8));
        assert!(!classifier_forces_lying(Some(&weak), 0.8));
        assert!(!classifier_forces_lying(Some(&not_fall), 0.8));
        assert!(!classifier_forces_lying(None, 0.8));
    }

    #[test]
    fn test_evaluate_on_track() {
        let config = DetectionConfig::default();
        let track = Track::create(TrackId::new(0), observation(5.0, 0.3), &TrackerConfig::default());

        let upright = Indicators::evaluate(&track, 30.0, None, &config);
        assert_eq!(upright, Indicators::new(false, false, false));

        let fall = Classification::new(FallClass::Fall, 0.95, 0.9);
        let forced = Indicators::evaluate(&track, 1.0, Some(&fall), &config);
        assert_eq!(forced, Indicators::new(true, false, true));
    }
}
