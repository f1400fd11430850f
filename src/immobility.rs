//! Per-track motion-energy smoothing
//!
//! Motion energy is the percentage (0-100) of pixels inside a track's
//! bounding box that changed significantly since the previous frame. It is
//! measured by the perception front end; this module only keeps a short
//! per-track history, averages it and thresholds the result.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::config::DetectionConfig;
use crate::errors::ObservationError;
use crate::tracking::TrackId;

/// Upper end of the motion-energy scale (percent of changed pixels)
pub const MAX_MOTION_ENERGY: f64 = 100.0;

/// Check a motion-energy sample from perception and clamp it to
/// `[0, MAX_MOTION_ENERGY]`
pub fn sanitize_motion_energy(motion_energy: f64) -> Result<f64, ObservationError> {
    if motion_energy.is_finite() {
        Ok(motion_energy.clamp(0.0, MAX_MOTION_ENERGY))
    } else {
        Err(ObservationError::NonFinite {
            field: "motion_energy",
        })
    }
}

/// Smoothed stillness estimate for every live track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImmobilityEstimator {
    /// Smoothed motion energy below which a track is immobile
    motion_threshold: f64,
    /// Samples kept per track
    window: usize,
    /// Recent samples, oldest first
    histories: BTreeMap<TrackId, VecDeque<f64>>,
}

impl ImmobilityEstimator {
    /// Create an estimator with the detection thresholds
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            motion_threshold: config.motion_threshold,
            window: config.immobility_window.max(1),
            histories: BTreeMap::new(),
        }
    }

    /// Re-apply saved histories under the current configuration
    pub(crate) fn rebuild(config: &DetectionConfig, saved: Self) -> Self {
        let mut estimator = Self::new(config);
        for (track_id, history) in saved.histories {
            for sample in history {
                estimator.update(track_id, sample);
            }
        }
        estimator
    }

    /// Append a motion-energy sample for `track_id`.
    ///
    /// Non-finite samples are dropped; finite ones are clamped to the
    /// motion-energy scale.
    pub fn update(&mut self, track_id: TrackId, motion_energy: f64) {
        let Ok(motion_energy) = sanitize_motion_energy(motion_energy) else {
            log::warn!("Track {}: dropped non-finite motion energy", track_id);
            return;
        };
        let window = self.window;
        let history = self
            .histories
            .entry(track_id)
            .or_insert_with(|| VecDeque::with_capacity(window));
        history.push_back(motion_energy);
        while history.len() > window {
            history.pop_front();
        }
    }

    /// Mean of the recent samples, 0 when there are none
    pub fn smoothed(&self, track_id: TrackId) -> f64 {
        match self.histories.get(&track_id) {
            Some(history) if !history.is_empty() => {
                history.iter().sum::<f64>() / history.len() as f64
            }
            _ => 0.0,
        }
    }

    /// Whether the smoothed motion energy is below the motion threshold
    pub fn is_immobile(&self, track_id: TrackId) -> bool {
        self.smoothed(track_id) < self.motion_threshold
    }

    /// Stillness in [0, 1]; 1 means no motion at all
    pub fn immobility_score(&self, track_id: TrackId) -> f64 {
        1.0 - (self.smoothed(track_id) / 100.0).clamp(0.0, 1.0)
    }

    /// Drop the history of a retired track
    pub fn reset(&mut self, track_id: TrackId) {
        self.histories.remove(&track_id);
    }

    /// Number of tracks with a history
    pub fn len(&self) -> usize {
        self.histories.len()
    }

    /// Whether no track has a history
    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> ImmobilityEstimator {
        ImmobilityEstimator::new(&DetectionConfig::default())
    }

    #[test]
    fn test_unknown_track_reads_as_still() {
        let est = estimator();
        assert_eq!(est.smoothed(TrackId::new(9)), 0.0);
        assert!(est.is_immobile(TrackId::new(9)));
        assert_eq!(est.immobility_score(TrackId::new(9)), 1.0);
    }

    #[test]
    fn test_mean_over_bounded_window() {
        let mut est = estimator();
        let id = TrackId::new(1);
        for _ in 0..10 {
            est.update(id, 50.0);
        }
        for _ in 0..5 {
            est.update(id, 0.0);
        }
        // last 10 samples: five 50s, five 0s
        assert!((est.smoothed(id) - 25.0).abs() < 1e-10);
        assert!((est.immobility_score(id) - 0.75).abs() < 1e-10);
        assert!(!est.is_immobile(id));
    }

    #[test]
    fn test_threshold_and_score_bounds() {
        let mut est = estimator();
        let still = TrackId::new(1);
        let busy = TrackId::new(2);
        est.update(still, 2.0);
        est.update(busy, 250.0);
        assert!(est.is_immobile(still));
        assert!(!est.is_immobile(busy));
        assert_eq!(est.immobility_score(busy), 0.0);
    }

    #[test]
    fn test_non_finite_samples_are_dropped() {
        let mut est = estimator();
        let id = TrackId::new(4);
        est.update(id, 2.0);
        est.update(id, f64::NAN);
        est.update(id, f64::INFINITY);
        est.update(id, -7.0);
        // 2.0 and the clamped -7.0
        assert!((est.smoothed(id) - 1.0).abs() < 1e-10);
        assert!(est.immobility_score(id).is_finite());
    }

    #[test]
    fn test_sanitize_motion_energy() {
        assert_eq!(sanitize_motion_energy(42.0), Ok(42.0));
        assert_eq!(sanitize_motion_energy(130.0), Ok(MAX_MOTION_ENERGY));
        assert_eq!(sanitize_motion_energy(-1.0), Ok(0.0));
        assert!(matches!(
            sanitize_motion_energy(f64::NAN),
            Err(ObservationError::NonFinite { field: "motion_energy" })
        ));
    }

    #[test]
    fn test_reset_drops_history() {
        let mut est = estimator();
        let id = TrackId::new(3);
        est.update(id, 40.0);
        est.reset(id);
        assert!(est.is_empty());
        assert_eq!(est.smoothed(id), 0.0);
    }
}
