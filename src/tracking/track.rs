//! Track identity, history and kinematic queries
//!
//! A [`Track`] is the persistent identity of one person across frames. It
//! owns a [`KalmanEstimator`], a bounded insertion-ordered history of
//! observations and a disappearance counter. Only the
//! [`TrackManager`](super::TrackManager) creates or retires tracks.

use std::collections::VecDeque;
use std::fmt;

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

use super::kalman::KalmanEstimator;
use crate::config::TrackerConfig;
use crate::errors::{ObservationError, PipelineError};
use crate::observation::Observation;

/// Elapsed time (seconds) below which velocity is reported as zero
const MIN_ELAPSED: f64 = 1e-3;

/// Slack for timestamp comparisons against a look-back cutoff
const TIME_TOLERANCE: f64 = 1e-9;

/// Unique, monotonically increasing track identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(u64);

impl TrackId {
    /// Wrap a raw identifier
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw identifier
    #[inline]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identity and history of one tracked person
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Unique track identifier
    id: TrackId,
    /// Motion estimator
    estimator: KalmanEstimator,
    /// Most recent observations, oldest first; never empty
    history: VecDeque<Observation>,
    /// Maximum history length
    history_capacity: usize,
    /// Entries used by the kinematic queries
    kinematic_window: usize,
    /// Consecutive frames without a match
    disappeared: u32,
    /// Observations absorbed over the track's lifetime
    hits: u64,
}

impl Track {
    /// Start a track at an observation's centroid with zero velocity
    pub(crate) fn create(id: TrackId, observation: Observation, config: &TrackerConfig) -> Self {
        let estimator = KalmanEstimator::new(observation.centroid, &config.kalman);
        let mut history = VecDeque::with_capacity(config.history_capacity);
        history.push_back(observation);
        Self {
            id,
            estimator,
            history,
            history_capacity: config.history_capacity,
            kinematic_window: config.kinematic_window,
            disappeared: 0,
            hits: 1,
        }
    }

    /// Absorb a matched observation.
    ///
    /// An observation older than the last absorbed one is rejected and leaves
    /// the track untouched. A singular innovation still records the
    /// observation; the error is returned for logging.
    pub(crate) fn update(&mut self, observation: Observation) -> Result<(), PipelineError> {
        let previous = self.last_timestamp();
        if observation.timestamp < previous {
            return Err(ObservationError::TimestampRegression {
                previous,
                current: observation.timestamp,
            }
            .into());
        }

        let estimate = self.estimator.update(observation.centroid);

        self.history.push_back(observation);
        while self.history.len() > self.history_capacity {
            self.history.pop_front();
        }
        self.disappeared = 0;
        self.hits += 1;

        estimate
    }

    /// Predicted position, used as the assignment cost reference
    pub(crate) fn predict(&mut self) -> Point2<f64> {
        self.estimator.predict()
    }

    /// Record a frame without a match; history is left alone
    pub(crate) fn mark_disappeared(&mut self) {
        self.disappeared += 1;
    }

    /// Unique track identifier
    #[inline]
    pub fn id(&self) -> TrackId {
        self.id
    }

    /// Consecutive frames without a match
    #[inline]
    pub fn disappeared(&self) -> u32 {
        self.disappeared
    }

    /// Observations absorbed over the track's lifetime
    #[inline]
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Whether enough observations arrived to expose the track
    #[inline]
    pub fn is_confirmed(&self, min_hits: u64) -> bool {
        self.hits >= min_hits
    }

    /// Motion estimator
    #[inline]
    pub fn estimator(&self) -> &KalmanEstimator {
        &self.estimator
    }

    /// Recent observations, oldest first
    #[inline]
    pub fn history(&self) -> &VecDeque<Observation> {
        &self.history
    }

    /// Most recent observation
    #[inline]
    pub fn last_observation(&self) -> &Observation {
        &self.history[self.history.len() - 1]
    }

    /// Capture time of the most recent observation
    #[inline]
    pub fn last_timestamp(&self) -> f64 {
        self.last_observation().timestamp
    }

    /// The last `kinematic_window` history entries, oldest first
    fn recent(&self) -> impl DoubleEndedIterator<Item = &Observation> + ExactSizeIterator {
        let start = self.history.len().saturating_sub(self.kinematic_window);
        self.history.range(start..)
    }

    /// Centroid displacement per second between the oldest and newest recent entries.
    ///
    /// Zero with fewer than two samples or when they were captured at
    /// effectively the same instant.
    pub fn velocity(&self) -> Vector2<f64> {
        let mut recent = self.recent();
        if recent.len() < 2 {
            return Vector2::zeros();
        }
        let (Some(first), Some(last)) = (recent.next(), recent.next_back()) else {
            return Vector2::zeros();
        };

        let elapsed = last.timestamp - first.timestamp;
        if elapsed < MIN_ELAPSED {
            return Vector2::zeros();
        }
        (last.centroid - first.centroid) / elapsed
    }

    /// Absolute vertical component of [`velocity`](Self::velocity), pixels/second
    pub fn vertical_speed(&self) -> f64 {
        self.velocity().y.abs()
    }

    /// Frame-height proxy: twice the current bounding-box height
    #[inline]
    pub fn frame_height_estimate(&self) -> f64 {
        self.last_observation().bbox.height * 2.0
    }

    /// Downward centroid travel over the last `window` seconds, normalized by
    /// [`frame_height_estimate`](Self::frame_height_estimate).
    ///
    /// The reference is the most recent observation at least `window` seconds
    /// older than the current one; zero when no such observation exists or
    /// the centroid moved up.
    pub fn vertical_drop(&self, window: f64) -> f64 {
        let current = self.last_observation();
        let cutoff = current.timestamp - window;

        let Some(reference) = self
            .history
            .iter()
            .rev()
            .skip(1)
            .find(|o| o.timestamp <= cutoff + TIME_TOLERANCE)
        else {
            return 0.0;
        };

        let drop = current.centroid.y - reference.centroid.y;
        if drop <= 0.0 {
            return 0.0;
        }
        drop / self.frame_height_estimate()
    }

    /// [`vertical_speed`](Self::vertical_speed) normalized by the frame-height proxy
    pub fn vertical_speed_normalized(&self) -> f64 {
        self.vertical_speed() / self.frame_height_estimate()
    }
}
