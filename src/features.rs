//! Temporal feature windows for an external fall classifier
//!
//! Each frame a track contributes one [`InstantFeatures`] sample to a
//! bounded per-track window. Once the window holds enough samples it is
//! summarized into [`TemporalFeatures`], which flattens to a fixed-order
//! vector named by [`FEATURE_NAMES`].

use std::collections::{BTreeMap, VecDeque};

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::config::FeatureWindowConfig;
use crate::tracking::{Track, TrackId};

/// Number of entries in [`TemporalFeatures::to_vector`]
pub const FEATURE_COUNT: usize = 39;

/// Names of the [`TemporalFeatures::to_vector`] entries, in order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "aspect_ratio_mean",
    "aspect_ratio_std",
    "aspect_ratio_min",
    "aspect_ratio_max",
    "aspect_ratio_range",
    "angle_mean",
    "angle_std",
    "angle_min",
    "angle_max",
    "angle_range",
    "centroid_y_mean",
    "centroid_y_std",
    "centroid_y_min",
    "centroid_y_max",
    "centroid_y_range",
    "bbox_height_mean",
    "bbox_height_std",
    "bbox_height_min",
    "bbox_height_max",
    "bbox_height_range",
    "velocity_y_mean",
    "velocity_y_std",
    "velocity_y_min",
    "velocity_y_max",
    "velocity_y_range",
    "velocity_magnitude_mean",
    "velocity_magnitude_std",
    "velocity_magnitude_min",
    "velocity_magnitude_max",
    "velocity_magnitude_range",
    "aspect_ratio_trend",
    "centroid_y_change",
    "centroid_y_speed",
    "height_change",
    "height_change_ratio",
    "peak_velocity_y",
    "current_aspect_ratio",
    "current_centroid_y",
    "current_angle",
];

/// One frame's features for one track
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstantFeatures {
    pub aspect_ratio: f64,
    /// Posture angle in degrees
    pub angle: f64,
    /// Centroid height fraction
    pub centroid_y: f64,
    pub bbox_width: f64,
    pub bbox_height: f64,
    /// Pixels/second
    pub velocity_x: f64,
    /// Pixels/second
    pub velocity_y: f64,
    pub velocity_magnitude: f64,
}

impl InstantFeatures {
    /// Features of a track's latest observation and current velocity
    pub fn from_track(track: &Track) -> Self {
        let obs = track.last_observation();
        let velocity = track.velocity();
        Self {
            aspect_ratio: obs.aspect_ratio,
            angle: obs.posture_angle(),
            centroid_y: obs.centroid_height_ratio,
            bbox_width: obs.bbox.width,
            bbox_height: obs.bbox.height,
            velocity_x: velocity.x,
            velocity_y: velocity.y,
            velocity_magnitude: velocity.norm(),
        }
    }
}

/// Summary statistics of one feature over the window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesStats {
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub range: f64,
}

impl SeriesStats {
    fn from_values(values: impl Iterator<Item = f64> + Clone) -> Self {
        let (count, sum, min, max) = values.clone().fold(
            (0usize, 0.0, f64::INFINITY, f64::NEG_INFINITY),
            |(n, s, lo, hi), v| (n + 1, s + v, lo.min(v), hi.max(v)),
        );
        if count == 0 {
            return Self::default();
        }
        let mean = sum / count as f64;
        let variance = values.map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
        Self {
            mean,
            std: variance.sqrt(),
            min,
            max,
            range: max - min,
        }
    }

    fn push_into(&self, out: &mut Vec<f64>) {
        out.extend_from_slice(&[self.mean, self.std, self.min, self.max, self.range]);
    }
}

/// Window summary handed to a classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalFeatures {
    pub aspect_ratio: SeriesStats,
    pub angle: SeriesStats,
    pub centroid_y: SeriesStats,
    pub bbox_height: SeriesStats,
    pub velocity_y: SeriesStats,
    pub velocity_magnitude: SeriesStats,
    /// Last minus first aspect ratio
    pub aspect_ratio_trend: f64,
    /// Last minus first centroid height fraction
    pub centroid_y_change: f64,
    /// `centroid_y_change` per frame in the window
    pub centroid_y_speed: f64,
    /// Last minus first bounding-box height
    pub height_change: f64,
    /// `height_change` over the first height (floored at 1)
    pub height_change_ratio: f64,
    /// Largest absolute vertical velocity
    pub peak_velocity_y: f64,
    pub current_aspect_ratio: f64,
    pub current_centroid_y: f64,
    pub current_angle: f64,
}

impl TemporalFeatures {
    /// Summarize a non-empty window
    fn from_window(window: &VecDeque<InstantFeatures>) -> Option<Self> {
        let first = window.front()?;
        let last = window.back()?;
        let frames = window.len() as f64;

        let stats = |f: fn(&InstantFeatures) -> f64| SeriesStats::from_values(window.iter().map(f));
        let height_change = last.bbox_height - first.bbox_height;
        let centroid_y_change = last.centroid_y - first.centroid_y;

        Some(Self {
            aspect_ratio: stats(|s| s.aspect_ratio),
            angle: stats(|s| s.angle),
            centroid_y: stats(|s| s.centroid_y),
            bbox_height: stats(|s| s.bbox_height),
            velocity_y: stats(|s| s.velocity_y),
            velocity_magnitude: stats(|s| s.velocity_magnitude),
            aspect_ratio_trend: last.aspect_ratio - first.aspect_ratio,
            centroid_y_change,
            centroid_y_speed: centroid_y_change / frames,
            height_change,
            height_change_ratio: height_change / first.bbox_height.max(1.0),
            peak_velocity_y: window
                .iter()
                .map(|s| s.velocity_y.abs())
                .fold(0.0, f64::max),
            current_aspect_ratio: last.aspect_ratio,
            current_centroid_y: last.centroid_y,
            current_angle: last.angle,
        })
    }

    /// Flatten in [`FEATURE_NAMES`] order
    pub fn to_vector(&self) -> DVector<f64> {
        let mut values = Vec::with_capacity(FEATURE_COUNT);
        for series in [
            &self.aspect_ratio,
            &self.angle,
            &self.centroid_y,
            &self.bbox_height,
            &self.velocity_y,
            &self.velocity_magnitude,
        ] {
            series.push_into(&mut values);
        }
        values.extend_from_slice(&[
            self.aspect_ratio_trend,
            self.centroid_y_change,
            self.centroid_y_speed,
            self.height_change,
            self.height_change_ratio,
            self.peak_velocity_y,
            self.current_aspect_ratio,
            self.current_centroid_y,
            self.current_angle,
        ]);
        DVector::from_vec(values)
    }

    /// `(name, value)` pairs in vector order
    pub fn named(&self) -> Vec<(&'static str, f64)> {
        FEATURE_NAMES
            .iter()
            .copied()
            .zip(self.to_vector().iter().copied())
            .collect()
    }
}

/// Bounded per-track feature windows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureWindow {
    capacity: usize,
    min_frames: usize,
    buffers: BTreeMap<TrackId, VecDeque<InstantFeatures>>,
}

impl FeatureWindow {
    pub fn new(config: &FeatureWindowConfig) -> Self {
        Self {
            capacity: config.capacity.max(1),
            min_frames: config.min_frames.max(1),
            buffers: BTreeMap::new(),
        }
    }

    /// Re-apply saved windows under the current configuration
    pub(crate) fn rebuild(config: &FeatureWindowConfig, saved: Self) -> Self {
        let mut window = Self::new(config);
        for (track_id, buffer) in saved.buffers {
            for sample in buffer {
                window.push(track_id, sample);
            }
        }
        window
    }

    /// Append a sample to a track's window
    pub fn push(&mut self, track_id: TrackId, sample: InstantFeatures) {
        let capacity = self.capacity;
        let buffer = self
            .buffers
            .entry(track_id)
            .or_insert_with(|| VecDeque::with_capacity(capacity));
        buffer.push_back(sample);
        while buffer.len() > capacity {
            buffer.pop_front();
        }
    }

    /// Summary of a track's window, once it holds `min_frames` samples
    pub fn temporal(&self, track_id: TrackId) -> Option<TemporalFeatures> {
        let buffer = self.buffers.get(&track_id)?;
        if buffer.len() < self.min_frames {
            return None;
        }
        TemporalFeatures::from_window(buffer)
    }

    /// Sample a track and return its updated summary
    pub fn observe(&mut self, track: &Track) -> Option<TemporalFeatures> {
        self.push(track.id(), InstantFeatures::from_track(track));
        self.temporal(track.id())
    }

    /// Samples currently buffered for a track
    pub fn frames(&self, track_id: TrackId) -> usize {
        self.buffers.get(&track_id).map_or(0, VecDeque::len)
    }

    /// Drop a retired track's window
    pub fn reset(&mut self, track_id: TrackId) {
        self.buffers.remove(&track_id);
    }
}
