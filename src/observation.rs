//! Per-person observations handed over by the perception collaborator
//!
//! An [`Observation`] has a small set of mandatory fields (bounding box,
//! centroid, orientation, timestamp) and explicitly optional pose-derived
//! fields. Geometry-only (contour) front ends leave the optional fields as
//! `None`; indicator evaluation then excludes the corresponding vote instead
//! of reading a default.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::errors::ObservationError;

/// Smallest width/height accepted after clamping, in pixels
pub const MIN_DIMENSION: f64 = 1.0;

/// Axis-aligned bounding box in pixel coordinates (top-left origin)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge
    pub x: f64,
    /// Top edge
    pub y: f64,
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

impl BoundingBox {
    /// Create a new bounding box
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Geometric center
    #[inline]
    pub fn center(&self) -> Point2<f64> {
        Point2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Width over height, with the height floored at [`MIN_DIMENSION`]
    #[inline]
    pub fn aspect_ratio(&self) -> f64 {
        self.width / self.height.max(MIN_DIMENSION)
    }

    /// Area in square pixels
    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// A single body joint reported by a pose front end
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    /// Horizontal pixel coordinate
    pub x: f64,
    /// Vertical pixel coordinate
    pub y: f64,
    /// Detector confidence in [0, 1]
    pub confidence: f64,
}

impl Keypoint {
    /// Create a new keypoint
    pub fn new(x: f64, y: f64, confidence: f64) -> Self {
        Self { x, y, confidence }
    }
}

/// Keypoint set (inline storage sized for the 17-joint COCO layout)
pub type Keypoints = SmallVec<[Keypoint; 17]>;

/// One frame's worth of measurements for one detected person
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Bounding box of the person
    pub bbox: BoundingBox,
    /// Centroid position in pixels (hip center for pose front ends)
    pub centroid: Point2<f64>,
    /// Centroid height as a fraction of frame height (0 = top, 1 = bottom)
    pub centroid_height_ratio: f64,
    /// Bounding box width over height
    pub aspect_ratio: f64,
    /// Body orientation in degrees (0 = upright, ~90 = horizontal)
    pub orientation: f64,
    /// Torso angle from confidence-filtered shoulder/hip joints, in degrees
    pub torso_angle: Option<f64>,
    /// Distance from the hips to the estimated floor line, normalized by frame height
    pub floor_distance: Option<f64>,
    /// Body keypoints, when a pose front end produced them
    pub keypoints: Option<Keypoints>,
    /// Capture timestamp in seconds
    pub timestamp: f64,
}

impl Observation {
    /// Build a geometry-only observation from a bounding box.
    ///
    /// The centroid is the box center, the height fraction is taken against
    /// `frame_height` and the orientation starts upright.
    pub fn from_bbox(bbox: BoundingBox, frame_height: f64, timestamp: f64) -> Self {
        let centroid = bbox.center();
        Self {
            bbox,
            centroid,
            centroid_height_ratio: centroid.y / frame_height.max(MIN_DIMENSION),
            aspect_ratio: bbox.aspect_ratio(),
            orientation: 0.0,
            torso_angle: None,
            floor_distance: None,
            keypoints: None,
            timestamp,
        }
    }

    /// Override the centroid and its height fraction
    pub fn with_centroid(mut self, centroid: Point2<f64>, centroid_height_ratio: f64) -> Self {
        self.centroid = centroid;
        self.centroid_height_ratio = centroid_height_ratio;
        self
    }

    /// Set the body orientation angle in degrees
    pub fn with_orientation(mut self, degrees: f64) -> Self {
        self.orientation = degrees;
        self
    }

    /// Set the pose-derived torso angle in degrees
    pub fn with_torso_angle(mut self, degrees: f64) -> Self {
        self.torso_angle = Some(degrees);
        self
    }

    /// Set the normalized floor distance
    pub fn with_floor_distance(mut self, distance: f64) -> Self {
        self.floor_distance = Some(distance);
        self
    }

    /// Attach body keypoints
    pub fn with_keypoints(mut self, keypoints: Keypoints) -> Self {
        self.keypoints = Some(keypoints);
        self
    }

    /// Angle used by the horizontal-posture vote: the torso angle when the
    /// front end provides one, the orientation angle otherwise.
    #[inline]
    pub fn posture_angle(&self) -> f64 {
        self.torso_angle.unwrap_or(self.orientation)
    }

    /// Validate at the boundary and clamp degenerate geometry.
    ///
    /// Negative sizes and non-finite values are rejected; widths and heights
    /// in `[0, 1)` are raised to [`MIN_DIMENSION`].
    pub fn sanitize(mut self) -> Result<Self, ObservationError> {
        if !self.timestamp.is_finite() {
            return Err(ObservationError::NonFiniteTimestamp);
        }

        let scalars = [
            ("bbox.x", self.bbox.x),
            ("bbox.y", self.bbox.y),
            ("bbox.width", self.bbox.width),
            ("bbox.height", self.bbox.height),
            ("centroid.x", self.centroid.x),
            ("centroid.y", self.centroid.y),
            ("centroid_height_ratio", self.centroid_height_ratio),
            ("aspect_ratio", self.aspect_ratio),
            ("orientation", self.orientation),
        ];
        for (field, value) in scalars {
            if !value.is_finite() {
                return Err(ObservationError::NonFinite { field });
            }
        }
        if self.torso_angle.is_some_and(|v| !v.is_finite()) {
            return Err(ObservationError::NonFinite {
                field: "torso_angle",
            });
        }
        if self.floor_distance.is_some_and(|v| !v.is_finite()) {
            return Err(ObservationError::NonFinite {
                field: "floor_distance",
            });
        }
        if let Some(keypoints) = &self.keypoints {
            if keypoints
                .iter()
                .any(|k| !(k.x.is_finite() && k.y.is_finite() && k.confidence.is_finite()))
            {
                return Err(ObservationError::NonFinite { field: "keypoints" });
            }
        }

        if self.bbox.width < 0.0 {
            return Err(ObservationError::NegativeDimension {
                field: "width",
                value: self.bbox.width,
            });
        }
        if self.bbox.height < 0.0 {
            return Err(ObservationError::NegativeDimension {
                field: "height",
                value: self.bbox.height,
            });
        }

        self.bbox.width = self.bbox.width.max(MIN_DIMENSION);
        self.bbox.height = self.bbox.height.max(MIN_DIMENSION);
        Ok(self)
    }
}

/// The fall/not-fall label of an external classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallClass {
    /// The window looks like a fall
    Fall,
    /// The window does not look like a fall
    NotFall,
}

/// Output of the optional learned classifier for one track
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Predicted label
    pub class: FallClass,
    /// Probability of the fall class in [0, 1]
    pub probability: f64,
    /// Classifier confidence in [0, 1]
    pub confidence: f64,
}

impl Classification {
    /// Create a new classification
    pub fn new(class: FallClass, probability: f64, confidence: f64) -> Self {
        Self {
            class,
            probability,
            confidence,
        }
    }

    /// Whether the label is [`FallClass::Fall`]
    #[inline]
    pub fn is_fall(&self) -> bool {
        self.class == FallClass::Fall
    }

    /// Validate classifier output: non-finite scores are rejected, finite
    /// ones are clamped to [0, 1]
    pub fn sanitize(mut self) -> Result<Self, ObservationError> {
        if !self.probability.is_finite() {
            return Err(ObservationError::NonFinite {
                field: "classification.probability",
            });
        }
        if !self.confidence.is_finite() {
            return Err(ObservationError::NonFinite {
                field: "classification.confidence",
            });
        }
        self.probability = self.probability.clamp(0.0, 1.0);
        self.confidence = self.confidence.clamp(0.0, 1.0);
        Ok(self)
    }
}
